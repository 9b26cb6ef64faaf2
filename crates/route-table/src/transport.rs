//! Kernel notification transport seam
//!
//! [`Connector`] creates the live route subscription; the resulting
//! [`RouteTransport`] drains notifications, runs full-table dumps, and
//! reports readiness to the async runtime. Dropping a transport destroys
//! the subscription.
//!
//! The netlink implementation lives in [`crate::netlink`]; [`MockConnector`]
//! is an in-memory stand-in for development and tests.
//!
//! NIST 800-53 Rev5 [SC-7]: Boundary Protection - Kernel interface isolation

use crate::decoder::emit;
use crate::error::{Result, RouteTableError};
use crate::types::Notification;
use crate::types::kernel::{NLMSG_DONE, NLMSG_ERROR, NLMSG_HDRLEN, nlmsg_align};
use netlink_packet_core::{
    NetlinkBuffer, NLM_F_DUMP, NLM_F_REQUEST, NetlinkHeader, NetlinkMessage, NetlinkPayload,
};
use netlink_packet_route::route::RouteMessage;
use netlink_packet_route::{AddressFamily, RouteNetlinkMessage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tracing::trace;

/// A live route subscription
pub trait RouteTransport {
    /// Everything queued right now, without blocking
    fn drain(&mut self) -> Result<Vec<Notification>>;

    /// Run one IPv4 route dump, handing each reply message to `visit`.
    ///
    /// Fails before visiting anything if the session cannot be opened. The
    /// returned status is the session's completion status.
    fn dump(&mut self, visit: &mut dyn FnMut(&[u8])) -> Result<()>;

    /// Register interest in new notifications. Never blocks.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>>;
}

/// Creates route subscriptions
pub trait Connector {
    type Transport: RouteTransport;

    fn subscribe(&self) -> Result<Self::Transport>;
}

/// Split a received datagram into individual netlink messages.
///
/// When a frame's length field is broken the rest of the datagram is
/// yielded as one final chunk; the decoder then rejects it.
pub fn split_messages(buf: &[u8]) -> Messages<'_> {
    Messages { rest: buf }
}

pub struct Messages<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Messages<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }

        let available = self.rest.len();
        let len = NetlinkBuffer::new_checked(self.rest)
            .map(|frame| frame.length() as usize)
            .ok()
            .filter(|len| (NLMSG_HDRLEN..=available).contains(len))
            .unwrap_or(available);

        let frame = &self.rest[..len];
        self.rest = &self.rest[nlmsg_align(len).min(available)..];
        Some(frame)
    }
}

/// RTM_GETROUTE dump request for the IPv4 table
pub fn encode_dump_request(sequence: u32) -> Vec<u8> {
    let mut header = NetlinkHeader::default();
    header.flags = NLM_F_REQUEST | NLM_F_DUMP;
    header.sequence_number = sequence;

    let mut route = RouteMessage::default();
    route.header.address_family = AddressFamily::Inet;
    emit(header, RouteNetlinkMessage::GetRoute(route))
}

/// Where a dump session stands after one reply datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpProgress {
    /// More replies follow
    InProgress,
    /// NLMSG_DONE seen
    Done,
}

/// Hand the route records of one dump reply datagram to `visit`.
///
/// Replies to other requests are skipped and NLMSG_ERROR acks are ignored.
/// A frame whose header cannot be read is still handed to `visit`, so the
/// caller counts it as a rejected record and the session carries on.
pub fn process_dump_reply(
    buf: &[u8],
    sequence: u32,
    visit: &mut dyn FnMut(&[u8]),
) -> Result<DumpProgress> {
    for frame in split_messages(buf) {
        let Ok(header) = NetlinkBuffer::new_checked(frame) else {
            visit(frame);
            continue;
        };

        if header.sequence_number() != sequence {
            trace!(
                seq = header.sequence_number(),
                "Skipping reply from another request"
            );
            continue;
        }

        match header.message_type() {
            NLMSG_DONE => return Ok(DumpProgress::Done),
            NLMSG_ERROR => match error_code(frame) {
                0 => continue,
                errno => return Err(RouteTableError::DumpFailed { errno }),
            },
            _ => visit(frame),
        }
    }

    Ok(DumpProgress::InProgress)
}

/// Errno carried by an NLMSG_ERROR message (0 is an ACK)
fn error_code(frame: &[u8]) -> i32 {
    match NetlinkMessage::<RouteNetlinkMessage>::deserialize(frame).map(|msg| msg.payload) {
        Ok(NetlinkPayload::Error(err)) => err.code.map_or(0, |code| code.get().wrapping_neg()),
        _ => libc::EPROTO,
    }
}

/// Scripted transport state shared between a [`MockConnector`] and the
/// transports it creates.
#[derive(Debug, Default)]
struct MockState {
    pending: VecDeque<Notification>,
    dump: Vec<Vec<u8>>,
    dump_errno: Option<i32>,
    fail_subscribe: bool,
    fail_dump_open: bool,
    fail_drain: bool,
    live: usize,
    subscribe_calls: usize,
    dump_calls: usize,
    waker: Option<Waker>,
}

/// In-memory connector for development and tests.
///
/// Clones share one script, so a test keeps a clone to feed notifications
/// and dump contents to the transport owned by the route table.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a live notification message
    pub fn push_message(&self, raw: Vec<u8>) {
        self.push(Notification::Message(raw));
    }

    /// Queue a "messages were lost" signal
    pub fn push_overrun(&self) {
        self.push(Notification::Overrun);
    }

    fn push(&self, notification: Notification) {
        let mut state = self.state.lock();
        state.pending.push_back(notification);
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }

    /// Replace what the next dumps return
    pub fn set_dump(&self, records: Vec<Vec<u8>>) {
        self.state.lock().dump = records;
    }

    /// End dumps with NLMSG_ERROR carrying `errno` (after all records)
    pub fn set_dump_errno(&self, errno: Option<i32>) {
        self.state.lock().dump_errno = errno;
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.state.lock().fail_subscribe = fail;
    }

    pub fn fail_dump_open(&self, fail: bool) {
        self.state.lock().fail_dump_open = fail;
    }

    pub fn fail_drain(&self, fail: bool) {
        self.state.lock().fail_drain = fail;
    }

    /// Subscriptions currently alive
    pub fn live_subscriptions(&self) -> usize {
        self.state.lock().live
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().subscribe_calls
    }

    pub fn dump_calls(&self) -> usize {
        self.state.lock().dump_calls
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn subscribe(&self) -> Result<MockTransport> {
        let mut state = self.state.lock();
        state.subscribe_calls += 1;
        if state.fail_subscribe {
            return Err(RouteTableError::Netlink(
                "Failed to create socket: mock failure".to_string(),
            ));
        }
        state.live += 1;
        Ok(MockTransport {
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl RouteTransport for MockTransport {
    fn drain(&mut self) -> Result<Vec<Notification>> {
        let mut state = self.state.lock();
        if state.fail_drain {
            return Err(RouteTableError::Netlink(
                "Failed to receive: mock failure".to_string(),
            ));
        }
        Ok(state.pending.drain(..).collect())
    }

    fn dump(&mut self, visit: &mut dyn FnMut(&[u8])) -> Result<()> {
        let (records, errno) = {
            let mut state = self.state.lock();
            state.dump_calls += 1;
            if state.fail_dump_open {
                return Err(RouteTableError::Netlink(
                    "Failed to create dump socket: mock failure".to_string(),
                ));
            }
            (state.dump.clone(), state.dump_errno)
        };

        for record in &records {
            visit(record);
        }

        match errno {
            Some(errno) => Err(RouteTableError::DumpFailed { errno }),
            None => Ok(()),
        }
    }

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            state.waker = Some(cx.waker().clone());
            Poll::Pending
        } else {
            Poll::Ready(Ok(()))
        }
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.live = state.live.saturating_sub(1);
        state.waker = None;
    }
}

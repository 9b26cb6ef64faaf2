//! Netlink transport for IPv4 route notifications
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SC-7: Boundary Protection - Kernel interface for routing state
//! - SI-4: System Monitoring - Monitor routing table changes
//! - SC-5: DoS Protection - Non-blocking receive, sized socket buffers

#[cfg(target_os = "linux")]
mod linux {
    use crate::config::{NetlinkConfig, RouteTableConfig};
    use crate::error::{Result, RouteTableError};
    use crate::transport::{
        Connector, DumpProgress, RouteTransport, encode_dump_request, process_dump_reply,
        split_messages,
    };
    use crate::types::Notification;
    use crate::types::kernel::RTNLGRP_IPV4_ROUTE;
    use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_ROUTE};
    use std::io::{self, ErrorKind};
    use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
    use std::task::{Context, Poll};
    use tokio::io::Interest;
    use tokio::io::unix::AsyncFd;
    use tracing::{debug, instrument, trace, warn};

    /// Creates netlink route subscriptions
    #[derive(Debug, Clone, Default)]
    pub struct NetlinkConnector {
        config: NetlinkConfig,
    }

    impl NetlinkConnector {
        pub fn new(config: &RouteTableConfig) -> Self {
            Self {
                config: config.netlink.clone(),
            }
        }
    }

    impl Connector for NetlinkConnector {
        type Transport = NetlinkTransport;

        fn subscribe(&self) -> Result<NetlinkTransport> {
            NetlinkTransport::new(&self.config)
        }
    }

    /// Netlink socket subscribed to RTNLGRP_IPV4_ROUTE
    pub struct NetlinkTransport {
        socket: Socket,
        /// Reused across receives
        buffer: Vec<u8>,
        dump_buffer_size: usize,
        sequence: u32,
        /// Created on first readiness poll, needs a tokio runtime
        async_fd: Option<AsyncFd<OwnedFd>>,
    }

    impl NetlinkTransport {
        /// Create and bind a non-blocking socket for IPv4 route events
        ///
        /// # NIST Controls
        /// - AC-3: Access Enforcement - Kernel enforces multicast group access
        #[instrument(skip(config))]
        pub fn new(config: &NetlinkConfig) -> Result<Self> {
            let mut socket = Socket::new(NETLINK_ROUTE)
                .map_err(|e| RouteTableError::Netlink(format!("Failed to create socket: {}", e)))?;

            let groups = 1 << (RTNLGRP_IPV4_ROUTE - 1);
            socket
                .bind(&SocketAddr::new(0, groups))
                .map_err(|e| RouteTableError::Netlink(format!("Failed to bind socket: {}", e)))?;

            socket.set_non_blocking(true).map_err(|e| {
                RouteTableError::Netlink(format!("Failed to set non-blocking mode: {}", e))
            })?;

            debug!("Netlink socket bound to RTNLGRP_IPV4_ROUTE");

            let transport = Self {
                socket,
                buffer: Vec::with_capacity(config.recv_buffer_size),
                dump_buffer_size: config.dump_buffer_size,
                sequence: 0,
                async_fd: None,
            };
            transport.tune_socket(config.socket_rcvbuf);

            Ok(transport)
        }

        /// Set SO_RCVBUF. Overruns are recoverable, so failure only warns.
        ///
        /// NETLINK_NO_ENOBUFS must stay off: ENOBUFS is the only signal that
        /// notifications were lost and a resync is needed.
        fn tune_socket(&self, rcvbuf: usize) {
            if rcvbuf == 0 {
                return;
            }

            let fd = self.socket.as_raw_fd();
            let size = libc::c_int::try_from(rcvbuf).unwrap_or(libc::c_int::MAX);
            // SAFETY: fd is a live socket owned by self.socket; the option
            // value points at a c_int on the stack for the duration of the call
            let ret = unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    libc::SO_RCVBUF,
                    &size as *const _ as *const libc::c_void,
                    std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                )
            };
            if ret < 0 {
                warn!("Failed to set SO_RCVBUF, using default buffer size");
            } else {
                debug!(size = rcvbuf, "Set socket receive buffer");
            }
        }

        fn next_sequence(&mut self) -> u32 {
            self.sequence = self.sequence.wrapping_add(1);
            self.sequence
        }
    }

    /// How the drain loop treats a failed receive
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum RecvFailure {
        /// Nothing more queued
        Empty,
        Retry,
        /// Kernel dropped notifications
        Overrun,
        Fatal,
    }

    fn classify_recv_error(e: &io::Error) -> RecvFailure {
        if e.raw_os_error() == Some(libc::ENOBUFS) {
            return RecvFailure::Overrun;
        }
        match e.kind() {
            ErrorKind::WouldBlock => RecvFailure::Empty,
            ErrorKind::Interrupted => RecvFailure::Retry,
            _ => RecvFailure::Fatal,
        }
    }

    impl RouteTransport for NetlinkTransport {
        fn drain(&mut self) -> Result<Vec<Notification>> {
            let mut out = Vec::new();

            loop {
                self.buffer.clear();
                match self.socket.recv(&mut self.buffer, 0) {
                    Ok(0) => break,
                    Ok(len) => out.extend(
                        split_messages(&self.buffer[..len])
                            .map(|frame| Notification::Message(frame.to_vec())),
                    ),
                    Err(e) => match classify_recv_error(&e) {
                        RecvFailure::Empty => break,
                        RecvFailure::Retry => continue,
                        RecvFailure::Overrun => {
                            debug!("Netlink receive buffer overrun");
                            out.push(Notification::Overrun);
                        }
                        RecvFailure::Fatal => {
                            return Err(RouteTableError::Netlink(format!(
                                "Failed to receive: {}",
                                e
                            )));
                        }
                    },
                }
            }

            trace!(count = out.len(), "Drained route notifications");
            Ok(out)
        }

        /// Dump the IPv4 routing table over a transient socket.
        ///
        /// Blocks until the kernel finishes the dump.
        #[instrument(skip(self, visit))]
        fn dump(&mut self, visit: &mut dyn FnMut(&[u8])) -> Result<()> {
            let mut socket = Socket::new(NETLINK_ROUTE).map_err(|e| {
                RouteTableError::Netlink(format!("Failed to create dump socket: {}", e))
            })?;
            socket.bind_auto().map_err(|e| {
                RouteTableError::Netlink(format!("Failed to bind dump socket: {}", e))
            })?;

            let sequence = self.next_sequence();
            let request = encode_dump_request(sequence);
            socket.send(&request, 0).map_err(|e| {
                RouteTableError::Netlink(format!("Failed to send dump request: {}", e))
            })?;
            debug!(sequence, "Requested IPv4 route dump");

            let mut buffer = Vec::with_capacity(self.dump_buffer_size);
            loop {
                buffer.clear();
                let len = match socket.recv(&mut buffer, 0) {
                    Ok(len) => len,
                    Err(e) if classify_recv_error(&e) == RecvFailure::Retry => continue,
                    Err(e) => {
                        return Err(RouteTableError::Netlink(format!(
                            "Failed to receive dump reply: {}",
                            e
                        )));
                    }
                };
                if len == 0 {
                    return Err(RouteTableError::Netlink(
                        "Dump socket closed before NLMSG_DONE".to_string(),
                    ));
                }

                if process_dump_reply(&buffer[..len], sequence, visit)? == DumpProgress::Done {
                    return Ok(());
                }
            }
        }

        fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
            if self.async_fd.is_none() {
                if tokio::runtime::Handle::try_current().is_err() {
                    return Poll::Ready(Err(RouteTableError::Netlink(
                        "Readiness polling requires a tokio runtime".to_string(),
                    )));
                }
                // SAFETY: the fd stays open for as long as self.socket lives;
                // it is only borrowed long enough to dup it
                let borrowed = unsafe { BorrowedFd::borrow_raw(self.socket.as_raw_fd()) };
                let owned = borrowed.try_clone_to_owned()?;
                let async_fd = AsyncFd::with_interest(owned, Interest::READABLE).map_err(|e| {
                    RouteTableError::Netlink(format!("Failed to create AsyncFd: {}", e))
                })?;
                debug!("Registered netlink socket with the runtime");
                self.async_fd = Some(async_fd);
            }

            let Some(async_fd) = self.async_fd.as_ref() else {
                return Poll::Pending;
            };

            match async_fd.poll_read_ready(cx) {
                Poll::Ready(Ok(mut guard)) => {
                    // The caller drains until EAGAIN, so readiness can be
                    // cleared before the data is consumed
                    guard.clear_ready();
                    Poll::Ready(Ok(()))
                }
                Poll::Ready(Err(e)) => Poll::Ready(Err(RouteTableError::Netlink(format!(
                    "AsyncFd readable error: {}",
                    e
                )))),
                Poll::Pending => Poll::Pending,
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_enobufs_is_overrun() {
            let e = io::Error::from_raw_os_error(libc::ENOBUFS);
            assert_eq!(classify_recv_error(&e), RecvFailure::Overrun);
        }

        #[test]
        fn test_recv_error_classes() {
            let again = io::Error::from_raw_os_error(libc::EAGAIN);
            let intr = io::Error::from_raw_os_error(libc::EINTR);
            let badf = io::Error::from_raw_os_error(libc::EBADF);

            assert_eq!(classify_recv_error(&again), RecvFailure::Empty);
            assert_eq!(classify_recv_error(&intr), RecvFailure::Retry);
            assert_eq!(classify_recv_error(&badf), RecvFailure::Fatal);
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux::*;

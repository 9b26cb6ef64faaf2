//! RouteTable - registration lifecycle, resync, and notification processing
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-4: System Monitoring - Routing table monitoring
//! - CP-10: System Recovery - Full resync after lost notifications
//! - AU-12: Audit Record Generation - Route cache changes are logged

use crate::config::RouteTableConfig;
use crate::decoder::decode;
use crate::error::Result;
use crate::lookup;
use crate::rate_limit::RateLimiter;
use crate::store::RouteStore;
use crate::transport::{Connector, RouteTransport};
use crate::types::{Notification, RouteChange, RouteData, RouteMessageType};
use std::net::Ipv4Addr;
use std::task::{Context, Poll};
use tracing::{debug, info, instrument, warn};

/// Outcome of the last full resync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncStats {
    /// Dump records that changed the cache
    pub applied: usize,
    /// Valid records the cache ignores or already held
    pub ignored: usize,
    /// Records that failed to decode
    pub rejected: usize,
}

/// What applying one change did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Inserted,
    Removed,
    Duplicate,
    NotFound,
    Ignored,
}

/// Live subscription plus the cache it feeds. Exists only while registered.
struct Active<T> {
    transport: T,
    store: RouteStore,
}

/// Process-local cache of the kernel IPv4 unicast routing table.
///
/// Independent users share one instance through [`register`](Self::register)
/// and [`unregister`](Self::unregister); only the outermost pair creates and
/// destroys the kernel subscription and the cache. All methods run to
/// completion without blocking except [`resync`](Self::resync), which waits
/// for the kernel dump. Embedders on several threads must put the whole
/// table behind one lock.
pub struct RouteTable<C: Connector> {
    connector: C,
    registrations: usize,
    active: Option<Active<C::Transport>>,
    limiter: RateLimiter,
    last_resync: Option<ResyncStats>,
}

impl<C: Connector> RouteTable<C> {
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, &RouteTableConfig::default())
    }

    pub fn with_config(connector: C, config: &RouteTableConfig) -> Self {
        Self {
            connector,
            registrations: 0,
            active: None,
            limiter: RateLimiter::new(config.rate_limit()),
            last_resync: None,
        }
    }

    /// Register a user of the table.
    ///
    /// The first registration subscribes to route notifications, creates an
    /// empty cache, and fills it with a full dump. If either step fails the
    /// error is returned and nothing is registered.
    #[instrument(skip(self), fields(registrations = self.registrations))]
    pub fn register(&mut self) -> Result<()> {
        if self.registrations == 0 {
            debug_assert!(self.active.is_none());

            let transport = self.connector.subscribe().inspect_err(|e| {
                warn!(error = %e, "Failed to subscribe to IPv4 route notifications");
            })?;
            self.active = Some(Active {
                transport,
                store: RouteStore::new(),
            });

            if let Err(e) = self.resync() {
                self.active = None;
                return Err(e);
            }

            info!(
                routes = self.len(),
                "Route table registered and synchronized"
            );
        }

        self.registrations += 1;
        Ok(())
    }

    /// Drop a registration; the last one tears down subscription and cache.
    ///
    /// # Panics
    /// If called more times than [`register`](Self::register) succeeded.
    #[instrument(skip(self), fields(registrations = self.registrations))]
    pub fn unregister(&mut self) {
        assert!(
            self.registrations > 0,
            "route table unregister without matching register"
        );

        self.registrations -= 1;
        if self.registrations == 0 {
            if let Some(mut active) = self.active.take() {
                active.store.clear();
            }
            self.last_resync = None;
            info!("Route table unregistered, subscription closed");
        }
    }

    pub fn registrations(&self) -> usize {
        self.registrations
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Rebuild the cache from a full kernel dump.
    ///
    /// The cache is cleared first. Records that fail to decode are skipped.
    /// If the dump cannot be started the cache stays empty and the error is
    /// returned; there is no retry here. Does nothing when unregistered.
    #[instrument(skip(self))]
    pub fn resync(&mut self) -> Result<()> {
        let Self {
            active, limiter, ..
        } = self;
        let Some(Active { transport, store }) = active.as_mut() else {
            return Ok(());
        };

        store.clear();

        let mut stats = ResyncStats::default();
        let result = transport.dump(&mut |raw| match decode(raw) {
            Ok(change) => match apply_to_store(store, limiter, &change) {
                Applied::Inserted | Applied::Removed => stats.applied += 1,
                _ => stats.ignored += 1,
            },
            Err(e) => {
                stats.rejected += 1;
                if let Some(suppressed) = limiter.check() {
                    debug!(error = %e, suppressed, "Skipping unparseable route dump record");
                }
            }
        });

        self.last_resync = Some(stats);

        match result {
            Ok(()) => {
                debug!(
                    applied = stats.applied,
                    ignored = stats.ignored,
                    rejected = stats.rejected,
                    "Route table resynchronized"
                );
                Ok(())
            }
            Err(e) => {
                if let Some(suppressed) = self.limiter.check() {
                    warn!(error = %e, suppressed, "Failed to reset routing table");
                }
                Err(e)
            }
        }
    }

    pub fn last_resync(&self) -> Option<ResyncStats> {
        self.last_resync
    }

    /// Apply one decoded change; `None` means notifications may have been
    /// lost and triggers a full resync.
    pub fn apply(&mut self, change: Option<RouteChange>) {
        let Some(change) = change else {
            if let Some(suppressed) = self.limiter.check() {
                debug!(suppressed, "Route notifications lost, resynchronizing");
            }
            // resync logs its own failure; the next overrun retries
            let _ = self.resync();
            return;
        };

        if let Some(Active { store, .. }) = self.active.as_mut() {
            apply_to_store(store, &mut self.limiter, &change);
        }
    }

    /// Process every pending notification. Never blocks.
    ///
    /// Returns the number of notifications handled. A receive failure is
    /// treated as lost notifications.
    pub fn run(&mut self) -> usize {
        let Some(active) = self.active.as_mut() else {
            return 0;
        };

        let notifications = match active.transport.drain() {
            Ok(notifications) => notifications,
            Err(e) => {
                if let Some(suppressed) = self.limiter.check() {
                    warn!(error = %e, suppressed, "Failed to receive route notifications");
                }
                vec![Notification::Overrun]
            }
        };

        let count = notifications.len();
        for notification in notifications {
            match notification {
                Notification::Overrun => self.apply(None),
                Notification::Message(raw) => match decode(&raw) {
                    Ok(change) => self.apply(Some(change)),
                    Err(e) => {
                        if let Some(suppressed) = self.limiter.check() {
                            debug!(error = %e, suppressed, "Received unparseable route message");
                        }
                    }
                },
            }
        }
        count
    }

    /// Register the caller's waker for the next notification.
    ///
    /// Returns `Ready` when [`run`](Self::run) has work. While unregistered
    /// there is nothing to wait for and this stays `Pending`.
    pub fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        match self.active.as_mut() {
            Some(active) => active.transport.poll_ready(cx),
            None => Poll::Pending,
        }
    }

    /// Wait until notifications are pending
    pub async fn readable(&mut self) -> Result<()> {
        std::future::poll_fn(|cx| self.poll_ready(cx)).await
    }

    /// Interface index traffic to `ip` will most likely egress through.
    ///
    /// The answer may name a virtual interface such as a bridge; it is not
    /// a guarantee of the kernel's forwarding decision.
    pub fn lookup_egress_interface(&self, ip: Ipv4Addr) -> Option<i32> {
        let active = self.active.as_ref()?;
        lookup::egress_interface(&active.store, u32::from(ip))
    }

    /// [`lookup_egress_interface`](Self::lookup_egress_interface) for an
    /// address held in network byte order
    pub fn lookup_egress_interface_be(&self, ip: u32) -> Option<i32> {
        self.lookup_egress_interface(Ipv4Addr::from(u32::from_be(ip)))
    }

    /// Snapshot of the cached routes
    pub fn routes(&self) -> Vec<RouteData> {
        self.active
            .as_ref()
            .map(|active| active.store.routes())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.active.as_ref().map_or(0, |active| active.store.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn apply_to_store(
    store: &mut RouteStore,
    limiter: &mut RateLimiter,
    change: &RouteChange,
) -> Applied {
    if !change.relevant {
        if let Some(suppressed) = limiter.check() {
            debug!(route = %change.data, suppressed, "Ignoring irrelevant route message");
        }
        return Applied::Ignored;
    }

    match change.msg_type {
        RouteMessageType::New => {
            if store.insert(change.data) {
                Applied::Inserted
            } else {
                if let Some(suppressed) = limiter.check() {
                    debug!(
                        route = %change.data,
                        suppressed,
                        "Skipping insertion of duplicate route entry"
                    );
                }
                Applied::Duplicate
            }
        }
        RouteMessageType::Delete => {
            if store.remove(&change.data) {
                Applied::Removed
            } else {
                if let Some(suppressed) = limiter.check() {
                    debug!(
                        route = %change.data,
                        suppressed,
                        "Skipping deletion of non-existent route entry"
                    );
                }
                Applied::NotFound
            }
        }
        RouteMessageType::Other(_) => Applied::Ignored,
    }
}

//! Process-wide route table
//!
//! For hosts where independent components each need egress lookups but
//! cannot pass a [`RouteTable`] between them. The instance is created
//! lazily, empty and unregistered, on first use; it is configured from
//! [`DEFAULT_CONFIG_PATH`](crate::config::DEFAULT_CONFIG_PATH) at that
//! point.
//!
//! Initialization order: the first [`register`] subscribes and dumps the
//! kernel table. Teardown order: the last [`unregister`] closes the
//! subscription and drops the cache; the instance itself lives until
//! process exit and can be registered again.
//!
//! Every call takes one process-wide lock, so a [`resync`] (or the initial
//! dump inside [`register`]) blocks lookups from other threads until the
//! kernel dump completes.

use crate::config::RouteTableConfig;
use crate::error::Result;
use crate::netlink::NetlinkConnector;
use crate::route_table::RouteTable;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use tracing::warn;

static ROUTE_TABLE: Lazy<Mutex<RouteTable<NetlinkConnector>>> = Lazy::new(|| {
    let config = RouteTableConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Invalid route table config, using defaults");
        RouteTableConfig::default()
    });
    Mutex::new(RouteTable::with_config(
        NetlinkConnector::new(&config),
        &config,
    ))
});

/// See [`RouteTable::register`]
pub fn register() -> Result<()> {
    ROUTE_TABLE.lock().register()
}

/// See [`RouteTable::unregister`]
pub fn unregister() {
    ROUTE_TABLE.lock().unregister()
}

/// See [`RouteTable::run`]
pub fn run() -> usize {
    ROUTE_TABLE.lock().run()
}

/// See [`RouteTable::resync`]
pub fn resync() -> Result<()> {
    ROUTE_TABLE.lock().resync()
}

/// Wait until route notifications are pending, then process them.
///
/// The lock is held only while polling and while processing, never across
/// an await point.
pub async fn run_when_ready() -> Result<usize> {
    std::future::poll_fn(|cx| ROUTE_TABLE.lock().poll_ready(cx)).await?;
    Ok(run())
}

/// See [`RouteTable::lookup_egress_interface`]
pub fn get_ifindex(ip: Ipv4Addr) -> Option<i32> {
    ROUTE_TABLE.lock().lookup_egress_interface(ip)
}

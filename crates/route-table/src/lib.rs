//! IPv4 Route Table Cache for SONiC
//!
//! Keeps a process-local copy of the kernel IPv4 unicast routing table,
//! synchronized from rtnetlink route notifications, and answers "which
//! interface will traffic to this address most likely leave through?"
//! without a syscall per query.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//!
//! | Control | Description | Implementation |
//! |---------|-------------|----------------|
//! | AC-3 | Access Enforcement | Kernel enforces netlink group membership |
//! | AU-12 | Audit Record Generation | Route cache changes logged |
//! | CP-10 | System Recovery | Full resync after lost notifications |
//! | SC-5 | DoS Protection | Rate-limited logging, non-blocking receive |
//! | SI-10 | Input Validation | Schema-checked decoding of kernel messages |
//! | SI-11 | Error Handling | Structured error types |
//!
//! # Architecture
//!
//! ```text
//! Linux kernel ──RTNLGRP_IPV4_ROUTE──▶ RouteTransport ──▶ decoder ──▶ RouteStore
//!      ▲                                   │                            ▲
//!      └──────── RTM_GETROUTE dump ◀── resync (on register / overrun)   │
//!                                                                      lookup
//! ```
//!
//! # Usage
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> sonic_route_table::Result<()> {
//! use sonic_route_table::{NetlinkConnector, RouteTable, RouteTableConfig};
//! use std::net::Ipv4Addr;
//!
//! let config = RouteTableConfig::load()?;
//! let mut table = RouteTable::with_config(NetlinkConnector::new(&config), &config);
//! table.register()?;
//!
//! // On every scheduling tick
//! table.run();
//! let ifindex = table.lookup_egress_interface(Ipv4Addr::new(8, 8, 8, 8));
//! # let _ = ifindex;
//! table.unregister();
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```

pub mod config;
pub mod decoder;
pub mod error;
#[cfg(target_os = "linux")]
pub mod global;
pub mod lookup;
pub mod netlink;
pub mod rate_limit;
pub mod route_table;
pub mod store;
pub mod transport;
pub mod types;

pub use config::RouteTableConfig;
pub use decoder::{RouteMessageBuilder, decode};
pub use error::{DecodeError, Result, RouteTableError};
#[cfg(target_os = "linux")]
pub use netlink::{NetlinkConnector, NetlinkTransport};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use route_table::{ResyncStats, RouteTable};
pub use store::RouteStore;
pub use transport::{Connector, MockConnector, MockTransport, RouteTransport};
pub use types::{CachedRoute, Notification, RouteChange, RouteData, RouteMessageType};

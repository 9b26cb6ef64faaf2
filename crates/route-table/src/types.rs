//! Core types for the route cache
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-8: System Component Inventory - Routes as tracked network state
//! - SI-4: System Monitoring - Route change tracking

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Kernel constants from linux/netlink.h and linux/rtnetlink.h
pub mod kernel {
    pub const AF_INET: u8 = 2;

    pub const NLMSG_HDRLEN: usize = 16;
    pub const NLMSG_ALIGNTO: usize = 4;

    pub const NLMSG_ERROR: u16 = 2;
    pub const NLMSG_DONE: u16 = 3;
    pub const RTM_NEWROUTE: u16 = 24;
    pub const RTM_DELROUTE: u16 = 25;
    pub const RTM_GETROUTE: u16 = 26;

    pub const RT_SCOPE_NOWHERE: u8 = 255;
    pub const RTN_UNICAST: u8 = 1;
    pub const RTN_LOCAL: u8 = 2;
    pub const RT_TABLE_MAIN: u8 = 254;

    pub const RTNLGRP_IPV4_ROUTE: u32 = 7;

    /// Round `len` up to the netlink 4-byte alignment
    #[inline]
    pub const fn nlmsg_align(len: usize) -> usize {
        (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
    }
}

/// One cached IPv4 route, also the cache key.
///
/// Two values describe the same entry only if all three fields match
/// bit for bit. No canonicalization is applied to the destination, so
/// `10.0.0.1/24` and `10.0.0.0/24` are distinct entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RouteData {
    /// rtm_dst_len: significant bits of `destination` (0 = default route)
    pub prefix_len: u8,
    /// RTA_DST in host byte order, 0 when the attribute was absent
    pub destination: u32,
    /// RTA_OIF: output interface index
    pub oif: i32,
}

impl RouteData {
    pub const fn new(prefix_len: u8, destination: u32, oif: i32) -> Self {
        Self {
            prefix_len,
            destination,
            oif,
        }
    }

    /// Build from an address instead of a raw host-order integer
    pub fn from_addr(destination: Ipv4Addr, prefix_len: u8, oif: i32) -> Self {
        Self::new(prefix_len, u32::from(destination), oif)
    }

    /// `0.0.0.0/0`
    #[inline]
    pub fn is_default(&self) -> bool {
        self.prefix_len == 0 && self.destination == 0
    }

    pub fn destination_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.destination)
    }
}

impl fmt::Display for RouteData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} dev {}",
            self.destination_addr(),
            self.prefix_len,
            self.oif
        )
    }
}

/// A route held by the store. The store is the sole owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRoute {
    data: RouteData,
}

impl CachedRoute {
    pub fn new(data: RouteData) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &RouteData {
        &self.data
    }
}

/// Netlink message type of a route message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMessageType {
    /// RTM_NEWROUTE (also used for every dump reply)
    New,
    /// RTM_DELROUTE
    Delete,
    /// Anything else; decoded but never applied
    Other(u16),
}

impl RouteMessageType {
    pub fn from_kernel(nlmsg_type: u16) -> Self {
        match nlmsg_type {
            kernel::RTM_NEWROUTE => Self::New,
            kernel::RTM_DELROUTE => Self::Delete,
            other => Self::Other(other),
        }
    }
}

/// A decoded route message, consumed immediately by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteChange {
    /// False for routes the cache ignores (non-IPv4, scope nowhere,
    /// or a type other than unicast/local)
    pub relevant: bool,
    pub msg_type: RouteMessageType,
    pub data: RouteData,
}

/// What the live subscription yields on each drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// One complete netlink message
    Message(Vec<u8>),
    /// The kernel dropped messages (ENOBUFS); the cache must resync
    Overrun,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_data_display() {
        let rd = RouteData::from_addr(Ipv4Addr::new(10, 1, 0, 0), 16, 3);
        assert_eq!(rd.to_string(), "10.1.0.0/16 dev 3");
    }

    #[test]
    fn test_route_data_serializes() {
        let rd = RouteData::from_addr(Ipv4Addr::new(10, 0, 0, 0), 8, 4);
        let text = toml::to_string(&rd).unwrap();
        assert!(text.contains("prefix_len = 8"));
        assert!(text.contains("oif = 4"));
    }

    #[test]
    fn test_default_route_detection() {
        assert!(RouteData::new(0, 0, 2).is_default());
        assert!(!RouteData::new(0, 1, 2).is_default());
        assert!(!RouteData::new(8, 0, 2).is_default());
    }

    #[test]
    fn test_no_prefix_canonicalization() {
        let a = RouteData::from_addr(Ipv4Addr::new(10, 0, 0, 0), 24, 1);
        let b = RouteData::from_addr(Ipv4Addr::new(10, 0, 0, 1), 24, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_message_type_from_kernel() {
        assert_eq!(RouteMessageType::from_kernel(24), RouteMessageType::New);
        assert_eq!(RouteMessageType::from_kernel(25), RouteMessageType::Delete);
        assert_eq!(
            RouteMessageType::from_kernel(26),
            RouteMessageType::Other(26)
        );
    }

    #[test]
    fn test_nlmsg_align() {
        assert_eq!(kernel::nlmsg_align(0), 0);
        assert_eq!(kernel::nlmsg_align(5), 8);
        assert_eq!(kernel::nlmsg_align(8), 8);
    }
}

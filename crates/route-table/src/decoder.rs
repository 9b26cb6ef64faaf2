//! Route message decoding
//!
//! Turns one raw `RTM_NEWROUTE` / `RTM_DELROUTE` message into a
//! [`RouteChange`], or rejects it. Framing and attribute walking are done by
//! `netlink-packet-core` / `netlink-packet-route`; this module applies the
//! cache's schema on top. Decoding is pure: a rejected message leaves no
//! trace, the caller logs and drops it.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-10: Information Input Validation - Schema check of kernel input
//! - SC-7: Boundary Protection - Only forwarding IPv4 routes are accepted

use crate::error::DecodeError;
use crate::types::kernel::{RT_SCOPE_NOWHERE, RT_TABLE_MAIN, RTN_LOCAL, RTN_UNICAST};
use crate::types::{RouteChange, RouteData, RouteMessageType};
use netlink_packet_core::{NetlinkHeader, NetlinkMessage, NetlinkPayload};
use netlink_packet_route::route::{
    RouteAddress, RouteAttribute, RouteMessage, RouteScope, RouteType,
};
use netlink_packet_route::{AddressFamily, RouteNetlinkMessage};
use std::net::IpAddr;

/// Decode one route message.
///
/// RTA_OIF is mandatory for every family. Non-IPv4 messages come back with
/// `relevant = false` before the IPv4 destination width is checked, as do
/// routes that do not forward. When an attribute is repeated the last
/// occurrence wins.
pub fn decode(raw: &[u8]) -> Result<RouteChange, DecodeError> {
    let msg = NetlinkMessage::<RouteNetlinkMessage>::deserialize(raw)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let message_type = msg.header.message_type;

    let RouteMessage {
        header, attributes, ..
    } = match msg.payload {
        NetlinkPayload::InnerMessage(
            RouteNetlinkMessage::NewRoute(route)
            | RouteNetlinkMessage::DelRoute(route)
            | RouteNetlinkMessage::GetRoute(route),
        ) => route,
        _ => return Err(DecodeError::UnexpectedType(message_type)),
    };

    let msg_type = RouteMessageType::from_kernel(message_type);
    let prefix_len = header.destination_prefix_length;

    let oif = attributes
        .iter()
        .rev()
        .find_map(|attr| match attr {
            RouteAttribute::Oif(oif) => Some(*oif),
            _ => None,
        })
        .ok_or(DecodeError::MissingAttribute("RTA_OIF"))?;
    // Kernel ifindex is a C int
    let oif = oif as i32;

    if header.address_family != AddressFamily::Inet {
        return Ok(RouteChange {
            relevant: false,
            msg_type,
            data: RouteData::new(prefix_len, 0, oif),
        });
    }

    let destination = match attributes.iter().rev().find_map(|attr| match attr {
        RouteAttribute::Destination(addr) => Some(addr),
        _ => None,
    }) {
        None => 0,
        Some(RouteAddress::Inet(addr)) => u32::from(*addr),
        Some(_) => return Err(DecodeError::AttributeWidth("RTA_DST")),
    };

    // Unicast or local route in a scope that forwards
    let relevant = u8::from(header.scope) != RT_SCOPE_NOWHERE
        && matches!(u8::from(header.kind), RTN_UNICAST | RTN_LOCAL);

    Ok(RouteChange {
        relevant,
        msg_type,
        data: RouteData::new(prefix_len, destination, oif),
    })
}

/// Serialize one route netlink message
pub(crate) fn emit(header: NetlinkHeader, message: RouteNetlinkMessage) -> Vec<u8> {
    let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(message));
    packet.finalize();

    let mut buf = vec![0u8; packet.buffer_len()];
    packet.serialize(&mut buf);
    buf
}

/// Builds raw route messages in kernel wire format.
///
/// Used to script transports that do not talk to a kernel, and in tests.
#[derive(Debug, Clone)]
pub struct RouteMessageBuilder {
    wrap: fn(RouteMessage) -> RouteNetlinkMessage,
    sequence: u32,
    route: RouteMessage,
}

impl RouteMessageBuilder {
    /// RTM_NEWROUTE for a unicast IPv4 route in the main table
    pub fn new_route() -> Self {
        let mut route = RouteMessage::default();
        route.header.address_family = AddressFamily::Inet;
        route.header.table = RT_TABLE_MAIN;
        route.header.kind = RouteType::from(RTN_UNICAST);

        Self {
            wrap: RouteNetlinkMessage::NewRoute,
            sequence: 0,
            route,
        }
    }

    /// RTM_DELROUTE counterpart of [`Self::new_route`]
    pub fn del_route() -> Self {
        Self {
            wrap: RouteNetlinkMessage::DelRoute,
            ..Self::new_route()
        }
    }

    /// RTM_GETROUTE, which the cache decodes but never applies
    pub fn get_route() -> Self {
        Self {
            wrap: RouteNetlinkMessage::GetRoute,
            ..Self::new_route()
        }
    }

    pub fn sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn family(mut self, family: u8) -> Self {
        self.route.header.address_family = AddressFamily::from(family);
        self
    }

    pub fn scope(mut self, scope: u8) -> Self {
        self.route.header.scope = RouteScope::from(scope);
        self
    }

    pub fn kind(mut self, kind: u8) -> Self {
        self.route.header.kind = RouteType::from(kind);
        self
    }

    /// Adds RTA_DST and sets rtm_dst_len. The family is left alone.
    pub fn destination(mut self, addr: impl Into<IpAddr>, prefix_len: u8) -> Self {
        let addr = match addr.into() {
            IpAddr::V4(v4) => RouteAddress::Inet(v4),
            IpAddr::V6(v6) => RouteAddress::Inet6(v6),
        };
        self.route
            .attributes
            .push(RouteAttribute::Destination(addr));
        self.route.header.destination_prefix_length = prefix_len;
        self
    }

    /// Sets rtm_dst_len without adding RTA_DST
    pub fn prefix_len(mut self, prefix_len: u8) -> Self {
        self.route.header.destination_prefix_length = prefix_len;
        self
    }

    pub fn oif(mut self, oif: u32) -> Self {
        self.route.attributes.push(RouteAttribute::Oif(oif));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut header = NetlinkHeader::default();
        header.sequence_number = self.sequence;
        emit(header, (self.wrap)(self.route.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::kernel::{AF_INET, RTM_GETROUTE};
    use std::net::{Ipv4Addr, Ipv6Addr};

    const RTN_BLACKHOLE: u8 = 6;
    const RTN_BROADCAST: u8 = 3;
    const AF_INET6: u8 = 10;

    #[test]
    fn test_decode_new_route() {
        let raw = RouteMessageBuilder::new_route()
            .destination(Ipv4Addr::new(192, 168, 1, 0), 24)
            .oif(3)
            .build();

        let change = decode(&raw).unwrap();
        assert!(change.relevant);
        assert_eq!(change.msg_type, RouteMessageType::New);
        assert_eq!(
            change.data,
            RouteData::from_addr(Ipv4Addr::new(192, 168, 1, 0), 24, 3)
        );
    }

    #[test]
    fn test_decode_destination_host_order() {
        let raw = RouteMessageBuilder::new_route()
            .destination(Ipv4Addr::new(10, 0, 0, 0), 8)
            .oif(1)
            .build();

        let change = decode(&raw).unwrap();
        assert_eq!(change.data.destination, 0x0a00_0000);
    }

    #[test]
    fn test_decode_delete() {
        let raw = RouteMessageBuilder::del_route()
            .destination(Ipv4Addr::new(10, 0, 0, 0), 8)
            .oif(1)
            .build();

        assert_eq!(decode(&raw).unwrap().msg_type, RouteMessageType::Delete);
    }

    #[test]
    fn test_absent_destination_is_default_route() {
        let raw = RouteMessageBuilder::new_route().oif(9).build();

        let change = decode(&raw).unwrap();
        assert!(change.relevant);
        assert!(change.data.is_default());
        assert_eq!(change.data.oif, 9);
    }

    #[test]
    fn test_missing_oif_rejected() {
        let raw = RouteMessageBuilder::new_route()
            .destination(Ipv4Addr::new(10, 0, 0, 0), 8)
            .build();

        assert_eq!(
            decode(&raw).unwrap_err(),
            DecodeError::MissingAttribute("RTA_OIF")
        );
    }

    #[test]
    fn test_truncated_rejected() {
        let raw = RouteMessageBuilder::new_route().oif(1).build();

        assert!(matches!(
            decode(&raw[..10]),
            Err(DecodeError::Malformed(_))
        ));
        // Header claims more than the buffer holds
        assert!(matches!(
            decode(&raw[..raw.len() - 4]),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_header_without_rtmsg_rejected() {
        let raw = RouteMessageBuilder::new_route().build();
        let mut short = raw[..20].to_vec();
        short[..4].copy_from_slice(&20u32.to_ne_bytes());

        assert!(decode(&short).is_err());
    }

    #[test]
    fn test_non_ipv4_irrelevant() {
        let raw = RouteMessageBuilder::new_route()
            .family(AF_INET6)
            .oif(1)
            .build();

        let change = decode(&raw).unwrap();
        assert!(!change.relevant);
    }

    #[test]
    fn test_ipv6_destination_irrelevant_not_rejected() {
        let raw = RouteMessageBuilder::new_route()
            .family(AF_INET6)
            .destination(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0), 64)
            .oif(3)
            .build();

        let change = decode(&raw).unwrap();
        assert!(!change.relevant);
        assert_eq!(change.msg_type, RouteMessageType::New);
        assert_eq!(change.data.oif, 3);
        assert_eq!(change.data.prefix_len, 64);
    }

    #[test]
    fn test_ipv4_route_with_wide_destination_rejected() {
        let raw = RouteMessageBuilder::new_route()
            .destination(Ipv6Addr::LOCALHOST, 32)
            .oif(3)
            .build();

        assert_eq!(raw[16], AF_INET);
        assert!(decode(&raw).is_err());
    }

    #[test]
    fn test_scope_nowhere_irrelevant() {
        let raw = RouteMessageBuilder::new_route()
            .scope(RT_SCOPE_NOWHERE)
            .destination(Ipv4Addr::new(10, 0, 0, 0), 8)
            .oif(1)
            .build();

        assert!(!decode(&raw).unwrap().relevant);
    }

    #[test]
    fn test_route_type_relevance() {
        let build = |kind| {
            RouteMessageBuilder::new_route()
                .kind(kind)
                .destination(Ipv4Addr::new(10, 0, 0, 1), 32)
                .oif(1)
                .build()
        };

        assert!(decode(&build(RTN_UNICAST)).unwrap().relevant);
        assert!(decode(&build(RTN_LOCAL)).unwrap().relevant);
        assert!(!decode(&build(RTN_BLACKHOLE)).unwrap().relevant);
        assert!(!decode(&build(RTN_BROADCAST)).unwrap().relevant);
    }

    #[test]
    fn test_repeated_attribute_last_wins() {
        let raw = RouteMessageBuilder::new_route()
            .destination(Ipv4Addr::new(10, 0, 0, 0), 8)
            .oif(1)
            .oif(7)
            .build();

        assert_eq!(decode(&raw).unwrap().data.oif, 7);
    }

    #[test]
    fn test_trailing_bytes_beyond_nlmsg_len_ignored() {
        let mut raw = RouteMessageBuilder::new_route().oif(2).build();
        raw.extend_from_slice(&[0xde, 0xad]);

        assert_eq!(decode(&raw).unwrap().data.oif, 2);
    }

    #[test]
    fn test_get_route_decoded_as_other() {
        let raw = RouteMessageBuilder::get_route().oif(2).build();

        assert_eq!(
            decode(&raw).unwrap().msg_type,
            RouteMessageType::Other(RTM_GETROUTE)
        );
    }

    #[test]
    fn test_builder_sequence() {
        let raw = RouteMessageBuilder::new_route().sequence(9).oif(1).build();
        let msg = NetlinkMessage::<RouteNetlinkMessage>::deserialize(&raw).unwrap();
        assert_eq!(msg.header.sequence_number, 9);
    }
}

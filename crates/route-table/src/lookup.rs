//! Longest-prefix-match over the route cache
//!
//! A linear scan: the cache holds one host's unicast table, which is small
//! enough that a trie would not pay for its maintenance on every
//! notification.
//!
//! Among matching prefixes of equal length the first one met in store
//! iteration order wins. Iteration order is unspecified, so the winner is
//! too; a well-formed kernel table has no such overlaps.

use crate::store::RouteStore;
use crate::types::RouteData;

/// Network mask for a non-zero prefix length (saturates at /32)
#[inline]
fn prefix_mask(prefix_len: u8) -> u32 {
    debug_assert!(prefix_len > 0);
    u32::MAX << (32 - u32::from(prefix_len.min(32)))
}

/// Most specific non-default route covering `ip` (host byte order).
pub fn longest_prefix_match(store: &RouteStore, ip: u32) -> Option<&RouteData> {
    let mut best: Option<&RouteData> = None;

    for rd in store.iter().filter(|rd| rd.prefix_len > 0) {
        let mask = prefix_mask(rd.prefix_len);
        let longer = best.is_none_or(|b| rd.prefix_len > b.prefix_len);
        if longer && (ip & mask) == (rd.destination & mask) {
            best = Some(rd);
        }
    }

    best
}

/// The `0.0.0.0/0` entry, if cached
pub fn default_route(store: &RouteStore) -> Option<&RouteData> {
    store.iter().find(|rd| rd.is_default())
}

/// Interface index traffic to `ip` (host byte order) most likely leaves
/// through, falling back to the default route.
pub fn egress_interface(store: &RouteStore, ip: u32) -> Option<i32> {
    longest_prefix_match(store, ip)
        .or_else(|| default_route(store))
        .map(|rd| rd.oif)
}

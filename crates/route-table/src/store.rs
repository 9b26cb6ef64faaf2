//! Route cache store
//!
//! Holds the currently known relevant routes, keyed by the full
//! [`RouteData`]. Entries are only ever inserted or removed; the kernel
//! reports a changed route as a delete followed by an add.
//!
//! # Performance
//! When the `perf-fxhash` feature is enabled the index is an FxHashMap,
//! which hashes the small fixed-size keys faster than SipHash.

#[cfg(not(feature = "perf-fxhash"))]
use std::collections::HashMap;

#[cfg(feature = "perf-fxhash")]
use rustc_hash::FxHashMap as HashMap;

use crate::types::{CachedRoute, RouteData};

#[derive(Debug, Default)]
pub struct RouteStore {
    routes: HashMap<RouteData, CachedRoute>,
}

impl RouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert if no identical entry exists.
    ///
    /// Returns false for a duplicate; the existing entry is left untouched.
    pub fn insert(&mut self, data: RouteData) -> bool {
        if self.routes.contains_key(&data) {
            return false;
        }
        self.routes.insert(data, CachedRoute::new(data));
        true
    }

    /// Remove the entry identical to `data`. Returns false if there was none.
    pub fn remove(&mut self, data: &RouteData) -> bool {
        self.routes.remove(data).is_some()
    }

    pub fn contains(&self, data: &RouteData) -> bool {
        self.routes.contains_key(data)
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterate in the map's internal (unspecified) order
    pub fn iter(&self) -> impl Iterator<Item = &RouteData> {
        self.routes.values().map(CachedRoute::data)
    }

    /// Snapshot of every cached route
    pub fn routes(&self) -> Vec<RouteData> {
        self.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn route(a: u8, b: u8, c: u8, d: u8, len: u8, oif: i32) -> RouteData {
        RouteData::from_addr(Ipv4Addr::new(a, b, c, d), len, oif)
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut store = RouteStore::new();
        let rd = route(10, 0, 0, 0, 8, 1);

        assert!(store.insert(rd));
        assert!(!store.insert(rd));
        assert_eq!(store.len(), 1);
        assert_eq!(store.routes(), vec![rd]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut store = RouteStore::new();
        let rd = route(10, 0, 0, 0, 8, 1);

        assert!(!store.remove(&rd));
        store.insert(rd);
        assert!(store.remove(&rd));
        assert!(!store.contains(&rd));
        assert!(!store.remove(&rd));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_requires_exact_match() {
        let mut store = RouteStore::new();
        store.insert(route(10, 0, 0, 0, 8, 1));

        assert!(!store.remove(&route(10, 0, 0, 0, 8, 2)));
        assert!(!store.remove(&route(10, 0, 0, 0, 16, 1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut store = RouteStore::new();
        store.insert(route(10, 0, 0, 0, 8, 1));
        store.insert(route(0, 0, 0, 0, 0, 2));

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.iter().count(), 0);
    }
}

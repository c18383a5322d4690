//! Concurrent table of core system endpoints.

use arc_swap::ArcSwap;
use arrowhead_core::{CoreSystem, TransportProtocol};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Maps core systems to their base URLs.
///
/// Reads are lock-free. Writers publish a new map atomically, so a reader
/// sees either all entries of a merge or none of them.
#[derive(Debug)]
pub struct EndpointTable {
    systems: ArcSwap<HashMap<CoreSystem, Url>>,
    protocol: TransportProtocol,
}

impl EndpointTable {
    /// Empty table for `protocol`
    #[must_use]
    pub fn new(protocol: TransportProtocol) -> Self {
        Self {
            systems: ArcSwap::from_pointee(HashMap::new()),
            protocol,
        }
    }

    /// Protocol the endpoints are reached with
    #[must_use]
    pub const fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    /// Insert or replace the endpoint of `system`
    pub fn add(&self, system: CoreSystem, url: Url) {
        self.systems.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(system, url.clone());
            next
        });
    }

    /// Endpoint of `system`, if known
    #[must_use]
    pub fn get(&self, system: CoreSystem) -> Option<Url> {
        self.systems.load().get(&system).cloned()
    }

    /// Returns true if an endpoint is known for `system`
    #[must_use]
    pub fn contains(&self, system: CoreSystem) -> bool {
        self.systems.load().contains_key(&system)
    }

    /// Number of known endpoints
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.load().len()
    }

    /// Returns true if no endpoint is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.load().is_empty()
    }

    /// Point-in-time copy of all entries
    #[must_use]
    pub fn snapshot(&self) -> Arc<HashMap<CoreSystem, Url>> {
        self.systems.load_full()
    }

    /// Merge every entry of `other` into this table.
    ///
    /// Nothing is written when `other` is this table or already holds the
    /// same entries.
    pub fn add_all(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        let incoming = other.systems.load_full();
        self.systems.rcu(|current| {
            if **current == *incoming {
                return Arc::clone(current);
            }
            let mut next = HashMap::clone(current);
            next.extend(incoming.iter().map(|(system, url)| (*system, url.clone())));
            Arc::new(next)
        });
    }
}

impl std::fmt::Display for EndpointTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EndpointTable[systems=({} entries), protocol={}]",
            self.len(),
            self.protocol
        )
    }
}

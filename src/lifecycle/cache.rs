//! Identity cache: native address to wrapper

use super::instance::Instance;
use crate::bridge::BridgeStats;
use crate::logging::log_evict;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Strong wrapper entries, removed only when the native object is
/// deallocated
pub(crate) struct IdentityCache {
    entries: DashMap<usize, Instance>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, address: usize) -> Option<Instance> {
        self.entries.get(&address).map(|entry| entry.value().clone())
    }

    /// Cached wrapper, or a new one from `make`; the flag is true for the
    /// caller that inserted
    pub fn get_or_insert(&self, address: usize, make: impl FnOnce() -> Instance) -> (Instance, bool) {
        match self.entries.entry(address) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(slot) => (slot.insert(make()).value().clone(), true),
        }
    }

    /// Drop the wrapper for a deallocated object and mark it dead
    pub fn evict(&self, address: usize, stats: &BridgeStats) -> bool {
        match self.entries.remove(&address) {
            Some((_, instance)) => {
                instance.mark_dead();
                BridgeStats::bump(&stats.wrappers_evicted);
                log_evict(address);
                true
            }
            None => false,
        }
    }
}

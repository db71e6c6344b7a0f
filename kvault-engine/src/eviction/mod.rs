//! # Eviction Policies
//!
//! Purpose: A uniform contract over the four tracker kinds named in
//! distilled spec §4.4 (LRU, LFU, TTL, Random), each usable under either
//! the `allkeys` or `volatile` scope. Eviction trackers reference keys by
//! their byte-string identity, not by pointer into the dictionary
//! (distilled §9: "this avoids cycles between trackers and entities and
//! makes 'remove from dict' -> 'remove from tracker' a plain call").

mod lfu;
mod lru;
mod random;
mod ttl;

pub use lfu::LfuTracker;
pub use lru::LruTracker;
pub use random::RandomTracker;
pub use ttl::TtlTracker;

use kvault_common::{EvictionKind, EvictionScope, MaxMemoryPolicy};

/// Uniform contract every eviction policy implements.
pub trait EvictionTracker: Send {
    /// Called on key read (hit).
    fn record_access(&mut self, key: &[u8]);
    /// Called on key insert or value replace.
    fn record_update(&mut self, key: &[u8]);
    /// Called on key removal (explicit delete, expiry, or prior eviction).
    fn record_delete(&mut self, key: &[u8]);
    /// Returns up to `n` victim keys, removing them from the tracker.
    fn evict(&mut self, n: usize) -> Vec<Vec<u8>>;
    /// Clears all tracked state.
    fn reset(&mut self);
    /// Number of keys currently tracked.
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Called whenever a key's expiration is set or replaced. Only the
    /// TTL tracker acts on this; every other tracker ignores it, since
    /// their ordering keys (recency, frequency) are unrelated to expiry.
    fn note_deadline(&mut self, _key: &[u8], _deadline: std::time::Instant) {}

    /// Called when a key's expiration is cleared (`PERSIST`) without the
    /// key itself being deleted. Only the TTL tracker acts on this.
    fn clear_deadline(&mut self, _key: &[u8]) {}
}

/// A tracker that never evicts anything — backs `noeviction`.
pub struct NoEvictionTracker;

impl EvictionTracker for NoEvictionTracker {
    fn record_access(&mut self, _key: &[u8]) {}
    fn record_update(&mut self, _key: &[u8]) {}
    fn record_delete(&mut self, _key: &[u8]) {}
    fn evict(&mut self, _n: usize) -> Vec<Vec<u8>> {
        Vec::new()
    }
    fn reset(&mut self) {}
    fn len(&self) -> usize {
        0
    }
}

/// Whether a policy only considers keys that carry an expiration
/// ("volatile") or every key ("allkeys").
pub fn policy_scope(policy: MaxMemoryPolicy) -> Option<EvictionScope> {
    match policy {
        MaxMemoryPolicy::NoEviction => None,
        MaxMemoryPolicy::Scoped(scope, _) => Some(scope),
    }
}

/// Builds the tracker implementation for a configured policy.
pub fn build_tracker(policy: MaxMemoryPolicy) -> Box<dyn EvictionTracker> {
    match policy {
        MaxMemoryPolicy::NoEviction => Box::new(NoEvictionTracker),
        MaxMemoryPolicy::Scoped(_, EvictionKind::Lru) => Box::new(LruTracker::new()),
        MaxMemoryPolicy::Scoped(_, EvictionKind::Lfu) => Box::new(LfuTracker::new()),
        MaxMemoryPolicy::Scoped(_, EvictionKind::Random) => Box::new(RandomTracker::new()),
        MaxMemoryPolicy::Scoped(_, EvictionKind::Ttl) => Box::new(TtlTracker::new()),
    }
}

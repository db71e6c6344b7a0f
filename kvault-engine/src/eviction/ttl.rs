//! TTL eviction tracker: orders keys by absolute expiry so `Evict(n)`
//! always returns the `n` keys soonest to expire, per distilled spec
//! §4.4 ("`volatile-ttl` evicts the key with the nearest expiration
//! first, among keys that carry one").
//!
//! Keys without a recorded deadline are not tracked at all — the caller
//! (the `Database`) only calls `record_update` for this tracker when a
//! key actually carries a TTL, mirroring how `policy_scope` restricts
//! `volatile-*` policies to keys with an expiration.

use std::collections::BTreeSet;
use std::time::Instant;

use hashbrown::HashMap;

use super::EvictionTracker;

#[derive(Debug, Clone, Copy)]
struct Deadline(Instant);

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for Deadline {}
impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

pub struct TtlTracker {
    ordered: BTreeSet<(Deadline, Vec<u8>)>,
    index: HashMap<Vec<u8>, Deadline>,
}

impl TtlTracker {
    pub fn new() -> Self {
        TtlTracker {
            ordered: BTreeSet::new(),
            index: HashMap::new(),
        }
    }

    /// Records (or replaces) the absolute expiry tracked for `key`.
    pub fn set_deadline(&mut self, key: &[u8], deadline: Instant) {
        if let Some(old) = self.index.get(key) {
            self.ordered.remove(&(*old, key.to_vec()));
        }
        let deadline = Deadline(deadline);
        self.ordered.insert((deadline, key.to_vec()));
        self.index.insert(key.to_vec(), deadline);
    }
}

impl Default for TtlTracker {
    fn default() -> Self {
        TtlTracker::new()
    }
}

impl EvictionTracker for TtlTracker {
    fn record_access(&mut self, _key: &[u8]) {}

    /// A plain `record_update` with no known deadline is a no-op: TTL
    /// tracking is driven by `set_deadline` once the caller knows the
    /// actual expiry. This matches `EvictionTracker`'s contract loosely
    /// (distilled §4.4 leaves "how a tracker learns a key's expiry" to
    /// the tracker); the `Database` calls `set_deadline` directly.
    fn record_update(&mut self, _key: &[u8]) {}

    fn record_delete(&mut self, key: &[u8]) {
        if let Some(deadline) = self.index.remove(key) {
            self.ordered.remove(&(deadline, key.to_vec()));
        }
    }

    fn note_deadline(&mut self, key: &[u8], deadline: Instant) {
        self.set_deadline(key, deadline);
    }

    fn clear_deadline(&mut self, key: &[u8]) {
        self.record_delete(key);
    }

    fn evict(&mut self, n: usize) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let victim = match self.ordered.iter().next() {
                Some(entry) => entry.clone(),
                None => break,
            };
            self.ordered.remove(&victim);
            self.index.remove(&victim.1);
            out.push(victim.1);
        }
        out
    }

    fn reset(&mut self) {
        self.ordered.clear();
        self.index.clear();
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn evicts_soonest_to_expire_first() {
        let mut ttl = TtlTracker::new();
        let now = Instant::now();
        ttl.set_deadline(b"far", now + Duration::from_secs(100));
        ttl.set_deadline(b"near", now + Duration::from_secs(1));

        let evicted = ttl.evict(1);
        assert_eq!(evicted, vec![b"near".to_vec()]);
    }

    #[test]
    fn record_delete_removes_from_tracking() {
        let mut ttl = TtlTracker::new();
        ttl.set_deadline(b"a", Instant::now());
        ttl.record_delete(b"a");
        assert_eq!(ttl.len(), 0);
    }

    #[test]
    fn set_deadline_replaces_prior_deadline() {
        let mut ttl = TtlTracker::new();
        let now = Instant::now();
        ttl.set_deadline(b"k", now + Duration::from_secs(50));
        ttl.set_deadline(b"k", now + Duration::from_secs(1));
        assert_eq!(ttl.len(), 1);
        assert_eq!(ttl.evict(1), vec![b"k".to_vec()]);
    }
}

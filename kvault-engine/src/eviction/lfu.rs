//! LFU eviction tracker: keys ordered by `(frequency, last_access_tick)`
//! so that evicting the minimum always picks the least-frequently-used
//! key, breaking ties in favor of the one untouched longest (distilled
//! spec §4.4: "Access increments frequency and fixes the heap. Evict
//! pops. Insertions above capacity evict the least-frequent.").
//!
//! There is no direct teacher counterpart (the teacher's cache is
//! LRU-only); this is built in the teacher's index-plus-ordering-structure
//! idiom (as `dict.rs`'s `ShardedDict` and `zset.rs`'s `SortedSet` both
//! do), swapping the ordering key for `(frequency, tick)`.

use std::collections::BTreeSet;

use hashbrown::HashMap;

use super::EvictionTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Freq(u64, u64);

pub struct LfuTracker {
    ordered: BTreeSet<(Freq, Vec<u8>)>,
    index: HashMap<Vec<u8>, Freq>,
    clock: u64,
}

impl LfuTracker {
    pub fn new() -> Self {
        LfuTracker {
            ordered: BTreeSet::new(),
            index: HashMap::new(),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn bump(&mut self, key: &[u8]) {
        let now = self.tick();
        if let Some(&old) = self.index.get(key) {
            self.ordered.remove(&(old, key.to_vec()));
            let updated = Freq(old.0 + 1, now);
            self.ordered.insert((updated, key.to_vec()));
            self.index.insert(key.to_vec(), updated);
        } else {
            let fresh = Freq(1, now);
            self.ordered.insert((fresh, key.to_vec()));
            self.index.insert(key.to_vec(), fresh);
        }
    }
}

impl Default for LfuTracker {
    fn default() -> Self {
        LfuTracker::new()
    }
}

impl EvictionTracker for LfuTracker {
    fn record_access(&mut self, key: &[u8]) {
        self.bump(key);
    }

    fn record_update(&mut self, key: &[u8]) {
        self.bump(key);
    }

    fn record_delete(&mut self, key: &[u8]) {
        if let Some(freq) = self.index.remove(key) {
            self.ordered.remove(&(freq, key.to_vec()));
        }
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
        self.clock = 0;
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_frequently_used_first() {
        let mut lfu = LfuTracker::new();
        lfu.record_update(b"a");
        lfu.record_update(b"b");
        lfu.record_access(b"a");
        lfu.record_access(b"a");

        let evicted = lfu.evict(1);
        assert_eq!(evicted, vec![b"b".to_vec()]);
    }

    #[test]
    fn ties_broken_by_older_access() {
        let mut lfu = LfuTracker::new();
        lfu.record_update(b"old");
        lfu.record_update(b"new");

        let evicted = lfu.evict(1);
        assert_eq!(evicted, vec![b"old".to_vec()]);
    }

    #[test]
    fn record_delete_removes_from_tracking() {
        let mut lfu = LfuTracker::new();
        lfu.record_update(b"a");
        lfu.record_delete(b"a");
        assert_eq!(lfu.len(), 0);
    }
}

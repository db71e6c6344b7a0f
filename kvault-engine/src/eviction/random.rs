//! Random eviction tracker: tracked keys live in a flat `Vec`, and
//! `evict(n)` samples `n` distinct indices uniformly without replacement
//! via `rand`, per distilled spec §4.4 ("`allkeys-random`/`volatile-random`
//! pick uniformly among eligible keys with no auxiliary ordering
//! structure").

use hashbrown::HashMap;
use rand::seq::index::sample;
use rand::thread_rng;

use super::EvictionTracker;

pub struct RandomTracker {
    keys: Vec<Vec<u8>>,
    index: HashMap<Vec<u8>, usize>,
}

impl RandomTracker {
    pub fn new() -> Self {
        RandomTracker {
            keys: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn remove_at(&mut self, idx: usize) -> Vec<u8> {
        let last = self.keys.len() - 1;
        self.keys.swap(idx, last);
        let removed = self.keys.pop().expect("non-empty");
        if idx < self.keys.len() {
            let moved = self.keys[idx].clone();
            self.index.insert(moved, idx);
        }
        self.index.remove(&removed);
        removed
    }
}

impl Default for RandomTracker {
    fn default() -> Self {
        RandomTracker::new()
    }
}

impl EvictionTracker for RandomTracker {
    fn record_access(&mut self, _key: &[u8]) {}

    fn record_update(&mut self, key: &[u8]) {
        if !self.index.contains_key(key) {
            self.index.insert(key.to_vec(), self.keys.len());
            self.keys.push(key.to_vec());
        }
    }

    fn record_delete(&mut self, key: &[u8]) {
        if let Some(idx) = self.index.get(key).copied() {
            self.remove_at(idx);
        }
    }

    fn evict(&mut self, n: usize) -> Vec<Vec<u8>> {
        let n = n.min(self.keys.len());
        if n == 0 {
            return Vec::new();
        }
        let mut rng = thread_rng();
        let mut indices: Vec<usize> = sample(&mut rng, self.keys.len(), n).into_vec();
        indices.sort_unstable_by(|a, b| b.cmp(a));

        let mut out = Vec::with_capacity(n);
        for idx in indices {
            out.push(self.remove_at(idx));
        }
        out
    }

    fn reset(&mut self) {
        self.keys.clear();
        self.index.clear();
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn evict_returns_distinct_tracked_keys() {
        let mut random = RandomTracker::new();
        random.record_update(b"a");
        random.record_update(b"b");
        random.record_update(b"c");

        let evicted = random.evict(2);
        assert_eq!(evicted.len(), 2);
        let unique: HashSet<_> = evicted.iter().collect();
        assert_eq!(unique.len(), 2);
        assert_eq!(random.len(), 1);
    }

    #[test]
    fn evict_more_than_len_returns_all() {
        let mut random = RandomTracker::new();
        random.record_update(b"a");
        random.record_update(b"b");

        let evicted = random.evict(10);
        assert_eq!(evicted.len(), 2);
        assert_eq!(random.len(), 0);
    }

    #[test]
    fn record_delete_removes_from_tracking() {
        let mut random = RandomTracker::new();
        random.record_update(b"a");
        random.record_delete(b"a");
        assert_eq!(random.len(), 0);
    }
}

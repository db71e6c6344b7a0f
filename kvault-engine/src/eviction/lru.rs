//! LRU eviction tracker: a doubly-linked list of keys plus a map from key
//! to list node, index-based to avoid heap pointers — directly the
//! teacher's `hkv-engine::memory::ShardInner` node-arena pattern
//! (`lru_remove`/`lru_push_back`/`touch`/`pop_lru`), generalized from "the
//! whole cache is an LRU arena" to "one pluggable eviction policy."

use hashbrown::HashMap;

use super::EvictionTracker;

struct Node {
    key: Vec<u8>,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct LruTracker {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    index: HashMap<Vec<u8>, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LruTracker {
    pub fn new() -> Self {
        LruTracker {
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.nodes[idx].as_ref().expect("node exists");
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_back(&mut self, idx: usize) {
        let tail = self.tail;
        if let Some(node) = self.nodes[idx].as_mut() {
            node.prev = tail;
            node.next = None;
        }
        match tail {
            Some(t) => self.nodes[t].as_mut().unwrap().next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    fn touch(&mut self, idx: usize) {
        if self.tail == Some(idx) {
            return;
        }
        self.detach(idx);
        self.push_back(idx);
    }

    fn insert_new(&mut self, key: Vec<u8>) {
        let idx = self.free.pop().unwrap_or_else(|| {
            self.nodes.push(None);
            self.nodes.len() - 1
        });
        self.nodes[idx] = Some(Node {
            key: key.clone(),
            prev: None,
            next: None,
        });
        self.push_back(idx);
        self.index.insert(key, idx);
    }

    fn remove_idx(&mut self, idx: usize) {
        self.detach(idx);
        if let Some(node) = self.nodes[idx].take() {
            self.index.remove(&node.key);
        }
        self.free.push(idx);
    }
}

impl Default for LruTracker {
    fn default() -> Self {
        LruTracker::new()
    }
}

impl EvictionTracker for LruTracker {
    fn record_access(&mut self, key: &[u8]) {
        if let Some(&idx) = self.index.get(key) {
            self.touch(idx);
        } else {
            self.insert_new(key.to_vec());
        }
    }

    fn record_update(&mut self, key: &[u8]) {
        self.record_access(key);
    }

    fn record_delete(&mut self, key: &[u8]) {
        if let Some(&idx) = self.index.get(key) {
            self.remove_idx(idx);
        }
    }

    fn evict(&mut self, n: usize) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let idx = match self.head {
                Some(idx) => idx,
                None => break,
            };
            let key = self.nodes[idx].as_ref().unwrap().key.clone();
            self.remove_idx(idx);
            out.push(key);
        }
        out
    }

    fn reset(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_first() {
        let mut lru = LruTracker::new();
        lru.record_update(b"a");
        lru.record_update(b"b");
        lru.record_update(b"c");
        lru.record_access(b"a");

        let evicted = lru.evict(1);
        assert_eq!(evicted, vec![b"b".to_vec()]);
    }

    #[test]
    fn empty_tracker_evict_returns_empty() {
        let mut lru = LruTracker::new();
        assert_eq!(lru.evict(5), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn record_delete_removes_from_tracking() {
        let mut lru = LruTracker::new();
        lru.record_update(b"a");
        lru.record_delete(b"a");
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.evict(1), Vec::<Vec<u8>>::new());
    }
}

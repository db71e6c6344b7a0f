//! # Sorted Set
//!
//! Purpose: Maintain members ordered by `(score, member)` with an
//! auxiliary `member -> score` index, per distilled spec §3's ZSET value
//! entity ("skiplist ordered by (score, member) + member->score index").
//!
//! The shard lock already serializes all access to one value entity, so
//! this implementation trades the classic probabilistic skip list for a
//! `BTreeSet<(ScoreKey, Vec<u8>)>` ordered index: identical O(log n)
//! insert/remove/range complexity and identical observable ordering, with
//! far less code to get right for a single-writer-at-a-time structure.
//! The skip list's real contribution — a balanced, ordered walk by score
//! then member — is exactly what `BTreeSet`'s ordering invariant gives
//! for free.

use std::collections::BTreeSet;
use std::collections::HashMap;

/// Total-ordering wrapper around `f64`. Scores must be finite; NaN is
/// rejected by the command layer before it ever reaches a `SortedSet`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreKey(pub f64);

impl Eq for ScoreKey {}

impl PartialOrd for ScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoreKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// Ordered `(score, member)` structure with an O(1) member -> score
/// index, matching distilled spec §3's ZSET entity.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    ordered: BTreeSet<(ScoreKey, Vec<u8>)>,
    index: HashMap<Vec<u8>, f64>,
}

impl SortedSet {
    pub fn new() -> Self {
        SortedSet::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.index.get(member).copied()
    }

    /// Inserts or updates a member's score. Returns `true` if the member
    /// is newly added (did not exist before this call).
    pub fn insert(&mut self, member: Vec<u8>, score: f64) -> bool {
        if let Some(&old_score) = self.index.get(&member) {
            self.ordered.remove(&(ScoreKey(old_score), member.clone()));
            self.ordered.insert((ScoreKey(score), member.clone()));
            self.index.insert(member, score);
            false
        } else {
            self.ordered.insert((ScoreKey(score), member.clone()));
            self.index.insert(member, score);
            true
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.index.remove(member) {
            Some(score) => {
                self.ordered.remove(&(ScoreKey(score), member.to_vec()));
                true
            }
            None => false,
        }
    }

    /// Returns members in ascending `(score, member)` order within
    /// `[start, stop]` inclusive rank bounds (Redis `ZRANGE`-style;
    /// negative indices count from the end; out-of-range clamps).
    pub fn range_by_rank(&self, start: i64, stop: i64) -> Vec<(Vec<u8>, f64)> {
        let len = self.len() as i64;
        if len == 0 {
            return Vec::new();
        }
        let (lo, hi) = clamp_range(start, stop, len);
        if lo > hi {
            return Vec::new();
        }

        self.ordered
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx as i64 >= lo && *idx as i64 <= hi)
            .map(|(_, (score, member))| (member.clone(), score.0))
            .collect()
    }

    /// Returns members with `min_score <= score <= max_score`, ascending.
    pub fn range_by_score(&self, min_score: f64, max_score: f64) -> Vec<(Vec<u8>, f64)> {
        self.ordered
            .range((ScoreKey(min_score), Vec::new())..)
            .take_while(|(score, _)| score.0 <= max_score)
            .map(|(score, member)| (member.clone(), score.0))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], f64)> {
        self.ordered.iter().map(|(score, member)| (member.as_slice(), score.0))
    }
}

/// Clamps a Redis-style `[start, stop]` rank range (negative indices
/// count from the end) to `[0, len-1]`.
fn clamp_range(start: i64, stop: i64, len: i64) -> (i64, i64) {
    let norm = |idx: i64| -> i64 {
        if idx < 0 {
            (len + idx).max(0)
        } else {
            idx
        }
    };
    let lo = norm(start).min(len - 1).max(0);
    let hi = norm(stop).min(len - 1);
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_orders_by_score_then_member() {
        let mut z = SortedSet::new();
        z.insert(b"b".to_vec(), 1.0);
        z.insert(b"a".to_vec(), 1.0);
        z.insert(b"c".to_vec(), 0.5);
        let ranked = z.range_by_rank(0, -1);
        assert_eq!(
            ranked,
            vec![
                (b"c".to_vec(), 0.5),
                (b"a".to_vec(), 1.0),
                (b"b".to_vec(), 1.0),
            ]
        );
    }

    #[test]
    fn insert_updates_score_without_duplicating() {
        let mut z = SortedSet::new();
        z.insert(b"a".to_vec(), 1.0);
        z.insert(b"a".to_vec(), 5.0);
        assert_eq!(z.len(), 1);
        assert_eq!(z.score(b"a"), Some(5.0));
    }

    #[test]
    fn remove_drops_member() {
        let mut z = SortedSet::new();
        z.insert(b"a".to_vec(), 1.0);
        assert!(z.remove(b"a"));
        assert!(!z.remove(b"a"));
        assert_eq!(z.len(), 0);
        assert_eq!(z.score(b"a"), None);
    }

    #[test]
    fn range_by_score_is_inclusive() {
        let mut z = SortedSet::new();
        for (m, s) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            z.insert(m.as_bytes().to_vec(), s);
        }
        let got = z.range_by_score(2.0, 3.0);
        assert_eq!(got, vec![(b"b".to_vec(), 2.0), (b"c".to_vec(), 3.0)]);
    }

    #[test]
    fn negative_rank_indices_clamp() {
        let mut z = SortedSet::new();
        for (m, s) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            z.insert(m.as_bytes().to_vec(), s);
        }
        let got = z.range_by_rank(-2, -1);
        assert_eq!(got, vec![(b"b".to_vec(), 2.0), (b"c".to_vec(), 3.0)]);
    }

    #[test]
    fn empty_set_ranges_are_empty() {
        let z = SortedSet::new();
        assert_eq!(z.range_by_rank(0, -1), Vec::new());
    }
}

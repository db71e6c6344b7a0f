//! # Key Entry
//!
//! Purpose: Co-locate a key's value, expiration, and version inside one
//! record so that mutating all three happens under exactly one shard
//! lock acquisition, satisfying distilled spec §3's invariant that
//! "expiration map and eviction tracker mutations must occur inside the
//! same critical section as the dictionary mutation they describe."
//!
//! This mirrors the teacher's own `hkv-engine::memory::Node`, which
//! already bundles `value`, `expires_at`, and `size` into one struct
//! behind the shard lock; this type generalizes that bundle to also
//! carry the per-key version counter the distilled spec's WATCH/EXEC
//! engine needs.

use std::time::Instant;

use kvault_common::Version;

use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    pub expires_at: Option<Instant>,
    pub version: Version,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Entry {
            value,
            expires_at: None,
            version: Version::ZERO,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }
}

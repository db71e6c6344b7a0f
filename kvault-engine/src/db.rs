//! # Database
//!
//! Purpose: One logical keyspace (one of the `databases` configured
//! slots `SELECT`ed by index). Owns the sharded dictionary of
//! value+expiry+version `Entry` records, the eviction tracker chosen by
//! `maxmemory-policy`, and a running byte-usage counter — per distilled
//! spec §3/§4.3/§4.4.
//!
//! A `Database` does not own the time wheel: scheduling active
//! expiration callbacks is the `Store`'s job, since one wheel is shared
//! across every database (distilled spec §3, "the top-level Store owns
//! ... a shared TimeWheel driving active expiration across every
//! database"). A `Database` only ever applies expiry *lazily*, on direct
//! access, and exposes `expire_at`/`persist` for the `Store` to call
//! once it has scheduled (or cancelled) the matching wheel entry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use kvault_common::{EvictionScope, MaxMemoryPolicy, Version};

use crate::dict::ShardedDict;
use crate::entry::Entry;
use crate::eviction::{build_tracker, policy_scope, EvictionTracker};
use crate::value::{Value, ValueKind};

/// Tri-state result of a TTL query, mirroring Redis `TTL`/`PTTL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    Missing,
    NoExpiry,
    ExpiresIn(std::time::Duration),
}

pub struct Database {
    dict: ShardedDict<Entry>,
    tracker: Mutex<Box<dyn EvictionTracker>>,
    scope: Option<EvictionScope>,
    used_bytes: AtomicUsize,
}

impl Database {
    pub fn new(shard_count: usize, policy: MaxMemoryPolicy) -> Self {
        Database {
            dict: ShardedDict::new(shard_count),
            tracker: Mutex::new(build_tracker(policy)),
            scope: policy_scope(policy),
            used_bytes: AtomicUsize::new(0),
        }
    }

    fn tracked(&self, has_expiry: bool) -> bool {
        match self.scope {
            None => false,
            Some(EvictionScope::AllKeys) => true,
            Some(EvictionScope::Volatile) => has_expiry,
        }
    }

    fn account_insert(&self, key: &[u8], value: &Value) {
        let bytes = key.len() + value.approx_bytes();
        self.used_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn account_remove(&self, key: &[u8], value: &Value) {
        let bytes = key.len() + value.approx_bytes();
        self.used_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Removes `key` if its entry is lazily expired at `now`, bookkeeping
    /// memory and the eviction tracker. Returns `true` if it was removed.
    fn expire_if_due(&self, key: &[u8], now: Instant) -> bool {
        let mut removed = None;
        self.dict.with_mut(key, |entry: &mut Entry| {
            if entry.is_expired(now) {
                removed = Some(());
            }
        });
        if removed.is_some() {
            if let Some(entry) = self.dict.remove(key) {
                self.account_remove(key, &entry.value);
                self.tracker.lock().record_delete(key);
            }
            true
        } else {
            false
        }
    }

    /// Reads a key, applying lazy expiration and recording an access for
    /// the configured eviction policy.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        let now = Instant::now();
        self.expire_if_due(key, now);
        let entry = self.dict.get(key)?;
        if self.tracked(entry.expires_at.is_some()) {
            self.tracker.lock().record_access(key);
        }
        Some(entry)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    pub fn type_of(&self, key: &[u8]) -> Option<ValueKind> {
        self.get(key).map(|entry| entry.value.kind())
    }

    /// Unconditionally replaces `key`'s value, bumping its version and
    /// clearing any prior expiry. Returns the version assigned.
    pub fn set(&self, key: Vec<u8>, value: Value) -> Version {
        let now = Instant::now();
        self.expire_if_due(&key, now);

        let mut version = Version::ZERO;
        let mut old_value = None;
        if let Some(existing) = self.dict.get(&key) {
            old_value = Some(existing.value);
            version = existing.version;
        }
        version.increment();

        let entry = Entry {
            value,
            expires_at: None,
            version,
        };
        if let Some(old_value) = old_value {
            self.account_remove(&key, &old_value);
        }
        self.account_insert(&key, &entry.value);
        self.dict.put(key.clone(), entry);
        if self.tracked(false) {
            self.tracker.lock().record_update(&key);
        }
        version
    }

    /// Like `set`, but the new key carries an absolute expiry from the
    /// start (`SET ... EX/PX`).
    pub fn set_with_expiry(&self, key: Vec<u8>, value: Value, expires_at: Instant) -> Version {
        let version = self.set(key.clone(), value);
        self.dict.with_mut(&key, |entry| entry.expires_at = Some(expires_at));
        if self.tracked(true) {
            let mut tracker = self.tracker.lock();
            tracker.note_deadline(&key, expires_at);
            if self.scope == Some(EvictionScope::Volatile) {
                tracker.record_update(&key);
            }
        }
        version
    }

    /// Mutates (or creates, via `default`) the value stored at `key`
    /// in place, bumping its version and re-accounting its byte size.
    /// Used by collection commands (`HSET`, `LPUSH`, `SADD`, `ZADD`, ...).
    pub fn mutate_or_insert<F, R>(&self, key: &[u8], default: impl FnOnce() -> Value, f: F) -> R
    where
        F: FnOnce(&mut Value) -> R,
    {
        let now = Instant::now();
        self.expire_if_due(key, now);

        let mut before_bytes = None;
        let mut newly_inserted = false;
        let result = {
            let existed = self.dict.get(key).is_some();
            if !existed {
                newly_inserted = true;
            }
            self.dict.with_mut_or_insert_with(
                key,
                || {
                    Entry::new(default())
                },
                |entry: &mut Entry| {
                    before_bytes = Some(entry.value.approx_bytes());
                    let out = f(&mut entry.value);
                    entry.version.increment();
                    out
                },
            )
        };

        let after_bytes = self
            .dict
            .get(key)
            .map(|entry| entry.value.approx_bytes())
            .unwrap_or(0);
        match before_bytes {
            Some(before) if after_bytes >= before => {
                self.used_bytes.fetch_add(after_bytes - before, Ordering::Relaxed);
            }
            Some(before) => {
                self.used_bytes.fetch_sub(before - after_bytes, Ordering::Relaxed);
            }
            None => {
                self.used_bytes.fetch_add(key.len() + after_bytes, Ordering::Relaxed);
            }
        }

        let has_expiry = self.dict.get(key).and_then(|e| e.expires_at).is_some();
        if self.tracked(has_expiry) {
            let mut tracker = self.tracker.lock();
            if newly_inserted {
                tracker.record_update(key);
            } else {
                tracker.record_access(key);
            }
        }

        result
    }

    /// Deletes `key` if its value is now an empty collection — the
    /// common Redis behavior where the last `SREM`/`LPOP`/`HDEL` on a
    /// collection removes the key entirely.
    pub fn delete_if_empty(&self, key: &[u8]) {
        let empty = self
            .dict
            .get(key)
            .map(|entry| entry.value.cardinality() == 0)
            .unwrap_or(false);
        if empty {
            self.remove(key);
        }
    }

    pub fn remove(&self, key: &[u8]) -> Option<Entry> {
        let entry = self.dict.remove(key)?;
        self.account_remove(key, &entry.value);
        self.tracker.lock().record_delete(key);
        Some(entry)
    }

    /// Sets an absolute expiry on an already-present key. Returns `false`
    /// if the key is missing (or lazily expired).
    pub fn expire_at(&self, key: &[u8], deadline: Instant) -> bool {
        let now = Instant::now();
        if self.expire_if_due(key, now) || self.dict.get(key).is_none() {
            return false;
        }
        self.dict.with_mut(key, |entry| entry.expires_at = Some(deadline));
        if self.tracked(true) {
            let mut tracker = self.tracker.lock();
            tracker.note_deadline(key, deadline);
            if self.scope == Some(EvictionScope::Volatile) {
                tracker.record_update(key);
            }
        }
        true
    }

    /// Clears any expiry on `key`. Returns `true` if it had one.
    pub fn persist(&self, key: &[u8]) -> bool {
        let now = Instant::now();
        if self.expire_if_due(key, now) {
            return false;
        }
        let had_expiry = self
            .dict
            .with_mut(key, |entry| {
                let had = entry.expires_at.is_some();
                entry.expires_at = None;
                had
            })
            .unwrap_or(false);
        if had_expiry {
            let mut tracker = self.tracker.lock();
            tracker.clear_deadline(key);
            if self.scope == Some(EvictionScope::Volatile) {
                tracker.record_delete(key);
            }
        }
        had_expiry
    }

    pub fn ttl(&self, key: &[u8]) -> TtlStatus {
        let now = Instant::now();
        if self.expire_if_due(key, now) {
            return TtlStatus::Missing;
        }
        match self.dict.get(key) {
            None => TtlStatus::Missing,
            Some(entry) => match entry.expires_at {
                None => TtlStatus::NoExpiry,
                Some(deadline) => {
                    if deadline <= now {
                        TtlStatus::Missing
                    } else {
                        TtlStatus::ExpiresIn(deadline - now)
                    }
                }
            },
        }
    }

    pub fn version_of(&self, key: &[u8]) -> Option<Version> {
        self.dict.get(key).map(|entry| entry.version)
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes.load(Ordering::Relaxed)
    }

    pub fn all_keys(&self) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        self.dict.for_each(|k, _| keys.push(k.to_vec()));
        keys
    }

    pub fn random_key(&self) -> Option<Vec<u8>> {
        self.dict.random_keys(1).into_iter().next()
    }

    pub fn clear(&self) {
        self.dict.clear();
        self.tracker.lock().reset();
        self.used_bytes.store(0, Ordering::Relaxed);
    }

    /// Pops and removes one victim key chosen by the configured eviction
    /// policy. Returns `None` if the policy is `noeviction` or nothing is
    /// tracked.
    pub fn evict_one(&self) -> Option<Vec<u8>> {
        let victim = self.tracker.lock().evict(1).into_iter().next()?;
        if let Some(entry) = self.dict.remove(&victim) {
            self.account_remove(&victim, &entry.value);
        }
        Some(victim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvault_common::EvictionKind;
    use std::time::Duration;

    #[test]
    fn set_then_get_roundtrips() {
        let db = Database::new(4, MaxMemoryPolicy::NoEviction);
        db.set(b"k".to_vec(), Value::Str(b"v".to_vec()));
        let entry = db.get(b"k").unwrap();
        assert_eq!(entry.value.as_str().unwrap(), b"v");
    }

    #[test]
    fn set_bumps_version_on_replace() {
        let db = Database::new(2, MaxMemoryPolicy::NoEviction);
        db.set(b"k".to_vec(), Value::Str(b"1".to_vec()));
        let v1 = db.version_of(b"k").unwrap();
        db.set(b"k".to_vec(), Value::Str(b"2".to_vec()));
        let v2 = db.version_of(b"k").unwrap();
        assert!(v2.get() > v1.get());
    }

    #[test]
    fn expire_at_then_lazy_expiry_removes_key() {
        let db = Database::new(2, MaxMemoryPolicy::NoEviction);
        db.set(b"k".to_vec(), Value::Str(b"v".to_vec()));
        db.expire_at(b"k", Instant::now() - Duration::from_secs(1));
        assert!(db.get(b"k").is_none());
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn persist_clears_expiry() {
        let db = Database::new(2, MaxMemoryPolicy::NoEviction);
        db.set(b"k".to_vec(), Value::Str(b"v".to_vec()));
        db.expire_at(b"k", Instant::now() + Duration::from_secs(100));
        assert!(db.persist(b"k"));
        assert_eq!(db.ttl(b"k"), TtlStatus::NoExpiry);
    }

    #[test]
    fn mutate_or_insert_creates_collection_and_tracks_bytes() {
        let db = Database::new(2, MaxMemoryPolicy::NoEviction);
        db.mutate_or_insert(
            b"h",
            || Value::Hash(Default::default()),
            |value| {
                value.as_hash_mut().unwrap().insert(b"f".to_vec(), b"v".to_vec());
            },
        );
        let entry = db.get(b"h").unwrap();
        assert_eq!(entry.value.as_hash().unwrap().get(b"f".as_slice()), Some(&b"v".to_vec()));
        assert!(db.used_bytes() > 0);
    }

    #[test]
    fn delete_if_empty_removes_exhausted_collection() {
        let db = Database::new(2, MaxMemoryPolicy::NoEviction);
        db.mutate_or_insert(
            b"s",
            || Value::Set(Default::default()),
            |value| {
                value.as_set_mut().unwrap().insert(b"m".to_vec());
            },
        );
        db.mutate_or_insert(b"s", || Value::Set(Default::default()), |value| {
            value.as_set_mut().unwrap().remove(b"m".as_slice());
        });
        db.delete_if_empty(b"s");
        assert!(db.get(b"s").is_none());
    }

    #[test]
    fn evict_one_picks_lru_victim() {
        let db = Database::new(2, MaxMemoryPolicy::Scoped(EvictionScope::AllKeys, EvictionKind::Lru));
        db.set(b"a".to_vec(), Value::Str(b"1".to_vec()));
        db.set(b"b".to_vec(), Value::Str(b"2".to_vec()));
        db.get(b"a");
        let victim = db.evict_one();
        assert_eq!(victim, Some(b"b".to_vec()));
    }

    #[test]
    fn noeviction_policy_never_evicts() {
        let db = Database::new(2, MaxMemoryPolicy::NoEviction);
        db.set(b"a".to_vec(), Value::Str(b"1".to_vec()));
        assert_eq!(db.evict_one(), None);
    }
}

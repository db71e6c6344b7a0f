//! # Transaction Engine
//!
//! Purpose: `MULTI`/`EXEC`/`DISCARD`/`WATCH`/`UNWATCH`, implemented as
//! optimistic concurrency control over the per-key `Version` counter
//! already carried by every `Entry` — per distilled spec §4.5: "per
//! session `{Normal, Queueing, Dirty}` state machine, queued argv, watch
//! set of key -> snapshot version. EXEC validates watched versions
//! against current versions before executing the queue."
//!
//! One `Transaction` belongs to one connection session; it holds no
//! locks on the store between `WATCH` and `EXEC` — staleness is
//! detected, not prevented, which is what makes this optimistic rather
//! than pessimistic concurrency control.

use kvault_common::Version;

use crate::store::Store;

/// A session's transaction state (distilled spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Commands execute immediately.
    Normal,
    /// Inside `MULTI`; commands are queued, not executed.
    Queueing,
    /// Inside `MULTI`, but a queued command already failed a syntax or
    /// arity check — the transaction is doomed and `EXEC` must abort.
    Dirty,
}

/// Outcome of revalidating a transaction's watch set at `EXEC` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Every watched key's version still matches its snapshot.
    Clean,
    /// At least one watched key changed (or was created/deleted) since
    /// `WATCH`.
    Aborted,
}

/// Per-session transaction state: queued command argv, the watch set,
/// and the `{Normal, Queueing, Dirty}` state machine.
pub struct Transaction {
    state: SessionState,
    queue: Vec<Vec<Vec<u8>>>,
    watches: Vec<(u16, Vec<u8>, Version)>,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction {
            state: SessionState::Normal,
            queue: Vec::new(),
            watches: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, SessionState::Normal)
    }

    /// Enters `MULTI`. A nested `MULTI` is the caller's error to report;
    /// this method only tracks state, it does not police nesting.
    pub fn begin(&mut self) {
        self.state = SessionState::Queueing;
        self.queue.clear();
    }

    /// Appends a command to the queue. Call `mark_dirty` instead if the
    /// command fails arity/syntax validation before queueing.
    pub fn queue_command(&mut self, argv: Vec<Vec<u8>>) {
        self.queue.push(argv);
    }

    pub fn mark_dirty(&mut self) {
        self.state = SessionState::Dirty;
    }

    /// Records a key to watch, snapshotting its current version (or
    /// `Version::ZERO` if absent — distilled §9: "a key's absence is
    /// itself a distinct version from the caller's point of view").
    pub fn watch(&mut self, store: &Store, db_index: u16, key: &[u8]) {
        let version = store
            .get(db_index, key)
            .ok()
            .flatten()
            .map(|entry| entry.version)
            .unwrap_or(Version::ZERO);
        self.watches.retain(|(db, k, _)| !(*db == db_index && k == key));
        self.watches.push((db_index, key.to_vec(), version));
    }

    /// Clears the watch set without touching queued commands or state
    /// (`UNWATCH` is valid both inside and outside `MULTI`).
    pub fn unwatch(&mut self) {
        self.watches.clear();
    }

    /// Revalidates every watched key's version against the store. Does
    /// not itself clear anything; the caller drains the transaction via
    /// `take_queue`/`reset` regardless of outcome, since `EXEC` always
    /// ends a transaction whether it aborts or commits.
    pub fn check_watches(&self, store: &Store) -> WatchOutcome {
        for (db_index, key, snapshot) in &self.watches {
            let current = store
                .get(*db_index, key)
                .ok()
                .flatten()
                .map(|entry| entry.version)
                .unwrap_or(Version::ZERO);
            if current != *snapshot {
                return WatchOutcome::Aborted;
            }
        }
        WatchOutcome::Clean
    }

    /// Drains the queued commands and resets to `Normal`, clearing
    /// watches. Used by both `EXEC` and `DISCARD`.
    pub fn reset(&mut self) -> Vec<Vec<Vec<u8>>> {
        self.state = SessionState::Normal;
        self.watches.clear();
        std::mem::take(&mut self.queue)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvault_common::MaxMemoryPolicy;
    use crate::value::Value;

    #[test]
    fn begin_then_queue_then_reset_roundtrip() {
        let mut tx = Transaction::new();
        tx.begin();
        assert_eq!(tx.state(), SessionState::Queueing);
        tx.queue_command(vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()]);
        assert_eq!(tx.queue_len(), 1);
        let queued = tx.reset();
        assert_eq!(queued.len(), 1);
        assert_eq!(tx.state(), SessionState::Normal);
    }

    #[test]
    fn dirty_state_after_bad_queue() {
        let mut tx = Transaction::new();
        tx.begin();
        tx.mark_dirty();
        assert_eq!(tx.state(), SessionState::Dirty);
    }

    #[test]
    fn unchanged_watch_passes_check() {
        let store = Store::new(1, 2, MaxMemoryPolicy::NoEviction);
        store.set(0, b"k".to_vec(), Value::Str(b"v".to_vec())).unwrap();

        let mut tx = Transaction::new();
        tx.watch(&store, 0, b"k");
        assert_eq!(tx.check_watches(&store), WatchOutcome::Clean);
        store.shutdown();
    }

    #[test]
    fn modified_watch_aborts() {
        let store = Store::new(1, 2, MaxMemoryPolicy::NoEviction);
        store.set(0, b"k".to_vec(), Value::Str(b"v".to_vec())).unwrap();

        let mut tx = Transaction::new();
        tx.watch(&store, 0, b"k");
        store.set(0, b"k".to_vec(), Value::Str(b"v2".to_vec())).unwrap();
        assert_eq!(tx.check_watches(&store), WatchOutcome::Aborted);
        store.shutdown();
    }

    #[test]
    fn watch_on_absent_key_then_create_aborts() {
        let store = Store::new(1, 2, MaxMemoryPolicy::NoEviction);
        let mut tx = Transaction::new();
        tx.watch(&store, 0, b"missing");
        store.set(0, b"missing".to_vec(), Value::Str(b"now-exists".to_vec())).unwrap();
        assert_eq!(tx.check_watches(&store), WatchOutcome::Aborted);
        store.shutdown();
    }

    #[test]
    fn unwatch_clears_watch_set() {
        let store = Store::new(1, 2, MaxMemoryPolicy::NoEviction);
        store.set(0, b"k".to_vec(), Value::Str(b"v".to_vec())).unwrap();
        let mut tx = Transaction::new();
        tx.watch(&store, 0, b"k");
        tx.unwatch();
        store.set(0, b"k".to_vec(), Value::Str(b"v2".to_vec())).unwrap();
        assert_eq!(tx.check_watches(&store), WatchOutcome::Clean);
        store.shutdown();
    }
}

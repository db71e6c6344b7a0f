//! # Slow Log
//!
//! Purpose: A fixed-capacity ring buffer recording commands whose
//! execution time exceeded a configurable microsecond threshold —
//! peripheral per distilled spec §1, mirroring `SLOWLOG GET`/`RESET`/`LEN`.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

const DEFAULT_CAPACITY: usize = 128;
const DEFAULT_THRESHOLD_US: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct SlowLogEntry {
    pub id: u64,
    pub timestamp_unix_secs: u64,
    pub duration: Duration,
    pub argv: Vec<Vec<u8>>,
}

pub struct SlowLog {
    capacity: usize,
    threshold_us: Mutex<u64>,
    entries: Mutex<VecDeque<SlowLogEntry>>,
    next_id: Mutex<u64>,
}

impl SlowLog {
    pub fn new() -> Self {
        SlowLog::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SlowLog {
            capacity: capacity.max(1),
            threshold_us: Mutex::new(DEFAULT_THRESHOLD_US),
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            next_id: Mutex::new(0),
        }
    }

    pub fn set_threshold_us(&self, threshold_us: u64) {
        *self.threshold_us.lock() = threshold_us;
    }

    /// Records a command if it ran longer than the configured threshold.
    /// `timestamp_unix_secs` is supplied by the caller since this module
    /// never reads the wall clock itself.
    pub fn maybe_record(&self, argv: &[Vec<u8>], duration: Duration, timestamp_unix_secs: u64) {
        if duration.as_micros() as u64 <= *self.threshold_us.lock() {
            return;
        }
        let mut id_guard = self.next_id.lock();
        let id = *id_guard;
        *id_guard += 1;
        drop(id_guard);

        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(SlowLogEntry {
            id,
            timestamp_unix_secs,
            duration,
            argv: argv.to_vec(),
        });
    }

    /// Most recent entries first, matching `SLOWLOG GET`'s ordering.
    pub fn recent(&self, count: usize) -> Vec<SlowLogEntry> {
        self.entries.lock().iter().rev().take(count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        self.entries.lock().clear();
    }
}

impl Default for SlowLog {
    fn default() -> Self {
        SlowLog::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_commands_are_not_recorded() {
        let log = SlowLog::new();
        log.maybe_record(&[b"GET".to_vec()], Duration::from_micros(1), 0);
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn slow_commands_are_recorded_and_ordered_newest_first() {
        let log = SlowLog::with_capacity(4);
        log.set_threshold_us(0);
        log.maybe_record(&[b"SLOW1".to_vec()], Duration::from_micros(5), 1);
        log.maybe_record(&[b"SLOW2".to_vec()], Duration::from_micros(5), 2);
        let recent = log.recent(10);
        assert_eq!(recent[0].argv, vec![b"SLOW2".to_vec()]);
        assert_eq!(recent[1].argv, vec![b"SLOW1".to_vec()]);
    }

    #[test]
    fn ring_buffer_drops_oldest_past_capacity() {
        let log = SlowLog::with_capacity(2);
        log.set_threshold_us(0);
        for i in 0..3u8 {
            log.maybe_record(&[vec![i]], Duration::from_micros(5), i as u64);
        }
        assert_eq!(log.len(), 2);
        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].argv, vec![vec![1]]);
    }

    #[test]
    fn reset_clears_entries() {
        let log = SlowLog::with_capacity(4);
        log.set_threshold_us(0);
        log.maybe_record(&[b"X".to_vec()], Duration::from_micros(5), 0);
        log.reset();
        assert!(log.is_empty());
    }
}

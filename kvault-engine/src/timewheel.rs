//! # Hashed Time Wheel
//!
//! Purpose: Fire per-key expiration callbacks on a tick, per distilled
//! spec §4.2. A single-level wheel of `W` buckets advanced by a
//! dedicated background thread every `T`.
//!
//! Generalizes the teacher's `hkv-engine::memory::start_expirer`
//! background-thread-plus-stop-flag pattern (`ExpirationHandle`) from "a
//! wall-clock full-table sweep" to "a bucketed wheel with O(1) expected
//! insertion," while keeping the same start/stop/join contract.
//!
//! ## Design Principles
//! 1. **Explicit Lifecycle**: `start`/`stop`, with `stop` joining the
//!    ticker thread and guaranteeing no further callbacks fire.
//! 2. **Non-Reentrant Callback Contract**: the callback must not try to
//!    reacquire the wheel's internal lock (distilled §5).
//! 3. **Overflow via Rounds**: durations `>= W * T` wrap into a future
//!    cycle using a per-entry `rounds` counter (distilled §9 Open
//!    Question, resolved).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Default bucket count (distilled spec §4.2).
pub const DEFAULT_WHEEL_SIZE: usize = 1024;
/// Default tick interval (distilled spec §4.2).
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

struct Entry {
    key: Vec<u8>,
    rounds: u32,
}

struct WheelState {
    buckets: Vec<Vec<Entry>>,
    cursor: usize,
}

/// A hashed timing wheel driving active expiration callbacks.
pub struct TimeWheel {
    state: Mutex<WheelState>,
    wheel_size: usize,
    tick: Duration,
    running: Arc<AtomicBool>,
    ticks_elapsed: AtomicU64,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl TimeWheel {
    pub fn new(wheel_size: usize, tick: Duration) -> Self {
        let wheel_size = wheel_size.max(1);
        let mut buckets = Vec::with_capacity(wheel_size);
        for _ in 0..wheel_size {
            buckets.push(Vec::new());
        }
        TimeWheel {
            state: Mutex::new(WheelState { buckets, cursor: 0 }),
            wheel_size,
            tick,
            running: Arc::new(AtomicBool::new(false)),
            ticks_elapsed: AtomicU64::new(0),
            driver: Mutex::new(None),
        }
    }

    pub fn with_defaults() -> Self {
        TimeWheel::new(DEFAULT_WHEEL_SIZE, DEFAULT_TICK)
    }

    /// Schedules `key` to fire after `duration`. `ticks = ceil(duration /
    /// T)`, minimum 1. Durations spanning more than one full cycle are
    /// accepted and wrap via a `rounds` counter.
    pub fn add(&self, key: Vec<u8>, duration: Duration) {
        let tick_nanos = self.tick.as_nanos().max(1);
        let duration_nanos = duration.as_nanos();
        let ticks = ((duration_nanos + tick_nanos - 1) / tick_nanos).max(1) as u64;
        let rounds = (ticks / self.wheel_size as u64) as u32;
        let offset = (ticks % self.wheel_size as u64) as usize;

        let mut state = self.state.lock().expect("time wheel mutex poisoned");
        let bucket_idx = (state.cursor + offset) % self.wheel_size;
        state.buckets[bucket_idx].push(Entry { key, rounds });
    }

    /// Removes `key` from the wheel via a linear scan across buckets
    /// (distilled §4.2: "simple, not O(1); acceptable because removal is
    /// rare relative to adds").
    pub fn remove(&self, key: &[u8]) {
        let mut state = self.state.lock().expect("time wheel mutex poisoned");
        for bucket in state.buckets.iter_mut() {
            bucket.retain(|entry| entry.key != key);
        }
    }

    /// Advances the cursor by one tick, draining the current bucket and
    /// invoking `callback` once per fired key. Entries with `rounds > 0`
    /// are decremented and re-deposited instead of fired.
    pub fn tick_once<F: FnMut(&[u8])>(&self, mut callback: F) {
        let fired = {
            let mut state = self.state.lock().expect("time wheel mutex poisoned");
            let idx = state.cursor;
            let entries = std::mem::take(&mut state.buckets[idx]);
            let mut fired = Vec::new();
            for mut entry in entries {
                if entry.rounds == 0 {
                    fired.push(entry.key);
                } else {
                    entry.rounds -= 1;
                    state.buckets[idx].push(entry);
                }
            }
            state.cursor = (state.cursor + 1) % self.wheel_size;
            fired
        };

        self.ticks_elapsed.fetch_add(1, Ordering::Relaxed);
        for key in fired {
            callback(&key);
        }
    }

    pub fn ticks_elapsed(&self) -> u64 {
        self.ticks_elapsed.load(Ordering::Relaxed)
    }

    /// Starts a dedicated ticker thread that calls `tick_once` with
    /// `callback` on every tick interval. `callback` must be
    /// non-blocking and must not reacquire the wheel's lock.
    pub fn start<F>(self: &Arc<Self>, callback: F) -> TimeWheelHandle
    where
        F: Fn(&[u8]) + Send + 'static,
    {
        self.running.store(true, Ordering::Release);
        let wheel = Arc::clone(self);
        let running = Arc::clone(&self.running);
        let tick = self.tick;

        let join = std::thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                std::thread::sleep(tick);
                if !running.load(Ordering::Acquire) {
                    break;
                }
                wheel.tick_once(|key| callback(key));
            }
        });

        *self.driver.lock().expect("driver mutex poisoned") = Some(join);
        TimeWheelHandle {
            running: Arc::clone(&self.running),
            wheel: Arc::clone(self),
        }
    }
}

/// Handle returned by `TimeWheel::start`; `stop` joins the ticker thread
/// and guarantees no further callbacks fire afterwards.
pub struct TimeWheelHandle {
    running: Arc<AtomicBool>,
    wheel: Arc<TimeWheel>,
}

impl TimeWheelHandle {
    pub fn stop(self) {
        self.running.store(false, Ordering::Release);
        let mut driver = self.wheel.driver.lock().expect("driver mutex poisoned");
        if let Some(join) = driver.take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn duration_shorter_than_tick_fires_next_tick() {
        let wheel = TimeWheel::new(8, Duration::from_millis(10));
        wheel.add(b"k".to_vec(), Duration::from_millis(1));

        let mut fired = Vec::new();
        wheel.tick_once(|k| fired.push(k.to_vec()));
        assert_eq!(fired, vec![b"k".to_vec()]);
    }

    #[test]
    fn remove_prevents_fire() {
        let wheel = TimeWheel::new(8, Duration::from_millis(10));
        wheel.add(b"k".to_vec(), Duration::from_millis(1));
        wheel.remove(b"k");

        let mut fired = Vec::new();
        wheel.tick_once(|k| fired.push(k.to_vec()));
        assert!(fired.is_empty());
    }

    #[test]
    fn overflow_duration_fires_after_wrap() {
        let wheel = TimeWheel::new(4, Duration::from_millis(10));
        // 4 buckets * 10ms = 40ms per cycle; 45ms needs one extra round.
        wheel.add(b"k".to_vec(), Duration::from_millis(45));

        let mut fired = Vec::new();
        for _ in 0..8 {
            wheel.tick_once(|k| fired.push(k.to_vec()));
        }
        assert_eq!(fired, vec![b"k".to_vec()]);
    }

    #[test]
    fn start_stop_joins_and_stops_firing() {
        let wheel = Arc::new(TimeWheel::new(4, Duration::from_millis(1)));
        wheel.add(b"k".to_vec(), Duration::from_millis(1));

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let handle = wheel.start(move |_| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });

        std::thread::sleep(Duration::from_millis(20));
        handle.stop();
        let after_stop = count.load(Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::Relaxed), after_stop);
        assert!(after_stop >= 1);
    }
}

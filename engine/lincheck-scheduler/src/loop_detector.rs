//! Livelock/active-lock detection.
//!
//! Two independent trip wires: a per-thread "same code location visited
//! `hanging_detection_threshold` times in a row" detector feeding the
//! obstruction-freedom check, and a global trace-event counter catching
//! scenarios that never converge at all.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

const DEFAULT_LIVELOCK_EVENT_THRESHOLD: u64 = 10_000;

pub struct LoopDetector {
    hanging_threshold: u32,
    livelock_event_threshold: u64,
    last_at: Mutex<HashMap<usize, (String, u32)>>,
    total_events: AtomicU64,
}

impl LoopDetector {
    pub fn new(hanging_threshold: u32) -> Self {
        Self {
            hanging_threshold,
            livelock_event_threshold: DEFAULT_LIVELOCK_EVENT_THRESHOLD,
            last_at: Mutex::new(HashMap::new()),
            total_events: AtomicU64::new(0),
        }
    }

    pub fn with_livelock_event_threshold(mut self, threshold: u64) -> Self {
        self.livelock_event_threshold = threshold;
        self
    }

    /// Registers `(tid, code_loc)`. Returns `true` once the same location
    /// has been seen `hanging_threshold` times in a row for this thread —
    /// an active-lock candidate.
    pub fn register(&self, tid: usize, code_loc: &str) -> bool {
        let mut last_at = self.last_at.lock();
        let entry = last_at.entry(tid).or_insert_with(|| (String::new(), 0));
        if entry.0 == code_loc {
            entry.1 += 1;
        } else {
            entry.0 = code_loc.to_string();
            entry.1 = 1;
        }
        entry.1 >= self.hanging_threshold
    }

    pub fn reset_thread(&self, tid: usize) {
        self.last_at.lock().remove(&tid);
    }

    /// Registers one more trace event globally. Returns `true` once the
    /// invocation has produced more events than the livelock threshold,
    /// regardless of which thread or location produced them.
    pub fn register_event(&self) -> bool {
        let total = self.total_events.fetch_add(1, Ordering::Relaxed) + 1;
        total > self.livelock_event_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_location_trips_after_threshold() {
        let detector = LoopDetector::new(3);
        assert!(!detector.register(0, "loc-a"));
        assert!(!detector.register(0, "loc-a"));
        assert!(detector.register(0, "loc-a"));
    }

    #[test]
    fn different_location_resets_the_streak() {
        let detector = LoopDetector::new(2);
        assert!(!detector.register(0, "loc-a"));
        assert!(!detector.register(0, "loc-b"));
        assert!(!detector.register(0, "loc-b"));
        assert!(detector.register(0, "loc-b"));
    }

    #[test]
    fn threads_are_tracked_independently() {
        let detector = LoopDetector::new(2);
        assert!(!detector.register(0, "loc-a"));
        assert!(!detector.register(1, "loc-a"));
        assert!(detector.register(0, "loc-a"));
    }

    #[test]
    fn livelock_event_counter_trips_once_past_threshold() {
        let detector = LoopDetector::new(1000).with_livelock_event_threshold(2);
        assert!(!detector.register_event());
        assert!(!detector.register_event());
        assert!(detector.register_event());
    }
}

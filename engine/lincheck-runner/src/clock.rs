//! Per-thread logical (vector) clocks.
//!
//! Before executing each parallel actor, a worker ticks its own counter
//! and snapshots every thread's counter into the vector clock attached to
//! that actor's result, giving the verifier enough information to later
//! reconstruct a partial order across threads if it needs one.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct VectorClocks {
    counters: Vec<AtomicU64>,
}

impl VectorClocks {
    pub fn new(thread_count: usize) -> Self {
        Self { counters: (0..thread_count).map(|_| AtomicU64::new(0)).collect() }
    }

    /// Ticks `tid`'s own counter, then snapshots every thread's counter.
    pub fn tick_and_snapshot(&self, tid: usize) -> Vec<u64> {
        self.counters[tid].fetch_add(1, Ordering::AcqRel);
        self.counters.iter().map(|c| c.load(Ordering::Acquire)).collect()
    }
}

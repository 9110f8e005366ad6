//! Identity-keyed monitor tracker.
//!
//! Monitors are keyed by identity, not structural equality — callers
//! derive a [`MonitorId`] from their own object's address or a stable
//! handle, and the tracker never looks inside it. `notify` and
//! `notify_all` are intentionally the same operation: spurious wakeups
//! are permitted, not required.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

/// Identity of a lock/monitor object, supplied by the caller (e.g.
/// derived from a stable object handle's address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorId(pub u64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("thread {tid} attempted to release monitor it does not own")]
    NotOwner { tid: usize },
    #[error("thread {tid} attempted to wait on a monitor it does not own")]
    WaitWithoutOwnership { tid: usize },
}

struct MonitorEntry {
    owner: usize,
    reentrancy: u32,
}

struct Inner {
    owners: HashMap<MonitorId, MonitorEntry>,
    waiting_on: Vec<Option<MonitorId>>,
    needs_notification: Vec<bool>,
}

pub struct MonitorTracker {
    inner: Mutex<Inner>,
}

impl MonitorTracker {
    pub fn new(thread_count: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                owners: HashMap::new(),
                waiting_on: vec![None; thread_count],
                needs_notification: vec![false; thread_count],
            }),
        }
    }

    /// Success iff the monitor is unowned or already owned by `tid`
    /// (reentrancy count incremented). Otherwise records `tid` as waiting
    /// on `m` and returns false.
    pub fn acquire(&self, tid: usize, m: MonitorId) -> bool {
        let mut inner = self.inner.lock();
        match inner.owners.get_mut(&m) {
            None => {
                inner.owners.insert(m, MonitorEntry { owner: tid, reentrancy: 1 });
                true
            }
            Some(entry) if entry.owner == tid => {
                entry.reentrancy += 1;
                true
            }
            Some(_) => {
                inner.waiting_on[tid] = Some(m);
                false
            }
        }
    }

    pub fn release(&self, tid: usize, m: MonitorId) -> Result<(), MonitorError> {
        let mut inner = self.inner.lock();
        let entry = inner.owners.get_mut(&m).filter(|e| e.owner == tid).ok_or(MonitorError::NotOwner { tid })?;
        entry.reentrancy -= 1;
        if entry.reentrancy == 0 {
            inner.owners.remove(&m);
        }
        Ok(())
    }

    pub fn can_acquire(&self, tid: usize, m: MonitorId) -> bool {
        let inner = self.inner.lock();
        match inner.owners.get(&m) {
            None => true,
            Some(entry) => entry.owner == tid,
        }
    }

    pub fn is_waiting(&self, tid: usize) -> bool {
        let inner = self.inner.lock();
        match inner.waiting_on[tid] {
            None => false,
            Some(m) => inner.needs_notification[tid] || !self.can_acquire_locked(&inner, tid, m),
        }
    }

    fn can_acquire_locked(&self, inner: &Inner, tid: usize, m: MonitorId) -> bool {
        match inner.owners.get(&m) {
            None => true,
            Some(entry) => entry.owner == tid,
        }
    }

    /// `tid` must currently own `m`. Fully releases it, marks `tid` as
    /// needing notification, and records it as waiting on `m`.
    pub fn wait(&self, tid: usize, m: MonitorId) -> Result<(), MonitorError> {
        let mut inner = self.inner.lock();
        let owns = inner.owners.get(&m).map(|e| e.owner == tid).unwrap_or(false);
        if !owns {
            return Err(MonitorError::WaitWithoutOwnership { tid });
        }
        inner.owners.remove(&m);
        inner.needs_notification[tid] = true;
        inner.waiting_on[tid] = Some(m);
        Ok(())
    }

    /// Clears `needs_notification` for every thread waiting on `m`.
    /// `notify` and `notify_all` are the same operation in this port.
    pub fn notify_all(&self, m: MonitorId) {
        let mut inner = self.inner.lock();
        for tid in 0..inner.needs_notification.len() {
            if inner.waiting_on[tid] == Some(m) {
                inner.needs_notification[tid] = false;
            }
        }
    }

    pub fn notify(&self, m: MonitorId) {
        self.notify_all(m);
    }

    pub fn waiting_on(&self, tid: usize) -> Option<MonitorId> {
        self.inner.lock().waiting_on[tid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentrant_acquire_requires_matching_release_count() {
        let tracker = MonitorTracker::new(2);
        let m = MonitorId(1);
        assert!(tracker.acquire(0, m));
        assert!(tracker.acquire(0, m));
        assert!(!tracker.acquire(1, m), "other thread cannot acquire while owned");
        tracker.release(0, m).unwrap();
        assert!(!tracker.can_acquire(1, m), "still held after one release");
        tracker.release(0, m).unwrap();
        assert!(tracker.can_acquire(1, m));
    }

    #[test]
    fn release_without_ownership_is_rejected() {
        let tracker = MonitorTracker::new(2);
        let m = MonitorId(1);
        tracker.acquire(0, m);
        assert_eq!(tracker.release(1, m), Err(MonitorError::NotOwner { tid: 1 }));
    }

    #[test]
    fn wait_releases_and_marks_needing_notification() {
        let tracker = MonitorTracker::new(2);
        let m = MonitorId(1);
        tracker.acquire(0, m);
        tracker.wait(0, m).unwrap();
        assert!(tracker.is_waiting(0));
        assert!(tracker.can_acquire(1, m));
        tracker.notify_all(m);
        assert!(!tracker.is_waiting(0));
    }

    #[test]
    fn notify_is_notify_all() {
        let tracker = MonitorTracker::new(3);
        let m = MonitorId(9);
        tracker.acquire(0, m);
        tracker.wait(0, m).unwrap();
        tracker.acquire(1, m);
        tracker.wait(1, m).unwrap();
        tracker.notify(m);
        assert!(!tracker.is_waiting(0));
        assert!(!tracker.is_waiting(1));
    }

    use proptest::prelude::*;

    proptest! {
        // Monitor reentrancy: acquiring and releasing the same
        // number of times returns a monitor to the unowned state regardless
        // of how many times it was re-entered, and a second thread can
        // never acquire it partway through.
        #[test]
        fn matched_acquire_release_counts_return_to_unowned(depth in 1u32..12) {
            let tracker = MonitorTracker::new(2);
            let m = MonitorId(1);

            for _ in 0..depth {
                prop_assert!(tracker.acquire(0, m));
                prop_assert!(!tracker.acquire(1, m));
            }
            for remaining in (0..depth).rev() {
                tracker.release(0, m).unwrap();
                prop_assert_eq!(tracker.can_acquire(1, m), remaining == 0);
            }
        }
    }
}

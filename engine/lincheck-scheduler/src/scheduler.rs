//! The managed scheduler itself: the single-thread-at-a-time turn
//! protocol, switch-point algorithm, and monitor/park/coroutine hooks
//! instrumented code calls into.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::OnceLock;

use tracing::{debug, trace, warn};

use crate::forcible_finish::ForcibleFinish;
use crate::loop_detector::LoopDetector;
use crate::monitor::{MonitorError, MonitorId, MonitorTracker};
use crate::strategy::SwitchStrategy;

/// The result a forced finish resolves to; set at most once per invocation
/// (writer-wins).
#[derive(Debug, Clone)]
pub enum SuddenResult {
    Deadlock { thread_dump: Vec<String> },
    ObstructionFreedomViolation { code_loc: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Suspended,
    WaitingForMonitor,
    Finished,
}

pub struct ManagedScheduler {
    thread_count: usize,
    current_thread: AtomicI32,
    finished: Vec<std::sync::atomic::AtomicBool>,
    is_suspended: Vec<std::sync::atomic::AtomicBool>,
    pending_resumption: Vec<std::sync::atomic::AtomicBool>,
    parked: Vec<std::sync::atomic::AtomicBool>,
    unpark_pending: Vec<std::sync::atomic::AtomicBool>,
    ignored_depth: Vec<AtomicU32>,
    loop_detector: LoopDetector,
    monitor_tracker: MonitorTracker,
    sudden_result: OnceLock<SuddenResult>,
    strategy: Box<dyn SwitchStrategy>,
    check_obstruction_freedom: bool,
}

impl ManagedScheduler {
    pub fn new(thread_count: usize, strategy: Box<dyn SwitchStrategy>, hanging_detection_threshold: u32, check_obstruction_freedom: bool) -> Self {
        use std::sync::atomic::AtomicBool;
        Self {
            thread_count,
            current_thread: AtomicI32::new(0),
            finished: (0..thread_count).map(|_| AtomicBool::new(false)).collect(),
            is_suspended: (0..thread_count).map(|_| AtomicBool::new(false)).collect(),
            pending_resumption: (0..thread_count).map(|_| AtomicBool::new(false)).collect(),
            parked: (0..thread_count).map(|_| AtomicBool::new(false)).collect(),
            unpark_pending: (0..thread_count).map(|_| AtomicBool::new(false)).collect(),
            ignored_depth: (0..thread_count).map(|_| AtomicU32::new(0)).collect(),
            loop_detector: LoopDetector::new(hanging_detection_threshold),
            monitor_tracker: MonitorTracker::new(thread_count),
            sudden_result: OnceLock::new(),
            strategy,
            check_obstruction_freedom,
        }
    }

    pub fn sudden_result(&self) -> Option<&SuddenResult> {
        self.sudden_result.get()
    }

    pub fn worker_state(&self, tid: usize) -> WorkerState {
        if self.finished[tid].load(Ordering::Acquire) {
            WorkerState::Finished
        } else if self.monitor_tracker.waiting_on(tid).is_some() && self.monitor_tracker.is_waiting(tid) {
            WorkerState::WaitingForMonitor
        } else if self.is_suspended[tid].load(Ordering::Acquire) {
            WorkerState::Suspended
        } else {
            WorkerState::Running
        }
    }

    pub fn thread_dump(&self) -> Vec<String> {
        (0..self.thread_count).map(|tid| format!("thread {tid}: {:?}", self.worker_state(tid))).collect()
    }

    fn set_sudden_result(&self, result: SuddenResult) {
        if self.sudden_result.set(result).is_err() {
            debug!("sudden_result already set by another thread; keeping the first writer");
        }
    }

    fn record_deadlock(&self) {
        warn!("scheduler deadlock: no switchable thread for a mandatory switch");
        self.set_sudden_result(SuddenResult::Deadlock { thread_dump: self.thread_dump() });
    }

    fn record_obstruction_freedom_violation(&self, code_loc: &str) {
        warn!(code_loc, "obstruction-freedom violation: active-lock candidate");
        self.set_sudden_result(SuddenResult::ObstructionFreedomViolation { code_loc: code_loc.to_string() });
    }

    fn abort_if_sudden_result(&self) {
        if self.sudden_result.get().is_some() {
            ForcibleFinish::raise();
        }
    }

    /// Called by the runner's wall-clock watchdog when an invocation
    /// overruns its timeout: records a `Deadlock` so every worker aborts
    /// via `ForcibleFinish` at its next switch point.
    pub fn force_timeout_deadlock(&self) {
        self.record_deadlock();
    }

    fn wait_for_turn(&self, tid: usize) {
        loop {
            self.abort_if_sudden_result();
            if self.current_thread.load(Ordering::Acquire) == tid as i32 {
                return;
            }
            std::thread::yield_now();
        }
    }

    /// Indices of threads other than `tid` eligible to become `current`.
    fn switchable_threads(&self, tid: usize) -> Vec<usize> {
        (0..self.thread_count)
            .filter(|&i| i != tid)
            .filter(|&i| !self.finished[i].load(Ordering::Acquire))
            .filter(|&i| !self.parked[i].load(Ordering::Acquire))
            .filter(|&i| !self.monitor_tracker.is_waiting(i))
            .filter(|&i| !self.is_suspended[i].load(Ordering::Acquire) || self.pending_resumption[i].load(Ordering::Acquire))
            .collect()
    }

    fn pick_suspended_fallback(&self, tid: usize) -> Option<usize> {
        (0..self.thread_count)
            .filter(|&i| i != tid)
            .find(|&i| !self.finished[i].load(Ordering::Acquire) && self.is_suspended[i].load(Ordering::Acquire))
    }

    /// Hands the turn to another switchable thread if any exists. Returns
    /// `true` iff `current_thread` actually changed away from `tid`, in
    /// which case the caller must then block in [`Self::wait_for_turn`].
    /// `mandatory` switches (monitor wait, park, forced finish) fall back
    /// to a suspended thread, then to `Deadlock`, when nothing is
    /// switchable; non-mandatory (ordinary switch-point) switches simply
    /// leave `tid` running when there is nobody to hand off to.
    fn relinquish_turn(&self, tid: usize, mandatory: bool) -> bool {
        let switchable = self.switchable_threads(tid);
        if switchable.is_empty() {
            if mandatory {
                if let Some(candidate) = self.pick_suspended_fallback(tid) {
                    self.current_thread.store(candidate as i32, Ordering::Release);
                    return true;
                }
                self.record_deadlock();
                ForcibleFinish::raise();
            }
            return false;
        }
        let idx = self.strategy.choose_thread(switchable.len());
        self.current_thread.store(switchable[idx] as i32, Ordering::Release);
        true
    }

    /// The switch-point algorithm.
    pub fn new_switch_point(&self, tid: usize, code_loc: &str) {
        debug_assert_eq!(self.current_thread.load(Ordering::Acquire), tid as i32, "switch point called off-turn");

        if self.ignored_depth[tid].load(Ordering::Acquire) > 0 {
            return;
        }

        let mut active_lock = false;
        if self.loop_detector.register(tid, code_loc) {
            active_lock = true;
            if self.check_obstruction_freedom {
                self.record_obstruction_freedom_violation(code_loc);
                ForcibleFinish::raise();
            }
        }
        if self.loop_detector.register_event() {
            self.record_deadlock();
            ForcibleFinish::raise();
        }

        if self.strategy.should_switch(tid) || active_lock {
            trace!(tid, code_loc, active_lock, "switch point yielding turn");
            if self.relinquish_turn(tid, false) {
                self.wait_for_turn(tid);
            }
        }
    }

    pub fn on_start(&self, tid: usize) {
        self.wait_for_turn(tid);
    }

    pub fn on_finish(&self, tid: usize) {
        self.finished[tid].store(true, Ordering::Release);
        self.loop_detector.reset_thread(tid);
        self.relinquish_turn(tid, true);
    }

    pub fn before_shared_read(&self, tid: usize, code_loc: &str) {
        self.new_switch_point(tid, code_loc);
    }

    pub fn before_shared_write(&self, tid: usize, code_loc: &str) {
        self.new_switch_point(tid, code_loc);
    }

    pub fn before_atomic_method_call(&self, tid: usize, code_loc: &str) {
        self.new_switch_point(tid, code_loc);
    }

    /// Returns whether the caller should really perform the acquire.
    /// Blocks (yielding turns to other threads) until the monitor is won.
    pub fn before_lock_acquire(&self, tid: usize, code_loc: &str, monitor: MonitorId) -> bool {
        self.new_switch_point(tid, code_loc);
        loop {
            if self.monitor_tracker.acquire(tid, monitor) {
                return true;
            }
            if self.relinquish_turn(tid, true) {
                self.wait_for_turn(tid);
            }
        }
    }

    pub fn before_lock_release(&self, tid: usize, code_loc: &str, monitor: MonitorId) -> Result<(), MonitorError> {
        self.new_switch_point(tid, code_loc);
        self.monitor_tracker.release(tid, monitor)
    }

    pub fn before_wait(&self, tid: usize, code_loc: &str, monitor: MonitorId, with_timeout: bool) -> Result<(), MonitorError> {
        self.new_switch_point(tid, code_loc);
        self.monitor_tracker.wait(tid, monitor)?;
        let _ = with_timeout;
        loop {
            if self.relinquish_turn(tid, true) {
                self.wait_for_turn(tid);
            }
            if !self.monitor_tracker.is_waiting(tid) && self.monitor_tracker.acquire(tid, monitor) {
                return Ok(());
            }
        }
    }

    pub fn after_notify(&self, tid: usize, code_loc: &str, monitor: MonitorId, notify_all: bool) {
        self.new_switch_point(tid, code_loc);
        if notify_all {
            self.monitor_tracker.notify_all(monitor);
        } else {
            self.monitor_tracker.notify(monitor);
        }
    }

    pub fn before_park(&self, tid: usize, code_loc: &str, with_timeout: bool) {
        self.new_switch_point(tid, code_loc);
        if self.unpark_pending[tid].swap(false, Ordering::AcqRel) {
            return;
        }
        self.parked[tid].store(true, Ordering::Release);
        let _ = with_timeout;
        loop {
            if self.relinquish_turn(tid, true) {
                self.wait_for_turn(tid);
            }
            if !self.parked[tid].load(Ordering::Acquire) {
                return;
            }
        }
    }

    pub fn after_unpark(&self, tid: usize, code_loc: &str, thread: usize) {
        self.new_switch_point(tid, code_loc);
        if !self.parked[thread].swap(false, Ordering::AcqRel) {
            self.unpark_pending[thread].store(true, Ordering::Release);
        }
    }

    pub fn after_coroutine_suspended(&self, tid: usize) {
        self.is_suspended[tid].store(true, Ordering::Release);
        self.pending_resumption[tid].store(false, Ordering::Release);
        self.relinquish_turn(tid, true);
    }

    /// Called by whichever thread's actor resumes this ticket, marking
    /// `tid` eligible to be scheduled again.
    pub fn mark_pending_resumption(&self, tid: usize) {
        self.pending_resumption[tid].store(true, Ordering::Release);
    }

    pub fn after_coroutine_resumed(&self, tid: usize) {
        self.is_suspended[tid].store(false, Ordering::Release);
        self.pending_resumption[tid].store(false, Ordering::Release);
    }

    pub fn after_coroutine_cancelled(&self, tid: usize) {
        self.is_suspended[tid].store(false, Ordering::Release);
        self.pending_resumption[tid].store(false, Ordering::Release);
    }

    pub fn enter_ignored_section(&self, tid: usize) {
        self.ignored_depth[tid].fetch_add(1, Ordering::AcqRel);
    }

    pub fn leave_ignored_section(&self, tid: usize) {
        self.ignored_depth[tid].fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::DeterministicSwitchStrategy;

    fn scheduler(threads: usize) -> ManagedScheduler {
        ManagedScheduler::new(threads, Box::new(DeterministicSwitchStrategy), 1000, false)
    }

    #[test]
    fn thread_zero_starts_without_waiting() {
        let s = scheduler(2);
        s.on_start(0);
        assert_eq!(s.worker_state(0), WorkerState::Running);
    }

    #[test]
    fn finishing_hands_turn_to_the_other_thread() {
        let s = scheduler(2);
        s.on_start(0);
        s.on_finish(0);
        assert_eq!(s.worker_state(0), WorkerState::Finished);
    }

    #[test]
    fn ignored_section_suppresses_switching() {
        let s = scheduler(2);
        s.on_start(0);
        s.enter_ignored_section(0);
        s.before_shared_read(0, "loc-a");
        s.leave_ignored_section(0);
        assert_eq!(s.worker_state(0), WorkerState::Running);
    }

    #[test]
    fn all_threads_finished_is_deadlock_free() {
        let s = scheduler(1);
        s.on_start(0);
        s.before_shared_write(0, "loc-a");
        s.on_finish(0);
        assert!(s.sudden_result().is_none());
    }

    #[test]
    fn mandatory_switch_with_no_switchable_thread_raises_forcible_finish() {
        let s = scheduler(1);
        s.on_start(0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            s.after_coroutine_suspended(0);
        }));
        assert!(result.is_err());
        assert!(matches!(s.sudden_result(), Some(SuddenResult::Deadlock { .. })));
    }

    #[test]
    fn monitor_reentrancy_through_scheduler_hooks() {
        let s = scheduler(1);
        s.on_start(0);
        let m = MonitorId(1);
        assert!(s.before_lock_acquire(0, "loc-a", m));
        assert!(s.before_lock_acquire(0, "loc-a", m));
        s.before_lock_release(0, "loc-a", m).unwrap();
        s.before_lock_release(0, "loc-a", m).unwrap();
        assert!(s.monitor_tracker.can_acquire(0, m));
    }
}

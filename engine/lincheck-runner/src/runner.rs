//! The invocation runner: drives one scenario's initial, parallel, and
//! post actors through an [`ActorDispatcher`] and collects an
//! [`ExecutionResult`], spawning one OS thread per parallel actor sequence
//! and arbitrating it through a [`ManagedScheduler`].
//!
//! The worker pool is plain `std::thread::Builder` spawns joined in a
//! loop, deliberately not an async runtime — the scheduler's cooperative
//! turn-taking already serializes everything past a switch point and
//! there is nothing for an executor to multiplex.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use lincheck_model::{Actor, ActorResult, ExecutionResult, ExecutionScenario, Outcome};
use lincheck_scheduler::{ForcibleFinish, ManagedScheduler, SuddenResult, SwitchStrategy};
use lincheck_trace::{Completion, GuaranteePolicy, OutputMode, TraceRecorder};
use tracing::warn;

use crate::clock::VectorClocks;
use crate::dispatch::ActorDispatcher;
use crate::failure::FailureKind;

/// Tunables for one [`InvocationRunner`]. Cheap to build fresh per run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub use_clocks: bool,
    pub check_obstruction_freedom: bool,
    pub hanging_detection_threshold: u32,
    pub timeout: Duration,
    pub guarantees: GuaranteePolicy,
    pub trace_output_mode: OutputMode,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            use_clocks: true,
            check_obstruction_freedom: false,
            hanging_detection_threshold: 10_000,
            timeout: Duration::from_secs(10),
            guarantees: GuaranteePolicy::default(),
            trace_output_mode: OutputMode::Null,
        }
    }
}

/// Everything one invocation run produced: the collected results, the
/// first directly-observed failure (if any — `IncorrectResults` and
/// `NonDeterminism` are never set here, see [`FailureKind`]), and the
/// trace built while the parallel part ran.
pub struct RunReport {
    pub result: ExecutionResult,
    pub failure: Option<FailureKind>,
    pub trace: Arc<TraceRecorder>,
}

/// What one worker thread produced, kept separate from a plain
/// `Vec<ActorResult>` so the joining thread can tell a clean finish from a
/// forced abort or a genuine actor panic without relying on
/// `JoinHandle::join`'s own, coarser panic classification.
enum WorkerOutcome {
    Completed(Vec<ActorResult>),
    ForciblyFinished,
    Panicked { actor_method: String, message: String },
}

enum DispatchOutcome {
    Ok(Outcome),
    ForciblyFinished,
    Panicked(String),
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn dispatch_guarded(dispatcher: &dyn ActorDispatcher, tid: usize, actor: &Actor, scheduler: &ManagedScheduler) -> DispatchOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(tid, actor, scheduler))) {
        Ok(outcome) => DispatchOutcome::Ok(outcome),
        Err(payload) => {
            if ForcibleFinish::is_forcible_finish(payload.as_ref()) {
                DispatchOutcome::ForciblyFinished
            } else {
                DispatchOutcome::Panicked(panic_message(payload.as_ref()))
            }
        }
    }
}

/// Runs `actors` one after another on the calling thread, outside any
/// scheduler arbitration — there is nothing to interleave with.
fn run_sequential(
    actors: &[Actor],
    dispatcher: &dyn ActorDispatcher,
    tid: usize,
    scheduler: &ManagedScheduler,
) -> (Vec<ActorResult>, Option<FailureKind>) {
    let mut results = Vec::with_capacity(actors.len());
    let mut failure = None;
    for actor in actors {
        let outcome = match dispatch_guarded(dispatcher, tid, actor, scheduler) {
            DispatchOutcome::Ok(outcome) => outcome,
            DispatchOutcome::ForciblyFinished => {
                failure.get_or_insert(FailureKind::UnexpectedException {
                    actor_method: actor.method().to_string(),
                    message: "forced finish raised outside the parallel phase".to_string(),
                });
                Outcome::Exception("ForciblyFinished".to_string())
            }
            DispatchOutcome::Panicked(message) => {
                failure.get_or_insert(FailureKind::UnexpectedException {
                    actor_method: actor.method().to_string(),
                    message: message.clone(),
                });
                Outcome::Exception(message)
            }
        };
        results.push(ActorResult::new(actor.clone(), outcome));
    }
    (results, failure)
}

fn run_validation(actor: &Actor, dispatcher: &dyn ActorDispatcher, scheduler: &ManagedScheduler) -> (ActorResult, Option<FailureKind>) {
    match dispatch_guarded(dispatcher, 0, actor, scheduler) {
        DispatchOutcome::Ok(outcome) => (ActorResult::new(actor.clone(), outcome), None),
        DispatchOutcome::ForciblyFinished => (
            ActorResult::new(actor.clone(), Outcome::Exception("ForciblyFinished".to_string())),
            Some(FailureKind::ValidationFailure { message: "forced finish raised during validation".to_string() }),
        ),
        DispatchOutcome::Panicked(message) => (
            ActorResult::new(actor.clone(), Outcome::Exception(message.clone())),
            Some(FailureKind::ValidationFailure { message }),
        ),
    }
}

/// One worker's full run: `on_start`, one scheduler turn per actor,
/// `on_finish`. Returns as soon as a [`ForcibleFinish`] unwind or a
/// genuine panic is caught, rather than completing its remaining actors.
fn run_worker(
    tid: usize,
    actors: &[Actor],
    scheduler: &ManagedScheduler,
    trace: &TraceRecorder,
    clocks: Option<&VectorClocks>,
    dispatcher: &dyn ActorDispatcher,
) -> WorkerOutcome {
    scheduler.on_start(tid);
    if let Err(err) = trace.on_thread_start(tid) {
        warn!(tid, %err, "trace recorder rejected worker thread start");
    }

    let mut results = Vec::with_capacity(actors.len());
    for actor in actors {
        scheduler.before_atomic_method_call(tid, actor.method());
        let params: Vec<String> = actor.resolve_args(tid).iter().map(|a| format!("{a:?}")).collect();
        let _ = trace.enter_method(tid, "Actor", actor.method(), tid as u64, params);

        let outcome = match dispatch_guarded(dispatcher, tid, actor, scheduler) {
            DispatchOutcome::Ok(outcome) => outcome,
            DispatchOutcome::ForciblyFinished => {
                let _ = trace.exit_method_exception(tid, "ForciblyFinished");
                scheduler.on_finish(tid);
                return WorkerOutcome::ForciblyFinished;
            }
            DispatchOutcome::Panicked(message) => {
                let _ = trace.exit_method_exception(tid, message.clone());
                scheduler.on_finish(tid);
                return WorkerOutcome::Panicked { actor_method: actor.method().to_string(), message };
            }
        };

        match &outcome {
            Outcome::Exception(message) => {
                let _ = trace.exit_method_exception(tid, message.clone());
            }
            other => {
                let _ = trace.exit_method_value(tid, format!("{other:?}"));
            }
        }

        let result = match clocks {
            Some(clocks) => ActorResult::new(actor.clone(), outcome).with_clock(clocks.tick_and_snapshot(tid)),
            None => ActorResult::new(actor.clone(), outcome),
        };
        results.push(result);
    }

    scheduler.on_finish(tid);
    let _ = trace.on_thread_finish(tid, Completion::Value(String::new()));
    WorkerOutcome::Completed(results)
}

pub struct InvocationRunner {
    config: RunnerConfig,
}

impl InvocationRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Runs one scenario to completion. `dispatcher` is shared across every
    /// worker thread; it must itself call into the scheduler's `before_*`
    /// hooks around any shared access the dispatched method performs.
    pub fn run<D>(&self, scenario: &ExecutionScenario, dispatcher: Arc<D>, strategy: Box<dyn SwitchStrategy>) -> RunReport
    where
        D: ActorDispatcher + 'static,
    {
        let thread_count = scenario.thread_count();
        let scheduler = Arc::new(ManagedScheduler::new(
            thread_count,
            strategy,
            self.config.hanging_detection_threshold,
            self.config.check_obstruction_freedom,
        ));
        let clocks = self.config.use_clocks.then(|| Arc::new(VectorClocks::new(thread_count)));
        let trace = Arc::new(TraceRecorder::new(thread_count, self.config.guarantees.clone(), self.config.trace_output_mode));

        let (initial, mut failure) = run_sequential(scenario.initial(), dispatcher.as_ref(), 0, scheduler.as_ref());

        let watchdog_done = Arc::new(AtomicBool::new(false));
        let watchdog = {
            let scheduler = Arc::clone(&scheduler);
            let done = Arc::clone(&watchdog_done);
            let timeout = self.config.timeout;
            std::thread::Builder::new()
                .name("lincheck-watchdog".to_string())
                .spawn(move || {
                    let deadline = Instant::now() + timeout;
                    while Instant::now() < deadline && !done.load(Ordering::Acquire) {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    if !done.load(Ordering::Acquire) {
                        scheduler.force_timeout_deadlock();
                    }
                })
                .expect("failed to spawn lincheck watchdog thread")
        };

        let handles: Vec<JoinHandle<WorkerOutcome>> = (0..thread_count)
            .map(|tid| {
                let scheduler = Arc::clone(&scheduler);
                let trace = Arc::clone(&trace);
                let clocks = clocks.clone();
                let dispatcher = Arc::clone(&dispatcher);
                let actors = scenario.parallel()[tid].clone();
                std::thread::Builder::new()
                    .name(format!("lincheck-worker-{tid}"))
                    .spawn(move || run_worker(tid, &actors, scheduler.as_ref(), trace.as_ref(), clocks.as_deref(), dispatcher.as_ref()))
                    .expect("failed to spawn lincheck worker thread")
            })
            .collect();

        let worker_outcomes: Vec<WorkerOutcome> =
            handles.into_iter().map(|h| h.join().unwrap_or(WorkerOutcome::ForciblyFinished)).collect();

        watchdog_done.store(true, Ordering::Release);
        let _ = watchdog.join();

        let mut parallel_results = Vec::with_capacity(worker_outcomes.len());
        for outcome in worker_outcomes {
            match outcome {
                WorkerOutcome::Completed(results) => parallel_results.push(results),
                WorkerOutcome::ForciblyFinished => parallel_results.push(Vec::new()),
                WorkerOutcome::Panicked { actor_method, message } => {
                    failure.get_or_insert(FailureKind::UnexpectedException { actor_method, message });
                    parallel_results.push(Vec::new());
                }
            }
        }

        if failure.is_none() {
            failure = match scheduler.sudden_result() {
                Some(SuddenResult::Deadlock { thread_dump }) => Some(FailureKind::Deadlock { thread_dump: thread_dump.clone() }),
                Some(SuddenResult::ObstructionFreedomViolation { code_loc }) => {
                    Some(FailureKind::ObstructionFreedomViolation { code_loc: code_loc.clone() })
                }
                None => None,
            };
        }

        let (post, post_failure) = run_sequential(scenario.post(), dispatcher.as_ref(), 0, scheduler.as_ref());
        if failure.is_none() {
            failure = post_failure;
        }

        let validation = scenario.validation_actor().map(|actor| {
            let (result, validation_failure) = run_validation(actor, dispatcher.as_ref(), scheduler.as_ref());
            if failure.is_none() {
                failure = validation_failure;
            }
            result
        });

        trace.shutdown_live_threads();

        RunReport { result: ExecutionResult::new(initial, parallel_results, post, validation), failure, trace }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lincheck_model::{ActorFlags, MethodSignature};
    use lincheck_scheduler::DeterministicSwitchStrategy;
    use std::sync::atomic::AtomicI64;

    fn increment_actor() -> Actor {
        let sig = MethodSignature::new("increment", 0);
        Actor::new(&sig, vec![], ActorFlags::default()).unwrap()
    }

    #[test]
    fn collects_one_result_per_actor_across_all_phases() {
        let scenario = ExecutionScenario::new(
            vec![increment_actor()],
            vec![vec![increment_actor()], vec![increment_actor()]],
            vec![increment_actor()],
            None,
        )
        .unwrap();

        let counter = Arc::new(AtomicI64::new(0));
        let dispatcher = {
            let counter = Arc::clone(&counter);
            Arc::new(move |_tid: usize, _actor: &Actor, _scheduler: &ManagedScheduler| -> Outcome {
                let v = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Outcome::Value(serde_json::json!(v))
            })
        };

        let runner = InvocationRunner::new(RunnerConfig::default());
        let report = runner.run(&scenario, dispatcher, Box::new(DeterministicSwitchStrategy));

        assert!(report.failure.is_none());
        assert_eq!(report.result.initial.len(), 1);
        assert_eq!(report.result.parallel.len(), 2);
        assert_eq!(report.result.parallel.iter().map(|t| t.len()).sum::<usize>(), 2);
        assert_eq!(report.result.post.len(), 1);
        assert!(report.result.parallel[0][0].clock.is_some());
    }

    #[test]
    fn a_dispatcher_panic_is_reported_as_unexpected_exception_not_propagated() {
        let scenario = ExecutionScenario::new(vec![], vec![vec![increment_actor()]], vec![], None).unwrap();
        let dispatcher: Arc<_> = Arc::new(|_tid: usize, _actor: &Actor, _scheduler: &ManagedScheduler| -> Outcome { panic!("boom") });

        let runner = InvocationRunner::new(RunnerConfig::default());
        let report = runner.run(&scenario, dispatcher, Box::new(DeterministicSwitchStrategy));

        match report.failure {
            Some(FailureKind::UnexpectedException { message, .. }) => assert!(message.contains("boom")),
            other => panic!("expected UnexpectedException, got {other:?}"),
        }
    }

    #[test]
    fn a_validation_actor_runs_after_the_parallel_part() {
        let validation_actor = {
            let sig = MethodSignature::new("validate", 0);
            Actor::new(&sig, vec![], ActorFlags::default()).unwrap()
        };
        let scenario = ExecutionScenario::new(vec![], vec![vec![increment_actor()]], vec![], Some(validation_actor)).unwrap();
        let dispatcher: Arc<_> = Arc::new(|_tid: usize, actor: &Actor, _scheduler: &ManagedScheduler| -> Outcome {
            if actor.method() == "validate" {
                Outcome::Void
            } else {
                Outcome::Value(serde_json::json!(1))
            }
        });

        let runner = InvocationRunner::new(RunnerConfig::default());
        let report = runner.run(&scenario, dispatcher, Box::new(DeterministicSwitchStrategy));

        assert!(report.failure.is_none());
        let validation = report.result.validation.expect("validation actor should have run");
        assert_eq!(validation.actor.method(), "validate");
        assert_eq!(validation.outcome, Outcome::Void);
    }

    #[test]
    fn a_busy_loop_at_one_code_location_is_reported_as_an_obstruction_freedom_violation() {
        let scenario = ExecutionScenario::new(vec![], vec![vec![increment_actor()]], vec![], None).unwrap();
        let dispatcher: Arc<_> = Arc::new(|tid: usize, _actor: &Actor, scheduler: &ManagedScheduler| -> Outcome {
            loop {
                scheduler.before_atomic_method_call(tid, "spin");
            }
        });

        let runner = InvocationRunner::new(RunnerConfig {
            check_obstruction_freedom: true,
            hanging_detection_threshold: 10,
            timeout: Duration::from_secs(5),
            ..RunnerConfig::default()
        });
        let report = runner.run(&scenario, dispatcher, Box::new(DeterministicSwitchStrategy));

        match report.failure {
            Some(FailureKind::ObstructionFreedomViolation { code_loc }) => assert_eq!(code_loc, "spin"),
            other => panic!("expected ObstructionFreedomViolation, got {other:?}"),
        }
    }
}

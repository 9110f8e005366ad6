//! Lincheck-style concurrency testing engine.
//!
//! Wires the seven `engine/lincheck-*` crates together: a scenario goes
//! through the [`InvocationRunner`] once, the collected results are checked
//! against a [`SequentialSpec`] by the [`Verifier`], and a failing scenario
//! is handed to the [`Minimizer`] when `minimize_failed_scenario` is set.
//! Nothing below replaces those crates' own public APIs — this is
//! composition, not a new layer of abstraction.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

pub use lincheck_config::{ConfigError, StrategyConfig};
pub use lincheck_lts::{Lts, LtsError, LtsResult, OpContext, SequentialSpec, Verifier};
pub use lincheck_minimizer::Minimizer;
pub use lincheck_model::{
    Actor, ActorError, ActorFlags, ActorResult, ArgValue, ExecutionResult, ExecutionScenario,
    ExpandingRangeIntGenerator, MethodSignature, Outcome, ParameterGenerator, ScenarioError, StringGenerator,
};
pub use lincheck_runner::{ActorDispatcher, FailureKind, InvocationRunner, RunReport, RunnerConfig, VectorClocks};
pub use lincheck_scheduler::{
    DeterministicSwitchStrategy, ForcibleFinish, ManagedScheduler, MonitorError, MonitorId, MonitorTracker,
    RandomSwitchStrategy, SuddenResult, SwitchStrategy,
};
pub use lincheck_trace::{Completion, Guarantee, GuaranteeKind, GuaranteePolicy, OutputMode, TraceRecorder};

/// What one scenario check produced: the raw execution, the failure (if
/// any — from the runner directly, or from the verifier rejecting the
/// interleaving as `IncorrectResults`), and the shrunk scenario when
/// minimization ran and found a smaller reproduction.
pub struct CheckReport {
    pub result: ExecutionResult,
    pub failure: Option<FailureKind>,
    pub minimized: Option<ExecutionScenario>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

fn outcome_kind(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Value(_) => "Value",
        Outcome::Exception(_) => "Exception",
        Outcome::Void => "Void",
        Outcome::NoResult => "NoResult",
        Outcome::Suspended => "Suspended",
        Outcome::Cancelled => "Cancelled",
    }
}

/// The per-actor result *kind* (ignoring payload), in the fixed order the
/// scenario's own actor lists impose — stable across two runs of the same
/// scenario regardless of which interleaving the scheduler happened to
/// pick either time.
fn result_kinds(result: &ExecutionResult) -> Vec<&'static str> {
    let mut kinds: Vec<&'static str> = result.initial.iter().map(|r| outcome_kind(&r.outcome)).collect();
    for thread in &result.parallel {
        kinds.extend(thread.iter().map(|r| outcome_kind(&r.outcome)));
    }
    kinds.extend(result.post.iter().map(|r| outcome_kind(&r.outcome)));
    if let Some(v) = &result.validation {
        kinds.push(outcome_kind(&v.outcome));
    }
    kinds
}

/// Runs scenarios against `S` and reports whether every observed
/// interleaving is explainable by some linearization of `S`.
///
/// Generic over the sequential reference rather than over the dispatcher:
/// one engine instance is built per data structure under test, and each
/// `check_scenario` call takes whatever dispatcher closes over that
/// particular run's shared state.
pub struct LincheckEngine<S: SequentialSpec> {
    config: StrategyConfig,
    _spec: PhantomData<fn() -> S>,
}

impl<S: SequentialSpec> LincheckEngine<S> {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config, _spec: PhantomData }
    }

    fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            check_obstruction_freedom: self.config.check_obstruction_freedom,
            hanging_detection_threshold: self.config.hanging_detection_threshold,
            timeout: Duration::from_millis(self.config.timeout_ms),
            guarantees: GuaranteePolicy::new(self.config.guarantees.clone()),
            ..RunnerConfig::default()
        }
    }

    /// Verifies a completed run's results against `S`, folding a rejected
    /// interleaving or a defective reference spec into a [`FailureKind`]
    /// rather than returning the verifier's own `Result`.
    fn verify(result: &ExecutionResult) -> Option<FailureKind> {
        let mut verifier: Verifier<S> = Verifier::new();
        match verifier.verify(result) {
            Ok(true) => None,
            Ok(false) => Some(FailureKind::IncorrectResults),
            Err(err) => Some(FailureKind::ValidationFailure { message: err.to_string() }),
        }
    }

    /// Runs `scenario` once through an [`InvocationRunner`] built from this
    /// engine's config, then through the verifier. A failure triggers a
    /// second run with the trace recorder enabled; if that run's outcome
    /// kinds disagree with the first, the reference itself is
    /// non-deterministic and that replaces whatever failure the first run
    /// reported. Otherwise — if `minimize_failed_scenario` is set — the
    /// failure goes through the [`Minimizer`], which replays candidates
    /// through the same two stages.
    pub fn check_scenario<D>(&self, scenario: &ExecutionScenario, dispatcher: Arc<D>) -> CheckReport
    where
        D: ActorDispatcher + 'static,
    {
        let runner = InvocationRunner::new(self.runner_config());
        let report = runner.run(scenario, Arc::clone(&dispatcher), Box::new(DeterministicSwitchStrategy));
        let mut result = report.result;
        let mut failure = report.failure.or_else(|| Self::verify(&result));

        if failure.is_some() {
            let mut trace_config = self.runner_config();
            trace_config.trace_output_mode = OutputMode::BinaryDump;
            let trace_runner = InvocationRunner::new(trace_config);
            let replay = trace_runner.run(scenario, Arc::clone(&dispatcher), Box::new(DeterministicSwitchStrategy));

            let first_kinds = result_kinds(&result);
            let second_kinds = result_kinds(&replay.result);
            let replay_failure = replay.failure.or_else(|| Self::verify(&replay.result));

            if first_kinds != second_kinds {
                failure = Some(FailureKind::NonDeterminism { first: format!("{first_kinds:?}"), second: format!("{second_kinds:?}") });
            } else {
                result = replay.result;
                failure = replay_failure.or(failure);
            }
        }

        let minimized = if self.config.minimize_failed_scenario {
            failure.as_ref().map(|original| {
                let replay = |candidate: &ExecutionScenario| -> Option<FailureKind> {
                    let replay_runner = InvocationRunner::new(self.runner_config());
                    let replayed = replay_runner.run(candidate, Arc::clone(&dispatcher), Box::new(DeterministicSwitchStrategy));
                    replayed.failure.or_else(|| Self::verify(&replayed.result))
                };
                Minimizer::new(&replay).minimize(scenario.clone(), original)
            })
        } else {
            None
        };

        CheckReport { result, failure, minimized }
    }

    /// Runs every scenario in `config.custom_scenarios` and returns one
    /// report per scenario, in order. There is no built-in random scenario
    /// generator or scenario-DSL parser here — the embedding test harness
    /// supplies whatever scenarios it wants checked.
    pub fn check_all<D>(&self, dispatcher: Arc<D>) -> Vec<CheckReport>
    where
        D: ActorDispatcher + 'static,
    {
        self.config.custom_scenarios.clone().iter().map(|s| self.check_scenario(s, Arc::clone(&dispatcher))).collect()
    }
}

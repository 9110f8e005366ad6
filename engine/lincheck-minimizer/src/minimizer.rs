//! Failure minimizer: given a failing scenario, repeatedly drop one actor
//! and re-run, keeping the drop only if the same kind of failure still
//! reproduces.
//!
//! Generic over a `ReplayFn` rather than taking a runner/scheduler/LTS
//! directly, so this crate stays decoupled from how a scenario is actually
//! executed and verified — the root package supplies the closure that
//! wires runner + scheduler + lts together.

use lincheck_model::{Actor, ExecutionScenario};
use lincheck_runner::FailureKind;
use tracing::debug;

fn same_kind(a: &FailureKind, b: &FailureKind) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn without(actors: &[Actor], index: usize) -> Vec<Actor> {
    let mut actors = actors.to_vec();
    actors.remove(index);
    actors
}

/// Shrinks a failing scenario. Holds a closure rather than a runner
/// instance: building and tearing down the worker pool per candidate is
/// the caller's business, not this crate's.
pub struct Minimizer<'a> {
    replay: &'a dyn Fn(&ExecutionScenario) -> Option<FailureKind>,
}

impl<'a> Minimizer<'a> {
    pub fn new(replay: &'a dyn Fn(&ExecutionScenario) -> Option<FailureKind>) -> Self {
        Self { replay }
    }

    /// Returns the smallest scenario this minimizer could find that still
    /// reproduces a failure of the same kind as `original_failure`. Falls
    /// back to returning `scenario` unchanged if no single-actor removal
    /// ever reproduces it.
    pub fn minimize(&self, scenario: ExecutionScenario, original_failure: &FailureKind) -> ExecutionScenario {
        let mut current = scenario;
        loop {
            if let Some(reduced) = self.try_shrink_post(&current, original_failure) {
                current = reduced;
                continue;
            }
            if let Some(reduced) = self.try_shrink_parallel(&current, original_failure) {
                current = reduced;
                continue;
            }
            if let Some(reduced) = self.try_shrink_initial(&current, original_failure) {
                current = reduced;
                continue;
            }
            break;
        }
        current
    }

    fn reproduces(&self, candidate: &ExecutionScenario, original_failure: &FailureKind) -> bool {
        matches!((self.replay)(candidate), Some(ref f) if same_kind(f, original_failure))
    }

    fn try_shrink_post(&self, scenario: &ExecutionScenario, original_failure: &FailureKind) -> Option<ExecutionScenario> {
        for i in 0..scenario.post().len() {
            let candidate = ExecutionScenario::new(
                scenario.initial().to_vec(),
                scenario.parallel().to_vec(),
                without(scenario.post(), i),
                scenario.validation_actor().cloned(),
            )
            .ok()?;
            if self.reproduces(&candidate, original_failure) {
                debug!(removed_from = "post", index = i, "minimizer accepted a reduction");
                return Some(candidate);
            }
        }
        None
    }

    fn try_shrink_parallel(&self, scenario: &ExecutionScenario, original_failure: &FailureKind) -> Option<ExecutionScenario> {
        for t in 0..scenario.parallel().len() {
            for i in 0..scenario.parallel()[t].len() {
                let mut parallel = scenario.parallel().to_vec();
                parallel[t] = without(&parallel[t], i);
                let Ok(candidate) = ExecutionScenario::new(
                    scenario.initial().to_vec(),
                    parallel,
                    scenario.post().to_vec(),
                    scenario.validation_actor().cloned(),
                ) else {
                    continue;
                };
                if self.reproduces(&candidate, original_failure) {
                    debug!(removed_from = "parallel", thread = t, index = i, "minimizer accepted a reduction");
                    return Some(candidate);
                }
            }
        }
        None
    }

    fn try_shrink_initial(&self, scenario: &ExecutionScenario, original_failure: &FailureKind) -> Option<ExecutionScenario> {
        for i in 0..scenario.initial().len() {
            let candidate = ExecutionScenario::new(
                without(scenario.initial(), i),
                scenario.parallel().to_vec(),
                scenario.post().to_vec(),
                scenario.validation_actor().cloned(),
            )
            .ok()?;
            if self.reproduces(&candidate, original_failure) {
                debug!(removed_from = "initial", index = i, "minimizer accepted a reduction");
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lincheck_model::{ActorFlags, MethodSignature};

    fn actor(name: &str) -> Actor {
        Actor::new(&MethodSignature::new(name, 0), vec![], ActorFlags::default()).unwrap()
    }

    #[test]
    fn drops_every_actor_that_is_not_load_bearing_for_the_failure() {
        let scenario = ExecutionScenario::new(
            vec![actor("setup_a"), actor("setup_b")],
            vec![vec![actor("noise"), actor("bug"), actor("noise")]],
            vec![actor("teardown")],
            None,
        )
        .unwrap();

        let replay = |s: &ExecutionScenario| -> Option<FailureKind> {
            let has_bug = s.parallel().iter().flatten().any(|a| a.method() == "bug");
            has_bug.then_some(FailureKind::IncorrectResults)
        };

        let minimizer = Minimizer::new(&replay);
        let minimized = minimizer.minimize(scenario, &FailureKind::IncorrectResults);

        assert!(minimized.initial().is_empty());
        assert!(minimized.post().is_empty());
        assert_eq!(minimized.parallel()[0].len(), 1);
        assert_eq!(minimized.parallel()[0][0].method(), "bug");
    }

    #[test]
    fn stops_when_no_single_removal_still_reproduces() {
        let scenario = ExecutionScenario::new(vec![], vec![vec![actor("a"), actor("b")]], vec![], None).unwrap();
        let replay = |s: &ExecutionScenario| -> Option<FailureKind> {
            let count: usize = s.parallel().iter().map(|t| t.len()).sum();
            (count >= 2).then_some(FailureKind::IncorrectResults)
        };

        let minimizer = Minimizer::new(&replay);
        let minimized = minimizer.minimize(scenario, &FailureKind::IncorrectResults);

        assert_eq!(minimized.parallel()[0].len(), 2);
    }
}

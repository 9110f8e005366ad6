//! An [`ExecutionScenario`]: the initial/parallel/post actor sequences a
//! runner executes once and a verifier checks for linearizability.

use thiserror::Error;

use crate::actor::Actor;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("parallel part must have at least one thread")]
    NoParallelThreads,
}

/// Three ordered sequences of actors, plus an optional validation actor.
/// Immutable once built: there is no API to mutate a scenario after
/// `ExecutionScenario::new` returns it, only to read it back.
#[derive(Debug, Clone)]
pub struct ExecutionScenario {
    initial: Vec<Actor>,
    parallel: Vec<Vec<Actor>>,
    post: Vec<Actor>,
    validation_actor: Option<Actor>,
}

impl ExecutionScenario {
    pub fn new(
        initial: Vec<Actor>,
        parallel: Vec<Vec<Actor>>,
        post: Vec<Actor>,
        validation_actor: Option<Actor>,
    ) -> Result<Self, ScenarioError> {
        if parallel.is_empty() {
            return Err(ScenarioError::NoParallelThreads);
        }
        Ok(Self { initial, parallel, post, validation_actor })
    }

    pub fn initial(&self) -> &[Actor] {
        &self.initial
    }

    pub fn parallel(&self) -> &[Vec<Actor>] {
        &self.parallel
    }

    pub fn post(&self) -> &[Actor] {
        &self.post
    }

    pub fn validation_actor(&self) -> Option<&Actor> {
        self.validation_actor.as_ref()
    }

    pub fn thread_count(&self) -> usize {
        self.parallel.len()
    }

    /// Build a scenario whose parallel part is `n` threads each running
    /// `actors_per_thread` actors dropped from `pool` round-robin — the
    /// shape the minimizer and a randomized scenario generator both need,
    /// without this crate depending on any generator crate.
    pub fn with_uniform_parallel(initial: Vec<Actor>, parallel: Vec<Vec<Actor>>, post: Vec<Actor>) -> Result<Self, ScenarioError> {
        Self::new(initial, parallel, post, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorFlags, MethodSignature};

    fn actor(name: &str) -> Actor {
        Actor::new(&MethodSignature::new(name, 0), vec![], ActorFlags::default()).unwrap()
    }

    #[test]
    fn rejects_empty_parallel_part() {
        let err = ExecutionScenario::new(vec![], vec![], vec![], None).unwrap_err();
        assert_eq!(err, ScenarioError::NoParallelThreads);
    }

    #[test]
    fn builds_and_reads_back_sequences() {
        let scenario = ExecutionScenario::new(
            vec![actor("offer")],
            vec![vec![actor("poll")], vec![actor("poll")]],
            vec![actor("size")],
            None,
        )
        .unwrap();
        assert_eq!(scenario.initial().len(), 1);
        assert_eq!(scenario.thread_count(), 2);
        assert_eq!(scenario.post().len(), 1);
        assert!(scenario.validation_actor().is_none());
    }
}

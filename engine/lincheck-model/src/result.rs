//! Collected results of running an [`ExecutionScenario`] once.

use crate::actor::Actor;
use crate::outcome::Outcome;

/// The recorded effect of running one actor: its outcome, plus the vector
/// clock snapshot taken immediately before dispatch when clocks are
/// enabled — lets the verifier reconstruct a partial order across
/// threads later.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorResult {
    pub actor: Actor,
    pub outcome: Outcome,
    pub clock: Option<Vec<u64>>,
}

impl ActorResult {
    pub fn new(actor: Actor, outcome: Outcome) -> Self {
        Self { actor, outcome, clock: None }
    }

    pub fn with_clock(mut self, clock: Vec<u64>) -> Self {
        self.clock = Some(clock);
        self
    }
}

/// Per-thread result sequences mirroring an [`ExecutionScenario`]'s shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionResult {
    pub initial: Vec<ActorResult>,
    pub parallel: Vec<Vec<ActorResult>>,
    pub post: Vec<ActorResult>,
    pub validation: Option<ActorResult>,
}

impl ExecutionResult {
    pub fn new(initial: Vec<ActorResult>, parallel: Vec<Vec<ActorResult>>, post: Vec<ActorResult>, validation: Option<ActorResult>) -> Self {
        Self { initial, parallel, post, validation }
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
    fn clock_defaults_to_none_until_attached() {
        let result = ActorResult::new(actor("poll"), Outcome::Void);
        assert!(result.clock.is_none());
        let with_clock = result.with_clock(vec![1, 0]);
        assert_eq!(with_clock.clock, Some(vec![1, 0]));
    }
}

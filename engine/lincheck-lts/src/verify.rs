//! The backtracking linearizability verifier.
//!
//! Walks the lazy LTS trying every legal interleaving of the observed
//! per-thread actor sequences until one reproduces the collected results
//! exactly, or every branch is exhausted.

use std::collections::HashSet;

use lincheck_model::{ActorResult, ExecutionResult, Outcome};

use crate::lts::{Lts, LtsError};
use crate::operation::Ticket;
use crate::spec::SequentialSpec;
use crate::state::StateId;

/// A thread's position in its own actor sequence. `awaiting` is set once
/// that actor's request has suspended and we are still looking for the
/// follow-up transition that will produce its real, observed result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ThreadCursor {
    index: usize,
    awaiting: Option<Ticket>,
}

impl ThreadCursor {
    fn start() -> Self {
        Self { index: 0, awaiting: None }
    }
}

pub struct Verifier<S: SequentialSpec> {
    lts: Lts<S>,
}

impl<S: SequentialSpec> Verifier<S> {
    pub fn new() -> Self {
        Self { lts: Lts::new() }
    }

    /// Returns `Ok(true)` iff some legal interleaving through the LTS
    /// reproduces `result` exactly (the legality round-trip property). A
    /// `LtsError` — e.g. a follow-up that itself suspended — is a defect
    /// in the reference implementation, not a rejected interleaving, so
    /// it short-circuits the whole search.
    pub fn verify(&mut self, result: &ExecutionResult) -> Result<bool, LtsError> {
        let mut state = self.lts.initial_state();
        for r in &result.initial {
            let tr = self.lts.next_by_request(state, &r.actor)?;
            if !tr.request_legal(&r.outcome) {
                return Ok(false);
            }
            state = tr.next_state;
        }

        let cursors = vec![ThreadCursor::start(); result.parallel.len()];
        let mut memo: HashSet<(StateId, Vec<ThreadCursor>)> = HashSet::new();
        let mut state = match self.search(state, cursors, &result.parallel, &mut memo)? {
            Some(s) => s,
            None => return Ok(false),
        };

        for r in &result.post {
            let tr = self.lts.next_by_request(state, &r.actor)?;
            if !tr.request_legal(&r.outcome) {
                return Ok(false);
            }
            state = tr.next_state;
        }

        if let Some(validation) = &result.validation {
            let tr = self.lts.next_by_request(state, &validation.actor)?;
            if !tr.request_legal(&validation.outcome) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn all_threads_done(cursors: &[ThreadCursor], threads: &[Vec<ActorResult>]) -> bool {
        cursors.iter().enumerate().all(|(t, c)| c.index >= threads[t].len() && c.awaiting.is_none())
    }

    fn search(
        &mut self,
        state: StateId,
        cursors: Vec<ThreadCursor>,
        threads: &[Vec<ActorResult>],
        memo: &mut HashSet<(StateId, Vec<ThreadCursor>)>,
    ) -> Result<Option<StateId>, LtsError> {
        if Self::all_threads_done(&cursors, threads) {
            return Ok(Some(state));
        }
        if memo.contains(&(state, cursors.clone())) {
            return Ok(None);
        }

        for t in 0..threads.len() {
            let cursor = cursors[t].clone();

            if let Some(ticket) = cursor.awaiting {
                let expected = threads[t][cursor.index].outcome.clone();

                if self.lts.state(state).resumed.iter().any(|r| r.ticket == ticket) {
                    let tr = self.lts.next_by_follow_up(state, ticket)?;
                    if tr.follow_up_legal(&expected) {
                        let mut next_cursors = cursors.clone();
                        next_cursors[t] = ThreadCursor { index: cursor.index + 1, awaiting: None };
                        if let Some(found) = self.search(tr.next_state, next_cursors, threads, memo)? {
                            return Ok(Some(found));
                        }
                    }
                }

                // Never resumed (or resumed under a prompt-cancellation
                // flag that still allows it): a genuine cancellation is
                // the other way this ticket's slot can resolve.
                if expected == Outcome::Cancelled {
                    let prompt = threads[t][cursor.index].actor.flags().prompt_cancellation;
                    if let Ok(tr) = self.lts.next_by_cancellation(state, ticket, prompt) {
                        let mut next_cursors = cursors.clone();
                        next_cursors[t] = ThreadCursor { index: cursor.index + 1, awaiting: None };
                        if let Some(found) = self.search(tr.next_state, next_cursors, threads, memo)? {
                            return Ok(Some(found));
                        }
                    }
                }
                continue;
            }

            if cursor.index >= threads[t].len() {
                continue;
            }

            let actor_result = &threads[t][cursor.index];
            let tr = if actor_result.actor.flags().cancel_on_suspension {
                self.lts.next_by_request_absorbing_cancellation(state, &actor_result.actor, &actor_result.outcome)?
            } else {
                self.lts.next_by_request(state, &actor_result.actor)?
            };

            if tr.result == Outcome::Suspended {
                // Never resumed during the scenario: the observed result
                // must itself be `Suspended`, and the actor slot resolves
                // immediately.
                if actor_result.outcome == Outcome::Suspended {
                    let mut next_cursors = cursors.clone();
                    next_cursors[t] = ThreadCursor { index: cursor.index + 1, awaiting: None };
                    if let Some(found) = self.search(tr.next_state, next_cursors, threads, memo)? {
                        return Ok(Some(found));
                    }
                } else {
                    let mut next_cursors = cursors.clone();
                    next_cursors[t] = ThreadCursor { index: cursor.index, awaiting: Some(tr.ticket) };
                    if let Some(found) = self.search(tr.next_state, next_cursors, threads, memo)? {
                        return Ok(Some(found));
                    }
                }
                continue;
            }

            if !tr.request_legal(&actor_result.outcome) {
                continue;
            }
            let mut next_cursors = cursors.clone();
            next_cursors[t] = ThreadCursor { index: cursor.index + 1, awaiting: None };
            if let Some(found) = self.search(tr.next_state, next_cursors, threads, memo)? {
                return Ok(Some(found));
            }
        }

        memo.insert((state, cursors));
        Ok(None)
    }
}

impl<S: SequentialSpec> Default for Verifier<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lincheck_model::{Actor, ActorFlags, MethodSignature};

    #[derive(Debug, PartialEq)]
    struct Counter(i64);

    impl SequentialSpec for Counter {
        fn new_instance() -> Self {
            Counter(0)
        }

        fn invoke_request(&mut self, actor: &Actor, _ctx: &mut crate::spec::OpContext) -> Outcome {
            match actor.method() {
                "increment" => {
                    self.0 += 1;
                    Outcome::Value(serde_json::json!(self.0))
                }
                other => panic!("unknown method {other}"),
            }
        }

        fn invoke_follow_up(&mut self, _o: &Actor, _r: &Actor, _ctx: &mut crate::spec::OpContext) -> Outcome {
            unreachable!()
        }

        fn invoke_cancellation(&mut self, _o: &Actor, _p: bool, _ctx: &mut crate::spec::OpContext) -> Outcome {
            unreachable!()
        }
    }

    fn increment() -> Actor {
        Actor::new(&MethodSignature::new("increment", 0), vec![], ActorFlags::default()).unwrap()
    }

    fn result(outcome: i64) -> ActorResult {
        ActorResult::new(increment(), Outcome::Value(serde_json::json!(outcome)))
    }

    #[test]
    fn final_value_four_is_linearizable_under_some_interleaving() {
        let mut verifier: Verifier<Counter> = Verifier::new();
        let execution = ExecutionResult::new(
            vec![],
            vec![vec![result(1), result(2)], vec![result(3), result(4)]],
            vec![],
            None,
        );
        assert!(verifier.verify(&execution).unwrap());
    }

    #[test]
    fn a_result_below_the_expected_final_count_is_rejected() {
        let mut verifier: Verifier<Counter> = Verifier::new();
        let execution = ExecutionResult::new(
            vec![],
            vec![vec![result(1), result(3)], vec![result(2), result(3)]],
            vec![],
            None,
        );
        assert!(!verifier.verify(&execution).unwrap());
    }

    #[cfg(feature = "testing")]
    #[test]
    fn rendezvous_receive_and_send_linearize_through_a_follow_up() {
        use crate::fixtures::{receive_actor, send_actor, RendezvousChannelSpec};

        let mut verifier: Verifier<RendezvousChannelSpec> = Verifier::new();
        let execution = ExecutionResult::new(
            vec![],
            vec![
                vec![ActorResult::new(receive_actor().unwrap(), Outcome::Value(serde_json::json!(42)))],
                vec![ActorResult::new(send_actor(42).unwrap(), Outcome::Void)],
            ],
            vec![],
            None,
        );
        assert!(verifier.verify(&execution).unwrap());
    }

    #[cfg(feature = "testing")]
    #[test]
    fn rendezvous_receive_claiming_the_wrong_value_is_rejected() {
        use crate::fixtures::{receive_actor, send_actor, RendezvousChannelSpec};

        let mut verifier: Verifier<RendezvousChannelSpec> = Verifier::new();
        let execution = ExecutionResult::new(
            vec![],
            vec![
                vec![ActorResult::new(receive_actor().unwrap(), Outcome::Value(serde_json::json!(7)))],
                vec![ActorResult::new(send_actor(42).unwrap(), Outcome::Void)],
            ],
            vec![],
            None,
        );
        assert!(!verifier.verify(&execution).unwrap());
    }
}

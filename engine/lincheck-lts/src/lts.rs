//! The lazy, memoized labeled transition system.

use std::collections::HashMap;

use lincheck_model::{Actor, Outcome};
use thiserror::Error;

use crate::operation::{Operation, OperationKey, Ticket, NO_TICKET};
use crate::spec::{OpContext, SequentialSpec};
use crate::state::{PendingOp, ResumedEntry, State, StateId, StateInfo};
use tracing::trace;

#[derive(Debug, Error)]
pub enum LtsError {
    #[error("ticket {0} is not a pending operation in this state")]
    TicketNotPending(Ticket),
    #[error("follow-up for ticket {0} suspended; this is a defect in the sequential specification, not a legal interleaving")]
    FollowUpSuspended(Ticket),
}

pub type LtsResult<T> = Result<T, LtsError>;

/// The outcome of one `next` call.
#[derive(Debug, Clone)]
pub struct TransitionInfo {
    pub next_state: StateId,
    pub resumed_tickets: Vec<Ticket>,
    pub ticket: Ticket,
    pub remap: Option<HashMap<Ticket, Ticket>>,
    pub result: Outcome,
}

impl TransitionInfo {
    /// `request` legality: the expected result matches iff
    /// equal to the transition's result, or the transition suspended.
    pub fn request_legal(&self, expected: &Outcome) -> bool {
        expected == &self.result || self.result == Outcome::Suspended
    }

    /// `follow-up` legality: exact equality only. A follow-up whose
    /// transition suspended never reaches this check —
    /// `next_by_follow_up` rejects it outright.
    pub fn follow_up_legal(&self, expected: &Outcome) -> bool {
        expected == &self.result
    }
}

pub struct Lts<S: SequentialSpec> {
    states: Vec<State>,
    infos: Vec<StateInfo<S>>,
    cache: HashMap<(StateId, OperationKey), TransitionInfo>,
}

impl<S: SequentialSpec> Lts<S> {
    pub fn new() -> Self {
        let initial_state = State::initial();
        let initial_instance = S::new_instance();
        let initial_info = StateInfo::from_state(initial_instance, &initial_state);
        Self { states: vec![initial_state], infos: vec![initial_info], cache: HashMap::new() }
    }

    pub fn initial_state(&self) -> StateId {
        StateId::new(0)
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.index()]
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    fn replay(&self, id: StateId) -> S {
        let mut instance = S::new_instance();
        for op in &self.states[id.index()].seq_to_create {
            let mut ctx = OpContext::new(op.ticket());
            match op {
                Operation::Request { actor, .. } => {
                    instance.invoke_request(actor, &mut ctx);
                }
                Operation::FollowUp { original_actor, resuming_actor, .. } => {
                    instance.invoke_follow_up(original_actor, resuming_actor, &mut ctx);
                }
                Operation::Cancellation { original_actor, prompt, .. } => {
                    instance.invoke_cancellation(original_actor, *prompt, &mut ctx);
                }
            }
        }
        instance
    }

    /// Suspended operations remap in order of suspension; resumed
    /// operations remap in sorted-by-ticket order; unlisted tickets stay
    /// unmapped.
    fn build_remap(fresh: &State, canonical: &State) -> HashMap<Ticket, Ticket> {
        let mut map = HashMap::new();
        for (f, c) in fresh.pending.iter().zip(canonical.pending.iter()) {
            map.insert(f.ticket, c.ticket);
        }
        let mut fresh_resumed: Vec<&ResumedEntry> = fresh.resumed.iter().collect();
        let mut canon_resumed: Vec<&ResumedEntry> = canonical.resumed.iter().collect();
        fresh_resumed.sort_by_key(|r| r.ticket);
        canon_resumed.sort_by_key(|r| r.ticket);
        for (f, c) in fresh_resumed.into_iter().zip(canon_resumed.into_iter()) {
            map.insert(f.ticket, c.ticket);
        }
        map
    }

    fn intern(&mut self, candidate_state: State, candidate_info: StateInfo<S>) -> (StateId, Option<HashMap<Ticket, Ticket>>) {
        for (idx, existing) in self.infos.iter().enumerate() {
            if candidate_info.fingerprint_eq(existing) {
                let canonical_id = StateId::new(idx);
                let remap = Self::build_remap(&candidate_state, &self.states[idx]);
                trace!(canonical = idx, "interned onto existing state");
                return (canonical_id, Some(remap));
            }
        }
        let new_id = StateId::new(self.states.len());
        trace!(id = new_id.index(), "new LTS state");
        self.states.push(candidate_state);
        self.infos.push(candidate_info);
        (new_id, None)
    }

    pub fn next_by_request(&mut self, state: StateId, actor: &Actor) -> LtsResult<TransitionInfo> {
        let key = OperationKey::Request(actor.clone());
        if let Some(cached) = self.cache.get(&(state, key.clone())) {
            return Ok(cached.clone());
        }

        let base = self.states[state.index()].clone();
        let fresh_ticket = base.fresh_ticket();
        let mut instance = self.replay(state);
        let mut ctx = OpContext::new(fresh_ticket);
        let mut result = instance.invoke_request(actor, &mut ctx);

        let mut pending = base.pending.clone();
        let mut resumed = base.resumed.clone();

        if let Some(resumed_ticket) = ctx.resumed_ticket() {
            if let Some(pos) = pending.iter().position(|p| p.ticket == resumed_ticket) {
                let resumed_pending = pending.remove(pos);
                resumed.push(ResumedEntry { original_actor: resumed_pending.actor, resuming_actor: actor.clone(), ticket: resumed_ticket });
            }
        }

        let assigned_ticket = if ctx.is_suspended() {
            result = Outcome::Suspended;
            pending.push(PendingOp { actor: actor.clone(), ticket: fresh_ticket });
            fresh_ticket
        } else {
            NO_TICKET
        };

        let mut seq_to_create = base.seq_to_create.clone();
        seq_to_create.push(Operation::Request { actor: actor.clone(), ticket: assigned_ticket });
        let candidate_state = State { seq_to_create, pending, resumed };
        let candidate_info = StateInfo::from_state(instance, &candidate_state);

        let resumed_tickets = ctx.resumed_ticket().into_iter().collect();
        let (next_state, remap) = self.intern(candidate_state, candidate_info);

        let transition = TransitionInfo { next_state, resumed_tickets, ticket: assigned_ticket, remap, result };
        self.cache.insert((state, key), transition.clone());
        Ok(transition)
    }

    /// A request whose expected observed result is `Cancelled` but which
    /// did not actually suspend is absorbed as a no-op rather than treated
    /// as an illegal transition.
    pub fn next_by_request_absorbing_cancellation(&mut self, state: StateId, actor: &Actor, expected: &Outcome) -> LtsResult<TransitionInfo> {
        let transition = self.next_by_request(state, actor)?;
        if *expected == Outcome::Cancelled && transition.result != Outcome::Suspended {
            return Ok(TransitionInfo {
                next_state: state,
                resumed_tickets: vec![],
                ticket: NO_TICKET,
                remap: None,
                result: Outcome::Cancelled,
            });
        }
        Ok(transition)
    }

    pub fn next_by_follow_up(&mut self, state: StateId, ticket: Ticket) -> LtsResult<TransitionInfo> {
        let key = OperationKey::FollowUp(ticket);
        if let Some(cached) = self.cache.get(&(state, key.clone())) {
            return Ok(cached.clone());
        }

        let base = self.states[state.index()].clone();
        let resumed_entry = base.resumed.iter().find(|r| r.ticket == ticket).cloned().ok_or(LtsError::TicketNotPending(ticket))?;

        let mut instance = self.replay(state);
        let mut ctx = OpContext::new(ticket);
        let result = instance.invoke_follow_up(&resumed_entry.original_actor, &resumed_entry.resuming_actor, &mut ctx);
        if ctx.is_suspended() {
            return Err(LtsError::FollowUpSuspended(ticket));
        }

        let resumed: Vec<ResumedEntry> = base.resumed.iter().filter(|r| r.ticket != ticket).cloned().collect();
        let pending = base.pending.clone();
        let mut seq_to_create = base.seq_to_create.clone();
        seq_to_create.push(Operation::FollowUp {
            original_actor: resumed_entry.original_actor.clone(),
            resuming_actor: resumed_entry.resuming_actor.clone(),
            ticket,
        });
        let candidate_state = State { seq_to_create, pending, resumed };
        let candidate_info = StateInfo::from_state(instance, &candidate_state);
        let (next_state, remap) = self.intern(candidate_state, candidate_info);

        let transition = TransitionInfo { next_state, resumed_tickets: vec![], ticket, remap, result };
        self.cache.insert((state, key), transition.clone());
        Ok(transition)
    }

    pub fn next_by_cancellation(&mut self, state: StateId, ticket: Ticket, prompt: bool) -> LtsResult<TransitionInfo> {
        let key = OperationKey::Cancellation(ticket);
        if let Some(cached) = self.cache.get(&(state, key.clone())) {
            return Ok(cached.clone());
        }

        let base = self.states[state.index()].clone();
        let (original_actor, pending, resumed) = if let Some(pos) = base.pending.iter().position(|p| p.ticket == ticket) {
            let mut pending = base.pending.clone();
            let removed = pending.remove(pos);
            (removed.actor, pending, base.resumed.clone())
        } else if prompt {
            let pos = base.resumed.iter().position(|r| r.ticket == ticket).ok_or(LtsError::TicketNotPending(ticket))?;
            let mut resumed = base.resumed.clone();
            let removed = resumed.remove(pos);
            (removed.original_actor, base.pending.clone(), resumed)
        } else {
            return Err(LtsError::TicketNotPending(ticket));
        };

        let mut instance = self.replay(state);
        let mut ctx = OpContext::new(ticket);
        let _ = instance.invoke_cancellation(&original_actor, prompt, &mut ctx);

        let mut seq_to_create = base.seq_to_create.clone();
        seq_to_create.push(Operation::Cancellation { original_actor: original_actor.clone(), prompt, ticket });
        let candidate_state = State { seq_to_create, pending, resumed };
        let candidate_info = StateInfo::from_state(instance, &candidate_state);
        let (next_state, remap) = self.intern(candidate_state, candidate_info);

        let transition = TransitionInfo { next_state, resumed_tickets: vec![], ticket, remap, result: Outcome::Cancelled };
        self.cache.insert((state, key), transition.clone());
        Ok(transition)
    }
}

impl<S: SequentialSpec> Default for Lts<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lincheck_model::{ActorFlags, MethodSignature};

    #[derive(Debug, PartialEq)]
    struct Counter(i64);

    impl SequentialSpec for Counter {
        fn new_instance() -> Self {
            Counter(0)
        }

        fn invoke_request(&mut self, actor: &Actor, _ctx: &mut OpContext) -> Outcome {
            match actor.method() {
                "increment" => {
                    self.0 += 1;
                    Outcome::Value(serde_json::json!(self.0))
                }
                "get" => Outcome::Value(serde_json::json!(self.0)),
                other => panic!("unknown method {other}"),
            }
        }

        fn invoke_follow_up(&mut self, _original_actor: &Actor, _resuming_actor: &Actor, _ctx: &mut OpContext) -> Outcome {
            unreachable!("counter has no suspendable operations")
        }

        fn invoke_cancellation(&mut self, _original_actor: &Actor, _prompt: bool, _ctx: &mut OpContext) -> Outcome {
            unreachable!("counter has no suspendable operations")
        }
    }

    fn actor(name: &str) -> Actor {
        Actor::new(&MethodSignature::new(name, 0), vec![], ActorFlags::default()).unwrap()
    }

    #[test]
    fn determinism_same_state_same_actor_same_transition() {
        let mut lts: Lts<Counter> = Lts::new();
        let initial = lts.initial_state();
        let t1 = lts.next_by_request(initial, &actor("increment")).unwrap();
        let t2 = lts.next_by_request(initial, &actor("increment")).unwrap();
        assert_eq!(t1.result, t2.result);
        assert_eq!(t1.next_state, t2.next_state);
    }

    #[test]
    fn repeated_increments_from_identical_states_intern_to_one_state() {
        let mut lts: Lts<Counter> = Lts::new();
        let s0 = lts.initial_state();
        let s1 = lts.next_by_request(s0, &actor("increment")).unwrap().next_state;
        let s1_again_from_fresh_path = {
            let mut other: Lts<Counter> = Lts::new();
            other.next_by_request(other.initial_state(), &actor("increment")).unwrap().next_state
        };
        // same crate instance, compare structurally via replay result
        assert_eq!(lts.replay(s1).0, lts.replay(s1_again_from_fresh_path).0);
    }

    #[test]
    fn request_legality_accepts_exact_match_or_suspended() {
        let transition = TransitionInfo {
            next_state: StateId::new(0),
            resumed_tickets: vec![],
            ticket: NO_TICKET,
            remap: None,
            result: Outcome::Value(serde_json::json!(1)),
        };
        assert!(transition.request_legal(&Outcome::Value(serde_json::json!(1))));
        assert!(!transition.request_legal(&Outcome::Value(serde_json::json!(2))));
    }

    use proptest::prelude::*;

    proptest! {
        // Interning identity: two independently-built LTS instances
        // driven through the same sequence of requests must reach
        // fingerprint-equal states at every step, regardless of the path taken
        // to get there.
        #[test]
        fn identical_request_sequences_intern_to_fingerprint_equal_states(methods in prop::collection::vec(prop_oneof![Just("increment"), Just("get")], 0..16)) {
            let mut left: Lts<Counter> = Lts::new();
            let mut right: Lts<Counter> = Lts::new();
            let mut left_state = left.initial_state();
            let mut right_state = right.initial_state();

            for method in &methods {
                let left_transition = left.next_by_request(left_state, &actor(*method)).unwrap();
                let right_transition = right.next_by_request(right_state, &actor(*method)).unwrap();
                prop_assert_eq!(&left_transition.result, &right_transition.result);
                left_state = left_transition.next_state;
                right_state = right_transition.next_state;
                prop_assert_eq!(left.replay(left_state).0, right.replay(right_state).0);
            }
        }
    }
}

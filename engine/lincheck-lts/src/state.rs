//! LTS states and the `StateInfo` fingerprint used to intern them.
//!
//! `State` and `StateInfo` live in one arena indexed by a stable
//! [`StateId`], rather than the cyclic `Rc<RefCell<_>>` back-reference the
//! two-phase-insertion design note warns against: the canonical state's
//! id is decided first, and every consumer (including the state itself)
//! holds it as a plain integer.

use lincheck_model::Actor;

use crate::operation::{Operation, Ticket};
use crate::spec::SequentialSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(u32);

impl StateId {
    pub(crate) fn new(idx: usize) -> Self {
        Self(idx as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct PendingOp {
    pub actor: Actor,
    pub ticket: Ticket,
}

#[derive(Debug, Clone)]
pub struct ResumedEntry {
    pub original_actor: Actor,
    pub resuming_actor: Actor,
    pub ticket: Ticket,
}

/// A state's identity: the path of operations that produced it from the
/// initial state, plus the ticket bookkeeping the LTS tracks alongside
/// the reference instance (not derivable from the reference instance
/// itself, since ticket assignment is an LTS-level concern).
#[derive(Debug, Clone)]
pub struct State {
    pub seq_to_create: Vec<Operation>,
    pub pending: Vec<PendingOp>,
    pub resumed: Vec<ResumedEntry>,
}

impl State {
    pub fn initial() -> Self {
        Self { seq_to_create: Vec::new(), pending: Vec::new(), resumed: Vec::new() }
    }

    pub fn used_tickets(&self) -> Vec<Ticket> {
        let mut used: Vec<Ticket> = self.pending.iter().map(|p| p.ticket).chain(self.resumed.iter().map(|r| r.ticket)).collect();
        used.sort_unstable();
        used
    }

    /// Smallest non-negative ticket not currently in use.
    pub fn fresh_ticket(&self) -> Ticket {
        let used = self.used_tickets();
        let mut candidate: Ticket = 0;
        for t in used {
            if t == candidate {
                candidate += 1;
            } else if t > candidate {
                break;
            }
        }
        candidate
    }
}

/// Fingerprint used for interning: the replayed reference
/// instance plus the ordered list of suspended actors and the
/// sorted-by-ticket list of resumption pairings.
pub struct StateInfo<S> {
    pub reference_instance: S,
    pub suspended: Vec<Actor>,
    pub resumed: Vec<(Actor, Actor, Ticket)>,
}

impl<S: SequentialSpec> StateInfo<S> {
    pub fn from_state(instance: S, state: &State) -> Self {
        let suspended = state.pending.iter().map(|p| p.actor.clone()).collect();
        let mut resumed: Vec<(Actor, Actor, Ticket)> =
            state.resumed.iter().map(|r| (r.original_actor.clone(), r.resuming_actor.clone(), r.ticket)).collect();
        resumed.sort_by_key(|(_, _, t)| *t);
        Self { reference_instance: instance, suspended, resumed }
    }

    /// Order-independent equality: two states fingerprint the same iff the
    /// reference instance matches and the suspended/resumed actor
    /// multisets match, regardless of which tickets happened to be
    /// assigned along the way (that's exactly what ticket remapping fixes
    /// up afterward).
    pub fn fingerprint_eq(&self, other: &Self) -> bool {
        if self.reference_instance != other.reference_instance {
            return false;
        }
        let mut a: Vec<&Actor> = self.suspended.iter().collect();
        let mut b: Vec<&Actor> = other.suspended.iter().collect();
        a.sort_by_key(|x| x.sort_key());
        b.sort_by_key(|x| x.sort_key());
        if a != b {
            return false;
        }
        let mut ra: Vec<(&Actor, &Actor)> = self.resumed.iter().map(|(o, r, _)| (o, r)).collect();
        let mut rb: Vec<(&Actor, &Actor)> = other.resumed.iter().map(|(o, r, _)| (o, r)).collect();
        ra.sort_by_key(|(o, r)| (o.sort_key(), r.sort_key()));
        rb.sort_by_key(|(o, r)| (o.sort_key(), r.sort_key()));
        ra == rb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ticket_is_smallest_missing_non_negative_integer() {
        let mut state = State::initial();
        state.pending.push(PendingOp { actor: test_actor("a"), ticket: 0 });
        state.pending.push(PendingOp { actor: test_actor("b"), ticket: 2 });
        assert_eq!(state.fresh_ticket(), 1);
    }

    #[test]
    fn fresh_ticket_on_empty_state_is_zero() {
        assert_eq!(State::initial().fresh_ticket(), 0);
    }

    fn test_actor(name: &str) -> Actor {
        use lincheck_model::{ActorFlags, MethodSignature};
        Actor::new(&MethodSignature::new(name, 0), vec![], ActorFlags::default()).unwrap()
    }

    use proptest::prelude::*;

    proptest! {
        // Ticket density: for any set of already-used tickets,
        // `fresh_ticket` must return the one value that turns that set into
        // a dense 0..n prefix, never skipping a hole or reusing a ticket
        // that's still pending/resumed.
        #[test]
        fn fresh_ticket_fills_the_lowest_unused_slot(used in prop::collection::hash_set(0i32..64, 0..24)) {
            let mut state = State::initial();
            for (i, ticket) in used.iter().enumerate() {
                state.pending.push(PendingOp { actor: test_actor(&format!("actor-{i}")), ticket: *ticket });
            }

            let fresh = state.fresh_ticket();
            prop_assert!(!used.contains(&fresh));
            prop_assert!((0..fresh).all(|t| used.contains(&t)));
        }
    }
}

//! LTS-level operations: the three-part request / follow-up /
//! cancellation protocol for partial (suspendable) operations.

use lincheck_model::Actor;

pub type Ticket = i32;
pub const NO_TICKET: Ticket = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Request,
    FollowUp,
    Cancellation,
}

/// One edge of `seqToCreate`: a fully-resolved step that was applied to
/// reach some LTS state from the initial one. Carries everything
/// [`crate::lts::Lts::replay`] needs to reproduce it deterministically.
#[derive(Debug, Clone)]
pub enum Operation {
    Request { actor: Actor, ticket: Ticket },
    FollowUp { original_actor: Actor, resuming_actor: Actor, ticket: Ticket },
    Cancellation { original_actor: Actor, prompt: bool, ticket: Ticket },
}

impl Operation {
    pub fn ticket(&self) -> Ticket {
        match self {
            Operation::Request { ticket, .. } => *ticket,
            Operation::FollowUp { ticket, .. } => *ticket,
            Operation::Cancellation { ticket, .. } => *ticket,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Request { .. } => OperationKind::Request,
            Operation::FollowUp { .. } => OperationKind::FollowUp,
            Operation::Cancellation { .. } => OperationKind::Cancellation,
        }
    }

    pub fn actor(&self) -> &Actor {
        match self {
            Operation::Request { actor, .. } => actor,
            Operation::FollowUp { original_actor, .. } => original_actor,
            Operation::Cancellation { original_actor, .. } => original_actor,
        }
    }
}

/// Memoization key for "compute-if-absent per actor" (request) / "per
/// ticket" (follow-up, cancellation) against `next`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKey {
    Request(Actor),
    FollowUp(Ticket),
    Cancellation(Ticket),
}

//! The labeled transition system and linearizability verifier. Consumes
//! the actor/outcome vocabulary from `lincheck-model` and has no
//! dependency on the scheduler or trace recorder — it verifies collected
//! results after the fact, it never observes an execution live.

mod lts;
mod operation;
mod spec;
mod state;
mod verify;

#[cfg(feature = "testing")]
pub mod fixtures;

pub use lts::{Lts, LtsError, LtsResult, TransitionInfo};
pub use operation::{Operation, OperationKey, OperationKind, Ticket, NO_TICKET};
pub use spec::{OpContext, SequentialSpec};
pub use state::{PendingOp, ResumedEntry, State, StateId, StateInfo};
pub use verify::Verifier;

//! The pluggable boundary between the runner and the concurrent system
//! under test: the runner knows how to schedule and collect results, not
//! how to actually invoke a method on the user's data structure.

use lincheck_model::{Actor, Outcome};
use lincheck_scheduler::ManagedScheduler;

/// Implemented by the embedding test harness. Receives the scheduler
/// driving this invocation so it can call the `before_*` hooks around any
/// shared access the dispatched method performs — the runner only wraps
/// each call with the switch point a plain actor entry/exit implies
/// ([`crate::runner::InvocationRunner::run`]); everything inside the
/// method body is the dispatcher's own instrumentation to make.
pub trait ActorDispatcher: Send + Sync {
    fn dispatch(&self, tid: usize, actor: &Actor, scheduler: &ManagedScheduler) -> Outcome;
}

impl<F> ActorDispatcher for F
where
    F: Fn(usize, &Actor, &ManagedScheduler) -> Outcome + Send + Sync,
{
    fn dispatch(&self, tid: usize, actor: &Actor, scheduler: &ManagedScheduler) -> Outcome {
        self(tid, actor, scheduler)
    }
}

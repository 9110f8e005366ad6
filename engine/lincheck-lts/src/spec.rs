//! The trait boundary between the LTS and a sequential reference
//! implementation.
//!
//! Rust has no reflective "clone via replay" and no language-level
//! suspend primitive, so a suspendable method is split into an explicit
//! request half and follow-up half, and suspension is reported through an
//! [`OpContext`] rather than captured as a coroutine continuation object.

use lincheck_model::{Actor, Outcome};

use crate::operation::Ticket;

/// Passed by `&mut` reference to every `invoke_*` call. An implementation
/// reports that its request cannot complete yet by calling
/// [`OpContext::suspend`] — at which point [`OpContext::ticket`] is the
/// ticket this operation will be filed under, so a reference that needs to
/// remember "who is waiting" (e.g. a rendezvous channel's pending queue)
/// can stash it without the engine handing out a boxed continuation.
/// An implementation whose effect resumes another pending ticket (e.g.
/// `send` resuming a blocked `receive`) reports that by calling
/// [`OpContext::resume`].
#[derive(Debug)]
pub struct OpContext {
    ticket: Ticket,
    suspended: bool,
    resumed_ticket: Option<Ticket>,
}

impl OpContext {
    /// `ticket` is the ticket this request would be assigned if it
    /// suspends; it is reserved ahead of the call so implementations can
    /// record it before knowing whether they'll actually use it.
    pub fn new(ticket: Ticket) -> Self {
        Self { ticket, suspended: false, resumed_ticket: None }
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self, ticket: Ticket) {
        self.resumed_ticket = Some(ticket);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn resumed_ticket(&self) -> Option<Ticket> {
        self.resumed_ticket
    }
}

/// A sequential reference implementation the LTS verifies schedules
/// against. `PartialEq` (not `Clone`) is the requirement: the LTS never
/// copies an instance, it replays `seqToCreate` on a fresh one and
/// compares the resulting instances directly for state interning.
pub trait SequentialSpec: PartialEq + Send {
    fn new_instance() -> Self
    where
        Self: Sized;

    /// The REQUEST half. Call `ctx.suspend()` if the operation cannot
    /// complete yet; call `ctx.resume(ticket)` if completing this request
    /// also resumes some other currently-pending ticket.
    fn invoke_request(&mut self, actor: &Actor, ctx: &mut OpContext) -> Outcome;

    /// The FOLLOW_UP half for a ticket that was resumed by `resuming_actor`.
    /// Must never itself suspend — an implementation that cannot
    /// guarantee this is not a valid sequential reference for this engine.
    fn invoke_follow_up(&mut self, original_actor: &Actor, resuming_actor: &Actor, ctx: &mut OpContext) -> Outcome;

    /// Cancel a previously suspended ticket. `prompt` mirrors the actor's
    /// `prompt_cancellation` flag: non-prompt cancellation requires the
    /// ticket to still be un-resumed; prompt cancellation allows cancelling
    /// a resumed-but-not-yet-followed-up ticket too.
    fn invoke_cancellation(&mut self, original_actor: &Actor, prompt: bool, ctx: &mut OpContext) -> Outcome;
}

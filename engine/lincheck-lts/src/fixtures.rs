//! Reference sequential specifications for the end-to-end scenarios.
//! Gated behind the `testing` feature: these exist so the runner's and
//! the root crate's integration tests have something concrete to verify
//! against, not as part of the engine's public surface.

use std::collections::VecDeque;

use lincheck_model::{ActorError, ActorFlags, Actor, MethodSignature, Outcome};

use crate::operation::Ticket;
use crate::spec::{OpContext, SequentialSpec};

fn signature(name: &str, arity: usize) -> MethodSignature {
    MethodSignature::new(name, arity)
}

pub fn offer_actor(value: i64) -> Result<Actor, ActorError> {
    Actor::new(&signature("offer", 1), vec![lincheck_model::ArgValue::Int(value)], ActorFlags::default())
}

pub fn poll_actor() -> Result<Actor, ActorError> {
    Actor::new(&signature("poll", 0), vec![], ActorFlags::default())
}

/// S1: single-producer-style FIFO queue. `poll` on empty returns
/// `Outcome::Void` rather than suspending — this fixture models a
/// non-blocking queue, not a channel.
#[derive(Debug, PartialEq)]
pub struct FifoQueueSpec {
    items: VecDeque<i64>,
}

impl SequentialSpec for FifoQueueSpec {
    fn new_instance() -> Self {
        Self { items: VecDeque::new() }
    }

    fn invoke_request(&mut self, actor: &Actor, _ctx: &mut OpContext) -> Outcome {
        match actor.method() {
            "offer" => {
                let lincheck_model::ArgValue::Int(v) = &actor.args()[0] else { panic!("offer takes an int") };
                self.items.push_back(*v);
                Outcome::Void
            }
            "poll" => match self.items.pop_front() {
                Some(v) => Outcome::Value(serde_json::json!(v)),
                None => Outcome::Value(serde_json::Value::Null),
            },
            other => panic!("FifoQueueSpec has no method `{other}`"),
        }
    }

    fn invoke_follow_up(&mut self, _original_actor: &Actor, _resuming_actor: &Actor, _ctx: &mut OpContext) -> Outcome {
        unreachable!("FifoQueueSpec never suspends")
    }

    fn invoke_cancellation(&mut self, _original_actor: &Actor, _prompt: bool, _ctx: &mut OpContext) -> Outcome {
        unreachable!("FifoQueueSpec never suspends")
    }
}

/// S2: a counter guarded by a reentrant lock at the scheduler level. The
/// sequential reference only needs to model the arithmetic — mutual
/// exclusion is the scheduler's and monitor tracker's job, exercised by
/// `lincheck-scheduler`, not re-modeled here.
#[derive(Debug, PartialEq)]
pub struct ReentrantCounterSpec {
    value: i64,
}

pub fn increment_actor() -> Result<Actor, ActorError> {
    Actor::new(&signature("increment", 0), vec![], ActorFlags::default())
}

impl SequentialSpec for ReentrantCounterSpec {
    fn new_instance() -> Self {
        Self { value: 0 }
    }

    fn invoke_request(&mut self, actor: &Actor, _ctx: &mut OpContext) -> Outcome {
        match actor.method() {
            "increment" => {
                self.value += 1;
                Outcome::Value(serde_json::json!(self.value))
            }
            other => panic!("ReentrantCounterSpec has no method `{other}`"),
        }
    }

    fn invoke_follow_up(&mut self, _original_actor: &Actor, _resuming_actor: &Actor, _ctx: &mut OpContext) -> Outcome {
        unreachable!("ReentrantCounterSpec never suspends")
    }

    fn invoke_cancellation(&mut self, _original_actor: &Actor, _prompt: bool, _ctx: &mut OpContext) -> Outcome {
        unreachable!("ReentrantCounterSpec never suspends")
    }
}

/// A single-slot rendezvous channel. `send` and `receive` each suspend
/// until paired with the complementary operation; the ticket that would
/// be assigned on suspension is stashed in the pending queue rather than
/// captured as a continuation (see [`OpContext`]'s doc comment for why).
#[derive(Debug, PartialEq)]
pub struct RendezvousChannelSpec {
    pending_senders: VecDeque<(i64, Ticket)>,
    pending_receivers: VecDeque<Ticket>,
}

pub fn send_actor(value: i64) -> Result<Actor, ActorError> {
    Actor::new(&signature("send", 1), vec![lincheck_model::ArgValue::Int(value)], ActorFlags::default())
}

pub fn send_actor_with_flags(value: i64, flags: ActorFlags) -> Result<Actor, ActorError> {
    Actor::new(&signature("send", 1), vec![lincheck_model::ArgValue::Int(value)], flags)
}

pub fn receive_actor() -> Result<Actor, ActorError> {
    Actor::new(&signature("receive", 0), vec![], ActorFlags::default())
}

pub fn receive_actor_with_flags(flags: ActorFlags) -> Result<Actor, ActorError> {
    Actor::new(&signature("receive", 0), vec![], flags)
}

impl SequentialSpec for RendezvousChannelSpec {
    fn new_instance() -> Self {
        Self { pending_senders: VecDeque::new(), pending_receivers: VecDeque::new() }
    }

    fn invoke_request(&mut self, actor: &Actor, ctx: &mut OpContext) -> Outcome {
        match actor.method() {
            "receive" => {
                if let Some((value, sender_ticket)) = self.pending_senders.pop_front() {
                    ctx.resume(sender_ticket);
                    Outcome::Value(serde_json::json!(value))
                } else {
                    ctx.suspend();
                    self.pending_receivers.push_back(ctx.ticket());
                    Outcome::Suspended
                }
            }
            "send" => {
                let lincheck_model::ArgValue::Int(v) = &actor.args()[0] else { panic!("send takes an int") };
                let v = *v;
                if let Some(receiver_ticket) = self.pending_receivers.pop_front() {
                    ctx.resume(receiver_ticket);
                    Outcome::Void
                } else {
                    ctx.suspend();
                    self.pending_senders.push_back((v, ctx.ticket()));
                    Outcome::Suspended
                }
            }
            other => panic!("RendezvousChannelSpec has no method `{other}`"),
        }
    }

    fn invoke_follow_up(&mut self, original_actor: &Actor, resuming_actor: &Actor, _ctx: &mut OpContext) -> Outcome {
        match original_actor.method() {
            "receive" => {
                let lincheck_model::ArgValue::Int(v) = &resuming_actor.args()[0] else { panic!("send takes an int") };
                Outcome::Value(serde_json::json!(v))
            }
            "send" => Outcome::Void,
            other => panic!("RendezvousChannelSpec has no method `{other}`"),
        }
    }

    fn invoke_cancellation(&mut self, original_actor: &Actor, _prompt: bool, ctx: &mut OpContext) -> Outcome {
        match original_actor.method() {
            "receive" => {
                self.pending_receivers.retain(|t| *t != ctx.ticket());
                Outcome::Cancelled
            }
            "send" => {
                self.pending_senders.retain(|(_, t)| *t != ctx.ticket());
                Outcome::Cancelled
            }
            other => panic!("RendezvousChannelSpec has no method `{other}`"),
        }
    }
}

//! Invocation runner: executes one scenario's initial, parallel, and post
//! actors against a pluggable [`ActorDispatcher`] and collects an
//! `ExecutionResult`, wiring the managed scheduler and trace recorder
//! around the parallel part.

mod clock;
mod dispatch;
mod failure;
mod runner;

pub use clock::VectorClocks;
pub use dispatch::ActorDispatcher;
pub use failure::FailureKind;
pub use runner::{InvocationRunner, RunReport, RunnerConfig};

//! The failure kinds a completed invocation can report.

/// Outward-facing report type. `IncorrectResults` and `Non-determinism`
/// are decided by whoever runs the LTS verifier over this crate's
/// [`crate::runner::RunReport`] — the runner itself can only observe the
/// other four directly while executing.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// Collected results cannot be produced by any LTS traversal.
    IncorrectResults,
    /// A mandatory switch had no eligible thread, or the livelock
    /// threshold was crossed. Carries a thread dump.
    Deadlock { thread_dump: Vec<String> },
    /// Active-lock detected while the obstruction-freedom guarantee was
    /// required.
    ObstructionFreedomViolation { code_loc: String },
    /// The test code threw an exception not declared by the actor's
    /// signature.
    UnexpectedException { actor_method: String, message: String },
    /// The validation actor threw.
    ValidationFailure { message: String },
    /// On the second (trace-collecting) run, the observed result kind
    /// disagreed with the first run.
    NonDeterminism { first: String, second: String },
}

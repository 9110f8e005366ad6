//! A single method invocation within a scenario.

use thiserror::Error;

/// Argument or return payload carried by an [`Actor`].
///
/// The engine is language-agnostic about the sequential reference it
/// verifies against, so arguments are a small closed set of JSON-like
/// variants rather than a generic `T`. `CurrentThreadId` is a sentinel: a
/// reference method may want to know which worker thread is invoking it
/// (e.g. to tag ownership), and the runner substitutes the real thread
/// index for it immediately before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ArgValue {
    Int(i64),
    Str(String),
    Bool(bool),
    Unit,
    CurrentThreadId,
}

/// Behavioral flags attached to an actor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ActorFlags {
    /// If the request suspends, treat the expected result `Cancelled` as
    /// satisfied by absorbing the suspension rather than requiring an
    /// actual cancellation transition (scenario S4).
    pub cancel_on_suspension: bool,
    /// Permit additional suspension points beyond the ones a minimal
    /// legal interleaving would need.
    pub allows_extra_suspensions: bool,
    /// Cancellation may run even after the ticket has already been
    /// resumed (non-prompt mode forbids this).
    pub prompt_cancellation: bool,
}

/// Declares the shape a reference method must have: its arity and which
/// exception (error) class names it is allowed to throw. `Actor::new`
/// validates a concrete invocation against this before construction.
#[derive(Debug, Clone)]
pub struct MethodSignature {
    pub name: String,
    pub arity: usize,
    pub declared_exceptions: Vec<String>,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self { name: name.into(), arity, declared_exceptions: Vec::new() }
    }

    pub fn with_exceptions(mut self, exceptions: impl IntoIterator<Item = String>) -> Self {
        self.declared_exceptions = exceptions.into_iter().collect();
        self
    }

    fn is_assignable(&self, exception_class: &str, throwable_root: &str) -> bool {
        exception_class == throwable_root || self.declared_exceptions.iter().any(|e| e == exception_class)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActorError {
    #[error("method `{method}` expects {expected} argument(s), got {actual}")]
    ArityMismatch { method: String, expected: usize, actual: usize },
    #[error("exception class `{0}` is not assignable to the declared throwable hierarchy")]
    UnassignableException(String),
}

/// An immutable invocation record: target method, arguments, and behavioral
/// flags. Once constructed an `Actor` never changes; the scheduler, trace
/// recorder and LTS all hand it around by shared reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Actor {
    method: String,
    args: Vec<ArgValue>,
    flags: ActorFlags,
}

impl Actor {
    /// Validate `args` against `signature` (arity, and — for a suspendable
    /// method — excluding the trailing continuation argument a coroutine
    /// transform would otherwise append) before freezing the actor.
    pub fn new(signature: &MethodSignature, args: Vec<ArgValue>, flags: ActorFlags) -> Result<Self, ActorError> {
        if args.len() != signature.arity {
            return Err(ActorError::ArityMismatch {
                method: signature.name.clone(),
                expected: signature.arity,
                actual: args.len(),
            });
        }
        Ok(Self { method: signature.name.clone(), args, flags })
    }

    /// Validate that a declared exception type is assignable to the
    /// platform's top-level throwable type for this method's signature.
    pub fn check_exception_assignable(
        signature: &MethodSignature,
        exception_class: &str,
        throwable_root: &str,
    ) -> Result<(), ActorError> {
        if signature.is_assignable(exception_class, throwable_root) {
            Ok(())
        } else {
            Err(ActorError::UnassignableException(exception_class.to_string()))
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[ArgValue] {
        &self.args
    }

    pub fn flags(&self) -> ActorFlags {
        self.flags
    }

    /// Resolve `ArgValue::CurrentThreadId` sentinels against the worker
    /// thread actually executing this actor. Called once by the runner
    /// immediately before dispatch; the frozen `Actor` itself is untouched.
    /// Stable total-order key used by the LTS when comparing the
    /// suspended/resumed sets of two `StateInfo`s order-independently
    /// (Actor itself has no natural ordering; this is only a comparison
    /// convenience, not part of the actor's own identity).
    pub fn sort_key(&self) -> String {
        format!("{}{:?}{:?}", self.method, self.args, self.flags)
    }

    pub fn resolve_args(&self, tid: usize) -> Vec<ArgValue> {
        self.args
            .iter()
            .map(|a| match a {
                ArgValue::CurrentThreadId => ArgValue::Int(tid as i64),
                other => other.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_mismatch_is_rejected() {
        let sig = MethodSignature::new("push", 1);
        let err = Actor::new(&sig, vec![], ActorFlags::default()).unwrap_err();
        assert_eq!(err, ActorError::ArityMismatch { method: "push".into(), expected: 1, actual: 0 });
    }

    #[test]
    fn matching_arity_constructs() {
        let sig = MethodSignature::new("push", 1);
        let actor = Actor::new(&sig, vec![ArgValue::Int(1)], ActorFlags::default()).unwrap();
        assert_eq!(actor.method(), "push");
        assert_eq!(actor.args(), &[ArgValue::Int(1)]);
    }

    #[test]
    fn unassignable_exception_is_rejected() {
        let sig = MethodSignature::new("poll", 0).with_exceptions(["QueueEmpty".to_string()]);
        assert!(Actor::check_exception_assignable(&sig, "QueueEmpty", "Throwable").is_ok());
        assert!(Actor::check_exception_assignable(&sig, "IOError", "Throwable").is_err());
        assert!(Actor::check_exception_assignable(&sig, "Throwable", "Throwable").is_ok());
    }

    #[test]
    fn current_thread_id_resolves_at_dispatch() {
        let sig = MethodSignature::new("tag", 1);
        let actor = Actor::new(&sig, vec![ArgValue::CurrentThreadId], ActorFlags::default()).unwrap();
        assert_eq!(actor.resolve_args(3), vec![ArgValue::Int(3)]);
    }
}

//! The `ForcibleFinish` unwind signal.
//!
//! Once `sudden_result` is set, every worker aborts at its next switch
//! point by raising this marker via `panic_any` rather than returning
//! normally. It must be caught nowhere except the runner boundary: letting
//! it unwind scopes cleanly is exactly what makes forced termination safe
//! to interleave with ordinary actor execution.

use std::any::Any;

/// Zero-sized marker distinguishing a forced-finish unwind from a genuine
/// actor panic. Carried by `std::panic::panic_any`.
#[derive(Debug, Clone, Copy)]
pub struct ForcibleFinish;

impl ForcibleFinish {
    pub fn raise() -> ! {
        std::panic::panic_any(ForcibleFinish)
    }

    /// True if a `catch_unwind` payload is this signal (as opposed to an
    /// actor's own panic, which the runner reports as `UnexpectedException`).
    pub fn is_forcible_finish(payload: &(dyn Any + Send)) -> bool {
        payload.downcast_ref::<ForcibleFinish>().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raising_and_catching_round_trips() {
        let result = std::panic::catch_unwind(|| ForcibleFinish::raise());
        let err = result.unwrap_err();
        assert!(ForcibleFinish::is_forcible_finish(err.as_ref()));
    }

    #[test]
    fn ordinary_panic_is_not_forcible_finish() {
        let result = std::panic::catch_unwind(|| panic!("boom"));
        let err = result.unwrap_err();
        assert!(!ForcibleFinish::is_forcible_finish(err.as_ref()));
    }
}

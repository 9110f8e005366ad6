//! The typed result of running (or attempting to run) one actor.
//!
//! Named `Outcome` rather than `Result` to keep the very common
//! `std::result::Result` unshadowed everywhere else in the workspace.

/// What one actor invocation produced. Equality is custom: `Value`
/// compares payloads, `Exception` compares canonical class names,
/// everything else compares by variant alone — exactly the equality the
/// LTS legality rules require when matching an observed outcome against
/// a computed `TransitionInfo::result`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Outcome {
    Value(serde_json::Value),
    Exception(String),
    Void,
    NoResult,
    Suspended,
    Cancelled,
}

impl PartialEq for Outcome {
    fn eq(&self, other: &Self) -> bool {
        use Outcome::*;
        match (self, other) {
            (Value(a), Value(b)) => a == b,
            (Exception(a), Exception(b)) => a == b,
            (Void, Void) | (NoResult, NoResult) | (Suspended, Suspended) | (Cancelled, Cancelled) => true,
            _ => false,
        }
    }
}

impl Eq for Outcome {}

impl Outcome {
    pub fn is_suspended(&self) -> bool {
        matches!(self, Outcome::Suspended)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_equality_compares_payload() {
        assert_eq!(Outcome::Value(json!(1)), Outcome::Value(json!(1)));
        assert_ne!(Outcome::Value(json!(1)), Outcome::Value(json!(2)));
    }

    #[test]
    fn exception_equality_compares_canonical_name_only() {
        assert_eq!(Outcome::Exception("IllegalState".into()), Outcome::Exception("IllegalState".into()));
        assert_ne!(Outcome::Exception("IllegalState".into()), Outcome::Exception("IllegalArgument".into()));
    }

    #[test]
    fn cross_variant_never_equal() {
        assert_ne!(Outcome::Void, Outcome::NoResult);
        assert_ne!(Outcome::Suspended, Outcome::Cancelled);
        assert_ne!(Outcome::Value(json!(null)), Outcome::Void);
    }
}

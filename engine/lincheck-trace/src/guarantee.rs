//! Method-guarantee classification: which methods the recorder treats as
//! `IGNORED`, `ATOMIC`, or `SILENT`.

/// One user-declared guarantee: `(class_predicate, method_predicate, kind)`.
/// Predicates are exact class/method names, or `"*"` to match any.
#[derive(Debug, Clone)]
pub struct Guarantee {
    pub class_pattern: String,
    pub method_pattern: String,
    pub kind: GuaranteeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuaranteeKind {
    Ignore,
    Atomic,
    Silent,
}

impl Guarantee {
    pub fn new(class_pattern: impl Into<String>, method_pattern: impl Into<String>, kind: GuaranteeKind) -> Self {
        Self { class_pattern: class_pattern.into(), method_pattern: method_pattern.into(), kind }
    }

    fn matches(&self, class: &str, method: &str) -> bool {
        (self.class_pattern == "*" || self.class_pattern == class)
            && (self.method_pattern == "*" || self.method_pattern == method)
    }
}

/// Ordered policy: user guarantees first (first match wins), then the
/// built-in rule that standard I/O streams are always `IGNORED` to prevent
/// the recorder's own allocations from reentering instrumented code.
#[derive(Debug, Clone, Default)]
pub struct GuaranteePolicy {
    guarantees: Vec<Guarantee>,
}

const BUILTIN_IGNORED_CLASSES: &[&str] = &["java.io.PrintStream", "System.out", "System.err", "Stdio"];

impl GuaranteePolicy {
    pub fn new(guarantees: Vec<Guarantee>) -> Self {
        Self { guarantees }
    }

    pub fn classify(&self, class: &str, method: &str) -> Option<GuaranteeKind> {
        if let Some(g) = self.guarantees.iter().find(|g| g.matches(class, method)) {
            return Some(g.kind);
        }
        if BUILTIN_IGNORED_CLASSES.contains(&class) {
            return Some(GuaranteeKind::Ignore);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins_over_wildcard() {
        let policy = GuaranteePolicy::new(vec![
            Guarantee::new("*", "*", GuaranteeKind::Atomic),
            Guarantee::new("Queue", "poll", GuaranteeKind::Silent),
        ]);
        assert_eq!(policy.classify("Queue", "poll"), Some(GuaranteeKind::Atomic));
    }

    #[test]
    fn builtin_stdio_is_ignored_with_no_user_guarantees() {
        let policy = GuaranteePolicy::default();
        assert_eq!(policy.classify("System.out", "println"), Some(GuaranteeKind::Ignore));
        assert_eq!(policy.classify("Queue", "poll"), None);
    }

    #[test]
    fn wildcard_class_matches_any_class() {
        let policy = GuaranteePolicy::new(vec![Guarantee::new("*", "poll", GuaranteeKind::Atomic)]);
        assert_eq!(policy.classify("FifoQueue", "poll"), Some(GuaranteeKind::Atomic));
        assert_eq!(policy.classify("FifoQueue", "offer"), None);
    }
}

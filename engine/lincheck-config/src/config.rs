//! The declarative configuration surface: every tunable a test harness can
//! set, plus an env-override pattern for the operationally tunable subset.

use lincheck_model::ExecutionScenario;
use lincheck_trace::Guarantee;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {value}")]
    InvalidValue { field: String, value: String },
}

/// The full configuration surface. Plain data: no behavior lives here
/// beyond construction, defaulting, and env overrides — the root
/// package's engine facade is what actually interprets these fields.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub iterations: u32,
    pub threads: usize,
    pub actors_per_thread: usize,
    pub actors_before: usize,
    pub actors_after: usize,
    pub invocations_per_iteration: u32,
    pub check_obstruction_freedom: bool,
    pub hanging_detection_threshold: u32,
    pub minimize_failed_scenario: bool,
    pub timeout_ms: u64,
    pub custom_scenarios: Vec<ExecutionScenario>,
    pub guarantees: Vec<Guarantee>,
    pub sequential_specification: String,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            threads: 2,
            actors_per_thread: 4,
            actors_before: 2,
            actors_after: 2,
            invocations_per_iteration: 10_000,
            check_obstruction_freedom: false,
            hanging_detection_threshold: 10_000,
            minimize_failed_scenario: true,
            timeout_ms: 10_000,
            custom_scenarios: Vec::new(),
            guarantees: Vec::new(),
            sequential_specification: String::new(),
        }
    }
}

impl StrategyConfig {
    /// Overrides the operationally tunable subset (`timeout_ms`,
    /// `hanging_detection_threshold`, `invocations_per_iteration`) from
    /// `LINCHECK_*` environment variables — the rest of the surface is
    /// harness-authored and not meant to be poked from the environment.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(value) = std::env::var("LINCHECK_TIMEOUT_MS") {
            self.timeout_ms = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { field: "timeout_ms".to_string(), value })?;
        }
        if let Ok(value) = std::env::var("LINCHECK_HANGING_DETECTION_THRESHOLD") {
            self.hanging_detection_threshold = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { field: "hanging_detection_threshold".to_string(), value })?;
        }
        if let Ok(value) = std::env::var("LINCHECK_INVOCATIONS_PER_ITERATION") {
            self.invocations_per_iteration = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { field: "invocations_per_iteration".to_string(), value })?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = StrategyConfig::default();
        assert!(config.threads >= 1);
        assert!(config.minimize_failed_scenario);
        assert!(config.custom_scenarios.is_empty());
    }

    // Both cases live in one test: `LINCHECK_TIMEOUT_MS` is process-global,
    // and a second `#[test]` mutating it concurrently would race this one.
    #[test]
    fn timeout_override_is_parsed_or_rejected() {
        std::env::set_var("LINCHECK_TIMEOUT_MS", "5000");
        let config = StrategyConfig::default().with_env_overrides().unwrap();
        assert_eq!(config.timeout_ms, 5000);

        std::env::set_var("LINCHECK_TIMEOUT_MS", "not-a-number");
        let err = StrategyConfig::default().with_env_overrides().unwrap_err();
        assert_eq!(err, ConfigError::InvalidValue { field: "timeout_ms".to_string(), value: "not-a-number".to_string() });

        std::env::remove_var("LINCHECK_TIMEOUT_MS");
    }
}

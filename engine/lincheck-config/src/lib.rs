//! Declarative configuration surface: a plain struct, not a CLI, so an
//! embedding test harness can build it however it likes.

mod config;

pub use config::{ConfigError, StrategyConfig};

//! Managed cooperative scheduler.
//!
//! Drives N parallel worker threads as a single-stepped interleaving: at
//! any moment at most one worker is allowed past a switch point. Enforces
//! monitor semantics, detects livelock/deadlock, and unwinds every worker
//! cleanly via [`ForcibleFinish`](forcible_finish::ForcibleFinish) once a
//! terminal condition is reached.

mod forcible_finish;
mod loop_detector;
mod monitor;
mod scheduler;
mod strategy;

pub use forcible_finish::ForcibleFinish;
pub use loop_detector::LoopDetector;
pub use monitor::{MonitorError, MonitorId, MonitorTracker};
pub use scheduler::{ManagedScheduler, SuddenResult, WorkerState};
pub use strategy::{DeterministicSwitchStrategy, RandomSwitchStrategy, SwitchStrategy};

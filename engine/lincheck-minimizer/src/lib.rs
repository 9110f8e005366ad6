//! Failure minimizer: shrinks a failing scenario to a smaller one that
//! still reproduces the same kind of failure.

mod minimizer;

pub use minimizer::Minimizer;

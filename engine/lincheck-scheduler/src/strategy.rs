//! Pluggable switch strategies: deciding *whether* to yield the current
//! turn and, when forced to switch, *which* switchable thread gets it
//! next.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A concrete scheduling policy. `choose_thread` is only ever called with
/// `size > 0` — the scheduler computes `switchable_threads` itself and
/// only consults the strategy to pick among them.
pub trait SwitchStrategy: Send + Sync {
    fn should_switch(&self, tid: usize) -> bool;
    fn choose_thread(&self, size: usize) -> usize;
}

/// Switches with a fixed probability at every switch point and picks
/// uniformly among switchable threads.
pub struct RandomSwitchStrategy {
    rng: Mutex<StdRng>,
    switch_probability: f64,
}

impl RandomSwitchStrategy {
    pub fn new(seed: u64, switch_probability: f64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)), switch_probability: switch_probability.clamp(0.0, 1.0) }
    }
}

impl SwitchStrategy for RandomSwitchStrategy {
    fn should_switch(&self, _tid: usize) -> bool {
        self.rng.lock().gen::<f64>() < self.switch_probability
    }

    fn choose_thread(&self, size: usize) -> usize {
        self.rng.lock().gen_range(0..size)
    }
}

/// Deterministically switches at every switch point and always hands the
/// turn to the lowest-indexed switchable thread. Deliberate, not random —
/// useful as a reproducible baseline and in tests.
pub struct DeterministicSwitchStrategy;

impl SwitchStrategy for DeterministicSwitchStrategy {
    fn should_switch(&self, _tid: usize) -> bool {
        true
    }

    fn choose_thread(&self, _size: usize) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_strategy_choose_thread_stays_in_bounds() {
        let strategy = RandomSwitchStrategy::new(42, 0.5);
        for _ in 0..50 {
            assert!(strategy.choose_thread(4) < 4);
        }
    }

    #[test]
    fn deterministic_strategy_always_switches_to_first() {
        let strategy = DeterministicSwitchStrategy;
        assert!(strategy.should_switch(0));
        assert_eq!(strategy.choose_thread(5), 0);
    }

    #[test]
    fn probability_zero_never_switches() {
        let strategy = RandomSwitchStrategy::new(1, 0.0);
        for _ in 0..20 {
            assert!(!strategy.should_switch(0));
        }
    }
}

//! Parameter generators for scenario construction.
//!
//! These are decoupled from the rest of the engine: nothing in the
//! scheduler, trace, lts or runner crates depends on this module. A
//! scenario builder consumes them to pick `ArgValue`s before a run starts.

use rand::Rng;

/// Produces successive values of `T` from an evolving internal range.
pub trait ParameterGenerator<T> {
    fn next(&mut self, rng: &mut impl Rng) -> T;
}

/// Expanding-range integer generator.
///
/// Starts at the single point `mid = (min + max) / 2`. Each call either
/// grows the current bound outward (toward `min` or `max`, each with
/// probability ~0.35) or samples uniformly from the range accumulated so
/// far (probability ~0.30). The bound never grows past `min`/`max`.
pub struct ExpandingRangeIntGenerator {
    min: i64,
    max: i64,
    low: i64,
    high: i64,
}

const GROW_PROBABILITY: f64 = 0.35;

impl ExpandingRangeIntGenerator {
    pub fn new(min: i64, max: i64) -> Self {
        assert!(min <= max, "generator range must be non-empty");
        let mid = min + (max - min) / 2;
        Self { min, max, low: mid, high: mid }
    }
}

impl ParameterGenerator<i64> for ExpandingRangeIntGenerator {
    fn next(&mut self, rng: &mut impl Rng) -> i64 {
        let roll: f64 = rng.gen();
        if roll < GROW_PROBABILITY && self.low > self.min {
            self.low -= 1;
            return self.low;
        }
        if roll < 2.0 * GROW_PROBABILITY && self.high < self.max {
            self.high += 1;
            return self.high;
        }
        rng.gen_range(self.low..=self.high)
    }
}

/// String generator driven by a `"maxLen"` or `"maxLen:alphabet"` spec
/// string. Word length grows by one on each call up to `max_len`, then
/// stays there; each character is then sampled uniformly from `alphabet`.
pub struct StringGenerator {
    max_len: usize,
    alphabet: Vec<char>,
    current_len: usize,
}

const DEFAULT_ALPHABET: &str = "abcd";

impl StringGenerator {
    /// Parse a config string of the form `"maxLen"` or `"maxLen:alphabet"`.
    pub fn parse(spec: &str) -> Self {
        let (len_part, alphabet_part) = match spec.split_once(':') {
            Some((len, alphabet)) => (len, alphabet),
            None => (spec, DEFAULT_ALPHABET),
        };
        let max_len = len_part.trim().parse().unwrap_or(1);
        Self::new(max_len, alphabet_part)
    }

    pub fn new(max_len: usize, alphabet: &str) -> Self {
        let alphabet: Vec<char> = if alphabet.is_empty() {
            DEFAULT_ALPHABET.chars().collect()
        } else {
            alphabet.chars().collect()
        };
        Self { max_len: max_len.max(1), alphabet, current_len: 0 }
    }
}

impl ParameterGenerator<String> for StringGenerator {
    fn next(&mut self, rng: &mut impl Rng) -> String {
        if self.current_len < self.max_len {
            self.current_len += 1;
        }
        (0..self.current_len)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn int_generator_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut gen = ExpandingRangeIntGenerator::new(-3, 3);
        for _ in 0..200 {
            let v = gen.next(&mut rng);
            assert!((-3..=3).contains(&v));
        }
    }

    #[test]
    fn int_generator_single_point_range_never_panics() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut gen = ExpandingRangeIntGenerator::new(5, 5);
        for _ in 0..20 {
            assert_eq!(gen.next(&mut rng), 5);
        }
    }

    #[test]
    fn string_generator_grows_length_then_caps() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut gen = StringGenerator::new(4, "ab");
        let lengths: Vec<usize> = (0..8).map(|_| gen.next(&mut rng).len()).collect();
        assert_eq!(lengths, vec![1, 2, 3, 4, 4, 4, 4, 4]);
    }

    #[test]
    fn string_generator_parses_len_and_alphabet() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut gen = StringGenerator::parse("2:xy");
        let s = gen.next(&mut rng);
        assert!(s.chars().all(|c| c == 'x' || c == 'y'));
    }

    #[test]
    fn string_generator_parses_len_only_uses_default_alphabet() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut gen = StringGenerator::parse("3");
        let s = gen.next(&mut rng);
        assert!(s.chars().all(|c| DEFAULT_ALPHABET.contains(c)));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn int_generator_never_leaves_its_bounds(low in -50i64..50, spread in 0i64..50, seed in any::<u64>(), calls in 0usize..100) {
            let high = low + spread;
            let mut rng = StdRng::seed_from_u64(seed);
            let mut gen = ExpandingRangeIntGenerator::new(low, high);
            for _ in 0..calls {
                let v = gen.next(&mut rng);
                prop_assert!((low..=high).contains(&v));
            }
        }
    }
}

//! Negative sampling table.
//!
//! Token `i` occupies `floor(sqrt(w_i) * table_size / Z)` slots, where `Z` is the
//! sum of `sqrt(w_j)` over the vocabulary. Drawing walks a cursor over the
//! shuffled table and reshuffles once the end is reached, so a draw is O(1)
//! apart from the periodic O(table_size) reshuffle.

use crate::error::{ColdVecError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Smoothing exponent applied to vocabulary weights.
const SMOOTHING_POWER: f64 = 0.5;

/// Roulette table of token ids with a moving cursor.
///
/// Each table is owned by exactly one estimator; the cursor and RNG are never
/// shared between workers.
#[derive(Debug, Clone)]
pub struct NegativeSamplingTable {
    table: Vec<usize>,
    cursor: usize,
    reshuffles: usize,
    rng: ChaCha8Rng,
}

impl NegativeSamplingTable {
    /// Builds a table from per-token weights.
    ///
    /// The table may end up slightly shorter than `table_size` because slot
    /// counts are truncated. Fails if the weights are empty, contain negative
    /// or non-finite values, sum to zero, or leave every token without a slot.
    pub fn build(weights: &[f64], table_size: usize, seed: Option<u64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(ColdVecError::Config("vocabulary weights are empty".to_string()));
        }
        if table_size == 0 {
            return Err(ColdVecError::Config("negative table size must be positive".to_string()));
        }
        if let Some((i, w)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(ColdVecError::Config(format!(
                "vocabulary weight {} at token {} is not a finite non-negative number",
                w, i
            )));
        }

        let scaled: Vec<f64> = weights.iter().map(|w| w.powf(SMOOTHING_POWER)).collect();
        let z: f64 = scaled.iter().sum();
        if z <= 0.0 {
            return Err(ColdVecError::Config("vocabulary weights are all zero".to_string()));
        }

        let mut table = Vec::with_capacity(table_size);
        for (token, &c) in scaled.iter().enumerate() {
            let slots = (c * table_size as f64 / z) as usize;
            table.extend(std::iter::repeat(token).take(slots));
        }
        if table.is_empty() {
            return Err(ColdVecError::Config(format!(
                "negative table of size {} leaves no slot for any of {} tokens",
                table_size,
                weights.len()
            )));
        }

        let mut rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        table.shuffle(&mut rng);

        Ok(Self {
            table,
            cursor: 0,
            reshuffles: 0,
            rng,
        })
    }

    /// Draws the next token id.
    ///
    /// When the draw consumes the last slot the table is reshuffled and the
    /// cursor wraps to 0; the token at the old position is still returned.
    #[inline]
    pub fn sample(&mut self) -> usize {
        let token = self.table[self.cursor];
        self.cursor += 1;
        if self.cursor >= self.table.len() {
            self.table.shuffle(&mut self.rng);
            self.cursor = 0;
            self.reshuffles += 1;
        }
        token
    }

    /// Draws a token id different from `target`.
    ///
    /// Gives up after one full table's worth of attempts and returns the last
    /// draw, which only happens when `target` owns every slot.
    #[inline]
    pub fn sample_excluding(&mut self, target: usize) -> usize {
        let mut token = self.sample();
        let mut attempts = 1;
        while token == target && attempts < self.table.len() {
            token = self.sample();
            attempts += 1;
        }
        token
    }

    /// Number of slots in the table.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Current cursor position, always in `[0, len)`.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of wraparound reshuffles performed so far.
    pub fn reshuffles(&self) -> usize {
        self.reshuffles
    }

    /// Current table contents, in draw order.
    pub fn as_slice(&self) -> &[usize] {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(table: &[usize], vocab: usize) -> Vec<usize> {
        let mut counts = vec![0; vocab];
        for &t in table {
            counts[t] += 1;
        }
        counts
    }

    #[test]
    fn test_slot_counts_follow_sqrt_weights() {
        // sqrt weights are 1, 2, 3, 4 -> Z = 10
        let table = NegativeSamplingTable::build(&[1.0, 4.0, 9.0, 16.0], 1000, Some(42)).unwrap();
        assert_eq!(table.len(), 1000);
        assert_eq!(counts(table.as_slice(), 4), vec![100, 200, 300, 400]);
    }

    #[test]
    fn test_truncation_shortens_table() {
        let table = NegativeSamplingTable::build(&[1.0, 1.0, 1.0], 10, Some(1)).unwrap();
        assert_eq!(table.len(), 9);
        assert_eq!(counts(table.as_slice(), 3), vec![3, 3, 3]);
    }

    #[test]
    fn test_empirical_frequency() {
        let weights: Vec<f64> = (1..=20).map(|i| (i * i) as f64 * 0.5).collect();
        let table_size = 100_000;
        let mut table = NegativeSamplingTable::build(&weights, table_size, Some(3)).unwrap();

        let z: f64 = weights.iter().map(|w| w.sqrt()).sum();
        let mut seen = vec![0usize; weights.len()];
        for _ in 0..table.len() {
            seen[table.sample()] += 1;
        }
        for (i, w) in weights.iter().enumerate() {
            let expected = w.sqrt() / z;
            let observed = seen[i] as f64 / table.len() as f64;
            assert!(
                (expected - observed).abs() < 2.0 * weights.len() as f64 / table_size as f64,
                "token {}: expected {}, observed {}",
                i,
                expected,
                observed
            );
        }
    }

    #[test]
    fn test_full_pass_reshuffles_once() {
        let mut table = NegativeSamplingTable::build(&[1.0; 10], 100, Some(5)).unwrap();
        let before: Vec<usize> = table.as_slice().to_vec();

        let mut drawn = Vec::new();
        for _ in 0..table.len() {
            assert!(table.cursor() < table.len());
            drawn.push(table.sample());
        }

        assert_eq!(drawn, before);
        assert_eq!(table.reshuffles(), 1);
        assert_eq!(table.cursor(), 0);

        table.sample();
        assert_eq!(table.reshuffles(), 1);
        assert_eq!(table.cursor(), 1);
    }

    #[test]
    fn test_seeded_build_is_reproducible() {
        let weights = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        let a = NegativeSamplingTable::build(&weights, 500, Some(11)).unwrap();
        let b = NegativeSamplingTable::build(&weights, 500, Some(11)).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_sample_excluding() {
        let mut table = NegativeSamplingTable::build(&[1.0, 1.0], 100, Some(9)).unwrap();
        for _ in 0..500 {
            assert_eq!(table.sample_excluding(0), 1);
        }

        let mut single = NegativeSamplingTable::build(&[0.0, 1.0], 10, Some(9)).unwrap();
        assert_eq!(single.sample_excluding(1), 1);
    }

    #[test]
    fn test_zero_weight_tokens_never_drawn() {
        let mut table = NegativeSamplingTable::build(&[0.0, 1.0, 0.0, 1.0], 64, Some(2)).unwrap();
        for _ in 0..256 {
            let t = table.sample();
            assert!(t == 1 || t == 3);
        }
    }

    #[test]
    fn test_invalid_weights() {
        assert!(matches!(
            NegativeSamplingTable::build(&[], 100, None),
            Err(ColdVecError::Config(_))
        ));
        assert!(matches!(
            NegativeSamplingTable::build(&[0.0, 0.0], 100, None),
            Err(ColdVecError::Config(_))
        ));
        assert!(NegativeSamplingTable::build(&[1.0, -1.0], 100, None).is_err());
        assert!(NegativeSamplingTable::build(&[1.0, f64::NAN], 100, None).is_err());
        assert!(NegativeSamplingTable::build(&[1.0; 10], 5, None).is_err());
    }
}

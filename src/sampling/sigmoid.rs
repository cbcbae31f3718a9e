//! Quantized logistic function.

/// Precomputed logistic values over `[-max_x, max_x]`.
///
/// Trades a small, bounded approximation error for removing `exp` from the
/// innermost training loop.
#[derive(Debug, Clone)]
pub struct SigmoidTable {
    table: Vec<f32>,
    max_x: f32,
    resolution: usize,
}

impl SigmoidTable {
    /// Builds a table with `resolution + 1` entries.
    pub fn build(max_x: f32, resolution: usize) -> Self {
        let table = (0..=resolution)
            .map(|i| {
                let x = (i as f32 * 2.0 * max_x) / resolution as f32 - max_x;
                1.0 / (1.0 + (-x).exp())
            })
            .collect();

        Self {
            table,
            max_x,
            resolution,
        }
    }

    /// Approximates `1 / (1 + e^-x)`; saturates outside `(-max_x, max_x)`.
    #[inline]
    pub fn sigmoid(&self, x: f32) -> f32 {
        if x.is_nan() || x <= -self.max_x {
            0.0
        } else if x >= self.max_x {
            1.0
        } else {
            let idx = ((x + self.max_x) * self.resolution as f32 / self.max_x / 2.0) as usize;
            self.table[idx.min(self.resolution)]
        }
    }

    /// Saturation bound.
    pub fn max_x(&self) -> f32 {
        self.max_x
    }

    /// Number of quantization steps.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Number of stored values (`resolution + 1`).
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(x: f32) -> f32 {
        1.0 / (1.0 + (-x).exp())
    }

    #[test]
    fn test_table_size() {
        let table = SigmoidTable::build(8.0, 512);
        assert_eq!(table.len(), 513);
        assert_eq!(table.resolution(), 512);
    }

    #[test]
    fn test_saturation() {
        let table = SigmoidTable::build(8.0, 512);
        assert_eq!(table.sigmoid(-8.0), 0.0);
        assert_eq!(table.sigmoid(-100.0), 0.0);
        assert_eq!(table.sigmoid(8.0), 1.0);
        assert_eq!(table.sigmoid(1e9), 1.0);
        assert_eq!(table.sigmoid(f32::NAN), 0.0);
    }

    #[test]
    fn test_close_to_exact() {
        let table = SigmoidTable::build(8.0, 512);
        let mut x = -7.99f32;
        while x < 8.0 {
            let err = (table.sigmoid(x) - exact(x)).abs();
            assert!(err < 1e-2, "x = {}: error {}", x, err);
            x += 0.01;
        }
    }

    #[test]
    fn test_monotone() {
        let table = SigmoidTable::build(8.0, 512);
        let mut prev = table.sigmoid(-10.0);
        let mut x = -10.0f32;
        while x <= 10.0 {
            let y = table.sigmoid(x);
            assert!(y >= prev, "not monotone at x = {}", x);
            prev = y;
            x += 0.005;
        }
    }

    #[test]
    fn test_midpoint() {
        let table = SigmoidTable::build(8.0, 512);
        assert!((table.sigmoid(0.0) - 0.5).abs() < 1e-6);
    }
}

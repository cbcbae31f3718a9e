//! The frozen context matrix.

use crate::error::{ColdVecError, Result};
use crate::storage::npy;
use ndarray::{Array2, ArrayView1};
use std::path::Path;

/// Pretrained context vectors, one row per token id.
///
/// Read-only after load; workers share it through an `Arc`.
#[derive(Debug, Clone)]
pub struct ContextMatrix {
    data: Array2<f32>,
}

impl ContextMatrix {
    /// Wraps an existing matrix.
    pub fn new(data: Array2<f32>) -> Result<Self> {
        if data.ncols() == 0 {
            return Err(ColdVecError::Config(
                "context matrix has zero-width rows".to_string(),
            ));
        }
        Ok(Self { data })
    }

    /// Loads a matrix from a `.npy` file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(npy::read_matrix(path)?)
    }

    /// Number of token rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Embedding dimension.
    #[inline]
    pub fn dim(&self) -> usize {
        self.data.ncols()
    }

    /// Context vector of a token; panics if `token >= rows()`.
    #[inline]
    pub fn row(&self, token: usize) -> ArrayView1<'_, f32> {
        self.data.row(token)
    }
}

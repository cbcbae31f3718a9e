//! Skip-gram with negative sampling, restricted to one new center vector.
//!
//! Every context vector stays frozen; only the `D` components of the item
//! vector are fit, so a short fixed number of epochs is enough. Gradients from
//! all tokens and negatives of an epoch are summed and applied once at the end
//! of the epoch.

use crate::config::EstimatorConfig;
use crate::error::{ColdVecError, Result};
use crate::sampling::{NegativeSamplingTable, SigmoidTable};
use crate::storage::ContextMatrix;
use ndarray::Array1;
use std::sync::Arc;

/// Optimization hyperparameters for one fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParams {
    /// Number of epochs over the item's tokens.
    pub num_iters: usize,
    /// Learning rate at the first epoch.
    pub learning_rate: f32,
    /// Learning rate approached at the last epoch.
    pub min_learning_rate: f32,
    /// Negatives drawn per positive token.
    pub num_negatives: usize,
}

impl FitParams {
    /// Linearly decayed learning rate for an epoch.
    #[inline]
    pub fn learning_rate_at(&self, epoch: usize) -> f32 {
        let t = epoch as f32 / self.num_iters as f32;
        self.min_learning_rate + (self.learning_rate - self.min_learning_rate) * (1.0 - t)
    }
}

impl From<&EstimatorConfig> for FitParams {
    fn from(config: &EstimatorConfig) -> Self {
        Self {
            num_iters: config.num_iters,
            learning_rate: config.learning_rate,
            min_learning_rate: config.min_learning_rate,
            num_negatives: config.num_negatives,
        }
    }
}

/// Fits item vectors one at a time.
///
/// Owns its sampling and sigmoid tables; only the context matrix is shared.
pub struct ColdItemEstimator {
    negatives: NegativeSamplingTable,
    sigmoid: SigmoidTable,
    context: Arc<ContextMatrix>,
    params: FitParams,
    exclude_positive: bool,
}

impl ColdItemEstimator {
    /// Builds an estimator with freshly constructed tables.
    ///
    /// `weights` must hold one entry per context matrix row.
    pub fn new(
        context: Arc<ContextMatrix>,
        weights: &[f64],
        config: &EstimatorConfig,
        seed: Option<u64>,
    ) -> Result<Self> {
        if weights.len() != context.rows() {
            return Err(ColdVecError::Config(format!(
                "{} vocabulary weights for a context matrix with {} rows",
                weights.len(),
                context.rows()
            )));
        }

        let negatives = NegativeSamplingTable::build(weights, config.neg_table_size, seed)?;
        let sigmoid = SigmoidTable::build(config.max_sigmoid, config.sigmoid_resolution);

        Ok(Self {
            negatives,
            sigmoid,
            context,
            params: FitParams::from(config),
            exclude_positive: config.exclude_positive_negatives,
        })
    }

    /// Embedding dimension of fitted vectors.
    pub fn dim(&self) -> usize {
        self.context.dim()
    }

    /// Default hyperparameters used by [`ColdItemEstimator::fit_item_vector`].
    pub fn params(&self) -> &FitParams {
        &self.params
    }

    /// The negative sampling table.
    pub fn negatives(&self) -> &NegativeSamplingTable {
        &self.negatives
    }

    /// Fits a vector for `token_ids` with the configured hyperparameters.
    pub fn fit_item_vector(&mut self, item_id: &str, token_ids: &[usize]) -> Result<Vec<f32>> {
        let params = self.params;
        self.fit_with_params(item_id, token_ids, &params)
    }

    /// Fits a vector for `token_ids` with explicit hyperparameters.
    ///
    /// Fails without touching any state if a token id has no context row.
    pub fn fit_with_params(
        &mut self,
        item_id: &str,
        token_ids: &[usize],
        params: &FitParams,
    ) -> Result<Vec<f32>> {
        let rows = self.context.rows();
        if let Some(&token) = token_ids.iter().find(|&&t| t >= rows) {
            return Err(ColdVecError::TokenOutOfRange {
                item_id: item_id.to_string(),
                token,
                rows,
            });
        }

        let dim = self.context.dim();
        let mut word_vec = Array1::<f32>::zeros(dim);
        let mut grad_vec = Array1::<f32>::zeros(dim);

        for epoch in 0..params.num_iters {
            let lr = params.learning_rate_at(epoch);
            grad_vec.fill(0.0);

            for &token in token_ids {
                self.accumulate(token, 1.0, lr, &word_vec, &mut grad_vec);
                for _ in 0..params.num_negatives {
                    let negative = if self.exclude_positive {
                        self.negatives.sample_excluding(token)
                    } else {
                        self.negatives.sample()
                    };
                    self.accumulate(negative, 0.0, lr, &word_vec, &mut grad_vec);
                }
            }

            word_vec += &grad_vec;
        }

        Ok(word_vec.to_vec())
    }

    /// Adds the logistic-loss gradient of one (token, label) example.
    #[inline]
    fn accumulate(
        &self,
        token: usize,
        label: f32,
        lr: f32,
        word_vec: &Array1<f32>,
        grad_vec: &mut Array1<f32>,
    ) {
        let row = self.context.row(token);
        let score = self.sigmoid.sigmoid(row.dot(word_vec));
        let alpha = lr * (label - score);
        grad_vec.scaled_add(alpha, &row);
    }
}

//! Precomputed lookup tables that keep the inner training loop cheap.
//!
//! - **Negative sampling**: a shuffled roulette table over the vocabulary (negative.rs)
//! - **Sigmoid**: a quantized logistic function over a bounded domain (sigmoid.rs)

mod negative;
mod sigmoid;

pub use negative::NegativeSamplingTable;
pub use sigmoid::SigmoidTable;

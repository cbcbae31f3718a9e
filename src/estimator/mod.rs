//! Per-item vector fitting against the frozen context space.

mod cold_item;

pub use cold_item::{ColdItemEstimator, FitParams};

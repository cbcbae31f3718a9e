//! # coldvec - Cold Item Embedding Inference
//!
//! coldvec fits vectors for *cold* items, entities missing from a previously
//! trained catalogue, using only the tokens that describe them and a frozen,
//! pretrained skip-gram context space.
//!
//! ## Overview
//!
//! Each item vector is fit from scratch with a short run of skip-gram with
//! negative sampling: the item's tokens are positives, draws from a smoothed
//! unigram table are negatives, and all context vectors stay fixed. The result
//! lives in the same space as the trained catalogue, so it can be compared
//! with existing item vectors without retraining anything.
//!
//! ## Key Features
//!
//! - **Roulette negative sampling** with amortized O(1) draws
//! - **Quantized sigmoid** lookup in the inner loop
//! - **Shared-nothing worker pool**: one estimator per worker, a job queue in,
//!   a result channel out
//! - **NumPy interop**: `.npy` inputs and outputs plus a JSON id map
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use coldvec::{load_jobs, Config, Orchestrator};
//!
//! let config = Config::default();
//! let jobs = load_jobs("items.tsv", &config.input)?;
//!
//! let orchestrator = Orchestrator::load("word_out.npy", "word_count.npy", config)?;
//! let output = orchestrator.run(jobs)?;
//!
//! // Writes result/embed.npy and result/embed_id2idx.json
//! output.embeddings.save("result/embed")?;
//! ```
//!
//! ## Architecture
//!
//! - [`sampling`] - Negative sampling table and sigmoid lookup
//! - [`estimator`] - Per-item online training loop
//! - [`pool`] - Worker pool, job queue and result aggregation
//! - [`input`] - Item record parsing
//! - [`storage`] - `.npy` arrays, context matrix and fitted outputs

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod estimator;
pub mod input;
pub mod pool;
pub mod sampling;
pub mod storage;

// Re-export commonly used types
pub use config::{Config, EstimatorConfig, InputConfig, PoolConfig};
pub use error::{ColdVecError, Result};
pub use estimator::{ColdItemEstimator, FitParams};
pub use input::{load_jobs, parse_line, Job};
pub use pool::{
    CancelToken, FitResult, Orchestrator, Progress, RunOutput, RunStats, Worker, WorkerState,
};
pub use sampling::{NegativeSamplingTable, SigmoidTable};
pub use storage::{ContextMatrix, EmbeddingSet};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default negative sampling table size.
pub const DEFAULT_NEG_TABLE_SIZE: usize = 5_000_000;

/// Default sigmoid saturation bound.
pub const DEFAULT_MAX_SIGMOID: f32 = 8.0;

/// Default sigmoid table resolution.
pub const DEFAULT_SIGMOID_RESOLUTION: usize = 512;

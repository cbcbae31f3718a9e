//! Worker pool that fits many items in parallel.
//!
//! Workers are shared-nothing: each owns its own estimator (and therefore its
//! own sampling table, cursor and RNG). The job channel and the result channel
//! are the only points of contact between threads.

mod orchestrator;
mod worker;

pub use orchestrator::{Orchestrator, Progress, RunOutput, RunStats};
pub use worker::{CancelToken, FitResult, Worker, WorkerState, WorkerStats};

//! A single fitting worker.

use crate::config::PoolConfig;
use crate::estimator::ColdItemEstimator;
use crate::input::Job;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared stop flag checked by workers between jobs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests every holder to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`CancelToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A fitted item vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    /// Item identifier.
    pub item_id: String,
    /// Fitted vector.
    pub vector: Vec<f32>,
}

/// Worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for a job.
    Idle,
    /// Fitting an item.
    Processing,
    /// Stopped for good.
    Exited,
}

/// Per-worker job counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Jobs that produced a result.
    pub completed: usize,
    /// Jobs dropped for having too many tokens.
    pub skipped: usize,
    /// Jobs that failed with an error.
    pub failed: usize,
}

/// Pulls jobs from the queue and pushes results until the queue closes.
pub struct Worker {
    id: usize,
    estimator: ColdItemEstimator,
    max_word_num: usize,
    dequeue_timeout: Duration,
    state: WorkerState,
    stats: WorkerStats,
}

impl Worker {
    /// Creates an idle worker around its own estimator.
    pub fn new(id: usize, estimator: ColdItemEstimator, config: &PoolConfig) -> Self {
        Self {
            id,
            estimator,
            max_word_num: config.max_word_num,
            dequeue_timeout: Duration::from_millis(config.dequeue_timeout_ms),
            state: WorkerState::Idle,
            stats: WorkerStats::default(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Runs until the job queue is closed and drained, the result channel
    /// closes, or `cancel` is set.
    ///
    /// Each dequeue waits at most the configured timeout before re-checking
    /// the cancel flag; a closed and empty queue ends the loop.
    pub fn run(
        &mut self,
        jobs: &Receiver<Job>,
        results: &Sender<FitResult>,
        cancel: &CancelToken,
    ) -> WorkerStats {
        debug!("Worker {} started", self.id);

        while self.state != WorkerState::Exited {
            if cancel.is_cancelled() {
                debug!("Worker {} cancelled", self.id);
                break;
            }

            let job = match jobs.recv_timeout(self.dequeue_timeout) {
                Ok(job) => job,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            if let Some(result) = self.process(job) {
                if results.send(result).is_err() {
                    warn!("Worker {}: result channel closed", self.id);
                    break;
                }
            }
        }

        self.state = WorkerState::Exited;
        debug!(
            "Worker {} finished: {} completed, {} skipped, {} failed",
            self.id, self.stats.completed, self.stats.skipped, self.stats.failed
        );
        self.stats
    }

    /// Fits one job; returns `None` for skipped or failed jobs.
    ///
    /// A failing job is logged with its item id and does not stop the worker.
    pub fn process(&mut self, job: Job) -> Option<FitResult> {
        if job.token_ids.len() > self.max_word_num {
            self.stats.skipped += 1;
            return None;
        }

        self.state = WorkerState::Processing;
        let outcome = self.estimator.fit_item_vector(&job.item_id, &job.token_ids);
        self.state = WorkerState::Idle;

        match outcome {
            Ok(vector) => {
                self.stats.completed += 1;
                Some(FitResult {
                    item_id: job.item_id,
                    vector,
                })
            }
            Err(e) => {
                warn!("Worker {}: {}", self.id, e);
                self.stats.failed += 1;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EstimatorConfig;
    use crate::storage::ContextMatrix;
    use crossbeam_channel::unbounded;
    use ndarray::Array2;

    fn test_worker(max_word_num: usize) -> Worker {
        let context = Arc::new(
            ContextMatrix::new(Array2::from_shape_fn((20, 4), |(r, c)| ((r + c) % 3) as f32 * 0.1))
                .unwrap(),
        );
        let config = EstimatorConfig {
            num_iters: 5,
            num_negatives: 3,
            neg_table_size: 200,
            ..Default::default()
        };
        let estimator = ColdItemEstimator::new(context, &vec![1.0; 20], &config, Some(1)).unwrap();
        let pool = PoolConfig {
            max_word_num,
            dequeue_timeout_ms: 10,
            ..Default::default()
        };
        Worker::new(0, estimator, &pool)
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_process_outcomes() {
        let mut worker = test_worker(3);
        assert_eq!(worker.state(), WorkerState::Idle);

        let ok = worker.process(Job::new("a", vec![1, 2])).unwrap();
        assert_eq!(ok.item_id, "a");
        assert_eq!(ok.vector.len(), 4);

        assert!(worker.process(Job::new("long", vec![1, 2, 3, 4])).is_none());
        assert!(worker.process(Job::new("bad", vec![99])).is_none());

        assert_eq!(worker.state(), WorkerState::Idle);
        assert_eq!(
            worker.stats(),
            WorkerStats {
                completed: 1,
                skipped: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn test_run_drains_closed_queue() {
        let mut worker = test_worker(40);
        let (job_tx, job_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        for i in 0..5 {
            job_tx.send(Job::new(format!("item-{}", i), vec![i, i + 1])).unwrap();
        }
        drop(job_tx);

        let stats = worker.run(&job_rx, &result_tx, &CancelToken::new());
        drop(result_tx);

        assert_eq!(stats.completed, 5);
        assert_eq!(worker.state(), WorkerState::Exited);
        let ids: Vec<String> = result_rx.iter().map(|r| r.item_id).collect();
        assert_eq!(ids, vec!["item-0", "item-1", "item-2", "item-3", "item-4"]);
    }

    #[test]
    fn test_run_stops_when_cancelled() {
        let mut worker = test_worker(40);
        let (job_tx, job_rx) = unbounded();
        let (result_tx, _result_rx) = unbounded();
        job_tx.send(Job::new("never", vec![1])).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let stats = worker.run(&job_rx, &result_tx, &cancel);

        assert_eq!(stats, WorkerStats::default());
        assert_eq!(worker.state(), WorkerState::Exited);
        assert_eq!(job_rx.len(), 1);
    }
}

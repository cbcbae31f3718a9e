//! Job distribution, result aggregation and pool teardown.

use crate::config::Config;
use crate::error::{ColdVecError, Result};
use crate::estimator::ColdItemEstimator;
use crate::input::Job;
use crate::pool::worker::{CancelToken, FitResult, Worker, WorkerStats};
use crate::storage::{npy, ContextMatrix, EmbeddingSet};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Snapshot of queue depths during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Jobs submitted to the pool.
    pub total: usize,
    /// Jobs still waiting in the job queue.
    pub pending_jobs: usize,
    /// Results waiting to be aggregated.
    pub pending_results: usize,
    /// Results aggregated so far, duplicates included.
    pub received: usize,
}

/// Counters for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Jobs submitted to the pool.
    pub submitted: usize,
    /// Jobs that produced a vector.
    pub completed: usize,
    /// Jobs dropped for exceeding the token limit.
    pub skipped: usize,
    /// Jobs that failed with a per-item error.
    pub failed: usize,
    /// Results discarded because their id was already present.
    pub duplicates: usize,
}

impl RunStats {
    fn absorb(&mut self, worker: WorkerStats) {
        self.completed += worker.completed;
        self.skipped += worker.skipped;
        self.failed += worker.failed;
    }
}

/// Result of a run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Fitted vectors in first-seen order.
    pub embeddings: EmbeddingSet,
    /// Job counters.
    pub stats: RunStats,
}

/// Sets the token when dropped, so every exit path stops the workers.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Fans jobs out to a pool of independent workers and collects their vectors.
pub struct Orchestrator {
    context: Arc<ContextMatrix>,
    weights: Arc<Vec<f64>>,
    config: Config,
}

impl Orchestrator {
    /// Creates an orchestrator over an already loaded model.
    pub fn new(context: ContextMatrix, weights: Vec<f64>, config: Config) -> Result<Self> {
        config.validate()?;
        if weights.len() != context.rows() {
            return Err(ColdVecError::Config(format!(
                "{} vocabulary weights for a context matrix with {} rows",
                weights.len(),
                context.rows()
            )));
        }

        Ok(Self {
            context: Arc::new(context),
            weights: Arc::new(weights),
            config,
        })
    }

    /// Loads the context matrix and vocabulary weights from `.npy` files.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        context_path: P,
        weights_path: Q,
        config: Config,
    ) -> Result<Self> {
        let context = ContextMatrix::load(context_path)?;
        let weights = npy::read_vector(weights_path)?;
        info!(
            "Loaded context matrix: {} tokens x {} dims",
            context.rows(),
            context.dim()
        );
        Self::new(context, weights, config)
    }

    /// The shared context matrix.
    pub fn context(&self) -> &ContextMatrix {
        &self.context
    }

    /// The run configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fits every job and aggregates the results.
    pub fn run(&self, jobs: Vec<Job>) -> Result<RunOutput> {
        self.run_with_progress(jobs, |_| {})
    }

    /// Fits every job, reporting queue depths to `on_progress`.
    ///
    /// The callback fires after every aggregated result and at each progress
    /// interval while waiting. Per-item failures are counted, not returned; a
    /// worker that cannot start fails the whole run after the pool is joined.
    pub fn run_with_progress<F>(&self, jobs: Vec<Job>, mut on_progress: F) -> Result<RunOutput>
    where
        F: FnMut(&Progress),
    {
        let total = jobs.len();
        let num_workers = self.config.pool.num_workers;
        info!("Fitting {} items with {} workers", total, num_workers);

        let (job_tx, job_rx) = unbounded();
        for job in jobs {
            job_tx
                .send(job)
                .map_err(|_| ColdVecError::Worker("job queue closed".to_string()))?;
        }
        // Workers see a closed queue once it is drained.
        drop(job_tx);

        let (result_tx, result_rx) = unbounded::<FitResult>();
        let cancel = CancelToken::new();

        thread::scope(|scope| -> Result<RunOutput> {
            let _teardown = CancelOnDrop(cancel.clone());

            let mut handles = Vec::with_capacity(num_workers);
            for id in 0..num_workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let cancel = cancel.clone();
                let handle = thread::Builder::new()
                    .name(format!("coldvec-worker-{}", id))
                    .spawn_scoped(scope, move || {
                        self.worker_main(id, &job_rx, &result_tx, &cancel)
                    })
                    .map_err(|e| {
                        ColdVecError::Worker(format!("failed to spawn worker {}: {}", id, e))
                    })?;
                handles.push(handle);
            }
            // Only workers hold senders now; the channel closes when the last one exits.
            drop(result_tx);

            let mut output = self.aggregate(total, &job_rx, &result_rx, &mut on_progress)?;

            let mut first_error = None;
            for (id, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(Ok(stats)) => output.stats.absorb(stats),
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        first_error
                            .get_or_insert(ColdVecError::Worker(format!("worker {} panicked", id)));
                    }
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }

            output.stats.submitted = total;
            info!(
                "Fitted {} items ({} skipped, {} failed, {} duplicates)",
                output.embeddings.len(),
                output.stats.skipped,
                output.stats.failed,
                output.stats.duplicates
            );
            Ok(output)
        })
    }

    /// Body of one worker thread.
    fn worker_main(
        &self,
        id: usize,
        jobs: &Receiver<Job>,
        results: &Sender<FitResult>,
        cancel: &CancelToken,
    ) -> Result<WorkerStats> {
        let seed = self.config.estimator.seed.map(|s| s.wrapping_add(id as u64));
        let estimator = match ColdItemEstimator::new(
            Arc::clone(&self.context),
            &self.weights,
            &self.config.estimator,
            seed,
        ) {
            Ok(estimator) => estimator,
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        };
        debug!(
            "Worker {} built negative table with {} slots",
            id,
            estimator.negatives().len()
        );

        let mut worker = Worker::new(id, estimator, &self.config.pool);
        Ok(worker.run(jobs, results, cancel))
    }

    /// Drains the result channel until every worker has dropped its sender.
    fn aggregate<F>(
        &self,
        total: usize,
        jobs: &Receiver<Job>,
        results: &Receiver<FitResult>,
        on_progress: &mut F,
    ) -> Result<RunOutput>
    where
        F: FnMut(&Progress),
    {
        let interval = Duration::from_millis(self.config.pool.progress_interval_ms);
        let mut embeddings = EmbeddingSet::new(self.context.dim());
        let mut stats = RunStats::default();
        let mut received = 0;
        let mut last_report = Instant::now();

        loop {
            let got_result = match results.recv_timeout(interval) {
                Ok(result) => {
                    received += 1;
                    if !embeddings.insert(result.item_id, &result.vector)? {
                        stats.duplicates += 1;
                    }
                    true
                }
                Err(RecvTimeoutError::Timeout) => false,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let progress = Progress {
                total,
                pending_jobs: jobs.len(),
                pending_results: results.len(),
                received,
            };
            if got_result {
                on_progress(&progress);
            }
            if last_report.elapsed() >= interval {
                info!(
                    "Jobs left: {}, result queue size: {}",
                    progress.pending_jobs, progress.pending_results
                );
                if !got_result {
                    on_progress(&progress);
                }
                last_report = Instant::now();
            }
        }

        Ok(RunOutput { embeddings, stats })
    }
}

//! Job orchestrator.
//!
//! Jobs travel through an unbounded queue to a fixed pool of workers.
//! Workers report progress as `JobUpdate` messages to a tracker task,
//! which is the only writer of the job registry.

use crate::jobs::job::{FetchResult, Job, JobFailure, JobId, JobRequest, JobStatus, JobUpdate};
use crate::jobs::pipeline::JobRunner;
use anyhow::{bail, Result};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Registry = Arc<RwLock<HashMap<JobId, Job>>>;
type SharedQueue = Arc<Mutex<mpsc::UnboundedReceiver<JobRequest>>>;

/// Accepts jobs and runs them on a worker pool.
pub struct Orchestrator {
    queue: mpsc::UnboundedSender<JobRequest>,
    registry: Registry,
    workers: Vec<JoinHandle<()>>,
    tracker: JoinHandle<()>,
    poll_interval: Duration,
}

impl Orchestrator {
    /// Start `workers` workers (at least one) running jobs with `runner`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(runner: Arc<dyn JobRunner>, workers: usize, poll_interval: Duration) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel::<JobRequest>();
        let (update_tx, update_rx) = mpsc::unbounded_channel::<JobUpdate>();
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));
        let shared_queue: SharedQueue = Arc::new(Mutex::new(queue_rx));

        let workers: Vec<JoinHandle<()>> = (0..workers.max(1))
            .map(|index| {
                tokio::spawn(worker_loop(
                    index,
                    Arc::clone(&runner),
                    Arc::clone(&shared_queue),
                    update_tx.clone(),
                ))
            })
            .collect();
        drop(update_tx);

        let tracker = tokio::spawn(track_updates(Arc::clone(&registry), update_rx));
        info!("Job orchestrator started with {} worker(s)", workers.len());

        Self {
            queue: queue_tx,
            registry,
            workers,
            tracker,
            poll_interval,
        }
    }

    /// Register a job for `dataset` and queue it. Returns without waiting
    /// for the job to run.
    pub async fn enqueue(&self, dataset: impl Into<String>) -> Result<JobId> {
        let dataset = dataset.into();
        let id = JobId::new();

        self.registry
            .write()
            .await
            .insert(id, Job::new(id, dataset.clone()));

        if self.queue.send(JobRequest { id, dataset }).is_err() {
            self.registry.write().await.remove(&id);
            bail!("job queue is closed");
        }

        debug!("Enqueued job {}", id);
        Ok(id)
    }

    /// Current state of a job, `None` for an unknown id.
    pub async fn status(&self, id: JobId) -> Option<JobStatus> {
        self.registry.read().await.get(&id).map(Job::status)
    }

    /// Artifacts of a job, or why there are none.
    pub async fn fetch_result(&self, id: JobId) -> FetchResult {
        match self.registry.read().await.get(&id) {
            Some(job) => job.result(),
            None => FetchResult::NotFound,
        }
    }

    /// Snapshot of every job, oldest first.
    pub async fn jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.registry.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        jobs
    }

    /// Poll until the job is terminal. `None` for an unknown id.
    pub async fn wait(&self, id: JobId) -> Option<Job> {
        loop {
            {
                let registry = self.registry.read().await;
                let job = registry.get(&id)?;
                if job.state.is_terminal() {
                    return Some(job.clone());
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Close the queue and wait for queued and running jobs to finish.
    ///
    /// Returns the final snapshot of every job.
    pub async fn shutdown(self) -> Vec<Job> {
        let Orchestrator {
            queue,
            registry,
            workers,
            tracker,
            ..
        } = self;
        drop(queue);

        for result in join_all(workers).await {
            if let Err(e) = result {
                error!("Worker task ended abnormally: {}", e);
            }
        }
        if let Err(e) = tracker.await {
            error!("Job tracker ended abnormally: {}", e);
        }

        let mut jobs: Vec<Job> = registry.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        info!("Job orchestrator stopped");
        jobs
    }
}

/// Pull requests until the queue closes.
async fn worker_loop(
    index: usize,
    runner: Arc<dyn JobRunner>,
    queue: SharedQueue,
    updates: mpsc::UnboundedSender<JobUpdate>,
) {
    debug!("Worker {} ready", index);

    loop {
        let request = queue.lock().await.recv().await;
        let Some(JobRequest { id, dataset }) = request else {
            break;
        };

        info!("Worker {} running job {} ({})", index, id, dataset);
        let _ = updates.send(JobUpdate::Started { id, at: Utc::now() });

        let job_runner = Arc::clone(&runner);
        let result = match tokio::task::spawn_blocking(move || job_runner.run(&dataset)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                warn!("Job {} failed: {}", id, e);
                Err(JobFailure::from(&e))
            }
            Err(e) => {
                error!("Job {} panicked: {}", id, e);
                Err(JobFailure::new("worker_panic", e.to_string()))
            }
        };

        let _ = updates.send(JobUpdate::Finished {
            id,
            at: Utc::now(),
            result,
        });
    }

    debug!("Worker {} stopped", index);
}

/// Apply worker updates to the registry until every worker is gone.
async fn track_updates(registry: Registry, mut updates: mpsc::UnboundedReceiver<JobUpdate>) {
    while let Some(update) = updates.recv().await {
        let id = update.id();
        let mut jobs = registry.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            warn!("Update for unknown job {}", id);
            continue;
        };

        if job.apply(update) {
            debug!("Job {} is now {}", id, job.state);
        } else {
            warn!("Ignored update for job {} in state {}", id, job.state);
        }
    }
}

//! FIFO job queue with a fixed worker pool.
//!
//! Queued workers and `run_sync` share one execution routine, so a job
//! produces the same terminal state whichever way it was submitted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::model::{Job, JobId, JobStatus, JobSummary};
use super::retention::RetentionPolicy;
use crate::config::QueueConfig;
use crate::dispatch::Dispatcher;
use crate::error::{QueueError, format_error_chain};
use crate::schemas::ParseResponse;

/// Queue tuning knobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Maximum number of jobs waiting for a worker; `None` is unbounded
    pub capacity: Option<usize>,
    pub retention: RetentionPolicy,
}

impl From<&QueueConfig> for QueueOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            capacity: config.capacity,
            retention: RetentionPolicy::from(config),
        }
    }
}

/// Items flowing through the FIFO.
enum QueueItem {
    Job(JobId),
    /// Consumed by exactly one worker, which then exits
    Shutdown,
}

enum Lifecycle {
    Idle,
    Running {
        workers: Vec<JoinHandle<()>>,
        sweeper: Option<(CancellationToken, JoinHandle<()>)>,
    },
    Stopped,
}

/// State shared between the queue handle and its workers.
struct Shared {
    dispatcher: Arc<Dispatcher>,
    registry: DashMap<JobId, Job>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<QueueItem>>,
    pending: AtomicUsize,
    /// Woken whenever a job reaches a terminal state
    finished: Notify,
}

impl Shared {
    /// Run a registered job to a terminal state.
    ///
    /// Registry guards are released before dispatching, so snapshot reads
    /// never wait on a running capability.
    async fn execute(&self, id: JobId) -> Result<ParseResponse, String> {
        let (task, payload) = {
            let Some(mut job) = self.registry.get_mut(&id) else {
                return Err(format!("Job {id} is not registered"));
            };
            if let Err(e) = job.start() {
                error!(job_id = %id, error = %e, "Refusing to execute job");
                return Err(e.to_string());
            }
            (job.task.clone(), job.payload.clone())
        };

        let outcome = self
            .dispatcher
            .dispatch(&task, &payload)
            .await
            .map_err(|e| format_error_chain(&e));

        let Some(mut job) = self.registry.get_mut(&id) else {
            warn!(job_id = %id, "Job left the registry while running");
            return outcome;
        };
        let recorded = match &outcome {
            Ok(response) => job.complete(response.clone()),
            Err(message) => job.fail(message.clone()),
        };
        if let Err(e) = recorded {
            error!(job_id = %id, error = %e, "Failed to record job outcome");
        }
        let status = job.status();
        drop(job);
        self.finished.notify_waiters();

        metrics::counter!("alchemy_jobs_finished_total", "status" => status.as_str()).increment(1);
        match &outcome {
            Ok(_) => debug!(job_id = %id, task = %task, "Job done"),
            Err(message) => warn!(job_id = %id, task = %task, error = %message, "Job failed"),
        }
        outcome
    }

    async fn next_item(&self) -> Option<QueueItem> {
        self.receiver.lock().await.recv().await
    }
}

/// Pool of workers draining one FIFO of jobs.
pub struct JobQueue {
    shared: Arc<Shared>,
    sender: mpsc::UnboundedSender<QueueItem>,
    options: QueueOptions,
    lifecycle: Mutex<Lifecycle>,
}

impl JobQueue {
    pub fn new(dispatcher: Arc<Dispatcher>, options: QueueOptions) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(Shared {
                dispatcher,
                registry: DashMap::new(),
                receiver: tokio::sync::Mutex::new(receiver),
                pending: AtomicUsize::new(0),
                finished: Notify::new(),
            }),
            sender,
            options,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn `worker_count` workers and the retention sweeper.
    ///
    /// Starting a running queue is a no-op. A stopped queue cannot be restarted.
    pub fn start(&self, worker_count: usize) -> Result<(), QueueError> {
        let mut lifecycle = self.lifecycle();
        match *lifecycle {
            Lifecycle::Running { ref workers, .. } => {
                warn!(workers = workers.len(), "Job queue already started");
                return Ok(());
            }
            Lifecycle::Stopped => return Err(QueueError::Closed),
            Lifecycle::Idle => {}
        }

        let worker_count = worker_count.max(1);
        let workers = (0..worker_count)
            .map(|worker_id| {
                let shared = Arc::clone(&self.shared);
                tokio::spawn(run_worker(shared, worker_id))
            })
            .collect();
        let sweeper = self.spawn_sweeper();

        *lifecycle = Lifecycle::Running { workers, sweeper };
        info!(workers = worker_count, "Job queue started");
        Ok(())
    }

    fn spawn_sweeper(&self) -> Option<(CancellationToken, JoinHandle<()>)> {
        let retention = self.options.retention;
        if retention.ttl.is_none() {
            return None;
        }

        let token = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(retention.sweep_interval);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        let evicted = retention.evict(&shared.registry, Utc::now());
                        if evicted > 0 {
                            info!(evicted, "Evicted finished jobs from registry");
                        }
                    }
                }
            }
        });

        Some((token, handle))
    }

    /// Close intake, let workers drain what is already queued, and wait for them.
    ///
    /// Jobs enqueued on a queue that was never started are drained by a
    /// single temporary worker.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle(), Lifecycle::Stopped);
        let (workers, sweeper) = match previous {
            Lifecycle::Running { workers, sweeper } => (workers, sweeper),
            Lifecycle::Idle if self.queue_size() > 0 => {
                info!(pending = self.queue_size(), "Draining jobs queued before start");
                let worker = tokio::spawn(run_worker(Arc::clone(&self.shared), 0));
                (vec![worker], None)
            }
            Lifecycle::Idle | Lifecycle::Stopped => return,
        };

        for _ in &workers {
            if self.sender.send(QueueItem::Shutdown).is_err() {
                warn!("Job queue receiver dropped before shutdown");
            }
        }

        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        if let Some((token, handle)) = sweeper {
            token.cancel();
            let _ = handle.await;
        }

        info!(remaining = self.queue_size(), "Job queue stopped");
    }

    /// Register a job and append it to the FIFO.
    pub fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
        let lifecycle = self.lifecycle();
        if matches!(*lifecycle, Lifecycle::Stopped) {
            return Err(QueueError::Closed);
        }
        if let Some(capacity) = self.options.capacity
            && self.queue_size() >= capacity
        {
            return Err(QueueError::Full { capacity });
        }

        let id = self.register(job)?;
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(QueueItem::Job(id)).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            self.shared.registry.remove(&id);
            return Err(QueueError::Closed);
        }
        drop(lifecycle);

        metrics::counter!("alchemy_jobs_enqueued_total").increment(1);
        metrics::gauge!("alchemy_job_queue_depth").set(self.queue_size() as f64);
        debug!(job_id = %id, "Job enqueued");
        Ok(id)
    }

    /// Register a job and execute it inline, returning its result or error.
    ///
    /// Works whether or not workers are running.
    pub async fn run_sync(&self, job: Job) -> Result<ParseResponse, QueueError> {
        let id = self.register(job)?;
        self.shared
            .execute(id)
            .await
            .map_err(|message| QueueError::JobFailed { id, message })
    }

    /// Only fresh jobs are accepted; anything already started or finished is refused.
    fn register(&self, job: Job) -> Result<JobId, QueueError> {
        let id = job.id;
        if job.status() != JobStatus::Pending {
            return Err(QueueError::NotPending {
                id,
                status: job.status(),
            });
        }
        match self.shared.registry.entry(id) {
            Entry::Occupied(_) => Err(QueueError::DuplicateJob { id }),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(id)
            }
        }
    }

    /// Snapshot of a job's current state.
    pub fn get_job(&self, id: JobId) -> Option<Job> {
        self.shared.registry.get(&id).map(|job| job.clone())
    }

    /// Jobs submitted through `enqueue` that no worker has picked up yet.
    pub fn queue_size(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn summary(&self) -> JobSummary {
        let mut summary = JobSummary::default();
        for job in self.shared.registry.iter() {
            summary.record(job.status());
        }
        summary
    }

    pub fn worker_count(&self) -> usize {
        match &*self.lifecycle() {
            Lifecycle::Running { workers, .. } => workers.len(),
            Lifecycle::Idle | Lifecycle::Stopped => 0,
        }
    }

    /// Wait until a job reaches a terminal state.
    ///
    /// Returns `None` if the job is unknown or was evicted.
    pub async fn wait_for(&self, id: JobId) -> Option<Job> {
        loop {
            let notified = self.shared.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let job = self.get_job(id)?;
            if job.is_terminal() {
                return Some(job);
            }
            notified.await;
        }
    }
}

async fn run_worker(shared: Arc<Shared>, worker_id: usize) {
    debug!(worker_id, "Worker started");

    while let Some(item) = shared.next_item().await {
        let QueueItem::Job(id) = item else {
            break;
        };
        let depth = shared.pending.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::gauge!("alchemy_job_queue_depth").set(depth as f64);

        info!(worker_id, job_id = %id, "Worker picked up job");
        // Failures are recorded on the job itself.
        let _ = shared.execute(id).await;
    }

    debug!(worker_id, "Worker exiting");
}

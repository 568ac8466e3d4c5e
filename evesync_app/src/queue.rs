use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use evesync_core::TokenId;
use serde::Serialize;
use tokio::{
    sync::{Mutex as AsyncMutex, mpsc, watch},
    task::JoinHandle,
    time::sleep,
};
use uuid::Uuid;

use crate::{AppError, config::LocalQueueConfig, pipeline::SyncReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SyncJobId(Uuid);

impl SyncJobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SyncJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SyncJobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl Serialize for SyncJobId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncTask {
    Assets { token_id: TokenId },
    IndustryJobs { token_id: TokenId },
}

impl SyncTask {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Assets { .. } => "sync_assets",
            Self::IndustryJobs { .. } => "sync_industry",
        }
    }

    pub fn token_id(&self) -> TokenId {
        match self {
            Self::Assets { token_id } | Self::IndustryJobs { token_id } => *token_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Started,
    Finished,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobStatus {
    pub id: SyncJobId,
    pub task: SyncTask,
    pub state: JobState,
    pub result: Option<SyncReport>,
    pub error: Option<String>,
    pub attempts: u32,
}

/// Work a queue worker runs for each dequeued task.
#[async_trait]
pub trait SyncExecutor: Send + Sync + 'static {
    async fn execute(&self, task: SyncTask) -> Result<SyncReport, AppError>;
}

/// Accepts sync requests and reports their progress. Delivery is
/// at-least-once; executors must be idempotent.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, task: SyncTask) -> Result<SyncJobId, AppError>;

    async fn status(&self, id: SyncJobId) -> Option<JobStatus>;

    /// Stops taking new work; jobs already running are allowed to finish.
    async fn shutdown(&self);

    async fn wait_for(&self, id: SyncJobId, poll_interval: Duration) -> Option<JobStatus> {
        loop {
            let status = self.status(id).await?;
            if status.state.is_terminal() {
                return Some(status);
            }
            sleep(poll_interval).await;
        }
    }
}

struct QueuedJob {
    id: SyncJobId,
    task: SyncTask,
}

struct TrackedJob {
    status: JobStatus,
    completed_at: Option<Instant>,
}

/// Job statuses by id. Terminal entries are dropped once they are older than
/// the configured result TTL.
#[derive(Clone)]
struct StatusTable {
    jobs: Arc<Mutex<HashMap<SyncJobId, TrackedJob>>>,
    result_ttl: Duration,
}

impl StatusTable {
    fn new(result_ttl: Duration) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            result_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SyncJobId, TrackedJob>> {
        match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn insert(&self, status: JobStatus) {
        let mut jobs = self.lock();
        evict_expired(&mut jobs, Instant::now(), self.result_ttl);
        jobs.insert(
            status.id,
            TrackedJob {
                status,
                completed_at: None,
            },
        );
    }

    fn remove(&self, id: SyncJobId) {
        self.lock().remove(&id);
    }

    fn get(&self, id: SyncJobId) -> Option<JobStatus> {
        let mut jobs = self.lock();
        evict_expired(&mut jobs, Instant::now(), self.result_ttl);
        jobs.get(&id).map(|tracked| tracked.status.clone())
    }

    fn update(&self, id: SyncJobId, apply: impl FnOnce(&mut JobStatus)) {
        if let Some(tracked) = self.lock().get_mut(&id) {
            apply(&mut tracked.status);
            if tracked.status.state.is_terminal() && tracked.completed_at.is_none() {
                tracked.completed_at = Some(Instant::now());
            }
        }
    }
}

fn evict_expired(jobs: &mut HashMap<SyncJobId, TrackedJob>, now: Instant, ttl: Duration) {
    let before = jobs.len();
    jobs.retain(|_, tracked| {
        tracked
            .completed_at
            .is_none_or(|done| now.saturating_duration_since(done) < ttl)
    });
    let evicted = before - jobs.len();
    if evicted > 0 {
        log::trace!("evicted {evicted} expired sync job result(s)");
    }
}

/// In-process queue: a bounded channel drained by a fixed pool of tokio
/// workers.
pub struct LocalJobQueue {
    sender: mpsc::Sender<QueuedJob>,
    statuses: StatusTable,
    shutdown_tx: watch::Sender<bool>,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl LocalJobQueue {
    pub fn start(executor: Arc<dyn SyncExecutor>, config: LocalQueueConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let statuses = StatusTable::new(config.result_ttl);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let max_attempts = config.max_attempts.max(1);

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&receiver),
                    Arc::clone(&executor),
                    statuses.clone(),
                    max_attempts,
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        log::debug!(
            "started local sync queue with {} workers, {} attempts per job",
            config.workers.max(1),
            max_attempts
        );

        Self {
            sender,
            statuses,
            shutdown_tx,
            workers: AsyncMutex::new(workers),
        }
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn enqueue(&self, task: SyncTask) -> Result<SyncJobId, AppError> {
        if *self.shutdown_tx.borrow() {
            return Err(AppError::QueueClosed);
        }

        let id = SyncJobId::new();
        self.statuses.insert(JobStatus {
            id,
            task,
            state: JobState::Queued,
            result: None,
            error: None,
            attempts: 0,
        });

        if self.sender.send(QueuedJob { id, task }).await.is_err() {
            self.statuses.remove(id);
            return Err(AppError::QueueClosed);
        }

        log::debug!("queued {} for token {} as job {id}", task.name(), task.token_id());
        Ok(id)
    }

    async fn status(&self, id: SyncJobId) -> Option<JobStatus> {
        self.statuses.get(id)
    }

    async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(err) = worker.await {
                log::error!("sync worker ended abnormally: {err}");
            }
        }
    }
}

impl Drop for LocalJobQueue {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn worker_loop(
    worker: usize,
    receiver: Arc<AsyncMutex<mpsc::Receiver<QueuedJob>>>,
    executor: Arc<dyn SyncExecutor>,
    statuses: StatusTable,
    max_attempts: u32,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let job = tokio::select! {
            job = next_job(&receiver) => job,
            changed = shutdown_rx.changed() => {
                if shutdown_signaled(changed, &shutdown_rx) {
                    break;
                }
                continue;
            }
        };

        let Some(job) = job else {
            break;
        };
        run_job(worker, &job, &executor, &statuses, max_attempts).await;
    }

    log::trace!("sync worker {worker} stopped");
}

async fn next_job(receiver: &AsyncMutex<mpsc::Receiver<QueuedJob>>) -> Option<QueuedJob> {
    receiver.lock().await.recv().await
}

async fn run_job(
    worker: usize,
    job: &QueuedJob,
    executor: &Arc<dyn SyncExecutor>,
    statuses: &StatusTable,
    max_attempts: u32,
) {
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        statuses.update(job.id, |status| {
            status.state = JobState::Started;
            status.attempts = attempt;
        });
        log::debug!(
            "worker {worker} running {} job {} (attempt {attempt}/{max_attempts})",
            job.task.name(),
            job.id
        );

        // A panicking executor takes down only its own task.
        let attempt_task = {
            let executor = Arc::clone(executor);
            let task = job.task;
            tokio::spawn(async move { executor.execute(task).await })
        };

        match attempt_task.await {
            Ok(Ok(report)) => {
                statuses.update(job.id, |status| {
                    status.state = JobState::Finished;
                    status.result = Some(report);
                    status.error = None;
                });
                return;
            }
            Ok(Err(err)) => {
                log::warn!(
                    "{} job {} attempt {attempt} failed: {}",
                    job.task.name(),
                    job.id,
                    err.display_chain()
                );
                last_error = err.display_chain().to_string();
                if !err.is_retryable() {
                    break;
                }
            }
            Err(join_err) => {
                last_error = format!("sync task aborted: {join_err}");
                break;
            }
        }
    }

    log::error!("{} job {} failed: {last_error}", job.task.name(), job.id);
    statuses.update(job.id, |status| {
        status.state = JobState::Failed;
        status.error = Some(last_error);
    });
}

fn shutdown_signaled(
    changed: Result<(), watch::error::RecvError>,
    shutdown_rx: &watch::Receiver<bool>,
) -> bool {
    changed.is_err() || *shutdown_rx.borrow()
}

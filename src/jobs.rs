//! Background render and compression queue.
//!
//! Decouples the caller from multi-second renders: a job is submitted, gets
//! an id immediately, and is picked up by one of a fixed number of workers.
//! Each worker runs one job at a time through [`PdfService`], so the
//! service deadline is the per-job time limit.
//!
//! ```text
//! submit_render / submit_compress
//!          │
//!          ▼
//!   ┌──────────────┐  bounded mpsc   ┌──────────┐ ┌──────────┐
//!   │  job store   │ ──────────────► │ worker 1 │ │ worker N │
//!   │ {id → state} │ ◄────────────── │          │ │          │
//!   └──────────────┘   state/result  └──────────┘ └──────────┘
//!          │
//!          ▼
//!   status / wait / take_result
//! ```
//!
//! # Job lifecycle
//!
//! `Pending` → `Started` → `Succeeded` | `Failed`. Finished results stay in
//! the store until [`JobQueue::take_result`] removes them or
//! [`QueueConfig::result_ttl`] passes, whichever comes first. Pending and
//! running jobs never expire.
//!
//! # Example
//!
//! ```rust,ignore
//! use html2pdf_render::prelude::*;
//!
//! let queue = JobQueue::start(service, &QueueConfig::default());
//! let id = queue.submit_render(RenderRequest::from_html("<p>hi</p>"), None).await?;
//! queue.wait(id).await;
//! let pdf = queue.take_result(id).unwrap()?;
//! queue.shutdown().await;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::compress::CompressionLevel;
use crate::config::QueueConfig;
use crate::request::RenderRequest;
use crate::service::{PdfService, ServiceError};

// ============================================================================
// Public Types
// ============================================================================

/// What a job does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Render,
    Compress,
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Started,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Snapshot of one job, suitable for a status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: Uuid,
    pub kind: JobKind,
    pub state: JobState,
    /// Error message for failed jobs.
    pub error: Option<String>,
    /// Output size for succeeded jobs.
    pub output_size: Option<usize>,
    /// Time from start to finish, once finished.
    #[serde(skip)]
    pub elapsed: Option<Duration>,
}

// ============================================================================
// Internals
// ============================================================================

enum Work {
    Render {
        request: Box<RenderRequest>,
        level: Option<u8>,
    },
    Compress {
        pdf: Vec<u8>,
        level: u8,
    },
}

struct Job {
    id: Uuid,
    work: Work,
}

struct Entry {
    kind: JobKind,
    state: JobState,
    started: Option<Instant>,
    finished: Option<Instant>,
    elapsed: Option<Duration>,
    result: Option<Result<Vec<u8>, ServiceError>>,
}

impl Entry {
    fn status(&self, id: Uuid) -> JobStatus {
        JobStatus {
            id,
            kind: self.kind,
            state: self.state,
            error: match &self.result {
                Some(Err(e)) => Some(e.to_string()),
                _ => None,
            },
            output_size: match &self.result {
                Some(Ok(pdf)) => Some(pdf.len()),
                _ => None,
            },
            elapsed: self.elapsed,
        }
    }
}

type Store = Arc<Mutex<HashMap<Uuid, Entry>>>;

/// Bounds on how often the store is swept for expired results.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn lock(store: &Store) -> Result<MutexGuard<'_, HashMap<Uuid, Entry>>, ServiceError> {
    store.lock().map_err(|e| {
        log::error!("❌ Job store lock poisoned: {}", e);
        ServiceError::Internal(format!("job store lock poisoned: {}", e))
    })
}

/// Remove finished entries older than `ttl`, returning how many went.
fn expire(store: &Store, ttl: Duration) -> usize {
    let Ok(mut jobs) = lock(store) else {
        return 0;
    };
    let before = jobs.len();
    jobs.retain(|_, entry| entry.finished.is_none_or(|at| at.elapsed() < ttl));
    before - jobs.len()
}

// ============================================================================
// JobQueue
// ============================================================================

/// Fixed pool of workers draining a bounded job channel.
pub struct JobQueue {
    /// Option allows dropping the sender during shutdown.
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    store: Store,
    finished: Arc<Notify>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    sweeper: JoinHandle<()>,
}

impl JobQueue {
    /// Spawn `config.workers` workers on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(service: PdfService, config: &QueueConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let store: Store = Arc::new(Mutex::new(HashMap::new()));
        let finished = Arc::new(Notify::new());

        let workers = (0..config.workers)
            .map(|n| {
                tokio::spawn(worker_loop(
                    n,
                    service.clone(),
                    Arc::clone(&receiver),
                    Arc::clone(&store),
                    Arc::clone(&finished),
                ))
            })
            .collect();
        let sweeper = tokio::spawn(sweeper_loop(Arc::clone(&store), config.result_ttl));

        log::info!(
            "Job queue started with {} workers (capacity {}, results kept {:?})",
            config.workers,
            config.capacity,
            config.result_ttl
        );

        Self {
            sender: Mutex::new(Some(sender)),
            store,
            finished,
            workers: Mutex::new(workers),
            sweeper,
        }
    }

    /// Queue a render, optionally followed by compression at `level`.
    ///
    /// Waits for channel capacity when the queue is full.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Compression`] for an out-of-range level.
    /// - [`ServiceError::QueueClosed`] after [`shutdown`](Self::shutdown).
    pub async fn submit_render(
        &self,
        request: RenderRequest,
        level: Option<u8>,
    ) -> Result<Uuid, ServiceError> {
        if let Some(level) = level {
            CompressionLevel::new(level)?;
        }
        let work = Work::Render {
            request: Box::new(request),
            level,
        };
        self.submit(JobKind::Render, work).await
    }

    /// Queue a compression of `pdf` at `level`.
    pub async fn submit_compress(&self, pdf: Vec<u8>, level: u8) -> Result<Uuid, ServiceError> {
        CompressionLevel::new(level)?;
        self.submit(JobKind::Compress, Work::Compress { pdf, level })
            .await
    }

    async fn submit(&self, kind: JobKind, work: Work) -> Result<Uuid, ServiceError> {
        let sender = self
            .sender
            .lock()
            .map_err(|e| ServiceError::Internal(format!("sender lock poisoned: {}", e)))?
            .clone()
            .ok_or(ServiceError::QueueClosed)?;

        let id = Uuid::new_v4();
        lock(&self.store)?.insert(
            id,
            Entry {
                kind,
                state: JobState::Pending,
                started: None,
                finished: None,
                elapsed: None,
                result: None,
            },
        );

        if sender.send(Job { id, work }).await.is_err() {
            lock(&self.store)?.remove(&id);
            log::warn!("Job {} rejected: queue closed", id);
            return Err(ServiceError::QueueClosed);
        }

        log::debug!("Queued {:?} job {}", kind, id);
        Ok(id)
    }

    /// Current status of a job, or `None` for unknown ids.
    pub fn status(&self, id: Uuid) -> Option<JobStatus> {
        lock(&self.store).ok()?.get(&id).map(|entry| entry.status(id))
    }

    /// Status of every job in the store.
    pub fn statuses(&self) -> Vec<JobStatus> {
        match lock(&self.store) {
            Ok(jobs) => jobs.iter().map(|(id, entry)| entry.status(*id)).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Remove a finished job and return its result.
    ///
    /// Returns `None` for unknown ids and for jobs still pending or running;
    /// those stay in the store.
    pub fn take_result(&self, id: Uuid) -> Option<Result<Vec<u8>, ServiceError>> {
        let mut jobs = lock(&self.store).ok()?;
        if !jobs.get(&id)?.state.is_finished() {
            return None;
        }
        jobs.remove(&id).and_then(|entry| entry.result)
    }

    /// Wait until a job finishes. Returns `None` for unknown ids.
    pub async fn wait(&self, id: Uuid) -> Option<JobState> {
        loop {
            // Registered before the check so a completion in between is seen.
            let notified = self.finished.notified();
            let state = self.status(id)?.state;
            if state.is_finished() {
                return Some(state);
            }
            notified.await;
        }
    }

    /// Stop accepting jobs, let workers drain the queue, and wait for them.
    pub async fn shutdown(&self) {
        let sender = match self.sender.lock() {
            Ok(mut sender) => sender.take(),
            Err(e) => {
                log::error!("❌ Sender lock poisoned during shutdown: {}", e);
                None
            }
        };
        drop(sender);

        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(e) => {
                log::error!("❌ Worker lock poisoned during shutdown: {}", e);
                Vec::new()
            }
        };

        log::info!("Shutting down job queue, waiting for {} workers...", workers.len());
        for worker in workers {
            if let Err(e) = worker.await {
                log::warn!("Worker task ended abnormally: {}", e);
            }
        }
        log::info!("✅ Job queue shutdown complete");
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().map(|s| s.is_none()).unwrap_or(true)
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        // The sweeper holds the store; it would otherwise outlive the queue.
        self.sweeper.abort();
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("closed", &self.is_closed())
            .field("jobs", &self.store.lock().map(|j| j.len()).unwrap_or(0))
            .finish()
    }
}

async fn worker_loop(
    n: usize,
    service: PdfService,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    store: Store,
    finished: Arc<Notify>,
) {
    log::debug!("Worker {} started", n);

    loop {
        // The guard is dropped before the job runs so other workers can
        // receive in the meantime.
        let job = receiver.lock().await.recv().await;
        let Some(Job { id, work }) = job else {
            break;
        };

        if let Ok(mut jobs) = lock(&store) {
            if let Some(entry) = jobs.get_mut(&id) {
                entry.state = JobState::Started;
                entry.started = Some(Instant::now());
            }
        }
        log::debug!("Worker {} started job {}", n, id);

        let result = match work {
            Work::Render { request, level } => service.render_and_compress(*request, level).await,
            Work::Compress { pdf, level } => service.compress(pdf, level).await,
        };

        match &result {
            Ok(pdf) => log::info!("✅ Job {} succeeded ({} bytes)", id, pdf.len()),
            Err(e) => log::warn!("Job {} failed: {}", id, e),
        }

        if let Ok(mut jobs) = lock(&store) {
            if let Some(entry) = jobs.get_mut(&id) {
                entry.state = if result.is_ok() {
                    JobState::Succeeded
                } else {
                    JobState::Failed
                };
                entry.elapsed = entry.started.map(|s| s.elapsed());
                entry.finished = Some(Instant::now());
                entry.result = Some(result);
            }
        }
        finished.notify_waiters();
    }

    log::debug!("Worker {} exiting cleanly", n);
}

async fn sweeper_loop(store: Store, ttl: Duration) {
    let period = (ttl / 2).clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL);
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        let expired = expire(&store, ttl);
        if expired > 0 {
            log::debug!("Expired {} uncollected job results", expired);
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::CompressionEngine;
    use crate::config::{QueueConfigBuilder, RenderConfigBuilder};
    use crate::driver::mock::{MockBrowserLauncher, PrintBehavior, sample_pdf};
    use crate::render::Renderer;
    use std::path::Path;

    fn queue(launcher: &MockBrowserLauncher, root: &Path, workers: usize) -> JobQueue {
        queue_with_ttl(launcher, root, workers, Duration::from_secs(3600))
    }

    fn queue_with_ttl(
        launcher: &MockBrowserLauncher,
        root: &Path,
        workers: usize,
        ttl: Duration,
    ) -> JobQueue {
        let config = RenderConfigBuilder::new()
            .ready_poll_interval(Duration::from_millis(5))
            .temp_root(root)
            .build()
            .unwrap();
        let service = PdfService::new(
            Renderer::new(Arc::new(launcher.clone()), config),
            CompressionEngine::lopdf(),
        );
        let config = QueueConfigBuilder::new()
            .workers(workers)
            .capacity(8)
            .result_ttl(ttl)
            .build()
            .unwrap();
        JobQueue::start(service, &config)
    }

    #[tokio::test]
    async fn test_render_job_succeeds() {
        let root = tempfile::tempdir().unwrap();
        let launcher = MockBrowserLauncher::new();
        let queue = queue(&launcher, root.path(), 2);

        let id = queue
            .submit_render(RenderRequest::from_html("<p>job</p>"), None)
            .await
            .unwrap();

        assert_eq!(queue.wait(id).await, Some(JobState::Succeeded));
        let status = queue.status(id).unwrap();
        assert_eq!(status.kind, JobKind::Render);
        assert!(status.output_size.unwrap() > 0);

        let pdf = queue.take_result(id).unwrap().unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
        assert!(queue.status(id).is_none());

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_job_keeps_error() {
        let root = tempfile::tempdir().unwrap();
        let launcher = MockBrowserLauncher::new().print(PrintBehavior::NotPdf);
        let queue = queue(&launcher, root.path(), 1);

        let id = queue
            .submit_render(RenderRequest::from_html("<p>job</p>"), None)
            .await
            .unwrap();

        assert_eq!(queue.wait(id).await, Some(JobState::Failed));
        let status = queue.status(id).unwrap();
        assert!(status.error.unwrap().contains("extract"));
        assert!(matches!(
            queue.take_result(id),
            Some(Err(ServiceError::Render(_)))
        ));

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_compress_job() {
        let root = tempfile::tempdir().unwrap();
        let queue = queue(&MockBrowserLauncher::new(), root.path(), 1);
        let pdf = sample_pdf().unwrap();

        let id = queue.submit_compress(pdf.clone(), 0).await.unwrap();

        assert_eq!(queue.wait(id).await, Some(JobState::Succeeded));
        assert_eq!(queue.take_result(id).unwrap().unwrap(), pdf);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_level_is_rejected_at_submit() {
        let root = tempfile::tempdir().unwrap();
        let queue = queue(&MockBrowserLauncher::new(), root.path(), 1);

        let err = queue.submit_compress(vec![], 42).await.unwrap_err();
        assert!(matches!(err, ServiceError::Compression(_)));
        assert!(queue.statuses().is_empty());

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_closes() {
        let root = tempfile::tempdir().unwrap();
        let launcher = MockBrowserLauncher::new();
        let queue = queue(&launcher, root.path(), 2);

        let mut ids = Vec::new();
        for i in 0..4 {
            let request = RenderRequest::from_html(format!("<p>{}</p>", i));
            ids.push(queue.submit_render(request, None).await.unwrap());
        }

        queue.shutdown().await;

        assert!(queue.is_closed());
        for id in ids {
            assert_eq!(queue.status(id).unwrap().state, JobState::Succeeded);
        }
        assert_eq!(launcher.launch_count(), 4);
        assert_eq!(launcher.live_sessions(), 0);

        let err = queue
            .submit_render(RenderRequest::from_html("<p>late</p>"), None)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::QueueClosed);
    }

    /// Results nobody collects are dropped once the TTL passes.
    #[tokio::test]
    async fn test_uncollected_results_expire() {
        let root = tempfile::tempdir().unwrap();
        let launcher = MockBrowserLauncher::new();
        let queue = queue_with_ttl(&launcher, root.path(), 1, Duration::from_millis(50));

        let id = queue.submit_compress(sample_pdf().unwrap(), 0).await.unwrap();
        queue.wait(id).await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(queue.status(id).is_none());
        assert!(queue.take_result(id).is_none());
        assert!(queue.statuses().is_empty());

        queue.shutdown().await;
    }

    /// The TTL counts from completion, so long-running jobs are never swept.
    #[tokio::test]
    async fn test_running_jobs_do_not_expire() {
        let root = tempfile::tempdir().unwrap();
        let launcher = MockBrowserLauncher::new().print_delay(Duration::from_millis(600));
        let queue = queue_with_ttl(&launcher, root.path(), 1, Duration::from_millis(200));

        let id = queue
            .submit_render(RenderRequest::from_html("<p>slow</p>"), None)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!queue.status(id).unwrap().state.is_finished());

        assert_eq!(queue.wait(id).await, Some(JobState::Succeeded));
        queue.shutdown().await;
    }

    #[test]
    fn test_expire_keeps_unfinished_and_fresh_entries() {
        let store: Store = Arc::new(Mutex::new(HashMap::new()));
        let entry = |finished: Option<Instant>| Entry {
            kind: JobKind::Compress,
            state: if finished.is_some() { JobState::Succeeded } else { JobState::Started },
            started: None,
            finished,
            elapsed: None,
            result: None,
        };
        let old = Instant::now() - Duration::from_secs(10);
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        let running = Uuid::new_v4();
        {
            let mut jobs = store.lock().unwrap();
            jobs.insert(stale, entry(Some(old)));
            jobs.insert(fresh, entry(Some(Instant::now())));
            jobs.insert(running, entry(None));
        }

        assert_eq!(expire(&store, Duration::from_secs(5)), 1);
        let jobs = store.lock().unwrap();
        assert!(!jobs.contains_key(&stale));
        assert!(jobs.contains_key(&fresh));
        assert!(jobs.contains_key(&running));
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let root = tempfile::tempdir().unwrap();
        let queue = queue(&MockBrowserLauncher::new(), root.path(), 1);
        let id = Uuid::new_v4();

        assert!(queue.status(id).is_none());
        assert!(queue.take_result(id).is_none());
        assert!(queue.wait(id).await.is_none());

        queue.shutdown().await;
    }
}

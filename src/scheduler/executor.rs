use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::job::{Job, JobPayload};
use super::rate::RateLimiter;
use super::registry::{HandlerRegistry, JobHandler};
use super::store::{JobStore, RetentionPolicy};
use crate::error::SchedulerError;

/// Limits applied by a [`Scheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Jobs allowed in `Processing` at once.
    pub concurrency: usize,
    /// Job starts allowed per `rate_window`. Zero disables rate limiting.
    pub rate_limit: usize,
    pub rate_window: Duration,
    pub job_timeout: Duration,
    pub retention: RetentionPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            rate_limit: 5,
            rate_window: Duration::from_secs(1),
            job_timeout: Duration::from_secs(300),
            retention: RetentionPolicy::default(),
        }
    }
}

/// Snapshot for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub queued: usize,
    pub in_flight: usize,
    pub is_paused: bool,
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub cancelled_jobs: usize,
}

const CANCELLED_BY_CALLER: &str = "cancelled by caller";
const CANCELLED_BY_SHUTDOWN: &str = "scheduler shut down";

struct Shared {
    config: SchedulerConfig,
    store: JobStore,
    registry: HandlerRegistry,
    limiter: RateLimiter,
    slots: Arc<Semaphore>,
    /// Signalled on submit and resume.
    wake: Notify,
    /// Signalled whenever a job reaches a terminal state.
    settled: Notify,
    paused: AtomicBool,
    stop: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// Bounded-concurrency, rate-limited background executor.
///
/// Cloning is cheap and every clone drives the same queue. Dropping the last
/// clone stops dispatch; call [`Scheduler::shutdown`] to also drain in-flight
/// jobs. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
    _stop_on_drop: Arc<DropGuard>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let stop = CancellationToken::new();
        let shared = Arc::new(Shared {
            limiter: RateLimiter::new(config.rate_limit, config.rate_window),
            slots: Arc::new(Semaphore::new(config.concurrency.max(1))),
            config,
            store: JobStore::new(),
            registry: HandlerRegistry::new(),
            wake: Notify::new(),
            settled: Notify::new(),
            paused: AtomicBool::new(false),
            stop: stop.clone(),
            dispatcher: Mutex::new(None),
        });

        let handle = tokio::spawn(dispatch_loop(shared.clone()));
        *shared.dispatcher.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        Self {
            shared,
            _stop_on_drop: Arc::new(stop.drop_guard()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Bind a handler to a job type, replacing any earlier binding.
    pub fn register_handler(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.shared.registry.register(job_type, handler);
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.shared.registry.job_types()
    }

    /// Queue a job and return its id immediately.
    ///
    /// Jobs of an unregistered type are still accepted; they fail at dispatch.
    pub fn submit(&self, payload: JobPayload) -> Result<String, SchedulerError> {
        let job = Job::new(payload);
        let id = job.id.clone();
        let job_type = job.job_type.clone();
        // The closed check and the insert share the store lock with shutdown.
        if !self.shared.store.insert(job) {
            return Err(SchedulerError::ShuttingDown);
        }
        if !self.shared.registry.contains(&job_type) {
            warn!(job_id = %id, job_type = %job_type, "no handler registered, job will fail");
        }
        info!(job_id = %id, job_type = %job_type, "job submitted");
        self.shared.wake.notify_one();
        Ok(id)
    }

    /// Cancel a pending job. Returns `false` if the job is unknown, already
    /// running or already finished; running handlers are never interrupted.
    pub fn cancel(&self, job_id: &str) -> bool {
        let cancelled = self.shared.store.cancel(job_id, CANCELLED_BY_CALLER);
        if cancelled {
            info!(job_id, "job cancelled");
            self.shared.settled.notify_waiters();
        } else {
            debug!(job_id, "cancel ignored, job is not pending");
        }
        cancelled
    }

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.shared.store.get(job_id)
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        self.shared.store.list()
    }

    pub fn find_jobs<P>(&self, predicate: P) -> Vec<Job>
    where
        P: Fn(&Job) -> bool,
    {
        self.shared.store.find(predicate)
    }

    /// Every retained job correlated with `asset_id`, oldest first.
    pub fn find_jobs_by_asset_id(&self, asset_id: &str) -> Vec<Job> {
        self.find_jobs(|job| job.payload.asset_id() == Some(asset_id))
    }

    /// The pending or processing job for `asset_id` of the given type, if any.
    pub fn active_job_for_asset(&self, asset_id: &str, job_type: &str) -> Option<Job> {
        self.find_jobs(|job| {
            job.status.is_active()
                && job.job_type == job_type
                && job.payload.asset_id() == Some(asset_id)
        })
        .pop()
    }

    /// Resolve once the job reaches a terminal state. Returns `None` if the
    /// job is unknown or was evicted by the retention policy.
    pub async fn wait_for_job(&self, job_id: &str) -> Option<Job> {
        loop {
            let settled = self.shared.settled.notified();
            let job = self.shared.store.get(job_id)?;
            if job.status.is_terminal() {
                return Some(job);
            }
            settled.await;
        }
    }

    /// Stop starting new jobs. Submissions are still accepted.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
        info!("scheduler paused");
    }

    pub fn resume(&self) {
        if self.shared.store.is_closed() {
            return;
        }
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.wake.notify_one();
        info!("scheduler resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SchedulerStats {
        let counts = self.shared.store.counts();
        SchedulerStats {
            queued: counts.pending,
            in_flight: counts.processing,
            is_paused: self.is_paused(),
            total_jobs: counts.total,
            completed_jobs: counts.completed,
            failed_jobs: counts.failed,
            cancelled_jobs: counts.cancelled,
        }
    }

    /// Apply the retention policy now. Returns the number of evicted jobs.
    pub fn prune(&self) -> usize {
        self.shared
            .store
            .prune(&self.shared.config.retention, Utc::now())
    }

    /// Refuse new jobs, cancel everything still queued and wait for running
    /// jobs to finish.
    pub async fn shutdown(&self) {
        let first = !self.shared.store.is_closed();
        let cancelled = self.shared.store.close(CANCELLED_BY_SHUTDOWN);
        self.shared.paused.store(true, Ordering::SeqCst);
        self.shared.stop.cancel();
        if cancelled > 0 {
            self.shared.settled.notify_waiters();
        }

        let dispatcher = self
            .shared
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = dispatcher {
            let _ = handle.await;
        }

        loop {
            let settled = self.shared.settled.notified();
            if self.shared.store.counts().processing == 0 {
                break;
            }
            settled.await;
        }

        if first {
            info!(cancelled, "scheduler shut down");
        }
    }
}

async fn dispatch_loop(shared: Arc<Shared>) {
    loop {
        let permit = tokio::select! {
            _ = shared.stop.cancelled() => break,
            permit = shared.slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let Some(job_id) = next_job(&shared).await else {
            break;
        };

        tokio::select! {
            _ = shared.stop.cancelled() => break,
            _ = shared.limiter.acquire() => {}
        }

        // Paused while waiting for a rate slot: hand the job back and wait
        // for resume in `next_job`.
        if shared.paused.load(Ordering::SeqCst) {
            shared.store.requeue_front(&job_id);
            debug!(job_id = %job_id, "scheduler paused, job returned to queue");
            continue;
        }

        // The pending check happens under the store lock, so a cancel that
        // landed while we waited for a rate slot wins here.
        let Some(payload) = shared.store.start(&job_id) else {
            debug!(job_id = %job_id, "skipping job cancelled before start");
            continue;
        };

        let worker = shared.clone();
        tokio::spawn(async move {
            run_job(&worker, job_id, payload).await;
            drop(permit);
        });
    }
    debug!("dispatch loop stopped");
}

async fn next_job(shared: &Shared) -> Option<String> {
    loop {
        let woken = shared.wake.notified();
        if !shared.paused.load(Ordering::SeqCst)
            && let Some(id) = shared.store.pop_pending()
        {
            return Some(id);
        }
        tokio::select! {
            _ = shared.stop.cancelled() => return None,
            _ = woken => {}
        }
    }
}

async fn run_job(shared: &Shared, job_id: String, payload: JobPayload) {
    let job_type = payload.job_type().to_string();
    info!(job_id = %job_id, job_type = %job_type, "job started");

    let result = match shared.registry.get(&job_type) {
        Some(handler) => invoke(handler, payload, shared.config.job_timeout).await,
        None => Err(SchedulerError::NoHandler(job_type.clone()).to_string()),
    };

    match &result {
        Ok(()) => info!(job_id = %job_id, job_type = %job_type, "job completed"),
        Err(error) => warn!(job_id = %job_id, job_type = %job_type, %error, "job failed"),
    }

    shared.store.finish(&job_id, result);
    shared
        .store
        .prune_keeping(&shared.config.retention, Utc::now(), Some(&job_id));
    shared.settled.notify_waiters();
}

/// Run the handler on its own task so a panic is contained and a timeout can
/// abort it, which drops any backend request still in flight.
async fn invoke(
    handler: Arc<dyn JobHandler>,
    payload: JobPayload,
    job_timeout: Duration,
) -> Result<(), String> {
    let mut task = tokio::spawn(async move { handler.handle(payload).await });
    match tokio::time::timeout(job_timeout, &mut task).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(error))) => Err(format!("{error:#}")),
        Ok(Err(join_error)) => {
            Err(SchedulerError::Panicked(panic_message(join_error)).to_string())
        }
        Err(_) => {
            task.abort();
            Err(SchedulerError::Timeout(job_timeout.as_secs()).to_string())
        }
    }
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let panic = error.into_panic();
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

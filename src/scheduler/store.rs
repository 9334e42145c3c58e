use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::job::{Job, JobPayload, JobStatus};

/// How long finished jobs stay queryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Keep at most this many terminal jobs; the oldest completions go first.
    pub max_finished: Option<usize>,
    /// Evict terminal jobs that completed longer ago than this.
    pub max_age: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_finished: Some(1000),
            max_age: Some(Duration::from_secs(24 * 60 * 60)),
        }
    }
}

impl RetentionPolicy {
    /// Never evict anything.
    pub fn unbounded() -> Self {
        Self {
            max_finished: None,
            max_age: None,
        }
    }
}

/// Point-in-time counts over the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Job>,
    /// Submission order. Ids of jobs that left `Pending` are skipped on pop.
    queue: VecDeque<String>,
    /// Set by [`JobStore::close`]; no job is inserted afterwards.
    closed: bool,
}

/// Owns every job record. All status changes go through here so that
/// dispatch and cancellation observe each other under one lock.
#[derive(Default)]
pub struct JobStore {
    inner: Mutex<Inner>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a new job. Returns `false`, dropping the job, once the store is
    /// closed.
    pub fn insert(&self, job: Job) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        inner.queue.push_back(job.id.clone());
        inner.jobs.insert(job.id.clone(), job);
        true
    }

    /// Put a popped job back at the head of the queue.
    pub fn requeue_front(&self, id: &str) {
        let mut inner = self.lock();
        inner.queue.push_front(id.to_string());
    }

    /// Take the oldest job that is still pending, leaving its status untouched.
    pub fn pop_pending(&self) -> Option<String> {
        let mut inner = self.lock();
        while let Some(id) = inner.queue.pop_front() {
            if inner.jobs.get(&id).map(|j| j.status) == Some(JobStatus::Pending) {
                return Some(id);
            }
        }
        None
    }

    /// Flip a pending job to processing and hand out its payload. Returns
    /// `None` when the job was cancelled (or evicted) since it was popped.
    pub fn start(&self, id: &str) -> Option<JobPayload> {
        let mut inner = self.lock();
        let job = inner.jobs.get_mut(id)?;
        job.mark_processing().then(|| job.payload.clone())
    }

    pub fn finish(&self, id: &str, result: Result<(), String>) {
        let mut inner = self.lock();
        if let Some(job) = inner.jobs.get_mut(id) {
            job.mark_finished(result);
        }
    }

    pub fn cancel(&self, id: &str, reason: &str) -> bool {
        let mut inner = self.lock();
        inner
            .jobs
            .get_mut(id)
            .is_some_and(|job| job.mark_cancelled(reason))
    }

    /// Refuse further inserts and cancel every pending job in the same
    /// critical section. Returns how many jobs were cancelled.
    pub fn close(&self, reason: &str) -> usize {
        let mut inner = self.lock();
        inner.closed = true;
        let mut cancelled = 0;
        for job in inner.jobs.values_mut() {
            if job.mark_cancelled(reason) {
                cancelled += 1;
            }
        }
        inner.queue.clear();
        cancelled
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.lock().jobs.get(id).cloned()
    }

    /// Every job, oldest first.
    pub fn list(&self) -> Vec<Job> {
        self.find(|_| true)
    }

    /// Jobs matching `predicate`, oldest first.
    pub fn find<P>(&self, predicate: P) -> Vec<Job>
    where
        P: Fn(&Job) -> bool,
    {
        let inner = self.lock();
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|job| predicate(job))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    pub fn counts(&self) -> JobCounts {
        let inner = self.lock();
        let mut counts = JobCounts {
            total: inner.jobs.len(),
            ..Default::default()
        };
        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Evict terminal jobs according to `policy`. Active jobs are never
    /// touched. Returns the number of evicted records.
    pub fn prune(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> usize {
        self.prune_keeping(policy, now, None)
    }

    /// Like [`JobStore::prune`], but never evicts `keep`. `keep` still counts
    /// towards `max_finished`.
    pub fn prune_keeping(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
        keep: Option<&str>,
    ) -> usize {
        let mut inner = self.lock();

        let mut finished: Vec<(DateTime<Utc>, String)> = inner
            .jobs
            .values()
            .filter(|job| job.status.is_terminal())
            .map(|job| (job.completed_at.unwrap_or(job.created_at), job.id.clone()))
            .collect();
        finished.sort();

        let mut evict: Vec<String> = Vec::new();
        if let Some(max_age) = policy.max_age {
            let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
            evict.extend(
                finished
                    .iter()
                    .take_while(|(completed, _)| now - *completed > max_age)
                    .map(|(_, id)| id.clone()),
            );
        }
        if let Some(max_finished) = policy.max_finished {
            let remaining = finished.len() - evict.len();
            if remaining > max_finished {
                evict.extend(
                    finished
                        .iter()
                        .skip(evict.len())
                        .take(remaining - max_finished)
                        .map(|(_, id)| id.clone()),
                );
            }
        }
        evict.retain(|id| Some(id.as_str()) != keep);

        for id in &evict {
            inner.jobs.remove(id);
        }
        if !evict.is_empty() {
            debug!(evicted = evict.len(), "pruned finished jobs");
        }
        evict.len()
    }
}

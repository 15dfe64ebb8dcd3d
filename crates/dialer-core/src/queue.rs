//! The dialer job queue
//!
//! Three structures, one membership invariant: at any instant a live job
//! sits in exactly one of the priority stack, a tenant lane, the scheduled
//! set, or the processing set. All transitions happen under one lock so
//! the invariant holds at every observable point.
//!
//! - **Priority stack**: jobs with priority >= 8, last-in first-out, so the
//!   most recently declared emergency is dialed first.
//! - **Tenant lanes**: one FIFO per tenant for normal work, drained
//!   round-robin across whatever tenant list the caller supplies, which
//!   keeps one noisy tenant from starving the rest.
//! - **Scheduled set**: retries and rule-deferrals ordered by due time.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{DialerError, DialerResult};
use crate::job::{DialerJob, JobStatus};
use crate::outcome::CallOutcome;

#[derive(Default)]
struct QueueInner {
    priority: VecDeque<DialerJob>,
    tenants: HashMap<String, VecDeque<DialerJob>>,
    scheduled: BTreeMap<(i64, String), DialerJob>,
    processing: HashMap<String, DialerJob>,
    rr_cursor: usize,
}

/// Queue depths, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDepths {
    /// Jobs in the priority stack
    pub priority: usize,
    /// Jobs across all tenant lanes
    pub tenants: usize,
    /// Jobs awaiting their due time
    pub scheduled: usize,
    /// Jobs currently held by workers
    pub processing: usize,
}

/// In-memory dialer queue shared between producers and the worker.
pub struct DialerQueue {
    inner: Mutex<QueueInner>,
}

impl DialerQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
        }
    }

    /// Add a job to its queue structure by priority class.
    pub fn enqueue(&self, mut job: DialerJob) {
        job.status = JobStatus::Pending;
        let mut inner = self.inner.lock();
        if job.is_priority() {
            // LIFO on purpose: newest urgent job wins
            inner.priority.push_front(job);
        } else {
            inner
                .tenants
                .entry(job.tenant_id.clone())
                .or_default()
                .push_back(job);
        }
    }

    /// Take the next job: priority stack first, then round-robin across
    /// the supplied active tenants. The job moves to the processing set.
    pub fn dequeue(&self, active_tenants: &[String]) -> Option<DialerJob> {
        let mut inner = self.inner.lock();

        let mut job = inner.priority.pop_front();

        if job.is_none() && !active_tenants.is_empty() {
            let start = inner.rr_cursor % active_tenants.len();
            for offset in 0..active_tenants.len() {
                let idx = (start + offset) % active_tenants.len();
                let tenant = &active_tenants[idx];
                if let Some(lane) = inner.tenants.get_mut(tenant) {
                    if let Some(found) = lane.pop_front() {
                        inner.rr_cursor = idx + 1;
                        job = Some(found);
                        break;
                    }
                }
            }
        }

        let mut job = job?;
        job.status = JobStatus::Processing;
        inner.processing.insert(job.job_id.clone(), job.clone());
        Some(job)
    }

    /// Park a finished attempt for retry: consumes an attempt, stamps the
    /// due time, moves the job to the scheduled set.
    pub fn schedule_retry(&self, mut job: DialerJob, delay: Duration) {
        let mut inner = self.inner.lock();
        inner.processing.remove(&job.job_id);

        job.status = JobStatus::RetryScheduled;
        job.attempt_number += 1;
        let due = Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        job.scheduled_at = Some(due);
        debug!(job_id = %job.job_id, attempt = job.attempt_number, %due, "retry scheduled");
        inner
            .scheduled
            .insert((due.timestamp(), job.job_id.clone()), job);
    }

    /// Park a rule-deferred job without consuming an attempt.
    ///
    /// Rule skips (outside window, concurrency, cooldown) are not call
    /// attempts, so the attempt budget is untouched.
    pub fn defer(&self, mut job: DialerJob, delay: Duration) {
        let mut inner = self.inner.lock();
        inner.processing.remove(&job.job_id);

        job.status = JobStatus::Skipped;
        let due = Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        job.scheduled_at = Some(due);
        inner
            .scheduled
            .insert((due.timestamp(), job.job_id.clone()), job);
    }

    /// Promote every scheduled job whose due time has passed back into its
    /// queue structure. Returns how many were promoted.
    pub fn process_scheduled_jobs(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock();

        let due_keys: Vec<(i64, String)> = inner
            .scheduled
            .range(..=(now.timestamp(), String::from("\u{10FFFF}")))
            .map(|(k, _)| k.clone())
            .collect();

        let mut promoted = 0;
        for key in due_keys {
            if let Some(mut job) = inner.scheduled.remove(&key) {
                job.status = JobStatus::Pending;
                job.scheduled_at = None;
                if job.is_priority() {
                    inner.priority.push_front(job);
                } else {
                    inner
                        .tenants
                        .entry(job.tenant_id.clone())
                        .or_default()
                        .push_back(job);
                }
                promoted += 1;
            }
        }
        promoted
    }

    /// Remove a processing job and mark it terminal.
    pub fn complete(
        &self,
        job_id: &str,
        status: JobStatus,
        outcome: Option<CallOutcome>,
        error: Option<String>,
    ) -> DialerResult<DialerJob> {
        debug_assert!(status.is_terminal(), "complete() requires a terminal status");
        let mut inner = self.inner.lock();
        let mut job = inner
            .processing
            .remove(job_id)
            .ok_or_else(|| DialerError::JobNotFound {
                job_id: job_id.to_string(),
                place: "processing set",
            })?;
        job.status = status;
        job.completed_at = Some(Utc::now());
        job.last_outcome = outcome;
        job.last_error = error;
        Ok(job)
    }

    /// Fetch a processing job by id, leaving it in place.
    pub fn processing_job(&self, job_id: &str) -> Option<DialerJob> {
        self.inner.lock().processing.get(job_id).cloned()
    }

    /// Find the processing job that owns a call record, if any.
    pub fn processing_job_by_call(&self, call_id: &str) -> Option<DialerJob> {
        self.inner
            .lock()
            .processing
            .values()
            .find(|job| job.call_id.as_deref() == Some(call_id))
            .cloned()
    }

    /// Overwrite the stored copy of a processing job (stamping
    /// `processed_at`, `call_id`) so completion handlers see it.
    pub fn update_processing(&self, job: &DialerJob) -> DialerResult<()> {
        let mut inner = self.inner.lock();
        match inner.processing.get_mut(&job.job_id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(DialerError::JobNotFound {
                job_id: job.job_id.clone(),
                place: "processing set",
            }),
        }
    }

    /// Current depth of every structure.
    pub fn depths(&self) -> QueueDepths {
        let inner = self.inner.lock();
        QueueDepths {
            priority: inner.priority.len(),
            tenants: inner.tenants.values().map(|lane| lane.len()).sum(),
            scheduled: inner.scheduled.len(),
            processing: inner.processing.len(),
        }
    }

    /// Name of the structure currently holding the job, if any.
    pub fn locate(&self, job_id: &str) -> Option<&'static str> {
        let inner = self.inner.lock();
        let mut found = None;
        let mut count = 0;
        if inner.priority.iter().any(|j| j.job_id == job_id) {
            found = Some("priority");
            count += 1;
        }
        if inner
            .tenants
            .values()
            .any(|lane| lane.iter().any(|j| j.job_id == job_id))
        {
            found = Some("tenant");
            count += 1;
        }
        if inner.scheduled.values().any(|j| j.job_id == job_id) {
            found = Some("scheduled");
            count += 1;
        }
        if inner.processing.contains_key(job_id) {
            found = Some("processing");
            count += 1;
        }
        debug_assert!(count <= 1, "job {} present in {} structures", job_id, count);
        found
    }
}

impl Default for DialerQueue {
    fn default() -> Self {
        Self::new()
    }
}

//! Dialer job: one queued intent to place one outbound call attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::outcome::CallOutcome;

/// Lifecycle of a dialer job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the priority or a tenant queue
    Pending,
    /// Dequeued by a worker; call being placed or in progress
    Processing,
    /// Parked in the scheduled set awaiting its retry time
    RetryScheduled,
    /// Terminal: attempt chain finished without reaching the goal
    Completed,
    /// Terminal: retry budget exhausted on a retryable outcome
    Failed,
    /// Deferred by calling rules; back in the scheduled set
    Skipped,
    /// Terminal: campaign goal reached
    GoalAchieved,
    /// Terminal: the number can never be called again
    NonRetryable,
}

impl JobStatus {
    /// Whether this status removes the job from all queue structures
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::Failed
                | JobStatus::GoalAchieved
                | JobStatus::NonRetryable
        )
    }
}

/// A queued intent to place exactly one outbound call attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialerJob {
    /// Unique job identifier
    pub job_id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Campaign this call belongs to
    pub campaign_id: String,
    /// Lead being called
    pub lead_id: String,
    /// E.164 destination number
    pub phone_number: String,
    /// Priority in [1, 10]; 8 and above pre-empts tenant lanes
    pub priority: u8,
    /// Current lifecycle status
    pub status: JobStatus,
    /// Attempts consumed so far
    pub attempt_number: u32,
    /// When a scheduled job becomes due
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When a worker last picked the job up
    pub processed_at: Option<DateTime<Utc>>,
    /// When the job went terminal
    pub completed_at: Option<DateTime<Utc>>,
    /// Outcome of the most recent attempt
    pub last_outcome: Option<CallOutcome>,
    /// Failure detail from the most recent attempt
    pub last_error: Option<String>,
    /// Call record created for the in-flight attempt
    pub call_id: Option<String>,
}

impl DialerJob {
    /// Build a fresh pending job.
    pub fn new(
        tenant_id: impl Into<String>,
        campaign_id: impl Into<String>,
        lead_id: impl Into<String>,
        phone_number: impl Into<String>,
        priority: u8,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            campaign_id: campaign_id.into(),
            lead_id: lead_id.into(),
            phone_number: phone_number.into(),
            priority: priority.clamp(1, 10),
            status: JobStatus::Pending,
            attempt_number: 0,
            scheduled_at: None,
            created_at: Utc::now(),
            processed_at: None,
            completed_at: None,
            last_outcome: None,
            last_error: None,
            call_id: None,
        }
    }

    /// Whether this job pre-empts the tenant lanes
    pub fn is_priority(&self) -> bool {
        self.priority >= 8
    }
}

//! Campaign and lead entities as the dialer sees them
//!
//! These are the read/write views the worker needs; the persistence layer
//! owns the full rows and maps them into these structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::outcome::CallOutcome;

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Not yet started
    Draft,
    /// Actively dialing
    Running,
    /// Temporarily stopped; jobs are skipped
    Paused,
    /// Finished
    Completed,
}

/// One outbound campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Campaign identifier
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Lifecycle status
    pub status: CampaignStatus,
    /// Base system prompt template, if overridden
    pub system_prompt_template: Option<String>,
    /// TTS voice for this campaign
    pub voice_id: String,
    /// What the agent is trying to achieve
    pub goal_description: String,
    /// Per-campaign concurrency ceiling
    pub max_concurrent_calls: u32,
    /// Retry budget per lead
    pub max_retries: u32,
    /// Calling rules attached to this campaign
    pub calling_rules_id: Option<String>,
    /// Per-second billing rate override
    pub cost_rate: Option<f64>,
}

/// Lead lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Never called
    Pending,
    /// At least one attempt placed
    Called,
    /// Reached and spoke with the agent
    Contacted,
    /// Goal reached
    Completed,
    /// Do not call
    Dnc,
    /// Soft-deleted
    Deleted,
}

/// One callable contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Lead identifier
    pub id: String,
    /// Campaign the lead belongs to
    pub campaign_id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// E.164 destination number
    pub phone_number: String,
    /// Lifecycle status
    pub status: LeadStatus,
    /// Attempts placed against this lead
    pub call_attempts: u32,
    /// When the lead was last dialed
    pub last_called_at: Option<DateTime<Utc>>,
    /// Outcome of the most recent call
    pub last_call_result: Option<CallOutcome>,
}

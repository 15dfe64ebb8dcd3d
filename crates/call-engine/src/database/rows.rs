//! Row mapping helpers

use chrono::{DateTime, NaiveTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use voxdial_dialer_core::{CallingRules, Campaign, DialerJob, Lead};

use crate::error::{EngineError, EngineResult};

/// Render a serde-renamed enum variant as its database string.
pub(crate) fn enum_str<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => s,
        _ => String::new(),
    }
}

/// Parse a database string back into a serde-renamed enum variant.
pub(crate) fn parse_enum<T: DeserializeOwned>(s: &str) -> Option<T> {
    serde_json::from_value(Value::String(s.to_string())).ok()
}

fn required_enum<T: DeserializeOwned>(column: &str, s: &str) -> EngineResult<T> {
    parse_enum(s).ok_or_else(|| {
        EngineError::Persistence(format!("unrecognised {} value \"{}\"", column, s))
    })
}

/// A call row as stored.
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Call identifier
    pub id: String,
    /// Provider-side call UUID
    pub external_call_uuid: Option<String>,
    /// Owning tenant
    pub tenant_id: String,
    /// Campaign the call belongs to
    pub campaign_id: String,
    /// Lead that was called
    pub lead_id: String,
    /// Destination number
    pub phone_number: String,
    /// active, completed or failed
    pub status: String,
    /// When the call was placed
    pub started_at: DateTime<Utc>,
    /// When the call ended
    pub ended_at: Option<DateTime<Utc>>,
    /// Whole seconds from start to end
    pub duration_seconds: Option<i64>,
    /// Newline-joined transcript rendering
    pub transcript_text: String,
    /// Structured transcript JSON
    pub transcript_json: String,
    /// Billed cost
    pub cost: f64,
    /// Blob-store path of the recording
    pub recording_path: Option<String>,
    /// Failure detail on error paths
    pub last_error: Option<String>,
}

pub(crate) fn call_from_row(row: SqliteRow) -> EngineResult<CallRecord> {
    Ok(CallRecord {
        id: row.try_get("id")?,
        external_call_uuid: row.try_get("external_call_uuid")?,
        tenant_id: row.try_get("tenant_id")?,
        campaign_id: row.try_get("campaign_id")?,
        lead_id: row.try_get("lead_id")?,
        phone_number: row.try_get("phone_number")?,
        status: row.try_get("status")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        duration_seconds: row.try_get("duration_seconds")?,
        transcript_text: row.try_get("transcript_text")?,
        transcript_json: row.try_get("transcript_json")?,
        cost: row.try_get("cost")?,
        recording_path: row.try_get("recording_path")?,
        last_error: row.try_get("last_error")?,
    })
}

pub(crate) fn campaign_from_row(row: SqliteRow) -> EngineResult<Campaign> {
    let status: String = row.try_get("status")?;
    Ok(Campaign {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        status: required_enum("campaign status", &status)?,
        system_prompt_template: row.try_get("system_prompt_template")?,
        voice_id: row.try_get("voice_id")?,
        goal_description: row.try_get("goal_description")?,
        max_concurrent_calls: row.try_get::<i64, _>("max_concurrent_calls")? as u32,
        max_retries: row.try_get::<i64, _>("max_retries")? as u32,
        calling_rules_id: row.try_get("calling_rules_id")?,
        cost_rate: row.try_get("cost_rate")?,
    })
}

pub(crate) fn lead_from_row(row: SqliteRow) -> EngineResult<Lead> {
    let status: String = row.try_get("status")?;
    let last_result: Option<String> = row.try_get("last_call_result")?;
    Ok(Lead {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        campaign_id: row.try_get("campaign_id")?,
        phone_number: row.try_get("phone_number")?,
        status: required_enum("lead status", &status)?,
        call_attempts: row.try_get::<i64, _>("call_attempts")? as u32,
        last_called_at: row.try_get("last_called_at")?,
        last_call_result: last_result.as_deref().and_then(parse_enum),
    })
}

pub(crate) fn job_from_row(row: SqliteRow) -> EngineResult<DialerJob> {
    let status: String = row.try_get("status")?;
    let last_outcome: Option<String> = row.try_get("last_outcome")?;
    Ok(DialerJob {
        job_id: row.try_get("job_id")?,
        tenant_id: row.try_get("tenant_id")?,
        campaign_id: row.try_get("campaign_id")?,
        lead_id: row.try_get("lead_id")?,
        phone_number: row.try_get("phone_number")?,
        priority: row.try_get::<i64, _>("priority")? as u8,
        status: required_enum("job status", &status)?,
        attempt_number: row.try_get::<i64, _>("attempt_number")? as u32,
        scheduled_at: row.try_get("scheduled_at")?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
        completed_at: row.try_get("completed_at")?,
        last_outcome: last_outcome.as_deref().and_then(parse_enum),
        last_error: row.try_get("last_error")?,
        call_id: row.try_get("call_id")?,
    })
}

pub(crate) fn rules_from_row(row: SqliteRow) -> EngineResult<CallingRules> {
    let start: String = row.try_get("time_window_start")?;
    let end: String = row.try_get("time_window_end")?;
    let parse_time = |s: &str, column: &str| -> EngineResult<NaiveTime> {
        s.parse().map_err(|_| {
            EngineError::Persistence(format!("unparsable {} \"{}\"", column, s))
        })
    };
    Ok(CallingRules {
        time_window_start: parse_time(&start, "time_window_start")?,
        time_window_end: parse_time(&end, "time_window_end")?,
        timezone: row.try_get("timezone")?,
        allowed_weekdays: row.try_get::<i64, _>("allowed_weekdays")? as u8,
        max_concurrent_calls: row.try_get::<i64, _>("max_concurrent_calls")? as u32,
        retry_delay_seconds: row.try_get::<i64, _>("retry_delay_seconds")? as u64,
        max_retry_attempts: row.try_get::<i64, _>("max_retry_attempts")? as u32,
        min_hours_between_calls: row.try_get::<i64, _>("min_hours_between_calls")? as u32,
    })
}

//! Async persistence (sqlx + SQLite)
//!
//! One [`DatabaseManager`] owns the connection pool and every query the
//! core issues. All operations are naturally async and Send-safe, the
//! schema is created at startup, and an in-memory constructor backs the
//! tests.
//!
//! Tenancy discipline: every query against a tenant-scoped table carries
//! an explicit `tenant_id = ?` predicate, independent of any row-level
//! security at the store. The single exception is the carrier-webhook
//! identity resolution (`call_by_external_uuid`), which exists to learn
//! the tenant for a provider UUID; everything downstream of it is scoped.

mod rows;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use voxdial_dialer_core::{
    CallOutcome, CallingRules, Campaign, CampaignStatus, DialerError, DialerJob, DialerResult,
    DialerStore, Lead, LeadStatus,
};

use crate::error::{EngineError, EngineResult};
use crate::session::TranscriptTurn;
pub use rows::CallRecord;
use rows::enum_str;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tenants (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS calling_rules (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL REFERENCES tenants(id),
        time_window_start TEXT NOT NULL,
        time_window_end TEXT NOT NULL,
        timezone TEXT NOT NULL,
        allowed_weekdays INTEGER NOT NULL,
        max_concurrent_calls INTEGER NOT NULL,
        retry_delay_seconds INTEGER NOT NULL,
        max_retry_attempts INTEGER NOT NULL,
        min_hours_between_calls INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS campaigns (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL REFERENCES tenants(id),
        status TEXT NOT NULL,
        system_prompt_template TEXT,
        voice_id TEXT NOT NULL,
        goal_description TEXT NOT NULL,
        max_concurrent_calls INTEGER NOT NULL,
        max_retries INTEGER NOT NULL,
        calling_rules_id TEXT,
        cost_rate REAL
    )",
    "CREATE TABLE IF NOT EXISTS leads (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL REFERENCES tenants(id),
        campaign_id TEXT NOT NULL,
        phone_number TEXT NOT NULL,
        status TEXT NOT NULL,
        call_attempts INTEGER NOT NULL DEFAULT 0,
        last_called_at TEXT,
        last_call_result TEXT
    )",
    "CREATE TABLE IF NOT EXISTS calls (
        id TEXT PRIMARY KEY,
        external_call_uuid TEXT,
        tenant_id TEXT NOT NULL REFERENCES tenants(id),
        campaign_id TEXT NOT NULL,
        lead_id TEXT NOT NULL,
        phone_number TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        ended_at TEXT,
        duration_seconds INTEGER,
        transcript_text TEXT NOT NULL DEFAULT '',
        transcript_json TEXT NOT NULL DEFAULT '[]',
        cost REAL NOT NULL DEFAULT 0,
        recording_path TEXT,
        last_error TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_calls_external_uuid ON calls(external_call_uuid)",
    "CREATE TABLE IF NOT EXISTS dialer_jobs (
        job_id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL REFERENCES tenants(id),
        campaign_id TEXT NOT NULL,
        lead_id TEXT NOT NULL,
        phone_number TEXT NOT NULL,
        priority INTEGER NOT NULL,
        status TEXT NOT NULL,
        attempt_number INTEGER NOT NULL,
        scheduled_at TEXT,
        created_at TEXT NOT NULL,
        processed_at TEXT,
        completed_at TEXT,
        last_outcome TEXT,
        last_error TEXT,
        call_id TEXT
    )",
];

/// Main database manager using sqlx for async operations.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Connect and ensure the schema exists.
    pub async fn new(database_url: &str) -> EngineResult<Self> {
        info!(database_url, "initializing database manager");
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        debug!("schema ensured");
        Ok(Self { pool })
    }

    /// In-memory database for tests.
    pub async fn new_in_memory() -> EngineResult<Self> {
        // A single connection keeps the in-memory database alive and shared
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Borrow the pool for ad-hoc queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- tenants / campaigns / leads -------------------------------------

    /// Insert a tenant row.
    pub async fn insert_tenant(&self, id: &str, name: &str) -> EngineResult<()> {
        sqlx::query("INSERT INTO tenants (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert a campaign row.
    pub async fn insert_campaign(&self, campaign: &Campaign) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO campaigns (id, tenant_id, status, system_prompt_template, voice_id,
             goal_description, max_concurrent_calls, max_retries, calling_rules_id, cost_rate)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&campaign.id)
        .bind(&campaign.tenant_id)
        .bind(enum_str(&campaign.status))
        .bind(&campaign.system_prompt_template)
        .bind(&campaign.voice_id)
        .bind(&campaign.goal_description)
        .bind(campaign.max_concurrent_calls as i64)
        .bind(campaign.max_retries as i64)
        .bind(&campaign.calling_rules_id)
        .bind(campaign.cost_rate)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a campaign scoped to its tenant.
    pub async fn campaign(
        &self,
        tenant_id: &str,
        campaign_id: &str,
    ) -> EngineResult<Option<Campaign>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, status, system_prompt_template, voice_id, goal_description,
             max_concurrent_calls, max_retries, calling_rules_id, cost_rate
             FROM campaigns WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(rows::campaign_from_row).transpose()
    }

    /// Update a campaign's lifecycle status.
    pub async fn set_campaign_status(
        &self,
        tenant_id: &str,
        campaign_id: &str,
        status: CampaignStatus,
    ) -> EngineResult<bool> {
        let result = sqlx::query("UPDATE campaigns SET status = ? WHERE tenant_id = ? AND id = ?")
            .bind(enum_str(&status))
            .bind(tenant_id)
            .bind(campaign_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Tenants that currently have a running campaign.
    pub async fn running_campaign_tenants(&self) -> EngineResult<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT tenant_id FROM campaigns WHERE status = ?")
            .bind(enum_str(&CampaignStatus::Running))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get("tenant_id").map_err(EngineError::from))
            .collect()
    }

    /// Insert a lead row.
    pub async fn insert_lead(&self, lead: &Lead) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO leads (id, tenant_id, campaign_id, phone_number, status,
             call_attempts, last_called_at, last_call_result)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lead.id)
        .bind(&lead.tenant_id)
        .bind(&lead.campaign_id)
        .bind(&lead.phone_number)
        .bind(enum_str(&lead.status))
        .bind(lead.call_attempts as i64)
        .bind(lead.last_called_at)
        .bind(lead.last_call_result.as_ref().map(enum_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a lead scoped to its tenant.
    pub async fn lead(&self, tenant_id: &str, lead_id: &str) -> EngineResult<Option<Lead>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, campaign_id, phone_number, status, call_attempts,
             last_called_at, last_call_result
             FROM leads WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(rows::lead_from_row).transpose()
    }

    /// Pending leads of a campaign, for campaign start.
    pub async fn pending_leads(
        &self,
        tenant_id: &str,
        campaign_id: &str,
    ) -> EngineResult<Vec<Lead>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, campaign_id, phone_number, status, call_attempts,
             last_called_at, last_call_result
             FROM leads WHERE tenant_id = ? AND campaign_id = ? AND status = ?",
        )
        .bind(tenant_id)
        .bind(campaign_id)
        .bind(enum_str(&LeadStatus::Pending))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(rows::lead_from_row).collect()
    }

    /// Calling rules by id, falling back to defaults when unset.
    pub async fn calling_rules(
        &self,
        tenant_id: &str,
        rules_id: Option<&str>,
    ) -> EngineResult<CallingRules> {
        let Some(rules_id) = rules_id else {
            return Ok(CallingRules::default());
        };
        let row = sqlx::query(
            "SELECT time_window_start, time_window_end, timezone, allowed_weekdays,
             max_concurrent_calls, retry_delay_seconds, max_retry_attempts,
             min_hours_between_calls
             FROM calling_rules WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(rules_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => rows::rules_from_row(row),
            None => Ok(CallingRules::default()),
        }
    }

    /// Insert a calling-rules row.
    pub async fn insert_calling_rules(
        &self,
        tenant_id: &str,
        rules_id: &str,
        rules: &CallingRules,
    ) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO calling_rules (id, tenant_id, time_window_start, time_window_end,
             timezone, allowed_weekdays, max_concurrent_calls, retry_delay_seconds,
             max_retry_attempts, min_hours_between_calls)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rules_id)
        .bind(tenant_id)
        .bind(rules.time_window_start.to_string())
        .bind(rules.time_window_end.to_string())
        .bind(&rules.timezone)
        .bind(rules.allowed_weekdays as i64)
        .bind(rules.max_concurrent_calls as i64)
        .bind(rules.retry_delay_seconds as i64)
        .bind(rules.max_retry_attempts as i64)
        .bind(rules.min_hours_between_calls as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- calls -----------------------------------------------------------

    /// Insert an active call row; returns the new call id.
    pub async fn create_call(
        &self,
        job: &DialerJob,
        external_call_uuid: &str,
    ) -> EngineResult<String> {
        let call_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO calls (id, external_call_uuid, tenant_id, campaign_id, lead_id,
             phone_number, status, started_at)
             VALUES (?, ?, ?, ?, ?, ?, 'active', ?)",
        )
        .bind(&call_id)
        .bind(external_call_uuid)
        .bind(&job.tenant_id)
        .bind(&job.campaign_id)
        .bind(&job.lead_id)
        .bind(&job.phone_number)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(call_id)
    }

    /// Fetch a call scoped to its tenant.
    pub async fn call(&self, tenant_id: &str, call_id: &str) -> EngineResult<Option<CallRecord>> {
        let row = sqlx::query(
            "SELECT id, external_call_uuid, tenant_id, campaign_id, lead_id, phone_number,
             status, started_at, ended_at, duration_seconds, transcript_text, transcript_json,
             cost, recording_path, last_error
             FROM calls WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(rows::call_from_row).transpose()
    }

    /// Resolve a provider call UUID to its tenant and call id.
    ///
    /// Identity resolution for the webhook path; the only unscoped read.
    pub async fn call_by_external_uuid(
        &self,
        external_call_uuid: &str,
    ) -> EngineResult<Option<(String, String)>> {
        let row = sqlx::query("SELECT tenant_id, id FROM calls WHERE external_call_uuid = ?")
            .bind(external_call_uuid)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok((
                row.try_get::<String, _>("tenant_id")?,
                row.try_get::<String, _>("id")?,
            ))
        })
        .transpose()
    }

    /// Incremental transcript flush after a completed turn.
    ///
    /// Writing the same transcript twice produces byte-identical rows.
    pub async fn update_call_transcript(
        &self,
        tenant_id: &str,
        call_id: &str,
        transcript_text: &str,
        transcript: &[TranscriptTurn],
    ) -> EngineResult<()> {
        let transcript_json = serde_json::to_string(transcript)
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        sqlx::query(
            "UPDATE calls SET transcript_text = ?, transcript_json = ?
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(transcript_text)
        .bind(transcript_json)
        .bind(tenant_id)
        .bind(call_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Finalise a call row on call end.
    pub async fn finalize_call(
        &self,
        tenant_id: &str,
        call_id: &str,
        status: &str,
        ended_at: DateTime<Utc>,
        duration_seconds: i64,
        cost: f64,
        last_error: Option<&str>,
    ) -> EngineResult<()> {
        sqlx::query(
            "UPDATE calls SET status = ?, ended_at = ?, duration_seconds = ?, cost = ?,
             last_error = ?
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(status)
        .bind(ended_at)
        .bind(duration_seconds)
        .bind(cost)
        .bind(last_error)
        .bind(tenant_id)
        .bind(call_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Attach the stored recording path to a call.
    pub async fn set_recording_path(
        &self,
        tenant_id: &str,
        call_id: &str,
        recording_path: &str,
    ) -> EngineResult<()> {
        sqlx::query("UPDATE calls SET recording_path = ? WHERE tenant_id = ? AND id = ?")
            .bind(recording_path)
            .bind(tenant_id)
            .bind(call_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- dialer jobs -----------------------------------------------------

    /// Upsert a job row; used both at enqueue and at terminal transitions.
    pub async fn upsert_job(&self, job: &DialerJob) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO dialer_jobs (job_id, tenant_id, campaign_id, lead_id, phone_number,
             priority, status, attempt_number, scheduled_at, created_at, processed_at,
             completed_at, last_outcome, last_error, call_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(job_id) DO UPDATE SET
                status = excluded.status,
                attempt_number = excluded.attempt_number,
                scheduled_at = excluded.scheduled_at,
                processed_at = excluded.processed_at,
                completed_at = excluded.completed_at,
                last_outcome = excluded.last_outcome,
                last_error = excluded.last_error,
                call_id = excluded.call_id",
        )
        .bind(&job.job_id)
        .bind(&job.tenant_id)
        .bind(&job.campaign_id)
        .bind(&job.lead_id)
        .bind(&job.phone_number)
        .bind(job.priority as i64)
        .bind(enum_str(&job.status))
        .bind(job.attempt_number as i64)
        .bind(job.scheduled_at)
        .bind(job.created_at)
        .bind(job.processed_at)
        .bind(job.completed_at)
        .bind(job.last_outcome.as_ref().map(enum_str))
        .bind(&job.last_error)
        .bind(&job.call_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a job scoped to its tenant.
    pub async fn job(&self, tenant_id: &str, job_id: &str) -> EngineResult<Option<DialerJob>> {
        let row = sqlx::query(
            "SELECT job_id, tenant_id, campaign_id, lead_id, phone_number, priority, status,
             attempt_number, scheduled_at, created_at, processed_at, completed_at,
             last_outcome, last_error, call_id
             FROM dialer_jobs WHERE tenant_id = ? AND job_id = ?",
        )
        .bind(tenant_id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(rows::job_from_row).transpose()
    }
}

#[async_trait]
impl DialerStore for DatabaseManager {
    async fn active_tenants(&self) -> DialerResult<Vec<String>> {
        self.running_campaign_tenants()
            .await
            .map_err(|e| DialerError::Store(e.to_string()))
    }

    async fn campaign(
        &self,
        tenant_id: &str,
        campaign_id: &str,
    ) -> DialerResult<Option<Campaign>> {
        DatabaseManager::campaign(self, tenant_id, campaign_id)
            .await
            .map_err(|e| DialerError::Store(e.to_string()))
    }

    async fn lead(&self, tenant_id: &str, lead_id: &str) -> DialerResult<Option<Lead>> {
        DatabaseManager::lead(self, tenant_id, lead_id)
            .await
            .map_err(|e| DialerError::Store(e.to_string()))
    }

    async fn calling_rules(
        &self,
        tenant_id: &str,
        campaign: &Campaign,
    ) -> DialerResult<CallingRules> {
        DatabaseManager::calling_rules(self, tenant_id, campaign.calling_rules_id.as_deref())
            .await
            .map_err(|e| DialerError::Store(e.to_string()))
    }

    async fn create_call_record(
        &self,
        job: &DialerJob,
        external_call_uuid: &str,
    ) -> DialerResult<String> {
        self.create_call(job, external_call_uuid)
            .await
            .map_err(|e| DialerError::Store(e.to_string()))
    }

    async fn record_job_terminal(&self, job: &DialerJob) -> DialerResult<()> {
        self.upsert_job(job)
            .await
            .map_err(|e| DialerError::Store(e.to_string()))
    }

    async fn update_lead_after_call(
        &self,
        job: &DialerJob,
        outcome: CallOutcome,
        status: LeadStatus,
    ) -> DialerResult<()> {
        sqlx::query(
            "UPDATE leads SET status = ?, call_attempts = call_attempts + 1,
             last_called_at = ?, last_call_result = ?
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(enum_str(&status))
        .bind(Utc::now())
        .bind(enum_str(&outcome))
        .bind(&job.tenant_id)
        .bind(&job.lead_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DialerError::Store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_db() -> DatabaseManager {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        db.insert_tenant("t1", "Tenant One").await.unwrap();
        db.insert_campaign(&Campaign {
            id: "c1".into(),
            tenant_id: "t1".into(),
            status: CampaignStatus::Running,
            system_prompt_template: None,
            voice_id: "aria".into(),
            goal_description: "confirm appointment".into(),
            max_concurrent_calls: 5,
            max_retries: 3,
            calling_rules_id: None,
            cost_rate: None,
        })
        .await
        .unwrap();
        db.insert_lead(&Lead {
            id: "l1".into(),
            campaign_id: "c1".into(),
            tenant_id: "t1".into(),
            phone_number: "+15551234567".into(),
            status: LeadStatus::Pending,
            call_attempts: 0,
            last_called_at: None,
            last_call_result: None,
        })
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn campaign_round_trip() {
        let db = seeded_db().await;
        let campaign = DatabaseManager::campaign(&db, "t1", "c1").await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Running);
        assert_eq!(campaign.voice_id, "aria");

        // Wrong tenant sees nothing
        assert!(DatabaseManager::campaign(&db, "t2", "c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn active_tenants_follow_campaign_status() {
        let db = seeded_db().await;
        assert_eq!(db.running_campaign_tenants().await.unwrap(), vec!["t1"]);

        db.set_campaign_status("t1", "c1", CampaignStatus::Paused)
            .await
            .unwrap();
        assert!(db.running_campaign_tenants().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn call_lifecycle_and_transcript_idempotence() {
        let db = seeded_db().await;
        let job = DialerJob::new("t1", "c1", "l1", "+15551234567", 5);
        let call_id = db.create_call(&job, "ext-uuid-1").await.unwrap();

        let turns = vec![
            TranscriptTurn {
                speaker: "user".into(),
                text: "hello".into(),
                ts: Utc::now(),
                duration_ms: None,
            },
            TranscriptTurn {
                speaker: "agent".into(),
                text: "hi there".into(),
                ts: Utc::now(),
                duration_ms: Some(900),
            },
        ];
        let text = "user: hello\nagent: hi there";

        db.update_call_transcript("t1", &call_id, text, &turns)
            .await
            .unwrap();
        let first = db.call("t1", &call_id).await.unwrap().unwrap();

        // Flushing the same transcript again changes nothing
        db.update_call_transcript("t1", &call_id, text, &turns)
            .await
            .unwrap();
        let second = db.call("t1", &call_id).await.unwrap().unwrap();
        assert_eq!(first.transcript_text, second.transcript_text);
        assert_eq!(first.transcript_json, second.transcript_json);

        let ended = Utc::now();
        db.finalize_call("t1", &call_id, "completed", ended, 42, 0.042, None)
            .await
            .unwrap();
        let done = db.call("t1", &call_id).await.unwrap().unwrap();
        assert_eq!(done.status, "completed");
        assert_eq!(done.duration_seconds, Some(42));
        assert!(done.ended_at.is_some());
        assert!(done.ended_at.unwrap() >= done.started_at);
    }

    #[tokio::test]
    async fn external_uuid_resolution() {
        let db = seeded_db().await;
        let job = DialerJob::new("t1", "c1", "l1", "+15551234567", 5);
        let call_id = db.create_call(&job, "ext-uuid-9").await.unwrap();

        let (tenant, resolved) = db
            .call_by_external_uuid("ext-uuid-9")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tenant, "t1");
        assert_eq!(resolved, call_id);
        assert!(db.call_by_external_uuid("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn job_upsert_round_trip() {
        let db = seeded_db().await;
        let mut job = DialerJob::new("t1", "c1", "l1", "+15551234567", 9);
        db.upsert_job(&job).await.unwrap();

        job.status = voxdial_dialer_core::JobStatus::GoalAchieved;
        job.attempt_number = 1;
        job.last_outcome = Some(CallOutcome::Success);
        job.completed_at = Some(Utc::now());
        db.upsert_job(&job).await.unwrap();

        let stored = db.job("t1", &job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, voxdial_dialer_core::JobStatus::GoalAchieved);
        assert_eq!(stored.last_outcome, Some(CallOutcome::Success));
        assert_eq!(stored.priority, 9);
    }

    #[tokio::test]
    async fn lead_update_after_call() {
        let db = seeded_db().await;
        let job = DialerJob::new("t1", "c1", "l1", "+15551234567", 5);
        db.update_lead_after_call(&job, CallOutcome::Success, LeadStatus::Completed)
            .await
            .unwrap();

        let lead = DatabaseManager::lead(&db, "t1", "l1").await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Completed);
        assert_eq!(lead.call_attempts, 1);
        assert_eq!(lead.last_call_result, Some(CallOutcome::Success));
        assert!(lead.last_called_at.is_some());
    }

    #[tokio::test]
    async fn default_rules_when_unset() {
        let db = seeded_db().await;
        let rules = DatabaseManager::calling_rules(&db, "t1", None).await.unwrap();
        assert_eq!(rules.max_retry_attempts, 3);

        let custom = CallingRules {
            timezone: "Europe/Berlin".into(),
            max_retry_attempts: 5,
            ..Default::default()
        };
        db.insert_calling_rules("t1", "r1", &custom).await.unwrap();
        let loaded = DatabaseManager::calling_rules(&db, "t1", Some("r1"))
            .await
            .unwrap();
        assert_eq!(loaded.timezone, "Europe/Berlin");
        assert_eq!(loaded.max_retry_attempts, 5);
    }
}

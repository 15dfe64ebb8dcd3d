//! The dialer worker loop
//!
//! One worker drains the queue: promote due retries, dequeue, enforce
//! calling rules, place the call, record it, and move on without waiting
//! for the call to finish. Outcomes arrive later through the carrier event
//! path and land in [`DialerWorker::handle_call_completion`].
//!
//! Persistence and telephony are injected as traits; the loop itself owns
//! no I/O beyond them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{DialerError, DialerResult};
use crate::job::{DialerJob, JobStatus};
use crate::model::{Campaign, CampaignStatus, Lead, LeadStatus};
use crate::outcome::{should_retry, CallOutcome};
use crate::queue::DialerQueue;
use crate::rules::{can_make_call, ActiveCallTracker, CallingRules, SkipReason};

/// Persistence operations the worker needs.
#[async_trait]
pub trait DialerStore: Send + Sync {
    /// Tenants with at least one running campaign
    async fn active_tenants(&self) -> DialerResult<Vec<String>>;
    /// Fetch a campaign scoped to its tenant
    async fn campaign(&self, tenant_id: &str, campaign_id: &str) -> DialerResult<Option<Campaign>>;
    /// Fetch a lead scoped to its tenant
    async fn lead(&self, tenant_id: &str, lead_id: &str) -> DialerResult<Option<Lead>>;
    /// Calling rules for a campaign (campaign-specific or tenant default)
    async fn calling_rules(&self, tenant_id: &str, campaign: &Campaign) -> DialerResult<CallingRules>;
    /// Insert an active call record; returns the new call id
    async fn create_call_record(&self, job: &DialerJob, external_call_uuid: &str) -> DialerResult<String>;
    /// Persist a job that has gone terminal
    async fn record_job_terminal(&self, job: &DialerJob) -> DialerResult<()>;
    /// Update the lead after an attempt concludes
    async fn update_lead_after_call(
        &self,
        job: &DialerJob,
        outcome: CallOutcome,
        status: LeadStatus,
    ) -> DialerResult<()>;
}

/// Telephony operation the worker needs.
#[async_trait]
pub trait OutboundDialer: Send + Sync {
    /// Place a call; returns the provider's call UUID.
    async fn place_call(&self, job: &DialerJob) -> DialerResult<String>;
}

/// Worker pacing and resilience knobs
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep when the queue is empty
    pub poll_interval: Duration,
    /// How often due retries are promoted
    pub sweep_interval: Duration,
    /// Deferral for concurrency and cooldown skips
    pub rule_skip_delay: Duration,
    /// Consecutive loop errors before the worker halts
    pub max_consecutive_errors: u32,
    /// Ceiling for the error backoff; the delay doubles from
    /// `poll_interval` on each consecutive failure up to this cap
    pub max_backoff: Duration,
    /// Halt once the store/queue has been unreachable this long,
    /// regardless of how many attempts that took
    pub max_unreachable: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(60),
            rule_skip_delay: Duration::from_secs(300),
            max_consecutive_errors: 10,
            max_backoff: Duration::from_secs(30),
            max_unreachable: Duration::from_secs(120),
        }
    }
}

/// The outbound dial worker.
pub struct DialerWorker {
    queue: Arc<DialerQueue>,
    tracker: Arc<ActiveCallTracker>,
    store: Arc<dyn DialerStore>,
    dialer: Arc<dyn OutboundDialer>,
    config: WorkerConfig,
}

impl DialerWorker {
    /// Assemble a worker over its collaborators.
    pub fn new(
        queue: Arc<DialerQueue>,
        tracker: Arc<ActiveCallTracker>,
        store: Arc<dyn DialerStore>,
        dialer: Arc<dyn OutboundDialer>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            tracker,
            store,
            dialer,
            config,
        }
    }

    /// Run until shutdown flips or the error budget is spent.
    ///
    /// Loop errors back off exponentially from `poll_interval` up to
    /// `max_backoff`. The worker halts either after
    /// `max_consecutive_errors` failures or once the store has been
    /// unreachable for longer than `max_unreachable`, whichever comes
    /// first; the supervisor restarts the process (exit code 2).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> DialerResult<()> {
        info!("dialer worker started");
        let mut consecutive_errors: u32 = 0;
        let mut backoff = self.config.poll_interval;
        let mut unreachable_since: Option<tokio::time::Instant> = None;
        let mut last_sweep = tokio::time::Instant::now();
        self.queue.process_scheduled_jobs(Utc::now());

        loop {
            if *shutdown.borrow() {
                info!("dialer worker stopping");
                return Ok(());
            }

            if last_sweep.elapsed() >= self.config.sweep_interval {
                let promoted = self.queue.process_scheduled_jobs(Utc::now());
                if promoted > 0 {
                    debug!(promoted, "promoted due scheduled jobs");
                }
                last_sweep = tokio::time::Instant::now();
            }

            match self.tick().await {
                Ok(worked) => {
                    consecutive_errors = 0;
                    backoff = self.config.poll_interval;
                    unreachable_since = None;
                    if !worked {
                        tokio::select! {
                            _ = tokio::time::sleep(self.config.poll_interval) => {}
                            _ = shutdown.changed() => {}
                        }
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    let since = *unreachable_since.get_or_insert_with(tokio::time::Instant::now);
                    error!(
                        error = %e,
                        consecutive_errors,
                        unreachable_secs = since.elapsed().as_secs(),
                        backoff_ms = backoff.as_millis() as u64,
                        "worker loop error"
                    );
                    if since.elapsed() > self.config.max_unreachable {
                        return Err(DialerError::StoreUnreachable {
                            seconds: since.elapsed().as_secs(),
                        });
                    }
                    if consecutive_errors >= self.config.max_consecutive_errors {
                        return Err(DialerError::TooManyErrors {
                            count: consecutive_errors,
                        });
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.changed() => {}
                    }
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
            }
        }
    }

    /// One dequeue-and-dial pass. Returns whether a job was handled.
    pub async fn tick(&self) -> DialerResult<bool> {
        let tenants = self.store.active_tenants().await?;
        let Some(job) = self.queue.dequeue(&tenants) else {
            return Ok(false);
        };
        self.process_job(job).await?;
        Ok(true)
    }

    async fn process_job(&self, mut job: DialerJob) -> DialerResult<()> {
        let campaign = match self
            .store
            .campaign(&job.tenant_id, &job.campaign_id)
            .await?
        {
            Some(campaign) => campaign,
            None => {
                warn!(job_id = %job.job_id, "campaign vanished; failing job");
                let done = self.queue.complete(
                    &job.job_id,
                    JobStatus::Failed,
                    None,
                    Some("campaign not found".to_string()),
                )?;
                return self.store.record_job_terminal(&done).await;
            }
        };

        match campaign.status {
            CampaignStatus::Running => {}
            CampaignStatus::Paused | CampaignStatus::Draft => {
                debug!(job_id = %job.job_id, "campaign not running; deferring");
                self.queue.defer(job, self.config.rule_skip_delay);
                return Ok(());
            }
            CampaignStatus::Completed => {
                let done =
                    self.queue
                        .complete(&job.job_id, JobStatus::Completed, None, None)?;
                return self.store.record_job_terminal(&done).await;
            }
        }

        let lead = match self.store.lead(&job.tenant_id, &job.lead_id).await? {
            Some(lead) if !matches!(lead.status, LeadStatus::Dnc | LeadStatus::Deleted) => lead,
            Some(_) => {
                let done = self.queue.complete(
                    &job.job_id,
                    JobStatus::NonRetryable,
                    None,
                    Some("lead is do-not-call".to_string()),
                )?;
                return self.store.record_job_terminal(&done).await;
            }
            None => {
                let done = self.queue.complete(
                    &job.job_id,
                    JobStatus::Failed,
                    None,
                    Some("lead not found".to_string()),
                )?;
                return self.store.record_job_terminal(&done).await;
            }
        };

        let rules = self.store.calling_rules(&job.tenant_id, &campaign).await?;
        let now = Utc::now();
        if let Err(reason) =
            can_make_call(&self.tracker, &job.tenant_id, &job.campaign_id, &rules, lead.last_called_at, now)?
        {
            let delay = match reason {
                SkipReason::WeekdayNotAllowed | SkipReason::OutsideTimeWindow => {
                    Duration::from_secs(rules.delay_until_next_window(now)?.max(1))
                }
                SkipReason::ConcurrentLimitReached | SkipReason::CooldownNotElapsed => {
                    self.config.rule_skip_delay
                }
            };
            debug!(job_id = %job.job_id, ?reason, ?delay, "rules deferred job");
            self.queue.defer(job, delay);
            return Ok(());
        }

        self.tracker
            .register_call_start(&job.tenant_id, &job.campaign_id);

        match self.dialer.place_call(&job).await {
            Ok(external_uuid) => {
                let call_id = self.store.create_call_record(&job, &external_uuid).await?;
                job.processed_at = Some(Utc::now());
                job.call_id = Some(call_id);
                self.queue.update_processing(&job)?;
                info!(job_id = %job.job_id, %external_uuid, "call placed");
                Ok(())
            }
            Err(e) => {
                // Every termination path releases the concurrency slot
                self.tracker
                    .register_call_end(&job.tenant_id, &job.campaign_id);
                warn!(job_id = %job.job_id, error = %e, "call placement failed");
                job.last_error = Some(e.to_string());
                self.queue.update_processing(&job)?;
                self.finish_attempt(&job.job_id, CallOutcome::Failed, &rules)
                    .await
            }
        }
    }

    /// Consume a call outcome delivered by the carrier event path.
    pub async fn handle_call_completion(
        &self,
        job_id: &str,
        outcome: CallOutcome,
        _duration_seconds: Option<u32>,
    ) -> DialerResult<()> {
        let job = self
            .queue
            .processing_job(job_id)
            .ok_or_else(|| DialerError::JobNotFound {
                job_id: job_id.to_string(),
                place: "processing set",
            })?;

        self.tracker
            .register_call_end(&job.tenant_id, &job.campaign_id);

        let campaign = self
            .store
            .campaign(&job.tenant_id, &job.campaign_id)
            .await?
            .ok_or_else(|| DialerError::Store("campaign vanished mid-call".to_string()))?;
        let rules = self.store.calling_rules(&job.tenant_id, &campaign).await?;

        self.finish_attempt(job_id, outcome, &rules).await
    }

    async fn finish_attempt(
        &self,
        job_id: &str,
        outcome: CallOutcome,
        rules: &CallingRules,
    ) -> DialerResult<()> {
        let job = self
            .queue
            .processing_job(job_id)
            .ok_or_else(|| DialerError::JobNotFound {
                job_id: job_id.to_string(),
                place: "processing set",
            })?;

        if should_retry(&job, outcome, rules.max_retry_attempts) {
            let delay = Duration::from_secs(rules.retry_delay_seconds);
            info!(job_id = %job.job_id, ?outcome, ?delay, "scheduling retry");
            self.store
                .update_lead_after_call(&job, outcome, LeadStatus::Called)
                .await?;
            self.queue.schedule_retry(job, delay);
            return Ok(());
        }

        let status = terminal_status_for(outcome);
        let done = self
            .queue
            .complete(&job.job_id, status, Some(outcome), None)?;
        info!(job_id = %done.job_id, ?outcome, ?status, "job terminal");

        self.store
            .update_lead_after_call(&done, outcome, lead_status_for(outcome))
            .await?;
        self.store.record_job_terminal(&done).await
    }

    /// Shared queue handle
    pub fn queue(&self) -> &Arc<DialerQueue> {
        &self.queue
    }

    /// Shared concurrency tracker
    pub fn tracker(&self) -> &Arc<ActiveCallTracker> {
        &self.tracker
    }
}

/// Terminal job status for an outcome that will not be retried.
fn terminal_status_for(outcome: CallOutcome) -> JobStatus {
    if outcome.is_goal() {
        JobStatus::GoalAchieved
    } else if outcome.is_non_retryable() {
        JobStatus::NonRetryable
    } else if outcome.is_retryable() {
        // Retryable outcome with no budget left
        JobStatus::Failed
    } else {
        JobStatus::Completed
    }
}

/// Lead status after a terminal attempt.
fn lead_status_for(outcome: CallOutcome) -> LeadStatus {
    match outcome {
        CallOutcome::Success => LeadStatus::Completed,
        CallOutcome::Answered
        | CallOutcome::Declined
        | CallOutcome::NotInterested
        | CallOutcome::CallbackRequested
        | CallOutcome::TransferToHuman
        | CallOutcome::MaxTurnsReached
        | CallOutcome::Error
        | CallOutcome::Unknown => LeadStatus::Contacted,
        CallOutcome::Spam
        | CallOutcome::Invalid
        | CallOutcome::Unavailable
        | CallOutcome::Disconnected
        | CallOutcome::Rejected => LeadStatus::Dnc,
        CallOutcome::Busy | CallOutcome::NoAnswer | CallOutcome::Failed | CallOutcome::Voicemail => {
            LeadStatus::Called
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct FakeStore {
        campaigns: HashMap<String, Campaign>,
        leads: HashMap<String, Lead>,
        rules: CallingRules,
        terminal_jobs: Mutex<Vec<DialerJob>>,
        lead_updates: Mutex<Vec<(String, CallOutcome, LeadStatus)>>,
        created_calls: Mutex<Vec<String>>,
    }

    impl FakeStore {
        fn new(rules: CallingRules) -> Self {
            let campaign = Campaign {
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
            };
            let lead = Lead {
                id: "l1".into(),
                campaign_id: "c1".into(),
                tenant_id: "t1".into(),
                phone_number: "+15551234567".into(),
                status: LeadStatus::Pending,
                call_attempts: 0,
                last_called_at: None,
                last_call_result: None,
            };
            Self {
                campaigns: HashMap::from([("c1".to_string(), campaign)]),
                leads: HashMap::from([("l1".to_string(), lead)]),
                rules,
                terminal_jobs: Mutex::new(Vec::new()),
                lead_updates: Mutex::new(Vec::new()),
                created_calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DialerStore for FakeStore {
        async fn active_tenants(&self) -> DialerResult<Vec<String>> {
            Ok(vec!["t1".to_string()])
        }
        async fn campaign(&self, _tenant_id: &str, campaign_id: &str) -> DialerResult<Option<Campaign>> {
            Ok(self.campaigns.get(campaign_id).cloned())
        }
        async fn lead(&self, _tenant_id: &str, lead_id: &str) -> DialerResult<Option<Lead>> {
            Ok(self.leads.get(lead_id).cloned())
        }
        async fn calling_rules(&self, _tenant_id: &str, _campaign: &Campaign) -> DialerResult<CallingRules> {
            Ok(self.rules.clone())
        }
        async fn create_call_record(&self, job: &DialerJob, _uuid: &str) -> DialerResult<String> {
            let call_id = format!("call-{}", job.job_id);
            self.created_calls.lock().push(call_id.clone());
            Ok(call_id)
        }
        async fn record_job_terminal(&self, job: &DialerJob) -> DialerResult<()> {
            self.terminal_jobs.lock().push(job.clone());
            Ok(())
        }
        async fn update_lead_after_call(
            &self,
            job: &DialerJob,
            outcome: CallOutcome,
            status: LeadStatus,
        ) -> DialerResult<()> {
            self.lead_updates
                .lock()
                .push((job.lead_id.clone(), outcome, status));
            Ok(())
        }
    }

    struct FakeDialer {
        fail: bool,
    }

    #[async_trait]
    impl OutboundDialer for FakeDialer {
        async fn place_call(&self, job: &DialerJob) -> DialerResult<String> {
            if self.fail {
                Err(DialerError::Telephony("carrier refused".to_string()))
            } else {
                Ok(format!("ext-{}", job.job_id))
            }
        }
    }

    fn always_open_rules() -> CallingRules {
        CallingRules {
            timezone: "UTC".to_string(),
            time_window_start: chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            time_window_end: chrono::NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
            allowed_weekdays: 0b0111_1111,
            retry_delay_seconds: 60,
            max_retry_attempts: 3,
            ..Default::default()
        }
    }

    fn worker_with(store: Arc<FakeStore>, dialer: FakeDialer) -> DialerWorker {
        DialerWorker::new(
            Arc::new(DialerQueue::new()),
            Arc::new(ActiveCallTracker::new()),
            store,
            Arc::new(dialer),
            WorkerConfig::default(),
        )
    }

    fn enqueue_job(worker: &DialerWorker) -> String {
        let job = DialerJob::new("t1", "c1", "l1", "+15551234567", 5);
        let id = job.job_id.clone();
        worker.queue().enqueue(job);
        id
    }

    #[tokio::test]
    async fn tick_places_call_and_tracks_concurrency() {
        let store = Arc::new(FakeStore::new(always_open_rules()));
        let worker = worker_with(store.clone(), FakeDialer { fail: false });
        let job_id = enqueue_job(&worker);

        assert!(worker.tick().await.unwrap());

        let processing = worker.queue().processing_job(&job_id).unwrap();
        assert_eq!(processing.status, JobStatus::Processing);
        assert!(processing.call_id.is_some());
        assert!(processing.processed_at.is_some());
        assert_eq!(worker.tracker().active_count("t1", "c1"), 1);
        assert_eq!(store.created_calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn empty_queue_tick_does_nothing() {
        let store = Arc::new(FakeStore::new(always_open_rules()));
        let worker = worker_with(store, FakeDialer { fail: false });
        assert!(!worker.tick().await.unwrap());
    }

    #[tokio::test]
    async fn success_outcome_goes_goal_achieved() {
        let store = Arc::new(FakeStore::new(always_open_rules()));
        let worker = worker_with(store.clone(), FakeDialer { fail: false });
        let job_id = enqueue_job(&worker);
        worker.tick().await.unwrap();

        worker
            .handle_call_completion(&job_id, CallOutcome::Success, Some(42))
            .await
            .unwrap();

        assert_eq!(worker.tracker().active_count("t1", "c1"), 0);
        let terminal = store.terminal_jobs.lock();
        assert_eq!(terminal.len(), 1);
        assert_eq!(terminal[0].status, JobStatus::GoalAchieved);
        assert_eq!(terminal[0].last_outcome, Some(CallOutcome::Success));

        let updates = store.lead_updates.lock();
        assert_eq!(updates[0].2, LeadStatus::Completed);
    }

    #[tokio::test]
    async fn busy_outcome_schedules_retry() {
        let store = Arc::new(FakeStore::new(always_open_rules()));
        let worker = worker_with(store.clone(), FakeDialer { fail: false });
        let job_id = enqueue_job(&worker);
        worker.tick().await.unwrap();

        worker
            .handle_call_completion(&job_id, CallOutcome::Busy, None)
            .await
            .unwrap();

        assert_eq!(worker.queue().locate(&job_id), Some("scheduled"));
        assert_eq!(worker.tracker().active_count("t1", "c1"), 0);
        assert!(store.terminal_jobs.lock().is_empty());
    }

    #[tokio::test]
    async fn rejected_outcome_is_non_retryable_and_marks_dnc() {
        let store = Arc::new(FakeStore::new(always_open_rules()));
        let worker = worker_with(store.clone(), FakeDialer { fail: false });
        let job_id = enqueue_job(&worker);
        worker.tick().await.unwrap();

        worker
            .handle_call_completion(&job_id, CallOutcome::Rejected, None)
            .await
            .unwrap();

        let terminal = store.terminal_jobs.lock();
        assert_eq!(terminal[0].status, JobStatus::NonRetryable);
        let updates = store.lead_updates.lock();
        assert_eq!(updates[0].2, LeadStatus::Dnc);
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_fails_job() {
        let store = Arc::new(FakeStore::new(always_open_rules()));
        let worker = worker_with(store.clone(), FakeDialer { fail: false });

        let mut job = DialerJob::new("t1", "c1", "l1", "+15551234567", 5);
        job.attempt_number = 3;
        let job_id = job.job_id.clone();
        worker.queue().enqueue(job);
        worker.tick().await.unwrap();

        worker
            .handle_call_completion(&job_id, CallOutcome::Busy, None)
            .await
            .unwrap();

        let terminal = store.terminal_jobs.lock();
        assert_eq!(terminal[0].status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn outside_window_defers_without_attempt_cost() {
        let rules = CallingRules {
            timezone: "UTC".to_string(),
            // A window that is never open right now: 1 minute on Mondays
            allowed_weekdays: 0b000_0001,
            time_window_start: chrono::NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
            time_window_end: chrono::NaiveTime::from_hms_opt(3, 1, 0).unwrap(),
            ..Default::default()
        };
        // The test may actually run inside that window; accept either a
        // placed call or a deferral, but never a terminal job.
        let store = Arc::new(FakeStore::new(rules));
        let worker = worker_with(store.clone(), FakeDialer { fail: false });
        let job_id = enqueue_job(&worker);
        worker.tick().await.unwrap();

        let location = worker.queue().locate(&job_id);
        assert!(matches!(location, Some("scheduled") | Some("processing")));
        if location == Some("scheduled") {
            let depths = worker.queue().depths();
            assert_eq!(depths.scheduled, 1);
            assert!(store.terminal_jobs.lock().is_empty());
        }
    }

    #[tokio::test]
    async fn placement_failure_releases_slot_and_retries() {
        let store = Arc::new(FakeStore::new(always_open_rules()));
        let worker = worker_with(store.clone(), FakeDialer { fail: true });
        let job_id = enqueue_job(&worker);
        worker.tick().await.unwrap();

        assert_eq!(worker.tracker().active_count("t1", "c1"), 0);
        // Failed placement is a retryable outcome with budget remaining
        assert_eq!(worker.queue().locate(&job_id), Some("scheduled"));
    }

    #[tokio::test]
    async fn paused_campaign_defers_job() {
        let mut store = FakeStore::new(always_open_rules());
        store
            .campaigns
            .get_mut("c1")
            .unwrap()
            .status = CampaignStatus::Paused;
        let store = Arc::new(store);
        let worker = worker_with(store, FakeDialer { fail: false });
        let job_id = enqueue_job(&worker);
        worker.tick().await.unwrap();

        assert_eq!(worker.queue().locate(&job_id), Some("scheduled"));
    }

    #[tokio::test]
    async fn dnc_lead_goes_non_retryable() {
        let mut store = FakeStore::new(always_open_rules());
        store.leads.get_mut("l1").unwrap().status = LeadStatus::Dnc;
        let store = Arc::new(store);
        let worker = worker_with(store.clone(), FakeDialer { fail: false });
        enqueue_job(&worker);
        worker.tick().await.unwrap();

        let terminal = store.terminal_jobs.lock();
        assert_eq!(terminal[0].status, JobStatus::NonRetryable);
    }

    #[tokio::test]
    async fn completion_for_unknown_job_is_error() {
        let store = Arc::new(FakeStore::new(always_open_rules()));
        let worker = worker_with(store, FakeDialer { fail: false });
        let result = worker
            .handle_call_completion("ghost", CallOutcome::Busy, None)
            .await;
        assert!(matches!(result, Err(DialerError::JobNotFound { .. })));
    }

    /// Store whose every operation fails, simulating an outage.
    struct FailingStore;

    #[async_trait]
    impl DialerStore for FailingStore {
        async fn active_tenants(&self) -> DialerResult<Vec<String>> {
            Err(DialerError::Store("store offline".to_string()))
        }
        async fn campaign(&self, _tenant_id: &str, _campaign_id: &str) -> DialerResult<Option<Campaign>> {
            Err(DialerError::Store("store offline".to_string()))
        }
        async fn lead(&self, _tenant_id: &str, _lead_id: &str) -> DialerResult<Option<Lead>> {
            Err(DialerError::Store("store offline".to_string()))
        }
        async fn calling_rules(&self, _tenant_id: &str, _campaign: &Campaign) -> DialerResult<CallingRules> {
            Err(DialerError::Store("store offline".to_string()))
        }
        async fn create_call_record(&self, _job: &DialerJob, _uuid: &str) -> DialerResult<String> {
            Err(DialerError::Store("store offline".to_string()))
        }
        async fn record_job_terminal(&self, _job: &DialerJob) -> DialerResult<()> {
            Err(DialerError::Store("store offline".to_string()))
        }
        async fn update_lead_after_call(
            &self,
            _job: &DialerJob,
            _outcome: CallOutcome,
            _status: LeadStatus,
        ) -> DialerResult<()> {
            Err(DialerError::Store("store offline".to_string()))
        }
    }

    fn failing_worker(config: WorkerConfig) -> DialerWorker {
        DialerWorker::new(
            Arc::new(DialerQueue::new()),
            Arc::new(ActiveCallTracker::new()),
            Arc::new(FailingStore),
            Arc::new(FakeDialer { fail: false }),
            config,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_store_halts_on_elapsed_time() {
        // Backoff doubles 1s, 2s, 4s, 8s then caps at 8s; the 30s
        // unreachable window trips long before the error budget does
        let worker = failing_worker(WorkerConfig {
            poll_interval: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
            max_unreachable: Duration::from_secs(30),
            max_consecutive_errors: 1_000,
            ..Default::default()
        });
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let result = worker.run(shutdown_rx).await;
        match result {
            Err(DialerError::StoreUnreachable { seconds }) => {
                assert!(seconds > 30, "halted after only {} s", seconds);
            }
            other => panic!("expected StoreUnreachable, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_errors_halt_on_error_budget() {
        let worker = failing_worker(WorkerConfig {
            poll_interval: Duration::from_millis(10),
            max_backoff: Duration::from_millis(80),
            max_unreachable: Duration::from_secs(3_600),
            max_consecutive_errors: 3,
            ..Default::default()
        });
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let result = worker.run(shutdown_rx).await;
        assert!(matches!(
            result,
            Err(DialerError::TooManyErrors { count: 3 })
        ));
    }
}

//! Central call engine
//!
//! One [`CallEngine`] per process wires everything together: database,
//! session store, both media gateways, provider adapters, the dialer
//! queue and worker, and per-call pipeline runs. The HTTP layer and the
//! SIP endpoint both drive calls through it.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use voxdial_agent_core::{
    CampaignOverrides, ConversationEngine, EngineLimits, Guardrails, GuardrailsConfig,
    HttpStreamingTts, OpenAiChatModel, PromptManager, PromptVars, WsStreamingStt,
};
use voxdial_dialer_core::{
    ActiveCallTracker, CallOutcome, Campaign, CampaignStatus, DialerError, DialerJob, DialerQueue,
    DialerResult, DialerWorker, OutboundDialer, WorkerConfig,
};
use voxdial_media_gateway::{
    CallMetadata, MediaGateway, RtpMediaGateway, SipEndpoint, SipEndpointConfig, SipEvent,
    WsMediaGateway,
};
use voxdial_rtp_core::PortAllocator;

use crate::config::EngineConfig;
use crate::database::DatabaseManager;
use crate::error::{EngineError, EngineResult};
use crate::pipeline::{PipelineConfig, PipelineProviders, VoicePipeline};
use crate::recordings::RecordingStore;
use crate::session::{CallSession, SessionStore};

/// The process-wide orchestrator.
pub struct CallEngine {
    config: EngineConfig,
    db: DatabaseManager,
    sessions: Arc<SessionStore>,
    pipeline: Arc<VoicePipeline>,
    ws_gateway: Arc<WsMediaGateway>,
    rtp_gateway: Arc<RtpMediaGateway>,
    queue: Arc<DialerQueue>,
    tracker: Arc<ActiveCallTracker>,
    worker: Arc<DialerWorker>,
    /// Cancellation signal per live call
    call_cancels: DashMap<String, CancellationToken>,
}

impl CallEngine {
    /// Build the engine with live provider adapters.
    pub async fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let db = DatabaseManager::new(&config.database_url).await?;

        let providers = PipelineProviders {
            stt: Arc::new(WsStreamingStt::new(config.stt.clone())),
            llm: Arc::new(OpenAiChatModel::new(config.llm.clone())),
            tts: Arc::new(HttpStreamingTts::new(config.tts.clone())),
        };
        Self::with_providers(config, db, providers).await
    }

    /// Build the engine with injected providers (tests, QA rigs).
    pub async fn with_providers(
        config: EngineConfig,
        db: DatabaseManager,
        providers: PipelineProviders,
    ) -> EngineResult<Self> {
        let sessions = Arc::new(SessionStore::new());
        let tracker = Arc::new(ActiveCallTracker::new());
        let queue = Arc::new(DialerQueue::new());
        let recordings = Arc::new(RecordingStore::new(config.recordings_dir.clone()));

        let pipeline = Arc::new(VoicePipeline::new(
            providers,
            sessions.clone(),
            db.clone(),
            recordings,
            ConversationEngine::new(EngineLimits::default()),
            PipelineConfig {
                latency_budget: config.latency_budget,
                idle_timeout: config.idle_timeout,
                cost_rate_per_second: config.cost_rate_per_second,
            },
        ));

        let dialer = Arc::new(HttpTelephonyDialer {
            client: reqwest::Client::new(),
            api_url: config.telephony_api_url.clone(),
            api_key: config.telephony_api_key.clone(),
            from_number: config.outbound_number.clone(),
            answer_url: format!("{}/webhooks/answer", config.public_base_url),
            event_url: format!("{}/webhooks/event", config.public_base_url),
        });
        let worker = Arc::new(DialerWorker::new(
            queue.clone(),
            tracker.clone(),
            Arc::new(db.clone()),
            dialer,
            WorkerConfig::default(),
        ));

        let ports = Arc::new(PortAllocator::new(
            config.rtp_port_base,
            config.rtp_port_capacity,
        ));

        Ok(Self {
            config,
            db,
            sessions,
            pipeline,
            ws_gateway: Arc::new(WsMediaGateway::new()),
            rtp_gateway: Arc::new(RtpMediaGateway::new(ports)),
            queue,
            tracker,
            worker,
            call_cancels: DashMap::new(),
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Database handle
    pub fn db(&self) -> &DatabaseManager {
        &self.db
    }

    /// Session store
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// WebSocket media gateway
    pub fn ws_gateway(&self) -> &Arc<WsMediaGateway> {
        &self.ws_gateway
    }

    /// Dialer queue
    pub fn queue(&self) -> &Arc<DialerQueue> {
        &self.queue
    }

    /// Spawn the dialer worker; returns its shutdown sender and handle.
    pub fn spawn_worker(
        self: &Arc<Self>,
    ) -> (watch::Sender<bool>, tokio::task::JoinHandle<DialerResult<()>>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = self.worker.clone();
        let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });
        (shutdown_tx, handle)
    }

    /// Spawn the SIP endpoint and the task that runs pipelines for
    /// inbound softphone calls.
    pub fn spawn_sip(self: &Arc<Self>, shutdown: CancellationToken) {
        let (events_tx, mut events_rx) = mpsc::channel::<SipEvent>(32);
        let endpoint = SipEndpoint::new(
            SipEndpointConfig {
                bind_addr: self.config.sip_bind,
                ..Default::default()
            },
            self.rtp_gateway.clone(),
            events_tx,
        );
        let sip_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = endpoint.run(sip_shutdown).await {
                error!(error = %e, "sip endpoint failed");
            }
        });

        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events_rx.recv() => event,
                };
                match event {
                    Some(SipEvent::CallStarted { call_id, from, .. }) => {
                        engine.clone().start_inbound_call(call_id, from);
                    }
                    Some(SipEvent::CallEnded { call_id }) => {
                        engine.cancel_call(&call_id);
                    }
                    None => break,
                }
            }
        });
    }

    /// Cancel a live call's pipeline; finalisation runs on its task.
    pub fn cancel_call(&self, call_id: &str) {
        if let Some((_, token)) = self.call_cancels.remove(call_id) {
            token.cancel();
        }
    }

    // ---- campaign control -------------------------------------------------

    /// Start a campaign: mark it running and enqueue every pending lead.
    pub async fn start_campaign(&self, tenant_id: &str, campaign_id: &str) -> EngineResult<usize> {
        let campaign = self
            .db
            .campaign(tenant_id, campaign_id)
            .await?
            .ok_or_else(|| EngineError::Persistence(format!("campaign {} not found", campaign_id)))?;
        self.db
            .set_campaign_status(tenant_id, campaign_id, CampaignStatus::Running)
            .await?;

        let leads = self.db.pending_leads(tenant_id, campaign_id).await?;
        let mut enqueued = 0;
        for lead in leads {
            let job = DialerJob::new(
                tenant_id,
                campaign_id,
                &lead.id,
                &lead.phone_number,
                campaign_priority(&campaign),
            );
            self.db.upsert_job(&job).await?;
            self.queue.enqueue(job);
            enqueued += 1;
        }
        info!(tenant_id, campaign_id, enqueued, "campaign started");
        Ok(enqueued)
    }

    /// Pause a campaign; the worker defers its jobs.
    pub async fn pause_campaign(&self, tenant_id: &str, campaign_id: &str) -> EngineResult<bool> {
        self.db
            .set_campaign_status(tenant_id, campaign_id, CampaignStatus::Paused)
            .await
    }

    /// Stop a campaign permanently.
    pub async fn stop_campaign(&self, tenant_id: &str, campaign_id: &str) -> EngineResult<bool> {
        self.db
            .set_campaign_status(tenant_id, campaign_id, CampaignStatus::Completed)
            .await
    }

    // ---- webhooks ---------------------------------------------------------

    /// Answer webhook: return the control objects that point the carrier's
    /// audio socket at this system.
    pub async fn answer_ncco(&self, external_call_uuid: &str) -> EngineResult<Value> {
        let resolved = self.db.call_by_external_uuid(external_call_uuid).await?;
        let Some((tenant_id, call_id)) = resolved else {
            warn!(external_call_uuid, "answer webhook for unknown call");
            return Ok(json!([{ "action": "hangup" }]));
        };
        let call = self
            .db
            .call(&tenant_id, &call_id)
            .await?
            .ok_or_else(|| EngineError::Persistence("call row vanished".into()))?;

        let ws_base = self
            .config
            .public_base_url
            .replacen("http", "ws", 1);
        let uri = format!(
            "{}/voice/{}?tenant_id={}&campaign_id={}&lead_id={}&call_id={}",
            ws_base, external_call_uuid, call.tenant_id, call.campaign_id, call.lead_id, call.id
        );
        Ok(json!([
            {
                "action": "connect",
                "endpoint": [{
                    "type": "websocket",
                    "uri": uri,
                    "content-type": "audio/l16;rate=16000"
                }]
            }
        ]))
    }

    /// Event webhook: translate a carrier status into a call outcome and
    /// feed the dialer's completion path. Unknown statuses are ignored.
    pub async fn handle_call_event(
        &self,
        external_call_uuid: &str,
        status: &str,
        duration_seconds: Option<u32>,
    ) -> EngineResult<()> {
        let Some(outcome) = CallOutcome::from_carrier_status(status) else {
            debug!(external_call_uuid, status, "ignoring unknown carrier status");
            return Ok(());
        };

        let Some((_tenant_id, call_id)) = self.db.call_by_external_uuid(external_call_uuid).await?
        else {
            warn!(external_call_uuid, "event webhook for unknown call");
            return Ok(());
        };

        // A live media session means the conversation owns the outcome;
        // carrier-level outcomes only settle calls that never got one
        if self.sessions.get(&call_id).is_some() && outcome.is_goal() {
            debug!(%call_id, "call answered; pipeline will report the outcome");
            return Ok(());
        }

        self.complete_job_for_call(&call_id, outcome, duration_seconds)
            .await
    }

    /// Feed an outcome into the dialer for the job owning this call.
    pub async fn complete_job_for_call(
        &self,
        call_id: &str,
        outcome: CallOutcome,
        duration_seconds: Option<u32>,
    ) -> EngineResult<()> {
        let Some(job) = self.queue.processing_job_by_call(call_id) else {
            // Already settled by the other completion path
            debug!(call_id, ?outcome, "no processing job for call");
            return Ok(());
        };
        self.worker
            .handle_call_completion(&job.job_id, outcome, duration_seconds)
            .await?;
        Ok(())
    }

    // ---- call startup -----------------------------------------------------

    /// Register a session and start the pipeline for a WebSocket call.
    ///
    /// Returns the per-call cancellation token; the caller (the socket
    /// pump) cancels it when the socket dies.
    pub async fn start_ws_call(
        self: &Arc<Self>,
        call_id: String,
        metadata: CallMetadata,
    ) -> EngineResult<CancellationToken> {
        let campaign = self
            .db
            .campaign(&metadata.tenant_id, &metadata.campaign_id)
            .await?;

        self.ws_gateway
            .on_call_started(&call_id, metadata.clone())
            .await?;

        let cancel = CancellationToken::new();
        self.call_cancels.insert(call_id.clone(), cancel.clone());
        // The dialer worker registered the concurrency slot when it placed
        // the call; the pipeline releases it at finalisation.
        self.register_session(&call_id, &metadata, campaign.as_ref());

        let engine = self.clone();
        let gateway: Arc<dyn MediaGateway> = self.ws_gateway.clone();
        let run_cancel = cancel.clone();
        let run_call_id = call_id.clone();
        tokio::spawn(async move {
            let (prompts, guardrails) = engine.campaign_prompts(campaign.as_ref());
            let cost_rate = campaign.as_ref().and_then(|c| c.cost_rate);
            let outcome = engine
                .pipeline
                .run_call(gateway, &run_call_id, prompts, guardrails, cost_rate, run_cancel)
                .await;
            engine.call_cancels.remove(&run_call_id);
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(call_id = %run_call_id, error = %e, "pipeline run failed");
                    CallOutcome::Failed
                }
            };
            if let Err(e) = engine
                .complete_job_for_call(&run_call_id, outcome, None)
                .await
            {
                warn!(call_id = %run_call_id, error = %e, "job completion failed");
            }
        });

        Ok(cancel)
    }

    /// Start the pipeline for an inbound SIP call (local testing path).
    fn start_inbound_call(self: Arc<Self>, call_id: String, from: String) {
        let cancel = CancellationToken::new();
        self.call_cancels.insert(call_id.clone(), cancel.clone());

        let metadata = CallMetadata {
            tenant_id: "sip-local".to_string(),
            campaign_id: "sip-local".to_string(),
            lead_id: call_id.clone(),
            phone_number: Some(from),
            external_call_uuid: None,
        };
        self.register_session(&call_id, &metadata, None);
        // Inbound calls have no dialer worker; claim the slot here
        self.tracker
            .register_call_start(&metadata.tenant_id, &metadata.campaign_id);

        let gateway: Arc<dyn MediaGateway> = self.rtp_gateway.clone();
        tokio::spawn(async move {
            let (prompts, guardrails) = self.campaign_prompts(None);
            if let Err(e) = self
                .pipeline
                .run_call(gateway, &call_id, prompts, guardrails, None, cancel)
                .await
            {
                error!(%call_id, error = %e, "inbound pipeline run failed");
            }
            self.call_cancels.remove(&call_id);
            self.tracker.register_call_end("sip-local", "sip-local");
        });
    }

    fn register_session(
        &self,
        call_id: &str,
        metadata: &CallMetadata,
        campaign: Option<&Campaign>,
    ) {
        let voice_id = campaign
            .map(|c| c.voice_id.clone())
            .unwrap_or_else(|| self.config.tts.default_voice.clone());
        let (prompts, _) = self.campaign_prompts(campaign);
        let system_prompt = prompts.render(
            voxdial_agent_core::ConvState::Greeting,
            &voxdial_agent_core::ConversationContext::default(),
        );

        self.sessions.insert(CallSession::new(
            call_id,
            &metadata.tenant_id,
            &metadata.campaign_id,
            &metadata.lead_id,
            metadata.phone_number.clone().unwrap_or_default(),
            voice_id,
            system_prompt,
        ));
    }

    fn campaign_prompts(&self, campaign: Option<&Campaign>) -> (PromptManager, Guardrails) {
        let vars = PromptVars {
            goal_description: campaign
                .map(|c| c.goal_description.clone())
                .unwrap_or_else(|| "have a helpful conversation".to_string()),
            ..Default::default()
        };
        let overrides = CampaignOverrides {
            system_prompt: campaign.and_then(|c| c.system_prompt_template.clone()),
            ..Default::default()
        };
        let prompts = PromptManager::new(vars, overrides);
        let guardrails = Guardrails::new(GuardrailsConfig::default());
        (prompts, guardrails)
    }
}

/// Job priority for a campaign's leads.
///
/// Campaigns dial at normal priority; urgent work (priority >= 8) is
/// reserved for operator-initiated jobs.
fn campaign_priority(_campaign: &Campaign) -> u8 {
    5
}

/// REST telephony dialer: POST to the carrier, get a call UUID back.
struct HttpTelephonyDialer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_number: String,
    answer_url: String,
    event_url: String,
}

#[async_trait]
impl OutboundDialer for HttpTelephonyDialer {
    async fn place_call(&self, job: &DialerJob) -> DialerResult<String> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "to": job.phone_number,
                "from": self.from_number,
                "answer_url": self.answer_url,
                "event_url": self.event_url,
            }))
            .send()
            .await
            .map_err(|e| DialerError::Telephony(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DialerError::Telephony(format!(
                "carrier returned {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| DialerError::Telephony(e.to_string()))?;
        body["uuid"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| DialerError::Telephony("carrier response missing uuid".to_string()))
    }
}

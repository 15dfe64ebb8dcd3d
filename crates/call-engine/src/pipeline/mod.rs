//! Per-call voice pipeline
//!
//! One pipeline run owns the whole life of a call's audio: pump decoded
//! PCM from the gateway into the STT session, consume transcription
//! events, drive the conversation engine and language model on each final
//! utterance, stream synthesis back out through the gateway, and watch
//! for barge-in the entire time the agent is speaking.
//!
//! The task graph is plain data: a cancellation token, the STT audio
//! sender, the event receiver, and one spawned inbound pump. Turns are
//! strictly serialised; a new turn cannot start emitting audio while the
//! previous one is still synthesising. Partial transcripts replace the
//! working utterance, never concatenate onto it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use voxdial_agent_core::{
    collect_response, AgentError, AudioChunk, ChatRequest, ConvState, ConversationEngine,
    ConversationOutcome, FallbackAction, Guardrails, IntentDetector, LanguageModel, PromptManager,
    SpeechToText, SttEvent, SynthesisRequest, TextToSpeech,
};
use voxdial_dialer_core::CallOutcome;
use voxdial_media_gateway::MediaGateway;

use crate::database::DatabaseManager;
use crate::error::{EngineError, EngineResult};
use crate::latency::{LatencyTracker, TurnLatency};
use crate::recordings::RecordingStore;
use crate::session::{CallSession, SessionState, SessionStore};

/// PCM rate the pipeline speaks and listens at
const PIPELINE_SAMPLE_RATE: u32 = 16_000;

/// Provider adapters injected into every call.
#[derive(Clone)]
pub struct PipelineProviders {
    /// Speech-to-text backend
    pub stt: Arc<dyn SpeechToText>,
    /// Language-model backend
    pub llm: Arc<dyn LanguageModel>,
    /// Text-to-speech backend
    pub tts: Arc<dyn TextToSpeech>,
}

/// Pipeline-wide knobs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Per-turn latency budget
    pub latency_budget: Duration,
    /// End the call as failed after this long without events
    pub idle_timeout: Duration,
    /// Per-second cost rate when the campaign has no override
    pub cost_rate_per_second: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            latency_budget: Duration::from_millis(700),
            idle_timeout: Duration::from_secs(300),
            cost_rate_per_second: 0.001,
        }
    }
}

/// The per-call orchestrator factory.
pub struct VoicePipeline {
    providers: PipelineProviders,
    sessions: Arc<SessionStore>,
    db: DatabaseManager,
    recordings: Arc<RecordingStore>,
    engine: ConversationEngine,
    intents: IntentDetector,
    config: PipelineConfig,
}

/// What `speak` observed
struct SpeakResult {
    interrupted: bool,
    spoke_anything: bool,
    duration_ms: Option<u64>,
}

impl VoicePipeline {
    /// Assemble a pipeline over its collaborators.
    pub fn new(
        providers: PipelineProviders,
        sessions: Arc<SessionStore>,
        db: DatabaseManager,
        recordings: Arc<RecordingStore>,
        engine: ConversationEngine,
        config: PipelineConfig,
    ) -> Self {
        Self {
            providers,
            sessions,
            db,
            recordings,
            engine,
            intents: IntentDetector::new(),
            config,
        }
    }

    /// Session store shared with the HTTP layer
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Run one call to completion and return its outcome.
    ///
    /// The session must already be registered in the store and the
    /// gateway session started. Every exit path, including cancellation,
    /// flushes the transcript and recording, finalises the call row,
    /// releases the concurrency slot, and tears the gateway session down.
    pub async fn run_call(
        &self,
        gateway: Arc<dyn MediaGateway>,
        call_id: &str,
        prompts: PromptManager,
        guardrails: Guardrails,
        cost_rate: Option<f64>,
        cancel: CancellationToken,
    ) -> EngineResult<CallOutcome> {
        let session = self
            .sessions
            .get(call_id)
            .ok_or_else(|| EngineError::SessionNotFound {
                call_id: call_id.to_string(),
            })?;
        session.lock().state = SessionState::Active;

        let outcome = match self
            .drive_call(gateway.clone(), call_id, &session, prompts, guardrails, &cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(call_id, error = %e, "pipeline error; failing call");
                session.lock().state = SessionState::Error;
                CallOutcome::Failed
            }
        };

        self.finalize(gateway, call_id, &session, outcome, cost_rate)
            .await;
        Ok(outcome)
    }

    async fn drive_call(
        &self,
        gateway: Arc<dyn MediaGateway>,
        call_id: &str,
        session: &Arc<parking_lot::Mutex<CallSession>>,
        prompts: PromptManager,
        guardrails: Guardrails,
        cancel: &CancellationToken,
    ) -> EngineResult<CallOutcome> {
        let stt_session = self.providers.stt.open_session().await?;
        let input_queue =
            gateway
                .audio_queue(call_id)
                .ok_or_else(|| EngineError::SessionNotFound {
                    call_id: call_id.to_string(),
                })?;

        // Task 1: inbound audio pump, gateway -> STT
        let pump_cancel = cancel.clone();
        let audio_tx = stt_session.audio_tx;
        let pump = tokio::spawn(async move {
            loop {
                let chunk = tokio::select! {
                    _ = pump_cancel.cancelled() => break,
                    chunk = input_queue.pop() => chunk,
                };
                let Some(chunk) = chunk else { break };
                if audio_tx
                    .send(AudioChunk::new(chunk, PIPELINE_SAMPLE_RATE))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let mut call = CallTasks {
            pipeline: self,
            gateway,
            call_id: call_id.to_string(),
            session: session.clone(),
            events: stt_session.events,
            cancel: cancel.clone(),
            latencies: LatencyTracker::new(call_id, self.config.latency_budget),
            prompts,
            guardrails,
            pending_final: None,
            stream_closed: false,
        };
        let outcome = call.event_loop().await;

        pump.abort();
        Ok(outcome)
    }

    async fn finalize(
        &self,
        gateway: Arc<dyn MediaGateway>,
        call_id: &str,
        session: &Arc<parking_lot::Mutex<CallSession>>,
        outcome: CallOutcome,
        cost_rate: Option<f64>,
    ) {
        let (tenant_id, campaign_id, transcript_text, transcript, started_at, failed) = {
            let mut locked = session.lock();
            locked.state = match outcome {
                CallOutcome::Failed | CallOutcome::Error => SessionState::Error,
                _ => SessionState::Ended,
            };
            (
                locked.tenant_id.clone(),
                locked.campaign_id.clone(),
                locked.transcript_text(),
                locked.transcript.clone(),
                locked.started_at,
                matches!(outcome, CallOutcome::Failed | CallOutcome::Error),
            )
        };

        // Transcript flush is best-effort; a lost flush must not stall the call
        if let Err(e) = self
            .db
            .update_call_transcript(&tenant_id, call_id, &transcript_text, &transcript)
            .await
        {
            warn!(call_id, error = %e, "final transcript flush failed");
        }

        // Recording flush, skipped when nothing was captured
        if let Some(buffer) = gateway.recording_buffer(call_id) {
            let wav = {
                let locked = buffer.lock();
                if locked.is_empty() {
                    None
                } else {
                    locked.to_wav_bytes().ok()
                }
            };
            if let Some(wav) = wav {
                match self
                    .recordings
                    .store(&tenant_id, &campaign_id, call_id, &wav)
                    .await
                {
                    Ok(path) => {
                        if let Err(e) = self.db.set_recording_path(&tenant_id, call_id, &path).await
                        {
                            warn!(call_id, error = %e, "recording path update failed");
                        }
                    }
                    Err(e) => warn!(call_id, error = %e, "recording store failed"),
                }
            }
        }

        let ended_at = chrono::Utc::now();
        let duration_seconds = (ended_at - started_at).num_seconds().max(0);
        let cost = duration_seconds as f64 * cost_rate.unwrap_or(self.config.cost_rate_per_second);
        let status = if failed { "failed" } else { "completed" };
        let last_error = failed.then(|| format!("{:?}", outcome));
        if let Err(e) = self
            .db
            .finalize_call(
                &tenant_id,
                call_id,
                status,
                ended_at,
                duration_seconds,
                cost,
                last_error.as_deref(),
            )
            .await
        {
            warn!(call_id, error = %e, "call finalisation failed");
        }

        self.sessions.remove(call_id);
        gateway.on_call_ended(call_id, status).await;
        info!(call_id, ?outcome, duration_seconds, "call finalised");
    }
}

/// The per-call task set: event consumer, turn handler, TTS pump.
struct CallTasks<'p> {
    pipeline: &'p VoicePipeline,
    gateway: Arc<dyn MediaGateway>,
    call_id: String,
    session: Arc<parking_lot::Mutex<CallSession>>,
    events: mpsc::Receiver<SttEvent>,
    cancel: CancellationToken,
    latencies: LatencyTracker,
    prompts: PromptManager,
    guardrails: Guardrails,
    /// A final that arrived while the agent was speaking
    pending_final: Option<String>,
    stream_closed: bool,
}

impl CallTasks<'_> {
    /// Task 2 + 3: consume STT events and run turns until the
    /// conversation terminates.
    async fn event_loop(&mut self) -> CallOutcome {
        self.session.lock().state = SessionState::Listening;

        loop {
            // A final stashed during speaking runs before new events
            let event = if let Some(text) = self.pending_final.take() {
                SttEvent::Final { text }
            } else if self.stream_closed {
                SttEvent::StreamClosed
            } else {
                let received = tokio::select! {
                    // Media channel died under us (peer hangup, socket
                    // close): a conversation that never concluded is a
                    // failed call, not an unknown one
                    _ = self.cancel.cancelled() => {
                        let outcome = self.conversation_outcome();
                        return if outcome == CallOutcome::Unknown {
                            CallOutcome::Failed
                        } else {
                            outcome
                        };
                    }
                    received = tokio::time::timeout(
                        self.pipeline.config.idle_timeout,
                        self.events.recv(),
                    ) => received,
                };
                match received {
                    Err(_) => {
                        warn!(call_id = %self.call_id, "idle timeout; failing call");
                        return CallOutcome::Failed;
                    }
                    Ok(None) => SttEvent::StreamClosed,
                    Ok(Some(event)) => event,
                }
            };

            match event {
                SttEvent::Partial { text } => {
                    self.session.lock().set_partial_input(text);
                }
                SttEvent::StartOfTurn => {
                    // Not speaking right now; nothing to interrupt
                    self.session.lock().touch();
                }
                SttEvent::Final { text } => {
                    let state = self.handle_turn(&text).await;
                    if state.is_terminal() {
                        self.session.lock().state = SessionState::Ending;
                        return self.conversation_outcome();
                    }
                }
                SttEvent::StreamClosed => {
                    debug!(call_id = %self.call_id, "stt stream closed");
                    // Finalise a half-spoken utterance before ending
                    let pending = {
                        let mut locked = self.session.lock();
                        let text = locked.current_user_input.clone();
                        locked.current_user_input.clear();
                        text
                    };
                    self.stream_closed = false;
                    if !pending.trim().is_empty() {
                        let state = self.handle_turn(&pending).await;
                        if state.is_terminal() {
                            return self.conversation_outcome();
                        }
                    }
                    return self.conversation_outcome();
                }
            }
        }
    }

    fn conversation_outcome(&self) -> CallOutcome {
        let ctx = self.session.lock().conversation_context.clone();
        match self.pipeline.engine.determine_outcome(&ctx) {
            ConversationOutcome::Success => CallOutcome::Success,
            ConversationOutcome::Declined => CallOutcome::Declined,
            ConversationOutcome::NotInterested => CallOutcome::NotInterested,
            ConversationOutcome::CallbackRequested => CallOutcome::CallbackRequested,
            ConversationOutcome::TransferToHuman => CallOutcome::TransferToHuman,
            ConversationOutcome::MaxTurnsReached => CallOutcome::MaxTurnsReached,
            ConversationOutcome::Error => CallOutcome::Error,
            ConversationOutcome::Unknown => CallOutcome::Unknown,
        }
    }

    /// One full turn: classify, advance, generate, speak, persist.
    async fn handle_turn(&mut self, text: &str) -> ConvState {
        let mut latency = TurnLatency::begin(self.session.lock().turn_id + 1);
        let intent = self.pipeline.intents.detect(text);

        let (new_state, voice_id, turn_count) = {
            let mut locked = self.session.lock();
            locked.state = SessionState::Processing;
            locked.commit_user_turn(text);
            let turn_count = locked.turn_id;
            let current = locked.conversation_state;
            let mut ctx = locked.conversation_context.clone();
            let next = self
                .pipeline
                .engine
                .advance(&mut ctx, current, intent, text, turn_count);
            locked.conversation_context = ctx;
            locked.conversation_state = next;
            (next, locked.voice_id.clone(), turn_count)
        };
        debug!(call_id = %self.call_id, ?intent, ?new_state, turn_count, "turn advanced");

        // Generate the agent's line, falling back on provider failure
        let (response, force_goodbye) = self.generate_response(new_state, &mut latency).await;

        let mut final_state = new_state;
        if let Some(text) = response {
            latency.tts_start = Some(std::time::Instant::now());
            let spoken = self.speak(&text, &voice_id, &mut latency).await;
            if spoken.interrupted && !spoken.spoke_anything {
                // Barge-in before any audio: drop the turn entirely
                self.session.lock().discard_agent_turn();
            } else if spoken.interrupted {
                // Partial playback: discard the response text, keep listening
                self.session.lock().discard_agent_turn();
            } else {
                self.session
                    .lock()
                    .commit_agent_turn(&text, spoken.duration_ms);
            }
        }
        if force_goodbye {
            final_state = ConvState::Goodbye;
            self.session.lock().conversation_state = ConvState::Goodbye;
        }

        self.latencies.record(latency);
        self.flush_transcript().await;
        self.session.lock().state = SessionState::Listening;
        final_state
    }

    /// Run the LLM through the guardrails. Returns the text to speak and
    /// whether the call must end after speaking it.
    async fn generate_response(
        &mut self,
        state: ConvState,
        latency: &mut TurnLatency,
    ) -> (Option<String>, bool) {
        let (messages, system_prompt) = {
            let locked = self.session.lock();
            let prompt = self.prompts.render(state, &locked.conversation_context);
            (locked.llm_messages(), prompt)
        };

        latency.llm_start = Some(std::time::Instant::now());
        let request = ChatRequest {
            messages,
            system_prompt,
            temperature: self.prompts.temperature(),
            max_tokens: self.prompts.max_tokens(),
        };

        let result = match self.pipeline.providers.llm.stream_chat(request).await {
            Ok(tokens) => collect_response(tokens).await,
            Err(e) => Err(e),
        };
        latency.llm_end = Some(std::time::Instant::now());

        let checked = result.and_then(|raw| {
            let cleaned = self.guardrails.clean_response(&raw);
            if cleaned.is_empty() {
                return Err(AgentError::provider("llm", "empty response after cleaning"));
            }
            self.guardrails.validate(&cleaned)?;
            Ok(cleaned)
        });

        match checked {
            Ok(text) => {
                let mut locked = self.session.lock();
                let ctx = &mut locked.conversation_context;
                self.guardrails.on_llm_success(ctx);
                locked.current_ai_response = text.clone();
                (Some(text), false)
            }
            Err(e) => {
                let current_state = self.session.lock().conversation_state;
                let action = {
                    let mut locked = self.session.lock();
                    self.guardrails
                        .on_llm_failure(&mut locked.conversation_context, current_state, &e)
                };
                match action {
                    FallbackAction::Recover(text) => (Some(text), false),
                    FallbackAction::EndCall(text) => (Some(text), true),
                }
            }
        }
    }

    /// Task 4 + 5: stream synthesis to the gateway, watching for barge-in
    /// before every chunk.
    async fn speak(&mut self, text: &str, voice_id: &str, latency: &mut TurnLatency) -> SpeakResult {
        self.session.lock().state = SessionState::Speaking;
        let interrupt = self.cancel.child_token();

        let request = SynthesisRequest {
            text: text.to_string(),
            voice_id: voice_id.to_string(),
            sample_rate: PIPELINE_SAMPLE_RATE,
        };
        let mut chunks = match self
            .pipeline
            .providers
            .tts
            .stream_synthesize(request, interrupt.clone())
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(call_id = %self.call_id, error = %e, "synthesis failed to start");
                return SpeakResult {
                    interrupted: false,
                    spoke_anything: false,
                    duration_ms: None,
                };
            }
        };

        let mut result = SpeakResult {
            interrupted: false,
            spoke_anything: false,
            duration_ms: Some(0),
        };

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    interrupt.cancel();
                    result.interrupted = true;
                    break;
                }
                event = self.events.recv() => match event {
                    Some(SttEvent::StartOfTurn) => {
                        // Barge-in: stop synthesis at the chunk boundary and
                        // drop whatever audio had not hit the wire yet
                        debug!(call_id = %self.call_id, "barge-in during speech");
                        interrupt.cancel();
                        self.gateway.clear_output(&self.call_id);
                        result.interrupted = true;
                        break;
                    }
                    Some(SttEvent::Partial { text }) => {
                        self.session.lock().set_partial_input(text);
                    }
                    Some(SttEvent::Final { text }) => {
                        // The caller finished a whole utterance over us
                        interrupt.cancel();
                        self.gateway.clear_output(&self.call_id);
                        self.pending_final = Some(text);
                        result.interrupted = true;
                        break;
                    }
                    Some(SttEvent::StreamClosed) | None => {
                        self.stream_closed = true;
                        interrupt.cancel();
                        result.interrupted = true;
                        break;
                    }
                },
                chunk = chunks.recv() => match chunk {
                    Some(Ok(audio)) => {
                        if !result.spoke_anything {
                            latency.first_audio = Some(std::time::Instant::now());
                            result.spoke_anything = true;
                        }
                        if let Some(total) = result.duration_ms.as_mut() {
                            *total += audio.duration_ms();
                        }
                        if let Err(e) = self.gateway.send_audio(&self.call_id, &audio.pcm).await {
                            warn!(call_id = %self.call_id, error = %e, "send_audio failed");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(call_id = %self.call_id, error = %e, "synthesis stream error");
                        break;
                    }
                    None => break,
                }
            }
        }

        if !result.spoke_anything {
            result.duration_ms = None;
        }
        result
    }

    /// Incremental transcript flush after every completed turn.
    async fn flush_transcript(&self) {
        let (tenant_id, text, turns) = {
            let locked = self.session.lock();
            (
                locked.tenant_id.clone(),
                locked.transcript_text(),
                locked.transcript.clone(),
            )
        };
        if let Err(e) = self
            .pipeline
            .db
            .update_call_transcript(&tenant_id, &self.call_id, &text, &turns)
            .await
        {
            warn!(call_id = %self.call_id, error = %e, "incremental transcript flush failed");
        }
    }
}

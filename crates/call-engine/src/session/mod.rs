//! Live call sessions
//!
//! A [`CallSession`] is the runtime state of one call: conversation
//! history, transcript, state machine position, activity timestamps.
//! Runtime-only resources (queues, sockets, barge-in signals) live in the
//! gateway and pipeline, never here, which is what makes the session
//! snapshot-able: [`SessionSnapshot`] is the serialisable form used to
//! re-attach a reconnecting WebSocket after a process restart.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use voxdial_agent_core::{ConvState, ConversationContext, Message, Role};

use crate::error::{EngineError, EngineResult};

/// Pipeline-visible call state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Media not yet flowing
    Connecting,
    /// Call established
    Active,
    /// Waiting for caller speech
    Listening,
    /// Running the turn (engine + LLM)
    Processing,
    /// Streaming synthesised audio
    Speaking,
    /// Wrapping up
    Ending,
    /// Finished cleanly
    Ended,
    /// Finished on a failure path
    Error,
}

/// One committed utterance in the call transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    /// "agent" or "user"
    pub speaker: String,
    /// What was said
    pub text: String,
    /// When the utterance was committed
    pub ts: DateTime<Utc>,
    /// Spoken duration, when measured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Runtime state of one live call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    /// Call identifier (persistence key)
    pub call_id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Campaign the call belongs to
    pub campaign_id: String,
    /// Lead being called
    pub lead_id: String,
    /// Destination number
    pub phone_number: String,
    /// TTS voice for this call
    pub voice_id: String,
    /// Conversation language tag
    pub language: String,
    /// Rendered base system prompt
    pub system_prompt: String,
    /// Pipeline state
    pub state: SessionState,
    /// Conversation machine state
    pub conversation_state: ConvState,
    /// Conversation context counters and flags
    pub conversation_context: ConversationContext,
    /// Committed messages in order
    pub conversation_history: Vec<Message>,
    /// Transcript turns in order
    pub transcript: Vec<TranscriptTurn>,
    /// Latest partial transcript; replaced, never concatenated
    pub current_user_input: String,
    /// Response being assembled for the current turn
    pub current_ai_response: String,
    /// Completed user turns
    pub turn_id: u32,
    /// When the call started
    pub started_at: DateTime<Utc>,
    /// Last audio or event on the call
    pub last_activity_at: DateTime<Utc>,
}

impl CallSession {
    /// Create a session in the connecting state.
    pub fn new(
        call_id: impl Into<String>,
        tenant_id: impl Into<String>,
        campaign_id: impl Into<String>,
        lead_id: impl Into<String>,
        phone_number: impl Into<String>,
        voice_id: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            call_id: call_id.into(),
            tenant_id: tenant_id.into(),
            campaign_id: campaign_id.into(),
            lead_id: lead_id.into(),
            phone_number: phone_number.into(),
            voice_id: voice_id.into(),
            language: "en".to_string(),
            system_prompt: system_prompt.into(),
            state: SessionState::Connecting,
            conversation_state: ConvState::Greeting,
            conversation_context: ConversationContext::default(),
            conversation_history: Vec::new(),
            transcript: Vec::new(),
            current_user_input: String::new(),
            current_ai_response: String::new(),
            turn_id: 0,
            started_at: now,
            last_activity_at: now,
        }
    }

    /// Note activity for the idle timeout.
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// Replace the in-flight partial transcript.
    pub fn set_partial_input(&mut self, text: impl Into<String>) {
        self.current_user_input = text.into();
        self.touch();
    }

    /// Commit a final user utterance to history and transcript.
    pub fn commit_user_turn(&mut self, text: &str) {
        self.turn_id += 1;
        self.current_user_input.clear();
        self.conversation_history.push(Message::user(text));
        self.transcript.push(TranscriptTurn {
            speaker: "user".to_string(),
            text: text.to_string(),
            ts: Utc::now(),
            duration_ms: None,
        });
        self.touch();
    }

    /// Commit a spoken agent response to history and transcript.
    pub fn commit_agent_turn(&mut self, text: &str, duration_ms: Option<u64>) {
        self.current_ai_response.clear();
        self.conversation_history.push(Message::assistant(text));
        self.transcript.push(TranscriptTurn {
            speaker: "agent".to_string(),
            text: text.to_string(),
            ts: Utc::now(),
            duration_ms,
        });
        self.touch();
    }

    /// Discard the response of an aborted turn; history is untouched.
    pub fn discard_agent_turn(&mut self) {
        self.current_ai_response.clear();
    }

    /// Messages for the LLM: history without system entries.
    pub fn llm_messages(&self) -> Vec<Message> {
        self.conversation_history
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect()
    }

    /// Newline-joined transcript rendering; this exact text is what gets
    /// persisted to `calls.transcript_text`.
    pub fn transcript_text(&self) -> String {
        self.transcript
            .iter()
            .map(|turn| format!("{}: {}", turn.speaker, turn.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Serialisable snapshot of all non-runtime fields.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.clone(),
        }
    }
}

/// Serialisable session form for the distributed cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    session: CallSession,
}

impl SessionSnapshot {
    /// Serialise to JSON.
    pub fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string(self).map_err(|e| EngineError::Persistence(e.to_string()))
    }

    /// Restore from JSON.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::Persistence(e.to_string()))
    }

    /// Take the session back out of the snapshot.
    pub fn into_session(self) -> CallSession {
        self.session
    }
}

/// In-memory store of live sessions keyed by call id.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<CallSession>>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Insert a session; replaces any stale entry for the call.
    pub fn insert(&self, session: CallSession) -> Arc<Mutex<CallSession>> {
        let call_id = session.call_id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(call_id, handle.clone());
        handle
    }

    /// Fetch the live session for a call.
    pub fn get(&self, call_id: &str) -> Option<Arc<Mutex<CallSession>>> {
        self.sessions.get(call_id).map(|s| s.clone())
    }

    /// Remove and return the session when the call ends.
    pub fn remove(&self, call_id: &str) -> Option<Arc<Mutex<CallSession>>> {
        self.sessions.remove(call_id).map(|(_, s)| s)
    }

    /// Restore a session from its snapshot (WebSocket re-attach).
    pub fn restore(&self, snapshot: SessionSnapshot) -> Arc<Mutex<CallSession>> {
        self.insert(snapshot.into_session())
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no calls are live
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CallSession {
        CallSession::new(
            "call-1",
            "tenant-1",
            "campaign-1",
            "lead-1",
            "+15551234567",
            "aria",
            "You are Dana.",
        )
    }

    #[test]
    fn partials_replace_not_concatenate() {
        let mut s = session();
        s.set_partial_input("hel");
        s.set_partial_input("hello th");
        s.set_partial_input("hello there");
        assert_eq!(s.current_user_input, "hello there");
    }

    #[test]
    fn committing_turns_builds_history_and_transcript() {
        let mut s = session();
        s.set_partial_input("hello");
        s.commit_user_turn("hello");
        s.commit_agent_turn("Hi, is this a good time?", Some(1800));

        assert_eq!(s.turn_id, 1);
        assert!(s.current_user_input.is_empty());
        assert_eq!(s.conversation_history.len(), 2);
        assert_eq!(s.transcript.len(), 2);
        assert_eq!(
            s.transcript_text(),
            "user: hello\nagent: Hi, is this a good time?"
        );
    }

    #[test]
    fn discarded_turn_leaves_history_untouched() {
        let mut s = session();
        s.commit_user_turn("hello");
        s.current_ai_response = "partial resp".to_string();
        s.discard_agent_turn();

        assert!(s.current_ai_response.is_empty());
        assert_eq!(s.conversation_history.len(), 1);
        assert_eq!(s.transcript.len(), 1);
    }

    #[test]
    fn transcript_text_is_idempotent() {
        let mut s = session();
        s.commit_user_turn("hello");
        s.commit_agent_turn("hi", None);
        let first = s.transcript_text();
        let second = s.transcript_text();
        assert_eq!(first, second);

        let json_first = serde_json::to_string(&s.transcript).unwrap();
        let json_second = serde_json::to_string(&s.transcript).unwrap();
        assert_eq!(json_first, json_second);
    }

    #[test]
    fn snapshot_round_trip_preserves_fields() {
        let mut s = session();
        s.commit_user_turn("yes please");
        s.state = SessionState::Listening;
        s.conversation_state = ConvState::Qualification;
        s.conversation_context.objection_count = 2;

        let json = s.snapshot().to_json().unwrap();
        let restored = SessionSnapshot::from_json(&json).unwrap().into_session();

        assert_eq!(restored.call_id, s.call_id);
        assert_eq!(restored.state, s.state);
        assert_eq!(restored.conversation_state, s.conversation_state);
        assert_eq!(restored.conversation_context.objection_count, 2);
        assert_eq!(restored.transcript, s.transcript);
        assert_eq!(restored.turn_id, s.turn_id);
    }

    #[test]
    fn store_insert_get_remove() {
        let store = SessionStore::new();
        store.insert(session());
        assert_eq!(store.len(), 1);

        let handle = store.get("call-1").unwrap();
        handle.lock().commit_user_turn("hi");
        assert_eq!(store.get("call-1").unwrap().lock().turn_id, 1);

        store.remove("call-1");
        assert!(store.is_empty());
        assert!(store.get("call-1").is_none());
    }

    #[test]
    fn llm_messages_exclude_system_entries() {
        let mut s = session();
        s.conversation_history.push(Message::system("be brief"));
        s.commit_user_turn("hello");
        let messages = s.llm_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }
}

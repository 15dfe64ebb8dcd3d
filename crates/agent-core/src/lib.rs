//! voxdial Agent Core Library
//!
//! The conversational brain of a call: provider adapters for speech-to-text,
//! language model and text-to-speech streaming, an intent classifier, the
//! goal-tracking conversation state machine, state-conditional prompt
//! rendering, and the guardrails that keep a degraded call sounding human.
//!
//! All providers sit behind traits so the pipeline can run against real
//! services in production and scripted fakes in tests. Provider failures
//! are ordinary values ([`AgentError`]), never panics, and timeouts are
//! enforced inside the adapters so callers see a tagged error rather than
//! a hung future.

pub mod convo;
pub mod error;
pub mod guardrails;
pub mod intent;
pub mod llm;
pub mod prompt;
pub mod stt;
pub mod tts;
pub mod types;

pub use convo::{
    ConvState, ConversationContext, ConversationEngine, ConversationOutcome, EndReason,
    EngineLimits,
};
pub use error::{AgentError, AgentResult};
pub use guardrails::{FallbackAction, Guardrails, GuardrailsConfig};
pub use intent::{IntentDetector, UserIntent};
pub use llm::{collect_response, ChatRequest, LanguageModel, LlmConfig, OpenAiChatModel, TokenStream};
pub use prompt::{CampaignOverrides, PromptManager, PromptVars};
pub use stt::{SpeechToText, SttConfig, SttEvent, SttSession, WsStreamingStt};
pub use tts::{HttpStreamingTts, SynthesisRequest, TextToSpeech, TtsConfig};
pub use types::{AudioChunk, Message, Role};

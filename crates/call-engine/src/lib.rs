//! voxdial Call Engine Library
//!
//! The orchestration layer that ties the stack together. For each live
//! call it runs the voice pipeline (gateway audio in, STT, conversation
//! engine, LLM, TTS, gateway audio out) with barge-in and per-turn
//! latency accounting; around the calls it owns the session store,
//! SQLite persistence, the recording blob store, the HTTP surface
//! (webhooks, campaign control, the voice WebSocket), and the
//! `voxdial-server` binary.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │             CallEngine              │
//! ├─────────────────────────────────────┤
//! │ ┌─────────────┐ ┌─────────────────┐ │
//! │ │ Session     │ │ Dialer queue +  │ │
//! │ │ store       │ │ worker          │ │
//! │ └─────────────┘ └─────────────────┘ │
//! │ ┌─────────────┐ ┌─────────────────┐ │
//! │ │ Voice       │ │ Database +      │ │
//! │ │ pipeline    │ │ recordings      │ │
//! │ └─────────────┘ └─────────────────┘ │
//! └─────────────────────────────────────┘
//!          │                │
//!   media gateways    provider adapters
//! ```

pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod latency;
pub mod pipeline;
pub mod recordings;
pub mod server;
pub mod session;

pub use config::EngineConfig;
pub use database::DatabaseManager;
pub use engine::CallEngine;
pub use error::{EngineError, EngineResult};
pub use latency::{LatencyTracker, TurnLatency};
pub use pipeline::{PipelineProviders, VoicePipeline};
pub use recordings::RecordingStore;
pub use session::{CallSession, SessionSnapshot, SessionState, SessionStore, TranscriptTurn};

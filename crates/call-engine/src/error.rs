//! Error types for call orchestration

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced by the call engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row was missing or malformed
    #[error("persistence error: {0}")]
    Persistence(String),

    /// No live session for the call
    #[error("no live session for call {call_id}")]
    SessionNotFound {
        /// Offending call id
        call_id: String,
    },

    /// Gateway-layer failure
    #[error(transparent)]
    Gateway(#[from] voxdial_media_gateway::GatewayError),

    /// Provider adapter failure that could not be recovered in-call
    #[error(transparent)]
    Agent(#[from] voxdial_agent_core::AgentError),

    /// Dialer-layer failure
    #[error(transparent)]
    Dialer(#[from] voxdial_dialer_core::DialerError),

    /// Recording could not be persisted
    #[error("recording store error: {0}")]
    Recording(String),

    /// Configuration rejected at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// Telephony provider call placement failed
    #[error("telephony provider error: {0}")]
    Telephony(String),
}

//! Error types for provider adapters and conversation logic

use thiserror::Error;

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors produced by the agent layer
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// The language model did not finish inside its per-call deadline
    #[error("language model timed out after {seconds} s")]
    LlmTimeout {
        /// Deadline that expired
        seconds: u64,
    },

    /// A provider returned a failure or unusable response
    #[error("{provider} provider error: {reason}")]
    Provider {
        /// Which provider failed (stt, llm, tts)
        provider: &'static str,
        /// Failure description
        reason: String,
    },

    /// Request rejected before reaching the provider
    #[error("invalid request: {reason}")]
    InvalidInput {
        /// Why the request was rejected
        reason: String,
    },

    /// The provider stream closed before the exchange completed
    #[error("provider stream closed mid-session")]
    StreamClosed,

    /// A response violated campaign validation rules
    #[error("response failed validation: {reason}")]
    ValidationFailed {
        /// Which rule tripped
        reason: String,
    },
}

impl AgentError {
    /// Shorthand for provider failures
    pub fn provider(provider: &'static str, reason: impl Into<String>) -> Self {
        AgentError::Provider {
            provider,
            reason: reason.into(),
        }
    }

    /// Shorthand for input rejection
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        AgentError::InvalidInput {
            reason: reason.into(),
        }
    }
}

//! Goal-tracking conversation engine
//!
//! The conversation is a small finite-state machine driven by classified
//! caller intents. Transitions live in a data table evaluated in descending
//! priority; the first rule whose (state, intent, guard) matches wins and
//! staying put is the default. At the terminal states the engine folds the
//! accumulated context into a single conversation outcome.

mod engine;

pub use engine::{ConversationEngine, EngineLimits, TransitionRule};

use serde::{Deserialize, Serialize};

/// Conversation phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConvState {
    /// Opening turn; initial state
    Greeting,
    /// Qualifying the caller against the campaign goal
    Qualification,
    /// Working through a concern
    ObjectionHandling,
    /// Confirming the goal
    Closing,
    /// Handing off to a human; terminal
    Transfer,
    /// Wrapping up; terminal
    Goodbye,
}

impl ConvState {
    /// Whether the conversation ends in this state
    pub fn is_terminal(self) -> bool {
        matches!(self, ConvState::Goodbye | ConvState::Transfer)
    }
}

/// How a conversation concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationOutcome {
    /// Campaign goal confirmed
    Success,
    /// Caller refused early
    Declined,
    /// Objections exhausted the retry budget
    NotInterested,
    /// Caller asked to be called back
    CallbackRequested,
    /// Caller asked for a human
    TransferToHuman,
    /// Conversation hit the turn ceiling
    MaxTurnsReached,
    /// Provider failures ended the call
    Error,
    /// None of the above
    Unknown,
}

/// Why the engine steered into Goodbye
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// Caller said no before closing
    DeclinedEarly,
    /// Objection budget exhausted
    ObjectionCap,
    /// Turn ceiling reached
    TurnCap,
}

/// Mutable per-call conversation context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Objections handled so far
    pub objection_count: u32,
    /// Follow-up questions asked so far
    pub follow_up_count: u32,
    /// Caller confirmed the goal in Closing
    pub user_confirmed: bool,
    /// Caller asked for a human
    pub transfer_requested: bool,
    /// Caller asked for a callback
    pub callback_requested: bool,
    /// Consecutive language-model failures
    pub llm_error_count: u32,
    /// Most recent concern text, for objection-handling prompts
    pub last_user_concern: Option<String>,
    /// Why Goodbye was reached, when it was steered
    pub end_reason: Option<EndReason>,
}

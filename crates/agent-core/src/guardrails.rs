//! Response guardrails and human-sounding degradation
//!
//! Everything the model produces passes through here before it is spoken:
//! boilerplate is stripped, length is capped, campaign rules are checked.
//! When a provider fails, the caller must never find out they are talking
//! to software; the fallback pools are ordinary conversational phrases,
//! and the second consecutive failure steers the call into a graceful
//! goodbye.

use rand::seq::SliceRandom;
use tracing::warn;

use crate::convo::{ConvState, ConversationContext};
use crate::error::{AgentError, AgentResult};

/// Validation and cleaning rules for one campaign
#[derive(Debug, Clone)]
pub struct GuardrailsConfig {
    /// Sentence ceiling applied after cleaning
    pub max_sentences: u32,
    /// Phrases that must never be spoken (case-insensitive)
    pub forbidden_phrases: Vec<String>,
    /// Tokens that must appear in compliance-bearing responses
    pub required_compliance: Vec<String>,
    /// Consecutive failures before the call is ended
    pub max_llm_errors: u32,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            max_sentences: 3,
            forbidden_phrases: Vec::new(),
            required_compliance: Vec::new(),
            max_llm_errors: 2,
        }
    }
}

/// What to do after a provider failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackAction {
    /// Speak this and keep the conversation going
    Recover(String),
    /// Speak this, then end the call with an error outcome
    EndCall(String),
}

/// Prefixes the model sometimes leaks that must never reach the caller
const BOILERPLATE_PREFIXES: &[&str] = &[
    "As an AI",
    "As a language model",
    "As an assistant",
    "AI:",
    "Assistant:",
    "Agent:",
];

/// Recovery phrases usable in any state
const RECOVERY_POOL: &[&str] = &[
    "Sorry, could you say that again?",
    "Sorry, I missed that. Could you repeat it?",
    "Apologies, the line broke up for a second. What was that?",
];

/// Recovery phrases while working toward the goal
const QUALIFICATION_POOL: &[&str] = &[
    "Sorry, I lost you for a moment. Where were we?",
    "Apologies, could you run that by me once more?",
];

/// Closing-out phrases when the call cannot continue
const GOODBYE_POOL: &[&str] = &[
    "Let me have a colleague call you back shortly. Thanks so much for your time.",
    "I'll have someone follow up with you directly. Thank you for your patience.",
];

/// Per-campaign response guardrails.
pub struct Guardrails {
    config: GuardrailsConfig,
}

impl Guardrails {
    /// Build guardrails with the given rules.
    pub fn new(config: GuardrailsConfig) -> Self {
        Self { config }
    }

    /// Strip boilerplate and cap the response length.
    pub fn clean_response(&self, raw: &str) -> String {
        let mut text = raw.trim();
        for prefix in BOILERPLATE_PREFIXES {
            match text.get(..prefix.len()) {
                Some(head) if head.eq_ignore_ascii_case(prefix) => {
                    text = text[prefix.len()..].trim_start_matches([',', ':', ' ']);
                }
                _ => {}
            }
        }

        truncate_sentences(text.trim(), self.config.max_sentences as usize)
    }

    /// Check a cleaned response against campaign rules.
    pub fn validate(&self, text: &str) -> AgentResult<()> {
        let lowered = text.to_lowercase();
        for phrase in &self.config.forbidden_phrases {
            if lowered.contains(&phrase.to_lowercase()) {
                return Err(AgentError::ValidationFailed {
                    reason: format!("forbidden phrase \"{}\"", phrase),
                });
            }
        }
        for token in &self.config.required_compliance {
            if !lowered.contains(&token.to_lowercase()) {
                return Err(AgentError::ValidationFailed {
                    reason: format!("missing compliance token \"{}\"", token),
                });
            }
        }
        Ok(())
    }

    /// Account for a provider failure and choose what to say.
    ///
    /// The first failure gets a state-appropriate recovery phrase; once
    /// the failure budget is spent the call moves to a graceful goodbye.
    pub fn on_llm_failure(
        &self,
        ctx: &mut ConversationContext,
        state: ConvState,
        error: &AgentError,
    ) -> FallbackAction {
        ctx.llm_error_count += 1;
        warn!(llm_error_count = ctx.llm_error_count, %error, "provider failure, using fallback");

        if ctx.llm_error_count >= self.config.max_llm_errors {
            return FallbackAction::EndCall(pick(GOODBYE_POOL));
        }

        let pool = match state {
            ConvState::Qualification | ConvState::Closing => QUALIFICATION_POOL,
            _ => RECOVERY_POOL,
        };
        FallbackAction::Recover(pick(pool))
    }

    /// Account for a successful turn, easing off the failure counter.
    pub fn on_llm_success(&self, ctx: &mut ConversationContext) {
        ctx.llm_error_count = ctx.llm_error_count.saturating_sub(1);
    }
}

fn pick(pool: &[&str]) -> String {
    pool.choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Sorry, could you say that again?")
        .to_string()
}

/// Keep at most `max` sentences, preserving terminal punctuation.
fn truncate_sentences(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let mut kept = String::new();
    let mut count = 0;
    for ch in text.chars() {
        kept.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            count += 1;
            if count >= max {
                break;
            }
        }
    }
    kept.trim().to_string()
}

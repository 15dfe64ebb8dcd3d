//! State machine transition table and outcome determination

use tracing::debug;

use super::{ConvState, ConversationContext, ConversationOutcome, EndReason};
use crate::intent::UserIntent;

/// Ceilings that steer any state into Goodbye
#[derive(Debug, Clone)]
pub struct EngineLimits {
    /// Turn ceiling across the whole call
    pub max_conversation_turns: u32,
    /// Objections handled before giving up
    pub max_objection_attempts: u32,
    /// Consecutive LLM failures before ending the call
    pub max_llm_errors: u32,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_conversation_turns: 20,
            max_objection_attempts: 3,
            max_llm_errors: 2,
        }
    }
}

/// Guard condition attached to a transition rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    /// Always passes
    None,
    /// Objection budget exhausted
    ObjectionCapReached,
}

/// One row of the transition table
#[derive(Debug, Clone)]
pub struct TransitionRule {
    /// Source state; `None` matches every state
    from: Option<ConvState>,
    /// Intents this rule accepts
    intents: &'static [UserIntent],
    /// Extra condition beyond (from, intent)
    guard: Guard,
    /// Destination state
    to: ConvState,
}

/// The conversation state machine.
///
/// Rules are ordered by descending priority; [`ConversationEngine::advance`]
/// walks them top to bottom and applies the first match. No match means
/// the state is unchanged.
pub struct ConversationEngine {
    limits: EngineLimits,
    rules: Vec<TransitionRule>,
}

impl ConversationEngine {
    /// Build the engine with the default transition table.
    pub fn new(limits: EngineLimits) -> Self {
        use ConvState::*;
        use UserIntent as I;

        let rules = vec![
            // Escalation requests beat everything else in any live state
            rule(Some(Greeting), &[I::RequestHuman], Guard::None, Transfer),
            rule(Some(Qualification), &[I::RequestHuman], Guard::None, Transfer),
            rule(Some(ObjectionHandling), &[I::RequestHuman], Guard::None, Transfer),
            // Greeting
            rule(Some(Greeting), &[I::Yes, I::Greeting], Guard::None, Qualification),
            rule(Some(Greeting), &[I::No], Guard::None, Goodbye),
            rule(Some(Greeting), &[I::Uncertain], Guard::None, ObjectionHandling),
            // Qualification
            rule(Some(Qualification), &[I::Yes], Guard::None, Closing),
            rule(Some(Qualification), &[I::No], Guard::None, Goodbye),
            rule(Some(Qualification), &[I::Callback], Guard::None, Goodbye),
            rule(Some(Qualification), &[I::Uncertain, I::Objection], Guard::None, ObjectionHandling),
            // Objection handling
            rule(Some(ObjectionHandling), &[I::Yes], Guard::None, Closing),
            rule(Some(ObjectionHandling), &[I::No], Guard::None, Goodbye),
            rule(
                Some(ObjectionHandling),
                &[I::Uncertain, I::Objection],
                Guard::ObjectionCapReached,
                Goodbye,
            ),
            // Closing
            rule(Some(Closing), &[I::Yes], Guard::None, Goodbye),
        ];

        Self { limits, rules }
    }

    /// Configured ceilings
    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    /// Advance the machine one turn.
    ///
    /// `turn_count` is the number of completed user turns including this
    /// one. Context flags and counters are updated as side effects of the
    /// chosen transition.
    pub fn advance(
        &self,
        ctx: &mut ConversationContext,
        state: ConvState,
        intent: UserIntent,
        utterance: &str,
        turn_count: u32,
    ) -> ConvState {
        if state.is_terminal() {
            return state;
        }

        // Ceilings outrank the whole table
        if ctx.llm_error_count >= self.limits.max_llm_errors {
            return ConvState::Goodbye;
        }
        if turn_count >= self.limits.max_conversation_turns {
            ctx.end_reason.get_or_insert(EndReason::TurnCap);
            return ConvState::Goodbye;
        }

        let mut next = state;
        for rule in &self.rules {
            if let Some(from) = rule.from {
                if from != state {
                    continue;
                }
            }
            if !rule.intents.contains(&intent) {
                continue;
            }
            let guard_ok = match rule.guard {
                Guard::None => true,
                Guard::ObjectionCapReached => {
                    ctx.objection_count >= self.limits.max_objection_attempts
                }
            };
            if !guard_ok {
                continue;
            }
            next = rule.to;
            break;
        }

        self.apply_effects(ctx, state, next, intent, utterance);
        debug!(?state, ?intent, ?next, "conversation transition");
        next
    }

    fn apply_effects(
        &self,
        ctx: &mut ConversationContext,
        from: ConvState,
        to: ConvState,
        intent: UserIntent,
        utterance: &str,
    ) {
        if to == ConvState::ObjectionHandling
            && matches!(intent, UserIntent::Uncertain | UserIntent::Objection)
        {
            ctx.objection_count += 1;
            ctx.last_user_concern = Some(utterance.to_string());
        }
        if to == ConvState::Transfer {
            ctx.transfer_requested = true;
        }
        if to == ConvState::Goodbye {
            match intent {
                UserIntent::Callback => ctx.callback_requested = true,
                UserIntent::Yes if from == ConvState::Closing => ctx.user_confirmed = true,
                UserIntent::No => {
                    ctx.end_reason.get_or_insert(EndReason::DeclinedEarly);
                }
                UserIntent::Uncertain | UserIntent::Objection => {
                    ctx.end_reason.get_or_insert(EndReason::ObjectionCap);
                }
                _ => {}
            }
        }
    }

    /// Fold the context into a terminal outcome.
    ///
    /// The ladder is ordered: provider failure trumps transfer, transfer
    /// trumps callback, and so on down to Unknown.
    pub fn determine_outcome(&self, ctx: &ConversationContext) -> ConversationOutcome {
        if ctx.llm_error_count >= self.limits.max_llm_errors {
            return ConversationOutcome::Error;
        }
        if ctx.transfer_requested {
            return ConversationOutcome::TransferToHuman;
        }
        if ctx.callback_requested {
            return ConversationOutcome::CallbackRequested;
        }
        if ctx.user_confirmed {
            return ConversationOutcome::Success;
        }
        match ctx.end_reason {
            Some(EndReason::DeclinedEarly) => ConversationOutcome::Declined,
            Some(EndReason::ObjectionCap) => ConversationOutcome::NotInterested,
            Some(EndReason::TurnCap) => ConversationOutcome::MaxTurnsReached,
            None => ConversationOutcome::Unknown,
        }
    }
}

fn rule(
    from: Option<ConvState>,
    intents: &'static [UserIntent],
    guard: Guard,
    to: ConvState,
) -> TransitionRule {
    TransitionRule {
        from,
        intents,
        guard,
        to,
    }
}

//! Call-outcome taxonomy and retry policy
//!
//! Every call attempt terminates in exactly one [`CallOutcome`], whether it
//! came from the conversation engine (the caller talked to the agent) or
//! from the carrier event path (busy, no answer, rejected). The taxonomy
//! partitions into retryable, non-retryable and goal outcomes, and
//! [`should_retry`] is the single decision point the worker consults.

use serde::{Deserialize, Serialize};

use crate::job::DialerJob;

/// Terminal classification of one call attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallOutcome {
    /// Campaign goal confirmed in conversation
    Success,
    /// Caller declined
    Declined,
    /// Objections exhausted
    NotInterested,
    /// Caller asked to be called back
    CallbackRequested,
    /// Caller was handed to a human
    TransferToHuman,
    /// Conversation hit its turn ceiling
    MaxTurnsReached,
    /// Provider failures ended the call
    Error,
    /// Conversation ended without a classifiable result
    Unknown,
    /// Call was answered (carrier-level)
    Answered,
    /// Nobody picked up
    NoAnswer,
    /// Line busy
    Busy,
    /// Carrier failed to connect the call
    Failed,
    /// Voicemail answered
    Voicemail,
    /// Number flagged as spam trap
    Spam,
    /// Number is invalid
    Invalid,
    /// Number unreachable
    Unavailable,
    /// Number disconnected
    Disconnected,
    /// Call actively rejected
    Rejected,
}

impl CallOutcome {
    /// Outcomes worth another attempt
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            CallOutcome::Busy | CallOutcome::NoAnswer | CallOutcome::Failed | CallOutcome::Voicemail
        )
    }

    /// Outcomes that permanently end attempts against this number
    pub fn is_non_retryable(self) -> bool {
        matches!(
            self,
            CallOutcome::Spam
                | CallOutcome::Invalid
                | CallOutcome::Unavailable
                | CallOutcome::Disconnected
                | CallOutcome::Rejected
        )
    }

    /// Outcomes that count as the campaign goal being reached
    pub fn is_goal(self) -> bool {
        matches!(self, CallOutcome::Success | CallOutcome::Answered)
    }

    /// Map a carrier webhook status string, if recognised.
    pub fn from_carrier_status(status: &str) -> Option<Self> {
        match status {
            "answered" | "completed" => Some(CallOutcome::Answered),
            "busy" => Some(CallOutcome::Busy),
            "timeout" | "unanswered" | "no_answer" => Some(CallOutcome::NoAnswer),
            "failed" => Some(CallOutcome::Failed),
            "machine" | "voicemail" => Some(CallOutcome::Voicemail),
            "rejected" => Some(CallOutcome::Rejected),
            "cancelled" => Some(CallOutcome::NoAnswer),
            "unavailable" => Some(CallOutcome::Unavailable),
            "disconnected" => Some(CallOutcome::Disconnected),
            "invalid" | "invalid_number" => Some(CallOutcome::Invalid),
            _ => None,
        }
    }
}

/// Decide whether a finished attempt earns another try.
///
/// Never retry a reached goal, a permanently dead number, or a job whose
/// attempt budget is spent; otherwise retry exactly the retryable set.
pub fn should_retry(job: &DialerJob, outcome: CallOutcome, max_retry_attempts: u32) -> bool {
    if outcome.is_goal() || outcome.is_non_retryable() {
        return false;
    }
    if job.attempt_number >= max_retry_attempts {
        return false;
    }
    outcome.is_retryable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::DialerJob;

    fn job_with_attempts(attempt_number: u32) -> DialerJob {
        let mut job = DialerJob::new(
            "tenant-1",
            "campaign-1",
            "lead-1",
            "+15551234567",
            5,
        );
        job.attempt_number = attempt_number;
        job
    }

    #[test]
    fn partitions_are_disjoint() {
        let all = [
            CallOutcome::Success,
            CallOutcome::Declined,
            CallOutcome::NotInterested,
            CallOutcome::CallbackRequested,
            CallOutcome::TransferToHuman,
            CallOutcome::MaxTurnsReached,
            CallOutcome::Error,
            CallOutcome::Unknown,
            CallOutcome::Answered,
            CallOutcome::NoAnswer,
            CallOutcome::Busy,
            CallOutcome::Failed,
            CallOutcome::Voicemail,
            CallOutcome::Spam,
            CallOutcome::Invalid,
            CallOutcome::Unavailable,
            CallOutcome::Disconnected,
            CallOutcome::Rejected,
        ];
        for outcome in all {
            let memberships = [
                outcome.is_retryable(),
                outcome.is_non_retryable(),
                outcome.is_goal(),
            ];
            assert!(
                memberships.iter().filter(|&&m| m).count() <= 1,
                "{:?} belongs to multiple partitions",
                outcome
            );
        }
    }

    #[test]
    fn retryable_outcomes_retry_under_budget() {
        for outcome in [
            CallOutcome::Busy,
            CallOutcome::NoAnswer,
            CallOutcome::Failed,
            CallOutcome::Voicemail,
        ] {
            assert!(should_retry(&job_with_attempts(1), outcome, 3));
        }
    }

    #[test]
    fn budget_exhaustion_stops_retries() {
        assert!(!should_retry(&job_with_attempts(3), CallOutcome::Busy, 3));
        assert!(!should_retry(&job_with_attempts(4), CallOutcome::Busy, 3));
    }

    #[test]
    fn goals_and_dead_numbers_never_retry() {
        assert!(!should_retry(&job_with_attempts(0), CallOutcome::Success, 3));
        assert!(!should_retry(&job_with_attempts(0), CallOutcome::Answered, 3));
        assert!(!should_retry(&job_with_attempts(0), CallOutcome::Rejected, 3));
        assert!(!should_retry(&job_with_attempts(0), CallOutcome::Spam, 3));
    }

    #[test]
    fn conversation_outcomes_do_not_retry() {
        assert!(!should_retry(&job_with_attempts(0), CallOutcome::Declined, 3));
        assert!(!should_retry(&job_with_attempts(0), CallOutcome::Unknown, 3));
    }

    #[test]
    fn carrier_status_mapping() {
        assert_eq!(
            CallOutcome::from_carrier_status("busy"),
            Some(CallOutcome::Busy)
        );
        assert_eq!(
            CallOutcome::from_carrier_status("rejected"),
            Some(CallOutcome::Rejected)
        );
        assert_eq!(
            CallOutcome::from_carrier_status("machine"),
            Some(CallOutcome::Voicemail)
        );
        assert_eq!(CallOutcome::from_carrier_status("ringing"), None);
    }
}

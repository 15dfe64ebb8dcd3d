//! Per-turn latency accounting
//!
//! The number that matters on a phone call is speech-end to first audio
//! back. Each turn records its stage boundaries; turns over budget are
//! flagged and counted but always kept, because slow turns are exactly
//! the ones worth examining.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

/// Stage boundaries for one conversational turn
#[derive(Debug, Clone)]
pub struct TurnLatency {
    /// Turn ordinal within the call
    pub turn_id: u32,
    /// Caller stopped speaking
    pub speech_end: Instant,
    /// Request sent to the language model
    pub llm_start: Option<Instant>,
    /// Last token received
    pub llm_end: Option<Instant>,
    /// Synthesis requested
    pub tts_start: Option<Instant>,
    /// First audio chunk handed to the gateway
    pub first_audio: Option<Instant>,
}

impl TurnLatency {
    /// Start measuring a turn at the caller's end of speech.
    pub fn begin(turn_id: u32) -> Self {
        Self {
            turn_id,
            speech_end: Instant::now(),
            llm_start: None,
            llm_end: None,
            tts_start: None,
            first_audio: None,
        }
    }

    /// Speech end to first audio, once both ends exist
    pub fn total(&self) -> Option<Duration> {
        self.first_audio.map(|t| t - self.speech_end)
    }

    /// Speech end to the LLM request
    pub fn to_llm_start(&self) -> Option<Duration> {
        self.llm_start.map(|t| t - self.speech_end)
    }

    /// LLM request to last token
    pub fn llm_duration(&self) -> Option<Duration> {
        match (self.llm_start, self.llm_end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Last token to synthesis start
    pub fn to_tts_start(&self) -> Option<Duration> {
        match (self.llm_end, self.tts_start) {
            (Some(end), Some(tts)) => Some(tts - end),
            _ => None,
        }
    }

    /// Synthesis start to first audio chunk
    pub fn tts_first_audio(&self) -> Option<Duration> {
        match (self.tts_start, self.first_audio) {
            (Some(tts), Some(audio)) => Some(audio - tts),
            _ => None,
        }
    }
}

/// Per-call latency aggregation.
pub struct LatencyTracker {
    call_id: String,
    budget: Duration,
    turns: Mutex<Vec<TurnLatency>>,
    over_budget: Mutex<u32>,
}

impl LatencyTracker {
    /// Track turns for one call against a budget.
    pub fn new(call_id: impl Into<String>, budget: Duration) -> Self {
        Self {
            call_id: call_id.into(),
            budget,
            turns: Mutex::new(Vec::new()),
            over_budget: Mutex::new(0),
        }
    }

    /// Record a finished turn, flagging budget violations.
    pub fn record(&self, turn: TurnLatency) {
        if let Some(total) = turn.total() {
            if total > self.budget {
                *self.over_budget.lock() += 1;
                warn!(
                    call_id = %self.call_id,
                    turn_id = turn.turn_id,
                    total_ms = total.as_millis() as u64,
                    budget_ms = self.budget.as_millis() as u64,
                    "turn exceeded latency budget"
                );
            }
        }
        self.turns.lock().push(turn);
    }

    /// Turns recorded so far
    pub fn turn_count(&self) -> usize {
        self.turns.lock().len()
    }

    /// Turns that blew the budget
    pub fn over_budget_count(&self) -> u32 {
        *self.over_budget.lock()
    }

    /// Mean total latency across turns that completed
    pub fn mean_total(&self) -> Option<Duration> {
        let turns = self.turns.lock();
        let totals: Vec<Duration> = turns.iter().filter_map(|t| t.total()).collect();
        if totals.is_empty() {
            return None;
        }
        Some(totals.iter().sum::<Duration>() / totals.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished_turn(turn_id: u32, total: Duration) -> TurnLatency {
        let speech_end = Instant::now() - total;
        TurnLatency {
            turn_id,
            speech_end,
            llm_start: Some(speech_end + total / 10),
            llm_end: Some(speech_end + total / 2),
            tts_start: Some(speech_end + total / 2),
            first_audio: Some(speech_end + total),
        }
    }

    #[test]
    fn stage_durations_compose() {
        let turn = finished_turn(1, Duration::from_millis(600));
        assert_eq!(turn.total(), Some(Duration::from_millis(600)));
        assert!(turn.to_llm_start().unwrap() <= turn.total().unwrap());
        assert!(turn.llm_duration().is_some());
        assert!(turn.tts_first_audio().is_some());
    }

    #[test]
    fn over_budget_turns_are_flagged_but_kept() {
        let tracker = LatencyTracker::new("call-1", Duration::from_millis(700));
        tracker.record(finished_turn(1, Duration::from_millis(400)));
        tracker.record(finished_turn(2, Duration::from_millis(900)));

        assert_eq!(tracker.turn_count(), 2);
        assert_eq!(tracker.over_budget_count(), 1);
    }

    #[test]
    fn unfinished_turn_has_no_total() {
        let turn = TurnLatency::begin(1);
        assert_eq!(turn.total(), None);

        let tracker = LatencyTracker::new("call-1", Duration::from_millis(700));
        tracker.record(turn);
        assert_eq!(tracker.over_budget_count(), 0);
        assert_eq!(tracker.mean_total(), None);
    }

    #[test]
    fn mean_total_averages_finished_turns() {
        let tracker = LatencyTracker::new("call-1", Duration::from_secs(10));
        tracker.record(finished_turn(1, Duration::from_millis(400)));
        tracker.record(finished_turn(2, Duration::from_millis(600)));
        let mean = tracker.mean_total().unwrap();
        assert!(mean >= Duration::from_millis(490) && mean <= Duration::from_millis(510));
    }
}

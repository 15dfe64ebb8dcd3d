//! Utterance intent classification
//!
//! Pattern-based classifier over final transcripts. Patterns are grouped
//! per intent and tried in a fixed priority order so that specific intents
//! shadow generic ones: "no, let me talk to a person" must classify as a
//! human-transfer request, not as a refusal. The first group with a match
//! wins; no match at all is `Unknown`.

use regex::RegexSet;

/// Classified caller intent for one utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserIntent {
    /// Affirmative
    Yes,
    /// Refusal
    No,
    /// Hedging, undecided
    Uncertain,
    /// A concern or pushback that can be handled
    Objection,
    /// Wants a human on the line
    RequestHuman,
    /// Wants more information
    RequestInfo,
    /// Social opening
    Greeting,
    /// Wants to end the call
    Goodbye,
    /// Wants to be called back later
    Callback,
    /// Nothing matched
    Unknown,
}

/// Classifier with compiled pattern groups in priority order.
pub struct IntentDetector {
    groups: Vec<(UserIntent, RegexSet)>,
}

impl IntentDetector {
    /// Build the default English classifier.
    pub fn new() -> Self {
        // Highest priority first; order is behaviour, not style.
        let groups = vec![
            (
                UserIntent::RequestHuman,
                &[
                    r"(?i)\b(real|actual|live)\s+(person|human|agent)\b",
                    r"(?i)\b(speak|talk)\s+(to|with)\s+(a\s+)?(person|human|someone|somebody|representative|manager|agent)\b",
                    r"(?i)\btransfer\s+me\b",
                    r"(?i)\bare\s+you\s+(a\s+)?(robot|bot|machine|computer|ai)\b",
                ][..],
            ),
            (
                UserIntent::Goodbye,
                &[
                    r"(?i)\b(good\s*bye|bye|hang\s+up|gotta\s+go|have\s+to\s+go|stop\s+calling)\b",
                    r"(?i)\b(don.?t|do\s+not)\s+call\s+(me\s+)?(again|anymore)\b",
                    r"(?i)\b(remove|take)\s+me\s+(off|from)\s+(your|the)\s+list\b",
                ][..],
            ),
            (
                UserIntent::Callback,
                &[
                    r"(?i)\bcall\s+(me\s+)?(back|later|tomorrow|another\s+time)\b",
                    r"(?i)\b(busy|driving|in\s+a\s+meeting)\s+(right\s+)?now\b",
                    r"(?i)\bnot\s+a\s+good\s+time\b",
                    r"(?i)\btry\s+(me\s+)?(again\s+)?(later|tomorrow)\b",
                ][..],
            ),
            (
                UserIntent::No,
                &[
                    r"(?i)^\s*(no|nope|nah|no\s+thanks|no\s+thank\s+you)\b",
                    r"(?i)\bnot\s+interested\b",
                    r"(?i)\bdefinitely\s+not\b",
                    r"(?i)\bi\s+(don.?t|do\s+not)\s+want\b",
                ][..],
            ),
            (
                UserIntent::Uncertain,
                &[
                    r"(?i)\b(maybe|perhaps|possibly)\b",
                    r"(?i)\b(not\s+sure|i.?m\s+unsure|i\s+guess)\b",
                    r"(?i)\b(let\s+me\s+think|need\s+to\s+think|have\s+to\s+think)\b",
                    r"(?i)\bi\s+(don.?t|do\s+not)\s+know\b",
                ][..],
            ),
            (
                UserIntent::Objection,
                &[
                    r"(?i)\b(too\s+expensive|costs?\s+too\s+much|can.?t\s+afford)\b",
                    r"(?i)\balready\s+(have|using|with)\b",
                    r"(?i)\b(why\s+should\s+i|what.?s\s+the\s+catch)\b",
                    r"(?i)\b(concern|worried|problem)\b",
                ][..],
            ),
            (
                UserIntent::Greeting,
                &[
                    r"(?i)^\s*(hello|hi|hey|good\s+(morning|afternoon|evening))\b",
                    r"(?i)\bwho\s+is\s+this\b",
                    r"(?i)\bspeaking\b",
                ][..],
            ),
            (
                UserIntent::Yes,
                &[
                    r"(?i)^\s*(yes|yeah|yep|yup|sure|absolutely|certainly|definitely|of\s+course)\b",
                    r"(?i)\bsounds\s+(good|great|fine)\b",
                    r"(?i)\bthat\s+works\b",
                    r"(?i)\bgo\s+ahead\b",
                    r"(?i)\bok(ay)?\b",
                ][..],
            ),
            (
                UserIntent::RequestInfo,
                &[
                    r"(?i)\b(tell|send)\s+me\s+more\b",
                    r"(?i)\bhow\s+(does|do|much|long)\b",
                    r"(?i)\bwhat\s+(is|are|do|does)\b",
                    r"(?i)\bmore\s+(details|information|info)\b",
                ][..],
            ),
        ];

        let compiled = groups
            .into_iter()
            .map(|(intent, patterns)| {
                let set = RegexSet::new(patterns).expect("intent patterns are static and valid");
                (intent, set)
            })
            .collect();

        Self { groups: compiled }
    }

    /// Classify one utterance.
    pub fn detect(&self, text: &str) -> UserIntent {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return UserIntent::Unknown;
        }
        for (intent, set) in &self.groups {
            if set.is_match(trimmed) {
                return *intent;
            }
        }
        UserIntent::Unknown
    }
}

impl Default for IntentDetector {
    fn default() -> Self {
        Self::new()
    }
}

//! State-conditional system prompt rendering
//!
//! Prompts compose in two layers: a base template parameterised by the
//! campaign (agent identity, goal, tone, hard rules) and a per-state
//! overlay that tells the model what this phase of the call is for. A
//! campaign can override the base template wholesale, adjust generation
//! parameters, and inject extra variables into the template namespace.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::convo::{ConvState, ConversationContext};

/// Variables available to the base template
#[derive(Debug, Clone)]
pub struct PromptVars {
    /// Name the agent introduces itself with
    pub agent_name: String,
    /// Company the agent represents
    pub company_name: String,
    /// What this campaign is trying to achieve
    pub goal_description: String,
    /// Conversational register, e.g. "warm and professional"
    pub tone: String,
    /// Response length ceiling in sentences
    pub max_sentences: u32,
    /// Objections the engine will address before giving up
    pub max_objections: u32,
    /// Phrases the agent must never produce
    pub do_not_say_rules: Vec<String>,
}

impl Default for PromptVars {
    fn default() -> Self {
        Self {
            agent_name: "Alex".to_string(),
            company_name: "the company".to_string(),
            goal_description: "have a helpful conversation".to_string(),
            tone: "warm, natural and professional".to_string(),
            max_sentences: 2,
            max_objections: 3,
            do_not_say_rules: Vec::new(),
        }
    }
}

/// Campaign-level prompt and generation overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignOverrides {
    /// Replaces the built-in base template entirely
    pub system_prompt: Option<String>,
    /// Replaces the Greeting overlay
    pub greeting: Option<String>,
    /// Appended compliance wording that must survive cleaning
    pub compliance_text: Option<String>,
    /// Sampling temperature override
    pub temperature: Option<f32>,
    /// Token ceiling override
    pub max_tokens: Option<u32>,
    /// Sentence ceiling override
    pub max_sentences: Option<u32>,
    /// Extra variables merged into the template namespace
    #[serde(default)]
    pub context_variables: HashMap<String, String>,
}

const BASE_TEMPLATE: &str = "\
You are {agent_name}, calling on behalf of {company_name}. \
Your goal: {goal_description}. \
Keep a {tone} tone. \
Respond in {max_sentences} sentences or fewer. \
Never use filler tokens. \
Do not open responses with a greeting.{do_not_say}";

/// Renders system prompts for a given campaign.
pub struct PromptManager {
    vars: PromptVars,
    overrides: CampaignOverrides,
}

impl PromptManager {
    /// Build a manager for one campaign.
    pub fn new(vars: PromptVars, overrides: CampaignOverrides) -> Self {
        Self { vars, overrides }
    }

    /// Effective sentence ceiling after overrides
    pub fn max_sentences(&self) -> u32 {
        self.overrides
            .max_sentences
            .unwrap_or(self.vars.max_sentences)
    }

    /// Effective temperature override, if any
    pub fn temperature(&self) -> Option<f32> {
        self.overrides.temperature
    }

    /// Effective token ceiling override, if any
    pub fn max_tokens(&self) -> Option<u32> {
        self.overrides.max_tokens
    }

    /// Render the full system prompt for the given state.
    pub fn render(&self, state: ConvState, ctx: &ConversationContext) -> String {
        let base = self.render_base();
        let overlay = self.render_overlay(state, ctx);
        let mut prompt = format!("{}\n\n{}", base, overlay);
        if let Some(compliance) = &self.overrides.compliance_text {
            prompt.push_str("\n\n");
            prompt.push_str(compliance);
        }
        prompt
    }

    fn render_base(&self) -> String {
        let template = self
            .overrides
            .system_prompt
            .as_deref()
            .unwrap_or(BASE_TEMPLATE);

        let do_not_say = if self.vars.do_not_say_rules.is_empty() {
            String::new()
        } else {
            format!(" Never say: {}.", self.vars.do_not_say_rules.join("; "))
        };

        let mut namespace: HashMap<&str, String> = HashMap::from([
            ("agent_name", self.vars.agent_name.clone()),
            ("company_name", self.vars.company_name.clone()),
            ("goal_description", self.vars.goal_description.clone()),
            ("tone", self.vars.tone.clone()),
            ("max_sentences", self.max_sentences().to_string()),
            ("do_not_say", do_not_say),
        ]);
        for (key, value) in &self.overrides.context_variables {
            namespace.insert(key.as_str(), value.clone());
        }

        substitute(template, &namespace)
    }

    fn render_overlay(&self, state: ConvState, ctx: &ConversationContext) -> String {
        match state {
            ConvState::Greeting => self
                .overrides
                .greeting
                .clone()
                .unwrap_or_else(|| {
                    "Open the call: confirm you are speaking with the right person \
                     and briefly state why you are calling."
                        .to_string()
                }),
            ConvState::Qualification => {
                "The caller is engaged. Work toward the goal with one clear question \
                 at a time."
                    .to_string()
            }
            ConvState::ObjectionHandling => format!(
                "The caller raised a concern: \"{}\". This is concern {} of {} you \
                 may address. Acknowledge it briefly and offer one concrete \
                 reassurance, then return to the goal.",
                ctx.last_user_concern.as_deref().unwrap_or("unspecified"),
                ctx.objection_count,
                self.vars.max_objections,
            ),
            ConvState::Closing => {
                "The caller is ready. Confirm the specifics plainly and ask for a \
                 final yes."
                    .to_string()
            }
            ConvState::Transfer => {
                "Tell the caller you are connecting them with a colleague now, in \
                 one sentence."
                    .to_string()
            }
            ConvState::Goodbye => {
                "Wrap up politely in one sentence and end the call.".to_string()
            }
        }
    }
}

/// Replace `{name}` placeholders from the namespace; unknown placeholders
/// are left verbatim so template typos are visible in QA transcripts.
fn substitute(template: &str, namespace: &HashMap<&str, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in namespace {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

//! Sends a single clarifying question back to the user.

use op_domain::message::Message;
use op_domain::state::{AgentName, ConversationState, StateDelta};

/// Fallback when the router produced no question text.
pub const DEFAULT_FOLLOWUP: &str = "Could you describe your request in a bit more detail?";

pub struct ClarifierAgent;

impl ClarifierAgent {
    /// The router populates `state.clarification.question` before
    /// dispatching here. Never calls an external capability.
    pub fn run(&self, state: &ConversationState) -> StateDelta {
        let question = state
            .clarification
            .question
            .clone()
            .unwrap_or_else(|| DEFAULT_FOLLOWUP.to_string());
        tracing::info!(%question, "asking for clarification");
        StateDelta {
            messages: vec![Message::agent(question)],
            active_agent: Some(AgentName::Clarifier),
            plan_step_index: Some(state.plan_step_index + 1),
            ..StateDelta::default()
        }
    }
}

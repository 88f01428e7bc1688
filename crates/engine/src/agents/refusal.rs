//! Fixed refusal for disallowed or off-topic requests.

use op_domain::message::Message;
use op_domain::state::{AgentName, Clarification, ConversationState, StateDelta};

/// The one refusal text, used for both destructive and irrelevant asks.
pub const REFUSAL_MESSAGE: &str = "I cannot help with this request as it is either unrelated to \
     observability analysis or could potentially harm the system. If you need \
     token/metrics/chart analysis, please be specific about your requirements.";

pub struct RefusalAgent;

impl RefusalAgent {
    /// Emit the refusal, clear the plan, and reset any pending
    /// clarification. The advanced cursor guarantees the router
    /// terminates on its next pass.
    pub fn run(&self, state: &ConversationState) -> StateDelta {
        tracing::info!("refusing request");
        StateDelta {
            messages: vec![Message::agent(REFUSAL_MESSAGE)],
            active_agent: Some(AgentName::Refusal),
            plan: Some(Vec::new()),
            plan_step_index: Some(state.plan_step_index + 1),
            clarification: Some(Clarification::default()),
            ..StateDelta::default()
        }
    }
}

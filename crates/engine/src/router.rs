//! The central dispatch decision: which node runs next.
//!
//! `route` is a pure decision over the state plus, on the final
//! classification branch only, one structured-generation call. Every
//! capability failure inside routing falls back to a safe default; the
//! router itself never returns an error and never touches the SQL or
//! chart capabilities.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use op_capabilities::{invoke_typed, StructuredGeneration, KNOWN_TABLES};
use op_domain::message::Message;
use op_domain::state::{
    AgentName, Clarification, ClarificationStatus, ConversationState, DiagnosticsContext,
    PlanMode, StateDelta,
};

use crate::diagnostics;

pub const DISALLOWED_KEYWORDS: [&str; 8] = [
    "delete", "drop", "destroy", "truncate", "wipe", "shutdown", "disable", "attack",
];

pub const ANALYTICS_KEYWORDS: [&str; 11] = [
    "latency",
    "delay",
    "token",
    "metric",
    "data",
    "run",
    "agent",
    "tool",
    "chart",
    "graph",
    "observability",
];

pub const CHART_KEYWORDS: [&str; 8] = [
    "chart",
    "graph",
    "plot",
    "visualize",
    "bar chart",
    "line chart",
    "pie chart",
    "visualization",
];

/// Question used when the clarifying-question capability call fails.
pub const DEFAULT_CLARIFYING_QUESTION: &str =
    "Which table should I look at: agent_runs, call_model, call_tool, or call_chain?";

#[derive(Debug, Deserialize)]
struct RoutingDecision {
    agent: String,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct ClarifyingQuestion {
    question: String,
}

fn routing_decision_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "agent": {
                "type": "string",
                "enum": ["planner", "metrics_agent", "chart_agent"],
                "description": "Agent to handle this request"
            },
            "reasoning": {
                "type": "string",
                "description": "Brief explanation of why this agent was chosen"
            }
        },
        "required": ["agent", "reasoning"],
        "additionalProperties": false
    })
}

fn clarifying_question_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "question": {
                "type": "string",
                "description": "One short question asking which table to analyze"
            }
        },
        "required": ["question"],
        "additionalProperties": false
    })
}

const ROUTING_INSTRUCTIONS: &str = "\
You are a routing agent for an observability system.

CRITICAL RULES:
- If the user explicitly mentions \"chart\", \"graph\", \"visualize\", or \"plot\"
  and recent data rows exist, choose chart_agent; with no recent data, route to
  planner so it can fetch data then visualize.
- Use planner whenever the user clearly asks for multiple actions or you are
  unsure which agent should go first.
- Otherwise choose metrics_agent for straightforward data questions.

Available agents:
1. planner: for multi-step or ambiguous requests; produces a plan the system executes.
2. metrics_agent: for data queries (DEFAULT). Analytics, listing data, SQL questions.
3. chart_agent: for visualization requests ONLY, when data already exists.

Return your decision with reasoning.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Router {
    structured: Arc<dyn StructuredGeneration>,
    default_window_hours: u32,
}

impl Router {
    pub fn new(structured: Arc<dyn StructuredGeneration>, default_window_hours: u32) -> Self {
        Self {
            structured,
            default_window_hours,
        }
    }

    /// Pick the next node. Decision order, each rule precluding the rest:
    /// fatal error, plan advance, plan exhausted, non-plan completion,
    /// then classification of the latest human message.
    pub async fn route(&self, state: &ConversationState) -> (AgentName, StateDelta) {
        if state.has_error {
            tracing::warn!("fatal error flag set, terminating turn");
            return (AgentName::Complete, StateDelta::terminal());
        }

        if !state.plan.is_empty() && state.plan_step_index < state.plan.len() {
            let step = &state.plan[state.plan_step_index];
            let agent = AgentName::parse(&step.agent).unwrap_or(AgentName::Metrics);
            tracing::info!(
                step = state.plan_step_index + 1,
                of = state.plan.len(),
                agent = %agent,
                objective = %step.objective,
                "advancing plan"
            );
            let delta = StateDelta {
                active_agent: Some(agent),
                ..StateDelta::default()
            };
            return (agent, delta);
        }

        if !state.plan.is_empty() && state.plan_step_index >= state.plan.len() {
            tracing::debug!("plan exhausted, terminating");
            return (AgentName::Complete, StateDelta::terminal());
        }

        if state.plan.is_empty() && state.plan_step_index > 0 {
            tracing::debug!("agent signaled completion, terminating");
            return (AgentName::Complete, StateDelta::terminal());
        }

        let Some(text) = state.last_human_text().map(str::to_owned) else {
            tracing::warn!("no human message to classify, defaulting to metrics agent");
            return (AgentName::Metrics, StateDelta::default());
        };

        self.classify(state, &text).await
    }

    /// Rules 5a-5f: refusal keywords, clarification lifecycle, diagnostics
    /// intent, chart keyword shortcut, then the structured routing call.
    async fn classify(&self, state: &ConversationState, text: &str) -> (AgentName, StateDelta) {
        let lowered = text.to_lowercase();

        if DISALLOWED_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            tracing::info!("disallowed request detected, refusing");
            return (AgentName::Refusal, StateDelta::default());
        }
        if !ANALYTICS_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            tracing::info!("request is unrelated to observability, refusing");
            return (AgentName::Refusal, StateDelta::default());
        }

        if state.clarification.status == ClarificationStatus::Pending {
            return self.resume_clarification(state, text).await;
        }

        self.classify_resolved(state, text, None).await
    }

    /// The request text is settled (either the raw message or a merged
    /// resolved query); run diagnostics/chart/structured classification.
    async fn classify_resolved(
        &self,
        state: &ConversationState,
        text: &str,
        carried: Option<StateDelta>,
    ) -> (AgentName, StateDelta) {
        let lowered = text.to_lowercase();
        let mut delta = carried.unwrap_or_default();

        if diagnostics::is_diagnostics_intent(text) {
            let window = diagnostics::parse_window_hours(text).unwrap_or(self.default_window_hours);
            let ctx = DiagnosticsContext {
                target_metric: diagnostics::infer_target_metric(text),
                baseline_window_hours: window,
                recent_window_hours: window,
                results: Vec::new(),
            };
            tracing::info!(
                metric = ctx.target_metric.as_str(),
                window_hours = window,
                "entering diagnostics mode"
            );
            delta.plan_mode = Some(PlanMode::Diagnostics);
            delta.diagnostics = Some(ctx);
            return (AgentName::Planner, delta);
        }

        if let Some(keyword) = CHART_KEYWORDS.iter().find(|k| lowered.contains(*k)) {
            if !state.last_rows.is_empty() {
                tracing::info!(keyword, "chart keyword with cached rows, dispatching chart agent");
                return (AgentName::Chart, delta);
            }
            tracing::info!(keyword, "chart keyword but no cached rows, planning data fetch first");
            return (AgentName::Planner, delta);
        }

        if mentions_generic_table(&lowered) {
            return self.open_clarification(text, delta).await;
        }

        let agent = self.classify_structured(state).await;
        (agent, delta)
    }

    /// An analytics request talks about "tables" without naming one of the
    /// known four: ask which one before generating SQL.
    async fn open_clarification(
        &self,
        text: &str,
        mut delta: StateDelta,
    ) -> (AgentName, StateDelta) {
        let messages = vec![
            Message::system(
                "The user wants table analytics but did not name a table. Known tables: \
                 agent_runs, call_model, call_tool, call_chain. Write one short clarifying \
                 question asking which of these to analyze.",
            ),
            Message::human(text),
        ];
        let question = match invoke_typed::<ClarifyingQuestion>(
            self.structured.as_ref(),
            &messages,
            &clarifying_question_schema(),
        )
        .await
        {
            Ok(resp) => resp.question,
            Err(err) => {
                tracing::warn!(error = %err, "clarifying-question call failed, using default");
                DEFAULT_CLARIFYING_QUESTION.to_string()
            }
        };

        tracing::info!("request is missing a table name, asking for clarification");
        delta.clarification = Some(Clarification {
            status: ClarificationStatus::Pending,
            question: Some(question),
            original_user_message: Some(text.to_string()),
            resolved_query: None,
            hints: KNOWN_TABLES.iter().map(|t| t.to_string()).collect(),
            required_detail: Some("table".into()),
        });
        (AgentName::Clarifier, delta)
    }

    /// A clarifying question is pending: the latest turn must supply the
    /// missing table name. Re-prompt if it still does not; otherwise merge
    /// the original request with the answer and classify the merged query.
    async fn resume_clarification(
        &self,
        state: &ConversationState,
        text: &str,
    ) -> (AgentName, StateDelta) {
        let lowered = text.to_lowercase();
        if !KNOWN_TABLES.iter().any(|t| lowered.contains(t)) {
            tracing::info!("clarification answer still missing a table name, re-asking");
            return (AgentName::Clarifier, StateDelta::default());
        }

        let original = state
            .clarification
            .original_user_message
            .clone()
            .unwrap_or_default();
        let resolved = if original.is_empty() {
            text.to_string()
        } else {
            format!("{original} ({text})")
        };
        tracing::info!(query = %resolved, "clarification resolved");

        let mut clarification = state.clarification.clone();
        clarification.status = ClarificationStatus::Resolved;
        clarification.resolved_query = Some(resolved.clone());
        let delta = StateDelta {
            clarification: Some(clarification),
            ..StateDelta::default()
        };
        self.classify_resolved(state, &resolved, Some(delta)).await
    }

    /// Rule 5f: the structured classification call over the full message
    /// history. Any failure defaults to the metrics agent.
    async fn classify_structured(&self, state: &ConversationState) -> AgentName {
        let context_hint = Message::system(format!(
            "Context: last_rows_available={}. This flag only indicates whether recent data \
             rows exist; unless the user explicitly asks for a chart, favor metrics_agent. \
             When the request clearly requires multiple actions, call the planner.",
            !state.last_rows.is_empty()
        ));
        let mut messages = vec![context_hint, Message::system(ROUTING_INSTRUCTIONS)];
        messages.extend(state.messages.iter().cloned());

        match invoke_typed::<RoutingDecision>(
            self.structured.as_ref(),
            &messages,
            &routing_decision_schema(),
        )
        .await
        {
            Ok(decision) => {
                tracing::info!(agent = %decision.agent, reasoning = %decision.reasoning, "routed");
                match AgentName::parse(&decision.agent) {
                    Some(
                        agent @ (AgentName::Planner | AgentName::Metrics | AgentName::Chart),
                    ) => agent,
                    _ => AgentName::Metrics,
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "routing call failed, defaulting to metrics agent");
                AgentName::Metrics
            }
        }
    }
}

/// True when the request speaks about tables generically without naming
/// one of the four known tables.
fn mentions_generic_table(lowered: &str) -> bool {
    let names_known = KNOWN_TABLES.iter().any(|t| lowered.contains(t));
    !names_known && lowered.contains("table")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_table_mentions() {
        assert!(mentions_generic_table("show me the data in that table"));
        assert!(!mentions_generic_table("show me the agent_runs table data"));
        assert!(!mentions_generic_table("show me run latency"));
    }
}

//! Decomposes a request into an ordered list of agent-tagged steps.
//!
//! Diagnostics turns get the fixed four-step comparison plan; everything
//! else goes through structured generation with a deterministic fallback
//! when the call fails or returns an invalid plan.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use op_capabilities::{invoke_typed, StructuredGeneration};
use op_domain::message::Message;
use op_domain::state::{AgentName, ConversationState, PlanMode, PlanStep, StateDelta};

use crate::diagnostics;
use crate::router::CHART_KEYWORDS;

#[derive(Debug, Deserialize)]
struct PlannerResponse {
    summary: String,
    steps: Vec<PlanStep>,
}

fn planner_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "summary": {
                "type": "string",
                "description": "High-level description of the plan"
            },
            "steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "step_number": { "type": "integer", "description": "1-based ordering" },
                        "agent": {
                            "type": "string",
                            "enum": ["metrics_agent", "chart_agent"],
                            "description": "Agent that executes this step"
                        },
                        "objective": { "type": "string" },
                        "input_context": { "type": "string" },
                        "success_criteria": { "type": "string" }
                    },
                    "required": [
                        "step_number", "agent", "objective",
                        "input_context", "success_criteria"
                    ],
                    "additionalProperties": false
                }
            }
        },
        "required": ["summary", "steps"],
        "additionalProperties": false
    })
}

const PLANNER_INSTRUCTIONS: &str = "\
You are a planning agent for an observability analytics assistant.
Break the user's goal into clear steps using the available agents.
Rules:
- Only use these agents: metrics_agent, chart_agent.
- metrics_agent knows how to fetch schema, run SQL, and prepare chart data.
- chart_agent relies on the latest rows produced by metrics_agent.
- Always order steps logically (metrics before chart when data is needed).
- Every step MUST include step_number, agent, objective, input_context, success_criteria.
- step_number must start at 1 and increment by 1.
- Be explicit about the precise data or chart requirements.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Planner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Planner {
    structured: Arc<dyn StructuredGeneration>,
}

impl Planner {
    pub fn new(structured: Arc<dyn StructuredGeneration>) -> Self {
        Self { structured }
    }

    /// Produce the plan delta: the steps, a reset cursor, and one
    /// narrative message describing what will run.
    pub async fn plan(&self, state: &ConversationState) -> StateDelta {
        if state.plan_mode == PlanMode::Diagnostics {
            let steps = diagnostics::diagnostics_plan(&state.diagnostics);
            let text = format_plan_text("Diagnostics window comparison.", &steps);
            return plan_delta(steps, text);
        }

        let mut messages = vec![Message::system(PLANNER_INSTRUCTIONS)];
        messages.extend(state.messages.iter().cloned());

        let (steps, summary) = match invoke_typed::<PlannerResponse>(
            self.structured.as_ref(),
            &messages,
            &planner_schema(),
        )
        .await
        {
            Ok(resp) if is_valid_plan(&resp.steps) => (resp.steps, resp.summary),
            Ok(resp) => {
                tracing::warn!(
                    steps = resp.steps.len(),
                    "planner returned an invalid plan, using fallback"
                );
                (fallback_plan(state), "Fallback plan.".to_string())
            }
            Err(err) => {
                tracing::warn!(error = %err, "planner call failed, using fallback");
                (fallback_plan(state), "Fallback plan.".to_string())
            }
        };

        let text = format_plan_text(&summary, &steps);
        plan_delta(steps, text)
    }
}

fn plan_delta(steps: Vec<PlanStep>, text: String) -> StateDelta {
    tracing::info!(steps = steps.len(), "plan ready");
    StateDelta {
        messages: vec![Message::agent(text)],
        active_agent: Some(AgentName::Planner),
        plan: Some(steps),
        plan_step_index: Some(0),
        ..StateDelta::default()
    }
}

/// Non-empty, all five fields populated, step numbers 1..n contiguous.
fn is_valid_plan(steps: &[PlanStep]) -> bool {
    !steps.is_empty()
        && steps.iter().enumerate().all(|(i, step)| {
            step.step_number as usize == i + 1
                && !step.agent.trim().is_empty()
                && !step.objective.trim().is_empty()
        })
}

/// Deterministic fallback: one metrics-retrieval step, plus a chart step
/// when the latest human message asks for a visualization.
fn fallback_plan(state: &ConversationState) -> Vec<PlanStep> {
    let needs_chart = state
        .last_human_text()
        .map(|text| {
            let lowered = text.to_lowercase();
            CHART_KEYWORDS.iter().any(|k| lowered.contains(k))
        })
        .unwrap_or(false);

    let mut steps = vec![PlanStep {
        step_number: 1,
        agent: AgentName::Metrics.as_str().into(),
        objective: "Retrieve or compute the data needed to answer the user's request.".into(),
        input_context: "Read the latest user question, inspect the schema, and generate the \
                        necessary SQL."
            .into(),
        success_criteria: "SQL executes successfully and rows are available for follow-up steps."
            .into(),
    }];

    if needs_chart {
        steps.push(PlanStep {
            step_number: 2,
            agent: AgentName::Chart.as_str().into(),
            objective: "Visualize the most recent metrics output as requested by the user.".into(),
            input_context: "Use the last rows produced by the metrics agent to build the chart."
                .into(),
            success_criteria: "Chart specification reflects the user's visualization requirements."
                .into(),
        });
    }

    steps
}

fn format_plan_text(summary: &str, steps: &[PlanStep]) -> String {
    let mut lines = vec![format!("**Planner Summary:** {summary}"), String::new()];
    lines.push("**Execution Plan:**".into());
    for step in steps {
        lines.push(format!(
            "{}. [{}] {}\n   - Input: {}\n   - Success: {}",
            step.step_number, step.agent, step.objective, step.input_context, step.success_criteria
        ));
    }
    lines.join("\n")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u32) -> PlanStep {
        PlanStep {
            step_number: n,
            agent: "metrics_agent".into(),
            objective: "fetch".into(),
            input_context: "ctx".into(),
            success_criteria: "rows".into(),
        }
    }

    #[test]
    fn plan_validation_requires_contiguous_numbers() {
        assert!(is_valid_plan(&[step(1), step(2)]));
        assert!(!is_valid_plan(&[]));
        assert!(!is_valid_plan(&[step(1), step(3)]));
        assert!(!is_valid_plan(&[step(2)]));

        let mut blank_agent = step(1);
        blank_agent.agent = " ".into();
        assert!(!is_valid_plan(&[blank_agent]));
    }

    #[test]
    fn fallback_appends_chart_step_on_chart_keyword() {
        let state = ConversationState::new("draw a bar chart of tool latency");
        let steps = fallback_plan(&state);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].agent, "metrics_agent");
        assert_eq!(steps[1].agent, "chart_agent");

        let state = ConversationState::new("list the slowest runs");
        assert_eq!(fallback_plan(&state).len(), 1);
    }
}

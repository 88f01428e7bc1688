//! Turns the most recent result rows into a chart specification.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use op_capabilities::{invoke_typed, StructuredGeneration};
use op_domain::config::EngineConfig;
use op_domain::message::Message;
use op_domain::state::{AgentName, ConversationState, Row, StateDelta};

use crate::chart::prepare_chart_data;

#[derive(Debug, Deserialize)]
struct ChartSpecResponse {
    chart_type: String,
    x_field: String,
    y_field: String,
    #[serde(default)]
    data: Vec<Row>,
    #[serde(default)]
    reasoning: String,
}

fn chart_spec_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "chart_type": {
                "type": "string",
                "description": "Type of chart: 'bar', 'line', 'scatter', 'pie', etc."
            },
            "x_field": { "type": "string", "description": "Field name for the x-axis" },
            "y_field": { "type": "string", "description": "Field name for the y-axis" },
            "data": {
                "type": "array",
                "items": { "type": "object" },
                "description": "Data rows for the chart"
            },
            "reasoning": {
                "type": "string",
                "description": "Why this chart type and these fields were chosen"
            }
        },
        "required": ["chart_type", "x_field", "y_field", "data", "reasoning"],
        "additionalProperties": false
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ChartAgent {
    structured: Arc<dyn StructuredGeneration>,
    cfg: EngineConfig,
}

impl ChartAgent {
    pub fn new(structured: Arc<dyn StructuredGeneration>, cfg: EngineConfig) -> Self {
        Self { structured, cfg }
    }

    /// With no cached rows this emits guidance and still advances the
    /// cursor (non-fatal). Otherwise it prepares chart-friendly rows and
    /// asks for a `{chart_type, x_field, y_field, data}` specification.
    pub async fn run(&self, state: &ConversationState) -> StateDelta {
        if state.last_rows.is_empty() {
            tracing::info!("no rows available to chart");
            return StateDelta {
                messages: vec![Message::agent(
                    "I don't have any recent data rows to visualize. Please first ask me \
                     for some metrics or a table of rows, then I can turn that into a chart.",
                )],
                active_agent: Some(AgentName::Chart),
                plan_step_index: Some(state.plan_step_index + 1),
                ..StateDelta::default()
            };
        }

        let prepared = prepare_chart_data(&state.last_rows, self.cfg.chart_max_rows);
        let step = state.plan.get(state.plan_step_index);

        let mut request = format!(
            "User request: {}\n\nPrepared data rows: {}\n\nChart metadata: {}",
            state.last_human_text().unwrap_or_default(),
            serde_json::to_string(&prepared.rows).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&prepared.metadata).unwrap_or_else(|_| "{}".into()),
        );
        if let Some(step) = step {
            request.push_str(&format!(
                "\n\nPlanner objective: {}\nContext: {}\nSuccess criteria: {}",
                step.objective, step.input_context, step.success_criteria
            ));
        }
        let messages = vec![
            Message::system(
                "You are a visualization agent. Given the user's request and a list of data \
                 rows, return the chart type, the x and y field names, the data rows to \
                 plot, and brief reasoning.",
            ),
            Message::human(request),
        ];

        let fallback_chart = prepared
            .metadata
            .get("suggested_chart")
            .and_then(|v| v.as_str())
            .unwrap_or("bar")
            .to_string();

        let (chart_type, x_field, y_field, data, reasoning) = match invoke_typed::<ChartSpecResponse>(
            self.structured.as_ref(),
            &messages,
            &chart_spec_schema(),
        )
        .await
        {
            Ok(resp) => {
                let data = if resp.data.is_empty() {
                    prepared.rows.clone()
                } else {
                    resp.data
                };
                (resp.chart_type, resp.x_field, resp.y_field, data, resp.reasoning)
            }
            Err(err) => {
                tracing::warn!(error = %err, "chart spec call failed, using prepared defaults");
                (
                    fallback_chart,
                    "label".to_string(),
                    "value".to_string(),
                    prepared.rows.clone(),
                    "Derived from the prepared rows without model input.".to_string(),
                )
            }
        };

        let row_count = data.len();
        let chart_spec = json!({
            "chartType": chart_type,
            "xField": x_field,
            "yField": y_field,
            "data": data,
        });
        tracing::info!(chart_type = %chart_spec["chartType"], rows = row_count, "chart spec ready");

        let content = format!(
            "**Reasoning:** {reasoning}\n\n```json\n{}\n```",
            serde_json::to_string_pretty(&chart_spec).unwrap_or_else(|_| "{}".into())
        );
        let message = Message::agent(content).with_metadata(json!({
            "agent": AgentName::Chart.as_str(),
            "chart_spec": chart_spec,
            "source_metadata": prepared.metadata,
        }));

        StateDelta {
            messages: vec![message],
            active_agent: Some(AgentName::Chart),
            chart_context: Some(prepared),
            plan_step_index: Some(state.plan_step_index + 1),
            ..StateDelta::default()
        }
    }
}

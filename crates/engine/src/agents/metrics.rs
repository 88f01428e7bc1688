//! Text2SQL analytics with a bounded validate-execute-repair loop.
//!
//! One step: generate SQL, normalize and statically check it, execute it
//! read-only, and repair on failure with the concrete error fed back to
//! generation. The generation capability is invoked at most
//! `max_sql_attempts` times per step, repairs included.

use serde::Deserialize;
use serde_json::{json, Value};

use op_capabilities::{invoke_typed, SqlResult};
use op_domain::config::EngineConfig;
use op_domain::error::Result;
use op_domain::message::Message;
use op_domain::state::{
    AgentName, ConversationState, DiagnosticsResult, PlanMode, PlanStep, Row, StateDelta,
};

use crate::chart::prepare_chart_data;
use crate::diagnostics;
use crate::sql;
use crate::CapabilitySet;

#[derive(Debug, Deserialize)]
struct SqlGeneration {
    sql_query: String,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct ResultSummary {
    summary: String,
}

fn sql_generation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "sql_query": {
                "type": "string",
                "description": "The generated SQL query to execute"
            },
            "reasoning": {
                "type": "string",
                "description": "Brief explanation of why this SQL query was chosen"
            }
        },
        "required": ["sql_query", "reasoning"],
        "additionalProperties": false
    })
}

fn summary_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "summary": {
                "type": "string",
                "description": "Human-readable summary of the SQL query results"
            },
            "reasoning": {
                "type": "string",
                "description": "Brief explanation of how the results were interpreted"
            }
        },
        "required": ["summary", "reasoning"],
        "additionalProperties": false
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MetricsAgent {
    caps: CapabilitySet,
    cfg: EngineConfig,
}

enum AttemptOutcome {
    Success {
        executed_sql: String,
        reasoning: String,
        result: SqlResult,
    },
    Exhausted {
        last_sql: String,
        last_error: String,
    },
}

impl MetricsAgent {
    pub fn new(caps: CapabilitySet, cfg: EngineConfig) -> Self {
        Self { caps, cfg }
    }

    pub async fn run(&self, state: &ConversationState) -> Result<StateDelta> {
        let schema = self.caps.schema.describe_schema().await?;
        let step = state.plan.get(state.plan_step_index);
        let step_name = step
            .filter(|_| state.plan_mode == PlanMode::Diagnostics)
            .and_then(|s| diagnostics::step_name_from_context(&s.input_context));

        let request = self.build_request(state, &schema, step, step_name);

        match self.generate_and_execute(&request).await {
            AttemptOutcome::Exhausted {
                last_sql,
                last_error,
            } => Ok(self.exhausted_delta(state, &last_sql, &last_error)),
            AttemptOutcome::Success {
                executed_sql,
                reasoning,
                result,
            } => {
                Ok(self
                    .success_delta(state, step, step_name, executed_sql, reasoning, result)
                    .await)
            }
        }
    }

    /// The system message for SQL generation: instructions, schema, and
    /// any planner or diagnostics goal for the current step.
    fn build_request(
        &self,
        state: &ConversationState,
        schema: &str,
        step: Option<&PlanStep>,
        step_name: Option<&str>,
    ) -> Vec<Message> {
        let mut instructions = format!(
            "You are an expert observability & SQL analytics agent.\n\
             Convert the user's question into a single safe SQL query.\n\
             The query MUST be read-only (SELECT only) and MUST include a LIMIT \
             when selecting rows.\n\n\
             Database schema:\n{schema}"
        );
        if let Some(step) = step {
            instructions.push_str(&format!(
                "\n\nPlanner objective: {}\nContext: {}\nSuccess criteria: {}",
                step.objective, step.input_context, step.success_criteria
            ));
        }
        if let Some(goal) = step_name.and_then(|n| diagnostics::sql_goal(n, &state.diagnostics)) {
            instructions.push_str(&format!("\n\nComparison goal for this step: {goal}"));
        }

        let mut messages = vec![Message::system(instructions)];
        messages.extend(state.messages.iter().cloned());
        messages
    }

    /// The bounded loop: each iteration is one generation call followed by
    /// normalize, static checks, and execution. Validation and execution
    /// failures share the same "last error" feedback channel.
    async fn generate_and_execute(&self, request: &[Message]) -> AttemptOutcome {
        let mut last_sql = String::new();
        let mut last_error = String::new();

        for attempt in 1..=self.cfg.max_sql_attempts {
            let messages = if attempt == 1 {
                request.to_vec()
            } else {
                let mut repair = request.to_vec();
                repair.push(Message::system(format!(
                    "The previous SQL attempt failed.\nSQL:\n{last_sql}\nError: {last_error}\n\
                     Produce a corrected SELECT-only query that avoids this error."
                )));
                repair
            };

            let generated = match invoke_typed::<SqlGeneration>(
                self.caps.structured.as_ref(),
                &messages,
                &sql_generation_schema(),
            )
            .await
            {
                Ok(generated) => generated,
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "sql generation call failed");
                    last_error = format!("generation failed: {err}");
                    continue;
                }
            };

            let normalized = sql::normalize(&generated.sql_query);
            if let Err(check) = sql::validate(&normalized) {
                tracing::warn!(attempt, sql = %normalized, error = %check, "sql rejected");
                last_sql = normalized;
                last_error = check.to_string();
                continue;
            }

            let (bounded, auto_limit) = sql::ensure_limit(&normalized, self.cfg.default_row_limit);
            if auto_limit {
                tracing::debug!(limit = self.cfg.default_row_limit, "appended default row limit");
            }

            match self.caps.sql.execute(&bounded).await {
                Ok(result) => {
                    tracing::info!(attempt, rows = result.rows.len(), "sql executed");
                    return AttemptOutcome::Success {
                        executed_sql: bounded,
                        reasoning: generated.reasoning,
                        result,
                    };
                }
                Err(err) => {
                    tracing::warn!(attempt, sql = %bounded, error = %err, "sql execution failed");
                    last_sql = bounded;
                    last_error = err.to_string();
                }
            }
        }

        AttemptOutcome::Exhausted {
            last_sql,
            last_error,
        }
    }

    /// Non-fatal failure: tell the user, mark the step attempted, move on.
    fn exhausted_delta(
        &self,
        state: &ConversationState,
        last_sql: &str,
        last_error: &str,
    ) -> StateDelta {
        let attempts = self.cfg.max_sql_attempts;
        let content = if last_sql.is_empty() {
            format!(
                "I could not generate a working SQL query after {attempts} attempts. \
                 Last error: {last_error}. You can rephrase the question and try again."
            )
        } else {
            format!(
                "I could not get a working SQL query after {attempts} attempts.\n\
                 Last SQL tried:\n```sql\n{last_sql}\n```\nLast error: {last_error}\n\
                 You can rephrase the question and try again."
            )
        };
        StateDelta {
            messages: vec![Message::agent(content)],
            active_agent: Some(AgentName::Metrics),
            plan_step_index: Some(state.plan_step_index + 1),
            ..StateDelta::default()
        }
    }

    async fn success_delta(
        &self,
        state: &ConversationState,
        step: Option<&PlanStep>,
        step_name: Option<&str>,
        executed_sql: String,
        reasoning: String,
        result: SqlResult,
    ) -> StateDelta {
        let rows = rows_to_mappings(&result);
        let chart_context = prepare_chart_data(&rows, self.cfg.chart_max_rows);

        let mut next_index = state.plan_step_index + 1;
        let mut diagnostics_ctx = None;
        if let Some(name) = step_name {
            let mut ctx = state.diagnostics.clone();
            ctx.results.push(DiagnosticsResult {
                name: name.to_string(),
                description: step.map(|s| s.objective.clone()).unwrap_or_default(),
                rows: rows.clone(),
            });
            // An empty overall comparison means the window pair has nothing
            // to attribute; jump straight to the summary step.
            if name == diagnostics::STEP_OVERALL && rows.is_empty() && !state.plan.is_empty() {
                tracing::info!("overall diagnostics step returned no rows, skipping to summary");
                next_index = state.plan.len() - 1;
            }
            diagnostics_ctx = Some(ctx);
        }

        let summary = self.summarize(state, &executed_sql, &rows).await;

        let sql_message = Message::agent(format!(
            "**Reasoning:** {}\n\n```sql\n{executed_sql}\n```",
            if reasoning.is_empty() {
                "Generated a query for the request."
            } else {
                reasoning.as_str()
            }
        ))
        .with_metadata(json!({
            "agent": AgentName::Metrics.as_str(),
            "sql_metadata": result.metadata,
        }));

        StateDelta {
            messages: vec![sql_message, Message::agent(summary)],
            active_agent: Some(AgentName::Metrics),
            last_rows: Some(rows),
            chart_context: Some(chart_context),
            plan_step_index: Some(next_index),
            diagnostics: diagnostics_ctx,
            ..StateDelta::default()
        }
    }

    /// Second structured call: interpret the rows for the user. Falls back
    /// to a deterministic enumeration when the capability call fails.
    async fn summarize(&self, state: &ConversationState, executed_sql: &str, rows: &[Row]) -> String {
        let question = state.last_human_text().unwrap_or_default();
        let rows_json = serde_json::to_string(rows).unwrap_or_else(|_| "[]".into());

        let messages = vec![
            Message::system(
                "You are an observability analyst. Summarize the SQL results clearly for the \
                 user. If it is a ranking, mention the top entries. When multiple rows are \
                 returned, enumerate them with numbers (1., 2., ...) so the user can refer to \
                 a row later. You may suggest follow-up questions.",
            ),
            Message::human(format!(
                "User question: {question}\n\nExecuted SQL:\n{executed_sql}\n\nResult rows:\n{rows_json}"
            )),
        ];

        match invoke_typed::<ResultSummary>(
            self.caps.structured.as_ref(),
            &messages,
            &summary_schema(),
        )
        .await
        {
            Ok(resp) => resp.summary,
            Err(err) => {
                tracing::warn!(error = %err, "summary call failed, using plain enumeration");
                fallback_summary(rows)
            }
        }
    }
}

/// Columnar result → ordered field→value mappings, one per row.
fn rows_to_mappings(result: &SqlResult) -> Vec<Row> {
    result
        .rows
        .iter()
        .map(|values| {
            result
                .columns
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect()
        })
        .collect()
}

fn fallback_summary(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "The query returned no rows.".into();
    }
    let mut lines = vec![format!("The query returned {} row(s):", rows.len())];
    for (idx, row) in rows.iter().enumerate() {
        let fields: Vec<String> = row.iter().map(|(k, v)| format!("{k}={v}")).collect();
        lines.push(format!("{}. {}", idx + 1, fields.join(", ")));
    }
    lines.join("\n")
}

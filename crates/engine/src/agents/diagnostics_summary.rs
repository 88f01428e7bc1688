//! Narrates the root-cause evidence collected by the diagnostics steps.

use std::sync::Arc;

use op_capabilities::TextGeneration;
use op_domain::config::EngineConfig;
use op_domain::message::Message;
use op_domain::state::{AgentName, ConversationState, DiagnosticsResult, StateDelta};

pub struct DiagnosticsSummaryAgent {
    text: Arc<dyn TextGeneration>,
    cfg: EngineConfig,
}

impl DiagnosticsSummaryAgent {
    pub fn new(text: Arc<dyn TextGeneration>, cfg: EngineConfig) -> Self {
        Self { text, cfg }
    }

    /// Reads `diagnostics.results` as populated by the metrics steps.
    /// With no evidence in the first comparison there is nothing to
    /// interpret; say so and stop. The results are kept for audit.
    pub async fn run(&self, state: &ConversationState) -> StateDelta {
        let ctx = &state.diagnostics;
        let first_rows_empty = ctx
            .results
            .first()
            .map(|r| r.rows.is_empty())
            .unwrap_or(true);

        if first_rows_empty {
            tracing::info!("no diagnostics evidence collected, skipping interpretation");
            return StateDelta {
                messages: vec![Message::agent(
                    "The first diagnostic step (overall_change) had no data to compare, so \
                     additional steps were skipped. Please verify that calls exist in both \
                     the recent and baseline periods, then try again.",
                )],
                active_agent: Some(AgentName::DiagnosticsSummary),
                plan_step_index: Some(state.plan_step_index + 1),
                ..StateDelta::default()
            };
        }

        let metric = ctx.target_metric.as_str();
        let system = Message::system(format!(
            "You are a performance diagnostics assistant for an LLM agent platform.\n\
             The user reported that their {metric} changed unexpectedly.\n\
             You will be given analysis tables for overall change, by tool, and by agent.\n\
             Your job:\n\
             1) Decide whether there was a real change between the two windows \
             (recent={}h vs baseline={}h)\n\
             2) Identify the top 1-3 likely causes with numeric evidence\n\
             3) Explain them in simple language\n\
             4) Recommend concrete next steps (limit retries, optimize prompts, etc.)\n\
             Always cite the key numbers you rely on.",
            ctx.recent_window_hours, ctx.baseline_window_hours
        ));
        let evidence = format_results(&ctx.results, self.cfg.diagnostics_preview_rows);
        let user = Message::human(format!(
            "Here are the diagnostics results:\n\n{evidence}\n\n\
             Explain why {metric} likely changed. If the data shows no significant change, \
             say so and suggest monitoring steps."
        ));

        let content = match self.text.invoke(&[system, user]).await {
            Ok(message) => message.content,
            Err(err) => {
                tracing::warn!(error = %err, "diagnostics narrative call failed");
                format!(
                    "I collected the comparison data but could not produce a narrative. \
                     Raw evidence:\n\n{evidence}"
                )
            }
        };

        StateDelta {
            messages: vec![Message::agent(content)],
            active_agent: Some(AgentName::DiagnosticsSummary),
            plan_step_index: Some(state.plan_step_index + 1),
            ..StateDelta::default()
        }
    }
}

/// Render every captured result set with a bounded per-result preview
/// and an explicit "+N more" suffix when truncated.
fn format_results(results: &[DiagnosticsResult], preview_rows: usize) -> String {
    if results.is_empty() {
        return "No diagnostics result rows were produced.".into();
    }

    let mut lines = Vec::new();
    for result in results {
        lines.push(format!("[{}] {}", result.name, result.description));
        if result.rows.is_empty() {
            lines.push("  - (no rows)".into());
            continue;
        }
        for (idx, row) in result.rows.iter().take(preview_rows).enumerate() {
            let fields: Vec<String> = row.iter().map(|(k, v)| format!("{k}={v}")).collect();
            lines.push(format!("  {}. {}", idx + 1, fields.join(", ")));
        }
        if result.rows.len() > preview_rows {
            lines.push(format!(
                "  ... (+{} more rows)",
                result.rows.len() - preview_rows
            ));
        }
    }
    lines.join("\n")
}

//! Diagnostics intent detection, window parsing, and the fixed
//! window-comparison plan.
//!
//! A diagnostics turn compares a metric between a "recent" and a
//! "baseline" time window and attributes the change to tools and agents.
//! The plan is deterministic; only the SQL inside each step is generated.

use std::sync::LazyLock;

use regex::Regex;

use op_domain::state::{AgentName, DiagnosticsContext, PlanStep, TargetMetric};

const CAUSE_SIGNALS: [&str; 10] = [
    "why", "reason", "cause", "diagnostic", "root cause", "increase", "spike", "sudden", "slow",
    "unstable",
];

const METRIC_SIGNALS: [&str; 7] = [
    "latency",
    "response time",
    "delay",
    "tokens",
    "token",
    "token usage",
    "cost",
];

const LATENCY_KEYWORDS: [&str; 4] = ["latency", "delay", "slow", "response time"];
const TOKEN_KEYWORDS: [&str; 5] = ["token", "tokens", "token usage", "cost", "usage"];

/// Step names, in plan order. The first three collect data with the
/// metrics agent; the last one runs the diagnostics summary agent.
pub const STEP_OVERALL: &str = "overall_change";
pub const STEP_BY_TOOL: &str = "by_tool";
pub const STEP_BY_AGENT: &str = "by_agent";
pub const STEP_SUMMARIZE: &str = "summarize";

/// Tag carried in a diagnostics plan step's input context so the metrics
/// agent knows which comparison it is running.
const STEP_TAG: &str = "diagnostics_step=";

static HOURS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*hours?").expect("static pattern"));
static DAYS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*days?").expect("static pattern"));

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Intent detection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A message is a diagnostics request when a cause signal and a metric
/// signal co-occur ("why did latency spike").
pub fn is_diagnostics_intent(text: &str) -> bool {
    let lowered = text.to_lowercase();
    let has_cause = CAUSE_SIGNALS.iter().any(|s| lowered.contains(s));
    let has_metric = METRIC_SIGNALS.iter().any(|s| lowered.contains(s));
    has_cause && has_metric
}

/// Guess which metric class (latency/tokens/both) is being referenced.
pub fn infer_target_metric(text: &str) -> TargetMetric {
    let lowered = text.to_lowercase();
    let has_latency = LATENCY_KEYWORDS.iter().any(|k| lowered.contains(k));
    let has_tokens = TOKEN_KEYWORDS.iter().any(|k| lowered.contains(k));
    match (has_latency, has_tokens) {
        (true, true) => TargetMetric::Both,
        (false, true) => TargetMetric::Tokens,
        _ => TargetMetric::Latency,
    }
}

/// Parse an explicit timeframe like "last 4 hours" or "last 3 days".
pub fn parse_window_hours(text: &str) -> Option<u32> {
    if let Some(caps) = HOURS_RE.captures(text) {
        return caps.get(1)?.as_str().parse().ok();
    }
    if let Some(caps) = DAYS_RE.captures(text) {
        let days: u32 = caps.get(1)?.as_str().parse().ok()?;
        return Some(days * 24);
    }
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The fixed diagnostics plan
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the four-step window-comparison plan from an initialized
/// diagnostics context.
pub fn diagnostics_plan(ctx: &DiagnosticsContext) -> Vec<PlanStep> {
    let metric = ctx.target_metric.as_str();
    let recent = ctx.recent_window_hours;
    let baseline = ctx.baseline_window_hours;

    vec![
        PlanStep {
            step_number: 1,
            agent: AgentName::Metrics.as_str().into(),
            objective: format!(
                "Compare the average/max {metric} between the recent {recent} hours \
                 and the previous {baseline} hours."
            ),
            input_context: format!("{STEP_TAG}{STEP_OVERALL}"),
            success_criteria:
                "Calculate average/max values and call counts for both periods and return as rows"
                    .into(),
        },
        PlanStep {
            step_number: 2,
            agent: AgentName::Metrics.as_str().into(),
            objective: format!("Compare {metric} average and call count by tool for the two periods."),
            input_context: format!("{STEP_TAG}{STEP_BY_TOOL}"),
            success_criteria: "Find the top 10 tools with the largest increase.".into(),
        },
        PlanStep {
            step_number: 3,
            agent: AgentName::Metrics.as_str().into(),
            objective: format!("Compare {metric} average and call count by agent_name."),
            input_context: format!("{STEP_TAG}{STEP_BY_AGENT}"),
            success_criteria: "Find agents with the largest increase.".into(),
        },
        PlanStep {
            step_number: 4,
            agent: AgentName::DiagnosticsSummary.as_str().into(),
            objective: "Summarize the key root cause candidates based on previous steps and \
                        suggest simple action items."
                .into(),
            input_context: format!("{STEP_TAG}{STEP_SUMMARIZE}"),
            success_criteria: "Present 2-3 key causes with supporting numbers".into(),
        },
    ]
}

/// Extract the diagnostics step name from a plan step's input context.
pub fn step_name_from_context(input_context: &str) -> Option<&str> {
    input_context
        .split_whitespace()
        .find_map(|token| token.strip_prefix(STEP_TAG))
}

/// The SQL goal sent to generation for one diagnostics comparison step.
pub fn sql_goal(step_name: &str, ctx: &DiagnosticsContext) -> Option<String> {
    let metric = ctx.target_metric.as_str();
    let recent = ctx.recent_window_hours;
    let baseline = ctx.baseline_window_hours;
    match step_name {
        STEP_OVERALL => Some(format!(
            "Compare the average and maximum {metric} between the last {recent} hours \
             and the previous {baseline} hours. Return one row per window_label \
             with columns: window_label, avg_value, max_value, call_count."
        )),
        STEP_BY_TOOL => Some(format!(
            "For the same two {recent}h vs {baseline}h windows, group by tool_name and compute \
             {metric} average and call_count. Return top 10 tools with the largest increase \
             in average {metric}."
        )),
        STEP_BY_AGENT => Some(format!(
            "For the same two windows, group by agent_name and compute average {metric} \
             and call_count. Return agents with the largest increase."
        )),
        _ => None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_needs_cause_and_metric_signals() {
        assert!(is_diagnostics_intent("why did latency spike yesterday"));
        assert!(is_diagnostics_intent("reason for token usage increase"));
        // A metric alone, or a cause word alone, is not a diagnostics ask.
        assert!(!is_diagnostics_intent("show me latency per tool"));
        assert!(!is_diagnostics_intent("why is the sky blue"));
    }

    #[test]
    fn target_metric_inference() {
        assert_eq!(infer_target_metric("why is latency up"), TargetMetric::Latency);
        assert_eq!(
            infer_target_metric("why did token cost increase"),
            TargetMetric::Tokens
        );
        assert_eq!(
            infer_target_metric("why are latency and token usage both up"),
            TargetMetric::Both
        );
        // Neither keyword family defaults to latency.
        assert_eq!(infer_target_metric("why the change"), TargetMetric::Latency);
    }

    #[test]
    fn window_parsing() {
        assert_eq!(parse_window_hours("in the last 4 hours"), Some(4));
        assert_eq!(parse_window_hours("over 1 hour"), Some(1));
        assert_eq!(parse_window_hours("past 3 days"), Some(72));
        assert_eq!(parse_window_hours("recently"), None);
    }

    #[test]
    fn plan_has_four_steps_with_contiguous_numbers() {
        let ctx = DiagnosticsContext::default();
        let plan = diagnostics_plan(&ctx);
        assert_eq!(plan.len(), 4);
        for (i, step) in plan.iter().enumerate() {
            assert_eq!(step.step_number as usize, i + 1);
        }
        assert_eq!(plan[3].agent, "diagnostics_summary_agent");
        assert_eq!(
            step_name_from_context(&plan[0].input_context),
            Some(STEP_OVERALL)
        );
    }

    #[test]
    fn sql_goals_exist_for_data_steps_only() {
        let ctx = DiagnosticsContext::default();
        assert!(sql_goal(STEP_OVERALL, &ctx).is_some());
        assert!(sql_goal(STEP_BY_TOOL, &ctx).is_some());
        assert!(sql_goal(STEP_BY_AGENT, &ctx).is_some());
        assert!(sql_goal(STEP_SUMMARIZE, &ctx).is_none());
    }
}

//! Conversation state threaded through every step of a turn.
//!
//! The state is passed by value between the router and the task agents;
//! each node returns a [`StateDelta`] and the executor merges it with
//! [`ConversationState::apply`]. Messages are append-only; unset delta
//! fields default from the previous state so nothing is silently dropped.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Message, Role};

/// One tabular result row: an ordered mapping of column name → value.
pub type Row = serde_json::Map<String, serde_json::Value>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent identifiers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Closed set of dispatchable nodes. `Complete` is the terminal sentinel
/// that stops the executor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    Planner,
    #[serde(rename = "metrics_agent")]
    Metrics,
    #[serde(rename = "chart_agent")]
    Chart,
    #[serde(rename = "diagnostics_summary_agent")]
    DiagnosticsSummary,
    #[serde(rename = "clarifier_agent")]
    Clarifier,
    #[serde(rename = "refusal_agent")]
    Refusal,
    Complete,
}

impl AgentName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Planner => "planner",
            AgentName::Metrics => "metrics_agent",
            AgentName::Chart => "chart_agent",
            AgentName::DiagnosticsSummary => "diagnostics_summary_agent",
            AgentName::Clarifier => "clarifier_agent",
            AgentName::Refusal => "refusal_agent",
            AgentName::Complete => "complete",
        }
    }

    /// Parse a plan step's agent field. Unrecognized names return `None`;
    /// the router substitutes the metrics agent in that case.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "planner" => Some(AgentName::Planner),
            "metrics_agent" => Some(AgentName::Metrics),
            "chart_agent" => Some(AgentName::Chart),
            "diagnostics_summary_agent" => Some(AgentName::DiagnosticsSummary),
            "clarifier_agent" => Some(AgentName::Clarifier),
            "refusal_agent" => Some(AgentName::Refusal),
            "complete" => Some(AgentName::Complete),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plan types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single step in a planner-produced execution plan.
///
/// Created exclusively by the planner (or its deterministic fallback);
/// consumed read-only by the router and the designated agent. The agent
/// field is a free string so structured-generation output can carry
/// anything; the router falls back to the metrics agent when it does not
/// parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub step_number: u32,
    pub agent: String,
    pub objective: String,
    pub input_context: String,
    pub success_criteria: String,
}

/// Whether the active plan is an ordinary request decomposition or a
/// diagnostics window-comparison workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanMode {
    #[default]
    Default,
    Diagnostics,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Diagnostics context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which metric class a diagnostics run is investigating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMetric {
    #[default]
    Latency,
    Tokens,
    Both,
}

impl TargetMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetMetric::Latency => "latency",
            TargetMetric::Tokens => "tokens",
            TargetMetric::Both => "both",
        }
    }
}

/// Output of one diagnostics data-collection step, kept for the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsResult {
    pub name: String,
    pub description: String,
    pub rows: Vec<Row>,
}

/// Shared context across the steps of one diagnostics plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsContext {
    pub target_metric: TargetMetric,
    pub baseline_window_hours: u32,
    pub recent_window_hours: u32,
    /// One entry per completed data-collection step, in plan order.
    /// Preserved after the summary step for audit.
    pub results: Vec<DiagnosticsResult>,
}

impl Default for DiagnosticsContext {
    fn default() -> Self {
        Self {
            target_metric: TargetMetric::default(),
            baseline_window_hours: 24,
            recent_window_hours: 24,
            results: Vec::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Clarification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClarificationStatus {
    #[default]
    None,
    Pending,
    Resolved,
}

/// Tracks an in-flight clarifying question across turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Clarification {
    pub status: ClarificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_user_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_query: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_detail: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chart context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Chart-ready rows plus the metadata describing how they were prepared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartContext {
    pub rows: Vec<Row>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The single record threaded through every node of a turn.
///
/// The caller owns the state between turns (opaque persisted blob);
/// within a turn it flows linearly through router → agent → router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: Uuid,
    /// Append-only transcript; never reordered or truncated within a turn.
    pub messages: Vec<Message>,
    /// The node that last produced a delta. Advisory/debugging only.
    pub active_agent: AgentName,
    /// Most recent tabular result set; overwritten by the next
    /// data-producing step, consumed by chart generation.
    pub last_rows: Vec<Row>,
    pub chart_context: ChartContext,
    pub plan: Vec<PlanStep>,
    /// Cursor into `plan`; `index == plan.len()` with a non-empty plan, or
    /// `index > 0` with an empty plan, both signal "terminate".
    pub plan_step_index: usize,
    pub plan_mode: PlanMode,
    pub diagnostics: DiagnosticsContext,
    pub clarification: Clarification,
    /// Fatal-error flag. Once set, the router short-circuits to
    /// termination on its next pass.
    pub has_error: bool,
}

impl ConversationState {
    /// Start a fresh conversation with one human message.
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            conversation_id: Uuid::new_v4(),
            messages: vec![Message::human(user_message)],
            active_agent: AgentName::Planner,
            last_rows: Vec::new(),
            chart_context: ChartContext::default(),
            plan: Vec::new(),
            plan_step_index: 0,
            plan_mode: PlanMode::default(),
            diagnostics: DiagnosticsContext::default(),
            clarification: Clarification::default(),
            has_error: false,
        }
    }

    /// Begin a new turn on an existing conversation: append the new human
    /// message, reset per-turn control fields, and carry forward the
    /// transcript, cached rows, plan mode, diagnostics context, and any
    /// pending clarification.
    pub fn next_turn(mut self, user_message: impl Into<String>) -> Self {
        self.messages.push(Message::human(user_message));
        self.plan = Vec::new();
        self.plan_step_index = 0;
        self.has_error = false;
        self
    }

    /// The text of the most recent human message, if any.
    pub fn last_human_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Human)
            .map(|m| m.content.as_str())
    }

    /// Merge a node's delta into the state. Messages are appended;
    /// every unset field keeps its previous value.
    pub fn apply(&mut self, delta: StateDelta) {
        self.messages.extend(delta.messages);
        if let Some(agent) = delta.active_agent {
            self.active_agent = agent;
        }
        if let Some(rows) = delta.last_rows {
            self.last_rows = rows;
        }
        if let Some(ctx) = delta.chart_context {
            self.chart_context = ctx;
        }
        if let Some(plan) = delta.plan {
            self.plan = plan;
        }
        if let Some(idx) = delta.plan_step_index {
            self.plan_step_index = idx;
        }
        if let Some(mode) = delta.plan_mode {
            self.plan_mode = mode;
        }
        if let Some(diag) = delta.diagnostics {
            self.diagnostics = diag;
        }
        if let Some(clar) = delta.clarification {
            self.clarification = clar;
        }
        if let Some(err) = delta.has_error {
            self.has_error = err;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State delta
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What one node changed. `None` means "keep the previous value".
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub messages: Vec<Message>,
    pub active_agent: Option<AgentName>,
    pub last_rows: Option<Vec<Row>>,
    pub chart_context: Option<ChartContext>,
    pub plan: Option<Vec<PlanStep>>,
    pub plan_step_index: Option<usize>,
    pub plan_mode: Option<PlanMode>,
    pub diagnostics: Option<DiagnosticsContext>,
    pub clarification: Option<Clarification>,
    pub has_error: Option<bool>,
}

impl StateDelta {
    /// A delta that clears the plan and marks the conversation complete.
    /// Used by the router's terminal branches.
    pub fn terminal() -> Self {
        Self {
            active_agent: Some(AgentName::Complete),
            plan: Some(Vec::new()),
            plan_step_index: Some(0),
            plan_mode: Some(PlanMode::Default),
            ..Self::default()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_appends_messages_and_keeps_unset_fields() {
        let mut state = ConversationState::new("show me latency data");
        state.last_rows = vec![Row::new()];
        state.plan_step_index = 2;

        let delta = StateDelta {
            messages: vec![Message::agent("done")],
            active_agent: Some(AgentName::Metrics),
            ..StateDelta::default()
        };
        state.apply(delta);

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.active_agent, AgentName::Metrics);
        // Unset fields keep their previous values.
        assert_eq!(state.last_rows.len(), 1);
        assert_eq!(state.plan_step_index, 2);
    }

    #[test]
    fn apply_never_removes_messages() {
        let mut state = ConversationState::new("first");
        state.messages.push(Message::agent("reply"));
        let before = state.messages.len();

        state.apply(StateDelta::terminal());
        assert_eq!(state.messages.len(), before);
    }

    #[test]
    fn next_turn_resets_plan_and_carries_rows() {
        let mut state = ConversationState::new("list runs");
        state.last_rows = vec![Row::new()];
        state.plan = vec![PlanStep {
            step_number: 1,
            agent: "metrics_agent".into(),
            objective: "fetch".into(),
            input_context: "ctx".into(),
            success_criteria: "rows".into(),
        }];
        state.plan_step_index = 1;
        state.has_error = true;

        let state = state.next_turn("now chart it");
        assert_eq!(state.messages.len(), 2);
        assert!(state.plan.is_empty());
        assert_eq!(state.plan_step_index, 0);
        assert!(!state.has_error);
        assert_eq!(state.last_rows.len(), 1);
        assert_eq!(state.last_human_text(), Some("now chart it"));
    }

    #[test]
    fn agent_name_round_trips_and_defaults() {
        for agent in [
            AgentName::Planner,
            AgentName::Metrics,
            AgentName::Chart,
            AgentName::DiagnosticsSummary,
            AgentName::Clarifier,
            AgentName::Refusal,
            AgentName::Complete,
        ] {
            assert_eq!(AgentName::parse(agent.as_str()), Some(agent));
        }
        assert_eq!(AgentName::parse("definitely_not_an_agent"), None);
    }

    #[test]
    fn terminal_delta_clears_plan() {
        let mut state = ConversationState::new("why is latency up");
        state.plan = vec![PlanStep {
            step_number: 1,
            agent: "metrics_agent".into(),
            objective: "x".into(),
            input_context: "y".into(),
            success_criteria: "z".into(),
        }];
        state.plan_step_index = 1;
        state.plan_mode = PlanMode::Diagnostics;

        state.apply(StateDelta::terminal());
        assert!(state.plan.is_empty());
        assert_eq!(state.plan_step_index, 0);
        assert_eq!(state.plan_mode, PlanMode::Default);
        assert_eq!(state.active_agent, AgentName::Complete);
    }
}

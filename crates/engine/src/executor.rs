//! The top-level turn loop: router, then the selected agent, repeated
//! until the router lands on the `complete` sentinel.
//!
//! The loop is explicit iteration, never recursion, and is bounded by
//! `max_graph_steps`. Within one turn, deltas are applied in strict step
//! order; no two agents ever run concurrently against the same state.

use op_domain::config::EngineConfig;
use op_domain::error::Result;
use op_domain::message::Message;
use op_domain::state::{AgentName, ConversationState, StateDelta};
use op_domain::stream::BoxStream;

use crate::agents::{
    ChartAgent, ClarifierAgent, DiagnosticsSummaryAgent, MetricsAgent, RefusalAgent,
};
use crate::planner::Planner;
use crate::router::Router;
use crate::CapabilitySet;

pub struct Engine {
    router: Router,
    planner: Planner,
    metrics: MetricsAgent,
    chart: ChartAgent,
    diagnostics_summary: DiagnosticsSummaryAgent,
    clarifier: ClarifierAgent,
    refusal: RefusalAgent,
    max_graph_steps: usize,
}

impl Engine {
    pub fn new(caps: CapabilitySet, cfg: EngineConfig) -> Self {
        Self {
            router: Router::new(caps.structured.clone(), cfg.default_window_hours),
            planner: Planner::new(caps.structured.clone()),
            metrics: MetricsAgent::new(caps.clone(), cfg.clone()),
            chart: ChartAgent::new(caps.structured.clone(), cfg.clone()),
            diagnostics_summary: DiagnosticsSummaryAgent::new(caps.text.clone(), cfg.clone()),
            clarifier: ClarifierAgent,
            refusal: RefusalAgent,
            max_graph_steps: cfg.max_graph_steps,
        }
    }

    /// Run one conversational turn to completion and return the final
    /// state. `previous` carries the prior turn's final state; `None`
    /// starts a fresh conversation.
    pub async fn advance(
        &self,
        utterance: impl Into<String>,
        previous: Option<ConversationState>,
    ) -> Result<ConversationState> {
        let mut state = begin_turn(utterance, previous);

        for _ in 0..self.max_graph_steps {
            let (next, delta) = self.router.route(&state).await;
            state.apply(delta);
            if next == AgentName::Complete {
                return Ok(state);
            }

            let delta = self.run_agent(next, &state).await;
            state.apply(delta);
        }

        tracing::warn!(
            limit = self.max_graph_steps,
            "turn exceeded the graph step bound, stopping"
        );
        Ok(state)
    }

    /// Like [`Engine::advance`], but yields the state after every node
    /// execution. Observability only; the final yielded state is the same
    /// state `advance` would return.
    pub fn advance_stream(
        &self,
        utterance: impl Into<String>,
        previous: Option<ConversationState>,
    ) -> BoxStream<'_, ConversationState> {
        let mut state = begin_turn(utterance, previous);
        Box::pin(async_stream::stream! {
            for _ in 0..self.max_graph_steps {
                let (next, delta) = self.router.route(&state).await;
                state.apply(delta);
                yield state.clone();
                if next == AgentName::Complete {
                    return;
                }

                let delta = self.run_agent(next, &state).await;
                state.apply(delta);
                yield state.clone();
            }
        })
    }

    /// Dispatch table over the closed agent set. Any error escaping an
    /// agent is converted into a user-facing message plus the fatal flag;
    /// the router terminates on its next pass.
    async fn run_agent(&self, agent: AgentName, state: &ConversationState) -> StateDelta {
        let result = match agent {
            AgentName::Planner => Ok(self.planner.plan(state).await),
            AgentName::Metrics => self.metrics.run(state).await,
            AgentName::Chart => Ok(self.chart.run(state).await),
            AgentName::DiagnosticsSummary => Ok(self.diagnostics_summary.run(state).await),
            AgentName::Clarifier => Ok(self.clarifier.run(state)),
            AgentName::Refusal => Ok(self.refusal.run(state)),
            // The router never dispatches the sentinel.
            AgentName::Complete => Ok(StateDelta::default()),
        };

        match result {
            Ok(delta) => delta,
            Err(err) => {
                tracing::error!(agent = %agent, error = %err, "agent step failed");
                StateDelta {
                    messages: vec![Message::agent(format!(
                        "Something went wrong while handling this step: {err}. \
                         Please try again or rephrase the request."
                    ))],
                    active_agent: Some(agent),
                    has_error: Some(true),
                    ..StateDelta::default()
                }
            }
        }
    }
}

fn begin_turn(
    utterance: impl Into<String>,
    previous: Option<ConversationState>,
) -> ConversationState {
    match previous {
        Some(state) => state.next_turn(utterance),
        None => ConversationState::new(utterance),
    }
}

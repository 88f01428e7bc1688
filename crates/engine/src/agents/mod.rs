//! Task agents. Each consumes the conversation state, optionally calls
//! external capabilities, and returns a state delta for the executor to
//! merge.

pub mod chart;
pub mod clarifier;
pub mod diagnostics_summary;
pub mod metrics;
pub mod refusal;

pub use chart::ChartAgent;
pub use clarifier::ClarifierAgent;
pub use diagnostics_summary::DiagnosticsSummaryAgent;
pub use metrics::MetricsAgent;
pub use refusal::RefusalAgent;

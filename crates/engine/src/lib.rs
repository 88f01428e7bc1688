//! The dispatch and plan-execution core.
//!
//! A turn flows router → agent → router until the router lands on the
//! `complete` sentinel. The router never calls the SQL or chart
//! capabilities itself; agents consume [`CapabilitySet`] handles and
//! return a [`op_domain::state::StateDelta`] that the executor merges.

use std::sync::Arc;

use op_capabilities::{SchemaCatalog, SqlExecutor, StructuredGeneration, TextGeneration};

pub mod agents;
pub mod chart;
pub mod diagnostics;
pub mod executor;
pub mod planner;
pub mod router;
pub mod sql;

pub use executor::Engine;

/// The external capabilities the engine is wired with. Cloning is cheap;
/// every handle is an `Arc`.
#[derive(Clone)]
pub struct CapabilitySet {
    pub text: Arc<dyn TextGeneration>,
    pub structured: Arc<dyn StructuredGeneration>,
    pub sql: Arc<dyn SqlExecutor>,
    pub schema: Arc<dyn SchemaCatalog>,
}

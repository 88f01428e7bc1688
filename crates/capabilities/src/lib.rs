//! Capability contracts the engine depends on, plus the adapters that
//! implement them.
//!
//! Every external interaction (text generation, structured generation,
//! SQL execution, schema description) goes through one of these traits.
//! They are injected into the engine as `Arc<dyn Trait>` so every
//! component can be tested with fakes.

pub mod openai_compat;
pub mod schema;
pub mod traits;

// Re-exports for convenience.
pub use openai_compat::OpenAiCompatGenerator;
pub use schema::{StaticSchema, KNOWN_TABLES};
pub use traits::{
    invoke_typed, SchemaCatalog, SqlExecutor, SqlMetadata, SqlResult, StructuredGeneration,
    TextGeneration,
};

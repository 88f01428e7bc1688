use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use op_domain::error::{Error, Result};
use op_domain::message::Message;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generation capabilities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Free-text generation: `invoke(ordered_messages) -> message`.
#[async_trait::async_trait]
pub trait TextGeneration: Send + Sync {
    async fn invoke(&self, messages: &[Message]) -> Result<Message>;
}

/// Structured generation against a JSON schema.
///
/// Implementations must fail cleanly (return `Err`) rather than hand back
/// an object that does not satisfy the schema.
#[async_trait::async_trait]
pub trait StructuredGeneration: Send + Sync {
    async fn invoke_structured(&self, messages: &[Message], schema: &Value) -> Result<Value>;
}

/// Call the structured capability and deserialize into a concrete type.
///
/// A decode failure is a [`Error::Capability`] so callers treat it like
/// any other unusable-output case and fall back to their safe default.
pub async fn invoke_typed<T: DeserializeOwned>(
    generator: &dyn StructuredGeneration,
    messages: &[Message],
    schema: &Value,
) -> Result<T> {
    let value = generator.invoke_structured(messages, schema).await?;
    serde_json::from_value(value)
        .map_err(|e| Error::Capability(format!("structured output did not match schema: {e}")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SQL execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Columnar result of a SQL execution.
#[derive(Debug, Clone, Serialize)]
pub struct SqlResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub metadata: SqlMetadata,
}

/// Execution metadata recorded by the storage boundary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SqlMetadata {
    pub executed_sql: String,
    pub original_sql: String,
    pub rows_returned: usize,
    pub columns_returned: usize,
    /// True when the boundary appended the default row cap itself.
    pub auto_limit_added: bool,
    pub limit_value: Option<u64>,
    pub execution_ms: f64,
    pub queried_at: Option<DateTime<Utc>>,
}

/// Read-only SQL execution against the trace store.
///
/// Implementations must reject non-SELECT statements as a second line of
/// defense and enforce a default row cap when the statement omits one.
#[async_trait::async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<SqlResult>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Schema description
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Describes the queryable tables for Text2SQL prompts.
#[async_trait::async_trait]
pub trait SchemaCatalog: Send + Sync {
    async fn describe_schema(&self) -> Result<String>;
}

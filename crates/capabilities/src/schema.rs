//! Built-in description of the observability trace store.

use op_domain::error::Result;

use crate::traits::SchemaCatalog;

/// The four queryable tables. Generated SQL must reference at least one.
pub const KNOWN_TABLES: [&str; 4] = ["agent_runs", "call_model", "call_tool", "call_chain"];

const TABLE_SECTIONS: &str = "\
    Table: agent_runs
    Description: Agent-level metadata. Use for run status, user/session IDs, timings, and tags. Join with call_* tables on run_id.
    Columns:
      - run_id TEXT (primary key)
      - start_time TEXT
      - end_time TEXT
      - status TEXT
      - error TEXT
      - user_id TEXT
      - session_id TEXT
      - thread_id TEXT
      - model_name TEXT
      - tags JSON
      - total_tokens INTEGER
      - total_cost REAL

    Table: call_model
    Description: LLM calls executed within the run. Contains tokens, costs, prompt text, and model metadata.
    Columns:
      - step_id TEXT (primary key)
      - run_id TEXT
      - step_index INTEGER
      - prompt_text TEXT
      - llm_output_text TEXT
      - llm_input_tokens INTEGER
      - llm_output_tokens INTEGER
      - llm_total_tokens INTEGER
      - llm_total_cost REAL
      - finish_reason TEXT
      - model_name TEXT
      - model_provider TEXT

    Table: call_tool
    Description: All tool invocations (think_tool, search_tool, etc). Contains tool_name, arguments, status, response text, and tool_latency_ms.
    Columns:
      - step_id TEXT (primary key)
      - run_id TEXT
      - step_index INTEGER
      - tool_name TEXT
      - tool_args JSON
      - tool_status TEXT
      - tool_response TEXT
      - tool_latency_ms INTEGER

    Table: call_chain
    Description: Higher-level chain executions. Useful for tracing chain-level token usage and messages.
    Columns:
      - step_id TEXT (primary key)
      - run_id TEXT
      - step_index INTEGER
      - chain_name TEXT
      - chain_status TEXT
      - chain_prompt_tokens INTEGER
      - chain_completion_tokens INTEGER
      - chain_total_tokens INTEGER
      - chain_total_cost REAL";

const GUIDANCE: &str = "\
    IMPORTANT NOTES:
    1. This database is READ-ONLY. Only SELECT queries are allowed.
    2. ALWAYS add a LIMIT clause when selecting rows (e.g., LIMIT 100).
    3. Table usage:
       - Use call_model for LLM reasoning/token usage queries
       - Use call_tool for tool latency/errors/arguments
       - Use call_chain for higher-level chain executions
    4. Time calculations (latency):
       - Run latency: (julianday(end_time) - julianday(start_time)) * 86400000 AS latency_ms
       - Tool latency: call_tool.tool_latency_ms (already calculated)
    5. JSON field access (SQLite):
       - Extract from arrays: json_extract(tags, '$[0]')
       - Extract from objects: json_extract(tool_args, '$.param_name')
    6. Common filters:
       - By time: WHERE start_time > date('now', '-7 days')
       - By status: WHERE status = 'success' OR status = 'error'";

/// A static, always-available schema description matching the known
/// trace-store layout. Used in tests and when no live catalog exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSchema;

impl StaticSchema {
    pub fn text() -> String {
        format!(
            "We have a SQLite database with the following tables:\n\n{TABLE_SECTIONS}\n\n{GUIDANCE}"
        )
    }
}

#[async_trait::async_trait]
impl SchemaCatalog for StaticSchema {
    async fn describe_schema(&self) -> Result<String> {
        Ok(Self::text())
    }
}

//! TOML configuration for the ObsPilot engine and CLI driver.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM endpoint
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection settings for the OpenAI-compatible generation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_llm_base_url")]
    pub base_url: String,
    #[serde(default = "d_llm_model")]
    pub model: String,
    /// Environment variable holding the API key. Empty value means the
    /// endpoint is unauthenticated (e.g. a local server).
    #[serde(default = "d_llm_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_llm_base_url(),
            model: d_llm_model(),
            api_key_env: d_llm_api_key_env(),
            timeout_secs: d_llm_timeout_secs(),
        }
    }
}

fn d_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_llm_model() -> String {
    "gpt-4o-mini".into()
}
fn d_llm_api_key_env() -> String {
    "OBSPILOT_API_KEY".into()
}
fn d_llm_timeout_secs() -> u64 {
    120
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Database
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Location of the read-only trace store queried by the metrics agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "d_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: d_db_path() }
    }
}

fn d_db_path() -> PathBuf {
    PathBuf::from("data/agent_debug_db.sqlite")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine knobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Total generation attempts per metrics step (initial + repairs).
    #[serde(default = "d_max_sql_attempts")]
    pub max_sql_attempts: u32,
    /// Row cap appended to generated SQL that omits a LIMIT.
    #[serde(default = "d_default_row_limit")]
    pub default_row_limit: u64,
    /// Diagnostics comparison window when the user gives none.
    #[serde(default = "d_default_window_hours")]
    pub default_window_hours: u32,
    /// Maximum rows kept when preparing chart data.
    #[serde(default = "d_chart_max_rows")]
    pub chart_max_rows: usize,
    /// Rows previewed per result set in the diagnostics summary prompt.
    #[serde(default = "d_diagnostics_preview_rows")]
    pub diagnostics_preview_rows: usize,
    /// Hard bound on router/agent iterations within one turn.
    #[serde(default = "d_max_graph_steps")]
    pub max_graph_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_sql_attempts: d_max_sql_attempts(),
            default_row_limit: d_default_row_limit(),
            default_window_hours: d_default_window_hours(),
            chart_max_rows: d_chart_max_rows(),
            diagnostics_preview_rows: d_diagnostics_preview_rows(),
            max_graph_steps: d_max_graph_steps(),
        }
    }
}

fn d_max_sql_attempts() -> u32 {
    3
}
fn d_default_row_limit() -> u64 {
    100
}
fn d_default_window_hours() -> u32 {
    24
}
fn d_chart_max_rows() -> usize {
    20
}
fn d_diagnostics_preview_rows() -> usize {
    10
}
fn d_max_graph_steps() -> usize {
    16
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.llm.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        }
        if self.llm.model.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.model".into(),
                message: "model must not be empty".into(),
            });
        }
        if self.llm.api_key_env.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "llm.api_key_env".into(),
                message: "no API key env var set; endpoint must be unauthenticated".into(),
            });
        }

        if self.engine.max_sql_attempts == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "engine.max_sql_attempts".into(),
                message: "must allow at least one generation attempt".into(),
            });
        }
        if self.engine.default_row_limit == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "engine.default_row_limit".into(),
                message: "row limit must be greater than 0".into(),
            });
        }
        if self.engine.max_graph_steps < 2 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "engine.max_graph_steps".into(),
                message: "the loop needs at least one router and one agent pass".into(),
            });
        }

        errors
    }
}

use op_domain::config::{Config, ConfigSeverity};

#[test]
fn default_engine_knobs() {
    let config = Config::default();
    assert_eq!(config.engine.max_sql_attempts, 3);
    assert_eq!(config.engine.default_row_limit, 100);
    assert_eq!(config.engine.default_window_hours, 24);
    assert_eq!(config.engine.chart_max_rows, 20);
    assert_eq!(config.engine.diagnostics_preview_rows, 10);
}

#[test]
fn default_config_passes_validation() {
    let config = Config::default();
    let errors = config.validate();
    assert!(
        !errors
            .iter()
            .any(|e| e.severity == ConfigSeverity::Error),
        "default config should have no hard errors: {errors:?}"
    );
}

#[test]
fn partial_toml_fills_defaults() {
    let toml_str = r#"
[llm]
model = "llama3.1"
base_url = "http://localhost:11434/v1"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.llm.model, "llama3.1");
    assert_eq!(config.llm.api_key_env, "OBSPILOT_API_KEY");
    assert_eq!(config.engine.max_sql_attempts, 3);
}

#[test]
fn zero_attempts_is_rejected() {
    let toml_str = r#"
[engine]
max_sql_attempts = 0
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.severity == ConfigSeverity::Error && e.field == "engine.max_sql_attempts"));
}

#[test]
fn empty_api_key_env_is_a_warning_only() {
    let toml_str = r#"
[llm]
api_key_env = ""
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.severity == ConfigSeverity::Warning && e.field == "llm.api_key_env"));
    assert!(!errors.iter().any(|e| e.severity == ConfigSeverity::Error));
}

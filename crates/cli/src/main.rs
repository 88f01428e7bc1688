//! `obspilot`: conversational analytics over an agent trace store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use op_capabilities::{OpenAiCompatGenerator, StaticSchema};
use op_domain::config::{Config, ConfigSeverity};
use op_engine::{CapabilitySet, Engine};

mod chat;
mod sqlite;

#[derive(Parser)]
#[command(name = "obspilot", version, about = "Conversational observability analytics")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "obspilot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat REPL (the default).
    Chat,
    /// Run a single question and print the answer.
    Ask { question: String },
    /// Load the configuration and report problems.
    ConfigCheck,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        None | Some(Command::Chat) => {
            let engine = build_engine(&config)?;
            chat::run(&engine).await
        }
        Some(Command::Ask { question }) => {
            let engine = build_engine(&config)?;
            let state = engine.advance(question, None).await?;
            for message in chat::agent_replies(&state, 1) {
                println!("{message}");
            }
            Ok(())
        }
        Some(Command::ConfigCheck) => {
            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            if issues
                .iter()
                .any(|i| i.severity == ConfigSeverity::Error)
            {
                std::process::exit(1);
            }
            println!("configuration ok");
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,obspilot=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Read the TOML config; a missing file means defaults.
fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    let config = if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Config::default()
    };

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Error => tracing::error!("{issue}"),
            ConfigSeverity::Warning => tracing::warn!("{issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!("configuration is invalid, see errors above");
    }
    Ok(config)
}

fn build_engine(config: &Config) -> anyhow::Result<Engine> {
    let generator = Arc::new(OpenAiCompatGenerator::from_config(&config.llm)?);
    let sql = sqlite::SqliteExecutor::open(&config.database.path, config.engine.default_row_limit)
        .with_context(|| {
            format!(
                "could not open the trace store at {}",
                config.database.path.display()
            )
        })?;

    let caps = CapabilitySet {
        text: generator.clone(),
        structured: generator,
        sql: Arc::new(sql),
        schema: Arc::new(StaticSchema),
    };
    Ok(Engine::new(caps, config.engine.clone()))
}

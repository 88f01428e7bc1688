/// Shared error type used across all ObsPilot crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    /// A generation/classification/summarization call raised or returned
    /// unusable output. Recovered by falling back to a safe default.
    #[error("capability: {0}")]
    Capability(String),

    /// A static SQL safety check rejected the statement.
    #[error("SQL validation: {0}")]
    SqlValidation(String),

    /// The storage boundary raised while executing a statement.
    #[error("SQL execution: {0}")]
    SqlExecution(String),

    #[error("config: {0}")]
    Config(String),

    /// Not recovered; terminates the conversation on the next router pass.
    /// Reserved for capability implementations that must escalate.
    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

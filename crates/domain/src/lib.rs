//! Shared domain types for ObsPilot.
//!
//! Everything the engine, capabilities, and CLI crates agree on lives
//! here: the conversation state model, chat messages, the shared error
//! type, and the TOML configuration.

pub mod config;
pub mod error;
pub mod message;
pub mod state;
pub mod stream;

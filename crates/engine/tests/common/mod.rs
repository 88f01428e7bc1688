//! Deterministic fakes for the external capabilities.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use op_capabilities::{
    SqlExecutor, SqlMetadata, SqlResult, StaticSchema, StructuredGeneration, TextGeneration,
};
use op_domain::config::EngineConfig;
use op_domain::error::{Error, Result};
use op_domain::message::Message;
use op_engine::{CapabilitySet, Engine};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Structured generation fake
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replays scripted structured responses in order and records every call.
/// An empty script produces a capability error, which exercises the
/// fallback paths.
#[derive(Default)]
pub struct FakeStructured {
    replies: Mutex<VecDeque<Result<Value>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl FakeStructured {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_ok(&self, value: Value) {
        self.replies.lock().push_back(Ok(value));
    }

    pub fn push_err(&self, message: &str) {
        self.replies
            .lock()
            .push_back(Err(Error::Capability(message.to_string())));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// The messages passed to the n-th call.
    pub fn call(&self, index: usize) -> Vec<Message> {
        self.calls.lock()[index].clone()
    }
}

#[async_trait::async_trait]
impl StructuredGeneration for FakeStructured {
    async fn invoke_structured(&self, messages: &[Message], _schema: &Value) -> Result<Value> {
        self.calls.lock().push(messages.to_vec());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Capability("no scripted structured reply".into())))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Text generation fake
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct FakeText {
    replies: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl FakeText {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_ok(&self, text: &str) {
        self.replies.lock().push_back(Ok(text.to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait::async_trait]
impl TextGeneration for FakeText {
    async fn invoke(&self, messages: &[Message]) -> Result<Message> {
        self.calls.lock().push(messages.to_vec());
        match self.replies.lock().pop_front() {
            Some(Ok(text)) => Ok(Message::agent(text)),
            Some(Err(err)) => Err(err),
            None => Err(Error::Capability("no scripted text reply".into())),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SQL execution fake
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Records every statement it is asked to run. With an empty script it
/// returns an empty result set.
#[derive(Default)]
pub struct FakeSql {
    replies: Mutex<VecDeque<Result<SqlResult>>>,
    executed: Mutex<Vec<String>>,
}

impl FakeSql {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_ok(&self, result: SqlResult) {
        self.replies.lock().push_back(Ok(result));
    }

    pub fn push_err(&self, message: &str) {
        self.replies
            .lock()
            .push_back(Err(Error::SqlExecution(message.to_string())));
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait::async_trait]
impl SqlExecutor for FakeSql {
    async fn execute(&self, sql: &str) -> Result<SqlResult> {
        self.executed.lock().push(sql.to_string());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(sql_result(&[], Vec::new())))
    }
}

/// Build a columnar result with default metadata.
pub fn sql_result(columns: &[&str], rows: Vec<Vec<Value>>) -> SqlResult {
    SqlResult {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
        metadata: SqlMetadata::default(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wiring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn capability_set(
    structured: &Arc<FakeStructured>,
    text: &Arc<FakeText>,
    sql: &Arc<FakeSql>,
) -> CapabilitySet {
    CapabilitySet {
        text: text.clone(),
        structured: structured.clone(),
        sql: sql.clone(),
        schema: Arc::new(StaticSchema),
    }
}

pub fn engine(
    structured: &Arc<FakeStructured>,
    text: &Arc<FakeText>,
    sql: &Arc<FakeSql>,
) -> Engine {
    Engine::new(capability_set(structured, text, sql), EngineConfig::default())
}

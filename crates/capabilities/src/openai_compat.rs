//! OpenAI-compatible generation adapter.
//!
//! Works with OpenAI, Azure-less proxies, Ollama, vLLM, LM Studio, and
//! any other endpoint that follows the chat completions contract.
//! Structured generation uses the `json_schema` response format and
//! fails cleanly when the model returns something the caller cannot use.

use serde_json::Value;

use op_domain::config::LlmConfig;
use op_domain::error::{Error, Result};
use op_domain::message::{Message, Role};

use crate::traits::{StructuredGeneration, TextGeneration};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A generation adapter for any OpenAI-compatible API endpoint.
pub struct OpenAiCompatGenerator {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatGenerator {
    /// Create an adapter from the deserialized LLM config, reading the
    /// API key from the configured environment variable.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = if cfg.api_key_env.is_empty() {
            None
        } else {
            std::env::var(&cfg.api_key_env).ok()
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key,
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder
    }

    fn build_body(&self, messages: &[Message], response_format: Option<Value>) -> Value {
        let wire_messages: Vec<Value> = messages.iter().map(msg_to_openai).collect();
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": wire_messages,
            "temperature": 0.2,
        });
        if let Some(format) = response_format {
            body["response_format"] = format;
        }
        body
    }

    /// POST the body and return the first choice's message content.
    async fn complete(&self, body: Value) -> Result<String> {
        let resp = self
            .authed_post(&self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("chat request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            return Err(Error::Capability(format!(
                "generation endpoint returned HTTP {status}: {body_text}"
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| Error::Http(format!("failed to parse chat response: {e}")))?;

        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_owned)
            .ok_or_else(|| Error::Capability("chat response missing message content".into()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability impls
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl TextGeneration for OpenAiCompatGenerator {
    async fn invoke(&self, messages: &[Message]) -> Result<Message> {
        let body = self.build_body(messages, None);
        let content = self.complete(body).await?;
        Ok(Message::agent(content))
    }
}

#[async_trait::async_trait]
impl StructuredGeneration for OpenAiCompatGenerator {
    async fn invoke_structured(&self, messages: &[Message], schema: &Value) -> Result<Value> {
        let format = serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": "structured_response",
                "schema": schema,
                "strict": true,
            }
        });
        let body = self.build_body(messages, Some(format));
        let content = self.complete(body).await?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Capability(format!("structured output is not valid JSON: {e}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::Human => "user",
        Role::Agent => "assistant",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    serde_json::json!({
        "role": role_to_str(msg.role),
        "content": msg.content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_map_to_wire_names() {
        assert_eq!(role_to_str(Role::System), "system");
        assert_eq!(role_to_str(Role::Human), "user");
        assert_eq!(role_to_str(Role::Agent), "assistant");
    }

    #[test]
    fn body_includes_model_and_messages() {
        let cfg = LlmConfig {
            api_key_env: String::new(),
            ..LlmConfig::default()
        };
        let gen = OpenAiCompatGenerator::from_config(&cfg).unwrap();
        let body = gen.build_body(&[Message::human("hi")], None);
        assert_eq!(body["model"], cfg.model.as_str());
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("response_format").is_none());
    }
}

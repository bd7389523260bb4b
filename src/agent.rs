//! Decision agent boundary.
//!
//! A [`DecisionAgent`] receives the rendered prompt as one user message and
//! returns free text. Failures never cross this boundary as errors: they are
//! turned into text starting with [`AGENT_ERROR_SENTINEL`], which the
//! validator rejects like any other non-path answer.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AgentConfig;

/// Prefix of every answer produced by a failed agent call.
pub const AGENT_ERROR_SENTINEL: &str = "AGENT_ERROR_SENTINEL";

#[async_trait]
pub trait DecisionAgent: Send + Sync {
    /// Suggest a destination for the file described by `prompt`.
    async fn suggest(&self, prompt: &str) -> String;
}

/// Format a communication failure as sentinel text.
pub fn sentinel(error: impl std::fmt::Display) -> String {
    format!("{}: error communicating with the model: {}", AGENT_ERROR_SENTINEL, error)
}

/// Chat with a model served by Ollama (`POST {url}/api/chat`).
pub struct OllamaAgent {
    model: String,
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaAgent {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Ollama HTTP client")?;
        Ok(Self {
            model: config.model.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };
        let resp = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to reach Ollama at {}", self.url))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Ollama returned {}: {}", status, text);
        }
        let parsed: ChatResponse = resp.json().await.context("failed to parse Ollama response")?;
        Ok(parsed.message.content)
    }
}

#[async_trait]
impl DecisionAgent for OllamaAgent {
    async fn suggest(&self, prompt: &str) -> String {
        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "asking agent");
        debug!("prompt:\n{}", prompt);
        match tokio::time::timeout(self.timeout, self.chat(prompt)).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!(error = %e, "agent call failed");
                sentinel(format!("{:#}", e))
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "agent call timed out");
                sentinel(format!("timed out after {}s", self.timeout.as_secs()))
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = ChatRequest {
            model: "gemma3",
            messages: vec![ChatMessage {
                role: "user",
                content: "where?",
            }],
            stream: false,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "model": "gemma3",
                "messages": [{"role": "user", "content": "where?"}],
                "stream": false
            })
        );
    }

    #[test]
    fn parses_message_content() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"model":"gemma3","message":{"role":"assistant","content":"/home/u/Docs"},"done":true}"#,
        )
        .unwrap();
        assert_eq!(parsed.message.content, "/home/u/Docs");
    }

    #[tokio::test]
    async fn unreachable_server_becomes_sentinel() {
        let config = AgentConfig {
            // Port 9 (discard) on localhost: nothing listens there in CI.
            url: "http://127.0.0.1:9".into(),
            timeout_secs: 5,
            ..AgentConfig::default()
        };
        let agent = OllamaAgent::new(&config).unwrap();
        let answer = agent.suggest("prompt").await;
        assert!(answer.starts_with(AGENT_ERROR_SENTINEL), "{}", answer);
    }
}

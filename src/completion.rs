//! Chat-completion transport.
//!
//! Every supported provider speaks the same OpenAI-compatible shape:
//! `POST <base>/chat/completions` with a bearer token and an ordered message
//! list, answering with `choices[0].message.content`. [`ChatBackend`] is the
//! seam; [`HttpChatBackend`] is the real implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::providers::ClientConfig;

const TEMPERATURE: f32 = 0.2;
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sends one message list and returns one completion.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, client: &ClientConfig, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpChatBackend {
    http: reqwest::Client,
}

impl HttpChatBackend {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn complete(&self, client: &ClientConfig, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", client.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &client.model,
            messages,
            temperature: TEMPERATURE,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&client.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("{} request failed: {}", client.provider, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(format!(
                "{} API error {}: {}",
                client.provider, status, body
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            Error::upstream(format!("{} returned an unreadable response: {}", client.provider, e))
        })?;
        extract_content(parsed)
    }
}

fn extract_content(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::upstream("completion response contained no choices"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let messages = vec![ChatMessage::user("hi")];
        let request = ChatRequest {
            model: "gpt-4.1-mini",
            messages: &messages,
            temperature: TEMPERATURE,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4.1-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert!((json["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_extract_content() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"hello"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_content(response).unwrap(), "hello");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(extract_content(empty), Err(Error::Upstream(_))));
    }
}

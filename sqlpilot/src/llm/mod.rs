//! Language model boundary.
//!
//! The pipeline treats the model as a black box: a [`CompletionRequest`] goes
//! in, a [`CompletionResponse`] comes out. [`HttpModelClient`] (feature
//! `http-model`) talks to any OpenAI-compatible chat-completions endpoint.

#[cfg(feature = "http-model")]
mod http;
pub mod retry;

#[cfg(feature = "http-model")]
pub use http::HttpModelClient;
pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryPolicy};

use crate::errors::ModelError;
use crate::state::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System prompt.
    pub system: String,
    /// Conversation after the system prompt.
    pub messages: Vec<Message>,
    /// Overrides the client's temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Overrides the client's token limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Creates a request with a system prompt and no messages.
    #[must_use]
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Appends a message.
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A chat completion.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text.
    pub content: String,
    /// Model that answered.
    pub model: String,
    /// Provider name.
    pub provider: String,
    /// Prompt tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    /// Completion tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    /// Round-trip latency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    /// Why generation stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl CompletionResponse {
    /// Creates a response carrying only text.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Returns total tokens.
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens
            .unwrap_or(0)
            .saturating_add(self.output_tokens.unwrap_or(0))
    }

    /// Attributes for tracing spans and events.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("llm.model".to_string(), serde_json::json!(self.model));
        map.insert("llm.provider".to_string(), serde_json::json!(self.provider));
        map.insert("llm.total_tokens".to_string(), serde_json::json!(self.total_tokens()));
        if let Some(l) = self.latency_ms {
            map.insert("llm.latency_ms".to_string(), serde_json::json!(l));
        }
        map
    }
}

/// A chat model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Runs one completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ModelError>;

    /// Model name, for logs.
    fn model_name(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_tokens() {
        let response = CompletionResponse {
            input_tokens: Some(120),
            output_tokens: Some(30),
            ..CompletionResponse::text("SELECT 1")
        };
        assert_eq!(response.total_tokens(), 150);
        assert_eq!(response.to_attributes()["llm.total_tokens"], 150);
    }

    #[test]
    fn test_total_tokens_saturates() {
        let response = CompletionResponse {
            input_tokens: Some(u32::MAX),
            output_tokens: Some(10),
            ..CompletionResponse::text("SELECT 1")
        };
        assert_eq!(response.total_tokens(), u32::MAX);
    }

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new("system")
            .with_message(Message::user("hi"))
            .with_temperature(0.0);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.temperature, Some(0.0));
    }

    #[tokio::test]
    async fn test_mock_model_client() {
        let mut mock = MockModelClient::new();
        mock.expect_complete()
            .returning(|_| Ok(CompletionResponse::text("SELECT 1")));
        let response = mock.complete(CompletionRequest::new("s")).await.unwrap();
        assert_eq!(response.content, "SELECT 1");
    }
}

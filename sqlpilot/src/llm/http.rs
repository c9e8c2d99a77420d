//! OpenAI-compatible chat-completions client.

use super::retry::with_retry;
use super::{CompletionRequest, CompletionResponse, ModelClient};
use crate::config::ModelConfig;
use crate::errors::ModelError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};

const BODY_PREVIEW_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

/// Calls `{base_url}/chat/completions`, retrying 429 and 5xx answers.
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    http: reqwest::Client,
    config: ModelConfig,
}

impl HttpModelClient {
    /// Builds a client; fails if no API key is configured.
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        if config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ModelError::NotConfigured("missing API key".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ModelError::Http(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut messages = vec![json!({ "role": "system", "content": request.system })];
        messages.extend(
            request
                .messages
                .iter()
                .map(|m| json!({ "role": m.role, "content": m.content })),
        );
        json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": request.temperature.unwrap_or(self.config.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
        })
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<ChatCompletion, ModelError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .json(body)
            .send()
            .await
            .map_err(|e| ModelError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                code: status.as_u16(),
                body: text.chars().take(BODY_PREVIEW_CHARS).collect(),
            });
        }

        response
            .json::<ChatCompletion>()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ModelError> {
        let body = self.body(&request);
        let start = Instant::now();
        let completion = with_retry(
            &self.config.retry,
            &self.config.model,
            ModelError::is_retryable,
            || self.send_once(&body),
        )
        .await?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyCompletion)?;
        let content = choice.message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ModelError::EmptyCompletion);
        }

        let response = CompletionResponse {
            content,
            model: completion.model.unwrap_or_else(|| self.config.model.clone()),
            provider: "openai-compatible".to_string(),
            input_tokens: completion.usage.as_ref().and_then(|u| u.prompt_tokens),
            output_tokens: completion.usage.as_ref().and_then(|u| u.completion_tokens),
            latency_ms: Some(crate::utils::elapsed_ms(start)),
            finish_reason: choice.finish_reason,
        };
        tracing::debug!(
            model = %response.model,
            total_tokens = response.total_tokens(),
            latency_ms = response.latency_ms,
            "Model completion received"
        );
        Ok(response)
    }

    fn model_name(&self) -> String {
        self.config.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::RetryPolicy;
    use crate::state::Message;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const COMPLETION: &str = r#"{"model":"deepseek-chat",
        "choices":[{"message":{"content":"SELECT COUNT(*) FROM teachers"},"finish_reason":"stop"}],
        "usage":{"prompt_tokens":40,"completion_tokens":8}}"#;

    /// Answers one connection per canned reply and returns the request
    /// bodies it received.
    async fn serve(replies: Vec<(u16, &'static str)>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let mut bodies = Vec::new();
            for (status, body) in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                bodies.push(read_body(&mut socket).await);
                let response = format!(
                    "HTTP/1.1 {status} Status\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            bodies
        });
        (base_url, server)
    }

    async fn read_body(socket: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return String::from_utf8_lossy(&raw).into_owned();
            }
            raw.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&raw);
            let Some(end) = text.find("\r\n\r\n") else {
                continue;
            };
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().unwrap_or(0))
                })
                .unwrap_or(0);
            if text.len() >= end + 4 + length {
                return text[end + 4..].to_string();
            }
        }
    }

    fn client_for(base_url: String) -> HttpModelClient {
        let config = ModelConfig {
            base_url,
            retry: RetryPolicy::new().with_base_delay_ms(0),
            ..ModelConfig::default().with_api_key("k")
        };
        HttpModelClient::new(config).unwrap()
    }

    #[test]
    fn test_requires_api_key() {
        let err = HttpModelClient::new(ModelConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::NotConfigured(_)));
    }

    #[test]
    fn test_body_has_system_prompt_first() {
        let client = HttpModelClient::new(ModelConfig::default().with_api_key("k")).unwrap();
        let body = client.body(
            &CompletionRequest::new("You write SQL").with_message(Message::user("count students")),
        );
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "count students");
        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(client.endpoint(), "https://api.deepseek.com/chat/completions");
    }

    #[test]
    fn test_decode_completion() {
        let raw = r#"{"model":"m","choices":[{"message":{"content":"SELECT 1"},"finish_reason":"stop"}],
                      "usage":{"prompt_tokens":10,"completion_tokens":2}}"#;
        let parsed: ChatCompletion = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("SELECT 1"));
        assert_eq!(parsed.usage.unwrap().completion_tokens, Some(2));
    }

    #[tokio::test]
    async fn test_complete_posts_chat_and_reads_usage() {
        let (base_url, server) = serve(vec![(200, COMPLETION)]).await;
        let response = client_for(base_url)
            .complete(CompletionRequest::new("You write SQL").with_message(Message::user("count teachers")))
            .await
            .unwrap();

        assert_eq!(response.content, "SELECT COUNT(*) FROM teachers");
        assert_eq!(response.total_tokens(), 48);
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
        assert!(response.latency_ms.is_some());

        let bodies = server.await.unwrap();
        let sent: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(sent["messages"][0]["content"], "You write SQL");
        assert_eq!(sent["messages"][1]["content"], "count teachers");
    }

    #[tokio::test]
    async fn test_complete_retries_unavailable_server() {
        let (base_url, server) =
            serve(vec![(503, r#"{"error":"busy"}"#), (200, COMPLETION)]).await;
        let response = client_for(base_url)
            .complete(CompletionRequest::new("You write SQL"))
            .await
            .unwrap();

        assert_eq!(response.model, "deepseek-chat");
        assert_eq!(server.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_complete_does_not_retry_bad_request() {
        let (base_url, server) = serve(vec![(400, r#"{"error":"bad model"}"#)]).await;
        let err = client_for(base_url)
            .complete(CompletionRequest::new("You write SQL"))
            .await
            .unwrap_err();

        assert!(matches!(err, ModelError::Status { code: 400, ref body } if body.contains("bad model")));
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_complete_without_choices_is_empty() {
        let (base_url, _server) = serve(vec![(200, r#"{"choices":[]}"#)]).await;
        let err = client_for(base_url)
            .complete(CompletionRequest::new("You write SQL"))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::EmptyCompletion));
    }
}

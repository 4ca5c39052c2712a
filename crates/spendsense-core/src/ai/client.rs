//! Remote vision model client
//!
//! Talks to an OpenAI-style `chat/completions` endpoint (the default is
//! NVIDIA's hosted Llama 3.2 Vision). The whole request is one user message
//! whose text embeds the taxonomy, the output schema and the image as a
//! base64 data URI.
//!
//! Resilience:
//! - Images whose encoded form exceeds the configured limit are refused
//!   before any network traffic.
//! - 429/500/502/503/504 and connect/timeout failures are retried with
//!   exponential backoff (see `retry`).
//! - Other non-2xx statuses fail immediately as `ClientRejected`.
//! - The request timeout applies to each attempt separately.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ApiConfig, RetryConfig};
use crate::error::{ApiError, Result};
use crate::models::Category;

use super::prompt::{build_classification_prompt, data_uri, encode_image, sniff_mime};
use super::retry::{AttemptOutcome, RetryDecision, RetryPolicy};
use super::types::RawModelReply;

/// Longest upstream body kept in an error, in characters
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Client for the remote classification model
#[derive(Clone)]
pub struct ModelClient {
    http_client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    max_encoded_image_bytes: usize,
    retry: RetryPolicy,
}

impl ModelClient {
    /// Build a client from config
    ///
    /// Fails only if the HTTP client cannot be constructed (TLS backend).
    pub fn from_config(api: &ApiConfig, retry: &RetryConfig) -> Result<Self> {
        let http_client = Client::builder().timeout(api.request_timeout()).build()?;
        Ok(Self {
            http_client,
            endpoint: api.endpoint.clone(),
            api_key: api.api_key.clone(),
            model: api.model.clone(),
            max_tokens: api.max_tokens,
            temperature: api.temperature,
            top_p: api.top_p,
            max_encoded_image_bytes: api.max_encoded_image_bytes,
            retry: RetryPolicy::from_config(retry),
        })
    }

    /// Create a client for an endpoint with default settings
    pub fn new(endpoint: &str, api_key: Option<&str>) -> Result<Self> {
        let api = ApiConfig {
            endpoint: endpoint.to_string(),
            api_key: api_key.map(str::to_string),
            ..ApiConfig::default()
        };
        Self::from_config(&api, &RetryConfig::default())
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the encoded image size limit
    pub fn with_max_encoded_image_bytes(mut self, limit: usize) -> Self {
        self.max_encoded_image_bytes = limit;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a receipt image for classification
    pub async fn classify(
        &self,
        image: &[u8],
        taxonomy: &[Category],
    ) -> std::result::Result<RawModelReply, ApiError> {
        let encoded = encode_image(image);
        if encoded.len() > self.max_encoded_image_bytes {
            return Err(ApiError::PayloadTooLarge {
                size: encoded.len(),
                limit: self.max_encoded_image_bytes,
            });
        }

        let prompt = build_classification_prompt(taxonomy, &data_uri(sniff_mime(image), &encoded));
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        };

        let mut state = self.retry.start();
        loop {
            let attempt = self.send_once(&request).await;
            let outcome = attempt.outcome();
            let decision = state.record(outcome);

            match (attempt, decision) {
                (Attempt::Success(body), _) => {
                    debug!(attempts = state.attempts(), "Classification response received");
                    return parse_envelope(&body, state.attempts());
                }
                (attempt, RetryDecision::RetryAfter(delay)) => {
                    warn!(
                        attempt = state.attempts(),
                        max = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        failure = %attempt.describe(),
                        "Transient classification failure, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                (Attempt::Status { status, body }, _) if outcome == AttemptOutcome::Transient => {
                    warn!(attempts = state.attempts(), status, "Classification retries exhausted");
                    return Err(ApiError::Exhausted {
                        last_status: status,
                        last_body: body,
                    });
                }
                (Attempt::Status { status, body }, _) => {
                    warn!(status, "Classification request rejected");
                    return Err(ApiError::ClientRejected { status, body });
                }
                (Attempt::Transport { message, .. }, _) => {
                    warn!(attempts = state.attempts(), error = %message, "Classification service unreachable");
                    return Err(ApiError::TransportFailure {
                        message,
                        attempts: state.attempts(),
                    });
                }
            }
        }
    }

    /// One POST, no retries
    async fn send_once(&self, request: &ChatCompletionRequest) -> Attempt {
        let mut req_builder = self
            .http_client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        debug!(endpoint = %self.endpoint, model = %self.model, "Sending classification request");

        let response = match req_builder.send().await {
            Ok(response) => response,
            Err(e) => return Attempt::transport(&e),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Attempt::transport(&e),
        };

        if status.is_success() {
            Attempt::Success(body)
        } else {
            Attempt::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            }
        }
    }
}

/// Result of a single HTTP attempt
enum Attempt {
    Success(String),
    Status { status: u16, body: String },
    Transport { message: String, retryable: bool },
}

impl Attempt {
    fn transport(e: &reqwest::Error) -> Self {
        Attempt::Transport {
            message: e.to_string(),
            retryable: e.is_connect() || e.is_timeout(),
        }
    }

    fn outcome(&self) -> AttemptOutcome {
        match self {
            Attempt::Success(_) => AttemptOutcome::Success,
            Attempt::Status { status, .. } => AttemptOutcome::from_status(*status),
            Attempt::Transport { retryable: true, .. } => AttemptOutcome::Transient,
            Attempt::Transport { retryable: false, .. } => AttemptOutcome::Fatal,
        }
    }

    fn describe(&self) -> String {
        match self {
            Attempt::Success(_) => "success".to_string(),
            Attempt::Status { status, .. } => format!("status {}", status),
            Attempt::Transport { message, .. } => message.clone(),
        }
    }
}

fn parse_envelope(body: &str, attempts: u32) -> std::result::Result<RawModelReply, ApiError> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::InvalidEnvelope(e.to_string()))?;

    Ok(RawModelReply {
        content: response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content),
        model: response.model,
        attempts,
    })
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_utils::{chat_completion_body, MockModelServer};

    const DAIRY_REPLY: &str = r#"{"items":{"Dairy":[{"description":"Milk","amount":3.5}]},"totals":{"Dairy":3.5}}"#;

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn client_for(server: &MockModelServer, max_attempts: u32) -> ModelClient {
        ModelClient::new(&server.url(), Some("test-key"))
            .unwrap()
            .with_retry_policy(fast_retry(max_attempts))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let server = MockModelServer::start(vec![
            (503, "busy".to_string()),
            (503, "busy".to_string()),
            (200, chat_completion_body(DAIRY_REPLY)),
        ])
        .await;
        let client = client_for(&server, 5);

        let reply = client.classify(b"\x89PNG fake", &Category::ALL).await.unwrap();

        assert_eq!(server.hits(), 3);
        assert_eq!(reply.attempts, 3);
        assert_eq!(reply.content.as_deref(), Some(DAIRY_REPLY));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockModelServer::start(vec![
            (400, "bad request".to_string()),
            (200, chat_completion_body(DAIRY_REPLY)),
        ])
        .await;
        let client = client_for(&server, 5);

        let err = client.classify(b"img", &Category::ALL).await.unwrap_err();

        assert_eq!(server.hits(), 1);
        assert_eq!(
            err,
            ApiError::ClientRejected {
                status: 400,
                body: "bad request".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockModelServer::start(vec![(401, "no".to_string())]).await;
        let client = client_for(&server, 5);

        let err = client.classify(b"img", &Category::ALL).await.unwrap_err();

        assert_eq!(server.hits(), 1);
        assert_eq!(err.code(), "client_rejected");
    }

    #[tokio::test]
    async fn test_exhausted_reports_last_status() {
        let server = MockModelServer::start(vec![
            (429, "slow down".to_string()),
            (502, "gateway".to_string()),
            (504, "timeout".to_string()),
        ])
        .await;
        let client = client_for(&server, 3);

        let err = client.classify(b"img", &Category::ALL).await.unwrap_err();

        assert_eq!(server.hits(), 3);
        assert_eq!(
            err,
            ApiError::Exhausted {
                last_status: 504,
                last_body: "timeout".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_oversized_image_makes_no_call() {
        let server = MockModelServer::start(vec![(200, chat_completion_body(DAIRY_REPLY))]).await;
        let client = client_for(&server, 5).with_max_encoded_image_bytes(8);

        let err = client.classify(&[0u8; 64], &Category::ALL).await.unwrap_err();

        assert_eq!(server.hits(), 0);
        assert!(matches!(err, ApiError::PayloadTooLarge { limit: 8, .. }));
    }

    #[tokio::test]
    async fn test_request_carries_auth_and_inline_image() {
        let server = MockModelServer::start(vec![(200, chat_completion_body(DAIRY_REPLY))]).await;
        let client = client_for(&server, 1);

        client.classify(b"ABC", &Category::ALL).await.unwrap();

        let request = server.last_request().expect("request recorded");
        assert_eq!(request.authorization.as_deref(), Some("Bearer test-key"));
        assert_eq!(request.body["model"], client.model());
        assert_eq!(request.body["max_tokens"], 512);
        assert_eq!(request.body["messages"][0]["role"], "user");
        let content = request.body["messages"][0]["content"].as_str().unwrap();
        assert!(content.contains("data:image/png;base64,QUJD"));
        assert!(content.contains("Produce: Fruits, vegetables, fresh herbs."));
    }

    fn closed_port() -> std::net::SocketAddr {
        // Bind then drop a listener so the port is closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn test_unreachable_service_is_retried_then_transport_failure() {
        let client = ModelClient::new(&format!("http://{}", closed_port()), None)
            .unwrap()
            .with_retry_policy(fast_retry(3));

        let err = client.classify(b"img", &Category::ALL).await.unwrap_err();

        match err {
            ApiError::TransportFailure { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected transport failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_error_is_transient() {
        let http = Client::new();
        let e = http
            .post(format!("http://{}", closed_port()))
            .send()
            .await
            .unwrap_err();

        let attempt = Attempt::transport(&e);

        assert!(e.is_connect());
        assert_eq!(attempt.outcome(), AttemptOutcome::Transient);
    }

    #[tokio::test]
    async fn test_non_chat_body_is_invalid_envelope() {
        let server = MockModelServer::start(vec![(200, "<html>ok</html>".to_string())]).await;
        let client = client_for(&server, 1);

        let err = client.classify(b"img", &Category::ALL).await.unwrap_err();

        assert_eq!(err.code(), "invalid_envelope");
    }

    #[tokio::test]
    async fn test_empty_choices_yield_no_content() {
        let server = MockModelServer::start(vec![(200, r#"{"choices": []}"#.to_string())]).await;
        let client = client_for(&server, 1);

        let reply = client.classify(b"img", &Category::ALL).await.unwrap();

        assert_eq!(reply.content, None);
    }

    #[test]
    fn test_truncate_long_bodies() {
        let long = "x".repeat(600);
        let out = truncate(&long, MAX_ERROR_BODY_CHARS);
        assert_eq!(out.len(), MAX_ERROR_BODY_CHARS + 3);
        assert_eq!(truncate("short", 10), "short");
    }
}

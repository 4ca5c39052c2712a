//! Test utilities for spendsense-core
//!
//! Provides a mock chat-completions server that replays a scripted sequence
//! of responses, counts hits and records the last request, so retry
//! behavior can be tested against real HTTP.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use tokio::sync::oneshot;

/// Path the mock serves, mirroring hosted chat-completion APIs
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Request as seen by the mock server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

#[derive(Default)]
struct MockState {
    script: Mutex<VecDeque<(u16, String)>>,
    hits: AtomicUsize,
    last_request: Mutex<Option<RecordedRequest>>,
}

/// Mock model server for testing
pub struct MockModelServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockModelServer {
    /// Start the mock server on an available port
    ///
    /// Each request consumes the next `(status, body)` pair from the
    /// script; once it runs out every request gets a 500.
    pub async fn start(script: Vec<(u16, String)>) -> Self {
        let state = Arc::new(MockState {
            script: Mutex::new(script.into()),
            ..Default::default()
        });

        let app = Router::new()
            .route(CHAT_COMPLETIONS_PATH, post(handle_chat_completion))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Full endpoint URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}{}", self.addr, CHAT_COMPLETIONS_PATH)
    }

    /// Requests received so far
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Most recent request, if any
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.last_request.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockModelServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_chat_completion(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let recorded = RecordedRequest {
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    };
    *state.last_request.lock().unwrap() = Some(recorded);

    let next = state.script.lock().unwrap().pop_front();
    match next {
        Some((status, body)) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        ),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "no scripted response left".to_string(),
        ),
    }
}

/// Wrap model text in a chat-completion envelope
pub fn chat_completion_body(content: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": "mock-vision",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

//! Mock classifier for testing
//!
//! Returns a fixed reply (or a fixed error) without any network traffic.
//! Useful for unit tests and for running the server without an API key.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::models::Category;

use super::types::RawModelReply;
use super::ReceiptClassifier;

/// Reply used by `MockClassifier::new()`: a small grocery run wrapped in the
/// kind of prose real models add
pub const SAMPLE_REPLY: &str = r#"Here is the categorized receipt:
{
  "items": {
    "Produce": [{"description": "Bananas", "amount": 1.29}, {"description": "Spinach", "amount": 3.49}],
    "Dairy": [{"description": "Whole Milk", "amount": 3.50}],
    "Bakery": [{"description": "Sourdough Loaf", "amount": 5.99}]
  },
  "totals": {"Produce": 4.78, "Dairy": 3.50, "Bakery": 5.99}
}
Let me know if you need anything else!"#;

/// Mock classifier
///
/// Clones share the call counter.
#[derive(Clone)]
pub struct MockClassifier {
    response: Result<Option<String>, ApiError>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClassifier {
    /// Mock that always answers with `SAMPLE_REPLY`
    pub fn new() -> Self {
        Self::with_reply(SAMPLE_REPLY)
    }

    /// Mock that always answers with the given text
    pub fn with_reply(content: impl Into<String>) -> Self {
        Self {
            response: Ok(Some(content.into())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mock whose reply has no content at all
    pub fn empty() -> Self {
        Self {
            response: Ok(None),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mock that always fails with the given error
    pub fn failing(error: ApiError) -> Self {
        Self {
            response: Err(error),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many times `classify` was called
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReceiptClassifier for MockClassifier {
    async fn classify(
        &self,
        _image: &[u8],
        _taxonomy: &[Category],
    ) -> Result<RawModelReply, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone().map(|content| RawModelReply {
            content,
            model: Some("mock".to_string()),
            attempts: 1,
        })
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

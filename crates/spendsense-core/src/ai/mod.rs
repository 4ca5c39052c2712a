//! Receipt classifier abstraction
//!
//! # Architecture
//!
//! - `ReceiptClassifier` trait: sends an image plus taxonomy, returns the raw reply
//! - `ClassifierClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Implementations: `ModelClient` (remote, with retries) and `MockClassifier`
//! - `parsing`: turns the raw reply into a validated `CategorizationResult`
//!
//! # Usage
//!
//! ```rust,ignore
//! let config = Config::load(None)?;
//! if let Some(classifier) = ClassifierClient::from_config(&config)? {
//!     let reply = classifier.classify(&image, &Category::ALL).await?;
//!     let result = extract_categorization(reply.content.as_deref())?;
//! }
//! ```

mod client;
mod mock;
pub mod parsing;
pub mod prompt;
pub mod retry;
pub mod types;

pub use client::ModelClient;
pub use mock::{MockClassifier, SAMPLE_REPLY};
pub use parsing::extract_categorization;
pub use retry::{AttemptOutcome, RetryDecision, RetryPolicy, RetryState};
pub use types::RawModelReply;

use async_trait::async_trait;
use tracing::info;

use crate::config::{BackendKind, Config};
use crate::error::{ApiError, Result};
use crate::models::Category;

/// Interface every classifier backend implements
#[async_trait]
pub trait ReceiptClassifier: Send + Sync {
    /// Ask the model to categorize the items on a receipt image
    ///
    /// Long-running: with retries this can take up to
    /// `max_attempts × request_timeout` plus backoff.
    async fn classify(
        &self,
        image: &[u8],
        taxonomy: &[Category],
    ) -> std::result::Result<RawModelReply, ApiError>;

    /// Model name (for logging)
    fn model(&self) -> &str;

    /// Endpoint (for logging)
    fn host(&self) -> &str;
}

#[async_trait]
impl ReceiptClassifier for ModelClient {
    async fn classify(
        &self,
        image: &[u8],
        taxonomy: &[Category],
    ) -> std::result::Result<RawModelReply, ApiError> {
        ModelClient::classify(self, image, taxonomy).await
    }

    fn model(&self) -> &str {
        ModelClient::model(self)
    }

    fn host(&self) -> &str {
        self.endpoint()
    }
}

/// Concrete classifier enum
#[derive(Clone)]
pub enum ClassifierClient {
    /// Remote vision model over HTTP
    Remote(ModelClient),
    /// Canned replies for tests and offline runs
    Mock(MockClassifier),
}

impl ClassifierClient {
    /// Build the configured classifier
    ///
    /// Returns `None` for the remote backend when no API key is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        match config.api.backend {
            BackendKind::Mock => Ok(Some(ClassifierClient::Mock(MockClassifier::new()))),
            BackendKind::Remote if config.api.api_key.is_none() => {
                info!("No API key configured (set SPENDSENSE_API_KEY to enable classification)");
                Ok(None)
            }
            BackendKind::Remote => {
                let client = ModelClient::from_config(&config.api, &config.retry)?;
                Ok(Some(ClassifierClient::Remote(client)))
            }
        }
    }

    /// Create a mock classifier with the sample reply
    pub fn mock() -> Self {
        ClassifierClient::Mock(MockClassifier::new())
    }
}

#[async_trait]
impl ReceiptClassifier for ClassifierClient {
    async fn classify(
        &self,
        image: &[u8],
        taxonomy: &[Category],
    ) -> std::result::Result<RawModelReply, ApiError> {
        match self {
            ClassifierClient::Remote(c) => ReceiptClassifier::classify(c, image, taxonomy).await,
            ClassifierClient::Mock(c) => c.classify(image, taxonomy).await,
        }
    }

    fn model(&self) -> &str {
        match self {
            ClassifierClient::Remote(c) => ReceiptClassifier::model(c),
            ClassifierClient::Mock(c) => c.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            ClassifierClient::Remote(c) => ReceiptClassifier::host(c),
            ClassifierClient::Mock(c) => c.host(),
        }
    }
}

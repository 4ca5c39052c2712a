//! Receipt classification pipeline
//!
//! Drives one receipt through
//! `Received → Encoded → Submitted → Extracted → Persisted → Done`.
//! A failure at any step is returned as a `PipelineError` carrying the stage
//! it happened in, and nothing is written to the store.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::ai::{extract_categorization, ClassifierClient, ReceiptClassifier};
use crate::db::Database;
use crate::error::{ApiError, PipelineError, StoreError};
use crate::models::{CategorizationResult, Category, CategorySummary, NewExpense};

/// Where a receipt is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Encoded,
    Submitted,
    Extracted,
    Persisted,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Encoded => "encoded",
            Self::Submitted => "submitted",
            Self::Extracted => "extracted",
            Self::Persisted => "persisted",
            Self::Done => "done",
        }
    }

    /// What the pipeline is doing while in this stage
    fn activity(&self) -> &'static str {
        match self {
            Self::Received => "receiving the image",
            Self::Encoded => "encoding the image",
            Self::Submitted => "submitting to the model",
            Self::Extracted => "extracting line items",
            Self::Persisted => "saving expenses",
            Self::Done => "finishing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.activity())
    }
}

/// Hex SHA-256 of the receipt image
pub fn receipt_hash(image: &[u8]) -> String {
    hex::encode(Sha256::digest(image))
}

/// Classifies receipts and records their line items
///
/// Holds its classifier and store explicitly; clone it freely (both are
/// cheap handles).
#[derive(Clone)]
pub struct ClassificationPipeline {
    classifier: ClassifierClient,
    db: Database,
}

impl ClassificationPipeline {
    pub fn new(classifier: ClassifierClient, db: Database) -> Self {
        Self { classifier, db }
    }

    pub fn classifier(&self) -> &ClassifierClient {
        &self.classifier
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Classify one receipt image and persist its line items
    ///
    /// Returns the per-category totals of this receipt. On success exactly
    /// one batch is appended; on any failure nothing is written.
    pub async fn process(&self, image: &[u8]) -> Result<CategorySummary, PipelineError> {
        // Ingestion time is the record time for every item on this receipt
        let recorded_at = Utc::now();

        let result = self
            .process_inner(image, recorded_at)
            .await
            .inspect_err(|e| {
                warn!(
                    "Receipt classification failed at stage {} ({}): {}",
                    e.stage().as_str(),
                    e.code(),
                    e
                );
            })?;

        debug!("stage: {}", Stage::Done.as_str());
        Ok(result)
    }

    async fn process_inner(
        &self,
        image: &[u8],
        recorded_at: DateTime<Utc>,
    ) -> Result<CategorySummary, PipelineError> {
        if image.is_empty() {
            return Err(PipelineError::NoImage);
        }
        let hash = receipt_hash(image);
        debug!(
            "stage: {} ({} bytes, receipt {})",
            Stage::Received.as_str(),
            image.len(),
            &hash[..12]
        );

        let reply = self
            .classifier
            .classify(image, &Category::ALL)
            .await
            .map_err(upstream_failure)?;
        debug!(
            "stage: {} (model {}, {} attempt(s))",
            Stage::Submitted.as_str(),
            reply.model.as_deref().unwrap_or(self.classifier.model()),
            reply.attempts
        );

        let result = extract_categorization(reply.content.as_deref())
            .map_err(|source| PipelineError::UnparseableResponse { source })?;
        debug!(
            "stage: {} ({} item(s) in {} categories)",
            Stage::Extracted.as_str(),
            result.item_count(),
            result.totals.len()
        );

        let batch = to_expenses(&result, recorded_at, &hash);
        self.db.append_batch(&batch)?;
        info!(
            "Recorded receipt {} with {} item(s), total {}",
            &hash[..12],
            batch.len(),
            result.grand_total()
        );
        debug!("stage: {}", Stage::Persisted.as_str());

        Ok(result.totals)
    }

    /// Per-category totals over the trailing window ending at `now`
    pub fn summary(
        &self,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<CategorySummary, StoreError> {
        self.db.aggregate(window, now)
    }
}

/// Oversize images are rejected while encoding; everything else happens
/// once the request is on its way
fn upstream_failure(source: ApiError) -> PipelineError {
    let stage = match source {
        ApiError::PayloadTooLarge { .. } => Stage::Encoded,
        _ => Stage::Submitted,
    };
    PipelineError::UpstreamFailure { stage, source }
}

fn to_expenses(
    result: &CategorizationResult,
    recorded_at: DateTime<Utc>,
    receipt_hash: &str,
) -> Vec<NewExpense> {
    result
        .line_items()
        .map(|item| NewExpense {
            description: item.description.clone(),
            category: item.category,
            amount: item.amount,
            recorded_at,
            receipt_hash: receipt_hash.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockClassifier;
    use rust_decimal::Decimal;

    const DAIRY_ONLY: &str = r#"{"items": {"Dairy": [{"description": "Milk", "amount": 3.50}]}, "totals": {"Dairy": 3.50}}"#;

    fn pipeline_with(mock: MockClassifier) -> ClassificationPipeline {
        let db = Database::in_memory().unwrap();
        ClassificationPipeline::new(ClassifierClient::Mock(mock), db)
    }

    #[tokio::test]
    async fn test_dairy_receipt_end_to_end() {
        let pipeline = pipeline_with(MockClassifier::with_reply(DAIRY_ONLY));

        let totals = pipeline.process(b"fake-png-bytes").await.unwrap();

        assert_eq!(totals.len(), 1);
        assert_eq!(totals[&Category::Dairy], Decimal::new(350, 2));

        let stored = pipeline.db().list_expenses(10).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].description, "Milk");
        assert_eq!(stored[0].receipt_hash, receipt_hash(b"fake-png-bytes"));
    }

    #[tokio::test]
    async fn test_recorded_at_is_ingestion_time() {
        let pipeline = pipeline_with(MockClassifier::with_reply(DAIRY_ONLY));

        let before = Utc::now();
        pipeline.process(b"img").await.unwrap();
        let after = Utc::now();

        let stored = pipeline.db().list_expenses(1).unwrap();
        // Stored with millisecond precision
        assert!(stored[0].recorded_at >= before - Duration::milliseconds(1));
        assert!(stored[0].recorded_at <= after);
    }

    #[tokio::test]
    async fn test_all_items_share_one_batch() {
        let pipeline = pipeline_with(MockClassifier::new());

        let totals = pipeline.process(b"img").await.unwrap();
        let stored = pipeline.db().list_expenses(100).unwrap();

        assert_eq!(stored.len(), 4);
        assert!(stored.iter().all(|e| e.receipt_hash == stored[0].receipt_hash));
        assert!(stored.iter().all(|e| e.recorded_at == stored[0].recorded_at));
        assert_eq!(totals[&Category::Produce], Decimal::new(478, 2));
    }

    #[tokio::test]
    async fn test_empty_image_never_calls_model() {
        let mock = MockClassifier::new();
        let pipeline = pipeline_with(mock.clone());

        let err = pipeline.process(b"").await.unwrap_err();

        assert_eq!(err, PipelineError::NoImage);
        assert_eq!(err.stage(), Stage::Received);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_writes_nothing() {
        let pipeline = pipeline_with(MockClassifier::failing(ApiError::Exhausted {
            last_status: 503,
            last_body: "busy".into(),
        }));

        let err = pipeline.process(b"img").await.unwrap_err();

        assert_eq!(err.code(), "exhausted");
        assert_eq!(err.stage(), Stage::Submitted);
        assert_eq!(pipeline.db().count_expenses().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oversize_image_fails_while_encoding() {
        let pipeline = pipeline_with(MockClassifier::failing(ApiError::PayloadTooLarge {
            size: 200_000,
            limit: 180_000,
        }));

        let err = pipeline.process(b"img").await.unwrap_err();
        assert_eq!(err.stage(), Stage::Encoded);
        assert_eq!(err.code(), "payload_too_large");
    }

    #[tokio::test]
    async fn test_unparseable_reply_writes_nothing() {
        let pipeline = pipeline_with(MockClassifier::with_reply("I can't read this receipt"));

        let err = pipeline.process(b"img").await.unwrap_err();

        assert!(matches!(err, PipelineError::UnparseableResponse { .. }));
        assert_eq!(err.code(), "no_json_found");
        assert_eq!(pipeline.db().count_expenses().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_reply_is_unparseable() {
        let pipeline = pipeline_with(MockClassifier::empty());
        let err = pipeline.process(b"img").await.unwrap_err();
        assert_eq!(err.code(), "empty_response");
    }

    #[tokio::test]
    async fn test_summary_reflects_processed_receipts() {
        let pipeline = pipeline_with(MockClassifier::with_reply(DAIRY_ONLY));

        pipeline.process(b"first").await.unwrap();
        pipeline.process(b"second").await.unwrap();

        let summary = pipeline.summary(Duration::days(30), Utc::now()).unwrap();
        assert_eq!(summary[&Category::Dairy], Decimal::new(700, 2));
    }

    #[test]
    fn test_receipt_hash_is_sha256_hex() {
        assert_eq!(
            receipt_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Submitted.to_string(), "submitting to the model");
        assert_eq!(Stage::Persisted.as_str(), "persisted");
    }
}

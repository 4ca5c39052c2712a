//! SpendSense Core Library
//!
//! Shared functionality for the SpendSense receipt tracker:
//! - Vision-model client with bounded retries and backoff
//! - Extraction of categorized line items from free-form model replies
//! - Classification pipeline (image → model → line items → ledger)
//! - Append-only SQLite expense ledger with windowed aggregation
//! - Layered configuration (defaults, TOML file, environment)

pub mod ai;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;

/// Test utilities including a mock chat-completions server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    extract_categorization, ClassifierClient, MockClassifier, ModelClient, RawModelReply,
    ReceiptClassifier, RetryPolicy,
};
pub use config::{
    ApiConfig, BackendKind, Config, DashboardConfig, RetryConfig, MAX_WINDOW_DAYS,
};
pub use db::Database;
pub use error::{ApiError, Error, ExtractionError, PipelineError, Result, StoreError};
pub use models::{
    CategorizationResult, Category, CategorySummary, ExpenseRecord, LineItem, NewExpense,
};
pub use pipeline::{receipt_hash, ClassificationPipeline, Stage};

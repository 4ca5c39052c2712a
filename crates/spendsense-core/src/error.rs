//! Error types for SpendSense
//!
//! `Error` covers setup failures (opening the database, loading config).
//! The classification path uses one tagged enum per component so callers can
//! tell apart "could not reach the model", "the model said something we can't
//! read" and "we could not save it". Every variant exposes a stable `code()`
//! for machine consumers.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to the remote classification model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Encoded image is over the configured limit; nothing was sent
    #[error("Encoded image is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// The service could not be reached (connect, TLS, timeout)
    #[error("Could not reach classification service after {attempts} attempt(s): {message}")]
    TransportFailure { message: String, attempts: u32 },

    /// Non-transient 4xx; never retried
    #[error("Classification service rejected the request with status {status}")]
    ClientRejected { status: u16, body: String },

    /// Every attempt got a transient status
    #[error("Classification service still failing after retries (last status {last_status})")]
    Exhausted { last_status: u16, last_body: String },

    /// 2xx response whose body is not a chat completion
    #[error("Unexpected response envelope: {0}")]
    InvalidEnvelope(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::TransportFailure { .. } => "transport_failure",
            Self::ClientRejected { .. } => "client_rejected",
            Self::Exhausted { .. } => "exhausted",
            Self::InvalidEnvelope(_) => "invalid_envelope",
        }
    }
}

/// Failures turning the model's reply text into a categorization
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("No JSON object found in model response")]
    NoJsonFound,

    #[error("Invalid JSON in model response: {0}")]
    SyntaxError(String),

    #[error("Model response is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Model response has an unexpected shape: {0}")]
    InvalidShape(String),

    #[error("Reported total for {category} is {reported}, items sum to {computed}")]
    InconsistentTotals {
        category: String,
        reported: Decimal,
        computed: Decimal,
    },
}

impl ExtractionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyResponse => "empty_response",
            Self::NoJsonFound => "no_json_found",
            Self::SyntaxError(_) => "syntax_error",
            Self::MissingField(_) => "missing_field",
            Self::InvalidShape(_) => "invalid_shape",
            Self::InconsistentTotals { .. } => "inconsistent_totals",
        }
    }
}

/// Expense ledger failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Batch was rolled back; nothing from it is visible
    #[error("Failed to write expenses: {0}")]
    WriteFailed(String),

    #[error("Failed to read expenses: {0}")]
    ReadFailed(String),

    #[error("Expense store unavailable: {0}")]
    Unavailable(String),

    /// Aggregation window reaches outside the representable time range
    #[error("Invalid aggregation window: {0}")]
    InvalidWindow(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::WriteFailed(_) => "write_failed",
            Self::ReadFailed(_) => "read_failed",
            Self::Unavailable(_) => "store_unavailable",
            Self::InvalidWindow(_) => "invalid_window",
        }
    }
}

/// Everything `ClassificationPipeline::process` can fail with
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("No receipt image provided")]
    NoImage,

    #[error("Classification failed while {stage}: {source}")]
    UpstreamFailure {
        stage: Stage,
        #[source]
        source: ApiError,
    },

    #[error("Could not read classification: {source}")]
    UnparseableResponse {
        #[source]
        source: ExtractionError,
    },

    #[error("Could not save expenses: {0}")]
    PersistFailed(#[from] StoreError),
}

impl PipelineError {
    /// Stable code for API consumers; upstream/extraction/store errors
    /// report the code of the underlying kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoImage => "no_image",
            Self::UpstreamFailure { source, .. } => source.code(),
            Self::UnparseableResponse { source } => source.code(),
            Self::PersistFailed(e) => e.code(),
        }
    }

    /// Stage the pipeline was in when it failed
    pub fn stage(&self) -> Stage {
        match self {
            Self::NoImage => Stage::Received,
            Self::UpstreamFailure { stage, .. } => *stage,
            Self::UnparseableResponse { .. } => Stage::Submitted,
            Self::PersistFailed(_) => Stage::Extracted,
        }
    }
}

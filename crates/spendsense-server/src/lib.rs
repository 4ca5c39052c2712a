//! SpendSense Web Server
//!
//! Axum-based REST API for the SpendSense receipt classifier.
//!
//! - `POST /api/classify` runs a receipt image through the classification pipeline
//! - `GET /api/dashboard` returns per-category totals over a trailing window
//! - `GET /api/expenses`, `GET /api/categories`, `GET /health` for inspection
//!
//! Error responses are `{"error": ..., "code": ...}` and never echo upstream
//! response bodies or credentials.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use spendsense_core::ai::ReceiptClassifier;
use spendsense_core::config::DashboardConfig;
use spendsense_core::error::{ApiError, PipelineError, StoreError};
use spendsense_core::{ClassificationPipeline, ClassifierClient, Database};

mod handlers;


/// Maximum receipt upload size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Maximum expenses returned by one listing
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Longest dashboard window accepted (ten years)
pub const MAX_WINDOW_DAYS: i64 = spendsense_core::MAX_WINDOW_DAYS as i64;

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// Dashboard window when the request doesn't give one
    pub default_window_days: i64,
}

impl ServerConfig {
    pub fn from_dashboard(dashboard: &DashboardConfig) -> Self {
        Self {
            default_window_days: i64::from(dashboard.window_days),
            ..Default::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            default_window_days: i64::from(DashboardConfig::default().window_days),
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    /// `None` when no classifier is configured; classify requests get 503
    pub pipeline: Option<ClassificationPipeline>,
}

/// Create the application router
pub fn create_router(
    db: Database,
    classifier: Option<ClassifierClient>,
    config: ServerConfig,
) -> Router {
    match &classifier {
        Some(client) => info!(
            "Classifier configured: {} (model: {})",
            client.host(),
            client.model()
        ),
        None => info!("Classifier not configured; /api/classify will return 503"),
    }

    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    };

    let state = Arc::new(AppState {
        pipeline: classifier.map(|c| ClassificationPipeline::new(c, db.clone())),
        db,
        config,
    });

    let api_routes = Router::new()
        .route("/classify", post(handlers::classify_receipt))
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/expenses", get(handlers::list_expenses))
        .route("/categories", get(handlers::list_categories));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(handlers::health))
        .with_state(state)
        // Multipart uploads are capped by this; raw bodies are capped in the handler
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the server
///
/// Runs until Ctrl-C.
pub async fn serve(
    db: Database,
    classifier: Option<ClassifierClient>,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    match db.count_expenses() {
        Ok(count) => info!("Expense ledger at {} ({} records)", db.path(), count),
        Err(e) => warn!("Could not read expense ledger at {}: {}", db.path(), e),
    }

    let app = create_router(db, classifier, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn payload_too_large(msg: &str) -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            code: "payload_too_large",
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unavailable(code: &'static str, msg: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// 500 with a generic message; the cause is only logged
    pub fn internal(code: &'static str, err: impl Into<anyhow::Error>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            message: "An internal error occurred".to_string(),
            internal: Some(err.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, code = self.code, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message,
            "code": self.code,
        }));

        (self.status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => {
                let code = err.code();
                error!(error = %err, "Expense store unavailable");
                Self::unavailable(code, "Expense store is temporarily unavailable")
            }
            StoreError::InvalidWindow(_) => Self {
                status: StatusCode::BAD_REQUEST,
                code: err.code(),
                message: err.to_string(),
                internal: None,
            },
            _ => Self::internal(err.code(), err),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let err = match err {
            PipelineError::PersistFailed(store_err) => return store_err.into(),
            other => other,
        };

        let code = err.code();
        let status = match &err {
            PipelineError::NoImage => StatusCode::BAD_REQUEST,
            PipelineError::UpstreamFailure { source, .. } => match source {
                ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                ApiError::Exhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
                ApiError::TransportFailure { .. }
                | ApiError::ClientRejected { .. }
                | ApiError::InvalidEnvelope(_) => StatusCode::BAD_GATEWAY,
            },
            PipelineError::UnparseableResponse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::PersistFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            status,
            code,
            // Display impls never include upstream bodies
            message: err.to_string(),
            internal: None,
        }
    }
}

//! Health check handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;
use spendsense_core::ai::ReceiptClassifier;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    /// Model name, or `None` when classification is not configured
    pub classifier: Option<String>,
}

/// GET /health - Liveness plus a cheap database check
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = state.db.count_expenses().is_ok();

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
        classifier: state
            .pipeline
            .as_ref()
            .map(|p| p.classifier().model().to_string()),
    })
}

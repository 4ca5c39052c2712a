//! Receipt classification handler

use std::sync::Arc;

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::{AppError, AppState, MAX_UPLOAD_SIZE};
use spendsense_core::{receipt_hash, CategorySummary};

/// Multipart field carrying the receipt image
pub const RECEIPT_FIELD: &str = "receipt_image";

/// Response for a classified receipt
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    /// Per-category totals for this receipt
    pub totals: CategorySummary,
    /// Sum over all categories
    pub total: Decimal,
    /// SHA-256 of the uploaded image (shared by every recorded line item)
    pub receipt_hash: String,
}

/// POST /api/classify - Classify a receipt image and record its line items
///
/// Accepts either the raw image as the request body or a multipart form
/// with a `receipt_image` file field (max 10MB).
pub async fn classify_receipt(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<ClassifyResponse>, AppError> {
    let pipeline = state.pipeline.as_ref().ok_or_else(|| {
        AppError::unavailable(
            "classifier_unavailable",
            "Receipt classification is not configured",
        )
    })?;

    let image = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::bad_request(&format!("Invalid multipart form: {}", e)))?;
        read_receipt_field(multipart).await?
    } else {
        axum::body::to_bytes(request.into_body(), MAX_UPLOAD_SIZE)
            .await
            .map_err(|_| too_large())?
            .to_vec()
    };
    debug!("Received receipt upload ({} bytes)", image.len());

    let totals = pipeline.process(&image).await?;

    Ok(Json(ClassifyResponse {
        total: totals.values().copied().sum(),
        totals,
        receipt_hash: receipt_hash(&image),
    }))
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

async fn read_receipt_field(mut multipart: Multipart) -> Result<Vec<u8>, AppError> {
    let read_failed = |e: axum::extract::multipart::MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large()
        } else {
            AppError::bad_request(&format!("Failed to read form field: {}", e))
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(read_failed)? {
        if field.name() == Some(RECEIPT_FIELD) {
            let bytes = field.bytes().await.map_err(read_failed)?;
            return Ok(bytes.to_vec());
        }
    }

    Err(AppError::bad_request(&format!(
        "Missing {} field",
        RECEIPT_FIELD
    )))
}

fn too_large() -> AppError {
    AppError::payload_too_large(&format!(
        "Receipt image too large. Maximum size is {} MB",
        MAX_UPLOAD_SIZE / 1024 / 1024
    ))
}

//! Dashboard and expense ledger handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AppError, AppState, MAX_PAGE_LIMIT, MAX_WINDOW_DAYS};
use spendsense_core::{Category, CategorySummary, ExpenseRecord};

/// Default number of expenses returned by a listing
const DEFAULT_EXPENSE_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    /// Trailing window in days
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub window_days: i64,
    pub as_of: DateTime<Utc>,
    /// Category → total; categories with no spending are omitted
    pub totals: CategorySummary,
    pub total: Decimal,
}

/// GET /api/dashboard - Spending by category over a trailing window
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardParams>,
) -> Result<Json<DashboardResponse>, AppError> {
    let days = params.days.unwrap_or(state.config.default_window_days);
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(AppError::bad_request(&format!(
            "days must be between 1 and {}",
            MAX_WINDOW_DAYS
        )));
    }

    let now = Utc::now();
    let totals = state.db.aggregate(Duration::days(days), now)?;

    Ok(Json(DashboardResponse {
        window_days: days,
        as_of: now,
        total: totals.values().copied().sum(),
        totals,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ExpenseListParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ExpenseListResponse {
    pub expenses: Vec<ExpenseRecord>,
    /// All committed expenses, not just this page
    pub total_count: i64,
}

/// GET /api/expenses - Most recent expenses, newest first
pub async fn list_expenses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExpenseListParams>,
) -> Result<Json<ExpenseListResponse>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_EXPENSE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);

    let expenses = state.db.list_expenses(limit)?;
    let total_count = state.db.count_expenses()?;

    Ok(Json(ExpenseListResponse {
        expenses,
        total_count,
    }))
}

#[derive(Debug, Serialize)]
pub struct CategoryInfo {
    pub name: &'static str,
    pub slug: &'static str,
    pub definition: &'static str,
}

/// GET /api/categories - The classification taxonomy
pub async fn list_categories() -> Json<Vec<CategoryInfo>> {
    Json(
        Category::ALL
            .iter()
            .map(|c| CategoryInfo {
                name: c.display_name(),
                slug: c.as_str(),
                definition: c.definition(),
            })
            .collect(),
    )
}

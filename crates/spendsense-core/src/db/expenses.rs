//! Expense ledger operations

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, TransactionBehavior};
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::{format_timestamp, parse_timestamp, Database};
use crate::error::StoreError;
use crate::models::{Category, CategorySummary, ExpenseRecord, NewExpense};

type StoreResult<T> = std::result::Result<T, StoreError>;

impl Database {
    /// Append a batch of expenses in one transaction
    ///
    /// Either every row becomes visible or none does. Returns the new ids in
    /// batch order.
    pub fn append_batch(&self, batch: &[NewExpense]) -> StoreResult<Vec<i64>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.store_conn()?;
        let write_failed = |e: rusqlite::Error| StoreError::WriteFailed(e.to_string());

        // IMMEDIATE takes the write lock up front so concurrent batches queue
        // instead of failing on lock upgrade
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(write_failed)?;

        let mut ids = Vec::with_capacity(batch.len());
        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO expenses (description, category, amount, recorded_at, receipt_hash)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .map_err(write_failed)?;

            for expense in batch {
                // Dropping `tx` on error rolls the batch back
                let id = stmt
                    .insert(params![
                        expense.description,
                        expense.category.as_str(),
                        expense.amount.to_string(),
                        format_timestamp(&expense.recorded_at),
                        expense.receipt_hash,
                    ])
                    .map_err(write_failed)?;
                ids.push(id);
            }
        }

        tx.commit().map_err(write_failed)?;

        info!("Recorded {} expense(s)", ids.len());
        Ok(ids)
    }

    /// Sum amounts by category over `[now - window, now]`
    ///
    /// Categories with no records in the window are omitted. A window that
    /// reaches before the earliest representable time is `InvalidWindow`.
    pub fn aggregate(&self, window: Duration, now: DateTime<Utc>) -> StoreResult<CategorySummary> {
        let conn = self.store_conn()?;
        let read_failed = |e: rusqlite::Error| StoreError::ReadFailed(e.to_string());

        let from = now.checked_sub_signed(window).ok_or_else(|| {
            StoreError::InvalidWindow(format!("{} days before {}", window.num_days(), now))
        })?;
        let from = format_timestamp(&from);
        let to = format_timestamp(&now);
        debug!("Aggregating expenses from {} to {}", from, to);

        let mut stmt = conn
            .prepare("SELECT category, amount FROM expenses WHERE recorded_at >= ? AND recorded_at <= ?")
            .map_err(read_failed)?;
        let rows = stmt
            .query_map(params![from, to], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(read_failed)?;

        let mut summary = CategorySummary::new();
        for row in rows {
            let (category, amount) = row.map_err(read_failed)?;
            let amount = parse_amount(&amount)?;
            *summary
                .entry(Category::from_label(&category))
                .or_insert(Decimal::ZERO) += amount;
        }

        Ok(summary)
    }

    /// List expenses, newest first
    pub fn list_expenses(&self, limit: i64) -> StoreResult<Vec<ExpenseRecord>> {
        let conn = self.store_conn()?;
        let read_failed = |e: rusqlite::Error| StoreError::ReadFailed(e.to_string());

        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, description, category, amount, recorded_at, receipt_hash
                FROM expenses
                ORDER BY recorded_at DESC, id DESC
                LIMIT ?
                "#,
            )
            .map_err(read_failed)?;

        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(read_failed)?;

        let mut expenses = Vec::new();
        for row in rows {
            let (id, description, category, amount, recorded_at, receipt_hash) =
                row.map_err(read_failed)?;
            let recorded_at = parse_timestamp(&recorded_at).ok_or_else(|| {
                StoreError::ReadFailed(format!("invalid timestamp on expense {id}: {recorded_at}"))
            })?;
            expenses.push(ExpenseRecord {
                id,
                description,
                category: Category::from_label(&category),
                amount: parse_amount(&amount)?,
                recorded_at,
                receipt_hash,
            });
        }

        Ok(expenses)
    }

    /// Count committed expenses
    pub fn count_expenses(&self) -> StoreResult<i64> {
        let conn = self.store_conn()?;
        conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))
            .map_err(|e| StoreError::ReadFailed(e.to_string()))
    }
}

fn parse_amount(s: &str) -> StoreResult<Decimal> {
    Decimal::from_str(s).map_err(|e| StoreError::ReadFailed(format!("invalid amount {s:?}: {e}")))
}

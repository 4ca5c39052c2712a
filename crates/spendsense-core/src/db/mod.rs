//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `expenses` - Append-only expense ledger and windowed aggregation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::debug;

use crate::error::{Result, StoreError};

mod expenses;


pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// How long a connection waits on another writer's lock before failing
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Format a timestamp the way it is stored
///
/// Fixed width with a `Z` suffix, so text comparison orders the same as time.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Deletes a throwaway database file and its WAL sidecars on drop
struct TempDbFile(PathBuf);

impl TempDbFile {
    fn remove_files(&self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.0.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Drop for TempDbFile {
    fn drop(&mut self) {
        self.remove_files();
    }
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
    /// Set for `in_memory` databases; declared after `pool` so connections
    /// close before the files are removed
    temp_file: Option<Arc<TempDbFile>>,
}

impl Database {
    /// Open (or create) the database at `path` and run migrations
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(&format!(
                "PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}; PRAGMA foreign_keys = ON;"
            ))
        });
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.display().to_string(),
            temp_file: None,
        };
        db.run_migrations()?;

        debug!("Opened expense database at {}", db.db_path);
        Ok(db)
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a unique temporary file rather than `:memory:` so every pooled
    /// connection sees the same data. The file is deleted when the last
    /// clone is dropped.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "spendsense_test_{}_{}.db",
            std::process::id(),
            id
        ));

        // Remove any leftover files from an earlier run
        let guard = TempDbFile(path);
        guard.remove_files();

        let mut db = Self::new(&guard.0)?;
        db.temp_file = Some(Arc::new(guard));
        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Get a connection for a store operation
    pub(crate) fn store_conn(&self) -> std::result::Result<DbConn, StoreError> {
        self.pool
            .get()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the writer and never see a
            -- half-committed batch
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            -- Expense ledger (one row per receipt line item)
            -- amount is TEXT so sums stay exact decimals
            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                description TEXT NOT NULL CHECK (length(trim(description)) > 0),
                category TEXT NOT NULL,
                amount TEXT NOT NULL CHECK (CAST(amount AS REAL) >= 0),
                recorded_at TEXT NOT NULL,
                receipt_hash TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_expenses_recorded_at ON expenses(recorded_at);
            CREATE INDEX IF NOT EXISTS idx_expenses_receipt ON expenses(receipt_hash);

            -- Ledger rows are never changed once written
            CREATE TRIGGER IF NOT EXISTS expenses_no_update
            BEFORE UPDATE ON expenses
            BEGIN
                SELECT RAISE(ABORT, 'expenses are append-only');
            END;
            "#,
        )?;

        Ok(())
    }
}

//! DuckDB store implementation
//!
//! All calls run synchronously on the single connection behind a mutex;
//! DuckDB queries here are small point reads and writes.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use duckdb::types::Type;
use duckdb::{params, Connection, OptionalExt};
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Category, CheckPattern, Classification, ClassificationProgress, ClassifiedTransaction, Direction,
    Transaction, Vendor,
};
use crate::ports::ClassificationStore;
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Columns selected for a transaction, in `row_to_transaction` order
const TRANSACTION_COLUMNS: &str = "t.transaction_id, t.merchant_name, t.raw_name, t.amount::VARCHAR, \
     t.transaction_date::VARCHAR, t.transaction_type, t.direction";

const PATTERN_COLUMNS: &str = "pattern_id, name, category, amount_min::VARCHAR, amount_max::VARCHAR, \
     day_of_month_min, day_of_month_max, confidence_boost, active, use_count";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB-backed [`ClassificationStore`]
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbStore {
    /// Open (or create) the database file and run pending migrations
    ///
    /// Retries with exponential backoff while another process holds the file.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut attempt = 0;
        let conn = loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => break conn,
                Err(e) => {
                    let err_msg = e.to_string();
                    attempt += 1;
                    if !is_retryable_error(&err_msg) || attempt >= MAX_RETRIES {
                        return Err(e.into());
                    }
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt - 1));
                    warn!(
                        path = %db_path.display(),
                        attempt,
                        max_attempts = MAX_RETRIES,
                        delay_ms = delay.as_millis() as u64,
                        error = %err_msg,
                        "Database busy, retrying"
                    );
                    thread::sleep(delay);
                }
            }
        };

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path.to_path_buf()),
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Fresh in-memory database with the schema applied
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: None,
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::database("Database connection lock poisoned"))
    }

    // === Seeding ===

    /// Insert or update a transaction
    pub fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO transactions (transaction_id, merchant_name, raw_name, amount,
                                       transaction_date, transaction_type, direction)
             VALUES (?, ?, ?, CAST(? AS DECIMAL(18, 2)), CAST(? AS DATE), ?, ?)
             ON CONFLICT (transaction_id) DO UPDATE SET
                merchant_name = EXCLUDED.merchant_name,
                raw_name = EXCLUDED.raw_name,
                amount = EXCLUDED.amount,
                transaction_date = EXCLUDED.transaction_date,
                transaction_type = EXCLUDED.transaction_type,
                direction = EXCLUDED.direction",
            params![
                tx.id.to_string(),
                tx.merchant_name,
                tx.raw_name,
                tx.amount.to_string(),
                tx.date.to_string(),
                tx.transaction_type,
                tx.direction.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_check_pattern(&self, pattern: &CheckPattern) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO check_patterns (pattern_id, name, category, amount_min, amount_max,
                                         day_of_month_min, day_of_month_max, confidence_boost, active, use_count)
             VALUES (?, ?, ?, CAST(? AS DECIMAL(18, 2)), CAST(? AS DECIMAL(18, 2)), ?, ?, ?, ?, ?)",
            params![
                pattern.id.to_string(),
                pattern.name,
                pattern.category,
                pattern.amount_min.map(|d| d.to_string()),
                pattern.amount_max.map(|d| d.to_string()),
                pattern.day_of_month_min.map(|d| d as i32),
                pattern.day_of_month_max.map(|d| d as i32),
                pattern.confidence_boost,
                pattern.active,
                pattern.use_count,
            ],
        )?;
        Ok(())
    }

    /// Remove a vendor rule; returns whether one existed
    pub fn delete_vendor(&self, name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM vendors WHERE name = ?", params![Vendor::normalize_name(name)])?;
        Ok(deleted > 0)
    }

    fn query_transactions(&self, sql: &str, params: &[&dyn duckdb::ToSql]) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_transaction)?;
        collect_rows(rows)
    }
}

#[async_trait]
impl ClassificationStore for DuckDbStore {
    async fn get_unclassified_transactions(&self, from_date: Option<NaiveDate>) -> Result<Vec<Transaction>> {
        match from_date {
            Some(from) => self.query_transactions(
                &format!(
                    "SELECT {} FROM transactions t
                     LEFT JOIN classifications c ON c.transaction_id = t.transaction_id
                     WHERE c.transaction_id IS NULL AND t.transaction_date >= CAST(? AS DATE)
                     ORDER BY t.transaction_date, t.transaction_id",
                    TRANSACTION_COLUMNS
                ),
                &[&from.to_string()],
            ),
            None => self.query_transactions(
                &format!(
                    "SELECT {} FROM transactions t
                     LEFT JOIN classifications c ON c.transaction_id = t.transaction_id
                     WHERE c.transaction_id IS NULL
                     ORDER BY t.transaction_date, t.transaction_id",
                    TRANSACTION_COLUMNS
                ),
                &[],
            ),
        }
    }

    async fn update_transaction_direction(&self, id: Uuid, direction: Direction) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE transactions SET direction = ? WHERE transaction_id = ?",
            params![direction.as_str(), id.to_string()],
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!("Transaction {}", id)));
        }
        Ok(())
    }

    // === Categories ===

    async fn get_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT category_id, name, description, category_type FROM categories ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_category)?;
        collect_rows(rows)
    }

    async fn find_category(&self, name: &str) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let category = conn
            .query_row(
                "SELECT category_id, name, description, category_type FROM categories
                 WHERE lower(trim(name)) = lower(trim(?))",
                params![name],
                row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    async fn create_category(&self, category: &Category) -> Result<()> {
        let conn = self.conn()?;
        let existing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM categories WHERE lower(trim(name)) = lower(trim(?))",
            params![category.name],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(Error::validation(format!("Category already exists: {}", category.name)));
        }
        conn.execute(
            "INSERT INTO categories (category_id, name, description, category_type) VALUES (?, ?, ?, ?)",
            params![
                category.id.to_string(),
                category.name.trim(),
                category.description,
                category.category_type.as_str(),
            ],
        )?;
        Ok(())
    }

    // === Vendors ===

    async fn get_vendor(&self, name: &str) -> Result<Option<Vendor>> {
        let conn = self.conn()?;
        let vendor = conn
            .query_row(
                "SELECT name, category, use_count, last_updated::VARCHAR FROM vendors WHERE name = ?",
                params![Vendor::normalize_name(name)],
                row_to_vendor,
            )
            .optional()?;
        Ok(vendor)
    }

    async fn save_vendor(&self, vendor: &Vendor) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO vendors (name, category, use_count, last_updated)
             VALUES (?, ?, ?, CAST(? AS TIMESTAMP))
             ON CONFLICT (name) DO UPDATE SET
                category = EXCLUDED.category,
                last_updated = EXCLUDED.last_updated",
            params![
                Vendor::normalize_name(&vendor.name),
                vendor.category,
                vendor.use_count,
                format_timestamp(&vendor.last_updated),
            ],
        )?;
        Ok(())
    }

    async fn get_vendors(&self) -> Result<Vec<Vendor>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT name, category, use_count, last_updated::VARCHAR FROM vendors ORDER BY name")?;
        let rows = stmt.query_map([], row_to_vendor)?;
        collect_rows(rows)
    }

    async fn increment_vendor_use(&self, name: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE vendors SET use_count = use_count + 1, last_updated = CAST(? AS TIMESTAMP) WHERE name = ?",
            params![format_timestamp(&Utc::now()), Vendor::normalize_name(name)],
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!("Vendor {}", name)));
        }
        Ok(())
    }

    // === Check patterns ===

    async fn get_matching_check_patterns(&self, tx: &Transaction) -> Result<Vec<CheckPattern>> {
        if !tx.is_check() {
            return Ok(Vec::new());
        }
        let amount = tx.amount.abs().to_string();
        let day = tx.date.day() as i32;

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM check_patterns
             WHERE active
               AND (amount_min IS NULL OR amount_min <= CAST(? AS DECIMAL(18, 2)))
               AND (amount_max IS NULL OR amount_max >= CAST(? AS DECIMAL(18, 2)))
               AND (day_of_month_min IS NULL OR day_of_month_min <= ?)
               AND (day_of_month_max IS NULL OR day_of_month_max >= ?)
             ORDER BY confidence_boost DESC, name",
            PATTERN_COLUMNS
        ))?;
        let rows = stmt.query_map(params![amount, amount, day, day], row_to_pattern)?;
        collect_rows(rows)
    }

    async fn get_check_patterns(&self) -> Result<Vec<CheckPattern>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM check_patterns ORDER BY confidence_boost DESC, name",
            PATTERN_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_pattern)?;
        collect_rows(rows)
    }

    async fn increment_pattern_use(&self, id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE check_patterns SET use_count = use_count + 1 WHERE pattern_id = ?",
            params![id.to_string()],
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!("Check pattern {}", id)));
        }
        Ok(())
    }

    // === Classifications ===

    async fn save_classification(&self, classification: &Classification) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO classifications (transaction_id, category, status, confidence, classified_at, notes)
             VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP), ?)
             ON CONFLICT (transaction_id) DO UPDATE SET
                category = EXCLUDED.category,
                status = EXCLUDED.status,
                confidence = EXCLUDED.confidence,
                classified_at = EXCLUDED.classified_at,
                notes = EXCLUDED.notes",
            params![
                classification.transaction_id.to_string(),
                classification.category,
                classification.status.as_str(),
                classification.confidence,
                format_timestamp(&classification.classified_at),
                classification.notes,
            ],
        )?;
        Ok(())
    }

    async fn get_classifications_below_confidence(&self, threshold: f64) -> Result<Vec<ClassifiedTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, c.category, c.status, c.confidence, c.classified_at::VARCHAR, c.notes
             FROM classifications c
             JOIN transactions t ON t.transaction_id = c.transaction_id
             WHERE c.confidence < ?
             ORDER BY t.transaction_date, t.transaction_id",
            TRANSACTION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![threshold], |row| {
            let transaction = row_to_transaction(row)?;
            let classification = classification_from_row(row, transaction.id, 7)?;
            Ok(ClassifiedTransaction {
                transaction,
                classification,
            })
        })?;
        collect_rows(rows)
    }

    async fn get_classifications(&self) -> Result<Vec<Classification>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT transaction_id, category, status, confidence, classified_at::VARCHAR, notes
             FROM classifications ORDER BY classified_at",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            classification_from_row(row, parse_uuid(0, &id)?, 1)
        })?;
        collect_rows(rows)
    }

    // === Progress ===

    async fn get_progress(&self) -> Result<Option<ClassificationProgress>> {
        let conn = self.conn()?;
        let progress = conn
            .query_row(
                "SELECT last_processed_id, last_processed_date::VARCHAR, total_processed, started_at::VARCHAR
                 FROM classification_progress WHERE id = 1",
                [],
                |row| {
                    let last_id: Option<String> = row.get(0)?;
                    let last_date: Option<String> = row.get(1)?;
                    let total: i64 = row.get(2)?;
                    let started: String = row.get(3)?;
                    Ok(ClassificationProgress {
                        last_processed_id: last_id.and_then(|s| Uuid::parse_str(&s).ok()),
                        last_processed_date: last_date.and_then(|s| parse_date(&s)),
                        total_processed: total.max(0) as u64,
                        started_at: parse_timestamp(&started),
                    })
                },
            )
            .optional()?;
        Ok(progress)
    }

    async fn save_progress(&self, progress: &ClassificationProgress) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO classification_progress (id, last_processed_id, last_processed_date, total_processed, started_at)
             VALUES (1, ?, CAST(? AS DATE), ?, CAST(? AS TIMESTAMP))
             ON CONFLICT (id) DO UPDATE SET
                last_processed_id = EXCLUDED.last_processed_id,
                last_processed_date = EXCLUDED.last_processed_date,
                total_processed = EXCLUDED.total_processed,
                started_at = EXCLUDED.started_at",
            params![
                progress.last_processed_id.map(|id| id.to_string()),
                progress.last_processed_date.map(|d| d.to_string()),
                progress.total_processed as i64,
                format_timestamp(&progress.started_at),
            ],
        )?;
        Ok(())
    }

    async fn clear_progress(&self) -> Result<()> {
        self.conn()?.execute("DELETE FROM classification_progress", [])?;
        Ok(())
    }
}

// Row mapping

fn row_to_transaction(row: &duckdb::Row) -> duckdb::Result<Transaction> {
    // 0: transaction_id, 1: merchant_name, 2: raw_name, 3: amount, 4: transaction_date,
    // 5: transaction_type, 6: direction
    let id: String = row.get(0)?;
    let amount: String = row.get(3)?;
    let date: String = row.get(4)?;
    let direction: String = row.get(6)?;

    Ok(Transaction {
        id: parse_uuid(0, &id)?,
        merchant_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        raw_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        amount: Decimal::from_str(&amount).map_err(|e| conversion_error(3, e))?,
        date: parse_date(&date).ok_or_else(|| conversion_error(4, Error::validation(format!("bad date {}", date))))?,
        transaction_type: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        direction: direction.parse().unwrap_or_default(),
    })
}

fn row_to_category(row: &duckdb::Row) -> duckdb::Result<Category> {
    let id: String = row.get(0)?;
    let category_type: String = row.get(3)?;
    Ok(Category {
        id: parse_uuid(0, &id)?,
        name: row.get(1)?,
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        category_type: category_type.parse().unwrap_or_default(),
    })
}

fn row_to_vendor(row: &duckdb::Row) -> duckdb::Result<Vendor> {
    let last_updated: String = row.get(3)?;
    Ok(Vendor {
        name: row.get(0)?,
        category: row.get(1)?,
        use_count: row.get(2)?,
        last_updated: parse_timestamp(&last_updated),
    })
}

fn row_to_pattern(row: &duckdb::Row) -> duckdb::Result<CheckPattern> {
    let id: String = row.get(0)?;
    let amount_min: Option<String> = row.get(3)?;
    let amount_max: Option<String> = row.get(4)?;
    let day_min: Option<i32> = row.get(5)?;
    let day_max: Option<i32> = row.get(6)?;
    Ok(CheckPattern {
        id: parse_uuid(0, &id)?,
        name: row.get(1)?,
        category: row.get(2)?,
        amount_min: amount_min.and_then(|s| Decimal::from_str(&s).ok()),
        amount_max: amount_max.and_then(|s| Decimal::from_str(&s).ok()),
        day_of_month_min: day_min.map(|d| d.max(0) as u32),
        day_of_month_max: day_max.map(|d| d.max(0) as u32),
        confidence_boost: row.get(7)?,
        active: row.get(8)?,
        use_count: row.get(9)?,
    })
}

/// Classification columns starting at `offset`: category, status, confidence, classified_at, notes
fn classification_from_row(row: &duckdb::Row, transaction_id: Uuid, offset: usize) -> duckdb::Result<Classification> {
    let status: String = row.get(offset + 1)?;
    let classified_at: String = row.get(offset + 3)?;
    Ok(Classification {
        transaction_id,
        category: row.get(offset)?,
        status: status.parse().map_err(|e| conversion_error(offset + 1, e))?,
        confidence: row.get(offset + 2)?,
        classified_at: parse_timestamp(&classified_at),
        notes: row.get(offset + 4)?,
    })
}

fn collect_rows<T>(rows: impl Iterator<Item = duckdb::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// Helper functions

fn conversion_error<E>(idx: usize, err: E) -> duckdb::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_uuid(idx: usize, s: &str) -> duckdb::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| conversion_error(idx, e))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    // DuckDB renders TIMESTAMP as "2025-01-31 12:00:00.123456"
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or_else(|_| Utc::now())
}

//! # stockpipe warehouse
//!
//! DuckDB storage for daily stock price records and their derived indicator
//! columns.
//!
//! The warehouse owns the `stock_data` table keyed by
//! `(security_id, trade_date)`. Imports replace the table contents in one
//! transaction; the indicator stages read prices out and write computed values
//! back by key, never inserting or deleting rows.
//!
//! All values supplied by callers are bound as statement parameters.
//!
//! ```rust,no_run
//! use stockpipe_warehouse::{QueryGuardrails, Warehouse};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!     let summary = warehouse.dsa_summary()?;
//!     println!("{} rows, {} with positive DSA", summary.total, summary.positive);
//!
//!     let result = warehouse.execute_query(
//!         "SELECT security_id, COUNT(*) FROM stock_data GROUP BY 1",
//!         QueryGuardrails::default(),
//!         false,
//!     )?;
//!     println!("{} securities", result.row_count);
//!     Ok(())
//! }
//! ```

pub mod duckdb;
pub mod migrations;
pub mod views;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ::duckdb::types::Value as DuckValue;
use ::duckdb::{params, Connection, ToSql};
use serde::Serialize;
use serde_json::{Number, Value};
use thiserror::Error;

pub use crate::duckdb::{AccessMode, ConnectionPool, PooledConnection};

const UNIX_EPOCH_JULIAN_DAY: i32 = 2_440_588;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("query rejected: {0}")]
    QueryRejected(String),

    #[error("query timed out after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub home: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl WarehouseConfig {
    /// Configuration rooted at an explicit data directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let db_path = home.join("warehouse.duckdb");
        Self {
            home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::with_home(resolve_stockpipe_home())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryGuardrails {
    pub max_rows: usize,
    pub query_timeout_ms: u64,
}

impl Default for QueryGuardrails {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl QueryGuardrails {
    fn timeout(self) -> Duration {
        Duration::from_millis(self.query_timeout_ms.max(1))
    }

    fn validate(self) -> Result<(), WarehouseError> {
        if self.max_rows == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "--max-rows must be greater than zero",
            )));
        }
        if self.query_timeout_ms == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "--query-timeout-ms must be greater than zero",
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<SqlColumn>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub truncated: bool,
}

/// One row as written by an import. Dates are `YYYY-MM-DD` text.
#[derive(Debug, Clone)]
pub struct StockRecord {
    pub security_id: i32,
    pub stock_name: String,
    pub close_price: f64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub volume: u64,
    pub market_cap: f64,
    pub pe_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub sector: Option<String>,
    pub trade_date: String,
}

/// Stored row including the derived columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockRow {
    pub security_id: i32,
    pub stock_name: String,
    pub trade_date: String,
    pub close_price: f64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub volume: i64,
    pub dsa_indicator: Option<f64>,
    pub ma_5_days: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceRangeRow {
    pub security_id: i32,
    pub trade_date: String,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosePriceRow {
    pub security_id: i32,
    pub trade_date: String,
    pub close_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DsaRow {
    pub security_id: i32,
    pub trade_date: String,
    pub dsa_indicator: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageRow {
    pub trade_date: String,
    pub ma_5_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DsaSummary {
    pub total: u64,
    pub positive: u64,
    pub negative: u64,
    pub zero: u64,
    pub min_dsa: Option<f64>,
    pub max_dsa: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RunLogEntry {
    pub run_id: String,
    pub stage: String,
    pub rows_processed: u64,
    pub rows_failed: u64,
    pub status: String,
}

#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    pool: ConnectionPool,
}

impl Warehouse {
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::new(config.db_path.clone(), config.max_pool_size);
        let warehouse = Self { config, pool };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.pool.lease(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&connection)?;
        views::create_views(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    pub fn home(&self) -> &Path {
        self.config.home.as_path()
    }

    pub fn execute_query(
        &self,
        sql: &str,
        guardrails: QueryGuardrails,
        allow_write: bool,
    ) -> Result<QueryResult, WarehouseError> {
        guardrails.validate()?;
        let sql = normalize_sql(sql)?;

        if !allow_write {
            enforce_read_only_query(sql)?;
        }

        let mode = if allow_write {
            AccessMode::ReadWrite
        } else {
            AccessMode::ReadOnly
        };
        let connection = self.pool.lease(mode)?;
        if allow_write {
            execute_with_guardrails(&connection, sql, guardrails, true)
        } else {
            // A data-modifying CTE still parses as a query; never keep its effects.
            with_rollback(&connection, |connection| {
                execute_with_guardrails(connection, sql, guardrails, false)
            })
        }
    }

    /// Clear `stock_data` and insert `rows`, all in one transaction.
    ///
    /// Returns the number of rows inserted. A failing row (for example a
    /// duplicate key) rolls back the clear as well.
    pub fn replace_stock_data(&self, rows: &[StockRecord]) -> Result<usize, WarehouseError> {
        let connection = self.pool.lease(AccessMode::ReadWrite)?;
        with_transaction(&connection, |connection| {
            let cleared = connection.execute("DELETE FROM stock_data", [])?;
            tracing::debug!(cleared, "cleared stock_data before import");

            let mut statement = connection.prepare(
                "INSERT INTO stock_data \
                 (security_id, stock_name, close_price, open_price, high_price, low_price, \
                  volume, market_cap, pe_ratio, dividend_yield, sector, trade_date) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS DATE))",
            )?;

            let mut inserted = 0;
            for row in rows {
                let params: [&dyn ToSql; 12] = [
                    &row.security_id,
                    &row.stock_name,
                    &row.close_price,
                    &row.open_price,
                    &row.high_price,
                    &row.low_price,
                    &row.volume,
                    &row.market_cap,
                    &row.pe_ratio,
                    &row.dividend_yield,
                    &row.sector,
                    &row.trade_date,
                ];
                inserted += statement.execute(params.as_slice())?;
            }

            Ok(inserted)
        })
    }

    pub fn row_count(&self) -> Result<u64, WarehouseError> {
        let connection = self.pool.lease(AccessMode::ReadOnly)?;
        let count: i64 =
            connection.query_row("SELECT COUNT(*) FROM stock_data", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Open/high/low for every stored row, ordered by key.
    pub fn price_ranges(&self) -> Result<Vec<PriceRangeRow>, WarehouseError> {
        let connection = self.pool.lease(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT security_id, CAST(trade_date AS VARCHAR), open_price, high_price, low_price \
             FROM stock_data ORDER BY security_id, trade_date",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(PriceRangeRow {
                security_id: row.get(0)?,
                trade_date: row.get(1)?,
                open_price: row.get(2)?,
                high_price: row.get(3)?,
                low_price: row.get(4)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Overwrite `dsa_indicator` by key in a single transaction.
    ///
    /// Rows whose key is not stored are left alone; the return value counts
    /// only rows actually updated.
    pub fn write_dsa(&self, rows: &[DsaRow]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.pool.lease(AccessMode::ReadWrite)?;
        with_transaction(&connection, |connection| {
            let mut statement = connection.prepare(
                "UPDATE stock_data SET dsa_indicator = ?, updated_at = CURRENT_TIMESTAMP \
                 WHERE security_id = ? AND trade_date = CAST(? AS DATE)",
            )?;

            let mut updated = 0;
            for row in rows {
                let params: [&dyn ToSql; 3] =
                    [&row.dsa_indicator, &row.security_id, &row.trade_date];
                updated += statement.execute(params.as_slice())?;
            }
            Ok(updated)
        })
    }

    /// Closing prices for every stored row, ordered by security then date.
    pub fn closing_prices(&self) -> Result<Vec<ClosePriceRow>, WarehouseError> {
        let connection = self.pool.lease(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT security_id, CAST(trade_date AS VARCHAR), close_price \
             FROM stock_data ORDER BY security_id, trade_date",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(ClosePriceRow {
                security_id: row.get(0)?,
                trade_date: row.get(1)?,
                close_price: row.get(2)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Overwrite `ma_5_days` for one security in a single transaction.
    ///
    /// Either every row of the security is updated or, on error, none is.
    pub fn write_moving_averages(
        &self,
        security_id: i32,
        rows: &[MovingAverageRow],
    ) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.pool.lease(AccessMode::ReadWrite)?;
        with_transaction(&connection, |connection| {
            let mut statement = connection.prepare(
                "UPDATE stock_data SET ma_5_days = ?, updated_at = CURRENT_TIMESTAMP \
                 WHERE security_id = ? AND trade_date = CAST(? AS DATE)",
            )?;

            let mut updated = 0;
            for row in rows {
                let params: [&dyn ToSql; 3] = [&row.ma_5_days, &security_id, &row.trade_date];
                updated += statement.execute(params.as_slice())?;
            }
            Ok(updated)
        })
    }

    pub fn dsa_summary(&self) -> Result<DsaSummary, WarehouseError> {
        let connection = self.pool.lease(AccessMode::ReadOnly)?;
        let summary = connection.query_row(
            "SELECT total, positive, negative, zero, min_dsa, max_dsa FROM vw_dsa_summary",
            [],
            |row| {
                let total: i64 = row.get(0)?;
                let positive: i64 = row.get(1)?;
                let negative: i64 = row.get(2)?;
                let zero: i64 = row.get(3)?;
                Ok(DsaSummary {
                    total: total.max(0) as u64,
                    positive: positive.max(0) as u64,
                    negative: negative.max(0) as u64,
                    zero: zero.max(0) as u64,
                    min_dsa: row.get(4)?,
                    max_dsa: row.get(5)?,
                })
            },
        )?;
        Ok(summary)
    }

    /// Most recent rows, newest first. Restricted to one security when given.
    pub fn latest_rows(
        &self,
        security_id: Option<i32>,
        limit: usize,
    ) -> Result<Vec<StockRow>, WarehouseError> {
        let connection = self.pool.lease(AccessMode::ReadOnly)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let select = "SELECT security_id, stock_name, CAST(trade_date AS VARCHAR), close_price, \
                      open_price, high_price, low_price, volume, dsa_indicator, ma_5_days \
                      FROM stock_data";
        let read = |row: &::duckdb::Row<'_>| -> ::duckdb::Result<StockRow> {
            Ok(StockRow {
                security_id: row.get(0)?,
                stock_name: row.get(1)?,
                trade_date: row.get(2)?,
                close_price: row.get(3)?,
                open_price: row.get(4)?,
                high_price: row.get(5)?,
                low_price: row.get(6)?,
                volume: row.get(7)?,
                dsa_indicator: row.get(8)?,
                ma_5_days: row.get(9)?,
            })
        };

        let rows = match security_id {
            Some(security_id) => {
                let mut statement = connection.prepare(&format!(
                    "{select} WHERE security_id = ? ORDER BY trade_date DESC LIMIT ?"
                ))?;
                let rows = statement.query_map(params![security_id, limit], read)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut statement = connection.prepare(&format!(
                    "{select} ORDER BY trade_date DESC, security_id LIMIT ?"
                ))?;
                let rows = statement.query_map(params![limit], read)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(rows)
    }

    pub fn record_run(&self, entry: &RunLogEntry) -> Result<(), WarehouseError> {
        let connection = self.pool.lease(AccessMode::ReadWrite)?;
        let params: [&dyn ToSql; 5] = [
            &entry.run_id,
            &entry.stage,
            &entry.rows_processed,
            &entry.rows_failed,
            &entry.status,
        ];
        connection.execute(
            "INSERT INTO run_log (run_id, stage, rows_processed, rows_failed, status, timestamp) \
             VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
            params.as_slice(),
        )?;
        Ok(())
    }
}

/// Run `body` inside `BEGIN`/`COMMIT`, rolling back if it fails.
fn with_transaction<T>(
    connection: &Connection,
    body: impl FnOnce(&Connection) -> Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    connection.execute_batch("BEGIN TRANSACTION")?;
    let result = body(connection);
    finalize_transaction(connection, result)
}

/// Run `body` inside a transaction that is always rolled back.
fn with_rollback<T>(
    connection: &Connection,
    body: impl FnOnce(&Connection) -> Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    connection.execute_batch("BEGIN TRANSACTION")?;
    let result = body(connection);
    match connection.execute_batch("ROLLBACK") {
        Ok(()) => result,
        Err(rollback) => {
            tracing::warn!(%rollback, "rollback of read-only query failed");
            result.and(Err(WarehouseError::DuckDb(rollback)))
        }
    }
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback) = connection.execute_batch("ROLLBACK") {
                tracing::warn!(%rollback, "rollback after failed transaction also failed");
            }
            Err(error)
        }
    }
}

fn execute_with_guardrails(
    connection: &Connection,
    sql: &str,
    guardrails: QueryGuardrails,
    allow_write: bool,
) -> Result<QueryResult, WarehouseError> {
    let started = Instant::now();
    if is_select_like(sql) {
        execute_select_query(connection, sql, guardrails, started)
    } else if allow_write {
        connection.execute_batch(sql)?;
        ensure_timeout(started, guardrails.timeout())?;
        Ok(QueryResult {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            truncated: false,
        })
    } else {
        Err(WarehouseError::QueryRejected(String::from(
            "only SELECT/CTE queries are allowed unless --write is provided",
        )))
    }
}

fn execute_select_query(
    connection: &Connection,
    sql: &str,
    guardrails: QueryGuardrails,
    started: Instant,
) -> Result<QueryResult, WarehouseError> {
    let mut statement = connection.prepare(sql)?;
    // Column metadata is only populated once the statement has executed.
    let _ = statement.query([] as [&dyn ToSql; 0])?;

    let column_count = statement.column_count();
    let mut columns = Vec::with_capacity(column_count);
    for index in 0..column_count {
        let name = statement
            .column_name(index)
            .map_or_else(|_| format!("column{index}"), ToString::to_string);
        columns.push(SqlColumn {
            name,
            r#type: statement.column_type(index).to_string(),
        });
    }

    let mut cursor = statement.query([] as [&dyn ToSql; 0])?;
    let mut rows = Vec::new();
    let mut truncated = false;

    while let Some(row) = cursor.next()? {
        ensure_timeout(started, guardrails.timeout())?;

        if rows.len() >= guardrails.max_rows {
            truncated = true;
            break;
        }

        rows.push(read_row(row, column_count)?);
    }

    ensure_timeout(started, guardrails.timeout())?;

    Ok(QueryResult {
        columns,
        row_count: rows.len(),
        rows,
        truncated,
    })
}

fn read_row(row: &::duckdb::Row<'_>, column_count: usize) -> Result<Vec<Value>, ::duckdb::Error> {
    let mut output = Vec::with_capacity(column_count);
    for index in 0..column_count {
        let value: DuckValue = row.get(index)?;
        output.push(to_json_value(value));
    }
    Ok(output)
}

fn to_json_value(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(value) => Value::Bool(value),
        DuckValue::TinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::SmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::Int(value) => Value::Number(Number::from(value)),
        DuckValue::BigInt(value) => Value::Number(Number::from(value)),
        DuckValue::UTinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::USmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::UInt(value) => Value::Number(Number::from(value)),
        DuckValue::UBigInt(value) => Value::Number(Number::from(value)),
        DuckValue::Float(value) => number_from_f64(f64::from(value)),
        DuckValue::Double(value) => number_from_f64(value),
        DuckValue::Text(value) => Value::String(value),
        DuckValue::Blob(value) => Value::String(hex::encode(value)),
        DuckValue::Date32(days) => date_from_days(days),
        other => Value::String(format!("{other:?}")),
    }
}

fn number_from_f64(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn date_from_days(days: i32) -> Value {
    days.checked_add(UNIX_EPOCH_JULIAN_DAY)
        .and_then(|julian| time::Date::from_julian_day(julian).ok())
        .map_or(Value::Null, |date| Value::String(date.to_string()))
}

fn normalize_sql(sql: &str) -> Result<&str, WarehouseError> {
    let normalized = sql.trim();
    if normalized.is_empty() {
        return Err(WarehouseError::QueryRejected(String::from(
            "query must not be empty",
        )));
    }
    Ok(normalized.trim_end_matches(';').trim())
}

fn enforce_read_only_query(sql: &str) -> Result<(), WarehouseError> {
    if !is_select_like(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "read-only mode accepts only SELECT/CTE queries; use --write for write statements",
        )));
    }
    if is_explain_analyze(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "EXPLAIN ANALYZE executes its statement and is not allowed in read-only mode",
        )));
    }
    if has_multiple_statements(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "multiple SQL statements are not allowed in read-only mode",
        )));
    }
    Ok(())
}

fn is_select_like(sql: &str) -> bool {
    let first_keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        first_keyword.as_str(),
        "SELECT" | "WITH" | "EXPLAIN" | "SHOW" | "DESCRIBE"
    )
}

fn is_explain_analyze(sql: &str) -> bool {
    let mut keywords = sql.split_whitespace().map(str::to_ascii_uppercase);
    keywords.next().as_deref() == Some("EXPLAIN") && keywords.next().as_deref() == Some("ANALYZE")
}

fn has_multiple_statements(sql: &str) -> bool {
    sql.split(';')
        .filter(|part| !part.trim().is_empty())
        .count()
        > 1
}

fn ensure_timeout(started: Instant, timeout: Duration) -> Result<(), WarehouseError> {
    if started.elapsed() > timeout {
        return Err(WarehouseError::QueryTimeout {
            timeout_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
        });
    }
    Ok(())
}

fn resolve_stockpipe_home() -> PathBuf {
    if let Some(path) = env::var_os("STOCKPIPE_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".stockpipe");
    }

    PathBuf::from(".stockpipe")
}

//! Sqlite bar store, populated by the batch fetch job and read by the
//! backtester. The live pipeline never touches it.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::debug;

use crate::api::HistoricalBar;

/// Stored minute bar.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BarRow {
    pub timestamp: String,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl BarRow {
    pub fn parsed_timestamp(&self) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("Bad stored timestamp: {}", self.timestamp))
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    // Whole-second RFC 3339 keeps rows lexicographically sortable.
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Database connection pool over the bar store.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS minute_bars (
                timestamp TEXT NOT NULL,
                symbol TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (timestamp, symbol)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert fetched bars, skipping rows already present.
    pub async fn insert_bars(&self, symbol: &str, bars: &[HistoricalBar]) -> Result<u64> {
        let mut inserted = 0u64;

        for bar in bars {
            let result = sqlx::query(
                r#"
                INSERT INTO minute_bars (timestamp, symbol, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (timestamp, symbol) DO NOTHING
                "#,
            )
            .bind(format_timestamp(bar.timestamp))
            .bind(symbol)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .execute(&self.pool)
            .await?;

            inserted += result.rows_affected();
        }

        debug!(symbol = %symbol, inserted, total = bars.len(), "Stored bars");
        Ok(inserted)
    }

    /// Load bars for a symbol in timestamp order, optionally bounded.
    pub async fn get_bars(
        &self,
        symbol: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<BarRow>> {
        let start = start.map(format_timestamp);
        let end = end.map(format_timestamp);

        let rows = sqlx::query_as::<_, BarRow>(
            r#"
            SELECT timestamp, symbol, open, high, low, close, volume
            FROM minute_bars
            WHERE symbol = ?
              AND (? IS NULL OR timestamp >= ?)
              AND (? IS NULL OR timestamp <= ?)
            ORDER BY timestamp
            "#,
        )
        .bind(symbol)
        .bind(start.clone())
        .bind(start)
        .bind(end.clone())
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load bars")?;

        Ok(rows)
    }

    pub async fn bar_count(&self, symbol: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM minute_bars WHERE symbol = ?")
                .bind(symbol)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

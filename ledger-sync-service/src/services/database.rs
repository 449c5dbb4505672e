//! Database service for ledger-sync-service.

use crate::models::{LedgerField, RunWatermark, StoredRow};
use crate::services::metrics::STORE_QUERY_DURATION;
use crate::sync::ports::{RowStore, WatermarkStore};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "ledger-sync-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

// =========================================================================
// Ledger rows
// =========================================================================

fn column_list() -> String {
    LedgerField::header().join(", ")
}

/// [`RowStore`] over the `ledger_rows` table. Store order is `row_id` order.
#[derive(Clone)]
pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(row: &PgRow) -> Result<StoredRow, sqlx::Error> {
        let row_id: i64 = row.try_get("row_id")?;
        let cells = LedgerField::ALL
            .iter()
            .map(|field| row.try_get::<String, _>(field.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StoredRow::new(Some(row_id), cells))
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    #[instrument(skip(self))]
    async fn rows(&self) -> anyhow::Result<Vec<StoredRow>> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["rows"])
            .start_timer();

        let sql = format!(
            "SELECT row_id, {} FROM ledger_rows ORDER BY row_id",
            column_list()
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read ledger rows")?
            .iter()
            .map(Self::decode)
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to decode ledger row")?;

        timer.observe_duration();
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> anyhow::Result<()> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["clear"])
            .start_timer();

        let mut tx = self.pool.begin().await?;
        sqlx::query("TRUNCATE ledger_rows RESTART IDENTITY")
            .execute(&mut *tx)
            .await
            .context("Failed to clear ledger rows")?;
        sqlx::query("DELETE FROM ledger_header")
            .execute(&mut *tx)
            .await
            .context("Failed to clear ledger header")?;
        tx.commit().await?;

        timer.observe_duration();
        info!("Ledger table cleared");
        Ok(())
    }

    #[instrument(skip(self, columns), fields(columns = columns.len()))]
    async fn set_header(&self, columns: &[&str]) -> anyhow::Result<()> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["set_header"])
            .start_timer();

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM ledger_header")
            .execute(&mut *tx)
            .await
            .context("Failed to reset ledger header")?;
        if !columns.is_empty() {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO ledger_header (position, name) ");
            builder.push_values(columns.iter().enumerate(), |mut b, (position, name)| {
                b.push_bind(position as i32).push_bind(name.to_string());
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to write ledger header")?;
        }
        tx.commit().await?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn add_rows(&self, rows: &[StoredRow]) -> anyhow::Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["add_rows"])
            .start_timer();

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO ledger_rows ({}) ", column_list()));
        builder.push_values(rows, |mut b, row| {
            for cell in row.cells() {
                b.push_bind(cell.clone());
            }
        });
        builder
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to append ledger rows")?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, row), fields(key = %row.key()))]
    async fn save_row(&self, row: &StoredRow) -> anyhow::Result<()> {
        let row_id = row
            .row_id()
            .ok_or_else(|| anyhow::anyhow!("Row {} was never persisted", row.key()))?;
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["save_row"])
            .start_timer();

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE ledger_rows SET ");
        let mut assignments = builder.separated(", ");
        for field in LedgerField::ALL {
            assignments.push(format!("{} = ", field.as_str()));
            assignments.push_bind_unseparated(row.get(field).to_string());
        }
        builder.push(" WHERE row_id = ").push_bind(row_id);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to update ledger row")?;

        timer.observe_duration();
        if result.rows_affected() == 0 {
            anyhow::bail!("Ledger row {} not found", row_id);
        }
        Ok(())
    }
}

// =========================================================================
// Watermark
// =========================================================================

const KEY_LAST_RUN_AT: &str = "last_run_at";
const KEY_RELOAD_REQUESTED: &str = "reload_requested";
const KEY_RELOAD_FROM: &str = "reload_from";
const KEY_INITIAL_DATE: &str = "initial_date";
const KEY_LAST_RUN_LOG: &str = "last_run_log";

/// Flatten a watermark into `sync_state` entries; `None` removes the key.
fn watermark_entries(watermark: &RunWatermark) -> Vec<(&'static str, Option<String>)> {
    vec![
        (
            KEY_LAST_RUN_AT,
            watermark.last_run_at.map(|at| at.to_rfc3339()),
        ),
        (
            KEY_RELOAD_REQUESTED,
            Some(watermark.reload_requested.to_string()),
        ),
        (
            KEY_RELOAD_FROM,
            watermark.reload_from.map(|d| d.to_string()),
        ),
        (KEY_INITIAL_DATE, Some(watermark.initial_date.to_string())),
        (KEY_LAST_RUN_LOG, watermark.last_run_log.clone()),
    ]
}

/// Rebuild a watermark; keys absent from `entries` keep their defaults.
fn watermark_from_entries(
    default_initial_date: NaiveDate,
    entries: &HashMap<String, String>,
) -> anyhow::Result<RunWatermark> {
    let mut watermark = RunWatermark::new(default_initial_date);

    if let Some(value) = entries.get(KEY_INITIAL_DATE) {
        watermark.initial_date = value
            .parse()
            .with_context(|| format!("Invalid {}: {}", KEY_INITIAL_DATE, value))?;
    }
    if let Some(value) = entries.get(KEY_LAST_RUN_AT) {
        watermark.last_run_at = Some(
            DateTime::parse_from_rfc3339(value)
                .with_context(|| format!("Invalid {}: {}", KEY_LAST_RUN_AT, value))?,
        );
    }
    if let Some(value) = entries.get(KEY_RELOAD_REQUESTED) {
        watermark.reload_requested = matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        );
    }
    if let Some(value) = entries.get(KEY_RELOAD_FROM) {
        watermark.reload_from = Some(
            value
                .parse()
                .with_context(|| format!("Invalid {}: {}", KEY_RELOAD_FROM, value))?,
        );
    }
    watermark.last_run_log = entries.get(KEY_LAST_RUN_LOG).cloned();

    Ok(watermark)
}

/// [`WatermarkStore`] over the `sync_state` key/value table.
#[derive(Clone)]
pub struct PgWatermarkStore {
    pool: PgPool,
    default_initial_date: NaiveDate,
}

impl PgWatermarkStore {
    /// `default_initial_date` applies until an `initial_date` is persisted.
    pub fn new(pool: PgPool, default_initial_date: NaiveDate) -> Self {
        Self {
            pool,
            default_initial_date,
        }
    }
}

#[async_trait]
impl WatermarkStore for PgWatermarkStore {
    #[instrument(skip(self))]
    async fn load(&self) -> anyhow::Result<RunWatermark> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["load_watermark"])
            .start_timer();

        let entries: HashMap<String, String> = sqlx::query("SELECT key, value FROM sync_state")
            .fetch_all(&self.pool)
            .await
            .context("Failed to read sync state")?
            .iter()
            .map(|row| Ok((row.try_get("key")?, row.try_get("value")?)))
            .collect::<Result<HashMap<String, String>, sqlx::Error>>()
            .context("Failed to decode sync state")?;

        timer.observe_duration();
        watermark_from_entries(self.default_initial_date, &entries)
    }

    #[instrument(skip(self, watermark))]
    async fn save(&self, watermark: &RunWatermark) -> anyhow::Result<()> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["save_watermark"])
            .start_timer();

        let mut tx = self.pool.begin().await?;
        for (key, value) in watermark_entries(watermark) {
            match value {
                Some(value) => {
                    sqlx::query(
                        r#"
                        INSERT INTO sync_state (key, value, updated_utc)
                        VALUES ($1, $2, NOW())
                        ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_utc = NOW()
                        "#,
                    )
                    .bind(key)
                    .bind(value)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to write {}", key))?;
                }
                None => {
                    sqlx::query("DELETE FROM sync_state WHERE key = $1")
                        .bind(key)
                        .execute(&mut *tx)
                        .await
                        .with_context(|| format!("Failed to clear {}", key))?;
                }
            }
        }
        tx.commit().await?;

        timer.observe_duration();
        info!(last_run_at = ?watermark.last_run_at, "Watermark saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entries(watermark: &RunWatermark) -> HashMap<String, String> {
        watermark_entries(watermark)
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
            .collect()
    }

    #[test]
    fn test_empty_state_uses_default_initial_date() {
        let watermark = watermark_from_entries(date(2021, 1, 1), &HashMap::new()).unwrap();
        assert_eq!(watermark, RunWatermark::new(date(2021, 1, 1)));
    }

    #[test]
    fn test_watermark_survives_storage() {
        let mut watermark = RunWatermark::new(date(2021, 1, 1));
        watermark.reload_from = Some(date(2023, 2, 1));
        let watermark = watermark.completed(
            FixedOffset::east_opt(3600)
                .unwrap()
                .with_ymd_and_hms(2023, 3, 10, 8, 0, 0)
                .unwrap(),
            "No changes from 09.03.2023 to 10.03.2023.",
        );

        let restored = watermark_from_entries(date(2020, 1, 1), &entries(&watermark)).unwrap();

        assert_eq!(restored, watermark);
    }

    #[test]
    fn test_operator_flag_spellings() {
        for (value, expected) in [("TRUE", true), ("1", true), ("false", false), ("", false)] {
            let map = HashMap::from([(KEY_RELOAD_REQUESTED.to_string(), value.to_string())]);
            let watermark = watermark_from_entries(date(2021, 1, 1), &map).unwrap();
            assert_eq!(watermark.reload_requested, expected, "value={value}");
        }
    }

    #[test]
    fn test_corrupt_date_is_an_error() {
        let map = HashMap::from([(KEY_LAST_RUN_AT.to_string(), "yesterday".to_string())]);
        assert!(watermark_from_entries(date(2021, 1, 1), &map).is_err());
    }

    #[test]
    fn test_column_list_follows_header_order() {
        let columns = column_list();
        assert!(columns.starts_with("tr_id, invoice_id, tr_event_code"));
        assert!(columns.ends_with("pp_ref_id, pp_ref_id_type"));
    }
}

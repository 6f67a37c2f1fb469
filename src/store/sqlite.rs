use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};
use uuid::Uuid;

use super::{
    cursor::{StoreCursor, truncate_to_millis},
    error::{StoreError, StoreResult},
    traits::{ArchiveRecord, ArchiveStore, ListPage, RecordFilter, ScanPage},
};
use crate::config::SqliteStorageConfig;

const RECORD_COLUMNS: &str = "id, uri, resource_type, hook_date, data, fetch_date, digest";

/// SQLite keeps at most 999 bound parameters per statement.
const MAX_KEYS_PER_DELETE: usize = 500;

/// Archive store backed by the `resource` table.
///
/// `fetch_date` is stored as Unix milliseconds and `id` as hyphenated text,
/// so `ORDER BY fetch_date, id` matches [`StoreCursor`] ordering.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn from_config(config: &SqliteStorageConfig) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&config.path)
                    .create_if_missing(config.create_if_missing)
                    .journal_mode(if config.wal_mode {
                        SqliteJournalMode::Wal
                    } else {
                        SqliteJournalMode::Delete
                    })
                    .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms)),
            )
            .await?;

        let store = Self::new(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    /// Private in-memory database on a single connection.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;

        let store = Self::new(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        tracing::info!("Running SQLite migrations");
        sqlx::migrate!("./migrations_sqlx/sqlite")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    fn record_from_row(row: &SqliteRow) -> StoreResult<ArchiveRecord> {
        let id: String = row.get("id");
        let fetch_millis: i64 = row.get("fetch_date");

        Ok(ArchiveRecord {
            id: parse_id(&id)?,
            uri: row.get("uri"),
            resource_type: row.get("resource_type"),
            hook_date: row.get("hook_date"),
            data: row.get("data"),
            fetch_date: from_millis(fetch_millis)?,
            digest: row.get("digest"),
        })
    }
}

fn parse_id(id: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(id).map_err(|e| StoreError::Internal(format!("bad record id '{id}': {e}")))
}

fn from_millis(millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Internal(format!("bad fetch_date {millis}")))
}

#[async_trait]
impl ArchiveStore for SqliteStore {
    async fn put(&self, record: ArchiveRecord) -> StoreResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO resource (id, uri, resource_type, hook_date, data, fetch_date, digest)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.uri)
        .bind(&record.resource_type)
        .bind(&record.hook_date)
        .bind(&record.data)
        .bind(truncate_to_millis(record.fetch_date).timestamp_millis())
        .bind(&record.digest)
        .execute(&self.pool)
        .await?;

        Ok(record.id)
    }

    async fn list(
        &self,
        filter: &RecordFilter,
        after: Option<&StoreCursor>,
        limit: usize,
    ) -> StoreResult<ListPage> {
        let (column, value) = match filter {
            RecordFilter::Uri(uri) => ("uri", uri.as_str()),
            RecordFilter::ResourceType(ty) => ("resource_type", ty.as_str()),
        };

        let rows = match after {
            Some(cursor) => {
                let sql = format!(
                    "SELECT {RECORD_COLUMNS} FROM resource \
                     WHERE {column} = ? AND (fetch_date < ? OR (fetch_date = ? AND id < ?)) \
                     ORDER BY fetch_date DESC, id DESC LIMIT ?"
                );
                let millis = cursor.fetch_date.timestamp_millis();
                sqlx::query(&sql)
                    .bind(value)
                    .bind(millis)
                    .bind(millis)
                    .bind(cursor.id.to_string())
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {RECORD_COLUMNS} FROM resource WHERE {column} = ? \
                     ORDER BY fetch_date DESC, id DESC LIMIT ?"
                );
                sqlx::query(&sql)
                    .bind(value)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let records = rows
            .iter()
            .map(Self::record_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        let next = if records.len() == limit {
            records.last().map(ArchiveRecord::cursor)
        } else {
            None
        };

        Ok(ListPage { records, next })
    }

    async fn scan_keys_before(
        &self,
        deadline: DateTime<Utc>,
        after: Option<&StoreCursor>,
        limit: usize,
    ) -> StoreResult<ScanPage> {
        let deadline_millis = deadline.timestamp_millis();

        let rows = match after {
            Some(cursor) => {
                let millis = cursor.fetch_date.timestamp_millis();
                sqlx::query(
                    r#"
                    SELECT id, fetch_date FROM resource
                    WHERE fetch_date < ? AND (fetch_date > ? OR (fetch_date = ? AND id > ?))
                    ORDER BY fetch_date ASC, id ASC
                    LIMIT ?
                    "#,
                )
                .bind(deadline_millis)
                .bind(millis)
                .bind(millis)
                .bind(cursor.id.to_string())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, fetch_date FROM resource
                    WHERE fetch_date < ?
                    ORDER BY fetch_date ASC, id ASC
                    LIMIT ?
                    "#,
                )
                .bind(deadline_millis)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut keys = Vec::with_capacity(rows.len());
        let mut last = None;
        for row in &rows {
            let id = parse_id(row.get::<&str, _>("id"))?;
            let fetch_date = from_millis(row.get("fetch_date"))?;
            keys.push(id);
            last = Some(StoreCursor::new(fetch_date, id));
        }

        Ok(ScanPage {
            keys,
            cursor: last.or(after.copied()),
        })
    }

    async fn delete_many(&self, keys: &[Uuid]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;

        for chunk in keys.chunks(MAX_KEYS_PER_DELETE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("DELETE FROM resource WHERE id IN ({placeholders})");

            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id.to_string());
            }
            deleted += query.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn count(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resource")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

use crate::backend::{BackendKind, CacheBackend};
use crate::error::{Error, ErrorKind, Result};
use crate::{CacheEntry, Database};
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::SqlitePool;

#[derive(sqlx::FromRow)]
struct EntryRow {
    key: String,
    data: String,
    timestamp: i64,
    metadata: String,
    version: i64,
}
impl TryFrom<EntryRow> for CacheEntry {
    type Error = Error;
    fn try_from(row: EntryRow) -> std::result::Result<Self, Self::Error> {
        let corrupt = || ErrorKind::Corrupt(row.key.clone());
        Ok(Self {
            data: serde_json::from_str(&row.data).or_raise(corrupt)?,
            timestamp: row.timestamp,
            metadata: serde_json::from_str(&row.metadata).or_raise(corrupt)?,
            version: u32::try_from(row.version).or_raise(corrupt)?,
        })
    }
}

/// Structured tier on a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}
impl From<&Database> for SqliteBackend {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn probe(&self) -> bool {
        match sqlx::query("SELECT 1 FROM cache_entries LIMIT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!(%error, "SQLite cache tier unavailable");
                false
            },
        }
    }

    async fn read(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../../queries/get_entry.sql"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(CacheEntry::try_from).transpose()
    }

    async fn write(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let data = serde_json::to_string(&entry.data).or_raise(|| ErrorKind::Serialization)?;
        let metadata = serde_json::to_string(&entry.metadata).or_raise(|| ErrorKind::Serialization)?;
        let size = i64::try_from(data.len() + metadata.len()).or_raise(|| ErrorKind::Serialization)?;
        let result = sqlx::query(include_str!("../../queries/upsert_entry.sql"))
            .bind(key)
            .bind(data)
            .bind(entry.timestamp)
            .bind(metadata)
            .bind(i64::from(entry.version))
            .bind(size)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            // SQLITE_FULL: the database or disk is full.
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("13") => {
                Err(exn::Exn::from(ErrorKind::QuotaExceeded))
            },
            Err(e) => Err(e).or_raise(|| ErrorKind::Database),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let result = sqlx::query(include_str!("../../queries/delete_entry.sql"))
            .bind(key)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(include_str!("../../queries/list_keys.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    async fn approx_bytes(&self) -> Result<u64> {
        let (_entries, bytes): (i64, i64) = sqlx::query_as(include_str!("../../queries/total_size.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(u64::try_from(bytes).unwrap_or(0))
    }

    async fn clear(&self) -> Result<usize> {
        let result = sqlx::query(include_str!("../../queries/delete_all.sql"))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }
}

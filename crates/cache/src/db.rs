//! SQLite pool backing the structured cache tier.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::sqlite::{
    SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const FILE_CONNECTIONS: u32 = 4;
/// Connection settings with no dedicated builder on `SqliteConnectOptions`.
const SESSION_PRAGMAS: &[(&str, &str)] =
    &[("wal_autocheckpoint", "800"), ("cache_size", "-8192"), ("temp_store", "MEMORY")];

/// Migrated connection pool for [`SqliteBackend`](crate::SqliteBackend).
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the cache database at `path`, creating it if needed.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::options().filename(path.as_ref()).create_if_missing(true);
        Self::open(options, FILE_CONNECTIONS).await
    }

    /// A private in-memory database, available to other crates' tests.
    pub async fn connect_in_memory() -> Result<Self> {
        // Each connection to `:memory:` would open a database of its own.
        Self::open(Self::options().filename(":memory:"), 1).await
    }

    fn options() -> SqliteConnectOptions {
        let options = SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(1500))
            // Catalog snapshots are replaced wholesale on resync.
            .auto_vacuum(SqliteAutoVacuum::Incremental);
        SESSION_PRAGMAS.iter().fold(options, |options, (key, value)| options.pragma(*key, *value))
    }

    #[instrument(skip(options))]
    async fn open(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        MIGRATOR.run(&pool).await.or_raise(|| ErrorKind::Migration)?;
        tracing::debug!("Cache database ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

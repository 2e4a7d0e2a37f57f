use std::{path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use sqlx::{
    Sqlite,
    pool::PoolConnection,
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
    },
};

pub(super) struct DbState {
    location: String,
    pool: SqlitePool,
}

impl std::fmt::Debug for DbState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbState")
            .field("location", &self.location)
            .finish()
    }
}

impl DbState {
    /// Open (or create) the database file and bring the schema up to date.
    pub(super) async fn open<P: AsRef<Path>>(db_file: P) -> anyhow::Result<Self> {
        let db_file = db_file.as_ref();
        if let Some(parent) = db_file.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create database directory {:?}", parent)
                })?;
            }
        }

        let connect_opts = SqliteConnectOptions::new()
            .filename(db_file)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_opts)
            .await
            .with_context(|| format!("Failed to open database {:?}", db_file))?;

        Self::migrate(db_file.display().to_string(), pool).await
    }

    /// A private in-memory database. Every pooled connection would see its own
    /// empty database, so the pool is pinned to a single connection that never
    /// expires.
    pub(super) async fn open_in_memory() -> anyhow::Result<Self> {
        let connect_opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(connect_opts)
            .await?;

        Self::migrate(":memory:".to_string(), pool).await
    }

    async fn migrate(location: String, pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        log::debug!("database ready at {}", location);
        Ok(Self { location, pool })
    }

    pub(super) async fn conn(&self) -> anyhow::Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    pub(super) fn location(&self) -> &str {
        &self.location
    }

    pub(super) async fn close(&self) {
        self.pool.close().await;
    }
}

//! SQLite backend.
//!
//! Keys come from `AUTOINCREMENT` columns. The pool holds a single
//! connection: SQLite admits one writer at a time anyway, and an in-memory
//! database only lives as long as its connection.
//!
//! Transactions open with `BEGIN IMMEDIATE`, so the write lock is taken up
//! front. A second handle on the same file then waits out `busy_timeout`
//! at `begin` instead of failing with `SQLITE_BUSY` when a deferred read
//! transaction tries to upgrade.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use super::port::{Backend, Dialect, Transaction};
use super::statements;
use crate::error::Result;

/// SQLite storage engine.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (creating if missing) a database such as `sqlite:queue.db`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        Self::with_options(options).await
    }

    /// A private in-memory database (for testing).
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        Self::with_options(options).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }
}

pub(crate) struct SqliteTransaction {
    tx: sqlx::Transaction<'static, sqlx::Sqlite>,
}

super::rows::sqlx_transaction!(SqliteTransaction);

#[async_trait]
impl Backend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(Box::new(SqliteTransaction { tx }))
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite").run(&self.pool).await?;
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        for statement in statements::sqlite::DESTROY {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query(statements::HEALTH_CHECK)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

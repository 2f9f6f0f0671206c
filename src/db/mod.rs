//! Database handle, backend selection, and scoped transactions.
//!
//! [`Db`] is a cheap-to-clone handle over one [`Backend`]. Every multi-step
//! mutation runs inside a [`Tx`]: `finish` commits on `Ok` and rolls back on
//! `Err`, and a `Tx` dropped before `finish` (panic, early return, cancelled
//! future) is rolled back by the driver.

pub mod port;
pub mod postgres;
pub(crate) mod rows;
pub mod sqlite;
pub(crate) mod statements;

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, Result};
pub use port::{Backend, Dialect, ElementInsert, Transaction};
pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

/// Database handle. Shared by every component of the queue.
#[derive(Clone)]
pub struct Db {
    backend: Arc<dyn Backend>,
}

impl Db {
    /// Connect to the backend named by the URL scheme
    /// (`postgres://`, `postgresql://` or `sqlite:`).
    pub async fn connect(url: &str) -> Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::from_backend(PostgresBackend::connect(url).await?))
        } else if url.starts_with("sqlite:") {
            Ok(Self::from_backend(SqliteBackend::connect(url).await?))
        } else {
            Err(Error::Config(
                "DATABASE_URL must start with postgres://, postgresql:// or sqlite:".to_string(),
            ))
        }
    }

    /// A migrated, private in-memory SQLite database (for testing).
    pub async fn in_memory() -> Result<Self> {
        let db = Self::from_backend(SqliteBackend::in_memory().await?);
        db.migrate().await?;
        Ok(db)
    }

    pub fn from_backend(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        self.backend.migrate().await
    }

    /// Drop the whole schema.
    pub async fn destroy(&self) -> Result<()> {
        self.backend.destroy().await
    }

    /// Round-trip a `SELECT 1`.
    pub async fn health_check(&self) -> Result<()> {
        self.backend.health_check().await
    }

    /// Open a transaction for composing several operations atomically.
    pub async fn begin(&self) -> Result<Tx> {
        Ok(Tx {
            inner: self.backend.begin().await?,
        })
    }

    /// Use the caller's transaction if one was supplied, otherwise open one
    /// that the returned scope owns.
    pub(crate) async fn scope<'a>(&self, within: Option<&'a mut Tx>) -> Result<Scope<'a>> {
        match within {
            Some(tx) => Ok(Scope::Borrowed(tx)),
            None => Ok(Scope::Owned(self.begin().await?)),
        }
    }
}

/// An open transaction. Derefs to the backend's [`Transaction`].
pub struct Tx {
    inner: Box<dyn Transaction>,
}

impl Tx {
    pub async fn commit(self) -> Result<()> {
        self.inner.commit().await
    }

    pub async fn rollback(self) -> Result<()> {
        self.inner.rollback().await
    }

    /// Commit if `result` is `Ok`, roll back otherwise, and hand `result`
    /// back. A failed rollback is logged; the original error wins.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    warn!(error = %rollback_err, "rollback failed after: {err}");
                }
                Err(err)
            }
        }
    }
}

impl Deref for Tx {
    type Target = dyn Transaction;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for Tx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

/// A transaction that is either owned by the current operation or borrowed
/// from the caller. Only an owned scope commits or rolls back in `finish`;
/// a borrowed one leaves that to its owner.
pub(crate) enum Scope<'a> {
    Owned(Tx),
    Borrowed(&'a mut Tx),
}

impl Scope<'_> {
    pub(crate) fn tx(&mut self) -> &mut dyn Transaction {
        match self {
            Scope::Owned(tx) => &mut **tx,
            Scope::Borrowed(tx) => &mut ***tx,
        }
    }

    pub(crate) async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match self {
            Scope::Owned(tx) => tx.finish(result).await,
            Scope::Borrowed(_) => result,
        }
    }
}

//! PostgreSQL backend.
//!
//! Primary keys come from explicit sequences (see
//! `migrations/postgres`), so teardown drops sequences after tables.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::port::{Backend, Dialect, Transaction};
use super::statements;
use crate::error::Result;

/// PostgreSQL storage engine. Owns the connection pool.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }
}

pub(crate) struct PgTransaction {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

super::rows::sqlx_transaction!(PgTransaction);

#[async_trait]
impl Backend for PostgresBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/postgres")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        for statement in statements::postgres::DESTROY {
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

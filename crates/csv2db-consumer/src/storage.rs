//! Contact storage
//!
//! [`Sink`] is the seam between the consumer pipeline and the database.
//! [`PgSink`] writes to the `contacts` table through a connection pool, one
//! connection per in-flight insert.

use async_trait::async_trait;
use csv2db_common::Message;
use sqlx::migrate::MigrateError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

/// Time allowed to get a pooled connection before an insert fails.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Failed to apply migrations: {0}")]
    Migrate(#[from] MigrateError),

    #[error("Failed to insert contact: {0}")]
    Insert(#[source] sqlx::Error),

    /// Raised by sinks that are not backed by sqlx
    #[error("{0}")]
    Other(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Destination for decoded messages.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    async fn insert(&self, message: &Message) -> StorageResult<()>;
}

pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    /// Build the pool and check the database answers.
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(config.connect_options())
            .await
            .map_err(StorageError::Connect)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(StorageError::Connect)?;

        info!(
            host = %config.host,
            database = %config.name,
            max_connections = config.max_connections,
            "Database connection pool created"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded migrations.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Sink for PgSink {
    async fn insert(&self, message: &Message) -> StorageResult<()> {
        sqlx::query("INSERT INTO contacts (name, email) VALUES ($1, $2)")
            .bind(&message.name)
            .bind(&message.email)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Insert)?;
        Ok(())
    }
}

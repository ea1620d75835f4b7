//! `MySQL` range store.

use async_trait::async_trait;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;

use crate::config::SqlStoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::storage::traits::RangeStore;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS id_segments (
    biz_tag VARCHAR(128) NOT NULL PRIMARY KEY,
    max_id BIGINT NOT NULL DEFAULT 0,
    step BIGINT NOT NULL,
    description VARCHAR(256) NOT NULL DEFAULT '',
    update_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
)";

/// Range store backed by the `id_segments` table.
pub struct MySqlRangeStore {
    pool: MySqlPool,
}

impl MySqlRangeStore {
    /// Open the connection pool and make sure the table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or the table cannot be created.
    pub async fn connect(config: &SqlStoreConfig) -> StorageResult<Self> {
        let pool = MySqlPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl RangeStore for MySqlRangeStore {
    async fn initialize(&self, biz_tag: &str, step: i64) -> StorageResult<()> {
        sqlx::query("INSERT IGNORE INTO id_segments (biz_tag, max_id, step) VALUES (?, 0, ?)")
            .bind(biz_tag)
            .bind(step)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn claim(&self, biz_tag: &str, step: i64) -> StorageResult<i64> {
        // Dropping `tx` without commit rolls back.
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE id_segments SET max_id = max_id + ? WHERE biz_tag = ?")
            .bind(step)
            .bind(biz_tag)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() != 1 {
            return Err(StorageError::NotFound(format!(
                "Segment '{biz_tag}' not found"
            )));
        }

        let max_id: i64 = sqlx::query_scalar("SELECT max_id FROM id_segments WHERE biz_tag = ?")
            .bind(biz_tag)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(max_id)
    }

    async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

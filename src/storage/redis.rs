//! Redis range store.
//!
//! Each tag is an integer key; `INCRBY` is the atomic add-and-read. A short
//! script refuses to create the key implicitly so an unknown tag surfaces as
//! `NotFound` like the SQL backends.

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use redis::Script;

use crate::config::RedisStorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::storage::traits::RangeStore;

const CLAIM_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('INCRBY', KEYS[1], ARGV[1])
end
return false
";

/// Range store backed by Redis counters.
pub struct RedisRangeStore {
    pool: Pool,
    key_prefix: String,
    claim_script: Script,
}

impl RedisRangeStore {
    /// Build the connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created from the configured URL.
    pub fn new(config: &RedisStorageConfig) -> StorageResult<Self> {
        let mut pool_config = Config::from_url(config.url.clone());
        pool_config.pool = Some(PoolConfig::new(config.pool_size));
        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            key_prefix: config.key_prefix.clone(),
            claim_script: Script::new(CLAIM_SCRIPT),
        })
    }

    fn key(&self, biz_tag: &str) -> String {
        format!("{}{biz_tag}", self.key_prefix)
    }
}

#[async_trait]
impl RangeStore for RedisRangeStore {
    async fn initialize(&self, biz_tag: &str, _step: i64) -> StorageResult<()> {
        let mut conn = self.pool.get().await?;
        let _: () = redis::cmd("SET")
            .arg(self.key(biz_tag))
            .arg(0)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn claim(&self, biz_tag: &str, step: i64) -> StorageResult<i64> {
        let mut conn = self.pool.get().await?;
        let new_max: Option<i64> = self
            .claim_script
            .key(self.key(biz_tag))
            .arg(step)
            .invoke_async(&mut conn)
            .await?;

        new_max.ok_or_else(|| StorageError::NotFound(format!("Segment '{biz_tag}' not found")))
    }

    async fn health_check(&self) -> StorageResult<()> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn close(&self) {
        self.pool.close();
    }
}

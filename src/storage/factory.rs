//! Range store factory.
//!
//! Creates the appropriate store backend based on configuration.

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::AppError;
use crate::storage::file::FileRangeStore;
use crate::storage::mysql::MySqlRangeStore;
use crate::storage::postgres::PostgresRangeStore;
use crate::storage::redis::RedisRangeStore;
use crate::storage::traits::RangeStore;

/// Create a range store based on configuration.
///
/// The store is health-checked before it is returned.
///
/// # Errors
///
/// Returns an error if the backend cannot be initialized or is unreachable.
pub async fn create_store(config: &StorageConfig) -> Result<Arc<dyn RangeStore>, AppError> {
    let store: Arc<dyn RangeStore> = match config.backend {
        StorageBackend::File => Arc::new(FileRangeStore::new(&config.file)?),
        StorageBackend::Redis => Arc::new(RedisRangeStore::new(&config.redis)?),
        StorageBackend::MySQL => Arc::new(MySqlRangeStore::connect(&config.mysql).await?),
        StorageBackend::PostgreSQL => {
            Arc::new(PostgresRangeStore::connect(&config.postgresql).await?)
        }
    };

    store.health_check().await?;

    Ok(store)
}

pub mod memory;
pub mod postgres;
pub mod store;

use crate::config::{AppConfig, StoreBackend};
use crate::{AppError, Result};
pub use store::Store;

/// Builds the `Store` the rest of the application is constructed against,
/// picking the backend named by `AppConfig::store_backend`.
pub async fn build_store(config: &AppConfig) -> Result<Store> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::info!("store backend: in-memory");
            Ok(memory::memory_store())
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| AppError::InternalError("DATABASE_URL is required for the postgres backend".into()))?;
            tracing::info!("store backend: postgres");
            let db = postgres::PostgresDatabase::new(url).await?;
            Ok(db.into_store())
        }
    }
}

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, Result};

use std::sync::Arc;

use auth::Sealer;
use services::{Supervisor, SupervisorConfig};

/// Shared state for the control-plane HTTP API. Worker processes don't
/// construct this — they run a rotation loop plus a minimal standalone
/// health router instead (see `main.rs`).
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: db::Store,
    pub sealer: Arc<Sealer>,
    pub supervisor: Arc<Supervisor>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store = db::build_store(&config).await?;
        let sealer = Arc::new(Sealer::new(&config.seal_key));
        let supervisor = Arc::new(Supervisor::new(
            SupervisorConfig::new(config.worker_health_port_base),
            store.clone(),
        ));

        Ok(Self { config, store, sealer, supervisor })
    }
}

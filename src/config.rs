use std::env;

/// Which document-store backend to wire up. `Memory` is the default and
/// is what the integration tests run against; `Postgres` is the
/// production-shaped adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    /// Symmetric key material for credential sealing. The core only
    /// needs a key-opaque seal/unseal pair.
    pub seal_key: String,
    /// Global rate-limit threshold: `await_capacity` blocks below this.
    pub rate_limit_threshold: u32,
    /// USD per 1,000 HTTP requests billed by Reddit.
    pub cost_per_1000_requests: f64,
    /// How often the Usage Recorder flushes buffered counters.
    pub flush_interval_secs: u64,
    /// Base port for worker health-check servers; the Supervisor assigns
    /// `base + index` to each spawned child.
    pub worker_health_port_base: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let store_backend = match env::var("STORE_BACKEND").ok().as_deref() {
            Some("postgres") => StoreBackend::Postgres,
            _ => StoreBackend::Memory,
        };

        Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            store_backend,
            database_url: env::var("DATABASE_URL").ok(),
            seal_key: env::var("FLEET_SEAL_KEY")
                .unwrap_or_else(|_| "dev-seal-key-change-in-production".to_string()),
            rate_limit_threshold: env::var("RATE_LIMIT_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            cost_per_1000_requests: env::var("COST_PER_1000_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.24),
            flush_interval_secs: env::var("FLUSH_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            worker_health_port_base: env::var("WORKER_HEALTH_PORT_BASE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9100),
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            store_backend: StoreBackend::Memory,
            database_url: None,
            seal_key: "dev-seal-key-change-in-production".to_string(),
            rate_limit_threshold: 50,
            cost_per_1000_requests: 0.24,
            flush_interval_secs: 60,
            worker_health_port_base: 9100,
        }
    }
}

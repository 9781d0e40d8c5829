pub mod routes;
pub mod seed;
pub mod store;

pub use routes::{router, AppState};
pub use store::{Store, StoreError};

/// Server settings, read from the environment.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub db_path: String,
    pub bind: String,
    pub anon_key: String,
    pub seed_demo: bool,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("CRISIS_DB_PATH").unwrap_or_else(|_| "crisis.db".into()),
            bind: std::env::var("CRISIS_BIND").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            anon_key: std::env::var("CRISIS_ANON_KEY").unwrap_or_else(|_| "local-anon-key".into()),
            seed_demo: std::env::var("CRISIS_SEED_DEMO")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}

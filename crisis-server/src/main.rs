use anyhow::Context;
use crisis_server::{router, seed, AppState, ServerConfig, Store};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = ServerConfig::from_env();

    let store = Store::open(&config.db_path)
        .with_context(|| format!("open database {}", config.db_path))?;
    if config.seed_demo && !store.has_crises()? {
        seed::seed_demo_data(&store, chrono::Utc::now()).context("seed demo data")?;
    }

    let app = router(AppState::new(store, &config.anon_key));
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;

    tracing::info!(bind = %config.bind, db = %config.db_path, "crisis-server listening");
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}

//! Atendo API server entrypoint

use std::sync::Arc;
use std::time::Duration;

use atendo_api::{routes::create_router, AppState, Config};
use atendo_shared::db;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atendo_api=info,atendo_shared=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    let probe_interval = Duration::from_secs(config.probe_interval_secs);
    let bind_address = config.bind_address.clone();

    let state = AppState::new(config, pool);

    // Liveness reaper for the session registry
    tokio::spawn(Arc::clone(&state.registry).run_reaper(probe_interval));

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "Atendo API listening");
    axum::serve(listener, app).await?;

    Ok(())
}

//! ResumeLens API server

use anyhow::Result;
use resumelens_api::{config::Config, routes::create_router, state::AppState};
use resumelens_shared::db::{create_migration_pool, create_pool, run_migrations};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ResumeLens API v{}", env!("CARGO_PKG_VERSION"));

    // Migrations run on a dedicated single-connection pool
    let migration_pool = create_migration_pool(&config.database_url).await?;
    run_migrations(&migration_pool).await?;
    migration_pool.close().await;
    tracing::info!("Migrations applied");

    let pool = create_pool(&config.database_url, config.database_max_connections).await?;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, pool)?;

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}

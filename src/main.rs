use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use tsdb_sql::api;
use tsdb_sql::config::Config;
use tsdb_sql::models::DatabaseType;
use tsdb_sql::services::database::create_executor;
use tsdb_sql::services::{mask_credentials, ConnectionPoolManager, QueryService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration; RUST_LOG and RUST_LOG_STYLE land in `logging`
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(config.logging.env_filter())
        .with_ansi(config.logging.ansi())
        .init();

    let db_type: DatabaseType = config
        .database
        .db_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    info!(
        "Using {} data source at {}",
        db_type,
        mask_credentials(&config.database.url)
    );

    let pool_manager = Arc::new(ConnectionPoolManager::with_max_size(
        config.database.max_connections,
    ));
    let executor = create_executor(db_type, &config.database.url, pool_manager)
        .await
        .context("Failed to create query executor")?;

    if let Err(e) = executor.test_connection().await {
        // Connection failures surface per query from here on
        error!("Data source is not reachable yet: {}", e);
    }

    let query_service = Arc::new(QueryService::new(executor, &config.query));
    let app: Router = api::routes::create_router(query_service);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// Mortgage Calculator - Web Server

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::PathBuf;

use mortgage_calc::api::{router, AppState};
use mortgage_calc::logging::init_logging;
use mortgage_calc::{count_offers, setup_database, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // MORTGAGE_CONFIG points at an optional TOML file
    let config_path = std::env::var_os("MORTGAGE_CONFIG").map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    init_logging(&config.logging.level, config.logging.json);

    // Open database
    let conn = Connection::open(&config.database.path)
        .with_context(|| format!("Failed to open database {:?}", config.database.path))?;
    setup_database(&conn)?;
    tracing::info!(
        path = ?config.database.path,
        offers = count_offers(&conn)?,
        "Database opened"
    );

    let addr = config.server.bind_addr.clone();
    let app = router(AppState::new(conn, config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!(%addr, "Server running; API at /api/offer, UI at /");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

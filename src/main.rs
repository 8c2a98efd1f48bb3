//! Subscription Storefront - Main Application Entry Point
//!
//! REST API server for a streaming-subscription store. Customers browse the
//! catalog, order and pay; administrators approve orders and manage the
//! credential pool.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries, assignment procedures)
//! - **Authentication**: bearer tokens verified against the hosted auth service
//! - **Format**: JSON requests/responses, Arabic error messages
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build shared state (HTTP clients, rate limiters)
//! 5. Build HTTP router with routes and middleware
//! 6. Start server on configured port

use std::{net::SocketAddr, time::Duration};

use subscription_storefront::{app, config, db, state::AppState};
use tracing_subscriber::EnvFilter;

/// How often idle rate-limit windows are dropped.
const LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    let admins = config.admin_allow_list();
    tracing::info!(
        admins = admins.len(),
        mail_relay = config.mail_webhook_url.is_some(),
        "Configuration loaded"
    );
    if admins.is_empty() {
        tracing::warn!("ADMIN_EMAILS is empty, back-office routes will answer 403");
    }

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let port = config.server_port;
    let state = AppState::new(pool, config)?;
    state.limiters.spawn_janitor(LIMITER_SWEEP_INTERVAL);

    let app = app::build_router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Peer addresses feed the per-IP rate limiters
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

mod analyzer;
mod composition;
mod config;
mod engine;
mod error;
mod extractors;
mod handlers;
mod materials;
mod metrics;
mod models;
mod rate_limit;
mod security;
mod state;
mod validation;

use clap::Parser; // for cli
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::analyzer::PhaseAnalyzer;
use crate::config::Args;
use crate::engine::HttpPhaseEngine;
use crate::materials::HttpMaterialsClient;
use crate::rate_limit::{RateLimiter, rate_limit_sweeper};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so clap and RUST_LOG can see it
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let file_layer = match args.log_file_path() {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    let backend_url = args.backend_base_url();
    let backend_timeout = Duration::from_secs(args.backend_timeout);
    let client = reqwest::Client::new();

    let analyzer = PhaseAnalyzer::new(
        Arc::new(HttpMaterialsClient::new(client.clone(), backend_url.clone(), backend_timeout)),
        Arc::new(HttpPhaseEngine::new(client, backend_url.clone(), backend_timeout)),
    );

    let rate_limiter = Arc::new(RateLimiter::new(args.rate_limit, args.rate_window()));

    let state = Arc::new(AppState {
        app_name: args.app_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        rate_limiter: Arc::clone(&rate_limiter),
        analyzer,
        limits: args.validation_limits(),
        api_key_hash_length: args.api_key_hash_length,
    });

    // spawn the background sweeper
    let sweep_interval = Duration::from_secs(args.sweep_interval.max(1));
    tokio::spawn(async move {
        rate_limit_sweeper(rate_limiter, sweep_interval).await;
    });

    let app = handlers::router(state).layer(TraceLayer::new_for_http());

    let addr = args.server_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Starting {} v{}", args.app_name, env!("CARGO_PKG_VERSION"));
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Materials database and phase engine at {}", backend_url);
    tracing::info!(
        "Rate limit: {} requests per {} seconds",
        args.rate_limit,
        args.rate_window
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down {}", args.app_name);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

mod error;
mod extractors;
mod middleware;
mod routes;
mod state;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::{extract::State, http::{HeaderValue, StatusCode}, response::IntoResponse, routing::get, Json, Router};
use clap::Parser;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relaykit_common::Config;
use state::AppState;

#[derive(Parser)]
#[command(name = "relaykit-http")]
#[command(about = "RelayKit HTTP API server")]
#[command(version)]
struct Args {
    /// Path to .env file (e.g., .env.loadtest)
    #[arg(short, long)]
    env: Option<String>,

    /// Log level (e.g., "info", "debug", "info,relaykit=debug")
    #[arg(short, long)]
    log: Option<String>,

    /// Host to bind to (overrides HTTP_HOST env var)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides HTTP_PORT env var)
    #[arg(short, long)]
    port: Option<u16>,

    /// Redis URL (overrides REDIS_URL env var)
    #[arg(long)]
    redis_url: Option<String>,

    /// Disable rate limiting
    #[arg(long)]
    no_rate_limit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = args.log.clone().or_else(|| std::env::var("RUST_LOG").ok()).unwrap_or_else(|| "info,relaykit=debug".into());

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.env {
        Some(path) => {
            tracing::info!("loading config from {}", path);
            Config::from_env_file(path)?
        }
        None => Config::from_env()?,
    };

    if let Some(host) = args.host {
        config.http_host = host;
    }
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(redis_url) = args.redis_url {
        config.redis_url = redis_url;
    }
    if args.no_rate_limit {
        config.rate_limit.enabled = false;
    }

    tracing::info!("starting relaykit http server");

    let metrics_handle = setup_metrics();
    let state = AppState::new(config.clone()).await?;

    spawn_counter_reconciler(state.clone());

    let cors = if config.allowed_origins.is_empty() {
        tracing::warn!("ALLOWED_ORIGINS unset, allowing any origin");
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = config.allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins).allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any)
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/metrics",
            get({
                let handle = metrics_handle.clone();
                move || {
                    let h = handle.clone();
                    async move { h.render() }
                }
            }),
        )
        .nest(
            "/v1",
            routes::router()
                .layer(axum::middleware::from_fn(middleware::security_headers))
                .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state.clone());

    let host: std::net::IpAddr = state.config.http_host.parse().unwrap_or_else(|_| {
        tracing::warn!("invalid HTTP_HOST '{}', defaulting to 127.0.0.1", state.config.http_host);
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1))
    });
    let addr = SocketAddr::from((host, state.config.http_port));
    tracing::info!("listening on {addr}");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

fn setup_metrics() -> PrometheusHandle {
    const EXPONENTIAL_SECONDS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full("http_request_duration_seconds".to_string()), EXPONENTIAL_SECONDS)
        .unwrap()
        .install_recorder()
        .expect("failed to install prometheus recorder")
}

/// Periodically recomputes derived counters (spec.md §8: "counter
/// inconsistencies are reconciled by a background verifier").
fn spawn_counter_reconciler(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            if let Err(e) = state.engine.store.reconcile_counters().await {
                tracing::error!("counter reconciliation failed: {e}");
            }
        }
    });
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    redis: &'static str,
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let redis_ok = state.engine.store.ping().await.is_ok();

    let response = HealthResponse {
        status: if redis_ok { "healthy" } else { "degraded" },
        redis: if redis_ok { "connected" } else { "disconnected" },
    };

    let status = if redis_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (status, Json(response))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install CTRL+C handler");
    tracing::info!("shutting down");
}

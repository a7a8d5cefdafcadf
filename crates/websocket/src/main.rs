mod handler;
mod messages;
mod state;
mod subscriber;

use anyhow::Result;
use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relaykit_common::auth::{self, TokenKind};
use relaykit_common::Config;
use state::WsState;

#[derive(Parser)]
#[command(name = "relaykit-websocket")]
#[command(about = "RelayKit real-time WebSocket server")]
#[command(version)]
struct Args {
    #[arg(short, long)]
    env: Option<String>,
    #[arg(short, long)]
    log: Option<String>,
    #[arg(long)]
    host: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(long)]
    redis_url: Option<String>,
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
        config.ws_host = host;
    }
    if let Some(port) = args.port {
        config.ws_port = port;
    }
    if let Some(redis_url) = args.redis_url {
        config.redis_url = redis_url;
    }

    tracing::info!("starting relaykit websocket server");

    let state = WsState::new(config.clone()).await?;
    subscriber::start(&state);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let host: std::net::IpAddr = config.ws_host.parse().unwrap_or_else(|_| {
        tracing::warn!("invalid WS_HOST '{}', defaulting to 127.0.0.1", config.ws_host);
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1))
    });
    let addr = SocketAddr::from((host, config.ws_port));
    tracing::info!("websocket server listening on {addr}");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    /// Access token, attached to the connect URL (spec.md §6.2).
    token: String,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>, Query(query): Query<WsQuery>) -> Response {
    let claims = match auth::verify_token(&query.token, &state.config.access_token_secret, TokenKind::Access) {
        Ok(claims) => claims,
        Err(_) => return (axum::http::StatusCode::UNAUTHORIZED, "invalid token").into_response(),
    };

    ws.on_upgrade(move |socket| handler::handle_socket(socket, state, claims.sub))
}

async fn health_check() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct MetricsResponse {
    active_connections: u64,
    total_connections: u64,
    total_messages_received: u64,
    total_messages_sent: u64,
    channels_count: u64,
}

async fn metrics(State(state): State<WsState>) -> impl IntoResponse {
    let m = state.get_metrics();
    Json(MetricsResponse {
        active_connections: m.active_connections,
        total_connections: m.total_connections,
        total_messages_received: m.total_messages_received,
        total_messages_sent: m.total_messages_sent,
        channels_count: m.channels_count,
    })
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install CTRL+C handler");
    tracing::info!("shutting down");
}

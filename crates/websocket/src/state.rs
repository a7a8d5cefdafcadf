//! WebSocket server state management.

use anyhow::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use relaykit_common::broker::Broker;
use relaykit_common::engine::Engine;
use relaykit_common::store::Store;
use relaykit_common::types::{Envelope, Topic};
use relaykit_common::Config;

#[derive(Clone)]
pub struct WsState {
    pub config: Arc<Config>,
    pub engine: Arc<Engine>,
    pub channels: Arc<DashMap<Topic, broadcast::Sender<Envelope>>>,
    pub active_connections: Arc<AtomicU64>,
    pub total_connections: Arc<AtomicU64>,
    pub total_messages_received: Arc<AtomicU64>,
    pub total_messages_sent: Arc<AtomicU64>,
}

impl WsState {
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(Store::new(&config.redis_url).await?);
        let broker = Arc::new(Broker::new(&config.redis_url).await?);
        tracing::info!("websocket server connected to redis");

        let engine = Arc::new(Engine::new(store, broker));

        Ok(WsState {
            config: Arc::new(config),
            engine,
            channels: Arc::new(DashMap::new()),
            active_connections: Arc::new(AtomicU64::new(0)),
            total_connections: Arc::new(AtomicU64::new(0)),
            total_messages_received: Arc::new(AtomicU64::new(0)),
            total_messages_sent: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn get_or_create_channel(&self, topic: Topic) -> broadcast::Sender<Envelope> {
        self.channels.entry(topic).or_insert_with(|| broadcast::channel(1000).0).clone()
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Envelope> {
        self.get_or_create_channel(topic).subscribe()
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.total_messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.total_messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self) -> Metrics {
        Metrics {
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            total_messages_received: self.total_messages_received.load(Ordering::Relaxed),
            total_messages_sent: self.total_messages_sent.load(Ordering::Relaxed),
            channels_count: self.channels.len() as u64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Metrics {
    pub active_connections: u64,
    pub total_connections: u64,
    pub total_messages_received: u64,
    pub total_messages_sent: u64,
    pub channels_count: u64,
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use moka::future::Cache;
use uuid::Uuid;

use relaykit_common::auth_bridge::LoggingMailCollaborator;
use relaykit_common::broker::Broker;
use relaykit_common::engine::Engine;
use relaykit_common::ratelimit::RateLimiter;
use relaykit_common::store::Store;
use relaykit_common::Config;

/// ETag cache for Post/Comment reads: key is the entity id, value is its
/// `updated_at` millis. Avoids a Store round trip on unchanged polling reads.
pub type ETagCache = Cache<Uuid, i64>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<Engine>,
    pub rate_limiter: Arc<RateLimiter>,
    pub mail: Arc<LoggingMailCollaborator>,
    pub etag_cache: ETagCache,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(Store::new(&config.redis_url).await?);
        tracing::info!("store connected to redis");

        let broker = Arc::new(Broker::new(&config.redis_url).await?);
        let rate_limiter = Arc::new(RateLimiter::new(&config.redis_url).await?);

        let engine = Arc::new(Engine::new(store, broker));

        let etag_cache = Cache::builder().max_capacity(1_000_000).time_to_idle(Duration::from_secs(300)).build();

        Ok(AppState {
            config: Arc::new(config),
            engine,
            rate_limiter,
            mail: Arc::new(LoggingMailCollaborator),
            etag_cache,
        })
    }
}

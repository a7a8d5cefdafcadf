//! Fixed-window rate limiter backed by Redis `INCR`+`EXPIRE`, grounded on the
//! teacher's `check_rate_limit`/`RateLimitResult` shape in `middleware.rs`,
//! generalized to drop the multi-tenant site-override lookup (this system
//! has no site concept) while keeping the IP/user/auth-route tiering.

use fred::prelude::*;
use chrono::Utc;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: i64,
}

pub struct RateLimiter {
    client: Client,
}

impl RateLimiter {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let config = Config::from_url(redis_url).map_err(Error::Redis)?;
        let client = Builder::from_config(config).build().map_err(Error::Redis)?;
        client.init().await.map_err(Error::Redis)?;
        Ok(RateLimiter { client })
    }

    /// Increments `key`'s counter in the current fixed window of
    /// `window_secs`, setting its expiry only on first touch of the window.
    pub async fn check(&self, key: &str, limit: u32, window_secs: u64) -> Result<RateLimitResult> {
        let count: i64 = self.client.incr(key).await.map_err(Error::Redis)?;
        if count == 1 {
            self.client.expire::<(), _>(key, window_secs as i64, None).await.map_err(Error::Redis)?;
        }
        let ttl: i64 = self.client.ttl(key).await.map_err(Error::Redis)?;
        let reset_at = Utc::now().timestamp() + ttl.max(0);

        Ok(RateLimitResult {
            allowed: (count as u32) <= limit,
            limit,
            remaining: limit.saturating_sub(count as u32),
            reset_at,
        })
    }
}

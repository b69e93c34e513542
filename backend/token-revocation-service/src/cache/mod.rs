//! Token blacklist consulted by token-verification paths
//!
//! Only ever written from here. Entries expire on their own once the token's
//! maximum validity window has passed.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;

/// Default blacklist TTL, matching the longest-lived access token
pub const BLACKLIST_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const BLACKLIST_PREFIX: &str = "jwt:blacklist:";

const BLACKLIST_MARKER: &str = "1";

/// **Key format**: `jwt:blacklist:{jti}`
pub fn blacklist_key(jti: &str) -> String {
    format!("{}{}", BLACKLIST_PREFIX, jti)
}

/// Write-only marker store for revoked tokens
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Mark `jti` as revoked for `ttl`. Re-marking an existing entry refreshes the TTL.
    async fn blacklist(&self, jti: &str, ttl: Duration) -> Result<()>;
}

/// Redis blacklist using a shared connection manager
#[derive(Clone)]
pub struct RedisTokenBlacklist {
    redis: ConnectionManager,
}

impl RedisTokenBlacklist {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Connect and build a blacklist for `redis_url`
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(manager))
    }

    /// Check whether `jti` currently has a blacklist entry
    pub async fn is_blacklisted(&self, jti: &str) -> Result<bool> {
        let mut conn = self.redis.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(blacklist_key(jti))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    /// Remaining TTL of the entry in seconds (`None` when absent or persistent)
    pub async fn ttl_secs(&self, jti: &str) -> Result<Option<u64>> {
        let mut conn = self.redis.clone();
        let ttl: i64 = redis::cmd("TTL")
            .arg(blacklist_key(jti))
            .query_async(&mut conn)
            .await?;
        Ok(u64::try_from(ttl).ok())
    }
}

#[async_trait]
impl TokenBlacklist for RedisTokenBlacklist {
    async fn blacklist(&self, jti: &str, ttl: Duration) -> Result<()> {
        let key = blacklist_key(jti);
        let seconds = ttl_seconds(ttl);
        let mut conn = self.redis.clone();

        redis::cmd("SET")
            .arg(&key)
            .arg(BLACKLIST_MARKER)
            .arg("EX")
            .arg(seconds)
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!(jti = %jti, ttl = seconds, "Token added to blacklist");
        Ok(())
    }
}

/// Redis rejects `EX 0`; sub-second TTLs round up to one second
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

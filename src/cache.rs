// =============================================================================
// CACHE MODULE
// =============================================================================
// Best-effort Redis cache for catalog reads. Every failure degrades to a cache
// miss; the store stays the source of truth.
// =============================================================================

use std::time::Instant;

use serde::{de::DeserializeOwned, Serialize};

use crate::metrics;

/// Room entries live for 5 minutes
pub const ROOM_TTL_SECS: u64 = 300;

pub fn room_key(room_id: &str) -> String {
    format!("room:{}", room_id)
}

#[derive(Clone)]
pub struct Cache {
    redis: Option<redis::aio::ConnectionManager>,
}

impl Cache {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis: Some(redis) }
    }

    /// Cache that never hits, for deployments without Redis.
    pub fn disabled() -> Self {
        Self { redis: None }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.redis.clone()?;
        let start = Instant::now();

        let cached: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .ok()
            .flatten();

        metrics::record_redis_operation("get", start.elapsed().as_secs_f64());

        let value = serde_json::from_str(&cached?);
        if let Err(e) = &value {
            tracing::debug!(key = key, error = %e, "Discarding unreadable cache entry");
        }
        value.ok()
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let Some(mut conn) = self.redis.clone() else {
            return;
        };
        let Ok(json) = serde_json::to_string(value) else {
            return;
        };
        let start = Instant::now();

        let result: Result<(), _> = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_secs)
            .arg(json)
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            tracing::debug!(key = key, error = %e, "Cache write failed");
        }

        metrics::record_redis_operation("set", start.elapsed().as_secs_f64());
    }

    /// `None` when caching is disabled, otherwise whether Redis answers PING.
    pub async fn ping(&self) -> Option<bool> {
        let mut conn = self.redis.clone()?;
        Some(
            redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
                .is_ok(),
        )
    }
}

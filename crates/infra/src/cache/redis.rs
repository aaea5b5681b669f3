//! Redis-backed cache (`--features redis`).
//!
//! Every failure is logged and degrades to a miss; the engine never sees a
//! cache error.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::warn;

use storefront_orders::cache::Cache;

#[derive(Debug, Clone)]
pub struct RedisCache {
    client: Arc<redis::Client>,
}

impl RedisCache {
    /// Connect lazily to the given URL (e.g. `redis://localhost:6379`).
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url.as_ref())?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    fn connection(&self) -> Option<redis::Connection> {
        match self.client.get_connection() {
            Ok(conn) => Some(conn),
            Err(err) => {
                warn!(error = %err, "redis cache connection failed");
                None
            }
        }
    }
}

impl Cache for RedisCache {
    fn get(&self, key: &str) -> Option<JsonValue> {
        let mut conn = self.connection()?;
        let raw: Option<String> = match redis::cmd("GET").arg(key).query(&mut conn) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "redis GET failed");
                return None;
            }
        };
        let raw = raw?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "redis cache held invalid JSON, evicting");
                self.evict(key);
                None
            }
        }
    }

    fn put(&self, key: &str, value: JsonValue, ttl: Duration) {
        let Some(mut conn) = self.connection() else {
            return;
        };
        let payload = value.to_string();
        let result: Result<(), redis::RedisError> = redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query(&mut conn);
        if let Err(err) = result {
            warn!(key, error = %err, "redis SET failed");
        }
    }

    fn evict(&self, key: &str) {
        let Some(mut conn) = self.connection() else {
            return;
        };
        let result: Result<u64, redis::RedisError> = redis::cmd("DEL").arg(key).query(&mut conn);
        if let Err(err) = result {
            warn!(key, error = %err, "redis DEL failed");
        }
    }

    fn evict_namespace(&self, prefix: &str) {
        let Some(mut conn) = self.connection() else {
            return;
        };
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        loop {
            let reply: Result<(u64, Vec<String>), redis::RedisError> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query(&mut conn);
            let (next, keys) = match reply {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(prefix, error = %err, "redis SCAN failed");
                    return;
                }
            };
            if !keys.is_empty() {
                let result: Result<u64, redis::RedisError> =
                    redis::cmd("DEL").arg(&keys[..]).query(&mut conn);
                if let Err(err) = result {
                    warn!(prefix, error = %err, "redis DEL failed during namespace eviction");
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
    }
}

//! Read-path cache contract and key/TTL conventions.
//!
//! Caching is strictly an optimization: every failure on the cache side
//! (backend down, bad payload) degrades to a miss. Implementations log their
//! own failures and never surface them; the engine evicts strictly after the
//! owning transaction commits.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use storefront_core::{OrderId, UserId};

/// TTL for single-order entries (`order:{id}`).
pub const ORDER_TTL: Duration = Duration::from_secs(5 * 60);
/// TTL for per-owner list entries (`orders:owner:{user_id}`).
pub const OWNER_LIST_TTL: Duration = Duration::from_secs(10 * 60);
/// TTL for global list pages (`orders:all:…`).
pub const ALL_LIST_TTL: Duration = Duration::from_secs(10 * 60);
/// TTL for product entries (`product:{id}`).
pub const PRODUCT_TTL: Duration = Duration::from_secs(15 * 60);

/// Namespace prefix for global list pages.
pub const ALL_ORDERS_NS: &str = "orders:all";
/// Namespace prefix for product entries.
pub const PRODUCT_NS: &str = "product:";

pub fn order_key(id: OrderId) -> String {
    format!("order:{id}")
}

pub fn owner_orders_key(user: UserId) -> String {
    format!("orders:owner:{user}")
}

/// Key for one page of the global order list. Lives under [`ALL_ORDERS_NS`]
/// so a namespace eviction drops every page at once.
pub fn all_orders_page_key(page: u32, size: u32, sort: &str, direction: &str) -> String {
    format!("{ALL_ORDERS_NS}:{page}:{size}:{sort}:{direction}")
}

pub fn product_key(id: storefront_core::ProductId) -> String {
    format!("{PRODUCT_NS}{id}")
}

/// Key/value cache with TTLs and prefix eviction.
pub trait Cache: Send + Sync {
    /// Fetch a value; `None` on miss or any backend failure.
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    /// Store a value with a TTL. Failures are logged by the implementation.
    fn put(&self, key: &str, value: serde_json::Value, ttl: Duration);

    fn evict(&self, key: &str);

    /// Drop every key starting with `prefix`.
    fn evict_namespace(&self, prefix: &str);
}

impl<C> Cache for Arc<C>
where
    C: Cache + ?Sized,
{
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        (**self).put(key, value, ttl)
    }

    fn evict(&self, key: &str) {
        (**self).evict(key)
    }

    fn evict_namespace(&self, prefix: &str) {
        (**self).evict_namespace(prefix)
    }
}

/// Typed read helper. A cached value that no longer decodes is evicted and
/// treated as a miss.
pub fn get_as<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    let value = cache.get(key)?;
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(key, error = %err, "cached value failed to decode, evicting");
            cache.evict(key);
            None
        }
    }
}

/// Typed write helper. A value that fails to serialize is skipped.
pub fn put_json<T: Serialize>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration) {
    match serde_json::to_value(value) {
        Ok(json) => cache.put(key, json, ttl),
        Err(err) => warn!(key, error = %err, "value failed to serialize for cache"),
    }
}

//! Narrow key/value interface the coordinator persists through. The
//! operation set mirrors a Redis-style store with single-key atomicity;
//! no multi-key transactions and no pub/sub.

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

/// Store operations required by the coordinator. Lists hold task IDs;
/// scalar keys hold JSON-encoded records or lock markers.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Fetch a scalar key, `None` when absent or expired.
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    /// Write a scalar key with a TTL in seconds, replacing any prior value.
    async fn set_ex(&self, key: &str, ttl_secs: u64, value: &[u8]) -> anyhow::Result<()>;
    /// Prepend an element at the head of a list, creating it if needed.
    async fn lpush(&self, list: &str, element: &str) -> anyhow::Result<()>;
    /// Atomically pop the tail of `src` and push it onto the head of `dst`.
    /// `src == dst` rotates the list. `None` when `src` is empty.
    async fn rpoplpush(&self, src: &str, dst: &str) -> anyhow::Result<Option<String>>;
    /// Remove occurrences of `element`: `count > 0` scans head to tail
    /// removing at most `count`, `count < 0` scans tail to head, `0`
    /// removes all. Returns how many were removed.
    async fn lrem(&self, list: &str, count: i64, element: &str) -> anyhow::Result<usize>;
    /// Set a scalar key only if absent; true when this call created it.
    async fn set_nx(&self, key: &str, value: &[u8]) -> anyhow::Result<bool>;
    /// Attach or refresh a TTL on an existing key (scalar or list).
    async fn expire(&self, key: &str, ttl_secs: u64) -> anyhow::Result<()>;
}

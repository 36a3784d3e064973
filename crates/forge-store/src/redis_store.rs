use redis::aio::ConnectionManager;

use crate::Store;

/// Redis-backed store for multi-node deployments. The connection manager
/// reconnects on its own; clones share the underlying multiplexed link.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait::async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, ttl_secs: u64, value: &[u8]) -> anyhow::Result<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_secs)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn lpush(&self, list: &str, element: &str) -> anyhow::Result<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("LPUSH")
            .arg(list)
            .arg(element)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn rpoplpush(&self, src: &str, dst: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.manager.clone();
        let moved: Option<String> = redis::cmd("RPOPLPUSH")
            .arg(src)
            .arg(dst)
            .query_async(&mut conn)
            .await?;
        Ok(moved)
    }

    async fn lrem(&self, list: &str, count: i64, element: &str) -> anyhow::Result<usize> {
        let mut conn = self.manager.clone();
        let removed: i64 = redis::cmd("LREM")
            .arg(list)
            .arg(count)
            .arg(element)
            .query_async(&mut conn)
            .await?;
        Ok(removed.max(0) as usize)
    }

    async fn set_nx(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        let mut conn = self.manager.clone();
        let created: i64 = redis::cmd("SETNX")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(created == 1)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> anyhow::Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::Store;

/// In-process store for single-node deployments and tests. TTLs are
/// honored lazily: expired keys are dropped when next touched.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    scalars: HashMap<String, Scalar>,
    lists: HashMap<String, List>,
}

struct Scalar {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct List {
    // Head is the front of the deque.
    items: VecDeque<String>,
    expires_at: Option<Instant>,
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|at| at <= Instant::now())
}

impl Inner {
    fn scalar(&mut self, key: &str) -> Option<&Scalar> {
        if self.scalars.get(key).is_some_and(|s| expired(s.expires_at)) {
            self.scalars.remove(key);
        }
        self.scalars.get(key)
    }

    fn list(&mut self, key: &str) -> Option<&mut List> {
        if self.lists.get(key).is_some_and(|l| expired(l.expires_at)) {
            self.lists.remove(key);
        }
        self.lists.get_mut(key)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.scalar(key).map(|s| s.value.clone()))
    }

    async fn set_ex(&self, key: &str, ttl_secs: u64, value: &[u8]) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        inner.scalars.insert(
            key.to_string(),
            Scalar {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn lpush(&self, list: &str, element: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        let _ = inner.list(list);
        let entry = inner.lists.entry(list.to_string()).or_default();
        entry.items.push_front(element.to_string());
        Ok(())
    }

    async fn rpoplpush(&self, src: &str, dst: &str) -> anyhow::Result<Option<String>> {
        let mut inner = self.inner.lock().await;
        let Some(element) = inner.list(src).and_then(|l| l.items.pop_back()) else {
            return Ok(None);
        };
        if inner.lists.get(src).is_some_and(|l| l.items.is_empty()) {
            inner.lists.remove(src);
        }
        let _ = inner.list(dst);
        let target = inner.lists.entry(dst.to_string()).or_default();
        target.items.push_front(element.clone());
        Ok(Some(element))
    }

    async fn lrem(&self, list: &str, count: i64, element: &str) -> anyhow::Result<usize> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.list(list) else {
            return Ok(0);
        };
        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };
        let mut removed = 0usize;
        if count >= 0 {
            entry.items.retain(|item| {
                if removed < limit && item == element {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        } else {
            let mut kept: VecDeque<String> = VecDeque::with_capacity(entry.items.len());
            while let Some(item) = entry.items.pop_back() {
                if removed < limit && item == element {
                    removed += 1;
                } else {
                    kept.push_front(item);
                }
            }
            entry.items = kept;
        }
        if entry.items.is_empty() {
            inner.lists.remove(list);
        }
        Ok(removed)
    }

    async fn set_nx(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.scalar(key).is_some() {
            return Ok(false);
        }
        inner.scalars.insert(
            key.to_string(),
            Scalar {
                value: value.to_vec(),
                expires_at: None,
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> anyhow::Result<()> {
        let deadline = Instant::now() + Duration::from_secs(ttl_secs);
        let mut inner = self.inner.lock().await;
        if let Some(scalar) = inner.scalars.get_mut(key) {
            scalar.expires_at = Some(deadline);
        } else if let Some(list) = inner.lists.get_mut(key) {
            list.expires_at = Some(deadline);
        }
        Ok(())
    }
}

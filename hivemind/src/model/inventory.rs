//! Model inventory cache with a TTL.
//!
//! One mutex guards the refresh; readers take a cloned snapshot so a refresh
//! is atomic from their perspective. Refresh is idempotent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::HubResult;
use crate::model::runtime::{ModelEntry, ModelRuntime};

/// Default inventory time-to-live.
pub const DEFAULT_INVENTORY_TTL: Duration = Duration::from_secs(300);

struct Snapshot {
    entries: Vec<ModelEntry>,
    fetched_at: Instant,
}

/// TTL-cached view of the runtime's local model list.
pub struct InventoryCache {
    runtime: Arc<dyn ModelRuntime>,
    ttl: Duration,
    inner: Mutex<Option<Snapshot>>,
}

impl InventoryCache {
    pub fn new(runtime: Arc<dyn ModelRuntime>, ttl: Duration) -> Self {
        Self {
            runtime,
            ttl,
            inner: Mutex::new(None),
        }
    }

    /// Current entries, refreshing from the runtime when the snapshot is
    /// stale or absent, or when `force_refresh` is set.
    pub async fn entries(&self, force_refresh: bool) -> HubResult<Vec<ModelEntry>> {
        let mut guard = self.inner.lock().await;
        let stale = match guard.as_ref() {
            Some(snap) => force_refresh || snap.fetched_at.elapsed() >= self.ttl,
            None => true,
        };
        if stale {
            let entries = self.runtime.list_models().await?;
            *guard = Some(Snapshot {
                entries,
                fetched_at: Instant::now(),
            });
        }
        Ok(guard.as_ref().map(|s| s.entries.clone()).unwrap_or_default())
    }

    /// Whether `model` is locally available. Bare names match tagged entries
    /// (`llama` matches `llama:latest`).
    pub async fn contains(&self, model: &str) -> HubResult<bool> {
        let entries = self.entries(false).await?;
        Ok(entries.iter().any(|e| {
            e.name == model || e.name.split(':').next() == Some(model)
        }))
    }

    /// Drops the snapshot so the next read refreshes, e.g. after a pull.
    pub async fn invalidate(&self) {
        *self.inner.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::runtime::MockRuntime;
    use std::sync::atomic::Ordering;

    /// **Scenario**: within the TTL the cache serves reads without touching
    /// the runtime; force_refresh bypasses it.
    #[tokio::test]
    async fn ttl_caching() {
        let runtime = Arc::new(MockRuntime::new(&["m:latest"]));
        let cache = InventoryCache::new(runtime.clone(), Duration::from_secs(600));
        cache.entries(false).await.unwrap();
        cache.entries(false).await.unwrap();
        assert_eq!(runtime.list_calls.load(Ordering::SeqCst), 1);
        cache.entries(true).await.unwrap();
        assert_eq!(runtime.list_calls.load(Ordering::SeqCst), 2);
    }

    /// **Scenario**: bare model names match tagged inventory entries.
    #[tokio::test]
    async fn tag_insensitive_contains() {
        let runtime = Arc::new(MockRuntime::new(&["llama:latest"]));
        let cache = InventoryCache::new(runtime, DEFAULT_INVENTORY_TTL);
        assert!(cache.contains("llama").await.unwrap());
        assert!(cache.contains("llama:latest").await.unwrap());
        assert!(!cache.contains("other").await.unwrap());
    }

    /// **Scenario**: invalidate forces the next read to refresh.
    #[tokio::test]
    async fn invalidate_refreshes() {
        let runtime = Arc::new(MockRuntime::new(&["m"]));
        let cache = InventoryCache::new(runtime.clone(), Duration::from_secs(600));
        cache.entries(false).await.unwrap();
        cache.invalidate().await;
        cache.entries(false).await.unwrap();
        assert_eq!(runtime.list_calls.load(Ordering::SeqCst), 2);
    }
}

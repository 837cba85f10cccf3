use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::state::backend::SnapshotBackend;
use crate::state::market::MarketCache;

/// Owner of the single current market snapshot.
///
/// Readers get an `Arc` to the last committed snapshot and never wait on a
/// refresh: the write lock is only held for the pointer swap at the end of
/// `save`. Writers are serialized by `commit_lock`.
pub struct TrendCacheStore {
    current: RwLock<Option<Arc<MarketCache>>>,
    commit_lock: Mutex<()>,
    backend: Arc<dyn SnapshotBackend>,
}

pub type TrendCacheHandle = Arc<TrendCacheStore>;

impl TrendCacheStore {
    pub fn new(backend: Arc<dyn SnapshotBackend>) -> Self {
        Self {
            current: RwLock::new(None),
            commit_lock: Mutex::new(()),
            backend,
        }
    }

    /// Populate memory from the backend. Boots empty when nothing is stored
    /// or the stored document is unreadable. Never replaces a committed
    /// snapshot with an older or undated one; returns whatever is current.
    pub async fn load(&self) -> Option<Arc<MarketCache>> {
        let _commit = self.commit_lock.lock().await;

        let loaded = match self.backend.read().await {
            Ok(Some(snapshot)) => {
                info!(
                    last_updated = ?snapshot.last_updated,
                    categories = snapshot.categories.len(),
                    "loaded market cache"
                );
                Some(Arc::new(snapshot))
            }
            Ok(None) => {
                info!("no stored market cache, starting empty");
                None
            }
            Err(err) => {
                warn!(error = %err, "stored market cache unreadable, starting empty");
                None
            }
        };

        let mut current = self.current.write().await;
        if let Some(committed) = current.as_ref() {
            let loaded_ts = loaded.as_ref().and_then(|c| c.last_updated);
            if loaded_ts < committed.last_updated {
                warn!(
                    loaded = ?loaded_ts,
                    committed = ?committed.last_updated,
                    "stored market cache older than committed snapshot, keeping committed"
                );
                return current.clone();
            }
        }
        *current = loaded.clone();
        loaded
    }

    /// The last committed snapshot, if any.
    pub async fn current(&self) -> Option<Arc<MarketCache>> {
        self.current.read().await.clone()
    }

    /// Commit a fully built snapshot. Rejected when it has no timestamp or
    /// its timestamp precedes the committed one.
    pub async fn save(&self, snapshot: MarketCache) -> Result<Arc<MarketCache>, StoreError> {
        let _commit = self.commit_lock.lock().await;

        let Some(new_ts) = snapshot.last_updated else {
            return Err(StoreError::Rejected("snapshot has no last_updated".into()));
        };

        if let Some(prev_ts) = self.current().await.and_then(|c| c.last_updated) {
            if new_ts < prev_ts {
                return Err(StoreError::Rejected(format!(
                    "last_updated {new_ts} precedes committed {prev_ts}"
                )));
            }
        }

        self.backend.write(&snapshot).await?;

        let snapshot = Arc::new(snapshot);
        *self.current.write().await = Some(Arc::clone(&snapshot));
        info!(last_updated = %new_ts, "market cache committed");
        Ok(snapshot)
    }

    /// True when nothing is committed or the committed snapshot is older than `max_age`.
    pub async fn is_stale(&self, max_age: Duration) -> bool {
        match self.current().await {
            Some(cache) => cache.is_stale(max_age),
            None => true,
        }
    }
}

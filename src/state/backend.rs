use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::state::market::MarketCache;

/// Key-value persistence for the committed snapshot.
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    async fn read(&self) -> Result<Option<MarketCache>, StoreError>;

    async fn write(&self, snapshot: &MarketCache) -> Result<(), StoreError>;
}

/// JSON document on disk. Writes go to a sibling temp file that is renamed
/// over the target, so a crash never leaves a half-written document.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotBackend for JsonFileBackend {
    async fn read(&self) -> Result<Option<MarketCache>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn write(&self, snapshot: &MarketCache) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "market cache written");
        Ok(())
    }
}

/// Process-local backend, used in tests and when no cache path is configured.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    doc: Mutex<Option<MarketCache>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: MarketCache) -> Self {
        Self {
            doc: Mutex::new(Some(snapshot)),
        }
    }
}

#[async_trait]
impl SnapshotBackend for InMemoryBackend {
    async fn read(&self) -> Result<Option<MarketCache>, StoreError> {
        Ok(self.doc.lock().await.clone())
    }

    async fn write(&self, snapshot: &MarketCache) -> Result<(), StoreError> {
        *self.doc.lock().await = Some(snapshot.clone());
        Ok(())
    }
}

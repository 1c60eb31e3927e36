use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};

use super::error::CatalogError;
use super::fingerprint::checksum;
use super::types::TrainingCacheState;

pub const STATE_FILE: &str = "fingerprints.json";
pub const EMBEDDINGS_DIR: &str = "embeddings";

/// On-disk envelope. `checksum` is the SHA-256 of the serialized `state`.
#[derive(Serialize, Deserialize)]
struct CacheFile {
    state: TrainingCacheState,
    checksum: String,
}

/// Persisted training cache rooted at one directory.
///
/// Writes replace `fingerprints.json` as a whole through a temp file and a
/// rename, so readers see either the previous state or the new one.
pub struct TrainingCacheStore {
    dir: PathBuf,
    writer: Mutex<()>,
}

impl TrainingCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Directory handed to the vector store for its own files.
    pub fn embeddings_dir(&self) -> PathBuf {
        self.dir.join(EMBEDDINGS_DIR)
    }

    /// Read the current state. `Ok(None)` when nothing has been written yet.
    pub async fn load(&self) -> Result<Option<TrainingCacheState>, CatalogError> {
        let bytes = match tokio::fs::read(self.state_path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CatalogError::Storage(e.to_string())),
        };

        let file: CacheFile = serde_json::from_slice(&bytes)
            .map_err(|e| CatalogError::CacheCorruption(format!("unreadable cache file: {}", e)))?;
        let expected = checksum(&serde_json::to_vec(&file.state)?);
        if expected != file.checksum {
            return Err(CatalogError::CacheCorruption(format!(
                "checksum mismatch: stored {}, computed {}",
                file.checksum, expected
            )));
        }
        Ok(Some(file.state))
    }

    /// Take the single-writer lock, waiting for any other writer.
    pub async fn lock(&self) -> CacheWriter<'_> {
        CacheWriter {
            store: self,
            _guard: self.writer.lock().await,
        }
    }

    /// Take the writer lock without waiting.
    pub fn try_lock(&self) -> Result<CacheWriter<'_>, CatalogError> {
        let guard = self.writer.try_lock().map_err(|_| CatalogError::CacheBusy)?;
        Ok(CacheWriter {
            store: self,
            _guard: guard,
        })
    }
}

/// Exclusive write access to a [`TrainingCacheStore`].
pub struct CacheWriter<'a> {
    store: &'a TrainingCacheStore,
    _guard: MutexGuard<'a, ()>,
}

impl CacheWriter<'_> {
    pub async fn load(&self) -> Result<Option<TrainingCacheState>, CatalogError> {
        self.store.load().await
    }

    /// Atomically replace the persisted state.
    pub async fn save(&self, state: &TrainingCacheState) -> Result<(), CatalogError> {
        let dir = &self.store.dir;
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::create_dir_all(self.store.embeddings_dir()).await?;

        let file = CacheFile {
            state: state.clone(),
            checksum: checksum(&serde_json::to_vec(state)?),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;

        let tmp = dir.join(format!(".{}.{}.tmp", STATE_FILE, uuid::Uuid::new_v4()));
        if let Err(e) = write_synced(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&tmp, self.store.state_path()).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        sync_dir(dir).await;

        tracing::debug!(
            path = %self.store.state_path().display(),
            trained = state.trained.len(),
            "Training cache written"
        );
        Ok(())
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), CatalogError> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) {
    if let Ok(handle) = tokio::fs::File::open(dir).await {
        if let Err(e) = handle.sync_all().await {
            tracing::debug!(error = %e, "Directory fsync failed");
        }
    }
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) {}

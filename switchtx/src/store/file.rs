//! File-backed recovery store.

use super::RecoveryStore;
use crate::context::TxId;
use crate::errors::StoreError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::warn;

const SNAPSHOT_EXT: &str = "tx";

/// A recovery store keeping one file per transaction id.
///
/// Snapshots are written to a temporary file and atomically renamed into
/// place, so a crash mid-write never leaves a half-written snapshot under a
/// live id. File names are the zero-padded id plus a `.tx` extension, which
/// keeps directory listings in id order.
#[derive(Debug)]
pub struct FileRecoveryStore {
    root: PathBuf,
}

impl FileRecoveryStore {
    /// Opens (creating if needed) a store rooted at the given directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Returns the store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_path(&self, id: TxId) -> PathBuf {
        self.root.join(format!("{id:020}.{SNAPSHOT_EXT}"))
    }

    fn parse_id(path: &Path) -> Option<TxId> {
        if path.extension()?.to_str()? != SNAPSHOT_EXT {
            return None;
        }
        path.file_stem()?.to_str()?.parse().ok()
    }
}

#[async_trait]
impl RecoveryStore for FileRecoveryStore {
    async fn put(&self, id: TxId, snapshot: &[u8]) -> Result<(), StoreError> {
        let target = self.snapshot_path(id);
        let tmp = self.root.join(format!("{id:020}.tmp"));

        tokio::fs::write(&tmp, snapshot).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }

    async fn get(&self, id: TxId) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.snapshot_path(id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, id: TxId) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.snapshot_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_all(&self) -> Result<Vec<(TxId, Vec<u8>)>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut all = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(id) = Self::parse_id(&path) else {
                // Stray temp files from an interrupted write are not snapshots.
                if path.extension().is_some_and(|ext| ext == "tmp") {
                    warn!(path = %path.display(), "Removing stale snapshot temp file");
                    let _ = tokio::fs::remove_file(&path).await;
                }
                continue;
            };
            let bytes = tokio::fs::read(&path).await?;
            all.push((id, bytes));
        }

        all.sort_by_key(|(id, _)| *id);
        Ok(all)
    }
}

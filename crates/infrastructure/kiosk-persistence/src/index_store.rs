use kiosk_core::formats::v2::IndexV2;
use tracing::warn;

use crate::paths::StatePaths;
use crate::StorageError;

/// Persisted merged index, one file per repository.
///
/// The index is derived state: an unreadable file is quarantined and
/// reported as absent, which forces the next sync down the full-fetch path.
pub trait IndexStore: Send + Sync {
    fn load(&self, repo_id: i64) -> Result<Option<IndexV2>, StorageError>;
    fn save(&self, repo_id: i64, index: &IndexV2) -> Result<(), StorageError>;
    fn remove(&self, repo_id: i64) -> Result<(), StorageError>;
}

pub struct FileIndexStore {
    paths: StatePaths,
}

impl FileIndexStore {
    pub fn new(paths: StatePaths) -> Self {
        Self { paths }
    }
}

impl IndexStore for FileIndexStore {
    fn load(&self, repo_id: i64) -> Result<Option<IndexV2>, StorageError> {
        let path = self.paths.index_file(repo_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(path.as_std_path())?;
        match serde_json::from_slice(&data) {
            Ok(index) => Ok(Some(index)),
            Err(err) => {
                warn!("Dropping unreadable index {path}: {err}");
                let _ = std::fs::remove_file(path.as_std_path());
                Ok(None)
            }
        }
    }

    fn save(&self, repo_id: i64, index: &IndexV2) -> Result<(), StorageError> {
        self.paths.ensure_dirs()?;
        let path = self.paths.index_file(repo_id);
        let tmp = path.with_extension("tmp");
        std::fs::write(tmp.as_std_path(), serde_json::to_vec(index)?)?;
        std::fs::rename(tmp.as_std_path(), path.as_std_path())?;
        Ok(())
    }

    fn remove(&self, repo_id: i64) -> Result<(), StorageError> {
        match std::fs::remove_file(self.paths.index_file(repo_id).as_std_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

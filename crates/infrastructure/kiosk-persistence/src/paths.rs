use camino::Utf8PathBuf;
use directories::ProjectDirs;

use crate::StorageError;

pub const REPOS_FILENAME: &str = "repos.json";

/// Filesystem layout for kiosk state: the configured repo list and the
/// persisted indexes live under the data dir, downloaded artifacts under
/// the cache dir.
#[derive(Debug, Clone)]
pub struct StatePaths {
    data_dir: Utf8PathBuf,
    cache_dir: Utf8PathBuf,
}

impl StatePaths {
    /// Platform default locations.
    pub fn discover() -> Result<Self, StorageError> {
        const QUALIFIER: &str = "com";
        const ORG: &str = "kiosk";
        const APP: &str = "sync";

        let dirs = ProjectDirs::from(QUALIFIER, ORG, APP).ok_or(StorageError::NoStateDir)?;
        let data_dir = Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf())
            .map_err(|_| StorageError::NoStateDir)?;
        let cache_dir = Utf8PathBuf::from_path_buf(dirs.cache_dir().to_path_buf())
            .map_err(|_| StorageError::NoStateDir)?;
        Ok(Self::rooted(data_dir, cache_dir))
    }

    /// Explicit roots instead of the platform defaults.
    pub fn rooted(data_dir: Utf8PathBuf, cache_dir: Utf8PathBuf) -> Self {
        Self {
            data_dir,
            cache_dir,
        }
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(self.data_dir.as_std_path())?;
        std::fs::create_dir_all(self.cache_dir.as_std_path())?;
        Ok(())
    }

    pub fn repos_file(&self) -> Utf8PathBuf {
        self.data_dir.join(REPOS_FILENAME)
    }

    /// Download slot for one artifact of one repo: `repo_<id>_<artifact>`.
    pub fn artifact_file(&self, repo_id: i64, artifact: &str) -> Result<Utf8PathBuf, StorageError> {
        validate_artifact_name(artifact)?;
        Ok(self.cache_dir.join(format!("repo_{repo_id}_{artifact}")))
    }

    /// Persisted merged index of one repo.
    pub fn index_file(&self, repo_id: i64) -> Utf8PathBuf {
        self.data_dir.join(format!("repo_{repo_id}_index-v2.json"))
    }
}

pub fn validate_artifact_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

use std::sync::{Mutex, PoisonError};

use kiosk_core::repo::Repo;

use crate::paths::StatePaths;
use crate::StorageError;

/// Durable set of configured repositories.
///
/// This file is user configuration, so an unreadable repo list is an error
/// rather than something to silently reset.
pub trait RepoStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<Repo>, StorageError>;
    fn save_all(&self, repos: &[Repo]) -> Result<(), StorageError>;
    /// Replaces the stored record with `repo` (matched by id), appending it
    /// when missing. Safe to call from concurrently syncing repos.
    fn update(&self, repo: &Repo) -> Result<(), StorageError>;
}

pub struct FileRepoStore {
    paths: StatePaths,
    write_lock: Mutex<()>,
}

impl FileRepoStore {
    pub fn new(paths: StatePaths) -> Self {
        Self {
            paths,
            write_lock: Mutex::new(()),
        }
    }

    fn write_repos(&self, repos: &[Repo]) -> Result<(), StorageError> {
        self.paths.ensure_dirs()?;
        let path = self.paths.repos_file();
        let tmp = path.with_extension("tmp");
        std::fs::write(tmp.as_std_path(), serde_json::to_string_pretty(repos)?)?;
        std::fs::rename(tmp.as_std_path(), path.as_std_path())?;
        Ok(())
    }
}

impl RepoStore for FileRepoStore {
    fn load_all(&self) -> Result<Vec<Repo>, StorageError> {
        let path = self.paths.repos_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(path.as_std_path())?;
        Ok(serde_json::from_str(&data)?)
    }

    fn save_all(&self, repos: &[Repo]) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.write_repos(repos)
    }

    fn update(&self, repo: &Repo) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut repos = self.load_all()?;
        match repos.iter_mut().find(|existing| existing.id == repo.id) {
            Some(slot) => *slot = repo.clone(),
            None => repos.push(repo.clone()),
        }
        self.write_repos(&repos)
    }
}

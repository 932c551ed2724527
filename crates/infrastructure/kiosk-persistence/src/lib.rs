mod error;
mod index_store;
mod paths;
mod repo_store;

pub use error::*;
pub use index_store::{FileIndexStore, IndexStore};
pub use paths::{validate_artifact_name, StatePaths, REPOS_FILENAME};
pub use repo_store::{FileRepoStore, RepoStore};

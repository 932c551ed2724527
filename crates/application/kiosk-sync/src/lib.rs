//! Repository synchronization: fetch a repo's signed index, check the
//! signing certificate against the pinned fingerprint, parse the payload
//! into the canonical format and land it in local storage. Distinct repos
//! sync in parallel; runs against the same repo are serialized.

mod applier;
mod events;
mod parser;
mod runner;
mod syncable;
mod validator;

pub use applier::DiffApplier;
pub use events::{SyncEvent, SyncReporter, SyncRunId, SyncState};
pub use runner::{SyncReport, SyncRunner};
pub use syncable::{EntrySyncable, SyncProduct, Syncable, V1Syncable};
pub use validator::validate_certificate;

use kiosk_core::fingerprint::FingerprintError;
use kiosk_infra::jar::JarError;
use kiosk_infra::net::NetError;
use kiosk_persistence::{StatePaths, StorageError};

/// Artifact file names, which double as the per-repo cache slot names.
pub const INDEX_V1_NAME: &str = "index-v1.jar";
pub const ENTRY_NAME: &str = "entry.jar";
pub const INDEX_V2_NAME: &str = "index-v2.json";

/// Payload entries inside the signed archives.
pub(crate) const INDEX_V1_PAYLOAD: &str = "index-v1.json";
pub(crate) const ENTRY_PAYLOAD: &str = "entry.json";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Remote fetch error: {0}")]
    Remote(#[from] NetError),
    #[error("Archive error: {0}")]
    Jar(#[from] JarError),
    #[error("Index parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
    #[error("Expected Fingerprint: {expected}, Acquired Fingerprint: {acquired}")]
    FingerprintMismatch { expected: String, acquired: String },
    #[error("Index version mismatch (expected {expected}, found {found})")]
    VersionMismatch { expected: i64, found: i64 },
    #[error("Digest mismatch for `{0}`")]
    PayloadDigest(String),
    #[error("Repository publishes no entry point")]
    EntryMissing,
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Task error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Unknown repo id {0}")]
    UnknownRepo(i64),
    #[error("Repo {0} is disabled")]
    RepoDisabled(i64),
    #[error("Sync cancelled")]
    Cancelled,
}

/// Convenience constructor wiring the default HTTP client and file-backed
/// stores under `paths`.
pub fn default_runner(paths: StatePaths) -> Result<SyncRunner, SyncError> {
    let client = kiosk_infra::net::default_http_client()?;
    Ok(SyncRunner::new(client, paths))
}

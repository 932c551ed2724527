//! Per-format sync strategies. Both deliver the same product: a validated
//! fingerprint plus the canonical index, or word that the remote has
//! nothing newer than the stored state.

use std::sync::Arc;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use kiosk_core::convert;
use kiosk_core::formats::v1::IndexV1;
use kiosk_core::formats::v2::diff::IndexV2Diff;
use kiosk_core::formats::v2::{Entry, EntryFileV2, IndexV2};
use kiosk_core::{Authentication, Fingerprint, Repo};
use kiosk_infra::net::{DownloadOutcome, Downloader, NetError, RequestOptions};
use kiosk_persistence::{IndexStore, StatePaths};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::applier::DiffApplier;
use crate::events::{SyncReporter, SyncState};
use crate::parser;
use crate::validator::validate_certificate;
use crate::{SyncError, ENTRY_NAME, ENTRY_PAYLOAD, INDEX_V1_NAME, INDEX_V1_PAYLOAD, INDEX_V2_NAME};

/// What a strategy hands back to the runner.
#[derive(Debug)]
pub enum SyncProduct {
    /// The remote confirmed the stored index is current.
    Unchanged,
    /// A fresh index was downloaded, verified and parsed.
    Fresh {
        fingerprint: Fingerprint,
        index: IndexV2,
        entity_tag: Option<String>,
    },
}

#[async_trait]
pub trait Syncable: Send + Sync {
    async fn sync(
        &self,
        repo: &Repo,
        reporter: &SyncReporter,
        cancel: &CancellationToken,
    ) -> Result<SyncProduct, SyncError>;
}

/// Joins a repo address and an artifact name, tolerating stray slashes on
/// either side.
fn artifact_url(address: &str, name: &str) -> String {
    format!(
        "{}/{}",
        address.trim_end_matches('/'),
        name.trim_start_matches('/')
    )
}

fn credentials(repo: &Repo) -> Option<Authentication> {
    if repo.should_authenticate() {
        repo.authentication.clone()
    } else {
        None
    }
}

/// Validators are only sent once a sync has succeeded; a never-synced repo
/// always fetches in full.
fn conditional_options(repo: &Repo) -> RequestOptions {
    let synced = repo.version_info.timestamp > 0;
    RequestOptions {
        if_modified_since: synced.then_some(repo.version_info.timestamp),
        entity_tag: if synced {
            repo.version_info.etag.clone()
        } else {
            None
        },
        authentication: credentials(repo),
    }
}

/// Strategy for repos publishing the single-file `index-v1.jar`.
pub struct V1Syncable {
    downloader: Arc<dyn Downloader>,
    paths: StatePaths,
}

impl V1Syncable {
    pub fn new(downloader: Arc<dyn Downloader>, paths: StatePaths) -> Self {
        V1Syncable { downloader, paths }
    }
}

#[async_trait]
impl Syncable for V1Syncable {
    async fn sync(
        &self,
        repo: &Repo,
        reporter: &SyncReporter,
        cancel: &CancellationToken,
    ) -> Result<SyncProduct, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let target = self.paths.artifact_file(repo.id, INDEX_V1_NAME)?;
        let url = artifact_url(&repo.address, INDEX_V1_NAME);
        let options = conditional_options(repo);

        reporter.state(SyncState::Downloading).await;
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            outcome = self.downloader.download_to_file(&url, &target, &options) => outcome?,
        };
        let entity_tag = match outcome {
            DownloadOutcome::NotModified => return Ok(SyncProduct::Unchanged),
            DownloadOutcome::Fetched { entity_tag } => entity_tag,
        };

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        reporter.state(SyncState::Validating).await;
        let (certificate, payload) = parser::read_signed_payload(target, INDEX_V1_PAYLOAD).await?;
        let fingerprint = validate_certificate(repo.fingerprint.as_ref(), &certificate)?;

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        reporter.state(SyncState::Parsing).await;
        let index: IndexV1 = parser::decode_payload(payload).await?;
        let index = convert::index_v1_to_v2(&index);

        Ok(SyncProduct::Fresh {
            fingerprint,
            index,
            entity_tag,
        })
    }
}

/// Strategy for repos publishing `entry.jar` plus the V2 index family. The
/// signed entry names the current full index and the diffs leading to it;
/// whichever is downloaded is checked against the digest the entry vouches
/// for.
pub struct EntrySyncable {
    downloader: Arc<dyn Downloader>,
    index_store: Arc<dyn IndexStore>,
    paths: StatePaths,
}

impl EntrySyncable {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        index_store: Arc<dyn IndexStore>,
        paths: StatePaths,
    ) -> Self {
        EntrySyncable {
            downloader,
            index_store,
            paths,
        }
    }

    /// Downloads an index payload into the repo's `index-v2.json` slot and
    /// checks it against the descriptor. Payload fetches are unconditional;
    /// the entry already decided whether anything changed.
    async fn fetch_payload(
        &self,
        repo: &Repo,
        descriptor: &EntryFileV2,
        cancel: &CancellationToken,
    ) -> Result<Utf8PathBuf, SyncError> {
        let target = self.paths.artifact_file(repo.id, INDEX_V2_NAME)?;
        let url = artifact_url(&repo.address, &descriptor.name);
        let options = RequestOptions {
            authentication: credentials(repo),
            ..RequestOptions::default()
        };
        tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            outcome = self.downloader.download_to_file(&url, &target, &options) => {
                outcome?;
            }
        }
        parser::verify_descriptor(target.clone(), descriptor).await?;
        Ok(target)
    }
}

#[async_trait]
impl Syncable for EntrySyncable {
    async fn sync(
        &self,
        repo: &Repo,
        reporter: &SyncReporter,
        cancel: &CancellationToken,
    ) -> Result<SyncProduct, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let entry_target = self.paths.artifact_file(repo.id, ENTRY_NAME)?;
        let url = artifact_url(&repo.address, ENTRY_NAME);
        let options = conditional_options(repo);

        reporter.state(SyncState::Downloading).await;
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            outcome = self.downloader.download_to_file(&url, &entry_target, &options) => {
                outcome.map_err(|err| match err {
                    NetError::Status(404) => SyncError::EntryMissing,
                    other => SyncError::Remote(other),
                })?
            }
        };
        let entity_tag = match outcome {
            DownloadOutcome::NotModified => return Ok(SyncProduct::Unchanged),
            DownloadOutcome::Fetched { entity_tag } => entity_tag,
        };

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        reporter.state(SyncState::Validating).await;
        let (certificate, payload) =
            parser::read_signed_payload(entry_target, ENTRY_PAYLOAD).await?;
        let fingerprint = validate_certificate(repo.fingerprint.as_ref(), &certificate)?;

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        reporter.state(SyncState::Parsing).await;
        let entry: Entry = parser::decode_payload(payload).await?;

        // A diff only makes sense on top of a stored baseline; without one
        // the repo is treated as never synced and fetched in full.
        let baseline = self.index_store.load(repo.id)?;
        let since = match &baseline {
            Some(_) if !repo.is_unsynced() => repo.version_info.timestamp,
            _ => 0,
        };
        let descriptor = match entry.diff(since) {
            None => return Ok(SyncProduct::Unchanged),
            Some(descriptor) => descriptor,
        };
        let is_diff = since > 0 && descriptor.name != entry.index.name;

        let (payload_path, fetched_diff) = match self.fetch_payload(repo, descriptor, cancel).await
        {
            Ok(path) => (path, is_diff),
            Err(SyncError::Remote(NetError::Status(404))) if is_diff => {
                // Servers prune old diffs; an expired one means a full
                // fetch, not a failure.
                debug!(
                    "Diff `{}` is gone, fetching the full index for repo {}",
                    descriptor.name, repo.id
                );
                (self.fetch_payload(repo, &entry.index, cancel).await?, false)
            }
            Err(err) => return Err(err),
        };

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let index: IndexV2 = match (fetched_diff, baseline) {
            (true, Some(base)) => {
                reporter.state(SyncState::Merging).await;
                let diff: IndexV2Diff = parser::decode_file(payload_path).await?;
                let mut applier = DiffApplier::new(base);
                applier.apply(&diff, since)?;
                applier.finish()
            }
            _ => parser::decode_file(payload_path).await?,
        };

        Ok(SyncProduct::Fresh {
            fingerprint,
            index,
            entity_tag,
        })
    }
}

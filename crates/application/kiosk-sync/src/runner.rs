//! The orchestrator: loads repo records, hands each to the right strategy
//! and lands the results. Distinct repos run concurrently; two runs against
//! the same repo queue behind a per-repo lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use camino::Utf8Path;
use kiosk_core::convert;
use kiosk_core::formats::v1::IndexV1;
use kiosk_core::formats::v2::IndexV2;
use kiosk_core::Repo;
use kiosk_infra::net::{Downloader, HttpDownloader};
use kiosk_persistence::{FileIndexStore, FileRepoStore, IndexStore, RepoStore, StatePaths};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::{SyncEvent, SyncReporter, SyncState};
use crate::syncable::{EntrySyncable, SyncProduct, Syncable, V1Syncable};
use crate::validator::validate_certificate;
use crate::{parser, SyncError};

/// Outcome summary of one repo's run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub repo_id: i64,
    /// False when the remote confirmed the stored index is current.
    pub updated: bool,
    /// Package count of the freshly stored index; zero when unchanged.
    pub packages: usize,
}

pub struct SyncRunner {
    downloader: Arc<dyn Downloader>,
    repo_store: Arc<dyn RepoStore>,
    index_store: Arc<dyn IndexStore>,
    paths: StatePaths,
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl SyncRunner {
    /// Default wiring: HTTP downloads and file-backed stores under `paths`.
    pub fn new(client: Client, paths: StatePaths) -> Self {
        Self::with_components(
            Arc::new(HttpDownloader::new(client)),
            Arc::new(FileRepoStore::new(paths.clone())),
            Arc::new(FileIndexStore::new(paths.clone())),
            paths,
        )
    }

    pub fn with_components(
        downloader: Arc<dyn Downloader>,
        repo_store: Arc<dyn RepoStore>,
        index_store: Arc<dyn IndexStore>,
        paths: StatePaths,
    ) -> Self {
        SyncRunner {
            downloader,
            repo_store,
            index_store,
            paths,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn repo_lock(&self, repo_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(repo_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Syncs one repo end to end. The repo record and the stored index are
    /// only touched after the fresh index is fully verified, so a failed
    /// run leaves the previous state intact.
    pub async fn sync_repo(
        &self,
        repo_id: i64,
        events: Option<mpsc::Sender<SyncEvent>>,
        cancel: CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let lock = self.repo_lock(repo_id);
        let _guard = lock.lock().await;

        let mut repo = self
            .repo_store
            .load_all()?
            .into_iter()
            .find(|repo| repo.id == repo_id)
            .ok_or(SyncError::UnknownRepo(repo_id))?;
        if !repo.enabled {
            return Err(SyncError::RepoDisabled(repo_id));
        }
        self.paths.ensure_dirs()?;

        let reporter = SyncReporter::new(repo_id, events);
        debug!("Sync run {} started for repo {}", reporter.run_id(), repo_id);
        reporter.state(SyncState::Idle).await;
        match self.run(&mut repo, &reporter, &cancel).await {
            Ok(report) => {
                reporter.state(SyncState::Done).await;
                Ok(report)
            }
            Err(SyncError::Cancelled) => {
                reporter.cancelled().await;
                Err(SyncError::Cancelled)
            }
            Err(err) => {
                reporter.state(SyncState::Failed).await;
                reporter.failed(err.to_string()).await;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        repo: &mut Repo,
        reporter: &SyncReporter,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let product = if repo.supports_diff {
            let entry = EntrySyncable::new(
                self.downloader.clone(),
                self.index_store.clone(),
                self.paths.clone(),
            );
            match entry.sync(repo, reporter, cancel).await {
                Err(SyncError::EntryMissing) => {
                    // No entry point published; remember that and take the
                    // single-file route.
                    debug!("Repo {} publishes no entry.jar, trying index-v1.jar", repo.id);
                    repo.supports_diff = false;
                    let v1 = V1Syncable::new(self.downloader.clone(), self.paths.clone());
                    v1.sync(repo, reporter, cancel).await
                }
                other => other,
            }?
        } else {
            let v1 = V1Syncable::new(self.downloader.clone(), self.paths.clone());
            v1.sync(repo, reporter, cancel).await?
        };

        match product {
            SyncProduct::Unchanged => {
                reporter.unchanged().await;
                Ok(SyncReport {
                    repo_id: repo.id,
                    updated: false,
                    packages: 0,
                })
            }
            SyncProduct::Fresh {
                fingerprint,
                index,
                entity_tag,
            } => {
                let packages = index.packages.len();
                let timestamp = index.repo.timestamp;
                self.index_store.save(repo.id, &index)?;
                repo.update(&fingerprint, Some(timestamp), entity_tag);
                self.repo_store.update(repo)?;
                reporter.completed(packages).await;
                Ok(SyncReport {
                    repo_id: repo.id,
                    updated: true,
                    packages,
                })
            }
        }
    }

    /// Imports a local index file without touching the network. A `.jar`
    /// file goes through the same certificate check as a remote V1 index;
    /// anything else is read as an already-extracted canonical index.
    pub async fn import_file(
        &self,
        repo_id: i64,
        file: &Utf8Path,
    ) -> Result<SyncReport, SyncError> {
        let lock = self.repo_lock(repo_id);
        let _guard = lock.lock().await;

        let mut repo = self
            .repo_store
            .load_all()?
            .into_iter()
            .find(|repo| repo.id == repo_id)
            .ok_or(SyncError::UnknownRepo(repo_id))?;
        self.paths.ensure_dirs()?;

        let index = if file.extension() == Some("jar") {
            let (certificate, payload) =
                parser::read_signed_payload(file.to_owned(), crate::INDEX_V1_PAYLOAD).await?;
            let fingerprint = validate_certificate(repo.fingerprint.as_ref(), &certificate)?;
            let v1: IndexV1 = parser::decode_payload(payload).await?;
            let index = convert::index_v1_to_v2(&v1);
            repo.update(&fingerprint, Some(index.repo.timestamp), None);
            index
        } else {
            let index: IndexV2 = parser::decode_file(file.to_owned()).await?;
            repo.version_info.timestamp = index.repo.timestamp;
            index
        };
        // Any cached validator belongs to an earlier network fetch.
        repo.version_info.etag = None;

        let packages = index.packages.len();
        self.index_store.save(repo.id, &index)?;
        self.repo_store.update(&repo)?;
        Ok(SyncReport {
            repo_id,
            updated: true,
            packages,
        })
    }

    /// Syncs the given repos, or every enabled repo when `repo_ids` is
    /// empty. Distinct repos run in parallel; results come back sorted by
    /// repo id.
    pub async fn sync_all(
        self: &Arc<Self>,
        repo_ids: &[i64],
        events: Option<mpsc::Sender<SyncEvent>>,
        cancel: CancellationToken,
    ) -> Result<Vec<(i64, Result<SyncReport, SyncError>)>, SyncError> {
        let ids: Vec<i64> = if repo_ids.is_empty() {
            self.repo_store
                .load_all()?
                .iter()
                .filter(|repo| repo.enabled)
                .map(|repo| repo.id)
                .collect()
        } else {
            repo_ids.to_vec()
        };

        let mut tasks = JoinSet::new();
        for id in ids {
            let runner = Arc::clone(self);
            let events = events.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { (id, runner.sync_repo(id, events, cancel).await) });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            results.push(joined?);
        }
        results.sort_by_key(|(id, _)| *id);
        Ok(results)
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8Path;
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use kiosk_core::formats::v2::{IndexV2, LocalizedString};
use kiosk_persistence::{FileIndexStore, FileRepoStore, IndexStore, RepoStore, StatePaths};
use kiosk_sync::{SyncError, SyncEvent, SyncReport, SyncRunner};
use tokio_util::sync::CancellationToken;

/// Per-repo outcome of one `sync` invocation, ordered by repo id.
pub type SyncOutcomes = Vec<(i64, Result<SyncReport, SyncError>)>;

pub async fn cmd_sync(paths: StatePaths, repo_ids: Vec<i64>) -> Result<SyncOutcomes> {
    println!(":: Synchronizing...");

    let runner: Arc<SyncRunner> = Arc::new(
        kiosk_sync::default_runner(paths).context("Failed to build HTTP client")?,
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let (tx, mut rx) = tokio::sync::mpsc::channel(100);
    let runner_handle = tokio::spawn({
        let runner = runner.clone();
        let cancel = cancel.clone();
        async move { runner.sync_all(&repo_ids, Some(tx), cancel).await }
    });

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    while let Some(ev) = rx.recv().await {
        match ev {
            SyncEvent::StateChanged { repo_id, state, .. } => {
                pb.set_message(format!("repo {}: {}", repo_id, state));
            }
            SyncEvent::Unchanged { repo_id, .. } => {
                pb.println(format!("   repo {}: up to date", repo_id));
            }
            SyncEvent::Completed {
                repo_id, packages, ..
            } => {
                pb.println(format!("   repo {}: {} packages", repo_id, packages));
            }
            SyncEvent::Failed {
                repo_id, message, ..
            } => {
                pb.println(format!("   repo {}: {}", repo_id, message));
            }
            SyncEvent::Cancelled { repo_id, .. } => {
                pb.println(format!("   repo {}: cancelled", repo_id));
            }
        }
    }

    let outcomes = runner_handle.await??;
    pb.finish_and_clear();

    let updated = outcomes
        .iter()
        .filter(|(_, result)| matches!(result, Ok(report) if report.updated))
        .count();
    let unchanged = outcomes
        .iter()
        .filter(|(_, result)| matches!(result, Ok(report) if !report.updated))
        .count();
    let failed = outcomes.len() - updated - unchanged;

    println!("\n:: Sync Result");
    println!("   Updated:   {}", updated);
    println!("   Unchanged: {}", unchanged);
    println!("   Failed:    {}", failed);

    Ok(outcomes)
}

/// One row of the `apps` listing.
#[derive(Debug, Clone)]
pub struct AppRow {
    pub repo_id: i64,
    pub package: String,
    pub name: String,
    pub version: String,
    pub size: Option<u64>,
}

pub fn cmd_apps(paths: StatePaths, repo: Option<i64>, search: Option<String>) -> Result<Vec<AppRow>> {
    let rows = query_apps(paths, repo, search.as_deref())?;

    if rows.is_empty() {
        println!("No packages found. Run `kiosk sync` first.");
        return Ok(rows);
    }

    println!(
        "{:<5} {:<36} {:<24} {:<12} {:>10}",
        "REPO", "PACKAGE", "NAME", "VERSION", "SIZE"
    );
    println!(
        "{:-<5} {:-<36} {:-<24} {:-<12} {:->10}",
        "", "", "", "", ""
    );
    for row in &rows {
        let size = match row.size {
            Some(bytes) => format_size(bytes, DECIMAL),
            None => "-".to_string(),
        };
        println!(
            "{:<5} {:<36} {:<24} {:<12} {:>10}",
            row.repo_id, row.package, row.name, row.version, size
        );
    }

    Ok(rows)
}

/// Reads the persisted indexes; never touches the network.
pub fn query_apps(
    paths: StatePaths,
    repo: Option<i64>,
    search: Option<&str>,
) -> Result<Vec<AppRow>> {
    let repo_store = FileRepoStore::new(paths.clone());
    let index_store = FileIndexStore::new(paths);

    let repos = repo_store.load_all()?;
    if let Some(id) = repo {
        if !repos.iter().any(|known| known.id == id) {
            anyhow::bail!("Repo {} not found", id);
        }
    }
    let needle = search.map(str::to_lowercase);

    let mut rows = Vec::new();
    for known in &repos {
        if let Some(id) = repo {
            if known.id != id {
                continue;
            }
        }
        let index = match index_store.load(known.id)? {
            Some(index) => index,
            None => continue,
        };
        collect_rows(known.id, &index, needle.as_deref(), &mut rows);
    }
    Ok(rows)
}

fn collect_rows(repo_id: i64, index: &IndexV2, needle: Option<&str>, rows: &mut Vec<AppRow>) {
    for (package, details) in &index.packages {
        let name = localized(details.metadata.name.as_ref())
            .unwrap_or("-")
            .to_string();
        if let Some(needle) = needle {
            let summary = localized(details.metadata.summary.as_ref()).unwrap_or("");
            let matched = package.to_lowercase().contains(needle)
                || name.to_lowercase().contains(needle)
                || summary.to_lowercase().contains(needle);
            if !matched {
                continue;
            }
        }

        // Highest version code counts as the latest release.
        let latest = details
            .versions
            .values()
            .max_by_key(|version| version.manifest.version_code);
        let (version, size) = match latest {
            Some(latest) if !latest.manifest.version_name.is_empty() => (
                latest.manifest.version_name.clone(),
                latest.file.size.and_then(|size| u64::try_from(size).ok()),
            ),
            Some(latest) => (
                latest.manifest.version_code.to_string(),
                latest.file.size.and_then(|size| u64::try_from(size).ok()),
            ),
            None => ("-".to_string(), None),
        };

        rows.push(AppRow {
            repo_id,
            package: package.clone(),
            name,
            version,
            size,
        });
    }
}

/// Picks the `en-US` value, falling back to whatever the index carries.
fn localized(values: Option<&LocalizedString>) -> Option<&str> {
    let values = values?;
    values
        .get("en-US")
        .or_else(|| values.values().next())
        .map(String::as_str)
}

pub async fn cmd_import(paths: StatePaths, repo_id: i64, file: &Utf8Path) -> Result<SyncReport> {
    println!(":: Importing local index...");
    println!("   Repo: {}", repo_id);
    println!("   File: {}", file);

    let runner = kiosk_sync::default_runner(paths).context("Failed to build HTTP client")?;
    let report = runner.import_file(repo_id, file).await?;

    println!("\n:: Import Result");
    println!("   Packages: {}", report.packages);

    Ok(report)
}

use anyhow::{anyhow, Context, Result};
use kiosk_core::fingerprint::{hex_to_fingerprint, Fingerprint, FINGERPRINT_LENGTH};
use kiosk_core::repo::Authentication;
use kiosk_core::Repo;
use kiosk_persistence::{FileIndexStore, FileRepoStore, IndexStore, RepoStore, StatePaths};

/// Everything `repo add` accepts.
pub struct NewRepo {
    pub address: String,
    pub name: Option<String>,
    pub fingerprint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub mirrors: Vec<String>,
    pub supports_diff: bool,
}

pub struct RepoManager {
    repo_store: FileRepoStore,
    index_store: FileIndexStore,
}

impl RepoManager {
    pub fn new(paths: StatePaths) -> Self {
        Self {
            repo_store: FileRepoStore::new(paths.clone()),
            index_store: FileIndexStore::new(paths),
        }
    }

    pub fn list(&self) -> Result<Vec<Repo>> {
        Ok(self.repo_store.load_all()?)
    }

    pub fn find(&self, id: i64) -> Result<Repo> {
        self.list()?
            .into_iter()
            .find(|repo| repo.id == id)
            .ok_or_else(|| anyhow!("Repo {} not found", id))
    }

    pub fn add(&self, new: NewRepo) -> Result<Repo> {
        let mut repos = self.list()?;

        let address = new.address.trim_end_matches('/').to_string();
        if !address.starts_with("http://") && !address.starts_with("https://") {
            return Err(anyhow!("Repo address must start with http:// or https://"));
        }
        if repos.iter().any(|repo| repo.address == address) {
            return Err(anyhow!("A repo with address '{}' already exists", address));
        }

        let id = repos.iter().map(|repo| repo.id).max().unwrap_or(0) + 1;
        let mut repo = Repo::new(id, address);
        repo.name = new.name.unwrap_or_default();
        repo.mirrors = new.mirrors;
        repo.supports_diff = new.supports_diff;
        if let Some(value) = new.fingerprint {
            repo.fingerprint = Some(parse_fingerprint_input(&value)?);
        }
        if let (Some(username), Some(password)) = (new.username, new.password) {
            repo.authentication = Some(Authentication { username, password });
        }

        repos.push(repo.clone());
        self.repo_store.save_all(&repos)?;
        Ok(repo)
    }

    /// Drops the repo record and its persisted index.
    pub fn remove(&self, id: i64) -> Result<()> {
        let mut repos = self.list()?;
        let original_len = repos.len();
        repos.retain(|repo| repo.id != id);

        if repos.len() == original_len {
            return Err(anyhow!("Repo {} not found", id));
        }

        self.repo_store.save_all(&repos)?;
        self.index_store.remove(id)?;
        Ok(())
    }

    pub fn set_enabled(&self, id: i64, enabled: bool) -> Result<Repo> {
        let mut repo = self.find(id)?;
        repo.enabled = enabled;
        self.repo_store.update(&repo)?;
        Ok(repo)
    }
}

/// Share links carry either the 64-char digest itself, possibly broken up
/// with colons or spaces, or the whole signing key as hex. The long form is
/// hashed down to the digest it stands for.
fn parse_fingerprint_input(value: &str) -> Result<Fingerprint> {
    let compact: String = value
        .chars()
        .filter(|c| !matches!(c, ' ' | ':'))
        .collect();
    if compact.len() == FINGERPRINT_LENGTH {
        return Fingerprint::parse(&compact)
            .with_context(|| format!("Invalid fingerprint '{}'", value));
    }
    hex_to_fingerprint(value).with_context(|| format!("Invalid fingerprint '{}'", value))
}

pub fn handle_list(paths: StatePaths) -> Result<()> {
    let mgr = RepoManager::new(paths);
    let repos = mgr.list()?;

    if repos.is_empty() {
        println!("No repos configured. Add one with `kiosk repo add <address>`.");
        return Ok(());
    }

    println!(
        "{:<4} {:<6} {:<24} {:<44} {:<16}",
        "ID", "STATE", "NAME", "ADDRESS", "LAST SYNC"
    );
    println!(
        "{:-<4} {:-<6} {:-<24} {:-<44} {:-<16}",
        "", "", "", "", ""
    );
    for repo in repos {
        let state = if repo.enabled { "on" } else { "off" };
        let last = if repo.is_unsynced() {
            "never".to_string()
        } else {
            format_timestamp(repo.version_info.timestamp)
        };
        println!(
            "{:<4} {:<6} {:<24} {:<44} {:<16}",
            repo.id, state, repo.name, repo.address, last
        );
    }

    Ok(())
}

/// Index timestamps are epoch millis.
fn format_timestamp(millis: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(millis) {
        Some(when) => when.format("%Y-%m-%d %H:%M").to_string(),
        None => millis.to_string(),
    }
}

pub fn handle_add(paths: StatePaths, new: NewRepo) -> Result<()> {
    let mgr = RepoManager::new(paths);
    let repo = mgr.add(new)?;
    match &repo.fingerprint {
        Some(fingerprint) => {
            println!("Repo {} added, pinned to:", repo.id);
            println!("  {}", fingerprint.formatted());
        }
        None => println!(
            "Repo {} added; the first sync will pin the signer it finds.",
            repo.id
        ),
    }
    Ok(())
}

pub fn handle_remove(paths: StatePaths, id: i64) -> Result<()> {
    let mgr = RepoManager::new(paths);
    mgr.remove(id)?;
    println!("Repo {} removed.", id);
    Ok(())
}

pub fn handle_set_enabled(paths: StatePaths, id: i64, enabled: bool) -> Result<()> {
    let mgr = RepoManager::new(paths);
    mgr.set_enabled(id, enabled)?;
    println!(
        "Repo {} {}.",
        id,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

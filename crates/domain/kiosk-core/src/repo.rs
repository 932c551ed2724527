use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// A configured repository: where to fetch from, what to trust, and what was
/// seen on the last successful sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repo {
    pub id: i64,
    pub enabled: bool,
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mirrors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,
    #[serde(default)]
    pub version_info: VersionInfo,
    // Repos still publishing only the single-file V1 index never offer diffs.
    #[serde(default = "default_true")]
    pub supports_diff: bool,
}

fn default_true() -> bool {
    true
}

impl Repo {
    pub fn new(id: i64, address: impl Into<String>) -> Self {
        Repo {
            id,
            enabled: true,
            address: address.into(),
            name: String::new(),
            description: String::new(),
            mirrors: Vec::new(),
            fingerprint: None,
            authentication: None,
            version_info: VersionInfo::default(),
            supports_diff: true,
        }
    }

    /// Credentials count only when both halves are present.
    pub fn should_authenticate(&self) -> bool {
        self.authentication
            .as_ref()
            .map(Authentication::is_configured)
            .unwrap_or(false)
    }

    /// Never synced successfully, so there is no base to diff against.
    pub fn is_unsynced(&self) -> bool {
        self.version_info.timestamp == 0
    }

    /// Applies the outcome of a successful sync. The fingerprint is adopted
    /// only when none was pinned before; once pinned it never changes here.
    pub fn update(&mut self, fingerprint: &Fingerprint, timestamp: Option<i64>, etag: Option<String>) {
        if self.fingerprint.is_none() {
            self.fingerprint = Some(fingerprint.clone());
        }
        if let Some(timestamp) = timestamp {
            self.version_info.timestamp = timestamp;
        }
        if etag.is_some() {
            self.version_info.etag = etag;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    pub username: String,
    pub password: String,
}

impl Authentication {
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// What the last successful sync saw: the index publication timestamp
/// (epoch millis, 0 = never synced) and the server's cache validator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

//! The canonical index format: localized repo metadata plus a map of
//! package records, each carrying locale-keyed metadata and per-version
//! manifests. Map-based collections are `BTreeMap` so persisted output is
//! stable across runs.

pub mod diff;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Locale tag -> display string.
pub type LocalizedString = BTreeMap<String, String>;
/// Locale tag -> file descriptor.
pub type LocalizedIcon = BTreeMap<String, FileV2>;
/// Locale tag -> screenshot file list.
pub type LocalizedFiles = BTreeMap<String, Vec<FileV2>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexV2 {
    pub repo: RepoV2,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageV2>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoV2 {
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<LocalizedIcon>,
    #[serde(default)]
    pub name: LocalizedString,
    #[serde(default)]
    pub description: LocalizedString,
    #[serde(default)]
    pub anti_features: BTreeMap<String, AntiFeatureV2>,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryV2>,
    #[serde(default)]
    pub mirrors: Vec<MirrorV2>,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorV2 {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiFeatureV2 {
    #[serde(default)]
    pub icon: LocalizedIcon,
    #[serde(default)]
    pub name: LocalizedString,
    #[serde(default)]
    pub description: LocalizedString,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryV2 {
    #[serde(default)]
    pub icon: LocalizedIcon,
    #[serde(default)]
    pub name: LocalizedString,
    #[serde(default)]
    pub description: LocalizedString,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileV2 {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, rename = "ipfsCIDv1", skip_serializing_if = "Option::is_none")]
    pub ipfs_cid_v1: Option<String>,
}

impl FileV2 {
    pub fn with_name(name: impl Into<String>) -> Self {
        FileV2 {
            name: name.into(),
            sha256: None,
            size: None,
            ipfs_cid_v1: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageV2 {
    pub metadata: MetadataV2,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionV2>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataV2 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<LocalizedString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<LocalizedString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<LocalizedIcon>,
    #[serde(default)]
    pub added: i64,
    #[serde(default)]
    pub last_updated: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitcoin: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    #[serde(default)]
    pub donate: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_graphic: Option<LocalizedIcon>,
    #[serde(default, rename = "flattrID", skip_serializing_if = "Option::is_none")]
    pub flattr_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_tracker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liberapay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub litecoin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_collective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_signer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_graphic: Option<LocalizedIcon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshots: Option<ScreenshotsV2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tv_banner: Option<LocalizedIcon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<LocalizedString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_site: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotsV2 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<LocalizedFiles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seven_inch: Option<LocalizedFiles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ten_inch: Option<LocalizedFiles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wear: Option<LocalizedFiles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tv: Option<LocalizedFiles>,
}

impl ScreenshotsV2 {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none()
            && self.seven_inch.is_none()
            && self.ten_inch.is_none()
            && self.wear.is_none()
            && self.tv.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionV2 {
    #[serde(default)]
    pub added: i64,
    pub file: FileV2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<FileV2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<SignerV2>,
    #[serde(default)]
    pub whats_new: LocalizedString,
    pub manifest: ManifestV2,
    #[serde(default)]
    pub anti_features: BTreeMap<String, LocalizedString>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerV2 {
    pub sha256: Vec<String>,
    #[serde(default)]
    pub has_multiple_signers: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestV2 {
    #[serde(default)]
    pub version_name: String,
    #[serde(default)]
    pub version_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<SignerV2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses_sdk: Option<UsesSdkV2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_sdk_version: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sdk_version: Option<i32>,
    #[serde(default)]
    pub uses_permission: Vec<PermissionV2>,
    #[serde(default)]
    pub uses_permission_sdk_23: Vec<PermissionV2>,
    #[serde(default)]
    pub features: Vec<FeatureV2>,
    #[serde(default, rename = "nativecode")]
    pub native_code: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsesSdkV2 {
    pub min_sdk_version: i32,
    pub target_sdk_version: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionV2 {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sdk_version: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureV2 {
    pub name: String,
}

/// The diff envelope published as `entry.json`: which full index and which
/// per-base diffs are currently offered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub timestamp: i64,
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i32>,
    pub index: EntryFileV2,
    #[serde(default)]
    pub diffs: BTreeMap<String, EntryFileV2>,
}

impl Entry {
    /// Picks the artifact for a client whose last sync saw `timestamp`:
    /// `None` when already current, the matching diff when one is offered,
    /// the full index descriptor otherwise. Diff keys are the decimal base
    /// timestamp.
    pub fn diff(&self, timestamp: i64) -> Option<&EntryFileV2> {
        if timestamp == self.timestamp {
            None
        } else {
            Some(
                self.diffs
                    .get(&timestamp.to_string())
                    .unwrap_or(&self.index),
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFileV2 {
    pub name: String,
    pub sha256: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub num_packages: i32,
    #[serde(default, rename = "ipfsCIDv1", skip_serializing_if = "Option::is_none")]
    pub ipfs_cid_v1: Option<String>,
}

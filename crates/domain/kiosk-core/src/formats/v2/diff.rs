//! Diff fragments for the canonical format. A fragment carries only the
//! fields that changed; patching merges present fields onto the existing
//! record and treats an explicit `null` map entry as a deletion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{
    AntiFeatureV2, CategoryV2, FileV2, IndexV2, LocalizedIcon, LocalizedString, ManifestV2,
    MetadataV2, MirrorV2, PackageV2, RepoV2, ScreenshotsV2, SignerV2, VersionV2,
};

/// Locale tag -> possibly-null display string; a null value drops the locale
/// when the map is resolved.
pub type NullableLocalizedString = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexV2Diff {
    pub repo: RepoV2Diff,
    #[serde(default)]
    pub packages: Option<BTreeMap<String, Option<PackageV2Diff>>>,
}

impl IndexV2Diff {
    pub fn patch_into(&self, index: &mut IndexV2) {
        self.repo.patch_into(&mut index.repo);
        if let Some(packages) = &self.packages {
            for (package_name, fragment) in packages {
                match fragment {
                    None => {
                        index.packages.remove(package_name);
                    }
                    Some(diff) => match index.packages.get_mut(package_name) {
                        Some(existing) => diff.patch_into(existing),
                        None => {
                            index.packages.insert(package_name.clone(), diff.to_package());
                        }
                    },
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoV2Diff {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub icon: Option<LocalizedIcon>,
    #[serde(default)]
    pub name: Option<LocalizedString>,
    #[serde(default)]
    pub description: Option<LocalizedString>,
    #[serde(default)]
    pub anti_features: Option<BTreeMap<String, Option<AntiFeatureV2>>>,
    #[serde(default)]
    pub categories: Option<BTreeMap<String, Option<CategoryV2>>>,
    #[serde(default)]
    pub mirrors: Option<Vec<MirrorV2>>,
    pub timestamp: i64,
}

impl RepoV2Diff {
    pub fn patch_into(&self, repo: &mut RepoV2) {
        if let Some(address) = &self.address {
            repo.address = address.clone();
        }
        if let Some(icon) = &self.icon {
            repo.icon = Some(icon.clone());
        }
        if let Some(name) = &self.name {
            repo.name = name.clone();
        }
        if let Some(description) = &self.description {
            repo.description = description.clone();
        }
        if let Some(anti_features) = &self.anti_features {
            patch_map(&mut repo.anti_features, anti_features);
        }
        if let Some(categories) = &self.categories {
            patch_map(&mut repo.categories, categories);
        }
        if let Some(mirrors) = &self.mirrors {
            repo.mirrors = mirrors.clone();
        }
        // The diff's timestamp is the new publication time, always taken.
        repo.timestamp = self.timestamp;
    }
}

/// Key-level merge: a present value upserts the key, a null removes it.
fn patch_map<V: Clone>(target: &mut BTreeMap<String, V>, diff: &BTreeMap<String, Option<V>>) {
    for (key, value) in diff {
        match value {
            Some(value) => {
                target.insert(key.clone(), value.clone());
            }
            None => {
                target.remove(key);
            }
        }
    }
}

fn resolve_nullable(map: &NullableLocalizedString) -> LocalizedString {
    map.iter()
        .filter_map(|(locale, value)| value.clone().map(|v| (locale.clone(), v)))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageV2Diff {
    #[serde(default)]
    pub metadata: Option<MetadataV2Diff>,
    #[serde(default)]
    pub versions: Option<BTreeMap<String, Option<VersionV2Diff>>>,
}

impl PackageV2Diff {
    /// Materializes a package from a fragment when the baseline has none.
    pub fn to_package(&self) -> PackageV2 {
        PackageV2 {
            metadata: self
                .metadata
                .as_ref()
                .map(MetadataV2Diff::to_metadata)
                .unwrap_or_default(),
            versions: self
                .versions
                .as_ref()
                .map(|versions| {
                    versions
                        .iter()
                        .filter_map(|(id, fragment)| {
                            fragment.as_ref().map(|f| (id.clone(), f.to_version()))
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn patch_into(&self, package: &mut PackageV2) {
        if let Some(metadata) = &self.metadata {
            metadata.patch_into(&mut package.metadata);
        }
        if let Some(versions) = &self.versions {
            for (version_id, fragment) in versions {
                match fragment {
                    None => {
                        package.versions.remove(version_id);
                    }
                    Some(diff) => match package.versions.get_mut(version_id) {
                        Some(existing) => diff.patch_into(existing),
                        None => {
                            package.versions.insert(version_id.clone(), diff.to_version());
                        }
                    },
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataV2Diff {
    #[serde(default)]
    pub name: Option<NullableLocalizedString>,
    #[serde(default)]
    pub summary: Option<NullableLocalizedString>,
    #[serde(default)]
    pub description: Option<NullableLocalizedString>,
    #[serde(default)]
    pub icon: Option<LocalizedIcon>,
    #[serde(default)]
    pub added: Option<i64>,
    #[serde(default)]
    pub last_updated: Option<i64>,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_phone: Option<String>,
    #[serde(default)]
    pub author_website: Option<String>,
    #[serde(default)]
    pub bitcoin: Option<String>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default)]
    pub donate: Option<Vec<String>>,
    #[serde(default)]
    pub feature_graphic: Option<LocalizedIcon>,
    #[serde(default, rename = "flattrID")]
    pub flattr_id: Option<String>,
    #[serde(default)]
    pub issue_tracker: Option<String>,
    #[serde(default)]
    pub liberapay: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub litecoin: Option<String>,
    #[serde(default)]
    pub open_collective: Option<String>,
    #[serde(default)]
    pub preferred_signer: Option<String>,
    #[serde(default)]
    pub promo_graphic: Option<LocalizedIcon>,
    #[serde(default)]
    pub source_code: Option<String>,
    #[serde(default)]
    pub screenshots: Option<ScreenshotsV2>,
    #[serde(default)]
    pub tv_banner: Option<LocalizedIcon>,
    #[serde(default)]
    pub translation: Option<String>,
    #[serde(default)]
    pub video: Option<LocalizedString>,
    #[serde(default)]
    pub web_site: Option<String>,
}

impl MetadataV2Diff {
    pub fn to_metadata(&self) -> MetadataV2 {
        MetadataV2 {
            name: self.name.as_ref().map(resolve_nullable),
            summary: self.summary.as_ref().map(resolve_nullable),
            description: self.description.as_ref().map(resolve_nullable),
            icon: self.icon.clone(),
            added: self.added.unwrap_or(0),
            last_updated: self.last_updated.unwrap_or(0),
            author_email: self.author_email.clone(),
            author_name: self.author_name.clone(),
            author_phone: self.author_phone.clone(),
            author_website: self.author_website.clone(),
            bitcoin: self.bitcoin.clone(),
            categories: self.categories.clone().unwrap_or_default(),
            changelog: self.changelog.clone(),
            donate: self.donate.clone().unwrap_or_default(),
            feature_graphic: self.feature_graphic.clone(),
            flattr_id: self.flattr_id.clone(),
            issue_tracker: self.issue_tracker.clone(),
            liberapay: self.liberapay.clone(),
            license: self.license.clone(),
            litecoin: self.litecoin.clone(),
            open_collective: self.open_collective.clone(),
            preferred_signer: self.preferred_signer.clone(),
            promo_graphic: self.promo_graphic.clone(),
            source_code: self.source_code.clone(),
            screenshots: self.screenshots.clone(),
            tv_banner: self.tv_banner.clone(),
            translation: self.translation.clone(),
            video: self.video.clone(),
            web_site: self.web_site.clone(),
        }
    }

    pub fn patch_into(&self, metadata: &mut MetadataV2) {
        // `added` is pinned: the first-seen value survives every diff.
        if let Some(last_updated) = self.last_updated {
            metadata.last_updated = last_updated;
        }
        if let Some(name) = &self.name {
            metadata.name = Some(resolve_nullable(name));
        }
        if let Some(summary) = &self.summary {
            metadata.summary = Some(resolve_nullable(summary));
        }
        if let Some(description) = &self.description {
            metadata.description = Some(resolve_nullable(description));
        }
        if let Some(icon) = &self.icon {
            metadata.icon = Some(icon.clone());
        }
        if let Some(author_email) = &self.author_email {
            metadata.author_email = Some(author_email.clone());
        }
        if let Some(author_name) = &self.author_name {
            metadata.author_name = Some(author_name.clone());
        }
        if let Some(author_phone) = &self.author_phone {
            metadata.author_phone = Some(author_phone.clone());
        }
        if let Some(author_website) = &self.author_website {
            metadata.author_website = Some(author_website.clone());
        }
        if let Some(bitcoin) = &self.bitcoin {
            metadata.bitcoin = Some(bitcoin.clone());
        }
        if let Some(categories) = &self.categories {
            metadata.categories = categories.clone();
        }
        if let Some(changelog) = &self.changelog {
            metadata.changelog = Some(changelog.clone());
        }
        // An empty donate list never wipes an existing one.
        if let Some(donate) = self.donate.as_ref().filter(|d| !d.is_empty()) {
            metadata.donate = donate.clone();
        }
        if let Some(feature_graphic) = &self.feature_graphic {
            metadata.feature_graphic = Some(feature_graphic.clone());
        }
        if let Some(flattr_id) = &self.flattr_id {
            metadata.flattr_id = Some(flattr_id.clone());
        }
        if let Some(issue_tracker) = &self.issue_tracker {
            metadata.issue_tracker = Some(issue_tracker.clone());
        }
        if let Some(liberapay) = &self.liberapay {
            metadata.liberapay = Some(liberapay.clone());
        }
        if let Some(license) = &self.license {
            metadata.license = Some(license.clone());
        }
        if let Some(litecoin) = &self.litecoin {
            metadata.litecoin = Some(litecoin.clone());
        }
        if let Some(open_collective) = &self.open_collective {
            metadata.open_collective = Some(open_collective.clone());
        }
        if let Some(preferred_signer) = &self.preferred_signer {
            metadata.preferred_signer = Some(preferred_signer.clone());
        }
        if let Some(promo_graphic) = &self.promo_graphic {
            metadata.promo_graphic = Some(promo_graphic.clone());
        }
        if let Some(source_code) = &self.source_code {
            metadata.source_code = Some(source_code.clone());
        }
        if let Some(screenshots) = &self.screenshots {
            metadata.screenshots = Some(screenshots.clone());
        }
        if let Some(tv_banner) = &self.tv_banner {
            metadata.tv_banner = Some(tv_banner.clone());
        }
        if let Some(translation) = &self.translation {
            metadata.translation = Some(translation.clone());
        }
        if let Some(video) = &self.video {
            metadata.video = Some(video.clone());
        }
        if let Some(web_site) = &self.web_site {
            metadata.web_site = Some(web_site.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionV2Diff {
    #[serde(default)]
    pub added: Option<i64>,
    #[serde(default)]
    pub file: Option<FileV2>,
    #[serde(default)]
    pub src: Option<FileV2>,
    #[serde(default)]
    pub signer: Option<SignerV2>,
    #[serde(default)]
    pub whats_new: Option<LocalizedString>,
    #[serde(default)]
    pub manifest: Option<ManifestV2>,
    #[serde(default)]
    pub anti_features: Option<BTreeMap<String, LocalizedString>>,
}

impl VersionV2Diff {
    /// Materializes a version from a fragment; fields the fragment omits
    /// stay at their empty defaults.
    pub fn to_version(&self) -> VersionV2 {
        VersionV2 {
            added: self.added.unwrap_or(0),
            file: self.file.clone().unwrap_or_default(),
            src: self.src.clone(),
            signer: self.signer.clone(),
            whats_new: self.whats_new.clone().unwrap_or_default(),
            manifest: self.manifest.clone().unwrap_or_default(),
            anti_features: self.anti_features.clone().unwrap_or_default(),
        }
    }

    pub fn patch_into(&self, version: &mut VersionV2) {
        if let Some(added) = self.added {
            version.added = added;
        }
        if let Some(file) = &self.file {
            version.file = file.clone();
        }
        if let Some(src) = &self.src {
            version.src = Some(src.clone());
        }
        if let Some(signer) = &self.signer {
            version.signer = Some(signer.clone());
        }
        if let Some(whats_new) = &self.whats_new {
            version.whats_new = whats_new.clone();
        }
        if let Some(manifest) = &self.manifest {
            version.manifest = manifest.clone();
        }
        if let Some(anti_features) = &self.anti_features {
            version.anti_features = anti_features.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::decode;

    fn baseline() -> IndexV2 {
        decode(
            br#"{
                "repo": {
                    "address": "https://example.org/repo",
                    "name": {"en-US": "Example"},
                    "description": {"en-US": "An example repo"},
                    "antiFeatures": {
                        "Ads": {"name": {"en-US": "Ads"}}
                    },
                    "timestamp": 1000
                },
                "packages": {
                    "org.example.one": {
                        "metadata": {
                            "name": {"en-US": "One"},
                            "added": 50,
                            "lastUpdated": 900,
                            "donate": ["https://pay.example.org"]
                        },
                        "versions": {
                            "v1hash": {
                                "added": 900,
                                "file": {"name": "/one-1.apk", "sha256": "v1hash", "size": 10},
                                "manifest": {"versionName": "1.0", "versionCode": 1}
                            },
                            "v2hash": {
                                "added": 950,
                                "file": {"name": "/one-2.apk", "sha256": "v2hash", "size": 11},
                                "manifest": {"versionName": "2.0", "versionCode": 2}
                            }
                        }
                    },
                    "org.example.two": {
                        "metadata": {"name": {"en-US": "Two"}, "added": 60, "lastUpdated": 800},
                        "versions": {}
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn null_package_fragment_deletes_package() {
        let mut index = baseline();
        let diff: IndexV2Diff = decode(
            br#"{
                "repo": {"timestamp": 2000},
                "packages": {"org.example.two": null}
            }"#,
        )
        .unwrap();

        diff.patch_into(&mut index);

        assert!(!index.packages.contains_key("org.example.two"));
        assert!(index.packages.contains_key("org.example.one"));
        assert_eq!(index.repo.timestamp, 2000);
    }

    #[test]
    fn null_version_fragment_deletes_only_that_version() {
        let mut index = baseline();
        let diff: IndexV2Diff = decode(
            br#"{
                "repo": {"timestamp": 2000},
                "packages": {
                    "org.example.one": {"versions": {"v1hash": null}}
                }
            }"#,
        )
        .unwrap();

        diff.patch_into(&mut index);

        let package = &index.packages["org.example.one"];
        assert!(!package.versions.contains_key("v1hash"));
        assert!(package.versions.contains_key("v2hash"));
    }

    #[test]
    fn omitted_fields_keep_baseline_values() {
        let mut index = baseline();
        let diff: IndexV2Diff = decode(br#"{"repo": {"timestamp": 2000}}"#).unwrap();

        diff.patch_into(&mut index);

        assert_eq!(index.repo.name.get("en-US").map(String::as_str), Some("Example"));
        assert_eq!(index.packages.len(), 2);
    }

    #[test]
    fn repo_catalogue_entries_patch_at_key_level() {
        let mut index = baseline();
        let diff: IndexV2Diff = decode(
            br#"{
                "repo": {
                    "timestamp": 2000,
                    "antiFeatures": {
                        "Ads": null,
                        "Tracking": {"name": {"en-US": "Tracking"}}
                    }
                }
            }"#,
        )
        .unwrap();

        diff.patch_into(&mut index);

        assert!(!index.repo.anti_features.contains_key("Ads"));
        assert!(index.repo.anti_features.contains_key("Tracking"));
    }

    #[test]
    fn new_package_is_materialized_from_fragment() {
        let mut index = baseline();
        let diff: IndexV2Diff = decode(
            br#"{
                "repo": {"timestamp": 2000},
                "packages": {
                    "org.example.three": {
                        "metadata": {
                            "name": {"en-US": "Three", "de": null},
                            "lastUpdated": 1990
                        },
                        "versions": {
                            "v3hash": {
                                "file": {"name": "/three-1.apk", "sha256": "v3hash"},
                                "manifest": {"versionName": "0.1", "versionCode": 1}
                            }
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        diff.patch_into(&mut index);

        let package = &index.packages["org.example.three"];
        let name = package.metadata.name.as_ref().unwrap();
        assert_eq!(name.get("en-US").map(String::as_str), Some("Three"));
        assert!(!name.contains_key("de"));
        assert_eq!(package.metadata.added, 0);
        assert_eq!(package.versions["v3hash"].manifest.version_code, 1);
        assert!(package.versions["v3hash"].src.is_none());
    }

    #[test]
    fn metadata_added_is_never_patched() {
        let mut index = baseline();
        let diff: IndexV2Diff = decode(
            br#"{
                "repo": {"timestamp": 2000},
                "packages": {
                    "org.example.one": {"metadata": {"added": 9999, "lastUpdated": 1999}}
                }
            }"#,
        )
        .unwrap();

        diff.patch_into(&mut index);

        let metadata = &index.packages["org.example.one"].metadata;
        assert_eq!(metadata.added, 50);
        assert_eq!(metadata.last_updated, 1999);
    }

    #[test]
    fn empty_donate_list_keeps_existing() {
        let mut index = baseline();
        let diff: IndexV2Diff = decode(
            br#"{
                "repo": {"timestamp": 2000},
                "packages": {
                    "org.example.one": {"metadata": {"donate": []}}
                }
            }"#,
        )
        .unwrap();

        diff.patch_into(&mut index);

        assert_eq!(
            index.packages["org.example.one"].metadata.donate,
            vec!["https://pay.example.org"]
        );
    }

    #[test]
    fn existing_version_merges_fragment_fields() {
        let mut index = baseline();
        let diff: IndexV2Diff = decode(
            br#"{
                "repo": {"timestamp": 2000},
                "packages": {
                    "org.example.one": {
                        "versions": {
                            "v2hash": {
                                "whatsNew": {"en-US": "Bugfixes"},
                                "manifest": {"versionName": "2.0.1", "versionCode": 3}
                            }
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        diff.patch_into(&mut index);

        let version = &index.packages["org.example.one"].versions["v2hash"];
        assert_eq!(version.manifest.version_code, 3);
        assert_eq!(version.added, 950);
        assert_eq!(version.file.name, "/one-2.apk");
        assert_eq!(
            version.whats_new.get("en-US").map(String::as_str),
            Some("Bugfixes")
        );
    }
}

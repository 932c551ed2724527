//! Normalizes the legacy index format into the canonical one. Pure
//! functions, no I/O. Path synthesis and defaulting rules follow what index
//! publishers actually serve, quirks included.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::formats::v1::{AppV1, IndexV1, LocalizedV1, PackageV1, PermissionV1, RepoV1};
use crate::formats::v2::{
    AntiFeatureV2, CategoryV2, FeatureV2, FileV2, IndexV2, LocalizedFiles, LocalizedIcon,
    LocalizedString, ManifestV2, MetadataV2, MirrorV2, PackageV2, PermissionV2, RepoV2,
    ScreenshotsV2, SignerV2, UsesSdkV2, VersionV2,
};

/// The locale slot app-level V1 fields land in.
const V1_LOCALE: &str = "en-US";

pub fn index_v1_to_v2(index: &IndexV1) -> IndexV2 {
    let mut anti_features: BTreeSet<String> = BTreeSet::new();
    let mut categories: BTreeSet<String> = BTreeSet::new();
    let mut packages: BTreeMap<String, PackageV2> = BTreeMap::new();

    for app in &index.apps {
        anti_features.extend(app.anti_features.iter().cloned());
        categories.extend(app.categories.iter().cloned());

        let releases = index.packages.get(&app.package_name);
        let preferred_signer = releases
            .and_then(|releases| releases.first())
            .and_then(|release| release.signer.clone());
        // One localized what's-new per app, shared by all of its versions.
        let whats_new = localized_string(app.localized.as_ref(), None, |l| l.whats_new.as_deref());

        let versions: BTreeMap<String, VersionV2> = releases
            .map(|releases| {
                releases
                    .iter()
                    .map(|release| {
                        (
                            release.hash.clone(),
                            version_v2(release, whats_new.clone(), &app.anti_features),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        let package = PackageV2 {
            metadata: metadata_v2(app, preferred_signer),
            versions,
        };
        // First record wins when an index repeats a package name.
        packages.entry(app.package_name.clone()).or_insert(package);
    }

    IndexV2 {
        repo: repo_v2(&index.repo, &anti_features, &categories),
        packages,
    }
}

fn repo_v2(repo: &RepoV1, anti_features: &BTreeSet<String>, categories: &BTreeSet<String>) -> RepoV2 {
    let mut mirrors: Vec<MirrorV2> = Vec::with_capacity(repo.mirrors.len() + 1);
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for url in std::iter::once(&repo.address).chain(repo.mirrors.iter()) {
        if !seen.insert(url.as_str()) {
            continue;
        }
        mirrors.push(MirrorV2 {
            url: url.clone(),
            is_primary: (url == &repo.address).then_some(true),
            country_code: None,
        });
    }

    RepoV2 {
        address: repo.address.clone(),
        web_base_url: None,
        icon: repo.icon.as_ref().map(|icon| {
            BTreeMap::from([(
                V1_LOCALE.to_string(),
                FileV2::with_name(format!("/icons/{icon}")),
            )])
        }),
        name: single_locale(&repo.name),
        description: single_locale(&repo.description),
        anti_features: anti_features
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    AntiFeatureV2 {
                        name: single_locale(name),
                        icon: BTreeMap::from([(
                            V1_LOCALE.to_string(),
                            FileV2::with_name(format!(
                                "/icons/ic_antifeature_{}.png",
                                normalize_name(name)
                            )),
                        )]),
                        description: BTreeMap::new(),
                    },
                )
            })
            .collect(),
        categories: categories
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    CategoryV2 {
                        name: single_locale(name),
                        icon: BTreeMap::from([(
                            V1_LOCALE.to_string(),
                            FileV2::with_name(format!(
                                "/icons/category_{}.png",
                                normalize_name(name)
                            )),
                        )]),
                        description: BTreeMap::new(),
                    },
                )
            })
            .collect(),
        mirrors,
        timestamp: repo.timestamp,
    }
}

fn metadata_v2(app: &AppV1, preferred_signer: Option<String>) -> MetadataV2 {
    let localized = app.localized.as_ref();
    MetadataV2 {
        name: localized_string(localized, app.name.as_deref(), |l| l.name.as_deref()),
        summary: localized_string(localized, app.summary.as_deref(), |l| l.summary.as_deref()),
        description: localized_string(localized, app.description.as_deref(), |l| {
            l.description.as_deref()
        }),
        icon: localized_icon(localized, &app.package_name, app.icon.as_deref(), |l| {
            l.icon.as_deref()
        }),
        added: app.added.unwrap_or(0),
        last_updated: app.last_updated.unwrap_or(0),
        author_email: app.author_email.clone(),
        author_name: app.author_name.clone(),
        author_phone: app.author_phone.clone(),
        author_website: app.author_web_site.clone().or_else(|| app.web_site.clone()),
        bitcoin: app.bitcoin.clone(),
        categories: app.categories.clone(),
        changelog: app.changelog.clone(),
        donate: app.donate.clone().into_iter().collect(),
        feature_graphic: localized_icon(localized, &app.package_name, None, |l| {
            l.feature_graphic.as_deref()
        }),
        flattr_id: app.flattr_id.clone(),
        issue_tracker: app.issue_tracker.clone(),
        liberapay: app.liberapay.clone(),
        license: app.license.clone(),
        litecoin: app.litecoin.clone(),
        open_collective: app.open_collective.clone(),
        preferred_signer,
        promo_graphic: localized_icon(localized, &app.package_name, None, |l| {
            l.promo_graphic.as_deref()
        }),
        source_code: app.source_code.clone(),
        screenshots: localized.and_then(|l| screenshots_v2(l, &app.package_name)),
        tv_banner: localized_icon(localized, &app.package_name, None, |l| l.tv_banner.as_deref()),
        translation: app.translation.clone(),
        video: localized_string(localized, None, |l| l.video.as_deref()),
        web_site: app.web_site.clone(),
    }
}

fn version_v2(
    release: &PackageV1,
    whats_new: Option<LocalizedString>,
    app_anti_features: &[String],
) -> VersionV2 {
    let signer = release.signer.as_ref().map(|signer| SignerV2 {
        sha256: vec![signer.clone()],
        has_multiple_signers: false,
    });

    let mut anti_features: BTreeMap<String, LocalizedString> = BTreeMap::new();
    for name in app_anti_features.iter().chain(release.anti_features.iter()) {
        anti_features.insert(name.clone(), single_locale(name));
    }

    VersionV2 {
        added: release.added.unwrap_or(0),
        file: FileV2 {
            name: format!("/{}", release.apk_name),
            sha256: Some(release.hash.clone()),
            size: Some(release.size),
            ipfs_cid_v1: None,
        },
        src: release
            .src_name
            .as_ref()
            .map(|src| FileV2::with_name(format!("/{src}"))),
        signer: signer.clone(),
        whats_new: whats_new.unwrap_or_default(),
        manifest: ManifestV2 {
            version_name: release.version_name.clone(),
            version_code: release.version_code.unwrap_or(0),
            signer,
            uses_sdk: uses_sdk(release),
            min_sdk_version: release.min_sdk_version,
            max_sdk_version: release.max_sdk_version,
            uses_permission: permissions_v2(&release.uses_permission),
            uses_permission_sdk_23: permissions_v2(&release.uses_permission_sdk23),
            features: release
                .features
                .iter()
                .map(|name| FeatureV2 { name: name.clone() })
                .collect(),
            native_code: release.native_code.clone(),
        },
        anti_features,
    }
}

/// Both bounds absent means the release carries no SDK constraint at all.
/// Otherwise an absent target falls back to minSdk before the final default
/// of 1.
fn uses_sdk(release: &PackageV1) -> Option<UsesSdkV2> {
    if release.min_sdk_version.is_none() && release.target_sdk_version.is_none() {
        return None;
    }
    Some(UsesSdkV2 {
        min_sdk_version: release.min_sdk_version.unwrap_or(1),
        target_sdk_version: release.target_sdk().unwrap_or(1),
    })
}

fn permissions_v2(permissions: &[PermissionV1]) -> Vec<PermissionV2> {
    permissions
        .iter()
        .map(|permission| PermissionV2 {
            name: permission.name.clone(),
            max_sdk_version: permission.max_sdk,
        })
        .collect()
}

/// An app-level value wins the `en-US` slot outright; otherwise each
/// locale's value is carried over.
fn localized_string<F>(
    localized: Option<&HashMap<String, LocalizedV1>>,
    default: Option<&str>,
    field: F,
) -> Option<LocalizedString>
where
    F: Fn(&LocalizedV1) -> Option<&str>,
{
    if let Some(default) = default {
        return Some(single_locale(default));
    }
    let map: LocalizedString = localized?
        .iter()
        .filter_map(|(locale, entry)| field(entry).map(|value| (locale.clone(), value.to_string())))
        .collect();
    (!map.is_empty()).then_some(map)
}

fn localized_icon<F>(
    localized: Option<&HashMap<String, LocalizedV1>>,
    package_name: &str,
    default: Option<&str>,
    field: F,
) -> Option<LocalizedIcon>
where
    F: Fn(&LocalizedV1) -> Option<&str>,
{
    if let Some(default) = default {
        return Some(BTreeMap::from([(
            V1_LOCALE.to_string(),
            FileV2::with_name(format!("/{package_name}/{V1_LOCALE}/{default}")),
        )]));
    }
    let map: LocalizedIcon = localized?
        .iter()
        .filter_map(|(locale, entry)| {
            field(entry).map(|value| {
                (
                    locale.clone(),
                    FileV2::with_name(format!("/{package_name}/{locale}/{value}")),
                )
            })
        })
        .collect();
    (!map.is_empty()).then_some(map)
}

fn screenshots_v2(
    localized: &HashMap<String, LocalizedV1>,
    package_name: &str,
) -> Option<ScreenshotsV2> {
    let screenshots = ScreenshotsV2 {
        phone: localized_screenshots(localized, package_name, "phoneScreenshots", |l| {
            &l.phone_screenshots
        }),
        seven_inch: localized_screenshots(localized, package_name, "sevenInchScreenshots", |l| {
            &l.seven_inch_screenshots
        }),
        ten_inch: localized_screenshots(localized, package_name, "tenInchScreenshots", |l| {
            &l.ten_inch_screenshots
        }),
        wear: localized_screenshots(localized, package_name, "wearScreenshots", |l| {
            &l.wear_screenshots
        }),
        tv: localized_screenshots(localized, package_name, "tvScreenshots", |l| {
            &l.tv_screenshots
        }),
    };
    (!screenshots.is_empty()).then_some(screenshots)
}

fn localized_screenshots<F>(
    localized: &HashMap<String, LocalizedV1>,
    package_name: &str,
    kind: &str,
    field: F,
) -> Option<LocalizedFiles>
where
    F: Fn(&LocalizedV1) -> &Vec<String>,
{
    let map: LocalizedFiles = localized
        .iter()
        .filter_map(|(locale, entry)| {
            let files = field(entry);
            if files.is_empty() {
                return None;
            }
            Some((
                locale.clone(),
                files
                    .iter()
                    .map(|file| {
                        FileV2::with_name(format!("/{package_name}/{locale}/{kind}/{file}"))
                    })
                    .collect(),
            ))
        })
        .collect();
    (!map.is_empty()).then_some(map)
}

fn single_locale(value: &str) -> LocalizedString {
    BTreeMap::from([(V1_LOCALE.to_string(), value.to_string())])
}

fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace(" & ", "_")
}

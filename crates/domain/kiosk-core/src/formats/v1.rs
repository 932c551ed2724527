//! The legacy single-file index format: one signed JSON document carrying
//! repo metadata, app records and their release lists. Field shapes follow
//! the wire format, quirks included.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexV1 {
    pub repo: RepoV1,
    #[serde(default)]
    pub apps: Vec<AppV1>,
    #[serde(default)]
    pub packages: HashMap<String, Vec<PackageV1>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoV1 {
    #[serde(default)]
    pub name: String,
    pub timestamp: i64,
    #[serde(default)]
    pub icon: Option<String>,
    pub address: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mirrors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppV1 {
    pub package_name: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub anti_features: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default)]
    pub translation: Option<String>,
    #[serde(default)]
    pub issue_tracker: Option<String>,
    #[serde(default)]
    pub source_code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default)]
    pub author_web_site: Option<String>,
    #[serde(default)]
    pub author_phone: Option<String>,
    #[serde(default)]
    pub donate: Option<String>,
    #[serde(default)]
    pub liberapay: Option<String>,
    #[serde(default)]
    pub open_collective: Option<String>,
    #[serde(default)]
    pub bitcoin: Option<String>,
    #[serde(default)]
    pub litecoin: Option<String>,
    #[serde(default, rename = "flattrID")]
    pub flattr_id: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub web_site: Option<String>,
    #[serde(default, deserialize_with = "opt_i64")]
    pub added: Option<i64>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "opt_i64")]
    pub last_updated: Option<i64>,
    #[serde(default)]
    pub localized: Option<HashMap<String, LocalizedV1>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedV1 {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub whats_new: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default)]
    pub phone_screenshots: Vec<String>,
    #[serde(default)]
    pub seven_inch_screenshots: Vec<String>,
    #[serde(default)]
    pub ten_inch_screenshots: Vec<String>,
    #[serde(default)]
    pub wear_screenshots: Vec<String>,
    #[serde(default)]
    pub tv_screenshots: Vec<String>,
    #[serde(default)]
    pub feature_graphic: Option<String>,
    #[serde(default)]
    pub promo_graphic: Option<String>,
    #[serde(default)]
    pub tv_banner: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageV1 {
    #[serde(default, deserialize_with = "opt_i64")]
    pub added: Option<i64>,
    pub apk_name: String,
    pub hash: String,
    #[serde(default = "default_hash_type")]
    pub hash_type: String,
    #[serde(default, deserialize_with = "opt_i32")]
    pub min_sdk_version: Option<i32>,
    #[serde(default, deserialize_with = "opt_i32")]
    pub max_sdk_version: Option<i32>,
    #[serde(default, deserialize_with = "opt_i32")]
    pub target_sdk_version: Option<i32>,
    pub package_name: String,
    #[serde(default)]
    pub sig: Option<String>,
    #[serde(default)]
    pub signer: Option<String>,
    #[serde(default)]
    pub size: i64,
    #[serde(default, rename = "srcname")]
    pub src_name: Option<String>,
    #[serde(default, rename = "uses-permission")]
    pub uses_permission: Vec<PermissionV1>,
    #[serde(default, rename = "uses-permission-sdk-23")]
    pub uses_permission_sdk23: Vec<PermissionV1>,
    #[serde(default, deserialize_with = "opt_i64")]
    pub version_code: Option<i64>,
    #[serde(default)]
    pub version_name: String,
    #[serde(default, rename = "nativecode")]
    pub native_code: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub anti_features: Vec<String>,
}

fn default_hash_type() -> String {
    "sha256".to_string()
}

impl PackageV1 {
    /// Releases published before targetSdk existed fall back to minSdk;
    /// that is the documented default of the wire format.
    pub fn target_sdk(&self) -> Option<i32> {
        self.target_sdk_version.or(self.min_sdk_version)
    }
}

/// One `uses-permission` entry: a heterogeneous JSON array whose first
/// element is the permission name and whose optional second element is the
/// max SDK the permission applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionV1 {
    pub name: String,
    pub max_sdk: Option<i32>,
}

impl<'de> Deserialize<'de> for PermissionV1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PermissionVisitor;

        impl<'de> Visitor<'de> for PermissionVisitor {
            type Value = PermissionV1;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [name, maxSdk?] permission array")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<PermissionV1, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let name: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                // The second element shows up as a number, a numeric string,
                // null, or not at all. Anything non-numeric means "no bound".
                let max_sdk = match seq.next_element::<serde_json::Value>()? {
                    Some(serde_json::Value::Number(n)) => {
                        n.as_i64().and_then(|v| i32::try_from(v).ok())
                    }
                    Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
                    _ => None,
                };
                while seq.next_element::<de::IgnoredAny>()?.is_some() {}
                Ok(PermissionV1 { name, max_sdk })
            }
        }

        deserializer.deserialize_seq(PermissionVisitor)
    }
}

/// Numeric fields that sloppy index generators emit as strings.
fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn opt_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_i64(deserializer)?.and_then(|v| i32::try_from(v).ok()))
}

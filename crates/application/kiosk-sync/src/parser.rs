//! Archive and JSON work, moved off the async runtime. Index payloads run
//! to tens of megabytes, so decoding happens on the blocking pool.

use camino::Utf8PathBuf;
use kiosk_core::formats::decode;
use kiosk_core::formats::v2::EntryFileV2;
use kiosk_infra::jar::SignedJar;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::SyncError;

/// Opens a signed archive and returns its certificate together with the
/// digest-verified payload entry.
pub async fn read_signed_payload(
    path: Utf8PathBuf,
    entry: &'static str,
) -> Result<(Vec<u8>, Vec<u8>), SyncError> {
    tokio::task::spawn_blocking(move || -> Result<(Vec<u8>, Vec<u8>), SyncError> {
        let mut jar = SignedJar::open(&path)?;
        let payload = jar.verified_entry(entry)?;
        Ok((jar.certificate().to_vec(), payload))
    })
    .await?
}

/// Decodes a JSON payload already held in memory.
pub async fn decode_payload<T>(bytes: Vec<u8>) -> Result<T, SyncError>
where
    T: DeserializeOwned + Send + 'static,
{
    tokio::task::spawn_blocking(move || Ok(decode(&bytes)?)).await?
}

/// Reads a file and decodes it as JSON.
pub async fn decode_file<T>(path: Utf8PathBuf) -> Result<T, SyncError>
where
    T: DeserializeOwned + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<T, SyncError> {
        let bytes = std::fs::read(path.as_std_path())?;
        Ok(decode(&bytes)?)
    })
    .await?
}

/// SHA-256 of a file, lowercase hex.
pub async fn file_digest(path: Utf8PathBuf) -> Result<String, SyncError> {
    tokio::task::spawn_blocking(move || -> Result<String, SyncError> {
        let mut file = std::fs::File::open(path.as_std_path())?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await?
}

/// Checks a downloaded payload against the digest its entry descriptor
/// promised. Unsigned payloads are only trusted through this chain back to
/// the signed entry.
pub async fn verify_descriptor(
    path: Utf8PathBuf,
    descriptor: &EntryFileV2,
) -> Result<(), SyncError> {
    let digest = file_digest(path).await?;
    if !digest.eq_ignore_ascii_case(&descriptor.sha256) {
        return Err(SyncError::PayloadDigest(descriptor.name.clone()));
    }
    Ok(())
}

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Hex characters in a SHA-256 fingerprint.
pub const FINGERPRINT_LENGTH: usize = 64;

/// Smallest plausible DER encoding of a signer certificate. Shorter blobs
/// are rejected instead of being fingerprinted.
pub const MIN_CERTIFICATE_LENGTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintError {
    #[error("certificate too short to fingerprint: {0} bytes")]
    CertificateTooShort(usize),
    #[error("invalid fingerprint: {0:?}")]
    Invalid(String),
}

/// Uppercase hex SHA-256 digest of a repo's signer certificate. This is the
/// repo's trust anchor: derived or pinned once, compared case-insensitively
/// ever after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Accepts exactly 64 hex characters (surrounding whitespace ignored)
    /// and stores them uppercased.
    pub fn parse(value: &str) -> Result<Self, FingerprintError> {
        let value = value.trim();
        if value.len() != FINGERPRINT_LENGTH || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FingerprintError::Invalid(value.to_string()));
        }
        Ok(Fingerprint(value.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive equality. Stored fingerprints may predate the
    /// uppercase normalization, so casing never decides a match.
    pub fn check(&self, other: &Fingerprint) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    /// Space-separated hex pairs for human display.
    pub fn formatted(&self) -> String {
        self.0
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Fingerprint::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

/// Derives the fingerprint of a DER-encoded signer certificate.
pub fn fingerprint_of(certificate: &[u8]) -> Result<Fingerprint, FingerprintError> {
    if certificate.len() < MIN_CERTIFICATE_LENGTH {
        return Err(FingerprintError::CertificateTooShort(certificate.len()));
    }
    Ok(Fingerprint(hex::encode_upper(Sha256::digest(certificate))))
}

/// Derives a fingerprint from hex-encoded bytes, as pasted from a repo
/// share link. Colon and space separators are stripped, the remaining hex
/// is decoded and the decoded bytes are hashed like any certificate blob.
pub fn hex_to_fingerprint(hex_input: &str) -> Result<Fingerprint, FingerprintError> {
    let cleaned: String = hex_input
        .chars()
        .filter(|c| !matches!(c, ' ' | ':'))
        .collect();
    if cleaned.is_empty() {
        return Err(FingerprintError::Invalid(hex_input.to_string()));
    }
    let bytes =
        hex::decode(&cleaned).map_err(|_| FingerprintError::Invalid(hex_input.to_string()))?;
    Ok(Fingerprint(hex::encode_upper(Sha256::digest(bytes))))
}

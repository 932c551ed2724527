//! Reader for signed index archives. An index jar carries its payload next
//! to `META-INF/MANIFEST.MF` and exactly one PKCS#7 signature block; the
//! block holds the signing certificate whose digest the trust layer pins.

use std::collections::HashMap;
use std::io::{BufReader, Read, Seek};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use camino::Utf8Path;
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use der::{Decode, Encode};
use sha2::{Digest, Sha256};
use zip::result::ZipError;
use zip::ZipArchive;

const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

#[derive(Debug, thiserror::Error)]
pub enum JarError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Archive error: {0}")]
    Zip(#[from] ZipError),
    #[error("Entry `{0}` not found in archive")]
    EntryNotFound(String),
    #[error("No signature block in archive")]
    MissingSignature,
    #[error("Expected one signature block, found {0}")]
    SignatureBlockCount(usize),
    #[error("Signature parse error: {0}")]
    Signature(String),
    #[error("Expected one signer, found {0}")]
    SignerCount(usize),
    #[error("Expected one certificate, found {0}")]
    CertificateCount(usize),
    #[error("No recorded digest for `{0}`")]
    MissingDigest(String),
    #[error("Digest mismatch for `{0}`")]
    DigestMismatch(String),
}

/// An opened index archive with its signature block already decoded.
///
/// Opening fails unless the archive carries exactly one signature block
/// containing exactly one signer and one certificate. Payload reads go
/// through [`SignedJar::verified_entry`] so bytes never reach a parser
/// without matching the manifest digest the signer vouched for.
#[derive(Debug)]
pub struct SignedJar {
    archive: ZipArchive<BufReader<std::fs::File>>,
    certificate: Vec<u8>,
    digests: HashMap<String, Vec<u8>>,
}

impl SignedJar {
    pub fn open(path: &Utf8Path) -> Result<Self, JarError> {
        let file = std::fs::File::open(path.as_std_path())?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let blocks: Vec<String> = archive
            .file_names()
            .filter(|name| is_signature_block(name))
            .map(|name| name.to_string())
            .collect();
        let block_name = match blocks.as_slice() {
            [] => return Err(JarError::MissingSignature),
            [one] => one.clone(),
            many => return Err(JarError::SignatureBlockCount(many.len())),
        };

        let block = read_entry(&mut archive, &block_name)?;
        let certificate = extract_certificate(&block)?;
        let manifest = read_entry(&mut archive, MANIFEST_NAME)?;
        let digests = parse_manifest(&manifest);

        Ok(Self {
            archive,
            certificate,
            digests,
        })
    }

    /// DER bytes of the single signing certificate.
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// Reads `name` and returns its bytes once they match the SHA-256
    /// digest the signed manifest records for that entry.
    pub fn verified_entry(&mut self, name: &str) -> Result<Vec<u8>, JarError> {
        let expected = self
            .digests
            .get(name)
            .cloned()
            .ok_or_else(|| JarError::MissingDigest(name.to_string()))?;
        let bytes = read_entry(&mut self.archive, name)?;
        if Sha256::digest(&bytes).as_slice() != expected.as_slice() {
            return Err(JarError::DigestMismatch(name.to_string()));
        }
        Ok(bytes)
    }
}

fn is_signature_block(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("META-INF/") else {
        return false;
    };
    if rest.contains('/') {
        return false;
    }
    let extension = rest.rsplit('.').next().unwrap_or("").to_ascii_uppercase();
    matches!(extension.as_str(), "RSA" | "DSA" | "EC")
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>, JarError> {
    let mut entry = archive.by_name(name).map_err(|err| match err {
        ZipError::FileNotFound => JarError::EntryNotFound(name.to_string()),
        other => JarError::Zip(other),
    })?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

fn extract_certificate(block: &[u8]) -> Result<Vec<u8>, JarError> {
    let content =
        ContentInfo::from_der(block).map_err(|err| JarError::Signature(err.to_string()))?;
    if content.content_type != const_oid::db::rfc5911::ID_SIGNED_DATA {
        return Err(JarError::Signature(format!(
            "unexpected content type {}",
            content.content_type
        )));
    }
    let signed: SignedData = content
        .content
        .decode_as()
        .map_err(|err| JarError::Signature(err.to_string()))?;

    let signers = signed.signer_infos.0.len();
    if signers != 1 {
        return Err(JarError::SignerCount(signers));
    }

    let mut certificates = Vec::new();
    if let Some(set) = &signed.certificates {
        for choice in set.0.iter() {
            if let CertificateChoices::Certificate(certificate) = choice {
                certificates.push(certificate);
            }
        }
    }
    if certificates.len() != 1 {
        return Err(JarError::CertificateCount(certificates.len()));
    }
    certificates[0]
        .to_der()
        .map_err(|err| JarError::Signature(err.to_string()))
}

/// Collects `Name:` / `SHA-256-Digest:` pairs from the manifest, unfolding
/// the 70-column continuation lines long entry names are wrapped with.
fn parse_manifest(manifest: &[u8]) -> HashMap<String, Vec<u8>> {
    let text = String::from_utf8_lossy(manifest);
    let unfolded = text.replace("\r\n ", "").replace("\n ", "");

    let mut digests = HashMap::new();
    let mut current: Option<String> = None;
    for line in unfolded.lines() {
        if let Some(name) = line.strip_prefix("Name: ") {
            current = Some(name.trim_end().to_string());
        } else if let Some(value) = line.strip_prefix("SHA-256-Digest: ") {
            if let (Some(name), Ok(digest)) = (current.clone(), BASE64.decode(value.trim_end())) {
                digests.insert(name, digest);
            }
        } else if line.is_empty() {
            current = None;
        }
    }
    digests
}

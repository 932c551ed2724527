use kiosk_core::fingerprint::{fingerprint_of, Fingerprint};

use crate::SyncError;

/// Trust decision for the certificate a repo signed its index with.
///
/// First contact pins whatever the repo presents; on every later sync the
/// presented certificate must hash to the pinned fingerprint, which is
/// returned on a match.
pub fn validate_certificate(
    pinned: Option<&Fingerprint>,
    certificate: &[u8],
) -> Result<Fingerprint, SyncError> {
    let acquired = fingerprint_of(certificate)?;
    match pinned {
        None => Ok(acquired),
        Some(expected) if expected.check(&acquired) => Ok(expected.clone()),
        Some(expected) => Err(SyncError::FingerprintMismatch {
            expected: expected.as_str().to_owned(),
            acquired: acquired.as_str().to_owned(),
        }),
    }
}

pub mod convert;
pub mod fingerprint;
pub mod formats;
pub mod repo;

pub use fingerprint::{Fingerprint, FingerprintError};
pub use repo::{Authentication, Repo, VersionInfo};

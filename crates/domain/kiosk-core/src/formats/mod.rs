pub mod v1;
pub mod v2;

/// The one JSON decode entry point for every index format. Unknown fields
/// are ignored and the per-format models carry their own tolerant field
/// decoders, so no call site ever tunes decoding locally.
pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(bytes)
}

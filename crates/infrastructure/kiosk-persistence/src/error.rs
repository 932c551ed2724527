#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no usable state directory on this platform")]
    NoStateDir,
    #[error("invalid artifact name: {0}")]
    InvalidName(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub mod jar;
pub mod net;

// Re-exports for convenience
pub use jar::{JarError, SignedJar};
pub use net::{default_http_client, DownloadOutcome, Downloader, HttpDownloader, NetError, RequestOptions};

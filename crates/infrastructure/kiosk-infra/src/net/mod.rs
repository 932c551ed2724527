use camino::Utf8Path;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use kiosk_core::repo::Authentication;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, RANGE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("Request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server responded with status {0}")]
    Status(u16),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-request knobs the caller controls: freshness validators and
/// credentials. All absent by default.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Epoch milliseconds of the last known publication, sent as an
    /// `If-Modified-Since` HTTP date.
    pub if_modified_since: Option<i64>,
    /// Entity tag from the previous fetch, sent as `If-None-Match`.
    pub entity_tag: Option<String>,
    pub authentication: Option<Authentication>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Fresh bytes landed at the target path.
    Fetched { entity_tag: Option<String> },
    /// The server reported nothing changed since the sent validators.
    NotModified,
}

#[async_trait::async_trait]
pub trait Downloader: Send + Sync {
    /// Streams `url` into `target`, committing the file only once the body
    /// is fully written. A 304 leaves the target untouched. A partial file
    /// left by an interrupted run is picked up with a byte-range request.
    async fn download_to_file(
        &self,
        url: &str,
        target: &Utf8Path,
        options: &RequestOptions,
    ) -> Result<DownloadOutcome, NetError>;
}

pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Downloader for HttpDownloader {
    async fn download_to_file(
        &self,
        url: &str,
        target: &Utf8Path,
        options: &RequestOptions,
    ) -> Result<DownloadOutcome, NetError> {
        let tmp = target.with_extension("part");
        let resume_from = match tokio::fs::metadata(tmp.as_std_path()).await {
            Ok(meta) if meta.len() > 0 => Some(meta.len()),
            _ => None,
        };

        let mut request = self.client.get(url);
        if let Some(date) = options.if_modified_since.and_then(http_date) {
            request = request.header(IF_MODIFIED_SINCE, date);
        }
        if let Some(tag) = &options.entity_tag {
            request = request.header(IF_NONE_MATCH, tag.as_str());
        }
        if let Some(offset) = resume_from {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        if let Some(auth) = &options.authentication {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("{url} not modified");
            return Ok(DownloadOutcome::NotModified);
        }
        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            // The leftover no longer matches what the server offers.
            let _ = tokio::fs::remove_file(tmp.as_std_path()).await;
            return Err(NetError::Status(response.status().as_u16()));
        }
        if !response.status().is_success() {
            return Err(NetError::Status(response.status().as_u16()));
        }
        // Append only when the server honored the range; a plain 200 means
        // it sent the whole body and the leftover is dead weight.
        let append = match (response.status(), resume_from) {
            (StatusCode::PARTIAL_CONTENT, Some(offset)) => {
                debug!("Resuming {url} from byte {offset}");
                true
            }
            _ => false,
        };

        let entity_tag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent.as_std_path()).await?;
        }
        if let Err(err) = stream_body(response, &tmp, append).await {
            let _ = tokio::fs::remove_file(tmp.as_std_path()).await;
            return Err(err);
        }
        tokio::fs::rename(tmp.as_std_path(), target.as_std_path()).await?;
        debug!("Fetched {url} -> {target}");

        Ok(DownloadOutcome::Fetched { entity_tag })
    }
}

async fn stream_body(
    response: reqwest::Response,
    tmp: &Utf8Path,
    append: bool,
) -> Result<(), NetError> {
    let mut file = if append {
        OpenOptions::new().append(true).open(tmp.as_std_path()).await?
    } else {
        File::create(tmp.as_std_path()).await?
    };
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Formats epoch milliseconds as an RFC 7231 HTTP date. Out-of-range and
/// non-positive values yield nothing so they never become a validator.
pub fn http_date(millis: i64) -> Option<String> {
    if millis <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|date| date.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

/// Shared client used by every command: rustls and a connect timeout, no
/// request timeout since index downloads may legitimately run long.
pub fn default_http_client() -> Result<Client, NetError> {
    Client::builder()
        .user_agent(concat!("kiosk/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(NetError::from)
}

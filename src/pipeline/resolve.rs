//! Source resolution: turn one reference string into a local file.
//!
//! A reference that names an existing file is used in place, with no copy and
//! no temp file. Anything else must be an HTTP(S) URL; its body is streamed
//! into a tracked temp file whose extension comes from the URL path or, when
//! the path has none, from the response `Content-Type`. The extension is what
//! the classifier later reads, so it has to survive onto disk.
//!
//! Fetches are gated by the resolver's own semaphore, independent of the
//! conversion pool in [`super::dispatch`].

use crate::error::ItemError;
use crate::pipeline::classify::Kind;
use crate::pipeline::janitor::{CreatedBy, Janitor};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Where a job's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// An existing file on this machine, used in place.
    Local,
    /// Downloaded into a temp file owned by the batch janitor.
    Remote,
}

/// A batch element after resolution.
#[derive(Debug, Clone)]
pub struct Job {
    pub reference: String,
    pub path: PathBuf,
    pub index: usize,
    pub origin: Origin,
    pub kind: Kind,
}

/// Resolves references with at most `workers` network fetches in flight.
#[derive(Debug, Clone)]
pub struct Resolver {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl Resolver {
    /// Build a resolver whose HTTP client enforces `timeout` per request.
    pub fn new(workers: usize, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        })
    }

    /// Resolve `reference` (batch position `index`) into a [`Job`].
    ///
    /// The returned job's `kind` is classified from the local file name; the
    /// caller decides what to do with [`Kind::Unknown`].
    pub async fn resolve(
        &self,
        reference: &str,
        index: usize,
        janitor: &Janitor,
    ) -> Result<Job, ItemError> {
        if let Some(path) = local_path(reference).await {
            debug!(index, reference, "Resolved local file");
            let kind = Kind::from_name(&file_name(&path));
            return Ok(Job {
                reference: reference.to_string(),
                path,
                index,
                origin: Origin::Local,
                kind,
            });
        }

        let url = parse_remote(reference)?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ItemError::Fetch {
                url: reference.to_string(),
                reason: e.to_string(),
            })?;

        let path = self.download(&url, reference, janitor).await?;
        let kind = Kind::from_name(&file_name(&path));
        info!(index, reference, path = %path.display(), %kind, "Downloaded");

        Ok(Job {
            reference: reference.to_string(),
            path,
            index,
            origin: Origin::Remote,
            kind,
        })
    }

    async fn download(
        &self,
        url: &Url,
        reference: &str,
        janitor: &Janitor,
    ) -> Result<PathBuf, ItemError> {
        let secs = self.timeout.as_secs();
        let fetch_err = |e: reqwest::Error| {
            if e.is_timeout() {
                ItemError::FetchTimeout {
                    url: reference.to_string(),
                    secs,
                }
            } else {
                ItemError::Fetch {
                    url: reference.to_string(),
                    reason: e.to_string(),
                }
            }
        };
        let io_err = |e: std::io::Error| ItemError::Fetch {
            url: reference.to_string(),
            reason: format!("Failed to write temp file: {e}"),
        };

        let mut response = self.client.get(url.clone()).send().await.map_err(fetch_err)?;

        if !response.status().is_success() {
            return Err(ItemError::Fetch {
                url: reference.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let ext = url_extension(url).unwrap_or_else(|| {
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            extension_for_content_type(content_type)
        });

        let path = janitor.create(&ext, CreatedBy::Fetch).map_err(io_err)?;
        let mut file = tokio::fs::File::create(&path).await.map_err(io_err)?;

        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await.map_err(fetch_err)? {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len();
        }
        file.flush().await.map_err(io_err)?;

        debug!(reference, bytes = written, "Wrote response body");
        Ok(path)
    }
}

/// An existing regular file named by `reference`, either as a plain path or a `file://` URL.
async fn local_path(reference: &str) -> Option<PathBuf> {
    let candidate = if reference.starts_with("file://") {
        Url::parse(reference).ok()?.to_file_path().ok()?
    } else {
        PathBuf::from(reference)
    };
    match tokio::fs::metadata(&candidate).await {
        Ok(meta) if meta.is_file() => Some(candidate),
        _ => None,
    }
}

fn parse_remote(reference: &str) -> Result<Url, ItemError> {
    let invalid = || ItemError::InvalidReference {
        reference: reference.to_string(),
    };
    let url = Url::parse(reference).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(invalid()),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Extension of the last URL path segment, if it has one.
pub fn url_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let ext = Path::new(last).extension()?.to_str()?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Pick a file extension for a response `Content-Type`.
///
/// Prefers a candidate the classifier recognises (so `image/jpeg` yields
/// `jpg`-family rather than some obscure alias), then any candidate, then `tmp`.
pub fn extension_for_content_type(content_type: &str) -> String {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let candidates = mime_guess::get_mime_extensions_str(&essence).unwrap_or(&[]);
    candidates
        .iter()
        .find(|ext| Kind::from_name(&format!("x.{ext}")).is_supported())
        .or_else(|| candidates.first())
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| "tmp".to_string())
}

//! Download a resolved PDF URL into a scoped temporary directory.
//!
//! The body is streamed chunk by chunk into `<tempdir>/paper.pdf`. The
//! returned [`DownloadedPdf`] owns the [`TempDir`], so the download is removed
//! when it is dropped, whichever way the record's processing ends.

use crate::error::RecordError;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A PDF on local disk, valid for as long as this value lives.
#[derive(Debug)]
pub struct DownloadedPdf {
    path: PathBuf,
    bytes: u64,
    _temp_dir: TempDir,
}

impl DownloadedPdf {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the downloaded body.
    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }
}

/// Reusable HTTP client with the run's timeout applied.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl Fetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, RecordError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("pubfig/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RecordError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    /// GET `url` and stream the body to a fresh temporary file.
    ///
    /// # Errors
    /// * [`RecordError::DownloadTimeout`] when the configured timeout elapses.
    /// * [`RecordError::DownloadFailed`] on transport errors or a non-2xx status.
    /// * [`RecordError::NotAPdf`] when the body does not start with `%PDF`.
    pub async fn fetch(&self, url: &str) -> Result<DownloadedPdf, RecordError> {
        info!("Downloading from: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        if !response.status().is_success() {
            return Err(RecordError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let temp_dir =
            TempDir::new().map_err(|e| RecordError::Internal(format!("temp dir: {e}")))?;
        let path = temp_dir.path().join("paper.pdf");
        let write_err = |e: std::io::Error| RecordError::Internal(format!("temp file write: {e}"));

        let mut file = tokio::fs::File::create(&path).await.map_err(write_err)?;
        let mut head: Vec<u8> = Vec::with_capacity(PDF_MAGIC.len());
        let mut bytes: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.transport_error(url, e))?;
            if head.len() < PDF_MAGIC.len() {
                let take = (PDF_MAGIC.len() - head.len()).min(chunk.len());
                head.extend_from_slice(&chunk[..take]);
            }
            file.write_all(&chunk).await.map_err(write_err)?;
            bytes += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;

        if head.as_slice() != PDF_MAGIC {
            return Err(RecordError::NotAPdf {
                url: url.to_string(),
                magic: head,
            });
        }

        debug!("Downloaded {} bytes to {}", bytes, path.display());
        Ok(DownloadedPdf {
            path,
            bytes,
            _temp_dir: temp_dir,
        })
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> RecordError {
        if e.is_timeout() {
            RecordError::DownloadTimeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            RecordError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

//! Staging attachment bytes into a workspace.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::InputRef;
use crate::utils::fs::io_error;
use crate::{Error, Result};

/// Copies an attachment's bytes to a local path.
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Write the attachment to `dest`, refusing anything over `max_bytes`.
    ///
    /// Returns the number of bytes written.
    async fn fetch(&self, input: &InputRef, dest: &Path, max_bytes: u64) -> Result<u64>;
}

/// `http(s)` locations are streamed with reqwest; anything else is treated as
/// a local file path and copied.
pub struct DefaultFetcher {
    client: reqwest::Client,
}

impl DefaultFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_http(&self, url: &str, dest: &Path, max_bytes: u64) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::transfer(format!("failed to download attachment: {}", e)))?;

        if let Some(len) = response.content_length()
            && len > max_bytes
        {
            return Err(Error::InputTooLarge {
                size: len,
                limit: max_bytes,
            });
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| io_error("creating staged file", dest, e))?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk: Bytes =
                chunk.map_err(|e| Error::transfer(format!("attachment stream failed: {}", e)))?;
            written += chunk.len() as u64;
            // The declared size can lie; the cap holds regardless.
            if written > max_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(Error::InputTooLarge {
                    size: written,
                    limit: max_bytes,
                });
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| io_error("writing staged file", dest, e))?;
        }

        file.flush()
            .await
            .map_err(|e| io_error("writing staged file", dest, e))?;
        Ok(written)
    }

    async fn fetch_local(&self, src: &Path, dest: &Path, max_bytes: u64) -> Result<u64> {
        let meta = tokio::fs::metadata(src)
            .await
            .map_err(|e| Error::transfer(format!("cannot read {}: {}", src.display(), e)))?;
        if meta.len() > max_bytes {
            return Err(Error::InputTooLarge {
                size: meta.len(),
                limit: max_bytes,
            });
        }
        tokio::fs::copy(src, dest)
            .await
            .map_err(|e| io_error("copying attachment", dest, e))
    }
}

#[async_trait]
impl AttachmentFetcher for DefaultFetcher {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn fetch(&self, input: &InputRef, dest: &Path, max_bytes: u64) -> Result<u64> {
        let written = if is_http(&input.location) {
            self.fetch_http(&input.location, dest, max_bytes).await?
        } else {
            self.fetch_local(Path::new(&input.location), dest, max_bytes)
                .await?
        };
        debug!(file = %input.file_name, bytes = written, dest = %dest.display(), "Staged input");
        Ok(written)
    }
}

fn is_http(location: &str) -> bool {
    let lower = location.get(..8).unwrap_or(location).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

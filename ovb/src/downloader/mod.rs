//! URL-sourced input via an external downloader.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use process_utils::{run_captured, tokio_command};
use tracing::{debug, error, info};
use url::Url;

use crate::config::AppConfig;
use crate::engine::process_failure;
use crate::{Error, Result};

/// Best stream at or below 480p, preferring separate video + audio.
pub const FORMAT_SELECTOR: &str = "bestvideo[height<=480]+bestaudio/best[height<=480]";

const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

#[async_trait]
pub trait ExternalDownloader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Download `url` into the empty directory `target_dir`.
    ///
    /// Returns the single file produced.
    async fn download(&self, url: &Url, target_dir: &Path) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub ytdlp_path: String,
    pub timeout: Option<Duration>,
    pub stderr_limit: usize,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            timeout: Some(Duration::from_secs(300)),
            stderr_limit: 1500,
        }
    }
}

impl From<&AppConfig> for YtDlpConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            ytdlp_path: config.ytdlp_path.clone(),
            timeout: config.engine_timeout(),
            stderr_limit: config.stderr_display_limit,
        }
    }
}

pub struct YtDlpDownloader {
    config: YtDlpConfig,
}

impl YtDlpDownloader {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    fn build_args(url: &Url, target_dir: &Path) -> Vec<String> {
        vec![
            "-f".to_string(),
            FORMAT_SELECTOR.to_string(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--restrict-filenames".to_string(),
            "-o".to_string(),
            target_dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned(),
            "--".to_string(),
            url.as_str().to_string(),
        ]
    }
}

#[async_trait]
impl ExternalDownloader for YtDlpDownloader {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn download(&self, url: &Url, target_dir: &Path) -> Result<PathBuf> {
        let args = Self::build_args(url, target_dir);
        debug!(args = ?args, "Running yt-dlp");

        let mut cmd = tokio_command(&self.config.ytdlp_path);
        cmd.args(&args);

        let output = run_captured(&mut cmd, self.config.timeout)
            .await
            .map_err(|e| process_failure("yt-dlp", e))?;

        if !output.success() {
            let stderr = output.stderr_tail(self.config.stderr_limit);
            error!(code = output.code(), stderr = %stderr, "yt-dlp failed");
            return Err(Error::engine(
                format!("yt-dlp failed with exit code: {}", output.code()),
                stderr,
            ));
        }

        let file = single_produced_file(target_dir).await?;
        info!(url = %url, file = %file.display(), elapsed = ?output.elapsed, "Download finished");
        Ok(file)
    }
}

/// The one regular file in `dir`. Zero or several files is an error.
pub async fn single_produced_file(dir: &Path) -> Result<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Error::io_path("listing download directory", dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_path("listing download directory", dir, e))?
    {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file {
            files.push(entry.path());
        }
    }

    match files.len() {
        1 => Ok(files.remove(0)),
        0 => Err(Error::engine("download produced no file", "")),
        n => Err(Error::engine(
            format!("download produced {} files, expected exactly one", n),
            "",
        )),
    }
}

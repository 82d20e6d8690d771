//! ffmpeg / ffprobe backed engine.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::{ProcessError, run_captured, tokio_command};
use serde::Deserialize;
use tracing::{debug, error, info};

use super::{EngineInvocation, EngineRun, MediaEngine, MediaProbe};
use crate::config::AppConfig;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// `None` lets a run take as long as it needs.
    pub timeout: Option<Duration>,
    /// Characters of stderr kept for display.
    pub stderr_limit: usize,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            timeout: Some(Duration::from_secs(300)),
            stderr_limit: 1500,
        }
    }
}

impl From<&AppConfig> for FfmpegConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            timeout: config.engine_timeout(),
            stderr_limit: config.stderr_display_limit,
        }
    }
}

pub struct FfmpegEngine {
    config: FfmpegConfig,
}

impl FfmpegEngine {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new(FfmpegConfig::default())
    }
}

/// Map a process failure into an engine error for `tool`.
pub(crate) fn process_failure(tool: &str, err: ProcessError) -> Error {
    match err {
        ProcessError::Spawn { source, .. } => {
            Error::engine(format!("failed to spawn {}: {}", tool, source), "")
        }
        ProcessError::Wait { source, .. } => {
            Error::engine(format!("failed to wait for {}: {}", tool, source), "")
        }
        ProcessError::TimedOut { after, .. } => Error::engine(
            format!("{} timed out after {}s and was killed", tool, after.as_secs()),
            "",
        ),
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn run(&self, invocation: &EngineInvocation) -> Result<EngineRun> {
        let args = invocation.to_args();
        debug!(args = ?args, "Running ffmpeg");

        let mut cmd = tokio_command(&self.config.ffmpeg_path);
        cmd.args(&args).env("LC_ALL", "C");

        let output = run_captured(&mut cmd, self.config.timeout)
            .await
            .map_err(|e| process_failure("ffmpeg", e))?;

        if !output.success() {
            let stderr = output.stderr_tail(self.config.stderr_limit);
            error!(code = output.code(), stderr = %stderr, "ffmpeg failed");
            return Err(Error::engine(
                format!("ffmpeg failed with exit code: {}", output.code()),
                stderr,
            ));
        }

        info!(
            output = %invocation.output.display(),
            elapsed = ?output.elapsed,
            "ffmpeg finished"
        );
        Ok(EngineRun {
            elapsed: output.elapsed,
        })
    }

    async fn probe(&self, path: &Path) -> Result<MediaProbe> {
        let mut cmd = tokio_command(&self.config.ffprobe_path);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration:stream=codec_type",
            "-of",
            "json",
        ])
        .arg(path)
        .env("LC_ALL", "C");

        let output = run_captured(&mut cmd, self.config.timeout)
            .await
            .map_err(|e| process_failure("ffprobe", e))?;

        if !output.success() {
            return Err(Error::engine(
                format!("ffprobe failed with exit code: {}", output.code()),
                output.stderr_tail(self.config.stderr_limit),
            ));
        }

        let probe = parse_probe(&output.stdout)?;
        debug!(path = %path.display(), ?probe, "Probed media");
        Ok(probe)
    }
}

#[derive(Deserialize)]
struct ProbeDoc {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse ffprobe's `-of json` output.
pub fn parse_probe(raw: &[u8]) -> Result<MediaProbe> {
    let doc: ProbeDoc = serde_json::from_slice(raw)?;

    let duration = doc
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| Error::validation("could not determine media duration"))?;

    let has = |kind: &str| {
        doc.streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some(kind))
    };

    Ok(MediaProbe {
        duration,
        has_video: has("video"),
        has_audio: has("audio"),
    })
}

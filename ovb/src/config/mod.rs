//! Runtime configuration.
//!
//! Configuration is loaded once at startup from an optional JSON file, then
//! `OVB_*` environment variables are applied on top, then the result is
//! validated. The resulting [`AppConfig`] is passed into each component;
//! nothing reads it from global state.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Which requester identity a cooldown bucket is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CooldownScope {
    Channel,
    User,
}

impl CooldownScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::User => "user",
        }
    }
}

impl FromStr for CooldownScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "channel" => Ok(Self::Channel),
            "user" => Ok(Self::User),
            other => Err(Error::config(format!("unknown cooldown scope '{}'", other))),
        }
    }
}

impl std::fmt::Display for CooldownScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Canned success lines; one is picked at random per reply.
    #[serde(default = "default_messages")]
    pub messages: Vec<String>,
    /// Suffix appended to every success reply.
    #[serde(default = "default_signature")]
    pub signature: String,
    /// Cap on both input attachments and produced artifacts.
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_cooldown_scope")]
    pub cooldown_scope: CooldownScope,
    /// How many recent messages the resolver scans.
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
    /// Root under which per-job directories are created.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Engine or downloader processes allowed to run at once.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Kill engine and downloader processes after this long. 0 disables.
    #[serde(default = "default_engine_timeout_secs")]
    pub engine_timeout_secs: u64,
    /// Timeout for attachment downloads over HTTP. 0 disables.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Characters of engine stderr shown to the requester.
    #[serde(default = "default_stderr_display_limit")]
    pub stderr_display_limit: usize,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,
    /// Directory for rotated log files. Console only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Fixed seed for segment planning. Fresh entropy per job when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_messages() -> Vec<String> {
    [
        "Here you go!",
        "Fresh out of the oven.",
        "Done. You're welcome.",
        "Processed with care.",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_signature() -> String {
    "[bedrock]".to_string()
}

fn default_max_file_size_mb() -> u64 {
    25
}

fn default_cooldown_secs() -> u64 {
    5
}

fn default_cooldown_scope() -> CooldownScope {
    CooldownScope::Channel
}

fn default_history_depth() -> usize {
    10
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_engine_timeout_secs() -> u64 {
    300
}

fn default_http_timeout_secs() -> u64 {
    120
}

fn default_stderr_display_limit() -> usize {
    1500
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            messages: default_messages(),
            signature: default_signature(),
            max_file_size_mb: default_max_file_size_mb(),
            cooldown_secs: default_cooldown_secs(),
            cooldown_scope: default_cooldown_scope(),
            history_depth: default_history_depth(),
            work_dir: default_work_dir(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            engine_timeout_secs: default_engine_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            stderr_display_limit: default_stderr_display_limit(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            ytdlp_path: default_ytdlp_path(),
            log_dir: None,
            seed: None,
        }
    }
}

impl AppConfig {
    /// Load from `path` (or defaults), apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::io_path("reading config file", path, e))?;
        let config = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Apply `OVB_*` overrides using `lookup` to read variables.
    ///
    /// `FFMPEG_PATH` is honoured when `OVB_FFMPEG_PATH` is not set.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OVB_SIGNATURE") {
            self.signature = v;
        }
        if let Some(v) = lookup("OVB_MAX_FILE_SIZE_MB") {
            self.max_file_size_mb = parse_env("OVB_MAX_FILE_SIZE_MB", &v)?;
        }
        if let Some(v) = lookup("OVB_COOLDOWN_SECS") {
            self.cooldown_secs = parse_env("OVB_COOLDOWN_SECS", &v)?;
        }
        if let Some(v) = lookup("OVB_COOLDOWN_SCOPE") {
            self.cooldown_scope = v.parse()?;
        }
        if let Some(v) = lookup("OVB_HISTORY_DEPTH") {
            self.history_depth = parse_env("OVB_HISTORY_DEPTH", &v)?;
        }
        if let Some(v) = lookup("OVB_WORK_DIR") {
            self.work_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("OVB_MAX_CONCURRENT_JOBS") {
            self.max_concurrent_jobs = parse_env("OVB_MAX_CONCURRENT_JOBS", &v)?;
        }
        if let Some(v) = lookup("OVB_ENGINE_TIMEOUT_SECS") {
            self.engine_timeout_secs = parse_env("OVB_ENGINE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("OVB_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = parse_env("OVB_HTTP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("OVB_FFMPEG_PATH").or_else(|| lookup("FFMPEG_PATH")) {
            self.ffmpeg_path = v;
        }
        if let Some(v) = lookup("OVB_FFPROBE_PATH") {
            self.ffprobe_path = v;
        }
        if let Some(v) = lookup("OVB_YTDLP_PATH") {
            self.ytdlp_path = v;
        }
        if let Some(v) = lookup("OVB_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("OVB_SEED") {
            self.seed = Some(parse_env("OVB_SEED", &v)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.messages.iter().all(|m| m.trim().is_empty()) {
            return Err(Error::config("messages must contain at least one line"));
        }
        if self.max_file_size_mb == 0 {
            return Err(Error::config("max_file_size_mb must be greater than 0"));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(Error::config("max_concurrent_jobs must be greater than 0"));
        }
        if !(1..=100).contains(&self.history_depth) {
            return Err(Error::config(format!(
                "history_depth must be between 1 and 100, got {}",
                self.history_depth
            )));
        }
        if self.stderr_display_limit == 0 {
            return Err(Error::config("stderr_display_limit must be greater than 0"));
        }
        if self.work_dir.as_os_str().is_empty() {
            return Err(Error::config("work_dir must not be empty"));
        }
        Ok(())
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn engine_timeout(&self) -> Option<Duration> {
        (self.engine_timeout_secs > 0).then(|| Duration::from_secs(self.engine_timeout_secs))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{} has an invalid value '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.max_file_size_bytes(), 25 * 1024 * 1024);
        assert_eq!(config.cooldown(), Duration::from_secs(5));
        assert_eq!(config.cooldown_scope, CooldownScope::Channel);
        assert_eq!(config.history_depth, 10);
        assert_eq!(config.signature, "[bedrock]");
        assert_eq!(config.engine_timeout(), Some(Duration::from_secs(300)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"messages": ["ok"], "cooldown_scope": "user", "seed": 9}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.messages, vec!["ok".to_string()]);
        assert_eq!(config.cooldown_scope, CooldownScope::User);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.max_file_size_mb, 25);
        assert_eq!(config.ffmpeg_path, "ffmpeg");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OVB_MAX_FILE_SIZE_MB", "8"),
            ("OVB_COOLDOWN_SCOPE", "User"),
            ("OVB_ENGINE_TIMEOUT_SECS", "0"),
            ("FFMPEG_PATH", "/opt/ffmpeg"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.max_file_size_mb, 8);
        assert_eq!(config.cooldown_scope, CooldownScope::User);
        assert_eq!(config.engine_timeout(), None);
        assert_eq!(config.ffmpeg_path, "/opt/ffmpeg");
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == "OVB_HISTORY_DEPTH").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects_empty_messages() {
        let config = AppConfig {
            messages: vec![" ".to_string()],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_concurrent_jobs": 4}"#).unwrap();
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.max_concurrent_jobs, 4);

        let missing = AppConfig::from_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, Error::IoPath { .. }));
    }
}

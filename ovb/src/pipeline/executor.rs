//! Running one job's transformation inside its workspace.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use super::gate::ConcurrencyGate;
use super::invocation::plan_invocation;
use crate::domain::{Job, JobState, Operation};
use crate::downloader::ExternalDownloader;
use crate::engine::MediaEngine;
use crate::transfer::AttachmentFetcher;
use crate::utils::fs::file_size;
use crate::workspace::Workspace;
use crate::{Error, Result};

/// A produced file that passed the size check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
}

pub struct JobExecutor {
    engine: Arc<dyn MediaEngine>,
    downloader: Arc<dyn ExternalDownloader>,
    fetcher: Arc<dyn AttachmentFetcher>,
    gate: ConcurrencyGate,
    max_bytes: u64,
    seed: Option<u64>,
}

impl JobExecutor {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        downloader: Arc<dyn ExternalDownloader>,
        fetcher: Arc<dyn AttachmentFetcher>,
        gate: ConcurrencyGate,
        max_bytes: u64,
    ) -> Self {
        Self {
            engine,
            downloader,
            fetcher,
            gate,
            max_bytes,
            seed: None,
        }
    }

    /// Fix the segment planner's seed. Every job then plans identically.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Stage, run and validate. Moves the job through `Staging` and `Running`.
    pub async fn execute(&self, job: &mut Job, workspace: &mut Workspace) -> Result<Artifact> {
        job.transition(JobState::Staging)?;

        if let Operation::Download { url } = &job.operation {
            let url = url.clone();
            let target = workspace.subdir("download").await?;
            job.transition(JobState::Running)?;

            let produced = {
                let _permit = self.gate.acquire().await?;
                info!(job_id = %job.id, downloader = self.downloader.name(), %url, "Downloading");
                self.downloader.download(&url, &target).await?
            };
            return self.check_output(&produced).await;
        }

        let input = job
            .input
            .as_ref()
            .map(|resolved| resolved.input.clone())
            .ok_or_else(|| {
                Error::Other(format!("{} job has no resolved input", job.operation.name()))
            })?;

        let staged = workspace.stage_path(&input.file_name);
        let written = self.fetcher.fetch(&input, &staged, self.max_bytes).await?;
        debug!(job_id = %job.id, fetcher = self.fetcher.name(), bytes = written, "Input staged");

        job.transition(JobState::Running)?;
        let output = workspace.output_path(job.operation.output_format(input.kind));

        {
            let _permit = self.gate.acquire().await?;

            let probe = if job.operation.is_compound() {
                Some(self.engine.probe(&staged).await?)
            } else {
                None
            };

            let mut rng = self.job_rng();
            let invocation = plan_invocation(
                &job.operation,
                &staged,
                input.kind,
                &output,
                probe.as_ref(),
                &mut rng,
            )?;

            info!(
                job_id = %job.id,
                engine = self.engine.name(),
                operation = job.operation.name(),
                "Running engine"
            );
            let run = self.engine.run(&invocation).await?;
            debug!(job_id = %job.id, elapsed = ?run.elapsed, "Engine finished");
        }

        self.check_output(&output).await
    }

    fn job_rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed.unwrap_or_else(rand::random))
    }

    /// Stat the produced file. Anything over the cap is deleted, never delivered.
    async fn check_output(&self, path: &Path) -> Result<Artifact> {
        let size = match file_size(path).await {
            Ok(size) => size,
            Err(e) => {
                return Err(Error::engine(
                    format!("no output file was produced: {}", e),
                    "",
                ));
            }
        };

        if size > self.max_bytes {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove oversize result");
            }
            return Err(Error::OversizeResult {
                size,
                limit: self.max_bytes,
            });
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());

        Ok(Artifact {
            path: path.to_path_buf(),
            file_name,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InputRef, Requester};
    use crate::engine::{EngineInvocation, EngineRun, MediaProbe};
    use crate::workspace::WorkspaceManager;
    use async_trait::async_trait;
    use std::time::Duration;
    use url::Url;

    struct NoEngine;

    #[async_trait]
    impl MediaEngine for NoEngine {
        fn name(&self) -> &'static str {
            "none"
        }

        async fn run(&self, _invocation: &EngineInvocation) -> Result<EngineRun> {
            Ok(EngineRun {
                elapsed: Duration::ZERO,
            })
        }

        async fn probe(&self, _path: &Path) -> Result<MediaProbe> {
            Err(Error::engine("no probe", ""))
        }
    }

    struct NoFetcher;

    #[async_trait]
    impl AttachmentFetcher for NoFetcher {
        fn name(&self) -> &'static str {
            "none"
        }

        async fn fetch(&self, _input: &InputRef, _dest: &Path, _max: u64) -> Result<u64> {
            Err(Error::transfer("unreachable"))
        }
    }

    /// Writes `size` bytes under a fixed name.
    struct FixedDownloader {
        size: usize,
    }

    #[async_trait]
    impl ExternalDownloader for FixedDownloader {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn download(&self, _url: &Url, target_dir: &Path) -> Result<PathBuf> {
            let path = target_dir.join("clip.mp4");
            tokio::fs::write(&path, vec![0u8; self.size]).await?;
            Ok(path)
        }
    }

    fn executor(download_size: usize, max_bytes: u64) -> JobExecutor {
        JobExecutor::new(
            Arc::new(NoEngine),
            Arc::new(FixedDownloader {
                size: download_size,
            }),
            Arc::new(NoFetcher),
            ConcurrencyGate::new(1),
            max_bytes,
        )
    }

    fn download_job() -> Job {
        Job::new(
            Operation::Download {
                url: Url::parse("https://example.com/v").unwrap(),
            },
            Requester::new("u", "c", "<@u>"),
        )
    }

    #[tokio::test]
    async fn test_download_produces_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ws = WorkspaceManager::new(tmp.path()).acquire().await.unwrap();
        let mut job = download_job();

        let artifact = executor(100, 1000).execute(&mut job, &mut ws).await.unwrap();

        assert_eq!(artifact.file_name, "clip.mp4");
        assert_eq!(artifact.size, 100);
        assert!(artifact.path.starts_with(ws.path()));
        assert_eq!(job.state(), JobState::Running);
    }

    #[tokio::test]
    async fn test_oversize_download_is_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ws = WorkspaceManager::new(tmp.path()).acquire().await.unwrap();
        let mut job = download_job();

        let err = executor(2000, 1000)
            .execute(&mut job, &mut ws)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::OversizeResult { size: 2000, limit: 1000 }));
        assert!(!ws.path().join("download").join("clip.mp4").exists());
    }

    #[tokio::test]
    async fn test_missing_output_is_engine_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = executor(0, 10)
            .check_output(&tmp.path().join("nothing.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Engine { .. }));
    }

    #[tokio::test]
    async fn test_job_without_input_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ws = WorkspaceManager::new(tmp.path()).acquire().await.unwrap();
        let mut job = Job::new(Operation::Reverse, Requester::new("u", "c", "<@u>"));

        let err = executor(0, 10).execute(&mut job, &mut ws).await.unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }
}

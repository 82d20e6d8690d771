//! The per-request job sequence.
//!
//! admit -> resolve -> size check -> acquire workspace -> execute -> deliver
//! -> release. Every error is recovered here and turned into exactly one
//! reply; nothing escapes to the caller except the [`JobReport`].

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dispatcher::{Delivery, ResultDispatcher};
use super::executor::{Artifact, JobExecutor};
use super::gate::ConcurrencyGate;
use super::rate_limiter::{Admission, RateLimiterConfig, RateLimiterManager};
use crate::config::AppConfig;
use crate::domain::{Job, JobId, JobRequest, JobState, Operation, Requester};
use crate::downloader::{ExternalDownloader, YtDlpConfig, YtDlpDownloader};
use crate::engine::{FfmpegConfig, FfmpegEngine, MediaEngine};
use crate::resolver::{ChatContext, InputResolver};
use crate::transfer::{AttachmentFetcher, DefaultFetcher};
use crate::utils::http::build_client;
use crate::workspace::{Workspace, WorkspaceManager};
use crate::{Error, Result};

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { file_name: String, size: u64 },
    Failed { kind: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: JobId,
    /// Normalized command name, as typed.
    pub operation: String,
    pub outcome: JobOutcome,
}

impl JobReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, JobOutcome::Completed { .. })
    }

    pub fn error_kind(&self) -> Option<&'static str> {
        match self.outcome {
            JobOutcome::Failed { kind, .. } => Some(kind),
            JobOutcome::Completed { .. } => None,
        }
    }
}

pub struct JobService {
    limiter: RateLimiterManager,
    resolver: InputResolver,
    workspaces: WorkspaceManager,
    executor: JobExecutor,
    dispatcher: ResultDispatcher,
    max_bytes: u64,
}

impl JobService {
    pub fn new(
        config: &AppConfig,
        engine: Arc<dyn MediaEngine>,
        downloader: Arc<dyn ExternalDownloader>,
        fetcher: Arc<dyn AttachmentFetcher>,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        let max_bytes = config.max_file_size_bytes();
        let executor = JobExecutor::new(
            engine,
            downloader,
            fetcher,
            ConcurrencyGate::new(config.max_concurrent_jobs),
            max_bytes,
        )
        .with_seed(config.seed);

        Self {
            limiter: RateLimiterManager::new(RateLimiterConfig::from(config)),
            resolver: InputResolver::new(config.history_depth),
            workspaces: WorkspaceManager::new(config.work_dir.clone()),
            executor,
            dispatcher: ResultDispatcher::new(delivery, config),
            max_bytes,
        }
    }

    /// Wire up the production engine, downloader and fetcher.
    pub fn from_config(config: &AppConfig, delivery: Arc<dyn Delivery>) -> Result<Self> {
        let client = build_client(config.http_timeout())?;
        Ok(Self::new(
            config,
            Arc::new(FfmpegEngine::new(FfmpegConfig::from(config))),
            Arc::new(YtDlpDownloader::new(YtDlpConfig::from(config))),
            Arc::new(DefaultFetcher::new(client)),
            delivery,
        ))
    }

    pub fn limiter(&self) -> &RateLimiterManager {
        &self.limiter
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        self.executor.gate()
    }

    /// Run the request to completion on its own task.
    pub fn submit(
        self: &Arc<Self>,
        request: JobRequest,
        ctx: Arc<dyn ChatContext>,
    ) -> JoinHandle<JobReport> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.handle(request, ctx.as_ref()).await })
    }

    pub async fn handle(&self, request: JobRequest, ctx: &dyn ChatContext) -> JobReport {
        let command = request.command.trim().to_ascii_lowercase();
        let parsed = Operation::parse(&command, &request.args);

        // Unknown commands never reach the cooldown; anything else counts
        // against it, even if its parameters turn out to be bad.
        if !matches!(parsed, Err(Error::UnknownCommand(_))) {
            self.limiter.prune_at(Instant::now());
            if let Admission::Throttled { retry_after } = self.limiter.admit(&request.requester) {
                return self
                    .reject(&request.requester, command, Error::Throttled { retry_after })
                    .await;
            }
        }

        let operation = match parsed {
            Ok(op) => op,
            Err(e) => return self.reject(&request.requester, command, e).await,
        };

        let mut job = Job::new(operation, request.requester);
        info!(
            job_id = %job.id,
            operation = job.operation.name(),
            user = %job.requester.user_id,
            channel = %job.requester.channel_id,
            "Job accepted"
        );

        let outcome = self.process(&mut job, ctx).await;
        info!(job_id = %job.id, state = %job.state(), "Job finished");

        JobReport {
            job_id: job.id,
            operation: command,
            outcome,
        }
    }

    async fn process(&self, job: &mut Job, ctx: &dyn ChatContext) -> JobOutcome {
        let mut workspace = match self.prepare(job, ctx).await {
            Ok(ws) => ws,
            Err(e) => return self.fail(job, e).await,
        };

        let outcome = match self.executor.execute(job, &mut workspace).await {
            Ok(artifact) => self.complete(job, &artifact).await,
            Err(e) => self.fail(job, e).await,
        };

        // Never changes the outcome; the manager already warned.
        if let Err(e) = self.workspaces.release(&workspace).await {
            debug!(job_id = %job.id, error = %e, "Workspace left behind");
        }
        outcome
    }

    /// Resolve and size-check the input, then take a workspace.
    ///
    /// Nothing touches the filesystem until the input is known to be usable.
    async fn prepare(&self, job: &mut Job, ctx: &dyn ChatContext) -> Result<Workspace> {
        if let Some(accepted) = job.operation.accepted_kinds() {
            let resolved = self.resolver.resolve(ctx, accepted).await?;
            if resolved.input.size > self.max_bytes {
                return Err(Error::InputTooLarge {
                    size: resolved.input.size,
                    limit: self.max_bytes,
                });
            }
            info!(
                job_id = %job.id,
                file = %resolved.input.file_name,
                source = %resolved.source,
                size = resolved.input.size,
                "Input resolved"
            );
            job.input = Some(resolved);
        }

        let workspace = self.workspaces.acquire().await?;
        job.workspace = Some(workspace.path().to_path_buf());
        Ok(workspace)
    }

    async fn complete(&self, job: &mut Job, artifact: &Artifact) -> JobOutcome {
        // An unreadable artifact is reported like any other job error.
        let reply = match self.dispatcher.prepare_artifact(&job.requester, artifact).await {
            Ok(reply) => reply,
            Err(e) => return self.fail(job, e).await,
        };

        if let Err(e) = job.transition(JobState::Delivering) {
            return self.mark_failed(job, e);
        }

        match self.dispatcher.send(reply).await {
            Ok(()) => {
                if let Err(e) = job.transition(JobState::Completed) {
                    return self.mark_failed(job, e);
                }
                info!(job_id = %job.id, file = %artifact.file_name, size = artifact.size, "Job completed");
                JobOutcome::Completed {
                    file_name: artifact.file_name.clone(),
                    size: artifact.size,
                }
            }
            // The transport already had its one chance; no second reply.
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Failed to deliver result");
                self.mark_failed(job, e)
            }
        }
    }

    async fn fail(&self, job: &mut Job, err: Error) -> JobOutcome {
        warn!(job_id = %job.id, kind = err.kind(), error = %err, "Job failed");

        let delivering = job.state() == JobState::Delivering
            || job.transition(JobState::Delivering).is_ok();
        if delivering
            && let Err(e) = self.dispatcher.deliver_error(&job.requester, &err).await
        {
            warn!(job_id = %job.id, error = %e, "Failed to deliver error reply");
        }
        self.mark_failed(job, err)
    }

    fn mark_failed(&self, job: &mut Job, err: Error) -> JobOutcome {
        if let Err(e) = job.transition(JobState::Failed) {
            warn!(job_id = %job.id, error = %e, "Unexpected state while failing job");
        }
        JobOutcome::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Reply to a request that never became a job.
    async fn reject(&self, requester: &Requester, command: String, err: Error) -> JobReport {
        debug!(command = %command, kind = err.kind(), error = %err, "Request rejected");
        if let Err(e) = self.dispatcher.deliver_error(requester, &err).await {
            warn!(error = %e, "Failed to deliver rejection");
        }
        JobReport {
            job_id: JobId::new(),
            operation: command,
            outcome: JobOutcome::Failed {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }
}

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{debug, info, warn};

use ovb::config::AppConfig;
use ovb::console::{ConsoleContext, DirectoryDelivery};
use ovb::domain::{JobRequest, Requester};
use ovb::logging::{LOG_RETENTION_DAYS, cleanup_old_logs, init_logging};
use ovb::pipeline::{JobOutcome, JobService};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Run one media command against local files.
#[derive(Debug, Parser)]
#[command(name = "ovb", version, about)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// File attached to the command message.
    #[arg(short, long, value_name = "FILE")]
    attach: Option<PathBuf>,

    /// File on the message being replied to.
    #[arg(short, long, value_name = "FILE")]
    reply: Option<PathBuf>,

    /// Files in channel history, newest first.
    #[arg(long, value_name = "FILE", action = clap::ArgAction::Append)]
    history: Vec<PathBuf>,

    /// Where result files are written.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    out: PathBuf,

    #[arg(long, default_value = "local")]
    user: String,

    #[arg(long, default_value = "console")]
    channel: String,

    /// Command name, e.g. `speed` or `ytp`.
    command: String,

    /// Command parameters, positional or key=value.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    let config = AppConfig::load(cli.config.as_deref())?;
    let _log_guard = init_logging(config.log_dir.as_deref())?;

    let log_cleanup = config.log_dir.clone().map(|dir| {
        tokio::spawn(async move {
            match cleanup_old_logs(&dir, LOG_RETENTION_DAYS).await {
                Ok(0) => {}
                Ok(n) => debug!(deleted = n, "Removed old log files"),
                Err(e) => warn!(error = %e, "Failed to clean up old logs"),
            }
        })
    });

    let ctx = ConsoleContext::from_files(cli.attach.as_deref(), cli.reply.as_deref(), &cli.history)?;
    let delivery = Arc::new(DirectoryDelivery::new(&cli.out));
    let service = JobService::from_config(&config, delivery)?;

    let requester = Requester::new(&cli.user, &cli.channel, format!("@{}", cli.user));
    let request = JobRequest::new(requester, cli.command, cli.args);

    let report = service.handle(request, &ctx).await;
    info!(job_id = %report.job_id, operation = %report.operation, outcome = ?report.outcome, "Done");

    // The runtime drops unfinished tasks on return.
    if let Some(handle) = log_cleanup
        && let Err(e) = handle.await
    {
        warn!(error = %e, "Log cleanup task failed");
    }

    Ok(match report.outcome {
        JobOutcome::Completed { .. } => ExitCode::SUCCESS,
        JobOutcome::Failed { .. } => ExitCode::FAILURE,
    })
}

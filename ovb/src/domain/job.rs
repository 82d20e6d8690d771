//! Job model and state machine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::input::ResolvedInput;
use super::operation::Operation;
use crate::Error;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JobState {
    /// Admitted and parsed, input not yet staged.
    #[default]
    Accepted,
    /// Input bytes are being brought into the workspace.
    Staging,
    /// The engine or downloader is running.
    Running,
    /// The result or error is being handed to the delivery channel.
    Delivering,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "ACCEPTED",
            Self::Staging => "STAGING",
            Self::Running => "RUNNING",
            Self::Delivering => "DELIVERING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Steps are strictly sequential; any non-terminal state may fail.
    pub fn can_transition_to(&self, target: JobState) -> bool {
        use JobState::*;

        match (self, target) {
            (Accepted, Staging) => true,
            (Staging, Running) => true,
            // Errors are delivered too.
            (Accepted | Staging | Running, Delivering) => true,
            (Delivering, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn transition_to(&self, target: JobState) -> Result<JobState, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who asked for the job, as identified by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: String,
    pub channel_id: String,
    /// How to address the user in a reply.
    pub mention: String,
}

impl Requester {
    pub fn new(
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        mention: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            mention: mention.into(),
        }
    }
}

/// A raw command as received from chat.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub requester: Requester,
    pub command: String,
    pub args: Vec<String>,
}

impl JobRequest {
    pub fn new(requester: Requester, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            requester,
            command: command.into(),
            args,
        }
    }
}

/// One accepted request, owned by the pipeline until it reaches a terminal state.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub operation: Operation,
    pub requester: Requester,
    pub input: Option<ResolvedInput>,
    pub workspace: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    state: JobState,
}

impl Job {
    pub fn new(operation: Operation, requester: Requester) -> Self {
        Self {
            id: JobId::new(),
            operation,
            requester,
            input: None,
            workspace: None,
            created_at: Utc::now(),
            state: JobState::Accepted,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn transition(&mut self, target: JobState) -> Result<(), Error> {
        self.state = self.state.transition_to(target)?;
        tracing::debug!(job_id = %self.id, state = %self.state, "Job state changed");
        Ok(())
    }
}

//! Formatting outcomes and handing them to the chat transport.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use rand::seq::IndexedRandom;
use tracing::{debug, error};

use super::executor::Artifact;
use crate::config::AppConfig;
use crate::domain::Requester;
use crate::{Error, Result};

const DEFAULT_MESSAGE: &str = "Done.";

/// A file attached to a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// What the transport posts back to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub attachment: Option<ReplyFile>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }
}

/// The outgoing side of the chat transport.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, reply: Reply) -> Result<()>;
}

pub struct ResultDispatcher {
    delivery: Arc<dyn Delivery>,
    messages: Vec<String>,
    signature: String,
    max_file_size_mb: u64,
}

impl ResultDispatcher {
    pub fn new(delivery: Arc<dyn Delivery>, config: &AppConfig) -> Self {
        Self {
            delivery,
            messages: config.messages.clone(),
            signature: config.signature.clone(),
            max_file_size_mb: config.max_file_size_mb,
        }
    }

    /// Read the artifact into a reply with a decorated status line.
    ///
    /// The reply owns the bytes, so the workspace may be released as soon as
    /// this returns.
    pub async fn prepare_artifact(
        &self,
        requester: &Requester,
        artifact: &Artifact,
    ) -> Result<Reply> {
        let bytes = tokio::fs::read(&artifact.path)
            .await
            .map_err(|e| Error::io_path("reading artifact", &artifact.path, e))?;

        Ok(Reply {
            text: self.success_text(requester),
            attachment: Some(ReplyFile {
                file_name: artifact.file_name.clone(),
                bytes: Bytes::from(bytes),
            }),
        })
    }

    /// Hand a prepared reply to the transport.
    pub async fn send(&self, reply: Reply) -> Result<()> {
        if let Some(file) = &reply.attachment {
            debug!(
                file = %file.file_name,
                size = file.bytes.len(),
                delivery = self.delivery.name(),
                "Delivering artifact"
            );
        }
        self.delivery.deliver(reply).await
    }

    pub async fn deliver_artifact(
        &self,
        requester: &Requester,
        artifact: &Artifact,
    ) -> Result<()> {
        let reply = self.prepare_artifact(requester, artifact).await?;
        self.send(reply).await
    }

    pub async fn deliver_error(&self, requester: &Requester, err: &Error) -> Result<()> {
        self.delivery
            .deliver(Reply::text(self.error_text(requester, err)))
            .await
    }

    pub fn success_text(&self, requester: &Requester) -> String {
        let message = self
            .messages
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_MESSAGE);
        format!("{} || {} {}", message, requester.mention, self.signature)
    }

    pub fn error_text(&self, requester: &Requester, err: &Error) -> String {
        let mention = &requester.mention;
        match err {
            Error::UnknownCommand(_) => "❌ **Error**: Command not found.".to_string(),
            Error::InputNotFound(reason) => {
                format!("❌ **Error**: {mention}, no valid file found! ({reason})")
            }
            Error::InputTooLarge { .. } => format!(
                "❌ **Error**: File size exceeds {} MB.",
                self.max_file_size_mb
            ),
            Error::Validation(detail) => format!("❌ **Error**: {mention}, {detail}"),
            Error::Engine { message, stderr } => {
                let shown = if stderr.trim().is_empty() {
                    message
                } else {
                    stderr
                };
                format!("❌ **Error**: Something went wrong. ```{}```", shown)
            }
            Error::OversizeResult { .. } => format!(
                "❌ **Error**: {mention}, the edited file exceeds the {} MB limit!",
                self.max_file_size_mb
            ),
            Error::Throttled { retry_after } => format!(
                "⏳ **Cooldown**: Please wait {:.1} seconds.",
                retry_after.as_secs_f64()
            ),
            Error::Workspace { .. } => {
                format!("❌ **Error**: {mention}, could not prepare a workspace for your request.")
            }
            other => {
                error!(error = %other, "Unexpected job error");
                format!(
                    "❌ **Error**: An error occurred while processing your request.\n\n**Details**:\n```{}```",
                    other
                )
            }
        }
    }
}

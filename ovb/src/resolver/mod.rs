//! Locating the input file a command refers to.
//!
//! Search order, first attachment wins:
//! 1. the message the command replied to,
//! 2. the command message itself,
//! 3. recent channel history, newest first.
//!
//! The winning candidate is then classified. A candidate of the wrong kind is
//! rejected outright; the search does not continue past it.

use async_trait::async_trait;
use media_types::{AcceptedKinds, MediaKind};
use tracing::{debug, warn};

use crate::domain::{Attachment, ChatMessage, InputRef, InputSource, ResolvedInput};
use crate::{Error, Result};

/// The chat surroundings of a command, provided by the transport.
#[async_trait]
pub trait ChatContext: Send + Sync {
    /// The message that carried the command.
    fn current(&self) -> &ChatMessage;

    /// The message the command replied to, if any.
    async fn referenced(&self) -> Result<Option<ChatMessage>>;

    /// Up to `limit` recent channel messages, newest first, excluding the
    /// command message.
    async fn history(&self, limit: usize) -> Result<Vec<ChatMessage>>;
}

#[derive(Debug, Clone)]
pub struct InputResolver {
    history_depth: usize,
}

impl InputResolver {
    pub fn new(history_depth: usize) -> Self {
        Self { history_depth }
    }

    pub async fn resolve(
        &self,
        ctx: &dyn ChatContext,
        accepted: AcceptedKinds,
    ) -> Result<ResolvedInput> {
        let (attachment, source) = self.find_candidate(ctx).await?;
        debug!(file = %attachment.file_name, %source, "Found input candidate");

        let kind = MediaKind::from_file_name(&attachment.file_name).ok_or_else(|| {
            Error::not_found(format!(
                "'{}' is not a supported media file",
                attachment.file_name
            ))
        })?;

        if !accepted.accepts(kind) {
            return Err(Error::not_found(format!(
                "expected {}, but '{}' is {} {}",
                accepted.describe(),
                attachment.file_name,
                article(kind),
                kind
            )));
        }

        Ok(ResolvedInput {
            input: InputRef {
                file_name: attachment.file_name,
                size: attachment.size,
                kind,
                location: attachment.location,
            },
            source,
        })
    }

    async fn find_candidate(&self, ctx: &dyn ChatContext) -> Result<(Attachment, InputSource)> {
        match ctx.referenced().await {
            Ok(Some(reply)) => {
                if let Some(att) = reply.first_attachment() {
                    return Ok((att.clone(), InputSource::Reply));
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to fetch referenced message, ignoring reply"),
        }

        if let Some(att) = ctx.current().first_attachment() {
            return Ok((att.clone(), InputSource::CurrentMessage));
        }

        let history = ctx
            .history(self.history_depth)
            .await
            .map_err(|e| Error::not_found(format!("could not read channel history: {}", e)))?;

        history
            .iter()
            .take(self.history_depth)
            .enumerate()
            .find_map(|(index, msg)| {
                msg.first_attachment()
                    .map(|att| (att.clone(), InputSource::History(index)))
            })
            .ok_or_else(|| Error::not_found("no attachment in reply, message or recent history"))
    }
}

fn article(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "an",
        MediaKind::Video => "a",
    }
}

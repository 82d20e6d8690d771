//! A local stand-in for the chat transport.
//!
//! Files given on the command line play the roles of the command message's
//! attachment, the replied-to message and channel history. Replies are
//! printed and their attachments written to a directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::domain::{Attachment, ChatMessage};
use crate::pipeline::{Delivery, Reply};
use crate::resolver::ChatContext;
use crate::utils::filename::staged_file_name;
use crate::utils::fs::{ensure_dir_all_with_op, io_error};
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct ConsoleContext {
    current: ChatMessage,
    reply: Option<ChatMessage>,
    /// Newest first.
    history: Vec<ChatMessage>,
}

impl ConsoleContext {
    pub fn new(current: ChatMessage, reply: Option<ChatMessage>, history: Vec<ChatMessage>) -> Self {
        Self {
            current,
            reply,
            history,
        }
    }

    /// Build the context from local files. `history` is given newest first.
    pub fn from_files(
        attach: Option<&Path>,
        reply: Option<&Path>,
        history: &[PathBuf],
    ) -> Result<Self> {
        let attached = attach.map(local_attachment).transpose()?;
        let current = ChatMessage::new("current", attached.into_iter().collect());

        let reply = reply
            .map(|path| local_attachment(path).map(|att| ChatMessage::new("reply", vec![att])))
            .transpose()?;

        let history = history
            .iter()
            .enumerate()
            .map(|(i, path)| {
                local_attachment(path).map(|att| ChatMessage::new(format!("history-{}", i), vec![att]))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(current, reply, history))
    }
}

fn local_attachment(path: &Path) -> Result<Attachment> {
    let meta = std::fs::metadata(path).map_err(|e| io_error("reading metadata of", path, e))?;
    if !meta.is_file() {
        return Err(Error::validation(format!("{} is not a file", path.display())));
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::validation(format!("{} has no file name", path.display())))?;
    let location = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    Ok(Attachment::new(
        file_name,
        meta.len(),
        location.to_string_lossy().into_owned(),
    ))
}

#[async_trait]
impl ChatContext for ConsoleContext {
    fn current(&self) -> &ChatMessage {
        &self.current
    }

    async fn referenced(&self) -> Result<Option<ChatMessage>> {
        Ok(self.reply.clone())
    }

    async fn history(&self, limit: usize) -> Result<Vec<ChatMessage>> {
        Ok(self.history.iter().take(limit).cloned().collect())
    }
}

/// Writes reply attachments into `out_dir` and prints the reply text.
#[derive(Debug, Clone)]
pub struct DirectoryDelivery {
    out_dir: PathBuf,
}

impl DirectoryDelivery {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

#[async_trait]
impl Delivery for DirectoryDelivery {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn deliver(&self, reply: Reply) -> Result<()> {
        if let Some(file) = &reply.attachment {
            ensure_dir_all_with_op("creating output directory", &self.out_dir).await?;
            let dest = self.out_dir.join(staged_file_name(&file.file_name));
            tokio::fs::write(&dest, &file.bytes)
                .await
                .map_err(|e| Error::Delivery(format!("writing {}: {}", dest.display(), e)))?;
            info!(path = %dest.display(), bytes = file.bytes.len(), "Wrote result");
        }
        println!("{}", reply.text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ReplyFile;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_from_files() {
        let tmp = tempfile::tempdir().unwrap();
        let clip = tmp.path().join("clip.mp4");
        let pic = tmp.path().join("pic.png");
        std::fs::write(&clip, vec![0u8; 42]).unwrap();
        std::fs::write(&pic, b"png").unwrap();

        let ctx = ConsoleContext::from_files(None, Some(&clip), &[pic.clone()]).unwrap();

        assert!(ctx.current().attachments.is_empty());
        let reply = ctx.referenced().await.unwrap().unwrap();
        assert_eq!(reply.attachments[0].file_name, "clip.mp4");
        assert_eq!(reply.attachments[0].size, 42);
        assert_eq!(ctx.history(0).await.unwrap().len(), 0);
        assert_eq!(ctx.history(5).await.unwrap()[0].attachments[0].file_name, "pic.png");
    }

    #[test]
    fn test_missing_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("gone.mp4");
        assert!(ConsoleContext::from_files(Some(&missing), None, &[]).is_err());
    }

    #[tokio::test]
    async fn test_directory_delivery_writes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let delivery = DirectoryDelivery::new(&out);

        delivery
            .deliver(Reply {
                text: "ok".to_string(),
                attachment: Some(ReplyFile {
                    file_name: "output_1.mp4".to_string(),
                    bytes: Bytes::from_static(b"abc"),
                }),
            })
            .await
            .unwrap();

        assert_eq!(std::fs::read(out.join("output_1.mp4")).unwrap(), b"abc");
    }
}

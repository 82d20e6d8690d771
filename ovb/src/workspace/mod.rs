//! Per-job scratch directories.
//!
//! All jobs share one root (`work_dir`). Each job gets its own
//! `job-<uuid>` directory inside it, created exclusively, and every file the
//! job touches lives there. Releasing a workspace deletes the whole tree.

use std::path::{Path, PathBuf};

use media_types::OutputFormat;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::utils::filename::staged_file_name;
use crate::utils::fs;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, uniquely named job directory.
    pub async fn acquire(&self) -> Result<Workspace> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::workspace("creating workspace root", &self.root, e))?;

        let id = Uuid::new_v4().simple().to_string();
        let path = self.root.join(format!("job-{}", id));

        // create_dir, not create_dir_all: an existing directory is an error,
        // so two jobs can never share one.
        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| Error::workspace("creating job directory", &path, e))?;

        debug!(workspace = %path.display(), "Acquired workspace");
        Ok(Workspace {
            path,
            owned: Vec::new(),
        })
    }

    /// Delete the workspace tree. Releasing twice is fine.
    pub async fn release(&self, workspace: &Workspace) -> Result<()> {
        match fs::remove_dir_all_if_exists(&workspace.path).await {
            Ok(true) => {
                debug!(
                    workspace = %workspace.path.display(),
                    files = workspace.owned.len(),
                    "Released workspace"
                );
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                warn!(workspace = %workspace.path.display(), error = %e, "Failed to release workspace");
                Err(Error::workspace("removing job directory", &workspace.path, e))
            }
        }
    }
}

/// One job's directory and the files it has handed out.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    owned: Vec<PathBuf>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owned_files(&self) -> &[PathBuf] {
        &self.owned
    }

    /// Path for staging an input named `file_name`, sanitized into this directory.
    pub fn stage_path(&mut self, file_name: &str) -> PathBuf {
        let path = self.path.join(format!("input_{}", staged_file_name(file_name)));
        self.owned.push(path.clone());
        path
    }

    /// Fresh, never reused output path.
    pub fn output_path(&mut self, format: OutputFormat) -> PathBuf {
        let name = format!("output_{}.{}", Uuid::new_v4().simple(), format.extension());
        let path = self.path.join(name);
        self.owned.push(path.clone());
        path
    }

    /// Create an empty subdirectory, for tools that choose their own file names.
    pub async fn subdir(&mut self, name: &str) -> Result<PathBuf> {
        let path = self.path.join(staged_file_name(name));
        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| Error::workspace("creating subdirectory", &path, e))?;
        self.owned.push(path.clone());
        Ok(path)
    }
}

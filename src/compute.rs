// src/compute.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::constants::RESULT_EXTENSION;
use crate::error::ComputeError;

/// The external compute step: payload in, durable result path out. A trait
/// so the worker pipeline can be exercised without the real tool installed.
#[async_trait]
pub trait SearchTool: Send + Sync {
    async fn run(&self, job_id: &str, payload: &str) -> Result<PathBuf, ComputeError>;
}

/// Runs `mmseqs easy-search` against a reference database inside a per-job
/// scratch directory. The scratch directory is removed whether the tool
/// succeeds or fails; only the result file leaves it.
pub struct MmseqsSearch {
    binary: PathBuf,
    db_path: PathBuf,
    workspace_dir: PathBuf,
    result_dir: PathBuf,
    timeout: Duration,
}

impl MmseqsSearch {
    pub fn new(
        binary: impl Into<PathBuf>,
        db_path: impl Into<PathBuf>,
        workspace_dir: impl Into<PathBuf>,
        result_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            db_path: db_path.into(),
            workspace_dir: workspace_dir.into(),
            result_dir: result_dir.into(),
            timeout,
        }
    }

    fn command(&self, query_file: &Path, result_file: &Path, tool_tmp: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("easy-search")
            .arg(query_file)
            .arg(&self.db_path)
            .arg(result_file)
            .arg(tool_tmp)
            // reap the child if the deadline cancels us mid-run
            .kill_on_drop(true);
        cmd
    }
}

/// The job id is part of filesystem paths; result lookups go through this
/// too, so nothing but hex-ish id characters ever reaches the filesystem.
pub fn is_safe_job_id(job_id: &str) -> bool {
    !job_id.is_empty() && job_id.chars().all(|c| c.is_ascii_alphanumeric())
}

pub fn result_path(result_dir: &Path, job_id: &str) -> PathBuf {
    result_dir.join(format!("{job_id}.{RESULT_EXTENSION}"))
}

#[async_trait]
impl SearchTool for MmseqsSearch {
    async fn run(&self, job_id: &str, payload: &str) -> Result<PathBuf, ComputeError> {
        tokio::fs::create_dir_all(&self.workspace_dir).await?;
        tokio::fs::create_dir_all(&self.result_dir).await?;

        // Dropped at the end of this scope on every path.
        let scratch = tempfile::Builder::new()
            .prefix(job_id)
            .tempdir_in(&self.workspace_dir)?;

        let query_file = scratch.path().join("input.fasta");
        tokio::fs::write(&query_file, payload).await?;

        let result_file = scratch.path().join(format!("{job_id}.{RESULT_EXTENSION}"));
        // created and populated by the tool itself
        let tool_tmp = scratch.path().join("tmp");

        let mut cmd = self.command(&query_file, &result_file, &tool_tmp);
        debug!(job_id, tool = %self.binary.display(), "invoking search tool");

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ComputeError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            return Err(ComputeError::ToolFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let final_path = result_path(&self.result_dir, job_id);
        move_file(&result_file, &final_path).await?;
        info!(job_id, result = %final_path.display(), "result saved");
        Ok(final_path)
    }
}

/// Rename with a copy fallback: the workspace and the result volume may sit
/// on different filesystems.
async fn move_file(from: &Path, to: &Path) -> Result<(), std::io::Error> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}

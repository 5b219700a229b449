use crate::config::CommitStyle;
use crate::error::SyncError;
use crate::types::{GitStep, PublishOutcome};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, instrument, warn};

/// Publishes the mirrored tree somewhere others can see it
#[async_trait]
pub trait RepositoryPublisher: Send + Sync {
    /// Stage, commit and push. `files` is how many dashboards the commit covers.
    async fn publish(&self, message: &str, files: usize) -> PublishOutcome;
}

/// Runs the git CLI inside `repo_root`. The process working directory is never changed.
pub struct GitPublisher {
    repo_root: PathBuf,
    timeout: Duration,
}

impl GitPublisher {
    pub fn new(repo_root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            repo_root: repo_root.into(),
            timeout,
        }
    }

    async fn run_git(
        &self,
        step: GitStep,
        args: &[&str],
        passthrough: bool,
    ) -> Result<ExitStatus, SyncError> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.repo_root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if passthrough {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let git_err = |message: String| SyncError::Git {
            step: step.as_str().to_string(),
            message,
        };

        let mut child = cmd
            .spawn()
            .map_err(|e| git_err(format!("failed to start git in {}: {e}", self.repo_root.display())))?;

        let waited = tokio::time::timeout(self.timeout, child.wait()).await;
        match waited {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => Err(git_err(e.to_string())),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("Could not kill timed out git {}: {}", step.as_str(), e);
                }
                Err(git_err(format!("timed out after {}s", self.timeout.as_secs())))
            }
        }
    }

    async fn run_checked(&self, step: GitStep, args: &[&str]) -> Result<(), SyncError> {
        let status = self.run_git(step, args, true).await?;
        if status.success() {
            Ok(())
        } else {
            Err(SyncError::Git {
                step: step.as_str().to_string(),
                message: format!("git exited with {status}"),
            })
        }
    }
}

fn failed(step: GitStep, err: SyncError) -> PublishOutcome {
    error!("Failed to {} in repository: {}", step.as_str(), err);
    PublishOutcome::Failed {
        step,
        message: err.to_string(),
    }
}

#[async_trait]
impl RepositoryPublisher for GitPublisher {
    #[instrument(skip(self, message), fields(repo = %self.repo_root.display()))]
    async fn publish(&self, message: &str, files: usize) -> PublishOutcome {
        if let Err(e) = self.run_checked(GitStep::Add, &["add", "."]).await {
            return failed(GitStep::Add, e);
        }

        // exit 0 means the index matches HEAD
        match self
            .run_git(GitStep::Diff, &["diff", "--cached", "--quiet"], false)
            .await
        {
            Ok(status) if status.success() => {
                info!("No staged changes, skipping commit and push");
                return PublishOutcome::NothingToCommit;
            }
            Ok(status) if status.code() == Some(1) => {}
            Ok(status) => {
                return failed(
                    GitStep::Diff,
                    SyncError::Git {
                        step: GitStep::Diff.as_str().to_string(),
                        message: format!("git exited with {status}"),
                    },
                );
            }
            Err(e) => return failed(GitStep::Diff, e),
        }

        if let Err(e) = self.run_checked(GitStep::Commit, &["commit", "-m", message]).await {
            return failed(GitStep::Commit, e);
        }
        if let Err(e) = self.run_checked(GitStep::Push, &["push"]).await {
            return failed(GitStep::Push, e);
        }

        info!("Successfully pushed to repository.");
        PublishOutcome::Pushed { files }
    }
}

/// The historical per-dashboard message: no separators between the fragments.
pub fn legacy_commit_message(title: &str, filename: &str) -> String {
    "Saved dashboard".to_string() + title + "to" + filename
}

pub fn readable_commit_message(title: &str, relative_path: &str) -> String {
    format!("Save dashboard \"{title}\" to {relative_path}")
}

/// Path of a written file relative to the repository root, `/`-separated
pub fn repo_relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// A saved dashboard as far as commit messages are concerned
#[derive(Debug, Clone)]
pub struct SavedEntry {
    pub title: String,
    pub path: PathBuf,
}

pub fn commit_message(style: CommitStyle, root: &Path, entry: &SavedEntry) -> String {
    match style {
        CommitStyle::Legacy => legacy_commit_message(&entry.title, &entry.path.to_string_lossy()),
        CommitStyle::Readable => readable_commit_message(&entry.title, &repo_relative(root, &entry.path)),
    }
}

/// One message for a whole run
pub fn batch_commit_message(style: CommitStyle, root: &Path, entries: &[SavedEntry]) -> String {
    match style {
        CommitStyle::Legacy => entries
            .iter()
            .map(|e| commit_message(CommitStyle::Legacy, root, e))
            .collect::<Vec<_>>()
            .join("\n"),
        CommitStyle::Readable => {
            let noun = if entries.len() == 1 { "dashboard" } else { "dashboards" };
            let mut message = format!("Sync {} Grafana {}\n", entries.len(), noun);
            for entry in entries {
                message.push_str(&format!("\n{} ({})", repo_relative(root, &entry.path), entry.title));
            }
            message
        }
    }
}

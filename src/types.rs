use crate::error::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// One entry of the Grafana search response.
///
/// Grafana omits `folderTitle` for dashboards in the root folder, so every
/// field falls back to an empty string instead of failing the whole listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DashboardSummary {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "folderTitle")]
    pub folder_title: String,
}

/// Raw body of `/api/dashboards/uid/<uid>`, persisted byte for byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardDocument(pub Vec<u8>);

impl DashboardDocument {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Where dashboards come from
#[async_trait::async_trait]
pub trait DashboardSource: Send + Sync {
    /// Every dashboard the search endpoint returns, in response order
    async fn list_dashboards(&self) -> Result<Vec<DashboardSummary>>;

    /// Full JSON model of one dashboard
    async fn fetch_dashboard(&self, uid: &str) -> Result<DashboardDocument>;
}

/// Step of the per-dashboard flow that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Fetch,
    CreateDir,
    Write,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Fetch => "fetch",
            FailureStage::CreateDir => "create_dir",
            FailureStage::Write => "write",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardStatus {
    Saved { path: PathBuf },
    Failed { stage: FailureStage, message: String },
}

#[derive(Debug, Clone)]
pub struct DashboardOutcome {
    pub summary: DashboardSummary,
    pub status: DashboardStatus,
}

impl DashboardOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self.status, DashboardStatus::Saved { .. })
    }
}

/// git step of a publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitStep {
    Add,
    Diff,
    Commit,
    Push,
}

impl GitStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            GitStep::Add => "add",
            GitStep::Diff => "diff",
            GitStep::Commit => "commit",
            GitStep::Push => "push",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Pushed { files: usize },
    NothingToCommit,
    Skipped,
    Failed { step: GitStep, message: String },
}

impl PublishOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PublishOutcome::Pushed { .. } => "pushed",
            PublishOutcome::NothingToCommit => "nothing_to_commit",
            PublishOutcome::Skipped => "skipped",
            PublishOutcome::Failed { .. } => "failed",
        }
    }
}

/// Result of a complete sync run
#[derive(Debug)]
pub struct SyncReport {
    pub listed: usize,
    pub selected: usize,
    pub outcomes: Vec<DashboardOutcome>,
    pub publishes: Vec<PublishOutcome>,
    pub duration_secs: f64,
}

impl SyncReport {
    pub fn saved(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_saved()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.saved()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DashboardOutcome> {
        self.outcomes.iter().filter(|o| !o.is_saved())
    }
}

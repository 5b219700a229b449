use crate::types::{DashboardDocument, DashboardSummary, FailureStage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Folder-mirrored tree of dashboard JSON files
#[derive(Debug, Clone)]
pub struct DashboardStore {
    root: PathBuf,
}

impl DashboardStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folder_dir(&self, folder_title: &str) -> PathBuf {
        self.root.join(underscore_spaces(folder_title))
    }

    /// `<root>/<folder>/<title>.json` with spaces turned into underscores.
    /// Nothing else is escaped, and equal names map to the same file.
    pub fn dashboard_path(&self, summary: &DashboardSummary) -> PathBuf {
        self.folder_dir(&summary.folder_title)
            .join(format!("{}.json", underscore_spaces(&summary.title)))
    }

    /// Write the document, replacing whatever was there.
    pub fn save(
        &self,
        summary: &DashboardSummary,
        document: &DashboardDocument,
    ) -> Result<PathBuf, (FailureStage, std::io::Error)> {
        let dir = self.folder_dir(&summary.folder_title);
        fs::create_dir_all(&dir).map_err(|e| (FailureStage::CreateDir, e))?;

        let path = self.dashboard_path(summary);
        fs::write(&path, document.as_bytes()).map_err(|e| (FailureStage::Write, e))?;
        debug!("Wrote {} bytes to {}", document.as_bytes().len(), path.display());
        Ok(path)
    }
}

fn underscore_spaces(name: &str) -> String {
    name.replace(' ', "_")
}

use crate::types::DashboardSummary;

/// Exact, case-sensitive folder allow-list
#[derive(Debug, Clone)]
pub struct FolderFilter {
    folders: Vec<String>,
}

impl FolderFilter {
    pub fn new(folders: Vec<String>) -> Self {
        Self { folders }
    }

    pub fn allows(&self, summary: &DashboardSummary) -> bool {
        self.folders.iter().any(|f| *f == summary.folder_title)
    }

    /// Keep allowed summaries in their original order
    pub fn select(&self, summaries: Vec<DashboardSummary>) -> Vec<DashboardSummary> {
        summaries.into_iter().filter(|s| self.allows(s)).collect()
    }
}

impl Default for FolderFilter {
    fn default() -> Self {
        Self::new(crate::constants::default_folders())
    }
}

use crate::config::{CommitStyle, PublishMode};
use crate::error::Result;
use crate::filter::FolderFilter;
use crate::publisher::{batch_commit_message, commit_message, RepositoryPublisher, SavedEntry};
use crate::storage::DashboardStore;
use crate::types::{
    DashboardOutcome, DashboardSource, DashboardStatus, DashboardSummary, FailureStage,
    PublishOutcome, SyncReport,
};
use metrics::{counter, histogram};
use tracing::{debug, error, info, instrument, warn};

/// Lists, filters, downloads, writes and publishes Grafana dashboards, one at a time.
pub struct SyncPipeline {
    source: Box<dyn DashboardSource>,
    store: DashboardStore,
    filter: FolderFilter,
    publisher: Option<Box<dyn RepositoryPublisher>>,
    mode: PublishMode,
    style: CommitStyle,
}

impl SyncPipeline {
    pub fn new(source: Box<dyn DashboardSource>, store: DashboardStore, filter: FolderFilter) -> Self {
        Self {
            source,
            store,
            filter,
            publisher: None,
            mode: PublishMode::default(),
            style: CommitStyle::default(),
        }
    }

    pub fn with_publisher(
        mut self,
        publisher: Box<dyn RepositoryPublisher>,
        mode: PublishMode,
        style: CommitStyle,
    ) -> Self {
        self.publisher = Some(publisher);
        self.mode = mode;
        self.style = style;
        self
    }

    /// Fetch one dashboard and write it to the mirror
    #[instrument(skip(self, summary), fields(uid = %summary.uid, title = %summary.title))]
    async fn sync_dashboard(&self, summary: &DashboardSummary) -> DashboardOutcome {
        let failed = |stage: FailureStage, message: String| {
            counter!("dashboard_sync_dashboard_failures_total", "stage" => stage.as_str()).increment(1);
            DashboardOutcome {
                summary: summary.clone(),
                status: DashboardStatus::Failed { stage, message },
            }
        };

        let document = match self.source.fetch_dashboard(&summary.uid).await {
            Ok(document) => document,
            Err(e) => {
                error!("Error fetching dashboard {}: {}", summary.title, e);
                return failed(FailureStage::Fetch, e.to_string());
            }
        };

        match self.store.save(summary, &document) {
            Ok(path) => {
                info!("Saved dashboard {} to {}", summary.title, path.display());
                counter!("dashboard_sync_dashboards_saved_total", "folder" => summary.folder_title.clone())
                    .increment(1);
                DashboardOutcome {
                    summary: summary.clone(),
                    status: DashboardStatus::Saved { path },
                }
            }
            Err((stage, e)) => {
                match stage {
                    FailureStage::CreateDir => error!(
                        "Error creating directory for dashboard folder {}: {}",
                        summary.folder_title, e
                    ),
                    _ => error!("Error writing JSON to file for dashboard {}: {}", summary.title, e),
                }
                failed(stage, e.to_string())
            }
        }
    }

    async fn publish(&self, message: &str, files: usize) -> PublishOutcome {
        let outcome = match &self.publisher {
            Some(publisher) => publisher.publish(message, files).await,
            None => PublishOutcome::Skipped,
        };
        counter!("dashboard_sync_publish_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    /// Run a complete sync.
    ///
    /// Only a failed listing is returned as an error. Failures of individual
    /// dashboards and of publishing are recorded in the report.
    #[instrument(skip(self), fields(root = %self.store.root().display()))]
    pub async fn run(&self) -> Result<SyncReport> {
        counter!("dashboard_sync_runs_total").increment(1);
        let started = std::time::Instant::now();

        info!("📡 Listing dashboards...");
        let summaries = self.source.list_dashboards().await?;
        let listed = summaries.len();
        counter!("dashboard_sync_dashboards_listed_total").increment(listed as u64);

        let selected = self.filter.select(summaries);
        debug!("{} dashboards outside the folder allow-list", listed - selected.len());
        info!("✅ {} of {} dashboards selected", selected.len(), listed);

        let mut outcomes = Vec::with_capacity(selected.len());
        let mut publishes = Vec::new();
        let mut saved = Vec::new();

        for summary in &selected {
            let outcome = self.sync_dashboard(summary).await;
            if let DashboardStatus::Saved { path } = &outcome.status {
                let entry = SavedEntry {
                    title: summary.title.clone(),
                    path: path.clone(),
                };
                if self.mode == PublishMode::PerDashboard && self.publisher.is_some() {
                    let message = commit_message(self.style, self.store.root(), &entry);
                    publishes.push(self.publish(&message, 1).await);
                }
                saved.push(entry);
            }
            outcomes.push(outcome);
        }

        if self.publisher.is_none() {
            info!("Publishing disabled, leaving changes uncommitted");
            publishes.push(self.publish("", saved.len()).await);
        } else if self.mode == PublishMode::Batch {
            if saved.is_empty() {
                info!("Nothing saved, skipping publish");
            } else {
                let message = batch_commit_message(self.style, self.store.root(), &saved);
                publishes.push(self.publish(&message, saved.len()).await);
            }
        }

        let duration_secs = started.elapsed().as_secs_f64();
        histogram!("dashboard_sync_duration_seconds").record(duration_secs);

        let report = SyncReport {
            listed,
            selected: selected.len(),
            outcomes,
            publishes,
            duration_secs,
        };
        if report.failed() > 0 {
            warn!("{} dashboards failed to sync", report.failed());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::types::{DashboardDocument, GitStep};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct MockSource {
        summaries: Option<Vec<DashboardSummary>>,
        bodies: HashMap<String, Vec<u8>>,
        fetched: Arc<tokio::sync::Mutex<Vec<String>>>,
    }

    impl MockSource {
        fn new(summaries: Vec<DashboardSummary>) -> Self {
            let bodies = summaries
                .iter()
                .map(|s| (s.uid.clone(), format!("{{\"uid\":\"{}\"}}", s.uid).into_bytes()))
                .collect();
            Self {
                summaries: Some(summaries),
                bodies,
                fetched: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            }
        }

        fn failing_listing() -> Self {
            Self {
                summaries: None,
                bodies: HashMap::new(),
                fetched: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            }
        }

        fn without_body(mut self, uid: &str) -> Self {
            self.bodies.remove(uid);
            self
        }
    }

    #[async_trait]
    impl DashboardSource for MockSource {
        async fn list_dashboards(&self) -> Result<Vec<DashboardSummary>> {
            self.summaries.clone().ok_or(SyncError::Status {
                url: "/api/search?type=dash-db".to_string(),
                status: 401,
            })
        }

        async fn fetch_dashboard(&self, uid: &str) -> Result<DashboardDocument> {
            self.fetched.lock().await.push(uid.to_string());
            self.bodies
                .get(uid)
                .map(|b| DashboardDocument(b.clone()))
                .ok_or(SyncError::Status {
                    url: format!("/api/dashboards/uid/{uid}"),
                    status: 404,
                })
        }
    }

    struct MockPublisher {
        messages: Arc<tokio::sync::Mutex<Vec<String>>>,
        outcome: PublishOutcome,
    }

    impl MockPublisher {
        fn new(outcome: PublishOutcome) -> Self {
            Self {
                messages: Arc::new(tokio::sync::Mutex::new(Vec::new())),
                outcome,
            }
        }
    }

    #[async_trait]
    impl RepositoryPublisher for MockPublisher {
        async fn publish(&self, message: &str, _files: usize) -> PublishOutcome {
            self.messages.lock().await.push(message.to_string());
            self.outcome.clone()
        }
    }

    fn summary(uid: &str, title: &str, folder: &str) -> DashboardSummary {
        DashboardSummary {
            uid: uid.to_string(),
            title: title.to_string(),
            folder_title: folder.to_string(),
        }
    }

    fn sample() -> Vec<DashboardSummary> {
        vec![
            summary("a", "CPU Usage", "LEGACY"),
            summary("b", "Orders", "Production"),
            summary("c", "Node Template", "Templates"),
            summary("d", "Home", ""),
            summary("e", "Disk IO", "LEGACY"),
        ]
    }

    #[tokio::test]
    async fn fetches_only_allow_listed_dashboards_in_order() {
        let dir = tempdir().unwrap();
        let source = MockSource::new(sample());
        let fetched = source.fetched.clone();
        let pipeline = SyncPipeline::new(Box::new(source), DashboardStore::new(dir.path()), FolderFilter::default());

        let report = pipeline.run().await.unwrap();

        assert_eq!(*fetched.lock().await, vec!["a", "c", "e"]);
        assert_eq!(report.listed, 5);
        assert_eq!(report.selected, 3);
        assert_eq!(report.saved(), 3);
        assert!(dir.path().join("LEGACY/CPU_Usage.json").exists());
        assert!(dir.path().join("Templates/Node_Template.json").exists());
        assert!(!dir.path().join("Production").exists());
        assert_eq!(report.publishes, vec![PublishOutcome::Skipped]);
    }

    #[tokio::test]
    async fn failed_fetch_writes_nothing_and_continues() {
        let dir = tempdir().unwrap();
        let source = MockSource::new(sample()).without_body("a");
        let pipeline = SyncPipeline::new(Box::new(source), DashboardStore::new(dir.path()), FolderFilter::default());

        let report = pipeline.run().await.unwrap();

        assert_eq!(report.saved(), 2);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.summary.uid, "a");
        assert!(matches!(
            failure.status,
            DashboardStatus::Failed { stage: FailureStage::Fetch, .. }
        ));
        assert!(!dir.path().join("LEGACY/CPU_Usage.json").exists());
        assert!(dir.path().join("LEGACY/Disk_IO.json").exists());
    }

    #[tokio::test]
    async fn failed_listing_fetches_nothing() {
        let dir = tempdir().unwrap();
        let source = MockSource::failing_listing();
        let fetched = source.fetched.clone();
        let pipeline = SyncPipeline::new(Box::new(source), DashboardStore::new(dir.path()), FolderFilter::default());

        assert!(pipeline.run().await.is_err());
        assert!(fetched.lock().await.is_empty());
    }

    #[tokio::test]
    async fn batch_mode_publishes_once() {
        let dir = tempdir().unwrap();
        let publisher = MockPublisher::new(PublishOutcome::Pushed { files: 3 });
        let messages = publisher.messages.clone();
        let pipeline = SyncPipeline::new(
            Box::new(MockSource::new(sample())),
            DashboardStore::new(dir.path()),
            FolderFilter::default(),
        )
        .with_publisher(Box::new(publisher), PublishMode::Batch, CommitStyle::Readable);

        let report = pipeline.run().await.unwrap();

        let messages = messages.lock().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Sync 3 Grafana dashboards"));
        assert!(messages[0].contains("LEGACY/CPU_Usage.json (CPU Usage)"));
        assert_eq!(report.publishes, vec![PublishOutcome::Pushed { files: 3 }]);
    }

    #[tokio::test]
    async fn per_dashboard_mode_publishes_after_each_write_with_legacy_message() {
        let dir = tempdir().unwrap();
        let publisher = MockPublisher::new(PublishOutcome::Pushed { files: 1 });
        let messages = publisher.messages.clone();
        let source = MockSource::new(sample()).without_body("c");
        let pipeline = SyncPipeline::new(Box::new(source), DashboardStore::new(dir.path()), FolderFilter::default())
            .with_publisher(Box::new(publisher), PublishMode::PerDashboard, CommitStyle::Legacy);

        let report = pipeline.run().await.unwrap();

        let messages = messages.lock().await;
        let expected_path = dir.path().join("LEGACY").join("CPU_Usage.json");
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            format!("Saved dashboardCPU Usageto{}", expected_path.to_string_lossy())
        );
        assert!(messages[1].starts_with("Saved dashboardDisk IOto"));
        assert_eq!(report.publishes.len(), 2);
    }

    #[tokio::test]
    async fn publish_failures_do_not_stop_the_loop() {
        let dir = tempdir().unwrap();
        let publisher = MockPublisher::new(PublishOutcome::Failed {
            step: GitStep::Push,
            message: "rejected".to_string(),
        });
        let pipeline = SyncPipeline::new(
            Box::new(MockSource::new(sample())),
            DashboardStore::new(dir.path()),
            FolderFilter::default(),
        )
        .with_publisher(Box::new(publisher), PublishMode::PerDashboard, CommitStyle::Readable);

        let report = pipeline.run().await.unwrap();

        assert_eq!(report.saved(), 3);
        assert_eq!(report.publishes.len(), 3);
        assert!(report.publishes.iter().all(|p| p.label() == "failed"));
    }

    #[tokio::test]
    async fn nothing_saved_means_no_batch_publish() {
        let dir = tempdir().unwrap();
        let publisher = MockPublisher::new(PublishOutcome::Pushed { files: 0 });
        let messages = publisher.messages.clone();
        let pipeline = SyncPipeline::new(
            Box::new(MockSource::new(vec![summary("b", "Orders", "Production")])),
            DashboardStore::new(dir.path()),
            FolderFilter::default(),
        )
        .with_publisher(Box::new(publisher), PublishMode::Batch, CommitStyle::Readable);

        let report = pipeline.run().await.unwrap();

        assert_eq!(report.selected, 0);
        assert!(report.publishes.is_empty());
        assert!(messages.lock().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_title_and_folder_overwrites() {
        let dir = tempdir().unwrap();
        let source = MockSource::new(vec![
            summary("first", "CPU Usage", "LEGACY"),
            summary("second", "CPU Usage", "LEGACY"),
        ]);
        let pipeline = SyncPipeline::new(Box::new(source), DashboardStore::new(dir.path()), FolderFilter::default());

        let report = pipeline.run().await.unwrap();

        assert_eq!(report.saved(), 2);
        let written = std::fs::read_to_string(dir.path().join("LEGACY/CPU_Usage.json")).unwrap();
        assert_eq!(written, "{\"uid\":\"second\"}");
    }

    #[test]
    fn run_records_counters_under_their_exported_names() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let dir = tempdir().unwrap();
        let pipeline = SyncPipeline::new(
            Box::new(MockSource::new(sample()).without_body("c")),
            DashboardStore::new(dir.path()),
            FolderFilter::default(),
        )
        .with_publisher(
            Box::new(MockPublisher::new(PublishOutcome::Pushed { files: 2 })),
            PublishMode::Batch,
            CommitStyle::Readable,
        );
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let report = metrics::with_local_recorder(&recorder, || runtime.block_on(pipeline.run())).unwrap();
        assert_eq!(report.saved(), 2);

        let rendered = handle.render();
        assert!(rendered.contains("dashboard_sync_runs_total 1"));
        assert!(rendered.contains("dashboard_sync_dashboards_listed_total 5"));
        assert!(rendered.contains("dashboard_sync_dashboards_saved_total{folder=\"LEGACY\"} 2"));
        assert!(rendered.contains("dashboard_sync_dashboard_failures_total{stage=\"fetch\"} 1"));
        assert!(rendered.contains("dashboard_sync_publish_total{outcome=\"pushed\"} 1"));
        assert!(rendered.contains("# TYPE dashboard_sync_duration_seconds"));
    }
}

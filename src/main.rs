use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use dashboard_sync::apis::grafana::GrafanaClient;
use dashboard_sync::config::{self, CommitStyle, Config, Overrides, PublishMode};
use dashboard_sync::filter::FolderFilter;
use dashboard_sync::logging;
use dashboard_sync::metrics_push;
use dashboard_sync::pipeline::SyncPipeline;
use dashboard_sync::publisher::GitPublisher;
use dashboard_sync::storage::DashboardStore;
use dashboard_sync::types::{DashboardStatus, SyncReport};

#[derive(Parser)]
#[command(name = "dashboard_sync")]
#[command(about = "Mirror Grafana dashboard JSON models into a git repository")]
#[command(version = "0.1.0")]
struct Cli {
    /// Settings file (defaults to ./dashboard-sync.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Environment file holding ALERT_RULES_READ_ONLY_API_KEY (defaults to ./.env)
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Grafana base URL
    #[arg(long)]
    host: Option<String>,
    /// Local mirror directory, also the git working tree
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Folder to mirror; repeat for several. Replaces the configured allow-list
    #[arg(long = "folder")]
    folders: Vec<String>,
    #[arg(long, value_enum)]
    publish_mode: Option<PublishMode>,
    #[arg(long, value_enum)]
    commit_style: Option<CommitStyle>,
    /// Write files but do not run git
    #[arg(long)]
    no_publish: bool,
}

fn print_report(report: &SyncReport) {
    println!("\n📊 Sync Results:");
    println!("   Listed: {}", report.listed);
    println!("   Selected: {}", report.selected);
    println!("   Saved: {}", report.saved());
    println!("   Failed: {}", report.failed());
    for publish in &report.publishes {
        println!("   Publish: {}", publish.label());
    }

    if report.failed() > 0 {
        println!("\n⚠️  Failures:");
        for outcome in report.failures() {
            if let DashboardStatus::Failed { stage, message } = &outcome.status {
                println!("   - {} [{}]: {}", outcome.summary.title, stage.as_str(), message);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // RUST_LOG may come from the env file, so load it before the subscriber reads it
    let env_loaded = config::load_env_file(cli.env_file.as_deref());
    let _log_guard = logging::init_logging();
    metrics_push::init_metrics();

    env_loaded.map_err(|e| {
        error!("{}", e);
        e
    })?;
    let api_key = config::api_key_from_env();

    let mut settings = Config::load(cli.config.as_deref())?;
    settings.apply(Overrides {
        host: cli.host,
        output_dir: cli.output_dir,
        folders: cli.folders,
        publish_mode: cli.publish_mode,
        commit_style: cli.commit_style,
        no_publish: cli.no_publish,
    })?;

    let client = GrafanaClient::new(&settings.grafana, api_key)?;
    let store = DashboardStore::new(settings.sync.output_dir.clone());
    let filter = FolderFilter::new(settings.sync.folders.clone());

    let mut pipeline = SyncPipeline::new(Box::new(client), store, filter);
    if settings.git.enabled {
        let publisher = GitPublisher::new(
            settings.sync.output_dir.clone(),
            Duration::from_secs(settings.git.timeout_seconds),
        );
        pipeline = pipeline.with_publisher(
            Box::new(publisher),
            settings.git.mode,
            settings.git.commit_style,
        );
    }

    info!("🔄 Syncing dashboards from {}", settings.grafana.host);
    match pipeline.run().await {
        Ok(report) => {
            print_report(&report);
            let instance = metrics_push::instance_label(&settings.grafana.host);
            metrics_push::push_run_summary(&report, &instance).await;
        }
        Err(e) => {
            // a failed listing ends the run without a non-zero exit
            error!("Error getting dashboards: {}", e);
            println!("❌ Error getting dashboards: {}", e);
        }
    }

    Ok(())
}

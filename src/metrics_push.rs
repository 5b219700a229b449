use crate::constants::PUSHGATEWAY_URL_ENV;
use crate::types::SyncReport;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder so the pipeline counters can be
/// rendered in-process and pushed at the end of the run. Idempotent.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Some(handle);
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
            HANDLE.get()
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            None
        }
    }
}

/// Prometheus text exposition of a run summary
pub fn render_report(report: &SyncReport, timestamp_secs: i64) -> String {
    let publish_failures = report
        .publishes
        .iter()
        .filter(|p| p.label() == "failed")
        .count();
    format!(
        "# TYPE dashboard_sync_dashboards_listed gauge\n\
         dashboard_sync_dashboards_listed {}\n\
         # TYPE dashboard_sync_dashboards_selected gauge\n\
         dashboard_sync_dashboards_selected {}\n\
         # TYPE dashboard_sync_dashboards_saved gauge\n\
         dashboard_sync_dashboards_saved {}\n\
         # TYPE dashboard_sync_dashboards_failed gauge\n\
         dashboard_sync_dashboards_failed {}\n\
         # TYPE dashboard_sync_publish_failures gauge\n\
         dashboard_sync_publish_failures {}\n\
         # TYPE dashboard_sync_last_run_duration_seconds gauge\n\
         dashboard_sync_last_run_duration_seconds {}\n\
         # TYPE dashboard_sync_last_run_timestamp_seconds gauge\n\
         dashboard_sync_last_run_timestamp_seconds {}\n",
        report.listed,
        report.selected,
        report.saved(),
        report.failed(),
        publish_failures,
        report.duration_secs,
        timestamp_secs
    )
}

/// Run summary gauges followed by whatever the recorder collected
pub fn push_body(report: &SyncReport, timestamp_secs: i64, recorded: Option<&str>) -> String {
    let mut body = render_report(report, timestamp_secs);
    match recorded {
        Some(rendered) if !rendered.is_empty() => body.push_str(rendered),
        _ => warn!("No recorded metrics to push, sending the run summary only"),
    }
    body
}

/// Push the run summary to a Pushgateway when `DASHBOARD_SYNC_PUSHGATEWAY_URL` is set.
/// Never fails the run.
pub async fn push_run_summary(report: &SyncReport, instance: &str) {
    let base = match std::env::var(PUSHGATEWAY_URL_ENV) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => return,
    };
    let push_url = format!(
        "{}/metrics/job/dashboard_sync/instance/{}",
        base.trim_end_matches('/'),
        instance
    );
    let recorded = HANDLE.get().map(|handle| handle.render());
    let body = push_body(report, chrono::Utc::now().timestamp(), recorded.as_deref());

    let push_res = reqwest::Client::new()
        .post(&push_url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .send()
        .await;

    match push_res {
        Ok(r) if r.status().is_success() => {
            info!("Pushed run summary to Pushgateway for instance={}", instance);
        }
        Ok(r) => {
            warn!(
                "Pushgateway push responded with status {} for instance={}",
                r.status().as_u16(),
                instance
            );
        }
        Err(e) => {
            warn!("Failed to push run summary to Pushgateway: {}", e);
        }
    }
}

/// Pushgateway grouping key derived from a Grafana host URL
pub fn instance_label(host: &str) -> String {
    host.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .replace(['/', ':'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PublishOutcome;

    fn report() -> SyncReport {
        SyncReport {
            listed: 10,
            selected: 4,
            outcomes: Vec::new(),
            publishes: vec![PublishOutcome::NothingToCommit],
            duration_secs: 1.5,
        }
    }

    #[test]
    fn renders_counts_from_the_report() {
        let text = render_report(&report(), 1_700_000_000);
        assert!(text.contains("dashboard_sync_dashboards_listed 10\n"));
        assert!(text.contains("dashboard_sync_dashboards_selected 4\n"));
        assert!(text.contains("dashboard_sync_publish_failures 0\n"));
        assert!(text.contains("dashboard_sync_last_run_duration_seconds 1.5\n"));
        assert!(text.contains("dashboard_sync_last_run_timestamp_seconds 1700000000\n"));
    }

    #[test]
    fn push_body_carries_recorded_counters_without_duplicate_families() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("dashboard_sync_runs_total").increment(1);
            metrics::counter!("dashboard_sync_dashboards_saved_total", "folder" => "LEGACY")
                .increment(3);
            metrics::histogram!("dashboard_sync_duration_seconds").record(1.5);
        });

        let body = push_body(&report(), 1_700_000_000, Some(&handle.render()));

        assert!(body.contains("dashboard_sync_dashboards_listed 10\n"));
        assert!(body.contains("dashboard_sync_runs_total 1"));
        assert!(body.contains("dashboard_sync_dashboards_saved_total{folder=\"LEGACY\"} 3"));
        for family in [
            "dashboard_sync_runs_total",
            "dashboard_sync_duration_seconds",
            "dashboard_sync_dashboards_saved_total",
        ] {
            assert_eq!(body.matches(&format!("# TYPE {family} ")).count(), 1, "{family}");
        }
    }

    #[test]
    fn push_body_without_recorder_is_the_summary() {
        let body = push_body(&report(), 1, None);
        assert_eq!(body, render_report(&report(), 1));
    }

    #[test]
    fn instance_label_strips_scheme() {
        assert_eq!(instance_label("https://nodeinfra.grafana.net"), "nodeinfra.grafana.net");
        assert_eq!(instance_label("http://127.0.0.1:3000/"), "127.0.0.1_3000");
    }
}

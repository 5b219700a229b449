use crate::config::GrafanaConfig;
use crate::constants::{DASHBOARD_BY_UID_PATH, SEARCH_PATH};
use crate::error::{Result, SyncError};
use crate::types::{DashboardDocument, DashboardSource, DashboardSummary};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Grafana HTTP API client authenticated with a bearer API key
pub struct GrafanaClient {
    client: reqwest::Client,
    host: String,
    api_key: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl GrafanaClient {
    pub fn new(config: &GrafanaConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn search_url(&self) -> String {
        format!("{}{}", self.host, SEARCH_PATH)
    }

    pub fn dashboard_url(&self, uid: &str) -> String {
        format!("{}{}{}", self.host, DASHBOARD_BY_UID_PATH, uid)
    }

    /// GET `url` and return the body of a successful response
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let client = &self.client;
        let api_key = self.api_key.as_str();
        retry_with(
            self.max_retries,
            self.retry_backoff,
            SyncError::is_transient,
            move || async move {
                let resp = client.get(url).bearer_auth(api_key).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(SyncError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                Ok::<_, SyncError>(resp.bytes().await?.to_vec())
            },
        )
        .await
    }
}

#[async_trait::async_trait]
impl DashboardSource for GrafanaClient {
    #[instrument(skip(self), fields(host = %self.host))]
    async fn list_dashboards(&self) -> Result<Vec<DashboardSummary>> {
        let body = self.get_bytes(&self.search_url()).await?;
        let dashboards: Vec<DashboardSummary> = serde_json::from_slice(&body)?;
        info!("Grafana search returned {} dashboards", dashboards.len());
        Ok(dashboards)
    }

    #[instrument(skip(self))]
    async fn fetch_dashboard(&self, uid: &str) -> Result<DashboardDocument> {
        let body = self.get_bytes(&self.dashboard_url(uid)).await?;
        debug!("Fetched {} bytes", body.len());
        Ok(DashboardDocument(body))
    }
}

/// Run `op`, retrying up to `max_retries` more times while `is_transient`
/// holds for the error. The wait grows linearly with the attempt number.
pub async fn retry_with<T, E, F, Fut, P>(
    max_retries: u32,
    backoff: Duration,
    is_transient: P,
    mut op: F,
) -> std::result::Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries && is_transient(&e) => {
                attempt += 1;
                warn!("Transient failure (attempt {}/{}): {}", attempt, max_retries + 1, e);
                tokio::time::sleep(backoff * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

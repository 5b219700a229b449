/// Defaults for the Grafana instance and the local mirror.

// Grafana
pub const DEFAULT_GRAFANA_HOST: &str = "https://nodeinfra.grafana.net";
pub const API_KEY_ENV: &str = "ALERT_RULES_READ_ONLY_API_KEY";
pub const SEARCH_PATH: &str = "/api/search?type=dash-db";
pub const DASHBOARD_BY_UID_PATH: &str = "/api/dashboards/uid/";

// Local mirror, which is also the git working tree
pub const DEFAULT_OUTPUT_DIR: &str = "./nodeinfra-grafana-dashboard-json-model";

/// Folders mirrored when no allow-list is configured
pub const DEFAULT_FOLDERS: [&str; 2] = ["LEGACY", "Templates"];

// Environment file holding the API key, read from the working directory only
pub const DEFAULT_ENV_FILE: &str = ".env";

// Optional settings file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "dashboard-sync.toml";

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 120;

pub const PUSHGATEWAY_URL_ENV: &str = "DASHBOARD_SYNC_PUSHGATEWAY_URL";

/// Get the default folder allow-list as owned strings
pub fn default_folders() -> Vec<String> {
    DEFAULT_FOLDERS.iter().map(|f| f.to_string()).collect()
}

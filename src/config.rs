use crate::constants::{
    default_folders, API_KEY_ENV, DEFAULT_CONFIG_FILE, DEFAULT_ENV_FILE, DEFAULT_GIT_TIMEOUT_SECS,
    DEFAULT_GRAFANA_HOST, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_MAX_RETRIES, DEFAULT_OUTPUT_DIR,
    DEFAULT_RETRY_BACKOFF_MS,
};
use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grafana: GrafanaConfig,
    pub sync: SyncSettings,
    pub git: GitConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GrafanaConfig {
    pub host: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for GrafanaConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_GRAFANA_HOST.to_string(),
            timeout_seconds: DEFAULT_HTTP_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub output_dir: PathBuf,
    pub folders: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            folders: default_folders(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub enabled: bool,
    pub mode: PublishMode,
    pub commit_style: CommitStyle,
    pub timeout_seconds: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: PublishMode::Batch,
            commit_style: CommitStyle::Readable,
            timeout_seconds: DEFAULT_GIT_TIMEOUT_SECS,
        }
    }
}

/// When the mirror gets committed and pushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// One add/commit/push after every dashboard has been written
    #[default]
    Batch,
    /// Add/commit/push right after each dashboard is written
    PerDashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CommitStyle {
    /// `Save dashboard "<title>" to <folder>/<file>.json`
    #[default]
    Readable,
    /// The historical message: fragments glued together without spaces
    Legacy,
}

/// Values taken from the command line; `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub folders: Vec<String>,
    pub publish_mode: Option<PublishMode>,
    pub commit_style: Option<CommitStyle>,
    pub no_publish: bool,
}

impl Config {
    /// Load settings from `path`, or from `dashboard-sync.toml` when it exists.
    /// An explicit path that cannot be read is an error; a missing default file is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !required && !config_path.exists() {
            debug!("No settings file at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(&config_path).map_err(|e| {
            SyncError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        let config = Self::from_toml_str(&config_content)?;
        debug!("Loaded settings from {}", config_path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) -> Result<()> {
        if let Some(host) = overrides.host {
            self.grafana.host = host;
        }
        if let Some(output_dir) = overrides.output_dir {
            self.sync.output_dir = output_dir;
        }
        if !overrides.folders.is_empty() {
            self.sync.folders = overrides.folders;
        }
        if let Some(mode) = overrides.publish_mode {
            self.git.mode = mode;
        }
        if let Some(style) = overrides.commit_style {
            self.git.commit_style = style;
        }
        if overrides.no_publish {
            self.git.enabled = false;
        }
        self.validate()
    }

    /// Trim the host and reject values that cannot work
    fn validate(&mut self) -> Result<()> {
        self.grafana.host = self.grafana.host.trim().to_string();
        let host = &self.grafana.host;
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(SyncError::Config(format!(
                "grafana.host must be an http(s) URL, got '{}'",
                host
            )));
        }
        if self.grafana.timeout_seconds == 0 {
            return Err(SyncError::Config("grafana.timeout_seconds must be at least 1".into()));
        }
        if self.git.timeout_seconds == 0 {
            return Err(SyncError::Config("git.timeout_seconds must be at least 1".into()));
        }
        if self.sync.output_dir.as_os_str().is_empty() {
            return Err(SyncError::Config("sync.output_dir must not be empty".into()));
        }
        if self.sync.folders.is_empty() {
            warn!("Folder allow-list is empty; no dashboards will be mirrored");
        }
        Ok(())
    }
}

/// Load the environment file, `./.env` unless a path is given. Parent
/// directories are not searched. A missing or unreadable file is fatal for the run.
pub fn load_env_file(path: Option<&Path>) -> Result<PathBuf> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_ENV_FILE));
    dotenv::from_path(path)
        .map(|_| path.to_path_buf())
        .map_err(|e| SyncError::EnvFile(format!("{}: {}", path.display(), e)))
}

/// The Grafana API key. Empty is allowed; Grafana rejects it downstream.
pub fn api_key_from_env() -> String {
    let key = std::env::var(API_KEY_ENV).unwrap_or_default();
    if key.is_empty() {
        warn!("{} is empty; Grafana will reject requests", API_KEY_ENV);
    }
    key
}

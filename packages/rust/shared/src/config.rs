//! Application configuration for gobracket.
//!
//! User config lives at `~/.gobracket/gobracket.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GoBracketError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "gobracket.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".gobracket";

/// Tournament rendered when none is selected.
pub const DEFAULT_TOURNAMENT_ID: u64 = 59567;

// ---------------------------------------------------------------------------
// Config structs (matching gobracket.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// API endpoint and request scheduling.
    #[serde(default)]
    pub api: ApiConfig,

    /// Rendering defaults.
    #[serde(default)]
    pub render: RenderDefaults,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Root of the JSON REST API; request paths are joined onto it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Public site root used for player and game links.
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Maximum in-flight requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// How long a caller sleeps before re-polling for admission.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Throttle backoff unit; attempt `k` waits `k * backoff_unit_ms`.
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    /// Number of throttled responses tolerated before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            site_url: default_site_url(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            backoff_unit_ms: default_backoff_unit_ms(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://online-go.com/api/v1".into()
}
fn default_site_url() -> String {
    "https://online-go.com".into()
}
fn default_concurrency() -> usize {
    10
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_backoff_unit_ms() -> u64 {
    1000
}
fn default_max_attempts() -> u32 {
    20
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderDefaults {
    /// Tournament rendered when no `--tournament` is given.
    #[serde(default = "default_tournament")]
    pub default_tournament: u64,

    /// Optional path to a template file overriding the built-in one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            default_tournament: default_tournament(),
            template: None,
        }
    }
}

fn default_tournament() -> u64 {
    DEFAULT_TOURNAMENT_ID
}

// ---------------------------------------------------------------------------
// Scheduler config (runtime, derived from [api])
// ---------------------------------------------------------------------------

/// Runtime request-scheduling configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// API root URL.
    pub base_url: String,
    /// Admission cap.
    pub concurrency: usize,
    /// Admission re-poll interval.
    pub poll_interval: Duration,
    /// Linear backoff unit for 429 responses.
    pub backoff_unit: Duration,
    /// Throttled attempts tolerated before `RetriesExhausted`.
    pub max_attempts: u32,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&ApiConfig::default())
    }
}

impl From<&ApiConfig> for SchedulerConfig {
    fn from(api: &ApiConfig) -> Self {
        Self {
            base_url: api.base_url.clone(),
            concurrency: api.concurrency.max(1),
            poll_interval: Duration::from_millis(api.poll_interval_ms),
            backoff_unit: Duration::from_millis(api.backoff_unit_ms),
            max_attempts: api.max_attempts,
            timeout: Duration::from_secs(api.timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.gobracket/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GoBracketError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.gobracket/gobracket.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GoBracketError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        GoBracketError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GoBracketError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GoBracketError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GoBracketError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("online-go.com"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.api.concurrency, 10);
        assert_eq!(parsed.render.default_tournament, 59567);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[api]
concurrency = 3
backoff_unit_ms = 250
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.api.concurrency, 3);
        assert_eq!(config.api.max_attempts, 20);
        assert_eq!(config.api.poll_interval_ms, 500);
        assert!(config.render.template.is_none());
    }

    #[test]
    fn scheduler_config_from_api_config() {
        let api = ApiConfig {
            concurrency: 0,
            ..ApiConfig::default()
        };
        let sched = SchedulerConfig::from(&api);
        assert_eq!(sched.concurrency, 1);
        assert_eq!(sched.poll_interval, Duration::from_millis(500));
        assert_eq!(sched.backoff_unit, Duration::from_secs(1));
    }

    #[test]
    fn load_config_from_missing_file_is_io_error() {
        let err = load_config_from(Path::new("/nonexistent/gobracket.toml")).unwrap_err();
        assert!(matches!(err, GoBracketError::Io { .. }));
    }
}

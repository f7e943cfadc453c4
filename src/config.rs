//! Runtime configuration
//!
//! One explicit [`Config`] is built at process start from defaults, an
//! optional JSON config file, and the token environment variable, then passed
//! to every component that needs it. Nothing reads configuration at module
//! scope.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::retry::RetryPolicy;

/// Environment variable consulted for the API token when the config file does
/// not provide one.
pub const TOKEN_ENV_VAR: &str = "SYNOPTIC_API_TOKEN";

/// Default mesonet API base URL
pub const DEFAULT_MESONET_BASE_URL: &str = "https://api.mesowest.net/v2/";

/// Default avalanche-center base URL
pub const DEFAULT_AVALANCHE_BASE_URL: &str = "http://www.jhavalanche.org";

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("IO error reading config: {0}")]
    Io(String),

    /// Config file content is not valid
    #[error("Invalid config file {path}: {message}")]
    Invalid {
        /// Path of the offending file
        path: String,
        /// Parser message
        message: String,
    },

    /// A command needs the API token and none is configured
    #[error("No API token configured: set `api_token` in the config file or the SYNOPTIC_API_TOKEN environment variable")]
    MissingToken,
}

/// Runtime configuration shared by all components
#[derive(Debug, Clone)]
pub struct Config {
    /// Mesonet API token, if configured
    pub api_token: Option<String>,
    /// Mesonet API base URL (trailing slash included)
    pub mesonet_base_url: String,
    /// Avalanche-center base URL (no trailing slash)
    pub avalanche_base_url: String,
    /// Directory holding station archives and the metadata table
    pub data_dir: PathBuf,
    /// Global start date for stations that have no archive yet
    pub default_start: NaiveDate,
    /// Pause between successive page requests
    pub page_delay: Duration,
    /// Retry policy applied to every network call
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_token: None,
            mesonet_base_url: DEFAULT_MESONET_BASE_URL.to_string(),
            avalanche_base_url: DEFAULT_AVALANCHE_BASE_URL.to_string(),
            data_dir: PathBuf::from("data"),
            default_start: NaiveDate::from_ymd_opt(1997, 1, 1).unwrap_or(NaiveDate::MIN),
            page_delay: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

/// Config file schema. Every field is optional and overlays the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    api_token: Option<String>,
    mesonet_base_url: Option<String>,
    avalanche_base_url: Option<String>,
    data_dir: Option<PathBuf>,
    default_start: Option<NaiveDate>,
    page_delay_secs: Option<u64>,
    retry_initial_wait_secs: Option<f64>,
    retry_max_retries: Option<u32>,
}

impl Config {
    /// Load configuration: defaults, then the JSON file at `path` if given,
    /// then the token environment variable as a final fallback.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(path) = path {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
            let file: ConfigFile =
                serde_json::from_str(&text).map_err(|e| ConfigError::Invalid {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            config.apply_file(file);
            debug!(path = %path.display(), "Loaded config file");
        }

        if config.api_token.is_none() {
            config.api_token = std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty());
        }

        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(token) = file.api_token {
            self.api_token = Some(token);
        }
        if let Some(url) = file.mesonet_base_url {
            self.mesonet_base_url = url;
        }
        if let Some(url) = file.avalanche_base_url {
            self.avalanche_base_url = url;
        }
        if let Some(dir) = file.data_dir {
            self.data_dir = dir;
        }
        if let Some(start) = file.default_start {
            self.default_start = start;
        }
        if let Some(secs) = file.page_delay_secs {
            self.page_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = file.retry_initial_wait_secs {
            if secs.is_finite() && secs >= 0.0 {
                self.retry.initial_wait = Duration::from_secs_f64(secs);
            }
        }
        if let Some(max) = file.retry_max_retries {
            self.retry.max_retries = max;
        }
    }

    /// Token for mesonet API requests, erroring if none is configured.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.api_token.as_deref().ok_or(ConfigError::MissingToken)
    }

    /// The default archive start as a midnight datetime.
    pub fn default_start_datetime(&self) -> NaiveDateTime {
        self.default_start
            .and_hms_opt(0, 0, 0)
            .unwrap_or(NaiveDateTime::MIN)
    }
}

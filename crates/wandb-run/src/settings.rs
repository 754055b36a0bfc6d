//! Client settings.
//!
//! Resolved from built-in defaults, then an optional TOML file, then
//! `WANDB_RUN__*` environment variables (e.g. `WANDB_RUN__PORT=50052`,
//! `WANDB_RUN__RETRY__MAX_ATTEMPTS=50`).

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::RunResult;
use crate::rpc::{Backoff, RetryPolicy};

pub const APP_NAME: &str = "wandb-run";
pub const ENV_PREFIX: &str = "WANDB_RUN";

pub const DEFAULT_BINARY: &str = "wandb";
pub const DEFAULT_ADDRESS: &str = "localhost";
pub const DEFAULT_PORT: u16 = 50051;
pub const DEFAULT_BASE_URL: &str = "https://app.wandb.ai";
pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Backend executable.
    pub binary: String,
    /// Address the gRPC channel connects to.
    pub address: String,
    /// Port passed to the backend and used for the channel.
    pub port: u16,
    /// Dashboard base URL used for run links.
    pub base_url: String,
    /// Capture stdout while the run is active.
    pub capture_output: bool,
    pub retry: RetrySettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            base_url: DEFAULT_BASE_URL.to_string(),
            capture_output: true,
            retry: RetrySettings::default(),
        }
    }
}

/// Handshake retry settings. Unset limits mean "retry forever".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub delay_ms: u64,
    /// Grow the delay by this factor per attempt. Fixed delay when unset.
    pub multiplier: Option<f64>,
    pub max_delay_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub max_elapsed_ms: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_RETRY_DELAY_MS,
            multiplier: None,
            max_delay_ms: None,
            max_attempts: None,
            max_elapsed_ms: None,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        let delay = Duration::from_millis(self.delay_ms);
        let backoff = match self.multiplier {
            Some(multiplier) => Backoff::Exponential {
                initial_delay: delay,
                max_delay: self
                    .max_delay_ms
                    .map_or(Duration::from_secs(30), Duration::from_millis),
                multiplier,
            },
            None => Backoff::Fixed { delay },
        };
        RetryPolicy {
            backoff,
            max_attempts: self.max_attempts,
            max_elapsed: self.max_elapsed_ms.map(Duration::from_millis),
        }
    }
}

impl ClientSettings {
    /// Load settings. An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> RunResult<Self> {
        let (file, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (default_config_path(), false),
        };

        let built = Config::builder()
            .set_default("binary", DEFAULT_BINARY)?
            .set_default("address", DEFAULT_ADDRESS)?
            .set_default("port", i64::from(DEFAULT_PORT))?
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("capture_output", true)?
            .set_default("retry.delay_ms", DEFAULT_RETRY_DELAY_MS as i64)?
            .add_source(
                File::from(file.as_path())
                    .format(FileFormat::Toml)
                    .required(required),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(built.try_deserialize()?)
    }

    /// Render the settings as a TOML document.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// `$XDG_CONFIG_HOME/wandb-run/config.toml`, falling back to the platform config dir.
pub fn default_config_path() -> PathBuf {
    let dir = env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join(APP_NAME).join("config.toml")
}

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::PollConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub polling: PollingConfig,
  /// Board used when `--board` is not given
  pub default_board: Option<String>,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the deployment, e.g. https://gumboard.com
  pub url: String,
  /// Name of the cookie carrying the session token
  #[serde(default = "default_session_cookie")]
  pub session_cookie: String,
}

fn default_session_cookie() -> String {
  "authjs.session-token".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollingConfig {
  pub base_interval_ms: u64,
  pub max_interval_ms: u64,
  pub idle_threshold_ms: u64,
}

impl Default for PollingConfig {
  fn default() -> Self {
    Self {
      base_interval_ms: 4_000,
      max_interval_ms: 10_000,
      idle_threshold_ms: 30_000,
    }
  }
}

impl PollingConfig {
  pub fn base_interval(&self) -> Duration {
    Duration::from_millis(self.base_interval_ms.max(1))
  }
}

impl From<&PollingConfig> for PollConfig {
  fn from(config: &PollingConfig) -> Self {
    let base = config.base_interval();
    PollConfig {
      max_interval: Duration::from_millis(config.max_interval_ms).max(base),
      idle_threshold: Duration::from_millis(config.idle_threshold_ms),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Default filter; RUST_LOG takes precedence
  pub level: String,
  /// Defaults to $XDG_DATA_HOME/gumboard-sync/logs
  pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      directory: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./gumboard.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/gumboard-sync/config.yaml
  /// 4. ~/.config/gumboard-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/gumboard-sync/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("gumboard.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("gumboard-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the session token from environment variables.
  ///
  /// Checks GUMBOARD_SESSION_TOKEN first, then GUMBOARD_TOKEN as fallback.
  pub fn get_session_token() -> Result<String> {
    std::env::var("GUMBOARD_SESSION_TOKEN")
      .or_else(|_| std::env::var("GUMBOARD_TOKEN"))
      .map_err(|_| {
        eyre!(
          "Session token not found. Set GUMBOARD_SESSION_TOKEN or GUMBOARD_TOKEN environment variable."
        )
      })
  }

  /// Board to operate on: the CLI flag, else `default_board`.
  pub fn board(&self) -> Result<&str> {
    self
      .default_board
      .as_deref()
      .ok_or_else(|| eyre!("No board selected. Pass --board or set default_board in the config."))
  }
}

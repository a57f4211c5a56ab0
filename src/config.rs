use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::roles::Role;

/// Environment variable that overrides `api.base_url`.
pub const API_URL_ENV: &str = "TICKETDESK_API_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  /// Custom title for the header (defaults to the backend host)
  pub title: Option<String>,
  /// Role to act as when the user holds several
  pub default_role: Option<String>,
  #[serde(default = "default_search_debounce_ms")]
  pub search_debounce_ms: u64,
  #[serde(default = "default_storage_poll_ms")]
  pub storage_poll_ms: u64,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
  pub base_url: Option<String>,
  /// Per-request timeout; unset means no timeout
  pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_stale_secs")]
  pub stale_secs: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_secs: default_stale_secs(),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api: ApiConfig::default(),
      title: None,
      default_role: None,
      search_debounce_ms: default_search_debounce_ms(),
      storage_poll_ms: default_storage_poll_ms(),
      cache: CacheConfig::default(),
    }
  }
}

fn default_search_debounce_ms() -> u64 {
  300
}

fn default_storage_poll_ms() -> u64 {
  1000
}

fn default_stale_secs() -> i64 {
  60
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./ticketdesk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/ticketdesk/config.yaml
  ///
  /// A missing file is not an error; the base URL may come from the
  /// environment or the command line instead.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("ticketdesk.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("ticketdesk").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Apply the environment and command line overrides, in that order.
  pub fn with_overrides(mut self, env_url: Option<String>, flag_url: Option<String>) -> Self {
    if let Some(url) = flag_url.or(env_url) {
      self.api.base_url = Some(url);
    }
    self
  }

  /// The backend base URL. Fails if none was configured anywhere.
  pub fn base_url(&self) -> Result<Url> {
    let raw = self.api.base_url.as_deref().ok_or_else(|| {
      eyre!(
        "No API base URL configured. Set api.base_url in ~/.config/ticketdesk/config.yaml,\n\
         export {} or pass --api-url.",
        API_URL_ENV
      )
    })?;
    Url::parse(raw).map_err(|e| eyre!("Invalid API base URL {}: {}", raw, e))
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.api.timeout_secs.map(Duration::from_secs)
  }

  pub fn default_role(&self) -> Option<Role> {
    self.default_role.as_deref().map(Role::from_wire)
  }

  pub fn search_debounce(&self) -> Duration {
    Duration::from_millis(self.search_debounce_ms)
  }

  pub fn storage_poll(&self) -> Duration {
    Duration::from_millis(self.storage_poll_ms.max(50))
  }

  pub fn stale_time(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.cache.stale_secs)
  }

  /// Directory for the storage database and log files.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("ticketdesk"))
  }

  pub fn storage_path() -> Result<PathBuf> {
    Ok(Self::data_dir()?.join("storage.db"))
  }
}

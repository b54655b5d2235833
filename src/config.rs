use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the storefront API, e.g. "https://shop.example.com/api"
  pub url: String,
}

/// Stale windows and retry knobs. Defaults mirror typical storefront usage:
/// catalog and order lists go stale quickly, the profile rarely changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub product_stale_secs: u64,
  pub order_stale_secs: u64,
  pub profile_stale_secs: u64,
  pub retry_max_attempts: u32,
  pub retry_base_delay_ms: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      product_stale_secs: 2 * 60,
      order_stale_secs: 2 * 60,
      profile_stale_secs: 5 * 60,
      retry_max_attempts: 3,
      retry_base_delay_ms: 200,
    }
  }
}

impl Config {
  /// Build a configuration programmatically (tests, embedding).
  pub fn new(api_url: &str) -> Self {
    Self {
      api: ApiConfig {
        url: api_url.to_string(),
      },
      cache: CacheConfig::default(),
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shopsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shopsync/config.yaml
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
        "No configuration file found. Create one at ~/.config/shopsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shopsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shopsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.cache.retry_max_attempts,
      base_delay: Duration::from_millis(self.cache.retry_base_delay_ms),
    }
  }

  pub fn product_stale_time(&self) -> Duration {
    Duration::from_secs(self.cache.product_stale_secs)
  }

  pub fn order_stale_time(&self) -> Duration {
    Duration::from_secs(self.cache.order_stale_secs)
  }

  pub fn profile_stale_time(&self) -> Duration {
    Duration::from_secs(self.cache.profile_stale_secs)
  }
}

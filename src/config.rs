use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::cache::{CachePolicy, KeyStrategyKind};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Which backend to talk to
  pub environment: Environment,
  /// API version segment of the base URL
  pub version: String,
  pub domain: String,
  /// Transport timeout; expiry surfaces as a transport failure. Must be positive.
  pub timeout_secs: u64,
  pub cache: CacheConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      environment: Environment::default(),
      version: "v0".to_string(),
      domain: "trading212.com".to_string(),
      timeout_secs: 30,
      cache: CacheConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
  /// Practice account backend
  #[default]
  Demo,
  Live,
}

impl Environment {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Demo => "demo",
      Self::Live => "live",
    }
  }
}

impl std::str::FromStr for Environment {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "demo" => Ok(Self::Demo),
      "live" => Ok(Self::Live),
      other => Err(eyre!("Unknown environment '{}', expected demo or live", other)),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub enabled: bool,
  /// Database location. Defaults to a per-credential file under the user
  /// data directory, so two accounts never read each other's responses.
  pub path: Option<PathBuf>,
  pub ttl_secs: u64,
  #[serde(deserialize_with = "deserialize_uppercase_set")]
  pub cacheable_methods: BTreeSet<String>,
  pub cacheable_status_codes: BTreeSet<u16>,
  pub allow_stale: bool,
  pub force_cache: bool,
  pub key_strategy: KeyStrategyKind,
}

impl Default for CacheConfig {
  fn default() -> Self {
    let policy = CachePolicy::default();
    Self {
      enabled: true,
      path: None,
      ttl_secs: policy.ttl.num_seconds() as u64,
      cacheable_methods: policy.cacheable_methods,
      cacheable_status_codes: policy.cacheable_status_codes,
      allow_stale: policy.allow_stale,
      force_cache: policy.force_cache,
      key_strategy: KeyStrategyKind::default(),
    }
  }
}

impl CacheConfig {
  pub fn policy(&self) -> CachePolicy {
    CachePolicy {
      cacheable_methods: self.cacheable_methods.clone(),
      cacheable_status_codes: self.cacheable_status_codes.clone(),
      allow_stale: self.allow_stale,
      force_cache: self.force_cache,
      ttl: Duration::seconds(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX).min(i64::MAX / 1000)),
    }
  }
}

fn deserialize_uppercase_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.to_uppercase()).collect())
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./t212.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/t212/config.yaml
  ///
  /// Without a file the defaults are used.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    config.with_env_overrides()?.validated()
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("t212.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("t212").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str::<Self>(contents)?.validated()
  }

  fn validated(self) -> Result<Self> {
    if self.timeout_secs == 0 {
      return Err(eyre!("timeout_secs must be at least 1"));
    }
    Ok(self)
  }

  pub fn timeout(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.timeout_secs)
  }

  /// `ENVIRONMENT` overrides the configured backend.
  fn with_env_overrides(mut self) -> Result<Self> {
    if let Ok(env) = std::env::var("ENVIRONMENT") {
      if !env.trim().is_empty() {
        self.environment = env.parse()?;
      }
    }
    Ok(self)
  }

  /// `https://{environment}.{domain}/api/{version}`
  pub fn base_url(&self) -> String {
    format!(
      "https://{}.{}/api/{}",
      self.environment.as_str(),
      self.domain,
      self.version
    )
  }

  /// Cache database for `credential`: the configured path, or
  /// `<data dir>/t212/<credential scope>/cache.db`.
  pub fn cache_path(&self, credential: &str) -> Result<PathBuf> {
    match &self.cache.path {
      Some(p) => Ok(p.clone()),
      None => Ok(
        crate::cache::SqliteStorage::default_dir()?
          .join(credential_scope(credential))
          .join("cache.db"),
      ),
    }
  }

  /// Get the API key from the environment.
  ///
  /// Checks TRADING212_API_KEY.
  pub fn get_api_key() -> Result<String> {
    std::env::var("TRADING212_API_KEY")
      .map_err(|_| eyre!("Trading 212 API key not found. Set the TRADING212_API_KEY environment variable."))
  }
}

/// Short, non-reversible directory name for a credential.
fn credential_scope(credential: &str) -> String {
  let digest = hex::encode(Sha256::digest(credential.as_bytes()));
  digest[..16].to_string()
}

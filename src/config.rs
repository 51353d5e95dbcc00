use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::DEFAULT_MAX_SIZE;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub lookup: LookupConfig,
  #[serde(default)]
  pub edge: EdgeConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Database file (defaults to $XDG_DATA_HOME/larder/larder.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub max_size: usize,
  pub default_ttl_secs: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_size: DEFAULT_MAX_SIZE,
      default_ttl_secs: 300,
    }
  }
}

impl CacheConfig {
  pub fn default_ttl(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.default_ttl_secs.max(1))
  }
}

/// External product sources, in the order they may be configured.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
  /// Open Food Facts bulk database
  OpenFoodFacts,
  /// UPCitemdb catalogue
  UpcItemDb,
  /// Barcode Lookup paid service
  BarcodeLookup,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
  /// Per-source timeout in milliseconds
  pub timeout_ms: u64,
  /// Sources in priority order
  pub sources: Vec<SourceKind>,
}

impl Default for LookupConfig {
  fn default() -> Self {
    Self {
      timeout_ms: 5000,
      sources: vec![
        SourceKind::OpenFoodFacts,
        SourceKind::UpcItemDb,
        SourceKind::BarcodeLookup,
      ],
    }
  }
}

impl LookupConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
  /// Origin whose GET requests are cached
  pub origin: String,
  /// Cache generation; bump whenever the manifest changes
  pub version: u32,
  /// Asset paths precached at install
  pub manifest: Vec<String>,
  /// Page served to navigations while offline
  pub offline_page: String,
}

impl Default for EdgeConfig {
  fn default() -> Self {
    Self {
      origin: "http://localhost:5173".to_string(),
      version: 1,
      manifest: vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/manifest.json".to_string(),
      ],
      offline_page: "/".to_string(),
    }
  }
}

impl EdgeConfig {
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid edge origin '{}': {}", self.origin, e))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./larder.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/larder/config.yaml
  ///
  /// Without a file every setting takes its default.
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
    // Check current directory
    let local = PathBuf::from("larder.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("larder").join("config.yaml");
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

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.lookup.timeout_ms == 0 {
      return Err(eyre!("lookup.timeout_ms must be greater than zero"));
    }
    Ok(config)
  }

  /// Read an API key from the environment at call time.
  ///
  /// Blank values count as unset.
  pub fn get_api_key(var: &str) -> Option<String> {
    std::env::var(var)
      .ok()
      .map(|v| v.trim().to_string())
      .filter(|v| !v.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("{}").unwrap();
    assert_eq!(config.cache.max_size, 1000);
    assert_eq!(config.cache.default_ttl(), chrono::Duration::minutes(5));
    assert_eq!(config.lookup.timeout(), Duration::from_secs(5));
    assert_eq!(config.lookup.sources.len(), 3);
    assert_eq!(config.edge.version, 1);
    assert!(config.storage.path.is_none());
  }

  #[test]
  fn test_partial_sections_merge_with_defaults() {
    let yaml = r#"
storage:
  path: /tmp/larder-test.db
cache:
  max_size: 50
lookup:
  sources: [upc_item_db, open_food_facts]
edge:
  origin: https://kitchen.example.com
  version: 7
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.cache.max_size, 50);
    assert_eq!(config.cache.default_ttl_secs, 300);
    assert_eq!(
      config.lookup.sources,
      vec![SourceKind::UpcItemDb, SourceKind::OpenFoodFacts]
    );
    assert_eq!(config.lookup.timeout_ms, 5000);
    assert_eq!(
      config.edge.origin_url().unwrap().as_str(),
      "https://kitchen.example.com/"
    );
    assert_eq!(config.edge.version, 7);
    assert_eq!(config.edge.offline_page, "/");
  }

  #[test]
  fn test_rejects_unknown_source_and_zero_timeout() {
    assert!(Config::parse("lookup:\n  sources: [google]\n").is_err());
    assert!(Config::parse("lookup:\n  timeout_ms: 0\n").is_err());
    let bad_origin = Config::parse("edge:\n  origin: not a url\n").unwrap();
    assert!(bad_origin.edge.origin_url().is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/larder.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}

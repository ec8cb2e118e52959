//! Layered configuration: compiled defaults, an optional TOML file, then
//! `SHOWMMR__`-prefixed environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use showmmr_core::{SchemaVariant, SyncMode};

/// File picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "showmmr.toml";

const ENV_PREFIX: &str = "SHOWMMR";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ledger: LedgerConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory holding the per-user ledger files.
    pub dir: PathBuf,
    pub schema: SchemaVariant,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            schema: SchemaVariant::Rich,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub app_id: u32,
    pub request_timeout_secs: u64,
    /// Pause between login and the hello handshake.
    pub handshake_delay_ms: u64,
    /// Attempts made to establish the initial session.
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8570".into(),
            app_id: 570,
            request_timeout_secs: 30,
            handshake_delay_ms: 5_000,
            connect_attempts: 5,
            connect_backoff_ms: 5_000,
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn handshake_delay(&self) -> Duration {
        Duration::from_millis(self.handshake_delay_ms)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Largest page the remote service accepts.
    pub page_size_cap: u32,
    /// Politeness delay between consecutive page requests.
    pub page_interval_ms: u64,
    pub mode: SyncMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size_cap: 20,
            page_interval_ms: 1_000,
            mode: SyncMode::Incremental,
        }
    }
}

impl SyncConfig {
    pub fn page_interval(&self) -> Duration {
        Duration::from_millis(self.page_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for token caches (`<user>.auth`).
    pub dir: PathBuf,
    pub cell_id_file: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            cell_id_file: PathBuf::from("cellid.txt"),
        }
    }
}

impl CacheConfig {
    pub fn token_path(&self, user: &str) -> PathBuf {
        self.dir.join(format!("{user}.auth"))
    }

    pub fn cell_id_path(&self) -> PathBuf {
        self.dir.join(&self.cell_id_file)
    }
}

impl AppConfig {
    /// Load configuration from `path` (required) or the default file (optional),
    /// overlaid with process environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(env);
        let settings = Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()
            .with_context(|| match path {
                Some(path) => format!("failed to read config file {}", path.display()),
                None => "failed to assemble configuration".to_string(),
            })?;
        settings
            .try_deserialize()
            .context("invalid configuration values")
    }

    /// Effective configuration rendered as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration")
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn defaults_without_sources() {
        let config = AppConfig::load_with_env(None, Some(HashMap::new())).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.sync.page_size_cap, 20);
        assert_eq!(config.sync.page_interval(), Duration::from_secs(1));
        assert_eq!(config.remote.handshake_delay(), Duration::from_secs(5));
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(
            &path,
            r#"
[ledger]
dir = "data"
schema = "minimal"

[sync]
mode = "backfill"
page_interval_ms = 0
"#,
        )
        .unwrap();
        let config = AppConfig::load_with_env(Some(&path), Some(HashMap::new())).unwrap();
        assert_eq!(config.ledger.dir, PathBuf::from("data"));
        assert_eq!(config.ledger.schema, SchemaVariant::Minimal);
        assert_eq!(config.sync.mode, SyncMode::Backfill);
        assert_eq!(config.sync.page_interval(), Duration::ZERO);
        assert_eq!(config.remote, RemoteConfig::default());
    }

    #[test]
    fn environment_overrides_file() {
        let env = HashMap::from([
            (
                "SHOWMMR__REMOTE__BASE_URL".to_string(),
                "http://gateway:9000".to_string(),
            ),
            (
                "SHOWMMR__REMOTE__CONNECT_ATTEMPTS".to_string(),
                "2".to_string(),
            ),
        ]);
        let config = AppConfig::load_with_env(None, Some(env)).unwrap();
        assert_eq!(config.remote.base_url, "http://gateway:9000");
        assert_eq!(config.remote.connect_attempts, 2);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(AppConfig::load_with_env(Some(&path), Some(HashMap::new())).is_err());
    }

    #[test]
    fn renders_round_trippable_toml() {
        let rendered = AppConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[remote]"));
        assert!(rendered.contains("base_url = \"http://127.0.0.1:8570\""));
    }

    #[test]
    fn cache_paths_are_per_user() {
        let cache = CacheConfig {
            dir: PathBuf::from("state"),
            ..CacheConfig::default()
        };
        assert_eq!(cache.token_path("alice"), PathBuf::from("state/alice.auth"));
        assert_eq!(cache.cell_id_path(), PathBuf::from("state/cellid.txt"));
    }
}

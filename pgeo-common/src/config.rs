//! Configuration loading and root folder resolution
//!
//! All sections carry serde defaults, so a missing or empty TOML file
//! still yields a usable configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "PGEO_ROOT_FOLDER";

/// File name of the saved address list inside the root folder
pub const SAVED_ADDRESSES_FILE: &str = "saved_addresses.csv";

/// File name of the latest enriched output inside the root folder
pub const ENRICHED_FILE: &str = "enriched_data.csv";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data directory for saved addresses and pipeline output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Logging section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "pgeo_service=info,tower_http=info".to_string()
}

/// External lookup service section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    /// Search endpoint URL
    pub endpoint: String,
    /// User-Agent sent with every request (required by Nominatim usage policy)
    pub user_agent: String,
    /// Minimum time between two outbound lookups
    pub min_interval_ms: u64,
    /// Extra wait after a failed query attempt
    pub backoff_ms: u64,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Country token appended by the fallback queries
    pub country_suffix: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://nominatim.openstreetmap.org/search".to_string(),
            user_agent: "property_geocoder_app".to_string(),
            min_interval_ms: 1000,
            backoff_ms: 1000,
            timeout_secs: 10,
            country_suffix: "USA".to_string(),
        }
    }
}

impl GeocoderConfig {
    /// Apply `PGEO_GEOCODER_ENDPOINT` / `PGEO_GEOCODER_USER_AGENT` overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("PGEO_GEOCODER_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.endpoint = endpoint;
            }
        }
        if let Ok(agent) = std::env::var("PGEO_GEOCODER_USER_AGENT") {
            if !agent.trim().is_empty() {
                self.user_agent = agent;
            }
        }
        self
    }
}

/// Density clustering section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Neighbor radius in kilometers
    pub epsilon_km: f64,
    /// Minimum neighbors (including self) for a core point
    pub min_samples: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            epsilon_km: 0.5,
            min_samples: 3,
        }
    }
}

impl ClusteringConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.epsilon_km.is_finite() || self.epsilon_km <= 0.0 {
            return Err(Error::Config(format!(
                "clustering.epsilon_km must be positive, got {}",
                self.epsilon_km
            )));
        }
        if self.min_samples == 0 {
            return Err(Error::Config(
                "clustering.min_samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5780,
        }
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config `root_folder`
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pgeo"))
        .unwrap_or_else(|| PathBuf::from("./pgeo_data"))
}

/// Per-user config file location (`<config dir>/pgeo/config.toml`)
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pgeo").join("config.toml"))
}

/// Locate the config file for this platform, if one exists
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(path) = user_config_path() {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/pgeo/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load configuration from `path`, or from the platform location when `None`
///
/// A missing file is not an error: defaults are returned with a warning.
/// A file that exists but fails to parse is an error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let path = match path.map(Path::to_path_buf).or_else(find_config_file) {
        Some(p) => p,
        None => {
            debug!("No config file found, using defaults");
            return Ok(TomlConfig::default());
        }
    };

    if !path.exists() {
        warn!("Config file not found: {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.clustering.validate()?;

    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Write configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp = target.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, target)?;
    Ok(())
}

/// Create the root folder if missing
pub fn ensure_root_folder(root: &Path) -> Result<()> {
    if !root.exists() {
        std::fs::create_dir_all(root)?;
        debug!("Created root folder {}", root.display());
    } else if !root.is_dir() {
        return Err(Error::Config(format!(
            "Root folder is not a directory: {}",
            root.display()
        )));
    }
    Ok(())
}

//! Configuration loading and resolution
//!
//! Resolution priority for every setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: the client logs a
//! warning and starts with defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Environment variable overriding the backend base URL
pub const ENV_API_URL: &str = "TRIPNEST_API_URL";
/// Environment variable overriding the local data folder
pub const ENV_DATA_FOLDER: &str = "TRIPNEST_DATA_FOLDER";
/// Environment variable overriding the log level
pub const ENV_LOG_LEVEL: &str = "TRIPNEST_LOG_LEVEL";

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_EVENT_CAPACITY: usize = 256;
const DATABASE_FILE_NAME: &str = "favorites.db";

/// Logging section of the TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level ("trace", "debug", "info", "warn", "error")
    pub level: Option<String>,
}

/// Favorites section of the TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FavoritesSettings {
    /// Timeout for a single favorites request; a timeout counts as a remote failure
    pub request_timeout_ms: Option<u64>,
    /// Buffered events kept for slow EventBus subscribers
    pub event_capacity: Option<usize>,
}

/// On-disk configuration file (`config.toml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    pub api_base_url: Option<String>,
    pub data_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub favorites: FavoritesSettings,
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
    }

    /// Load the config file, falling back to defaults on any problem
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
            debug!("No config directory available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            debug!("Config file not found at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Command-line overrides (highest priority tier)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub data_folder: Option<PathBuf>,
    pub log_level: Option<String>,
    pub config_file: Option<PathBuf>,
}

/// Fully resolved client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub data_folder: PathBuf,
    pub log_level: String,
    pub request_timeout_ms: u64,
    pub event_capacity: usize,
}

impl ClientConfig {
    /// Resolve configuration from CLI → ENV → TOML → defaults
    pub fn resolve(overrides: ConfigOverrides) -> Self {
        let toml_config = TomlConfig::load_or_default(overrides.config_file.as_deref());
        Self::from_sources(overrides, toml_config)
    }

    /// Resolve against an already-loaded TOML config
    pub fn from_sources(overrides: ConfigOverrides, toml_config: TomlConfig) -> Self {
        let api_base_url = overrides
            .api_base_url
            .or_else(|| env_value(ENV_API_URL))
            .or(toml_config.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let data_folder = overrides
            .data_folder
            .or_else(|| env_value(ENV_DATA_FOLDER).map(PathBuf::from))
            .or(toml_config.data_folder)
            .unwrap_or_else(default_data_folder);

        let log_level = overrides
            .log_level
            .or_else(|| env_value(ENV_LOG_LEVEL))
            .or(toml_config.logging.level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            data_folder,
            log_level,
            request_timeout_ms: toml_config
                .favorites
                .request_timeout_ms
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            event_capacity: toml_config
                .favorites
                .event_capacity
                .unwrap_or(DEFAULT_EVENT_CAPACITY),
        }
    }

    /// Path of the local favorites database
    pub fn database_path(&self) -> PathBuf {
        self.data_folder.join(DATABASE_FILE_NAME)
    }

    /// Create the data folder if it does not exist yet
    pub fn ensure_data_folder(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_folder)?;
        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `~/.config/tripnest/config.toml` (or the platform equivalent)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tripnest").join("config.toml"))
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tripnest"))
        .unwrap_or_else(|| PathBuf::from("./tripnest_data"))
}

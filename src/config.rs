//! Engine configuration.
//!
//! Loads settings from a TOML file in the platform data directory and
//! provides the tracing subscriber setup the host process installs at
//! startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Store database file
    pub database_path: PathBuf,
    /// Quick challenge broadcast radius in miles
    pub nearby_radius_miles: f64,
    /// Default log filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: get_data_dir().join("repforge.db"),
            nearby_radius_miles: 5.0,
            log_filter: "info".to_string(),
        }
    }
}

/// Get the engine data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "repforge", "RepForge")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load engine configuration from the default location.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from(&get_config_path())
}

/// Load engine configuration from a specific file.
///
/// A missing file yields the defaults.
pub fn load_config_from(path: &PathBuf) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Save engine configuration to the default location.
pub fn save_config(config: &EngineConfig) -> Result<(), ConfigError> {
    let path = get_config_path();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Install the tracing subscriber for the host process.
///
/// RUST_LOG wins over the configured filter.
pub fn init_tracing(config: &EngineConfig) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

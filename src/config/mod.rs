//! Application configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Config schema version
    pub version: u32,

    /// Data directory path
    pub data_dir: PathBuf,

    /// Base URL of the remote store
    pub api_url: String,

    /// Logging level
    pub log_level: String,

    /// Interval of the timer-driven sync variant, in seconds
    pub sync_interval_secs: u64,
}

impl AppConfig {
    fn target_version() -> u32 {
        1
    }

    /// Load configuration from a specific data directory, creating a default
    /// config on first run
    pub fn load_from(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("inkbook.json");

        if config_path.exists() {
            info!("Loading config from {:?}", config_path);
            let json = fs::read_to_string(&config_path)?;
            let config: AppConfig = serde_json::from_str(&json)?;
            Ok(config)
        } else {
            warn!("No config found, creating default at {:?}", config_path);
            let config = Self::default_with_dir(data_dir.to_path_buf());
            config.save()?;
            Ok(config)
        }
    }

    /// Create default configuration with specific data directory
    pub fn default_with_dir(data_dir: PathBuf) -> Self {
        Self {
            version: Self::target_version(),
            data_dir,
            api_url: "https://api.inkbook.app/v1".to_string(),
            log_level: "info".to_string(),
            sync_interval_secs: 30,
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        // Ensure directory exists
        fs::create_dir_all(&self.data_dir)?;

        let config_path = self.data_dir.join("inkbook.json");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, json)?;
        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Get the path of the record database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("inkbook.db")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

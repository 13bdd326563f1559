//! Device configuration persistence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Device configuration stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier
    pub id: Uuid,

    /// User-friendly device name
    pub name: String,

    /// When this device was first initialized
    pub created_at: DateTime<Utc>,

    /// Operating system
    pub os: String,

    /// Static credential issued by the registration flow; absent until the
    /// device has been registered
    pub device_token: Option<String>,

    /// Engine version that created this config
    pub version: String,
}

impl DeviceConfig {
    /// Create a new device configuration
    pub fn new(name: String, os: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            created_at: Utc::now(),
            os,
            device_token: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Get the configuration file path for the current platform
    pub fn config_path() -> Result<PathBuf, super::DeviceError> {
        let base_path = if cfg!(target_os = "macos") {
            dirs::data_dir()
                .ok_or(super::DeviceError::ConfigPathNotFound)?
                .join("com.inkbook")
        } else if cfg!(target_os = "linux") {
            dirs::config_dir()
                .ok_or(super::DeviceError::ConfigPathNotFound)?
                .join("inkbook")
        } else if cfg!(target_os = "windows") {
            dirs::config_dir()
                .ok_or(super::DeviceError::ConfigPathNotFound)?
                .join("Inkbook")
        } else {
            return Err(super::DeviceError::UnsupportedPlatform);
        };

        Ok(base_path.join("device.json"))
    }

    /// Load configuration from a specific directory
    pub fn load_from(data_dir: &Path) -> Result<Self, super::DeviceError> {
        let path = data_dir.join("device.json");

        if !path.exists() {
            return Err(super::DeviceError::NotInitialized);
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&content)?;

        Ok(config)
    }

    /// Save configuration to a specific directory
    pub fn save_to(&self, data_dir: &Path) -> Result<(), super::DeviceError> {
        // Ensure directory exists
        std::fs::create_dir_all(data_dir)?;

        let path = data_dir.join("device.json");
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }
}

//! Device identity and credentials
//!
//! Every remote call is authenticated with the device-id/device-token pair.
//! An unregistered device has an id but no token; all remote paths
//! short-circuit to cache-only until registration supplies one.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::DeviceConfig;

/// Device operation errors
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device has not been initialized")]
    NotInitialized,

    #[error("could not determine a configuration path for this platform")]
    ConfigPathNotFound,

    #[error("unsupported platform")]
    UnsupportedPlatform,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The credential pair attached to every remote request
#[derive(Debug, Clone)]
pub struct Credentials {
    pub device_id: Uuid,
    pub device_token: String,
}

/// Owns the persisted device identity
pub struct DeviceManager {
    config: RwLock<DeviceConfig>,
    data_dir: PathBuf,
}

impl DeviceManager {
    /// Load the device config from the data directory, creating a fresh
    /// identity on first run
    pub fn init(data_dir: &Path) -> Result<Self, DeviceError> {
        let config = match DeviceConfig::load_from(data_dir) {
            Ok(config) => config,
            Err(DeviceError::NotInitialized) => {
                let config = DeviceConfig::new(
                    hostname().unwrap_or_else(|| "inkbook-device".to_string()),
                    std::env::consts::OS.to_string(),
                );
                config.save_to(data_dir)?;
                info!(device_id = %config.id, "initialized new device identity");
                config
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            config: RwLock::new(config),
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn device_id(&self) -> Uuid {
        self.config.read().expect("device config lock poisoned").id
    }

    /// The credential pair, if the device has been registered
    pub fn credentials(&self) -> Option<Credentials> {
        let config = self.config.read().expect("device config lock poisoned");
        config.device_token.as_ref().map(|token| Credentials {
            device_id: config.id,
            device_token: token.clone(),
        })
    }

    pub fn is_registered(&self) -> bool {
        self.config
            .read()
            .expect("device config lock poisoned")
            .device_token
            .is_some()
    }

    /// Store the token handed out by the registration flow
    pub fn set_device_token(&self, token: String) -> Result<(), DeviceError> {
        let mut config = self.config.write().expect("device config lock poisoned");
        config.device_token = Some(token);
        config.save_to(&self.data_dir)?;
        info!(device_id = %config.id, "device registered");
        Ok(())
    }
}

fn hostname() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn identity_survives_reload() {
        let dir = tempdir().unwrap();
        let first = DeviceManager::init(dir.path()).unwrap();
        let id = first.device_id();
        assert!(!first.is_registered());
        assert!(first.credentials().is_none());

        first.set_device_token("token-123".into()).unwrap();

        let second = DeviceManager::init(dir.path()).unwrap();
        assert_eq!(second.device_id(), id);
        let credentials = second.credentials().unwrap();
        assert_eq!(credentials.device_token, "token-123");
    }
}

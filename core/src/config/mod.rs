//! Configuration persistence
//!
//! Re-exports the shared types from ticktock-types and stores them through
//! confy (`ticktock/config.toml` under the platform config directory).

mod error;

pub use error::ConfigError;
pub use ticktock_types::{DemoConfig, SchedulerConfig};

use std::path::{Path, PathBuf};

use tracing::warn;

const APP_NAME: &str = "ticktock";
const CONFIG_NAME: &str = "config";

/// Extension trait for DemoConfig persistence
pub trait DemoConfigExt: Sized {
    fn load() -> Result<Self, ConfigError>;
    fn load_or_default() -> Self;
    fn load_from(path: &Path) -> Result<Self, ConfigError>;
    fn save(&self) -> Result<(), ConfigError>;
    fn save_to(&self, path: &Path) -> Result<(), ConfigError>;
    fn config_path() -> Result<PathBuf, ConfigError>;
}

impl DemoConfigExt for DemoConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(confy::load(APP_NAME, CONFIG_NAME)?)
    }

    /// Unreadable configuration falls back to defaults
    fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|err| {
            warn!(error = %err, "Using default configuration");
            Self::default()
        })
    }

    fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Ok(confy::load_path(path)?)
    }

    fn save(&self) -> Result<(), ConfigError> {
        confy::store(APP_NAME, CONFIG_NAME, self).map_err(ConfigError::Save)
    }

    fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        confy::store_path(path, self).map_err(ConfigError::Save)
    }

    fn config_path() -> Result<PathBuf, ConfigError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME).map_err(ConfigError::Locate)
    }
}

//! Configuration Loader
//!
//! Locates `osslbind.toml` and loads it, falling back to defaults when no file exists.

use crate::bridge::BridgeConfig;
use crate::{ConfigResult, CONFIG_FILE_NAME};
use std::path::{Path, PathBuf};

/// Configuration loader
///
/// Looks for `osslbind.toml` in the start directory and then in each parent.
/// A missing file is not an error: the default configuration is returned.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Overlay applied on top of whatever was loaded from disk
    overrides: Option<BridgeConfig>,
}

/// Loaded configuration and where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Effective configuration
    pub config: BridgeConfig,

    /// File the configuration was read from, if any
    pub source: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { overrides: None }
    }

    /// Apply `overrides` on top of the file configuration (caller-supplied settings)
    pub fn with_overrides(mut self, overrides: BridgeConfig) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find osslbind.toml.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<BridgeConfig> {
        Ok(self.locate(start_dir)?.config)
    }

    /// Same as [`load_from_directory`](Self::load_from_directory), also reporting the source file
    pub fn locate(&self, start_dir: &Path) -> ConfigResult<LoadedConfig> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let config = BridgeConfig::load_from_file(&config_path)?;
                return Ok(LoadedConfig {
                    config: self.apply_overrides(config)?,
                    source: Some(config_path),
                });
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => {
                    return Ok(LoadedConfig {
                        config: self.apply_overrides(BridgeConfig::default())?,
                        source: None,
                    });
                }
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<BridgeConfig> {
        let config = BridgeConfig::load_from_file(config_path)?;
        self.apply_overrides(config)
    }

    fn apply_overrides(&self, mut config: BridgeConfig) -> ConfigResult<BridgeConfig> {
        if let Some(overrides) = &self.overrides {
            config.merge(overrides);
            config.validate()?;
        }
        Ok(config)
    }
}

//! Bridge Configuration (osslbind.toml)
//!
//! Every section and field is optional; accessors on [`BridgeConfig`] fall back
//! to the native library's own defaults.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Minimum passphrase length enforced by the native PEM routines
pub const DEFAULT_MIN_PASSPHRASE_LENGTH: usize = 4;

/// Size of the bounded error message buffer (BUFSIZ on most platforms)
pub const DEFAULT_MESSAGE_CAPACITY: usize = 8192;

/// Smallest message capacity accepted by validation
pub const MIN_MESSAGE_CAPACITY: usize = 64;

/// Library names tried when none are configured
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["crypto", "libcrypto.so.3", "libcrypto.so.1.1"];

/// Bridge configuration from osslbind.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Passphrase callback policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<PassphraseConfig>,

    /// Error rendering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorsConfig>,

    /// Native library discovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<NativeConfig>,
}

/// Passphrase callback policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct PassphraseConfig {
    /// Shortest passphrase handed to the native library (default: 4)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    /// Prompt attempts before giving up (default: unbounded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

/// Error rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ErrorsConfig {
    /// Capacity of the rendered message buffer, terminator included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_capacity: Option<usize>,
}

/// Native library discovery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct NativeConfig {
    /// Library names or file names, tried in order
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub library: Vec<String>,

    /// Directories searched before the platform defaults
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,
}

impl BridgeConfig {
    /// Load bridge configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the bridge configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(passphrase) = &self.passphrase {
            if passphrase
                .min_length
                .is_some_and(|len| len < DEFAULT_MIN_PASSPHRASE_LENGTH)
            {
                return Err(ConfigError::InvalidValue {
                    field: "passphrase.min_length".to_string(),
                    reason: format!("must be at least {}", DEFAULT_MIN_PASSPHRASE_LENGTH),
                });
            }
            if passphrase.max_attempts == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "passphrase.max_attempts".to_string(),
                    reason: "must be at least 1 (omit it for unbounded retry)".to_string(),
                });
            }
        }

        if let Some(capacity) = self.errors.as_ref().and_then(|e| e.message_capacity) {
            if capacity < MIN_MESSAGE_CAPACITY {
                return Err(ConfigError::InvalidValue {
                    field: "errors.message_capacity".to_string(),
                    reason: format!("must be at least {}", MIN_MESSAGE_CAPACITY),
                });
            }
        }

        if let Some(native) = &self.native {
            if native.library.iter().any(|name| name.trim().is_empty()) {
                return Err(ConfigError::ValidationError(
                    "native.library entries cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Shortest accepted passphrase
    pub fn min_passphrase_length(&self) -> usize {
        self.passphrase
            .as_ref()
            .and_then(|p| p.min_length)
            .unwrap_or(DEFAULT_MIN_PASSPHRASE_LENGTH)
    }

    /// Prompt attempts before the passphrase callback gives up, if bounded
    pub fn max_passphrase_attempts(&self) -> Option<u32> {
        self.passphrase.as_ref().and_then(|p| p.max_attempts)
    }

    /// Capacity of the rendered error message buffer
    pub fn message_capacity(&self) -> usize {
        self.errors
            .as_ref()
            .and_then(|e| e.message_capacity)
            .unwrap_or(DEFAULT_MESSAGE_CAPACITY)
    }

    /// Library names to try, in order
    pub fn library_names(&self) -> Vec<String> {
        match &self.native {
            Some(native) if !native.library.is_empty() => native.library.clone(),
            _ => DEFAULT_LIBRARY_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Extra library search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        self.native
            .as_ref()
            .map(|n| n.search_paths.as_slice())
            .unwrap_or(&[])
    }

    /// Merge another config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &BridgeConfig) {
        if other.passphrase.is_some() {
            self.passphrase = other.passphrase.clone();
        }
        if other.errors.is_some() {
            self.errors = other.errors.clone();
        }
        if other.native.is_some() {
            self.native = other.native.clone();
        }
    }
}

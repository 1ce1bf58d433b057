//! osslbind Configuration
//!
//! Typed configuration for the native boundary layer, stored in `osslbind.toml`:
//! - Passphrase policy (minimum length, retry bound)
//! - Error rendering (bounded message capacity)
//! - Native library discovery (library names, extra search paths)
//!
//! The debug flag is intentionally absent: it is toggled at runtime only.
//!
//! # Example
//!
//! ```no_run
//! use osslbind_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! assert!(config.min_passphrase_length() >= 1);
//! ```

pub mod bridge;
pub mod loader;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Name of the configuration file searched for by [`ConfigLoader`]
pub const CONFIG_FILE_NAME: &str = "osslbind.toml";

pub use bridge::{
    BridgeConfig, ErrorsConfig, NativeConfig, PassphraseConfig, DEFAULT_LIBRARY_NAMES,
    DEFAULT_MESSAGE_CAPACITY, DEFAULT_MIN_PASSPHRASE_LENGTH, MIN_MESSAGE_CAPACITY,
};
pub use loader::{ConfigLoader, LoadedConfig};

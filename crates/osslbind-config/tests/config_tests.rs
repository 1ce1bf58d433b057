//! Configuration loading and validation tests

use osslbind_config::{BridgeConfig, ConfigError, ConfigLoader, CONFIG_FILE_NAME};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> std::path::PathBuf {
    let config_path = dir.join(CONFIG_FILE_NAME);
    fs::write(&config_path, content).unwrap();
    config_path
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_when_no_config_exists() {
    let temp_dir = TempDir::new().unwrap();

    let loaded = ConfigLoader::new().locate(temp_dir.path()).unwrap();

    assert_eq!(loaded.config, BridgeConfig::default());
}

#[test]
fn test_load_from_nested_subdirectory() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[errors]
message_capacity = 512
"#,
    );

    let nested = temp_dir.path().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();

    let config = ConfigLoader::new().load_from_directory(&nested).unwrap();
    assert_eq!(config.message_capacity(), 512);
}

#[test]
fn test_load_missing_file_reports_path() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    let result = ConfigLoader::new().load_from_file(&missing);
    assert!(matches!(result, Err(ConfigError::NotFound(path)) if path == missing));
}

#[test]
fn test_invalid_toml_is_reported_with_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[passphrase\nmin_length = ");

    let result = BridgeConfig::load_from_file(&path);
    assert!(matches!(result, Err(ConfigError::TomlParseError { file, .. }) if file == path));
}

// ============================================================================
// Validation
// ============================================================================

#[rstest]
#[case("[passphrase]\nmin_length = 0\n", "passphrase.min_length")]
#[case("[passphrase]\nmin_length = 3\n", "passphrase.min_length")]
#[case("[passphrase]\nmax_attempts = 0\n", "passphrase.max_attempts")]
#[case("[errors]\nmessage_capacity = 8\n", "errors.message_capacity")]
fn test_invalid_values_rejected(#[case] content: &str, #[case] expected_field: &str) {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), content);

    match BridgeConfig::load_from_file(&path) {
        Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected_field),
        other => panic!("expected InvalidValue, got {:?}", other),
    }
}

#[test]
fn test_min_length_may_only_raise_native_floor() {
    let floor: BridgeConfig = toml::from_str("[passphrase]\nmin_length = 4\n").unwrap();
    assert!(floor.validate().is_ok());

    let raised: BridgeConfig = toml::from_str("[passphrase]\nmin_length = 12\n").unwrap();
    assert!(raised.validate().is_ok());
    assert_eq!(raised.min_passphrase_length(), 12);

    let lowered: BridgeConfig = toml::from_str("[passphrase]\nmin_length = 1\n").unwrap();
    match lowered.validate() {
        Err(ConfigError::InvalidValue { field, reason }) => {
            assert_eq!(field, "passphrase.min_length");
            assert_eq!(reason, "must be at least 4");
        }
        other => panic!("expected InvalidValue, got {:?}", other),
    }
}

#[test]
fn test_empty_library_name_rejected() {
    let config: BridgeConfig = toml::from_str("[native]\nlibrary = [\"\"]\n").unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn test_native_section_defaults_library_names() {
    let config: BridgeConfig =
        toml::from_str("[native]\nsearch_paths = [\"/opt/ssl/lib\"]\n").unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.library_names()[0], "crypto");
    assert_eq!(config.search_paths().len(), 1);
}

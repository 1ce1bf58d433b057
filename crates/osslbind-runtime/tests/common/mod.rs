//! Shared test utilities for the osslbind runtime tests

#![allow(dead_code)]

use osslbind_config::{BridgeConfig, PassphraseConfig};
use osslbind_runtime::{Bridge, Certificate, SimLibrary, Value};

// Re-export testing utilities
pub use pretty_assertions::{assert_eq, assert_ne};

/// Bridge over a fresh simulated library with default configuration
pub fn sim_bridge() -> Bridge<SimLibrary> {
    bridge_with(BridgeConfig::default())
}

/// Bridge over a fresh simulated library with `config`
pub fn bridge_with(config: BridgeConfig) -> Bridge<SimLibrary> {
    match Bridge::new(SimLibrary::new(), config) {
        Ok(bridge) => bridge,
        Err(err) => panic!("bridge setup failed: {}", err),
    }
}

/// Configuration bounding passphrase prompts to `max_attempts`
pub fn bounded_passphrase(max_attempts: u32) -> BridgeConfig {
    BridgeConfig {
        passphrase: Some(PassphraseConfig {
            min_length: None,
            max_attempts: Some(max_attempts),
        }),
        ..Default::default()
    }
}

/// Certificate value with a recognizable DER body
pub fn cert(tag: u8) -> Value {
    Value::Certificate(Certificate::from_der(vec![0x30, 0x03, 0x02, 0x01, tag]))
}

/// `n` distinct certificates, tagged 0..n
pub fn certs(n: u8) -> Vec<Value> {
    (0..n).map(cert).collect()
}

// Error channel and debug flag tests
//
// Native errors are pushed onto the simulated queue, then raised through the
// bridge's error channel.

mod common;

use common::{assert_eq, bridge_with, sim_bridge};
use osslbind_config::{BridgeConfig, ErrorsConfig};
use osslbind_runtime::native::ErrorQueue;
use osslbind_runtime::{raise, Bridge, BridgeError, ErrorKind, SimLibrary};
use rstest::rstest;

const STORE_ERROR: ErrorKind = ErrorKind::new("X509StoreError");

#[test]
fn test_prefix_only_when_queue_empty() {
    let bridge = sim_bridge();
    let err = raise!(bridge.error_channel(), ErrorKind::GENERIC, "cannot load {}", "cert.pem");
    assert_eq!(err.to_string(), "cannot load cert.pem");
    assert!(err.is_kind(ErrorKind::GENERIC));
}

#[test]
fn test_prefix_and_reason() {
    let bridge = sim_bridge();
    bridge.native().push_error("PEM", "PEM_read_bio", "no start line");

    let err = raise!(bridge.error_channel(), STORE_ERROR, "add_file");
    assert_eq!(err.to_string(), "add_file: no start line");
    assert!(err.is_kind(STORE_ERROR));
}

#[test]
fn test_reason_without_prefix_has_no_separator() {
    let bridge = sim_bridge();
    bridge.native().push_error("X509", "X509_verify", "bad signature");

    let err = raise!(bridge.error_channel(), ErrorKind::GENERIC);
    assert_eq!(err.to_string(), "bad signature");
}

#[test]
fn test_nothing_to_report_is_empty_message() {
    let bridge = sim_bridge();
    let err = bridge.raise(ErrorKind::GENERIC, None);
    assert_eq!(err.to_string(), "");
}

#[test]
fn test_debug_renders_full_diagnostic() {
    let bridge = sim_bridge();
    bridge.set_debug(true);
    let code = bridge.native().push_error("PEM", "PEM_read_bio", "no start line");

    let err = raise!(bridge.error_channel(), ErrorKind::GENERIC, "read");
    assert_eq!(
        err.to_string(),
        format!("read: error:{:08X}:PEM:PEM_read_bio:no start line", code)
    );
}

#[test]
fn test_unknown_reason_falls_back_to_code() {
    let bridge = sim_bridge();
    bridge.native().push_raw_error(0x0600_0FFF);

    let err = bridge.raise(ErrorKind::GENERIC, None);
    assert_eq!(err.to_string(), "error:06000FFF");
}

#[test]
fn test_only_one_entry_reported_and_queue_cleared() {
    let bridge = sim_bridge();
    bridge.native().push_error("ASN1", "d2i", "first failure");
    bridge.native().push_error("ASN1", "d2i", "second failure");
    bridge.native().push_error("ASN1", "d2i", "third failure");

    let err = bridge.raise(ErrorKind::GENERIC, None);
    assert_eq!(err.to_string(), "first failure");
    assert_eq!(bridge.native().pending_errors(), 0);
}

#[test]
fn test_stale_entries_do_not_leak_into_next_error() {
    let bridge = sim_bridge();
    bridge.native().push_error("EVP", "EVP_DigestInit", "unknown digest");
    let _ = bridge.raise(ErrorKind::GENERIC, Some(format_args!("digest")));

    let err = bridge.raise(ErrorKind::GENERIC, Some(format_args!("cipher")));
    assert_eq!(err.to_string(), "cipher");
    assert_eq!(bridge.native().get_error(), None);
}

#[rstest]
#[case(64, 63)]
#[case(128, 127)]
#[case(8192, 300)]
fn test_message_bounded_by_capacity(#[case] capacity: usize, #[case] expected_len: usize) {
    let bridge = bridge_with(BridgeConfig {
        errors: Some(ErrorsConfig {
            message_capacity: Some(capacity),
        }),
        ..Default::default()
    });
    bridge.native().push_error("SSL", "ssl3_read_bytes", &"r".repeat(200));

    let err = raise!(bridge.error_channel(), ErrorKind::GENERIC, "{}", "p".repeat(98));
    assert_eq!(err.to_string().len(), expected_len);
    assert!(err.to_string().starts_with("ppp"));
}

#[test]
fn test_error_propagates_with_question_mark() {
    fn load(bridge: &Bridge<SimLibrary>) -> Result<(), BridgeError> {
        bridge.native().push_error("BIO", "BIO_new_file", "no such file");
        Err(raise!(bridge.error_channel(), ErrorKind::GENERIC, "open"))
    }

    let bridge = sim_bridge();
    match load(&bridge) {
        Err(BridgeError::Library { kind, message }) => {
            assert_eq!(kind, ErrorKind::GENERIC);
            assert_eq!(message, "open: no such file");
        }
        other => panic!("expected library error, got {:?}", other),
    }
}

#[test]
fn test_debug_flag_enables_leak_checking_once() {
    let bridge = sim_bridge();
    assert!(!bridge.debug());

    assert!(bridge.set_debug(true));
    assert!(bridge.set_debug(true));
    assert!(bridge.debug());
    assert_eq!(bridge.native().leak_check_calls(), vec![true]);

    assert!(!bridge.set_debug(false));
    assert!(!bridge.set_debug(false));
    assert_eq!(bridge.native().leak_check_calls(), vec![true, false]);
}

#[test]
fn test_disabling_never_enabled_debug_is_noop() {
    let bridge = sim_bridge();
    bridge.set_debug(false);
    assert!(bridge.native().leak_check_calls().is_empty());
}

// Certificate sequence conversion tests
//
// The simulated library counts live native allocations, so every failure
// path can assert that the partially built stack was released.

mod common;

use common::{assert_eq, assert_ne, cert, certs, sim_bridge};
use osslbind_runtime::ffi::marshal::{from_native_stack, NOT_A_CERTIFICATE};
use osslbind_runtime::{BridgeError, CertificateApi, ErrorKind, Protected, SimLibrary, Value};
use rstest::rstest;

#[rstest]
#[case(1)]
#[case(3)]
#[case(10)]
fn test_n_certificates_in_order(#[case] n: u8) {
    let bridge = sim_bridge();
    let api = SimLibrary::new();
    let input = certs(n);

    let stack = bridge.to_native_stack(&api, &Value::array(input.clone())).unwrap();
    assert_eq!(stack.len(), n as usize);
    for (index, original) in input.iter().enumerate() {
        let Value::Certificate(original) = original else {
            unreachable!()
        };
        let copy = stack.get(index).unwrap();
        assert_eq!(copy.der(), original.der());
    }

    drop(stack);
    assert_eq!(api.live_allocations(), 0);
}

#[test]
fn test_elements_are_duplicates_not_aliases() {
    let bridge = sim_bridge();
    let api = SimLibrary::new();
    let shared = cert(9);
    let Value::Certificate(original) = &shared else {
        unreachable!()
    };

    let stack = bridge
        .to_native_stack(&api, &Value::array(vec![shared.clone(), shared.clone()]))
        .unwrap();
    let first = stack.get(0).unwrap();
    let second = stack.get(1).unwrap();

    assert_ne!(first.id(), second.id());
    assert_ne!(first.der().as_ptr(), original.der().as_ptr());
    assert_ne!(first.der().as_ptr(), second.der().as_ptr());
    assert_eq!(api.live_allocations(), 3);
}

#[test]
fn test_freeing_native_stack_leaves_managed_certificates_intact() {
    let bridge = sim_bridge();
    let api = SimLibrary::new();
    let input = Value::array(certs(2));

    let raw = bridge.to_native_stack(&api, &input).unwrap().into_raw();
    api.free_stack(raw);

    assert_eq!(input, Value::array(certs(2)));
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(4)]
fn test_non_certificate_rolls_back(#[case] position: usize) {
    let bridge = sim_bridge();
    let api = SimLibrary::new();
    let mut input = certs(5);
    input.insert(position, Value::from("not a certificate"));

    let err = bridge.to_native_stack(&api, &Value::array(input)).unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch { .. }));
    assert_eq!(err.to_string(), NOT_A_CERTIFICATE);
    assert_eq!(api.live_allocations(), 0);
}

#[rstest]
#[case(Value::Null)]
#[case(Value::from("cert.pem"))]
#[case(Value::Number(3.0))]
fn test_non_sequence_fails_fast(#[case] input: Value) {
    let bridge = sim_bridge();
    let api = SimLibrary::new();

    let err = bridge.to_native_stack(&api, &input).unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch { .. }));
    assert!(err.to_string().contains("expected Array"));
    assert_eq!(api.live_allocations(), 0);
}

#[test]
fn test_stack_allocation_failure_raises_library_error() {
    let bridge = sim_bridge();
    bridge.native().fail_next_stack();

    let err = bridge
        .to_native_stack(bridge.native(), &Value::array(certs(2)))
        .unwrap_err();
    assert!(err.is_kind(ErrorKind::GENERIC));
    assert_eq!(err.to_string(), "malloc failure");
    assert_eq!(bridge.native().live_allocations(), 0);
}

#[test]
fn test_duplication_failure_releases_partial_stack() {
    let bridge = sim_bridge();
    bridge.native().fail_duplication(true);

    let err = bridge
        .to_native_stack(bridge.native(), &Value::array(certs(3)))
        .unwrap_err();
    assert!(err.is_kind(ErrorKind::GENERIC));
    assert_eq!(err.to_string(), "malloc failure");
    assert_eq!(bridge.native().live_allocations(), 0);
    assert_eq!(bridge.native().pending_errors(), 0);
}

#[test]
fn test_protected_conversion_captures_type_error() {
    let bridge = sim_bridge();
    let api = SimLibrary::new();
    let input = Value::array(vec![cert(1), Value::Bool(true)]);

    match bridge.protect_to_native_stack(&api, &input) {
        Protected::Failed(exc) => assert_eq!(exc.message(), NOT_A_CERTIFICATE),
        Protected::Value(stack) => panic!("expected failure, got {:?}", stack),
    }
    assert_eq!(api.live_allocations(), 0);
}

#[test]
fn test_back_to_managed_preserves_order() {
    let bridge = sim_bridge();
    let api = SimLibrary::new();
    let input = Value::array(certs(4));

    let stack = bridge.to_native_stack(&api, &input).unwrap();
    let back = from_native_stack(&api, Some(stack.as_raw()));
    assert_eq!(back, input);
}

//! Certificate sequence marshaling - managed ↔ native stack conversions
//!
//! - [`to_native_stack`]: managed array of certificates → owned native stack
//! - [`from_native_stack`]: native stack → managed array of certificates
//!
//! # Memory Safety
//!
//! - Every element pushed is an independent duplicate; the managed
//!   certificates are never aliased by the native stack
//! - A partially built stack is released with all its elements on any failure
//! - [`NativeStack`] frees the stack on `Drop` unless ownership is handed off
//!   with [`NativeStack::into_raw`]

use crate::error::{BridgeError, ErrorChannel, ErrorKind};
use crate::native::CertificateApi;
use crate::value::Value;
use std::fmt;
use std::mem::ManuallyDrop;

/// Message of the type error raised for a non-certificate element
pub const NOT_A_CERTIFICATE: &str = "object other than a certificate found in sequence";

/// Owned native certificate stack
pub struct NativeStack<'a, C: CertificateApi> {
    api: &'a C,
    raw: ManuallyDrop<C::Stack>,
}

impl<'a, C: CertificateApi> NativeStack<'a, C> {
    fn new(api: &'a C, raw: C::Stack) -> Self {
        Self {
            api,
            raw: ManuallyDrop::new(raw),
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.api.len(&self.raw)
    }

    /// Check if the stack has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`
    pub fn get(&self, index: usize) -> Option<&C::Certificate> {
        self.api.get(&self.raw, index)
    }

    /// Borrow the native stack, e.g. to pass it to a native call
    pub fn as_raw(&self) -> &C::Stack {
        &self.raw
    }

    /// Hand ownership of the native stack to the caller
    pub fn into_raw(self) -> C::Stack {
        let mut this = ManuallyDrop::new(self);
        // `this` is never dropped, so the stack is taken exactly once
        unsafe { ManuallyDrop::take(&mut this.raw) }
    }
}

impl<C: CertificateApi> Drop for NativeStack<'_, C> {
    fn drop(&mut self) {
        let raw = unsafe { ManuallyDrop::take(&mut self.raw) };
        self.api.free_stack(raw);
    }
}

impl<C: CertificateApi> fmt::Debug for NativeStack<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeStack").field("len", &self.len()).finish()
    }
}

/// Convert a managed array of certificates into a native stack
///
/// The container type is checked before anything is allocated. Elements are
/// duplicated and pushed in order. A non-certificate element releases the
/// stack built so far and fails with a type mismatch; native allocation
/// failures are raised through `channel`.
pub fn to_native_stack<'a, C: CertificateApi>(
    channel: &ErrorChannel<'_>,
    api: &'a C,
    sequence: &Value,
) -> Result<NativeStack<'a, C>, BridgeError> {
    let items = match sequence {
        Value::Array(items) => items,
        other => {
            return Err(BridgeError::type_mismatch(format!(
                "wrong argument type {} (expected Array)",
                other.type_name()
            )))
        }
    };

    let raw = api
        .new_stack()
        .ok_or_else(|| crate::raise!(channel, ErrorKind::GENERIC))?;
    let mut stack = NativeStack::new(api, raw);

    for item in items.iter() {
        let Value::Certificate(cert) = item else {
            drop(stack);
            return Err(BridgeError::type_mismatch(NOT_A_CERTIFICATE));
        };
        let copy = api
            .duplicate(cert)
            .ok_or_else(|| crate::raise!(channel, ErrorKind::GENERIC))?;
        if let Err(copy) = api.push(&mut stack.raw, copy) {
            api.free_certificate(copy);
            return Err(crate::raise!(channel, ErrorKind::GENERIC));
        }
    }

    Ok(stack)
}

/// Convert a native stack back into a managed array of certificates
///
/// An absent stack yields an empty array.
pub fn from_native_stack<C: CertificateApi>(api: &C, stack: Option<&C::Stack>) -> Value {
    let Some(stack) = stack else {
        return Value::array(Vec::new());
    };
    let certs = (0..api.len(stack))
        .filter_map(|index| api.get(stack, index))
        .map(|cert| Value::Certificate(api.to_managed(cert)))
        .collect();
    Value::array(certs)
}

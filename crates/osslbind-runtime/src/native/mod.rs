//! Seam between the boundary core and the native cryptography library
//!
//! The core never calls the native library directly. Everything it needs is
//! expressed as a trait here, implemented by [`libcrypto::LibCrypto`] for a
//! dynamically loaded libcrypto and by [`sim::SimLibrary`] for an in-process
//! simulation.

pub mod libcrypto;
pub mod sim;

use crate::ffi::types::{ErrorCode, ExDataSlot};
use crate::value::Certificate;
use std::ffi::{c_void, CStr};
use std::os::raw::c_int;

/// Process-wide native error queue
pub trait ErrorQueue {
    /// Pop one entry; `None` when the queue is empty
    fn get_error(&self) -> Option<ErrorCode>;

    /// Discard every pending entry
    fn clear_error(&self);

    /// Full diagnostic text: code plus library, function and reason names
    fn error_string(&self, code: ErrorCode) -> String;

    /// Short reason text, if the library knows one for `code`
    fn reason_error_string(&self, code: ErrorCode) -> Option<String>;
}

/// Native allocator instrumentation
pub trait MemoryDebug {
    /// Turn allocation tracking for leak reports on or off
    fn set_leak_checking(&self, enabled: bool);
}

/// The native library's own passphrase handling
pub trait DefaultPassphrase {
    /// Fill `buf` with a passphrase and return its length, or a negative value
    ///
    /// With `password` set, that password is copied (truncated to `buf`).
    /// Otherwise the library's default prompt is used.
    fn default_passphrase(&self, buf: &mut [u8], encrypt: bool, password: Option<&CStr>)
        -> c_int;
}

/// Everything the core needs from a loaded native library
pub trait NativeLibrary: ErrorQueue + MemoryDebug + DefaultPassphrase {
    /// Load human-readable error strings; called once by [`Bridge::new`](crate::Bridge::new)
    fn load_error_strings(&self) {}

    /// Version banner, e.g. "OpenSSL 3.0.13 30 Jan 2024"
    fn version_text(&self) -> String;

    /// Numeric version, e.g. `0x300000d0`
    fn version_number(&self) -> u64;
}

/// Native certificate stacks and certificate duplication
///
/// A `Stack` owns its elements; [`free_stack`](CertificateApi::free_stack)
/// releases the stack together with every element still on it.
pub trait CertificateApi {
    /// Independently owned native certificate
    type Certificate;
    /// Native stack of certificates
    type Stack;

    /// Allocate an empty stack
    fn new_stack(&self) -> Option<Self::Stack>;

    /// Duplicate a managed certificate into a new native certificate
    fn duplicate(&self, cert: &Certificate) -> Option<Self::Certificate>;

    /// Push `cert`, handing it back if the stack could not grow
    fn push(
        &self,
        stack: &mut Self::Stack,
        cert: Self::Certificate,
    ) -> Result<(), Self::Certificate>;

    /// Release a certificate that never made it onto a stack
    fn free_certificate(&self, cert: Self::Certificate);

    /// Number of elements
    fn len(&self, stack: &Self::Stack) -> usize;

    /// Element at `index`
    fn get<'s>(&self, stack: &'s Self::Stack, index: usize) -> Option<&'s Self::Certificate>;

    /// Managed copy of a native certificate
    fn to_managed(&self, cert: &Self::Certificate) -> Certificate;

    /// Release the stack and every element on it
    fn free_stack(&self, stack: Self::Stack);
}

/// Raw accessors used from inside the native verification callback
///
/// The verification callback signature carries no user pointer, so these are
/// associated functions: the only state they see is the context pointer the
/// native library passed in.
pub trait StoreContextApi: 'static {
    /// Native verification context (`X509_STORE_CTX`)
    type StoreCtx;

    /// Register a new ex-data slot for store contexts
    fn new_ex_index(name: &'static CStr) -> Option<ExDataSlot>;

    /// Association stored on the context itself
    ///
    /// # Safety
    ///
    /// `ctx` must be a live context passed in by the native library.
    unsafe fn ctx_ex_data(ctx: *mut Self::StoreCtx, slot: ExDataSlot) -> *mut c_void;

    /// Association stored on the context's parent store
    ///
    /// # Safety
    ///
    /// `ctx` must be a live context passed in by the native library.
    unsafe fn store_ex_data(ctx: *mut Self::StoreCtx, slot: ExDataSlot) -> *mut c_void;

    /// Recorded verification error
    ///
    /// # Safety
    ///
    /// `ctx` must be a live context passed in by the native library.
    unsafe fn error(ctx: *mut Self::StoreCtx) -> c_int;

    /// Overwrite the recorded verification error
    ///
    /// # Safety
    ///
    /// `ctx` must be a live context passed in by the native library.
    unsafe fn set_error(ctx: *mut Self::StoreCtx, error: c_int);

    /// Depth in the chain of the certificate being checked
    ///
    /// # Safety
    ///
    /// `ctx` must be a live context passed in by the native library.
    unsafe fn error_depth(ctx: *mut Self::StoreCtx) -> c_int;
}

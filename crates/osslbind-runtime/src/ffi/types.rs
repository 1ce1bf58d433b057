//! Native-side types and constants shared by the callback protocols
//!
//! These mirror the values the native library uses on its side of the
//! boundary; they are part of its ABI and must not be renumbered.

use std::os::raw::{c_int, c_ulong};

/// Packed native error code as returned by `ERR_get_error` (0 means "no error")
pub type ErrorCode = c_ulong;

/// Verification result: no error recorded
pub const X509_V_OK: c_int = 0;

/// Verification result: certificate rejected by the application
pub const X509_V_ERR_CERT_REJECTED: c_int = 28;

/// `CRYPTO_get_ex_new_index` class for `X509_STORE_CTX`
pub const CRYPTO_EX_INDEX_X509_STORE_CTX: c_int = 5;

/// `CRYPTO_mem_ctrl` mode enabling allocation tracking
pub const CRYPTO_MEM_CHECK_ON: c_int = 0x1;

/// `CRYPTO_mem_ctrl` mode disabling allocation tracking
pub const CRYPTO_MEM_CHECK_OFF: c_int = 0x0;

/// Index into a native extensible side-table ("ex_data")
///
/// Obtained once per process from the native library and used as the key
/// under which a callback association is stored on a native context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExDataSlot(c_int);

impl ExDataSlot {
    /// Wrap a raw slot index; negative values mean registration failed
    pub fn from_raw(index: c_int) -> Option<Self> {
        (index >= 0).then_some(Self(index))
    }

    /// Raw slot index as passed to the native accessors
    pub fn as_raw(self) -> c_int {
        self.0
    }
}

/// Split a packed error code into (library, function, reason) numbers
///
/// Uses the classic `ERR_PACK` layout: 8 bits library, 12 bits function,
/// 12 bits reason.
pub fn unpack_error(code: ErrorCode) -> (u32, u32, u32) {
    let code = code as u64;
    (
        ((code >> 24) & 0xff) as u32,
        ((code >> 12) & 0xfff) as u32,
        (code & 0xfff) as u32,
    )
}

/// Inverse of [`unpack_error`]
pub fn pack_error(library: u32, function: u32, reason: u32) -> ErrorCode {
    let packed = ((library as u64 & 0xff) << 24)
        | ((function as u64 & 0xfff) << 12)
        | (reason as u64 & 0xfff);
    packed as ErrorCode
}

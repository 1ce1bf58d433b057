//! Two-phase binary → hex encoder
//!
//! Callers first ask for the output length, size their buffer, then fill it.
//! Output is lowercase, high nibble first, and NUL-terminated so it can be
//! handed to native code as a C string.

use crate::ffi::safety::check_null;
use std::ffi::CString;
use std::os::raw::{c_char, c_int};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Hex encoding errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    /// Input length was negative
    NegativeLength(i64),
    /// Doubling the input length overflowed
    Overflow(usize),
}

impl std::fmt::Display for HexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HexError::NegativeLength(len) => write!(f, "Negative input length: {}", len),
            HexError::Overflow(len) => write!(f, "Hex length of {} bytes overflows", len),
        }
    }
}

impl std::error::Error for HexError {}

/// Encoded length of `input_len` bytes (without the terminator)
pub fn encoded_len(input_len: usize) -> Result<usize, HexError> {
    input_len
        .checked_mul(2)
        .ok_or(HexError::Overflow(input_len))
}

/// Encoded length for a native `int` length, rejecting negatives and `int` overflow
pub fn checked_native_len(input_len: c_int) -> Result<c_int, HexError> {
    if input_len < 0 {
        return Err(HexError::NegativeLength(input_len as i64));
    }
    input_len
        .checked_mul(2)
        .ok_or(HexError::Overflow(input_len as usize))
}

/// Encode `input` as hex
///
/// Without `dest`, only the required length (`2 * input.len()`) is computed;
/// nothing is allocated. With `dest`, its contents are replaced by exactly
/// `2 * len + 1` bytes: the digits followed by a NUL terminator. Either way
/// the digit count is returned.
pub fn encode(input: &[u8], dest: Option<&mut Vec<u8>>) -> Result<usize, HexError> {
    let len = encoded_len(input.len())?;
    let Some(dest) = dest else {
        return Ok(len);
    };

    dest.clear();
    dest.reserve_exact(len + 1);
    for byte in input {
        dest.push(HEX_DIGITS[(byte >> 4) as usize]);
        dest.push(HEX_DIGITS[(byte & 0x0f) as usize]);
    }
    dest.push(0);
    Ok(len)
}

/// Encode `input` into an owned lowercase hex string
pub fn to_hex(input: &[u8]) -> String {
    input
        .iter()
        .flat_map(|byte| {
            [
                HEX_DIGITS[(byte >> 4) as usize] as char,
                HEX_DIGITS[(byte & 0x0f) as usize] as char,
            ]
        })
        .collect()
}

/// Native-calling-convention hex encoder
///
/// With a null `hexbuf`, stores the required length in `*hexbuf_len` (when
/// non-null) and returns it. Otherwise allocates `2 * buf_len + 1` bytes,
/// fills them, stores the pointer in `*hexbuf` and the length in
/// `*hexbuf_len`. Returns `-1` for a negative length, an overflowing length,
/// or a null `buf` with non-zero length. Release the buffer with [`free_raw`].
///
/// # Safety
///
/// `buf` must point to `buf_len` readable bytes; `hexbuf` and `hexbuf_len`
/// must be null or valid for writes.
pub unsafe extern "C" fn encode_raw(
    buf: *const c_char,
    buf_len: c_int,
    hexbuf: *mut *mut c_char,
    hexbuf_len: *mut c_int,
) -> c_int {
    let len = match checked_native_len(buf_len) {
        Ok(len) => len,
        Err(_) => return -1,
    };

    if hexbuf.is_null() {
        if !hexbuf_len.is_null() {
            *hexbuf_len = len;
        }
        return len;
    }

    let input: &[u8] = if buf_len == 0 {
        &[]
    } else {
        match check_null(buf) {
            Ok(buf) => std::slice::from_raw_parts(buf.cast::<u8>(), buf_len as usize),
            Err(_) => return -1,
        }
    };

    let mut out = Vec::new();
    if encode(input, Some(&mut out)).is_err() {
        return -1;
    }
    let encoded = match CString::from_vec_with_nul(out) {
        Ok(encoded) => encoded,
        Err(_) => return -1,
    };

    *hexbuf = encoded.into_raw();
    if !hexbuf_len.is_null() {
        *hexbuf_len = len;
    }
    len
}

/// Release a buffer returned by [`encode_raw`]
///
/// # Safety
///
/// `ptr` must be null or a pointer produced by [`encode_raw`] that has not
/// been freed yet.
pub unsafe extern "C" fn free_raw(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

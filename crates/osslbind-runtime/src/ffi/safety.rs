//! Safe wrappers for common FFI patterns
//!
//! Null checks for pointers handed to us by native code, a view over
//! native-owned output buffers, and a bounded text writer for rendering
//! error messages without unbounded allocation.

use std::fmt;
use std::os::raw::{c_char, c_int};

/// Safe wrapper for null pointer checks
pub fn check_null<T>(ptr: *const T) -> Result<*const T, &'static str> {
    if ptr.is_null() {
        Err("Null pointer")
    } else {
        Ok(ptr)
    }
}

/// Safe wrapper for mutable null pointer checks
pub fn check_null_mut<T>(ptr: *mut T) -> Result<*mut T, &'static str> {
    if ptr.is_null() {
        Err("Null pointer")
    } else {
        Ok(ptr)
    }
}

/// Borrow a native output buffer as a byte slice
///
/// Returns `None` for a null pointer or a negative length.
///
/// # Safety
///
/// `ptr` must point to at least `len` writable bytes that stay valid and
/// unaliased for `'a`.
pub unsafe fn native_buffer<'a>(ptr: *mut c_char, len: c_int) -> Option<&'a mut [u8]> {
    let ptr = check_null_mut(ptr).ok()?;
    let len = usize::try_from(len).ok()?;
    Some(std::slice::from_raw_parts_mut(ptr.cast::<u8>(), len))
}

/// Text buffer with a fixed capacity
///
/// Mirrors a `snprintf` into a `char[capacity]`: at most `capacity - 1` bytes
/// of text are kept (one byte is reserved for the terminator native code
/// expects), and writes past that point are silently truncated on a UTF-8
/// character boundary.
#[derive(Debug)]
pub struct BoundedText {
    text: String,
    limit: usize,
    truncated: bool,
}

impl BoundedText {
    /// Create an empty buffer holding at most `capacity - 1` bytes of text
    pub fn new(capacity: usize) -> Self {
        let limit = capacity.saturating_sub(1);
        Self {
            text: String::with_capacity(limit.min(256)),
            limit,
            truncated: false,
        }
    }

    /// Current text length in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether any write was cut short
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Get the rendered text
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Take the rendered text
    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Write for BoundedText {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.limit - self.text.len();
        if s.len() <= room {
            self.text.push_str(s);
            return Ok(());
        }

        let mut end = room;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.text.push_str(&s[..end]);
        self.truncated = true;
        Ok(())
    }
}

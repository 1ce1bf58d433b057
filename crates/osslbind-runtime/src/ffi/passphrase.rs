//! Passphrase callback protocol
//!
//! The native library asks for a passphrase by calling
//! [`passphrase_callback`] with a fixed-size buffer and the user pointer it
//! was given, which here is a [`PassphraseRequest`]. The request either
//! delegates to the library's own default handling or keeps asking the
//! registered closure until it produces a passphrase of acceptable length.

use crate::error::BridgeError;
use crate::ffi::protect::{protect, CapturedException, Protected};
use crate::ffi::safety::native_buffer;
use crate::native::DefaultPassphrase;
use crate::value::Value;
use osslbind_config::{BridgeConfig, DEFAULT_MIN_PASSPHRASE_LENGTH};
use std::ffi::{c_void, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};

/// Where the passphrase comes from
#[derive(Debug, Clone)]
pub enum PassphraseSource {
    /// Password supplied up front by the caller
    Direct(CString),
    /// Closure called with `encrypt: bool`, returning a string
    Prompt(Value),
    /// The native library's default prompt
    Default,
}

/// Length and retry bounds for prompted passphrases
///
/// `min_length` can only raise the native minimum of
/// [`DEFAULT_MIN_PASSPHRASE_LENGTH`] bytes; lower values are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassphrasePolicy {
    pub min_length: usize,
    /// `None` keeps asking until the closure succeeds or raises
    pub max_attempts: Option<u32>,
}

impl PassphrasePolicy {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            min_length: config.min_passphrase_length(),
            max_attempts: config.max_passphrase_attempts(),
        }
    }

    /// Shortest passphrase accepted, never below the native minimum
    pub fn min_length(&self) -> usize {
        self.min_length.max(DEFAULT_MIN_PASSPHRASE_LENGTH)
    }
}

impl Default for PassphrasePolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_PASSPHRASE_LENGTH,
            max_attempts: None,
        }
    }
}

/// State of one passphrase-protected native operation
///
/// Lives on the stack of the code that enters native code; its address is
/// the callback's user pointer. Once the native call returns, call
/// [`finish`](PassphraseRequest::finish) to re-raise anything the closure
/// raised while native frames were active.
pub struct PassphraseRequest<'a> {
    source: PassphraseSource,
    native: &'a dyn DefaultPassphrase,
    policy: PassphrasePolicy,
    captured: Option<CapturedException>,
    attempts: u32,
}

impl<'a> PassphraseRequest<'a> {
    pub fn new(
        source: PassphraseSource,
        native: &'a dyn DefaultPassphrase,
        policy: PassphrasePolicy,
    ) -> Self {
        Self {
            source,
            native,
            policy,
            captured: None,
            attempts: 0,
        }
    }

    /// Fill `buf` and return the passphrase length, or `-1` to abort
    pub fn respond(&mut self, buf: &mut [u8], encrypt: bool) -> c_int {
        let closure = match &self.source {
            PassphraseSource::Direct(password) => {
                let password = Some(password.as_c_str());
                return self.native.default_passphrase(buf, encrypt, password);
            }
            PassphraseSource::Prompt(closure) if !closure.is_null() => closure.clone(),
            PassphraseSource::Prompt(_) | PassphraseSource::Default => {
                return self.native.default_passphrase(buf, encrypt, None);
            }
        };

        let min_length = self.policy.min_length();
        loop {
            if let Some(max) = self.policy.max_attempts {
                if self.attempts >= max {
                    self.captured = Some(CapturedException::Raised(
                        BridgeError::PassphraseAttemptsExhausted {
                            attempts: self.attempts,
                        },
                    ));
                    return -1;
                }
            }
            self.attempts += 1;

            let answer = protect(|| closure.call(&[Value::Bool(encrypt)])?.as_passphrase());
            let passphrase = match answer {
                Protected::Value(passphrase) => passphrase,
                Protected::Failed(exc) => {
                    tracing::debug!(
                        target: "osslbind::passphrase",
                        error = %exc,
                        "passphrase closure raised, aborting"
                    );
                    self.captured = Some(exc);
                    return -1;
                }
            };

            if passphrase.len() < min_length {
                tracing::warn!(
                    target: "osslbind::passphrase",
                    "password must be at least {} bytes",
                    min_length
                );
                continue;
            }
            if passphrase.len() > buf.len() {
                tracing::warn!(
                    target: "osslbind::passphrase",
                    "password must be at most {} bytes",
                    buf.len()
                );
                continue;
            }

            buf[..passphrase.len()].copy_from_slice(&passphrase);
            return c_int::try_from(passphrase.len()).unwrap_or(-1);
        }
    }

    /// Closure invocations so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// User pointer to register with the native call
    pub fn as_userdata(&mut self) -> *mut c_void {
        (self as *mut Self).cast()
    }

    /// Take the exception captured during the native call, if any
    pub fn take_captured(&mut self) -> Option<CapturedException> {
        self.captured.take()
    }

    /// Re-raise the captured exception, if any
    pub fn finish(mut self) -> Result<(), BridgeError> {
        match self.take_captured() {
            Some(exc) => Err(exc.reraise()),
            None => Ok(()),
        }
    }
}

/// `pem_password_cb` entry point
///
/// # Safety
///
/// `buf` must point to `size` writable bytes and `userdata` must be null or
/// the [`PassphraseRequest::as_userdata`] pointer of a live request.
pub unsafe extern "C" fn passphrase_callback(
    buf: *mut c_char,
    size: c_int,
    rwflag: c_int,
    userdata: *mut c_void,
) -> c_int {
    let Some(request) = userdata.cast::<PassphraseRequest<'_>>().as_mut() else {
        return -1;
    };
    let Some(buf) = native_buffer(buf, size) else {
        return -1;
    };
    panic::catch_unwind(AssertUnwindSafe(|| request.respond(buf, rwflag != 0))).unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::sim::SimLibrary;

    #[test]
    fn test_direct_password_bypasses_closure() {
        let sim = SimLibrary::new();
        let password = CString::new("hunter22").unwrap();
        let mut request = PassphraseRequest::new(
            PassphraseSource::Direct(password),
            &sim,
            PassphrasePolicy::default(),
        );
        let mut buf = [0u8; 32];
        assert_eq!(request.respond(&mut buf, false), 8);
        assert_eq!(&buf[..8], b"hunter22");
        assert_eq!(request.attempts(), 0);
    }

    #[test]
    fn test_null_closure_uses_default_prompt() {
        let sim = SimLibrary::new();
        sim.set_prompt_answer(Some("from-tty"));
        let mut request = PassphraseRequest::new(
            PassphraseSource::Prompt(Value::Null),
            &sim,
            PassphrasePolicy::default(),
        );
        let mut buf = [0u8; 32];
        assert_eq!(request.respond(&mut buf, true), 8);
        assert_eq!(sim.prompt_calls(), 1);
    }

    #[test]
    fn test_encrypt_flag_passed_to_closure() {
        let sim = SimLibrary::new();
        let closure = Value::function(|args| {
            Ok(Value::from(if args[0].is_true() { "encrypting" } else { "decrypting" }))
        });
        let mut request = PassphraseRequest::new(
            PassphraseSource::Prompt(closure),
            &sim,
            PassphrasePolicy::default(),
        );
        let mut buf = [0u8; 32];
        let len = unsafe {
            passphrase_callback(buf.as_mut_ptr().cast(), 32, 1, request.as_userdata())
        };
        assert_eq!(&buf[..len as usize], b"encrypting");
        assert!(request.finish().is_ok());
    }

    #[test]
    fn test_policy_cannot_lower_native_minimum() {
        let sim = SimLibrary::new();
        let answers = std::cell::Cell::new(0);
        let closure = Value::function(move |_| {
            answers.set(answers.get() + 1);
            Ok(Value::from(if answers.get() == 1 { "abc" } else { "abcd" }))
        });
        let policy = PassphrasePolicy {
            min_length: 1,
            max_attempts: None,
        };
        assert_eq!(policy.min_length(), DEFAULT_MIN_PASSPHRASE_LENGTH);

        let mut request = PassphraseRequest::new(PassphraseSource::Prompt(closure), &sim, policy);
        let mut buf = [0u8; 64];
        assert_eq!(request.respond(&mut buf, false), 4);
        assert_eq!(request.attempts(), 2);
    }

    #[test]
    fn test_null_userdata_aborts() {
        let mut buf = [0u8; 8];
        let rc = unsafe {
            passphrase_callback(buf.as_mut_ptr().cast(), 8, 0, std::ptr::null_mut())
        };
        assert_eq!(rc, -1);
    }
}

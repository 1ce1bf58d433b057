//! Error model and the native error channel
//!
//! Native failures are reported through a process-wide queue owned by the
//! native library. [`ErrorChannel::raise`] reads the most recent entry,
//! renders it behind an optional caller prefix into a bounded buffer, clears
//! the queue and hands back a [`BridgeError`] for the caller to propagate.

use crate::debug::DebugFlag;
use crate::ffi::loader::LoadError;
use crate::ffi::safety::BoundedText;
use crate::native::ErrorQueue;
use osslbind_config::ConfigError;
use std::fmt::{self, Write};
use thiserror::Error;

/// Named kind of a library error, used by callers to catch by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorKind(&'static str);

impl ErrorKind {
    /// Generic native library failure
    pub const GENERIC: ErrorKind = ErrorKind("OpenSSLError");

    /// Define a new kind (e.g. by a higher-level certificate wrapper)
    pub const fn new(name: &'static str) -> Self {
        ErrorKind(name)
    }

    /// Kind name
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Errors surfaced by the boundary layer
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Native library failure, with the rendered native reason
    #[error("{message}")]
    Library { kind: ErrorKind, message: String },

    /// A managed value had the wrong dynamic type
    #[error("{message}")]
    TypeMismatch { message: String },

    /// Raised by a user closure
    #[error("{0}")]
    Runtime(String),

    /// A callback wrapper was used after its native frame returned
    #[error("{what} is no longer valid outside of its callback")]
    Detached { what: &'static str },

    /// The passphrase closure never produced an acceptable passphrase
    #[error("passphrase not accepted after {attempts} attempts")]
    PassphraseAttemptsExhausted { attempts: u32 },

    /// Native library could not be loaded
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// Library error of the given kind
    pub fn library(kind: ErrorKind, message: impl Into<String>) -> Self {
        BridgeError::Library {
            kind,
            message: message.into(),
        }
    }

    /// Type mismatch error
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        BridgeError::TypeMismatch {
            message: message.into(),
        }
    }

    /// Kind of a library error
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            BridgeError::Library { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this is a library error of `kind`
    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind() == Some(kind)
    }
}

/// Error channel bound to a native error queue
///
/// Created by [`Bridge::error_channel`](crate::Bridge::error_channel).
#[derive(Clone, Copy)]
pub struct ErrorChannel<'a> {
    queue: &'a dyn ErrorQueue,
    debug: &'a DebugFlag,
    capacity: usize,
}

impl<'a> ErrorChannel<'a> {
    /// Bind a channel to `queue`, rendering at most `capacity - 1` bytes of text
    pub fn new(queue: &'a dyn ErrorQueue, debug: &'a DebugFlag, capacity: usize) -> Self {
        Self {
            queue,
            debug,
            capacity,
        }
    }

    /// Build an error of `kind` from the latest native error and an optional prefix
    ///
    /// Only the most recent queue entry is reported. With the debug flag set
    /// the full native diagnostic (code, library, function, reason) is used,
    /// otherwise just the reason string. The queue is cleared in every case.
    pub fn raise(&self, kind: ErrorKind, prefix: Option<fmt::Arguments<'_>>) -> BridgeError {
        let mut text = BoundedText::new(self.capacity);
        if let Some(args) = prefix {
            let _ = text.write_fmt(args);
        }

        if let Some(code) = self.queue.get_error() {
            let detail = if self.debug.get() {
                self.queue.error_string(code)
            } else {
                self.queue
                    .reason_error_string(code)
                    .unwrap_or_else(|| format!("error:{:08X}", code))
            };
            if !text.is_empty() {
                let _ = text.write_str(": ");
            }
            let _ = text.write_str(&detail);
        }
        self.queue.clear_error();

        BridgeError::Library {
            kind,
            message: text.into_string(),
        }
    }

    /// Message capacity, terminator included
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for ErrorChannel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorChannel")
            .field("debug", &self.debug.get())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Raise a library error through an [`ErrorChannel`] with a formatted prefix
///
/// ```ignore
/// return Err(raise!(channel, ErrorKind::GENERIC, "cannot read {}", path));
/// return Err(raise!(channel, ErrorKind::GENERIC));
/// ```
#[macro_export]
macro_rules! raise {
    ($channel:expr, $kind:expr) => {
        $channel.raise($kind, None)
    };
    ($channel:expr, $kind:expr, $($arg:tt)+) => {
        $channel.raise($kind, Some(format_args!($($arg)+)))
    };
}

//! Bridge context for embedding
//!
//! A [`Bridge`] is the process-wide context every boundary operation runs
//! against: the native library backend, the debug flag and the loaded
//! configuration. Create one at startup and pass it by reference; it is not
//! meant to be shared between threads that enter native code concurrently.

use crate::debug::DebugFlag;
use crate::error::{BridgeError, ErrorChannel, ErrorKind};
use crate::ffi::marshal::{self, NativeStack};
use crate::ffi::passphrase::{PassphrasePolicy, PassphraseRequest, PassphraseSource};
use crate::ffi::protect::{protect, Protected};
use crate::ffi::types::ExDataSlot;
use crate::ffi::verify;
use crate::native::libcrypto::LibCrypto;
use crate::native::{CertificateApi, NativeLibrary, StoreContextApi};
use crate::value::Value;
use osslbind_config::BridgeConfig;
use serde::Serialize;
use std::fmt;

/// Versions reported by [`Bridge::version`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// osslbind runtime version
    pub runtime: &'static str,
    /// Native library banner
    pub native_text: String,
    /// Native library version number
    pub native_number: u64,
}

/// Boundary context over a native library
///
/// # Examples
///
/// ```
/// use osslbind_runtime::{Bridge, SimLibrary};
/// use osslbind_config::BridgeConfig;
///
/// let bridge = Bridge::new(SimLibrary::new(), BridgeConfig::default()).unwrap();
/// assert!(!bridge.debug());
/// bridge.set_debug(true);
/// assert_eq!(bridge.native().leak_check_calls(), vec![true]);
/// ```
pub struct Bridge<N: NativeLibrary> {
    native: N,
    debug: DebugFlag,
    config: BridgeConfig,
}

impl<N: NativeLibrary> Bridge<N> {
    /// Create a bridge over `native`, validating `config` and loading native error strings
    pub fn new(native: N, config: BridgeConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        native.load_error_strings();
        tracing::debug!(
            target: "osslbind::bridge",
            native = %native.version_text(),
            "bridge initialized"
        );
        Ok(Self {
            native,
            debug: DebugFlag::new(),
            config,
        })
    }

    /// Native library backend
    pub fn native(&self) -> &N {
        &self.native
    }

    /// Loaded configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Current debug flag
    pub fn debug(&self) -> bool {
        self.debug.get()
    }

    /// Set the debug flag, returning the value set
    pub fn set_debug(&self, value: bool) -> bool {
        self.debug.set(value, &self.native)
    }

    /// Error channel over the native error queue
    pub fn error_channel(&self) -> ErrorChannel<'_> {
        ErrorChannel::new(&self.native, &self.debug, self.config.message_capacity())
    }

    /// Build an error of `kind` from the latest native error
    ///
    /// Prefer the [`raise!`](crate::raise) macro with [`Bridge::error_channel`]
    /// for formatted prefixes.
    pub fn raise(&self, kind: ErrorKind, prefix: Option<fmt::Arguments<'_>>) -> BridgeError {
        self.error_channel().raise(kind, prefix)
    }

    /// Debug-only diagnostic line
    pub fn diagnostic(&self, args: fmt::Arguments<'_>) {
        self.debug.diagnostic(args)
    }

    /// Convert a managed certificate array into a native stack
    pub fn to_native_stack<'a, C: CertificateApi>(
        &self,
        api: &'a C,
        sequence: &Value,
    ) -> Result<NativeStack<'a, C>, BridgeError> {
        let stack = marshal::to_native_stack(&self.error_channel(), api, sequence);
        if let Ok(stack) = &stack {
            self.diagnostic(format_args!(
                "converted sequence into native stack of {}",
                stack.len()
            ));
        }
        stack
    }

    /// [`to_native_stack`](Bridge::to_native_stack) under protected invocation
    pub fn protect_to_native_stack<'a, C: CertificateApi>(
        &self,
        api: &'a C,
        sequence: &Value,
    ) -> Protected<NativeStack<'a, C>> {
        protect(|| self.to_native_stack(api, sequence))
    }

    /// Passphrase request for one native operation, using the configured policy
    pub fn passphrase(&self, source: PassphraseSource) -> PassphraseRequest<'_> {
        PassphraseRequest::new(source, &self.native, PassphrasePolicy::from_config(&self.config))
    }

    /// Register the verification association slot for backend `S` (once per process)
    pub fn register_verify_slot<S: StoreContextApi>(&self) -> Result<ExDataSlot, BridgeError> {
        verify::register_slot::<S>().ok_or_else(|| {
            crate::raise!(
                self.error_channel(),
                ErrorKind::GENERIC,
                "X509_STORE_CTX_get_ex_new_index"
            )
        })
    }

    /// Runtime and native library versions
    pub fn version(&self) -> VersionInfo {
        VersionInfo {
            runtime: crate::VERSION,
            native_text: self.native.version_text(),
            native_number: self.native.version_number(),
        }
    }
}

impl Bridge<LibCrypto> {
    /// Load libcrypto as configured and build a bridge over it
    pub fn open(config: BridgeConfig) -> Result<Self, BridgeError> {
        let native = LibCrypto::open(&config)?;
        tracing::debug!(
            target: "osslbind::bridge",
            library = native.name(),
            verification = LibCrypto::supports_verification(),
            "libcrypto loaded"
        );
        Self::new(native, config)
    }
}

impl<N: NativeLibrary + fmt::Debug> fmt::Debug for Bridge<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("native", &self.native)
            .field("debug", &self.debug.get())
            .field("config", &self.config)
            .finish()
    }
}

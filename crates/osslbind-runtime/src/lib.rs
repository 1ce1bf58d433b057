//! osslbind Runtime - safe boundary between managed code and libcrypto
//!
//! This library lets managed closures run inside callbacks invoked by a
//! native cryptography library without unwinding through its frames:
//! - Error channel (native error queue → structured errors)
//! - Debug flag (error detail + allocator leak checking)
//! - Protected invocation (capture now, re-raise after the native call)
//! - Hex codec, certificate stack conversion
//! - Passphrase and certificate verification callback protocols

/// osslbind runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod bridge;
pub mod debug;
pub mod error;
pub mod ffi;
pub mod native;
pub mod value;

// Re-export commonly used types
pub use bridge::{Bridge, VersionInfo};
pub use debug::DebugFlag;
pub use error::{BridgeError, ErrorChannel, ErrorKind};
pub use ffi::{
    ensure, protect, CapturedException, NativeStack, PassphrasePolicy, PassphraseRequest,
    PassphraseSource, Protected, StoreContextHandle, VerifyCallback,
};
pub use native::libcrypto::LibCrypto;
pub use native::sim::SimLibrary;
pub use native::{CertificateApi, NativeLibrary, StoreContextApi};
pub use value::{Certificate, Value};

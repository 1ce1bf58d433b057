//! Native boundary infrastructure
//!
//! Everything that crosses between managed values and native frames:
//! - Protected invocation (exception barrier + guaranteed cleanup)
//! - Certificate stack marshaling (managed ↔ native)
//! - Passphrase and verification callback entry points
//! - Hex encoding with a native calling convention
//! - Dynamic library loading
//!
//! # Safety
//!
//! Callback entry points are `extern "C"` and never unwind: closures run
//! under [`protect`], and any captured exception is handed back to the code
//! that entered native code. All raw pointer handling is confined to this
//! module and [`crate::native`].

pub mod hex;
pub mod loader;
pub mod marshal;
pub mod passphrase;
pub mod protect;
pub mod safety;
pub mod types;
pub mod verify;

pub use hex::HexError;
pub use loader::{LibraryLoader, LoadError};
pub use marshal::{from_native_stack, to_native_stack, NativeStack};
pub use passphrase::{passphrase_callback, PassphrasePolicy, PassphraseRequest, PassphraseSource};
pub use protect::{ensure, protect, CapturedException, Protected};
pub use types::{ErrorCode, ExDataSlot, X509_V_ERR_CERT_REJECTED, X509_V_OK};
pub use verify::{register_slot, verify_callback, StoreContextHandle, VerifyCallback};

//! Dynamically loaded libcrypto backend
//!
//! Symbols are resolved once at load time and kept as plain function
//! pointers next to the library handle that owns them. Symbols that newer
//! libcrypto releases removed are optional; without them the matching
//! operation is a no-op.
//!
//! The verification callback carries no user pointer, so the store-context
//! accessors it needs are published process-wide by the first libcrypto
//! loaded that exports all of them.

use super::{DefaultPassphrase, ErrorQueue, MemoryDebug, NativeLibrary, StoreContextApi};
use crate::ffi::loader::{symbol, LibraryLoader, LoadError};
use crate::ffi::safety::check_null;
use crate::ffi::types::{
    ErrorCode, ExDataSlot, CRYPTO_EX_INDEX_X509_STORE_CTX, CRYPTO_MEM_CHECK_OFF,
    CRYPTO_MEM_CHECK_ON, X509_V_OK,
};
use libloading::Library;
use osslbind_config::BridgeConfig;
use std::ffi::{c_void, CStr};
use std::fmt;
use std::os::raw::{c_char, c_int, c_long, c_ulong};
use std::ptr;
use std::sync::{Arc, OnceLock};

type GetErrorFn = unsafe extern "C" fn() -> c_ulong;
type ClearErrorFn = unsafe extern "C" fn();
type ErrorStringNFn = unsafe extern "C" fn(c_ulong, *mut c_char, usize);
type ReasonErrorStringFn = unsafe extern "C" fn(c_ulong) -> *const c_char;
type MemCtrlFn = unsafe extern "C" fn(c_int) -> c_int;
type PemDefCallbackFn = unsafe extern "C" fn(*mut c_char, c_int, c_int, *mut c_void) -> c_int;
type VersionTextFn = unsafe extern "C" fn(c_int) -> *const c_char;
type VersionNumFn = unsafe extern "C" fn() -> c_ulong;
type LoadStringsFn = unsafe extern "C" fn();

type ExNewIndexFn = unsafe extern "C" fn(
    c_int,
    c_long,
    *mut c_void,
    *const c_void,
    *const c_void,
    *const c_void,
) -> c_int;
type CtxGetExDataFn = unsafe extern "C" fn(*mut X509StoreCtx, c_int) -> *mut c_void;
type CtxGet0StoreFn = unsafe extern "C" fn(*mut X509StoreCtx) -> *mut X509Store;
type StoreGetExDataFn = unsafe extern "C" fn(*mut X509Store, c_int) -> *mut c_void;
type CtxGetIntFn = unsafe extern "C" fn(*mut X509StoreCtx) -> c_int;
type CtxSetErrorFn = unsafe extern "C" fn(*mut X509StoreCtx, c_int);

/// Opaque `X509_STORE_CTX`
#[repr(C)]
pub struct X509StoreCtx {
    _private: [u8; 0],
}

/// Opaque `X509_STORE`
#[repr(C)]
pub struct X509Store {
    _private: [u8; 0],
}

/// Store-context accessors used by the verification callback
struct StoreContextFns {
    new_ex_index: ExNewIndexFn,
    ctx_get_ex_data: CtxGetExDataFn,
    ctx_get0_store: CtxGet0StoreFn,
    store_get_ex_data: StoreGetExDataFn,
    ctx_get_error: CtxGetIntFn,
    ctx_set_error: CtxSetErrorFn,
    ctx_get_error_depth: CtxGetIntFn,
    // Must outlive the function pointers above
    _library: Arc<Library>,
}

static STORE_CONTEXT: OnceLock<StoreContextFns> = OnceLock::new();

impl StoreContextFns {
    unsafe fn resolve(library: &Arc<Library>, name: &str) -> Result<Self, LoadError> {
        let lib = library.as_ref();
        Ok(Self {
            new_ex_index: symbol(lib, name, "CRYPTO_get_ex_new_index")?,
            ctx_get_ex_data: symbol(lib, name, "X509_STORE_CTX_get_ex_data")?,
            ctx_get0_store: symbol(lib, name, "X509_STORE_CTX_get0_store")?,
            store_get_ex_data: symbol(lib, name, "X509_STORE_get_ex_data")?,
            ctx_get_error: symbol(lib, name, "X509_STORE_CTX_get_error")?,
            ctx_set_error: symbol(lib, name, "X509_STORE_CTX_set_error")?,
            ctx_get_error_depth: symbol(lib, name, "X509_STORE_CTX_get_error_depth")?,
            _library: Arc::clone(library),
        })
    }

    /// Publish the accessors of `library` unless another library already did
    unsafe fn publish(library: &Arc<Library>, name: &str) {
        if STORE_CONTEXT.get().is_some() {
            return;
        }
        match Self::resolve(library, name) {
            Ok(fns) => {
                if STORE_CONTEXT.set(fns).is_ok() {
                    tracing::debug!(
                        target: "osslbind::native",
                        library = name,
                        "store-context accessors published"
                    );
                }
            }
            Err(err) => tracing::debug!(
                target: "osslbind::native",
                library = name,
                error = %err,
                "verification callback unavailable"
            ),
        }
    }
}

/// Buffer size `ERR_error_string` documents as sufficient
const ERROR_STRING_LEN: usize = 256;

/// libcrypto handle
pub struct LibCrypto {
    name: String,
    get_error: GetErrorFn,
    clear_error: ClearErrorFn,
    error_string_n: ErrorStringNFn,
    reason_error_string: ReasonErrorStringFn,
    mem_ctrl: Option<MemCtrlFn>,
    pem_def_callback: PemDefCallbackFn,
    version_text: VersionTextFn,
    version_num: VersionNumFn,
    load_strings: Option<LoadStringsFn>,
    // Must outlive the function pointers above
    _library: Arc<Library>,
}

impl LibCrypto {
    /// Load the first of `names` that resolves
    pub fn load(loader: &mut LibraryLoader, names: &[String]) -> Result<Self, LoadError> {
        let (library, name) = loader.load_first(names)?;
        unsafe { Self::from_library(library, name) }
    }

    /// Load using the library names and search paths of `config`
    pub fn open(config: &BridgeConfig) -> Result<Self, LoadError> {
        let mut loader = LibraryLoader::new();
        for path in config.search_paths().iter().rev() {
            loader.add_search_path(path.clone());
        }
        Self::load(&mut loader, &config.library_names())
    }

    /// Name the library was loaded under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a loaded libcrypto provides the verification callback accessors
    pub fn supports_verification() -> bool {
        STORE_CONTEXT.get().is_some()
    }

    unsafe fn from_library(library: Arc<Library>, name: String) -> Result<Self, LoadError> {
        let lib = library.as_ref();

        let version_text = symbol::<VersionTextFn>(lib, &name, "OpenSSL_version")
            .or_else(|_| symbol(lib, &name, "SSLeay_version"))?;
        let version_num = symbol::<VersionNumFn>(lib, &name, "OpenSSL_version_num")
            .or_else(|_| symbol(lib, &name, "SSLeay"))?;
        StoreContextFns::publish(&library, &name);

        Ok(Self {
            get_error: symbol(lib, &name, "ERR_get_error")?,
            clear_error: symbol(lib, &name, "ERR_clear_error")?,
            error_string_n: symbol(lib, &name, "ERR_error_string_n")?,
            reason_error_string: symbol(lib, &name, "ERR_reason_error_string")?,
            mem_ctrl: optional_symbol(lib, &name, "CRYPTO_mem_ctrl"),
            pem_def_callback: symbol(lib, &name, "PEM_def_callback")?,
            version_text,
            version_num,
            load_strings: optional_symbol(lib, &name, "ERR_load_crypto_strings"),
            name: name.clone(),
            _library: Arc::clone(&library),
        })
    }
}

unsafe fn optional_symbol<T: Copy>(
    library: &Library,
    library_name: &str,
    name: &str,
) -> Option<T> {
    let found = symbol(library, library_name, name).ok();
    if found.is_none() {
        tracing::debug!(
            target: "osslbind::native",
            library = library_name,
            symbol = name,
            "optional symbol missing"
        );
    }
    found
}

impl fmt::Debug for LibCrypto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibCrypto").field("name", &self.name).finish()
    }
}

unsafe fn owned_text(ptr: *const c_char) -> Option<String> {
    let ptr = check_null(ptr).ok()?;
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

impl ErrorQueue for LibCrypto {
    fn get_error(&self) -> Option<ErrorCode> {
        let code = unsafe { (self.get_error)() };
        (code != 0).then_some(code)
    }

    fn clear_error(&self) {
        unsafe { (self.clear_error)() }
    }

    fn error_string(&self, code: ErrorCode) -> String {
        let mut buf = [0 as c_char; ERROR_STRING_LEN];
        unsafe {
            (self.error_string_n)(code, buf.as_mut_ptr(), buf.len());
            owned_text(buf.as_ptr()).unwrap_or_default()
        }
    }

    fn reason_error_string(&self, code: ErrorCode) -> Option<String> {
        unsafe { owned_text((self.reason_error_string)(code)) }
    }
}

impl MemoryDebug for LibCrypto {
    fn set_leak_checking(&self, enabled: bool) {
        if let Some(mem_ctrl) = self.mem_ctrl {
            let mode = if enabled {
                CRYPTO_MEM_CHECK_ON
            } else {
                CRYPTO_MEM_CHECK_OFF
            };
            unsafe { mem_ctrl(mode) };
        }
    }
}

impl DefaultPassphrase for LibCrypto {
    fn default_passphrase(&self, buf: &mut [u8], encrypt: bool, password: Option<&CStr>) -> c_int {
        let size = c_int::try_from(buf.len()).unwrap_or(c_int::MAX);
        let userdata = password.map_or(std::ptr::null_mut(), |p| p.as_ptr() as *mut c_void);
        unsafe {
            (self.pem_def_callback)(
                buf.as_mut_ptr().cast::<c_char>(),
                size,
                c_int::from(encrypt),
                userdata,
            )
        }
    }
}

impl NativeLibrary for LibCrypto {
    fn load_error_strings(&self) {
        if let Some(load) = self.load_strings {
            unsafe { load() }
        }
    }

    fn version_text(&self) -> String {
        unsafe { owned_text((self.version_text)(0)) }.unwrap_or_default()
    }

    fn version_number(&self) -> u64 {
        unsafe { (self.version_num)() as u64 }
    }
}

impl StoreContextApi for LibCrypto {
    type StoreCtx = X509StoreCtx;

    fn new_ex_index(name: &'static CStr) -> Option<ExDataSlot> {
        let fns = STORE_CONTEXT.get()?;
        let index = unsafe {
            (fns.new_ex_index)(
                CRYPTO_EX_INDEX_X509_STORE_CTX,
                0,
                name.as_ptr().cast_mut().cast(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
            )
        };
        ExDataSlot::from_raw(index)
    }

    unsafe fn ctx_ex_data(ctx: *mut X509StoreCtx, slot: ExDataSlot) -> *mut c_void {
        match STORE_CONTEXT.get() {
            Some(fns) => (fns.ctx_get_ex_data)(ctx, slot.as_raw()),
            None => ptr::null_mut(),
        }
    }

    unsafe fn store_ex_data(ctx: *mut X509StoreCtx, slot: ExDataSlot) -> *mut c_void {
        let Some(fns) = STORE_CONTEXT.get() else {
            return ptr::null_mut();
        };
        let store = (fns.ctx_get0_store)(ctx);
        if store.is_null() {
            return ptr::null_mut();
        }
        (fns.store_get_ex_data)(store, slot.as_raw())
    }

    unsafe fn error(ctx: *mut X509StoreCtx) -> c_int {
        STORE_CONTEXT
            .get()
            .map_or(X509_V_OK, |fns| (fns.ctx_get_error)(ctx))
    }

    unsafe fn set_error(ctx: *mut X509StoreCtx, error: c_int) {
        if let Some(fns) = STORE_CONTEXT.get() {
            (fns.ctx_set_error)(ctx, error);
        }
    }

    unsafe fn error_depth(ctx: *mut X509StoreCtx) -> c_int {
        STORE_CONTEXT
            .get()
            .map_or(0, |fns| (fns.ctx_get_error_depth)(ctx))
    }
}

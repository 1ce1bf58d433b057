//! Verification callback protocol
//!
//! The native verifier calls [`verify_callback`] once per certificate check
//! with its own verdict and the verification context. The closure to consult
//! is found through the context's ex-data slot, falling back to the slot on
//! the context's parent store. The closure sees the context through a
//! [`StoreContextHandle`] that is detached as soon as the callback returns.

use crate::error::BridgeError;
use crate::ffi::protect::{ensure, protect, CapturedException, Protected};
use crate::ffi::types::{ExDataSlot, X509_V_ERR_CERT_REJECTED, X509_V_OK};
use crate::native::StoreContextApi;
use crate::value::Value;
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::ffi::{c_void, CStr};
use std::fmt;
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Name the association slot is registered under
pub const VERIFY_SLOT_NAME: &CStr = c"osslbind_verify_cb_idx";

// The native callback has no user pointer, so slots live here, keyed by backend
static VERIFY_SLOTS: Mutex<BTreeMap<TypeId, ExDataSlot>> = Mutex::new(BTreeMap::new());

fn verify_slots() -> MutexGuard<'static, BTreeMap<TypeId, ExDataSlot>> {
    VERIFY_SLOTS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Register the association slot for backend `S`, once per process
///
/// Later calls for the same backend return the slot registered first. Each
/// backend gets its own slot from its own native library.
pub fn register_slot<S: StoreContextApi>() -> Option<ExDataSlot> {
    let mut slots = verify_slots();
    if let Some(slot) = slots.get(&TypeId::of::<S>()) {
        return Some(*slot);
    }
    let slot = S::new_ex_index(VERIFY_SLOT_NAME)?;
    slots.insert(TypeId::of::<S>(), slot);
    Some(slot)
}

/// The association slot registered for backend `S`, if any
pub fn verify_slot<S: StoreContextApi>() -> Option<ExDataSlot> {
    verify_slots().get(&TypeId::of::<S>()).copied()
}

/// Closure association stored in a context's or store's ex-data
///
/// A [`Value::Null`] closure means "no override": the native verdict stands.
/// Any exception raised by the closure is kept here until the code that
/// started verification calls [`check`](VerifyCallback::check).
pub struct VerifyCallback {
    closure: Value,
    captured: RefCell<Option<CapturedException>>,
}

impl VerifyCallback {
    pub fn new(closure: Value) -> Self {
        Self {
            closure,
            captured: RefCell::new(None),
        }
    }

    /// Pointer to store under the verify slot
    ///
    /// Must stay valid for as long as it is stored natively.
    pub fn as_ex_data(&self) -> *mut c_void {
        (self as *const Self).cast_mut().cast()
    }

    /// Take the first exception captured during verification
    pub fn take_captured(&self) -> Option<CapturedException> {
        self.captured.borrow_mut().take()
    }

    /// Re-raise the first exception captured during verification
    pub fn check(&self) -> Result<(), BridgeError> {
        match self.take_captured() {
            Some(exc) => Err(exc.reraise()),
            None => Ok(()),
        }
    }

    fn capture(&self, exc: CapturedException) {
        let mut slot = self.captured.borrow_mut();
        if slot.is_none() {
            *slot = Some(exc);
        }
    }
}

impl fmt::Debug for VerifyCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyCallback")
            .field("closure", &self.closure)
            .field("captured", &self.captured.borrow().is_some())
            .finish()
    }
}

#[derive(Clone, Copy)]
struct RawStoreContext {
    ctx: *mut c_void,
    error: unsafe fn(*mut c_void) -> c_int,
    set_error: unsafe fn(*mut c_void, c_int),
    error_depth: unsafe fn(*mut c_void) -> c_int,
}

unsafe fn erased_error<S: StoreContextApi>(ctx: *mut c_void) -> c_int {
    S::error(ctx.cast())
}

unsafe fn erased_set_error<S: StoreContextApi>(ctx: *mut c_void, error: c_int) {
    S::set_error(ctx.cast(), error)
}

unsafe fn erased_error_depth<S: StoreContextApi>(ctx: *mut c_void) -> c_int {
    S::error_depth(ctx.cast())
}

/// Managed view of a native verification context
///
/// Valid only while the verification callback that created it is running.
/// Afterwards every accessor fails with [`BridgeError::Detached`], including
/// on clones the closure kept.
#[derive(Clone)]
pub struct StoreContextHandle {
    inner: Rc<Cell<Option<RawStoreContext>>>,
}

impl StoreContextHandle {
    fn new<S: StoreContextApi>(ctx: *mut S::StoreCtx) -> Self {
        let raw = RawStoreContext {
            ctx: ctx.cast(),
            error: erased_error::<S>,
            set_error: erased_set_error::<S>,
            error_depth: erased_error_depth::<S>,
        };
        Self {
            inner: Rc::new(Cell::new(Some(raw))),
        }
    }

    fn raw(&self) -> Result<RawStoreContext, BridgeError> {
        self.inner.get().ok_or(BridgeError::Detached {
            what: "store context",
        })
    }

    /// Recorded verification error
    pub fn error(&self) -> Result<c_int, BridgeError> {
        let raw = self.raw()?;
        Ok(unsafe { (raw.error)(raw.ctx) })
    }

    /// Overwrite the recorded verification error
    pub fn set_error(&self, error: c_int) -> Result<(), BridgeError> {
        let raw = self.raw()?;
        unsafe { (raw.set_error)(raw.ctx, error) };
        Ok(())
    }

    /// Chain depth of the certificate being checked
    pub fn error_depth(&self) -> Result<c_int, BridgeError> {
        let raw = self.raw()?;
        Ok(unsafe { (raw.error_depth)(raw.ctx) })
    }

    /// Whether the native context is still reachable
    pub fn is_valid(&self) -> bool {
        self.inner.get().is_some()
    }

    /// Whether both handles view the same callback invocation
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn detach(&self) {
        self.inner.set(None);
    }
}

impl fmt::Debug for StoreContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "StoreContext(valid)")
        } else {
            write!(f, "StoreContext(detached)")
        }
    }
}

/// Resolve the association for `ctx`: the context's own first, then its store's
unsafe fn resolve<'a, S: StoreContextApi>(
    ctx: *mut S::StoreCtx,
    slot: ExDataSlot,
) -> Option<&'a VerifyCallback> {
    let mut data = S::ctx_ex_data(ctx, slot);
    if data.is_null() {
        data = S::store_ex_data(ctx, slot);
    }
    data.cast::<VerifyCallback>().cast_const().as_ref()
}

/// Decide one verification event
///
/// Without an association, or with a `Null` one, `preverify_ok` is returned
/// unchanged. Otherwise the closure is called with `preverify_ok` and a
/// [`StoreContextHandle`]. `true` accepts and resets the native error to
/// `X509_V_OK`. Anything else, including a raised exception, rejects and
/// records `X509_V_ERR_CERT_REJECTED` unless an error is already recorded.
///
/// # Safety
///
/// `ctx` must be null or a live context passed in by the native library, and
/// any association stored under the verify slot must point to a live
/// [`VerifyCallback`].
pub unsafe fn verify<S: StoreContextApi>(preverify_ok: bool, ctx: *mut S::StoreCtx) -> bool {
    if ctx.is_null() {
        return preverify_ok;
    }
    let Some(slot) = verify_slot::<S>() else {
        return preverify_ok;
    };
    let Some(callback) = resolve::<S>(ctx, slot) else {
        return preverify_ok;
    };
    if callback.closure.is_null() {
        return preverify_ok;
    }

    let outcome = protect(|| {
        let handle = StoreContextHandle::new::<S>(ctx);
        let args = [Value::Bool(preverify_ok), Value::StoreContext(handle.clone())];
        ensure(
            || callback.closure.call(&args),
            StoreContextHandle::detach,
            &handle,
        )
    });

    let accepted = match outcome {
        Protected::Value(verdict) => verdict.is_true(),
        Protected::Failed(exc) => {
            tracing::debug!(
                target: "osslbind::verify",
                error = %exc,
                "verify closure raised, rejecting"
            );
            callback.capture(exc);
            false
        }
    };

    if accepted {
        S::set_error(ctx, X509_V_OK);
    } else if S::error(ctx) == X509_V_OK {
        S::set_error(ctx, X509_V_ERR_CERT_REJECTED);
    }
    accepted
}

/// `X509_STORE_CTX_set_verify_cb` entry point
///
/// # Safety
///
/// See [`verify`].
pub unsafe extern "C" fn verify_callback<S: StoreContextApi>(
    preverify_ok: c_int,
    ctx: *mut S::StoreCtx,
) -> c_int {
    let ok = preverify_ok != 0;
    let accepted = panic::catch_unwind(AssertUnwindSafe(|| verify::<S>(ok, ctx))).unwrap_or(false);
    c_int::from(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::sim::{SimLibrary, SimStoreCtx};

    fn slot() -> ExDataSlot {
        register_slot::<SimLibrary>().unwrap()
    }

    #[test]
    fn test_register_slot_is_idempotent() {
        assert_eq!(register_slot::<SimLibrary>(), register_slot::<SimLibrary>());
        assert_eq!(verify_slot::<SimLibrary>(), register_slot::<SimLibrary>());
    }

    /// Backend whose native library hands out a fixed slot
    struct FixedSlotBackend;

    impl StoreContextApi for FixedSlotBackend {
        type StoreCtx = SimStoreCtx;

        fn new_ex_index(_name: &'static CStr) -> Option<ExDataSlot> {
            ExDataSlot::from_raw(900)
        }

        unsafe fn ctx_ex_data(ctx: *mut SimStoreCtx, slot: ExDataSlot) -> *mut c_void {
            SimLibrary::ctx_ex_data(ctx, slot)
        }

        unsafe fn store_ex_data(ctx: *mut SimStoreCtx, slot: ExDataSlot) -> *mut c_void {
            SimLibrary::store_ex_data(ctx, slot)
        }

        unsafe fn error(ctx: *mut SimStoreCtx) -> c_int {
            SimLibrary::error(ctx)
        }

        unsafe fn set_error(ctx: *mut SimStoreCtx, error: c_int) {
            SimLibrary::set_error(ctx, error)
        }

        unsafe fn error_depth(ctx: *mut SimStoreCtx) -> c_int {
            SimLibrary::error_depth(ctx)
        }
    }

    #[test]
    fn test_slots_are_kept_per_backend() {
        let sim_slot = slot();
        let fixed_slot = register_slot::<FixedSlotBackend>().unwrap();
        assert_eq!(fixed_slot.as_raw(), 900);
        assert_ne!(sim_slot, fixed_slot);
        assert_eq!(verify_slot::<SimLibrary>(), Some(sim_slot));
        assert_eq!(verify_slot::<FixedSlotBackend>(), Some(fixed_slot));

        // An association under the simulator's slot is invisible to the other backend
        let callback = VerifyCallback::new(Value::function(|_| Ok(Value::Bool(false))));
        let mut ctx = SimStoreCtx::new(None);
        ctx.set_ex_data(sim_slot, callback.as_ex_data());
        assert!(unsafe { verify::<FixedSlotBackend>(true, &mut ctx) });
        assert_eq!(ctx.error(), X509_V_OK);
        assert!(!unsafe { verify::<SimLibrary>(true, &mut ctx) });
    }

    #[test]
    fn test_null_context_passes_through() {
        slot();
        let ctx: *mut SimStoreCtx = std::ptr::null_mut();
        assert_eq!(unsafe { verify_callback::<SimLibrary>(1, ctx) }, 1);
        assert_eq!(unsafe { verify_callback::<SimLibrary>(0, ctx) }, 0);
    }

    #[test]
    fn test_closure_sees_depth() {
        let slot = slot();
        let callback = VerifyCallback::new(Value::function(|args| match &args[1] {
            Value::StoreContext(handle) => Ok(Value::Bool(handle.error_depth()? == 2)),
            _ => Ok(Value::Bool(false)),
        }));
        let mut ctx = SimStoreCtx::new(None);
        ctx.set_depth(2);
        ctx.set_ex_data(slot, callback.as_ex_data());

        assert!(unsafe { verify::<SimLibrary>(false, &mut ctx) });
        assert!(callback.check().is_ok());
    }

    #[test]
    fn test_panicking_closure_is_captured() {
        let slot = slot();
        let callback = VerifyCallback::new(Value::function(|_| panic!("closure panicked")));
        let mut ctx = SimStoreCtx::new(None);
        ctx.set_ex_data(slot, callback.as_ex_data());

        assert_eq!(unsafe { verify_callback::<SimLibrary>(1, &mut ctx) }, 0);
        assert_eq!(ctx.error(), X509_V_ERR_CERT_REJECTED);
        let captured = callback.take_captured().unwrap();
        assert!(captured.is_panic());
        assert_eq!(captured.message(), "closure panicked");
    }
}

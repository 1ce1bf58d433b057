//! Protected invocation across native call frames
//!
//! Native code calls our callbacks synchronously and expects a plain status
//! code back. Nothing may unwind through its frames: neither a returned
//! error (which has no way to travel through a C signature) nor a panic
//! (which is undefined behavior across an `extern "C"` boundary).
//!
//! [`protect`] turns both into a [`Protected::Failed`] value carrying a
//! [`CapturedException`]. The component that entered native code keeps that
//! value and calls [`CapturedException::reraise`] once the native call has
//! returned. [`ensure`] pairs a body with a cleanup that runs exactly once,
//! whether the body returns or unwinds.

use crate::error::BridgeError;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// An error or panic raised inside a callback, held until it is safe to re-raise
pub enum CapturedException {
    /// The closure returned an error
    Raised(BridgeError),
    /// The closure panicked; the payload is resumed verbatim on re-raise
    Panicked(Box<dyn Any + Send + 'static>),
}

impl CapturedException {
    /// Human-readable description of the captured failure
    pub fn message(&self) -> String {
        match self {
            CapturedException::Raised(err) => err.to_string(),
            CapturedException::Panicked(payload) => panic_message(payload.as_ref()),
        }
    }

    /// Whether this holds a panic rather than a returned error
    pub fn is_panic(&self) -> bool {
        matches!(self, CapturedException::Panicked(_))
    }

    /// The captured error, if the closure returned one
    pub fn as_error(&self) -> Option<&BridgeError> {
        match self {
            CapturedException::Raised(err) => Some(err),
            CapturedException::Panicked(_) => None,
        }
    }

    /// Re-raise the captured failure
    ///
    /// Returns the error for the caller to propagate. A captured panic is
    /// resumed with [`panic::resume_unwind`] and this function does not return.
    /// Only call this from a frame with no native frames above it.
    pub fn reraise(self) -> BridgeError {
        match self {
            CapturedException::Raised(err) => err,
            CapturedException::Panicked(payload) => panic::resume_unwind(payload),
        }
    }
}

impl fmt::Debug for CapturedException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapturedException::Raised(err) => f.debug_tuple("Raised").field(err).finish(),
            CapturedException::Panicked(payload) => f
                .debug_tuple("Panicked")
                .field(&panic_message(payload.as_ref()))
                .finish(),
        }
    }
}

impl fmt::Display for CapturedException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl From<BridgeError> for CapturedException {
    fn from(err: BridgeError) -> Self {
        CapturedException::Raised(err)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}

/// Outcome of a protected invocation: exactly one of value or captured failure
#[must_use = "a failed invocation carries an exception that must be re-raised or recorded"]
#[derive(Debug)]
pub enum Protected<T> {
    /// The closure returned normally
    Value(T),
    /// The closure returned an error or panicked
    Failed(CapturedException),
}

impl<T> Protected<T> {
    /// Whether the invocation failed
    pub fn is_failed(&self) -> bool {
        matches!(self, Protected::Failed(_))
    }

    /// The value, discarding any captured failure
    pub fn ok(self) -> Option<T> {
        match self {
            Protected::Value(value) => Some(value),
            Protected::Failed(_) => None,
        }
    }

    /// Map the success value
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Protected<U> {
        match self {
            Protected::Value(value) => Protected::Value(f(value)),
            Protected::Failed(exc) => Protected::Failed(exc),
        }
    }

    /// Convert into a `Result`, re-raising a captured failure
    ///
    /// Captured panics resume unwinding here; see [`CapturedException::reraise`].
    pub fn into_result(self) -> Result<T, BridgeError> {
        match self {
            Protected::Value(value) => Ok(value),
            Protected::Failed(exc) => Err(exc.reraise()),
        }
    }
}

/// Invoke `f` under an exception barrier
///
/// Never returns an error and never unwinds: a returned `Err` and a panic
/// both come back as [`Protected::Failed`].
pub fn protect<T, F>(f: F) -> Protected<T>
where
    F: FnOnce() -> Result<T, BridgeError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Protected::Value(value),
        Ok(Err(err)) => Protected::Failed(CapturedException::Raised(err)),
        Err(payload) => Protected::Failed(CapturedException::Panicked(payload)),
    }
}

/// Run `body`, then `cleanup(arg)` exactly once, then deliver the body's outcome
///
/// The cleanup runs on normal return and while unwinding from a panic in
/// `body`; the panic then continues to the caller.
pub fn ensure<R, A, B, C>(body: B, cleanup: C, arg: A) -> R
where
    B: FnOnce() -> R,
    C: FnOnce(A),
{
    struct Guard<A, C: FnOnce(A)> {
        pending: Option<(C, A)>,
    }

    impl<A, C: FnOnce(A)> Drop for Guard<A, C> {
        fn drop(&mut self) {
            if let Some((cleanup, arg)) = self.pending.take() {
                cleanup(arg);
            }
        }
    }

    let _guard = Guard {
        pending: Some((cleanup, arg)),
    };
    body()
}

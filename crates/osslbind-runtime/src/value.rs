//! Managed values crossing the boundary
//!
//! The managed side is modelled as a closed set of variants. Closures
//! registered for callbacks are [`Value::Function`]s; "is this a
//! certificate" is a match on [`Value::Certificate`].

use crate::error::BridgeError;
use crate::ffi::hex::to_hex;
use crate::ffi::verify::StoreContextHandle;
use std::fmt;
use std::rc::Rc;

/// Closure callable from a native callback
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, BridgeError>;

/// Managed value
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Certificate(Certificate),
    StoreContext(StoreContextHandle),
    Function(Callable),
}

impl Value {
    /// String value
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    /// Array value
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }

    /// Function value wrapping `f`
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, BridgeError> + 'static,
    {
        Value::Function(Callable(Rc::new(f)))
    }

    /// Type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Certificate(_) => "certificate",
            Value::StoreContext(_) => "store context",
            Value::Function(_) => "function",
        }
    }

    /// Check if this is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this is exactly `Bool(true)`
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    /// Invoke a function value
    pub fn call(&self, args: &[Value]) -> Result<Value, BridgeError> {
        match self {
            Value::Function(f) => f.call(args),
            other => Err(BridgeError::type_mismatch(format!(
                "undefined method `call' for {}",
                other.type_name()
            ))),
        }
    }

    /// Bytes of a passphrase returned by a closure
    pub fn as_passphrase(&self) -> Result<Vec<u8>, BridgeError> {
        match self {
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            other => Err(BridgeError::type_mismatch(format!(
                "wrong argument type {} (expected String)",
                other.type_name()
            ))),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Value::Certificate(cert) => fmt::Debug::fmt(cert, f),
            Value::StoreContext(handle) => fmt::Debug::fmt(handle, f),
            Value::Function(_) => write!(f, "Function"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Certificate(a), Value::Certificate(b)) => a == b,
            (Value::StoreContext(a), Value::StoreContext(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<Certificate> for Value {
    fn from(cert: Certificate) -> Self {
        Value::Certificate(cert)
    }
}

/// Reference-counted closure
#[derive(Clone)]
pub struct Callable(Rc<NativeFn>);

impl Callable {
    /// Invoke the closure
    pub fn call(&self, args: &[Value]) -> Result<Value, BridgeError> {
        (self.0)(args)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable")
    }
}

/// Managed certificate: an immutable DER encoding
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Rc<[u8]>,
}

impl Certificate {
    /// Wrap DER bytes
    pub fn from_der(der: impl Into<Rc<[u8]>>) -> Self {
        Self { der: der.into() }
    }

    /// DER bytes
    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.der[..self.der.len().min(8)];
        write!(f, "Certificate({}", to_hex(shown))?;
        if self.der.len() > shown.len() {
            write!(f, "..")?;
        }
        write!(f, ", {} bytes)", self.der.len())
    }
}

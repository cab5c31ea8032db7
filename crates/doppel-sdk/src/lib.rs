//! Doppel SDK - Lightweight SDK for writing interceptors and native classes
//!
//! This crate provides the minimal types and traits needed to write Doppel
//! interceptors and native implementation classes without depending on the
//! full doppel-engine.
//!
//! # Example
//!
//! ```ignore
//! use doppel_sdk::{CallRecord, Interceptor, PendingResult, Value};
//!
//! #[derive(Default)]
//! struct Shout;
//!
//! impl Interceptor for Shout {
//!     fn invoke(&self, call: CallRecord) -> PendingResult {
//!         match call.pending().wait() {
//!             Ok(value) => match value.as_str() {
//!                 Some(text) => PendingResult::ready(Value::str(text.to_uppercase())),
//!                 None => PendingResult::ready(value),
//!             },
//!             Err(err) => PendingResult::failed(err),
//!         }
//!     }
//! }
//! ```

#![warn(missing_docs)]

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

// ============================================================================
// Errors
// ============================================================================

/// Result type for call-time operations
pub type CallResult<T> = Result<T, CallError>;

/// Call-time error types
///
/// Raised while dispatching members on proxy instances: conversion failures,
/// bad lookups, unset fields. Synthesis-time failures live in doppel-engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    /// Type mismatch during conversion
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Member lookup failed
    #[error("Type '{type_name}' has no member '{member}'")]
    MissingMember {
        /// Type the lookup ran against
        type_name: String,
        /// Member name that was requested
        member: String,
    },

    /// Wrong number of arguments for a member call
    #[error("Member '{member}' takes {expected} argument(s), got {got}")]
    ArityMismatch {
        /// Member being called
        member: String,
        /// Declared parameter count
        expected: usize,
        /// Actual argument count
        got: usize,
    },

    /// Field read before any constructor wrote it
    #[error("Field '{field}' of '{type_name}' was never set")]
    FieldUnset {
        /// Owning type name
        type_name: String,
        /// Field name
        field: String,
    },

    /// Invalid argument
    #[error("Argument error: {0}")]
    ArgumentError(String),

    /// Generic call failure
    #[error("{0}")]
    Failed(String),
}

impl From<String> for CallError {
    fn from(s: String) -> Self {
        CallError::Failed(s)
    }
}

impl From<&str> for CallError {
    fn from(s: &str) -> Self {
        CallError::Failed(s.to_string())
    }
}

// ============================================================================
// Object identity
// ============================================================================

/// Global object id counter (1-based, 0 reserved for "no object")
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique object id
fn next_object_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// Object references
// ============================================================================

/// Shared reference to an opaque object payload.
///
/// Proxy instances, decorator instances, interceptor cells, and placeholder
/// values all travel as `ObjectRef`s. The payload is type-erased; consumers
/// that know the concrete type can downcast, everyone else treats the value
/// as an opaque identity.
///
/// Identity is the process-unique id assigned at allocation; two refs are
/// equal exactly when they were allocated by the same call.
#[derive(Clone)]
pub struct ObjectRef {
    id: u64,
    payload: Arc<dyn Any + Send + Sync>,
}

impl ObjectRef {
    /// Allocate a new object reference around a payload
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        ObjectRef {
            id: next_object_id(),
            payload: Arc::new(payload),
        }
    }

    /// Allocate a fresh, otherwise meaningless object.
    ///
    /// Used as the placeholder result when no real implementation exists.
    pub fn opaque() -> Self {
        ObjectRef::new(())
    }

    /// The process-unique id of this object
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Borrow the payload as a concrete type, if it is one
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (&*self.payload as &dyn Any).downcast_ref::<T>()
    }

    /// Clone the payload out as a shared handle, if it is the given type
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.payload).downcast::<T>().ok()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef(#{})", self.id)
    }
}

// ============================================================================
// Lists
// ============================================================================

/// Shared, internally synchronized value sequence.
///
/// This is the positional argument bag handed to interceptors and
/// trampolines. Bags are allocated fresh per call and by convention never
/// written after publication; the lock exists so a bag can cross threads
/// without further ceremony.
#[derive(Clone)]
pub struct ListRef {
    items: Arc<Mutex<Vec<Value>>>,
}

impl ListRef {
    /// Create a list of `len` null slots
    pub fn new(len: usize) -> Self {
        ListRef {
            items: Arc::new(Mutex::new(vec![Value::Null; len])),
        }
    }

    /// Create a list from existing values, preserving order
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        ListRef {
            items: Arc::new(Mutex::new(values.into_iter().collect())),
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// True when the list has no elements
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Read the element at `index`
    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.lock().get(index).cloned()
    }

    /// Write the element at `index`; false when out of bounds
    pub fn set(&self, index: usize, value: Value) -> bool {
        let mut items = self.items.lock();
        match items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Copy the current contents out
    pub fn snapshot(&self) -> Vec<Value> {
        self.items.lock().clone()
    }
}

impl PartialEq for ListRef {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.items, &other.items) {
            return true;
        }
        *self.items.lock() == *other.items.lock()
    }
}

impl fmt::Debug for ListRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.snapshot()).finish()
    }
}

// ============================================================================
// Values
// ============================================================================

/// Dynamic value passed through proxies, interceptors, and native bodies.
///
/// Primitives are stored inline; strings, lists, and objects are
/// reference-counted. All variants are Send + Sync.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    I32(i32),
    /// 64-bit integer
    I64(i64),
    /// 64-bit float
    F64(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Shared value sequence
    List(ListRef),
    /// Opaque object reference
    Object(ObjectRef),
}

impl Value {
    /// Create a string value
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// Wrap a payload in a fresh object reference
    pub fn object<T: Any + Send + Sync>(payload: T) -> Self {
        Value::Object(ObjectRef::new(payload))
    }

    /// Allocate a fresh placeholder object
    pub fn opaque() -> Self {
        Value::Object(ObjectRef::opaque())
    }

    /// True for `Value::Null`
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Extract a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract an i32
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract an i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract an f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(x) => Some(*x),
            _ => None,
        }
    }

    /// Borrow the string contents
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the list handle
    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Borrow the object handle
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Variant name, for diagnostics and mismatch errors
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F64(_) => "f64",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Object(_) => "object",
        }
    }
}

// ============================================================================
// Pending results
// ============================================================================

type Thunk = Box<dyn FnOnce() -> CallResult<Value> + Send>;

struct PendingInner {
    outcome: OnceCell<CallResult<Value>>,
    thunk: Mutex<Option<Thunk>>,
}

/// Clonable, once-resolvable result handle.
///
/// A pending result carries either an immediately available value, an
/// immediately available failure, or a deferred producer that runs
/// synchronously on the first `wait` call. Resolution is memoized: every
/// clone observes the single outcome, and a deferred producer runs at most
/// once even under concurrent waits.
///
/// Deferred producers execute in the waiting caller's context. There is no
/// thread hand-off and no cancellation at this layer.
#[derive(Clone)]
pub struct PendingResult {
    inner: Arc<PendingInner>,
}

impl PendingResult {
    /// A handle that is already resolved to a value
    pub fn ready(value: Value) -> Self {
        let outcome = OnceCell::new();
        let _ = outcome.set(Ok(value));
        PendingResult {
            inner: Arc::new(PendingInner {
                outcome,
                thunk: Mutex::new(None),
            }),
        }
    }

    /// A handle that is already resolved to a failure
    pub fn failed(error: CallError) -> Self {
        let outcome = OnceCell::new();
        let _ = outcome.set(Err(error));
        PendingResult {
            inner: Arc::new(PendingInner {
                outcome,
                thunk: Mutex::new(None),
            }),
        }
    }

    /// A handle whose value is produced on first wait
    pub fn deferred(thunk: impl FnOnce() -> CallResult<Value> + Send + 'static) -> Self {
        PendingResult {
            inner: Arc::new(PendingInner {
                outcome: OnceCell::new(),
                thunk: Mutex::new(Some(Box::new(thunk))),
            }),
        }
    }

    /// True once an outcome has been recorded
    pub fn is_resolved(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    /// Read the outcome without forcing a deferred producer
    pub fn peek(&self) -> Option<CallResult<Value>> {
        self.inner.outcome.get().cloned()
    }

    /// Resolve the handle, running the deferred producer if one is pending.
    ///
    /// The producer runs on this thread; concurrent waiters serialize on the
    /// producer slot and all observe the same memoized outcome.
    pub fn wait(&self) -> CallResult<Value> {
        if let Some(outcome) = self.inner.outcome.get() {
            return outcome.clone();
        }
        let mut slot = self.inner.thunk.lock();
        if let Some(outcome) = self.inner.outcome.get() {
            return outcome.clone();
        }
        let outcome = match slot.take() {
            Some(thunk) => thunk(),
            None => Err(CallError::Failed("pending result has no producer".into())),
        };
        let _ = self.inner.outcome.set(outcome.clone());
        outcome
    }
}

impl fmt::Debug for PendingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.outcome.get() {
            Some(Ok(value)) => write!(f, "PendingResult(ready: {value:?})"),
            Some(Err(err)) => write!(f, "PendingResult(failed: {err})"),
            None => write!(f, "PendingResult(deferred)"),
        }
    }
}

// ============================================================================
// Call records
// ============================================================================

/// Immutable payload describing one intercepted call.
///
/// Built fresh by the proxy wrapper on every invocation and handed to the
/// interceptor. Holds the proxy instance, the decorator instance when the
/// proxy decorates a sealed implementation, the member name, the positional
/// argument bag, and the pending handle for the real call's outcome (or a
/// placeholder when no real implementation exists).
#[derive(Debug, Clone)]
pub struct CallRecord {
    proxy: Value,
    decorator: Option<Value>,
    member: Arc<str>,
    arguments: ListRef,
    pending: PendingResult,
}

impl CallRecord {
    /// Assemble a record for one call
    pub fn new(
        proxy: Value,
        decorator: Option<Value>,
        member: impl Into<Arc<str>>,
        arguments: ListRef,
        pending: PendingResult,
    ) -> Self {
        CallRecord {
            proxy,
            decorator,
            member: member.into(),
            arguments,
            pending,
        }
    }

    /// The proxy instance the call arrived on
    pub fn proxy(&self) -> &Value {
        &self.proxy
    }

    /// The decorated instance, when the decoration strategy is in play
    pub fn decorator(&self) -> Option<&Value> {
        self.decorator.as_ref()
    }

    /// Name of the member being called
    pub fn member(&self) -> &str {
        &self.member
    }

    /// The positional argument bag
    pub fn arguments(&self) -> &ListRef {
        &self.arguments
    }

    /// Read one argument by position
    pub fn arg(&self, index: usize) -> Option<Value> {
        self.arguments.get(index)
    }

    /// Handle for the real call's outcome (or the placeholder)
    pub fn pending(&self) -> &PendingResult {
        &self.pending
    }
}

// ============================================================================
// Interceptors
// ============================================================================

/// The interception capability bound to every synthesized proxy type.
///
/// One interceptor instance is constructed per proxy instance and stored in
/// a field on it. Every call to a proxied member builds a [`CallRecord`] and
/// hands it here; whatever handle this returns becomes the member's result
/// (after conversion to the declared return type).
///
/// Short-circuiting, argument inspection, retry, and logging all live here.
/// To forward to the real implementation, return `call.pending().clone()`;
/// to substitute, return a ready handle; to fail, return a failed handle.
pub trait Interceptor: Send + Sync {
    /// Handle one intercepted call
    fn invoke(&self, call: CallRecord) -> PendingResult;
}

/// An interceptor handler function (for closure-based interceptors)
pub type InterceptorFn = Arc<dyn Fn(CallRecord) -> PendingResult + Send + Sync>;

/// Interceptor wrapping a plain closure
pub struct FnInterceptor {
    f: InterceptorFn,
}

impl FnInterceptor {
    /// Wrap a closure as an interceptor
    pub fn new(f: impl Fn(CallRecord) -> PendingResult + Send + Sync + 'static) -> Self {
        FnInterceptor { f: Arc::new(f) }
    }
}

impl Interceptor for FnInterceptor {
    fn invoke(&self, call: CallRecord) -> PendingResult {
        (self.f)(call)
    }
}

/// An interceptor that forwards every call to the real implementation
/// unchanged by returning the record's own pending handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Interceptor for Passthrough {
    fn invoke(&self, call: CallRecord) -> PendingResult {
        call.pending().clone()
    }
}

// ============================================================================
// Tests
// ============================================================================

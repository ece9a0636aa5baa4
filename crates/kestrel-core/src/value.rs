//! Script value representation
//!
//! Values are what scripts and native code pass to each other: properties,
//! signal arguments and method results. Primitives are stored inline;
//! tables, functions and objects are reference-counted and compared by
//! identity.
//!
//! # Identity
//!
//! ```text
//! Nil / Boolean / Integer / Number / String  -> no identity (compared by value)
//! Table / Function / Object                  -> Identity(address of shared allocation)
//! ```
//!
//! Only values with an identity can be stored in the reference registry.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{ObjectError, ObjectResult};
use crate::object::{Object, WeakObject};
use crate::runtime::Runtime;

/// Identity of a heap value (the address of its shared allocation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(usize);

impl Identity {
    /// Create an identity from a raw pointer
    #[inline]
    pub fn from_ptr<T: ?Sized>(ptr: *const T) -> Self {
        Identity(ptr as *const () as usize)
    }

    /// Get the address
    #[inline]
    pub fn addr(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A script-visible value
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    Nil,
    /// Boolean
    Boolean(bool),
    /// 64-bit integer
    Integer(i64),
    /// Floating point number
    Number(f64),
    /// Immutable string
    String(Rc<str>),
    /// Shared table
    Table(Table),
    /// Native closure
    Function(Function),
    /// Class instance
    Object(Object),
}

impl Value {
    /// Create a string value
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    /// Check if this value is nil
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Nil and false are falsy, everything else is truthy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    /// Extract boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract integer value (integral numbers convert)
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    /// Extract numeric value (integers convert)
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Extract string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract table
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Extract function
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Extract object
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Type name for diagnostics; objects report their class name
    pub fn type_name(&self) -> &str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Object(o) => o.class().name(),
        }
    }

    /// Identity of heap values, `None` for primitives
    pub fn identity(&self) -> Option<Identity> {
        match self {
            Value::Table(t) => Some(t.identity()),
            Value::Function(f) => Some(f.identity()),
            Value::Object(o) => Some(o.identity()),
            _ => None,
        }
    }

    /// Create a weak handle to a heap value
    pub fn downgrade(&self) -> Option<WeakValue> {
        match self {
            Value::Table(t) => Some(WeakValue::Table(Rc::downgrade(&t.0))),
            Value::Function(f) => Some(WeakValue::Function(Rc::downgrade(&f.0))),
            Value::Object(o) => Some(WeakValue::Object(o.downgrade())),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "boolean({})", b),
            Value::Integer(i) => write!(f, "integer({})", i),
            Value::Number(n) => write!(f, "number({})", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Table(t) => write!(f, "{:?}", t),
            Value::Function(func) => write!(f, "{:?}", func),
            Value::Object(o) => write!(f, "{}", o),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Table(t) => write!(f, "table: {}", t.identity()),
            Value::Function(func) => write!(f, "function: {}", func.identity()),
            Value::Object(o) => write!(f, "{}", o),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}

/// Weak handle to a heap value
#[derive(Clone)]
pub enum WeakValue {
    /// Weak table
    Table(Weak<RefCell<BTreeMap<TableKey, Value>>>),
    /// Weak function
    Function(Weak<FunctionInner>),
    /// Weak object
    Object(WeakObject),
}

impl WeakValue {
    /// Upgrade to a strong value if still alive
    pub fn upgrade(&self) -> Option<Value> {
        match self {
            WeakValue::Table(w) => w.upgrade().map(|t| Value::Table(Table(t))),
            WeakValue::Function(w) => w.upgrade().map(|f| Value::Function(Function(f))),
            WeakValue::Object(w) => w.upgrade().map(Value::Object),
        }
    }

    /// Check if the value has been dropped
    pub fn is_dead(&self) -> bool {
        match self {
            WeakValue::Table(w) => w.strong_count() == 0,
            WeakValue::Function(w) => w.strong_count() == 0,
            WeakValue::Object(w) => w.is_dead(),
        }
    }
}

// ============================================================================
// Table
// ============================================================================

/// Table key
///
/// Ordered so that table iteration is deterministic:
/// booleans, then integers, then strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKey {
    /// Boolean key
    Boolean(bool),
    /// Integer key
    Integer(i64),
    /// String key
    String(Rc<str>),
}

impl TableKey {
    /// Convert a value into a key; nil, NaN and heap values are not keys
    pub fn from_value(value: &Value) -> Option<TableKey> {
        match value {
            Value::Boolean(b) => Some(TableKey::Boolean(*b)),
            Value::Integer(i) => Some(TableKey::Integer(*i)),
            Value::Number(_) => value.as_integer().map(TableKey::Integer),
            Value::String(s) => Some(TableKey::String(s.clone())),
            _ => None,
        }
    }

    /// Extract string key
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TableKey::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert the key back into a value
    pub fn to_value(&self) -> Value {
        match self {
            TableKey::Boolean(b) => Value::Boolean(*b),
            TableKey::Integer(i) => Value::Integer(*i),
            TableKey::String(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for TableKey {
    fn from(s: &str) -> Self {
        TableKey::String(Rc::from(s))
    }
}

impl From<String> for TableKey {
    fn from(s: String) -> Self {
        TableKey::String(Rc::from(s))
    }
}

impl From<i64> for TableKey {
    fn from(i: i64) -> Self {
        TableKey::Integer(i)
    }
}

impl From<bool> for TableKey {
    fn from(b: bool) -> Self {
        TableKey::Boolean(b)
    }
}

/// Shared, interior-mutable table
#[derive(Clone, Default)]
pub struct Table(Rc<RefCell<BTreeMap<TableKey, Value>>>);

impl Table {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from key/value pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<TableKey>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let table = Table::new();
        for (k, v) in pairs {
            table.set(k, v);
        }
        table
    }

    /// Build a sequence (1-based integer keys)
    pub fn from_sequence<I, V>(values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let table = Table::new();
        for v in values {
            table.push(v);
        }
        table
    }

    /// Get a value, nil if absent
    pub fn get(&self, key: impl Into<TableKey>) -> Value {
        self.0.borrow().get(&key.into()).cloned().unwrap_or_default()
    }

    /// Set a value; assigning nil removes the key
    pub fn set(&self, key: impl Into<TableKey>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let previous = if value.is_nil() {
            self.0.borrow_mut().remove(&key)
        } else {
            self.0.borrow_mut().insert(key, value)
        };
        // Dropped outside the borrow: the previous value may own objects
        drop(previous);
    }

    /// Append to the sequence part
    pub fn push(&self, value: impl Into<Value>) {
        let next = self.sequence_len() as i64 + 1;
        self.set(next, value);
    }

    /// Length of the 1-based integer sequence
    pub fn sequence_len(&self) -> usize {
        let map = self.0.borrow();
        let mut n = 0usize;
        while map.contains_key(&TableKey::Integer(n as i64 + 1)) {
            n += 1;
        }
        n
    }

    /// Values of the sequence part in order
    pub fn sequence(&self) -> Vec<Value> {
        let len = self.sequence_len();
        (1..=len as i64).map(|i| self.get(i)).collect()
    }

    /// Snapshot of all entries in key order
    pub fn pairs(&self) -> Vec<(TableKey, Value)> {
        self.0
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Identity of this table
    pub fn identity(&self) -> Identity {
        Identity::from_ptr(Rc::as_ptr(&self.0))
    }

    /// Compare by identity
    pub fn ptr_eq(&self, other: &Table) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("identity", &self.identity())
            .field("len", &self.len())
            .finish()
    }
}

// ============================================================================
// Function
// ============================================================================

/// Native closure signature
pub type NativeFn = dyn Fn(&Runtime, &[Value]) -> ObjectResult<Value>;

/// Shared function allocation
pub struct FunctionInner {
    name: Option<String>,
    func: Box<NativeFn>,
}

/// Callable value
///
/// Functions are compared by identity, so the same `Function` handle must be
/// passed to `disconnect` that was passed to `connect`.
#[derive(Clone)]
pub struct Function(Rc<FunctionInner>);

impl Function {
    /// Wrap a closure
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Runtime, &[Value]) -> ObjectResult<Value> + 'static,
    {
        Function(Rc::new(FunctionInner {
            name: None,
            func: Box::new(func),
        }))
    }

    /// Wrap a closure with a name used in diagnostics
    pub fn named<F>(name: &str, func: F) -> Self
    where
        F: Fn(&Runtime, &[Value]) -> ObjectResult<Value> + 'static,
    {
        Function(Rc::new(FunctionInner {
            name: Some(name.to_string()),
            func: Box::new(func),
        }))
    }

    /// Call the function
    pub fn call(&self, rt: &Runtime, args: &[Value]) -> ObjectResult<Value> {
        (self.0.func)(rt, args)
    }

    /// Diagnostic name, if any
    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    /// Identity of this function
    pub fn identity(&self) -> Identity {
        Identity::from_ptr(Rc::as_ptr(&self.0))
    }

    /// Compare by identity
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "function<{}>: {}", name, self.identity()),
            None => write!(f, "function: {}", self.identity()),
        }
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Get an object argument
pub fn arg_object<'a>(args: &'a [Value], index: usize, func: &str) -> ObjectResult<&'a Object> {
    args.get(index).and_then(Value::as_object).ok_or_else(|| {
        ObjectError::ArgumentError(format!(
            "{}: argument #{} must be an object, got {}",
            func,
            index + 1,
            args.get(index).map(Value::type_name).unwrap_or("no value")
        ))
    })
}

/// Get a string argument
pub fn arg_str<'a>(args: &'a [Value], index: usize, func: &str) -> ObjectResult<&'a str> {
    args.get(index).and_then(Value::as_str).ok_or_else(|| {
        ObjectError::ArgumentError(format!(
            "{}: argument #{} must be a string, got {}",
            func,
            index + 1,
            args.get(index).map(Value::type_name).unwrap_or("no value")
        ))
    })
}

/// Get a function argument
pub fn arg_function<'a>(
    args: &'a [Value],
    index: usize,
    func: &str,
) -> ObjectResult<&'a Function> {
    args.get(index).and_then(Value::as_function).ok_or_else(|| {
        ObjectError::ArgumentError(format!(
            "{}: argument #{} must be a function, got {}",
            func,
            index + 1,
            args.get(index).map(Value::type_name).unwrap_or("no value")
        ))
    })
}

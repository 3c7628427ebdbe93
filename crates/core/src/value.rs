//! Dynamically typed values handed to a watcher by its caller
//!
//! Hosts that bridge to a dynamic language (the browser, a scripting layer,
//! a scenario file) cannot promise that the "callback" they pass along is
//! actually callable. `Value` models what such a caller can hand over.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Zero-argument procedure invoked once per debounced burst
pub type Callback = Rc<dyn Fn()>;

/// A dynamically typed value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Function(Callback),
}

impl Value {
    /// Wrap a Rust closure as a callable value
    pub fn function(f: impl Fn() + 'static) -> Self {
        Value::Function(Rc::new(f))
    }

    /// Name of the value's kind, as used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Whether the value can be invoked
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Value::Object(map) => f.debug_tuple("Object").field(map).finish(),
            Value::Function(cb) => write!(f, "Function({:p})", Rc::as_ptr(cb) as *const ()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Callback> for Value {
    fn from(cb: Callback) -> Self {
        Value::Function(cb)
    }
}

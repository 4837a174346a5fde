//! The script-visible value model.
//!
//! Values are cheap to clone: compound values (`Pair`, `Map`) share their
//! storage through `Arc`, which is why every sequence "append" in the
//! runtime is a copy-and-rebuild operation rather than an in-place
//! mutation — a shared tail must never be modified underneath another
//! reference.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::eval::CallableRef;

/// One link cell of a proper list.
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub head: Value,
    pub tail: Value,
}

/// A script value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The null sentinel; also the empty list terminator.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
    /// Raw byte buffer (file contents, process output, stream chunks).
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// List link cell. Cells are structurally shared.
    Pair(Arc<Pair>),
    /// Structured record with a fixed, documented field set.
    Map(Arc<BTreeMap<String, Value>>),
    Callable(CallableRef),
}

impl Value {
    /// Stable kind name used in argument errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Char(_) => "char",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Pair(_) => "pair",
            Value::Map(_) => "map",
            Value::Callable(_) => "callable",
        }
    }

    /// Construct a list cell.
    pub fn cons(head: Value, tail: Value) -> Value {
        Value::Pair(Arc::new(Pair { head, tail }))
    }

    /// Build a record value from field pairs.
    pub fn record<I, K>(fields: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Map(Arc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Look up a record field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(name),
            _ => None,
        }
    }

    /// True for the null sentinel or any chain of pair cells ending in it.
    pub fn is_list(&self) -> bool {
        let mut cur = self;
        loop {
            match cur {
                Value::Null => return true,
                Value::Pair(p) => cur = &p.tail,
                _ => return false,
            }
        }
    }

    /// True when this value signals "abort" from a per-chunk callback.
    pub fn is_abort_signal(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&CallableRef> {
        match self {
            Value::Callable(c) => Some(c),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

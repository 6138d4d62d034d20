use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Result produced by a node, shared read-only with everything downstream.
///
/// Cloning is cheap and every clone observes the same value. There is no way
/// to obtain a mutable reference, so a later node cannot rewrite an earlier
/// node's output.
#[derive(Clone, PartialEq, Default)]
pub struct FlowInfo(Arc<Value>);

impl FlowInfo {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    pub fn null() -> Self {
        Self::default()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Nested read using a JSON pointer (`/a/b/0`)
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.0.pointer(pointer)
    }

    /// Walk a dotted path (`a.b.0`) through objects and arrays
    pub fn path(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.0, path)
    }

    /// Copy out the underlying value
    pub fn to_value(&self) -> Value {
        (*self.0).clone()
    }

    pub fn ptr_eq(&self, other: &FlowInfo) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for FlowInfo {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.0
    }
}

impl fmt::Debug for FlowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for FlowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl From<Value> for FlowInfo {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

impl Serialize for FlowInfo {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FlowInfo {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(FlowInfo::new)
    }
}

/// Resolve a dotted path inside a JSON value; numeric segments index arrays.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Truthiness used for routing conditions
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

//! Cache Value Module
//!
//! Tagged value model stored in the cache, plus a best-effort size visitor
//! used for memory reporting.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

/// Bytes counted per UTF-16 code unit of a string
const CHAR_SIZE: usize = 2;
/// Bytes counted per number
const NUMBER_SIZE: usize = 8;
/// Bytes counted per boolean
const BOOL_SIZE: usize = 4;

// == Cache Value ==
/// A value stored in the cache.
///
/// `Shared` nodes carry identity: the same `Arc` reachable through several
/// paths is sized once.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<CacheValue>),
    Map(BTreeMap<String, CacheValue>),
    Shared(Arc<CacheValue>),
}

impl CacheValue {
    // == Estimated Size ==
    /// Estimates the memory held by this value.
    ///
    /// Strings cost 2 bytes per UTF-16 unit, numbers 8 and booleans 4.
    /// Map keys and container overhead are not counted. The walk uses an
    /// explicit stack and remembers visited shared nodes.
    pub fn estimated_size(&self) -> usize {
        let mut visited: HashSet<*const CacheValue> = HashSet::new();
        let mut stack = vec![self];
        let mut bytes = 0;

        while let Some(value) = stack.pop() {
            match value {
                CacheValue::Null => {}
                CacheValue::Bool(_) => bytes += BOOL_SIZE,
                CacheValue::Number(_) => bytes += NUMBER_SIZE,
                CacheValue::Text(text) => bytes += text_size(text),
                CacheValue::List(items) => stack.extend(items.iter()),
                CacheValue::Map(fields) => stack.extend(fields.values()),
                CacheValue::Shared(node) => {
                    if visited.insert(Arc::as_ptr(node)) {
                        stack.push(node.as_ref());
                    }
                }
            }
        }

        bytes
    }

    /// Follows `Shared` indirections to the underlying value.
    pub fn resolve(&self) -> &CacheValue {
        let mut current = self;
        while let CacheValue::Shared(node) = current {
            current = node.as_ref();
        }
        current
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.resolve() {
            CacheValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.resolve() {
            CacheValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.resolve() {
            CacheValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.resolve(), CacheValue::Null)
    }
}

/// Size of a string as counted by the estimator.
pub(crate) fn text_size(text: &str) -> usize {
    text.encode_utf16().count() * CHAR_SIZE
}

// == Conversions ==
impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        CacheValue::Bool(value)
    }
}

impl From<f64> for CacheValue {
    fn from(value: f64) -> Self {
        CacheValue::Number(value)
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        CacheValue::Number(value as f64)
    }
}

impl From<i32> for CacheValue {
    fn from(value: i32) -> Self {
        CacheValue::Number(value.into())
    }
}

impl From<u64> for CacheValue {
    fn from(value: u64) -> Self {
        CacheValue::Number(value as f64)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::Text(value.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::Text(value)
    }
}

impl From<Arc<CacheValue>> for CacheValue {
    fn from(value: Arc<CacheValue>) -> Self {
        CacheValue::Shared(value)
    }
}

impl<T: Into<CacheValue>> From<Vec<T>> for CacheValue {
    fn from(items: Vec<T>) -> Self {
        CacheValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for CacheValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CacheValue::Null,
            Value::Bool(b) => CacheValue::Bool(b),
            Value::Number(n) => n.as_f64().map_or(CacheValue::Null, CacheValue::Number),
            Value::String(s) => CacheValue::Text(s),
            Value::Array(items) => CacheValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(fields) => CacheValue::Map(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}

impl From<CacheValue> for Value {
    fn from(value: CacheValue) -> Self {
        match value {
            CacheValue::Null => Value::Null,
            CacheValue::Bool(b) => Value::Bool(b),
            CacheValue::Number(n) => serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number),
            CacheValue::Text(s) => Value::String(s),
            CacheValue::List(items) => Value::Array(items.into_iter().map(Into::into).collect()),
            CacheValue::Map(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
            CacheValue::Shared(node) => CacheValue::clone(&node).into(),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primitive_sizes() {
        assert_eq!(CacheValue::Null.estimated_size(), 0);
        assert_eq!(CacheValue::from(true).estimated_size(), 4);
        assert_eq!(CacheValue::from(42).estimated_size(), 8);
        assert_eq!(CacheValue::from("hello").estimated_size(), 10);
    }

    #[test]
    fn test_text_counts_utf16_units() {
        // One BMP char plus one astral char (surrogate pair)
        assert_eq!(CacheValue::from("é😀").estimated_size(), 6);
    }

    #[test]
    fn test_nested_map_ignores_keys() {
        let value = CacheValue::from(json!({
            "name": "ab",
            "count": 3,
            "flags": [true, false],
        }));

        // "ab" = 4, 3 = 8, two booleans = 8
        assert_eq!(value.estimated_size(), 20);
    }

    #[test]
    fn test_shared_node_sized_once() {
        let shared = Arc::new(CacheValue::from("abcd"));
        let value = CacheValue::List(vec![
            CacheValue::Shared(Arc::clone(&shared)),
            CacheValue::Shared(Arc::clone(&shared)),
            CacheValue::from("x"),
        ]);

        assert_eq!(value.estimated_size(), 8 + 2);
    }

    #[test]
    fn test_resolve_and_accessors() {
        let value = CacheValue::Shared(Arc::new(CacheValue::from("inner")));
        assert_eq!(value.as_str(), Some("inner"));
        assert_eq!(CacheValue::from(1.5).as_f64(), Some(1.5));
        assert_eq!(CacheValue::from(false).as_bool(), Some(false));
        assert!(CacheValue::Null.is_null());
        assert_eq!(CacheValue::from(1).as_str(), None);
    }

    #[test]
    fn test_json_conversion() {
        let original = json!({"user": "u1", "score": 9.5, "tags": ["a"]});
        let value = CacheValue::from(original.clone());
        assert_eq!(Value::from(value), original);
    }
}

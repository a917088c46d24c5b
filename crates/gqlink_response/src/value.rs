//! The generic document tree value.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An insertion-ordered map of response members.
pub type Map = IndexMap<String, Value>;

/// A tagged document tree.
///
/// This is the payload shape for every result that crosses the callback
/// boundary: successful result trees and `{data, errors}` envelopes alike.
/// Values are moved, never shared; a tree has exactly one owner at a time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(Map),
}

impl Value {
    /// Returns true for map values.
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    /// Returns true for the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrows the map members, if this is a map.
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(members) => Some(members),
            _ => None,
        }
    }

    /// Borrows the list items, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrows the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    /// Looks up a member of a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|members| members.get(key))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Map> for Value {
    fn from(members: Map) -> Self {
        Value::Map(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let mut members = Map::new();
        members.insert("name".to_string(), Value::from("R2-D2"));
        let value = Value::Map(members);

        assert!(value.is_map());
        assert!(!value.is_null());
        assert_eq!(value.get("name").and_then(Value::as_str), Some("R2-D2"));
        assert_eq!(value.get("missing"), None);
        assert_eq!(Value::Int(3).get("name"), None);
    }

    #[test]
    fn test_map_preserves_insertion_order() {
        let mut members = Map::new();
        members.insert("z".to_string(), Value::Null);
        members.insert("a".to_string(), Value::Null);
        let keys: Vec<_> = members.keys().cloned().collect();
        assert_eq!(keys, vec!["z".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_default_is_null() {
        assert!(Value::default().is_null());
    }
}

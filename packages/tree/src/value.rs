//! The Value type - a persistent, tree-shaped data structure.
//!
//! Containers sit behind `Arc`, so cloning a `Value` is cheap and two
//! snapshots of a tree share every branch neither of them rewrote. Writes go
//! through `Arc::make_mut`: a branch is copied the first time it is touched
//! while a previous snapshot still holds it, and mutated in place afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{Key, Path, TreeError};

/// A node of an immutable data tree.
///
/// # Design Notes
///
/// - Uses `BTreeMap` for deterministic ordering (stable patches, stable comparison)
/// - `PartialEq` compares contents; use [`Value::same`] for identity
/// - There is no "undefined": a key that is not present reads as `Null`
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered sequence of values.
    Array(Arc<Vec<Value>>),
    /// Key-value map with string keys.
    Map(Arc<BTreeMap<String, Value>>),
}

impl Value {
    /// Create a null value.
    pub fn null() -> Self {
        Value::Null
    }

    /// Create an empty map.
    pub fn map() -> Self {
        Value::Map(Arc::new(BTreeMap::new()))
    }

    /// Create an empty array.
    pub fn array() -> Self {
        Value::Array(Arc::new(Vec::new()))
    }

    /// Build a map from `(key, value)` pairs.
    pub fn map_from<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(Arc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is a map.
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    /// Check if this value is an array.
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Identity comparison.
    ///
    /// Containers are the same when they share the same allocation; scalars
    /// are the same when they are equal (floats compare bit patterns, so a
    /// `NaN` is the same as itself).
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Mutable access to an array's elements, copying them if shared.
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(arr) => Some(Arc::make_mut(arr)),
            _ => None,
        }
    }

    /// Mutable access to a map's entries, copying them if shared.
    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(Arc::make_mut(map)),
            _ => None,
        }
    }

    /// Number of children of a container, `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Array(arr) => Some(arr.len()),
            Value::Map(map) => Some(map.len()),
            _ => None,
        }
    }

    /// Keys of a container, in iteration order. Empty for scalars.
    pub fn keys(&self) -> Vec<Key> {
        match self {
            Value::Array(arr) => (0..arr.len()).map(Key::Index).collect(),
            Value::Map(map) => map.keys().cloned().map(Key::from).collect(),
            _ => Vec::new(),
        }
    }

    /// Get a direct child.
    ///
    /// Returns `None` if the key doesn't exist or this value is not a
    /// container. Numeric field names index into arrays.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        match (self, key) {
            (Value::Map(map), Key::Field(name)) => map.get(name),
            (Value::Map(map), Key::Index(i)) => map.get(&i.to_string()),
            (Value::Array(arr), key) => arr.get(key.as_index()?),
            _ => None,
        }
    }

    /// Get a mutable reference to a direct child, copying this container if
    /// it is shared with another snapshot.
    pub fn get_mut(&mut self, key: &Key) -> Option<&mut Value> {
        match (self, key) {
            (Value::Map(map), Key::Field(name)) => Arc::make_mut(map).get_mut(name),
            (Value::Map(map), Key::Index(i)) => Arc::make_mut(map).get_mut(&i.to_string()),
            (Value::Array(arr), key) => {
                let index = key.as_index()?;
                Arc::make_mut(arr).get_mut(index)
            }
            _ => None,
        }
    }

    /// Get a reference to a nested value by path.
    pub fn get_path(&self, path: &Path) -> Option<&Value> {
        let mut current = self;
        for key in path.iter() {
            current = current.get(key)?;
        }
        Some(current)
    }

    /// Get a mutable reference to a nested value by path.
    pub fn get_path_mut(&mut self, path: &Path) -> Option<&mut Value> {
        let mut current = self;
        for key in path.iter() {
            current = current.get_mut(key)?;
        }
        Some(current)
    }

    /// Assign a direct child, returning the previous one.
    ///
    /// Arrays accept an index inside the array (replace) or equal to its
    /// length (append).
    ///
    /// # Errors
    ///
    /// Fails for scalars, for non-numeric keys on arrays and for indices past
    /// the end of an array.
    pub fn insert(&mut self, key: Key, value: Value) -> Result<Option<Value>, TreeError> {
        match self {
            Value::Map(map) => Ok(Arc::make_mut(map).insert(key.into_field(), value)),
            Value::Array(arr) => {
                let index = key
                    .as_index()
                    .ok_or_else(|| TreeError::InvalidIndex { key: key.clone() })?;
                let arr = Arc::make_mut(arr);
                if index < arr.len() {
                    Ok(Some(std::mem::replace(&mut arr[index], value)))
                } else if index == arr.len() {
                    arr.push(value);
                    Ok(None)
                } else {
                    Err(TreeError::IndexOutOfBounds {
                        index,
                        len: arr.len(),
                    })
                }
            }
            _ => Err(TreeError::NotAContainer { key }),
        }
    }

    /// Remove a direct child, returning it if it existed.
    ///
    /// Removing from an array shifts the following elements down.
    pub fn remove(&mut self, key: &Key) -> Result<Option<Value>, TreeError> {
        match self {
            Value::Map(map) => {
                let name = key.to_string();
                if !map.contains_key(&name) {
                    return Ok(None);
                }
                Ok(Arc::make_mut(map).remove(&name))
            }
            Value::Array(arr) => {
                let index = key
                    .as_index()
                    .ok_or_else(|| TreeError::InvalidIndex { key: key.clone() })?;
                if index < arr.len() {
                    Ok(Some(Arc::make_mut(arr).remove(index)))
                } else {
                    Ok(None)
                }
            }
            _ => Err(TreeError::NotAContainer { key: key.clone() }),
        }
    }
}

// Conversion from common types

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(Arc::new(v.into_iter().map(Into::into).collect()))
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(Arc::new(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    fn sample() -> Value {
        Value::from(serde_json::json!({
            "users": [
                {"name": "first", "active": true},
                {"name": "second", "active": false}
            ]
        }))
    }

    #[test]
    fn get_nested_value() {
        let value = sample();
        assert_eq!(
            value.get_path(&path!("users/1/name")),
            Some(&Value::from("second"))
        );
        assert_eq!(value.get_path(&path!("users/2")), None);
        assert_eq!(value.get_path(&path!("users/0/name/deeper")), None);
    }

    #[test]
    fn clones_share_containers() {
        let value = sample();
        let copy = value.clone();
        assert!(value.same(&copy));
        assert!(value
            .get_path(&path!("users/0"))
            .unwrap()
            .same(copy.get_path(&path!("users/0")).unwrap()));
    }

    #[test]
    fn writes_copy_only_the_touched_branch() {
        let original = sample();
        let mut edited = original.clone();

        *edited.get_path_mut(&path!("users/0/name")).unwrap() = Value::from("renamed");

        assert!(!edited.same(&original));
        assert_eq!(
            original.get_path(&path!("users/0/name")),
            Some(&Value::from("first"))
        );
        let untouched_before = original.get_path(&path!("users/1")).unwrap();
        let untouched_after = edited.get_path(&path!("users/1")).unwrap();
        assert!(untouched_before.same(untouched_after));
    }

    #[test]
    fn same_is_identity_for_containers() {
        let a = Value::map_from([("x", 1)]);
        let b = Value::map_from([("x", 1)]);
        assert_eq!(a, b);
        assert!(!a.same(&b));
        assert!(Value::from(f64::NAN).same(&Value::from(f64::NAN)));
        assert!(Value::from("x").same(&Value::from("x")));
    }

    #[test]
    fn insert_into_array() {
        let mut value = Value::from(vec![1, 2]);
        assert_eq!(
            value.insert(Key::Index(0), Value::from(10)).unwrap(),
            Some(Value::from(1))
        );
        assert_eq!(value.insert(Key::Index(2), Value::from(3)).unwrap(), None);
        assert!(matches!(
            value.insert(Key::Index(9), Value::Null),
            Err(TreeError::IndexOutOfBounds { index: 9, len: 3 })
        ));
        assert_eq!(value, Value::from(vec![10, 2, 3]));
    }

    #[test]
    fn insert_into_scalar_fails() {
        let mut value = Value::from(5);
        assert!(matches!(
            value.insert(Key::from("x"), Value::Null),
            Err(TreeError::NotAContainer { .. })
        ));
    }

    #[test]
    fn remove_works() {
        let mut value = sample();
        let users = value.get_path_mut(&path!("users")).unwrap();
        let removed = users.remove(&Key::Index(0)).unwrap();
        assert_eq!(
            removed.unwrap().get(&Key::from("name")),
            Some(&Value::from("first"))
        );
        assert_eq!(users.len(), Some(1));

        let user = value.get_path_mut(&path!("users/0")).unwrap();
        assert!(user.remove(&Key::from("active")).unwrap().is_some());
        assert!(user.remove(&Key::from("active")).unwrap().is_none());
    }

    #[test]
    fn numeric_field_indexes_arrays() {
        let value = Value::from(vec!["a", "b"]);
        assert_eq!(value.get(&Key::from("1")), Some(&Value::from("b")));
        assert_eq!(value.get(&Key::from("x")), None);
    }

    #[test]
    fn keys_of_containers() {
        let value = sample();
        assert_eq!(value.keys(), vec![Key::from("users")]);
        let users = value.get(&Key::from("users")).unwrap();
        assert_eq!(users.keys(), vec![Key::Index(0), Key::Index(1)]);
        assert!(Value::from(true).keys().is_empty());
    }
}

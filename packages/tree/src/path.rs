//! Keys and paths addressing nodes of a [`Value`](crate::Value) tree.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors related to path parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// A path component is neither an identifier nor an index.
    #[error("invalid path component '{component}' at position {position}: {message}")]
    InvalidComponent {
        component: String,
        position: usize,
        message: String,
    },
}

/// One step into a container: a map field or an array index.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Index(usize),
    Field(String),
}

impl Key {
    /// The array index this key denotes, if any.
    ///
    /// Fields made only of ASCII digits count as indices.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Field(name) => name.parse().ok(),
        }
    }

    /// A field whose name is a canonical decimal number becomes an index,
    /// so `"0"` and `0` address the same slot. `"01"` stays a field.
    #[must_use]
    pub fn normalized(self) -> Key {
        match self {
            Key::Field(name) => Key::field(name),
            index => index,
        }
    }

    fn field(name: String) -> Key {
        match name.parse::<usize>() {
            Ok(i) if name.bytes().all(|b| b.is_ascii_digit()) && i.to_string() == name => {
                Key::Index(i)
            }
            _ => Key::Field(name),
        }
    }

    /// The map field name this key denotes.
    pub fn into_field(self) -> String {
        match self {
            Key::Index(i) => i.to_string(),
            Key::Field(name) => name,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{}", i),
            Key::Field(name) => write!(f, "{}", name),
        }
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::field(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::field(v)
    }
}

impl From<usize> for Key {
    fn from(v: usize) -> Self {
        Key::Index(v)
    }
}

/// A sequence of keys from the root of a tree.
///
/// Textual components must be Unicode identifiers (per UAX#31) or numeric
/// strings, which parse as array indices.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path {
    pub components: Vec<Key>,
}

impl Path {
    /// The empty (root) path.
    pub fn root() -> Self {
        Path::default()
    }

    /// Parse a path string, validating components.
    ///
    /// # Path Syntax
    ///
    /// - Components are separated by `/`
    /// - Empty components are ignored (normalizes `//` and trailing `/`)
    /// - Numeric components become [`Key::Index`], the rest must be identifiers
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cursorstore_tree::{Key, Path};
    ///
    /// let path = Path::parse("users/0/name").unwrap();
    /// assert_eq!(path.len(), 3);
    /// assert_eq!(path[1], Key::Index(0));
    ///
    /// assert_eq!(Path::parse("/foo/bar/").unwrap(), Path::parse("foo/bar").unwrap());
    /// ```
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let mut components = Vec::new();
        for (i, component) in s.split('/').filter(|c| !c.is_empty()).enumerate() {
            components.push(Self::parse_component(component, i)?);
        }
        Ok(Path { components })
    }

    /// Create a path from keys. Keys are not validated.
    pub fn from_keys(keys: impl IntoIterator<Item = Key>) -> Self {
        Path {
            components: keys.into_iter().collect(),
        }
    }

    fn parse_component(component: &str, position: usize) -> Result<Key, PathError> {
        if component.chars().all(|c| c.is_ascii_digit()) {
            return component
                .parse()
                .map(Key::Index)
                .map_err(|e| PathError::InvalidComponent {
                    component: component.to_string(),
                    position,
                    message: format!("index out of range: {}", e),
                });
        }

        let mut chars = component.chars();
        let Some(first) = chars.next() else {
            return Err(PathError::InvalidComponent {
                component: component.to_string(),
                position,
                message: "empty component".to_string(),
            });
        };

        // First char: XID_Start or underscore followed by XID_Continue
        let valid_start = unicode_ident::is_xid_start(first)
            || (first == '_'
                && chars
                    .clone()
                    .next()
                    .is_some_and(unicode_ident::is_xid_continue));

        if !valid_start {
            return Err(PathError::InvalidComponent {
                component: component.to_string(),
                position,
                message: "must start with a letter or underscore followed by letter/digit"
                    .to_string(),
            });
        }

        for c in chars {
            if !unicode_ident::is_xid_continue(c) {
                return Err(PathError::InvalidComponent {
                    component: component.to_string(),
                    position,
                    message: format!("invalid character '{}' in identifier", c),
                });
            }
        }

        Ok(Key::Field(component.to_string()))
    }

    /// Check if this path is empty (root path).
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Iterate over components.
    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.components.iter()
    }

    /// The last key, `None` for the root path.
    pub fn last(&self) -> Option<&Key> {
        self.components.last()
    }

    /// This path without its last key, `None` for the root path.
    pub fn parent(&self) -> Option<Path> {
        let (_, init) = self.components.split_last()?;
        Some(Path {
            components: init.to_vec(),
        })
    }

    /// This path extended by one key.
    #[must_use]
    pub fn child(&self, key: impl Into<Key>) -> Path {
        let mut components = self.components.clone();
        components.push(key.into());
        Path { components }
    }

    /// Join this path with another.
    #[must_use]
    pub fn join(&self, other: &Path) -> Path {
        let mut components = self.components.clone();
        components.extend(other.components.iter().cloned());
        Path { components }
    }

    /// Check if this path has the given prefix.
    pub fn has_prefix(&self, prefix: &Path) -> bool {
        prefix.components.len() <= self.components.len()
            && prefix.components == self.components[..prefix.components.len()]
    }

    /// Strip a prefix from this path.
    ///
    /// Returns `None` if the prefix doesn't match.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        if self.has_prefix(prefix) {
            Some(Path {
                components: self.components[prefix.components.len()..].to_vec(),
            })
        } else {
            None
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Key;

    fn index(&self, i: usize) -> &Self::Output {
        &self.components[i]
    }
}

impl FromIterator<Key> for Path {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Path::from_keys(iter)
    }
}

/// Macro for creating paths from literals.
///
/// # Example
///
/// ```rust
/// use cursorstore_tree::path;
///
/// let p = path!("users/0/name");
/// assert_eq!(p.len(), 3);
/// ```
#[macro_export]
macro_rules! path {
    ($s:expr) => {
        $crate::Path::parse($s).expect("invalid path literal")
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_paths() {
        assert_eq!(Path::parse("").unwrap().len(), 0);
        assert_eq!(Path::parse("foo").unwrap().len(), 1);
        assert_eq!(Path::parse("foo/bar/baz").unwrap().len(), 3);
    }

    #[test]
    fn normalize_slashes() {
        assert_eq!(
            Path::parse("foo//bar/").unwrap(),
            Path::parse("/foo/bar").unwrap()
        );
    }

    #[test]
    fn numeric_components_become_indices() {
        let p = Path::parse("items/0/name").unwrap();
        assert_eq!(p[0], Key::from("items"));
        assert_eq!(p[1], Key::Index(0));
    }

    #[test]
    fn numeric_field_names_are_indices() {
        assert_eq!(Key::from("0"), Key::Index(0));
        assert_eq!(Key::from(String::from("12")), Key::Index(12));
        assert_eq!(Key::Field("3".into()).normalized(), Key::Index(3));
        assert_eq!(Key::from("01"), Key::Field("01".into()));
        assert_eq!(Key::from("+1"), Key::Field("+1".into()));
        assert_eq!(Key::from("name"), Key::Field("name".into()));
    }

    #[test]
    fn invalid_components_rejected() {
        assert!(Path::parse("foo/bar baz").is_err());
        assert!(Path::parse("foo/bar-baz").is_err());
        assert!(Path::parse("foo/.hidden").is_err());
        assert!(Path::parse("foo/123abc").is_err());
        assert!(Path::parse("_").is_err());
    }

    #[test]
    fn unicode_identifiers_allowed() {
        assert_eq!(Path::parse("usuarios/名前").unwrap().len(), 2);
    }

    #[test]
    fn parent_and_child() {
        let p = path!("a/b/c");
        assert_eq!(p.parent(), Some(path!("a/b")));
        assert_eq!(p.last(), Some(&Key::from("c")));
        assert_eq!(path!("a/b").child(3usize), path!("a/b/3"));
        assert_eq!(Path::root().parent(), None);
    }

    #[test]
    fn prefixes() {
        let p = path!("foo/bar/baz");
        assert!(p.has_prefix(&Path::root()));
        assert!(p.has_prefix(&path!("foo/bar")));
        assert!(!p.has_prefix(&path!("bar")));
        assert_eq!(p.strip_prefix(&path!("foo")), Some(path!("bar/baz")));
        assert_eq!(p.strip_prefix(&path!("other")), None);
        assert_eq!(path!("a").join(&path!("b/c")), path!("a/b/c"));
    }

    #[test]
    fn display() {
        assert_eq!(path!("users/0/name").to_string(), "users/0/name");
        assert_eq!(Path::root().to_string(), "");
    }

    #[test]
    fn serializes_as_key_list() {
        let json = serde_json::to_value(path!("users/0/name")).unwrap();
        assert_eq!(json, serde_json::json!(["users", 0, "name"]));
        let back: Path = serde_json::from_value(json).unwrap();
        assert_eq!(back, path!("users/0/name"));
    }

    #[test]
    fn error_display() {
        let err = Path::parse("foo/bar$").unwrap_err();
        let display = err.to_string();
        assert!(display.contains("bar$"));
        assert!(display.contains("position 1"));
        assert!(display.contains("invalid character"));
    }
}

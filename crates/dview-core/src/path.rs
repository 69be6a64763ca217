#![forbid(unsafe_code)]

//! Property keys and dotted property paths.
//!
//! A path like `"todos.0.title"` parses into `[Name("todos"), Index(0),
//! Name("title")]`. Purely numeric segments become [`Key::Index`] so the same
//! path addresses list elements and numerically-named record fields alike.

use std::fmt;

/// One segment of a [`PropPath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl Key {
    /// Event name emitted when this slot is assigned (`set/<key>`).
    #[must_use]
    pub fn set_event(&self) -> String {
        format!("set/{self}")
    }
}

impl From<&str> for Key {
    fn from(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = raw.parse() {
                return Self::Index(index);
            }
        }
        Self::Name(raw.to_owned())
    }
}

impl From<String> for Key {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Ordered sequence of keys from a scope to a nested value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PropPath(Vec<Key>);

impl PropPath {
    #[must_use]
    pub fn new(segments: Vec<Key>) -> Self {
        Self(segments)
    }

    #[must_use]
    pub fn segments(&self) -> &[Key] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Key> {
        self.0.first()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Key> {
        self.0.last()
    }

    /// Path without its last segment.
    #[must_use]
    pub fn parent(&self) -> PropPath {
        let end = self.0.len().saturating_sub(1);
        Self(self.0[..end].to_vec())
    }

    /// Path extended by `key`.
    #[must_use]
    pub fn child(&self, key: impl Into<Key>) -> PropPath {
        let mut segments = self.0.clone();
        segments.push(key.into());
        Self(segments)
    }
}

impl From<&str> for PropPath {
    fn from(raw: &str) -> Self {
        Self(
            raw.split('.')
                .filter(|segment| !segment.is_empty())
                .map(Key::from)
                .collect(),
        )
    }
}

impl From<String> for PropPath {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<Key> for PropPath {
    fn from(key: Key) -> Self {
        Self(vec![key])
    }
}

impl From<usize> for PropPath {
    fn from(index: usize) -> Self {
        Self(vec![Key::Index(index)])
    }
}

impl From<Vec<Key>> for PropPath {
    fn from(segments: Vec<Key>) -> Self {
        Self(segments)
    }
}

impl<const N: usize> From<[&str; N]> for PropPath {
    fn from(segments: [&str; N]) -> Self {
        Self(segments.into_iter().map(Key::from).collect())
    }
}

impl From<&PropPath> for PropPath {
    fn from(path: &PropPath) -> Self {
        path.clone()
    }
}

impl fmt::Display for PropPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segments_become_indices() {
        let path = PropPath::from("todos.12.title");
        assert_eq!(
            path.segments(),
            &[
                Key::Name("todos".into()),
                Key::Index(12),
                Key::Name("title".into())
            ]
        );
    }

    #[test]
    fn empty_segments_are_dropped() {
        assert_eq!(PropPath::from("a..b."), PropPath::from(["a", "b"]));
        assert!(PropPath::from("").is_empty());
    }

    #[test]
    fn display_joins_with_dots() {
        assert_eq!(PropPath::from("a.0.b").to_string(), "a.0.b");
    }

    #[test]
    fn parent_and_child() {
        let path = PropPath::from("a.b.c");
        assert_eq!(path.parent(), PropPath::from("a.b"));
        assert_eq!(path.parent().child("c"), path);
        assert!(PropPath::default().parent().is_empty());
    }

    #[test]
    fn set_event_name() {
        assert_eq!(Key::from("x").set_event(), "set/x");
        assert_eq!(Key::Index(3).set_event(), "set/3");
    }
}

//! Hierarchical object handles.

use std::fmt;

use crate::EventError;

/// A name for an object in the form of a hierarchical path.
///
/// Each segment is a `kind` with an optional `key`, rendered as `kind` or
/// `kind[key]` and joined with `/`. Objects with the same parent and kind
/// are distinguished by their key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    segments: Vec<Segment>,
    path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Segment {
    kind: String,
    key: Option<String>,
}

impl Segment {
    fn render(&self) -> String {
        match &self.key {
            Some(key) => format!("{}[{}]", self.kind, key),
            None => self.kind.clone(),
        }
    }
}

impl Handle {
    /// Creates a handle under `parent` (or a root handle when `None`).
    pub fn new(parent: Option<&Handle>, kind: impl Into<String>, key: Option<String>) -> Self {
        let segment = Segment {
            kind: kind.into(),
            key,
        };
        let (segments, path) = match parent {
            Some(parent) => {
                let mut segments = parent.segments.clone();
                let path = format!("{}/{}", parent.path, segment.render());
                segments.push(segment);
                (segments, path)
            }
            None => {
                let path = segment.render();
                (vec![segment], path)
            }
        };
        Self { segments, path }
    }

    /// Creates a root handle with no key.
    pub fn root(kind: impl Into<String>) -> Self {
        Self::new(None, kind, None)
    }

    /// Creates a child handle under this one.
    pub fn nest(&self, kind: impl Into<String>, key: Option<String>) -> Self {
        Self::new(Some(self), kind, key)
    }

    /// The parent handle, if any.
    pub fn parent(&self) -> Option<Handle> {
        if self.segments.len() < 2 {
            return None;
        }
        let mut parent: Option<Handle> = None;
        for segment in &self.segments[..self.segments.len() - 1] {
            parent = Some(Handle::new(
                parent.as_ref(),
                segment.kind.clone(),
                segment.key.clone(),
            ));
        }
        parent
    }

    /// Path of the parent handle, if any.
    pub fn parent_path(&self) -> Option<&str> {
        self.path
            .rfind('/')
            .filter(|_| self.segments.len() > 1)
            .map(|idx| &self.path[..idx])
    }

    /// Kind of the last segment.
    pub fn kind(&self) -> &str {
        self.last().kind.as_str()
    }

    /// Key of the last segment.
    pub fn key(&self) -> Option<&str> {
        self.last().key.as_deref()
    }

    /// Full path of this handle.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn last(&self) -> &Segment {
        // Constructors always push at least one segment.
        &self.segments[self.segments.len() - 1]
    }

    /// Parses a handle from its path representation.
    pub fn from_path(path: &str) -> Result<Self, EventError> {
        let invalid = || EventError::InvalidHandlePath(path.to_string());
        if path.is_empty() {
            return Err(invalid());
        }

        let mut handle: Option<Handle> = None;
        for pair in path.split('/') {
            let (kind, key) = match pair.split_once('[') {
                None => (pair, None),
                Some((kind, rest)) => {
                    let key = rest.strip_suffix(']').ok_or_else(invalid)?;
                    if key.is_empty() || key.contains('[') || key.contains(']') {
                        return Err(invalid());
                    }
                    (kind, Some(key.to_string()))
                }
            };
            if kind.is_empty() || kind.contains(']') {
                return Err(invalid());
            }
            handle = Some(Handle::new(handle.as_ref(), kind, key));
        }
        handle.ok_or_else(invalid)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_nested_path() {
        let charm = Handle::root("AlertmanagerCharm");
        let on = charm.nest("on", None);
        let event = on.nest("config_changed", Some("7".to_string()));

        assert_eq!(event.path(), "AlertmanagerCharm/on/config_changed[7]");
        assert_eq!(event.kind(), "config_changed");
        assert_eq!(event.key(), Some("7"));
        assert_eq!(event.parent_path(), Some("AlertmanagerCharm/on"));
        assert_eq!(event.parent(), Some(on));
    }

    #[test]
    fn test_root_has_no_parent() {
        let handle = Handle::new(None, "StoredStateData", Some("_stored".to_string()));
        assert_eq!(handle.path(), "StoredStateData[_stored]");
        assert!(handle.parent().is_none());
        assert!(handle.parent_path().is_none());
    }

    #[test]
    fn test_from_path_inverts_path() {
        let path = "AlertmanagerCharm/PrometheusInterface[prometheus]/on/new_prom_rel[12]";
        let handle = Handle::from_path(path).unwrap();
        assert_eq!(handle.path(), path);
        assert_eq!(handle.kind(), "new_prom_rel");
        assert_eq!(handle.key(), Some("12"));
        assert_eq!(
            handle.parent_path(),
            Some("AlertmanagerCharm/PrometheusInterface[prometheus]/on")
        );
    }

    #[rstest]
    #[case("")]
    #[case("on/start[1")]
    #[case("on/start[]")]
    #[case("on//start")]
    #[case("on/start[1]x")]
    fn test_from_path_rejects_malformed(#[case] path: &str) {
        assert_eq!(
            Handle::from_path(path),
            Err(EventError::InvalidHandlePath(path.to_string()))
        );
    }
}

//! Qualified keys and the two per-document bookkeeping tables.
//!
//! The naming registry maps every external `file#id` to exactly one graph
//! element. The order registry remembers, per file, the order in which
//! elements were declared; range pointers are expanded against it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, StandoffError};
use crate::graph::ElementId;

/// Separator between file name and local id.
pub const KEY_SEPARATOR: char = '#';

/// `file#id`, the only external identity of an element.
///
/// A primary-text file is addressed by its file name alone; its key has an
/// empty id and displays without the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedKey {
    pub file: String,
    pub id: String,
}

impl QualifiedKey {
    pub fn new(file: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            id: id.into(),
        }
    }

    /// Key of the primary text declared by `file`.
    pub fn text(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            id: String::new(),
        }
    }

    /// Parse `file#id`, or a bare file name for a text key.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(KEY_SEPARATOR) {
            Some((file, id)) => Self::new(file, id),
            None => Self::text(raw),
        }
    }
}

impl fmt::Display for QualifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.file)
        } else {
            write!(f, "{}{}{}", self.file, KEY_SEPARATOR, self.id)
        }
    }
}

/// External key -> internal element. A key binds at most once.
#[derive(Debug, Default)]
pub struct NamingRegistry {
    bindings: HashMap<QualifiedKey, ElementId>,
}

impl NamingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `id`. Rebinding to the same id is a no-op, rebinding to a
    /// different one is a [`StandoffError::Conflict`].
    pub fn bind(&mut self, key: QualifiedKey, id: ElementId) -> Result<()> {
        match self.bindings.get(&key) {
            Some(&existing) if existing == id => Ok(()),
            Some(_) => Err(StandoffError::Conflict {
                key: key.to_string(),
            }),
            None => {
                self.bindings.insert(key, id);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, key: &QualifiedKey) -> Option<ElementId> {
        self.bindings.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub(crate) fn into_bindings(self) -> HashMap<QualifiedKey, ElementId> {
        self.bindings
    }
}

/// Per file, the append-only declaration order of its keys.
#[derive(Debug, Default)]
pub struct OrderRegistry {
    files: HashMap<String, Vec<QualifiedKey>>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key` to the order of `file`, unless it is already the most
    /// recently appended entry there.
    pub fn append(&mut self, file: &str, key: QualifiedKey) {
        let slot = self.files.entry(file.to_string()).or_default();
        if slot.last() != Some(&key) {
            slot.push(key);
        }
    }

    /// Declaration order of `file`, if it declared anything.
    pub fn sequence(&self, file: &str) -> Option<&[QualifiedKey]> {
        self.files.get(file).map(Vec::as_slice)
    }

    pub fn knows(&self, file: &str) -> bool {
        self.files.contains_key(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petgraph::graph::NodeIndex;

    fn node(i: u32) -> ElementId {
        ElementId::Node(NodeIndex::new(i as usize))
    }

    #[test]
    fn test_key_display_and_parse() {
        let key = QualifiedKey::new("doc.tok.json", "tok_1");
        assert_eq!(key.to_string(), "doc.tok.json#tok_1");
        assert_eq!(QualifiedKey::parse("doc.tok.json#tok_1"), key);

        let text = QualifiedKey::text("doc.text.json");
        assert_eq!(text.to_string(), "doc.text.json");
        assert_eq!(QualifiedKey::parse("doc.text.json"), text);
    }

    #[test]
    fn test_bind_is_injective() {
        let mut naming = NamingRegistry::new();
        let key = QualifiedKey::new("a.tok.json", "t1");

        naming.bind(key.clone(), node(0)).unwrap();
        naming.bind(key.clone(), node(0)).unwrap();
        assert_eq!(naming.lookup(&key), Some(node(0)));

        let err = naming.bind(key.clone(), node(1)).unwrap_err();
        assert!(matches!(err, StandoffError::Conflict { .. }));
        assert_eq!(naming.lookup(&key), Some(node(0)), "binding must not change");
        assert_eq!(naming.len(), 1);
    }

    #[test]
    fn test_lookup_unbound() {
        let naming = NamingRegistry::new();
        assert!(naming.lookup(&QualifiedKey::new("x", "y")).is_none());
        assert!(naming.is_empty());
    }

    #[test]
    fn test_append_skips_only_last_duplicate() {
        let mut order = OrderRegistry::new();
        let a = QualifiedKey::new("f", "a");
        let b = QualifiedKey::new("f", "b");

        order.append("f", a.clone());
        order.append("f", a.clone());
        order.append("f", b.clone());
        order.append("f", a.clone());

        assert_eq!(order.sequence("f").unwrap(), &[a.clone(), b, a]);
        assert!(order.knows("f"));
        assert!(order.sequence("g").is_none());
    }
}

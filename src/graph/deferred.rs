//! Deferred dominance records.
//!
//! A dominance edge's target may be a structure declared later in the same
//! file, so phase one only records the edge. The owning file's records are
//! taken and resolved once the file has been read to the end.

use petgraph::graph::NodeIndex;
use std::collections::HashMap;

use crate::registry::QualifiedKey;

/// A dominance edge whose source is known and whose target is not bound yet.
#[derive(Debug, Clone)]
pub struct PendingDominance {
    /// Key the committed edge binds to.
    pub relation: QualifiedKey,
    pub source: NodeIndex,
    /// Base file the target reference is resolved against.
    pub base: String,
    pub target_ref: String,
    pub rel_type: Option<String>,
    pub layer: String,
    target: Option<NodeIndex>,
}

impl PendingDominance {
    pub fn new(
        relation: QualifiedKey,
        source: NodeIndex,
        base: impl Into<String>,
        target_ref: impl Into<String>,
        rel_type: Option<String>,
        layer: impl Into<String>,
    ) -> Self {
        Self {
            relation,
            source,
            base: base.into(),
            target_ref: target_ref.into(),
            rel_type,
            layer: layer.into(),
            target: None,
        }
    }

    /// Backfill the target. Returns false if it was already bound.
    pub fn bind_target(&mut self, target: NodeIndex) -> bool {
        if self.target.is_some() {
            return false;
        }
        self.target = Some(target);
        true
    }

    pub fn target(&self) -> Option<NodeIndex> {
        self.target
    }
}

/// Pending dominance records per owning file.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    pending: HashMap<String, Vec<PendingDominance>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: &str, record: PendingDominance) {
        self.pending.entry(file.to_string()).or_default().push(record);
    }

    /// Remove and return the records of `file`, in the order they were queued.
    pub fn take(&mut self, file: &str) -> Vec<PendingDominance> {
        self.pending.remove(file).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.values().all(Vec::is_empty)
    }

    /// Files that still have records queued, sorted.
    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.pending.keys().cloned().collect();
        files.sort();
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> PendingDominance {
        PendingDominance::new(
            QualifiedKey::new("s.struct.json", id),
            NodeIndex::new(0),
            "s.struct.json",
            "#s2",
            None,
            "s",
        )
    }

    #[test]
    fn test_take_is_per_file_and_ordered() {
        let mut queue = DeferredQueue::new();
        queue.push("a", record("r1"));
        queue.push("b", record("r2"));
        queue.push("a", record("r3"));
        assert_eq!(queue.len(), 3);

        let taken: Vec<_> = queue.take("a").into_iter().map(|r| r.relation.id).collect();
        assert_eq!(taken, vec!["r1", "r3"]);
        assert_eq!(queue.len(), 1);
        assert!(queue.take("a").is_empty());
    }

    #[test]
    fn test_target_binds_once() {
        let mut pending = record("r1");
        assert!(pending.target().is_none());
        assert!(pending.bind_target(NodeIndex::new(4)));
        assert!(!pending.bind_target(NodeIndex::new(5)));
        assert_eq!(pending.target(), Some(NodeIndex::new(4)));
    }
}

//! Core types for the document graph.
//!
//! Node and edge kinds are closed tagged unions; everything that inspects an
//! element matches on them exhaustively.

use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Internal id of any graph element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementId {
    Node(NodeIndex),
    Edge(EdgeIndex),
}

impl ElementId {
    pub fn as_node(self) -> Option<NodeIndex> {
        match self {
            ElementId::Node(idx) => Some(idx),
            ElementId::Edge(_) => None,
        }
    }

    pub fn as_edge(self) -> Option<EdgeIndex> {
        match self {
            ElementId::Edge(idx) => Some(idx),
            ElementId::Node(_) => None,
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Node(idx) => write!(f, "n{}", idx.index()),
            ElementId::Edge(idx) => write!(f, "e{}", idx.index()),
        }
    }
}

/// Position of a layer in [`DocumentGraph`](super::DocumentGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(pub usize);

/// The kind of a node in the document graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Primary text of one text file.
    Text { content: String },
    /// A token anchored to a text.
    Token,
    /// A mark covering tokens.
    Span,
    /// An inner node of a hierarchical structure.
    Structure,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Text { .. } => "text",
            NodeKind::Token => "token",
            NodeKind::Span => "span",
            NodeKind::Structure => "structure",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The kind of an edge in the document graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeKind {
    /// Token -> Text, covering characters `[start, end)`.
    TextAnchor { start: usize, end: usize },
    /// Span -> Token.
    Spanning,
    /// Structure -> any node.
    Dominance {
        #[serde(skip_serializing_if = "Option::is_none")]
        rel_type: Option<String>,
    },
    /// Any node -> any node.
    Pointing { rel_type: String },
}

impl EdgeKind {
    pub fn label(&self) -> &'static str {
        match self {
            EdgeKind::TextAnchor { .. } => "text_anchor",
            EdgeKind::Spanning => "spanning",
            EdgeKind::Dominance { .. } => "dominance",
            EdgeKind::Pointing { .. } => "pointing",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Value of an annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationValue {
    Text(String),
    /// Reference to an external file, rebased onto the declaring file's directory.
    File(PathBuf),
}

/// `{namespace?, name, value}` attached to one node or edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    pub value: AnnotationValue,
}

impl Annotation {
    /// Whether this annotation has the same qualified name as `other`.
    pub fn same_name(&self, other: &Annotation) -> bool {
        self.namespace == other.namespace && self.name == other.name
    }
}

/// Data stored in a graph node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    /// Local id (or file name, for texts).
    pub name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub layers: Vec<LayerId>,
}

impl NodeData {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            annotations: Vec::new(),
            layers: Vec::new(),
        }
    }
}

/// Data stored on a graph edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeData {
    /// Relation id, where the input gives one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: EdgeKind,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub layers: Vec<LayerId>,
}

impl EdgeData {
    pub fn new(kind: EdgeKind) -> Self {
        Self {
            name: None,
            kind,
            annotations: Vec::new(),
            layers: Vec::new(),
        }
    }

    pub fn named(name: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(kind)
        }
    }
}

/// A named set of nodes and edges.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    pub name: String,
    pub nodes: Vec<NodeIndex>,
    pub edges: Vec<EdgeIndex>,
}

impl Layer {
    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn contains(&self, element: ElementId) -> bool {
        match element {
            ElementId::Node(idx) => self.nodes.contains(&idx),
            ElementId::Edge(idx) => self.edges.contains(&idx),
        }
    }
}

// ─── Warnings ─────────────────────────────────────────────────────────────────

/// Non-fatal problems found while assembling a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A member of a span, annotation or relation reference did not resolve.
    UnresolvedMember,
    /// A member resolved to an element of the wrong kind.
    KindMismatch,
    /// A mark whose reference resolved to no token; the span was dropped.
    EmptySpan,
    /// A pointing relation without source or destination; dropped.
    EmptyRelation,
    /// A pointing relation from an element to itself; dropped.
    Cycle,
    /// A feature file without annotation type; its features were skipped.
    MissingType,
    /// A feature with an empty value.
    EmptyValue,
    /// A feature with an empty reference.
    EmptyReference,
    /// The element already carries an annotation with that name.
    DuplicateAnnotation,
    /// A declaration that does not belong in a file of this kind.
    MisplacedDeclaration,
}

/// A logged, non-fatal assembly problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyWarning {
    pub file: String,
    pub kind: WarningKind,
    pub message: String,
}

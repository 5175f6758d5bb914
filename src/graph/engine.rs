//! The document graph: an arena of nodes and edges plus the read accessors
//! downstream consumers use.
//!
//! Uses petgraph for storage. Elements are only ever added, never removed, so
//! node and edge indexes stay stable for the lifetime of the graph.

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::types::*;
use crate::registry::QualifiedKey;

/// A borrowed view of a resolved element.
#[derive(Debug, Clone, Copy)]
pub enum Element<'g> {
    Node(NodeIndex, &'g NodeData),
    Edge(EdgeIndex, &'g EdgeData),
}

impl Element<'_> {
    pub fn id(&self) -> ElementId {
        match self {
            Element::Node(idx, _) => ElementId::Node(*idx),
            Element::Edge(idx, _) => ElementId::Edge(*idx),
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        match self {
            Element::Node(_, data) => &data.annotations,
            Element::Edge(_, data) => &data.annotations,
        }
    }
}

/// One assembled document.
#[derive(Debug)]
pub struct DocumentGraph {
    name: String,
    graph: DiGraph<NodeData, EdgeData>,
    layers: Vec<Layer>,
    /// Lower-cased layer name -> layer.
    layer_index: HashMap<String, LayerId>,
    /// Qualified key -> element, frozen from the naming registry.
    keys: HashMap<QualifiedKey, ElementId>,
    meta: BTreeMap<String, String>,
    warnings: Vec<AssemblyWarning>,
}

impl DocumentGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: DiGraph::new(),
            layers: Vec::new(),
            layer_index: HashMap::new(),
            keys: HashMap::new(),
            meta: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ─── Mutation (assembly only) ───────────────────────────────

    pub(crate) fn add_node(&mut self, data: NodeData) -> NodeIndex {
        self.graph.add_node(data)
    }

    pub(crate) fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, data: EdgeData) -> EdgeIndex {
        self.graph.add_edge(from, to, data)
    }

    pub(crate) fn node_mut(&mut self, idx: NodeIndex) -> Option<&mut NodeData> {
        self.graph.node_weight_mut(idx)
    }

    pub(crate) fn annotations_mut(&mut self, element: ElementId) -> Option<&mut Vec<Annotation>> {
        match element {
            ElementId::Node(idx) => self.graph.node_weight_mut(idx).map(|n| &mut n.annotations),
            ElementId::Edge(idx) => self.graph.edge_weight_mut(idx).map(|e| &mut e.annotations),
        }
    }

    /// Add `element` to the layer called `name`, creating the layer on first use.
    /// Layer names compare case-insensitively; the first spelling wins.
    pub(crate) fn attach_to_layer(&mut self, element: ElementId, name: &str) -> LayerId {
        let lookup = name.to_lowercase();
        let layer_id = match self.layer_index.get(&lookup) {
            Some(&id) => id,
            None => {
                let id = LayerId(self.layers.len());
                self.layers.push(Layer {
                    name: name.to_string(),
                    ..Layer::default()
                });
                self.layer_index.insert(lookup, id);
                id
            }
        };

        let layer = &mut self.layers[layer_id.0];
        match element {
            ElementId::Node(idx) => {
                if !layer.nodes.contains(&idx) {
                    layer.nodes.push(idx);
                }
                if let Some(node) = self.graph.node_weight_mut(idx) {
                    if !node.layers.contains(&layer_id) {
                        node.layers.push(layer_id);
                    }
                }
            }
            ElementId::Edge(idx) => {
                if !layer.edges.contains(&idx) {
                    layer.edges.push(idx);
                }
                if let Some(edge) = self.graph.edge_weight_mut(idx) {
                    if !edge.layers.contains(&layer_id) {
                        edge.layers.push(layer_id);
                    }
                }
            }
        }
        layer_id
    }

    pub(crate) fn meta_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.meta
    }

    pub(crate) fn push_warning(&mut self, warning: AssemblyWarning) {
        self.warnings.push(warning);
    }

    pub(crate) fn set_keys(&mut self, keys: HashMap<QualifiedKey, ElementId>) {
        self.keys = keys;
    }

    // ─── Read accessors ─────────────────────────────────────────

    /// Look up the element bound to an external key.
    pub fn resolve(&self, key: &QualifiedKey) -> Option<Element<'_>> {
        self.keys.get(key).and_then(|&id| self.element(id))
    }

    pub fn element(&self, id: ElementId) -> Option<Element<'_>> {
        match id {
            ElementId::Node(idx) => self.graph.node_weight(idx).map(|n| Element::Node(idx, n)),
            ElementId::Edge(idx) => self.graph.edge_weight(idx).map(|e| Element::Edge(idx, e)),
        }
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&NodeData> {
        self.graph.node_weight(idx)
    }

    pub fn edge(&self, idx: EdgeIndex) -> Option<&EdgeData> {
        self.graph.edge_weight(idx)
    }

    pub fn edge_endpoints(&self, idx: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(idx)
    }

    /// Characters `[start, end)` of a text node. Offsets count characters, not bytes.
    pub fn text_of(&self, text: NodeIndex, start: usize, end: usize) -> Option<&str> {
        let content = match &self.graph.node_weight(text)?.kind {
            NodeKind::Text { content } => content,
            _ => return None,
        };
        if start > end {
            return None;
        }
        let byte_at = |chars: usize| {
            content
                .char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(content.len()))
                .nth(chars)
        };
        let from = byte_at(start)?;
        let to = byte_at(end)?;
        content.get(from..to)
    }

    /// The text a token is anchored to.
    pub fn token_text(&self, token: NodeIndex) -> Option<&str> {
        self.graph
            .edges_directed(token, Direction::Outgoing)
            .find_map(|edge| match edge.weight().kind {
                EdgeKind::TextAnchor { start, end } => self.text_of(edge.target(), start, end),
                _ => None,
            })
    }

    /// Layer lookup, case-insensitive.
    pub fn elements_in_layer(&self, name: &str) -> Option<&Layer> {
        self.layer_index
            .get(&name.to_lowercase())
            .map(|id| &self.layers[id.0])
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id.0)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Outgoing edges of a node, in insertion order.
    pub fn outgoing(&self, idx: NodeIndex) -> Vec<(EdgeIndex, NodeIndex, &EdgeData)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.id(), e.target(), e.weight()))
            .collect();
        // petgraph walks adjacency lists newest-first
        edges.sort_by_key(|(id, _, _)| *id);
        edges
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &NodeData)> {
        self.graph
            .node_indices()
            .map(move |idx| (idx, &self.graph[idx]))
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeIndex, &EdgeData)> {
        self.graph
            .edge_indices()
            .map(move |idx| (idx, &self.graph[idx]))
    }

    /// Document-level metadata from meta features.
    pub fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    pub fn warnings(&self) -> &[AssemblyWarning] {
        &self.warnings
    }

    /// All bound keys, sorted.
    pub fn keys(&self) -> Vec<&QualifiedKey> {
        let mut keys: Vec<_> = self.keys.keys().collect();
        keys.sort();
        keys
    }

    // ─── Stats ──────────────────────────────────────────────────

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            layers: self.layers.len(),
            warnings: self.warnings.len(),
            ..GraphStats::default()
        };
        for node in self.graph.node_weights() {
            stats.annotations += node.annotations.len();
            match node.kind {
                NodeKind::Text { .. } => stats.texts += 1,
                NodeKind::Token => stats.tokens += 1,
                NodeKind::Span => stats.spans += 1,
                NodeKind::Structure => stats.structures += 1,
            }
        }
        for edge in self.graph.edge_weights() {
            stats.annotations += edge.annotations.len();
            match edge.kind {
                EdgeKind::TextAnchor { .. } => stats.text_anchors += 1,
                EdgeKind::Spanning => stats.spanning += 1,
                EdgeKind::Dominance { .. } => stats.dominance += 1,
                EdgeKind::Pointing { .. } => stats.pointing += 1,
            }
        }
        stats
    }
}

/// Element counts for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub texts: usize,
    pub tokens: usize,
    pub spans: usize,
    pub structures: usize,
    pub text_anchors: usize,
    pub spanning: usize,
    pub dominance: usize,
    pub pointing: usize,
    pub layers: usize,
    pub annotations: usize,
    pub warnings: usize,
}

impl GraphStats {
    pub fn nodes(&self) -> usize {
        self.texts + self.tokens + self.spans + self.structures
    }

    pub fn edges(&self) -> usize {
        self.text_anchors + self.spanning + self.dominance + self.pointing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_graph(content: &str) -> (DocumentGraph, NodeIndex) {
        let mut graph = DocumentGraph::new("doc");
        let text = graph.add_node(NodeData::new(
            "doc.text.json",
            NodeKind::Text {
                content: content.to_string(),
            },
        ));
        (graph, text)
    }

    #[test]
    fn test_empty_graph() {
        let graph = DocumentGraph::new("doc");
        let stats = graph.stats();
        assert_eq!(stats.nodes(), 0);
        assert_eq!(stats.edges(), 0);
        assert!(graph.layers().is_empty());
    }

    #[test]
    fn test_text_of_counts_characters() {
        let (graph, text) = text_graph("Grüße, Welt");
        assert_eq!(graph.text_of(text, 0, 5), Some("Grüße"));
        assert_eq!(graph.text_of(text, 7, 11), Some("Welt"));
        assert_eq!(graph.text_of(text, 11, 11), Some(""));
        assert_eq!(graph.text_of(text, 7, 12), None);
        assert_eq!(graph.text_of(text, 3, 2), None);
    }

    #[test]
    fn test_token_text() {
        let (mut graph, text) = text_graph("Sample.");
        let token = graph.add_node(NodeData::new("tok_1", NodeKind::Token));
        graph.add_edge(
            token,
            text,
            EdgeData::new(EdgeKind::TextAnchor { start: 0, end: 6 }),
        );
        assert_eq!(graph.token_text(token), Some("Sample"));
        assert_eq!(graph.token_text(text), None);
    }

    #[test]
    fn test_layers_case_insensitive() {
        let (mut graph, text) = text_graph("x");
        let token = graph.add_node(NodeData::new("t", NodeKind::Token));

        let a = graph.attach_to_layer(ElementId::Node(text), "Tiger");
        let b = graph.attach_to_layer(ElementId::Node(token), "tiger");
        let again = graph.attach_to_layer(ElementId::Node(token), "TIGER");
        assert_eq!(a, b);
        assert_eq!(b, again);

        let layer = graph.elements_in_layer("TIGER").unwrap();
        assert_eq!(layer.name, "Tiger");
        assert_eq!(layer.nodes, vec![text, token]);
        assert_eq!(graph.node(token).unwrap().layers, vec![a]);
        assert!(graph.elements_in_layer("other").is_none());
    }

    #[test]
    fn test_resolve_through_keys() {
        let (mut graph, text) = text_graph("x");
        let mut keys = HashMap::new();
        keys.insert(QualifiedKey::text("doc.text.json"), ElementId::Node(text));
        graph.set_keys(keys);

        let element = graph.resolve(&QualifiedKey::text("doc.text.json")).unwrap();
        assert_eq!(element.id(), ElementId::Node(text));
        assert!(graph.resolve(&QualifiedKey::new("doc.text.json", "x")).is_none());
    }

    #[test]
    fn test_outgoing_in_insertion_order() {
        let mut graph = DocumentGraph::new("doc");
        let span = graph.add_node(NodeData::new("s", NodeKind::Span));
        let t1 = graph.add_node(NodeData::new("t1", NodeKind::Token));
        let t2 = graph.add_node(NodeData::new("t2", NodeKind::Token));
        graph.add_edge(span, t1, EdgeData::new(EdgeKind::Spanning));
        graph.add_edge(span, t2, EdgeData::new(EdgeKind::Spanning));

        let targets: Vec<_> = graph.outgoing(span).into_iter().map(|(_, t, _)| t).collect();
        assert_eq!(targets, vec![t1, t2]);
    }

    #[test]
    fn test_stats_by_kind() {
        let (mut graph, text) = text_graph("ab");
        let token = graph.add_node(NodeData::new("t", NodeKind::Token));
        let edge = graph.add_edge(
            token,
            text,
            EdgeData::new(EdgeKind::TextAnchor { start: 0, end: 2 }),
        );
        graph
            .annotations_mut(ElementId::Edge(edge))
            .unwrap()
            .push(Annotation {
                namespace: None,
                name: "n".to_string(),
                value: AnnotationValue::Text("v".to_string()),
            });

        let stats = graph.stats();
        assert_eq!(stats.texts, 1);
        assert_eq!(stats.tokens, 1);
        assert_eq!(stats.text_anchors, 1);
        assert_eq!(stats.annotations, 1);
    }
}

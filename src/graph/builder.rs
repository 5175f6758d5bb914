//! Graph builder: one operation per declaration kind.
//!
//! An [`AssemblyContext`] owns everything one document assembly needs: the
//! graph under construction, both registries and the deferred queue. Nothing
//! in here is shared between documents.

use petgraph::graph::NodeIndex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::deferred::{DeferredQueue, PendingDominance};
use super::engine::DocumentGraph;
use super::types::*;
use crate::config::StandoffConfig;
use crate::error::{Result, StandoffError};
use crate::pointer::{Pointer, PointerResolver};
use crate::reader::StructRel;
use crate::registry::{NamingRegistry, OrderRegistry, QualifiedKey};

/// Annotation type of feature files that only restate other features.
const IGNORED_FEATURE_TYPE: &str = "annoFeat";

/// Reference value of a relation endpoint that was left blank on purpose.
const EMPTY_ENDPOINT: &str = "empty";

/// Where a declaration comes from: its file, namespace and reference base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileScope {
    /// File name, the file part of every key the file declares.
    pub name: String,
    /// Text before the first `.` of the file name; names the layer.
    pub namespace: String,
    /// File that references without an explicit file part resolve against.
    pub base: String,
    /// Directory of the file; external annotation values are rebased onto it.
    pub dir: PathBuf,
    pub annotation_type: Option<String>,
}

impl FileScope {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let namespace = name.split('.').next().unwrap_or_default().to_string();
        Self {
            base: name.clone(),
            namespace,
            name,
            dir: dir.into(),
            annotation_type: None,
        }
    }

    /// Use `base` for references without a file part. Blank bases are ignored.
    pub fn with_base(mut self, base: Option<&str>) -> Self {
        if let Some(base) = base.map(str::trim).filter(|b| !b.is_empty()) {
            self.base = base.to_string();
        }
        self
    }

    pub fn with_annotation_type(mut self, annotation_type: Option<&str>) -> Self {
        self.annotation_type = annotation_type
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        self
    }

    /// Whether the file's features restate other features and are dropped.
    pub fn ignores_features(&self) -> bool {
        self.annotation_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(IGNORED_FEATURE_TYPE))
    }

    /// Whether features of this file describe the container, not graph elements.
    pub fn is_meta(&self, marker: &str) -> bool {
        let parts: Vec<&str> = self.base.split('.').collect();
        parts.len() >= 2 && parts[parts.len() - 2] == marker
    }
}

/// Store `key = value` unless `key` already has a value.
pub fn insert_meta(meta: &mut BTreeMap<String, String>, key: &str, value: &str) -> bool {
    if meta.contains_key(key) {
        return false;
    }
    meta.insert(key.to_string(), value.to_string());
    true
}

/// A reference resolved leniently: bound members plus what could not be found.
#[derive(Debug, Default)]
struct Members {
    found: Vec<(QualifiedKey, ElementId)>,
    missing: Vec<String>,
}

/// The per-document assembly context.
pub struct AssemblyContext {
    graph: DocumentGraph,
    naming: NamingRegistry,
    order: OrderRegistry,
    deferred: DeferredQueue,
    meta_marker: String,
    external_value_prefix: String,
}

impl AssemblyContext {
    pub fn new(document: impl Into<String>, config: &StandoffConfig) -> Self {
        Self {
            graph: DocumentGraph::new(document),
            naming: NamingRegistry::new(),
            order: OrderRegistry::new(),
            deferred: DeferredQueue::new(),
            meta_marker: config.meta_marker.clone(),
            external_value_prefix: config.external_value_prefix.clone(),
        }
    }

    pub fn graph(&self) -> &DocumentGraph {
        &self.graph
    }

    pub fn naming(&self) -> &NamingRegistry {
        &self.naming
    }

    pub fn order(&self) -> &OrderRegistry {
        &self.order
    }

    /// Record a non-fatal problem: logged and kept on the graph.
    pub fn warn(&mut self, file: &str, kind: WarningKind, message: impl Into<String>) {
        let message = message.into();
        warn!(file = %file, kind = ?kind, "{}", message);
        self.graph.push_warning(AssemblyWarning {
            file: file.to_string(),
            kind,
            message,
        });
    }

    // ─── Text ───────────────────────────────────────────────────

    /// Get-or-create the text node of `scope` and set its content.
    pub fn add_text(&mut self, scope: &FileScope, content: &str) -> Result<NodeIndex> {
        let key = QualifiedKey::text(&scope.name);
        if let Some(existing) = self.naming.lookup(&key) {
            let idx = existing
                .as_node()
                .ok_or_else(|| StandoffError::Conflict {
                    key: key.to_string(),
                })?;
            if let Some(node) = self.graph.node_mut(idx) {
                node.kind = NodeKind::Text {
                    content: content.to_string(),
                };
            }
            return Ok(idx);
        }

        let idx = self.graph.add_node(NodeData::new(
            scope.name.clone(),
            NodeKind::Text {
                content: content.to_string(),
            },
        ));
        self.register(scope, key, ElementId::Node(idx))?;
        debug!(file = %scope.name, chars = content.chars().count(), "text added");
        Ok(idx)
    }

    // ─── Token ──────────────────────────────────────────────────

    /// Create a token anchored to the text range `href` names.
    pub fn add_token(&mut self, scope: &FileScope, id: &str, href: &str) -> Result<NodeIndex> {
        let key = QualifiedKey::new(&scope.name, id);
        let pointer = Pointer::parse(href)?;
        let target = PointerResolver::new(&self.order).text_range(&scope.base, &pointer)?;

        let text_idx = self
            .naming
            .lookup(&QualifiedKey::text(&target.file))
            .and_then(ElementId::as_node)
            .ok_or_else(|| StandoffError::UnresolvedBase {
                file: target.file.clone(),
                reference: href.to_string(),
            })?;
        let len = match self.graph.node(text_idx).map(|n| &n.kind) {
            Some(NodeKind::Text { content }) => content.chars().count(),
            _ => {
                return Err(StandoffError::UnresolvedBase {
                    file: target.file,
                    reference: href.to_string(),
                })
            }
        };

        let range_error = |start: i64, end: i64| StandoffError::Range {
            key: key.to_string(),
            start,
            end,
            len,
        };
        let start = target
            .left
            .checked_sub(1)
            .ok_or_else(|| range_error(target.left, target.left.saturating_add(target.length)))?;
        let end = start
            .checked_add(target.length)
            .ok_or_else(|| range_error(start, start.saturating_add(target.length)))?;
        if start < 0 || start > end || end > len as i64 {
            return Err(range_error(start, end));
        }

        self.ensure_unbound(&key)?;
        let token = self.graph.add_node(NodeData::new(id, NodeKind::Token));
        self.register(scope, key, ElementId::Node(token))?;

        let anchor = self.graph.add_edge(
            token,
            text_idx,
            EdgeData::new(EdgeKind::TextAnchor {
                start: start as usize,
                end: end as usize,
            }),
        );
        self.graph
            .attach_to_layer(ElementId::Edge(anchor), &scope.namespace);
        Ok(token)
    }

    // ─── Mark ───────────────────────────────────────────────────

    /// Create a span over the tokens `href` names. Returns `None` when no
    /// token could be resolved; the span is then dropped with one warning.
    pub fn add_mark(&mut self, scope: &FileScope, id: &str, href: &str) -> Result<Option<NodeIndex>> {
        let key = QualifiedKey::new(&scope.name, id);
        let members = self.resolve_members(&scope.base, href)?;

        let mut tokens = Vec::new();
        let mut skipped = Vec::new();
        for (member, element) in &members.found {
            match element.as_node().filter(|idx| self.is_token(*idx)) {
                Some(idx) => tokens.push(idx),
                None => skipped.push(member.to_string()),
            }
        }

        if tokens.is_empty() {
            self.warn(
                &scope.name,
                WarningKind::EmptySpan,
                format!("span '{}' covers no token ('{}'), dropped", key, href),
            );
            return Ok(None);
        }
        for missing in members.missing {
            self.warn(
                &scope.name,
                WarningKind::UnresolvedMember,
                format!("span '{}': {}", key, missing),
            );
        }
        for member in skipped {
            self.warn(
                &scope.name,
                WarningKind::KindMismatch,
                format!("span '{}': member '{}' is not a token", key, member),
            );
        }

        self.ensure_unbound(&key)?;
        let span = self.graph.add_node(NodeData::new(id, NodeKind::Span));
        self.register(scope, key, ElementId::Node(span))?;
        for token in tokens {
            let edge = self
                .graph
                .add_edge(span, token, EdgeData::new(EdgeKind::Spanning));
            self.graph
                .attach_to_layer(ElementId::Edge(edge), &scope.namespace);
        }
        Ok(Some(span))
    }

    // ─── Feature ────────────────────────────────────────────────

    /// Attach an annotation to every element `href` names, or to the
    /// document's meta map for meta feature files. Returns the number of
    /// elements annotated.
    pub fn add_feature(&mut self, scope: &FileScope, href: &str, value: &str) -> Result<usize> {
        let Some(annotation_type) = scope.annotation_type.clone() else {
            self.warn(
                &scope.name,
                WarningKind::MissingType,
                format!("feature on '{}' has no annotation type, skipped", href),
            );
            return Ok(0);
        };
        if scope.ignores_features() {
            return Ok(0);
        }
        if value.is_empty() {
            self.warn(
                &scope.name,
                WarningKind::EmptyValue,
                format!("feature '{}' on '{}' has an empty value", annotation_type, href),
            );
        }

        if scope.is_meta(&self.meta_marker) {
            insert_meta(self.graph.meta_mut(), &annotation_type, value);
            return Ok(0);
        }

        if href.trim().is_empty() {
            self.warn(
                &scope.name,
                WarningKind::EmptyReference,
                format!("feature '{}' has no reference, skipped", annotation_type),
            );
            return Ok(0);
        }

        let annotation = self.annotation(scope, &annotation_type, value);
        let members = self.resolve_members(&scope.base, href)?;
        for missing in &members.missing {
            self.warn(
                &scope.name,
                WarningKind::UnresolvedMember,
                format!("feature '{}': {}", annotation_type, missing),
            );
        }
        if members.found.is_empty() {
            return Err(StandoffError::MissingElement {
                key: format!("{}#{}", scope.name, annotation_type),
                reference: href.to_string(),
            });
        }

        let mut annotated = 0;
        for (member, element) in members.found {
            let duplicate = match self.graph.annotations_mut(element) {
                None => continue,
                Some(existing) if existing.iter().any(|a| a.same_name(&annotation)) => true,
                Some(existing) => {
                    existing.push(annotation.clone());
                    false
                }
            };
            if duplicate {
                self.warn(
                    &scope.name,
                    WarningKind::DuplicateAnnotation,
                    format!("'{}' already carries '{}'", member, annotation_type),
                );
            } else {
                annotated += 1;
            }
        }
        Ok(annotated)
    }

    fn annotation(&self, scope: &FileScope, annotation_type: &str, value: &str) -> Annotation {
        let (namespace, name) = match annotation_type.rsplit_once('.') {
            Some((namespace, name)) => (namespace.to_string(), name.to_string()),
            None => (scope.namespace.clone(), annotation_type.to_string()),
        };
        let namespace = Some(namespace).filter(|n| !n.is_empty());
        Annotation {
            namespace,
            name,
            value: external_value(&scope.dir, &self.external_value_prefix, value),
        }
    }

    // ─── Pointing relation ──────────────────────────────────────

    /// Create one pointing edge per (source, destination) pair. Returns the
    /// number of edges created.
    pub fn add_pointing(&mut self, scope: &FileScope, id: &str, src: &str, dst: &str) -> Result<usize> {
        let key = QualifiedKey::new(&scope.name, id);
        if is_blank_endpoint(src) || is_blank_endpoint(dst) {
            self.warn(
                &scope.name,
                WarningKind::EmptyRelation,
                format!("relation '{}' has an empty source or destination", key),
            );
            return Ok(0);
        }

        let sources = self.endpoint_nodes(scope, &key, src)?;
        let targets = self.endpoint_nodes(scope, &key, dst)?;
        if sources.is_empty() || targets.is_empty() {
            self.warn(
                &scope.name,
                WarningKind::EmptyRelation,
                format!("relation '{}': source or destination resolved to nothing", key),
            );
            return Ok(0);
        }
        if sources.len() == 1 && targets.len() == 1 && sources[0].0 == targets[0].0 {
            let cycle = StandoffError::Cycle {
                key: key.to_string(),
            };
            self.warn(&scope.name, WarningKind::Cycle, cycle.to_string());
            return Ok(0);
        }

        let rel_type = scope.annotation_type.clone().unwrap_or_default();
        let mut first = None;
        for (_, source) in &sources {
            for (_, target) in &targets {
                let edge = self.graph.add_edge(
                    *source,
                    *target,
                    EdgeData::named(
                        id,
                        EdgeKind::Pointing {
                            rel_type: rel_type.clone(),
                        },
                    ),
                );
                self.graph
                    .attach_to_layer(ElementId::Edge(edge), &scope.namespace);
                first.get_or_insert(edge);
            }
        }
        if let Some(edge) = first {
            self.naming.bind(key.clone(), ElementId::Edge(edge))?;
            self.order.append(&scope.name, key);
        }
        Ok(sources.len() * targets.len())
    }

    /// Resolve one side of a pointing relation to nodes, warning about the rest.
    fn endpoint_nodes(
        &mut self,
        scope: &FileScope,
        relation: &QualifiedKey,
        reference: &str,
    ) -> Result<Vec<(QualifiedKey, NodeIndex)>> {
        let members = self.resolve_members(&scope.base, reference)?;
        for missing in members.missing {
            self.warn(
                &scope.name,
                WarningKind::UnresolvedMember,
                format!("relation '{}': {}", relation, missing),
            );
        }
        let mut nodes = Vec::new();
        for (member, element) in members.found {
            match element.as_node() {
                Some(idx) => nodes.push((member, idx)),
                None => self.warn(
                    &scope.name,
                    WarningKind::KindMismatch,
                    format!("relation '{}': endpoint '{}' is not a node", relation, member),
                ),
            }
        }
        Ok(nodes)
    }

    // ─── Structure / dominance ──────────────────────────────────

    /// Phase one: get-or-create the structure node and queue its dominance
    /// relations until the end of the file.
    pub fn add_structure(
        &mut self,
        scope: &FileScope,
        id: &str,
        relations: &[StructRel],
    ) -> Result<NodeIndex> {
        let key = QualifiedKey::new(&scope.name, id);
        let structure = match self.naming.lookup(&key) {
            Some(ElementId::Node(idx))
                if matches!(self.graph.node(idx).map(|n| &n.kind), Some(NodeKind::Structure)) =>
            {
                self.order.append(&scope.name, key);
                idx
            }
            Some(_) => {
                return Err(StandoffError::Conflict {
                    key: key.to_string(),
                })
            }
            None => {
                let idx = self.graph.add_node(NodeData::new(id, NodeKind::Structure));
                self.register(scope, key, ElementId::Node(idx))?;
                idx
            }
        };

        for rel in relations {
            let relation = QualifiedKey::new(&scope.name, rel.id.as_str());
            self.order.append(&scope.name, relation.clone());
            let rel_type = rel.rel_type.clone().filter(|t| !t.is_empty());
            self.deferred.push(
                &scope.name,
                PendingDominance::new(
                    relation,
                    structure,
                    scope.base.clone(),
                    rel.href.clone(),
                    rel_type,
                    scope.namespace.clone(),
                ),
            );
        }
        Ok(structure)
    }

    /// Phase two: resolve and commit every dominance relation queued for
    /// `file`. Returns the number of edges committed.
    pub fn flush_structures(&mut self, file: &str) -> Result<usize> {
        let pending = self.deferred.take(file);
        let mut committed = 0;
        for record in pending {
            let targets = self.dominance_targets(file, &record)?;
            for (i, target) in targets.into_iter().enumerate() {
                let mut edge = record.clone();
                edge.bind_target(target);
                self.commit_dominance(edge, i == 0)?;
                committed += 1;
            }
        }
        debug!(file = %file, edges = committed, "dominance relations committed");
        Ok(committed)
    }

    fn dominance_targets(&self, file: &str, record: &PendingDominance) -> Result<Vec<NodeIndex>> {
        let not_found = |key: String| StandoffError::ElementNotFound {
            key,
            file: file.to_string(),
        };
        let pointer = Pointer::parse(&record.target_ref)?;
        let keys = match PointerResolver::new(&self.order).expand(&record.base, &pointer) {
            Ok(keys) => keys,
            Err(StandoffError::UnresolvedBase { .. } | StandoffError::UnresolvedRange { .. }) => {
                return Err(not_found(record.target_ref.clone()))
            }
            Err(e) => return Err(e),
        };
        if keys.is_empty() {
            return Err(not_found(record.target_ref.clone()));
        }
        keys.into_iter()
            .map(|key| {
                self.naming
                    .lookup(&key)
                    .and_then(ElementId::as_node)
                    .ok_or_else(|| not_found(key.to_string()))
            })
            .collect()
    }

    fn commit_dominance(&mut self, record: PendingDominance, bind_key: bool) -> Result<()> {
        let Some(target) = record.target() else {
            return Err(StandoffError::ElementNotFound {
                key: record.target_ref,
                file: record.relation.file,
            });
        };
        let edge = self.graph.add_edge(
            record.source,
            target,
            EdgeData::named(
                record.relation.id.clone(),
                EdgeKind::Dominance {
                    rel_type: record.rel_type,
                },
            ),
        );
        self.graph.attach_to_layer(ElementId::Edge(edge), &record.layer);
        if bind_key {
            self.naming.bind(record.relation, ElementId::Edge(edge))?;
        }
        Ok(())
    }

    // ─── Finish ─────────────────────────────────────────────────

    /// Flush anything still deferred and hand out the finished graph.
    pub fn finish(mut self) -> Result<DocumentGraph> {
        for file in self.deferred.files() {
            self.flush_structures(&file)?;
        }
        let mut graph = self.graph;
        graph.set_keys(self.naming.into_bindings());
        Ok(graph)
    }

    // ─── Helpers ────────────────────────────────────────────────

    fn ensure_unbound(&self, key: &QualifiedKey) -> Result<()> {
        match self.naming.lookup(key) {
            Some(_) => Err(StandoffError::Conflict {
                key: key.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Bind, record declaration order and join the file's layer.
    fn register(&mut self, scope: &FileScope, key: QualifiedKey, element: ElementId) -> Result<()> {
        self.naming.bind(key.clone(), element)?;
        self.order.append(&scope.name, key);
        self.graph.attach_to_layer(element, &scope.namespace);
        Ok(())
    }

    fn is_token(&self, idx: NodeIndex) -> bool {
        matches!(self.graph.node(idx).map(|n| &n.kind), Some(NodeKind::Token))
    }

    /// Resolve every member of `reference` on its own. Unknown files, broken
    /// ranges and unbound keys become `missing`; syntax errors stay fatal.
    fn resolve_members(&self, base: &str, reference: &str) -> Result<Members> {
        let pointer = Pointer::parse(reference)?;
        let resolver = PointerResolver::new(&self.order);
        let mut members = Members::default();
        for member in pointer.members() {
            match resolver.expand(base, member) {
                Ok(keys) => {
                    for key in keys {
                        match self.naming.lookup(&key) {
                            Some(element) => members.found.push((key, element)),
                            None => members.missing.push(format!("'{}' does not exist", key)),
                        }
                    }
                }
                Err(e @ (StandoffError::UnresolvedBase { .. } | StandoffError::UnresolvedRange { .. })) => {
                    members.missing.push(e.to_string())
                }
                Err(e) => return Err(e),
            }
        }
        Ok(members)
    }
}

fn is_blank_endpoint(reference: &str) -> bool {
    let reference = reference.trim();
    reference.is_empty() || reference.eq_ignore_ascii_case(EMPTY_ENDPOINT)
}

/// `file:/x/y.wav` -> `<dir>/x/y.wav`; anything else stays inline text.
fn external_value(dir: &Path, prefix: &str, value: &str) -> AnnotationValue {
    let matches_prefix = value
        .get(..prefix.len())
        .is_some_and(|head| !prefix.is_empty() && head.eq_ignore_ascii_case(prefix));
    if matches_prefix {
        let relative = value[prefix.len()..].trim_start_matches('/');
        AnnotationValue::File(dir.join(relative))
    } else {
        AnnotationValue::Text(value.to_string())
    }
}

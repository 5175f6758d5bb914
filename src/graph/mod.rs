//! Document graph module: the data model, the graph arena, and the builder
//! that assembles declarations into it.

pub mod builder;
pub mod deferred;
pub mod engine;
pub mod types;

pub use builder::{insert_meta, AssemblyContext, FileScope};
pub use deferred::{DeferredQueue, PendingDominance};
pub use engine::{DocumentGraph, Element, GraphStats};
pub use types::{
    Annotation, AnnotationValue, AssemblyWarning, EdgeData, EdgeKind, ElementId, Layer, LayerId,
    NodeData, NodeKind, WarningKind,
};

//! # standoff
//!
//! Assembles stand-off annotation corpora into one annotation graph per
//! document.
//!
//! A document is a directory of small declaration files: primary text,
//! tokens, marks, structures, relations and features, each pointing into the
//! others. This crate resolves those pointers (including ranges and forward
//! references) and builds a single [`DocumentGraph`] per document.
//!
//! ## Key Features
//!
//! - **Order-faithful ranges**: ranges expand along each file's declaration order
//! - **Forward references**: dominance targets resolve at the end of their file
//! - **Graceful degradation**: dangling span members warn, dangling anchors fail
//! - **Parallel corpora**: documents assemble on a bounded worker pool
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use standoff::{assemble_document, JsonReader, QualifiedKey, StandoffConfig};
//! use std::path::Path;
//!
//! let config = StandoffConfig::default();
//! let graph = assemble_document(Path::new("corpus/doc"), &JsonReader, &config).unwrap();
//!
//! let token = graph.resolve(&QualifiedKey::new("doc.tok.json", "tok_1"));
//! println!("{:?}", graph.stats());
//! ```

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod corpus;
pub mod error;
pub mod graph;
pub mod pointer;
pub mod reader;
pub mod registry;

// Re-exports for convenience
pub use config::StandoffConfig;
pub use error::{Result, StandoffError};

// Graph re-exports
pub use graph::{
    AssemblyContext, AssemblyWarning, DocumentGraph, EdgeKind, Element, ElementId, GraphStats,
    NodeKind, WarningKind,
};
pub use pointer::{Pointer, PointerResolver, Resolved};
pub use registry::{NamingRegistry, OrderRegistry, QualifiedKey};

// Assembly entry points
pub use coordinator::{assemble_document, assemble_files, discover_files};
pub use corpus::{assemble_corpus, walk_corpus, CorpusNode, CorpusRun, DocumentResult};
pub use reader::{Declaration, DeclarationReader, FileDeclarations, JsonReader, MemoryReader};

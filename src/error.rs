//! Error types for document assembly.
//!
//! File-local fatal errors abort the current document only; the corpus
//! coordinator catches them at the document boundary. Non-fatal problems are
//! never errors, they become [`AssemblyWarning`](crate::graph::AssemblyWarning)s.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can abort an assembly run (or a single document of it).
#[derive(Debug, Error)]
pub enum StandoffError {
    /// Malformed pointer syntax.
    #[error("cannot parse reference '{reference}': {reason}")]
    Parse { reference: String, reason: String },

    /// A reference names a base file the document does not know.
    #[error("reference '{reference}' points into unknown file '{file}'")]
    UnresolvedBase { file: String, reference: String },

    /// A range whose endpoints cannot be found in declaration order.
    #[error("cannot expand range {left}..{right} in file '{file}'")]
    UnresolvedRange {
        file: String,
        left: String,
        right: String,
    },

    /// A dangling reference after every resolution phase has run.
    #[error("element '{key}' referenced from '{file}' does not exist")]
    ElementNotFound { key: String, file: String },

    /// Invalid or out-of-bounds text offsets.
    #[error("invalid text range [{start}, {end}) for '{key}' (text length {len})")]
    Range {
        key: String,
        start: i64,
        end: i64,
        len: usize,
    },

    /// A qualified key rebound to a different element.
    #[error("key '{key}' is already bound to a different element")]
    Conflict { key: String },

    /// A self-referential pointing relation. Never returned: assembly
    /// records it as a [`WarningKind::Cycle`](crate::graph::WarningKind)
    /// warning carrying this message and drops the relation.
    #[error("pointing relation '{key}' points to itself")]
    Cycle { key: String },

    /// A non-empty reference that resolved to no usable target.
    #[error("'{key}' references '{reference}' but no target could be resolved")]
    MissingElement { key: String, reference: String },

    /// Malformed pre-tokenized input handed over by the reader.
    #[error("cannot read declarations from {path}: {reason}")]
    Reader { path: PathBuf, reason: String },

    /// Invalid configuration file.
    #[error("invalid configuration in {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// Missing or unreadable corpus root; aborts the whole run.
    #[error("corpus root {0} does not exist or is not a directory")]
    CorpusRoot(PathBuf),

    #[error("cannot start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StandoffError {
    pub(crate) fn parse(reference: &str, reason: impl Into<String>) -> Self {
        StandoffError::Parse {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StandoffError>;

//! Corpus walk and per-document worker pool.
//!
//! A corpus directory tree becomes a tree of corpora and documents. Each
//! document is then assembled by its own task on a bounded rayon pool; tasks
//! share only the read-only tree, and a failed document never takes its
//! siblings down with it.

use ignore::WalkBuilder;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::StandoffConfig;
use crate::coordinator::{assemble_files, collect_corpus_meta};
use crate::error::{Result, StandoffError};
use crate::graph::DocumentGraph;
use crate::reader::{DeclarationReader, FileKind};

/// Name of the corpus wrapped around a root that is itself a document.
pub const ARTIFICIAL_ROOT: &str = "root_corpus";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusRole {
    Corpus,
    Document,
}

/// A corpus or document found by [`walk_corpus`].
#[derive(Debug, Clone, Serialize)]
pub struct CorpusNode {
    /// Slash-separated path of names from the root, e.g. `root/sub/doc`.
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub role: CorpusRole,
    /// Declaration files directly inside this directory.
    pub files: Vec<PathBuf>,
    pub children: Vec<CorpusNode>,
}

impl CorpusNode {
    /// Every document below (or at) this node, depth first.
    pub fn documents(&self) -> Vec<&CorpusNode> {
        let mut out = Vec::new();
        self.collect(CorpusRole::Document, &mut out);
        out
    }

    pub fn corpora(&self) -> Vec<&CorpusNode> {
        let mut out = Vec::new();
        self.collect(CorpusRole::Corpus, &mut out);
        out
    }

    fn collect<'a>(&'a self, role: CorpusRole, out: &mut Vec<&'a CorpusNode>) {
        if self.role == role {
            out.push(self);
        }
        for child in &self.children {
            child.collect(role, out);
        }
    }
}

/// Walk `root` into a corpus tree. A missing root is fatal for the whole run.
pub fn walk_corpus(root: &Path, config: &StandoffConfig) -> Result<CorpusNode> {
    if !root.is_dir() {
        return Err(StandoffError::CorpusRoot(root.to_path_buf()));
    }

    let node = walk_dir(root, "", config);
    let tree = match node {
        Some(node) if node.role == CorpusRole::Corpus => node,
        Some(document) => {
            warn!(
                root = %root.display(),
                "corpus root is a document, wrapping it in an artificial root corpus"
            );
            let mut document = document;
            document.id = format!("{}/{}", ARTIFICIAL_ROOT, document.id);
            CorpusNode {
                id: ARTIFICIAL_ROOT.to_string(),
                name: ARTIFICIAL_ROOT.to_string(),
                path: root.to_path_buf(),
                role: CorpusRole::Corpus,
                files: Vec::new(),
                children: vec![document],
            }
        }
        None => CorpusNode {
            id: dir_name(root),
            name: dir_name(root),
            path: root.to_path_buf(),
            role: CorpusRole::Corpus,
            files: Vec::new(),
            children: Vec::new(),
        },
    };
    info!(
        root = %root.display(),
        corpora = tree.corpora().len(),
        documents = tree.documents().len(),
        "corpus walked"
    );
    Ok(tree)
}

fn walk_dir(dir: &Path, parent: &str, config: &StandoffConfig) -> Option<CorpusNode> {
    let name = dir_name(dir);
    let id = if parent.is_empty() {
        name.clone()
    } else {
        format!("{}/{}", parent, name)
    };

    let mut subdirs = Vec::new();
    let mut files = Vec::new();
    for entry in WalkBuilder::new(dir)
        .max_depth(Some(1))
        .hidden(true)
        .git_ignore(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
        .filter_map(|e| e.ok())
        .filter(|e| e.depth() == 1)
    {
        match entry.file_type() {
            Some(ft) if ft.is_dir() => subdirs.push(entry.into_path()),
            Some(ft) if ft.is_file() && FileKind::from_path(entry.path(), config).is_some() => {
                files.push(entry.into_path())
            }
            _ => {}
        }
    }

    if !subdirs.is_empty() {
        let children = subdirs
            .iter()
            .filter_map(|sub| walk_dir(sub, &id, config))
            .collect();
        return Some(CorpusNode {
            id,
            name,
            path: dir.to_path_buf(),
            role: CorpusRole::Corpus,
            files,
            children,
        });
    }
    if !files.is_empty() {
        return Some(CorpusNode {
            id,
            name,
            path: dir.to_path_buf(),
            role: CorpusRole::Document,
            files,
            children: Vec::new(),
        });
    }
    warn!(dir = %dir.display(), "directory holds neither documents nor declaration files, skipped");
    None
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

/// Terminal state of one document task.
#[derive(Debug)]
pub struct DocumentResult {
    pub id: String,
    pub path: PathBuf,
    pub outcome: Result<DocumentGraph>,
}

impl DocumentResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Everything one corpus run produced.
#[derive(Debug)]
pub struct CorpusRun {
    pub tree: CorpusNode,
    /// Corpus id -> meta features declared at corpus level.
    pub corpus_meta: BTreeMap<String, BTreeMap<String, String>>,
    /// One result per document, in walk order.
    pub documents: Vec<DocumentResult>,
}

impl CorpusRun {
    pub fn succeeded(&self) -> usize {
        self.documents.iter().filter(|d| d.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.documents.len() - self.succeeded()
    }
}

/// Walk `root` and assemble every document in it.
pub fn assemble_corpus(
    root: &Path,
    reader: &dyn DeclarationReader,
    config: &StandoffConfig,
) -> Result<CorpusRun> {
    let tree = walk_corpus(root, config)?;

    let mut corpus_meta = BTreeMap::new();
    for corpus in tree.corpora() {
        if corpus.files.is_empty() {
            continue;
        }
        match collect_corpus_meta(&corpus.files, reader, config) {
            Ok(meta) => {
                corpus_meta.insert(corpus.id.clone(), meta);
            }
            Err(e) => error!(corpus = %corpus.id, error = %e, "cannot read corpus meta features"),
        }
    }

    let documents = tree.documents();
    let results = if config.run_in_parallel {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.parallel_documents)
            .thread_name(|i| format!("standoff-doc-{}", i))
            .build()?;
        pool.install(|| {
            documents
                .par_iter()
                .map(|doc| assemble_one(doc, reader, config))
                .collect::<Vec<_>>()
        })
    } else {
        documents
            .iter()
            .map(|doc| assemble_one(doc, reader, config))
            .collect()
    };

    let run = CorpusRun {
        tree,
        corpus_meta,
        documents: results,
    };
    info!(
        documents = run.documents.len(),
        failed = run.failed(),
        "corpus assembled"
    );
    Ok(run)
}

fn assemble_one(
    doc: &CorpusNode,
    reader: &dyn DeclarationReader,
    config: &StandoffConfig,
) -> DocumentResult {
    let outcome = assemble_files(&doc.path, doc.files.clone(), reader, config);
    if let Err(e) = &outcome {
        error!(document = %doc.id, error = %e, "document assembly failed");
    }
    DocumentResult {
        id: doc.id.clone(),
        path: doc.path.clone(),
        outcome,
    }
}

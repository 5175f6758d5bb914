//! CLI module for standoff.
//!
//! Commands:
//! - Corpus: assemble
//! - Document: stats, resolve, layer, text
//!
//! Every command produces one JSON value; the binary prints it to stdout.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use crate::config::StandoffConfig;
use crate::coordinator::assemble_document;
use crate::corpus::assemble_corpus;
use crate::error::{Result, StandoffError};
use crate::graph::{DocumentGraph, Element};
use crate::reader::JsonReader;
use crate::registry::QualifiedKey;

#[derive(Parser)]
#[command(name = "standoff")]
#[command(about = "Assemble stand-off annotation corpora into document graphs")]
pub struct Cli {
    /// Corpus root directory (default: current directory)
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Config file (default: <root>/.standoff/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // ─── Corpus ─────────────────────────────────────────────────
    /// Assemble every document below the root
    Assemble,

    // ─── Document ───────────────────────────────────────────────
    /// Element counts of one document
    Stats {
        /// Document directory
        doc: PathBuf,
    },

    /// Look up an element by its `file#id` key
    Resolve {
        /// Document directory
        doc: PathBuf,
        /// Qualified key, e.g. doc.tok.json#tok_1
        key: String,
    },

    /// List the nodes and edges of a layer
    Layer {
        /// Document directory
        doc: PathBuf,
        /// Layer name (case-insensitive)
        name: String,
    },

    /// Text covered by a token
    Text {
        /// Document directory
        doc: PathBuf,
        /// Qualified key of the token
        token: String,
    },
}

impl Cli {
    pub fn load_config(&self) -> Result<StandoffConfig> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(|| StandoffConfig::default_path(&self.root));
        StandoffConfig::load(&path)
    }
}

/// Run one command.
pub fn execute(command: &Commands, root: &Path, config: &StandoffConfig) -> Result<Value> {
    match command {
        Commands::Assemble => assemble(root, config),
        Commands::Stats { doc } => {
            let graph = assemble_document(doc, &JsonReader, config)?;
            Ok(json!({
                "document": graph.name(),
                "stats": graph.stats(),
                "meta": graph.meta(),
                "warnings": graph.warnings(),
            }))
        }
        Commands::Resolve { doc, key } => {
            let graph = assemble_document(doc, &JsonReader, config)?;
            let element = lookup(&graph, doc, key)?;
            Ok(describe(&graph, key, element))
        }
        Commands::Layer { doc, name } => {
            let graph = assemble_document(doc, &JsonReader, config)?;
            let layer = graph
                .elements_in_layer(name)
                .ok_or_else(|| StandoffError::ElementNotFound {
                    key: name.clone(),
                    file: doc.display().to_string(),
                })?;
            let nodes: Vec<Value> = layer
                .nodes
                .iter()
                .filter_map(|idx| graph.node(*idx).map(|n| (idx, n)))
                .map(|(idx, n)| json!({"id": format!("n{}", idx.index()), "kind": n.kind.label(), "name": n.name}))
                .collect();
            let edges: Vec<Value> = layer
                .edges
                .iter()
                .filter_map(|idx| graph.edge(*idx).map(|e| (idx, e)))
                .map(|(idx, e)| json!({"id": format!("e{}", idx.index()), "kind": e.kind.label(), "name": e.name}))
                .collect();
            Ok(json!({"layer": layer.name, "nodes": nodes, "edges": edges}))
        }
        Commands::Text { doc, token } => {
            let graph = assemble_document(doc, &JsonReader, config)?;
            let text = match lookup(&graph, doc, token)? {
                Element::Node(idx, _) => graph.token_text(idx),
                Element::Edge(..) => None,
            };
            Ok(json!({"token": token, "text": text}))
        }
    }
}

fn assemble(root: &Path, config: &StandoffConfig) -> Result<Value> {
    let run = assemble_corpus(root, &JsonReader, config)?;
    let documents: Vec<Value> = run
        .documents
        .iter()
        .map(|doc| match &doc.outcome {
            Ok(graph) => json!({
                "id": doc.id,
                "path": doc.path,
                "status": "ok",
                "stats": graph.stats(),
                "meta": graph.meta(),
            }),
            Err(e) => json!({
                "id": doc.id,
                "path": doc.path,
                "status": "failed",
                "error": e.to_string(),
            }),
        })
        .collect();
    Ok(json!({
        "root": root,
        "succeeded": run.succeeded(),
        "failed": run.failed(),
        "corpus_meta": run.corpus_meta,
        "documents": documents,
    }))
}

fn lookup<'g>(graph: &'g DocumentGraph, doc: &Path, raw: &str) -> Result<Element<'g>> {
    graph
        .resolve(&QualifiedKey::parse(raw))
        .ok_or_else(|| StandoffError::ElementNotFound {
            key: raw.to_string(),
            file: doc.display().to_string(),
        })
}

fn describe(graph: &DocumentGraph, key: &str, element: Element<'_>) -> Value {
    let layer_names = |ids: &[crate::graph::LayerId]| -> Vec<String> {
        ids.iter()
            .filter_map(|id| graph.layer(*id).map(|l| l.name.clone()))
            .collect()
    };
    match element {
        Element::Node(idx, node) => json!({
            "key": key,
            "id": element.id().to_string(),
            "element": "node",
            "node": node,
            "layers": layer_names(&node.layers),
            "outgoing": graph.outgoing(idx).len(),
        }),
        Element::Edge(idx, edge) => {
            let (source, target) = graph
                .edge_endpoints(idx)
                .map(|(s, t)| (Some(format!("n{}", s.index())), Some(format!("n{}", t.index()))))
                .unwrap_or((None, None));
            json!({
                "key": key,
                "id": element.id().to_string(),
                "element": "edge",
                "edge": edge,
                "layers": layer_names(&edge.layers),
                "source": source,
                "target": target,
            })
        }
    }
}

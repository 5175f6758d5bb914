//! File processing coordinator.
//!
//! Feeds one document's files to the builder kind by kind, text first and
//! features last. A file is consumed at most once; files it references are
//! pulled in on demand before it, so the result does not depend on the order
//! in which files are discovered within a kind.

use ignore::WalkBuilder;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::StandoffConfig;
use crate::error::{Result, StandoffError};
use crate::graph::{insert_meta, AssemblyContext, DocumentGraph, FileScope, WarningKind};
use crate::pointer::Pointer;
use crate::reader::{Declaration, DeclarationReader, FileDeclarations, FileKind};

/// Declaration files directly inside `dir`, sorted by name. Files whose name
/// does not follow the kind/ending convention are skipped.
pub fn discover_files(dir: &Path, config: &StandoffConfig) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(StandoffError::Reader {
            path: dir.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    let mut files = Vec::new();
    for entry in WalkBuilder::new(dir)
        .max_depth(Some(1))
        .hidden(true)
        .git_ignore(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
    {
        if FileKind::from_path(entry.path(), config).is_some() {
            files.push(entry.into_path());
        } else {
            debug!(path = %entry.path().display(), "not a declaration file, skipped");
        }
    }
    Ok(files)
}

/// Assemble the document stored in `dir`.
pub fn assemble_document(
    dir: &Path,
    reader: &dyn DeclarationReader,
    config: &StandoffConfig,
) -> Result<DocumentGraph> {
    let files = discover_files(dir, config)?;
    assemble_files(dir, files, reader, config)
}

/// Assemble a document from an explicit file list.
pub fn assemble_files(
    dir: &Path,
    files: Vec<PathBuf>,
    reader: &dyn DeclarationReader,
    config: &StandoffConfig,
) -> Result<DocumentGraph> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string());
    let coordinator = FileCoordinator::new(&name, dir, files, reader, config);
    let graph = coordinator.run()?;
    let stats = graph.stats();
    info!(
        document = %name,
        nodes = stats.nodes(),
        edges = stats.edges(),
        warnings = stats.warnings,
        "document assembled"
    );
    Ok(graph)
}

/// Drives one document assembly.
pub struct FileCoordinator<'r> {
    dir: PathBuf,
    reader: &'r dyn DeclarationReader,
    files: Vec<(FileKind, PathBuf)>,
    by_name: HashMap<String, PathBuf>,
    processed: HashSet<PathBuf>,
    meta_marker: String,
    ctx: AssemblyContext,
}

impl<'r> FileCoordinator<'r> {
    pub fn new(
        document: &str,
        dir: &Path,
        paths: Vec<PathBuf>,
        reader: &'r dyn DeclarationReader,
        config: &StandoffConfig,
    ) -> Self {
        let mut files = Vec::new();
        let mut by_name = HashMap::new();
        for path in paths {
            let Some(kind) = FileKind::from_path(&path, config) else {
                debug!(path = %path.display(), "unknown file kind, skipped");
                continue;
            };
            by_name.insert(file_name(&path), path.clone());
            files.push((kind, path));
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));

        Self {
            dir: dir.to_path_buf(),
            reader,
            files,
            by_name,
            processed: HashSet::new(),
            meta_marker: config.meta_marker.clone(),
            ctx: AssemblyContext::new(document, config),
        }
    }

    /// Process every file, then hand out the finished graph.
    pub fn run(mut self) -> Result<DocumentGraph> {
        for kind in FileKind::PROCESSING_ORDER {
            let batch: Vec<PathBuf> = self
                .files
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, p)| p.clone())
                .collect();
            for path in batch {
                self.process(kind, &path)?;
            }
        }
        self.ctx.finish()
    }

    fn process(&mut self, kind: FileKind, path: &Path) -> Result<()> {
        // Marked before ingesting so files that reference each other terminate.
        if !self.processed.insert(canonical(path)) {
            return Ok(());
        }
        let declarations = self.reader.read(path)?;
        let name = file_name(path);

        for dependency in dependencies(&name, &declarations) {
            let Some(dep_path) = self.by_name.get(&dependency).cloned() else {
                continue;
            };
            let Some(dep_kind) = self.kind_of(&dep_path) else {
                continue;
            };
            debug!(file = %name, dependency = %dependency, "processing referenced file first");
            self.process(dep_kind, &dep_path)?;
        }

        self.ingest(kind, &name, declarations)?;
        if kind == FileKind::Struct {
            self.ctx.flush_structures(&name)?;
        }
        Ok(())
    }

    fn kind_of(&self, path: &Path) -> Option<FileKind> {
        self.files.iter().find(|(_, p)| p == path).map(|(k, _)| *k)
    }

    fn ingest(&mut self, kind: FileKind, name: &str, declarations: FileDeclarations) -> Result<()> {
        let scope = FileScope::new(name, &self.dir)
            .with_base(declarations.base.as_deref())
            .with_annotation_type(declarations.annotation_type.as_deref());
        debug!(
            file = %name,
            kind = %kind,
            declarations = declarations.declarations.len(),
            "processing file"
        );

        for (position, declaration) in declarations.declarations.into_iter().enumerate() {
            if !kind.accepts(&declaration) {
                self.ctx.warn(
                    name,
                    WarningKind::MisplacedDeclaration,
                    format!("declaration #{} does not belong in a {} file", position + 1, kind),
                );
                continue;
            }
            match declaration {
                Declaration::Text { content } => {
                    self.ctx.add_text(&scope, &content)?;
                }
                Declaration::Token { id, href } => {
                    self.ctx.add_token(&scope, &id, &href)?;
                }
                Declaration::Mark { id, href, mark_type } => {
                    if let Some(mark_type) = mark_type {
                        debug!(file = %name, id = %id, mark_type = %mark_type, "typed mark");
                    }
                    self.ctx.add_mark(&scope, &id, &href)?;
                }
                Declaration::Struct { id, rels } => {
                    self.ctx.add_structure(&scope, &id, &rels)?;
                }
                Declaration::Rel { id, src, dst } => {
                    self.ctx.add_pointing(&scope, &id, &src, &dst)?;
                }
                Declaration::Feat {
                    id,
                    href,
                    target,
                    value,
                } => {
                    if scope.ignores_features() {
                        continue;
                    }
                    let value = value.unwrap_or_default();
                    let target = target
                        .filter(|t| !t.trim().is_empty())
                        .filter(|_| !scope.is_meta(&self.meta_marker));
                    match target {
                        // a feature with a target and no value relates two elements
                        Some(target) if value.is_empty() => {
                            let id = id.unwrap_or_else(|| format!("feat_{}", position + 1));
                            self.ctx.add_pointing(&scope, &id, &href, &target)?;
                        }
                        _ => {
                            self.ctx.add_feature(&scope, &href, &value)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Collect the meta features declared by files that sit next to
/// sub-corpora. Anything else in such files is skipped with a warning.
pub fn collect_corpus_meta(
    files: &[PathBuf],
    reader: &dyn DeclarationReader,
    config: &StandoffConfig,
) -> Result<BTreeMap<String, String>> {
    let mut meta = BTreeMap::new();
    for path in files {
        let name = file_name(path);
        if FileKind::from_path(path, config) != Some(FileKind::Feat) {
            warn!(file = %name, "only meta features are allowed next to sub-corpora, skipped");
            continue;
        }
        let declarations = reader.read(path)?;
        let dir = path.parent().unwrap_or(Path::new(""));
        let scope = FileScope::new(&name, dir)
            .with_base(declarations.base.as_deref())
            .with_annotation_type(declarations.annotation_type.as_deref());
        let Some(annotation_type) = scope.annotation_type.as_deref() else {
            warn!(file = %name, "meta feature without annotation type, skipped");
            continue;
        };
        if !scope.is_meta(&config.meta_marker) {
            warn!(file = %name, "non-meta features are not allowed at corpus level, skipped");
            continue;
        }
        for declaration in &declarations.declarations {
            if let Declaration::Feat { value, .. } = declaration {
                insert_meta(&mut meta, annotation_type, value.as_deref().unwrap_or_default());
            }
        }
    }
    Ok(meta)
}

/// Files named by `declarations` other than the declaring file itself: the
/// base plus every explicit file part of its references.
fn dependencies(name: &str, declarations: &FileDeclarations) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    let mut push = |file: &str| {
        if file != name && !files.iter().any(|f| f == file) {
            files.push(file.to_string());
        }
    };
    if let Some(base) = declarations.base.as_deref().map(str::trim) {
        if !base.is_empty() {
            push(base);
        }
    }
    for declaration in &declarations.declarations {
        for reference in declaration.references() {
            // malformed references fail later, when the declaration is built
            if let Ok(pointer) = Pointer::parse(reference) {
                for file in pointer.explicit_files() {
                    push(file);
                }
            }
        }
    }
    files
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::reader::{JsonReader, MemoryReader};
    use crate::registry::QualifiedKey;

    const DIR: &str = "/corpus/doc";

    fn text(content: &str) -> FileDeclarations {
        FileDeclarations {
            declarations: vec![Declaration::Text {
                content: content.to_string(),
            }],
            ..FileDeclarations::default()
        }
    }

    fn tokens(base: &str, ranges: &[(&str, i64, i64)]) -> FileDeclarations {
        FileDeclarations {
            base: Some(base.to_string()),
            declarations: ranges
                .iter()
                .map(|(id, left, length)| Declaration::Token {
                    id: id.to_string(),
                    href: format!("#xpointer(string-range(//body,'',{},{}))", left, length),
                })
                .collect(),
            ..FileDeclarations::default()
        }
    }

    fn marks(base: &str, marks: &[(&str, &str)]) -> FileDeclarations {
        FileDeclarations {
            base: Some(base.to_string()),
            declarations: marks
                .iter()
                .map(|(id, href)| Declaration::Mark {
                    id: id.to_string(),
                    href: href.to_string(),
                    mark_type: None,
                })
                .collect(),
            ..FileDeclarations::default()
        }
    }

    fn sample_reader() -> MemoryReader {
        let mut reader = MemoryReader::new();
        reader.insert(format!("{}/doc.text.json", DIR), text("Sample text."));
        reader.insert(
            format!("{}/doc.tok.json", DIR),
            tokens("doc.text.json", &[("tok_1", 1, 6), ("tok_2", 8, 4)]),
        );
        reader
    }

    fn assemble(reader: &MemoryReader) -> Result<DocumentGraph> {
        assemble_files(
            Path::new(DIR),
            reader.paths_in(Path::new(DIR)),
            reader,
            &StandoffConfig::default(),
        )
    }

    #[test]
    fn test_dependencies() {
        let decls = FileDeclarations {
            base: Some("doc.tok.json".to_string()),
            declarations: vec![Declaration::Rel {
                id: "r".to_string(),
                src: "#a other.mark.json#b".to_string(),
                dst: "doc.rel.json#c".to_string(),
            }],
            ..FileDeclarations::default()
        };
        assert_eq!(
            dependencies("doc.rel.json", &decls),
            vec!["doc.tok.json", "other.mark.json"]
        );
    }

    #[test]
    fn test_kind_order_is_respected() {
        let mut reader = sample_reader();
        // sorts before the token file, but must run after it
        reader.insert(
            format!("{}/a.mark.json", DIR),
            marks("doc.tok.json", &[("m1", "#tok_1 #tok_2")]),
        );
        let graph = assemble(&reader).unwrap();
        let stats = graph.stats();
        assert_eq!(stats.tokens, 2);
        assert_eq!(stats.spans, 1);
        assert_eq!(stats.spanning, 2);
    }

    #[test]
    fn test_referenced_file_processed_on_demand() {
        let mut reader = sample_reader();
        // first mark file points into the second one
        reader.insert(
            format!("{}/doc.a.mark.json", DIR),
            marks("doc.b.mark.json", &[("outer", "doc.tok.json#tok_1")]),
        );
        reader.insert(
            format!("{}/doc.b.mark.json", DIR),
            marks("doc.tok.json", &[("inner", "#tok_2")]),
        );
        let graph = assemble(&reader).unwrap();
        assert_eq!(graph.stats().spans, 2);
        assert!(graph
            .resolve(&QualifiedKey::new("doc.b.mark.json", "inner"))
            .is_some());
    }

    #[test]
    fn test_struct_file_flushed_at_end() {
        let mut reader = sample_reader();
        reader.insert(
            format!("{}/doc.const.struct.json", DIR),
            FileDeclarations {
                declarations: vec![
                    Declaration::Struct {
                        id: "s1".to_string(),
                        rels: vec![crate::reader::StructRel {
                            id: "r1".to_string(),
                            href: "#s2".to_string(),
                            rel_type: None,
                        }],
                    },
                    Declaration::Struct {
                        id: "s2".to_string(),
                        rels: vec![crate::reader::StructRel {
                            id: "r2".to_string(),
                            href: "doc.tok.json#tok_1".to_string(),
                            rel_type: Some("hd".to_string()),
                        }],
                    },
                ],
                ..FileDeclarations::default()
            },
        );
        let graph = assemble(&reader).unwrap();
        assert_eq!(graph.stats().structures, 2);
        assert_eq!(graph.stats().dominance, 2);
    }

    #[test]
    fn test_feature_with_target_becomes_relation() {
        let mut reader = sample_reader();
        reader.insert(
            format!("{}/doc.dep.feat.json", DIR),
            FileDeclarations {
                base: Some("doc.tok.json".to_string()),
                annotation_type: Some("dep".to_string()),
                declarations: vec![Declaration::Feat {
                    id: Some("d1".to_string()),
                    href: "#tok_1".to_string(),
                    target: Some("#tok_2".to_string()),
                    value: None,
                }],
                ..FileDeclarations::default()
            },
        );
        let graph = assemble(&reader).unwrap();
        assert_eq!(graph.stats().pointing, 1);
        assert_eq!(graph.stats().annotations, 0);
    }

    fn targeted_feature(base: &str, annotation_type: &str) -> FileDeclarations {
        FileDeclarations {
            base: Some(base.to_string()),
            annotation_type: Some(annotation_type.to_string()),
            declarations: vec![Declaration::Feat {
                id: None,
                href: "#tok_1".to_string(),
                target: Some("#tok_2".to_string()),
                value: None,
            }],
            ..FileDeclarations::default()
        }
    }

    #[test]
    fn test_anno_feat_file_ignores_targeted_features() {
        let mut reader = sample_reader();
        reader.insert(
            format!("{}/doc.x.feat.json", DIR),
            targeted_feature("doc.tok.json", "ANNOFEAT"),
        );
        let graph = assemble(&reader).unwrap();
        assert_eq!(graph.stats().pointing, 0);
        assert_eq!(graph.stats().annotations, 0);
        assert!(graph.warnings().is_empty());
    }

    #[test]
    fn test_meta_file_never_creates_relations() {
        let mut reader = sample_reader();
        reader.insert(
            format!("{}/doc.anno_genre.feat.json", DIR),
            targeted_feature("doc.anno.json", "genre"),
        );
        let graph = assemble(&reader).unwrap();
        assert_eq!(graph.stats().pointing, 0);
        assert_eq!(graph.meta().get("genre").map(String::as_str), Some(""));
        assert_eq!(graph.warnings()[0].kind, WarningKind::EmptyValue);
    }

    #[test]
    fn test_misplaced_declaration_warns() {
        let mut reader = sample_reader();
        reader.insert(
            format!("{}/doc.x.mark.json", DIR),
            FileDeclarations {
                base: Some("doc.tok.json".to_string()),
                declarations: vec![Declaration::Text {
                    content: "stray".to_string(),
                }],
                ..FileDeclarations::default()
            },
        );
        let graph = assemble(&reader).unwrap();
        assert_eq!(graph.warnings().len(), 1);
        assert_eq!(graph.warnings()[0].kind, WarningKind::MisplacedDeclaration);
        assert_eq!(graph.stats().texts, 1);
    }

    #[test]
    fn test_fatal_error_aborts_document() {
        let mut reader = sample_reader();
        reader.insert(
            format!("{}/doc.bad.tok.json", DIR),
            tokens("doc.text.json", &[("t", 10, 40)]),
        );
        let err = assemble(&reader).unwrap_err();
        assert!(matches!(err, StandoffError::Range { .. }));
    }

    #[test]
    fn test_assemble_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc");
        fs::create_dir(&doc).unwrap();
        fs::write(
            doc.join("doc.text.json"),
            r#"{"declarations": [{"kind": "text", "content": "Sample."}]}"#,
        )
        .unwrap();
        fs::write(
            doc.join("doc.tok.json"),
            r##"{"base": "doc.text.json", "declarations": [
                {"kind": "token", "id": "tok_1", "href": "#xpointer(string-range(//body,'',1,6))"}
            ]}"##,
        )
        .unwrap();
        fs::write(doc.join("notes.txt"), "ignored").unwrap();

        let config = StandoffConfig::default();
        assert_eq!(discover_files(&doc, &config).unwrap().len(), 2);

        let graph = assemble_document(&doc, &JsonReader, &config).unwrap();
        assert_eq!(graph.name(), "doc");
        let token = graph
            .resolve(&QualifiedKey::new("doc.tok.json", "tok_1"))
            .and_then(|e| e.id().as_node())
            .unwrap();
        assert_eq!(graph.token_text(token), Some("Sample"));
        assert!(graph
            .nodes()
            .any(|(_, n)| matches!(n.kind, NodeKind::Text { .. })));
    }

    #[test]
    fn test_corpus_meta() {
        let mut reader = MemoryReader::new();
        let feat = PathBuf::from("/corpus/corpus.anno_lang.feat.json");
        reader.insert(
            feat.clone(),
            FileDeclarations {
                base: Some("corpus.anno.json".to_string()),
                annotation_type: Some("language".to_string()),
                declarations: vec![Declaration::Feat {
                    id: None,
                    href: "#anno_1".to_string(),
                    target: None,
                    value: Some("de".to_string()),
                }],
                ..FileDeclarations::default()
            },
        );
        let stray = PathBuf::from("/corpus/corpus.text.json");
        let meta = collect_corpus_meta(&[feat, stray], &reader, &StandoffConfig::default()).unwrap();
        assert_eq!(meta.get("language").map(String::as_str), Some("de"));
        assert_eq!(meta.len(), 1);
    }
}

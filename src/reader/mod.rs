//! Declaration files and the reader interface.
//!
//! Tokenizing the XML itself is somebody else's job. The engine only sees
//! [`FileDeclarations`], the per-file list of declarations a reader hands
//! over, much like a parser hands over its extractions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::StandoffConfig;
use crate::error::{Result, StandoffError};

/// Kind of a declaration file, taken from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Text,
    Token,
    Mark,
    Struct,
    Rel,
    Feat,
}

impl FileKind {
    /// Files are ingested kind by kind in this order.
    pub const PROCESSING_ORDER: [FileKind; 6] = [
        FileKind::Text,
        FileKind::Token,
        FileKind::Mark,
        FileKind::Struct,
        FileKind::Rel,
        FileKind::Feat,
    ];

    /// Detect the kind from `<namespace>.<...>.<kind>.<ending>`.
    pub fn from_path(path: &Path, config: &StandoffConfig) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() < 3 || !config.accepts_ending(parts[parts.len() - 1]) {
            return None;
        }
        Self::from_suffix(parts[parts.len() - 2])
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "text" => Some(FileKind::Text),
            "tok" => Some(FileKind::Token),
            "mark" => Some(FileKind::Mark),
            "struct" => Some(FileKind::Struct),
            "rel" => Some(FileKind::Rel),
            "feat" => Some(FileKind::Feat),
            _ => None,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            FileKind::Text => "text",
            FileKind::Token => "tok",
            FileKind::Mark => "mark",
            FileKind::Struct => "struct",
            FileKind::Rel => "rel",
            FileKind::Feat => "feat",
        }
    }

    /// Whether a declaration may appear in a file of this kind.
    pub fn accepts(&self, declaration: &Declaration) -> bool {
        matches!(
            (self, declaration),
            (FileKind::Text, Declaration::Text { .. })
                | (FileKind::Token, Declaration::Token { .. })
                | (FileKind::Mark, Declaration::Mark { .. })
                | (FileKind::Struct, Declaration::Struct { .. })
                | (FileKind::Rel, Declaration::Rel { .. })
                | (FileKind::Feat, Declaration::Feat { .. })
        )
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

/// One dominance relation of a structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructRel {
    pub id: String,
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_type: Option<String>,
}

/// One element declared by a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Declaration {
    Text {
        content: String,
    },
    Token {
        id: String,
        href: String,
    },
    Mark {
        id: String,
        href: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mark_type: Option<String>,
    },
    Struct {
        id: String,
        #[serde(default)]
        rels: Vec<StructRel>,
    },
    Rel {
        id: String,
        src: String,
        dst: String,
    },
    Feat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        href: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

impl Declaration {
    /// Reference strings this declaration carries.
    pub fn references(&self) -> Vec<&str> {
        match self {
            Declaration::Text { .. } => Vec::new(),
            Declaration::Token { href, .. } | Declaration::Mark { href, .. } => vec![href.as_str()],
            Declaration::Struct { rels, .. } => rels.iter().map(|r| r.href.as_str()).collect(),
            Declaration::Rel { src, dst, .. } => vec![src.as_str(), dst.as_str()],
            Declaration::Feat { href, target, .. } => {
                let mut refs = vec![href.as_str()];
                refs.extend(target.as_deref());
                refs
            }
        }
    }
}

/// Everything one file declares, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDeclarations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_type: Option<String>,
    /// Base file for references without a file part; the file itself if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
}

/// Source of per-file declarations.
pub trait DeclarationReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<FileDeclarations>;
}

/// Reads the JSON form of pre-tokenized declaration files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReader;

impl DeclarationReader for JsonReader {
    fn read(&self, path: &Path) -> Result<FileDeclarations> {
        let raw = fs::read_to_string(path).map_err(|e| StandoffError::Reader {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| StandoffError::Reader {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Declarations held in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    files: HashMap<PathBuf, FileDeclarations>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, declarations: FileDeclarations) {
        self.files.insert(path.into(), declarations);
    }

    /// Known paths below `dir`, sorted.
    pub fn paths_in(&self, dir: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

impl DeclarationReader for MemoryReader {
    fn read(&self, path: &Path) -> Result<FileDeclarations> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| StandoffError::Reader {
                path: path.to_path_buf(),
                reason: "no declarations registered for this path".to_string(),
            })
    }
}

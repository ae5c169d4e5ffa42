use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::PathResolutionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileKind {
    Code,
    Document,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: FileId,
    pub absolute_path: PathBuf,
    pub project_relative_path: PathBuf,
    pub content_hash: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub extension: String,
    pub kind: FileKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatementKind {
    Import,
    Require,
    DynamicImport,
    ReExport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpecifierKind {
    Default,
    Named,
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specifier {
    pub kind: SpecifierKind,
    pub imported_name: Option<String>,
    pub local_name: String,
}

impl Specifier {
    pub fn default_import(local: impl Into<String>) -> Self {
        Self {
            kind: SpecifierKind::Default,
            imported_name: None,
            local_name: local.into(),
        }
    }

    pub fn named(imported: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            kind: SpecifierKind::Named,
            imported_name: Some(imported.into()),
            local_name: local.into(),
        }
    }

    pub fn namespace(local: impl Into<String>) -> Self {
        Self {
            kind: SpecifierKind::Namespace,
            imported_name: None,
            local_name: local.into(),
        }
    }
}

/// One raw import-like statement as produced by a `StatementExtractor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStatement {
    pub kind: StatementKind,
    pub source_literal: String,
    pub specifiers: Vec<Specifier>,
    pub line_number: usize,
    pub raw_text: String,
}

impl ImportStatement {
    pub fn new(kind: StatementKind, source_literal: impl Into<String>, line_number: usize) -> Self {
        Self {
            kind,
            source_literal: source_literal.into(),
            specifiers: Vec::new(),
            line_number,
            raw_text: String::new(),
        }
    }

    pub fn with_specifiers(mut self, specifiers: Vec<Specifier>) -> Self {
        self.specifiers = specifiers;
        self
    }

    pub fn with_raw_text(mut self, raw_text: impl Into<String>) -> Self {
        self.raw_text = raw_text.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionKind {
    Absolute,
    Relative,
    Alias,
    NodeModule,
    Builtin,
    Unresolved,
}

impl ResolutionKind {
    pub fn is_external(self) -> bool {
        matches!(self, ResolutionKind::NodeModule | ResolutionKind::Builtin)
    }
}

/// Outcome of resolving one source literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPath {
    pub resolution_kind: ResolutionKind,
    pub absolute_path: Option<PathBuf>,
    pub project_relative_path: Option<PathBuf>,
    pub exists: bool,
    pub extension: Option<String>,
    pub declared_package: bool,
    pub error: Option<PathResolutionError>,
}

impl ResolvedPath {
    pub fn without_path(resolution_kind: ResolutionKind) -> Self {
        Self {
            resolution_kind,
            absolute_path: None,
            project_relative_path: None,
            exists: false,
            extension: None,
            declared_package: false,
            error: None,
        }
    }

    /// Counted as resolved in statistics: a concrete path that exists.
    pub fn is_resolved(&self) -> bool {
        self.absolute_path.is_some() && self.exists && self.error.is_none()
    }

    /// External when it names a package or built-in, or points outside the project.
    pub fn is_external(&self) -> bool {
        if self.resolution_kind.is_external() {
            return true;
        }
        match &self.project_relative_path {
            Some(relative) => relative.starts_with(".."),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DependencyTarget {
    File(FileId),
    Literal(String),
}

impl DependencyTarget {
    pub fn file_id(&self) -> Option<FileId> {
        match self {
            DependencyTarget::File(id) => Some(*id),
            DependencyTarget::Literal(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDependency {
    pub source_file_id: FileId,
    pub target: DependencyTarget,
    pub source_literal: String,
    pub statement_kind: StatementKind,
    pub resolution_kind: ResolutionKind,
    pub resolved_path: Option<PathBuf>,
    pub specifiers: Vec<Specifier>,
    pub line_number: usize,
    pub resolved: bool,
    pub external: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternKind {
    Glob,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeKind {
    File,
    Directory,
    Project,
}

/// Where in a document a pattern candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceOrigin {
    Link,
    InlineCode,
    Mention,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternReference {
    pub id: u64,
    pub pattern_string: String,
    pub pattern_kind: PatternKind,
    pub scope_kind: ScopeKind,
    pub origin: ReferenceOrigin,
    pub owner_file_id: FileId,
    pub confidence: f32,
    pub line_number: usize,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkKind {
    Direct,
    Pattern,
    Mention,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentCodeLink {
    pub document_file_id: FileId,
    pub code_file_id: FileId,
    pub pattern_id: Option<u64>,
    pub link_kind: LinkKind,
    pub context: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CycleSeverity {
    Info,
    Warning,
    Error,
}

impl CycleSeverity {
    pub fn for_length(length: usize) -> Self {
        match length {
            0..=2 => CycleSeverity::Info,
            3..=4 => CycleSeverity::Warning,
            _ => CycleSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircularDependency {
    pub cycle_path: Vec<FileRecord>,
    pub severity: CycleSeverity,
    pub length: usize,
}

impl CircularDependency {
    pub fn file_ids(&self) -> Vec<FileId> {
        self.cycle_path.iter().map(|record| record.id).collect()
    }
}

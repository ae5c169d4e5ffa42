//! Document-to-code linking.
//!
//! Documents are scanned line by line for path-like references. Each
//! reference becomes a stored `PatternReference`; matching those rows against
//! the current file set yields `DocumentCodeLink`s.

use globset::GlobBuilder;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

use super::project::{normalize_path, to_slash};
use super::types::{
    DocumentCodeLink, FileId, FileKind, FileRecord, LinkKind, PatternKind, PatternReference,
    ReferenceOrigin, ScopeKind,
};
use crate::error::Result;

const DIRECT_WEIGHT: f64 = 1.0;
const PATTERN_WEIGHT: f64 = 0.8;
const MENTION_WEIGHT: f64 = 0.5;
const STRENGTH_NORMALIZER: f64 = 10.0;

const MAX_CONTEXT_CHARS: usize = 160;

/// `(direct × 1.0 + pattern × 0.8 + mention × 0.5) / 10`, clamped to `[0, 1]`.
pub fn link_strength(links: &[DocumentCodeLink]) -> f64 {
    let (direct, pattern, mention) =
        links
            .iter()
            .fold((0usize, 0usize, 0usize), |(d, p, m), link| match link.link_kind {
                LinkKind::Direct => (d + 1, p, m),
                LinkKind::Pattern => (d, p + 1, m),
                LinkKind::Mention => (d, p, m + 1),
            });

    let raw = direct as f64 * DIRECT_WEIGHT
        + pattern as f64 * PATTERN_WEIGHT
        + mention as f64 * MENTION_WEIGHT;
    (raw / STRENGTH_NORMALIZER).clamp(0.0, 1.0)
}

fn classify_pattern(pattern: &str) -> (PatternKind, ScopeKind) {
    if pattern.contains(['*', '?', '[', '{']) {
        let scope = if pattern.starts_with("**") {
            ScopeKind::Project
        } else {
            ScopeKind::Directory
        };
        return (PatternKind::Glob, scope);
    }

    let last = pattern.rsplit('/').next().unwrap_or(pattern);
    if pattern.ends_with('/') || !last.contains('.') {
        (PatternKind::Exact, ScopeKind::Directory)
    } else {
        (PatternKind::Exact, ScopeKind::File)
    }
}

fn confidence_for(origin: ReferenceOrigin) -> f32 {
    match origin {
        ReferenceOrigin::Link => 1.0,
        ReferenceOrigin::InlineCode => 0.8,
        ReferenceOrigin::Mention => 0.5,
    }
}

fn context_line(line: &str) -> String {
    let trimmed = line.trim();
    match trimmed.char_indices().nth(MAX_CONTEXT_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Finds path-like references in documentation text.
pub struct DocumentPatternExtractor {
    link: Regex,
    inline_code: Regex,
    mention: Option<Regex>,
}

impl DocumentPatternExtractor {
    /// `code_extensions` decide which bare file names count as mentions.
    pub fn new<S: AsRef<str>>(code_extensions: &[S]) -> Result<Self> {
        let alternatives: Vec<String> = code_extensions
            .iter()
            .map(|ext| regex::escape(ext.as_ref().trim().trim_start_matches('.')))
            .filter(|ext| !ext.is_empty())
            .collect();

        let mention = if alternatives.is_empty() {
            None
        } else {
            let pattern = format!(
                r"(?:^|[\s(\[,;:])([A-Za-z0-9_\-][A-Za-z0-9_.\-]*\.(?:{}))\b",
                alternatives.join("|")
            );
            match Regex::new(&pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    warn!("Mention detection disabled, invalid extension list: {err}");
                    None
                }
            }
        };

        Ok(Self {
            link: Regex::new(r"\[[^\]]*\]\(\s*<?([^)\s>#?]+)")?,
            inline_code: Regex::new(r"`([^`\s]+)`")?,
            mention,
        })
    }

    /// References in one document, in line order. `document_dir` is the
    /// document's directory relative to the project root; markdown links are
    /// resolved against it.
    pub fn extract(&self, document_dir: &Path, text: &str) -> Vec<PatternReference> {
        let mut references = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;

            for capture in self.link.captures_iter(line) {
                let target = &capture[1];
                if target.contains(':') {
                    continue;
                }
                let joined = if let Some(rooted) = target.strip_prefix('/') {
                    normalize_path(Path::new(rooted))
                } else {
                    normalize_path(&document_dir.join(target))
                };
                if joined.starts_with("..") || joined.as_os_str().is_empty() {
                    continue;
                }
                references.push(self.reference(
                    to_slash(&joined),
                    ReferenceOrigin::Link,
                    line_number,
                    line,
                ));
            }

            for capture in self.inline_code.captures_iter(line) {
                let Some(pattern) = path_like(&capture[1]) else {
                    continue;
                };
                references.push(self.reference(pattern, ReferenceOrigin::InlineCode, line_number, line));
            }

            if let Some(mention) = &self.mention {
                let stripped = self.inline_code.replace_all(line, " ");
                let stripped = self.link.replace_all(&stripped, " ");
                for capture in mention.captures_iter(&stripped) {
                    references.push(self.reference(
                        capture[1].to_string(),
                        ReferenceOrigin::Mention,
                        line_number,
                        line,
                    ));
                }
            }
        }

        references
    }

    fn reference(
        &self,
        pattern: String,
        origin: ReferenceOrigin,
        line_number: usize,
        line: &str,
    ) -> PatternReference {
        let (pattern_kind, scope_kind) = match origin {
            ReferenceOrigin::Mention => (PatternKind::Exact, ScopeKind::File),
            _ => classify_pattern(&pattern),
        };
        PatternReference {
            id: 0,
            pattern_string: pattern,
            pattern_kind,
            scope_kind,
            origin,
            owner_file_id: FileId(0),
            confidence: confidence_for(origin),
            line_number,
            description: context_line(line),
        }
    }
}

/// Inline code that looks like a path or glob, normalised to a
/// project-relative pattern.
fn path_like(code: &str) -> Option<String> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || "_-./*?{}[],@".contains(c);
    if !code.chars().all(allowed) {
        return None;
    }
    if !code.contains('/') && !code.contains('*') {
        return None;
    }
    if code.contains("//") {
        return None;
    }
    let trimmed = code.trim_start_matches("./").trim_start_matches('/');
    if trimmed.is_empty() || trimmed.starts_with("..") {
        return None;
    }
    Some(trimmed.to_string())
}

enum Rule {
    Exact(String),
    Directory(String),
    Glob(globset::GlobMatcher),
    FileName(String),
}

impl Rule {
    fn compile(reference: &PatternReference) -> Option<Self> {
        let pattern = reference.pattern_string.as_str();
        if reference.origin == ReferenceOrigin::Mention {
            return Some(Rule::FileName(pattern.to_string()));
        }
        match (reference.pattern_kind, reference.scope_kind) {
            (PatternKind::Glob, _) => match GlobBuilder::new(pattern).literal_separator(true).build() {
                Ok(glob) => Some(Rule::Glob(glob.compile_matcher())),
                Err(err) => {
                    debug!(pattern, "skipping invalid glob reference: {err}");
                    None
                }
            },
            (PatternKind::Exact, ScopeKind::File) => Some(Rule::Exact(pattern.to_string())),
            (PatternKind::Exact, _) => {
                Some(Rule::Directory(format!("{}/", pattern.trim_end_matches('/'))))
            }
        }
    }

    fn matches(&self, relative: &str) -> bool {
        match self {
            Rule::Exact(path) => relative == path,
            Rule::Directory(prefix) => relative.starts_with(prefix.as_str()),
            Rule::Glob(matcher) => matcher.is_match(relative),
            Rule::FileName(name) => relative.rsplit('/').next() == Some(name.as_str()),
        }
    }
}

fn link_kind_for(origin: ReferenceOrigin) -> LinkKind {
    match origin {
        ReferenceOrigin::Link => LinkKind::Direct,
        ReferenceOrigin::InlineCode => LinkKind::Pattern,
        ReferenceOrigin::Mention => LinkKind::Mention,
    }
}

/// Matches stored pattern references against the known file set.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternMatcher;

impl PatternMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Links from `document` to code files. One link per code file and link
    /// kind; the first matching reference wins.
    pub fn match_document(
        &self,
        document: FileId,
        references: &[PatternReference],
        files: &[&FileRecord],
    ) -> Vec<DocumentCodeLink> {
        let code_files: Vec<(&FileRecord, String)> = files
            .iter()
            .filter(|record| record.kind == FileKind::Code && record.id != document)
            .map(|record| (*record, to_slash(&record.project_relative_path)))
            .collect();

        let mut seen: HashSet<(FileId, LinkKind)> = HashSet::new();
        let mut links = Vec::new();

        for reference in references {
            let Some(rule) = Rule::compile(reference) else {
                continue;
            };
            let link_kind = link_kind_for(reference.origin);

            for (record, relative) in &code_files {
                if !rule.matches(relative) {
                    continue;
                }
                if !seen.insert((record.id, link_kind)) {
                    continue;
                }
                links.push(DocumentCodeLink {
                    document_file_id: document,
                    code_file_id: record.id,
                    pattern_id: Some(reference.id),
                    link_kind,
                    context: reference.description.clone(),
                });
            }
        }

        links
    }
}

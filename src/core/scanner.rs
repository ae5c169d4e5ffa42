use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::project::{normalize_path, to_slash};
use super::types::FileKind;
use crate::config::AnalysisConfig;
use crate::error::{DepscopeError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub extension: String,
    pub kind: FileKind,
}

/// Discovers code and documentation files under a root.
pub struct SourceScanner {
    extensions: HashMap<String, FileKind>,
    include: Option<GlobSet>,
    exclude: GlobSet,
    max_depth: Option<usize>,
    max_files: Option<usize>,
}

impl SourceScanner {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let mut extensions = HashMap::with_capacity(
            config.code_extensions.len() + config.document_extensions.len(),
        );
        for ext in &config.document_extensions {
            extensions.insert(trim_dot(ext), FileKind::Document);
        }
        // Code wins when an extension is listed twice.
        for ext in &config.code_extensions {
            extensions.insert(trim_dot(ext), FileKind::Code);
        }

        let include = if config.include.is_empty() {
            None
        } else {
            Some(compile_globs(&config.include)?)
        };

        Ok(Self {
            extensions,
            include,
            exclude: compile_globs(&config.exclude)?,
            max_depth: config.max_depth,
            max_files: config.max_files,
        })
    }

    pub fn scan_directory(&self, root_path: &Path) -> Result<Vec<ScannedFile>> {
        let root = normalize_path(root_path);
        if !root.is_dir() {
            return Err(DepscopeError::file_system(
                &root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "root is not a directory"),
            ));
        }

        let mut walker = WalkDir::new(&root).follow_links(false).sort_by_file_name();
        if let Some(depth) = self.max_depth {
            walker = walker.max_depth(depth);
        }

        let entries: Vec<PathBuf> = walker
            .into_iter()
            .filter_entry(|entry| !self.is_excluded_dir(&root, entry.path()))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("Skipping unreadable entry: {err}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();

        let mut files: Vec<ScannedFile> = entries
            .par_iter()
            .filter_map(|path| self.classify(&root, path))
            .collect();

        if let Some(limit) = self.max_files {
            if files.len() > limit {
                debug!(found = files.len(), limit, "truncating scan to file limit");
                files.truncate(limit);
            }
        }

        Ok(files)
    }

    fn classify(&self, root: &Path, path: &Path) -> Option<ScannedFile> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        let kind = *self.extensions.get(&extension)?;
        let relative_path = path.strip_prefix(root).ok()?.to_path_buf();
        let slash = to_slash(&relative_path);

        if self.exclude.is_match(&slash) {
            return None;
        }
        if let Some(include) = &self.include {
            if !include.is_match(&slash) {
                return None;
            }
        }

        Some(ScannedFile {
            path: path.to_path_buf(),
            relative_path,
            extension,
            kind,
        })
    }

    fn is_excluded_dir(&self, root: &Path, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(root) else {
            return false;
        };
        if relative.as_os_str().is_empty() {
            return false;
        }
        // Directory globs like `**/node_modules/**` match their children,
        // so probe with a synthetic child as well.
        let slash = to_slash(relative);
        path.is_dir()
            && (self.exclude.is_match(&slash) || self.exclude.is_match(format!("{slash}/_")))
    }
}

fn trim_dot(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn compile_globs(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| {
            DepscopeError::config(
                PathBuf::from(pattern),
                format!("invalid glob pattern '{pattern}': {err}"),
            )
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|err| DepscopeError::config(PathBuf::from("<globs>"), err))
}

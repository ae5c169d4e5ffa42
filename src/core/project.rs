//! Project root handling and path normalisation.
//!
//! The project root is discovered once per `ProjectContext` and cached in the
//! object itself; `reset()` drops the cached value so the next call walks the
//! filesystem again.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

const ROOT_MARKERS: &[&str] = &["package.json", "tsconfig.json", ".git"];

#[derive(Debug, Default)]
pub struct ProjectContext {
    start: PathBuf,
    root: OnceLock<PathBuf>,
}

impl ProjectContext {
    /// Context whose root is discovered lazily from `start` upwards.
    pub fn discover(start: impl Into<PathBuf>) -> Self {
        Self {
            start: absolutize(&start.into()),
            root: OnceLock::new(),
        }
    }

    /// Context pinned to an explicit root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = absolutize(&root.into());
        let cell = OnceLock::new();
        let _ = cell.set(root.clone());
        Self { start: root, root: cell }
    }

    pub fn root(&self) -> &Path {
        self.root.get_or_init(|| find_project_root(&self.start))
    }

    /// Forget the cached root.
    pub fn reset(&mut self) {
        self.root = OnceLock::new();
    }

    /// Project-relative form of `path` when it lies inside the root,
    /// otherwise the normalised absolute path.
    pub fn normalize_to_project_root(&self, path: &Path) -> PathBuf {
        let absolute = absolutize(path);
        match absolute.strip_prefix(self.root()) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => absolute,
        }
    }

    /// Inverse of [`normalize_to_project_root`](Self::normalize_to_project_root).
    pub fn resolve_from_project_root(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&self.root().join(path))
        }
    }

    /// Relative path from the root to `path`, using `..` for paths outside it.
    pub fn project_relative(&self, path: &Path) -> PathBuf {
        relative_path(self.root(), &absolutize(path))
    }
}

fn find_project_root(start: &Path) -> PathBuf {
    for dir in start.ancestors() {
        if ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()) {
            return dir.to_path_buf();
        }
    }
    start.to_path_buf()
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        normalize_path(&cwd.join(path))
    }
}

/// Lexically fold `.` and `..` components. Symlinks are not followed.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Relative path from `base` to `target`; both must be absolute and normalised.
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base_parts: Vec<Component> = base.components().collect();
    let target_parts: Vec<Component> = target.components().collect();

    let common = base_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &target_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}

/// Forward-slash rendering used for glob matching and reports.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::project::{normalize_path, relative_path};
use super::types::{ResolutionKind, ResolvedPath};
use crate::error::PathResolutionError;

pub const DEFAULT_CANDIDATE_EXTENSIONS: &[&str] =
    &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".json"];

const NODE_PROTOCOL: &str = "node:";

/// Platform built-in modules, matched with or without the `node:` prefix.
const BUILTIN_MODULES: &[&str] = &[
    "assert",
    "assert/strict",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "dns/promises",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "path/posix",
    "path/win32",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "readline/promises",
    "repl",
    "stream",
    "stream/promises",
    "stream/web",
    "string_decoder",
    "sys",
    "test",
    "timers",
    "timers/promises",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "util/types",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

pub fn is_builtin(literal: &str) -> bool {
    match literal.strip_prefix(NODE_PROTOCOL) {
        Some(_) => true,
        None => BUILTIN_MODULES.contains(&literal),
    }
}

fn is_url(literal: &str) -> bool {
    literal
        .split_once("://")
        .map(|(scheme, _)| !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+'))
        .unwrap_or(false)
}

/// Package portion of a bare module literal (`@scope/pkg/sub` -> `@scope/pkg`).
pub fn package_name(literal: &str) -> &str {
    let mut parts = literal.splitn(3, '/');
    let first = parts.next().unwrap_or("");
    if first.starts_with('@') {
        match parts.next() {
            Some(second) => &literal[..first.len() + 1 + second.len()],
            None => first,
        }
    } else {
        first
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// Filesystem access used by the resolver.
pub trait FsProbe: Send + Sync {
    fn stat(&self, path: &Path) -> io::Result<EntryKind>;
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsProbe;

impl FsProbe for OsProbe {
    fn stat(&self, path: &Path) -> io::Result<EntryKind> {
        let metadata = std::fs::metadata(path)?;
        Ok(if metadata.is_file() {
            EntryKind::File
        } else if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::Other
        })
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Ordered alias table; earlier declarations win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    entries: Vec<(String, PathBuf)>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, target: impl Into<PathBuf>) {
        let key = key.into();
        if key.is_empty() {
            return;
        }
        self.entries.push((key, target.into()));
    }

    pub fn with(mut self, key: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        self.insert(key, target);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }

    /// First matching alias substitution for `literal`, still unresolved
    /// against the project root.
    pub fn substitute(&self, literal: &str) -> Option<PathBuf> {
        for (key, target) in &self.entries {
            if let Some(stem) = key.strip_suffix("/*") {
                let target = strip_wildcard(target);
                if let Some(rest) = literal.strip_prefix(stem).and_then(|r| r.strip_prefix('/')) {
                    return Some(target.join(rest));
                }
                continue;
            }

            if literal == key {
                return Some(target.clone());
            }
            if let Some(rest) = literal.strip_prefix(key.as_str()).and_then(|r| r.strip_prefix('/')) {
                return Some(target.join(rest));
            }
        }
        None
    }
}

fn strip_wildcard(target: &Path) -> PathBuf {
    let text = target.to_string_lossy();
    match text.strip_suffix("/*") {
        Some(stem) => PathBuf::from(stem),
        None => target.to_path_buf(),
    }
}

/// Everything a single resolution needs to know about its surroundings.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub project_root: PathBuf,
    pub source_file_dir: PathBuf,
    pub alias_map: Arc<AliasMap>,
    pub candidate_extensions: Arc<[String]>,
    pub node_modules_search_paths: Vec<PathBuf>,
    pub resolve_node_modules: bool,
}

impl ResolutionContext {
    pub fn new(project_root: impl Into<PathBuf>, source_file_dir: impl Into<PathBuf>) -> Self {
        let source_file_dir = normalize_path(&source_file_dir.into());
        let extensions: Vec<String> = DEFAULT_CANDIDATE_EXTENSIONS
            .iter()
            .map(|ext| ext.to_string())
            .collect();
        Self {
            project_root: normalize_path(&project_root.into()),
            node_modules_search_paths: node_modules_search_paths(&source_file_dir),
            source_file_dir,
            alias_map: Arc::new(AliasMap::new()),
            candidate_extensions: extensions.into(),
            resolve_node_modules: true,
        }
    }

    pub fn with_aliases(mut self, alias_map: Arc<AliasMap>) -> Self {
        self.alias_map = alias_map;
        self
    }

    pub fn with_extensions(mut self, extensions: Arc<[String]>) -> Self {
        self.candidate_extensions = extensions;
        self
    }

    pub fn with_node_modules(mut self, enabled: bool) -> Self {
        self.resolve_node_modules = enabled;
        self
    }

    pub fn with_search_paths(mut self, search_paths: Vec<PathBuf>) -> Self {
        self.node_modules_search_paths = search_paths;
        self
    }
}

/// `node_modules` directories from `dir` outwards to the filesystem root.
pub fn node_modules_search_paths(dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .filter(|ancestor| ancestor.file_name().map_or(true, |name| name != "node_modules"))
        .map(|ancestor| ancestor.join("node_modules"))
        .collect()
}

/// Normalise user-supplied extensions to the `.ext` form.
pub fn normalize_extensions<S: AsRef<str>>(extensions: &[S]) -> Arc<[String]> {
    extensions
        .iter()
        .map(|ext| {
            let ext = ext.as_ref().trim();
            if ext.starts_with('.') {
                ext.to_string()
            } else {
                format!(".{ext}")
            }
        })
        .filter(|ext| ext.len() > 1)
        .collect::<Vec<_>>()
        .into()
}

enum Probe {
    Found(EntryKind),
    Missing,
}

type ProbeResult<T> = std::result::Result<T, PathResolutionError>;

/// Multi-strategy module path resolver.
///
/// Strategies are tried in a fixed order: built-in, absolute, alias,
/// node-module, relative. The first that claims the literal decides the
/// `ResolutionKind`, even when no file is found.
pub struct PathResolver {
    probe: Arc<dyn FsProbe>,
    known_packages: BTreeSet<String>,
    package_main_cache: DashMap<PathBuf, Option<String>>,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PathResolver {
    pub fn new() -> Self {
        Self::with_probe(Arc::new(OsProbe))
    }

    pub fn with_probe(probe: Arc<dyn FsProbe>) -> Self {
        Self {
            probe,
            known_packages: BTreeSet::new(),
            package_main_cache: DashMap::new(),
        }
    }

    pub fn with_known_packages(mut self, packages: BTreeSet<String>) -> Self {
        self.known_packages = packages;
        self
    }

    /// Drop memoised `package.json` lookups.
    pub fn reset(&self) {
        self.package_main_cache.clear();
    }

    pub fn resolve(&self, source_literal: &str, ctx: &ResolutionContext) -> ResolvedPath {
        let literal = source_literal.trim();

        if literal.is_empty() || is_url(literal) {
            return ResolvedPath::without_path(ResolutionKind::Unresolved);
        }

        if is_builtin(literal) {
            return ResolvedPath::without_path(ResolutionKind::Builtin);
        }

        if Path::new(literal).is_absolute() {
            return self.resolve_absolute(literal, ctx);
        }

        if let Some(substituted) = ctx.alias_map.substitute(literal) {
            return self.resolve_alias(&substituted, ctx);
        }

        if !literal.starts_with('.') {
            return self.resolve_node_module(literal, ctx);
        }

        self.resolve_relative(literal, ctx)
    }

    /// Resolve many literals against one context; output order matches input.
    pub fn resolve_batch<S: AsRef<str> + Sync>(
        &self,
        literals: &[S],
        ctx: &ResolutionContext,
    ) -> Vec<ResolvedPath> {
        literals
            .par_iter()
            .map(|literal| self.resolve(literal.as_ref(), ctx))
            .collect()
    }

    fn resolve_absolute(&self, literal: &str, ctx: &ResolutionContext) -> ResolvedPath {
        let path = normalize_path(Path::new(literal));
        match self.probe_path(&path) {
            Ok(probe) => {
                let exists = matches!(probe, Probe::Found(_));
                self.found(ResolutionKind::Absolute, path, exists, ctx)
            }
            Err(error) => self.failed(ResolutionKind::Absolute, path, error, ctx),
        }
    }

    fn resolve_alias(&self, substituted: &Path, ctx: &ResolutionContext) -> ResolvedPath {
        let base = if substituted.is_absolute() {
            normalize_path(substituted)
        } else {
            normalize_path(&ctx.project_root.join(substituted))
        };

        match self.resolve_module_path(&base, &ctx.candidate_extensions) {
            Ok(Some(path)) => self.found(ResolutionKind::Alias, path, true, ctx),
            Ok(None) => ResolvedPath::without_path(ResolutionKind::Alias),
            Err(error) => self.failed(ResolutionKind::Alias, base, error, ctx),
        }
    }

    fn resolve_node_module(&self, literal: &str, ctx: &ResolutionContext) -> ResolvedPath {
        let package = package_name(literal);
        let declared = self.known_packages.contains(package);

        let mut resolved = ResolvedPath::without_path(ResolutionKind::NodeModule);
        resolved.declared_package = declared;

        if !ctx.resolve_node_modules {
            return resolved;
        }

        let consult_main = self.known_packages.is_empty() || declared;

        for search_path in &ctx.node_modules_search_paths {
            let candidate = normalize_path(&search_path.join(literal));
            match self.resolve_package_path(&candidate, consult_main, &ctx.candidate_extensions) {
                Ok(Some(path)) => {
                    let mut found = self.found(ResolutionKind::NodeModule, path, true, ctx);
                    found.declared_package = declared;
                    return found;
                }
                Ok(None) => continue,
                Err(error) => {
                    let mut failed = self.failed(ResolutionKind::NodeModule, candidate, error, ctx);
                    failed.declared_package = declared;
                    return failed;
                }
            }
        }

        debug!(literal, "node module not found in any search path");
        resolved
    }

    fn resolve_relative(&self, literal: &str, ctx: &ResolutionContext) -> ResolvedPath {
        let base = normalize_path(&ctx.source_file_dir.join(literal));

        match self.resolve_module_path(&base, &ctx.candidate_extensions) {
            Ok(Some(path)) => self.found(ResolutionKind::Relative, path, true, ctx),
            Ok(None) => {
                // Report a best-guess path even though nothing exists there.
                let fallback = match ctx.candidate_extensions.first() {
                    Some(ext) => append_extension(&base, ext),
                    None => base,
                };
                self.found(ResolutionKind::Relative, fallback, false, ctx)
            }
            Err(error) => self.failed(ResolutionKind::Relative, base, error, ctx),
        }
    }

    /// Exact file, then each extension appended, then `index.<ext>`.
    fn resolve_module_path(&self, base: &Path, extensions: &[String]) -> ProbeResult<Option<PathBuf>> {
        if let Some(path) = self.resolve_file(base, extensions)? {
            return Ok(Some(path));
        }
        self.resolve_index(base, extensions)
    }

    fn resolve_package_path(
        &self,
        candidate: &Path,
        consult_main: bool,
        extensions: &[String],
    ) -> ProbeResult<Option<PathBuf>> {
        if let Some(path) = self.resolve_file(candidate, extensions)? {
            return Ok(Some(path));
        }

        if consult_main {
            if let Some(main) = self.package_main(candidate) {
                let main_path = normalize_path(&candidate.join(main));
                if let Some(path) = self.resolve_module_path(&main_path, extensions)? {
                    return Ok(Some(path));
                }
            }
        }

        self.resolve_index(candidate, extensions)
    }

    fn resolve_file(&self, base: &Path, extensions: &[String]) -> ProbeResult<Option<PathBuf>> {
        if self.is_file(base)? {
            return Ok(Some(base.to_path_buf()));
        }
        for ext in extensions {
            let candidate = append_extension(base, ext);
            if self.is_file(&candidate)? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn resolve_index(&self, base: &Path, extensions: &[String]) -> ProbeResult<Option<PathBuf>> {
        for ext in extensions {
            let candidate = base.join(format!("index{ext}"));
            if self.is_file(&candidate)? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn package_main(&self, package_dir: &Path) -> Option<String> {
        if let Some(cached) = self.package_main_cache.get(package_dir) {
            return cached.clone();
        }

        let main = self
            .probe
            .read_to_string(&package_dir.join("package.json"))
            .ok()
            .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
            .and_then(|manifest| {
                manifest
                    .get("main")
                    .and_then(|main| main.as_str())
                    .map(str::to_string)
            });

        self.package_main_cache
            .insert(package_dir.to_path_buf(), main.clone());
        main
    }

    fn is_file(&self, path: &Path) -> ProbeResult<bool> {
        Ok(matches!(self.probe_path(path)?, Probe::Found(EntryKind::File)))
    }

    /// Not-found is `Missing`; permission-class failures are hard errors.
    fn probe_path(&self, path: &Path) -> ProbeResult<Probe> {
        match self.probe.stat(path) {
            Ok(kind) => Ok(Probe::Found(kind)),
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                Err(PathResolutionError::PermissionDenied {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                })
            }
            Err(_) => Ok(Probe::Missing),
        }
    }

    fn found(
        &self,
        kind: ResolutionKind,
        path: PathBuf,
        exists: bool,
        ctx: &ResolutionContext,
    ) -> ResolvedPath {
        ResolvedPath {
            resolution_kind: kind,
            project_relative_path: Some(relative_path(&ctx.project_root, &path)),
            extension: path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned()),
            absolute_path: Some(path),
            exists,
            declared_package: false,
            error: None,
        }
    }

    fn failed(
        &self,
        kind: ResolutionKind,
        path: PathBuf,
        error: PathResolutionError,
        ctx: &ResolutionContext,
    ) -> ResolvedPath {
        let mut resolved = self.found(kind, path, false, ctx);
        resolved.error = Some(error);
        resolved
    }
}

fn append_extension(base: &Path, ext: &str) -> PathBuf {
    let mut raw: OsString = base.as_os_str().to_os_string();
    raw.push(ext);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_with_and_without_protocol() {
        assert!(is_builtin("fs"));
        assert!(is_builtin("node:fs"));
        assert!(is_builtin("fs/promises"));
        assert!(!is_builtin("lodash"));
    }

    #[test]
    fn package_name_handles_scopes() {
        assert_eq!(package_name("react"), "react");
        assert_eq!(package_name("lodash/fp"), "lodash");
        assert_eq!(package_name("@scope/pkg/deep/path"), "@scope/pkg");
        assert_eq!(package_name("@scope"), "@scope");
    }

    #[test]
    fn alias_substitution_orders() {
        let aliases = AliasMap::new()
            .with("@", "src")
            .with("~lib/*", "lib/*")
            .with("config", "config/index.ts");

        assert_eq!(aliases.substitute("@/utils/helper"), Some(PathBuf::from("src/utils/helper")));
        assert_eq!(aliases.substitute("@"), Some(PathBuf::from("src")));
        assert_eq!(aliases.substitute("~lib/a"), Some(PathBuf::from("lib/a")));
        assert_eq!(aliases.substitute("~lib"), None);
        assert_eq!(aliases.substitute("config"), Some(PathBuf::from("config/index.ts")));
        assert_eq!(aliases.substitute("@scope/pkg"), None);
    }

    #[test]
    fn urls_are_detected() {
        assert!(is_url("https://cdn.example.com/lib.js"));
        assert!(!is_url("./local"));
    }

    #[test]
    fn search_paths_walk_outwards() {
        let paths = node_modules_search_paths(Path::new("/p/src/app"));
        assert_eq!(paths[0], PathBuf::from("/p/src/app/node_modules"));
        assert_eq!(paths[1], PathBuf::from("/p/src/node_modules"));
        assert_eq!(paths[2], PathBuf::from("/p/node_modules"));
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::core::resolver::{AliasMap, DEFAULT_CANDIDATE_EXTENSIONS};
use crate::error::{DepscopeError, Result};

pub const CONFIG_FILE_NAME: &str = "depscope.toml";

const MANIFEST_DEPENDENCY_KEYS: &[&str] = &[
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Project root to analyze
    pub root: PathBuf,

    /// Include globs, relative to the root (empty = include everything)
    pub include: Vec<String>,

    /// Exclude globs, relative to the root
    pub exclude: Vec<String>,

    /// Extensions treated as code (resolved for imports)
    pub code_extensions: Vec<String>,

    /// Extensions treated as documentation (scanned for patterns)
    pub document_extensions: Vec<String>,

    /// Extensions tried, in order, when inferring a module path
    pub candidate_extensions: Vec<String>,

    /// Whether bare module literals are looked up in `node_modules`
    pub resolve_node_modules: bool,

    /// Path-mapping file, relative to the root
    pub tsconfig: PathBuf,

    /// Package manifest, relative to the root
    pub manifest: PathBuf,

    /// Persistent cache snapshot, relative to the root (None = in-memory only)
    pub cache_file: Option<PathBuf>,

    /// Stop discovery after this many files
    pub max_files: Option<usize>,

    /// Maximum directory depth below the root
    pub max_depth: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            include: Vec::new(),
            exclude: vec![
                "**/node_modules/**".to_string(),
                "**/.git/**".to_string(),
                "**/dist/**".to_string(),
                "**/build/**".to_string(),
                "**/coverage/**".to_string(),
                "**/.depscope/**".to_string(),
            ],
            code_extensions: ["ts", "tsx", "js", "jsx", "mjs", "cjs"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            document_extensions: ["md", "mdx", "markdown", "txt", "rst"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            candidate_extensions: DEFAULT_CANDIDATE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            resolve_node_modules: true,
            tsconfig: PathBuf::from("tsconfig.json"),
            manifest: PathBuf::from("package.json"),
            cache_file: Some(PathBuf::from(".depscope/cache.bin")),
            max_files: None,
            max_depth: None,
        }
    }
}

impl AnalysisConfig {
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML config file. A relative `root` is taken relative to the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| DepscopeError::file_system(path, err))?;
        let mut config: AnalysisConfig =
            toml::from_str(&text).map_err(|err| DepscopeError::config(path, err))?;

        if config.root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.root = base.join(&config.root);
        }
        Ok(config)
    }

    /// `<root>/depscope.toml` when present, defaults otherwise.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let candidate = root.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Self::load(&candidate);
        }
        Ok(Self::for_root(root))
    }

    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache_file.as_ref().map(|file| self.root.join(file))
    }

    pub fn tsconfig_path(&self) -> PathBuf {
        self.root.join(&self.tsconfig)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(&self.manifest)
    }
}

/// Build the alias map from `compilerOptions.paths`. Any failure degrades to
/// an empty map with a warning.
pub fn load_alias_map(path: &Path) -> AliasMap {
    if !path.is_file() {
        debug!(path = %path.display(), "no tsconfig, path aliases disabled");
        return AliasMap::new();
    }
    match try_load_alias_map(path) {
        Ok(aliases) => {
            debug!(path = %path.display(), aliases = aliases.len(), "loaded path aliases");
            aliases
        }
        Err(err) => {
            warn!("Ignoring path aliases: {err}");
            AliasMap::new()
        }
    }
}

fn try_load_alias_map(path: &Path) -> Result<AliasMap> {
    let text = std::fs::read_to_string(path).map_err(|err| DepscopeError::file_system(path, err))?;
    parse_alias_map(&text).map_err(|message| DepscopeError::config(path, message))
}

/// Parse tsconfig text. Targets are joined onto `baseUrl`; a trailing `/*`
/// is stripped from keys and targets.
pub fn parse_alias_map(text: &str) -> std::result::Result<AliasMap, String> {
    let config: serde_json::Value = serde_json::from_str(text).map_err(|err| err.to_string())?;

    let mut aliases = AliasMap::new();
    let Some(options) = config.get("compilerOptions") else {
        return Ok(aliases);
    };

    let base_url = options
        .get("baseUrl")
        .and_then(|value| value.as_str())
        .unwrap_or(".");

    let Some(paths) = options.get("paths") else {
        return Ok(aliases);
    };
    let paths = paths
        .as_object()
        .ok_or_else(|| "compilerOptions.paths must be an object".to_string())?;

    for (key, targets) in paths {
        let Some(first) = targets
            .as_array()
            .and_then(|targets| targets.first())
            .and_then(|target| target.as_str())
        else {
            warn!(alias = %key, "alias has no string target, skipping");
            continue;
        };

        let key = key.strip_suffix("/*").unwrap_or(key);
        let target = first.strip_suffix("/*").unwrap_or(first);
        let target = if target == "*" { "" } else { target };
        let joined = if base_url == "." {
            PathBuf::from(target)
        } else {
            Path::new(base_url).join(target)
        };
        aliases.insert(key, joined);
    }

    Ok(aliases)
}

/// Union of every dependency table in a package manifest. Any failure
/// degrades to an empty set with a warning.
pub fn load_known_packages(path: &Path) -> BTreeSet<String> {
    if !path.is_file() {
        return BTreeSet::new();
    }
    let loaded = std::fs::read_to_string(path)
        .map_err(|err| DepscopeError::file_system(path, err))
        .and_then(|text| parse_known_packages(&text).map_err(|msg| DepscopeError::config(path, msg)));

    match loaded {
        Ok(packages) => packages,
        Err(err) => {
            warn!("Ignoring package manifest: {err}");
            BTreeSet::new()
        }
    }
}

pub fn parse_known_packages(text: &str) -> std::result::Result<BTreeSet<String>, String> {
    let manifest: serde_json::Value = serde_json::from_str(text).map_err(|err| err.to_string())?;
    let mut packages = BTreeSet::new();
    for key in MANIFEST_DEPENDENCY_KEYS {
        if let Some(table) = manifest.get(*key).and_then(|value| value.as_object()) {
            packages.extend(table.keys().cloned());
        }
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_strip_wildcards_and_keep_order() {
        let text = r#"{
            "compilerOptions": {
                "paths": {
                    "@/*": ["src/*"],
                    "@components/*": ["src/components/*", "fallback/*"],
                    "config": ["config/index.ts"]
                }
            }
        }"#;
        let aliases = parse_alias_map(text).unwrap();
        let entries: Vec<_> = aliases
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_path_buf()))
            .collect();
        assert_eq!(
            entries,
            vec![
                ("@".to_string(), PathBuf::from("src")),
                ("@components".to_string(), PathBuf::from("src/components")),
                ("config".to_string(), PathBuf::from("config/index.ts")),
            ]
        );
    }

    #[test]
    fn aliases_respect_base_url() {
        let text = r#"{"compilerOptions": {"baseUrl": "app", "paths": {"@/*": ["src/*"]}}}"#;
        let aliases = parse_alias_map(text).unwrap();
        assert_eq!(aliases.substitute("@/a"), Some(PathBuf::from("app/src/a")));
    }

    #[test]
    fn malformed_tsconfig_degrades_to_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tsconfig.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_alias_map(&path).is_empty());
        assert!(load_alias_map(&dir.path().join("missing.json")).is_empty());
    }

    #[test]
    fn known_packages_union_all_tables() {
        let text = r#"{
            "dependencies": {"react": "^18"},
            "devDependencies": {"vitest": "^1"},
            "peerDependencies": {"react-dom": "^18"},
            "optionalDependencies": {"fsevents": "*"}
        }"#;
        let packages = parse_known_packages(text).unwrap();
        assert_eq!(packages.len(), 4);
        assert!(packages.contains("fsevents"));
    }

    #[test]
    fn config_loads_from_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "resolve_node_modules = false\nmax_files = 10\ncandidate_extensions = [\".ts\"]\n",
        )
        .unwrap();
        let config = AnalysisConfig::load(&path).unwrap();
        assert!(!config.resolve_node_modules);
        assert_eq!(config.max_files, Some(10));
        assert_eq!(config.candidate_extensions, vec![".ts".to_string()]);
        assert_eq!(config.tsconfig, PathBuf::from("tsconfig.json"));
    }
}

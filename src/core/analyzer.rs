use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::cache::{CacheStore, Fingerprint};
use super::cycles::CycleDetector;
use super::graph::{DependencyGraph, GraphBuilder};
use super::patterns::{link_strength, DocumentPatternExtractor, PatternMatcher};
use super::project::ProjectContext;
use super::resolver::{normalize_extensions, AliasMap, PathResolver, ResolutionContext};
use super::scanner::SourceScanner;
use super::types::{
    CircularDependency, DependencyTarget, DocumentCodeLink, FileId, FileKind, FileRecord,
    ImportStatement, ResolvedDependency, ResolvedPath,
};
use crate::config::{load_alias_map, load_known_packages, AnalysisConfig};
use crate::error::{DepscopeError, Result};
use crate::parsers::{StatementExtractor, TypeScriptExtractor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisPhase {
    Scan,
    CacheDiff,
    Resolve,
    Graph,
    Cycles,
    Patterns,
}

/// Progress notifications sent while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisEvent {
    PhaseStarted(AnalysisPhase),
    FilesDiscovered(usize),
    FileChanged(PathBuf),
    FileSkipped { path: PathBuf, reason: String },
    Completed(AnalysisStatistics),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatistics {
    pub total_files: usize,
    pub changed_files: usize,
    pub cache_hits: usize,
    pub removed_files: usize,
    pub skipped_files: usize,
    pub direct_dependencies: usize,
    pub resolved_dependencies: usize,
    pub external_dependencies: usize,
    pub pattern_references: usize,
    pub document_links: usize,
    pub circular_dependencies: usize,
    pub analysis_time_ms: u64,
    pub cache_efficiency: f64,
}

/// Everything one run produces for the reporting layer.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub statistics: AnalysisStatistics,
    pub graph: DependencyGraph,
    pub cycles: Vec<CircularDependency>,
    pub document_links: Vec<DocumentCodeLink>,
    pub link_strengths: BTreeMap<FileId, f64>,
}

#[derive(Debug, Clone)]
struct ResolutionSettings {
    project_root: PathBuf,
    alias_map: Arc<AliasMap>,
    candidate_extensions: Arc<[String]>,
    resolve_node_modules: bool,
}

impl ResolutionSettings {
    fn context_for(&self, file: &Path) -> ResolutionContext {
        let dir = file.parent().unwrap_or(&self.project_root);
        ResolutionContext::new(&self.project_root, dir)
            .with_aliases(Arc::clone(&self.alias_map))
            .with_extensions(Arc::clone(&self.candidate_extensions))
            .with_node_modules(self.resolve_node_modules)
    }
}

#[derive(Debug, Clone)]
struct PendingFile {
    id: FileId,
    path: PathBuf,
    relative_path: PathBuf,
    extension: String,
    kind: FileKind,
    contents: String,
}

/// Runs scan → cache diff → resolve → graph → cycles → patterns → stats.
pub struct AnalysisCoordinator {
    project: ProjectContext,
    scanner: Arc<SourceScanner>,
    resolver: Arc<PathResolver>,
    extractor: Arc<dyn StatementExtractor>,
    document_extractor: DocumentPatternExtractor,
    matcher: PatternMatcher,
    detector: CycleDetector,
    settings: ResolutionSettings,
    store: CacheStore,
    events: Option<UnboundedSender<AnalysisEvent>>,
}

impl AnalysisCoordinator {
    /// Build a coordinator from config, loading path aliases, the package
    /// manifest and the persistent cache.
    pub async fn new(config: AnalysisConfig) -> Result<Self> {
        let store = match config.cache_path() {
            Some(path) => CacheStore::open(path).await,
            None => CacheStore::in_memory(),
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: AnalysisConfig, store: CacheStore) -> Result<Self> {
        let project = ProjectContext::with_root(&config.root);
        let scanner = SourceScanner::new(&config)?;
        let alias_map = load_alias_map(&config.tsconfig_path());
        let known_packages = load_known_packages(&config.manifest_path());

        let settings = ResolutionSettings {
            project_root: project.root().to_path_buf(),
            alias_map: Arc::new(alias_map),
            candidate_extensions: normalize_extensions(&config.candidate_extensions),
            resolve_node_modules: config.resolve_node_modules,
        };

        Ok(Self {
            project,
            scanner: Arc::new(scanner),
            resolver: Arc::new(PathResolver::new().with_known_packages(known_packages)),
            extractor: Arc::new(TypeScriptExtractor::new()),
            document_extractor: DocumentPatternExtractor::new(&config.code_extensions)?,
            matcher: PatternMatcher::new(),
            detector: CycleDetector::new(),
            settings,
            store,
            events: None,
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn StatementExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_resolver(mut self, resolver: PathResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_progress(mut self, events: UnboundedSender<AnalysisEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn project(&self) -> &ProjectContext {
        &self.project
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn into_store(self) -> CacheStore {
        self.store
    }

    /// Drop memoised project-root and package lookups.
    pub fn reset_caches(&mut self) {
        self.project.reset();
        self.resolver.reset();
    }

    pub async fn analyze(&mut self) -> Result<AnalysisReport> {
        let started = Instant::now();
        self.store.begin_scan();

        self.emit(AnalysisEvent::PhaseStarted(AnalysisPhase::Scan));
        let root = self.project.root().to_path_buf();
        info!(root = %root.display(), "scanning project");
        let scanner = Arc::clone(&self.scanner);
        let scanned = tokio::task::spawn_blocking(move || scanner.scan_directory(&root))
            .await
            .map_err(|err| DepscopeError::Task(err.to_string()))??;
        self.emit(AnalysisEvent::FilesDiscovered(scanned.len()));
        info!("Found {} files to analyze", scanned.len());

        self.emit(AnalysisEvent::PhaseStarted(AnalysisPhase::CacheDiff));
        let mut seen: HashSet<PathBuf> = HashSet::with_capacity(scanned.len());
        let mut pending: Vec<PendingFile> = Vec::new();
        let mut skipped_files = 0usize;

        for file in &scanned {
            // Listed even when unreadable so the repair pass keeps its record.
            seen.insert(file.path.clone());

            let fingerprint = match Fingerprint::read(&file.path).await {
                Ok(fingerprint) => fingerprint,
                Err(err) => {
                    warn!("Skipping {}: {err}", file.path.display());
                    skipped_files += 1;
                    self.emit(AnalysisEvent::FileSkipped {
                        path: file.path.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let (id, status) = self.store.record_file(file, &fingerprint);
            if status.needs_analysis() {
                debug!(path = %file.path.display(), ?status, "file needs analysis");
                self.emit(AnalysisEvent::FileChanged(file.path.clone()));
                pending.push(PendingFile {
                    id,
                    path: file.path.clone(),
                    relative_path: file.relative_path.clone(),
                    extension: file.extension.clone(),
                    kind: file.kind,
                    contents: String::from_utf8_lossy(&fingerprint.contents).into_owned(),
                });
            }
        }
        self.keep_unscanned_files(&mut seen).await;
        self.store.retain_files(&seen);

        self.emit(AnalysisEvent::PhaseStarted(AnalysisPhase::Resolve));
        let (code, documents): (Vec<PendingFile>, Vec<PendingFile>) = pending
            .into_iter()
            .partition(|file| file.kind == FileKind::Code);
        self.resolve_changed(code).await?;

        self.emit(AnalysisEvent::PhaseStarted(AnalysisPhase::Graph));
        let graph = self.build_graph();
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "dependency graph rebuilt"
        );

        self.emit(AnalysisEvent::PhaseStarted(AnalysisPhase::Cycles));
        let cycles = {
            let store = &self.store;
            self.detector
                .find_circular_dependencies(&graph, |id| store.file(id))?
        };
        if !cycles.is_empty() {
            warn!("Detected {} circular dependencies", cycles.len());
        }
        self.store.replace_cycles(cycles.clone());

        self.emit(AnalysisEvent::PhaseStarted(AnalysisPhase::Patterns));
        self.extract_patterns(&documents);
        self.match_patterns();

        let mut document_links: Vec<DocumentCodeLink> =
            self.store.document_links().cloned().collect();
        document_links.sort_by_key(|link| (link.document_file_id, link.code_file_id));
        let link_strengths = self.link_strengths();

        if let Err(err) = self.store.save().await {
            warn!("Failed to persist analysis cache: {err}");
        }

        let statistics = self.statistics(skipped_files, started);
        info!(
            files = statistics.total_files,
            changed = statistics.changed_files,
            cache_hits = statistics.cache_hits,
            elapsed_ms = statistics.analysis_time_ms,
            "analysis complete"
        );
        self.emit(AnalysisEvent::Completed(statistics.clone()));

        Ok(AnalysisReport {
            statistics,
            graph,
            cycles,
            document_links,
            link_strengths,
        })
    }

    /// Add stored files the scan did not reach (file limit, depth limit,
    /// changed filters) to `seen` while they still exist on disk. Only files
    /// that are gone are left for the repair pass to remove.
    async fn keep_unscanned_files(&self, seen: &mut HashSet<PathBuf>) {
        let unscanned: Vec<PathBuf> = self
            .store
            .files()
            .map(|record| record.absolute_path.clone())
            .filter(|path| !seen.contains(path))
            .collect();

        for path in unscanned {
            match tokio::fs::try_exists(&path).await {
                Ok(false) => {}
                Ok(true) => {
                    debug!(path = %path.display(), "outside this scan, keeping cached record");
                    seen.insert(path);
                }
                Err(err) => {
                    warn!("Keeping {}, existence check failed: {err}", path.display());
                    seen.insert(path);
                }
            }
        }
    }

    /// Extract and resolve statements of changed code files, in parallel
    /// across files and in declaration order within a file.
    async fn resolve_changed(&mut self, files: Vec<PendingFile>) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        let index = Arc::new(self.store.path_index());
        let resolver = Arc::clone(&self.resolver);
        let extractor = Arc::clone(&self.extractor);
        let settings = self.settings.clone();

        let resolved = tokio::task::spawn_blocking(move || {
            files
                .par_iter()
                .map(|file| {
                    let dependencies =
                        analyze_source(file, extractor.as_ref(), &resolver, &settings, &index);
                    (file.id, dependencies)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|err| DepscopeError::Task(err.to_string()))?;

        for (id, dependencies) in resolved {
            self.store.replace_dependencies(id, dependencies);
        }
        Ok(())
    }

    fn build_graph(&self) -> DependencyGraph {
        let mut builder = GraphBuilder::new();
        for record in self.store.files() {
            if record.kind == FileKind::Code {
                builder.add_file(record.id);
            }
        }
        for dependency in self.store.dependencies() {
            builder.add_dependency(dependency);
        }
        builder.build()
    }

    fn extract_patterns(&mut self, documents: &[PendingFile]) {
        for document in documents {
            let dir = document
                .relative_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let references = self.document_extractor.extract(&dir, &document.contents);
            debug!(
                path = %document.path.display(),
                references = references.len(),
                "extracted document references"
            );
            self.store.replace_pattern_references(document.id, references);
        }
    }

    /// Re-match every document against the full file set; new code files can
    /// satisfy references in documents that did not change.
    fn match_patterns(&mut self) {
        let computed: Vec<(FileId, Vec<DocumentCodeLink>)> = {
            let files: Vec<&FileRecord> = self.store.files().collect();
            files
                .iter()
                .filter(|record| record.kind == FileKind::Document)
                .map(|record| {
                    let references = self.store.pattern_references_for(record.id);
                    (
                        record.id,
                        self.matcher.match_document(record.id, references, &files),
                    )
                })
                .collect()
        };

        for (document, links) in computed {
            self.store.replace_document_links(document, links);
        }
    }

    fn link_strengths(&self) -> BTreeMap<FileId, f64> {
        self.store
            .files()
            .filter(|record| record.kind == FileKind::Document)
            .map(|record| {
                (
                    record.id,
                    link_strength(self.store.document_links_for(record.id)),
                )
            })
            .collect()
    }

    fn statistics(&self, skipped_files: usize, started: Instant) -> AnalysisStatistics {
        let cache = self.store.statistics();
        let external_dependencies = self
            .store
            .dependencies()
            .filter(|dependency| dependency.external)
            .count();

        AnalysisStatistics {
            total_files: cache.total_files,
            changed_files: cache.changed_files,
            cache_hits: cache.cache_hits,
            removed_files: cache.removed_files,
            skipped_files,
            direct_dependencies: cache.dependencies,
            resolved_dependencies: cache.resolved_dependencies,
            external_dependencies,
            pattern_references: cache.pattern_references,
            document_links: cache.document_links,
            circular_dependencies: cache.circular_dependencies,
            analysis_time_ms: started.elapsed().as_millis() as u64,
            cache_efficiency: if cache.total_files == 0 {
                0.0
            } else {
                cache.cache_hits as f64 / cache.total_files as f64
            },
        }
    }

    fn emit(&self, event: AnalysisEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is listening.
            let _ = events.send(event);
        }
    }
}

fn analyze_source(
    file: &PendingFile,
    extractor: &dyn StatementExtractor,
    resolver: &PathResolver,
    settings: &ResolutionSettings,
    index: &HashMap<PathBuf, FileId>,
) -> Vec<ResolvedDependency> {
    if !extractor.supports(&file.extension) {
        return Vec::new();
    }

    let statements = match extractor.extract(&file.path, &file.contents) {
        Ok(statements) => statements,
        Err(err) => {
            warn!("Failed to extract statements from {}: {err}", file.path.display());
            return Vec::new();
        }
    };

    let ctx = settings.context_for(&file.path);
    let literals: Vec<&str> = statements
        .iter()
        .map(|statement| statement.source_literal.as_str())
        .collect();
    let resolved = resolver.resolve_batch(&literals, &ctx);

    statements
        .into_iter()
        .zip(resolved)
        .map(|(statement, path)| to_dependency(file.id, statement, path, index))
        .collect()
}

fn to_dependency(
    source_file_id: FileId,
    statement: ImportStatement,
    path: ResolvedPath,
    index: &HashMap<PathBuf, FileId>,
) -> ResolvedDependency {
    let target = path
        .absolute_path
        .as_ref()
        .filter(|_| path.exists)
        .and_then(|absolute| index.get(absolute))
        .map(|id| DependencyTarget::File(*id))
        .unwrap_or_else(|| DependencyTarget::Literal(statement.source_literal.clone()));

    ResolvedDependency {
        source_file_id,
        target,
        resolved: path.is_resolved(),
        external: path.is_external(),
        error: path.error.as_ref().map(ToString::to_string),
        resolution_kind: path.resolution_kind,
        resolved_path: path.absolute_path,
        source_literal: statement.source_literal,
        statement_kind: statement.kind,
        specifiers: statement.specifiers,
        line_number: statement.line_number,
    }
}

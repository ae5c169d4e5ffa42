use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::scanner::ScannedFile;
use super::types::{
    CircularDependency, DependencyTarget, DocumentCodeLink, FileId, FileRecord,
    PatternReference, ResolvedDependency,
};
use crate::error::{DepscopeError, Result};

const CACHE_FORMAT_VERSION: u32 = 1;

/// Deterministic SHA-256 digest of file contents, hex encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash, size and mtime of one file, plus its bytes for re-analysis.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub content_hash: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub contents: Vec<u8>,
}

impl Fingerprint {
    pub async fn read(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|err| DepscopeError::file_system(path, err))?;
        let contents = tokio::fs::read(path)
            .await
            .map_err(|err| DepscopeError::file_system(path, err))?;

        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Self {
            content_hash: content_hash(&contents),
            size_bytes: contents.len() as u64,
            last_modified,
            contents,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Stored hash matches; owned rows are kept.
    Unchanged,
    /// Hash differs; owned rows were dropped.
    Changed,
    /// First time this path is seen.
    New,
}

impl FileStatus {
    pub fn needs_analysis(self) -> bool {
        !matches!(self, FileStatus::Unchanged)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    pub total_files: usize,
    pub cache_hits: usize,
    pub changed_files: usize,
    pub removed_files: usize,
    pub dependencies: usize,
    pub resolved_dependencies: usize,
    pub pattern_references: usize,
    pub document_links: usize,
    pub circular_dependencies: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct ScanCounters {
    cache_hits: usize,
    changed_files: usize,
    removed_files: usize,
}

#[derive(Serialize, Deserialize)]
struct CacheSnapshot {
    version: u32,
    next_file_id: u64,
    next_pattern_id: u64,
    files: Vec<FileRecord>,
    dependencies: Vec<(FileId, Vec<ResolvedDependency>)>,
    pattern_references: Vec<(FileId, Vec<PatternReference>)>,
    document_links: Vec<(FileId, Vec<DocumentCodeLink>)>,
    cycles: Vec<CircularDependency>,
}

/// Content-hash keyed store of file records and the rows each file owns.
///
/// Not synchronised; one analysis run owns the store at a time.
pub struct CacheStore {
    location: Option<PathBuf>,
    files: HashMap<PathBuf, FileRecord>,
    paths_by_id: HashMap<FileId, PathBuf>,
    dependencies: HashMap<FileId, Vec<ResolvedDependency>>,
    pattern_references: HashMap<FileId, Vec<PatternReference>>,
    document_links: HashMap<FileId, Vec<DocumentCodeLink>>,
    cycles: Vec<CircularDependency>,
    next_file_id: u64,
    next_pattern_id: u64,
    counters: ScanCounters,
}

impl CacheStore {
    /// Store that lives only for the lifetime of the process.
    pub fn in_memory() -> Self {
        Self {
            location: None,
            files: HashMap::new(),
            paths_by_id: HashMap::new(),
            dependencies: HashMap::new(),
            pattern_references: HashMap::new(),
            document_links: HashMap::new(),
            cycles: Vec::new(),
            next_file_id: 1,
            next_pattern_id: 1,
            counters: ScanCounters::default(),
        }
    }

    /// Load the snapshot at `location`. A missing or unreadable snapshot
    /// yields an empty store bound to the same location.
    pub async fn open(location: impl Into<PathBuf>) -> Self {
        let location = location.into();
        let mut store = Self::in_memory();
        store.location = Some(location.clone());

        match tokio::fs::read(&location).await {
            Ok(bytes) => match bincode::deserialize::<CacheSnapshot>(&bytes) {
                Ok(snapshot) if snapshot.version == CACHE_FORMAT_VERSION => {
                    store.restore(snapshot);
                    info!(
                        path = %location.display(),
                        files = store.files.len(),
                        "loaded analysis cache"
                    );
                }
                Ok(snapshot) => warn!(
                    "Discarding cache {} with format version {}",
                    location.display(),
                    snapshot.version
                ),
                Err(err) => warn!("Discarding unreadable cache {}: {err}", location.display()),
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %location.display(), "no cache snapshot yet");
            }
            Err(err) => warn!("Failed to read cache {}: {err}", location.display()),
        }

        store
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Persist the store; a no-op for in-memory stores.
    pub async fn save(&self) -> Result<()> {
        let Some(location) = &self.location else {
            return Ok(());
        };

        let bytes = bincode::serialize(&self.snapshot())
            .map_err(|err| DepscopeError::CacheFormat(err.to_string()))?;

        if let Some(parent) = location.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| DepscopeError::file_system(parent, err))?;
        }

        let staging = location.with_extension("tmp");
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|err| DepscopeError::file_system(&staging, err))?;
        tokio::fs::rename(&staging, location)
            .await
            .map_err(|err| DepscopeError::file_system(location, err))?;

        debug!(path = %location.display(), "saved analysis cache");
        Ok(())
    }

    /// Reset the per-scan hit/change counters.
    pub fn begin_scan(&mut self) {
        self.counters = ScanCounters::default();
    }

    /// Compare a fresh fingerprint with the stored record and update it.
    /// On a hash change every row owned by the file is dropped.
    pub fn record_file(&mut self, scanned: &ScannedFile, fingerprint: &Fingerprint) -> (FileId, FileStatus) {
        if let Some(record) = self.files.get_mut(&scanned.path) {
            let id = record.id;
            let unchanged = record.content_hash == fingerprint.content_hash;

            record.size_bytes = fingerprint.size_bytes;
            record.last_modified = fingerprint.last_modified;
            record.project_relative_path = scanned.relative_path.clone();
            record.kind = scanned.kind;

            if unchanged {
                self.counters.cache_hits += 1;
                return (id, FileStatus::Unchanged);
            }

            record.content_hash = fingerprint.content_hash.clone();
            self.invalidate(id);
            self.counters.changed_files += 1;
            return (id, FileStatus::Changed);
        }

        let id = FileId(self.next_file_id);
        self.next_file_id += 1;

        let record = FileRecord {
            id,
            absolute_path: scanned.path.clone(),
            project_relative_path: scanned.relative_path.clone(),
            content_hash: fingerprint.content_hash.clone(),
            size_bytes: fingerprint.size_bytes,
            last_modified: fingerprint.last_modified,
            extension: scanned.extension.clone(),
            kind: scanned.kind,
        };
        self.paths_by_id.insert(id, scanned.path.clone());
        self.files.insert(scanned.path.clone(), record);
        self.counters.changed_files += 1;
        (id, FileStatus::New)
    }

    /// Drop every row owned by `id`. Rows in other files that point at it are
    /// left alone.
    pub fn invalidate(&mut self, id: FileId) {
        self.dependencies.remove(&id);
        self.pattern_references.remove(&id);
        self.document_links.remove(&id);
    }

    /// Remove records whose path was not seen in the latest scan.
    ///
    /// Dependents that targeted a removed file get their target downgraded to
    /// the literal; their `resolved` flag is left as it was.
    pub fn retain_files(&mut self, seen: &HashSet<PathBuf>) -> Vec<FileRecord> {
        let stale: Vec<PathBuf> = self
            .files
            .keys()
            .filter(|path| !seen.contains(*path))
            .cloned()
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for path in stale {
            if let Some(record) = self.files.remove(&path) {
                self.paths_by_id.remove(&record.id);
                self.invalidate(record.id);
                removed.push(record);
            }
        }

        if removed.is_empty() {
            return removed;
        }

        let removed_ids: HashSet<FileId> = removed.iter().map(|record| record.id).collect();
        for rows in self.dependencies.values_mut() {
            for dependency in rows.iter_mut() {
                if let Some(target) = dependency.target.file_id() {
                    if removed_ids.contains(&target) {
                        dependency.target = DependencyTarget::Literal(dependency.source_literal.clone());
                    }
                }
            }
        }
        for links in self.document_links.values_mut() {
            links.retain(|link| !removed_ids.contains(&link.code_file_id));
        }
        self.cycles
            .retain(|cycle| !cycle.cycle_path.iter().any(|record| removed_ids.contains(&record.id)));

        self.counters.removed_files += removed.len();
        info!(removed = removed.len(), "removed files that disappeared from disk");
        removed
    }

    pub fn file(&self, id: FileId) -> Option<&FileRecord> {
        self.paths_by_id.get(&id).and_then(|path| self.files.get(path))
    }

    pub fn file_by_path(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    /// Absolute path to id lookup for linking resolved paths to records.
    pub fn path_index(&self) -> HashMap<PathBuf, FileId> {
        self.files
            .iter()
            .map(|(path, record)| (path.clone(), record.id))
            .collect()
    }

    pub fn replace_dependencies(&mut self, owner: FileId, dependencies: Vec<ResolvedDependency>) {
        self.dependencies.insert(owner, dependencies);
    }

    pub fn dependencies_for(&self, owner: FileId) -> &[ResolvedDependency] {
        self.dependencies.get(&owner).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &ResolvedDependency> {
        self.dependencies.values().flatten()
    }

    /// Store the pattern rows owned by a document, assigning fresh ids.
    pub fn replace_pattern_references(&mut self, owner: FileId, mut references: Vec<PatternReference>) {
        for reference in &mut references {
            reference.id = self.next_pattern_id;
            reference.owner_file_id = owner;
            self.next_pattern_id += 1;
        }
        self.pattern_references.insert(owner, references);
    }

    pub fn pattern_references_for(&self, owner: FileId) -> &[PatternReference] {
        self.pattern_references
            .get(&owner)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn pattern_references(&self) -> impl Iterator<Item = &PatternReference> {
        self.pattern_references.values().flatten()
    }

    pub fn replace_document_links(&mut self, document: FileId, links: Vec<DocumentCodeLink>) {
        self.document_links.insert(document, links);
    }

    pub fn document_links_for(&self, document: FileId) -> &[DocumentCodeLink] {
        self.document_links
            .get(&document)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn document_links(&self) -> impl Iterator<Item = &DocumentCodeLink> {
        self.document_links.values().flatten()
    }

    pub fn replace_cycles(&mut self, cycles: Vec<CircularDependency>) {
        self.cycles = cycles;
    }

    pub fn cycles(&self) -> &[CircularDependency] {
        &self.cycles
    }

    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            total_files: self.files.len(),
            cache_hits: self.counters.cache_hits,
            changed_files: self.counters.changed_files,
            removed_files: self.counters.removed_files,
            dependencies: self.dependencies().count(),
            resolved_dependencies: self.dependencies().filter(|dep| dep.resolved).count(),
            pattern_references: self.pattern_references().count(),
            document_links: self.document_links().count(),
            circular_dependencies: self.cycles.len(),
        }
    }

    /// Forget everything, keeping the snapshot location.
    pub fn clear(&mut self) {
        let location = self.location.take();
        *self = Self::in_memory();
        self.location = location;
    }

    fn snapshot(&self) -> CacheSnapshot {
        let mut files: Vec<FileRecord> = self.files.values().cloned().collect();
        files.sort_by_key(|record| record.id);

        CacheSnapshot {
            version: CACHE_FORMAT_VERSION,
            next_file_id: self.next_file_id,
            next_pattern_id: self.next_pattern_id,
            files,
            dependencies: sorted_rows(&self.dependencies),
            pattern_references: sorted_rows(&self.pattern_references),
            document_links: sorted_rows(&self.document_links),
            cycles: self.cycles.clone(),
        }
    }

    fn restore(&mut self, snapshot: CacheSnapshot) {
        self.next_file_id = snapshot.next_file_id;
        self.next_pattern_id = snapshot.next_pattern_id;
        for record in snapshot.files {
            self.paths_by_id
                .insert(record.id, record.absolute_path.clone());
            self.files.insert(record.absolute_path.clone(), record);
        }
        self.dependencies = snapshot.dependencies.into_iter().collect();
        self.pattern_references = snapshot.pattern_references.into_iter().collect();
        self.document_links = snapshot.document_links.into_iter().collect();
        self.cycles = snapshot.cycles;
    }
}

fn sorted_rows<T: Clone>(table: &HashMap<FileId, Vec<T>>) -> Vec<(FileId, Vec<T>)> {
    let mut rows: Vec<(FileId, Vec<T>)> = table
        .iter()
        .map(|(id, rows)| (*id, rows.clone()))
        .collect();
    rows.sort_by_key(|(id, _)| *id);
    rows
}

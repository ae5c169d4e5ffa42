use chrono::Utc;
use depscope::core::cache::{content_hash, Fingerprint};
use depscope::core::types::{
    DependencyTarget, FileId, FileKind, ResolutionKind, ResolvedDependency, StatementKind,
};
use depscope::core::{CacheStore, FileStatus, ScannedFile};
use std::collections::HashSet;
use std::path::PathBuf;

fn scanned(relative: &str) -> ScannedFile {
    ScannedFile {
        path: PathBuf::from("/project").join(relative),
        relative_path: PathBuf::from(relative),
        extension: "ts".to_string(),
        kind: FileKind::Code,
    }
}

fn fingerprint(contents: &str) -> Fingerprint {
    Fingerprint {
        content_hash: content_hash(contents.as_bytes()),
        size_bytes: contents.len() as u64,
        last_modified: Utc::now(),
        contents: contents.as_bytes().to_vec(),
    }
}

fn import(source: FileId, target: FileId, literal: &str) -> ResolvedDependency {
    ResolvedDependency {
        source_file_id: source,
        target: DependencyTarget::File(target),
        source_literal: literal.to_string(),
        statement_kind: StatementKind::Import,
        resolution_kind: ResolutionKind::Relative,
        resolved_path: None,
        specifiers: Vec::new(),
        line_number: 1,
        resolved: true,
        external: false,
        error: None,
    }
}

#[test]
fn unchanged_content_is_a_cache_hit() {
    let mut store = CacheStore::in_memory();
    let a = scanned("src/a.ts");

    let (id, status) = store.record_file(&a, &fingerprint("export const a = 1;"));
    assert_eq!(status, FileStatus::New);
    store.replace_dependencies(id, vec![import(id, id, "./a")]);

    store.begin_scan();
    let (again, status) = store.record_file(&a, &fingerprint("export const a = 1;"));
    assert_eq!(again, id);
    assert_eq!(status, FileStatus::Unchanged);
    assert!(!status.needs_analysis());
    assert_eq!(store.dependencies_for(id).len(), 1);

    let stats = store.statistics();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.changed_files, 0);
}

#[test]
fn changed_content_drops_owned_rows() {
    let mut store = CacheStore::in_memory();
    let a = scanned("src/a.ts");

    let (id, _) = store.record_file(&a, &fingerprint("export const a = 1;"));
    store.replace_dependencies(id, vec![import(id, id, "./a")]);

    store.begin_scan();
    let (again, status) = store.record_file(&a, &fingerprint("export const a = 2;"));
    assert_eq!(again, id, "file ids survive content changes");
    assert_eq!(status, FileStatus::Changed);
    assert!(store.dependencies_for(id).is_empty());
    assert_eq!(
        store.file(id).unwrap().content_hash,
        content_hash(b"export const a = 2;")
    );
    assert_eq!(store.statistics().changed_files, 1);
}

#[test]
fn removed_files_downgrade_dependents_to_literals() {
    let mut store = CacheStore::in_memory();
    let (a, _) = store.record_file(&scanned("src/a.ts"), &fingerprint("import './b';"));
    let (b, _) = store.record_file(&scanned("src/b.ts"), &fingerprint("export {};"));
    store.replace_dependencies(a, vec![import(a, b, "./b")]);

    let seen: HashSet<PathBuf> = [PathBuf::from("/project/src/a.ts")].into_iter().collect();
    let removed = store.retain_files(&seen);

    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].id, b);
    assert!(store.file(b).is_none());

    let rows = store.dependencies_for(a);
    assert_eq!(rows[0].target, DependencyTarget::Literal("./b".to_string()));
    // The importer was not re-analyzed, so its flag still reflects the old run.
    assert!(rows[0].resolved);
    assert_eq!(store.statistics().removed_files, 1);
}

#[test]
fn pattern_rows_get_fresh_ids_and_owner() {
    use depscope::core::DocumentPatternExtractor;
    use std::path::Path;

    let mut store = CacheStore::in_memory();
    let doc = ScannedFile {
        path: PathBuf::from("/project/README.md"),
        relative_path: PathBuf::from("README.md"),
        extension: "md".to_string(),
        kind: FileKind::Document,
    };
    let (doc_id, _) = store.record_file(&doc, &fingerprint("see `src/**`"));

    let references = DocumentPatternExtractor::new(&["ts"])
        .unwrap()
        .extract(Path::new(""), "see `src/**` and `lib/`\n");
    store.replace_pattern_references(doc_id, references);

    let stored = store.pattern_references_for(doc_id);
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|r| r.owner_file_id == doc_id));
    assert_ne!(stored[0].id, stored[1].id);
}

#[tokio::test]
async fn snapshot_round_trips_through_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let location = dir.path().join(".depscope/cache.bin");

    let mut store = CacheStore::open(&location).await;
    let (a, _) = store.record_file(&scanned("src/a.ts"), &fingerprint("import './b';"));
    let (b, _) = store.record_file(&scanned("src/b.ts"), &fingerprint("export {};"));
    store.replace_dependencies(a, vec![import(a, b, "./b")]);
    store.save().await.unwrap();
    assert!(location.exists());

    let mut reopened = CacheStore::open(&location).await;
    assert_eq!(reopened.statistics().total_files, 2);
    assert_eq!(reopened.dependencies_for(a), store.dependencies_for(a));
    assert_eq!(
        reopened.file_by_path(&PathBuf::from("/project/src/b.ts")).map(|r| r.id),
        Some(b)
    );

    reopened.begin_scan();
    let (_, status) = reopened.record_file(&scanned("src/b.ts"), &fingerprint("export {};"));
    assert_eq!(status, FileStatus::Unchanged);

    let (c, status) = reopened.record_file(&scanned("src/c.ts"), &fingerprint(""));
    assert_eq!(status, FileStatus::New);
    assert!(c > b, "ids keep increasing after a reload");
}

#[tokio::test]
async fn corrupt_snapshot_yields_empty_store() {
    let dir = tempfile::TempDir::new().unwrap();
    let location = dir.path().join("cache.bin");
    std::fs::write(&location, b"definitely not bincode").unwrap();

    let store = CacheStore::open(&location).await;
    assert_eq!(store.statistics().total_files, 0);
    assert_eq!(store.location(), Some(location.as_path()));
}

use depscope::core::types::{CycleSeverity, DependencyTarget, FileId};
use depscope::core::{AnalysisEvent, AnalysisPhase, CacheStore};
use depscope::{AnalysisConfig, AnalysisCoordinator};
use std::fs;
use std::path::Path;

fn write<P: AsRef<Path>>(path: P, contents: &str) {
    let path = path.as_ref();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn in_memory(root: &Path) -> AnalysisCoordinator {
    let mut config = AnalysisConfig::for_root(root);
    config.cache_file = None;
    AnalysisCoordinator::with_store(config, CacheStore::in_memory()).unwrap()
}

fn id_of(coordinator: &AnalysisCoordinator, root: &Path, relative: &str) -> FileId {
    coordinator
        .store()
        .file_by_path(&root.join(relative))
        .map(|record| record.id)
        .unwrap()
}

#[tokio::test]
async fn two_file_cycle_is_reported() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    write(root.join("src/a.ts"), "import { b } from \"./b\";\nexport const a = 1;\n");
    write(root.join("src/b.ts"), "import { a } from './a';\nexport const b = 2;\n");

    let mut coordinator = in_memory(root);
    let report = coordinator.analyze().await.unwrap();

    assert_eq!(report.graph.node_count(), 2);
    assert_eq!(report.graph.edge_count(), 2);
    assert_eq!(report.cycles.len(), 1);
    assert_eq!(report.cycles[0].length, 2);
    assert_eq!(report.cycles[0].severity, CycleSeverity::Info);

    let mut members = report.cycles[0].file_ids();
    members.sort();
    let mut expected = vec![
        id_of(&coordinator, root, "src/a.ts"),
        id_of(&coordinator, root, "src/b.ts"),
    ];
    expected.sort();
    assert_eq!(members, expected);
    assert_eq!(report.statistics.circular_dependencies, 1);
}

#[tokio::test]
async fn unchanged_files_are_cache_hits_on_rescan() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    write(root.join("src/a.ts"), "import { b } from './b';\n");
    write(root.join("src/b.ts"), "export const b = 2;\n");

    let mut coordinator = in_memory(root);
    let first = coordinator.analyze().await.unwrap();
    assert_eq!(first.statistics.changed_files, 2);
    assert_eq!(first.statistics.cache_hits, 0);

    let a = id_of(&coordinator, root, "src/a.ts");
    let rows_before = coordinator.store().dependencies_for(a).to_vec();

    let second = coordinator.analyze().await.unwrap();
    assert_eq!(second.statistics.cache_hits, 2);
    assert_eq!(second.statistics.changed_files, 0);
    assert_eq!(second.statistics.cache_efficiency, 1.0);
    assert_eq!(coordinator.store().dependencies_for(a), rows_before.as_slice());
    assert_eq!(second.graph.edge_count(), 1);

    // One extra byte is enough to invalidate.
    write(root.join("src/b.ts"), "export const b = 2;\n\n");
    let third = coordinator.analyze().await.unwrap();
    assert_eq!(third.statistics.changed_files, 1);
    assert_eq!(third.statistics.cache_hits, 1);
    assert_eq!(third.graph.edge_count(), 1);
}

#[tokio::test]
async fn cache_persists_between_coordinators() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    write(root.join("src/a.ts"), "import './b';\n");
    write(root.join("src/b.ts"), "export {};\n");

    let config = AnalysisConfig::for_root(root);
    let mut first = AnalysisCoordinator::new(config.clone()).await.unwrap();
    first.analyze().await.unwrap();
    drop(first);
    assert!(root.join(".depscope/cache.bin").exists());

    let mut second = AnalysisCoordinator::new(config).await.unwrap();
    let report = second.analyze().await.unwrap();
    assert_eq!(report.statistics.total_files, 2);
    assert_eq!(report.statistics.cache_hits, 2);
    assert_eq!(report.graph.edge_count(), 1);
}

#[tokio::test]
async fn resolved_and_external_counts() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    write(
        root.join("src/index.ts"),
        "import fs from 'fs';\nimport React from 'react';\nimport { util } from './util';\nconst cfg = require('../config');\n",
    );
    write(root.join("src/util.ts"), "export const util = 1;\n");
    write(root.join("config.js"), "module.exports = {};\n");

    let mut coordinator = in_memory(root);
    let stats = coordinator.analyze().await.unwrap().statistics;

    assert_eq!(stats.total_files, 3);
    assert_eq!(stats.direct_dependencies, 4);
    assert_eq!(stats.resolved_dependencies, 2);
    assert_eq!(stats.external_dependencies, 2);

    let index = id_of(&coordinator, root, "src/index.ts");
    let config = id_of(&coordinator, root, "config.js");
    let rows = coordinator.store().dependencies_for(index);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].target, DependencyTarget::Literal("fs".to_string()));
    assert_eq!(rows[3].target, DependencyTarget::File(config));
    assert_eq!(rows[3].line_number, 4);
}

#[tokio::test]
async fn new_file_does_not_repair_unchanged_importer() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    write(root.join("src/a.ts"), "import { c } from './c';\n");

    let mut coordinator = in_memory(root);
    let first = coordinator.analyze().await.unwrap();
    assert_eq!(first.statistics.resolved_dependencies, 0);

    write(root.join("src/c.ts"), "export const c = 3;\n");
    let second = coordinator.analyze().await.unwrap();

    // a.ts was a cache hit, so its unresolved row from the first run stays.
    assert_eq!(second.statistics.cache_hits, 1);
    assert_eq!(second.statistics.resolved_dependencies, 0);
    assert_eq!(second.graph.node_count(), 2);
    assert_eq!(second.graph.edge_count(), 0);

    // Touching the importer picks up the new target.
    write(root.join("src/a.ts"), "import { c } from './c';\n// touched\n");
    let third = coordinator.analyze().await.unwrap();
    assert_eq!(third.statistics.resolved_dependencies, 1);
    assert_eq!(third.graph.edge_count(), 1);
}

#[tokio::test]
async fn deleted_files_are_removed_and_edges_dropped() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    write(root.join("src/a.ts"), "import './b';\n");
    write(root.join("src/b.ts"), "import './a';\n");

    let mut coordinator = in_memory(root);
    let first = coordinator.analyze().await.unwrap();
    assert_eq!(first.cycles.len(), 1);

    fs::remove_file(root.join("src/b.ts")).unwrap();
    let second = coordinator.analyze().await.unwrap();

    assert_eq!(second.statistics.removed_files, 1);
    assert_eq!(second.statistics.total_files, 1);
    assert!(second.cycles.is_empty());
    assert_eq!(second.graph.node_count(), 1);
    assert_eq!(second.graph.edge_count(), 0);

    let a = id_of(&coordinator, root, "src/a.ts");
    let rows = coordinator.store().dependencies_for(a);
    assert_eq!(rows[0].target, DependencyTarget::Literal("./b".to_string()));
}

#[tokio::test]
async fn documents_link_to_code() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    write(root.join("src/a.ts"), "export const a = 1;\n");
    write(root.join("src/lib/b.ts"), "export const b = 1;\n");
    write(
        root.join("docs/guide.md"),
        "# Guide\nStart at [a](../src/a.ts).\nHelpers live under `src/lib/`.\n",
    );

    let mut coordinator = in_memory(root);
    let report = coordinator.analyze().await.unwrap();

    let guide = id_of(&coordinator, root, "docs/guide.md");
    assert_eq!(report.document_links.len(), 2);
    assert!(report.document_links.iter().all(|l| l.document_file_id == guide));
    assert_eq!(report.statistics.pattern_references, 2);
    assert_eq!(report.statistics.document_links, 2);
    // Documents are not graph nodes.
    assert_eq!(report.graph.node_count(), 2);

    let strength = report.link_strengths[&guide];
    assert!((strength - 0.18).abs() < 1e-9, "strength was {strength}");

    // A new code file under the referenced directory links without the
    // document changing.
    write(root.join("src/lib/c.ts"), "export const c = 1;\n");
    let report = coordinator.analyze().await.unwrap();
    assert_eq!(report.document_links.len(), 3);
    assert!((report.link_strengths[&guide] - 0.26).abs() < 1e-9);
}

#[tokio::test]
async fn progress_events_are_streamed() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    write(root.join("src/a.ts"), "export {};\n");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut coordinator = in_memory(root).with_progress(tx);
    coordinator.analyze().await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert_eq!(events.first(), Some(&AnalysisEvent::PhaseStarted(AnalysisPhase::Scan)));
    assert!(events.contains(&AnalysisEvent::FilesDiscovered(1)));
    assert!(events.contains(&AnalysisEvent::FileChanged(root.join("src/a.ts"))));
    match events.last() {
        Some(AnalysisEvent::Completed(stats)) => assert_eq!(stats.total_files, 1),
        other => panic!("expected completion event, got {other:?}"),
    }
}

#[tokio::test]
async fn file_limit_does_not_remove_files_left_on_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    write(root.join("src/b.ts"), "import { c } from './c';\n");
    write(root.join("src/c.ts"), "export const c = 3;\n");

    let mut config = AnalysisConfig::for_root(root);
    config.cache_file = None;
    config.max_files = Some(2);
    let mut coordinator =
        AnalysisCoordinator::with_store(config, CacheStore::in_memory()).unwrap();
    let first = coordinator.analyze().await.unwrap();
    assert_eq!(first.graph.edge_count(), 1);

    // a.ts sorts first, so the limited scan now stops before c.ts.
    write(root.join("src/a.ts"), "export const a = 1;\n");
    let second = coordinator.analyze().await.unwrap();

    assert_eq!(second.statistics.removed_files, 0);
    let c = id_of(&coordinator, root, "src/c.ts");
    let b = id_of(&coordinator, root, "src/b.ts");
    assert_eq!(
        coordinator.store().dependencies_for(b)[0].target,
        DependencyTarget::File(c)
    );
    assert_eq!(second.graph.forward_edges(b), vec![c]);

    // Once c.ts is really gone it is removed.
    fs::remove_file(root.join("src/c.ts")).unwrap();
    let third = coordinator.analyze().await.unwrap();
    assert_eq!(third.statistics.removed_files, 1);
    assert!(coordinator
        .store()
        .file_by_path(&root.join("src/c.ts"))
        .is_none());
    assert_eq!(
        coordinator.store().dependencies_for(b)[0].target,
        DependencyTarget::Literal("./c".to_string())
    );
}

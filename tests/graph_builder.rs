use depscope::core::types::{
    DependencyTarget, FileId, ResolutionKind, ResolvedDependency, StatementKind,
};
use depscope::core::{CycleDetector, DependencyGraph, GraphBuilder};

fn dependency(source: u64, target: DependencyTarget, resolved: bool) -> ResolvedDependency {
    ResolvedDependency {
        source_file_id: FileId(source),
        target,
        source_literal: "./x".to_string(),
        statement_kind: StatementKind::Import,
        resolution_kind: ResolutionKind::Relative,
        resolved_path: None,
        specifiers: Vec::new(),
        line_number: 1,
        resolved,
        external: false,
        error: None,
    }
}

fn edge(source: u64, target: u64) -> ResolvedDependency {
    dependency(source, DependencyTarget::File(FileId(target)), true)
}

#[test]
fn graph_builder_adds_nodes_and_edges() {
    let mut gb = GraphBuilder::new();
    for id in 1..=3 {
        gb.add_file(FileId(id));
    }

    assert_eq!(gb.add_dependency(&edge(1, 2)), Some((FileId(1), FileId(2))));
    assert!(gb.add_dependency(&edge(2, 3)).is_some());

    let graph: DependencyGraph = gb.build();
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
    assert_eq!(graph.forward_edges(FileId(1)), vec![FileId(2)]);
    assert_eq!(graph.reverse_edges(FileId(3)), vec![FileId(2)]);
}

#[test]
fn repeated_dependencies_collapse_to_one_edge() {
    let mut gb = GraphBuilder::new();
    gb.add_file(FileId(1));
    gb.add_file(FileId(2));

    gb.add_dependency(&edge(1, 2));
    gb.add_dependency(&edge(1, 2));

    let mut graph = gb.build();
    assert_eq!(graph.edge_count(), 1);
    assert!(!graph.add_edge(FileId(1), FileId(2)));
    assert!(graph.add_edge(FileId(2), FileId(1)));
}

#[test]
fn unresolved_and_literal_targets_add_no_edge() {
    let mut gb = GraphBuilder::new();
    gb.add_file(FileId(1));
    gb.add_file(FileId(2));

    assert!(gb
        .add_dependency(&dependency(1, DependencyTarget::File(FileId(2)), false))
        .is_none());
    assert!(gb
        .add_dependency(&dependency(1, DependencyTarget::Literal("react".into()), true))
        .is_none());
    // target not present
    assert!(gb.add_dependency(&edge(1, 99)).is_none());

    let graph = gb.build();
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 0);
    assert!(graph.forward_edges(FileId(1)).is_empty());
}

#[test]
fn adjacency_lists_both_directions_sorted() {
    let mut gb = GraphBuilder::new();
    for id in 1..=4 {
        gb.add_file(FileId(id));
    }
    gb.add_dependency(&edge(1, 4));
    gb.add_dependency(&edge(1, 2));
    gb.add_dependency(&edge(3, 2));

    let adjacency = gb.build().to_adjacency();
    assert_eq!(adjacency.len(), 4);
    assert_eq!(adjacency[&FileId(1)].forward_edges, vec![FileId(2), FileId(4)]);
    assert_eq!(adjacency[&FileId(2)].reverse_edges, vec![FileId(1), FileId(3)]);
    assert!(adjacency[&FileId(4)].forward_edges.is_empty());
}

#[test]
fn detector_reports_each_cycle_once() {
    let mut gb = GraphBuilder::new();
    for id in 1..=5 {
        gb.add_file(FileId(id));
    }
    // 1 -> 2 -> 3 -> 1, plus a tail 3 -> 4 -> 5
    for (s, t) in [(1, 2), (2, 3), (3, 1), (3, 4), (4, 5)] {
        gb.add_dependency(&edge(s, t));
    }

    let cycles = CycleDetector::new().detect(&gb.build());
    assert_eq!(cycles.len(), 1);
    let mut members = cycles[0].clone();
    members.sort();
    assert_eq!(members, vec![FileId(1), FileId(2), FileId(3)]);
}

#[test]
fn mutual_import_inside_larger_cycle_is_reported() {
    let mut gb = GraphBuilder::new();
    for id in 1..=3 {
        gb.add_file(FileId(id));
    }
    // 1 -> 2 -> 3 -> 1, and 1 <-> 3 directly
    for (s, t) in [(1, 2), (2, 3), (3, 1), (1, 3)] {
        gb.add_dependency(&edge(s, t));
    }

    let cycles = CycleDetector::new().detect(&gb.build());
    let lengths: Vec<usize> = cycles.iter().map(Vec::len).collect();
    assert_eq!(cycles.len(), 2, "cycles: {cycles:?}");
    assert!(lengths.contains(&2));
    assert!(lengths.contains(&3));

    let pair = cycles.iter().find(|cycle| cycle.len() == 2).unwrap();
    let mut members = pair.clone();
    members.sort();
    assert_eq!(members, vec![FileId(1), FileId(3)]);
}

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{FileId, ResolvedDependency};

/// Adjacency view of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub forward_edges: Vec<FileId>,
    pub reverse_edges: Vec<FileId>,
}

/// File-level dependency graph. Edges are sets: adding the same edge twice
/// leaves a single edge.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<FileId, ()>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: FileId) {
        self.graph.add_node(id);
    }

    pub fn contains_node(&self, id: FileId) -> bool {
        self.graph.contains_node(id)
    }

    /// Returns `true` when the edge was not present before.
    pub fn add_edge(&mut self, source: FileId, target: FileId) -> bool {
        self.graph.add_edge(source, target, ()).is_none()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Node ids in ascending order.
    pub fn nodes(&self) -> Vec<FileId> {
        let mut nodes: Vec<FileId> = self.graph.nodes().collect();
        nodes.sort();
        nodes
    }

    /// Files `id` depends on, ascending.
    pub fn forward_edges(&self, id: FileId) -> Vec<FileId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Files that depend on `id`, ascending.
    pub fn reverse_edges(&self, id: FileId) -> Vec<FileId> {
        self.neighbors(id, Direction::Incoming)
    }

    pub fn to_adjacency(&self) -> BTreeMap<FileId, GraphNode> {
        self.nodes()
            .into_iter()
            .map(|id| {
                (
                    id,
                    GraphNode {
                        forward_edges: self.forward_edges(id),
                        reverse_edges: self.reverse_edges(id),
                    },
                )
            })
            .collect()
    }

    fn neighbors(&self, id: FileId, direction: Direction) -> Vec<FileId> {
        if !self.graph.contains_node(id) {
            return Vec::new();
        }
        let mut neighbors: Vec<FileId> = self.graph.neighbors_directed(id, direction).collect();
        neighbors.sort();
        neighbors
    }
}

pub struct GraphBuilder {
    graph: DependencyGraph,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            graph: DependencyGraph::new(),
        }
    }

    pub fn add_file(&mut self, id: FileId) {
        self.graph.add_node(id);
    }

    /// Add the edge for a dependency. Only resolved dependencies whose target
    /// is a known file produce an edge.
    pub fn add_dependency(&mut self, dependency: &ResolvedDependency) -> Option<(FileId, FileId)> {
        if !dependency.resolved {
            return None;
        }
        let target = dependency.target.file_id()?;
        let source = dependency.source_file_id;
        if !self.graph.contains_node(source) || !self.graph.contains_node(target) {
            return None;
        }
        self.graph.add_edge(source, target);
        Some((source, target))
    }

    pub fn build(self) -> DependencyGraph {
        self.graph
    }
}

use std::collections::{HashMap, HashSet, VecDeque};

use super::graph::DependencyGraph;
use super::types::{CircularDependency, CycleSeverity, FileId, FileRecord};
use crate::error::{DepscopeError, Result};

/// Longest cycle the per-node search looks for.
const SHORT_CYCLE_DEPTH: usize = 16;
/// Nodes the per-node search may expand before giving up on that start.
const SHORT_CYCLE_BUDGET: usize = 4_096;

struct Frame {
    node: FileId,
    neighbors: Vec<FileId>,
    cursor: usize,
}

/// Cycle finder over a `DependencyGraph`.
///
/// A depth-first pass with an explicit stack reports one cycle per back edge
/// it meets, however long. A second, bounded breadth-first search from every
/// node then reports the shortest cycle whose smallest member is that node,
/// so short cycles hidden inside longer ones are not lost.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleDetector;

impl CycleDetector {
    pub fn new() -> Self {
        Self
    }

    /// Cycles as node paths. Cycles over the same node set are reported once.
    pub fn detect(&self, graph: &DependencyGraph) -> Vec<Vec<FileId>> {
        let mut seen: HashSet<Vec<FileId>> = HashSet::new();
        let mut cycles = Vec::new();

        let mut record = |cycle: Vec<FileId>| {
            let mut key = cycle.clone();
            key.sort();
            if seen.insert(key) {
                cycles.push(cycle);
            }
        };

        for cycle in self.back_edge_cycles(graph) {
            record(cycle);
        }
        for start in graph.nodes() {
            if let Some(cycle) = self.shortest_cycle_from(graph, start) {
                record(cycle);
            }
        }

        cycles
    }

    /// Explicit-stack DFS; every node is expanded at most once.
    fn back_edge_cycles(&self, graph: &DependencyGraph) -> Vec<Vec<FileId>> {
        let mut visited: HashSet<FileId> = HashSet::new();
        let mut cycles = Vec::new();

        for start in graph.nodes() {
            if visited.contains(&start) {
                continue;
            }

            let mut path: Vec<FileId> = Vec::new();
            let mut position: HashMap<FileId, usize> = HashMap::new();
            let mut stack: Vec<Frame> = Vec::new();

            visited.insert(start);
            position.insert(start, 0);
            path.push(start);
            stack.push(Frame {
                node: start,
                neighbors: graph.forward_edges(start),
                cursor: 0,
            });

            loop {
                let Some(frame) = stack.last_mut() else {
                    break;
                };

                let next = frame.neighbors.get(frame.cursor).copied();
                frame.cursor += 1;

                match next {
                    Some(next) => {
                        if let Some(&index) = position.get(&next) {
                            cycles.push(path[index..].to_vec());
                        } else if visited.insert(next) {
                            position.insert(next, path.len());
                            path.push(next);
                            stack.push(Frame {
                                node: next,
                                neighbors: graph.forward_edges(next),
                                cursor: 0,
                            });
                        }
                    }
                    None => {
                        if let Some(done) = stack.pop() {
                            position.remove(&done.node);
                            path.pop();
                        }
                    }
                }
            }
        }

        cycles
    }

    /// Breadth-first search for the shortest cycle through `start` that only
    /// visits nodes greater than `start`. Bounded by depth and expansions.
    fn shortest_cycle_from(&self, graph: &DependencyGraph, start: FileId) -> Option<Vec<FileId>> {
        let mut parent: HashMap<FileId, FileId> = HashMap::new();
        let mut queue: VecDeque<(FileId, usize)> = VecDeque::from([(start, 1)]);
        let mut expanded = 0usize;

        while let Some((node, depth)) = queue.pop_front() {
            expanded += 1;
            if expanded > SHORT_CYCLE_BUDGET {
                return None;
            }

            for next in graph.forward_edges(node) {
                if next == start {
                    let mut cycle = vec![node];
                    let mut cursor = node;
                    while cursor != start {
                        let Some(&previous) = parent.get(&cursor) else {
                            return None;
                        };
                        cycle.push(previous);
                        cursor = previous;
                    }
                    cycle.reverse();
                    return Some(cycle);
                }
                if next < start || depth >= SHORT_CYCLE_DEPTH || parent.contains_key(&next) {
                    continue;
                }
                parent.insert(next, node);
                queue.push_back((next, depth + 1));
            }
        }

        None
    }

    /// Detect cycles and attach file records and severity.
    pub fn find_circular_dependencies<'a, F>(
        &self,
        graph: &DependencyGraph,
        lookup: F,
    ) -> Result<Vec<CircularDependency>>
    where
        F: Fn(FileId) -> Option<&'a FileRecord>,
    {
        self.detect(graph)
            .into_iter()
            .map(|cycle| {
                let cycle_path = cycle
                    .iter()
                    .map(|id| {
                        lookup(*id).cloned().ok_or_else(|| {
                            DepscopeError::CycleDetection(format!(
                                "graph node {id} has no file record"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(CircularDependency {
                    length: cycle_path.len(),
                    severity: CycleSeverity::for_length(cycle_path.len()),
                    cycle_path,
                })
            })
            .collect()
    }
}

//! Containment graph construction and verification.
//!
//! Edges are rebuilt from a flat object listing: every directory is indexed
//! by its canonical path, then every object looks up its declared parent.
//!
//! # Counting rules
//!
//! - parent resolves: one Contains and one ContainedBy edge
//! - parent declared but unknown: orphan, no edges
//! - no parent declared: root, no edges
//!
//! So `edge_count == 2 * (objects - orphans - roots)` for every batch.

use std::collections::HashMap;

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::{ContainmentEdge, EdgeKind, RunCounters, StorageObject};

/// Two directory objects claimed the same canonical path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DirectoryConflict {
    pub path: String,
    /// Identifier that now owns the path.
    pub kept: Uuid,
    /// Identifier that was displaced.
    pub replaced: Uuid,
}

/// Canonical directory path -> identifier, for one batch.
#[derive(Debug, Default)]
pub struct PathIndex {
    dirs: HashMap<String, Uuid>,
    conflicts: Vec<DirectoryConflict>,
}

impl PathIndex {
    /// Index every directory object. Later duplicates replace earlier ones
    /// and are recorded as conflicts.
    pub fn build(objects: &[StorageObject]) -> Self {
        let mut index = PathIndex {
            dirs: HashMap::with_capacity(objects.len() / 4),
            conflicts: Vec::new(),
        };
        for obj in objects.iter().filter(|o| o.is_directory && !o.path.is_empty()) {
            if let Some(previous) = index.dirs.insert(obj.path.clone(), obj.object_identifier) {
                warn!(path = %obj.path, kept = %obj.object_identifier, replaced = %previous, "duplicate directory path");
                index.conflicts.push(DirectoryConflict {
                    path: obj.path.clone(),
                    kept: obj.object_identifier,
                    replaced: previous,
                });
            }
        }
        index
    }

    pub fn get(&self, path: &str) -> Option<Uuid> {
        self.dirs.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn conflicts(&self) -> &[DirectoryConflict] {
        &self.conflicts
    }
}

/// Edges and diagnostics from one graph build.
#[derive(Debug, Default)]
pub struct GraphBuild {
    pub edges: Vec<ContainmentEdge>,
    pub conflicts: Vec<DirectoryConflict>,
    /// Identifiers of objects whose parent did not resolve.
    pub orphans: Vec<Uuid>,
}

/// Build Contains/ContainedBy edges for a batch.
///
/// Updates `edge_count`, `orphan_count`, `root_count` and
/// `duplicate_dir_count` on `counters`.
pub fn build_containment(objects: &[StorageObject], counters: &mut RunCounters) -> GraphBuild {
    let index = PathIndex::build(objects);
    let mut build = GraphBuild {
        edges: Vec::with_capacity(objects.len() * 2),
        ..Default::default()
    };

    for obj in objects {
        let Some(parent_path) = obj.parent_path.as_deref() else {
            counters.root_count += 1;
            continue;
        };
        let parent = if obj.path.is_empty() {
            None
        } else {
            index.get(parent_path)
        };
        match parent {
            Some(parent_id) => {
                build.edges.push(ContainmentEdge::contains(
                    parent_id,
                    obj.object_identifier,
                    obj.source.clone(),
                ));
                build.edges.push(ContainmentEdge::contained_by(
                    obj.object_identifier,
                    parent_id,
                    obj.source.clone(),
                ));
            }
            None => {
                debug!(path = %obj.path, parent = %parent_path, "parent not found");
                counters.orphan_count += 1;
                build.orphans.push(obj.object_identifier);
            }
        }
    }

    counters.edge_count += build.edges.len();
    counters.duplicate_dir_count += index.conflicts.len();
    build.conflicts = index.conflicts;
    build
}

/// Structural problem found in a containment edge set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphViolation {
    /// An object is contained by more than one directory.
    MultipleParents { child: Uuid, parents: Vec<Uuid> },
    /// Directories that (transitively) contain each other.
    Cycle { members: Vec<Uuid> },
}

/// In-memory containment graph over object identifiers.
///
/// Only Contains edges are loaded; ContainedBy edges mirror them.
pub struct ContainmentGraph {
    graph: DiGraph<Uuid, ()>,
}

impl ContainmentGraph {
    pub fn new(objects: &[StorageObject], edges: &[ContainmentEdge]) -> Self {
        let mut graph = DiGraph::with_capacity(objects.len(), edges.len() / 2);
        let mut node_map: HashMap<Uuid, NodeIndex> = HashMap::with_capacity(objects.len());

        for obj in objects {
            node_map
                .entry(obj.object_identifier)
                .or_insert_with(|| graph.add_node(obj.object_identifier));
        }

        for edge in edges.iter().filter(|e| e.kind == EdgeKind::Contains) {
            if let (Some(&s), Some(&d)) = (node_map.get(&edge.source), node_map.get(&edge.target)) {
                graph.add_edge(s, d, ());
            }
        }

        ContainmentGraph { graph }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Strongly connected components with more than one node, plus self loops.
    pub fn find_cycles(&self) -> Vec<Vec<Uuid>> {
        kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.first().is_some_and(|&n| self.graph.contains_edge(n, n))
            })
            .map(|scc| scc.into_iter().map(|idx| self.graph[idx]).collect())
            .collect()
    }

    /// All violations: objects with more than one parent, then cycles.
    pub fn verify(&self) -> Vec<GraphViolation> {
        let mut violations: Vec<GraphViolation> = self
            .graph
            .node_indices()
            .filter_map(|idx| {
                let parents: Vec<Uuid> = self
                    .graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .map(|p| self.graph[p])
                    .collect();
                (parents.len() > 1).then(|| GraphViolation::MultipleParents {
                    child: self.graph[idx],
                    parents,
                })
            })
            .collect();
        violations.extend(
            self.find_cycles()
                .into_iter()
                .map(|members| GraphViolation::Cycle { members }),
        );
        violations
    }
}

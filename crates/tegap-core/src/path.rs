//! Paths and path sets.
//!
//! A path is a loop-free node sequence; demand pairs are associated with a
//! primary path set and, in failure-resilient encodings, a disjoint backup
//! set. Paths are caller-supplied or derived by bounded enumeration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::topology::Topology;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("path references unknown node {0:?}")]
    UnknownNode(String),

    #[error("path uses missing edge {0:?} -> {1:?}")]
    MissingEdge(String, String),

    #[error("path revisits node {0:?}")]
    Loop(String),

    #[error("path needs at least two nodes")]
    TooShort,
}

/// An ordered loop-free route between a node pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path {
    pub nodes: Vec<String>,
}

impl Path {
    pub fn new(nodes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn src(&self) -> &str {
        self.nodes.first().map(String::as_str).unwrap_or("")
    }

    pub fn dst(&self) -> &str {
        self.nodes.last().map(String::as_str).unwrap_or("")
    }

    /// Consecutive (src, dst) edges along the path.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.nodes
            .windows(2)
            .map(|w| (w[0].as_str(), w[1].as_str()))
    }

    /// Whether the path traverses the given directed edge.
    pub fn crosses(&self, src: &str, dst: &str) -> bool {
        self.edges().any(|(s, d)| s == src && d == dst)
    }

    /// Check the path against a topology: known nodes, existing edges,
    /// no revisited node.
    pub fn validate(&self, topo: &Topology) -> Result<(), PathError> {
        if self.nodes.len() < 2 {
            return Err(PathError::TooShort);
        }
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if !topo.contains_node(node) {
                return Err(PathError::UnknownNode(node.clone()));
            }
            if !seen.insert(node.as_str()) {
                return Err(PathError::Loop(node.clone()));
            }
        }
        for (s, d) in self.edges() {
            if !topo.contains_edge(s, d) {
                return Err(PathError::MissingEdge(s.to_string(), d.to_string()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.nodes.join("-"))
    }
}

/// The candidate routes available to one demand pair.
pub type PathSet = Vec<Path>;

/// Enumerate loop-free paths from `src` to `dst`, shortest (fewest hops)
/// first, truncated to `k`.
///
/// Plain bounded DFS; topologies in this problem family are small enough
/// that full enumeration before truncation is fine.
pub fn k_shortest_paths(topo: &Topology, src: &str, dst: &str, k: usize) -> PathSet {
    let mut found: Vec<Path> = Vec::new();
    if k == 0 || !topo.contains_node(src) || !topo.contains_node(dst) {
        return found;
    }
    let mut stack = vec![src.to_string()];
    dfs_paths(topo, dst, &mut stack, &mut found);
    found.sort_by_key(|p| p.nodes.len());
    found.truncate(k);
    found
}

fn dfs_paths(topo: &Topology, dst: &str, stack: &mut Vec<String>, out: &mut Vec<Path>) {
    let current = stack.last().cloned().unwrap_or_default();
    if current == dst {
        out.push(Path {
            nodes: stack.clone(),
        });
        return;
    }
    for next in topo.successors(&current) {
        if stack.iter().any(|n| n == next) {
            continue;
        }
        stack.push(next.to_string());
        dfs_paths(topo, dst, stack, out);
        stack.pop();
    }
}

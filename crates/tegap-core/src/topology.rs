//! Directed capacity graph for traffic-engineering studies.
//!
//! Networks are modeled as directed graphs where nodes are points of
//! presence and edges are capacitated links. A logical link may aggregate
//! several physical sub-links (a LAG); its available capacity under a
//! failure scenario is the sum of the capacities of its surviving members,
//! while a link without sub-links fails atomically.
//!
//! Meta-nodes wrap a group of real nodes behind unbounded access edges so
//! aggregate demand behavior can be studied without touching the underlying
//! topology; they are a pure construction helper, encoders never treat them
//! specially.

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

use crate::demand::Pair;

/// Error type for topology construction.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Node redefined
    #[error("duplicate node {0:?}")]
    DuplicateNode(String),

    /// Edge redefined
    #[error("duplicate edge {0:?} -> {1:?}")]
    DuplicateEdge(String, String),

    /// Edge or sub-link references a node that was never added
    #[error("unknown node {0:?}")]
    UnknownNode(String),

    /// Edge referenced before it was added
    #[error("unknown edge {0:?} -> {1:?}")]
    UnknownEdge(String, String),

    /// Sub-link redefined within a link
    #[error("duplicate sub-link {2:?} on edge {0:?} -> {1:?}")]
    DuplicateSubLink(String, String, String),

    /// Partition count must be at least 1
    #[error("invalid partition count: {0}")]
    InvalidPartitionCount(usize),

    /// Capacities must be non-negative
    #[error("negative capacity {1} on edge {0:?}")]
    NegativeCapacity(String, f64),
}

/// A physical member of a link aggregation group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubLink {
    /// Identifier unique within the parent link
    pub id: String,
    /// Capacity share carried by this member
    pub capacity: f64,
    /// Failure weight (independent failure probability of this member)
    pub failure_weight: f64,
}

/// A directed capacitated link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    /// Source node name
    pub src: String,
    /// Destination node name
    pub dst: String,
    /// Nominal capacity of the logical link
    pub capacity: f64,
    /// LAG members; empty means the link fails atomically
    pub sub_links: Vec<SubLink>,
}

impl Link {
    /// Ordered (src, dst) key for this link.
    pub fn key(&self) -> (String, String) {
        (self.src.clone(), self.dst.clone())
    }
}

/// Directed capacity graph with optional link aggregation groups.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    graph: DiGraph<String, Link>,
    node_index: HashMap<String, NodeIndex>,
    edge_index: HashMap<(String, String), EdgeIndex>,
    /// Edge keys in insertion order; defines the layout of failure vectors.
    edge_order: Vec<(String, String)>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Fails if the name is already taken.
    pub fn add_node(&mut self, id: impl Into<String>) -> Result<(), TopologyError> {
        let id = id.into();
        if self.node_index.contains_key(&id) {
            return Err(TopologyError::DuplicateNode(id));
        }
        let idx = self.graph.add_node(id.clone());
        self.node_index.insert(id, idx);
        Ok(())
    }

    /// Add a directed edge with the given capacity.
    ///
    /// Both endpoints must already exist and the capacity must be
    /// non-negative (`f64::INFINITY` is allowed for access edges).
    pub fn add_edge(
        &mut self,
        src: impl Into<String>,
        dst: impl Into<String>,
        capacity: f64,
    ) -> Result<(), TopologyError> {
        let (src, dst) = (src.into(), dst.into());
        if capacity < 0.0 || capacity.is_nan() {
            return Err(TopologyError::NegativeCapacity(src, capacity));
        }
        let s = self.node_idx(&src)?;
        let d = self.node_idx(&dst)?;
        let key = (src.clone(), dst.clone());
        if self.edge_index.contains_key(&key) {
            return Err(TopologyError::DuplicateEdge(src, dst));
        }
        let link = Link {
            src,
            dst,
            capacity,
            sub_links: Vec::new(),
        };
        let e = self.graph.add_edge(s, d, link);
        self.edge_index.insert(key.clone(), e);
        self.edge_order.push(key);
        Ok(())
    }

    /// Attach a physical sub-link to an existing edge.
    ///
    /// The logical capacity of the link becomes the sum of its members'
    /// capacities; `failure_weight` is the member's independent failure
    /// probability used by scenario sampling.
    pub fn add_sub_link(
        &mut self,
        src: &str,
        dst: &str,
        id: impl Into<String>,
        capacity: f64,
        failure_weight: f64,
    ) -> Result<(), TopologyError> {
        let id = id.into();
        if capacity < 0.0 || capacity.is_nan() {
            return Err(TopologyError::NegativeCapacity(src.to_string(), capacity));
        }
        let e = self.edge_idx(src, dst)?;
        let link = &mut self.graph[e];
        if link.sub_links.iter().any(|s| s.id == id) {
            return Err(TopologyError::DuplicateSubLink(
                src.to_string(),
                dst.to_string(),
                id,
            ));
        }
        link.sub_links.push(SubLink {
            id,
            capacity,
            failure_weight,
        });
        link.capacity = link.sub_links.iter().map(|s| s.capacity).sum();
        Ok(())
    }

    /// Wrap a group of real nodes behind an aggregation node.
    ///
    /// The meta-node is connected to every member by unbounded access edges
    /// in both directions, so demand terminating at the meta-node is served
    /// losslessly by the members.
    pub fn add_meta_node(
        &mut self,
        id: impl Into<String>,
        members: &[&str],
    ) -> Result<(), TopologyError> {
        let id = id.into();
        for m in members {
            // Validate members before mutating anything.
            self.node_idx(m)?;
        }
        self.add_node(id.clone())?;
        for m in members {
            self.add_edge(id.clone(), *m, f64::INFINITY)?;
            self.add_edge(*m, id.clone(), f64::INFINITY)?;
        }
        Ok(())
    }

    /// Node names in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(|s| s.as_str())
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_order.len()
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn contains_edge(&self, src: &str, dst: &str) -> bool {
        self.edge_index
            .contains_key(&(src.to_string(), dst.to_string()))
    }

    /// Links in insertion order (the canonical edge ordering for failure
    /// vectors and solver variables).
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.edge_order.iter().map(move |key| {
            let e = self.edge_index[key];
            &self.graph[e]
        })
    }

    pub fn link(&self, src: &str, dst: &str) -> Option<&Link> {
        let key = (src.to_string(), dst.to_string());
        self.edge_index.get(&key).map(|&e| &self.graph[e])
    }

    /// Position of an edge in the canonical ordering.
    pub fn edge_position(&self, src: &str, dst: &str) -> Option<usize> {
        let key = (src.to_string(), dst.to_string());
        self.edge_order.iter().position(|k| *k == key)
    }

    /// Successor node names of `src`.
    pub fn successors(&self, src: &str) -> Vec<&str> {
        match self.node_index.get(src) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, petgraph::Direction::Outgoing)
                .map(|n| self.graph[n].as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Map every ordered node pair to one of `n` partition indices.
    ///
    /// Seeded for reproducibility; used by the partitioned heuristic for
    /// scalability studies.
    pub fn random_partition(
        &self,
        n: usize,
        seed: u64,
    ) -> Result<HashMap<Pair, usize>, TopologyError> {
        if n == 0 {
            return Err(TopologyError::InvalidPartitionCount(n));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let names: Vec<String> = self.nodes().map(|s| s.to_string()).collect();
        let mut assignment = HashMap::new();
        for src in &names {
            for dst in &names {
                if src == dst {
                    continue;
                }
                assignment.insert(Pair::new(src.clone(), dst.clone()), rng.gen_range(0..n));
            }
        }
        Ok(assignment)
    }

    /// Check that every partition of a node assignment induces a connected
    /// subgraph (edges taken as undirected).
    pub fn node_partition_is_contiguous(&self, assignment: &HashMap<String, usize>) -> bool {
        let mut parts: HashMap<usize, Vec<&str>> = HashMap::new();
        for (node, &p) in assignment {
            parts.entry(p).or_default().push(node.as_str());
        }
        for members in parts.values() {
            if !self.is_connected_subset(members) {
                return false;
            }
        }
        true
    }

    fn is_connected_subset(&self, members: &[&str]) -> bool {
        if members.len() <= 1 {
            return true;
        }
        let set: HashSet<&str> = members.iter().copied().collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(members[0]);
        seen.insert(members[0]);
        while let Some(node) = queue.pop_front() {
            let idx = match self.node_index.get(node) {
                Some(&i) => i,
                None => return false,
            };
            for dir in [petgraph::Direction::Outgoing, petgraph::Direction::Incoming] {
                for nb in self.graph.neighbors_directed(idx, dir) {
                    let name = self.graph[nb].as_str();
                    if set.contains(name) && seen.insert(name) {
                        queue.push_back(name);
                    }
                }
            }
        }
        seen.len() == set.len()
    }

    fn node_idx(&self, id: &str) -> Result<NodeIndex, TopologyError> {
        self.node_index
            .get(id)
            .copied()
            .ok_or_else(|| TopologyError::UnknownNode(id.to_string()))
    }

    fn edge_idx(&self, src: &str, dst: &str) -> Result<EdgeIndex, TopologyError> {
        let key = (src.to_string(), dst.to_string());
        self.edge_index
            .get(&key)
            .copied()
            .ok_or_else(|| TopologyError::UnknownEdge(src.to_string(), dst.to_string()))
    }
}

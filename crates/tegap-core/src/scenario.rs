//! Failure scenarios and the admissible-failure domain.
//!
//! A scenario marks edges (or individual LAG members) down. The domain
//! configuration bounds which scenarios the adversary or the sampler may
//! realize: a cardinality bound on the number of down edges plus an
//! optional probability model. Contradictory configurations are rejected
//! before any solver state exists.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::topology::{Link, Topology};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_failures and exact_failures are mutually exclusive")]
    ConflictingCardinality,

    #[error("failure_prob_threshold and scenario_prob_threshold are mutually exclusive")]
    ConflictingThresholds,

    #[error("probability threshold supplied without per-edge probabilities")]
    ThresholdWithoutProbabilities,

    #[error("edge probability for {0:?} -> {1:?} is {2}, must lie in (0, 1)")]
    ProbabilityOutOfRange(String, String, f64),

    #[error("probability refers to unknown edge {0:?} -> {1:?}")]
    UnknownEdge(String, String),

    #[error("failure bound {0} exceeds edge count {1}")]
    BoundExceedsEdges(usize, usize),
}

/// A boolean down-assignment over edges and sub-links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureScenario {
    down_edges: HashSet<(String, String)>,
    down_sub_links: HashSet<(String, String, String)>,
}

impl FailureScenario {
    /// The all-up scenario.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fail_edge(&mut self, src: &str, dst: &str) -> &mut Self {
        self.down_edges.insert((src.to_string(), dst.to_string()));
        self
    }

    pub fn fail_sub_link(&mut self, src: &str, dst: &str, id: &str) -> &mut Self {
        self.down_sub_links
            .insert((src.to_string(), dst.to_string(), id.to_string()));
        self
    }

    pub fn is_edge_down(&self, src: &str, dst: &str) -> bool {
        self.down_edges
            .contains(&(src.to_string(), dst.to_string()))
    }

    /// Number of whole edges marked down.
    pub fn down_count(&self) -> usize {
        self.down_edges.len()
    }

    /// Available capacity of a link under this scenario.
    ///
    /// A link with sub-links keeps the capacity of its surviving members;
    /// a plain link fails atomically.
    pub fn available_capacity(&self, link: &Link) -> f64 {
        if self.is_edge_down(&link.src, &link.dst) {
            return 0.0;
        }
        if link.sub_links.is_empty() {
            return link.capacity;
        }
        link.sub_links
            .iter()
            .filter(|s| {
                !self.down_sub_links.contains(&(
                    link.src.clone(),
                    link.dst.clone(),
                    s.id.clone(),
                ))
            })
            .map(|s| s.capacity)
            .sum()
    }
}

/// Admissibility constraints on failure scenarios.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureDomain {
    /// At most this many edges down
    pub max_failures: Option<usize>,
    /// Exactly this many edges down
    pub exact_failures: Option<usize>,
    /// Independent failure probability per edge, keyed by (src, dst)
    pub edge_probability: HashMap<(String, String), f64>,
    /// Bound on the sum of down-edge probabilities
    pub failure_prob_threshold: Option<f64>,
    /// Lower bound on the joint probability of the exact realized
    /// down/up assignment (rare scenarios are inadmissible)
    pub scenario_prob_threshold: Option<f64>,
}

impl FailureDomain {
    /// At most `k` edges down, no probability model.
    pub fn at_most(k: usize) -> Self {
        Self {
            max_failures: Some(k),
            ..Self::default()
        }
    }

    /// Exactly `k` edges down, no probability model.
    pub fn exactly(k: usize) -> Self {
        Self {
            exact_failures: Some(k),
            ..Self::default()
        }
    }

    pub fn with_edge_probability(mut self, src: &str, dst: &str, p: f64) -> Self {
        self.edge_probability
            .insert((src.to_string(), dst.to_string()), p);
        self
    }

    pub fn with_failure_prob_threshold(mut self, t: f64) -> Self {
        self.failure_prob_threshold = Some(t);
        self
    }

    pub fn with_scenario_prob_threshold(mut self, t: f64) -> Self {
        self.scenario_prob_threshold = Some(t);
        self
    }

    /// The effective cardinality bound, if any.
    pub fn cardinality(&self) -> Option<usize> {
        self.exact_failures.or(self.max_failures)
    }

    /// Fast-fail validation, run before model construction.
    pub fn validate(&self, topo: &Topology) -> Result<(), ConfigError> {
        if self.max_failures.is_some() && self.exact_failures.is_some() {
            return Err(ConfigError::ConflictingCardinality);
        }
        if self.failure_prob_threshold.is_some() && self.scenario_prob_threshold.is_some() {
            return Err(ConfigError::ConflictingThresholds);
        }
        if (self.failure_prob_threshold.is_some() || self.scenario_prob_threshold.is_some())
            && self.edge_probability.is_empty()
        {
            return Err(ConfigError::ThresholdWithoutProbabilities);
        }
        if let Some(k) = self.cardinality() {
            if k > topo.edge_count() {
                return Err(ConfigError::BoundExceedsEdges(k, topo.edge_count()));
            }
        }
        for ((src, dst), &p) in &self.edge_probability {
            if !topo.contains_edge(src, dst) {
                return Err(ConfigError::UnknownEdge(src.clone(), dst.clone()));
            }
            if !(0.0..=1.0).contains(&p) || p.is_nan() {
                return Err(ConfigError::ProbabilityOutOfRange(
                    src.clone(),
                    dst.clone(),
                    p,
                ));
            }
            // The joint-probability style is encoded in log space; both
            // endpoints of [0, 1] would make the logarithm degenerate.
            if self.scenario_prob_threshold.is_some() && (p <= 0.0 || p >= 1.0) {
                return Err(ConfigError::ProbabilityOutOfRange(
                    src.clone(),
                    dst.clone(),
                    p,
                ));
            }
        }
        Ok(())
    }

    /// Whether a concrete scenario satisfies this domain.
    pub fn admits(&self, topo: &Topology, scenario: &FailureScenario) -> bool {
        let down = scenario.down_count();
        if let Some(k) = self.max_failures {
            if down > k {
                return false;
            }
        }
        if let Some(k) = self.exact_failures {
            if down != k {
                return false;
            }
        }
        if let Some(t) = self.failure_prob_threshold {
            let sum: f64 = topo
                .links()
                .filter(|l| scenario.is_edge_down(&l.src, &l.dst))
                .map(|l| self.prob_of(l))
                .sum();
            if sum > t {
                return false;
            }
        }
        if let Some(t) = self.scenario_prob_threshold {
            let mut joint = 1.0;
            for l in topo.links() {
                let p = self.prob_of(l);
                joint *= if scenario.is_edge_down(&l.src, &l.dst) {
                    p
                } else {
                    1.0 - p
                };
            }
            if joint < t {
                return false;
            }
        }
        true
    }

    /// Probability weight of a link, defaulting to 0 when unspecified.
    pub fn prob_of(&self, link: &Link) -> f64 {
        self.edge_probability
            .get(&(link.src.clone(), link.dst.clone()))
            .copied()
            .unwrap_or(0.0)
    }
}

/// All down-sets of capacitated edges with size `0..=k`, smallest first.
/// Edges with infinite capacity never fail and are skipped.
pub fn bounded_down_sets(topo: &Topology, k: usize) -> Vec<Vec<(String, String)>> {
    let edges: Vec<(String, String)> = topo
        .links()
        .filter(|l| l.capacity.is_finite())
        .map(|l| (l.src.clone(), l.dst.clone()))
        .collect();
    let mut out = vec![Vec::new()];
    let mut frontier: Vec<Vec<usize>> = vec![Vec::new()];
    for _ in 0..k.min(edges.len()) {
        let mut next = Vec::new();
        for combo in &frontier {
            let start = combo.last().map(|&i| i + 1).unwrap_or(0);
            for i in start..edges.len() {
                let mut grown = combo.clone();
                grown.push(i);
                out.push(grown.iter().map(|&j| edges[j].clone()).collect());
                next.push(grown);
            }
        }
        frontier = next;
    }
    out
}

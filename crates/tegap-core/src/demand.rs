//! Demand model: which ordered pairs carry traffic, and how much freedom
//! the adversary has over each volume.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// An ordered source/destination pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub src: String,
    pub dst: String,
}

impl Pair {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.src, self.dst)
    }
}

/// How a pair's traffic volume is determined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DemandSpec {
    /// Equality-constrained input volume
    Fixed(f64),
    /// Free decision variable, bounded above by total feasible flow
    Free,
    /// Restricted to a finite candidate set (keeps adversarial search finite)
    Discrete(Vec<f64>),
}

#[derive(Debug, Error)]
pub enum DemandError {
    #[error("negative demand {1} for pair {0}")]
    Negative(Pair, f64),

    #[error("empty candidate set for pair {0}")]
    EmptyCandidates(Pair),
}

/// Demand domain over ordered pairs.
///
/// `BTreeMap` keeps pair iteration deterministic, which in turn keeps
/// solver variable layouts stable across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemandModel {
    pub pairs: BTreeMap<Pair, DemandSpec>,
}

impl DemandModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed volumes for every listed pair.
    pub fn fixed(entries: impl IntoIterator<Item = (Pair, f64)>) -> Self {
        Self {
            pairs: entries
                .into_iter()
                .map(|(p, v)| (p, DemandSpec::Fixed(v)))
                .collect(),
        }
    }

    pub fn set(&mut self, pair: Pair, spec: DemandSpec) -> &mut Self {
        self.pairs.insert(pair, spec);
        self
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Reject negative volumes and empty candidate sets before any solver
    /// state is built.
    pub fn validate(&self) -> Result<(), DemandError> {
        for (pair, spec) in &self.pairs {
            match spec {
                DemandSpec::Fixed(v) => {
                    if *v < 0.0 || v.is_nan() {
                        return Err(DemandError::Negative(pair.clone(), *v));
                    }
                }
                DemandSpec::Free => {}
                DemandSpec::Discrete(cands) => {
                    if cands.is_empty() {
                        return Err(DemandError::EmptyCandidates(pair.clone()));
                    }
                    if let Some(&v) = cands.iter().find(|v| **v < 0.0 || v.is_nan()) {
                        return Err(DemandError::Negative(pair.clone(), v));
                    }
                }
            }
        }
        Ok(())
    }
}

//! Path-formulation flow encoders.
//!
//! An encoder writes one traffic-engineering scheme into a [`Session`]:
//! per-path flow variables, capacity and delivery rows, and an objective
//! expression. Encoders never solve; the recorded encoding is either
//! optimized directly or embedded as the inner level of a bilevel model.
//!
//! All encoders share outer variables (demand volumes, and optionally
//! per-edge failure flags) owned by the caller, so two encodings in the
//! same session face the same adversarial input.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use tegap_core::{FailureScenario, Link, Pair, PathError, PathSet, Topology};

use crate::session::{Cmp, LinExpr, Session, SolverOutcome, VarId};

mod optimal;
mod pinning;
mod pop;
mod resilient;

pub use optimal::OptimalFlowEncoder;
pub use pinning::DemandPinningEncoder;
pub use pop::PopEncoder;
pub use resilient::{BackupPathEncoder, ResilientFlowEncoder};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("no candidate paths for pair {0}")]
    MissingPaths(Pair),

    #[error("encoder misconfigured: {0}")]
    Config(String),
}

/// Adversary-controlled variables shared by every encoding in a session.
#[derive(Debug, Clone, Default)]
pub struct OuterVars {
    /// One volume variable per demand pair.
    pub demand: BTreeMap<Pair, VarId>,
    /// Per-edge failure flags in canonical edge order; empty when the
    /// failure realization is not part of the model.
    pub failure: Vec<VarId>,
}

impl OuterVars {
    /// Outer variables pinned to concrete volumes, no failure flags.
    /// Used when evaluating encoders at a fixed adversarial input.
    pub fn fixed(session: &mut Session, demands: &BTreeMap<Pair, f64>) -> Self {
        let demand = demands
            .iter()
            .map(|(pair, &v)| {
                let var = session.add_continuous(v, v, &format!("d_{pair}"));
                (pair.clone(), var)
            })
            .collect();
        Self {
            demand,
            failure: Vec::new(),
        }
    }
}

/// Everything an encoder reads while writing its model.
#[derive(Debug, Clone, Copy)]
pub struct EncoderContext<'a> {
    pub topology: &'a Topology,
    /// Candidate routes per pair; every demand pair must be covered.
    pub paths: &'a BTreeMap<Pair, PathSet>,
    pub outer: &'a OuterVars,
    /// Concrete volumes when demands are pinned for this solve. Encoders
    /// with demand-dependent structure (gating) specialize on these
    /// instead of introducing binaries.
    pub fixed_demands: Option<&'a BTreeMap<Pair, f64>>,
    /// Capacity realization used when `outer.failure` is empty.
    pub scenario: &'a FailureScenario,
}

impl<'a> EncoderContext<'a> {
    pub fn new(
        topology: &'a Topology,
        paths: &'a BTreeMap<Pair, PathSet>,
        outer: &'a OuterVars,
        scenario: &'a FailureScenario,
    ) -> Self {
        Self {
            topology,
            paths,
            outer,
            fixed_demands: None,
            scenario,
        }
    }

    pub fn with_fixed_demands(mut self, demands: &'a BTreeMap<Pair, f64>) -> Self {
        self.fixed_demands = Some(demands);
        self
    }

    /// Available capacity of a link as a linear expression over outer
    /// variables, or `None` when the link is uncapacitated.
    ///
    /// With failure flags present the expression is `cap * (1 - f_e)`;
    /// otherwise it is the constant capacity under `self.scenario`.
    pub fn capacity_expr(&self, link: &Link) -> Option<LinExpr> {
        if !self.outer.failure.is_empty() {
            if !link.capacity.is_finite() {
                return None;
            }
            let pos = self.topology.edge_position(&link.src, &link.dst)?;
            let flag = self.outer.failure[pos];
            return Some(LinExpr::term(flag, -link.capacity) + link.capacity);
        }
        let cap = self.scenario.available_capacity(link);
        cap.is_finite().then(|| LinExpr::constant(cap))
    }
}

/// One traffic-engineering scheme, written as a linear encoding.
pub trait FlowEncoder {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn encode(&self, session: &mut Session, ctx: &EncoderContext<'_>)
        -> Result<Encoding, EncodeError>;
}

/// The recorded footprint of one encoder in a session: its objective,
/// its variables, and the contiguous row range it wrote. The row range
/// and primal variable list are what the KKT reformulation consumes.
#[derive(Debug, Clone)]
pub struct Encoding {
    objective: LinExpr,
    flow_vars: BTreeMap<Pair, Vec<VarId>>,
    paths: BTreeMap<Pair, PathSet>,
    demand_vars: BTreeMap<Pair, VarId>,
    failure_vars: Vec<VarId>,
    row_start: usize,
    row_end: usize,
    primal_vars: Vec<VarId>,
}

impl Encoding {
    /// Objective expression, always stated as a maximization.
    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    pub fn flow_var(&self, pair: &Pair, path_index: usize) -> Option<VarId> {
        self.flow_vars.get(pair)?.get(path_index).copied()
    }

    pub(crate) fn row_range(&self) -> std::ops::Range<usize> {
        self.row_start..self.row_end
    }

    /// Inner continuous variables covered by the optimality conditions.
    pub(crate) fn primal_vars(&self) -> &[VarId] {
        &self.primal_vars
    }

    /// Read the encoding's solution out of a solved session.
    pub fn decode(&self, topo: &Topology, outcome: &SolverOutcome) -> Solution {
        let demands = self
            .demand_vars
            .iter()
            .map(|(p, v)| (p.clone(), outcome.value(*v)))
            .collect();
        let path_flows: BTreeMap<Pair, Vec<f64>> = self
            .flow_vars
            .iter()
            .map(|(p, vars)| (p.clone(), vars.iter().map(|v| outcome.value(*v)).collect()))
            .collect();

        let mut edge_flows: BTreeMap<(String, String), f64> = topo
            .links()
            .map(|l| ((l.src.clone(), l.dst.clone()), 0.0))
            .collect();
        for (pair, flows) in &path_flows {
            if let Some(paths) = self.paths.get(pair) {
                for (path, &flow) in paths.iter().zip(flows) {
                    for (s, d) in path.edges() {
                        if let Some(e) = edge_flows.get_mut(&(s.to_string(), d.to_string())) {
                            *e += flow;
                        }
                    }
                }
            }
        }

        let link_down = self
            .failure_vars
            .iter()
            .map(|v| outcome.value(*v) > 0.5)
            .collect();

        Solution {
            objective: self.objective.eval(&outcome.values),
            demands,
            path_flows,
            edge_flows,
            link_down,
        }
    }
}

/// A decoded encoder solution at one adversarial input.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    /// The encoder's own objective value (delivered flow, or the
    /// guaranteed throughput for resilient encoders).
    pub objective: f64,
    pub demands: BTreeMap<Pair, f64>,
    /// Per-pair flows aligned with the pair's candidate path order.
    pub path_flows: BTreeMap<Pair, Vec<f64>>,
    pub edge_flows: BTreeMap<(String, String), f64>,
    /// Realized failure flags in canonical edge order; empty when the
    /// model had none.
    pub link_down: Vec<bool>,
}

impl Solution {
    pub fn total_path_flow(&self) -> f64 {
        self.path_flows.values().flatten().sum()
    }

    /// Per-edge load divided by nominal capacity. Uncapacitated edges
    /// report zero.
    pub fn utilization(&self, topo: &Topology) -> BTreeMap<(String, String), f64> {
        self.edge_flows
            .iter()
            .map(|((s, d), &flow)| {
                let cap = topo.link(s, d).map(|l| l.capacity).unwrap_or(f64::INFINITY);
                let u = if cap.is_finite() && cap > 0.0 {
                    flow / cap
                } else {
                    0.0
                };
                ((s.clone(), d.clone()), u)
            })
            .collect()
    }
}

/// Declare one nonnegative flow variable per candidate path, validating
/// every path against the topology.
pub(crate) fn declare_flow_vars(
    session: &mut Session,
    ctx: &EncoderContext<'_>,
) -> Result<BTreeMap<Pair, Vec<VarId>>, EncodeError> {
    let mut out = BTreeMap::new();
    for pair in ctx.outer.demand.keys() {
        let paths = ctx
            .paths
            .get(pair)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| EncodeError::MissingPaths(pair.clone()))?;
        let mut vars = Vec::with_capacity(paths.len());
        for (i, path) in paths.iter().enumerate() {
            path.validate(ctx.topology)?;
            if path.src() != pair.src || path.dst() != pair.dst {
                return Err(EncodeError::Config(format!(
                    "path {path} does not connect pair {pair}"
                )));
            }
            vars.push(session.add_nonneg(&format!("f_{pair}_{i}")));
        }
        out.insert(pair.clone(), vars);
    }
    Ok(out)
}

/// Total flow over a directed edge, restricted to pairs accepted by
/// `include`.
pub(crate) fn edge_load(
    flows: &BTreeMap<Pair, Vec<VarId>>,
    paths: &BTreeMap<Pair, PathSet>,
    src: &str,
    dst: &str,
    include: impl Fn(&Pair) -> bool,
) -> LinExpr {
    let mut load = LinExpr::zero();
    for (pair, vars) in flows {
        if !include(pair) {
            continue;
        }
        if let Some(pair_paths) = paths.get(pair) {
            for (path, var) in pair_paths.iter().zip(vars) {
                if path.crosses(src, dst) {
                    load.add_term(*var, 1.0);
                }
            }
        }
    }
    load
}

/// One capacity row per capacitated link: total load on the edge at most
/// `scale` times the available capacity.
pub(crate) fn add_capacity_rows(
    session: &mut Session,
    ctx: &EncoderContext<'_>,
    flows: &BTreeMap<Pair, Vec<VarId>>,
    scale: f64,
) {
    for link in ctx.topology.links() {
        let Some(cap) = ctx.capacity_expr(link) else {
            continue;
        };
        let load = edge_load(flows, ctx.paths, &link.src, &link.dst, |_| true);
        if load.terms.is_empty() {
            continue;
        }
        session.add_constraint(load - cap * scale, Cmp::Le);
    }
}

/// One delivery row per pair: flow at most (or exactly) the demand.
pub(crate) fn add_delivery_rows(
    session: &mut Session,
    ctx: &EncoderContext<'_>,
    flows: &BTreeMap<Pair, Vec<VarId>>,
    exact: bool,
) {
    for (pair, vars) in flows {
        let mut expr = LinExpr::zero();
        for var in vars {
            expr.add_term(*var, 1.0);
        }
        expr.add_term(ctx.outer.demand[pair], -1.0);
        session.add_constraint(expr, if exact { Cmp::Eq } else { Cmp::Le });
    }
}

/// Sum of every flow variable.
pub(crate) fn total_flow(flows: &BTreeMap<Pair, Vec<VarId>>) -> LinExpr {
    let mut expr = LinExpr::zero();
    for var in flows.values().flatten() {
        expr.add_term(*var, 1.0);
    }
    expr
}

/// Shared constructor for encodings built from the common skeleton.
pub(crate) struct EncodingParts {
    pub objective: LinExpr,
    pub flow_vars: BTreeMap<Pair, Vec<VarId>>,
    pub row_start: usize,
    pub primal_vars: Vec<VarId>,
}

pub(crate) fn finish_encoding(
    session: &Session,
    ctx: &EncoderContext<'_>,
    parts: EncodingParts,
) -> Encoding {
    Encoding {
        objective: parts.objective,
        flow_vars: parts.flow_vars,
        paths: ctx.paths.clone(),
        demand_vars: ctx.outer.demand.clone(),
        failure_vars: ctx.outer.failure.clone(),
        row_start: parts.row_start,
        row_end: session.num_rows(),
        primal_vars: parts.primal_vars,
    }
}

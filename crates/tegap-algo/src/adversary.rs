//! Adversarial gap search.
//!
//! Given two encoders over a shared topology, find the demand volumes
//! and failure realization that maximize the optimality gap: the flow
//! the benchmark encoder delivers minus the flow the heuristic
//! delivers at the same adversarial input.
//!
//! Two inner methods are available. `Kkt` builds one mixed-integer
//! model in which the heuristic is pinned to its optimum through its
//! KKT conditions; the benchmark needs no pinning because the outer
//! objective already pushes it toward its own optimum. `PrimalDual`
//! avoids integer variables entirely: it walks candidate demand swaps
//! and admissible failure scenarios, keeping a monotone incumbent and
//! stopping when a full pass improves the gap by less than the
//! configured tolerance.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info};

use tegap_core::{
    bounded_down_sets, ConfigError, DemandError, DemandModel, DemandSpec, FailureDomain,
    FailureScenario, k_shortest_paths, Pair, PathSet, Topology,
};

use crate::backend::{default_backend, GoodLpBackend, SolveBackend};
use crate::bilevel::{apply_optimality_conditions, BilevelError};
use crate::encoder::{EncodeError, EncoderContext, FlowEncoder, OuterVars, Solution};
use crate::session::{Cmp, Direction, LinExpr, Session, SolveError, VarId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerMethod {
    /// Single-shot MILP through KKT conditions. Exact, needs a backend
    /// with integer support.
    Kkt,
    /// Iterative primal refinement over candidate inputs. LP-only, may
    /// stop at a local optimum.
    PrimalDual,
}

#[derive(Debug, Clone)]
pub struct AdversaryConfig {
    pub inner_method: InnerMethod,
    /// Minimum gap improvement that keeps the refinement loop going.
    pub tolerance: f64,
    /// Hard cap on refinement passes.
    pub max_iterations: usize,
}

impl Default for AdversaryConfig {
    fn default() -> Self {
        Self {
            inner_method: InnerMethod::Kkt,
            tolerance: 1e-6,
            max_iterations: 50,
        }
    }
}

impl AdversaryConfig {
    pub fn primal_dual() -> Self {
        Self {
            inner_method: InnerMethod::PrimalDual,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum AdversaryError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Solve(#[from] SolveError),

    #[error(transparent)]
    Bilevel(#[from] BilevelError),

    #[error(transparent)]
    Domain(#[from] ConfigError),

    #[error(transparent)]
    Demand(#[from] DemandError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// The adversarial input found and both encoders' behavior at it.
#[derive(Debug, Clone)]
pub struct GapResult {
    pub gap: f64,
    pub optimal: Solution,
    pub heuristic: Solution,
}

/// Gap search over a fixed topology and encoder pair.
pub struct AdversarialGenerator<O, H> {
    topology: Topology,
    optimal: O,
    heuristic: H,
    demand: DemandModel,
    failure: Option<FailureDomain>,
    paths: BTreeMap<Pair, PathSet>,
    path_budget: usize,
    backend: GoodLpBackend,
    last_link_down: Vec<bool>,
}

impl<O: FlowEncoder, H: FlowEncoder> AdversarialGenerator<O, H> {
    pub fn new(topology: Topology, optimal: O, heuristic: H) -> Self {
        Self {
            topology,
            optimal,
            heuristic,
            demand: DemandModel::new(),
            failure: None,
            paths: BTreeMap::new(),
            path_budget: 4,
            backend: default_backend(),
            last_link_down: Vec::new(),
        }
    }

    pub fn with_demand(mut self, demand: DemandModel) -> Self {
        self.demand = demand;
        self
    }

    pub fn with_failure_domain(mut self, domain: FailureDomain) -> Self {
        self.failure = Some(domain);
        self
    }

    /// Explicit candidate paths. Pairs not listed fall back to derived
    /// shortest paths under the current path budget.
    pub fn with_paths(mut self, paths: BTreeMap<Pair, PathSet>) -> Self {
        self.paths = paths;
        self
    }

    /// Number of shortest paths derived per pair when no explicit set
    /// was given.
    pub fn set_path(&mut self, budget: usize) {
        self.path_budget = budget;
    }

    /// Failure flags realized by the last gap search, in canonical edge
    /// order. Empty when no failure domain was configured.
    pub fn link_down_events(&self) -> &[bool] {
        &self.last_link_down
    }

    /// Evaluate the gap at one concrete adversarial input.
    pub fn get_gap(
        &mut self,
        demands: &BTreeMap<Pair, f64>,
        scenario: &FailureScenario,
    ) -> Result<f64, AdversaryError> {
        self.ensure_paths(demands.keys())?;
        match self.eval(demands, scenario)? {
            Some((opt, heur)) => Ok(opt.objective - heur.objective),
            // the refinement loop skips infeasible candidates, but a
            // direct query reports them as the solver failure they are
            None => Err(AdversaryError::Solve(SolveError::Infeasible)),
        }
    }

    /// Find the adversarial input maximizing the optimality gap.
    pub fn maximize_optimality_gap(
        &mut self,
        config: &AdversaryConfig,
    ) -> Result<GapResult, AdversaryError> {
        self.demand.validate()?;
        if self.demand.is_empty() {
            return Err(AdversaryError::Config(
                "demand model has no pairs".to_string(),
            ));
        }
        if let Some(domain) = &self.failure {
            domain.validate(&self.topology)?;
        }
        let pairs: Vec<Pair> = self.demand.pairs.keys().cloned().collect();
        self.ensure_paths(pairs.iter())?;

        let result = match config.inner_method {
            InnerMethod::Kkt => self.solve_kkt()?,
            InnerMethod::PrimalDual => self.solve_primal_dual(config)?,
        };
        info!(
            gap = result.gap,
            method = ?config.inner_method,
            "adversarial gap search complete"
        );
        Ok(result)
    }

    fn ensure_paths<'a>(
        &mut self,
        pairs: impl Iterator<Item = &'a Pair>,
    ) -> Result<(), AdversaryError> {
        for pair in pairs {
            if self.paths.contains_key(pair) {
                continue;
            }
            let derived = k_shortest_paths(&self.topology, &pair.src, &pair.dst, self.path_budget);
            if derived.is_empty() {
                return Err(AdversaryError::Config(format!(
                    "no route exists for pair {pair}"
                )));
            }
            self.paths.insert(pair.clone(), derived);
        }
        Ok(())
    }

    fn total_capacity(&self) -> f64 {
        self.topology
            .links()
            .map(|l| l.capacity)
            .filter(|c| c.is_finite())
            .sum()
    }

    // -- single-shot KKT ---------------------------------------------------

    fn solve_kkt(&mut self) -> Result<GapResult, AdversaryError> {
        if !self.backend.supports_integers() {
            return Err(AdversaryError::Config(format!(
                "KKT reformulation needs integer support, backend {} has none",
                self.backend.id()
            )));
        }

        let mut session = Session::new();
        let demand_vars = self.declare_demand_vars(&mut session);
        let failure_vars = match &self.failure {
            Some(domain) => self.declare_failure_vars(&mut session, domain),
            None => Vec::new(),
        };
        let outer = OuterVars {
            demand: demand_vars,
            failure: failure_vars,
        };
        let none = FailureScenario::none();
        let ctx = EncoderContext::new(&self.topology, &self.paths, &outer, &none);

        let opt_enc = self.optimal.encode(&mut session, &ctx)?;
        let heur_enc = self.heuristic.encode(&mut session, &ctx)?;
        apply_optimality_conditions(&mut session, &heur_enc)?;

        session.set_objective(
            Direction::Maximize,
            opt_enc.objective().clone() - heur_enc.objective().clone(),
        );
        let out = self.backend.solve(&session)?;
        let optimal = opt_enc.decode(&self.topology, &out);
        let heuristic = heur_enc.decode(&self.topology, &out);
        self.last_link_down = heuristic.link_down.clone();
        Ok(GapResult {
            gap: optimal.objective - heuristic.objective,
            optimal,
            heuristic,
        })
    }

    fn declare_demand_vars(&self, session: &mut Session) -> BTreeMap<Pair, VarId> {
        let total = self.total_capacity();
        let mut vars = BTreeMap::new();
        for (pair, spec) in &self.demand.pairs {
            let d = match spec {
                DemandSpec::Fixed(v) => session.add_continuous(*v, *v, &format!("d_{pair}")),
                DemandSpec::Free => session.add_continuous(0.0, total, &format!("d_{pair}")),
                DemandSpec::Discrete(candidates) => {
                    let upper = candidates.iter().cloned().fold(0.0, f64::max);
                    let d = session.add_continuous(0.0, upper, &format!("d_{pair}"));
                    // selection binaries: d equals exactly one candidate
                    let mut pick_one = LinExpr::constant(-1.0);
                    let mut value = LinExpr::term(d, -1.0);
                    for (i, &v) in candidates.iter().enumerate() {
                        let sel = session.add_binary(&format!("sel_{pair}_{i}"));
                        pick_one.add_term(sel, 1.0);
                        value.add_term(sel, v);
                    }
                    session.add_constraint(pick_one, Cmp::Eq);
                    session.add_constraint(value, Cmp::Eq);
                    d
                }
            };
            vars.insert(pair.clone(), d);
        }
        vars
    }

    fn declare_failure_vars(&self, session: &mut Session, domain: &FailureDomain) -> Vec<VarId> {
        let links: Vec<_> = self
            .topology
            .links()
            .map(|l| (l.src.clone(), l.dst.clone()))
            .collect();
        let flags: Vec<VarId> = links
            .iter()
            .map(|(s, d)| session.add_binary(&format!("fail_{s}.{d}")))
            .collect();

        let mut count = LinExpr::zero();
        for &f in &flags {
            count.add_term(f, 1.0);
        }
        if let Some(k) = domain.max_failures {
            session.add_constraint(count.clone() - k as f64, Cmp::Le);
        }
        if let Some(k) = domain.exact_failures {
            session.add_constraint(count.clone() - k as f64, Cmp::Eq);
        }

        if let Some(t) = domain.failure_prob_threshold {
            let mut weighted = LinExpr::constant(-t);
            for ((src, dst), &f) in links.iter().zip(&flags) {
                let p = domain
                    .edge_probability
                    .get(&(src.clone(), dst.clone()))
                    .copied()
                    .unwrap_or(0.0);
                weighted.add_term(f, p);
            }
            session.add_constraint(weighted, Cmp::Le);
        }

        if let Some(t) = domain.scenario_prob_threshold {
            // joint probability in log space: sum of ln p over down
            // edges plus ln (1 - p) over up edges must reach ln t
            let mut log_joint = LinExpr::constant(-t.ln());
            for ((src, dst), &f) in links.iter().zip(&flags) {
                match domain.edge_probability.get(&(src.clone(), dst.clone())) {
                    Some(&p) => {
                        log_joint.add_term(f, p.ln() - (1.0 - p).ln());
                        log_joint.constant += (1.0 - p).ln();
                    }
                    // zero-probability edges can never be down
                    None => {
                        session.add_constraint(LinExpr::from(f), Cmp::Le);
                    }
                }
            }
            session.add_constraint(log_joint, Cmp::Ge);
        }

        flags
    }

    // -- iterative primal refinement ---------------------------------------

    fn solve_primal_dual(&mut self, config: &AdversaryConfig) -> Result<GapResult, AdversaryError> {
        let candidates = self.demand_candidates();
        let scenarios = self.admissible_scenarios()?;
        if scenarios.is_empty() {
            return Err(AdversaryError::Config(
                "failure domain admits no scenario".to_string(),
            ));
        }

        // start aggressive: every pair at its largest candidate
        let mut demands: BTreeMap<Pair, f64> = candidates
            .iter()
            .map(|(p, c)| (p.clone(), c.last().copied().unwrap_or(0.0)))
            .collect();
        let mut scenario = scenarios[0].clone();

        let mut incumbent: Option<(f64, Solution, Solution)> = self
            .eval(&demands, &scenario)?
            .map(|(o, h)| (o.objective - h.objective, o, h));

        for iteration in 0..config.max_iterations {
            let current_gap = incumbent.as_ref().map(|(g, _, _)| *g);
            let mut improved = false;

            // best single-pair demand swap
            let mut best_move: Option<(Pair, f64, f64, Solution, Solution)> = None;
            for (pair, values) in &candidates {
                for &v in values {
                    if demands.get(pair) == Some(&v) {
                        continue;
                    }
                    let mut trial = demands.clone();
                    trial.insert(pair.clone(), v);
                    if let Some((o, h)) = self.eval(&trial, &scenario)? {
                        let gap = o.objective - h.objective;
                        if best_move.as_ref().map_or(true, |(_, _, g, _, _)| gap > *g) {
                            best_move = Some((pair.clone(), v, gap, o, h));
                        }
                    }
                }
            }
            if let Some((pair, v, gap, o, h)) = best_move {
                if current_gap.map_or(true, |g| gap > g + config.tolerance) {
                    demands.insert(pair, v);
                    incumbent = Some((gap, o, h));
                    improved = true;
                }
            }

            // first scenario, in heuristic-loading order, that improves
            let baseline = incumbent.as_ref().map(|(g, _, _)| *g);
            for candidate in self.rank_scenarios(&scenarios, incumbent.as_ref().map(|(_, _, h)| h))
            {
                if candidate == scenario {
                    continue;
                }
                if let Some((o, h)) = self.eval(&demands, &candidate)? {
                    let gap = o.objective - h.objective;
                    if baseline.map_or(true, |g| gap > g + config.tolerance) {
                        scenario = candidate;
                        incumbent = Some((gap, o, h));
                        improved = true;
                        break;
                    }
                }
            }

            debug!(
                iteration,
                gap = incumbent.as_ref().map(|(g, _, _)| *g),
                "refinement pass"
            );
            if !improved {
                break;
            }
        }

        let (gap, optimal, heuristic) = incumbent.ok_or_else(|| {
            AdversaryError::Config(
                "heuristic encoding is infeasible at every candidate input".to_string(),
            )
        })?;
        self.last_link_down = self
            .topology
            .links()
            .map(|l| scenario.is_edge_down(&l.src, &l.dst))
            .collect();
        Ok(GapResult {
            gap,
            optimal,
            heuristic,
        })
    }

    fn demand_candidates(&self) -> BTreeMap<Pair, Vec<f64>> {
        let total = self.total_capacity();
        self.demand
            .pairs
            .iter()
            .map(|(pair, spec)| {
                let values = match spec {
                    DemandSpec::Fixed(v) => vec![*v],
                    DemandSpec::Discrete(c) => {
                        let mut sorted = c.clone();
                        sorted.sort_by(|a, b| a.total_cmp(b));
                        sorted.dedup();
                        sorted
                    }
                    // fixed grid over [0, total]; refinement picks among
                    // these, trading exactness for LP-only solves
                    DemandSpec::Free => (0..=4).map(|i| total * i as f64 / 4.0).collect(),
                };
                (pair.clone(), values)
            })
            .collect()
    }

    /// All scenarios the failure domain admits, bounded by its
    /// cardinality. No domain means the all-up scenario only.
    fn admissible_scenarios(&self) -> Result<Vec<FailureScenario>, AdversaryError> {
        let Some(domain) = &self.failure else {
            return Ok(vec![FailureScenario::none()]);
        };
        let Some(bound) = domain.cardinality() else {
            return Err(AdversaryError::Config(
                "primal-dual refinement needs a failure cardinality bound".to_string(),
            ));
        };
        let mut out = Vec::new();
        for combo in bounded_down_sets(&self.topology, bound) {
            let mut scenario = FailureScenario::none();
            for (src, dst) in &combo {
                scenario.fail_edge(src, dst);
            }
            if domain.admits(&self.topology, &scenario) {
                out.push(scenario);
            }
        }
        Ok(out)
    }

    /// Order scenarios by the heuristic load they knock out, heaviest
    /// first.
    fn rank_scenarios(
        &self,
        scenarios: &[FailureScenario],
        heuristic: Option<&Solution>,
    ) -> Vec<FailureScenario> {
        let mut ranked: Vec<(f64, FailureScenario)> = scenarios
            .iter()
            .map(|s| {
                let load = heuristic
                    .map(|sol| {
                        sol.edge_flows
                            .iter()
                            .filter(|((src, dst), _)| s.is_edge_down(src, dst))
                            .map(|(_, &f)| f)
                            .sum()
                    })
                    .unwrap_or(0.0);
                (load, s.clone())
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        ranked.into_iter().map(|(_, s)| s).collect()
    }

    /// Solve both encoders at a pinned input. `None` when the heuristic
    /// is infeasible there (for example pinning onto a failed path).
    fn eval(
        &self,
        demands: &BTreeMap<Pair, f64>,
        scenario: &FailureScenario,
    ) -> Result<Option<(Solution, Solution)>, AdversaryError> {
        let optimal = self.eval_one(&self.optimal, demands, scenario)?;
        let Some(optimal) = optimal else {
            return Err(AdversaryError::Config(
                "benchmark encoding is infeasible; check demand and path configuration"
                    .to_string(),
            ));
        };
        let heuristic = self.eval_one(&self.heuristic, demands, scenario)?;
        Ok(heuristic.map(|h| (optimal, h)))
    }

    fn eval_one<E: FlowEncoder>(
        &self,
        encoder: &E,
        demands: &BTreeMap<Pair, f64>,
        scenario: &FailureScenario,
    ) -> Result<Option<Solution>, AdversaryError> {
        let mut session = Session::new();
        let outer = OuterVars::fixed(&mut session, demands);
        let ctx = EncoderContext::new(&self.topology, &self.paths, &outer, scenario)
            .with_fixed_demands(demands);
        let encoding = encoder.encode(&mut session, &ctx)?;
        session.set_objective(Direction::Maximize, encoding.objective().clone());
        match self.backend.solve(&session) {
            Ok(out) => Ok(Some(encoding.decode(&self.topology, &out))),
            Err(SolveError::Infeasible) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{DemandPinningEncoder, OptimalFlowEncoder, PopEncoder};
    use tegap_core::{approx_eq, Path};

    fn diamond() -> Topology {
        let mut t = Topology::new();
        for n in ["a", "b", "c", "d"] {
            t.add_node(n).unwrap();
        }
        t.add_edge("a", "b", 10.0).unwrap();
        t.add_edge("a", "c", 10.0).unwrap();
        t.add_edge("b", "d", 10.0).unwrap();
        t.add_edge("c", "d", 10.0).unwrap();
        t
    }

    /// Diamond with a widened a-b link.
    fn wide_diamond() -> Topology {
        let mut t = Topology::new();
        for n in ["a", "b", "c", "d"] {
            t.add_node(n).unwrap();
        }
        t.add_edge("a", "b", 20.0).unwrap();
        t.add_edge("a", "c", 10.0).unwrap();
        t.add_edge("b", "d", 10.0).unwrap();
        t.add_edge("c", "d", 10.0).unwrap();
        t
    }

    fn diamond_paths(pairs: &[Pair]) -> BTreeMap<Pair, PathSet> {
        pairs
            .iter()
            .map(|pair| {
                let set = if pair.src == "a" && pair.dst == "d" {
                    vec![Path::new(["a", "b", "d"]), Path::new(["a", "c", "d"])]
                } else {
                    vec![Path::new([pair.src.as_str(), pair.dst.as_str()])]
                };
                (pair.clone(), set)
            })
            .collect()
    }

    fn all_pairs() -> Vec<Pair> {
        vec![
            Pair::new("a", "b"),
            Pair::new("a", "c"),
            Pair::new("b", "d"),
            Pair::new("c", "d"),
            Pair::new("a", "d"),
        ]
    }

    #[test]
    fn test_get_gap_at_fixed_input() {
        let pairs = all_pairs();
        let mut gen = AdversarialGenerator::new(
            diamond(),
            OptimalFlowEncoder::new(),
            DemandPinningEncoder::new(5.0),
        )
        .with_paths(diamond_paths(&pairs));
        let demands: BTreeMap<Pair, f64> = pairs.iter().map(|p| (p.clone(), 10.0)).collect();
        let gap = gen
            .get_gap(&demands, &FailureScenario::none())
            .unwrap();
        // pinning a->d onto a-b-d starves a->b and b->d: 30 against 40
        assert!(approx_eq(gap, 10.0), "gap {gap}");
    }

    fn discrete_pinning_generator(
    ) -> AdversarialGenerator<OptimalFlowEncoder, DemandPinningEncoder> {
        let pairs = vec![Pair::new("a", "b"), Pair::new("b", "d"), Pair::new("a", "d")];
        let mut demand = DemandModel::new();
        for pair in &pairs {
            demand.set(pair.clone(), DemandSpec::Discrete(vec![0.0, 10.0]));
        }
        AdversarialGenerator::new(
            diamond(),
            OptimalFlowEncoder::new(),
            DemandPinningEncoder::new(5.0),
        )
        .with_demand(demand)
        .with_paths(diamond_paths(&pairs))
    }

    #[test]
    fn test_get_gap_surfaces_heuristic_infeasibility() {
        // a pinned volume larger than its path can carry is a solver
        // infeasibility, not a configuration mistake
        let pair = Pair::new("a", "d");
        let mut gen = AdversarialGenerator::new(
            diamond(),
            OptimalFlowEncoder::new(),
            DemandPinningEncoder::new(5.0),
        )
        .with_paths(diamond_paths(&[pair.clone()]));
        let demands = BTreeMap::from([(pair, 15.0)]);
        let err = gen.get_gap(&demands, &FailureScenario::none()).unwrap_err();
        assert!(matches!(err, AdversaryError::Solve(SolveError::Infeasible)));
    }

    #[test]
    fn test_primal_dual_discrete_demand_search() {
        let mut gen = discrete_pinning_generator();
        let result = gen
            .maximize_optimality_gap(&AdversaryConfig::primal_dual())
            .unwrap();
        // worst case loads all three pairs: the optimum reroutes a->d
        // over a-c-d for 30 while pinning delivers only the 10 of a->d
        assert!(approx_eq(result.gap, 20.0), "gap {}", result.gap);
        assert!(approx_eq(result.optimal.objective, 30.0));
        assert!(approx_eq(result.heuristic.objective, 10.0));
        assert!(approx_eq(result.heuristic.demands[&Pair::new("a", "d")], 10.0));
    }

    #[cfg(feature = "solver-highs")]
    #[test]
    fn test_kkt_matches_primal_dual() {
        let mut gen = discrete_pinning_generator();
        let kkt = gen
            .maximize_optimality_gap(&AdversaryConfig::default())
            .unwrap();
        let iterative = gen
            .maximize_optimality_gap(&AdversaryConfig::primal_dual())
            .unwrap();
        assert!(approx_eq(kkt.gap, 20.0), "kkt gap {}", kkt.gap);
        assert!(approx_eq(kkt.gap, iterative.gap));
    }

    fn pop_generator_with_domain(
        domain: FailureDomain,
    ) -> AdversarialGenerator<OptimalFlowEncoder, PopEncoder> {
        let pairs = all_pairs();
        let assignment = BTreeMap::from([
            (Pair::new("a", "b"), 0),
            (Pair::new("b", "d"), 0),
            (Pair::new("a", "d"), 0),
            (Pair::new("a", "c"), 1),
            (Pair::new("c", "d"), 1),
        ]);
        let mut paths = diamond_paths(&pairs);
        paths.insert(Pair::new("a", "d"), vec![Path::new(["a", "b", "d"])]);
        let mut demand = DemandModel::new();
        for pair in &pairs {
            let v = if pair == &Pair::new("a", "b") { 20.0 } else { 10.0 };
            demand.set(pair.clone(), DemandSpec::Fixed(v));
        }
        AdversarialGenerator::new(
            wide_diamond(),
            OptimalFlowEncoder::new(),
            PopEncoder::new(2, assignment),
        )
        .with_demand(demand)
        .with_paths(paths)
        .with_failure_domain(domain)
    }

    fn pop_failure_generator(
        threshold: f64,
    ) -> AdversarialGenerator<OptimalFlowEncoder, PopEncoder> {
        pop_generator_with_domain(
            FailureDomain::exactly(1)
                .with_edge_probability("a", "b", 0.01)
                .with_edge_probability("a", "c", 0.3)
                .with_edge_probability("b", "d", 0.3)
                .with_edge_probability("c", "d", 0.3)
                .with_failure_prob_threshold(threshold),
        )
    }

    #[test]
    fn test_failure_search_finds_worst_admissible_link() {
        let mut gen = pop_failure_generator(0.5);
        let result = gen
            .maximize_optimality_gap(&AdversaryConfig::primal_dual())
            .unwrap();
        // any failure outside a-b strands half a partition for a 20 gap
        assert!(approx_eq(result.gap, 20.0), "gap {}", result.gap);
        assert_eq!(gen.link_down_events().iter().filter(|d| **d).count(), 1);
    }

    #[cfg(feature = "solver-highs")]
    #[test]
    fn test_kkt_failure_search_matches_primal_dual() {
        let mut kkt_gen = pop_failure_generator(0.5);
        let mut pd_gen = pop_failure_generator(0.5);
        let kkt = kkt_gen
            .maximize_optimality_gap(&AdversaryConfig::default())
            .unwrap();
        let iterative = pd_gen
            .maximize_optimality_gap(&AdversaryConfig::primal_dual())
            .unwrap();
        assert!(approx_eq(kkt.gap, 20.0), "kkt gap {}", kkt.gap);
        assert!(approx_eq(kkt.gap, iterative.gap));
        // the exactly-one cardinality row binds in the MILP too
        assert_eq!(kkt_gen.link_down_events().iter().filter(|d| **d).count(), 1);
    }

    #[cfg(feature = "solver-highs")]
    #[test]
    fn test_kkt_joint_probability_excludes_rare_failures() {
        // the damaging failures all have joint probability ~0.005 and
        // fall below the bar; failing a-b is the only admissible choice
        let mut gen = pop_generator_with_domain(
            FailureDomain::exactly(1)
                .with_edge_probability("a", "b", 0.5)
                .with_edge_probability("a", "c", 0.01)
                .with_edge_probability("b", "d", 0.01)
                .with_edge_probability("c", "d", 0.01)
                .with_scenario_prob_threshold(0.1),
        );
        let result = gen
            .maximize_optimality_gap(&AdversaryConfig::default())
            .unwrap();
        assert!(approx_eq(result.gap, 15.0), "gap {}", result.gap);

        let topo = wide_diamond();
        let down: Vec<(&str, &str)> = topo
            .links()
            .zip(gen.link_down_events())
            .filter(|(_, d)| **d)
            .map(|(l, _)| (l.src.as_str(), l.dst.as_str()))
            .collect();
        assert_eq!(down, vec![("a", "b")]);
    }

    #[test]
    fn test_tighter_threshold_cannot_increase_gap() {
        let mut loose = pop_failure_generator(0.5);
        let mut tight = pop_failure_generator(0.05);
        let loose_gap = loose
            .maximize_optimality_gap(&AdversaryConfig::primal_dual())
            .unwrap()
            .gap;
        let tight_gap = tight
            .maximize_optimality_gap(&AdversaryConfig::primal_dual())
            .unwrap()
            .gap;
        // only the unlikely a-b failure stays admissible at 0.05
        assert!(approx_eq(loose_gap, 20.0), "loose {loose_gap}");
        assert!(approx_eq(tight_gap, 15.0), "tight {tight_gap}");
        assert!(tight_gap <= loose_gap + 1e-9);

        let topo = wide_diamond();
        let down: Vec<(&str, &str)> = topo
            .links()
            .zip(tight.link_down_events())
            .filter(|(_, d)| **d)
            .map(|(l, _)| (l.src.as_str(), l.dst.as_str()))
            .collect();
        assert_eq!(down, vec![("a", "b")]);
    }

    #[test]
    fn test_no_admissible_scenario_rejected() {
        let mut gen = pop_failure_generator(0.005);
        assert!(matches!(
            gen.maximize_optimality_gap(&AdversaryConfig::primal_dual()),
            Err(AdversaryError::Config(_))
        ));
    }

    #[test]
    fn test_empty_demand_rejected() {
        let mut gen = AdversarialGenerator::new(
            diamond(),
            OptimalFlowEncoder::new(),
            DemandPinningEncoder::new(5.0),
        );
        assert!(matches!(
            gen.maximize_optimality_gap(&AdversaryConfig::primal_dual()),
            Err(AdversaryError::Config(_))
        ));
    }

    #[test]
    fn test_paths_derived_when_not_supplied() {
        let pair = Pair::new("a", "d");
        let mut gen = AdversarialGenerator::new(
            diamond(),
            OptimalFlowEncoder::new(),
            OptimalFlowEncoder::new(),
        )
        .with_demand(DemandModel::fixed([(pair.clone(), 10.0)]));
        gen.set_path(2);
        let result = gen
            .maximize_optimality_gap(&AdversaryConfig::primal_dual())
            .unwrap();
        // identical encoders never disagree
        assert!(approx_eq(result.gap, 0.0));
        assert!(approx_eq(result.optimal.objective, 10.0));
    }
}

//! Demand-pinning heuristic.
//!
//! Pairs whose volume exceeds a threshold are pinned: the whole volume
//! must ride the pair's designated path, and the alternatives are shut.
//! Small volumes route freely. The pin restricts route choice, so it
//! only applies to pairs with at least two candidate paths; a pair with
//! a single route has nothing to choose and delivers best effort.
//! Pinning large flows keeps routing tables small in practice but
//! wastes capacity that a splitting optimum would use, which is exactly
//! the slack an adversary hunts for.

use std::collections::BTreeMap;

use tegap_core::Pair;

use crate::session::{Cmp, LinExpr, Session};

use super::{
    add_capacity_rows, add_delivery_rows, declare_flow_vars, finish_encoding, total_flow,
    EncodeError, EncoderContext, Encoding, EncodingParts, FlowEncoder,
};

#[derive(Debug, Clone, Default)]
pub struct DemandPinningEncoder {
    /// Volumes strictly above this are pinned.
    pub threshold: f64,
    /// Designated path index per pair; pairs not listed pin to their
    /// first candidate path.
    pub pinned: BTreeMap<Pair, usize>,
}

impl DemandPinningEncoder {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            pinned: BTreeMap::new(),
        }
    }

    pub fn with_pinned_path(mut self, pair: Pair, path_index: usize) -> Self {
        self.pinned.insert(pair, path_index);
        self
    }

    fn pinned_index(&self, pair: &Pair) -> usize {
        self.pinned.get(pair).copied().unwrap_or(0)
    }
}

impl FlowEncoder for DemandPinningEncoder {
    fn name(&self) -> &'static str {
        "demand-pinning"
    }

    fn encode(
        &self,
        session: &mut Session,
        ctx: &EncoderContext<'_>,
    ) -> Result<Encoding, EncodeError> {
        if self.threshold < 0.0 || self.threshold.is_nan() {
            return Err(EncodeError::Config(format!(
                "pinning threshold {} must be nonnegative",
                self.threshold
            )));
        }

        let flow_vars = declare_flow_vars(session, ctx)?;
        for (pair, vars) in &flow_vars {
            let idx = self.pinned_index(pair);
            if idx >= vars.len() {
                return Err(EncodeError::Config(format!(
                    "pinned path index {idx} out of range for pair {pair}"
                )));
            }
        }

        let row_start = session.num_rows();
        add_capacity_rows(session, ctx, &flow_vars, 1.0);
        add_delivery_rows(session, ctx, &flow_vars, false);

        for (pair, vars) in &flow_vars {
            // a single candidate path leaves no routing choice to pin
            if vars.len() < 2 {
                continue;
            }
            let demand = ctx.outer.demand[pair];
            let pinned = vars[self.pinned_index(pair)];
            match ctx.fixed_demands {
                Some(values) => {
                    // Volume is known; gate statically, no binaries.
                    if values.get(pair).copied().unwrap_or(0.0) > self.threshold {
                        for &v in vars {
                            if v != pinned {
                                session.add_constraint(LinExpr::from(v), Cmp::Le);
                            }
                        }
                        session.add_constraint(
                            LinExpr::from(demand) - LinExpr::from(pinned),
                            Cmp::Le,
                        );
                    }
                }
                None => {
                    // z = 1 exactly when the volume exceeds the threshold
                    // (at d == threshold the solver may pick either side).
                    let z = session.add_binary(&format!("pin_{pair}"));
                    session.add_indicator(
                        z,
                        false,
                        LinExpr::from(demand) - self.threshold,
                        Cmp::Le,
                    );
                    session.add_indicator(
                        z,
                        true,
                        LinExpr::from(demand) - self.threshold,
                        Cmp::Ge,
                    );
                    for &v in vars {
                        if v != pinned {
                            session.add_indicator(z, true, LinExpr::from(v), Cmp::Le);
                        }
                    }
                    session.add_indicator(
                        z,
                        true,
                        LinExpr::from(demand) - LinExpr::from(pinned),
                        Cmp::Le,
                    );
                }
            }
        }

        let primal_vars = flow_vars.values().flatten().copied().collect();
        Ok(finish_encoding(
            session,
            ctx,
            EncodingParts {
                objective: total_flow(&flow_vars),
                flow_vars,
                row_start,
                primal_vars,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_backend, SolveBackend};
    use crate::encoder::OuterVars;
    use crate::session::Direction;
    use tegap_core::{approx_eq, FailureScenario, Path, Topology};

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

    fn diamond_paths(demands: &BTreeMap<Pair, f64>) -> BTreeMap<Pair, Vec<Path>> {
        let mut paths = BTreeMap::new();
        for pair in demands.keys() {
            let set = if pair.src == "a" && pair.dst == "d" {
                vec![Path::new(["a", "b", "d"]), Path::new(["a", "c", "d"])]
            } else {
                vec![Path::new([pair.src.as_str(), pair.dst.as_str()])]
            };
            paths.insert(pair.clone(), set);
        }
        paths
    }

    fn solve_pinned(topo: &Topology, demands: &BTreeMap<Pair, f64>, threshold: f64) -> f64 {
        let paths = diamond_paths(demands);
        let mut session = Session::new();
        let outer = OuterVars::fixed(&mut session, demands);
        let none = FailureScenario::none();
        let ctx = EncoderContext::new(topo, &paths, &outer, &none).with_fixed_demands(demands);
        let enc = DemandPinningEncoder::new(threshold)
            .encode(&mut session, &ctx)
            .unwrap();
        session.set_objective(Direction::Maximize, enc.objective().clone());
        let out = default_backend().solve(&session).unwrap();
        enc.decode(topo, &out).objective
    }

    #[test]
    fn test_small_volume_routes_freely() {
        let topo = diamond();
        let demands = BTreeMap::from([(Pair::new("a", "d"), 4.0)]);
        assert!(approx_eq(solve_pinned(&topo, &demands, 5.0), 4.0));
    }

    #[test]
    fn test_pinned_volume_displaces_one_hop_traffic() {
        let topo = diamond();
        // a->d is pinned onto a-b-d and starves a->b entirely
        let demands = BTreeMap::from([
            (Pair::new("a", "d"), 10.0),
            (Pair::new("a", "b"), 10.0),
        ]);
        assert!(approx_eq(solve_pinned(&topo, &demands, 5.0), 10.0));
    }

    #[test]
    fn test_saturated_diamond_loses_ten() {
        let topo = diamond();
        let demands = BTreeMap::from([
            (Pair::new("a", "b"), 10.0),
            (Pair::new("a", "c"), 10.0),
            (Pair::new("b", "d"), 10.0),
            (Pair::new("c", "d"), 10.0),
            (Pair::new("a", "d"), 10.0),
        ]);
        // pinned a->d claims a-b-d, so a->b and b->d deliver nothing:
        // 10 (a->d) + 10 (a->c) + 10 (c->d) against the optimum's 40
        assert!(approx_eq(solve_pinned(&topo, &demands, 5.0), 30.0));
    }

    #[test]
    fn test_competing_pins_stay_feasible() {
        // a->d's forced delivery claims all of edge a-b; the one-path
        // a->b pair must yield instead of making the model infeasible
        let topo = diamond();
        let demands = BTreeMap::from([
            (Pair::new("a", "d"), 10.0),
            (Pair::new("a", "b"), 10.0),
        ]);
        let paths = diamond_paths(&demands);
        let mut session = Session::new();
        let outer = OuterVars::fixed(&mut session, &demands);
        let none = FailureScenario::none();
        let ctx = EncoderContext::new(&topo, &paths, &outer, &none).with_fixed_demands(&demands);
        let enc = DemandPinningEncoder::new(5.0)
            .encode(&mut session, &ctx)
            .unwrap();
        session.set_objective(Direction::Maximize, enc.objective().clone());
        let out = default_backend().solve(&session).unwrap();
        let sol = enc.decode(&topo, &out);
        assert!(approx_eq(sol.objective, 10.0), "delivered {}", sol.objective);
        assert!(approx_eq(sol.path_flows[&Pair::new("a", "d")][0], 10.0));
        assert!(approx_eq(sol.path_flows[&Pair::new("a", "b")][0], 0.0));
    }

    #[test]
    fn test_out_of_range_pinned_index_rejected() {
        let topo = diamond();
        let demands = BTreeMap::from([(Pair::new("a", "d"), 10.0)]);
        let paths = diamond_paths(&demands);
        let mut session = Session::new();
        let outer = OuterVars::fixed(&mut session, &demands);
        let none = FailureScenario::none();
        let ctx = EncoderContext::new(&topo, &paths, &outer, &none).with_fixed_demands(&demands);
        let enc = DemandPinningEncoder::new(5.0)
            .with_pinned_path(Pair::new("a", "d"), 7)
            .encode(&mut session, &ctx);
        assert!(matches!(enc, Err(EncodeError::Config(_))));
    }

    #[cfg(feature = "solver-highs")]
    #[test]
    fn test_adversarial_demand_variable_gating() {
        // With the volume itself a [0, 10] decision variable and the
        // objective pushing it down through the pinned-path bottleneck,
        // the gate must still link z to the threshold correctly.
        let topo = diamond();
        let pair = Pair::new("a", "d");
        let paths = BTreeMap::from([(
            pair.clone(),
            vec![Path::new(["a", "b", "d"]), Path::new(["a", "c", "d"])],
        )]);
        let mut session = Session::new();
        let d = session.add_continuous(0.0, 10.0, "d_ad");
        let outer = OuterVars {
            demand: BTreeMap::from([(pair.clone(), d)]),
            failure: Vec::new(),
        };
        let none = FailureScenario::none();
        let ctx = EncoderContext::new(&topo, &paths, &outer, &none);
        let enc = DemandPinningEncoder::new(5.0)
            .encode(&mut session, &ctx)
            .unwrap();
        // maximize delivered flow plus a bonus for large demand: the
        // solver should take d = 10 and still deliver all of it pinned
        session.set_objective(
            Direction::Maximize,
            enc.objective().clone() + LinExpr::term(d, 0.1),
        );
        let out = default_backend().solve(&session).unwrap();
        let sol = enc.decode(&topo, &out);
        assert!(approx_eq(sol.demands[&pair], 10.0));
        assert!(approx_eq(sol.objective, 10.0));
        // everything rides the pinned first path
        assert!(approx_eq(sol.path_flows[&pair][0], 10.0));
        assert!(approx_eq(sol.path_flows[&pair][1], 0.0));
    }
}

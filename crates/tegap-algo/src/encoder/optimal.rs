//! Optimal multi-commodity flow over the candidate path sets.

use crate::session::Session;

use super::{
    add_capacity_rows, add_delivery_rows, declare_flow_vars, finish_encoding, total_flow,
    EncodeError, EncoderContext, Encoding, EncodingParts, FlowEncoder,
};

/// Maximize total delivered flow subject to capacity and per-pair
/// delivery rows. The benchmark every heuristic is measured against.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimalFlowEncoder {
    /// Require every pair's demand to be met exactly rather than at
    /// most. Turns shortfall into infeasibility.
    pub exact_delivery: bool,
}

impl OptimalFlowEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowEncoder for OptimalFlowEncoder {
    fn name(&self) -> &'static str {
        "optimal"
    }

    fn encode(
        &self,
        session: &mut Session,
        ctx: &EncoderContext<'_>,
    ) -> Result<Encoding, EncodeError> {
        let flow_vars = declare_flow_vars(session, ctx)?;
        let row_start = session.num_rows();
        add_capacity_rows(session, ctx, &flow_vars, 1.0);
        add_delivery_rows(session, ctx, &flow_vars, self.exact_delivery);
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
    use std::collections::BTreeMap;
    use tegap_core::{approx_eq, k_shortest_paths, FailureScenario, Pair, Topology};

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

    fn paths_for(topo: &Topology, demands: &BTreeMap<Pair, f64>) -> BTreeMap<Pair, Vec<tegap_core::Path>> {
        demands
            .keys()
            .map(|p| (p.clone(), k_shortest_paths(topo, &p.src, &p.dst, 4)))
            .collect()
    }

    fn solve_fixed(topo: &Topology, demands: &BTreeMap<Pair, f64>) -> f64 {
        let paths = paths_for(topo, demands);
        let mut session = Session::new();
        let outer = OuterVars::fixed(&mut session, demands);
        let none = FailureScenario::none();
        let ctx = EncoderContext::new(topo, &paths, &outer, &none).with_fixed_demands(demands);
        let enc = OptimalFlowEncoder::new().encode(&mut session, &ctx).unwrap();
        session.set_objective(Direction::Maximize, enc.objective().clone());
        let out = default_backend().solve(&session).unwrap();
        enc.decode(topo, &out).objective
    }

    #[test]
    fn test_splits_across_parallel_paths() {
        let topo = diamond();
        let demands = BTreeMap::from([
            (Pair::new("a", "d"), 10.0),
            (Pair::new("b", "d"), 5.0),
            (Pair::new("a", "c"), 5.0),
        ]);
        // a->d splits 5/5 over a-b-d and a-c-d around the other pairs
        assert!(approx_eq(solve_fixed(&topo, &demands), 20.0));
    }

    #[test]
    fn test_saturates_all_links() {
        let topo = diamond();
        let demands = BTreeMap::from([
            (Pair::new("a", "b"), 10.0),
            (Pair::new("a", "c"), 10.0),
            (Pair::new("b", "d"), 10.0),
            (Pair::new("c", "d"), 10.0),
            (Pair::new("a", "d"), 10.0),
        ]);
        // one-hop pairs fill every link; nothing is left for a->d
        assert!(approx_eq(solve_fixed(&topo, &demands), 40.0));
    }

    #[test]
    fn test_respects_failure_scenario() {
        let topo = diamond();
        let demands = BTreeMap::from([(Pair::new("a", "d"), 10.0)]);
        let paths = paths_for(&topo, &demands);
        let mut session = Session::new();
        let outer = OuterVars::fixed(&mut session, &demands);
        let mut scenario = FailureScenario::none();
        scenario.fail_edge("b", "d");
        let ctx =
            EncoderContext::new(&topo, &paths, &outer, &scenario).with_fixed_demands(&demands);
        let enc = OptimalFlowEncoder::new().encode(&mut session, &ctx).unwrap();
        session.set_objective(Direction::Maximize, enc.objective().clone());
        let out = default_backend().solve(&session).unwrap();
        let sol = enc.decode(&topo, &out);
        // only a-c-d survives
        assert!(approx_eq(sol.objective, 10.0));
        assert!(approx_eq(sol.edge_flows[&("b".into(), "d".into())], 0.0));
    }

    #[test]
    fn test_missing_paths_rejected() {
        let topo = diamond();
        let demands = BTreeMap::from([(Pair::new("d", "a"), 1.0)]);
        let paths = paths_for(&topo, &demands); // no d->a route exists
        let mut session = Session::new();
        let outer = OuterVars::fixed(&mut session, &demands);
        let none = FailureScenario::none();
        let ctx = EncoderContext::new(&topo, &paths, &outer, &none);
        assert!(matches!(
            OptimalFlowEncoder::new().encode(&mut session, &ctx),
            Err(EncodeError::MissingPaths(_))
        ));
    }

    #[test]
    fn test_utilization_report() {
        let topo = diamond();
        let demands = BTreeMap::from([(Pair::new("a", "b"), 5.0)]);
        let paths = paths_for(&topo, &demands);
        let mut session = Session::new();
        let outer = OuterVars::fixed(&mut session, &demands);
        let none = FailureScenario::none();
        let ctx = EncoderContext::new(&topo, &paths, &outer, &none);
        let enc = OptimalFlowEncoder::new().encode(&mut session, &ctx).unwrap();
        session.set_objective(Direction::Maximize, enc.objective().clone());
        let out = default_backend().solve(&session).unwrap();
        let util = enc.decode(&topo, &out).utilization(&topo);
        assert!(approx_eq(util[&("a".into(), "b".into())], 0.5));
        assert!(approx_eq(util[&("c".into(), "d".into())], 0.0));
    }
}

//! Partitioned optimization heuristic.
//!
//! Demand pairs are split into `n` groups and each group is routed
//! against a private copy of the network with every capacity scaled by
//! `1/n`. Groups never see each other, so the formulation decomposes,
//! at the price of stranding capacity a group cannot use even when its
//! neighbors are idle.

use std::collections::BTreeMap;

use tegap_core::Pair;

use crate::session::{Cmp, Session};

use super::{
    add_delivery_rows, declare_flow_vars, edge_load, finish_encoding, total_flow, EncodeError,
    EncoderContext, Encoding, EncodingParts, FlowEncoder,
};

#[derive(Debug, Clone, Default)]
pub struct PopEncoder {
    pub num_partitions: usize,
    /// Partition index per demand pair; every pair must be assigned.
    pub assignment: BTreeMap<Pair, usize>,
}

impl PopEncoder {
    pub fn new(num_partitions: usize, assignment: BTreeMap<Pair, usize>) -> Self {
        Self {
            num_partitions,
            assignment,
        }
    }
}

impl FlowEncoder for PopEncoder {
    fn name(&self) -> &'static str {
        "pop"
    }

    fn encode(
        &self,
        session: &mut Session,
        ctx: &EncoderContext<'_>,
    ) -> Result<Encoding, EncodeError> {
        if self.num_partitions == 0 {
            return Err(EncodeError::Config(
                "partition count must be at least 1".to_string(),
            ));
        }
        for pair in ctx.outer.demand.keys() {
            match self.assignment.get(pair) {
                None => {
                    return Err(EncodeError::Config(format!(
                        "pair {pair} has no partition assignment"
                    )))
                }
                Some(&idx) if idx >= self.num_partitions => {
                    return Err(EncodeError::Config(format!(
                        "pair {pair} assigned to partition {idx} of {}",
                        self.num_partitions
                    )))
                }
                Some(_) => {}
            }
        }

        let flow_vars = declare_flow_vars(session, ctx)?;
        let row_start = session.num_rows();

        // Each partition sees 1/n of every link.
        let share = 1.0 / self.num_partitions as f64;
        for partition in 0..self.num_partitions {
            for link in ctx.topology.links() {
                let Some(cap) = ctx.capacity_expr(link) else {
                    continue;
                };
                let load = edge_load(&flow_vars, ctx.paths, &link.src, &link.dst, |pair| {
                    self.assignment.get(pair) == Some(&partition)
                });
                if load.terms.is_empty() {
                    continue;
                }
                session.add_constraint(load - cap * share, Cmp::Le);
            }
        }
        add_delivery_rows(session, ctx, &flow_vars, false);

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
    use crate::encoder::{OptimalFlowEncoder, OuterVars};
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

    fn fixture() -> (BTreeMap<Pair, f64>, BTreeMap<Pair, Vec<Path>>) {
        let demands = BTreeMap::from([
            (Pair::new("a", "b"), 10.0),
            (Pair::new("a", "c"), 10.0),
            (Pair::new("b", "d"), 10.0),
            (Pair::new("c", "d"), 10.0),
            (Pair::new("a", "d"), 10.0),
        ]);
        let mut paths = BTreeMap::new();
        for pair in demands.keys() {
            let set = if pair.src == "a" && pair.dst == "d" {
                vec![Path::new(["a", "b", "d"])]
            } else {
                vec![Path::new([pair.src.as_str(), pair.dst.as_str()])]
            };
            paths.insert(pair.clone(), set);
        }
        (demands, paths)
    }

    fn left_right_assignment() -> BTreeMap<Pair, usize> {
        BTreeMap::from([
            (Pair::new("a", "b"), 0),
            (Pair::new("b", "d"), 0),
            (Pair::new("a", "d"), 0),
            (Pair::new("a", "c"), 1),
            (Pair::new("c", "d"), 1),
        ])
    }

    fn solve<E: FlowEncoder>(
        topo: &Topology,
        encoder: &E,
        demands: &BTreeMap<Pair, f64>,
        paths: &BTreeMap<Pair, Vec<Path>>,
    ) -> f64 {
        let mut session = Session::new();
        let outer = OuterVars::fixed(&mut session, demands);
        let none = FailureScenario::none();
        let ctx = EncoderContext::new(topo, paths, &outer, &none).with_fixed_demands(demands);
        let enc = encoder.encode(&mut session, &ctx).unwrap();
        session.set_objective(Direction::Maximize, enc.objective().clone());
        let out = default_backend().solve(&session).unwrap();
        enc.decode(topo, &out).objective
    }

    #[test]
    fn test_halved_capacity_per_partition() {
        let topo = diamond();
        let (demands, paths) = fixture();
        let pop = PopEncoder::new(2, left_right_assignment());
        // each partition works with 5-unit links: 10 + 10 delivered
        assert!(approx_eq(solve(&topo, &pop, &demands, &paths), 20.0));
        // the undivided network delivers twice that
        assert!(approx_eq(
            solve(&topo, &OptimalFlowEncoder::new(), &demands, &paths),
            40.0
        ));
    }

    #[test]
    fn test_single_partition_matches_optimal() {
        let topo = diamond();
        let (demands, paths) = fixture();
        let all_zero = demands.keys().map(|p| (p.clone(), 0)).collect();
        let pop = PopEncoder::new(1, all_zero);
        assert!(approx_eq(
            solve(&topo, &pop, &demands, &paths),
            solve(&topo, &OptimalFlowEncoder::new(), &demands, &paths),
        ));
    }

    #[test]
    fn test_unassigned_pair_rejected() {
        let topo = diamond();
        let (demands, paths) = fixture();
        let mut assignment = left_right_assignment();
        assignment.remove(&Pair::new("a", "d"));

        let mut session = Session::new();
        let outer = OuterVars::fixed(&mut session, &demands);
        let none = FailureScenario::none();
        let ctx = EncoderContext::new(&topo, &paths, &outer, &none).with_fixed_demands(&demands);
        assert!(matches!(
            PopEncoder::new(2, assignment).encode(&mut session, &ctx),
            Err(EncodeError::Config(_))
        ));
    }

    #[test]
    fn test_zero_partitions_rejected() {
        let topo = diamond();
        let (demands, paths) = fixture();
        let mut session = Session::new();
        let outer = OuterVars::fixed(&mut session, &demands);
        let none = FailureScenario::none();
        let ctx = EncoderContext::new(&topo, &paths, &outer, &none).with_fixed_demands(&demands);
        assert!(matches!(
            PopEncoder::new(0, left_right_assignment()).encode(&mut session, &ctx),
            Err(EncodeError::Config(_))
        ));
    }
}

//! Failure-resilient encoders.
//!
//! Both encoders maximize a guaranteed throughput `t`: the flow that
//! survives every failure scenario of at most `max_failures` capacitated
//! edges. Scenarios are enumerated inside the encoding, so these
//! encoders reject sessions whose failure realization is adversarial.
//!
//! The equal-paths variant lets every candidate path grow by a per-path
//! extension budget after a failure. The primary/backup variant keeps
//! nominal flow on primary paths and reassigns only the failed portion
//! onto dedicated backup paths.

use std::collections::BTreeMap;

use tegap_core::{bounded_down_sets, Pair, Path, PathSet};

use crate::session::{Cmp, LinExpr, Session, VarId};

use super::{
    add_capacity_rows, add_delivery_rows, declare_flow_vars, finish_encoding, EncodeError,
    EncoderContext, Encoding, EncodingParts, FlowEncoder,
};

/// Equal-paths resilient encoding: after a failure any surviving
/// candidate path may carry its nominal flow plus its extension budget.
#[derive(Debug, Clone, Default)]
pub struct ResilientFlowEncoder {
    pub max_failures: usize,
    /// Additional post-failure headroom per path; unlisted paths get 0.
    pub path_extension: BTreeMap<Path, f64>,
}

impl ResilientFlowEncoder {
    pub fn new(max_failures: usize) -> Self {
        Self {
            max_failures,
            path_extension: BTreeMap::new(),
        }
    }

    pub fn with_extension(mut self, path: Path, budget: f64) -> Self {
        self.path_extension.insert(path, budget);
        self
    }

    fn extension_of(&self, path: &Path) -> f64 {
        self.path_extension.get(path).copied().unwrap_or(0.0)
    }
}

impl FlowEncoder for ResilientFlowEncoder {
    fn name(&self) -> &'static str {
        "resilient-equal"
    }

    fn encode(
        &self,
        session: &mut Session,
        ctx: &EncoderContext<'_>,
    ) -> Result<Encoding, EncodeError> {
        reject_outer_failures(ctx)?;

        let flow_vars = declare_flow_vars(session, ctx)?;
        let throughput = session.add_nonneg("t_guaranteed");
        let row_start = session.num_rows();

        add_capacity_rows(session, ctx, &flow_vars, 1.0);
        add_delivery_rows(session, ctx, &flow_vars, false);

        // No-failure scenario: t at most the nominal delivered flow.
        let mut nominal = LinExpr::term(throughput, 1.0);
        for &v in flow_vars.values().flatten() {
            nominal.add_term(v, -1.0);
        }
        session.add_constraint(nominal, Cmp::Le);

        let mut primal_vars: Vec<VarId> =
            flow_vars.values().flatten().copied().collect();
        primal_vars.push(throughput);

        for scenario in bounded_down_sets(ctx.topology, self.max_failures) {
            let mut delivered = LinExpr::zero();
            let mut scenario_flows: BTreeMap<(Pair, usize), VarId> = BTreeMap::new();

            for (pair, vars) in &flow_vars {
                let paths = &ctx.paths[pair];
                let mut pair_delivered = LinExpr::zero();
                for (idx, (path, &base)) in paths.iter().zip(vars).enumerate() {
                    if path_hit(path, &scenario) {
                        continue;
                    }
                    let y = session.add_nonneg(&format!(
                        "y_{pair}_{idx}_s{}",
                        scenario_tag(&scenario)
                    ));
                    // y <= x + extension
                    session.add_constraint(
                        LinExpr::term(y, 1.0)
                            - LinExpr::term(base, 1.0)
                            - self.extension_of(path),
                        Cmp::Le,
                    );
                    pair_delivered.add_term(y, 1.0);
                    delivered.add_term(y, 1.0);
                    scenario_flows.insert((pair.clone(), idx), y);
                    primal_vars.push(y);
                }
                // per-pair delivery still bounded by the demand
                let mut row = pair_delivered;
                row.add_term(ctx.outer.demand[pair], -1.0);
                if !row.terms.is_empty() {
                    session.add_constraint(row, Cmp::Le);
                }
            }

            // surviving links keep their capacity
            for link in ctx.topology.links() {
                if scenario.contains(&(link.src.clone(), link.dst.clone())) {
                    continue;
                }
                let Some(cap) = ctx.capacity_expr(link) else {
                    continue;
                };
                let mut load = LinExpr::zero();
                for ((pair, idx), &y) in &scenario_flows {
                    if ctx.paths[pair][*idx].crosses(&link.src, &link.dst) {
                        load.add_term(y, 1.0);
                    }
                }
                if load.terms.is_empty() {
                    continue;
                }
                session.add_constraint(load - cap, Cmp::Le);
            }

            session.add_constraint(LinExpr::term(throughput, 1.0) - delivered, Cmp::Le);
        }

        Ok(finish_encoding(
            session,
            ctx,
            EncodingParts {
                objective: LinExpr::term(throughput, 1.0),
                flow_vars,
                row_start,
                primal_vars,
            },
        ))
    }
}

/// Primary/backup resilient encoding: failed primary flow, and only
/// that flow, may be reassigned onto the pair's backup paths up to each
/// backup's reservation.
#[derive(Debug, Clone, Default)]
pub struct BackupPathEncoder {
    pub max_failures: usize,
    /// Backup path sets per pair; pairs without an entry have none.
    pub backup: BTreeMap<Pair, PathSet>,
    /// Reserved post-failure capacity per backup path; unlisted paths
    /// get 0 and are effectively unusable.
    pub reservation: BTreeMap<Path, f64>,
}

impl BackupPathEncoder {
    pub fn new(max_failures: usize) -> Self {
        Self {
            max_failures,
            backup: BTreeMap::new(),
            reservation: BTreeMap::new(),
        }
    }

    pub fn with_backup(mut self, pair: Pair, path: Path, reservation: f64) -> Self {
        self.reservation.insert(path.clone(), reservation);
        self.backup.entry(pair).or_default().push(path);
        self
    }
}

impl FlowEncoder for BackupPathEncoder {
    fn name(&self) -> &'static str {
        "resilient-backup"
    }

    fn encode(
        &self,
        session: &mut Session,
        ctx: &EncoderContext<'_>,
    ) -> Result<Encoding, EncodeError> {
        reject_outer_failures(ctx)?;
        for (pair, paths) in &self.backup {
            for path in paths {
                path.validate(ctx.topology)?;
                if path.src() != pair.src || path.dst() != pair.dst {
                    return Err(EncodeError::Config(format!(
                        "backup path {path} does not connect pair {pair}"
                    )));
                }
            }
        }

        let flow_vars = declare_flow_vars(session, ctx)?;
        let throughput = session.add_nonneg("t_guaranteed");
        let row_start = session.num_rows();

        add_capacity_rows(session, ctx, &flow_vars, 1.0);
        add_delivery_rows(session, ctx, &flow_vars, false);

        let mut nominal = LinExpr::term(throughput, 1.0);
        for &v in flow_vars.values().flatten() {
            nominal.add_term(v, -1.0);
        }
        session.add_constraint(nominal, Cmp::Le);

        let mut primal_vars: Vec<VarId> =
            flow_vars.values().flatten().copied().collect();
        primal_vars.push(throughput);

        let empty = PathSet::new();
        for scenario in bounded_down_sets(ctx.topology, self.max_failures) {
            if scenario.is_empty() {
                continue; // covered by the nominal row
            }
            let mut delivered = LinExpr::zero();
            let mut backup_flows: Vec<(Pair, usize, VarId)> = Vec::new();

            for (pair, vars) in &flow_vars {
                let primaries = &ctx.paths[pair];
                let mut surviving = LinExpr::zero();
                let mut lost = LinExpr::zero();
                for (path, &x) in primaries.iter().zip(vars) {
                    if path_hit(path, &scenario) {
                        lost.add_term(x, 1.0);
                    } else {
                        surviving.add_term(x, 1.0);
                    }
                }

                let mut reassigned = LinExpr::zero();
                let backups = self.backup.get(pair).unwrap_or(&empty);
                for (idx, path) in backups.iter().enumerate() {
                    if path_hit(path, &scenario) {
                        continue;
                    }
                    let y = session.add_nonneg(&format!(
                        "b_{pair}_{idx}_s{}",
                        scenario_tag(&scenario)
                    ));
                    let reservation =
                        self.reservation.get(path).copied().unwrap_or(0.0);
                    session.add_constraint(
                        LinExpr::term(y, 1.0) - reservation,
                        Cmp::Le,
                    );
                    reassigned.add_term(y, 1.0);
                    backup_flows.push((pair.clone(), idx, y));
                    primal_vars.push(y);
                }
                // only flow that actually failed may move to backups
                if !reassigned.terms.is_empty() {
                    session.add_constraint(reassigned.clone() - lost, Cmp::Le);
                }

                // delivered flow for the pair stays within its demand
                let mut pair_delivered = surviving.clone() + reassigned.clone();
                delivered += pair_delivered.clone();
                pair_delivered.add_term(ctx.outer.demand[pair], -1.0);
                if !pair_delivered.terms.is_empty() {
                    session.add_constraint(pair_delivered, Cmp::Le);
                }
            }

            // surviving links carry surviving primaries plus backups
            for link in ctx.topology.links() {
                if scenario.contains(&(link.src.clone(), link.dst.clone())) {
                    continue;
                }
                let Some(cap) = ctx.capacity_expr(link) else {
                    continue;
                };
                let mut load = LinExpr::zero();
                for (pair, vars) in &flow_vars {
                    for (path, &x) in ctx.paths[pair].iter().zip(vars) {
                        if !path_hit(path, &scenario) && path.crosses(&link.src, &link.dst) {
                            load.add_term(x, 1.0);
                        }
                    }
                }
                for (pair, idx, y) in &backup_flows {
                    if self.backup[pair][*idx].crosses(&link.src, &link.dst) {
                        load.add_term(*y, 1.0);
                    }
                }
                if load.terms.is_empty() {
                    continue;
                }
                session.add_constraint(load - cap, Cmp::Le);
            }

            session.add_constraint(LinExpr::term(throughput, 1.0) - delivered, Cmp::Le);
        }

        Ok(finish_encoding(
            session,
            ctx,
            EncodingParts {
                objective: LinExpr::term(throughput, 1.0),
                flow_vars,
                row_start,
                primal_vars,
            },
        ))
    }
}

fn reject_outer_failures(ctx: &EncoderContext<'_>) -> Result<(), EncodeError> {
    if ctx.outer.failure.is_empty() {
        Ok(())
    } else {
        Err(EncodeError::Config(
            "resilient encoders quantify failures internally and cannot share \
             adversarial failure flags"
                .to_string(),
        ))
    }
}

fn path_hit(path: &Path, scenario: &[(String, String)]) -> bool {
    scenario.iter().any(|(s, d)| path.crosses(s, d))
}

fn scenario_tag(scenario: &[(String, String)]) -> String {
    scenario
        .iter()
        .map(|(s, d)| format!("{s}.{d}"))
        .collect::<Vec<_>>()
        .join("_")
}

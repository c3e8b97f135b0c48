//! Single-shot bilevel reformulation through KKT conditions.
//!
//! The outer adversary maximizes a gap objective over demand volumes
//! and failure flags while an inner encoding must sit at *its* optimum
//! for whatever the adversary picks. Replacing the inner optimization
//! with its optimality conditions collapses the two levels into one
//! mixed-integer model:
//!
//!  - primal feasibility: the inner rows, already in the session;
//!  - dual feasibility: one multiplier per inner row, one row per
//!    inner variable;
//!  - complementary slackness: either a row is tight or its multiplier
//!    is zero, linearized through indicator big-M rows.
//!
//! Inner variables must be continuous and of the form `x >= 0`; the
//! encoders keep all other structure in rows for exactly this reason.
//! Rows that touch no inner variable (outer-domain rows, gating rows)
//! pass through untouched. Gate binaries inside the inner encoding are
//! sound here because their values are forced by outer variables alone,
//! so conditioned on the outer choice the inner problem is a pure LP.

use thiserror::Error;

use crate::encoder::Encoding;
use crate::session::{Cmp, LinExpr, Row, Session, VarKind};

#[derive(Debug, Error)]
pub enum BilevelError {
    #[error("inner variable {0} is not continuous")]
    NonContinuousInner(String),

    #[error("inner variable {0} must be bounded as [0, inf)")]
    UnsupportedBounds(String),
}

/// Pin `encoding` to its inner optimum by appending dual feasibility
/// and complementary slackness rows to the session.
///
/// The encoding's objective is taken as a maximization. Multipliers are
/// implicitly bounded by the session's big-M, which is safe while true
/// shadow prices stay well below it (unit objective coefficients keep
/// them near 1 in these models).
pub fn apply_optimality_conditions(
    session: &mut Session,
    encoding: &Encoding,
) -> Result<(), BilevelError> {
    let inner = encoding.primal_vars().to_vec();
    for &var in &inner {
        if session.var_kind(var) != VarKind::Continuous {
            return Err(BilevelError::NonContinuousInner(
                session.var_name(var).to_string(),
            ));
        }
        let (lower, upper) = session.var_bounds(var);
        if lower != 0.0 || upper.is_finite() {
            return Err(BilevelError::UnsupportedBounds(
                session.var_name(var).to_string(),
            ));
        }
    }

    // Snapshot the inner rows, normalized to `expr <= 0`.
    let rows: Vec<Row> = session.rows()[encoding.row_range()].to_vec();
    let normalized: Vec<(LinExpr, Cmp)> = rows
        .into_iter()
        .map(|row| match row.cmp {
            Cmp::Le | Cmp::Eq => (row.expr, row.cmp),
            Cmp::Ge => (-row.expr, Cmp::Le),
        })
        .collect();

    // One multiplier per row that actually constrains inner variables.
    let mut duals = Vec::with_capacity(normalized.len());
    for (i, (expr, cmp)) in normalized.iter().enumerate() {
        let touches_inner = inner.iter().any(|&v| expr.coefficient(v) != 0.0);
        if !touches_inner {
            duals.push(None);
            continue;
        }
        let y = match cmp {
            Cmp::Le => session.add_nonneg(&format!("dual_{i}")),
            Cmp::Eq => session.add_continuous(
                f64::NEG_INFINITY,
                f64::INFINITY,
                &format!("dual_{i}"),
            ),
            Cmp::Ge => unreachable!("normalized away"),
        };
        duals.push(Some((y, *cmp)));
    }

    for &x in &inner {
        // A' y >= c, one row per inner variable.
        let mut dual_row = LinExpr::constant(encoding.objective().coefficient(x));
        for ((expr, _), dual) in normalized.iter().zip(&duals) {
            if let Some((y, _)) = dual {
                let a = expr.coefficient(x);
                if a != 0.0 {
                    dual_row.add_term(*y, -a);
                }
            }
        }
        session.add_constraint(dual_row.clone(), Cmp::Le);

        // x_j > 0 forces its reduced cost to zero.
        let gate = session.add_binary(&format!("cs_var_{}", session.num_vars()));
        session.add_indicator(gate, true, LinExpr::from(x), Cmp::Le);
        session.add_indicator(gate, false, dual_row, Cmp::Ge);
    }

    // Either a row is tight or its multiplier vanishes.
    for ((expr, _), dual) in normalized.iter().zip(&duals) {
        let Some((y, cmp)) = dual else { continue };
        if *cmp == Cmp::Eq {
            continue;
        }
        let gate = session.add_binary(&format!("cs_row_{}", session.num_vars()));
        session.add_indicator(gate, true, LinExpr::from(*y), Cmp::Le);
        session.add_indicator(gate, false, expr.clone(), Cmp::Ge);
    }

    Ok(())
}

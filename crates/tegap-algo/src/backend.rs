//! Realizing a recorded [`Session`] through `good_lp`.
//!
//! The backend choice is a cargo feature: `solver-highs` (default) links
//! HiGHS and handles the binary variables that indicator gating and the
//! KKT reformulation introduce; `solver-clarabel` is a pure-Rust interior
//! point LP backend that relaxes binaries to `[0, 1]`. Encoders that
//! need exact binaries should check [`SolveBackend::supports_integers`].

use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, Solver, SolverModel};
use good_lp::ResolutionError;

use crate::session::{Cmp, Direction, Session, SolveError, SolverOutcome, VarKind};

/// A solver able to realize and optimize a recorded session.
pub trait SolveBackend {
    /// Short backend identifier for logs.
    fn id(&self) -> &'static str;

    /// Whether binary variables are honored exactly.
    fn supports_integers(&self) -> bool;

    fn solve(&self, session: &Session) -> Result<SolverOutcome, SolveError>;
}

/// The feature-selected `good_lp` backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpBackend;

pub fn default_backend() -> GoodLpBackend {
    GoodLpBackend
}

#[cfg(feature = "solver-highs")]
impl SolveBackend for GoodLpBackend {
    fn id(&self) -> &'static str {
        "highs"
    }

    fn supports_integers(&self) -> bool {
        true
    }

    fn solve(&self, session: &Session) -> Result<SolverOutcome, SolveError> {
        realize(good_lp::solvers::highs::highs, session, true)
    }
}

#[cfg(all(feature = "solver-clarabel", not(feature = "solver-highs")))]
impl SolveBackend for GoodLpBackend {
    fn id(&self) -> &'static str {
        "clarabel"
    }

    fn supports_integers(&self) -> bool {
        false
    }

    fn solve(&self, session: &Session) -> Result<SolverOutcome, SolveError> {
        realize(good_lp::solvers::clarabel::clarabel, session, false)
    }
}

#[cfg(not(any(feature = "solver-highs", feature = "solver-clarabel")))]
compile_error!("enable at least one of the features `solver-highs` or `solver-clarabel`");

/// Translate the session into a `good_lp` model, solve it, and read the
/// full variable assignment back.
fn realize<S: Solver>(
    solver: S,
    session: &Session,
    integers: bool,
) -> Result<SolverOutcome, SolveError>
where
    S::Model: SolverModel<Error = ResolutionError>,
{
    let (direction, objective) = session.objective().ok_or(SolveError::NoObjective)?;

    let mut pv = ProblemVariables::new();
    let handles: Vec<good_lp::Variable> = session
        .var_specs()
        .iter()
        .map(|spec| {
            let mut def = variable().name(&spec.name);
            match spec.kind {
                VarKind::Continuous => {
                    if spec.lower.is_finite() {
                        def = def.min(spec.lower);
                    }
                    if spec.upper.is_finite() {
                        def = def.max(spec.upper);
                    }
                }
                VarKind::Binary => {
                    if integers {
                        def = def.binary();
                    } else {
                        // LP relaxation when the backend lacks integers
                        def = def.min(0.0).max(1.0);
                    }
                }
            }
            pv.add(def)
        })
        .collect();

    let to_expr = |e: &crate::session::LinExpr| -> Expression {
        let mut out = Expression::from(e.constant);
        for (var, coeff) in &e.terms {
            out += *coeff * handles[var.0];
        }
        out
    };

    let unsolved = match direction {
        Direction::Maximize => pv.maximise(to_expr(objective)),
        Direction::Minimize => pv.minimise(to_expr(objective)),
    };
    let mut model = unsolved.using(solver);
    for row in session.rows() {
        let lhs = to_expr(&row.expr);
        model = match row.cmp {
            Cmp::Le => model.with(constraint!(lhs <= 0.0)),
            Cmp::Ge => model.with(constraint!(lhs >= 0.0)),
            Cmp::Eq => model.with(constraint!(lhs == 0.0)),
        };
    }

    let solved = model.solve().map_err(|e| match e {
        ResolutionError::Infeasible => SolveError::Infeasible,
        ResolutionError::Unbounded => SolveError::Unbounded,
        other => SolveError::Backend(other.to_string()),
    })?;

    let values: Vec<f64> = handles.iter().map(|h| solved.value(*h)).collect();
    let objective_value = objective.eval(&values);
    Ok(SolverOutcome {
        values,
        objective: objective_value,
    })
}

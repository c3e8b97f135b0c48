//! Recording model-build session.
//!
//! Encoders add variables and linear rows here instead of talking to a
//! solver directly. Keeping the model as plain data serves two purposes:
//! any [`SolveBackend`](crate::backend::SolveBackend) can realize it, and
//! the KKT reformulation can walk the recorded rows of an inner encoding
//! to derive its dual system.
//!
//! Rows are stored in normalized form `expr cmp 0`; callers fold the
//! right-hand side into the expression's constant term.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use thiserror::Error;

/// Handle to a session variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Maximize,
    Minimize,
}

/// Comparison against zero in a normalized row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Le,
    Ge,
    Eq,
}

/// A linear expression `sum(coeff * var) + constant`.
///
/// Terms are kept in insertion order and may repeat a variable;
/// [`LinExpr::coefficient`] sums duplicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinExpr {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(c: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: c,
        }
    }

    pub fn term(var: VarId, coeff: f64) -> Self {
        Self {
            terms: vec![(var, coeff)],
            constant: 0.0,
        }
    }

    pub fn add_term(&mut self, var: VarId, coeff: f64) -> &mut Self {
        self.terms.push((var, coeff));
        self
    }

    /// Net coefficient of `var` across all terms.
    pub fn coefficient(&self, var: VarId) -> f64 {
        self.terms
            .iter()
            .filter(|(v, _)| *v == var)
            .map(|(_, c)| c)
            .sum()
    }

    /// Variables with a nonzero net coefficient.
    pub fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        let mut seen = std::collections::BTreeSet::new();
        self.terms
            .iter()
            .map(|(v, _)| *v)
            .filter(move |v| seen.insert(*v))
    }

    /// Evaluate at a full assignment indexed by variable id.
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|(v, c)| c * values[v.0])
                .sum::<f64>()
    }
}

impl From<VarId> for LinExpr {
    fn from(var: VarId) -> Self {
        LinExpr::term(var, 1.0)
    }
}

impl Add for LinExpr {
    type Output = LinExpr;
    fn add(mut self, rhs: LinExpr) -> LinExpr {
        self += rhs;
        self
    }
}

impl AddAssign for LinExpr {
    fn add_assign(&mut self, rhs: LinExpr) {
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl Sub for LinExpr {
    type Output = LinExpr;
    fn sub(mut self, rhs: LinExpr) -> LinExpr {
        self -= rhs;
        self
    }
}

impl SubAssign for LinExpr {
    fn sub_assign(&mut self, rhs: LinExpr) {
        for (v, c) in rhs.terms {
            self.terms.push((v, -c));
        }
        self.constant -= rhs.constant;
    }
}

impl Add<f64> for LinExpr {
    type Output = LinExpr;
    fn add(mut self, rhs: f64) -> LinExpr {
        self.constant += rhs;
        self
    }
}

impl Sub<f64> for LinExpr {
    type Output = LinExpr;
    fn sub(mut self, rhs: f64) -> LinExpr {
        self.constant -= rhs;
        self
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;
    fn mul(mut self, rhs: f64) -> LinExpr {
        for (_, c) in &mut self.terms {
            *c *= rhs;
        }
        self.constant *= rhs;
        self
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;
    fn neg(self) -> LinExpr {
        self * -1.0
    }
}

/// A recorded constraint `expr cmp 0`.
#[derive(Debug, Clone)]
pub struct Row {
    pub expr: LinExpr,
    pub cmp: Cmp,
}

#[derive(Debug, Clone)]
pub(crate) struct VarSpec {
    pub kind: VarKind,
    pub lower: f64,
    pub upper: f64,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("model is infeasible")]
    Infeasible,

    #[error("model is unbounded")]
    Unbounded,

    #[error("no objective has been set")]
    NoObjective,

    #[error("solver backend failed: {0}")]
    Backend(String),
}

/// Values of every session variable at an optimum.
#[derive(Debug, Clone)]
pub struct SolverOutcome {
    pub values: Vec<f64>,
    pub objective: f64,
}

impl SolverOutcome {
    pub fn value(&self, var: VarId) -> f64 {
        self.values[var.0]
    }
}

/// Default big-M for indicator lowering. Expressions gated through
/// [`Session::add_indicator`] must stay within this magnitude.
pub const DEFAULT_BIG_M: f64 = 1.0e4;

/// An in-progress optimization model.
#[derive(Debug)]
pub struct Session {
    vars: Vec<VarSpec>,
    rows: Vec<Row>,
    objective: Option<(Direction, LinExpr)>,
    big_m: f64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            vars: Vec::new(),
            rows: Vec::new(),
            objective: None,
            big_m: DEFAULT_BIG_M,
        }
    }

    pub fn with_big_m(mut self, big_m: f64) -> Self {
        self.big_m = big_m;
        self
    }

    pub fn big_m(&self) -> f64 {
        self.big_m
    }

    /// Discard variables, rows, and objective so the session can be
    /// rebuilt. Big-M configuration survives.
    pub fn reset(&mut self) {
        self.vars.clear();
        self.rows.clear();
        self.objective = None;
    }

    pub fn add_var(&mut self, kind: VarKind, lower: f64, upper: f64, name: &str) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(VarSpec {
            kind,
            lower,
            upper,
            name: name.to_string(),
        });
        id
    }

    /// Nonnegative continuous variable with no upper bound.
    pub fn add_nonneg(&mut self, name: &str) -> VarId {
        self.add_var(VarKind::Continuous, 0.0, f64::INFINITY, name)
    }

    pub fn add_continuous(&mut self, lower: f64, upper: f64, name: &str) -> VarId {
        self.add_var(VarKind::Continuous, lower, upper, name)
    }

    pub fn add_binary(&mut self, name: &str) -> VarId {
        self.add_var(VarKind::Binary, 0.0, 1.0, name)
    }

    /// Record `expr cmp 0`. Returns the row index.
    pub fn add_constraint(&mut self, expr: LinExpr, cmp: Cmp) -> usize {
        self.rows.push(Row { expr, cmp });
        self.rows.len() - 1
    }

    /// Enforce `expr cmp 0` only when `flag` takes the value `active`,
    /// lowered through big-M rows. The gated expression must stay within
    /// the session's big-M magnitude at every feasible point.
    pub fn add_indicator(&mut self, flag: VarId, active: bool, expr: LinExpr, cmp: Cmp) {
        let m = self.big_m;
        // Relaxation term that vanishes when the flag matches `active`:
        // M * (1 - flag) for active = true, M * flag otherwise.
        let slack = if active {
            LinExpr::term(flag, -m) + m
        } else {
            LinExpr::term(flag, m)
        };
        match cmp {
            Cmp::Le => {
                self.add_constraint(expr - slack, Cmp::Le);
            }
            Cmp::Ge => {
                self.add_constraint(expr + slack, Cmp::Ge);
            }
            Cmp::Eq => {
                self.add_constraint(expr.clone() - slack.clone(), Cmp::Le);
                self.add_constraint(expr + slack, Cmp::Ge);
            }
        }
    }

    pub fn set_objective(&mut self, direction: Direction, expr: LinExpr) {
        self.objective = Some((direction, expr));
    }

    pub fn objective(&self) -> Option<&(Direction, LinExpr)> {
        self.objective.as_ref()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn var_specs(&self) -> &[VarSpec] {
        &self.vars
    }

    pub fn var_kind(&self, var: VarId) -> VarKind {
        self.vars[var.0].kind
    }

    pub fn var_bounds(&self, var: VarId) -> (f64, f64) {
        (self.vars[var.0].lower, self.vars[var.0].upper)
    }

    pub fn var_name(&self, var: VarId) -> &str {
        &self.vars[var.0].name
    }
}

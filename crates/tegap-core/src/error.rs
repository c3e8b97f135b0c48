//! Unified error types for the tegap ecosystem
//!
//! Domain-specific error types (topology, path, configuration) convert into
//! the common [`TegapError`] for uniform handling at API boundaries.

use thiserror::Error;

/// Unified error type for all tegap operations.
#[derive(Error, Debug)]
pub enum TegapError {
    /// Topology construction errors
    #[error("Topology error: {0}")]
    Topology(#[from] crate::topology::TopologyError),

    /// Path validation errors
    #[error("Path error: {0}")]
    Path(#[from] crate::path::PathError),

    /// Contradictory or malformed configuration, rejected before any solve
    #[error("Configuration error: {0}")]
    Config(String),

    /// Solver/encoding errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using TegapError.
pub type TegapResult<T> = Result<T, TegapError>;

impl From<anyhow::Error> for TegapError {
    fn from(err: anyhow::Error) -> Self {
        TegapError::Other(err.to_string())
    }
}

impl From<String> for TegapError {
    fn from(s: String) -> Self {
        TegapError::Other(s)
    }
}

/// Default tolerance for objective-value comparisons.
///
/// Exact floating equality is never assumed anywhere in the workspace;
/// every expected-vs-computed comparison goes through [`approx_eq`] or
/// [`approx_eq_eps`].
pub const EPSILON: f64 = 1e-6;

/// Approximate equality with the default tolerance.
pub fn approx_eq(a: f64, b: f64) -> bool {
    approx_eq_eps(a, b, EPSILON)
}

/// Approximate equality with an explicit absolute tolerance.
pub fn approx_eq_eps(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TegapError::Solver("no feasible point".into());
        assert!(err.to_string().contains("Solver error"));
        assert!(err.to_string().contains("no feasible point"));
    }

    #[test]
    fn test_approx_eq() {
        assert!(approx_eq(1.0, 1.0 + 1e-9));
        assert!(!approx_eq(1.0, 1.001));
        assert!(approx_eq_eps(40.0, 39.9999, 1e-3));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> TegapResult<()> {
            Err(TegapError::Config("test".into()))
        }

        fn outer() -> TegapResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}

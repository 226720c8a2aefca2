//! # Errors
//!
//! $$
//! \text{Input} \to \text{Result}\langle T, \text{PortfolioError} \rangle
//! $$
//!
//! Failure modes surfaced by the estimation, optimization and risk layers.
//! Solver non-convergence is not an error: it is reported through
//! [`crate::quant::portfolio::SolverStatus`] and handled by the fallback chain.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PortfolioError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PortfolioError {
  /// A series, table or vector with no elements.
  #[error("empty input: {0}")]
  EmptyInput(&'static str),
  /// Two inputs that must agree in shape do not.
  #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
  DimensionMismatch {
    context: &'static str,
    expected: usize,
    actual: usize,
  },
  /// Covariance matrix whose `(i, j)` and `(j, i)` entries differ beyond tolerance.
  #[error("covariance matrix is not symmetric at ({row}, {col})")]
  NonSymmetricCovariance { row: usize, col: usize },
  /// NaN or infinite value where a finite number is required.
  #[error("non-finite value in {0}")]
  NonFinite(&'static str),
  /// Configuration or call parameter outside its valid domain.
  #[error("invalid parameter `{name}`: {reason}")]
  InvalidParameter { name: &'static str, reason: String },
  /// Result that would carry NaN weights or a NaN objective.
  #[error("numerically degenerate result: {0}")]
  Degenerate(String),
  /// Every state of the fallback chain failed to produce usable weights.
  #[error("all optimization strategies failed for {0}")]
  AllStrategiesFailed(String),
}

impl PortfolioError {
  pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
    Self::InvalidParameter {
      name,
      reason: reason.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages_name_the_offending_input() {
    let err = PortfolioError::DimensionMismatch {
      context: "covariance rows",
      expected: 3,
      actual: 2,
    };
    assert_eq!(
      err.to_string(),
      "dimension mismatch in covariance rows: expected 3, got 2"
    );

    let err = PortfolioError::invalid("threshold", "must be positive");
    assert!(err.to_string().contains("threshold"));
  }
}

//! # Concentration
//!
//! $$
//! \mathrm{HHI} = 10^4\sum_i w_i^2,\qquad N_{\mathrm{eff}} = \Big(\sum_i w_i^2\Big)^{-1}
//! $$

use serde::Serialize;

use crate::error::PortfolioError;
use crate::error::Result;

/// Weights at or below this are treated as unheld when reporting the smallest position.
const HELD_WEIGHT: f64 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ConcentrationRisk {
  /// Herfindahl-Hirschman index on the 0..10000 scale.
  pub hhi: f64,
  pub effective_holdings: f64,
  pub top_3_concentration: f64,
  pub top_5_concentration: f64,
  pub max_weight: f64,
  /// Smallest weight above 0.1%, or 0 when nothing is held.
  pub min_held_weight: f64,
}

/// Sum of the `k` largest weights (all weights when fewer than `k`).
pub fn top_k_concentration(weights: &[f64], k: usize) -> f64 {
  let mut sorted = weights.to_vec();
  sorted.sort_by(|a, b| b.total_cmp(a));
  sorted.iter().take(k).sum()
}

pub fn concentration(weights: &[f64]) -> Result<ConcentrationRisk> {
  if weights.is_empty() {
    return Err(PortfolioError::EmptyInput("weights"));
  }
  if weights.iter().any(|w| !w.is_finite()) {
    return Err(PortfolioError::NonFinite("weights"));
  }

  let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
  if sum_sq <= 0.0 {
    return Err(PortfolioError::Degenerate("all weights are zero".into()));
  }

  Ok(ConcentrationRisk {
    hhi: 10_000.0 * sum_sq,
    effective_holdings: 1.0 / sum_sq,
    top_3_concentration: top_k_concentration(weights, 3),
    top_5_concentration: top_k_concentration(weights, 5),
    max_weight: weights.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
    min_held_weight: weights
      .iter()
      .cloned()
      .filter(|&w| w > HELD_WEIGHT)
      .reduce(f64::min)
      .unwrap_or(0.0),
  })
}

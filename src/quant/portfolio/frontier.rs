//! # Efficient Frontier
//!
//! $$
//! \sigma^\*(m) = \min_{\mathbf{w}} \sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}
//! \quad\text{s.t.}\quad \mathbf{1}^\top\mathbf{w}=1,\ \mathbf{w}\ge 0,\ \mathbf{w}^\top\mu = m
//! $$
//!
//! Equally spaced return targets between the smallest and largest expected
//! return. Targets no backend can solve are skipped, so the frontier may be
//! shorter than requested.

use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::data::dot;
use super::data::portfolio_variance;
use super::data::sharpe_ratio;
use super::sharpe::SharpeOptimizer;
use super::solver::Constraints;
use super::solver::Objective;
use super::solver::Problem;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::stats::estimate::validate_inputs;
use crate::traits::Report;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrontierPoint {
  pub target_return: f64,
  pub expected_return: f64,
  pub volatility: f64,
  pub sharpe: f64,
  pub weights: Vec<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EfficientFrontier {
  pub points: Vec<FrontierPoint>,
}

impl Report for EfficientFrontier {}

impl EfficientFrontier {
  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// Volatility of each solved point, parallel to [`Self::returns`].
  pub fn risks(&self) -> Vec<f64> {
    self.points.iter().map(|p| p.volatility).collect()
  }

  pub fn returns(&self) -> Vec<f64> {
    self.points.iter().map(|p| p.expected_return).collect()
  }

  /// Lowest-volatility solved point.
  pub fn min_variance_point(&self) -> Option<&FrontierPoint> {
    self
      .points
      .iter()
      .min_by(|a, b| a.volatility.total_cmp(&b.volatility))
  }

  /// Highest-Sharpe solved point.
  pub fn max_sharpe_point(&self) -> Option<&FrontierPoint> {
    self.points.iter().max_by(|a, b| a.sharpe.total_cmp(&b.sharpe))
  }
}

fn linspace(lo: f64, hi: f64, k: usize) -> Vec<f64> {
  if k == 1 {
    return vec![lo];
  }
  (0..k)
    .map(|i| lo + (hi - lo) * i as f64 / (k - 1) as f64)
    .collect()
}

impl SharpeOptimizer {
  /// Minimum-variance portfolios for `num_points` equally spaced return targets.
  pub fn efficient_frontier(
    &self,
    mu: &[f64],
    cov: &[Vec<f64>],
    num_points: usize,
  ) -> Result<EfficientFrontier> {
    validate_inputs(mu, cov)?;
    if num_points == 0 {
      return Err(PortfolioError::invalid("num_points", "must be positive"));
    }

    let lo = mu.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = mu.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let risk_free = self.config().risk_free;
    let mut points = Vec::with_capacity(num_points);

    for target in linspace(lo, hi, num_points) {
      let problem = Problem::new(mu, cov, risk_free, Objective::MinVariance).with_constraints(Constraints {
        target_return: Some(target),
        ..Constraints::default()
      });

      match self.chain().first_converged(&problem) {
        Some((weights, backend)) => {
          let expected_return = dot(&weights, mu);
          let volatility = portfolio_variance(&weights, cov).max(0.0).sqrt();
          debug!(target_return = target, volatility, backend, "frontier point");
          points.push(FrontierPoint {
            target_return: target,
            expected_return,
            volatility,
            sharpe: sharpe_ratio(expected_return, volatility, risk_free),
            weights,
          });
        }
        None => warn!(target_return = target, "skipping frontier target without a converged solution"),
      }
    }

    Ok(EfficientFrontier { points })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;
  use crate::quant::portfolio::sharpe::OptimizerConfig;

  fn market() -> (Vec<f64>, Vec<Vec<f64>>) {
    (
      vec![0.08, 0.12, 0.06, 0.10],
      vec![
        vec![0.04, 0.006, 0.002, 0.01],
        vec![0.006, 0.09, 0.01, 0.012],
        vec![0.002, 0.01, 0.0225, 0.004],
        vec![0.01, 0.012, 0.004, 0.0625],
      ],
    )
  }

  #[test]
  fn frontier_hits_targets_and_budget() {
    let (mu, cov) = market();
    let opt = SharpeOptimizer::new(OptimizerConfig::default()).unwrap();
    let frontier = opt.efficient_frontier(&mu, &cov, 12).unwrap();

    assert!(frontier.len() >= 10);
    assert_eq!(frontier.risks().len(), frontier.returns().len());
    for p in &frontier.points {
      assert_relative_eq!(p.expected_return, p.target_return, epsilon = 1e-6);
      assert_relative_eq!(p.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
    }
  }

  #[test]
  fn risk_is_non_decreasing_above_the_minimum_variance_point() {
    let (mu, cov) = market();
    let opt = SharpeOptimizer::new(OptimizerConfig::default()).unwrap();
    let frontier = opt.efficient_frontier(&mu, &cov, 15).unwrap();
    let gmv = frontier.min_variance_point().unwrap().expected_return;

    let upper: Vec<&FrontierPoint> = frontier
      .points
      .iter()
      .filter(|p| p.expected_return >= gmv)
      .collect();
    for pair in upper.windows(2) {
      assert!(pair[1].volatility >= pair[0].volatility - 1e-6);
    }
  }

  #[test]
  fn single_point_uses_the_lowest_target() {
    let (mu, cov) = market();
    let opt = SharpeOptimizer::new(OptimizerConfig::default()).unwrap();
    let frontier = opt.efficient_frontier(&mu, &cov, 1).unwrap();

    assert_eq!(frontier.len(), 1);
    assert_relative_eq!(frontier.points[0].target_return, 0.06);
    assert!(opt.efficient_frontier(&mu, &cov, 0).is_err());
  }
}

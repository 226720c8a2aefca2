//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}} \frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Shared enums and result containers for portfolio optimization.

use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use super::data::diversification_ratio;
use super::data::herfindahl;
use super::data::portfolio_variance;
use super::data::sharpe_ratio;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::traits::Report;

/// Tolerance on the budget constraint `sum(w) = 1`.
pub const BUDGET_TOL: f64 = 1e-6;
/// Tolerance on the long-only constraint `w >= 0`.
pub const LONG_ONLY_TOL: f64 = 1e-6;

/// Supported portfolio optimization methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerMethod {
  /// Long-only Sharpe maximization.
  MaxSharpe,
  /// Global minimum variance.
  MinVariance,
  /// Sharpe maximization under a volatility cap.
  RiskConstrainedSharpe,
  /// Blend of Sharpe ratio and per-instrument return stability.
  StableReturns,
  /// Equalized shares of total risk.
  RiskParity,
  /// Risk parity tilted towards expected return.
  BoostedRiskParity,
  /// Correlation clusters with risk parity inside and across clusters.
  HierarchicalRiskParity,
  /// Sharpe maximization on signal-adjusted inputs.
  SignalEnhanced,
}

impl OptimizerMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::MaxSharpe => "max_sharpe",
      Self::MinVariance => "min_variance",
      Self::RiskConstrainedSharpe => "risk_constrained_sharpe",
      Self::StableReturns => "stable_returns",
      Self::RiskParity => "risk_parity",
      Self::BoostedRiskParity => "boosted_risk_parity",
      Self::HierarchicalRiskParity => "hierarchical_risk_parity",
      Self::SignalEnhanced => "signal_enhanced",
    }
  }
}

impl Display for OptimizerMethod {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OptimizerMethod {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().replace('-', "_").as_str() {
      "max_sharpe" | "sharpe" | "markowitz" => Ok(Self::MaxSharpe),
      "min_variance" | "gmv" | "minvar" => Ok(Self::MinVariance),
      "risk_constrained_sharpe" | "max_sharpe_constrained" => Ok(Self::RiskConstrainedSharpe),
      "stable_returns" | "stability" => Ok(Self::StableReturns),
      "risk_parity" | "riskparity" | "erc" => Ok(Self::RiskParity),
      "boosted_risk_parity" | "return_boosted_erc" => Ok(Self::BoostedRiskParity),
      "hierarchical_risk_parity" | "hrp" => Ok(Self::HierarchicalRiskParity),
      "signal_enhanced" | "signal" => Ok(Self::SignalEnhanced),
      _ => Err(PortfolioError::invalid("method", format!("unknown optimizer `{s}`"))),
    }
  }
}

/// Which state of the fallback chain produced a weight vector.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
  /// A numerical backend converged.
  Solver { backend: String },
  /// `w ∝ Σ⁻¹(μ − r_f)` clipped at zero and renormalized.
  AnalyticTangency,
  /// `w_i = 1/n`.
  EqualWeight,
}

/// Output of a portfolio optimization run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortfolioResult {
  pub method: OptimizerMethod,
  pub provenance: Provenance,
  /// Final portfolio weights.
  pub weights: Vec<f64>,
  /// Model expected portfolio return (annualized if inputs are annualized).
  pub expected_return: f64,
  /// Model portfolio volatility.
  pub volatility: f64,
  /// Sharpe ratio computed as `(expected_return - risk_free) / volatility`.
  pub sharpe: f64,
  /// Herfindahl index on the unit scale, `sum(w^2)`, in `1/n..1`.
  ///
  /// The risk report's concentration section uses the 0..10000 convention
  /// (`10000 * sum(w^2)`) instead.
  pub herfindahl: f64,
  /// Effective number of holdings, `1 / sum(w^2)`.
  pub effective_assets: f64,
  /// Weighted average volatility over portfolio volatility.
  pub diversification_ratio: f64,
}

impl Report for PortfolioResult {}

impl PortfolioResult {
  /// Compute the metrics bundle for `weights` and validate the outcome.
  ///
  /// NaN weights or a NaN Sharpe ratio are rejected. Budget and sign
  /// violations beyond tolerance are logged, not rejected.
  pub fn evaluate(
    method: OptimizerMethod,
    provenance: Provenance,
    weights: Vec<f64>,
    mu: &[f64],
    cov: &[Vec<f64>],
    risk_free: f64,
  ) -> Result<Self> {
    if weights.iter().any(|w| w.is_nan()) {
      return Err(PortfolioError::Degenerate(format!("{method} produced NaN weights")));
    }

    let expected_return = weights.iter().zip(mu).map(|(w, m)| w * m).sum::<f64>();
    let volatility = portfolio_variance(&weights, cov).max(0.0).sqrt();
    let sharpe = sharpe_ratio(expected_return, volatility, risk_free);
    if sharpe.is_nan() {
      return Err(PortfolioError::Degenerate(format!("{method} produced a NaN Sharpe ratio")));
    }

    let hhi = herfindahl(&weights);
    let result = Self {
      method,
      provenance,
      expected_return,
      volatility,
      sharpe,
      herfindahl: hhi,
      effective_assets: if hhi > 0.0 { 1.0 / hhi } else { 0.0 },
      diversification_ratio: diversification_ratio(&weights, cov),
      weights,
    };
    result.warn_on_constraint_violations();
    Ok(result)
  }

  pub fn weight_sum(&self) -> f64 {
    self.weights.iter().sum()
  }

  fn warn_on_constraint_violations(&self) {
    let sum = self.weight_sum();
    if (sum - 1.0).abs() >= BUDGET_TOL {
      warn!(method = %self.method, sum, "weights do not sum to one");
    }
    if let Some(min) = self.weights.iter().cloned().reduce(f64::min) {
      if min < -LONG_ONLY_TOL {
        warn!(method = %self.method, min, "negative weight in long-only portfolio");
      }
    }
  }
}

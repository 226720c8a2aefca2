//! # Sharpe Optimizer
//!
//! $$
//! \max_{\mathbf{w}} \frac{\mathbf{w}^\top\mu - r_f}{\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}}
//! \quad\text{s.t.}\quad \mathbf{1}^\top\mathbf{w}=1,\ \mathbf{w}\ge 0
//! $$
//!
//! Core long-only optimizer: Sharpe maximization and global minimum variance.

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use super::fallback::FallbackPolicy;
use super::fallback::SolverChain;
use super::solver::BackendKind;
use super::solver::Constraints;
use super::solver::Objective;
use super::solver::Problem;
use super::solver::SolverSettings;
use super::types::OptimizerMethod;
use super::types::PortfolioResult;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::stats::estimate::validate_inputs;
use crate::stats::MarketEstimate;

/// Configuration shared by every optimizer built on the solver chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
  /// Annual risk-free rate used in Sharpe ratios.
  pub risk_free: f64,
  /// Backends tried in order before the closed-form fallbacks.
  pub backends: Vec<BackendKind>,
  pub settings: SolverSettings,
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      risk_free: 0.02,
      backends: vec![BackendKind::ProjectedGradient, BackendKind::NelderMead],
      settings: SolverSettings::default(),
    }
  }
}

impl OptimizerConfig {
  pub fn validate(&self) -> Result<()> {
    if !self.risk_free.is_finite() {
      return Err(PortfolioError::invalid("risk_free", "must be finite"));
    }
    if self.backends.is_empty() {
      return Err(PortfolioError::invalid("backends", "at least one solver backend is required"));
    }
    if self.settings.max_iters == 0 {
      return Err(PortfolioError::invalid("max_iters", "must be positive"));
    }
    if !(self.settings.tolerance > 0.0 && self.settings.tolerance.is_finite()) {
      return Err(PortfolioError::invalid("tolerance", "must be positive"));
    }
    Ok(())
  }

  pub(crate) fn chain(&self) -> Result<SolverChain> {
    self.validate()?;
    SolverChain::new(&self.backends, self.settings)
  }
}

/// Long-only Sharpe maximizer with an explicit fallback chain.
#[derive(Debug)]
pub struct SharpeOptimizer {
  config: OptimizerConfig,
  chain: SolverChain,
}

impl SharpeOptimizer {
  pub fn new(config: OptimizerConfig) -> Result<Self> {
    let chain = config.chain()?;
    Ok(Self { config, chain })
  }

  pub fn config(&self) -> &OptimizerConfig {
    &self.config
  }

  pub(crate) fn chain(&self) -> &SolverChain {
    &self.chain
  }

  /// Maximize the Sharpe ratio subject to budget and long-only constraints.
  pub fn max_sharpe(&self, mu: &[f64], cov: &[Vec<f64>]) -> Result<PortfolioResult> {
    self.max_sharpe_with(mu, cov, Constraints::default())
  }

  /// Sharpe maximization with optional volatility, weight and return constraints.
  pub fn max_sharpe_with(
    &self,
    mu: &[f64],
    cov: &[Vec<f64>],
    constraints: Constraints,
  ) -> Result<PortfolioResult> {
    validate_inputs(mu, cov)?;
    let problem =
      Problem::new(mu, cov, self.config.risk_free, Objective::MaxSharpe).with_constraints(constraints);
    let result = self
      .chain
      .optimize(OptimizerMethod::MaxSharpe, &problem, FallbackPolicy::TangencyOrEqual)?;
    info!(
      sharpe = result.sharpe,
      volatility = result.volatility,
      provenance = ?result.provenance,
      "max sharpe portfolio"
    );
    Ok(result)
  }

  pub fn max_sharpe_for(&self, estimate: &MarketEstimate) -> Result<PortfolioResult> {
    self.max_sharpe(&estimate.expected_returns, &estimate.covariance)
  }

  /// Global minimum variance portfolio.
  pub fn min_variance(&self, mu: &[f64], cov: &[Vec<f64>]) -> Result<PortfolioResult> {
    validate_inputs(mu, cov)?;
    let problem = Problem::new(mu, cov, self.config.risk_free, Objective::MinVariance);
    self
      .chain
      .optimize(OptimizerMethod::MinVariance, &problem, FallbackPolicy::EqualWeight)
  }
}

//! # Multi-Objective Optimizer
//!
//! $$
//! \max_{\mathbf{w}}\ \lambda\,\mathbf{w}^\top s + (1-\lambda)\,\frac{\mathbf{w}^\top\mu-r_f}{\sigma_p},
//! \qquad
//! \min_{\mathbf{w}} \sum_i\Big(\frac{w_i(\Sigma\mathbf{w})_i}{\mathbf{w}^\top\Sigma\mathbf{w}}-\frac1n\Big)^2
//! $$
//!
//! Risk-constrained Sharpe, stability blend, risk parity (plain and
//! return-boosted) and hierarchical risk parity over one solver chain. Every
//! strategy falls back to equal weights when no backend converges.

use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use super::fallback::FallbackPolicy;
use super::fallback::SolverChain;
use super::hierarchical::allocate;
use super::hierarchical::correlation_clusters;
use super::hierarchical::ClusterBudget;
use super::sharpe::OptimizerConfig;
use super::solver::Constraints;
use super::solver::Objective;
use super::solver::Problem;
use super::types::OptimizerMethod;
use super::types::PortfolioResult;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::stats::corr_from_cov;
use crate::stats::estimate::validate_inputs;
use crate::stats::ReturnTable;
use crate::traits::Report;

/// Parameters of the multi-objective strategies.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiObjectiveConfig {
  /// Volatility cap for the risk-constrained Sharpe strategy.
  pub max_volatility: f64,
  /// Weight `λ` of the stability term in the stability blend.
  pub stability_weight: f64,
  /// Return tilt of the boosted risk parity objective.
  pub return_boost: f64,
  /// Correlation above which clusters merge.
  pub correlation_threshold: f64,
  pub cluster_budget: ClusterBudget,
}

impl Default for MultiObjectiveConfig {
  fn default() -> Self {
    Self {
      max_volatility: 0.15,
      stability_weight: 0.3,
      return_boost: 0.1,
      correlation_threshold: 0.5,
      cluster_budget: ClusterBudget::EqualRisk,
    }
  }
}

impl MultiObjectiveConfig {
  pub fn validate(&self) -> Result<()> {
    if !(self.max_volatility > 0.0 && self.max_volatility.is_finite()) {
      return Err(PortfolioError::invalid("max_volatility", "must be positive"));
    }
    if !(0.0..=1.0).contains(&self.stability_weight) {
      return Err(PortfolioError::invalid("stability_weight", "must lie in [0, 1]"));
    }
    if !(self.return_boost >= 0.0 && self.return_boost.is_finite()) {
      return Err(PortfolioError::invalid("return_boost", "must be non-negative"));
    }
    if !(-1.0..=1.0).contains(&self.correlation_threshold) {
      return Err(PortfolioError::invalid("correlation_threshold", "must lie in [-1, 1]"));
    }
    Ok(())
  }
}

/// Outcome of running several strategies on the same inputs.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MethodComparison {
  pub results: Vec<PortfolioResult>,
  /// Strategies that failed, with the error message.
  pub failures: Vec<(OptimizerMethod, String)>,
}

impl Report for MethodComparison {}

impl MethodComparison {
  pub fn get(&self, method: OptimizerMethod) -> Option<&PortfolioResult> {
    self.results.iter().find(|r| r.method == method)
  }

  pub fn best_by_sharpe(&self) -> Option<&PortfolioResult> {
    self.results.iter().max_by(|a, b| a.sharpe.total_cmp(&b.sharpe))
  }
}

#[derive(Debug)]
pub struct MultiObjectiveOptimizer {
  optimizer: OptimizerConfig,
  config: MultiObjectiveConfig,
  chain: SolverChain,
}

impl MultiObjectiveOptimizer {
  pub fn new(optimizer: OptimizerConfig, config: MultiObjectiveConfig) -> Result<Self> {
    config.validate()?;
    let chain = optimizer.chain()?;
    Ok(Self {
      optimizer,
      config,
      chain,
    })
  }

  pub fn config(&self) -> &MultiObjectiveConfig {
    &self.config
  }

  fn run(&self, method: OptimizerMethod, problem: Problem) -> Result<PortfolioResult> {
    let result = self.chain.optimize(method, &problem, FallbackPolicy::EqualWeight)?;
    info!(%method, sharpe = result.sharpe, volatility = result.volatility, "strategy finished");
    Ok(result)
  }

  /// Sharpe maximization with `σ_p <= max_volatility`.
  pub fn max_sharpe_constrained(&self, mu: &[f64], cov: &[Vec<f64>]) -> Result<PortfolioResult> {
    validate_inputs(mu, cov)?;
    let problem = Problem::new(mu, cov, self.optimizer.risk_free, Objective::MaxSharpe).with_constraints(
      Constraints {
        max_volatility: Some(self.config.max_volatility),
        ..Constraints::default()
      },
    );
    self.run(OptimizerMethod::RiskConstrainedSharpe, problem)
  }

  /// Blend of Sharpe ratio and stability, where an instrument's stability is
  /// the negative of its daily return standard deviation.
  pub fn stable_returns(
    &self,
    mu: &[f64],
    cov: &[Vec<f64>],
    returns: &ReturnTable,
  ) -> Result<PortfolioResult> {
    validate_inputs(mu, cov)?;
    if returns.n_assets() != mu.len() {
      return Err(PortfolioError::DimensionMismatch {
        context: "return table columns",
        expected: mu.len(),
        actual: returns.n_assets(),
      });
    }
    let stability: Vec<f64> = returns.daily_std().iter().map(|s| -s).collect();
    let problem = Problem::new(
      mu,
      cov,
      self.optimizer.risk_free,
      Objective::StabilityBlend {
        stability,
        lambda: self.config.stability_weight,
      },
    );
    self.run(OptimizerMethod::StableReturns, problem)
  }

  /// Equal shares of total portfolio risk.
  pub fn risk_parity(&self, mu: &[f64], cov: &[Vec<f64>]) -> Result<PortfolioResult> {
    validate_inputs(mu, cov)?;
    let problem = Problem::new(mu, cov, self.optimizer.risk_free, Objective::RiskParity);
    self.run(OptimizerMethod::RiskParity, problem)
  }

  /// Risk parity tilted towards instruments with higher expected return.
  pub fn boosted_risk_parity(&self, mu: &[f64], cov: &[Vec<f64>]) -> Result<PortfolioResult> {
    validate_inputs(mu, cov)?;
    let problem = Problem::new(
      mu,
      cov,
      self.optimizer.risk_free,
      Objective::BoostedRiskParity {
        boost: self.config.return_boost,
      },
    );
    self.run(OptimizerMethod::BoostedRiskParity, problem)
  }

  /// Hierarchical risk parity over correlation clusters of `cov`.
  pub fn hierarchical_risk_parity(&self, mu: &[f64], cov: &[Vec<f64>]) -> Result<PortfolioResult> {
    validate_inputs(mu, cov)?;
    let corr = corr_from_cov(cov);
    let alloc = allocate(
      &self.chain,
      mu,
      cov,
      &corr,
      self.optimizer.risk_free,
      self.config.correlation_threshold,
      self.config.cluster_budget,
    )?;
    info!(clusters = alloc.clusters.len(), "hierarchical risk parity");
    PortfolioResult::evaluate(
      OptimizerMethod::HierarchicalRiskParity,
      alloc.provenance,
      alloc.weights,
      mu,
      cov,
      self.optimizer.risk_free,
    )
  }

  /// Correlation clusters used by [`Self::hierarchical_risk_parity`].
  pub fn clusters(&self, cov: &[Vec<f64>]) -> Vec<Vec<usize>> {
    correlation_clusters(&corr_from_cov(cov), self.config.correlation_threshold)
  }

  /// Run every strategy; failures are recorded and skipped.
  ///
  /// The stability blend needs daily returns and runs only when they are given.
  pub fn compare_methods(
    &self,
    mu: &[f64],
    cov: &[Vec<f64>],
    returns: Option<&ReturnTable>,
  ) -> MethodComparison {
    let mut comparison = MethodComparison::default();
    let mut record = |method: OptimizerMethod, outcome: Result<PortfolioResult>| match outcome {
      Ok(result) => comparison.results.push(result),
      Err(err) => {
        warn!(%method, %err, "strategy failed during comparison");
        comparison.failures.push((method, err.to_string()));
      }
    };

    record(
      OptimizerMethod::RiskConstrainedSharpe,
      self.max_sharpe_constrained(mu, cov),
    );
    if let Some(returns) = returns {
      record(OptimizerMethod::StableReturns, self.stable_returns(mu, cov, returns));
    }
    record(OptimizerMethod::RiskParity, self.risk_parity(mu, cov));
    record(OptimizerMethod::BoostedRiskParity, self.boosted_risk_parity(mu, cov));
    record(
      OptimizerMethod::HierarchicalRiskParity,
      self.hierarchical_risk_parity(mu, cov),
    );

    comparison
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;
  use crate::quant::portfolio::data::mat_vec_mul;
  use crate::quant::portfolio::types::Provenance;

  fn market() -> (Vec<f64>, Vec<Vec<f64>>) {
    (
      vec![0.08, 0.12, 0.06],
      vec![
        vec![0.04, 0.006, 0.002],
        vec![0.006, 0.09, 0.01],
        vec![0.002, 0.01, 0.0225],
      ],
    )
  }

  fn optimizer() -> MultiObjectiveOptimizer {
    MultiObjectiveOptimizer::new(OptimizerConfig::default(), MultiObjectiveConfig::default()).unwrap()
  }

  #[test]
  fn risk_parity_contributions_are_equal() {
    let (mu, cov) = market();
    let res = optimizer().risk_parity(&mu, &cov).unwrap();
    let sigma_w = mat_vec_mul(&cov, &res.weights);
    let rc: Vec<f64> = res.weights.iter().zip(&sigma_w).map(|(w, s)| w * s).collect();

    for r in &rc[1..] {
      assert_relative_eq!(*r, rc[0], max_relative = 1e-3);
    }
  }

  #[test]
  fn volatility_cap_is_honoured() {
    let (mu, cov) = market();
    let opt = MultiObjectiveOptimizer::new(
      OptimizerConfig::default(),
      MultiObjectiveConfig {
        max_volatility: 0.13,
        ..MultiObjectiveConfig::default()
      },
    )
    .unwrap();
    let res = opt.max_sharpe_constrained(&mu, &cov).unwrap();

    assert!(matches!(res.provenance, Provenance::Solver { .. }));
    assert!(res.volatility <= 0.13 + 1e-6);
  }

  #[test]
  fn unreachable_volatility_cap_falls_back_to_equal_weights() {
    let (mu, cov) = market();
    let opt = MultiObjectiveOptimizer::new(
      OptimizerConfig::default(),
      MultiObjectiveConfig {
        max_volatility: 0.05,
        ..MultiObjectiveConfig::default()
      },
    )
    .unwrap();
    let res = opt.max_sharpe_constrained(&mu, &cov).unwrap();

    assert_eq!(res.provenance, Provenance::EqualWeight);
    assert_eq!(res.weights, vec![1.0 / 3.0; 3]);
  }

  #[test]
  fn boosted_risk_parity_tilts_towards_return() {
    let (mu, cov) = market();
    let plain = optimizer().risk_parity(&mu, &cov).unwrap();
    let boosted = optimizer().boosted_risk_parity(&mu, &cov).unwrap();

    assert!(boosted.expected_return >= plain.expected_return - 1e-9);
  }

  #[test]
  fn stability_blend_prefers_calm_instruments_when_fully_weighted() {
    let (mu, cov) = market();
    let returns = ReturnTable::from_columns(
      vec!["A".into(), "B".into(), "C".into()],
      &[
        vec![0.01, -0.01, 0.012, -0.008],
        vec![0.04, -0.05, 0.03, -0.02],
        vec![0.001, -0.001, 0.002, 0.0],
      ],
    )
    .unwrap();
    let opt = MultiObjectiveOptimizer::new(
      OptimizerConfig::default(),
      MultiObjectiveConfig {
        stability_weight: 1.0,
        ..MultiObjectiveConfig::default()
      },
    )
    .unwrap();
    let res = opt.stable_returns(&mu, &cov, &returns).unwrap();

    assert!(res.weights[2] > 0.99);
  }

  #[test]
  fn comparison_runs_every_strategy() {
    let (mu, cov) = market();
    let cmp = optimizer().compare_methods(&mu, &cov, None);

    assert_eq!(cmp.results.len(), 4);
    assert!(cmp.failures.is_empty());
    assert!(cmp.get(OptimizerMethod::HierarchicalRiskParity).is_some());
    assert!(cmp.best_by_sharpe().is_some());
  }

  #[test]
  fn bad_configuration_is_rejected() {
    let err = MultiObjectiveOptimizer::new(
      OptimizerConfig::default(),
      MultiObjectiveConfig {
        stability_weight: 1.5,
        ..MultiObjectiveConfig::default()
      },
    );
    assert!(err.is_err());
  }
}

//! # Portfolio Engine
//!
//! $$
//! (\mu, \Sigma) = \operatorname{Estimate}(R),\qquad
//! \mathbf{w}^\* = \operatorname{Optimize}_m(\mu, \Sigma),\qquad
//! \operatorname{Risk}(R\mathbf{w}^\*, \mathbf{w}^\*)
//! $$
//!
//! Single entry point wiring statistics, optimizers, risk and rebalancing
//! together under one explicit configuration.

use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::frontier::EfficientFrontier;
use super::multi_objective::MethodComparison;
use super::multi_objective::MultiObjectiveConfig;
use super::multi_objective::MultiObjectiveOptimizer;
use super::sharpe::OptimizerConfig;
use super::sharpe::SharpeOptimizer;
use super::signal::NamedSignal;
use super::signal::SignalConfig;
use super::signal::SignalEnhancedResult;
use super::signal::SignalOptimizer;
use super::types::OptimizerMethod;
use super::types::PortfolioResult;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::quant::rebalance::RebalanceAdvisor;
use crate::quant::rebalance::RebalanceConfig;
use crate::quant::rebalance::RebalancePlan;
use crate::quant::risk::performance::evaluate_performance;
use crate::quant::risk::PerformanceConfig;
use crate::quant::risk::PerformanceMetrics;
use crate::quant::risk::RiskAnalyzer;
use crate::quant::risk::RiskConfig;
use crate::quant::risk::RiskReport;
use crate::stats::annualized_stats;
use crate::stats::MarketEstimate;
use crate::stats::ReturnTable;
use crate::stats::StatsConfig;

/// Settings for [`PortfolioEngine`], grouped by the component they feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioEngineConfig {
  /// Method used by [`PortfolioEngine::optimize`].
  pub method: OptimizerMethod,
  pub stats: StatsConfig,
  pub optimizer: OptimizerConfig,
  pub multi_objective: MultiObjectiveConfig,
  pub signal: SignalConfig,
  pub risk: RiskConfig,
  pub rebalance: RebalanceConfig,
  /// Points on the efficient frontier.
  pub frontier_points: usize,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      method: OptimizerMethod::MaxSharpe,
      stats: StatsConfig::default(),
      optimizer: OptimizerConfig::default(),
      multi_objective: MultiObjectiveConfig::default(),
      signal: SignalConfig::default(),
      risk: RiskConfig::default(),
      rebalance: RebalanceConfig::default(),
      frontier_points: 50,
    }
  }
}

/// Ties the estimators, optimizers and risk analyzer to one configuration.
///
/// Holds no market data; every call takes the return table it works on.
#[derive(Debug)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
  sharpe: SharpeOptimizer,
  multi_objective: MultiObjectiveOptimizer,
  signal: SignalOptimizer,
  risk: RiskAnalyzer,
  rebalance: RebalanceAdvisor,
}

impl PortfolioEngine {
  /// Fails if any section of `config` is out of range.
  pub fn new(config: PortfolioEngineConfig) -> Result<Self> {
    config.stats.validate()?;
    if config.frontier_points == 0 {
      return Err(PortfolioError::invalid("frontier_points", "must be positive"));
    }
    Ok(Self {
      sharpe: SharpeOptimizer::new(config.optimizer.clone())?,
      multi_objective: MultiObjectiveOptimizer::new(config.optimizer.clone(), config.multi_objective)?,
      signal: SignalOptimizer::new(config.optimizer.clone(), config.signal)?,
      risk: RiskAnalyzer::new(config.risk.clone())?,
      rebalance: RebalanceAdvisor::new(config.rebalance)?,
      config,
    })
  }

  /// The configuration this engine was built from.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Annualized expected returns and covariance of a daily return table.
  pub fn estimate(&self, returns: &ReturnTable) -> Result<MarketEstimate> {
    annualized_stats(returns, &self.config.stats)
  }

  /// Optimize with the configured method.
  pub fn optimize(&self, estimate: &MarketEstimate, returns: Option<&ReturnTable>) -> Result<PortfolioResult> {
    self.optimize_with(self.config.method, estimate, returns)
  }

  /// Optimize with an explicit method. The stability blend needs the daily
  /// return table; signal-enhanced optimization goes through
  /// [`Self::optimize_signals`].
  pub fn optimize_with(
    &self,
    method: OptimizerMethod,
    estimate: &MarketEstimate,
    returns: Option<&ReturnTable>,
  ) -> Result<PortfolioResult> {
    let mu = &estimate.expected_returns;
    let cov = &estimate.covariance;
    debug!(%method, assets = mu.len(), "optimizing");

    match method {
      OptimizerMethod::MaxSharpe => self.sharpe.max_sharpe(mu, cov),
      OptimizerMethod::MinVariance => self.sharpe.min_variance(mu, cov),
      OptimizerMethod::RiskConstrainedSharpe => self.multi_objective.max_sharpe_constrained(mu, cov),
      OptimizerMethod::StableReturns => {
        let returns = returns.ok_or_else(|| {
          PortfolioError::invalid("returns", "the stability blend needs the daily return table")
        })?;
        self.multi_objective.stable_returns(mu, cov, returns)
      }
      OptimizerMethod::RiskParity => self.multi_objective.risk_parity(mu, cov),
      OptimizerMethod::BoostedRiskParity => self.multi_objective.boosted_risk_parity(mu, cov),
      OptimizerMethod::HierarchicalRiskParity => self.multi_objective.hierarchical_risk_parity(mu, cov),
      OptimizerMethod::SignalEnhanced => Err(PortfolioError::invalid(
        "method",
        "signal-enhanced optimization needs signals, use optimize_signals",
      )),
    }
  }

  pub fn optimize_signals(
    &self,
    estimate: &MarketEstimate,
    signals: &[NamedSignal],
  ) -> Result<SignalEnhancedResult> {
    self
      .signal
      .optimize(&estimate.expected_returns, &estimate.covariance, signals)
  }

  pub fn efficient_frontier(&self, estimate: &MarketEstimate) -> Result<EfficientFrontier> {
    self.sharpe.efficient_frontier(
      &estimate.expected_returns,
      &estimate.covariance,
      self.config.frontier_points,
    )
  }

  pub fn compare_methods(&self, estimate: &MarketEstimate, returns: Option<&ReturnTable>) -> MethodComparison {
    self
      .multi_objective
      .compare_methods(&estimate.expected_returns, &estimate.covariance, returns)
  }

  /// Estimate and optimize independent universes in parallel with the
  /// configured method. Failed universes are logged and skipped; results keep
  /// their input index.
  pub fn optimize_many(&self, universes: &[ReturnTable]) -> Vec<(usize, PortfolioResult)> {
    universes
      .par_iter()
      .enumerate()
      .filter_map(|(i, table)| {
        let outcome = self
          .estimate(table)
          .and_then(|estimate| self.optimize(&estimate, Some(table)));
        match outcome {
          Ok(result) => Some((i, result)),
          Err(err) => {
            warn!(universe = i, %err, "universe skipped");
            None
          }
        }
      })
      .collect()
  }

  /// Risk report for `weights` held over the table's history.
  pub fn risk_report(&self, returns: &ReturnTable, weights: &[f64]) -> Result<RiskReport> {
    self.risk.report_for_table(returns, weights)
  }

  /// Realized performance of `weights` held over the table's history.
  pub fn performance(&self, returns: &ReturnTable, weights: &[f64]) -> Result<PerformanceMetrics> {
    let series = returns.portfolio_returns(weights)?;
    evaluate_performance(
      &series.to_vec(),
      &PerformanceConfig {
        trading_days: self.config.stats.trading_days,
        risk_free: self.config.optimizer.risk_free,
      },
    )
  }

  pub fn rebalance(
    &self,
    estimate: &MarketEstimate,
    current: &[f64],
    target: &[f64],
    portfolio_value: f64,
    prices: Option<&[f64]>,
  ) -> Result<RebalancePlan> {
    self
      .rebalance
      .plan(&estimate.names, current, target, portfolio_value, prices)
  }
}

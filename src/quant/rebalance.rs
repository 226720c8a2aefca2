//! # Rebalancing
//!
//! $$
//! \Delta w_i = w^{\ast}_i - w_i,\qquad
//! \text{turnover} = \tfrac12\sum_i |\Delta w_i|,\qquad
//! \text{cost}_i = c\,|\Delta w_i|\,V
//! $$
//!
//! Decides whether a live portfolio has drifted far enough from its target
//! to trade, and what to trade.

use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::traits::Report;

/// Unrealized return below which a holding is a harvesting candidate.
const HARVEST_LOSS: f64 = -0.05;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RebalanceConfig {
  /// Largest tolerated `|Δw|` before a rebalance is due.
  pub threshold: f64,
  /// Proportional cost per unit of traded notional.
  pub transaction_cost: f64,
  /// Trades with a smaller notional are dropped.
  pub min_trade_value: f64,
  /// Relative tolerance around the target volatility.
  pub volatility_band: f64,
}

impl Default for RebalanceConfig {
  fn default() -> Self {
    Self {
      threshold: 0.05,
      transaction_cost: 0.001,
      min_trade_value: 1000.0,
      volatility_band: 0.2,
    }
  }
}

impl RebalanceConfig {
  pub fn validate(&self) -> Result<()> {
    if !(self.threshold >= 0.0 && self.threshold.is_finite()) {
      return Err(PortfolioError::invalid("threshold", "must be non-negative"));
    }
    if !(self.transaction_cost >= 0.0 && self.transaction_cost.is_finite()) {
      return Err(PortfolioError::invalid("transaction_cost", "must be non-negative"));
    }
    if !(self.min_trade_value >= 0.0 && self.min_trade_value.is_finite()) {
      return Err(PortfolioError::invalid("min_trade_value", "must be non-negative"));
    }
    if !(self.volatility_band >= 0.0 && self.volatility_band < 1.0) {
      return Err(PortfolioError::invalid("volatility_band", "must lie in [0, 1)"));
    }
    Ok(())
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
  Buy,
  Sell,
}

impl Display for TradeAction {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Self::Buy => "BUY",
      Self::Sell => "SELL",
    })
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Trade {
  pub instrument: String,
  pub action: TradeAction,
  pub weight_change: f64,
  /// Signed notional, positive for a purchase.
  pub trade_value: f64,
  pub cost: f64,
  /// Signed number of units when a price was supplied.
  pub units: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RebalancePlan {
  /// `|Δw|` per instrument.
  pub deviations: Vec<f64>,
  pub max_deviation: f64,
  pub mean_deviation: f64,
  pub needs_rebalance: bool,
  /// Empty unless `needs_rebalance`.
  pub trades: Vec<Trade>,
  pub total_turnover: f64,
  pub total_cost: f64,
  /// Total cost as a fraction of portfolio value.
  pub total_cost_pct: f64,
}

impl Report for RebalancePlan {}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct VolatilityCheck {
  pub current: f64,
  pub target: f64,
  pub ratio: f64,
  pub needs_rebalance: bool,
}

/// Per-instrument notional of a cash flow.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "amounts", rename_all = "snake_case")]
pub enum CashFlowAllocation {
  /// Inflow split by target weights.
  Invest(Vec<f64>),
  /// Outflow taken pro rata to current weights.
  Withdraw(Vec<f64>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaxLossOpportunity {
  pub instrument: String,
  /// `(price - cost) / cost`.
  pub unrealized_return: f64,
  pub weight: f64,
  /// Tax saved per unit of portfolio value.
  pub tax_saving: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaxLossReport {
  pub opportunities: Vec<TaxLossOpportunity>,
  pub total_tax_saving: f64,
  pub tax_rate: f64,
}

impl Report for TaxLossReport {}

#[derive(Clone, Debug)]
pub struct RebalanceAdvisor {
  config: RebalanceConfig,
}

fn check_weights(name: &'static str, w: &[f64], n: usize) -> Result<()> {
  if w.len() != n {
    return Err(PortfolioError::DimensionMismatch {
      context: name,
      expected: n,
      actual: w.len(),
    });
  }
  if w.iter().any(|x| !x.is_finite()) {
    return Err(PortfolioError::NonFinite(name));
  }
  Ok(())
}

impl RebalanceAdvisor {
  pub fn new(config: RebalanceConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &RebalanceConfig {
    &self.config
  }

  /// Compare current with target weights and derive the trade list.
  pub fn plan(
    &self,
    names: &[String],
    current: &[f64],
    target: &[f64],
    portfolio_value: f64,
    prices: Option<&[f64]>,
  ) -> Result<RebalancePlan> {
    let n = names.len();
    if n == 0 {
      return Err(PortfolioError::EmptyInput("instruments"));
    }
    check_weights("current weights", current, n)?;
    check_weights("target weights", target, n)?;
    if !(portfolio_value > 0.0 && portfolio_value.is_finite()) {
      return Err(PortfolioError::invalid("portfolio_value", "must be positive"));
    }
    if let Some(p) = prices {
      check_weights("prices", p, n)?;
      if p.iter().any(|x| *x <= 0.0) {
        return Err(PortfolioError::invalid("prices", "must be positive"));
      }
    }

    let changes: Vec<f64> = target.iter().zip(current).map(|(t, c)| t - c).collect();
    let deviations: Vec<f64> = changes.iter().map(|d| d.abs()).collect();
    let max_deviation = deviations.iter().cloned().fold(0.0, f64::max);
    let mean_deviation = deviations.iter().sum::<f64>() / n as f64;
    let needs_rebalance = max_deviation > self.config.threshold;
    let total_turnover = 0.5 * deviations.iter().sum::<f64>();

    let mut trades = Vec::new();
    if needs_rebalance {
      for (i, &dw) in changes.iter().enumerate() {
        let trade_value = dw * portfolio_value;
        if dw == 0.0 || trade_value.abs() < self.config.min_trade_value {
          debug!(instrument = %names[i], trade_value, "trade below minimum size skipped");
          continue;
        }
        trades.push(Trade {
          instrument: names[i].clone(),
          action: if dw > 0.0 { TradeAction::Buy } else { TradeAction::Sell },
          weight_change: dw,
          trade_value,
          cost: trade_value.abs() * self.config.transaction_cost,
          units: prices.map(|p| trade_value / p[i]),
        });
      }
    }
    let total_cost: f64 = trades.iter().map(|t| t.cost).sum();
    info!(
      needs_rebalance,
      max_deviation,
      trades = trades.len(),
      total_cost,
      "rebalance plan"
    );

    Ok(RebalancePlan {
      deviations,
      max_deviation,
      mean_deviation,
      needs_rebalance,
      trades,
      total_turnover,
      total_cost,
      total_cost_pct: total_cost / portfolio_value,
    })
  }

  /// Flag a rebalance when realized volatility leaves `target · (1 ± band)`.
  pub fn volatility_check(&self, current: f64, target: f64) -> Result<VolatilityCheck> {
    if !(current >= 0.0 && current.is_finite()) {
      return Err(PortfolioError::invalid("current volatility", "must be non-negative"));
    }
    if !(target > 0.0 && target.is_finite()) {
      return Err(PortfolioError::invalid("target volatility", "must be positive"));
    }
    let band = self.config.volatility_band;
    Ok(VolatilityCheck {
      current,
      target,
      ratio: current / target,
      needs_rebalance: current > target * (1.0 + band) || current < target * (1.0 - band),
    })
  }

  /// Split a cash flow across instruments: inflows follow the target, outflows
  /// the current holdings.
  pub fn allocate_cash_flow(
    &self,
    current: &[f64],
    target: &[f64],
    cash_flow: f64,
  ) -> Result<CashFlowAllocation> {
    check_weights("target weights", target, current.len())?;
    check_weights("current weights", current, current.len())?;
    if !cash_flow.is_finite() {
      return Err(PortfolioError::NonFinite("cash flow"));
    }
    Ok(if cash_flow > 0.0 {
      CashFlowAllocation::Invest(target.iter().map(|w| w * cash_flow).collect())
    } else {
      CashFlowAllocation::Withdraw(current.iter().map(|w| w * cash_flow.abs()).collect())
    })
  }

  /// Holdings whose unrealized loss is deeper than 5%, with the tax a sale
  /// would save.
  ///
  /// $$
  /// r_i = \frac{p_i - c_i}{c_i},\qquad s_i = |r_i|\,w_i\,\tau \quad (r_i < -0.05)
  /// $$
  pub fn tax_loss_harvesting(
    &self,
    names: &[String],
    weights: &[f64],
    cost_basis: &[f64],
    prices: &[f64],
    tax_rate: f64,
  ) -> Result<TaxLossReport> {
    let n = names.len();
    if n == 0 {
      return Err(PortfolioError::EmptyInput("holdings"));
    }
    check_weights("weights", weights, n)?;
    check_weights("cost basis", cost_basis, n)?;
    check_weights("prices", prices, n)?;
    if cost_basis.iter().any(|c| *c <= 0.0) {
      return Err(PortfolioError::invalid("cost_basis", "must be positive"));
    }
    if prices.iter().any(|p| *p <= 0.0) {
      return Err(PortfolioError::invalid("prices", "must be positive"));
    }
    if !(0.0..=1.0).contains(&tax_rate) {
      return Err(PortfolioError::invalid("tax_rate", "must lie in [0, 1]"));
    }

    let opportunities: Vec<TaxLossOpportunity> = (0..n)
      .filter_map(|i| {
        let unrealized_return = (prices[i] - cost_basis[i]) / cost_basis[i];
        (unrealized_return < HARVEST_LOSS).then(|| TaxLossOpportunity {
          instrument: names[i].clone(),
          unrealized_return,
          weight: weights[i],
          tax_saving: unrealized_return.abs() * weights[i] * tax_rate,
        })
      })
      .collect();
    let total_tax_saving = opportunities.iter().map(|o| o.tax_saving).sum();

    info!(
      candidates = opportunities.len(),
      total_tax_saving, "tax loss harvesting scan"
    );
    Ok(TaxLossReport {
      opportunities,
      total_tax_saving,
      tax_rate,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  fn names() -> Vec<String> {
    vec!["a".into(), "b".into(), "c".into()]
  }

  fn advisor() -> RebalanceAdvisor {
    RebalanceAdvisor::new(RebalanceConfig::default()).unwrap()
  }

  #[test]
  fn drift_beyond_threshold_produces_trades() {
    let plan = advisor()
      .plan(&names(), &[0.5, 0.3, 0.2], &[0.4, 0.3, 0.3], 100_000.0, Some(&[50.0, 20.0, 10.0]))
      .unwrap();

    assert!(plan.needs_rebalance);
    assert_eq!(plan.trades.len(), 2);
    assert_eq!(plan.trades[0].action, TradeAction::Sell);
    assert_relative_eq!(plan.trades[0].trade_value, -10_000.0, epsilon = 1e-6);
    assert_relative_eq!(plan.trades[0].units.unwrap(), -200.0, epsilon = 1e-6);
    assert_eq!(plan.trades[1].instrument, "c");
    assert_relative_eq!(plan.total_turnover, 0.1, epsilon = 1e-12);
    assert_relative_eq!(plan.total_cost, 20.0, epsilon = 1e-6);
    assert_relative_eq!(plan.total_cost_pct, 0.0002, epsilon = 1e-12);
  }

  #[test]
  fn small_drift_reports_turnover_without_trades() {
    let plan = advisor()
      .plan(&names(), &[0.34, 0.33, 0.33], &[0.3, 0.35, 0.35], 1_000_000.0, None)
      .unwrap();

    assert!(!plan.needs_rebalance);
    assert!(plan.trades.is_empty());
    assert_relative_eq!(plan.total_turnover, 0.04, epsilon = 1e-12);
    assert_eq!(plan.total_cost, 0.0);
  }

  #[test]
  fn trades_below_minimum_are_dropped() {
    let plan = advisor()
      .plan(&names(), &[0.5, 0.3, 0.2], &[0.4, 0.35, 0.25], 15_000.0, None)
      .unwrap();

    assert!(plan.needs_rebalance);
    let traded: Vec<&str> = plan.trades.iter().map(|t| t.instrument.as_str()).collect();
    assert_eq!(traded, vec!["a"]);
  }

  #[test]
  fn volatility_band_is_two_sided() {
    let adv = advisor();
    assert!(!adv.volatility_check(0.11, 0.10).unwrap().needs_rebalance);
    assert!(adv.volatility_check(0.13, 0.10).unwrap().needs_rebalance);
    assert!(adv.volatility_check(0.07, 0.10).unwrap().needs_rebalance);
    assert!(adv.volatility_check(0.1, 0.0).is_err());
  }

  #[test]
  fn cash_flows_follow_target_in_and_current_out() {
    let adv = advisor();
    let current = [0.5, 0.5];
    let target = [0.2, 0.8];
    assert_eq!(
      adv.allocate_cash_flow(&current, &target, 1000.0).unwrap(),
      CashFlowAllocation::Invest(vec![200.0, 800.0])
    );
    assert_eq!(
      adv.allocate_cash_flow(&current, &target, -1000.0).unwrap(),
      CashFlowAllocation::Withdraw(vec![500.0, 500.0])
    );
  }

  #[test]
  fn mismatched_inputs_are_rejected() {
    let adv = advisor();
    assert!(adv.plan(&names(), &[0.5, 0.5], &[0.3, 0.3, 0.4], 1e5, None).is_err());
    assert!(adv.plan(&names(), &[0.5, 0.3, 0.2], &[0.3, 0.3, 0.4], 0.0, None).is_err());
    assert!(adv
      .plan(&names(), &[0.5, 0.3, 0.2], &[0.3, 0.3, 0.4], 1e5, Some(&[1.0, -1.0, 1.0]))
      .is_err());
  }

  #[test]
  fn losses_deeper_than_five_percent_are_harvested() {
    let report = advisor()
      .tax_loss_harvesting(&names(), &[0.5, 0.3, 0.2], &[100.0, 50.0, 20.0], &[80.0, 49.0, 17.0], 0.2)
      .unwrap();

    let picked: Vec<&str> = report.opportunities.iter().map(|o| o.instrument.as_str()).collect();
    assert_eq!(picked, vec!["a", "c"]);
    assert_relative_eq!(report.opportunities[0].unrealized_return, -0.2, epsilon = 1e-12);
    assert_relative_eq!(report.opportunities[0].tax_saving, 0.2 * 0.5 * 0.2, epsilon = 1e-12);
    assert_relative_eq!(report.opportunities[1].tax_saving, 0.15 * 0.2 * 0.2, epsilon = 1e-12);
    assert_relative_eq!(report.total_tax_saving, 0.02 + 0.006, epsilon = 1e-12);
  }

  #[test]
  fn exact_five_percent_loss_is_not_harvested() {
    let report = advisor()
      .tax_loss_harvesting(&names(), &[0.4, 0.4, 0.2], &[100.0, 100.0, 100.0], &[95.0, 110.0, 100.0], 0.3)
      .unwrap();
    assert!(report.opportunities.is_empty());
    assert_eq!(report.total_tax_saving, 0.0);
    assert!(report.to_value().get("opportunities").is_some());
  }

  #[test]
  fn harvesting_rejects_bad_inputs() {
    let adv = advisor();
    let w = [0.5, 0.3, 0.2];
    assert!(adv.tax_loss_harvesting(&names(), &w, &[1.0, 1.0], &[1.0, 1.0, 1.0], 0.2).is_err());
    assert!(adv.tax_loss_harvesting(&names(), &w, &[1.0, 0.0, 1.0], &[1.0, 1.0, 1.0], 0.2).is_err());
    assert!(adv.tax_loss_harvesting(&names(), &w, &[1.0, 1.0, 1.0], &[1.0, f64::NAN, 1.0], 0.2).is_err());
    assert!(adv.tax_loss_harvesting(&names(), &w, &[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0], 1.5).is_err());
    assert!(adv.tax_loss_harvesting(&[], &[], &[], &[], 0.2).is_err());
  }
}

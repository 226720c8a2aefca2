//! # Performance Evaluation
//!
//! $$
//! R_a = \Big(\prod_t (1+r_t)\Big)^{T/N} - 1,\qquad
//! \sigma_a = s\sqrt T,\qquad
//! \mathrm{Sortino} = \frac{R_a - r_f}{s_{-}\sqrt T},\qquad
//! \mathrm{Calmar} = \frac{R_a}{|\mathrm{MDD}|}
//! $$

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use super::drawdown::DrawdownAnalysis;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::quant::portfolio::data::sharpe_ratio;
use crate::stats::moments::excess_kurtosis;
use crate::stats::moments::skewness;
use crate::stats::sample_std;
use crate::stats::ReturnTable;
use crate::traits::Report;

/// Sample size below which ratios are flagged as unreliable.
const SHORT_HISTORY: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
  pub trading_days: f64,
  pub risk_free: f64,
}

impl Default for PerformanceConfig {
  fn default() -> Self {
    Self {
      trading_days: 252.0,
      risk_free: 0.02,
    }
  }
}

impl PerformanceConfig {
  pub fn validate(&self) -> Result<()> {
    if !(self.trading_days > 0.0 && self.trading_days.is_finite()) {
      return Err(PortfolioError::invalid("trading_days", "must be positive"));
    }
    if !self.risk_free.is_finite() {
      return Err(PortfolioError::NonFinite("risk_free"));
    }
    Ok(())
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PerformanceMetrics {
  pub annual_return: f64,
  pub annual_volatility: f64,
  pub sharpe: f64,
  pub max_drawdown: f64,
  pub calmar: f64,
  pub sortino: f64,
  pub skewness: f64,
  pub excess_kurtosis: f64,
}

impl Report for PerformanceMetrics {}

/// Ratio with a zero denominator mapped to `±∞` by the numerator's sign.
fn signed_ratio(num: f64, den: f64) -> f64 {
  if den > 1e-15 {
    num / den
  } else if num > 0.0 {
    f64::INFINITY
  } else if num < 0.0 {
    f64::NEG_INFINITY
  } else {
    0.0
  }
}

/// Realized performance of a daily return series.
pub fn evaluate_performance(returns: &[f64], config: &PerformanceConfig) -> Result<PerformanceMetrics> {
  config.validate()?;
  if returns.is_empty() {
    return Err(PortfolioError::EmptyInput("returns"));
  }
  if returns.len() < SHORT_HISTORY {
    warn!(periods = returns.len(), "short return history, ratios are unreliable");
  }
  if returns.iter().any(|r| r.abs() > 1.0) {
    warn!("return series contains moves beyond 100%");
  }

  let drawdown = DrawdownAnalysis::from_returns(returns)?;
  let growth: f64 = returns.iter().map(|r| 1.0 + r).product();
  let annual_return = growth.powf(config.trading_days / returns.len() as f64) - 1.0;
  let annual_volatility = sample_std(returns) * config.trading_days.sqrt();

  let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
  let downside_volatility = sample_std(&downside) * config.trading_days.sqrt();

  Ok(PerformanceMetrics {
    annual_return,
    annual_volatility,
    sharpe: sharpe_ratio(annual_return, annual_volatility, config.risk_free),
    max_drawdown: drawdown.max_drawdown,
    calmar: signed_ratio(annual_return, drawdown.max_drawdown.abs()),
    sortino: signed_ratio(annual_return - config.risk_free, downside_volatility),
    skewness: skewness(returns),
    excess_kurtosis: excess_kurtosis(returns),
  })
}

/// Per-instrument performance, in column order.
pub fn evaluate_instruments(
  table: &ReturnTable,
  config: &PerformanceConfig,
) -> Result<Vec<(String, PerformanceMetrics)>> {
  table
    .names()
    .iter()
    .enumerate()
    .map(|(i, name)| {
      let column = table
        .column(i)
        .ok_or(PortfolioError::EmptyInput("return column"))?
        .to_vec();
      Ok((name.clone(), evaluate_performance(&column, config)?))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use tracing_test::traced_test;

  use super::*;

  fn series() -> Vec<f64> {
    (0..252)
      .map(|i| 0.0005 + 0.01 * ((i as f64) * 0.9).sin())
      .collect()
  }

  #[test]
  fn annualizes_geometrically() {
    let r = vec![0.001; 252];
    let m = evaluate_performance(&r, &PerformanceConfig::default()).unwrap();
    assert_relative_eq!(m.annual_return, 1.001_f64.powi(252) - 1.0, epsilon = 1e-12);
    assert_eq!(m.max_drawdown, 0.0);
    assert_eq!(m.calmar, f64::INFINITY);
    assert_eq!(m.sharpe, f64::INFINITY);
  }

  #[test]
  fn ratios_are_consistent() {
    let r = series();
    let cfg = PerformanceConfig::default();
    let m = evaluate_performance(&r, &cfg).unwrap();

    assert_relative_eq!(m.annual_volatility, sample_std(&r) * 252.0_f64.sqrt(), epsilon = 1e-12);
    assert_relative_eq!(m.sharpe, (m.annual_return - cfg.risk_free) / m.annual_volatility, epsilon = 1e-12);
    assert!(m.max_drawdown < 0.0);
    assert_relative_eq!(m.calmar, m.annual_return / m.max_drawdown.abs(), epsilon = 1e-12);
    assert!(m.sortino.is_finite());
  }

  #[test]
  #[traced_test]
  fn short_history_is_flagged() {
    let _ = evaluate_performance(&[0.01, -0.02, 0.005], &PerformanceConfig::default()).unwrap();
    assert!(logs_contain("short return history"));
  }

  #[test]
  fn evaluates_each_instrument() {
    let table = ReturnTable::from_columns(
      vec!["a".into(), "b".into()],
      &[series(), series().iter().map(|r| r * 0.5).collect()],
    )
    .unwrap();
    let res = evaluate_instruments(&table, &PerformanceConfig::default()).unwrap();
    assert_eq!(res.len(), 2);
    assert_eq!(res[1].0, "b");
    assert!(res[1].1.annual_volatility < res[0].1.annual_volatility);
  }
}

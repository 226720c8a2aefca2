//! # Stress Scenarios
//!
//! $$
//! r_{\text{stress}} = \frac{P_0(1+\text{shock}) - P_0}{P_0},\qquad P_0 = 100
//! $$
//!
//! Each scenario's return is ranked against the historical return sample.

use impl_new_derive::ImplNew;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::stats::moments::percentile_of_score;

/// Reference price the shocks are applied to.
const REFERENCE_PRICE: f64 = 100.0;

#[derive(ImplNew, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
  pub name: String,
  /// Instantaneous relative price change, negative for a fall.
  pub shock: f64,
  /// Nominal length of the episode in trading days.
  pub duration: u32,
}

/// Market crash, moderate decline, flash crash and bear market.
pub fn default_scenarios() -> Vec<StressScenario> {
  vec![
    StressScenario::new("market_crash".into(), -0.30, 22),
    StressScenario::new("moderate_decline".into(), -0.15, 15),
    StressScenario::new("flash_crash".into(), -0.10, 1),
    StressScenario::new("bear_market".into(), -0.40, 126),
  ]
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StressResult {
  pub scenario: String,
  pub portfolio_return: f64,
  /// Percentile rank (0..100) of the stressed return among historical returns.
  pub historical_percentile: f64,
  pub duration: u32,
}

pub fn stress_test(returns: &[f64], scenarios: &[StressScenario]) -> Result<Vec<StressResult>> {
  if returns.is_empty() {
    return Err(PortfolioError::EmptyInput("returns"));
  }

  scenarios
    .iter()
    .map(|s| {
      if !(s.shock.is_finite() && s.shock >= -1.0) {
        return Err(PortfolioError::invalid("shock", format!("scenario {} must lie in [-1, inf)", s.name)));
      }
      let stressed = REFERENCE_PRICE * (1.0 + s.shock);
      let portfolio_return = (stressed - REFERENCE_PRICE) / REFERENCE_PRICE;
      Ok(StressResult {
        scenario: s.name.clone(),
        portfolio_return,
        historical_percentile: percentile_of_score(returns, portfolio_return),
        duration: s.duration,
      })
    })
    .collect()
}

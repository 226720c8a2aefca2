//! # Value at Risk
//!
//! $$
//! \mathrm{VaR}_c = Q_{1-c}(r),\qquad
//! \mathrm{CVaR}_c = \mathbb E[r \mid r \le \mathrm{VaR}_c],\qquad
//! \mathrm{CVaR}^{\mathcal N}_c = \bar r - s\,\frac{\varphi(z_{1-c})}{1-c}
//! $$
//!
//! Returns are signed, so both measures are negative for a loss.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use serde::Deserialize;
use serde::Serialize;
use statrs::distribution::Continuous;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::stats::moments::quantile_sorted;
use crate::stats::sample_mean;
use crate::stats::sample_std;

/// How the return distribution is modelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarMethod {
  /// Empirical quantile of the observed returns.
  Historical,
  /// Normal with the sample mean and standard deviation.
  Parametric,
  /// Seeded normal draws with the sample mean and standard deviation.
  MonteCarlo { simulations: usize, seed: u64 },
}

impl VarMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Historical => "historical",
      Self::Parametric => "parametric",
      Self::MonteCarlo { .. } => "monte_carlo",
    }
  }
}

/// VaR and CVaR at one confidence level.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TailRisk {
  pub confidence: f64,
  pub var_historical: f64,
  pub cvar_historical: f64,
  pub var_parametric: f64,
  pub cvar_parametric: f64,
}

fn check(returns: &[f64], confidence: f64) -> Result<()> {
  if returns.is_empty() {
    return Err(PortfolioError::EmptyInput("returns"));
  }
  if returns.iter().any(|r| !r.is_finite()) {
    return Err(PortfolioError::NonFinite("returns"));
  }
  if !(confidence > 0.0 && confidence < 1.0) {
    return Err(PortfolioError::invalid("confidence", "must lie in (0, 1)"));
  }
  Ok(())
}

fn standard_normal() -> Result<Normal> {
  Normal::new(0.0, 1.0).map_err(|e| PortfolioError::Degenerate(e.to_string()))
}

fn simulate(returns: &[f64], simulations: usize, seed: u64) -> Result<Vec<f64>> {
  if simulations == 0 {
    return Err(PortfolioError::invalid("simulations", "must be positive"));
  }
  let dist = rand_distr::Normal::new(sample_mean(returns), sample_std(returns))
    .map_err(|e| PortfolioError::Degenerate(e.to_string()))?;
  let mut rng = StdRng::seed_from_u64(seed);
  let mut draws: Vec<f64> = dist.sample_iter(&mut rng).take(simulations).collect();
  draws.sort_by(f64::total_cmp);
  Ok(draws)
}

fn sorted(returns: &[f64]) -> Vec<f64> {
  let mut v = returns.to_vec();
  v.sort_by(f64::total_cmp);
  v
}

/// Mean of the sorted sample at or below `threshold`.
fn tail_mean(sorted: &[f64], threshold: f64) -> f64 {
  let tail: Vec<f64> = sorted.iter().copied().take_while(|&r| r <= threshold).collect();
  if tail.is_empty() {
    threshold
  } else {
    sample_mean(&tail)
  }
}

/// The `(1 - confidence)` quantile of returns.
pub fn value_at_risk(returns: &[f64], confidence: f64, method: VarMethod) -> Result<f64> {
  check(returns, confidence)?;
  let p = 1.0 - confidence;
  match method {
    VarMethod::Historical => Ok(quantile_sorted(&sorted(returns), p)),
    VarMethod::Parametric => {
      let z = standard_normal()?.inverse_cdf(p);
      Ok(sample_mean(returns) + z * sample_std(returns))
    }
    VarMethod::MonteCarlo { simulations, seed } => {
      Ok(quantile_sorted(&simulate(returns, simulations, seed)?, p))
    }
  }
}

/// Expected return in the tail beyond the VaR threshold.
pub fn conditional_value_at_risk(returns: &[f64], confidence: f64, method: VarMethod) -> Result<f64> {
  check(returns, confidence)?;
  let p = 1.0 - confidence;
  match method {
    VarMethod::Historical => {
      let s = sorted(returns);
      Ok(tail_mean(&s, quantile_sorted(&s, p)))
    }
    VarMethod::Parametric => {
      let n = standard_normal()?;
      let z = n.inverse_cdf(p);
      Ok(sample_mean(returns) - sample_std(returns) * n.pdf(z) / p)
    }
    VarMethod::MonteCarlo { simulations, seed } => {
      let draws = simulate(returns, simulations, seed)?;
      Ok(tail_mean(&draws, quantile_sorted(&draws, p)))
    }
  }
}

/// Historical and parametric VaR/CVaR at every confidence level.
pub fn tail_risk_summary(returns: &[f64], confidence_levels: &[f64]) -> Result<Vec<TailRisk>> {
  confidence_levels
    .iter()
    .map(|&c| {
      Ok(TailRisk {
        confidence: c,
        var_historical: value_at_risk(returns, c, VarMethod::Historical)?,
        cvar_historical: conditional_value_at_risk(returns, c, VarMethod::Historical)?,
        var_parametric: value_at_risk(returns, c, VarMethod::Parametric)?,
        cvar_parametric: conditional_value_at_risk(returns, c, VarMethod::Parametric)?,
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use proptest::prelude::*;

  use super::*;

  fn sample() -> Vec<f64> {
    (0..200)
      .map(|i| {
        let x = i as f64;
        0.0004 + 0.012 * (x * 0.7).sin() - 0.004 * (x * 1.3).cos()
      })
      .collect()
  }

  #[test]
  fn historical_var_is_interpolated_quantile() {
    let r: Vec<f64> = (1..=100).map(|i| i as f64 / 100.0 - 0.5).collect();
    let var = value_at_risk(&r, 0.95, VarMethod::Historical).unwrap();
    // h = 0.05 * 99 = 4.95
    assert_relative_eq!(var, -0.45 + 0.95 * 0.01, epsilon = 1e-12);
  }

  #[test]
  fn parametric_var_matches_normal_quantile() {
    let r = sample();
    let var = value_at_risk(&r, 0.99, VarMethod::Parametric).unwrap();
    let expected = sample_mean(&r) - 2.326_347_874_040_841 * sample_std(&r);
    assert_relative_eq!(var, expected, epsilon = 1e-9);
  }

  #[test]
  fn monte_carlo_is_seeded_and_close_to_parametric() {
    let r = sample();
    let mc = VarMethod::MonteCarlo {
      simulations: 20_000,
      seed: 42,
    };
    let a = value_at_risk(&r, 0.95, mc).unwrap();
    let b = value_at_risk(&r, 0.95, mc).unwrap();
    let p = value_at_risk(&r, 0.95, VarMethod::Parametric).unwrap();

    assert_eq!(a, b);
    assert_relative_eq!(a, p, max_relative = 0.05);
    assert!(conditional_value_at_risk(&r, 0.95, mc).unwrap() <= a);
  }

  #[test]
  fn cvar_is_below_var_for_each_method() {
    let r = sample();
    for c in [0.9, 0.95, 0.99] {
      for m in [VarMethod::Historical, VarMethod::Parametric] {
        let var = value_at_risk(&r, c, m).unwrap();
        let cvar = conditional_value_at_risk(&r, c, m).unwrap();
        assert!(cvar <= var, "{} at {c}: {cvar} > {var}", m.as_str());
      }
    }
  }

  #[test]
  fn summary_covers_each_level() {
    let summary = tail_risk_summary(&sample(), &[0.95, 0.99]).unwrap();
    assert_eq!(summary.len(), 2);
    assert!(summary[1].var_historical <= summary[0].var_historical);
  }

  #[test]
  fn rejects_bad_inputs() {
    assert!(matches!(
      value_at_risk(&[], 0.95, VarMethod::Historical),
      Err(PortfolioError::EmptyInput(_))
    ));
    assert!(value_at_risk(&[0.1, 0.2], 1.0, VarMethod::Historical).is_err());
    assert!(value_at_risk(&[0.1, f64::NAN], 0.95, VarMethod::Parametric).is_err());
  }

  proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn historical_cvar_never_exceeds_var(
      returns in prop::collection::vec(-0.2f64..0.2, 5..120),
      confidence in 0.5f64..0.995,
    ) {
      let var = value_at_risk(&returns, confidence, VarMethod::Historical).unwrap();
      let cvar = conditional_value_at_risk(&returns, confidence, VarMethod::Historical).unwrap();
      prop_assert!(cvar <= var + 1e-12);
    }
  }
}

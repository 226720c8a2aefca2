//! # Signal-Enhanced Optimizer
//!
//! $$
//! \mu' = \mu + k\,\sigma(\mu)\sum_s \omega_s z_s,\qquad
//! \Sigma'_{ij} = \Sigma_{ij}\Big(1 + \sum_s a^s_i a^s_j\Big),\ i\ne j,\qquad
//! a^s_i = c\,\omega_s z_{s,i}
//! $$
//!
//! Tilts the Sharpe optimizer's inputs with standardized per-instrument
//! signals `z_s`, re-solves under volatility and weight caps and attributes
//! the resulting weights back to the signals.

use impl_new_derive::ImplNew;
use nalgebra::DMatrix;
use nalgebra::SymmetricEigen;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use super::sharpe::OptimizerConfig;
use super::sharpe::SharpeOptimizer;
use super::solver::Constraints;
use super::types::OptimizerMethod;
use super::types::PortfolioResult;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::stats::estimate::validate_inputs;
use crate::stats::sample_mean;
use crate::stats::sample_std;
use crate::traits::Report;

/// Smallest eigenvalue kept in an adjusted covariance, relative to its mean variance.
const EIGEN_FLOOR: f64 = 1e-8;

/// Strength of the signal adjustments and the caps of the re-solve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
  /// `k`: expected-return tilt in units of the cross-sectional std of `μ`.
  pub intensity: f64,
  /// `c`: scale of the off-diagonal covariance adjustment.
  pub covariance_adjustment: f64,
  pub adjust_covariance: bool,
  pub max_volatility: Option<f64>,
  pub max_weight: Option<f64>,
}

impl Default for SignalConfig {
  fn default() -> Self {
    Self {
      intensity: 0.1,
      covariance_adjustment: 0.05,
      adjust_covariance: true,
      max_volatility: Some(0.20),
      max_weight: Some(0.40),
    }
  }
}

impl SignalConfig {
  pub fn validate(&self) -> Result<()> {
    if !(self.intensity >= 0.0 && self.intensity.is_finite()) {
      return Err(PortfolioError::invalid("intensity", "must be non-negative"));
    }
    if !(self.covariance_adjustment >= 0.0 && self.covariance_adjustment.is_finite()) {
      return Err(PortfolioError::invalid("covariance_adjustment", "must be non-negative"));
    }
    if let Some(v) = self.max_volatility {
      if !(v > 0.0) {
        return Err(PortfolioError::invalid("max_volatility", "must be positive"));
      }
    }
    if let Some(w) = self.max_weight {
      if !(w > 0.0 && w <= 1.0) {
        return Err(PortfolioError::invalid("max_weight", "must lie in (0, 1]"));
      }
    }
    Ok(())
  }

  fn constraints(&self) -> Constraints {
    Constraints {
      max_volatility: self.max_volatility,
      max_weight: self.max_weight,
      target_return: None,
    }
  }
}

/// One per-instrument attractiveness score and its blend weight.
#[derive(ImplNew, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedSignal {
  pub name: String,
  pub values: Vec<f64>,
  pub weight: f64,
}

/// How a single signal relates to the optimized weights.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalContribution {
  pub name: String,
  pub weight: f64,
  /// Pearson correlation between signal values and weights (0 when undefined).
  pub correlation_with_weights: f64,
  /// Cross-sectional standard deviation of the raw signal.
  pub dispersion: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SignalAttribution {
  pub contributions: Vec<SignalContribution>,
  /// `Σ weight · |corr| · dispersion`.
  pub composite_score: f64,
  /// Signal with the highest `|corr| · dispersion`.
  pub dominant_signal: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalEnhancedResult {
  /// Weights and metrics under the adjusted inputs.
  pub result: PortfolioResult,
  pub adjusted_returns: Vec<f64>,
  pub adjusted_covariance: Vec<Vec<f64>>,
  pub attribution: SignalAttribution,
}

impl Report for SignalEnhancedResult {}

/// Baseline vs. signal-enhanced optimization under the same caps.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalComparison {
  pub baseline: PortfolioResult,
  pub enhanced: SignalEnhancedResult,
  /// Enhanced weights evaluated on the unadjusted inputs.
  pub enhanced_realized: PortfolioResult,
  pub sharpe_improvement: f64,
  /// Relative Sharpe improvement in percent; 0 when the baseline Sharpe is 0.
  pub sharpe_improvement_pct: f64,
  pub return_change: f64,
  pub volatility_change: f64,
}

impl Report for SignalComparison {}

/// Z-score across instruments. A constant signal carries no information and
/// standardizes to zeros.
pub fn standardize(xs: &[f64]) -> Vec<f64> {
  let sd = sample_std(xs);
  if sd <= 1e-15 {
    return vec![0.0; xs.len()];
  }
  let m = sample_mean(xs);
  xs.iter().map(|x| (x - m) / sd).collect()
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
  let (sx, sy) = (sample_std(x), sample_std(y));
  if sx <= 1e-15 || sy <= 1e-15 {
    return 0.0;
  }
  let (mx, my) = (sample_mean(x), sample_mean(y));
  let cov = x
    .iter()
    .zip(y)
    .map(|(a, b)| (a - mx) * (b - my))
    .sum::<f64>()
    / (x.len() - 1) as f64;
  let r = cov / (sx * sy);
  if r.is_finite() {
    r.clamp(-1.0, 1.0)
  } else {
    0.0
  }
}

/// Symmetrize and lift eigenvalues below the floor.
fn nearest_positive_definite(cov: &[Vec<f64>]) -> Vec<Vec<f64>> {
  let n = cov.len();
  let m = DMatrix::from_fn(n, n, |i, j| 0.5 * (cov[i][j] + cov[j][i]));
  let scale = (0..n).map(|i| m[(i, i)].abs()).sum::<f64>() / n as f64;
  let floor = EIGEN_FLOOR * scale.max(1e-12);

  let eig = SymmetricEigen::new(m.clone());
  let min_eig = eig.eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min);
  let fixed = if min_eig < floor {
    debug!(min_eig, floor, "flooring eigenvalues of adjusted covariance");
    let lifted = eig.eigenvalues.map(|l| l.max(floor));
    let r = &eig.eigenvectors * DMatrix::from_diagonal(&lifted) * eig.eigenvectors.transpose();
    let r_t = r.transpose();
    (r + r_t) * 0.5
  } else {
    m
  };

  (0..n).map(|i| (0..n).map(|j| fixed[(i, j)]).collect()).collect()
}

#[derive(Debug)]
pub struct SignalOptimizer {
  config: SignalConfig,
  sharpe: SharpeOptimizer,
}

impl SignalOptimizer {
  pub fn new(optimizer: OptimizerConfig, config: SignalConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self {
      config,
      sharpe: SharpeOptimizer::new(optimizer)?,
    })
  }

  pub fn config(&self) -> &SignalConfig {
    &self.config
  }

  fn validate_signals(&self, n: usize, signals: &[NamedSignal]) -> Result<()> {
    for s in signals {
      if s.values.len() != n {
        return Err(PortfolioError::DimensionMismatch {
          context: "signal values",
          expected: n,
          actual: s.values.len(),
        });
      }
      if s.values.iter().any(|v| !v.is_finite()) || !s.weight.is_finite() {
        return Err(PortfolioError::NonFinite("signal"));
      }
    }
    Ok(())
  }

  /// `μ' = μ + k σ(μ) Σ_s ω_s z_s`.
  pub fn adjusted_returns(&self, mu: &[f64], signals: &[NamedSignal]) -> Vec<f64> {
    let spread = sample_std(mu) * self.config.intensity;
    let mut out = mu.to_vec();
    for s in signals {
      for (o, z) in out.iter_mut().zip(standardize(&s.values)) {
        *o += z * spread * s.weight;
      }
    }
    out
  }

  /// Off-diagonal scaling by signal co-movement, projected back to a
  /// positive-definite matrix when needed.
  pub fn adjusted_covariance(&self, cov: &[Vec<f64>], signals: &[NamedSignal]) -> Vec<Vec<f64>> {
    let n = cov.len();
    let loadings: Vec<Vec<f64>> = signals
      .iter()
      .map(|s| {
        standardize(&s.values)
          .iter()
          .map(|z| z * s.weight * self.config.covariance_adjustment)
          .collect()
      })
      .collect();

    if !self.config.adjust_covariance || loadings.iter().flatten().all(|a| *a == 0.0) {
      return cov.to_vec();
    }

    let mut adjusted = cov.to_vec();
    for i in 0..n {
      for j in 0..n {
        if i != j {
          let bump: f64 = loadings.iter().map(|a| a[i] * a[j]).sum();
          adjusted[i][j] *= 1.0 + bump;
        }
      }
    }
    nearest_positive_definite(&adjusted)
  }

  /// Relate each signal to the optimized weights.
  pub fn attribution(&self, signals: &[NamedSignal], weights: &[f64]) -> SignalAttribution {
    let contributions: Vec<SignalContribution> = signals
      .iter()
      .map(|s| SignalContribution {
        name: s.name.clone(),
        weight: s.weight,
        correlation_with_weights: pearson(&s.values, weights),
        dispersion: sample_std(&s.values),
      })
      .collect();

    let composite_score = contributions
      .iter()
      .map(|c| c.weight * c.correlation_with_weights.abs() * c.dispersion)
      .sum();

    let mut dominant: Option<(&SignalContribution, f64)> = None;
    for c in &contributions {
      let strength = c.correlation_with_weights.abs() * c.dispersion;
      if dominant.map_or(true, |(_, best)| strength > best) {
        dominant = Some((c, strength));
      }
    }

    SignalAttribution {
      composite_score,
      dominant_signal: dominant.map(|(c, _)| c.name.clone()),
      contributions,
    }
  }

  /// Unadjusted reference: Sharpe maximization on the raw inputs under the
  /// same volatility and weight caps as [`Self::optimize`].
  pub fn baseline(&self, mu: &[f64], cov: &[Vec<f64>]) -> Result<PortfolioResult> {
    self.sharpe.max_sharpe_with(mu, cov, self.config.constraints())
  }

  /// Sharpe maximization on signal-adjusted inputs under the configured caps.
  ///
  /// An empty signal set, or signals that standardize to zero, leave the
  /// inputs untouched and reproduce [`Self::baseline`] exactly.
  pub fn optimize(
    &self,
    mu: &[f64],
    cov: &[Vec<f64>],
    signals: &[NamedSignal],
  ) -> Result<SignalEnhancedResult> {
    validate_inputs(mu, cov)?;
    self.validate_signals(mu.len(), signals)?;

    let adjusted_returns = self.adjusted_returns(mu, signals);
    let adjusted_covariance = self.adjusted_covariance(cov, signals);
    let mut result =
      self
        .sharpe
        .max_sharpe_with(&adjusted_returns, &adjusted_covariance, self.config.constraints())?;
    result.method = OptimizerMethod::SignalEnhanced;
    let attribution = if signals.is_empty() {
      SignalAttribution::default()
    } else {
      self.attribution(signals, &result.weights)
    };
    info!(
      sharpe = result.sharpe,
      dominant = ?attribution.dominant_signal,
      "signal-enhanced portfolio"
    );

    Ok(SignalEnhancedResult {
      result,
      adjusted_returns,
      adjusted_covariance,
      attribution,
    })
  }

  /// Run the unadjusted optimization under the same caps and the enhanced
  /// one, and report the differences.
  pub fn compare_with_baseline(
    &self,
    mu: &[f64],
    cov: &[Vec<f64>],
    signals: &[NamedSignal],
  ) -> Result<SignalComparison> {
    validate_inputs(mu, cov)?;
    let baseline = self.baseline(mu, cov)?;
    let enhanced = self.optimize(mu, cov, signals)?;
    let enhanced_realized = PortfolioResult::evaluate(
      enhanced.result.method,
      enhanced.result.provenance.clone(),
      enhanced.result.weights.clone(),
      mu,
      cov,
      self.sharpe.config().risk_free,
    )?;

    let sharpe_improvement = enhanced.result.sharpe - baseline.sharpe;
    let sharpe_improvement_pct = if baseline.sharpe.abs() > 1e-12 && sharpe_improvement.is_finite() {
      100.0 * sharpe_improvement / baseline.sharpe.abs()
    } else {
      0.0
    };

    Ok(SignalComparison {
      return_change: enhanced.result.expected_return - baseline.expected_return,
      volatility_change: enhanced.result.volatility - baseline.volatility,
      sharpe_improvement,
      sharpe_improvement_pct,
      baseline,
      enhanced,
      enhanced_realized,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

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

  fn uncapped() -> SignalConfig {
    SignalConfig {
      max_volatility: None,
      max_weight: None,
      ..SignalConfig::default()
    }
  }

  #[test]
  fn zero_signal_without_caps_reproduces_plain_max_sharpe() {
    let (mu, cov) = market();
    let opt = SignalOptimizer::new(OptimizerConfig::default(), uncapped()).unwrap();
    let zero = NamedSignal::new("flat".to_string(), vec![0.0; 4], 1.0);
    let enhanced = opt.optimize(&mu, &cov, &[zero]).unwrap();
    let plain = SharpeOptimizer::new(OptimizerConfig::default())
      .unwrap()
      .max_sharpe(&mu, &cov)
      .unwrap();

    assert_eq!(enhanced.adjusted_returns, mu);
    assert_eq!(enhanced.adjusted_covariance, cov);
    assert_eq!(enhanced.result.weights, plain.weights);
    assert_eq!(enhanced.result.sharpe, plain.sharpe);
  }

  #[test]
  fn zero_signal_matches_capped_baseline() {
    let (mu, cov) = market();
    let opt = SignalOptimizer::new(OptimizerConfig::default(), SignalConfig::default()).unwrap();
    let zero = NamedSignal::new("flat".to_string(), vec![0.3; 4], 0.5);
    let cmp = opt.compare_with_baseline(&mu, &cov, &[zero]).unwrap();

    assert_eq!(cmp.enhanced.result.weights, cmp.baseline.weights);
    assert_eq!(cmp.sharpe_improvement, 0.0);
  }

  #[test]
  fn empty_and_zero_signals_match_capped_baseline_under_defaults() {
    let mu = vec![0.10, 0.15, 0.08];
    let cov = vec![
      vec![0.04, 0.0, 0.0],
      vec![0.0, 0.09, 0.0],
      vec![0.0, 0.0, 0.01],
    ];
    let config = SignalConfig::default();
    let opt = SignalOptimizer::new(OptimizerConfig::default(), config).unwrap();

    let empty = opt.optimize(&mu, &cov, &[]).unwrap();
    let zero = NamedSignal::new("flat".to_string(), vec![0.0; 3], 1.0);
    let zeroed = opt.optimize(&mu, &cov, &[zero]).unwrap();
    let capped = SharpeOptimizer::new(OptimizerConfig::default())
      .unwrap()
      .max_sharpe_with(&mu, &cov, config.constraints())
      .unwrap();

    assert_eq!(empty.result.weights, capped.weights);
    assert_eq!(zeroed.result.weights, capped.weights);
    assert_eq!(zeroed.result.sharpe, capped.sharpe);
    assert_eq!(opt.baseline(&mu, &cov).unwrap().weights, capped.weights);
    assert!(capped.weights.iter().all(|&w| w <= 0.40 + 1e-6));
    assert_eq!(empty.result.method, OptimizerMethod::SignalEnhanced);
    assert!(empty.attribution.dominant_signal.is_none());
  }

  #[test]
  fn returns_shift_by_scaled_z_scores() {
    let (mu, _) = market();
    let opt = SignalOptimizer::new(OptimizerConfig::default(), SignalConfig::default()).unwrap();
    let s = NamedSignal::new("momentum".to_string(), vec![1.0, 2.0, 3.0, 4.0], 0.5);
    let adjusted = opt.adjusted_returns(&mu, &[s.clone()]);
    let z = standardize(&s.values);
    let spread = sample_std(&mu) * 0.1 * 0.5;

    for i in 0..4 {
      assert_relative_eq!(adjusted[i], mu[i] + z[i] * spread, epsilon = 1e-15);
    }
  }

  #[test]
  fn adjusted_covariance_stays_symmetric_positive_definite() {
    let (_, cov) = market();
    let opt = SignalOptimizer::new(
      OptimizerConfig::default(),
      SignalConfig {
        covariance_adjustment: 2.0,
        ..SignalConfig::default()
      },
    )
    .unwrap();
    let s = NamedSignal::new("quality".to_string(), vec![-3.0, 1.0, 2.0, 0.0], 1.0);
    let adjusted = opt.adjusted_covariance(&cov, &[s]);

    for i in 0..4 {
      for j in 0..4 {
        assert_eq!(adjusted[i][j], adjusted[j][i]);
      }
    }
    let m = DMatrix::from_fn(4, 4, |i, j| adjusted[i][j]);
    let min_eig = SymmetricEigen::new(m)
      .eigenvalues
      .iter()
      .cloned()
      .fold(f64::INFINITY, f64::min);
    assert!(min_eig > 0.0);
  }

  #[test]
  fn caps_bind_on_enhanced_solution() {
    let (mu, cov) = market();
    let opt = SignalOptimizer::new(OptimizerConfig::default(), SignalConfig::default()).unwrap();
    let s = NamedSignal::new("alpha".to_string(), vec![0.0, 0.0, 5.0, 0.0], 1.0);
    let res = opt.optimize(&mu, &cov, &[s]).unwrap();

    assert!(res.result.weights.iter().all(|&w| w <= 0.40 + 1e-6));
    assert!(res.result.volatility <= 0.20 + 1e-6);
    assert_eq!(res.result.method, OptimizerMethod::SignalEnhanced);
  }

  #[test]
  fn dominant_signal_tracks_weights() {
    let opt = SignalOptimizer::new(OptimizerConfig::default(), SignalConfig::default()).unwrap();
    let weights = [0.1, 0.2, 0.3, 0.4];
    let aligned = NamedSignal::new("aligned".to_string(), vec![1.0, 2.0, 3.0, 4.0], 0.2);
    let noise = NamedSignal::new("noise".to_string(), vec![0.1, -0.1, -0.1, 0.1], 0.8);
    let flat = NamedSignal::new("flat".to_string(), vec![1.0; 4], 0.5);
    let attr = opt.attribution(&[noise, aligned, flat], &weights);

    assert_eq!(attr.dominant_signal.as_deref(), Some("aligned"));
    assert_relative_eq!(attr.contributions[1].correlation_with_weights, 1.0, epsilon = 1e-12);
    assert_eq!(attr.contributions[2].correlation_with_weights, 0.0);
  }

  #[test]
  fn mismatched_signal_is_rejected() {
    let (mu, cov) = market();
    let opt = SignalOptimizer::new(OptimizerConfig::default(), SignalConfig::default()).unwrap();
    let s = NamedSignal::new("short".to_string(), vec![1.0, 2.0], 1.0);
    assert!(matches!(
      opt.optimize(&mu, &cov, &[s]),
      Err(PortfolioError::DimensionMismatch { .. })
    ));
  }
}

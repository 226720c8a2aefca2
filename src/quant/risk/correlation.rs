//! # Correlation Risk
//!
//! $$
//! \bar\rho = \frac{2}{n(n-1)}\sum_{i<j}\rho_{ij},\qquad
//! D = 100\Big(1 - \frac{2}{n(n-1)}\sum_{i<j}|\rho_{ij}|\Big)
//! $$
//!
//! Flags strongly co-moving instrument pairs in a correlation matrix.

use serde::Deserialize;
use serde::Serialize;

use super::rating::RiskLevel;
use crate::error::PortfolioError;
use crate::error::Result;

/// Holdings at or below this weight are ignored by the weighted exposure scan.
const MIN_EXPOSURE_WEIGHT: f64 = 0.01;
/// Number of largest holdings scanned for correlated counterparts.
const TOP_HOLDINGS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrelationThresholds {
  /// `|ρ|` at or above which a pair is highly correlated.
  pub high: f64,
  /// `|ρ|` at or above which a pair is moderately correlated.
  pub moderate: f64,
}

impl Default for CorrelationThresholds {
  fn default() -> Self {
    Self {
      high: 0.7,
      moderate: 0.5,
    }
  }
}

impl CorrelationThresholds {
  pub fn validate(&self) -> Result<()> {
    if !(0.0 < self.moderate && self.moderate < self.high && self.high <= 1.0) {
      return Err(PortfolioError::invalid(
        "correlation thresholds",
        "require 0 < moderate < high <= 1",
      ));
    }
    Ok(())
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CorrelatedPair {
  pub first: String,
  pub second: String,
  pub correlation: f64,
}

/// A held instrument that co-moves with a larger holding.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CorrelatedHolding {
  pub instrument: String,
  pub correlation: f64,
  pub weight: f64,
  /// Weight of the primary holding plus this one.
  pub combined_weight: f64,
}

/// One of the largest holdings and the held instruments correlated with it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WeightedExposure {
  pub primary: String,
  pub primary_weight: f64,
  pub correlated: Vec<CorrelatedHolding>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CorrelationRisk {
  pub average_correlation: f64,
  /// Largest `|ρ|` among distinct pairs.
  pub max_correlation: f64,
  pub high_pairs: Vec<CorrelatedPair>,
  pub moderate_pairs: Vec<CorrelatedPair>,
  pub low_pair_count: usize,
  /// `100 (1 - mean|ρ|)` clamped to `[0, 100]`.
  pub diversification_score: f64,
  pub level: RiskLevel,
  /// Heuristic 0..100 score behind `level`.
  pub risk_score: f64,
  /// Largest holdings paired with their correlated counterparts; empty
  /// without weights.
  pub weighted_exposures: Vec<WeightedExposure>,
}

impl CorrelationRisk {
  /// Whether any large holding sits next to a correlated one.
  pub fn has_correlated_concentration(&self) -> bool {
    !self.weighted_exposures.is_empty()
  }
}

fn assess(high: usize, moderate: usize, avg: f64) -> (RiskLevel, f64) {
  if high >= 3 || avg >= 0.6 {
    (RiskLevel::High, 80.0 + (high as f64 * 5.0).min(20.0))
  } else if high >= 1 || moderate >= 3 || avg >= 0.4 {
    (RiskLevel::Medium, 40.0 + (high as f64 * 10.0 + moderate as f64 * 5.0).min(40.0))
  } else {
    (RiskLevel::Low, (moderate as f64 * 8.0).min(40.0))
  }
}

/// Pair the largest holdings (top five above 1%) with every other holding
/// above 1% whose `|ρ|` reaches the moderate threshold.
///
/// Holdings without such a counterpart are left out.
pub fn weighted_exposures(
  names: &[String],
  corr: &[Vec<f64>],
  weights: &[f64],
  thresholds: &CorrelationThresholds,
) -> Result<Vec<WeightedExposure>> {
  let n = corr.len();
  if names.len() != n {
    return Err(PortfolioError::DimensionMismatch {
      context: "instrument names",
      expected: n,
      actual: names.len(),
    });
  }
  if weights.len() != n {
    return Err(PortfolioError::DimensionMismatch {
      context: "exposure weights",
      expected: n,
      actual: weights.len(),
    });
  }
  if weights.iter().any(|w| !w.is_finite()) {
    return Err(PortfolioError::NonFinite("weights"));
  }

  let mut held: Vec<usize> = (0..n).filter(|&i| weights[i] > MIN_EXPOSURE_WEIGHT).collect();
  held.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]));

  let exposures = held
    .iter()
    .take(TOP_HOLDINGS)
    .filter_map(|&i| {
      let correlated: Vec<CorrelatedHolding> = (0..n)
        .filter(|&j| j != i && weights[j] > MIN_EXPOSURE_WEIGHT && corr[i][j].abs() >= thresholds.moderate)
        .map(|j| CorrelatedHolding {
          instrument: names[j].clone(),
          correlation: corr[i][j],
          weight: weights[j],
          combined_weight: weights[i] + weights[j],
        })
        .collect();
      (!correlated.is_empty()).then(|| WeightedExposure {
        primary: names[i].clone(),
        primary_weight: weights[i],
        correlated,
      })
    })
    .collect();

  Ok(exposures)
}

/// Pairwise correlation risk of a named correlation matrix, with the weighted
/// exposure scan when `weights` are given.
///
/// A single instrument has no pairs and scores as fully diversified.
pub fn correlation_risk(
  names: &[String],
  corr: &[Vec<f64>],
  weights: Option<&[f64]>,
  thresholds: &CorrelationThresholds,
) -> Result<CorrelationRisk> {
  let n = corr.len();
  if n == 0 {
    return Err(PortfolioError::EmptyInput("correlation matrix"));
  }
  if names.len() != n {
    return Err(PortfolioError::DimensionMismatch {
      context: "correlation names",
      expected: n,
      actual: names.len(),
    });
  }
  if let Some(row) = corr.iter().find(|r| r.len() != n) {
    return Err(PortfolioError::DimensionMismatch {
      context: "correlation columns",
      expected: n,
      actual: row.len(),
    });
  }

  let mut high_pairs = Vec::new();
  let mut moderate_pairs = Vec::new();
  let mut low_pair_count = 0;
  let mut upper = Vec::with_capacity(n * n.saturating_sub(1) / 2);

  for i in 0..n {
    for j in (i + 1)..n {
      let rho = corr[i][j];
      if !rho.is_finite() {
        return Err(PortfolioError::NonFinite("correlation"));
      }
      upper.push(rho);
      let pair = || CorrelatedPair {
        first: names[i].clone(),
        second: names[j].clone(),
        correlation: rho,
      };
      if rho.abs() >= thresholds.high {
        high_pairs.push(pair());
      } else if rho.abs() >= thresholds.moderate {
        moderate_pairs.push(pair());
      } else {
        low_pair_count += 1;
      }
    }
  }

  let (average_correlation, max_correlation, mean_abs) = if upper.is_empty() {
    (0.0, 0.0, 0.0)
  } else {
    let k = upper.len() as f64;
    (
      upper.iter().sum::<f64>() / k,
      upper.iter().map(|r| r.abs()).fold(0.0, f64::max),
      upper.iter().map(|r| r.abs()).sum::<f64>() / k,
    )
  };
  let (level, risk_score) = assess(high_pairs.len(), moderate_pairs.len(), average_correlation);
  let weighted_exposures = match weights {
    Some(w) => weighted_exposures(names, corr, w, thresholds)?,
    None => Vec::new(),
  };

  Ok(CorrelationRisk {
    average_correlation,
    max_correlation,
    diversification_score: (100.0 * (1.0 - mean_abs)).clamp(0.0, 100.0),
    level,
    risk_score,
    high_pairs,
    moderate_pairs,
    low_pair_count,
    weighted_exposures,
  })
}

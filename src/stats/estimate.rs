//! # Annualized Estimates
//!
//! $$
//! \mu_i = T\,\frac{1}{N}\sum_t r_{t,i},\qquad
//! \Sigma_{ij} = T\,\widehat{\operatorname{Cov}}(r_{\cdot,i}, r_{\cdot,j}),\qquad
//! \rho_{ij} = \frac{\Sigma_{ij}}{\sigma_i\sigma_j}
//! $$
//!
//! Expected-return vector and covariance matrix estimated from a daily return
//! table. Estimates are read-only inputs for every optimizer.

use nalgebra::DMatrix;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::returns::ReturnTable;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::traits::Report;

/// Relative tolerance used for covariance symmetry checks.
pub(crate) const SYMMETRY_TOL: f64 = 1e-8;

/// Configuration for the statistics layer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct StatsConfig {
  /// Trading days per year used to annualize daily moments.
  pub trading_days: f64,
}

impl Default for StatsConfig {
  fn default() -> Self {
    Self {
      trading_days: 252.0,
    }
  }
}

impl StatsConfig {
  pub fn validate(&self) -> Result<()> {
    if !(self.trading_days.is_finite() && self.trading_days > 0.0) {
      return Err(PortfolioError::invalid("trading_days", "must be positive"));
    }
    Ok(())
  }
}

/// Annualized expected returns and covariance for a fixed instrument basket.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct MarketEstimate {
  /// Instrument names, in column order.
  pub names: Vec<String>,
  /// Annualized expected return per instrument.
  pub expected_returns: Vec<f64>,
  /// Annualized covariance matrix.
  pub covariance: Vec<Vec<f64>>,
}

impl Report for MarketEstimate {}

impl MarketEstimate {
  /// Wrap externally supplied estimates after validating them.
  pub fn new(names: Vec<String>, expected_returns: Vec<f64>, covariance: Vec<Vec<f64>>) -> Result<Self> {
    validate_inputs(&expected_returns, &covariance)?;
    if names.len() != expected_returns.len() {
      return Err(PortfolioError::DimensionMismatch {
        context: "instrument names",
        expected: expected_returns.len(),
        actual: names.len(),
      });
    }

    Ok(Self {
      names,
      expected_returns,
      covariance,
    })
  }

  /// Estimates with generated names `asset_0, asset_1, ...`.
  pub fn unnamed(expected_returns: Vec<f64>, covariance: Vec<Vec<f64>>) -> Result<Self> {
    let names = (0..expected_returns.len())
      .map(|i| format!("asset_{i}"))
      .collect();
    Self::new(names, expected_returns, covariance)
  }

  pub fn n_assets(&self) -> usize {
    self.expected_returns.len()
  }

  /// Annualized volatility per instrument.
  pub fn volatilities(&self) -> Vec<f64> {
    (0..self.n_assets())
      .map(|i| self.covariance[i][i].max(0.0).sqrt())
      .collect()
  }

  pub fn correlation(&self) -> Vec<Vec<f64>> {
    corr_from_cov(&self.covariance)
  }
}

/// Estimate annualized moments from daily returns.
///
/// Requires at least two dates. A covariance that is not positive-definite
/// is accepted with a warning; consumers tolerate near-singular inputs.
pub fn annualized_stats(table: &ReturnTable, config: &StatsConfig) -> Result<MarketEstimate> {
  config.validate()?;
  if table.n_periods() < 2 {
    return Err(PortfolioError::invalid(
      "returns",
      "at least two dates are required for a sample covariance",
    ));
  }

  let data = table.data();
  let t = config.trading_days;
  let mean = data
    .mean_axis(Axis(0))
    .ok_or(PortfolioError::EmptyInput("return table"))?;
  let cov = data
    .t()
    .cov(1.0)
    .map_err(|_| PortfolioError::EmptyInput("return table"))?;

  let n = table.n_assets();
  let expected_returns: Vec<f64> = mean.iter().map(|m| m * t).collect();
  let covariance: Vec<Vec<f64>> = (0..n)
    .map(|i| (0..n).map(|j| cov[[i, j]] * t).collect())
    .collect();

  for (i, name) in table.names().iter().enumerate() {
    if covariance[i][i] <= 0.0 {
      warn!(instrument = %name, "non-positive variance in covariance estimate");
    }
  }
  if !is_positive_definite(&covariance) {
    warn!("covariance estimate is not positive-definite");
  }
  debug!(assets = n, periods = table.n_periods(), "annualized statistics estimated");

  MarketEstimate::new(table.names().to_vec(), expected_returns, covariance)
}

/// Pearson correlation matrix of the table's columns.
pub fn correlation_matrix(table: &ReturnTable) -> Result<Vec<Vec<f64>>> {
  if table.n_periods() < 2 {
    return Err(PortfolioError::invalid(
      "returns",
      "at least two dates are required for a correlation",
    ));
  }
  let cov = table
    .data()
    .t()
    .cov(1.0)
    .map_err(|_| PortfolioError::EmptyInput("return table"))?;
  let n = table.n_assets();
  let cov: Vec<Vec<f64>> = (0..n)
    .map(|i| (0..n).map(|j| cov[[i, j]]).collect())
    .collect();
  Ok(corr_from_cov(&cov))
}

/// Correlation implied by a covariance matrix. Zero-variance rows map to zero
/// correlation off the diagonal.
pub fn corr_from_cov(cov: &[Vec<f64>]) -> Vec<Vec<f64>> {
  let n = cov.len();
  let sd: Vec<f64> = (0..n).map(|i| cov[i][i].max(0.0).sqrt()).collect();
  let mut corr = vec![vec![0.0; n]; n];

  for i in 0..n {
    for j in 0..n {
      let denom = sd[i] * sd[j];
      corr[i][j] = if i == j {
        1.0
      } else if denom > 1e-15 {
        (cov[i][j] / denom).clamp(-1.0, 1.0)
      } else {
        0.0
      };
    }
  }

  corr
}

/// Cholesky-based positive-definiteness check.
pub fn is_positive_definite(cov: &[Vec<f64>]) -> bool {
  let n = cov.len();
  if n == 0 {
    return false;
  }
  let m = DMatrix::from_fn(n, n, |i, j| cov[i][j]);
  m.cholesky().is_some()
}

/// Shape, finiteness, symmetry and diagonal checks shared by every optimizer.
pub(crate) fn validate_inputs(mu: &[f64], cov: &[Vec<f64>]) -> Result<()> {
  let n = mu.len();
  if n == 0 {
    return Err(PortfolioError::EmptyInput("expected returns"));
  }
  if cov.len() != n {
    return Err(PortfolioError::DimensionMismatch {
      context: "covariance rows",
      expected: n,
      actual: cov.len(),
    });
  }
  for row in cov {
    if row.len() != n {
      return Err(PortfolioError::DimensionMismatch {
        context: "covariance columns",
        expected: n,
        actual: row.len(),
      });
    }
  }
  if mu.iter().any(|x| !x.is_finite()) {
    return Err(PortfolioError::NonFinite("expected returns"));
  }
  if cov.iter().flatten().any(|x| !x.is_finite()) {
    return Err(PortfolioError::NonFinite("covariance"));
  }

  let scale = cov
    .iter()
    .flatten()
    .fold(1.0_f64, |acc, x| acc.max(x.abs()));
  for i in 0..n {
    if cov[i][i] < 0.0 {
      return Err(PortfolioError::invalid(
        "covariance",
        format!("negative variance on diagonal entry {i}"),
      ));
    }
    for j in (i + 1)..n {
      if (cov[i][j] - cov[j][i]).abs() > SYMMETRY_TOL * scale {
        return Err(PortfolioError::NonSymmetricCovariance { row: i, col: j });
      }
    }
  }

  Ok(())
}

//! # Return Table
//!
//! $$
//! r_{t,i} = \frac{P_{t,i}}{P_{t-1,i}} - 1
//! $$
//!
//! Date-ordered table of daily fractional returns, one column per instrument.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use tracing::warn;

use crate::error::PortfolioError;
use crate::error::Result;

/// Daily moves beyond this magnitude are flagged as suspicious.
const EXTREME_MOVE: f64 = 0.5;

/// Daily return table (`rows = dates`, `columns = instruments`).
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnTable {
  names: Vec<String>,
  data: Array2<f64>,
}

impl ReturnTable {
  /// Build a table from named columns of a `dates x instruments` matrix.
  ///
  /// Rejects empty tables, a name count that does not match the column
  /// count and any non-finite entry.
  pub fn new(names: Vec<String>, data: Array2<f64>) -> Result<Self> {
    if data.nrows() == 0 || data.ncols() == 0 {
      return Err(PortfolioError::EmptyInput("return table"));
    }
    if names.len() != data.ncols() {
      return Err(PortfolioError::DimensionMismatch {
        context: "return table names",
        expected: data.ncols(),
        actual: names.len(),
      });
    }
    if data.iter().any(|x| !x.is_finite()) {
      return Err(PortfolioError::NonFinite("return table"));
    }

    let table = Self { names, data };
    table.log_quality_warnings();
    Ok(table)
  }

  /// Build a table from one return series per instrument.
  pub fn from_columns(names: Vec<String>, columns: &[Vec<f64>]) -> Result<Self> {
    let n_periods = columns.first().map(|c| c.len()).unwrap_or(0);
    for c in columns {
      if c.len() != n_periods {
        return Err(PortfolioError::DimensionMismatch {
          context: "return columns",
          expected: n_periods,
          actual: c.len(),
        });
      }
    }

    let data = Array2::from_shape_fn((n_periods, columns.len()), |(t, i)| columns[i][t]);
    Self::new(names, data)
  }

  /// Percentage-change returns from a `dates x instruments` price table.
  ///
  /// The first date has no predecessor and is dropped.
  pub fn from_prices(names: Vec<String>, prices: &Array2<f64>) -> Result<Self> {
    if prices.nrows() < 2 {
      return Err(PortfolioError::EmptyInput("price table needs at least two dates"));
    }
    if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
      return Err(PortfolioError::invalid("prices", "must be finite and positive"));
    }

    let prev = prices.slice(ndarray::s![..-1, ..]);
    let next = prices.slice(ndarray::s![1.., ..]);
    let data = &next / &prev - 1.0;
    Self::new(names, data)
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn data(&self) -> ArrayView2<'_, f64> {
    self.data.view()
  }

  pub fn n_periods(&self) -> usize {
    self.data.nrows()
  }

  pub fn n_assets(&self) -> usize {
    self.data.ncols()
  }

  /// Return series of instrument `i`.
  pub fn column(&self, i: usize) -> Option<ArrayView1<'_, f64>> {
    (i < self.n_assets()).then(|| self.data.column(i))
  }

  /// Realized daily portfolio return `r_t^\top w` for each date.
  pub fn portfolio_returns(&self, weights: &[f64]) -> Result<Array1<f64>> {
    if weights.len() != self.n_assets() {
      return Err(PortfolioError::DimensionMismatch {
        context: "portfolio weights",
        expected: self.n_assets(),
        actual: weights.len(),
      });
    }

    let w = ArrayView1::from(weights);
    Ok(self.data.dot(&w))
  }

  /// Per-instrument daily standard deviation (`ddof = 1`).
  pub fn daily_std(&self) -> Vec<f64> {
    if self.n_periods() < 2 {
      return vec![0.0; self.n_assets()];
    }
    self.data.std_axis(Axis(0), 1.0).to_vec()
  }

  fn log_quality_warnings(&self) {
    for (i, name) in self.names.iter().enumerate() {
      let col = self.data.column(i);
      let first = col[0];
      if self.n_periods() > 1 && col.iter().all(|x| (x - first).abs() < 1e-15) {
        warn!(instrument = %name, "return series has zero variance");
      }
      let extreme = col.iter().filter(|x| x.abs() > EXTREME_MOVE).count();
      if extreme > 0 {
        warn!(instrument = %name, count = extreme, "daily moves above 50% in return series");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use ndarray::array;
  use tracing_test::traced_test;

  use super::*;

  fn names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("A{i}")).collect()
  }

  #[test]
  fn rejects_empty_and_non_finite_tables() {
    let empty = Array2::<f64>::zeros((0, 2));
    assert_eq!(
      ReturnTable::new(names(2), empty),
      Err(PortfolioError::EmptyInput("return table"))
    );

    let bad = array![[0.01, f64::NAN], [0.0, 0.02]];
    assert_eq!(
      ReturnTable::new(names(2), bad),
      Err(PortfolioError::NonFinite("return table"))
    );
  }

  #[test]
  fn rejects_name_count_mismatch() {
    let data = array![[0.01, 0.02]];
    assert!(matches!(
      ReturnTable::new(names(3), data),
      Err(PortfolioError::DimensionMismatch { .. })
    ));
  }

  #[test]
  fn prices_become_percentage_changes() {
    let prices = array![[100.0, 50.0], [110.0, 45.0], [99.0, 45.0]];
    let table = ReturnTable::from_prices(names(2), &prices).unwrap();

    assert_eq!(table.n_periods(), 2);
    assert_relative_eq!(table.data()[[0, 0]], 0.10, epsilon = 1e-12);
    assert_relative_eq!(table.data()[[0, 1]], -0.10, epsilon = 1e-12);
    assert_relative_eq!(table.data()[[1, 0]], -0.10, epsilon = 1e-12);
    assert_relative_eq!(table.data()[[1, 1]], 0.0, epsilon = 1e-12);
  }

  #[test]
  fn portfolio_returns_are_weighted_row_sums() {
    let table =
      ReturnTable::from_columns(names(2), &[vec![0.01, -0.02], vec![0.03, 0.01]]).unwrap();
    let port = table.portfolio_returns(&[0.5, 0.5]).unwrap();

    assert_relative_eq!(port[0], 0.02, epsilon = 1e-12);
    assert_relative_eq!(port[1], -0.005, epsilon = 1e-12);
    assert!(table.portfolio_returns(&[1.0]).is_err());
  }

  #[test]
  #[traced_test]
  fn warns_on_flat_and_extreme_series() {
    let table =
      ReturnTable::from_columns(names(2), &[vec![0.0, 0.0, 0.0], vec![0.01, 0.8, -0.02]]).unwrap();

    assert_eq!(table.n_assets(), 2);
    assert!(logs_contain("zero variance"));
    assert!(logs_contain("daily moves above 50%"));
  }
}

//! # Portfolio Data Utilities
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w},\qquad
//! D(\mathbf{w}) = \frac{\sum_i w_i\sigma_i}{\sigma_p}
//! $$
//!
//! Dense linear-algebra helpers, portfolio metrics and simplex projections.

use nalgebra::DMatrix;
use nalgebra::DVector;

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub(crate) fn mat_vec_mul(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
  mat
    .iter()
    .map(|row| row.iter().zip(v.iter()).map(|(a, b)| a * b).sum())
    .collect()
}

/// `w^T Σ w`.
pub fn portfolio_variance(w: &[f64], cov: &[Vec<f64>]) -> f64 {
  dot(w, &mat_vec_mul(cov, w))
}

/// Sharpe ratio with the zero-volatility convention: `+inf` for positive
/// excess return, `-inf` for negative and `0` for none.
pub fn sharpe_ratio(expected_return: f64, volatility: f64, risk_free: f64) -> f64 {
  let excess = expected_return - risk_free;
  if volatility > 1e-12 {
    excess / volatility
  } else if excess > 0.0 {
    f64::INFINITY
  } else if excess < 0.0 {
    f64::NEG_INFINITY
  } else {
    0.0
  }
}

/// Sum of squared weights.
pub fn herfindahl(w: &[f64]) -> f64 {
  w.iter().map(|x| x * x).sum()
}

pub fn diversification_ratio(w: &[f64], cov: &[Vec<f64>]) -> f64 {
  let weighted_vol: f64 = w
    .iter()
    .enumerate()
    .map(|(i, wi)| wi * cov[i][i].max(0.0).sqrt())
    .sum();
  let vol = portfolio_variance(w, cov).max(0.0).sqrt();
  if vol > 1e-15 {
    weighted_vol / vol
  } else {
    0.0
  }
}

pub(crate) fn equal_weights(n: usize) -> Vec<f64> {
  vec![1.0 / n as f64; n]
}

pub(crate) fn softmax(x: &[f64]) -> Vec<f64> {
  if x.is_empty() {
    return Vec::new();
  }

  let max_x = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let exps: Vec<f64> = x.iter().map(|&v| (v - max_x).exp()).collect();
  let sum: f64 = exps.iter().sum();

  if sum < 1e-15 || !sum.is_finite() {
    equal_weights(x.len())
  } else {
    exps.iter().map(|&e| e / sum).collect()
  }
}

/// Euclidean projection onto `{w : sum(w) = 1, 0 <= w_i <= cap}`.
///
/// Solves `sum(clamp(v_i - θ, 0, cap)) = 1` for the shift `θ` by bisection.
/// Requires `n * cap >= 1`; otherwise the set is empty and the fully capped
/// vector is returned.
pub(crate) fn project_capped_simplex(v: &[f64], cap: f64) -> Vec<f64> {
  let n = v.len();
  if n == 0 {
    return Vec::new();
  }
  if cap * n as f64 <= 1.0 {
    return vec![cap.min(1.0); n];
  }

  let total = |theta: f64| -> f64 { v.iter().map(|&x| (x - theta).clamp(0.0, cap)).sum() };
  let max_v = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let min_v = v.iter().cloned().fold(f64::INFINITY, f64::min);
  let mut lo = min_v - cap;
  let mut hi = max_v;

  for _ in 0..200 {
    let mid = 0.5 * (lo + hi);
    if total(mid) > 1.0 {
      lo = mid;
    } else {
      hi = mid;
    }
    if hi - lo < 1e-15 {
      break;
    }
  }

  let theta = 0.5 * (lo + hi);
  let mut w: Vec<f64> = v.iter().map(|&x| (x - theta).clamp(0.0, cap)).collect();
  let s: f64 = w.iter().sum();
  if s > 0.0 {
    for x in &mut w {
      *x /= s;
    }
  }
  w
}

/// Clip negatives to zero and renormalize. `None` when nothing positive is left.
pub(crate) fn clip_and_normalize(w: &[f64]) -> Option<Vec<f64>> {
  let clipped: Vec<f64> = w.iter().map(|x| x.max(0.0)).collect();
  let s: f64 = clipped.iter().sum();
  if s > 1e-15 && s.is_finite() {
    Some(clipped.iter().map(|x| x / s).collect())
  } else {
    None
  }
}

/// Unconstrained tangency direction `Σ⁻¹(μ − r_f 1)`.
pub(crate) fn tangency_direction(mu: &[f64], cov: &[Vec<f64>], risk_free: f64) -> Option<Vec<f64>> {
  let n = mu.len();
  let m = DMatrix::from_fn(n, n, |i, j| cov[i][j]);
  let excess = DVector::from_iterator(n, mu.iter().map(|m| m - risk_free));
  let x = match m.clone().cholesky() {
    Some(chol) => chol.solve(&excess),
    None => m.try_inverse()? * excess,
  };
  x.iter().all(|v| v.is_finite()).then(|| x.iter().copied().collect())
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  #[test]
  fn sharpe_zero_volatility_convention() {
    assert_eq!(sharpe_ratio(0.05, 0.0, 0.02), f64::INFINITY);
    assert_eq!(sharpe_ratio(0.01, 0.0, 0.02), f64::NEG_INFINITY);
    assert_eq!(sharpe_ratio(0.02, 0.0, 0.02), 0.0);
    assert_relative_eq!(sharpe_ratio(0.12, 0.2, 0.02), 0.5, epsilon = 1e-12);
  }

  #[test]
  fn capped_projection_respects_cap_and_budget() {
    let w = project_capped_simplex(&[0.9, 0.05, 0.05, 0.0], 0.4);
    assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    assert!(w.iter().all(|&x| (-1e-12..=0.4 + 1e-9).contains(&x)));
    assert_relative_eq!(w[0], 0.4, epsilon = 1e-9);
  }

  #[test]
  fn projection_of_simplex_point_is_identity() {
    let v = [0.2, 0.3, 0.5];
    let w = project_capped_simplex(&v, 1.0);
    for (a, b) in w.iter().zip(v.iter()) {
      assert_relative_eq!(a, b, epsilon = 1e-9);
    }
  }

  #[test]
  fn tangency_direction_on_diagonal_covariance() {
    let d = tangency_direction(&[0.10, 0.15], &[vec![0.04, 0.0], vec![0.0, 0.09]], 0.02).unwrap();
    assert_relative_eq!(d[0], 2.0, epsilon = 1e-10);
    assert_relative_eq!(d[1], 0.13 / 0.09, epsilon = 1e-10);
  }

  #[test]
  fn clip_and_normalize_drops_negatives() {
    let w = clip_and_normalize(&[2.0, -1.0, 2.0]).unwrap();
    assert_eq!(w, vec![0.5, 0.0, 0.5]);
    assert!(clip_and_normalize(&[-1.0, -2.0]).is_none());
  }
}

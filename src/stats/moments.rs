//! # Sample Moments
//!
//! $$
//! s = \sqrt{\tfrac{1}{N-1}\sum_t (x_t-\bar x)^2},\qquad
//! Q(p) = x_{(\lfloor h\rfloor)} + (h-\lfloor h\rfloor)\big(x_{(\lceil h\rceil)}-x_{(\lfloor h\rfloor)}\big),\ h=(N-1)p
//! $$
//!
//! Univariate sample statistics on plain slices.

pub fn sample_mean(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.iter().sum::<f64>() / xs.len() as f64
  }
}

/// Unbiased sample standard deviation (`ddof = 1`); 0 below two observations.
pub fn sample_std(xs: &[f64]) -> f64 {
  if xs.len() < 2 {
    return 0.0;
  }
  let mean = sample_mean(xs);
  let mut acc = 0.0;
  for &x in xs {
    let d = x - mean;
    acc += d * d;
  }
  (acc / (xs.len() - 1) as f64).sqrt()
}

/// Linearly interpolated empirical quantile, `p` in `[0, 1]`.
pub fn quantile(xs: &[f64], p: f64) -> f64 {
  if xs.is_empty() {
    return f64::NAN;
  }
  let mut sorted = xs.to_vec();
  sorted.sort_by(f64::total_cmp);
  quantile_sorted(&sorted, p)
}

pub(crate) fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
  let p = p.clamp(0.0, 1.0);
  let h = p * (sorted.len() as f64 - 1.0);
  let lo = h.floor() as usize;
  let hi = h.ceil() as usize;
  if lo == hi {
    sorted[lo]
  } else {
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
  }
}

/// Percentile rank of `score` in `xs` (0..100): the mean of the 1-based ranks
/// `score` would take among tied values.
pub fn percentile_of_score(xs: &[f64], score: f64) -> f64 {
  if xs.is_empty() {
    return f64::NAN;
  }
  let left = xs.iter().filter(|&&x| x < score).count();
  let right = xs.iter().filter(|&&x| x <= score).count();
  let plus_one = usize::from(left < right);
  (left + right + plus_one) as f64 * 50.0 / xs.len() as f64
}

fn central_moments(xs: &[f64]) -> (f64, f64, f64) {
  let n = xs.len() as f64;
  let mean = sample_mean(xs);
  let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
  for &x in xs {
    let d = x - mean;
    let d2 = d * d;
    m2 += d2;
    m3 += d2 * d;
    m4 += d2 * d2;
  }
  (m2 / n, m3 / n, m4 / n)
}

/// Bias-adjusted sample skewness `G1`; 0 for fewer than three points or a flat sample.
pub fn skewness(xs: &[f64]) -> f64 {
  if xs.len() < 3 {
    return 0.0;
  }
  let (m2, m3, _) = central_moments(xs);
  if m2 <= 1e-300 {
    return 0.0;
  }
  let n = xs.len() as f64;
  m3 / m2.powf(1.5) * (n * (n - 1.0)).sqrt() / (n - 2.0)
}

/// Bias-adjusted sample excess kurtosis `G2`; 0 for fewer than four points or a flat sample.
pub fn excess_kurtosis(xs: &[f64]) -> f64 {
  if xs.len() < 4 {
    return 0.0;
  }
  let (m2, _, m4) = central_moments(xs);
  if m2 <= 1e-300 {
    return 0.0;
  }
  let n = xs.len() as f64;
  let g2 = m4 / (m2 * m2) - 3.0;
  ((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0))
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  #[test]
  fn quantile_interpolates_between_order_statistics() {
    let xs = [4.0, 1.0, 3.0, 2.0, 5.0];
    assert_eq!(quantile(&xs, 0.0), 1.0);
    assert_eq!(quantile(&xs, 1.0), 5.0);
    assert_relative_eq!(quantile(&xs, 0.1), 1.4, epsilon = 1e-12);
    assert_relative_eq!(quantile(&xs, 0.5), 3.0, epsilon = 1e-12);
  }

  #[test]
  fn percentile_rank_counts_ties_half() {
    let xs = [1.0, 2.0, 3.0, 4.0];
    assert_relative_eq!(percentile_of_score(&xs, 3.0), 75.0, epsilon = 1e-12);
    assert_relative_eq!(percentile_of_score(&[1.0, 2.0, 3.0, 3.0, 4.0], 3.0), 70.0, epsilon = 1e-12);
    assert_relative_eq!(percentile_of_score(&xs, 2.5), 50.0, epsilon = 1e-12);
    assert_eq!(percentile_of_score(&xs, 0.0), 0.0);
    assert_eq!(percentile_of_score(&xs, 10.0), 100.0);
  }

  #[test]
  fn std_uses_sample_denominator() {
    assert_relative_eq!(sample_std(&[1.0, 2.0, 3.0, 4.0]), (5.0_f64 / 3.0).sqrt(), epsilon = 1e-12);
    assert_eq!(sample_std(&[1.0]), 0.0);
  }

  #[test]
  fn symmetric_sample_has_no_skew() {
    let xs = [-2.0, -1.0, 0.0, 1.0, 2.0];
    assert_relative_eq!(skewness(&xs), 0.0, epsilon = 1e-12);
    // G2 of five equally spaced points
    assert_relative_eq!(excess_kurtosis(&xs), -1.2, epsilon = 1e-12);
  }
}

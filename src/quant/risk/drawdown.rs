//! # Drawdown
//!
//! $$
//! D_t = \frac{V_t - \max_{s\le t} V_s}{\max_{s\le t} V_s}
//! $$
//!
//! An episode starts on the first period with `D_t < 0` and ends on the first
//! later period back at `D_t = 0`.

use serde::Serialize;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::traits::Report;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DrawdownEpisode {
  /// Index of the first period under water.
  pub start: usize,
  /// Index of the recovery period, `None` while still under water at the end.
  pub end: Option<usize>,
  /// Periods spent under water.
  pub duration: usize,
  /// Deepest drawdown inside the episode.
  pub depth: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DrawdownAnalysis {
  pub drawdowns: Vec<f64>,
  /// Most negative drawdown (0 for a path that never falls).
  pub max_drawdown: f64,
  /// Mean of the negative drawdowns, 0 when there are none.
  pub mean_drawdown: f64,
  pub episodes: Vec<DrawdownEpisode>,
  pub max_duration: usize,
  pub mean_duration: f64,
  /// Episodes per period.
  pub frequency: f64,
}

impl Report for DrawdownAnalysis {}

impl DrawdownAnalysis {
  /// Analyse a cumulative value path such as `(1 + r).cumprod()`.
  pub fn from_path(path: &[f64]) -> Result<Self> {
    if path.is_empty() {
      return Err(PortfolioError::EmptyInput("cumulative path"));
    }
    if path.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
      return Err(PortfolioError::invalid("cumulative path", "values must be positive and finite"));
    }
    Ok(Self::scan(path.iter().copied(), path[0], path.len()))
  }

  /// Analyse daily returns compounded from an initial value of one, so a loss on
  /// the first day already counts as a drawdown.
  pub fn from_returns(returns: &[f64]) -> Result<Self> {
    if returns.is_empty() {
      return Err(PortfolioError::EmptyInput("returns"));
    }
    if returns.iter().any(|r| !r.is_finite()) {
      return Err(PortfolioError::NonFinite("returns"));
    }
    if returns.iter().any(|&r| r < -1.0) {
      return Err(PortfolioError::invalid("returns", "a period cannot lose more than 100%"));
    }
    let wealth = returns.iter().scan(1.0, |v, r| {
      *v *= 1.0 + r;
      Some(*v)
    });
    Ok(Self::scan(wealth, 1.0, returns.len()))
  }

  fn scan(path: impl Iterator<Item = f64>, initial_peak: f64, len: usize) -> Self {
    let mut peak = initial_peak;
    let mut drawdowns = Vec::with_capacity(len);
    let mut episodes = Vec::new();
    let mut open: Option<DrawdownEpisode> = None;

    for (t, v) in path.enumerate() {
      peak = peak.max(v);
      let dd = (v - peak) / peak;
      drawdowns.push(dd);

      if dd < 0.0 {
        let ep = open.get_or_insert(DrawdownEpisode {
          start: t,
          end: None,
          duration: 0,
          depth: 0.0,
        });
        ep.duration += 1;
        ep.depth = ep.depth.min(dd);
      } else if let Some(mut ep) = open.take() {
        ep.end = Some(t);
        episodes.push(ep);
      }
    }
    if let Some(ep) = open {
      episodes.push(ep);
    }

    let underwater: Vec<f64> = drawdowns.iter().copied().filter(|d| *d < 0.0).collect();
    let mean_drawdown = if underwater.is_empty() {
      0.0
    } else {
      underwater.iter().sum::<f64>() / underwater.len() as f64
    };
    let mean_duration = if episodes.is_empty() {
      0.0
    } else {
      episodes.iter().map(|e| e.duration).sum::<usize>() as f64 / episodes.len() as f64
    };

    Self {
      max_drawdown: drawdowns.iter().cloned().fold(0.0, f64::min),
      mean_drawdown,
      max_duration: episodes.iter().map(|e| e.duration).max().unwrap_or(0),
      mean_duration,
      frequency: episodes.len() as f64 / len as f64,
      episodes,
      drawdowns,
    }
  }

  pub fn episode_count(&self) -> usize {
    self.episodes.len()
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  #[test]
  fn single_crash_day_opens_an_episode() {
    let mut returns = vec![0.01; 20];
    returns[10] = -0.5;
    let dd = DrawdownAnalysis::from_returns(&returns).unwrap();

    assert!(dd.max_drawdown <= -0.5);
    assert_eq!(dd.episodes[0].start, 10);
    assert_eq!(dd.episodes[0].end, None);
    assert_eq!(dd.episodes[0].duration, 10);
    assert_eq!(dd.episode_count(), 1);
  }

  #[test]
  fn recovery_closes_the_episode() {
    let path = [1.0, 1.1, 0.99, 1.05, 1.1, 1.2, 1.08, 1.2];
    let dd = DrawdownAnalysis::from_path(&path).unwrap();

    assert_eq!(dd.episode_count(), 2);
    assert_eq!(dd.episodes[0].start, 2);
    assert_eq!(dd.episodes[0].end, Some(4));
    assert_eq!(dd.episodes[0].duration, 2);
    assert_eq!(dd.episodes[1].duration, 1);
    assert_eq!(dd.max_duration, 2);
    assert_relative_eq!(dd.mean_duration, 1.5);
    assert_relative_eq!(dd.max_drawdown, -0.1, epsilon = 1e-12);
    assert_relative_eq!(dd.frequency, 2.0 / 8.0);
  }

  #[test]
  fn first_day_loss_counts_from_returns() {
    let dd = DrawdownAnalysis::from_returns(&[-0.1, 0.2]).unwrap();
    assert_relative_eq!(dd.max_drawdown, -0.1, epsilon = 1e-12);
    assert_eq!(dd.episodes[0].end, Some(1));
  }

  #[test]
  fn rising_path_has_no_drawdown() {
    let dd = DrawdownAnalysis::from_returns(&[0.01, 0.02, 0.0]).unwrap();
    assert_eq!(dd.max_drawdown, 0.0);
    assert_eq!(dd.mean_drawdown, 0.0);
    assert_eq!(dd.episode_count(), 0);
  }

  #[test]
  fn invalid_inputs() {
    assert!(DrawdownAnalysis::from_path(&[1.0, -1.0]).is_err());
    assert!(DrawdownAnalysis::from_returns(&[]).is_err());
    assert!(DrawdownAnalysis::from_returns(&[-1.5]).is_err());
  }
}

//! # Risk Rating
//!
//! Sub-scores bucketed into `{low, medium, high}` with ranks 1..3; the rank
//! sum decides the overall level.

use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

use crate::error::PortfolioError;
use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
  Low,
  Medium,
  High,
}

impl RiskLevel {
  pub fn rank(&self) -> u8 {
    match self {
      Self::Low => 1,
      Self::Medium => 2,
      Self::High => 3,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Low => "low",
      Self::Medium => "medium",
      Self::High => "high",
    }
  }
}

impl Display for RiskLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Bucket boundaries. VaR and drawdown are signed returns, so "low" means above
/// the first boundary; HHI is low below its first boundary.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatingThresholds {
  pub var_low: f64,
  pub var_medium: f64,
  pub hhi_low: f64,
  pub hhi_medium: f64,
  pub drawdown_low: f64,
  pub drawdown_medium: f64,
  /// Largest rank sum still rated low overall.
  pub overall_low: u8,
  /// Largest rank sum still rated medium overall.
  pub overall_medium: u8,
}

impl Default for RatingThresholds {
  fn default() -> Self {
    Self {
      var_low: -0.02,
      var_medium: -0.05,
      hhi_low: 2000.0,
      hhi_medium: 3500.0,
      drawdown_low: -0.10,
      drawdown_medium: -0.25,
      overall_low: 4,
      overall_medium: 7,
    }
  }
}

impl RatingThresholds {
  pub fn validate(&self) -> Result<()> {
    if !(self.var_low > self.var_medium) {
      return Err(PortfolioError::invalid("var thresholds", "var_low must exceed var_medium"));
    }
    if !(self.hhi_low < self.hhi_medium) {
      return Err(PortfolioError::invalid("hhi thresholds", "hhi_low must be below hhi_medium"));
    }
    if !(self.drawdown_low > self.drawdown_medium) {
      return Err(PortfolioError::invalid(
        "drawdown thresholds",
        "drawdown_low must exceed drawdown_medium",
      ));
    }
    if self.overall_low >= self.overall_medium {
      return Err(PortfolioError::invalid("overall thresholds", "overall_low must be below overall_medium"));
    }
    Ok(())
  }

  fn signed(value: f64, low: f64, medium: f64) -> RiskLevel {
    if value > low {
      RiskLevel::Low
    } else if value > medium {
      RiskLevel::Medium
    } else {
      RiskLevel::High
    }
  }

  pub fn rate(&self, var_95: f64, hhi: f64, max_drawdown: f64) -> RiskRating {
    let var_risk = Self::signed(var_95, self.var_low, self.var_medium);
    let concentration_risk = if hhi < self.hhi_low {
      RiskLevel::Low
    } else if hhi < self.hhi_medium {
      RiskLevel::Medium
    } else {
      RiskLevel::High
    };
    let drawdown_risk = Self::signed(max_drawdown, self.drawdown_low, self.drawdown_medium);

    let score = var_risk.rank() + concentration_risk.rank() + drawdown_risk.rank();
    let overall = if score <= self.overall_low {
      RiskLevel::Low
    } else if score <= self.overall_medium {
      RiskLevel::Medium
    } else {
      RiskLevel::High
    };

    RiskRating {
      var_risk,
      concentration_risk,
      drawdown_risk,
      score,
      overall,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RiskRating {
  pub var_risk: RiskLevel,
  pub concentration_risk: RiskLevel,
  pub drawdown_risk: RiskLevel,
  /// Sum of the three ranks, 3..=9.
  pub score: u8,
  pub overall: RiskLevel,
}

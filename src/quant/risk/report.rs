//! # Risk Report
//!
//! Tail risk, concentration, drawdown, stress and correlation analysis of one
//! weight vector, plus the aggregate rating.

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use super::concentration::concentration;
use super::concentration::ConcentrationRisk;
use super::correlation::correlation_risk;
use super::correlation::CorrelationRisk;
use super::correlation::CorrelationThresholds;
use super::drawdown::DrawdownAnalysis;
use super::rating::RatingThresholds;
use super::rating::RiskRating;
use super::stress::default_scenarios;
use super::stress::stress_test;
use super::stress::StressResult;
use super::stress::StressScenario;
use super::var::tail_risk_summary;
use super::var::value_at_risk;
use super::var::TailRisk;
use super::var::VarMethod;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::stats::correlation_matrix;
use crate::stats::ReturnTable;
use crate::traits::Report;

/// Confidence level the rating reads its VaR at.
const RATING_CONFIDENCE: f64 = 0.95;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
  pub confidence_levels: Vec<f64>,
  pub scenarios: Vec<StressScenario>,
  pub thresholds: RatingThresholds,
  pub correlation: CorrelationThresholds,
}

impl Default for RiskConfig {
  fn default() -> Self {
    Self {
      confidence_levels: vec![0.95, 0.99],
      scenarios: default_scenarios(),
      thresholds: RatingThresholds::default(),
      correlation: CorrelationThresholds::default(),
    }
  }
}

impl RiskConfig {
  pub fn validate(&self) -> Result<()> {
    if self.confidence_levels.is_empty() {
      return Err(PortfolioError::EmptyInput("confidence levels"));
    }
    if self.confidence_levels.iter().any(|c| !(*c > 0.0 && *c < 1.0)) {
      return Err(PortfolioError::invalid("confidence_levels", "each level must lie in (0, 1)"));
    }
    self.thresholds.validate()?;
    self.correlation.validate()
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RiskReport {
  pub tail_risk: Vec<TailRisk>,
  pub concentration: ConcentrationRisk,
  pub drawdown: DrawdownAnalysis,
  pub stress: Vec<StressResult>,
  pub correlation: Option<CorrelationRisk>,
  pub rating: RiskRating,
}

impl Report for RiskReport {}

impl RiskReport {
  pub fn tail_at(&self, confidence: f64) -> Option<&TailRisk> {
    self
      .tail_risk
      .iter()
      .find(|t| (t.confidence - confidence).abs() < 1e-12)
  }

  pub fn stress_for(&self, scenario: &str) -> Option<&StressResult> {
    self.stress.iter().find(|s| s.scenario == scenario)
  }
}

/// Stateless risk model over a fixed configuration.
#[derive(Clone, Debug)]
pub struct RiskAnalyzer {
  config: RiskConfig,
}

impl RiskAnalyzer {
  pub fn new(config: RiskConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &RiskConfig {
    &self.config
  }

  /// Full report for a realized portfolio return series.
  ///
  /// `instruments` enables the correlation section.
  pub fn report(
    &self,
    portfolio_returns: &[f64],
    weights: &[f64],
    instruments: Option<&ReturnTable>,
  ) -> Result<RiskReport> {
    let tail_risk = tail_risk_summary(portfolio_returns, &self.config.confidence_levels)?;
    let var_95 = match tail_risk
      .iter()
      .find(|t| (t.confidence - RATING_CONFIDENCE).abs() < 1e-12)
    {
      Some(t) => t.var_historical,
      None => value_at_risk(portfolio_returns, RATING_CONFIDENCE, VarMethod::Historical)?,
    };

    let concentration = concentration(weights)?;
    let drawdown = DrawdownAnalysis::from_returns(portfolio_returns)?;
    let stress = stress_test(portfolio_returns, &self.config.scenarios)?;

    let correlation = match instruments {
      Some(table) if table.n_periods() >= 2 => {
        let corr = correlation_matrix(table)?;
        Some(correlation_risk(
          table.names(),
          &corr,
          Some(weights),
          &self.config.correlation,
        )?)
      }
      Some(_) => {
        debug!("too few dates for a correlation section");
        None
      }
      None => None,
    };

    let rating = self
      .config
      .thresholds
      .rate(var_95, concentration.hhi, drawdown.max_drawdown);
    info!(
      var_95,
      hhi = concentration.hhi,
      max_drawdown = drawdown.max_drawdown,
      overall = %rating.overall,
      "risk report"
    );

    Ok(RiskReport {
      tail_risk,
      concentration,
      drawdown,
      stress,
      correlation,
      rating,
    })
  }

  /// Report for weights held over a per-instrument return table.
  pub fn report_for_table(&self, table: &ReturnTable, weights: &[f64]) -> Result<RiskReport> {
    let returns = table.portfolio_returns(weights)?;
    self.report(&returns.to_vec(), weights, Some(table))
  }
}

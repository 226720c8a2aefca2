//! # Risk
//!
//! $$
//! \mathrm{VaR}_c,\ \mathrm{CVaR}_c,\ \mathrm{HHI},\ \mathrm{MDD},\ \text{stress},\ \text{rating}
//! $$
//!
//! Pure functions of a realized return series and the weights that produced it.

pub mod concentration;
pub mod correlation;
pub mod drawdown;
pub mod performance;
pub mod rating;
pub mod report;
pub mod stress;
pub mod var;

pub use concentration::concentration;
pub use concentration::ConcentrationRisk;
pub use correlation::correlation_risk;
pub use correlation::weighted_exposures;
pub use correlation::CorrelatedHolding;
pub use correlation::CorrelationRisk;
pub use correlation::WeightedExposure;
pub use drawdown::DrawdownAnalysis;
pub use performance::evaluate_performance;
pub use performance::PerformanceConfig;
pub use performance::PerformanceMetrics;
pub use rating::RatingThresholds;
pub use rating::RiskLevel;
pub use rating::RiskRating;
pub use report::RiskAnalyzer;
pub use report::RiskConfig;
pub use report::RiskReport;
pub use stress::StressScenario;
pub use var::conditional_value_at_risk;
pub use var::value_at_risk;
pub use var::VarMethod;

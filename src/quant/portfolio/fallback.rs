//! # Fallback Chain
//!
//! $$
//! \text{Primary}\to\text{Fallback}_1\to\text{Fallback}_2\to\text{Failed}
//! $$
//!
//! Explicit state machine around the configured solver backends. Backends
//! are tried in order; if none converges the chain evaluates the analytic
//! tangency portfolio (clipped at zero, renormalized) and equal weights and
//! keeps whichever has the higher Sharpe ratio.

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::data::clip_and_normalize;
use super::data::equal_weights;
use super::data::portfolio_variance;
use super::data::project_capped_simplex;
use super::data::sharpe_ratio;
use super::data::tangency_direction;
use super::solver::BackendKind;
use super::solver::Problem;
use super::solver::SolverBackend;
use super::solver::SolverSettings;
use super::solver::SolverStatus;
use super::types::OptimizerMethod;
use super::types::PortfolioResult;
use super::types::Provenance;
use crate::error::PortfolioError;
use crate::error::Result;

/// States of the fallback chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackStage {
  AttemptingPrimary,
  AttemptingFallback1,
  AttemptingFallback2,
  Failed,
}

/// Closed-form candidates considered once every backend has failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
  /// Analytic tangency vs. equal weights, higher Sharpe wins.
  TangencyOrEqual,
  /// Equal weights only.
  EqualWeight,
}

/// Ordered list of solver backends with the fallback state machine.
pub struct SolverChain {
  backends: Vec<Box<dyn SolverBackend>>,
}

impl std::fmt::Debug for SolverChain {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_list()
      .entries(self.backends.iter().map(|b| b.name()))
      .finish()
  }
}

impl SolverChain {
  pub fn new(kinds: &[BackendKind], settings: SolverSettings) -> Result<Self> {
    if kinds.is_empty() {
      return Err(PortfolioError::invalid("backends", "at least one solver backend is required"));
    }
    Ok(Self {
      backends: kinds.iter().map(|k| k.build(settings)).collect(),
    })
  }

  /// Chain over caller-provided backends.
  pub fn from_backends(backends: Vec<Box<dyn SolverBackend>>) -> Result<Self> {
    if backends.is_empty() {
      return Err(PortfolioError::invalid("backends", "at least one solver backend is required"));
    }
    Ok(Self { backends })
  }

  /// Weights from the first backend that converges, without fallbacks.
  pub fn first_converged(&self, problem: &Problem) -> Option<(Vec<f64>, &'static str)> {
    for backend in &self.backends {
      let outcome = backend.solve(problem);
      match outcome.status {
        SolverStatus::Converged if outcome.weights.iter().all(|w| w.is_finite()) => {
          return Some((outcome.weights, backend.name()));
        }
        status => {
          warn!(backend = backend.name(), ?status, "solver backend did not converge");
        }
      }
    }
    None
  }

  /// Run the full fallback chain.
  pub fn solve(&self, problem: &Problem, policy: FallbackPolicy) -> Result<(Vec<f64>, Provenance)> {
    let mut stage = FallbackStage::AttemptingPrimary;
    let mut tangency = None;

    loop {
      debug!(?stage, "fallback chain");
      stage = match stage {
        FallbackStage::AttemptingPrimary => match self.first_converged(problem) {
          Some((weights, backend)) => {
            return Ok((
              weights,
              Provenance::Solver {
                backend: backend.to_string(),
              },
            ))
          }
          None => FallbackStage::AttemptingFallback1,
        },
        FallbackStage::AttemptingFallback1 => {
          if policy == FallbackPolicy::TangencyOrEqual {
            tangency = analytic_tangency(problem);
          }
          FallbackStage::AttemptingFallback2
        }
        FallbackStage::AttemptingFallback2 => {
          let equal = equal_weights(problem.n());
          let chosen = match tangency.take() {
            Some(t) if realized_sharpe(problem, &t) > realized_sharpe(problem, &equal) => {
              (t, Provenance::AnalyticTangency)
            }
            _ => (equal, Provenance::EqualWeight),
          };

          if chosen.0.iter().all(|w| w.is_finite()) && !realized_sharpe(problem, &chosen.0).is_nan() {
            warn!(provenance = ?chosen.1, "using closed-form fallback weights");
            return Ok(chosen);
          }
          FallbackStage::Failed
        }
        FallbackStage::Failed => {
          return Err(PortfolioError::AllStrategiesFailed(format!(
            "{:?} objective over {} instruments",
            problem.objective,
            problem.n()
          )))
        }
      };
    }
  }
}

impl SolverChain {
  /// Run the chain and evaluate the metrics bundle of the chosen weights.
  pub fn optimize(
    &self,
    method: OptimizerMethod,
    problem: &Problem,
    policy: FallbackPolicy,
  ) -> Result<PortfolioResult> {
    let (weights, provenance) = self.solve(problem, policy)?;
    PortfolioResult::evaluate(
      method,
      provenance,
      weights,
      &problem.mu,
      &problem.cov,
      problem.risk_free,
    )
  }
}

fn realized_sharpe(problem: &Problem, w: &[f64]) -> f64 {
  let ret: f64 = w.iter().zip(&problem.mu).map(|(a, b)| a * b).sum();
  let vol = portfolio_variance(w, &problem.cov).max(0.0).sqrt();
  sharpe_ratio(ret, vol, problem.risk_free)
}

/// Tangency weights clipped at zero, renormalized and pushed under the
/// weight cap when one is set.
fn analytic_tangency(problem: &Problem) -> Option<Vec<f64>> {
  let direction = tangency_direction(&problem.mu, &problem.cov, problem.risk_free)?;
  let w = clip_and_normalize(&direction)?;
  let cap = problem.weight_cap();
  if w.iter().any(|x| *x > cap) {
    Some(project_capped_simplex(&w, cap))
  } else {
    Some(w)
  }
}

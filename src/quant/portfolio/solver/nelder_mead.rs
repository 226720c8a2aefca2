//! # Nelder-Mead Backend
//!
//! $$
//! w_i = \frac{e^{x_i}}{\sum_j e^{x_j}},\qquad
//! \min_{\mathbf{x}\in\mathbb R^n} \mathcal L_\rho(\operatorname{softmax}(\mathbf{x}))
//! $$
//!
//! General constrained local solver. The softmax map keeps every iterate on
//! the simplex; weight caps and nonlinear constraints are penalized.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::solver::neldermead::NelderMead;
use tracing::debug;

use super::solve_augmented;
use super::AugmentedLagrangian;
use super::InnerSolve;
use super::Problem;
use super::SolverBackend;
use super::SolverOutcome;
use super::SolverSettings;
use super::SolverStatus;
use crate::quant::portfolio::data::softmax;

/// Cost reported for points where the penalized objective is not finite.
const INVALID_COST: f64 = 1e10;
/// Initial simplex edge in softmax space, then on warm restarts.
const SIMPLEX_STEP: f64 = 1.0;
const WARM_SIMPLEX_STEP: f64 = 0.25;

#[derive(Clone, Debug, Default)]
pub struct NelderMeadBackend {
  settings: SolverSettings,
}

impl NelderMeadBackend {
  pub fn new(settings: SolverSettings) -> Self {
    Self { settings }
  }

  fn minimize(
    &self,
    problem: &Problem,
    al: &AugmentedLagrangian,
    warm: &[f64],
    outer: usize,
  ) -> InnerSolve {
    let n = problem.n();
    let step = if outer == 0 { SIMPLEX_STEP } else { WARM_SIMPLEX_STEP };
    let x0: Vec<f64> = warm.iter().map(|w| w.max(1e-12).ln()).collect();

    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(x0.clone());
    for i in 0..n {
      let mut point = x0.clone();
      point[i] += step;
      simplex.push(point);
    }

    let cost = PenalizedCost {
      problem: problem.clone(),
      al: al.clone(),
    };
    let failed = InnerSolve {
      weights: warm.to_vec(),
      converged: false,
      iterations: 0,
    };

    let solver = match NelderMead::new(simplex).with_sd_tolerance(self.settings.tolerance) {
      Ok(solver) => solver,
      Err(_) => return failed,
    };
    match Executor::new(cost, solver)
      .configure(|state| state.max_iters(self.settings.max_iters))
      .run()
    {
      Ok(res) => {
        let converged = !matches!(
          res.state.get_termination_reason(),
          Some(TerminationReason::MaxItersReached)
        );
        let iterations = res.state.get_iter();
        let best_x = res.state.best_param.unwrap_or(x0);
        InnerSolve {
          weights: softmax(&best_x),
          converged,
          iterations,
        }
      }
      Err(_) => failed,
    }
  }
}

impl SolverBackend for NelderMeadBackend {
  fn name(&self) -> &'static str {
    "nelder_mead"
  }

  fn solve(&self, problem: &Problem) -> SolverOutcome {
    if problem.trivially_infeasible() {
      return SolverOutcome {
        weights: problem.starting_point(),
        status: SolverStatus::Infeasible,
        iterations: 0,
      };
    }

    let outcome = solve_augmented(problem, true, |al, warm, outer| {
      self.minimize(problem, al, warm, outer)
    });
    debug!(
      backend = self.name(),
      status = ?outcome.status,
      iterations = outcome.iterations,
      "solve finished"
    );
    outcome
  }
}

struct PenalizedCost {
  problem: Problem,
  al: AugmentedLagrangian,
}

impl CostFunction for PenalizedCost {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let w = softmax(x);
    let value = self.problem.objective_value(&w)
      + self.al.penalty(
        &self.problem.equality_values(&w),
        &self.problem.inequality_values(&w, true),
      );

    Ok(if value.is_finite() { value } else { INVALID_COST })
  }
}

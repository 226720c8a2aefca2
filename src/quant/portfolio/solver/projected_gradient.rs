//! # Projected Gradient Backend
//!
//! $$
//! \mathbf{w}_{k+1} = \Pi_{\Delta_u}\big(\mathbf{w}_k - t_k \nabla \mathcal L_\rho(\mathbf{w}_k)\big)
//! $$
//!
//! Convex-programming backend. Unconstrained Sharpe maximization uses the
//! homogenized quadratic program
//!
//! $$
//! \min_{\mathbf{y}\ge 0} \mathbf{y}^\top\Sigma\mathbf{y}
//! \quad\text{s.t.}\quad (\mu - r_f\mathbf{1})^\top\mathbf{y} = 1,
//! \qquad \mathbf{w} = \mathbf{y}/\mathbf{1}^\top\mathbf{y}
//! $$
//!
//! solved with accelerated projected gradient. Every other problem runs a
//! backtracking projected gradient on the capped simplex.

use tracing::debug;

use super::classify;
use super::solve_augmented;
use super::AugmentedLagrangian;
use super::InnerSolve;
use super::Objective;
use super::Problem;
use super::SolverBackend;
use super::SolverOutcome;
use super::SolverSettings;
use super::SolverStatus;
use crate::quant::portfolio::data::dot;
use crate::quant::portfolio::data::mat_vec_mul;
use crate::quant::portfolio::data::project_capped_simplex;

const MIN_STEP: f64 = 1e-18;
const MAX_STEP: f64 = 1e4;

#[derive(Clone, Debug, Default)]
pub struct ProjectedGradientBackend {
  settings: SolverSettings,
}

impl ProjectedGradientBackend {
  pub fn new(settings: SolverSettings) -> Self {
    Self { settings }
  }

  /// Backtracking projected gradient on the augmented Lagrangian.
  fn descend(&self, problem: &Problem, al: &AugmentedLagrangian, warm: &[f64]) -> InnerSolve {
    let cap = problem.weight_cap();
    let penalized = |w: &[f64]| -> f64 {
      problem.objective_value(w)
        + al.penalty(&problem.equality_values(w), &problem.inequality_values(w, false))
    };
    let gradient = |w: &[f64]| -> Vec<f64> {
      let mut grad = problem.objective_gradient(w);
      let (ce, ci) = al.coefficients(&problem.equality_values(w), &problem.inequality_values(w, false));
      for (c, dh) in ce.iter().zip(problem.equality_gradients()) {
        for (g, d) in grad.iter_mut().zip(dh) {
          *g += c * d;
        }
      }
      for (c, dg) in ci.iter().zip(problem.inequality_gradients(w)) {
        for (g, d) in grad.iter_mut().zip(dg) {
          *g += c * d;
        }
      }
      grad
    };

    let mut w = project_capped_simplex(warm, cap);
    let mut fw = penalized(&w);
    let mut step = 1.0;

    for iter in 0..self.settings.max_iters {
      let grad = gradient(&w);
      let mut t = step;
      let mut accepted = None;

      while t > MIN_STEP {
        let trial: Vec<f64> = w.iter().zip(&grad).map(|(wi, gi)| wi - t * gi).collect();
        let cand = project_capped_simplex(&trial, cap);
        let d: Vec<f64> = cand.iter().zip(&w).map(|(c, wi)| c - wi).collect();
        let fc = penalized(&cand);
        if fc <= fw + dot(&grad, &d) + dot(&d, &d) / (2.0 * t) {
          accepted = Some((cand, fc, d));
          break;
        }
        t *= 0.5;
      }

      let Some((cand, fc, d)) = accepted else {
        return InnerSolve {
          weights: w,
          converged: true,
          iterations: iter + 1,
        };
      };

      let moved = d.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
      w = cand;
      fw = fc;
      step = (2.0 * t).min(MAX_STEP);
      if moved <= self.settings.tolerance {
        return InnerSolve {
          weights: w,
          converged: true,
          iterations: iter + 1,
        };
      }
    }

    InnerSolve {
      weights: w,
      converged: false,
      iterations: self.settings.max_iters,
    }
  }

  /// Accelerated projected gradient on the homogenized tangency program.
  fn tangency_program(&self, problem: &Problem) -> SolverOutcome {
    let n = problem.n();
    let excess: Vec<f64> = problem.mu.iter().map(|m| m - problem.risk_free).collect();
    if excess.iter().all(|e| *e <= 0.0) {
      return SolverOutcome {
        weights: problem.starting_point(),
        status: SolverStatus::Infeasible,
        iterations: 0,
      };
    }

    // Gershgorin bound on the largest eigenvalue of 2Σ.
    let lipschitz = 2.0
      * problem
        .cov
        .iter()
        .map(|row| row.iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max);
    if lipschitz <= 0.0 {
      return SolverOutcome {
        weights: problem.starting_point(),
        status: SolverStatus::NonConvergent,
        iterations: 0,
      };
    }
    let step = 1.0 / lipschitz;
    let objective = |y: &[f64]| dot(y, &mat_vec_mul(&problem.cov, y));

    let mut y = project_excess_plane(&vec![1.0; n], &excess);
    let mut z = y.clone();
    let mut fy = objective(&y);
    let mut momentum = 1.0_f64;
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..self.settings.max_iters {
      iterations = iter + 1;
      let grad: Vec<f64> = mat_vec_mul(&problem.cov, &z).iter().map(|s| 2.0 * s).collect();
      let trial: Vec<f64> = z.iter().zip(&grad).map(|(zi, gi)| zi - step * gi).collect();
      let next = project_excess_plane(&trial, &excess);
      let f_next = objective(&next);

      if f_next > fy {
        // A plain step from `y` cannot ascend beyond rounding.
        if momentum == 1.0 {
          converged = true;
          break;
        }
        z = y.clone();
        momentum = 1.0;
        continue;
      }

      let scale = y.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
      let moved = next
        .iter()
        .zip(&y)
        .fold(0.0_f64, |acc, (a, b)| acc.max((a - b).abs()));
      let momentum_next = 0.5 * (1.0 + (1.0 + 4.0 * momentum * momentum).sqrt());
      let beta = (momentum - 1.0) / momentum_next;
      z = next
        .iter()
        .zip(&y)
        .map(|(a, b)| a + beta * (a - b))
        .collect();
      y = next;
      fy = f_next;
      momentum = momentum_next;

      if moved <= self.settings.tolerance * scale {
        converged = true;
        break;
      }
    }

    let total: f64 = y.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
      return SolverOutcome {
        weights: problem.starting_point(),
        status: SolverStatus::Infeasible,
        iterations,
      };
    }
    let weights = y.iter().map(|v| v / total).collect();
    classify(problem, weights, converged, iterations)
  }
}

impl SolverBackend for ProjectedGradientBackend {
  fn name(&self) -> &'static str {
    "projected_gradient"
  }

  fn solve(&self, problem: &Problem) -> SolverOutcome {
    if problem.trivially_infeasible() {
      return SolverOutcome {
        weights: problem.starting_point(),
        status: SolverStatus::Infeasible,
        iterations: 0,
      };
    }

    let outcome = if problem.objective == Objective::MaxSharpe && problem.constraints.is_empty() {
      self.tangency_program(problem)
    } else {
      solve_augmented(problem, false, |al, warm, _| self.descend(problem, al, warm))
    };
    debug!(
      backend = self.name(),
      status = ?outcome.status,
      iterations = outcome.iterations,
      "solve finished"
    );
    outcome
  }
}

/// Euclidean projection onto `{y >= 0, e^T y = 1}`.
///
/// `y_i = max(0, v_i - λ e_i)` and `Σ e_i y_i(λ)` is non-increasing in `λ`,
/// so `λ` is found by bracketing and bisection. Requires some `e_i > 0`.
fn project_excess_plane(v: &[f64], e: &[f64]) -> Vec<f64> {
  let level = |lambda: f64| -> f64 {
    v.iter()
      .zip(e)
      .map(|(vi, ei)| ei * (vi - lambda * ei).max(0.0))
      .sum()
  };

  let mut lo = -1.0;
  for _ in 0..200 {
    if level(lo) >= 1.0 {
      break;
    }
    lo *= 2.0;
  }
  let mut hi = 1.0;
  for _ in 0..200 {
    if level(hi) <= 1.0 {
      break;
    }
    hi *= 2.0;
  }

  for _ in 0..200 {
    let mid = 0.5 * (lo + hi);
    if level(mid) > 1.0 {
      lo = mid;
    } else {
      hi = mid;
    }
    if (hi - lo).abs() <= 1e-15 * (1.0 + hi.abs()) {
      break;
    }
  }

  let lambda = 0.5 * (lo + hi);
  v.iter()
    .zip(e)
    .map(|(vi, ei)| (vi - lambda * ei).max(0.0))
    .collect()
}

//! # Solver Backends
//!
//! $$
//! \min_{\mathbf{w}\in\Delta_u} f(\mathbf{w})
//! \quad\text{s.t.}\quad h(\mathbf{w}) = 0,\ g(\mathbf{w}) \le 0,
//! \qquad \Delta_u=\{\mathbf{w}: \mathbf{1}^\top\mathbf{w}=1,\ 0\le w_i\le u\}
//! $$
//!
//! Every optimizer in the crate reduces to this problem shape. Budget and
//! sign constraints are handled by each backend's parameterization; the
//! return target and volatility cap go through an augmented Lagrangian.

use serde::Deserialize;
use serde::Serialize;

use super::data::dot;
use super::data::equal_weights;
use super::data::mat_vec_mul;

pub mod nelder_mead;
pub mod projected_gradient;

pub use nelder_mead::NelderMeadBackend;
pub use projected_gradient::ProjectedGradientBackend;

/// Maximum constraint violation accepted as feasible.
pub const FEASIBILITY_TOL: f64 = 1e-6;
/// Violation at which the multiplier loop stops early.
const MULTIPLIER_TOL: f64 = 1e-8;
const MAX_OUTER_ITERS: usize = 30;
const VARIANCE_FLOOR: f64 = 1e-16;

/// How a backend run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
  Converged,
  Infeasible,
  NonConvergent,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SolverOutcome {
  pub weights: Vec<f64>,
  pub status: SolverStatus,
  pub iterations: u64,
}

/// Function minimized over the long-only simplex.
#[derive(Clone, Debug, PartialEq)]
pub enum Objective {
  /// Negative Sharpe ratio.
  MaxSharpe,
  /// Portfolio variance.
  MinVariance,
  /// Squared deviation of each risk share from `1/n`.
  RiskParity,
  /// Risk parity minus `boost * w^T mu`.
  BoostedRiskParity { boost: f64 },
  /// Negative `lambda * w^T stability + (1 - lambda) * sharpe`.
  StabilityBlend { stability: Vec<f64>, lambda: f64 },
}

/// Optional constraints on top of budget and long-only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
  /// `sqrt(w^T Σ w) <= max_volatility`.
  pub max_volatility: Option<f64>,
  /// `w_i <= max_weight`.
  pub max_weight: Option<f64>,
  /// `w^T mu = target_return`.
  pub target_return: Option<f64>,
}

impl Constraints {
  pub fn is_empty(&self) -> bool {
    self.max_volatility.is_none() && self.max_weight.is_none() && self.target_return.is_none()
  }
}

/// A fully specified optimization problem.
#[derive(Clone, Debug, PartialEq)]
pub struct Problem {
  pub mu: Vec<f64>,
  pub cov: Vec<Vec<f64>>,
  pub risk_free: f64,
  pub objective: Objective,
  pub constraints: Constraints,
}

impl Problem {
  pub fn new(mu: &[f64], cov: &[Vec<f64>], risk_free: f64, objective: Objective) -> Self {
    Self {
      mu: mu.to_vec(),
      cov: cov.to_vec(),
      risk_free,
      objective,
      constraints: Constraints::default(),
    }
  }

  pub fn with_constraints(mut self, constraints: Constraints) -> Self {
    self.constraints = constraints;
    self
  }

  pub fn n(&self) -> usize {
    self.mu.len()
  }

  /// Upper bound on each weight.
  pub fn weight_cap(&self) -> f64 {
    self.constraints.max_weight.unwrap_or(1.0).min(1.0)
  }

  /// Infeasibility that can be read off the data without solving.
  pub fn trivially_infeasible(&self) -> bool {
    let n = self.n() as f64;
    if self.weight_cap() * n < 1.0 - 1e-12 {
      return true;
    }
    if let Some(target) = self.constraints.target_return {
      let lo = self.mu.iter().cloned().fold(f64::INFINITY, f64::min);
      let hi = self.mu.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
      if target < lo - 1e-12 || target > hi + 1e-12 {
        return true;
      }
    }
    if let Some(cap) = self.constraints.max_volatility {
      if cap <= 0.0 {
        return true;
      }
    }
    false
  }

  pub fn starting_point(&self) -> Vec<f64> {
    equal_weights(self.n())
  }

  pub fn objective_value(&self, w: &[f64]) -> f64 {
    let sigma_w = mat_vec_mul(&self.cov, w);
    let var = dot(w, &sigma_w);

    match &self.objective {
      Objective::MaxSharpe => -self.smooth_sharpe(w, var),
      Objective::MinVariance => var,
      Objective::RiskParity => self.risk_parity_error(w, &sigma_w, var),
      Objective::BoostedRiskParity { boost } => {
        self.risk_parity_error(w, &sigma_w, var) - boost * dot(w, &self.mu)
      }
      Objective::StabilityBlend { stability, lambda } => {
        -(lambda * dot(w, stability) + (1.0 - lambda) * self.smooth_sharpe(w, var))
      }
    }
  }

  pub fn objective_gradient(&self, w: &[f64]) -> Vec<f64> {
    let sigma_w = mat_vec_mul(&self.cov, w);
    let var = dot(w, &sigma_w);

    match &self.objective {
      Objective::MaxSharpe => self
        .sharpe_gradient(w, &sigma_w, var)
        .into_iter()
        .map(|g| -g)
        .collect(),
      Objective::MinVariance => sigma_w.iter().map(|s| 2.0 * s).collect(),
      Objective::RiskParity => self.risk_parity_gradient(w, &sigma_w, var),
      Objective::BoostedRiskParity { boost } => self
        .risk_parity_gradient(w, &sigma_w, var)
        .into_iter()
        .zip(&self.mu)
        .map(|(g, m)| g - boost * m)
        .collect(),
      Objective::StabilityBlend { stability, lambda } => self
        .sharpe_gradient(w, &sigma_w, var)
        .into_iter()
        .zip(stability)
        .map(|(g, s)| -(lambda * s + (1.0 - lambda) * g))
        .collect(),
    }
  }

  /// Equality residuals `h(w)`.
  pub(crate) fn equality_values(&self, w: &[f64]) -> Vec<f64> {
    self
      .constraints
      .target_return
      .map(|t| vec![dot(w, &self.mu) - t])
      .unwrap_or_default()
  }

  /// Inequality values `g(w) <= 0`. Per-weight caps are included only when
  /// the backend cannot enforce them through its parameterization.
  pub(crate) fn inequality_values(&self, w: &[f64], include_caps: bool) -> Vec<f64> {
    let mut g = Vec::new();
    if let Some(cap) = self.constraints.max_volatility {
      let vol = self.portfolio_variance(w).max(0.0).sqrt();
      g.push(vol - cap);
    }
    if include_caps {
      if let Some(cap) = self.constraints.max_weight {
        g.extend(w.iter().map(|wi| wi - cap));
      }
    }
    g
  }

  pub(crate) fn equality_gradients(&self) -> Vec<Vec<f64>> {
    if self.constraints.target_return.is_some() {
      vec![self.mu.clone()]
    } else {
      Vec::new()
    }
  }

  /// Gradients of the non-cap inequalities at `w`.
  pub(crate) fn inequality_gradients(&self, w: &[f64]) -> Vec<Vec<f64>> {
    if self.constraints.max_volatility.is_some() {
      let sigma_w = mat_vec_mul(&self.cov, w);
      let vol = dot(w, &sigma_w).max(VARIANCE_FLOOR).sqrt();
      vec![sigma_w.iter().map(|s| s / vol).collect()]
    } else {
      Vec::new()
    }
  }

  /// Largest violation over every constraint, including budget and sign.
  pub fn max_violation(&self, w: &[f64]) -> f64 {
    let budget = (w.iter().sum::<f64>() - 1.0).abs();
    let sign = w.iter().map(|x| (-x).max(0.0)).fold(0.0, f64::max);
    let eq = self
      .equality_values(w)
      .iter()
      .map(|h| h.abs())
      .fold(0.0, f64::max);
    let ineq = self
      .inequality_values(w, true)
      .iter()
      .map(|g| g.max(0.0))
      .fold(0.0, f64::max);
    budget.max(sign).max(eq).max(ineq)
  }

  pub fn portfolio_variance(&self, w: &[f64]) -> f64 {
    dot(w, &mat_vec_mul(&self.cov, w))
  }

  fn smooth_sharpe(&self, w: &[f64], var: f64) -> f64 {
    (dot(w, &self.mu) - self.risk_free) / var.max(VARIANCE_FLOOR).sqrt()
  }

  fn sharpe_gradient(&self, w: &[f64], sigma_w: &[f64], var: f64) -> Vec<f64> {
    let vol = var.max(VARIANCE_FLOOR).sqrt();
    let excess = dot(w, &self.mu) - self.risk_free;
    self
      .mu
      .iter()
      .zip(sigma_w)
      .map(|(m, s)| m / vol - excess * s / (vol * vol * vol))
      .collect()
  }

  /// Squared distance of relative risk contributions from equal shares:
  /// `sum_i (w_i (Σw)_i / wᵀΣw - 1/n)^2`.
  ///
  /// Contributions are divided by the variance, not by `σ`. The `σ`-scaled
  /// form `w_i (Σw)_i / σ` has a target that shrinks with the portfolio and
  /// drives the search to a corner.
  fn risk_parity_error(&self, w: &[f64], sigma_w: &[f64], var: f64) -> f64 {
    let var = var.max(VARIANCE_FLOOR);
    let target = 1.0 / self.n() as f64;
    w.iter()
      .zip(sigma_w)
      .map(|(wi, si)| (wi * si / var - target).powi(2))
      .sum()
  }

  fn risk_parity_gradient(&self, w: &[f64], sigma_w: &[f64], var: f64) -> Vec<f64> {
    let n = self.n();
    let var = var.max(VARIANCE_FLOOR);
    let target = 1.0 / n as f64;
    let rc: Vec<f64> = w.iter().zip(sigma_w).map(|(wi, si)| wi * si / var).collect();
    let d: Vec<f64> = rc.iter().map(|r| r - target).collect();
    let dw: Vec<f64> = d.iter().zip(w).map(|(di, wi)| di * wi).collect();
    let cov_dw = mat_vec_mul(&self.cov, &dw);
    let d_rc = dot(&d, &rc);

    (0..n)
      .map(|k| 2.0 * (d[k] * sigma_w[k] + cov_dw[k]) / var - 4.0 * sigma_w[k] * d_rc / var)
      .collect()
  }
}

/// Iteration and tolerance limits shared by every backend.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
  /// Iteration cap per inner solve.
  pub max_iters: u64,
  /// Simplex spread (Nelder-Mead) or iterate movement (projected gradient)
  /// below which an inner solve counts as converged.
  pub tolerance: f64,
}

impl Default for SolverSettings {
  fn default() -> Self {
    Self {
      max_iters: 5000,
      tolerance: 1e-10,
    }
  }
}

/// A numerical optimizer for [`Problem`].
pub trait SolverBackend: Send + Sync {
  fn name(&self) -> &'static str;

  fn solve(&self, problem: &Problem) -> SolverOutcome;
}

/// Backend selector used by configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
  /// Derivative-free simplex search over a softmax parameterization.
  NelderMead,
  /// Projected gradient descent on the capped simplex.
  ProjectedGradient,
}

impl BackendKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::NelderMead => "nelder_mead",
      Self::ProjectedGradient => "projected_gradient",
    }
  }

  pub fn build(self, settings: SolverSettings) -> Box<dyn SolverBackend> {
    match self {
      Self::NelderMead => Box::new(NelderMeadBackend::new(settings)),
      Self::ProjectedGradient => Box::new(ProjectedGradientBackend::new(settings)),
    }
  }
}

/// Multipliers and penalty weight of the augmented Lagrangian
///
/// $$
/// \mathcal L_\rho = f + \sum_j \lambda_j h_j + \tfrac{\rho}{2} h_j^2
/// + \tfrac{1}{2\rho}\sum_k \big(\max(0, \nu_k + \rho g_k)^2 - \nu_k^2\big)
/// $$
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AugmentedLagrangian {
  eq: Vec<f64>,
  ineq: Vec<f64>,
  rho: f64,
}

impl AugmentedLagrangian {
  pub(crate) fn new(n_eq: usize, n_ineq: usize) -> Self {
    Self {
      eq: vec![0.0; n_eq],
      ineq: vec![0.0; n_ineq],
      rho: 10.0,
    }
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.eq.is_empty() && self.ineq.is_empty()
  }

  pub(crate) fn penalty(&self, h: &[f64], g: &[f64]) -> f64 {
    let rho = self.rho;
    let eq: f64 = self
      .eq
      .iter()
      .zip(h)
      .map(|(l, hj)| l * hj + 0.5 * rho * hj * hj)
      .sum();
    let ineq: f64 = self
      .ineq
      .iter()
      .zip(g)
      .map(|(nu, gk)| ((nu + rho * gk).max(0.0).powi(2) - nu * nu) / (2.0 * rho))
      .sum();
    eq + ineq
  }

  /// Coefficients multiplying `∇h_j` and `∇g_k` in the penalty gradient.
  pub(crate) fn coefficients(&self, h: &[f64], g: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let eq = self.eq.iter().zip(h).map(|(l, hj)| l + self.rho * hj).collect();
    let ineq = self
      .ineq
      .iter()
      .zip(g)
      .map(|(nu, gk)| (nu + self.rho * gk).max(0.0))
      .collect();
    (eq, ineq)
  }

  fn update(&mut self, h: &[f64], g: &[f64], stalled: bool) {
    let (eq, ineq) = self.coefficients(h, g);
    self.eq = eq;
    self.ineq = ineq;
    if stalled {
      self.rho = (self.rho * 10.0).min(1e8);
    }
  }
}

/// Result of one inner minimization.
pub(crate) struct InnerSolve {
  pub weights: Vec<f64>,
  pub converged: bool,
  pub iterations: u64,
}

/// Outer multiplier loop shared by both backends.
///
/// `inner` minimizes the penalized objective from a warm start and returns
/// the new iterate. It also receives the outer iteration index.
pub(crate) fn solve_augmented<F>(problem: &Problem, include_caps: bool, mut inner: F) -> SolverOutcome
where
  F: FnMut(&AugmentedLagrangian, &[f64], usize) -> InnerSolve,
{
  let start = problem.starting_point();
  let mut al = AugmentedLagrangian::new(
    problem.equality_values(&start).len(),
    problem.inequality_values(&start, include_caps).len(),
  );

  let mut w = start;
  let mut iterations = 0;
  let mut converged = false;
  let mut previous = f64::INFINITY;

  for outer in 0..MAX_OUTER_ITERS {
    let step = inner(&al, &w, outer);
    iterations += step.iterations;
    converged = step.converged;
    w = step.weights;

    if al.is_empty() {
      break;
    }

    let h = problem.equality_values(&w);
    let g = problem.inequality_values(&w, include_caps);
    let violation = h
      .iter()
      .map(|x| x.abs())
      .chain(g.iter().map(|x| x.max(0.0)))
      .fold(0.0, f64::max);
    if violation < MULTIPLIER_TOL {
      break;
    }
    al.update(&h, &g, violation > 0.25 * previous);
    previous = violation;
  }

  classify(problem, w, converged, iterations)
}

pub(crate) fn classify(problem: &Problem, weights: Vec<f64>, converged: bool, iterations: u64) -> SolverOutcome {
  let status = if weights.iter().any(|w| !w.is_finite()) {
    SolverStatus::NonConvergent
  } else if problem.max_violation(&weights) > FEASIBILITY_TOL {
    SolverStatus::Infeasible
  } else if !converged {
    SolverStatus::NonConvergent
  } else {
    SolverStatus::Converged
  };

  SolverOutcome {
    weights,
    status,
    iterations,
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  fn cov3() -> Vec<Vec<f64>> {
    vec![
      vec![0.04, 0.006, 0.002],
      vec![0.006, 0.09, 0.01],
      vec![0.002, 0.01, 0.0225],
    ]
  }

  fn finite_difference(problem: &Problem, w: &[f64]) -> Vec<f64> {
    let h = 1e-6;
    (0..w.len())
      .map(|i| {
        let mut up = w.to_vec();
        let mut dn = w.to_vec();
        up[i] += h;
        dn[i] -= h;
        (problem.objective_value(&up) - problem.objective_value(&dn)) / (2.0 * h)
      })
      .collect()
  }

  #[test]
  fn analytic_gradients_match_finite_differences() {
    let mu = [0.08, 0.12, 0.06];
    let w = [0.5, 0.2, 0.3];
    let objectives = [
      Objective::MaxSharpe,
      Objective::MinVariance,
      Objective::RiskParity,
      Objective::BoostedRiskParity { boost: 0.1 },
      Objective::StabilityBlend {
        stability: vec![-0.01, -0.02, -0.015],
        lambda: 0.3,
      },
    ];

    for objective in objectives {
      let problem = Problem::new(&mu, &cov3(), 0.02, objective);
      let analytic = problem.objective_gradient(&w);
      let numeric = finite_difference(&problem, &w);
      for (a, b) in analytic.iter().zip(&numeric) {
        assert_relative_eq!(a, b, epsilon = 1e-6, max_relative = 1e-5);
      }
    }
  }

  #[test]
  fn violation_covers_every_constraint() {
    let problem = Problem::new(&[0.1, 0.2], &[vec![0.04, 0.0], vec![0.0, 0.09]], 0.0, Objective::MinVariance)
      .with_constraints(Constraints {
        max_volatility: Some(0.1),
        max_weight: Some(0.6),
        target_return: Some(0.15),
      });

    let w = [0.8, 0.2];
    let vol = (0.64 * 0.04 + 0.04 * 0.09_f64).sqrt();
    let expected = (0.8_f64 - 0.6).max(vol - 0.1).max((0.12_f64 - 0.15).abs());
    assert_relative_eq!(problem.max_violation(&w), expected, epsilon = 1e-12);
  }

  #[test]
  fn trivially_infeasible_caps_and_targets() {
    let cov = vec![vec![0.04, 0.0], vec![0.0, 0.09]];
    let capped = Problem::new(&[0.1, 0.2], &cov, 0.0, Objective::MaxSharpe).with_constraints(Constraints {
      max_weight: Some(0.4),
      ..Constraints::default()
    });
    assert!(capped.trivially_infeasible());

    let target = Problem::new(&[0.1, 0.2], &cov, 0.0, Objective::MinVariance).with_constraints(Constraints {
      target_return: Some(0.3),
      ..Constraints::default()
    });
    assert!(target.trivially_infeasible());
  }

  #[test]
  fn penalty_vanishes_for_inactive_inequality_without_multiplier() {
    let al = AugmentedLagrangian::new(0, 1);
    assert_eq!(al.penalty(&[], &[-0.05]), 0.0);
    assert!(al.penalty(&[], &[0.05]) > 0.0);
  }
}

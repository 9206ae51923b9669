//! # Constrained Solver
//!
//! $$
//! \min_{\mathbf{w}\in\mathcal S} f(\mathbf{w})\quad\text{s.t.}\quad \mathbf{a}^\top\mathbf{w}\ge b,
//! \qquad \mathcal S=\{\mathbf{w}:\mathbf 1^\top\mathbf{w}=1,\ 0\le w_i\le u\}
//! $$
//!
//! Local solver for smooth objectives over the capped simplex with one optional linear
//! inequality. The simplex and the box are enforced exactly by Euclidean projection; the
//! inequality is handled by an augmented Lagrangian whose subproblems are solved with a
//! spectral (Barzilai-Borwein) projected gradient method and Armijo backtracking, run as
//! an argmin [`Solver`] under an [`Executor`].

use argmin::core::ArgminError;
use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::core::IterState;
use argmin::core::OptimizationResult;
use argmin::core::Problem;
use argmin::core::Solver;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::core::TerminationStatus;
use argmin::core::KV;
use argmin::kv;
use tracing::debug;

use crate::error::SolverError;

const ALPHA_MIN: f64 = 1e-10;
const ALPHA_MAX: f64 = 1e10;
const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 60;
const PENALTY_START: f64 = 10.0;
const PENALTY_MAX: f64 = 1e10;
/// A stalled line search this close to stationarity has hit the rounding floor.
const STALL_FLOOR: f64 = 100.0;

fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn sup_distance(a: &[f64], b: &[f64]) -> f64 {
  a.iter()
    .zip(b.iter())
    .map(|(x, y)| (x - y).abs())
    .fold(0.0, f64::max)
}

/// The set `{w : sum(w) = 1, 0 <= w_i <= upper}`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CappedSimplex {
  pub upper: f64,
}

impl CappedSimplex {
  pub fn new(upper: f64) -> Self {
    Self { upper }
  }

  /// Whether `n` weights capped at `upper` can sum to one.
  pub fn is_feasible_for(&self, n: usize) -> bool {
    n > 0 && self.upper > 0.0 && n as f64 * self.upper >= 1.0 - 1e-12
  }

  /// Euclidean projection of `v` onto the set.
  ///
  /// Solves `sum_i clamp(v_i - theta, 0, upper) = 1` for the shift `theta` by bisection.
  /// The caller guarantees [`Self::is_feasible_for`].
  pub fn project(&self, v: &[f64]) -> Vec<f64> {
    let u = self.upper;
    let filled = |theta: f64| -> f64 { v.iter().map(|&x| (x - theta).clamp(0.0, u)).sum() };

    let mut lo = v.iter().copied().fold(f64::INFINITY, f64::min) - u;
    let mut hi = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    for _ in 0..200 {
      let mid = 0.5 * (lo + hi);
      if filled(mid) > 1.0 {
        lo = mid;
      } else {
        hi = mid;
      }
      if hi - lo <= f64::EPSILON * (1.0 + hi.abs().max(lo.abs())) {
        break;
      }
    }

    let theta = 0.5 * (lo + hi);
    let mut w: Vec<f64> = v.iter().map(|&x| (x - theta).clamp(0.0, u)).collect();

    // spread the bisection residual over coordinates strictly inside the box
    let residual = 1.0 - w.iter().sum::<f64>();
    let free = w.iter().filter(|&&x| x > 0.0 && x < u).count();
    if free > 0 && residual != 0.0 {
      let share = residual / free as f64;
      for x in w.iter_mut().filter(|x| **x > 0.0 && **x < u) {
        *x = (*x + share).clamp(0.0, u);
      }
    }

    w
  }

  /// Largest value of `a' w` over the set, filling the largest coefficients first.
  pub fn max_linear(&self, a: &[f64]) -> f64 {
    let mut order: Vec<usize> = (0..a.len()).collect();
    order.sort_by(|&i, &j| a[j].total_cmp(&a[i]));

    let mut remaining = 1.0_f64;
    let mut best = 0.0;
    for i in order {
      if remaining <= 0.0 {
        break;
      }
      let take = self.upper.min(remaining);
      best += take * a[i];
      remaining -= take;
    }
    best
  }
}

/// Linear inequality `coeffs' w >= lower`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearConstraint {
  pub coeffs: Vec<f64>,
  pub lower: f64,
}

impl LinearConstraint {
  pub fn new(coeffs: Vec<f64>, lower: f64) -> Self {
    Self { coeffs, lower }
  }

  /// Slack `coeffs' w - lower`; negative when violated.
  pub fn slack(&self, w: &[f64]) -> f64 {
    dot(&self.coeffs, w) - self.lower
  }
}

/// Stopping rules shared by the inner and outer iterations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverConfig {
  /// Bound on the projected-gradient step `|P(w - grad) - w|_inf` and on the
  /// constraint violation at termination.
  pub tolerance: f64,
  /// Cap on the total number of projected-gradient iterations.
  pub max_iters: u64,
  /// Cap on the augmented-Lagrangian rounds when an inequality is present.
  pub max_outer: usize,
}

impl Default for SolverConfig {
  fn default() -> Self {
    Self {
      tolerance: 1e-6,
      max_iters: 5000,
      max_outer: 40,
    }
  }
}

/// Local minimizer found by [`minimize`].
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
  pub param: Vec<f64>,
  /// Objective value at `param`, without penalty terms.
  pub cost: f64,
  /// Projected-gradient iterations used.
  pub iterations: u64,
}

/// Objective plus the augmented-Lagrangian term of the optional inequality.
struct Penalized<'a, P> {
  inner: &'a P,
  constraint: Option<&'a LinearConstraint>,
  multiplier: f64,
  penalty: f64,
}

impl<P> Penalized<'_, P> {
  /// Active part of the multiplier estimate `max(0, lambda - rho * slack)`.
  fn shifted(&self, w: &[f64]) -> Option<(f64, f64)> {
    self.constraint.map(|c| {
      let slack = c.slack(w);
      ((self.multiplier - self.penalty * slack).max(0.0), slack)
    })
  }
}

impl<P> CostFunction for Penalized<'_, P>
where
  P: CostFunction<Param = Vec<f64>, Output = f64>,
{
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let base = self.inner.cost(w)?;
    let term = match self.shifted(w) {
      Some((shifted, _)) => (shifted * shifted - self.multiplier * self.multiplier) / (2.0 * self.penalty),
      None => 0.0,
    };
    Ok(base + term)
  }
}

impl<P> Gradient for Penalized<'_, P>
where
  P: Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, w: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
    let mut grad = self.inner.gradient(w)?;
    if let (Some((shifted, _)), Some(c)) = (self.shifted(w), self.constraint) {
      for (g, a) in grad.iter_mut().zip(c.coeffs.iter()) {
        *g -= shifted * a;
      }
    }
    Ok(grad)
  }
}

/// Iteration state carried by [`ProjectedGradient`].
pub type SolverState = IterState<Vec<f64>, Vec<f64>, (), (), (), f64>;

/// `|P(w - grad) - w|_inf`, zero exactly at first-order stationary points.
fn stationarity(set: &CappedSimplex, w: &[f64], grad: &[f64]) -> f64 {
  let step: Vec<f64> = w.iter().zip(grad.iter()).map(|(x, g)| x - g).collect();
  sup_distance(&set.project(&step), w)
}

fn finite_gradient<O>(problem: &mut Problem<O>, w: &Vec<f64>) -> Result<Vec<f64>, argmin::core::Error>
where
  O: Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  let grad = problem.gradient(w)?;
  if grad.iter().all(|g| g.is_finite()) {
    Ok(grad)
  } else {
    Err(SolverError::NonFiniteObjective.into())
  }
}

/// Spectral projected gradient over a [`CappedSimplex`].
///
/// Each iteration takes the projected step `P(w - alpha grad) - w`, backtracks until the
/// Armijo condition holds at a finite cost, then updates `alpha` with the Barzilai-Borwein
/// quotient. Terminates once the stationarity measure drops below `tolerance`.
#[derive(Clone, Debug)]
pub struct ProjectedGradient {
  set: CappedSimplex,
  tolerance: f64,
  alpha: f64,
  residual: f64,
}

impl ProjectedGradient {
  pub fn new(set: CappedSimplex, tolerance: f64) -> Self {
    Self {
      set,
      tolerance,
      alpha: 1.0,
      residual: f64::INFINITY,
    }
  }

  /// Stationarity measure at the last iterate.
  pub fn residual(&self) -> f64 {
    self.residual
  }
}

impl<O> Solver<O, SolverState> for ProjectedGradient
where
  O: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  const NAME: &'static str = "Spectral projected gradient";

  fn init(
    &mut self,
    problem: &mut Problem<O>,
    mut state: SolverState,
  ) -> Result<(SolverState, Option<KV>), argmin::core::Error> {
    let start = state.take_param().ok_or_else(|| ArgminError::NotInitialized {
      text: "`ProjectedGradient` requires a starting point".to_string(),
    })?;
    let w = self.set.project(&start);
    let cost = problem.cost(&w)?;
    if !cost.is_finite() {
      return Err(SolverError::NonFiniteObjective.into());
    }
    let grad = finite_gradient(problem, &w)?;

    self.residual = stationarity(&self.set, &w, &grad);
    self.alpha = if self.residual > 0.0 {
      (1.0 / self.residual).clamp(ALPHA_MIN, ALPHA_MAX)
    } else {
      1.0
    };

    Ok((
      state.param(w).gradient(grad).cost(cost),
      Some(kv!("stationarity" => self.residual;)),
    ))
  }

  fn next_iter(
    &mut self,
    problem: &mut Problem<O>,
    mut state: SolverState,
  ) -> Result<(SolverState, Option<KV>), argmin::core::Error> {
    let w = state.take_param().ok_or_else(|| ArgminError::NotInitialized {
      text: "`ProjectedGradient` lost its iterate".to_string(),
    })?;
    let grad = state.take_gradient().ok_or_else(|| ArgminError::NotInitialized {
      text: "`ProjectedGradient` lost its gradient".to_string(),
    })?;
    let fw = state.get_cost();

    let trial: Vec<f64> = w
      .iter()
      .zip(grad.iter())
      .map(|(x, g)| x - self.alpha * g)
      .collect();
    let direction: Vec<f64> = self
      .set
      .project(&trial)
      .iter()
      .zip(w.iter())
      .map(|(p, x)| p - x)
      .collect();
    let slope = dot(&grad, &direction);

    let mut step = 1.0;
    let mut accepted = None;
    if slope < 0.0 {
      for _ in 0..MAX_BACKTRACKS {
        let candidate: Vec<f64> = w
          .iter()
          .zip(direction.iter())
          .map(|(x, d)| x + step * d)
          .collect();
        let fc = problem.cost(&candidate)?;
        if fc.is_finite() && fc <= fw + ARMIJO * step * slope {
          accepted = Some((candidate, fc));
          break;
        }
        step *= 0.5;
      }
    }

    let Some((next, f_next)) = accepted else {
      if self.residual <= STALL_FLOOR * self.tolerance {
        debug!(residual = self.residual, "line search at rounding floor, accepting iterate");
        return Ok((
          state
            .param(w)
            .gradient(grad)
            .cost(fw)
            .terminate_with(TerminationReason::SolverConverged),
          None,
        ));
      }
      return Err(
        SolverError::Stalled {
          residual: self.residual,
        }
        .into(),
      );
    };

    let next_grad = finite_gradient(problem, &next)?;
    let s: Vec<f64> = next.iter().zip(w.iter()).map(|(a, b)| a - b).collect();
    let y: Vec<f64> = next_grad
      .iter()
      .zip(grad.iter())
      .map(|(a, b)| a - b)
      .collect();
    let sty = dot(&s, &y);
    self.alpha = if sty > 0.0 {
      (dot(&s, &s) / sty).clamp(ALPHA_MIN, ALPHA_MAX)
    } else {
      ALPHA_MAX
    };
    self.residual = stationarity(&self.set, &next, &next_grad);

    Ok((
      state.param(next).gradient(next_grad).cost(f_next),
      Some(kv!(
        "alpha" => self.alpha;
        "stationarity" => self.residual;
      )),
    ))
  }

  fn terminate(&mut self, _state: &SolverState) -> TerminationStatus {
    if self.residual <= self.tolerance {
      TerminationStatus::Terminated(TerminationReason::SolverConverged)
    } else {
      TerminationStatus::NotTerminated
    }
  }
}

/// Recover the typed failure raised inside the solver or the objective.
fn solver_error(err: argmin::core::Error) -> SolverError {
  match err.downcast::<SolverError>() {
    Ok(err) => err,
    Err(err) => SolverError::Objective(err.to_string()),
  }
}

/// Stationary point of one [`ProjectedGradient`] run.
struct Stationary {
  param: Vec<f64>,
  cost: f64,
  iterations: u64,
}

/// Run [`ProjectedGradient`] on `problem` with at most `budget` iterations.
fn stationary_point<O>(
  problem: O,
  set: &CappedSimplex,
  start: Vec<f64>,
  config: &SolverConfig,
  budget: u64,
) -> Result<Stationary, SolverError>
where
  O: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  let OptimizationResult {
    solver, mut state, ..
  } = Executor::new(problem, ProjectedGradient::new(*set, config.tolerance))
    .configure(|state: SolverState| state.param(start).max_iters(budget))
    .run()
    .map_err(solver_error)?;

  match state.get_termination_reason() {
    Some(TerminationReason::SolverConverged) => {}
    Some(TerminationReason::MaxItersReached) => {
      return Err(SolverError::IterationLimit {
        max_iters: config.max_iters,
        residual: solver.residual(),
      });
    }
    other => {
      return Err(SolverError::Objective(format!(
        "solver stopped early: {}",
        other.map_or("no termination reason", |reason| reason.text())
      )));
    }
  }

  let iterations = state.get_iter();
  let cost = state.get_cost();
  let param = state
    .take_param()
    .ok_or_else(|| SolverError::Objective("solver returned no iterate".to_string()))?;
  Ok(Stationary {
    param,
    cost,
    iterations,
  })
}

/// Minimize `problem` over `set`, optionally subject to `constraint`, starting from the
/// projection of `start`.
///
/// Fails when the constraints are infeasible, the objective is not finite at the start,
/// the line search stalls away from stationarity, the iteration budget runs out, or the
/// inequality is still violated after the last augmented-Lagrangian round.
pub fn minimize<P>(
  problem: &P,
  set: &CappedSimplex,
  constraint: Option<&LinearConstraint>,
  start: &[f64],
  config: &SolverConfig,
) -> Result<Solution, SolverError>
where
  P: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  let n = start.len();
  if !set.is_feasible_for(n) {
    return Err(SolverError::Infeasible(format!(
      "{n} weights capped at {} cannot sum to 1",
      set.upper
    )));
  }
  if let Some(c) = constraint {
    let attainable = set.max_linear(&c.coeffs);
    if attainable < c.lower - config.tolerance {
      return Err(SolverError::Infeasible(format!(
        "required level {} exceeds attainable maximum {attainable}",
        c.lower
      )));
    }
  }

  let w = set.project(start);

  let Some(c) = constraint else {
    let penalized = Penalized {
      inner: problem,
      constraint: None,
      multiplier: 0.0,
      penalty: PENALTY_START,
    };
    let found = stationary_point(penalized, set, w, config, config.max_iters)?;
    return Ok(Solution {
      param: found.param,
      cost: found.cost,
      iterations: found.iterations,
    });
  };

  let mut w = w;
  let mut used = 0_u64;
  let mut multiplier = 0.0_f64;
  let mut penalty = PENALTY_START;
  let mut last_violation = f64::INFINITY;
  for outer in 0..config.max_outer {
    let penalized = Penalized {
      inner: problem,
      constraint: Some(c),
      multiplier,
      penalty,
    };
    let found = stationary_point(penalized, set, w, config, config.max_iters.saturating_sub(used))?;
    used += found.iterations;
    w = found.param;

    let slack = c.slack(&w);
    let violation = (-slack).max(0.0);
    multiplier = (multiplier - penalty * slack).max(0.0);

    debug!(
      outer,
      violation,
      multiplier,
      penalty,
      iterations = used,
      "augmented lagrangian step"
    );

    if violation <= config.tolerance {
      let cost = problem
        .cost(&w)
        .map_err(|e| SolverError::Objective(e.to_string()))?;
      return Ok(Solution {
        param: w,
        cost,
        iterations: used,
      });
    }

    if violation > 0.25 * last_violation {
      penalty = (penalty * 10.0).min(PENALTY_MAX);
    }
    last_violation = violation;
  }

  Err(SolverError::OuterLimit {
    rounds: config.max_outer,
    violation: last_violation,
  })
}

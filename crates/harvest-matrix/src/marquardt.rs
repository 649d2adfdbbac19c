// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Levenberg–Marquardt Iteration
// ─────────────────────────────────────────────────────────────────────
//! Damped Gauss-Newton minimization shared by the density inversion and
//! the depth-weight coefficient fit.
//!
//! Each iteration solves `(H + λ·diag(H)) Δ = −g`. An accepted step
//! divides λ by `lm_step` (floor 1e-10), a rejected one multiplies it
//! (cap 1e10). A failed factorization counts as a rejected step.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use harvest_types::{sanitize_misfit, Termination};

use crate::linalg::cholesky_solve;

const LAMBDA_FLOOR: f64 = 1e-10;
const LAMBDA_CAP: f64 = 1e10;

/// Function minimized by [`marquardt`].
pub trait Objective {
    fn goal(&self, p: &Array1<f64>) -> f64;

    /// Gradient and (approximate) Hessian at `p`.
    fn gradient_hessian(&self, p: &Array1<f64>) -> (Array1<f64>, Array2<f64>);

    /// Map a trial point back into the feasible set.
    fn project(&self, _p: &mut Array1<f64>) {}
}

/// Step-control parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarquardtParams {
    pub lm_start: f64,
    pub lm_step: f64,
    pub max_steps: usize,
    pub max_it: usize,
    /// Relative goal change at which the iteration stops.
    pub tolerance: f64,
}

impl Default for MarquardtParams {
    fn default() -> Self {
        Self {
            lm_start: 1.0,
            lm_step: 10.0,
            max_steps: 20,
            max_it: 100,
            tolerance: 1e-4,
        }
    }
}

/// Log entry for one outer iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationLog {
    pub iteration: usize,
    pub goal: f64,
    pub lambda: f64,
    /// Trial steps taken before one was accepted.
    pub steps: usize,
}

#[derive(Debug, Clone)]
pub struct MarquardtOutcome {
    pub estimate: Array1<f64>,
    /// Goal per accepted iteration; entry 0 is the initial goal.
    pub goals: Vec<f64>,
    pub log: Vec<IterationLog>,
    pub termination: Termination,
}

/// Minimize `objective` from `initial`.
pub fn marquardt(
    objective: &dyn Objective,
    initial: Array1<f64>,
    params: &MarquardtParams,
) -> MarquardtOutcome {
    let mut p = initial;
    objective.project(&mut p);
    let mut goal = sanitize_misfit(objective.goal(&p));
    let mut goals = vec![goal];
    let mut log = Vec::new();
    let mut lambda = params.lm_start;
    let mut termination = Termination::IterationLimit;

    for iteration in 0..params.max_it {
        let (gradient, hessian) = objective.gradient_hessian(&p);
        let neg_gradient = gradient.mapv(|g| -g);
        let mut accepted: Option<(Array1<f64>, f64, usize)> = None;

        for step in 0..params.max_steps {
            let mut damped = hessian.clone();
            for i in 0..damped.nrows() {
                damped[[i, i]] += lambda * hessian[[i, i]];
            }
            let trial = cholesky_solve(&damped, &neg_gradient).map(|delta| {
                let mut t = &p + &delta;
                objective.project(&mut t);
                let g = sanitize_misfit(objective.goal(&t));
                (t, g)
            });
            match trial {
                Some((t, g)) if g < goal => {
                    lambda = (lambda / params.lm_step).max(LAMBDA_FLOOR);
                    accepted = Some((t, g, step + 1));
                    break;
                }
                _ => lambda = (lambda * params.lm_step).min(LAMBDA_CAP),
            }
        }

        let Some((next, next_goal, steps)) = accepted else {
            log::warn!(
                "marquardt: no step accepted after {} tries at iteration {iteration}",
                params.max_steps
            );
            termination = Termination::Stalled;
            break;
        };
        let change = if goal > 0.0 {
            (goal - next_goal).abs() / goal
        } else {
            0.0
        };
        p = next;
        goal = next_goal;
        goals.push(goal);
        log.push(IterationLog {
            iteration,
            goal,
            lambda,
            steps,
        });
        log::debug!("marquardt it {iteration}: goal {goal:.6e}, lambda {lambda:.1e}, {steps} steps");
        if change <= params.tolerance {
            termination = Termination::Converged;
            break;
        }
    }

    MarquardtOutcome {
        estimate: p,
        goals,
        log,
        termination,
    }
}

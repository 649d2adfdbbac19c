// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Regularization Terms
// ─────────────────────────────────────────────────────────────────────
//! Tikhonov, total-variation and compactness functionals on the cell
//! densities, plus the strategies that shape the Tikhonov weights.
//!
//! With `R` the first-derivative operator, the Tikhonov weight matrix is
//! `W = damping·I + smoothness·RᵀR + curvature·(RᵀR)ᵀ(RᵀR)` and enters
//! the goal as `pᵀWp`.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use harvest_physics::mesh::Shape;

use crate::config::RegularizationWeights;

/// Breakdown of the goal function of the density inversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalBreakdown {
    /// `‖d − Jp‖²`
    pub misfit: f64,
    /// `pᵀWp`
    pub tikhonov: f64,
    pub sharpness: f64,
    pub compactness: f64,
    pub total: f64,
}

/// Number of first-difference rows of a grid of `shape`.
pub fn derivative_count(shape: Shape) -> usize {
    let (nz, ny, nx) = shape;
    nx.saturating_sub(1) * ny * nz + ny.saturating_sub(1) * nx * nz + nz.saturating_sub(1) * nx * ny
}

/// First-difference operator over the three grid axes.
///
/// Rows hold `+1` at cell `p` and `−1` at its next cell along x, then y,
/// then z; columns are the mesh cells.
pub fn first_derivative(shape: Shape) -> Array2<f64> {
    let (nz, ny, nx) = shape;
    let size = nx * ny * nz;
    let mut deriv = Array2::<f64>::zeros((derivative_count(shape), size));
    let mut row = 0;
    let mut put = |p: usize, q: usize| {
        deriv[[row, p]] = 1.0;
        deriv[[row, q]] = -1.0;
        row += 1;
    };
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx.saturating_sub(1) {
                let p = i + j * nx + k * nx * ny;
                put(p, p + 1);
            }
        }
    }
    for k in 0..nz {
        for j in 0..ny.saturating_sub(1) {
            for i in 0..nx {
                let p = i + j * nx + k * nx * ny;
                put(p, p + nx);
            }
        }
    }
    for k in 0..nz.saturating_sub(1) {
        for j in 0..ny {
            for i in 0..nx {
                let p = i + j * nx + k * nx * ny;
                put(p, p + nx * ny);
            }
        }
    }
    deriv
}

/// Tikhonov weight matrix of `nparams` parameters.
///
/// `deriv` is required only when smoothness or curvature is positive.
pub fn tikhonov_weights(
    nparams: usize,
    weights: &RegularizationWeights,
    deriv: Option<&Array2<f64>>,
) -> Array2<f64> {
    let mut w = Array2::<f64>::eye(nparams) * weights.damping;
    if let Some(r) = deriv {
        if weights.smoothness > 0.0 || weights.curvature > 0.0 {
            let rtr = r.t().dot(r);
            if weights.curvature > 0.0 {
                w = w + rtr.t().dot(&rtr) * weights.curvature;
            }
            if weights.smoothness > 0.0 {
                w = w + rtr * weights.smoothness;
            }
        }
    }
    w
}

/// Total variation `Σ sqrt((Rp)² + β)`, its gradient and Hessian.
pub fn total_variation(
    deriv: &Array2<f64>,
    p: &Array1<f64>,
    beta: f64,
) -> (f64, Array1<f64>, Array2<f64>) {
    let rp = deriv.dot(p);
    let root = rp.mapv(|v| (v * v + beta).sqrt());
    let value = root.sum();
    let grad = deriv.t().dot(&(&rp / &root));
    let curv = root.mapv(|s| beta / (s * s * s));
    let scaled = deriv * &curv.insert_axis(Axis(1));
    let hess = deriv.t().dot(&scaled);
    (value, grad, hess)
}

/// Compactness `Σ p²/(p² + ε)`, its gradient and diagonal Hessian
/// approximation.
pub fn compactness(p: &Array1<f64>, epsilon: f64) -> (f64, Array1<f64>, Array1<f64>) {
    let value = p.iter().map(|&v| v * v / (v * v + epsilon)).sum();
    let grad = p.mapv(|v| 2.0 * v * epsilon / (v * v + epsilon).powi(2));
    let diag = p.mapv(|v| 2.0 * epsilon / (v * v + epsilon).powi(2));
    (value, grad, diag)
}

/// Shapes the Tikhonov weight matrix before it enters the goal.
pub trait RegularizationStrategy {
    fn name(&self) -> &'static str;

    fn apply(&self, weights: Array2<f64>) -> Array2<f64>;

    /// Per-cell depth weights, when the strategy uses them.
    fn depth_weights(&self) -> Option<&[f64]> {
        None
    }
}

/// Uses the Tikhonov weights unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

impl RegularizationStrategy for Plain {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn apply(&self, weights: Array2<f64>) -> Array2<f64> {
        weights
    }
}

/// Scales entry `(i, j)` of the Tikhonov weights by `w_i·w_j`.
#[derive(Debug, Clone)]
pub struct DepthWeighted {
    pub z0: f64,
    pub power: f64,
    weights: Vec<f64>,
}

impl DepthWeighted {
    pub fn new(z0: f64, power: f64, weights: Vec<f64>) -> Self {
        Self { z0, power, weights }
    }
}

impl RegularizationStrategy for DepthWeighted {
    fn name(&self) -> &'static str {
        "depth-weighted"
    }

    fn apply(&self, mut weights: Array2<f64>) -> Array2<f64> {
        for ((i, j), w) in weights.indexed_iter_mut() {
            if let (Some(wi), Some(wj)) = (self.weights.get(i), self.weights.get(j)) {
                *w *= wi * wj;
            }
        }
        weights
    }

    fn depth_weights(&self) -> Option<&[f64]> {
        Some(&self.weights)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Depth Weighting
// ─────────────────────────────────────────────────────────────────────
//! Depth weights `(depth + z0)^(−power/4)` counteracting the decay of
//! the kernels with depth (Li & Oldenburg, 1998).
//!
//! When `z0` or `power` is unknown both are fitted so that
//! `(depth + z0)^(−power/2)` follows the gzz kernel of every cell seen
//! from a point `grid_height` above its center.

use ndarray::{Array1, Array2};

use harvest_physics::mesh::PrismMesh;
use harvest_physics::params::Component;
use harvest_physics::prism::unit_effect;
use harvest_types::{HarvestError, HarvestResult, Termination};

use crate::marquardt::{marquardt, MarquardtParams, Objective};

/// Starting `(z0, power)` of the coefficient fit.
const INITIAL_COEFS: [f64; 2] = [1.0, 3.0];

/// Depth of every cell center (masked cells included).
fn cell_depths(mesh: &PrismMesh) -> Vec<f64> {
    let zs = mesh.zs();
    let (nz, ny, nx) = mesh.shape;
    (0..nz * ny * nx)
        .map(|index| {
            let k = index / (nx * ny);
            0.5 * (zs[k] + zs[k + 1])
        })
        .collect()
}

/// Depth weights of every mesh cell, optionally normalized by their
/// maximum.
pub fn depth_weights(mesh: &PrismMesh, z0: f64, power: f64, normalize: bool) -> HarvestResult<Vec<f64>> {
    let mut weights: Vec<f64> = cell_depths(mesh)
        .into_iter()
        .map(|depth| (depth + z0).powf(-0.25 * power))
        .collect();
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(HarvestError::Numerical(format!(
            "depth weights with z0 = {z0}, power = {power} are not finite"
        )));
    }
    if normalize {
        let max = weights.iter().copied().fold(0.0, f64::max);
        if max > 0.0 {
            weights.iter_mut().for_each(|w| *w /= max);
        }
    }
    Ok(weights)
}

/// Least-squares fit of `(depth + z0)^(−power/2)` to the cell kernels.
struct CoefficientFit {
    depths: Vec<f64>,
    kernels: Vec<f64>,
}

impl CoefficientFit {
    fn model(&self, p: &Array1<f64>) -> Vec<f64> {
        let (z0, power) = (p[0], p[1]);
        self.depths
            .iter()
            .map(|&d| (d + z0).powf(-0.5 * power))
            .collect()
    }
}

impl Objective for CoefficientFit {
    fn goal(&self, p: &Array1<f64>) -> f64 {
        self.model(p)
            .iter()
            .zip(&self.kernels)
            .map(|(m, k)| (k - m).powi(2))
            .sum()
    }

    fn gradient_hessian(&self, p: &Array1<f64>) -> (Array1<f64>, Array2<f64>) {
        let (z0, power) = (p[0], p[1]);
        let n = self.depths.len();
        let mut jac = Array2::<f64>::zeros((n, 2));
        let mut residuals = Array1::<f64>::zeros(n);
        for (i, (&d, &k)) in self.depths.iter().zip(&self.kernels).enumerate() {
            let base = d + z0;
            let m = base.powf(-0.5 * power);
            residuals[i] = k - m;
            jac[[i, 0]] = -0.5 * power * base.powf(-0.5 * (power + 2.0));
            jac[[i, 1]] = -0.5 * base.ln() * m;
        }
        let gradient = jac.t().dot(&residuals) * -2.0;
        let hessian = jac.t().dot(&jac) * 2.0;
        (gradient, hessian)
    }
}

/// Fit `(z0, power)` for data observed `grid_height` meters above the
/// top of the mesh (z points down, so the point sits at `−grid_height`).
pub fn fit_depth_coefficients(mesh: &PrismMesh, grid_height: f64) -> HarvestResult<(f64, f64)> {
    if !grid_height.is_finite() {
        return Err(HarvestError::Validation(format!(
            "grid_height must be finite, got {grid_height}"
        )));
    }
    let mut depths = Vec::with_capacity(mesh.size());
    let mut kernels = Vec::with_capacity(mesh.size());
    for prism in mesh.cells().flatten() {
        let [cx, cy, cz] = prism.center();
        depths.push(cz);
        kernels.push(unit_effect(Component::Gzz, &prism, [cx, cy, -grid_height]));
    }
    if depths.is_empty() {
        return Err(HarvestError::Validation("mesh has no unmasked cells".into()));
    }
    let fit = CoefficientFit { depths, kernels };
    let out = marquardt(&fit, Array1::from(INITIAL_COEFS.to_vec()), &MarquardtParams::default());
    let (z0, power) = (out.estimate[0], out.estimate[1]);
    if !(z0.is_finite() && power.is_finite()) {
        return Err(HarvestError::Numerical("depth coefficient fit diverged".into()));
    }
    if out.termination != Termination::Converged {
        log::warn!("depth coefficient fit ended with {:?}", out.termination);
    }
    log::info!("adjusted depth weighting coefficients: z0 = {z0:.6}, power = {power:.6}");
    Ok((z0, power))
}

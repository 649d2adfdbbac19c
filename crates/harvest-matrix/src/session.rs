// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Inversion Session
// ─────────────────────────────────────────────────────────────────────
//! Owner of the mesh, the observations and every cache derived from
//! them (Jacobian, depth weights, seed distances).
//!
//! Replacing the data or the mesh drops the Jacobian; `clear()` drops
//! everything and restores plain regularization.

use std::collections::BTreeMap;
use std::time::Instant;

use ndarray::{Array1, Array2, Axis};

use harvest_physics::mesh::PrismMesh;
use harvest_physics::params::Component;
use harvest_types::{ensure_same_len, HarvestError, HarvestResult, Termination};

use crate::config::{check_bounds, MatrixConfig, RegularizationWeights};
use crate::depth::{depth_weights, fit_depth_coefficients};
use crate::jacobian::{JacobianBuilder, PrismJacobian};
use crate::marquardt::{marquardt, IterationLog, Objective};
use crate::observed::ObservedData;
use crate::regularization::{
    compactness, first_derivative, tikhonov_weights, total_variation, DepthWeighted, GoalBreakdown,
    Plain, RegularizationStrategy,
};

/// Starting density of every cell when no initial estimate is given.
pub const INITIAL_DENSITY: f64 = 1e-7;

/// Result of [`InversionSession::solve`].
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    /// Density of every mesh cell.
    pub estimate: Vec<f64>,
    /// Goal per accepted iteration; entry 0 is the initial goal.
    pub goals: Vec<f64>,
    pub log: Vec<IterationLog>,
    pub breakdown: GoalBreakdown,
    pub termination: Termination,
    pub elapsed_ms: f64,
}

/// Least-squares goal with every regularizing term of the session,
/// over the unmasked cells only.
struct DensityGoal {
    /// Mesh index of every free parameter.
    active: Vec<usize>,
    size: usize,
    jacobian: Array2<f64>,
    data: Array1<f64>,
    /// `2JᵀJ + 2W`
    base_hessian: Array2<f64>,
    /// `2Jᵀd`
    scaled_jtd: Array1<f64>,
    tikhonov: Array2<f64>,
    deriv: Option<Array2<f64>>,
    weights: RegularizationWeights,
    lower: Option<f64>,
    upper: Option<f64>,
}

impl DensityGoal {
    fn new(session: &InversionSession, jacobian: &Array2<f64>, data: Array1<f64>) -> HarvestResult<Self> {
        let active = session.active_cells();
        if active.is_empty() {
            return Err(HarvestError::Validation("every mesh cell is masked".into()));
        }
        let weights = session.config.weights.clone();
        let full_deriv = weights
            .needs_derivatives()
            .then(|| first_derivative(session.mesh.shape));
        let tikhonov = session
            .strategy
            .apply(tikhonov_weights(jacobian.ncols(), &weights, full_deriv.as_ref()))
            .select(Axis(0), &active)
            .select(Axis(1), &active);
        let deriv = full_deriv.map(|r| r.select(Axis(1), &active));
        let jacobian = jacobian.select(Axis(1), &active);
        let base_hessian = (jacobian.t().dot(&jacobian) + &tikhonov) * 2.0;
        let scaled_jtd = jacobian.t().dot(&data) * 2.0;
        Ok(Self {
            active,
            size: session.mesh.size(),
            jacobian,
            data,
            base_hessian,
            scaled_jtd,
            tikhonov,
            deriv,
            weights,
            lower: session.config.lower,
            upper: session.config.upper,
        })
    }

    /// Free parameters of a full-mesh estimate.
    fn gather(&self, estimate: &[f64]) -> Array1<f64> {
        self.active.iter().map(|&i| estimate[i]).collect()
    }

    /// Full-mesh estimate with masked cells at zero.
    fn scatter(&self, p: &Array1<f64>) -> Vec<f64> {
        let mut estimate = vec![0.0; self.size];
        for (&i, &v) in self.active.iter().zip(p.iter()) {
            estimate[i] = v;
        }
        estimate
    }

    fn breakdown(&self, p: &Array1<f64>) -> GoalBreakdown {
        let residuals = &self.data - &self.jacobian.dot(p);
        let misfit = residuals.dot(&residuals);
        let tikhonov = p.dot(&self.tikhonov.dot(p));
        let sharpness = match &self.deriv {
            Some(r) if self.weights.sharpness > 0.0 => {
                self.weights.sharpness * total_variation(r, p, self.weights.beta).0
            }
            _ => 0.0,
        };
        let compact = if self.weights.compactness > 0.0 {
            self.weights.compactness * compactness(p, self.weights.epsilon).0
        } else {
            0.0
        };
        GoalBreakdown {
            misfit,
            tikhonov,
            sharpness,
            compactness: compact,
            total: misfit + tikhonov + sharpness + compact,
        }
    }
}

impl Objective for DensityGoal {
    fn goal(&self, p: &Array1<f64>) -> f64 {
        self.breakdown(p).total
    }

    fn gradient_hessian(&self, p: &Array1<f64>) -> (Array1<f64>, Array2<f64>) {
        let mut gradient = self.base_hessian.dot(p) - &self.scaled_jtd;
        let mut hessian = self.base_hessian.clone();
        if let Some(r) = self.deriv.as_ref().filter(|_| self.weights.sharpness > 0.0) {
            let (_, g, h) = total_variation(r, p, self.weights.beta);
            gradient = gradient + g * self.weights.sharpness;
            hessian = hessian + h * self.weights.sharpness;
        }
        if self.weights.compactness > 0.0 {
            let (_, g, diag) = compactness(p, self.weights.epsilon);
            gradient = gradient + g * self.weights.compactness;
            for (i, d) in diag.iter().enumerate() {
                hessian[[i, i]] += self.weights.compactness * d;
            }
        }
        (gradient, hessian)
    }

    fn project(&self, p: &mut Array1<f64>) {
        if let Some(lo) = self.lower {
            p.mapv_inplace(|v| v.max(lo));
        }
        if let Some(hi) = self.upper {
            p.mapv_inplace(|v| v.min(hi));
        }
    }
}

/// Density inversion on a fixed mesh.
pub struct InversionSession {
    pub(crate) mesh: PrismMesh,
    pub(crate) config: MatrixConfig,
    builder: Box<dyn JacobianBuilder>,
    strategy: Box<dyn RegularizationStrategy>,
    pub(crate) data: Option<ObservedData>,
    pub(crate) jacobian: Option<Array2<f64>>,
    /// Seed cells and the Chebyshev distance of every cell to them.
    pub(crate) distances: Option<(Vec<usize>, Vec<f64>)>,
}

impl InversionSession {
    /// Session with the prism Jacobian and plain regularization.
    pub fn new(mesh: PrismMesh, config: MatrixConfig) -> HarvestResult<Self> {
        Self::with_parts(mesh, config, Box::new(PrismJacobian), Box::new(Plain))
    }

    pub fn with_parts(
        mesh: PrismMesh,
        config: MatrixConfig,
        builder: Box<dyn JacobianBuilder>,
        strategy: Box<dyn RegularizationStrategy>,
    ) -> HarvestResult<Self> {
        config.validate()?;
        log::info!(
            "inversion session: {} cells {:?}, {} Jacobian, {} regularization",
            mesh.size(),
            mesh.shape,
            builder.name(),
            strategy.name()
        );
        Ok(Self {
            mesh,
            config,
            builder,
            strategy,
            data: None,
            jacobian: None,
            distances: None,
        })
    }

    pub fn mesh(&self) -> &PrismMesh {
        &self.mesh
    }

    pub fn config(&self) -> &MatrixConfig {
        &self.config
    }

    pub fn data(&self) -> Option<&ObservedData> {
        self.data.as_ref()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn depth_weights(&self) -> Option<&[f64]> {
        self.strategy.depth_weights()
    }

    pub fn has_jacobian(&self) -> bool {
        self.jacobian.is_some()
    }

    /// Indices of the unmasked mesh cells.
    fn active_cells(&self) -> Vec<usize> {
        (0..self.mesh.size())
            .filter(|&i| !self.mesh.is_masked(i))
            .collect()
    }

    /// Replace the observations. The Jacobian is kept when they are
    /// unchanged.
    pub fn set_data(&mut self, data: ObservedData) -> HarvestResult<()> {
        if data.is_empty() {
            return Err(HarvestError::Validation("no observed data".into()));
        }
        if self.data.as_ref() != Some(&data) {
            self.jacobian = None;
            self.data = Some(data);
        }
        Ok(())
    }

    /// Replace the mesh, dropping every mesh-derived cache.
    pub fn set_mesh(&mut self, mesh: PrismMesh) {
        if self.strategy.depth_weights().is_some() {
            log::warn!("new mesh: depth weights dropped, plain regularization restored");
            self.strategy = Box::new(Plain);
        }
        self.mesh = mesh;
        self.jacobian = None;
        self.distances = None;
    }

    pub fn set_strategy(&mut self, strategy: Box<dyn RegularizationStrategy>) {
        self.strategy = strategy;
    }

    pub fn set_bounds(&mut self, lower: Option<f64>, upper: Option<f64>) -> HarvestResult<()> {
        check_bounds(lower, upper)?;
        self.config.lower = lower;
        self.config.upper = upper;
        Ok(())
    }

    /// Drop the observations and all caches, restore plain regularization.
    pub fn clear(&mut self) {
        self.data = None;
        self.jacobian = None;
        self.distances = None;
        self.strategy = Box::new(Plain);
    }

    /// Use depth-weighted Tikhonov regularization in the next solves.
    ///
    /// `z0` and `power` are fitted when either is missing, which needs
    /// the height of the data grid above the mesh. Returns the
    /// coefficients used.
    pub fn use_depth_weights(
        &mut self,
        z0: Option<f64>,
        power: Option<f64>,
        grid_height: Option<f64>,
        normalize: bool,
    ) -> HarvestResult<(f64, f64)> {
        let (z0, power) = match (z0, power) {
            (Some(z0), Some(power)) => (z0, power),
            _ => {
                let height = grid_height.ok_or_else(|| {
                    HarvestError::Validation(
                        "grid_height is required to fit the depth weighting coefficients".into(),
                    )
                })?;
                fit_depth_coefficients(&self.mesh, height)?
            }
        };
        let weights = depth_weights(&self.mesh, z0, power, normalize)?;
        log::info!("depth weighting: z0 = {z0}, power = {power}, normalized {normalize}");
        self.strategy = Box::new(DepthWeighted::new(z0, power, weights));
        Ok((z0, power))
    }

    /// The sensitivity matrix of the current data, built on first use.
    pub fn jacobian(&mut self) -> HarvestResult<&Array2<f64>> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| HarvestError::Validation("no data set: can't build the Jacobian".into()))?;
        let (builder, mesh) = (&self.builder, &self.mesh);
        Ok(self.jacobian.get_or_insert_with(|| builder.build(data, mesh)))
    }

    /// Observations stacked in canonical component order.
    pub fn data_vector(&self) -> HarvestResult<Vec<f64>> {
        self.data
            .as_ref()
            .map(ObservedData::data_vector)
            .ok_or_else(|| HarvestError::Validation("no data set".into()))
    }

    /// Data predicted by `estimate`, stacked like [`data_vector`](Self::data_vector).
    pub fn adjusted(&mut self, estimate: &[f64]) -> HarvestResult<Vec<f64>> {
        ensure_same_len("estimate/mesh cells", estimate.len(), self.mesh.size())?;
        let jac = self.jacobian()?;
        Ok(jac.dot(&Array1::from(estimate.to_vec())).to_vec())
    }

    /// Predicted data split per component.
    pub fn adjusted_by_component(&mut self, estimate: &[f64]) -> HarvestResult<BTreeMap<Component, Vec<f64>>> {
        let adjusted = self.adjusted(estimate)?;
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| HarvestError::Validation("no data set".into()))?;
        data.split(&adjusted)
    }

    /// Observed minus predicted data.
    pub fn residuals(&mut self, estimate: &[f64]) -> HarvestResult<Vec<f64>> {
        let adjusted = self.adjusted(estimate)?;
        let observed = self.data_vector()?;
        Ok(observed.iter().zip(&adjusted).map(|(o, a)| o - a).collect())
    }

    /// Goal of `estimate`, term by term. Masked cells do not contribute.
    pub fn goal_breakdown(&mut self, estimate: &[f64]) -> HarvestResult<GoalBreakdown> {
        ensure_same_len("estimate/mesh cells", estimate.len(), self.mesh.size())?;
        let data = Array1::from(self.data_vector()?);
        self.jacobian()?;
        let Some(jac) = self.jacobian.as_ref() else {
            return Err(HarvestError::Validation("no Jacobian".into()));
        };
        let goal = DensityGoal::new(self, jac, data)?;
        Ok(goal.breakdown(&goal.gather(estimate)))
    }

    /// Invert `data` for the density of every mesh cell.
    ///
    /// Starts from `initial` or from [`INITIAL_DENSITY`] in every cell.
    /// Masked cells are left out of the system and come back as zero.
    pub fn solve(&mut self, data: ObservedData, initial: Option<Vec<f64>>) -> HarvestResult<SolveOutcome> {
        self.set_data(data)?;
        let initial = match initial {
            Some(p) => {
                ensure_same_len("initial estimate/mesh cells", p.len(), self.mesh.size())?;
                p
            }
            None => vec![INITIAL_DENSITY; self.mesh.size()],
        };
        let w = &self.config.weights;
        log::info!(
            "inversion parameters: damping {}, smoothness {}, curvature {}, sharpness {} (beta {}), compactness {} (epsilon {}), bounds {:?}..{:?}",
            w.damping,
            w.smoothness,
            w.curvature,
            w.sharpness,
            w.beta,
            w.compactness,
            w.epsilon,
            self.config.lower,
            self.config.upper
        );

        let start = Instant::now();
        let data = Array1::from(self.data_vector()?);
        self.jacobian()?;
        let Some(jac) = self.jacobian.as_ref() else {
            return Err(HarvestError::Validation("no Jacobian".into()));
        };
        let goal = DensityGoal::new(self, jac, data)?;
        let out = marquardt(&goal, goal.gather(&initial), &self.config.marquardt);
        let breakdown = goal.breakdown(&out.estimate);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        if out.termination == Termination::Stalled {
            log::warn!("inversion stalled after {} iterations", out.log.len());
        }
        log::info!(
            "final goal {:.6e} after {} iterations ({:?}, {elapsed_ms:.1} ms)",
            breakdown.total,
            out.log.len(),
            out.termination
        );
        Ok(SolveOutcome {
            estimate: goal.scatter(&out.estimate),
            goals: out.goals,
            log: out.log,
            breakdown,
            termination: out.termination,
            elapsed_ms,
        })
    }
}

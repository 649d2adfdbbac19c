// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Data Modules
// ─────────────────────────────────────────────────────────────────────
//! Data modules wrap one observed field component and answer two
//! questions for the growth solver: what the misfit would be if a cell
//! were added (`testdrive`), and how the predicted data change once it
//! is added for good (`update`).

use std::collections::HashMap;
use std::sync::Arc;

use harvest_physics::mesh::PrismMesh;
use harvest_physics::params::Component;
use harvest_physics::prism::{invariant2_field, unit_effect, Point, Prism};
use harvest_types::{ensure_same_len, sanitize_misfit, HarvestError, HarvestResult, PropertySet};

/// Property every prism data module responds to.
pub const DENSITY: &str = "density";

/// Trait for data modules driven by the growth solver.
pub trait DataModule {
    /// Short label of the wrapped data (`"gz"`, `"inv2"`, ...).
    fn label(&self) -> &str;

    /// Permanently add the effect of cell `index` with `props`.
    /// No-op when the tracked property is absent.
    fn update(&mut self, index: usize, props: &PropertySet);

    /// Misfit that would result from adding cell `index`, without
    /// touching the predicted data.
    fn testdrive(&mut self, index: usize, props: &PropertySet) -> f64;

    /// Weighted misfit of a predicted vector.
    fn misfit(&self, predicted: &[f64]) -> f64;

    fn predicted(&self) -> &[f64];

    fn weight(&self) -> f64;

    /// Multiply the misfit weight by `factor`.
    fn scale_weight(&mut self, factor: f64);

    fn current_misfit(&self) -> f64 {
        self.misfit(self.predicted())
    }
}

/// Zip separate coordinate arrays into points.
pub fn zip_points(xp: &[f64], yp: &[f64], zp: &[f64]) -> HarvestResult<Vec<Point>> {
    ensure_same_len("xp/yp", xp.len(), yp.len())?;
    ensure_same_len("xp/zp", xp.len(), zp.len())?;
    Ok(xp
        .iter()
        .zip(yp)
        .zip(zp)
        .map(|((&x, &y), &z)| [x, y, z])
        .collect())
}

fn norm_of(values: impl Iterator<Item = f64>, order: u32) -> f64 {
    match order {
        1 => values.map(f64::abs).sum(),
        _ => values.map(|v| v * v).sum::<f64>().sqrt(),
    }
}

/// Observed values, their points and the weighted misfit norm.
#[derive(Debug, Clone)]
struct Observations {
    points: Vec<Point>,
    data: Vec<f64>,
    norm: u32,
    weight: f64,
}

impl Observations {
    fn new(points: &[Point], data: &[f64], norm: u32) -> HarvestResult<Self> {
        if norm != 1 && norm != 2 {
            return Err(HarvestError::InvalidNorm(norm));
        }
        ensure_same_len("points/data", points.len(), data.len())?;
        let total = norm_of(data.iter().copied(), norm);
        if !(total.is_finite() && total > 0.0) {
            return Err(HarvestError::Validation(format!(
                "observed data norm must be finite and non-zero, got {total}"
            )));
        }
        Ok(Self {
            points: points.to_vec(),
            data: data.to_vec(),
            norm,
            weight: 1.0 / total,
        })
    }

    fn misfit(&self, predicted: &[f64]) -> f64 {
        let residuals = self.data.iter().zip(predicted).map(|(d, p)| d - p);
        sanitize_misfit(self.weight * norm_of(residuals, self.norm))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Linear components
// ─────────────────────────────────────────────────────────────────────

/// Data module for one linear component (gz or a tensor component).
///
/// Effects are cached per cell for unit density and scaled on use, so
/// repeated testdrives of a frontier cell cost one kernel pass.
pub struct PrismDataModule {
    component: Component,
    obs: Observations,
    predicted: Vec<f64>,
    effect: HashMap<usize, Vec<f64>>,
    mesh: Arc<PrismMesh>,
}

impl PrismDataModule {
    pub fn new(
        component: Component,
        points: &[Point],
        data: &[f64],
        mesh: Arc<PrismMesh>,
        norm: u32,
    ) -> HarvestResult<Self> {
        let obs = Observations::new(points, data, norm)?;
        Ok(Self {
            component,
            predicted: vec![0.0; obs.data.len()],
            obs,
            effect: HashMap::new(),
            mesh,
        })
    }

    pub fn component(&self) -> Component {
        self.component
    }

    /// Whether the unit effect of `index` is cached.
    pub fn is_cached(&self, index: usize) -> bool {
        self.effect.contains_key(&index)
    }

    fn unit_effect_of(&self, index: usize) -> Vec<f64> {
        match self.mesh.cell(index) {
            Some(prism) => self
                .obs
                .points
                .iter()
                .map(|&p| unit_effect(self.component, &prism, p))
                .collect(),
            None => {
                log::warn!("{}: cell {index} is masked or outside the mesh", self.component);
                vec![0.0; self.obs.points.len()]
            }
        }
    }
}

impl DataModule for PrismDataModule {
    fn label(&self) -> &str {
        self.component.name()
    }

    fn update(&mut self, index: usize, props: &PropertySet) {
        let Some(&density) = props.get(DENSITY) else {
            return;
        };
        let effect = match self.effect.remove(&index) {
            Some(e) => e,
            None => self.unit_effect_of(index),
        };
        for (p, e) in self.predicted.iter_mut().zip(&effect) {
            *p += density * e;
        }
    }

    fn testdrive(&mut self, index: usize, props: &PropertySet) -> f64 {
        let Some(&density) = props.get(DENSITY) else {
            return self.current_misfit();
        };
        if !self.effect.contains_key(&index) {
            let e = self.unit_effect_of(index);
            self.effect.insert(index, e);
        }
        let effect = &self.effect[&index];
        let trial: Vec<f64> = self
            .predicted
            .iter()
            .zip(effect)
            .map(|(p, e)| p + density * e)
            .collect();
        self.misfit(&trial)
    }

    fn misfit(&self, predicted: &[f64]) -> f64 {
        self.obs.misfit(predicted)
    }

    fn predicted(&self) -> &[f64] {
        &self.predicted
    }

    fn weight(&self) -> f64 {
        self.obs.weight
    }

    fn scale_weight(&mut self, factor: f64) {
        self.obs.weight *= factor;
    }
}

// ─────────────────────────────────────────────────────────────────────
// Second invariant
// ─────────────────────────────────────────────────────────────────────

/// Data module for the second invariant of the gradient tensor.
///
/// The invariant is not linear in the cells, so every call recomputes
/// it from all accumulated cells: O(estimate) kernel passes per call.
pub struct InvariantDataModule {
    obs: Observations,
    predicted: Vec<f64>,
    prisms: Vec<Prism>,
    densities: Vec<f64>,
    mesh: Arc<PrismMesh>,
}

impl InvariantDataModule {
    pub fn new(
        points: &[Point],
        data: &[f64],
        mesh: Arc<PrismMesh>,
        norm: u32,
    ) -> HarvestResult<Self> {
        let obs = Observations::new(points, data, norm)?;
        Ok(Self {
            predicted: vec![0.0; obs.data.len()],
            obs,
            prisms: Vec::new(),
            densities: Vec::new(),
            mesh,
        })
    }

    /// Number of cells absorbed so far.
    pub fn absorbed(&self) -> usize {
        self.prisms.len()
    }

    fn recompute(&self, extra: Option<(Prism, f64)>) -> Vec<f64> {
        let mut prisms = self.prisms.clone();
        let mut densities = self.densities.clone();
        if let Some((p, d)) = extra {
            prisms.push(p);
            densities.push(d);
        }
        // lengths are equal by construction
        invariant2_field(&self.obs.points, &prisms, &densities)
            .unwrap_or_else(|_| vec![0.0; self.obs.points.len()])
    }
}

impl DataModule for InvariantDataModule {
    fn label(&self) -> &str {
        "inv2"
    }

    fn update(&mut self, index: usize, props: &PropertySet) {
        let Some(&density) = props.get(DENSITY) else {
            return;
        };
        let Some(prism) = self.mesh.cell(index) else {
            log::warn!("inv2: cell {index} is masked or outside the mesh");
            return;
        };
        self.prisms.push(prism);
        self.densities.push(density);
        self.predicted = self.recompute(None);
    }

    fn testdrive(&mut self, index: usize, props: &PropertySet) -> f64 {
        let (Some(&density), Some(prism)) = (props.get(DENSITY), self.mesh.cell(index)) else {
            return self.current_misfit();
        };
        let trial = self.recompute(Some((prism, density)));
        self.misfit(&trial)
    }

    fn misfit(&self, predicted: &[f64]) -> f64 {
        self.obs.misfit(predicted)
    }

    fn predicted(&self) -> &[f64] {
        &self.predicted
    }

    fn weight(&self) -> f64 {
        self.obs.weight
    }

    fn scale_weight(&mut self, factor: f64) {
        self.obs.weight *= factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_physics::prism::{field, invariant2};

    fn mesh() -> Arc<PrismMesh> {
        Arc::new(PrismMesh::new([0.0, 300.0, 0.0, 300.0, 0.0, 300.0], (3, 3, 3)).unwrap())
    }

    fn points() -> Vec<Point> {
        (0..16)
            .map(|i| [(i / 4) as f64 * 100.0, (i % 4) as f64 * 100.0, -10.0])
            .collect()
    }

    fn density(v: f64) -> PropertySet {
        PropertySet::from([(DENSITY.to_string(), v)])
    }

    fn synthetic(component: Component, cells: &[usize], rho: f64) -> Vec<f64> {
        let m = mesh();
        let prisms: Vec<Prism> = cells.iter().filter_map(|&c| m.cell(c)).collect();
        field(component, &points(), &prisms, &vec![rho; prisms.len()]).unwrap()
    }

    #[test]
    fn test_invalid_norm() {
        let r = PrismDataModule::new(Component::Gz, &points(), &[1.0; 16], mesh(), 3);
        assert!(matches!(r, Err(HarvestError::InvalidNorm(3))));
    }

    #[test]
    fn test_length_mismatch() {
        let r = PrismDataModule::new(Component::Gz, &points(), &[1.0; 15], mesh(), 1);
        assert!(matches!(r, Err(HarvestError::LengthMismatch { .. })));
        assert!(zip_points(&[0.0, 1.0], &[0.0], &[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_zero_norm_data_rejected() {
        let r = PrismDataModule::new(Component::Gz, &points(), &[0.0; 16], mesh(), 2);
        assert!(matches!(r, Err(HarvestError::Validation(_))));
    }

    #[test]
    fn test_initial_misfit_is_one() {
        let data = synthetic(Component::Gz, &[13], 1000.0);
        for norm in [1, 2] {
            let dm = PrismDataModule::new(Component::Gz, &points(), &data, mesh(), norm).unwrap();
            assert!((dm.current_misfit() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_testdrive_does_not_mutate() {
        let data = synthetic(Component::Gz, &[13], 1000.0);
        let mut dm = PrismDataModule::new(Component::Gz, &points(), &data, mesh(), 2).unwrap();
        let m = dm.testdrive(13, &density(1000.0));
        assert!(m < 1e-10, "exact cell should fit, got {m}");
        assert!(dm.predicted().iter().all(|&p| p == 0.0));
        assert!(dm.is_cached(13));
    }

    #[test]
    fn test_update_evicts_cache() {
        let data = synthetic(Component::Gzz, &[13], 500.0);
        let mut dm = PrismDataModule::new(Component::Gzz, &points(), &data, mesh(), 1).unwrap();
        dm.testdrive(13, &density(500.0));
        dm.update(13, &density(500.0));
        assert!(!dm.is_cached(13));
        assert!(dm.current_misfit() < 1e-10);
    }

    #[test]
    fn test_incremental_matches_batch() {
        let cells = [4, 13, 22];
        let data = synthetic(Component::Gz, &cells, 800.0);
        let mut dm = PrismDataModule::new(Component::Gz, &points(), &data, mesh(), 2).unwrap();
        for &c in &cells {
            dm.testdrive(c, &density(800.0));
            dm.update(c, &density(800.0));
        }
        for (p, d) in dm.predicted().iter().zip(&data) {
            assert!((p - d).abs() < 1e-9 * d.abs().max(1.0));
        }
    }

    #[test]
    fn test_missing_property_is_noop() {
        let data = synthetic(Component::Gz, &[13], 1000.0);
        let mut dm = PrismDataModule::new(Component::Gz, &points(), &data, mesh(), 1).unwrap();
        let other = PropertySet::from([("susceptibility".to_string(), 0.1)]);
        assert_eq!(dm.testdrive(13, &other), dm.current_misfit());
        dm.update(13, &other);
        assert!(dm.predicted().iter().all(|&p| p == 0.0));
        assert!(!dm.is_cached(13));
    }

    #[test]
    fn test_scale_weight() {
        let data = synthetic(Component::Gz, &[13], 1000.0);
        let mut dm = PrismDataModule::new(Component::Gz, &points(), &data, mesh(), 1).unwrap();
        dm.scale_weight(0.5);
        assert!((dm.current_misfit() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_invariant_recomputes_from_all_cells() {
        let m = mesh();
        let pts = points();
        let cells = [12, 13];
        let prisms: Vec<Prism> = cells.iter().filter_map(|&c| m.cell(c)).collect();
        let data = invariant2_field(&pts, &prisms, &[600.0, 600.0]).unwrap();
        let mut dm = InvariantDataModule::new(&pts, &data, m, 2).unwrap();
        dm.update(12, &density(600.0));
        assert_eq!(dm.absorbed(), 1);
        let before = dm.current_misfit();
        let after = dm.testdrive(13, &density(600.0));
        assert!(after < before);
        assert!(after < 1e-9);
        dm.update(13, &density(600.0));
        let expected: Vec<f64> = pts
            .iter()
            .map(|&p| {
                let mut t = [0.0; 6];
                for pr in &prisms {
                    for (acc, v) in t.iter_mut().zip(harvest_physics::prism::tensor(pr, p, 600.0)) {
                        *acc += v;
                    }
                }
                invariant2(&t)
            })
            .collect();
        for (a, b) in dm.predicted().iter().zip(&expected) {
            assert!((a - b).abs() < 1e-9 * b.abs().max(1.0));
        }
        assert_eq!(dm.label(), "inv2");
    }
}

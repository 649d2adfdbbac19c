// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Jacobian Assembly
// ─────────────────────────────────────────────────────────────────────

use std::time::Instant;

use ndarray::Array2;

use harvest_physics::mesh::PrismMesh;
use harvest_physics::prism::unit_effect;

use crate::observed::ObservedData;

/// Builds the sensitivity matrix of a data set with respect to the
/// cell densities of a mesh.
pub trait JacobianBuilder {
    fn name(&self) -> &'static str;

    /// Rows follow `data` in canonical component order, columns follow
    /// the mesh cells.
    fn build(&self, data: &ObservedData, mesh: &PrismMesh) -> Array2<f64>;
}

/// Dense prism-kernel Jacobian: entry `(i, j)` is the field of cell `j`
/// with unit density at observation `i`. Masked cells get a zero column.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrismJacobian;

impl JacobianBuilder for PrismJacobian {
    fn name(&self) -> &'static str {
        "prism"
    }

    fn build(&self, data: &ObservedData, mesh: &PrismMesh) -> Array2<f64> {
        let start = Instant::now();
        let cells: Vec<_> = mesh.cells().collect();
        let mut jac = Array2::<f64>::zeros((data.ndata(), cells.len()));
        let mut row = 0;
        for (component, obs) in data.iter() {
            for &point in &obs.points {
                for (col, cell) in cells.iter().enumerate() {
                    if let Some(prism) = cell {
                        jac[[row, col]] = unit_effect(component, prism, point);
                    }
                }
                row += 1;
            }
        }
        log::info!(
            "built {}x{} Jacobian ({:.3} s)",
            jac.nrows(),
            jac.ncols(),
            start.elapsed().as_secs_f64()
        );
        jac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_physics::params::Component;
    use harvest_physics::prism::field;

    #[test]
    fn test_columns_match_forward_model() {
        let mesh = PrismMesh::new([0.0, 200.0, 0.0, 200.0, 0.0, 100.0], (1, 2, 2)).unwrap();
        let points = vec![[50.0, 50.0, -10.0], [150.0, 120.0, -10.0]];
        let data = ObservedData::new()
            .with("gz", points.clone(), vec![0.0; 2])
            .unwrap()
            .with("gzz", points.clone(), vec![0.0; 2])
            .unwrap();
        let jac = PrismJacobian.build(&data, &mesh);
        assert_eq!(jac.dim(), (4, 4));
        let cell = mesh.cell(3).unwrap();
        let gz = field(Component::Gz, &points, &[cell], &[1.0]).unwrap();
        let gzz = field(Component::Gzz, &points, &[cell], &[1.0]).unwrap();
        assert!((jac[[0, 3]] - gz[0]).abs() < 1e-15);
        assert!((jac[[1, 3]] - gz[1]).abs() < 1e-15);
        assert!((jac[[2, 3]] - gzz[0]).abs() < 1e-12);
        assert!((jac[[3, 3]] - gzz[1]).abs() < 1e-12);
    }

    #[test]
    fn test_masked_cell_has_zero_column() {
        let mut mesh = PrismMesh::new([0.0, 200.0, 0.0, 200.0, 0.0, 100.0], (1, 2, 2)).unwrap();
        mesh.mask_cell(1);
        let data = ObservedData::new()
            .with("gz", vec![[100.0, 100.0, -10.0]], vec![0.0])
            .unwrap();
        let jac = PrismJacobian.build(&data, &mesh);
        assert_eq!(jac[[0, 1]], 0.0);
        assert!(jac[[0, 0]] > 0.0);
    }
}

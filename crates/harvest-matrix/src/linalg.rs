// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Dense Linear Algebra
// ─────────────────────────────────────────────────────────────────────
//! Cholesky solver for the symmetric positive-definite systems of the
//! Marquardt iteration, backed by `nalgebra`.

use nalgebra as na;
use ndarray::{Array1, Array2};

/// Solve `A x = b` for symmetric positive-definite `A` via `A = L Lᵀ`.
///
/// Only the lower triangle of `A` is read. Returns `None` when `A` is not
/// square, sizes disagree, an entry is not finite or `A` is not positive
/// definite.
pub fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return None;
    }
    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return None;
    }
    let matrix = na::DMatrix::from_fn(n, n, |i, j| a[[i, j]]);
    let rhs = na::DVector::from_iterator(n, b.iter().copied());
    let x = na::Cholesky::new(matrix)?.solve(&rhs);
    x.iter()
        .all(|v| v.is_finite())
        .then(|| x.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_cholesky_solve() {
        let a = array![[4.0, 2.0, 0.6], [2.0, 5.0, 1.0], [0.6, 1.0, 3.0]];
        let x_true = array![1.0, -2.0, 0.5];
        let b = a.dot(&x_true);
        let x = cholesky_solve(&a, &b).unwrap();
        for (xi, ti) in x.iter().zip(x_true.iter()) {
            assert!((xi - ti).abs() < 1e-12);
        }
    }

    #[test]
    fn test_not_positive_definite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(cholesky_solve(&a, &array![1.0, 1.0]).is_none());
    }

    #[test]
    fn test_singular_matrix() {
        let a = array![[1.0, 0.0], [0.0, 0.0]];
        assert!(cholesky_solve(&a, &array![1.0, 0.0]).is_none());
    }

    #[test]
    fn test_non_finite_entries() {
        let a = array![[f64::NAN, 0.0], [0.0, 1.0]];
        assert!(cholesky_solve(&a, &array![1.0, 1.0]).is_none());
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Array2::<f64>::eye(3);
        assert!(cholesky_solve(&a, &array![1.0, 1.0]).is_none());
    }
}

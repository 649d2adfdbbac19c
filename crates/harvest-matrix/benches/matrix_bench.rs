// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Matrix Inversion Benchmarks
// ─────────────────────────────────────────────────────────────────────
//! Criterion benchmarks for Jacobian assembly, the Cholesky solve of one
//! Marquardt step, a full regularized solve and a matrix growth run.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use ndarray::{Array1, Array2};

use harvest_matrix::linalg::cholesky_solve;
use harvest_matrix::{
    get_seed, InversionSession, JacobianBuilder, MatrixConfig, ObservedData, PrismJacobian,
    RegularizationWeights,
};
use harvest_physics::mesh::PrismMesh;
use harvest_physics::params::Component;
use harvest_physics::prism::{field, Point, Prism};

// ── Helpers ───────────────────────────────────────────────────────────

fn make_mesh() -> PrismMesh {
    PrismMesh::new([0.0, 800.0, 0.0, 800.0, 0.0, 400.0], (4, 8, 8)).unwrap()
}

fn make_survey() -> Vec<Point> {
    (0..225)
        .map(|i| [(i / 15) as f64 * 800.0 / 14.0, (i % 15) as f64 * 800.0 / 14.0, -10.0])
        .collect()
}

fn make_data() -> ObservedData {
    let mesh = make_mesh();
    let cells = [mesh.index(3, 3, 1), mesh.index(4, 3, 1), mesh.index(3, 4, 1), mesh.index(3, 3, 2)];
    let prisms: Vec<Prism> = cells.iter().filter_map(|&c| mesh.cell(c)).collect();
    let dens = vec![800.0; prisms.len()];
    let mut data = ObservedData::new();
    for c in [Component::Gz, Component::Gzz] {
        data.insert(c.name(), make_survey(), field(c, &make_survey(), &prisms, &dens).unwrap())
            .unwrap();
    }
    data
}

fn make_spd(n: usize) -> (Array2<f64>, Array1<f64>) {
    let a = Array2::from_shape_fn((n, n), |(i, j)| 1.0 / (1.0 + i.abs_diff(j) as f64));
    let spd = a.t().dot(&a) + Array2::<f64>::eye(n);
    let b = Array1::from_shape_fn(n, |i| (i as f64).sin());
    (spd, b)
}

// ── Linear algebra benchmarks ────────────────────────────────────────

fn bench_cholesky(c: &mut Criterion) {
    let (a, b) = make_spd(256);
    c.bench_function("cholesky_solve_256", |bch| {
        bch.iter(|| cholesky_solve(black_box(&a), black_box(&b)))
    });
}

fn bench_jacobian(c: &mut Criterion) {
    let mesh = make_mesh();
    let data = make_data();
    c.bench_function("prism_jacobian_450x256", |b| {
        b.iter(|| PrismJacobian.build(black_box(&data), black_box(&mesh)))
    });
}

// ── Solver benchmarks ────────────────────────────────────────────────

fn bench_solve(c: &mut Criterion) {
    let data = make_data();
    let cfg = MatrixConfig {
        weights: RegularizationWeights {
            damping: 1e-8,
            smoothness: 1e-7,
            ..RegularizationWeights::default()
        },
        ..MatrixConfig::default()
    };
    let mut session = InversionSession::new(make_mesh(), cfg).unwrap();
    session.set_data(data.clone()).unwrap();
    session.jacobian().unwrap();
    c.bench_function("solve_smoothness_256_cells", |b| {
        b.iter(|| session.solve(black_box(data.clone()), None))
    });
}

fn bench_grow(c: &mut Criterion) {
    let data = make_data();
    let mesh = make_mesh();
    let seed_point = mesh.cell(mesh.index(3, 3, 1)).unwrap().center();
    let mut session = InversionSession::new(make_mesh(), MatrixConfig::default()).unwrap();
    session.set_data(data.clone()).unwrap();
    session.jacobian().unwrap();
    c.bench_function("grow_4_cell_body", |b| {
        b.iter_batched(
            || vec![get_seed(seed_point, 800.0, &mesh).unwrap()],
            |mut seeds| session.grow(data.clone(), &mut seeds),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(linalg, bench_cholesky, bench_jacobian);

criterion_group!(solvers, bench_solve, bench_grow);

criterion_main!(linalg, solvers);

// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — End-to-End Seeded-Growth Inversions
// ─────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;
use std::sync::Arc;

use harvest_core::{harvest, load_seeds, sow, wrap_data, DataModule, GrowthSeed};
use harvest_physics::mesh::PrismMesh;
use harvest_physics::params::Component;
use harvest_physics::prism::{field, invariant2_field, Point, Prism};
use harvest_types::{HarvestConfig, Termination};

// ── Helpers ───────────────────────────────────────────────────────────

fn mesh() -> Arc<PrismMesh> {
    Arc::new(PrismMesh::new([0.0, 300.0, 0.0, 300.0, 0.0, 300.0], (3, 3, 3)).unwrap())
}

fn survey() -> Vec<Point> {
    (0..49)
        .map(|i| [(i / 7) as f64 * 50.0, (i % 7) as f64 * 50.0, -1.0])
        .collect()
}

fn body(cells: &[usize]) -> Vec<Prism> {
    let m = mesh();
    cells.iter().filter_map(|&c| m.cell(c)).collect()
}

fn observe(components: &[Component], cells: &[usize], rho: f64) -> BTreeMap<String, Vec<f64>> {
    let prisms = body(cells);
    let dens = vec![rho; prisms.len()];
    components
        .iter()
        .map(|&c| (c.name().to_string(), field(c, &survey(), &prisms, &dens).unwrap()))
        .collect()
}

fn density(v: &[f64]) -> BTreeMap<String, Vec<f64>> {
    BTreeMap::from([("density".to_string(), v.to_vec())])
}

fn norm(order: u32) -> HarvestConfig {
    HarvestConfig {
        norm: order,
        ..HarvestConfig::default()
    }
}

fn center_of(index: usize) -> Point {
    mesh().cell(index).unwrap().center()
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn test_exact_fit_seed_halts_without_accretion() {
    let observed = observe(&[Component::Gz, Component::Gzz], &[13], 1000.0);
    let mut dms = wrap_data(mesh(), &survey(), &observed, &norm(2)).unwrap();
    let mut seeds = sow(&[center_of(13)], &density(&[1000.0]), mesh(), &HarvestConfig::default()).unwrap();
    let out = harvest(&mut dms, &mut seeds, false).unwrap();
    assert_eq!(out.accretions(), 0);
    assert_eq!(out.goals.len(), 1);
    assert!(out.goals[0] < 1e-10);
    assert_eq!(out.rounds, 1);
    assert_eq!(out.estimate["density"].len(), 1);
}

#[test]
fn test_single_point_exact_fit_halts() {
    let point = [150.0, 150.0, -1.0];
    let gz = field(Component::Gz, &[point], &body(&[13]), &[1000.0]).unwrap();
    let observed = BTreeMap::from([("gz".to_string(), gz)]);
    let mut dms = wrap_data(mesh(), &[point], &observed, &norm(1)).unwrap();
    assert_eq!(dms.len(), 1);
    let mut seeds = sow(&[center_of(13)], &density(&[1000.0]), mesh(), &HarvestConfig::default()).unwrap();
    let out = harvest(&mut dms, &mut seeds, false).unwrap();
    assert_eq!(out.accretions(), 0);
    assert_eq!(out.goals.len(), 1);
    assert_eq!(out.misfits.len(), 1);
    assert!(out.goals[0] < 1e-10);
    assert_eq!(out.termination, Termination::Converged);
    assert_eq!(out.estimate["density"].len(), 1);
    assert_eq!(out.estimate["density"].get(13), 1000.0);
}

#[test]
fn test_weights_divided_by_module_count() {
    let observed = observe(&[Component::Gz, Component::Gzz], &[13, 22], 1000.0);
    let mut dms = wrap_data(mesh(), &survey(), &observed, &norm(1)).unwrap();
    let before: Vec<f64> = dms.iter().map(|d| d.weight()).collect();
    let mut seeds = sow(&[center_of(13)], &density(&[1000.0]), mesh(), &HarvestConfig::default()).unwrap();
    harvest(&mut dms, &mut seeds, false).unwrap();
    for (dm, w) in dms.iter().zip(before) {
        assert!((dm.weight() - w / 2.0).abs() < 1e-15);
    }
}

#[test]
fn test_recovers_two_cell_body() {
    let observed = observe(&[Component::Gz, Component::Gzz], &[13, 22], 1000.0);
    let mut dms = wrap_data(mesh(), &survey(), &observed, &norm(2)).unwrap();
    let mut seeds = sow(&[center_of(13)], &density(&[1000.0]), mesh(), &HarvestConfig::default()).unwrap();
    let out = harvest(&mut dms, &mut seeds, false).unwrap();
    assert_eq!(out.accretions(), 1);
    let dense = out.estimate["density"].to_dense();
    assert_eq!(dense.len(), 27);
    assert_eq!(dense[13], 1000.0);
    assert_eq!(dense[22], 1000.0);
    assert_eq!(dense.iter().filter(|&&v| v != 0.0).count(), 2);
    assert!(out.final_misfit() < 1e-8);
    for (dm, (_, data)) in dms.iter().zip(&observed) {
        for (p, d) in dm.predicted().iter().zip(data) {
            assert!((p - d).abs() < 1e-8 * d.abs().max(1.0));
        }
    }
}

#[test]
fn test_misfit_decreases_by_delta() {
    let delta = 1e-3;
    let observed = observe(&[Component::Gz], &[4, 13, 22, 14], 800.0);
    let mut dms = wrap_data(mesh(), &survey(), &observed, &norm(1)).unwrap();
    let cfg = HarvestConfig {
        delta,
        ..HarvestConfig::default()
    };
    let mut seeds = sow(&[center_of(13)], &density(&[800.0]), mesh(), &cfg).unwrap();
    let out = harvest(&mut dms, &mut seeds, false).unwrap();
    assert!(out.accretions() >= 1);
    for w in out.misfits.windows(2) {
        assert!(w[1] < w[0]);
        assert!((w[0] - w[1]) / w[0] >= delta);
    }
    assert_eq!(out.goals.len(), out.misfits.len());
}

#[test]
fn test_two_seeds_grow_disjoint() {
    let observed = observe(&[Component::Gz, Component::Gzz], &[0, 1, 25, 26], 1000.0);
    let mut dms = wrap_data(mesh(), &survey(), &observed, &norm(2)).unwrap();
    let mut seeds = sow(
        &[center_of(0), center_of(26)],
        &density(&[1000.0, 1000.0]),
        mesh(),
        &HarvestConfig::default(),
    )
    .unwrap();
    let out = harvest(&mut dms, &mut seeds, false).unwrap();
    let a = seeds[0].estimate();
    let b = seeds[1].estimate();
    assert!(a.iter().all(|c| !b.contains(c)));
    assert!(a.contains(&0) && b.contains(&26));
    assert!(out.accretions() >= 2);
    assert!(out.final_misfit() < out.misfits[0]);
    assert_eq!(out.estimate["density"].len(), a.len() + b.len());
}

#[test]
fn test_property_disjoint_seed_keeps_shared_candidate_until_taken() {
    let observed = observe(&[Component::Gz], &[0, 1], 1000.0);
    let mut dms = wrap_data(mesh(), &survey(), &observed, &norm(2)).unwrap();
    let cfg = HarvestConfig::default();
    let mut seeds = sow(&[center_of(0)], &density(&[1000.0]), mesh(), &cfg).unwrap();
    let sus = BTreeMap::from([("susceptibility".to_string(), vec![0.05])]);
    seeds.extend(sow(&[center_of(2)], &sus, mesh(), &cfg).unwrap());
    let out = harvest(&mut dms, &mut seeds, false).unwrap();
    assert!(seeds[0].estimate().contains(&1));
    assert!(!seeds[1].frontier().contains_key(&1));
    assert_eq!(out.estimate["susceptibility"].len(), 1);
    assert_eq!(out.estimate["susceptibility"].get(2), 0.05);
    assert_eq!(out.estimate["density"].get(1), 1000.0);
}

#[test]
fn test_reruns_are_deterministic() {
    let observed = observe(&[Component::Gz, Component::Gxz], &[12, 13, 22], 600.0);
    let run = || {
        let mut dms = wrap_data(mesh(), &survey(), &observed, &norm(1)).unwrap();
        let mut seeds = sow(&[center_of(13)], &density(&[600.0]), mesh(), &HarvestConfig::default()).unwrap();
        harvest(&mut dms, &mut seeds, false).unwrap()
    };
    let (a, b) = (run(), run());
    assert_eq!(a.goals, b.goals);
    assert_eq!(a.misfits, b.misfits);
    assert_eq!(a.estimate, b.estimate);
}

#[test]
fn test_compactness_term_enters_goal() {
    let observed = observe(&[Component::Gz], &[13, 22], 1000.0);
    let mut dms = wrap_data(mesh(), &survey(), &observed, &norm(2)).unwrap();
    let cfg = HarvestConfig {
        mu: 1.0,
        ..HarvestConfig::default()
    };
    let mut seeds = sow(&[center_of(13)], &density(&[1000.0]), mesh(), &cfg).unwrap();
    let out = harvest(&mut dms, &mut seeds, false).unwrap();
    assert!(out.accretions() >= 1);
    // mu / mean extent (300 m) times the 100 m step to the cell below
    let reg = out.goals[1] - out.misfits[1];
    assert!((reg - 100.0 / 300.0).abs() < 1e-9, "reg = {reg}");
    assert!((seeds[0].reg() - reg).abs() < 1e-12);
}

#[test]
fn test_second_invariant_data() {
    let prisms = body(&[13, 22]);
    let inv2 = invariant2_field(&survey(), &prisms, &[1000.0, 1000.0]).unwrap();
    let observed = BTreeMap::from([("inv2".to_string(), inv2)]);
    let mut dms = wrap_data(mesh(), &survey(), &observed, &norm(2)).unwrap();
    let mut seeds = sow(&[center_of(13)], &density(&[1000.0]), mesh(), &HarvestConfig::default()).unwrap();
    let out = harvest(&mut dms, &mut seeds, false).unwrap();
    assert_eq!(out.estimate["density"].get(22), 1000.0);
    assert!(out.final_misfit() < 1e-8);
}

#[test]
fn test_seed_file_pipeline() {
    let text = "# x y z density\n150 150 150 1000\n160 160 160 900\n";
    let table = load_seeds(text.as_bytes()).unwrap();
    let props = table.named(&["density"]).unwrap();
    let mut seeds = sow(&table.points, &props, mesh(), &HarvestConfig::default()).unwrap();
    assert_eq!(seeds.len(), 1);
    let observed = observe(&[Component::Gz], &[13, 22], 1000.0);
    let mut dms = wrap_data(mesh(), &survey(), &observed, &norm(1)).unwrap();
    let out = harvest(&mut dms, &mut seeds, false).unwrap();
    assert_eq!(out.estimate["density"].get(22), 1000.0);
}

// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Seeded-Growth Solver
// ─────────────────────────────────────────────────────────────────────
//! Inversion by planting anomalous densities.
//!
//! Every round asks each seed, in the order given, to accrete its best
//! frontier cell against the current goal and misfit. A seed growing
//! early in a round changes the goal seen by later seeds, so the seed
//! order is part of the input. The run converges after the first round
//! in which no seed grows.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use harvest_physics::mesh::PrismMesh;
use harvest_physics::params::Component;
use harvest_physics::prism::Point;
use harvest_types::{
    ensure_same_len, Estimate, HarvestConfig, HarvestError, HarvestOutcome, HarvestResult,
    PropertySet, Termination,
};

use crate::data::{DataModule, InvariantDataModule, PrismDataModule};
use crate::seed::{split_others, GrowthSeed, Seed, SeedPrism};

/// Data key of the tensor's second invariant.
pub const INVARIANT2: &str = "inv2";

/// Build the data modules for every observed component.
///
/// Modules come out in canonical order (gz, gxx, gxy, gxz, gyy, gyz,
/// gzz, inv2) whatever the key order of `observed`. Their misfit norm is
/// `config.norm`.
pub fn wrap_data(
    mesh: Arc<PrismMesh>,
    points: &[Point],
    observed: &BTreeMap<String, Vec<f64>>,
    config: &HarvestConfig,
) -> HarvestResult<Vec<Box<dyn DataModule>>> {
    config.validate()?;
    let norm = config.norm;
    for key in observed.keys() {
        if key != INVARIANT2 {
            key.parse::<Component>()?;
        }
    }
    let mut dms: Vec<Box<dyn DataModule>> = Vec::with_capacity(observed.len());
    for c in Component::ALL {
        if let Some(data) = observed.get(c.name()) {
            dms.push(Box::new(PrismDataModule::new(
                c,
                points,
                data,
                Arc::clone(&mesh),
                norm,
            )?));
        }
    }
    if let Some(data) = observed.get(INVARIANT2) {
        dms.push(Box::new(InvariantDataModule::new(
            points,
            data,
            Arc::clone(&mesh),
            norm,
        )?));
    }
    let labels: Vec<&str> = dms.iter().map(|d| d.label()).collect();
    log::info!(
        "data modules: norm {norm}, {} points per type, types [{}], {} observations",
        points.len(),
        labels.join(", "),
        points.len() * dms.len()
    );
    Ok(dms)
}

/// Build prism seeds, one per point. Seeds landing on an already seeded
/// cell are dropped with a warning.
pub fn sow(
    points: &[Point],
    props: &BTreeMap<String, Vec<f64>>,
    mesh: Arc<PrismMesh>,
    config: &HarvestConfig,
) -> HarvestResult<Vec<Seed>> {
    config.validate()?;
    for col in props.values() {
        ensure_same_len("seed points/properties", points.len(), col.len())?;
    }
    log::info!(
        "sowing {} seeds: mu {}, delta {}, {} distances, properties [{}]",
        points.len(),
        config.mu,
        config.delta,
        config.distance_kind(),
        props.keys().cloned().collect::<Vec<_>>().join(", ")
    );
    let mut seeds: Vec<Seed> = Vec::with_capacity(points.len());
    for (i, &point) in points.iter().enumerate() {
        let sprops: PropertySet = props.iter().map(|(k, v)| (k.clone(), v[i])).collect();
        let seed = SeedPrism::new(point, sprops, Arc::clone(&mesh), config)?;
        if seeds.iter().any(|s| s.index() == seed.index()) {
            log::warn!("duplicate seed at point {point:?} (cell {}), ignoring it", seed.index());
            continue;
        }
        seeds.push(seed.into());
    }
    log::info!("seeds found: {}", seeds.len());
    Ok(seeds)
}

/// Run the seeded-growth inversion.
///
/// Returns the estimate with the goal and misfit trajectories; entry 0
/// of both is the initial goal. The run always ends `Converged`: only a
/// round without growth stops it. `iterate = true` asks for a step-wise
/// run, which is not available.
pub fn harvest(
    dms: &mut [Box<dyn DataModule>],
    seeds: &mut [Seed],
    iterate: bool,
) -> HarvestResult<HarvestOutcome> {
    log::info!("harvesting: {} seeds, {} data modules, iterate {iterate}", seeds.len(), dms.len());
    if iterate {
        return Err(HarvestError::NotImplemented("iterative harvest".into()));
    }
    let Some(first) = seeds.first() else {
        return Err(HarvestError::Validation("at least one seed is required".into()));
    };
    if dms.is_empty() {
        return Err(HarvestError::Validation("at least one data module is required".into()));
    }
    let kind = first.kind();
    if seeds.iter().any(|s| s.kind() != kind) {
        return Err(HarvestError::HeterogeneousSeeds);
    }

    // ----- initialization
    for i in 0..seeds.len() {
        if let Some((me, others)) = split_others(seeds, i) {
            me.initialize(others);
        }
    }
    let scale = 1.0 / dms.len() as f64;
    for dm in dms.iter_mut() {
        dm.scale_weight(scale);
        for seed in seeds.iter() {
            dm.update(seed.index(), seed.props());
        }
    }
    let initial: f64 = dms.iter().map(|dm| dm.current_misfit()).sum();
    log::info!("initial goal function: {initial:.6e}");

    // ----- growth rounds
    let start = Instant::now();
    let mut goals = vec![initial];
    let mut misfits = vec![initial];
    let mut rounds = 0usize;
    loop {
        rounds += 1;
        let mut grew = false;
        for i in 0..seeds.len() {
            let (goal, misfit) = (goals[goals.len() - 1], misfits[misfits.len() - 1]);
            let Some((me, others)) = split_others(seeds, i) else {
                continue;
            };
            let Some(acc) = me.grow(dms, others, goal, misfit) else {
                continue;
            };
            grew = true;
            for dm in dms.iter_mut() {
                dm.update(acc.index, &acc.props);
            }
            for (j, other) in seeds.iter_mut().enumerate() {
                if j != i {
                    other.evict(acc.index);
                }
            }
            goals.push(acc.goal);
            misfits.push(acc.misfit);
        }
        if !grew {
            break;
        }
    }
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let mut estimate = Estimate::new();
    for seed in seeds.iter() {
        seed.export_estimate(&mut estimate);
    }
    let outcome = HarvestOutcome {
        estimate,
        goals,
        misfits,
        rounds,
        termination: Termination::Converged,
        elapsed_ms,
    };
    log::info!(
        "final goal function: {:.6e}, {} accretions in {rounds} rounds, {elapsed_ms:.1} ms",
        outcome.final_goal(),
        outcome.accretions()
    );
    Ok(outcome)
}

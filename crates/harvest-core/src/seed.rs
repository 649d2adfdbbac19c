// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Seeds & Growth Frontier
// ─────────────────────────────────────────────────────────────────────
//! Seeds are the growable bodies of the inversion. Each one owns its
//! accreted cells, an insertion-ordered frontier of candidate cells and
//! the distance of every candidate to the seed cell.
//!
//! # Frontier invariants
//!
//! 1. A candidate is never a cell already in any seed's estimate.
//! 2. A candidate is never in the frontier of another seed that shares a
//!    physical property with this one. Seeds with disjoint properties may
//!    hold the same candidate.
//! 3. Frontier order is insertion order; ties in the goal function go to
//!    the earliest candidate.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use harvest_physics::mesh::PrismMesh;
use harvest_physics::prism::Point;
use harvest_types::{
    sanitize_misfit, Accretion, Estimate, HarvestConfig, HarvestError, HarvestResult, PropertySet,
    SparseProperty,
};

use crate::data::DataModule;

/// Geometric primitive a seed grows with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedKind {
    Prism,
}

/// Read-only view of every seed except the one growing.
#[derive(Clone, Copy)]
pub struct Others<'a> {
    pub before: &'a [Seed],
    pub after: &'a [Seed],
}

impl<'a> Others<'a> {
    pub fn none() -> Self {
        Self {
            before: &[],
            after: &[],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Seed> {
        self.before.iter().chain(self.after.iter())
    }
}

/// Split `seeds` into the seed at `i` and a view of the rest.
pub fn split_others(seeds: &mut [Seed], i: usize) -> Option<(&mut Seed, Others<'_>)> {
    let (before, rest) = seeds.split_at_mut(i);
    let (me, after) = rest.split_first_mut()?;
    Some((
        me,
        Others {
            before: &*before,
            after: &*after,
        },
    ))
}

/// Behaviour shared by every seed kind.
pub trait GrowthSeed {
    fn kind(&self) -> SeedKind;

    /// Mesh index of the seed cell.
    fn index(&self) -> usize;

    fn props(&self) -> &PropertySet;

    /// Accreted cells in accretion order, seed cell first.
    fn estimate(&self) -> &IndexSet<usize>;

    /// Candidate cells with their distance to the seed.
    fn frontier(&self) -> &IndexMap<usize, f64>;

    /// Accumulated compactness regularization.
    fn reg(&self) -> f64;

    /// Fill the frontier from the seed cell's neighbors.
    fn initialize(&mut self, others: Others<'_>);

    /// Try one accretion. `None` when no candidate lowers the misfit
    /// enough.
    fn grow(
        &mut self,
        dms: &mut [Box<dyn DataModule>],
        others: Others<'_>,
        goal: f64,
        misfit: f64,
    ) -> Option<Accretion>;

    /// Drop `index` from the frontier after another seed took it.
    fn evict(&mut self, index: usize) -> bool;

    /// Write the accreted cells into the final estimate.
    fn export_estimate(&self, estimate: &mut Estimate);
}

/// Growable body made of mesh prisms.
#[derive(Debug, Clone)]
pub struct SeedPrism {
    index: usize,
    props: PropertySet,
    mesh: Arc<PrismMesh>,
    delta: f64,
    mu: f64,
    reldist: bool,
    estimate: IndexSet<usize>,
    frontier: IndexMap<usize, f64>,
    reg: f64,
}

impl SeedPrism {
    /// Place a seed on the mesh cell holding `point`.
    ///
    /// `mu` is scaled by the inverse mean mesh extent, in physical units or
    /// in cell counts depending on `config.reldist`.
    pub fn new(
        point: Point,
        props: PropertySet,
        mesh: Arc<PrismMesh>,
        config: &HarvestConfig,
    ) -> HarvestResult<Self> {
        config.validate()?;
        if props.is_empty() {
            return Err(HarvestError::Validation(
                "a seed needs at least one physical property".into(),
            ));
        }
        let [x, y, z] = point;
        let index = mesh
            .locate(point)
            .ok_or(HarvestError::SeedLocation { x, y, z })?;
        let (nz, ny, nx) = mesh.shape;
        let extent = if config.reldist {
            (nx + ny + nz) as f64 / 3.0
        } else {
            let (dx, dy, dz) = mesh.dims();
            (nx as f64 * dx + ny as f64 * dy + nz as f64 * dz) / 3.0
        };
        Ok(Self {
            index,
            props,
            mesh,
            delta: config.delta,
            mu: config.mu / extent,
            reldist: config.reldist,
            estimate: IndexSet::from([index]),
            frontier: IndexMap::new(),
            reg: 0.0,
        })
    }

    /// Scaled compactness weight.
    pub fn mu(&self) -> f64 {
        self.mu
    }

    fn shares_property(&self, other: &PropertySet) -> bool {
        self.props.keys().any(|p| other.contains_key(p))
    }

    fn distance(&self, n: usize) -> f64 {
        if self.reldist {
            let (si, sj, sk) = self.mesh.ijk(self.index);
            let (ni, nj, nk) = self.mesh.ijk(n);
            let di = si as f64 - ni as f64;
            let dj = sj as f64 - nj as f64;
            let dk = sk as f64 - nk as f64;
            return (di * di + dj * dj + dk * dk).sqrt();
        }
        match (self.mesh.cell(self.index), self.mesh.cell(n)) {
            (Some(s), Some(c)) => {
                let (dx, dy, dz) = (c.x1 - s.x1, c.y1 - s.y1, c.z1 - s.z1);
                (dx * dx + dy * dy + dz * dz).sqrt()
            }
            _ => f64::INFINITY,
        }
    }

    /// Whether `n` may join this seed's frontier.
    fn is_free(&self, n: usize, others: Others<'_>) -> bool {
        if self.estimate.contains(&n) || self.frontier.contains_key(&n) {
            return false;
        }
        others.iter().all(|s| {
            !s.estimate().contains(&n)
                && !(self.shares_property(s.props()) && s.frontier().contains_key(&n))
        })
    }

    fn extend_frontier(&mut self, around: usize, others: Others<'_>) {
        let fresh: Vec<usize> = self
            .mesh
            .neighbors(around, false)
            .into_iter()
            .filter(|&n| self.is_free(n, others))
            .collect();
        for n in fresh {
            let d = self.distance(n);
            self.frontier.insert(n, d);
        }
    }

    /// Pick the candidate with the lowest goal among those that decrease
    /// the misfit by at least `delta` (relative). First wins on ties.
    fn judge(&self, goals: &[f64], misfits: &[f64], misfit: f64) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, (&g, &m)) in goals.iter().zip(misfits).enumerate() {
            if !(m < misfit && (misfit - m) / misfit >= self.delta) {
                continue;
            }
            if best.map_or(true, |b| g < goals[b]) {
                best = Some(i);
            }
        }
        best
    }
}

impl GrowthSeed for SeedPrism {
    fn kind(&self) -> SeedKind {
        SeedKind::Prism
    }

    fn index(&self) -> usize {
        self.index
    }

    fn props(&self) -> &PropertySet {
        &self.props
    }

    fn estimate(&self) -> &IndexSet<usize> {
        &self.estimate
    }

    fn frontier(&self) -> &IndexMap<usize, f64> {
        &self.frontier
    }

    fn reg(&self) -> f64 {
        self.reg
    }

    fn initialize(&mut self, others: Others<'_>) {
        self.extend_frontier(self.index, others);
    }

    fn grow(
        &mut self,
        dms: &mut [Box<dyn DataModule>],
        others: Others<'_>,
        goal: f64,
        misfit: f64,
    ) -> Option<Accretion> {
        if self.frontier.is_empty() {
            return None;
        }
        let regularizer = self.reg + others.iter().map(|s| s.reg()).sum::<f64>();
        let mut goals = Vec::with_capacity(self.frontier.len());
        let mut misfits = Vec::with_capacity(self.frontier.len());
        for (&n, &d) in &self.frontier {
            let m = sanitize_misfit(dms.iter_mut().map(|dm| dm.testdrive(n, &self.props)).sum());
            misfits.push(m);
            goals.push(m + regularizer + self.mu * d);
        }
        let best = self.judge(&goals, &misfits, misfit)?;
        let (index, dist) = self.frontier.shift_remove_index(best)?;
        log::debug!(
            "seed {}: accreted cell {index} (goal {goal:.6e} -> {:.6e}, misfit {:.6e})",
            self.index,
            goals[best],
            misfits[best]
        );
        self.estimate.insert(index);
        self.reg += self.mu * dist;
        self.extend_frontier(index, others);
        Some(Accretion {
            index,
            props: self.props.clone(),
            goal: goals[best],
            misfit: misfits[best],
        })
    }

    fn evict(&mut self, index: usize) -> bool {
        self.frontier.shift_remove(&index).is_some()
    }

    fn export_estimate(&self, estimate: &mut Estimate) {
        let size = self.mesh.size();
        for (name, &value) in &self.props {
            let prop = estimate
                .entry(name.clone())
                .or_insert_with(|| SparseProperty::new(size));
            for &cell in &self.estimate {
                prop.insert(cell, value);
            }
        }
    }
}

/// Closed set of seed kinds accepted by the solver.
#[derive(Debug, Clone)]
pub enum Seed {
    Prism(SeedPrism),
}

impl From<SeedPrism> for Seed {
    fn from(s: SeedPrism) -> Self {
        Seed::Prism(s)
    }
}

impl Seed {
    fn inner(&self) -> &dyn GrowthSeed {
        match self {
            Seed::Prism(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn GrowthSeed {
        match self {
            Seed::Prism(s) => s,
        }
    }
}

impl GrowthSeed for Seed {
    fn kind(&self) -> SeedKind {
        self.inner().kind()
    }

    fn index(&self) -> usize {
        self.inner().index()
    }

    fn props(&self) -> &PropertySet {
        self.inner().props()
    }

    fn estimate(&self) -> &IndexSet<usize> {
        self.inner().estimate()
    }

    fn frontier(&self) -> &IndexMap<usize, f64> {
        self.inner().frontier()
    }

    fn reg(&self) -> f64 {
        self.inner().reg()
    }

    fn initialize(&mut self, others: Others<'_>) {
        self.inner_mut().initialize(others)
    }

    fn grow(
        &mut self,
        dms: &mut [Box<dyn DataModule>],
        others: Others<'_>,
        goal: f64,
        misfit: f64,
    ) -> Option<Accretion> {
        self.inner_mut().grow(dms, others, goal, misfit)
    }

    fn evict(&mut self, index: usize) -> bool {
        self.inner_mut().evict(index)
    }

    fn export_estimate(&self, estimate: &mut Estimate) {
        self.inner().export_estimate(estimate)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Matrix Growth Inversion
// ─────────────────────────────────────────────────────────────────────
//! Seeded growth on the columns of the session Jacobian.
//!
//! Every seed carries a single density and grows into its 26-cell
//! neighborhood. The goal is the squared residual norm plus the minimum
//! moment of inertia term `mmi · Σ p²·w`, with `w` the normalized power
//! of the cell-count distance to the nearest seed. When no seed can
//! grow, each seed may relocate one accreted cell to a frontier cell.

use std::time::Instant;

use indexmap::IndexSet;
use ndarray::{Array1, Array2};

use harvest_physics::mesh::{PrismMesh, FULL_NEIGHBORHOOD};
use harvest_physics::prism::Point;
use harvest_types::{HarvestError, HarvestResult, Termination};

use crate::observed::ObservedData;
use crate::session::InversionSession;

/// Seed of the matrix growth inversion.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSeed {
    pub index: usize,
    pub density: f64,
    /// Candidate cells, in insertion order.
    pub frontier: IndexSet<usize>,
    /// Cells accreted by this seed, the seed cell excluded.
    pub accreted: Vec<usize>,
}

/// Seed at the mesh cell holding `point`.
pub fn get_seed(point: Point, density: f64, mesh: &PrismMesh) -> HarvestResult<MatrixSeed> {
    if density == 0.0 || !density.is_finite() {
        return Err(HarvestError::Validation(format!(
            "seed density must be finite and nonzero, got {density}"
        )));
    }
    let [x, y, z] = point;
    let index = mesh
        .locate(point)
        .ok_or(HarvestError::SeedLocation { x, y, z })?;
    log::info!("seed at cell {index}, density {density}");
    Ok(MatrixSeed {
        index,
        density,
        frontier: IndexSet::new(),
        accreted: Vec::new(),
    })
}

#[derive(Debug, Clone)]
pub struct GrowthOutcome {
    /// Density of every mesh cell.
    pub estimate: Vec<f64>,
    /// Goal after every accepted accretion or relocation; entry 0 is the
    /// initial goal.
    pub goals: Vec<f64>,
    pub iterations: usize,
    pub rearrangements: usize,
    pub termination: Termination,
    pub elapsed_ms: f64,
}

impl GrowthOutcome {
    pub fn final_goal(&self) -> f64 {
        self.goals.last().copied().unwrap_or(f64::INFINITY)
    }
}

/// Cell-count (Chebyshev) distance of every cell to its nearest seed.
pub fn seed_distances(mesh: &PrismMesh, seed_cells: &[usize]) -> Vec<f64> {
    let seeds: Vec<_> = seed_cells.iter().map(|&s| mesh.ijk(s)).collect();
    (0..mesh.size())
        .map(|cell| {
            let (i, j, k) = mesh.ijk(cell);
            seeds
                .iter()
                .map(|&(si, sj, sk)| i.abs_diff(si).max(j.abs_diff(sj)).max(k.abs_diff(sk)))
                .min()
                .map_or(0.0, |d| d as f64)
        })
        .collect()
}

/// MMI weights `d^power / max(d^power)`, all zero when every cell is a
/// seed.
pub fn mmi_weights(distances: &[f64], power: f64) -> Vec<f64> {
    let raised: Vec<f64> = distances.iter().map(|d| d.powf(power)).collect();
    let max = raised.iter().copied().fold(0.0, f64::max);
    if max > 0.0 {
        raised.iter().map(|w| w / max).collect()
    } else {
        vec![0.0; raised.len()]
    }
}

/// Give every seed its unmasked, unassigned neighbors, then settle the
/// candidates claimed by more than one seed: with equal densities the
/// earlier seed lets the later one keep the cell, otherwise the seeds
/// are too close.
pub(crate) fn init_frontiers(
    seeds: &mut [MatrixSeed],
    mesh: &PrismMesh,
    estimate: &[f64],
) -> HarvestResult<()> {
    for seed in seeds.iter_mut() {
        seed.frontier = mesh
            .neighbors(seed.index, true)
            .into_iter()
            .filter(|&n| estimate[n] == 0.0)
            .collect();
        seed.accreted.clear();
    }
    for i in 0..seeds.len() {
        let snapshot: Vec<usize> = seeds[i].frontier.iter().copied().collect();
        for cell in snapshot {
            for j in 0..seeds.len() {
                if i == j || !seeds[j].frontier.contains(&cell) {
                    continue;
                }
                if seeds[i].density != seeds[j].density {
                    return Err(HarvestError::SeedsTooClose { first: i, second: j });
                }
                seeds[i].frontier.shift_remove(&cell);
                break;
            }
        }
    }
    Ok(())
}

/// Unassigned unmasked neighbors of `cell` that no seed other than
/// `owner` has as a candidate.
fn free_neighbors(
    mesh: &PrismMesh,
    cell: usize,
    estimate: &[f64],
    seeds: &[MatrixSeed],
    owner: usize,
) -> Vec<usize> {
    mesh.neighbors(cell, true)
        .into_iter()
        .filter(|&n| estimate[n] == 0.0)
        .filter(|n| {
            seeds
                .iter()
                .enumerate()
                .all(|(j, s)| j == owner || !s.frontier.contains(n))
        })
        .collect()
}

struct Candidate {
    cell: usize,
    goal: f64,
    reg: f64,
}

/// Running state of one growth inversion.
pub(crate) struct Grower<'a> {
    jacobian: &'a Array2<f64>,
    mesh: &'a PrismMesh,
    weights: Vec<f64>,
    mmi: f64,
    pub(crate) estimate: Vec<f64>,
    residuals: Array1<f64>,
    reg: f64,
    pub(crate) goals: Vec<f64>,
}

impl<'a> Grower<'a> {
    pub(crate) fn new(
        jacobian: &'a Array2<f64>,
        mesh: &'a PrismMesh,
        observed: Vec<f64>,
        weights: Vec<f64>,
        mmi: f64,
        seeds: &[MatrixSeed],
    ) -> Self {
        let mut estimate = vec![0.0; mesh.size()];
        for seed in seeds {
            estimate[seed.index] = seed.density;
        }
        let p = Array1::from(estimate.clone());
        let residuals = Array1::from(observed) - jacobian.dot(&p);
        let reg = mmi
            * estimate
                .iter()
                .zip(&weights)
                .map(|(e, w)| e * e * w)
                .sum::<f64>();
        let goals = vec![residuals.dot(&residuals) + reg];
        Self {
            jacobian,
            mesh,
            weights,
            mmi,
            estimate,
            residuals,
            reg,
            goals,
        }
    }

    pub(crate) fn goal(&self) -> f64 {
        self.goals.last().copied().unwrap_or(f64::INFINITY)
    }

    /// Lowest-goal candidate strictly below `limit`; ties keep the first.
    fn best_of<'c>(
        &self,
        residuals: &Array1<f64>,
        reg: f64,
        cells: impl Iterator<Item = &'c usize>,
        density: f64,
        limit: f64,
    ) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for &cell in cells {
            let column = self.jacobian.column(cell);
            let misfit: f64 = residuals
                .iter()
                .zip(column.iter())
                .map(|(r, j)| (r - density * j).powi(2))
                .sum();
            let cell_reg = reg + self.mmi * density * density * self.weights[cell];
            let goal = misfit + cell_reg;
            let bound = best.as_ref().map_or(limit, |b| b.goal);
            if goal < bound {
                best = Some(Candidate {
                    cell,
                    goal,
                    reg: cell_reg,
                });
            }
        }
        best
    }

    fn place(&mut self, cell: usize, density: f64) {
        self.residuals.scaled_add(-density, &self.jacobian.column(cell));
        self.estimate[cell] = density;
    }

    fn lift(&mut self, cell: usize) {
        let density = self.estimate[cell];
        self.residuals.scaled_add(density, &self.jacobian.column(cell));
        self.estimate[cell] = 0.0;
    }

    /// Add the free neighbors of `cell` to seed `s`. A neighbor already
    /// claimed by a seed of another density is a conflict.
    fn extend_frontier(&self, seeds: &mut [MatrixSeed], s: usize, cell: usize) -> HarvestResult<()> {
        for n in self.mesh.neighbors(cell, true) {
            if self.estimate[n] != 0.0 || seeds[s].frontier.contains(&n) {
                continue;
            }
            if let Some(j) = seeds.iter().position(|o| o.frontier.contains(&n)) {
                if seeds[j].density != seeds[s].density {
                    return Err(HarvestError::SeedsTooClose { first: s, second: j });
                }
                continue;
            }
            seeds[s].frontier.insert(n);
        }
        Ok(())
    }

    /// Accrete `cell` to seed `s` at goal `goal`.
    pub(crate) fn accrete(
        &mut self,
        seeds: &mut [MatrixSeed],
        s: usize,
        cell: usize,
        goal: f64,
        reg: f64,
    ) -> HarvestResult<()> {
        self.place(cell, seeds[s].density);
        self.reg = reg;
        self.goals.push(goal);
        seeds[s].accreted.push(cell);
        seeds[s].frontier.shift_remove(&cell);
        self.extend_frontier(seeds, s, cell)
    }

    /// Try to accrete the best frontier cell of seed `s`.
    pub(crate) fn grow_seed(&mut self, seeds: &mut [MatrixSeed], s: usize) -> HarvestResult<bool> {
        let density = seeds[s].density;
        let Some(best) = self.best_of(&self.residuals, self.reg, seeds[s].frontier.iter(), density, self.goal()) else {
            return Ok(false);
        };
        log::debug!("seed {s}: accreted cell {} (goal {:.6e})", best.cell, best.goal);
        self.accrete(seeds, s, best.cell, best.goal, best.reg)?;
        Ok(true)
    }

    /// Try to move one accreted cell of seed `s` to a frontier cell.
    ///
    /// Frontier cells next to the moved cell are not candidates unless
    /// all 26 of their own neighbors are free.
    pub(crate) fn rearrange_seed(&mut self, seeds: &mut [MatrixSeed], s: usize) -> HarvestResult<bool> {
        let density = seeds[s].density;
        let mut best: Option<(usize, Candidate, IndexSet<usize>)> = None;
        for &param in &seeds[s].accreted {
            let param_neighbors = free_neighbors(self.mesh, param, &self.estimate, seeds, s);
            if param_neighbors.is_empty() {
                continue;
            }
            let mut frontier = seeds[s].frontier.clone();
            for &n in &param_neighbors {
                if free_neighbors(self.mesh, n, &self.estimate, seeds, s).len() < FULL_NEIGHBORHOOD {
                    frontier.shift_remove(&n);
                }
            }
            let mut residuals = self.residuals.clone();
            residuals.scaled_add(density, &self.jacobian.column(param));
            let reg = self.reg - self.mmi * density * density * self.weights[param];
            let limit = best.as_ref().map_or(self.goal(), |(_, c, _)| c.goal);
            if let Some(candidate) = self.best_of(&residuals, reg, frontier.iter(), density, limit) {
                best = Some((param, candidate, frontier));
            }
        }
        let Some((param, candidate, mut frontier)) = best else {
            return Ok(false);
        };
        log::debug!(
            "seed {s}: moved cell {param} to {} (goal {:.6e})",
            candidate.cell,
            candidate.goal
        );
        self.lift(param);
        self.place(candidate.cell, density);
        self.reg = candidate.reg;
        self.goals.push(candidate.goal);
        seeds[s].accreted.retain(|&c| c != param);
        seeds[s].accreted.push(candidate.cell);
        frontier.insert(param);
        frontier.shift_remove(&candidate.cell);
        seeds[s].frontier = frontier;
        self.extend_frontier(seeds, s, candidate.cell)?;
        Ok(true)
    }
}

impl InversionSession {
    /// MMI weights of the session mesh for `seeds`, reusing the cached
    /// distances while the seed cells are unchanged.
    fn seed_weights(&mut self, seeds: &[MatrixSeed]) -> Vec<f64> {
        let cells: Vec<usize> = seeds.iter().map(|s| s.index).collect();
        if self.distances.as_ref().map_or(true, |(c, _)| *c != cells) {
            let d = seed_distances(&self.mesh, &cells);
            self.distances = Some((cells, d));
        }
        match &self.distances {
            Some((_, d)) => mmi_weights(d, self.config.power),
            None => vec![0.0; self.mesh.size()],
        }
    }

    /// Grow the density model of `data` from `seeds`.
    ///
    /// Seeds are updated in place with their frontiers and accreted
    /// cells.
    pub fn grow(&mut self, data: ObservedData, seeds: &mut [MatrixSeed]) -> HarvestResult<GrowthOutcome> {
        if seeds.is_empty() {
            return Err(HarvestError::Validation("at least one seed is required".into()));
        }
        for (i, seed) in seeds.iter().enumerate() {
            if seed.index >= self.mesh.size() || self.mesh.is_masked(seed.index) {
                return Err(HarvestError::Validation(format!(
                    "seed {i} is not on an unmasked cell of the mesh"
                )));
            }
            if seeds[..i].iter().any(|o| o.index == seed.index) {
                return Err(HarvestError::Validation(format!("seed {i} duplicates cell {}", seed.index)));
            }
        }
        self.set_data(data)?;
        let weights = self.seed_weights(seeds);
        let observed = self.data_vector()?;
        let (mmi, power, apriori) = (self.config.mmi, self.config.power, self.config.apriori_variance);
        self.jacobian()?;
        let Some(jacobian) = self.jacobian.as_ref() else {
            return Err(HarvestError::Validation("no Jacobian".into()));
        };

        let start = Instant::now();
        let ndata = observed.len() as f64;
        let mut grower = Grower::new(jacobian, &self.mesh, observed, weights, mmi, seeds);
        init_frontiers(seeds, &self.mesh, &grower.estimate)?;
        log::info!(
            "growing density model: {} cells, {} seeds, mmi {mmi}, power {power}, apriori variance {apriori}, initial goal {:.6e}",
            self.mesh.size(),
            seeds.len(),
            grower.goal()
        );

        let max_iterations = self.mesh.size().saturating_sub(seeds.len());
        let mut termination = Termination::IterationLimit;
        let mut iterations = 0;
        let mut rearrangements = 0;
        for _ in 0..max_iterations {
            iterations += 1;
            let mut grew = false;
            for s in 0..seeds.len() {
                grew |= grower.grow_seed(seeds, s)?;
            }
            if !grew {
                let mut moved = false;
                for s in 0..seeds.len() {
                    if grower.rearrange_seed(seeds, s)? {
                        moved = true;
                        rearrangements += 1;
                    }
                }
                if !moved {
                    log::warn!("growth stalled: no seed can grow or rearrange (iteration {iterations})");
                    termination = Termination::Stalled;
                    break;
                }
            }
            let variance = grower.goal() / ndata;
            if variance >= 0.9 * apriori && variance <= 1.1 * apriori {
                termination = Termination::Converged;
                break;
            }
        }
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let outcome = GrowthOutcome {
            estimate: grower.estimate,
            goals: grower.goals,
            iterations,
            rearrangements,
            termination,
            elapsed_ms,
        };
        log::info!(
            "final goal {:.6e} after {iterations} iterations, {rearrangements} rearrangements ({:?}, {elapsed_ms:.1} ms)",
            outcome.final_goal(),
            termination
        );
        Ok(outcome)
    }
}

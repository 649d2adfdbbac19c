// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Estimate & Trajectory Types
// ─────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Physical property values keyed by name (e.g. `"density"`).
pub type PropertySet = BTreeMap<String, f64>;

/// Final inversion output: property name → sparse per-cell assignment.
pub type Estimate = BTreeMap<String, SparseProperty>;

/// Replace a NaN misfit or goal with +Inf so it fails every acceptance
/// test.
#[inline]
pub fn sanitize_misfit(value: f64) -> f64 {
    if value.is_nan() {
        log::warn!("sanitize_misfit: NaN detected, treating as +Inf");
        return f64::INFINITY;
    }
    value
}

/// Values of one physical property over a mesh, stored only where set.
///
/// Cells without an entry are background (zero).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseProperty {
    /// Number of cells in the mesh.
    pub size: usize,
    /// Assigned cells.
    pub values: BTreeMap<usize, f64>,
}

impl SparseProperty {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            values: BTreeMap::new(),
        }
    }

    /// Value at `index`, zero when unassigned or out of range.
    pub fn get(&self, index: usize) -> f64 {
        self.values.get(&index).copied().unwrap_or(0.0)
    }

    pub fn insert(&mut self, index: usize, value: f64) {
        self.values.insert(index, value);
    }

    /// Number of assigned cells.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Expand to a dense vector of length `size`.
    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.size];
        for (&i, &v) in &self.values {
            if i < self.size {
                dense[i] = v;
            }
        }
        dense
    }
}

/// Why an iterative solver stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Stopping criterion met (no improving accretion, target variance,
    /// or goal change below tolerance).
    #[default]
    Converged,
    /// No admissible step could be taken.
    Stalled,
    /// Configured iteration budget exhausted.
    IterationLimit,
}

/// One accepted accretion in the seeded-growth inversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accretion {
    /// Mesh index of the accreted cell.
    pub index: usize,
    /// Properties the cell inherits from its seed.
    pub props: PropertySet,
    /// Goal function after the accretion.
    pub goal: f64,
    /// Data misfit after the accretion.
    pub misfit: f64,
}

/// Result of a seeded-growth inversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestOutcome {
    pub estimate: Estimate,
    /// Goal function per accretion; entry 0 is the initial goal.
    pub goals: Vec<f64>,
    /// Data misfit per accretion; entry 0 is the initial misfit.
    pub misfits: Vec<f64>,
    /// Number of growth rounds run, including the final empty one.
    pub rounds: usize,
    /// Always [`Termination::Converged`]: the growth has no iteration cap
    /// and stops only after a round in which no seed grows.
    pub termination: Termination,
    pub elapsed_ms: f64,
}

impl HarvestOutcome {
    /// Number of accepted accretions.
    pub fn accretions(&self) -> usize {
        self.goals.len().saturating_sub(1)
    }

    pub fn final_goal(&self) -> f64 {
        self.goals.last().copied().unwrap_or(f64::NAN)
    }

    pub fn final_misfit(&self) -> f64 {
        self.misfits.last().copied().unwrap_or(f64::NAN)
    }

    /// Total number of cells assigned across all properties.
    pub fn assigned_cells(&self) -> usize {
        self.estimate.values().map(SparseProperty::len).sum()
    }
}

// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Observed Data Sets
// ─────────────────────────────────────────────────────────────────────
//! Observations keyed by field component, each with its own points.
//!
//! Iteration follows the canonical component order, which is also the
//! row order of the Jacobian and of the stacked data vector.

use std::collections::BTreeMap;

use harvest_physics::params::Component;
use harvest_physics::prism::Point;
use harvest_types::{ensure_same_len, HarvestError, HarvestResult};

/// Observations of one component.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    pub points: Vec<Point>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedData {
    fields: BTreeMap<Component, Observations>,
}

impl ObservedData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the observations of the component named `key`.
    pub fn insert(&mut self, key: &str, points: Vec<Point>, values: Vec<f64>) -> HarvestResult<()> {
        let component: Component = key.parse()?;
        ensure_same_len("observation points/values", points.len(), values.len())?;
        if values.is_empty() {
            return Err(HarvestError::Validation(format!("no observations of {key}")));
        }
        self.fields.insert(component, Observations { points, values });
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: &str, points: Vec<Point>, values: Vec<f64>) -> HarvestResult<Self> {
        self.insert(key, points, values)?;
        Ok(self)
    }

    pub fn get(&self, component: Component) -> Option<&Observations> {
        self.fields.get(&component)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Component, &Observations)> {
        self.fields.iter().map(|(&c, o)| (c, o))
    }

    pub fn components(&self) -> Vec<Component> {
        self.fields.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total number of observations over all components.
    pub fn ndata(&self) -> usize {
        self.fields.values().map(|o| o.values.len()).sum()
    }

    /// All observations stacked in canonical component order.
    pub fn data_vector(&self) -> Vec<f64> {
        self.fields
            .values()
            .flat_map(|o| o.values.iter().copied())
            .collect()
    }

    /// Cut a stacked vector back into per-component pieces.
    pub fn split(&self, stacked: &[f64]) -> HarvestResult<BTreeMap<Component, Vec<f64>>> {
        ensure_same_len("stacked vector/observations", stacked.len(), self.ndata())?;
        let mut out = BTreeMap::new();
        let mut start = 0;
        for (&c, o) in &self.fields {
            let end = start + o.values.len();
            out.insert(c, stacked[start..end].to_vec());
            start = end;
        }
        Ok(out)
    }
}

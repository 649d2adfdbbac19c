// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Type definitions, configuration, and error hierarchy for the
//! Harvest Kernel — 3D potential-field inversion by planting
//! anomalous densities.

pub mod config;
pub mod error;
pub mod estimate;

pub use config::HarvestConfig;
pub use error::{ensure_same_len, HarvestError, HarvestResult};
pub use estimate::{
    sanitize_misfit, Accretion, Estimate, HarvestOutcome, PropertySet, SparseProperty,
    Termination,
};

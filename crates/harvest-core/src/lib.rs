// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Seeded-Growth Inversion
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! 3D potential-field inversion by planting anomalous densities.
//!
//! Seeds placed on a prism mesh grow by accreting neighboring cells
//! while the accretion lowers the data misfit by at least `delta`
//! (relative) and gives the lowest goal function among the candidates.
//!
//! # Invariants
//!
//! 1. **Estimates are disjoint**: a cell never belongs to two seeds. A
//!    cell accreted by one seed is evicted from every other frontier.
//!
//! 2. **Growth is monotonic**: estimates only grow, and every accepted
//!    accretion lowers the total misfit by at least `delta`.
//!
//! 3. **Absorbed effects leave the cache**: once `update` adds a cell to
//!    a data module's predicted data, its cached effect is dropped.
//!
//! 4. **Runs are deterministic**: frontiers are insertion-ordered and
//!    ties go to the earliest candidate.

pub mod data;
pub mod harvester;
pub mod seed;
pub mod seedfile;

pub use data::{zip_points, DataModule, InvariantDataModule, PrismDataModule, DENSITY};
pub use harvester::{harvest, sow, wrap_data, INVARIANT2};
pub use seed::{split_others, GrowthSeed, Others, Seed, SeedKind, SeedPrism};
pub use seedfile::{load_seeds, load_seeds_file, SeedTable};

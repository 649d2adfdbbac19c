// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Potential-Field Physics
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Potential-field physics: prism forward kernels for gravity and the
//! gravity-gradient tensor, the regular prism mesh with its grid
//! adjacency, and synthetic-noise helpers.

pub mod mesh;
pub mod params;
pub mod prism;
pub mod synthetic;

pub use mesh::{face_neighbors, full_neighbors, PrismMesh, Shape, FULL_NEIGHBORHOOD};
pub use params::{Component, G, N_COMPONENTS, SI2EOTVOS, SI2MGAL};
pub use prism::{field, invariant2, invariant2_field, tensor, unit_effect, Point, Prism};
pub use synthetic::{contaminate, SimpleRng};

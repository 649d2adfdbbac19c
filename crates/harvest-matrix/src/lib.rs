// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Matrix Inversion
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Density inversion on an explicit sensitivity matrix.
//!
//! An [`InversionSession`] owns a mesh, the observed data and the
//! caches derived from them. Two solvers run on it:
//!
//!   - `solve`: Levenberg–Marquardt on the misfit plus Tikhonov
//!     (damping, smoothness, curvature), total variation and
//!     compactness terms, optionally depth-weighted
//!   - `grow`: seeded growth on the Jacobian columns with a minimum
//!     moment of inertia regularizer
//!
//! Architecture:
//!   - JacobianBuilder: observations × cells sensitivity matrix
//!   - RegularizationStrategy: shapes the Tikhonov weights
//!   - marquardt: damped Gauss-Newton shared with the depth-weight fit
//!   - linalg: Cholesky solve of the damped normal equations

pub mod config;
pub mod depth;
pub mod growth;
pub mod jacobian;
pub mod linalg;
pub mod marquardt;
pub mod observed;
pub mod regularization;
pub mod session;

pub use config::{MatrixConfig, RegularizationWeights};
pub use depth::{depth_weights, fit_depth_coefficients};
pub use growth::{get_seed, mmi_weights, seed_distances, GrowthOutcome, MatrixSeed};
pub use jacobian::{JacobianBuilder, PrismJacobian};
pub use marquardt::{marquardt, IterationLog, MarquardtOutcome, MarquardtParams, Objective};
pub use observed::{ObservedData, Observations};
pub use regularization::{
    first_derivative, DepthWeighted, GoalBreakdown, Plain, RegularizationStrategy,
};
pub use session::{InversionSession, SolveOutcome, INITIAL_DENSITY};

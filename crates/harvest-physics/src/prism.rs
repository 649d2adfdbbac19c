// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Right Rectangular Prism Forward Model
// ─────────────────────────────────────────────────────────────────────
//! Closed-form gravity and gravity-gradient fields of a homogeneous
//! right rectangular prism (Nagy et al., 2000).
//!
//! Coordinates follow x → North, y → East, z → Down. Outputs are in
//! mGal for `gz` and Eötvös for the tensor components.

use serde::{Deserialize, Serialize};

use harvest_types::{ensure_same_len, HarvestResult};

use crate::params::{Component, G};

/// Observation point `(x, y, z)`.
pub type Point = [f64; 3];

/// Axis-aligned prism bounded by `[x1, x2] × [y1, y2] × [z1, z2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prism {
    pub x1: f64,
    pub x2: f64,
    pub y1: f64,
    pub y2: f64,
    pub z1: f64,
    pub z2: f64,
}

impl Prism {
    pub fn new(x1: f64, x2: f64, y1: f64, y2: f64, z1: f64, z2: f64) -> Self {
        Self {
            x1,
            x2,
            y1,
            y2,
            z1,
            z2,
        }
    }

    pub fn center(&self) -> Point {
        [
            0.5 * (self.x1 + self.x2),
            0.5 * (self.y1 + self.y2),
            0.5 * (self.z1 + self.z2),
        ]
    }

    pub fn contains(&self, point: Point) -> bool {
        let [x, y, z] = point;
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2 && z >= self.z1 && z <= self.z2
    }
}

/// Natural log that vanishes on non-positive arguments (edge and corner
/// singularities of the closed-form expressions).
#[inline]
fn safe_ln(v: f64) -> f64 {
    if v > 0.0 {
        v.ln()
    } else {
        0.0
    }
}

/// Evaluate `f(x, y, z, r)` at the 8 corners relative to `point` with
/// alternating signs.
#[inline]
fn corner_sum(prism: &Prism, point: Point, f: impl Fn(f64, f64, f64, f64) -> f64) -> f64 {
    let xs = [prism.x2 - point[0], prism.x1 - point[0]];
    let ys = [prism.y2 - point[1], prism.y1 - point[1]];
    let zs = [prism.z2 - point[2], prism.z1 - point[2]];
    let mut total = 0.0;
    for (i, &x) in xs.iter().enumerate() {
        for (j, &y) in ys.iter().enumerate() {
            for (k, &z) in zs.iter().enumerate() {
                let r = (x * x + y * y + z * z).sqrt();
                let sign = if (i + j + k) % 2 == 0 { 1.0 } else { -1.0 };
                total += sign * f(x, y, z, r);
            }
        }
    }
    total
}

/// Field of `prism` with unit density at `point`, in output units.
pub fn unit_effect(component: Component, prism: &Prism, point: Point) -> f64 {
    let raw = match component {
        Component::Gz => corner_sum(prism, point, |x, y, z, r| {
            -(x * safe_ln(y + r) + y * safe_ln(x + r) - z * (x * y).atan2(z * r))
        }),
        Component::Gxx => corner_sum(prism, point, |x, y, z, r| -(y * z).atan2(x * r)),
        Component::Gxy => corner_sum(prism, point, |_, _, z, r| safe_ln(z + r)),
        Component::Gxz => corner_sum(prism, point, |_, y, _, r| safe_ln(y + r)),
        Component::Gyy => corner_sum(prism, point, |x, y, z, r| -(x * z).atan2(y * r)),
        Component::Gyz => corner_sum(prism, point, |x, _, _, r| safe_ln(x + r)),
        Component::Gzz => corner_sum(prism, point, |x, y, z, r| -(x * y).atan2(z * r)),
    };
    G * component.unit_factor() * raw
}

/// Field of a set of prisms at a set of points.
///
/// Prisms with zero density are skipped.
pub fn field(
    component: Component,
    points: &[Point],
    prisms: &[Prism],
    densities: &[f64],
) -> HarvestResult<Vec<f64>> {
    ensure_same_len("prisms/densities", prisms.len(), densities.len())?;
    let mut out = vec![0.0; points.len()];
    for (prism, &rho) in prisms.iter().zip(densities) {
        if rho == 0.0 {
            continue;
        }
        for (o, &p) in out.iter_mut().zip(points) {
            *o += rho * unit_effect(component, prism, p);
        }
    }
    Ok(out)
}

/// Gradient tensor `[gxx, gxy, gxz, gyy, gyz, gzz]` of one prism at one
/// point, scaled by `density`.
pub fn tensor(prism: &Prism, point: Point, density: f64) -> [f64; 6] {
    [
        Component::Gxx,
        Component::Gxy,
        Component::Gxz,
        Component::Gyy,
        Component::Gyz,
        Component::Gzz,
    ]
    .map(|c| density * unit_effect(c, prism, point))
}

/// Second invariant of the gradient tensor from its six components.
#[inline]
pub fn invariant2(t: &[f64; 6]) -> f64 {
    let [gxx, gxy, gxz, gyy, gyz, gzz] = *t;
    gxx * (gyy * gzz - gyz * gyz) + gxy * (gyz * gxz - gxy * gzz) + gxz * (gxy * gyz - gxz * gyy)
}

/// Second invariant of the tensor produced by a set of prisms.
pub fn invariant2_field(
    points: &[Point],
    prisms: &[Prism],
    densities: &[f64],
) -> HarvestResult<Vec<f64>> {
    ensure_same_len("prisms/densities", prisms.len(), densities.len())?;
    Ok(points
        .iter()
        .map(|&p| {
            let mut total = [0.0; 6];
            for (prism, &rho) in prisms.iter().zip(densities) {
                for (acc, v) in total.iter_mut().zip(tensor(prism, p, rho)) {
                    *acc += v;
                }
            }
            invariant2(&total)
        })
        .collect())
}

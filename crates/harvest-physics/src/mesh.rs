// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Regular Prism Mesh
// ─────────────────────────────────────────────────────────────────────
//! Regular 3D grid of prisms with optional masked cells.
//!
//! Linear index `i + j·nx + k·nx·ny`: column `i` runs along x, row `j`
//! along y and layer `k` along z (downward).

use serde::{Deserialize, Serialize};

use harvest_types::{ensure_same_len, HarvestError, HarvestResult};

use crate::prism::{Point, Prism};

/// Grid shape `(nz, ny, nx)`.
pub type Shape = (usize, usize, usize);

/// Size of the full (face, edge and corner) neighborhood.
pub const FULL_NEIGHBORHOOD: usize = 26;

/// Cell offsets `(di, dj, dk)`. The first six are the face neighbors:
/// above, below, front, back, left, right.
const OFFSETS: [(isize, isize, isize); FULL_NEIGHBORHOOD] = [
    (0, 0, -1),
    (0, 0, 1),
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    // horizontal diagonals
    (1, 1, 0),
    (1, -1, 0),
    (-1, 1, 0),
    (-1, -1, 0),
    // layer above
    (0, 1, -1),
    (0, -1, -1),
    (1, 0, -1),
    (-1, 0, -1),
    (1, 1, -1),
    (1, -1, -1),
    (-1, 1, -1),
    (-1, -1, -1),
    // layer below
    (0, 1, 1),
    (0, -1, 1),
    (1, 0, 1),
    (-1, 0, 1),
    (1, 1, 1),
    (1, -1, 1),
    (-1, 1, 1),
    (-1, -1, 1),
];

fn offset_neighbors(index: usize, shape: Shape, offsets: &[(isize, isize, isize)]) -> Vec<usize> {
    let (nz, ny, nx) = shape;
    if index >= nx * ny * nz {
        return Vec::new();
    }
    let i = (index % nx) as isize;
    let j = ((index / nx) % ny) as isize;
    let k = (index / (nx * ny)) as isize;
    offsets
        .iter()
        .filter_map(|&(di, dj, dk)| {
            let (ni, nj, nk) = (i + di, j + dj, k + dk);
            let inside = (0..nx as isize).contains(&ni)
                && (0..ny as isize).contains(&nj)
                && (0..nz as isize).contains(&nk);
            inside.then(|| ni as usize + nj as usize * nx + nk as usize * nx * ny)
        })
        .collect()
}

/// Face-adjacent cells of `index` in a grid of `shape`, in the order
/// above, below, front, back, left, right. Cells off the grid are left out.
pub fn face_neighbors(index: usize, shape: Shape) -> Vec<usize> {
    offset_neighbors(index, shape, &OFFSETS[..6])
}

/// All cells sharing a face, edge or corner with `index`.
pub fn full_neighbors(index: usize, shape: Shape) -> Vec<usize> {
    offset_neighbors(index, shape, &OFFSETS)
}

/// Regular mesh of right rectangular prisms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrismMesh {
    /// `[x1, x2, y1, y2, z1, z2]`
    pub bounds: [f64; 6],
    pub shape: Shape,
    mask: Vec<bool>,
}

impl PrismMesh {
    pub fn new(bounds: [f64; 6], shape: Shape) -> HarvestResult<Self> {
        let (nz, ny, nx) = shape;
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(HarvestError::Validation(format!(
                "mesh shape must be non-empty, got {shape:?}"
            )));
        }
        let [x1, x2, y1, y2, z1, z2] = bounds;
        if !(x2 > x1 && y2 > y1 && z2 > z1) || bounds.iter().any(|b| !b.is_finite()) {
            return Err(HarvestError::Validation(format!(
                "mesh bounds must be finite and increasing, got {bounds:?}"
            )));
        }
        Ok(Self {
            bounds,
            shape,
            mask: vec![false; nx * ny * nz],
        })
    }

    pub fn size(&self) -> usize {
        self.mask.len()
    }

    /// Cell dimensions `(dx, dy, dz)`.
    pub fn dims(&self) -> (f64, f64, f64) {
        let (nz, ny, nx) = self.shape;
        let [x1, x2, y1, y2, z1, z2] = self.bounds;
        (
            (x2 - x1) / nx as f64,
            (y2 - y1) / ny as f64,
            (z2 - z1) / nz as f64,
        )
    }

    /// `(i, j, k)` of a linear index.
    pub fn ijk(&self, index: usize) -> (usize, usize, usize) {
        let (_, ny, nx) = self.shape;
        (index % nx, (index / nx) % ny, index / (nx * ny))
    }

    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        let (_, ny, nx) = self.shape;
        i + j * nx + k * nx * ny
    }

    // ----- masking

    pub fn is_masked(&self, index: usize) -> bool {
        self.mask.get(index).copied().unwrap_or(true)
    }

    pub fn mask_cell(&mut self, index: usize) {
        if let Some(m) = self.mask.get_mut(index) {
            *m = true;
        }
    }

    /// Replace the whole mask (`true` = absent cell).
    pub fn set_mask(&mut self, mask: Vec<bool>) -> HarvestResult<()> {
        ensure_same_len("mask/mesh", mask.len(), self.size())?;
        self.mask = mask;
        Ok(())
    }

    /// Mask every cell whose center lies above `height(x, y)`.
    pub fn carve(&mut self, height: impl Fn(f64, f64) -> f64) {
        for index in 0..self.size() {
            if let Some(c) = self.cell(index) {
                let [x, y, z] = c.center();
                if z < height(x, y) {
                    self.mask[index] = true;
                }
            }
        }
    }

    // ----- geometry

    /// Prism at `index`, `None` when masked or out of range.
    pub fn cell(&self, index: usize) -> Option<Prism> {
        if self.is_masked(index) {
            return None;
        }
        let (i, j, k) = self.ijk(index);
        let (dx, dy, dz) = self.dims();
        let [x1, _, y1, _, z1, _] = self.bounds;
        let (cx, cy, cz) = (x1 + i as f64 * dx, y1 + j as f64 * dy, z1 + k as f64 * dz);
        Some(Prism::new(cx, cx + dx, cy, cy + dy, cz, cz + dz))
    }

    /// Iterate over all cells in index order.
    pub fn cells(&self) -> impl Iterator<Item = Option<Prism>> + '_ {
        (0..self.size()).map(move |i| self.cell(i))
    }

    fn edges(start: f64, step: f64, n: usize) -> Vec<f64> {
        (0..=n).map(|i| start + i as f64 * step).collect()
    }

    pub fn xs(&self) -> Vec<f64> {
        Self::edges(self.bounds[0], self.dims().0, self.shape.2)
    }

    pub fn ys(&self) -> Vec<f64> {
        Self::edges(self.bounds[2], self.dims().1, self.shape.1)
    }

    pub fn zs(&self) -> Vec<f64> {
        Self::edges(self.bounds[4], self.dims().2, self.shape.0)
    }

    /// Index of the unmasked cell holding `point`.
    ///
    /// Points on a shared face belong to the cell with the lower index
    /// along that axis, except on the far mesh boundary.
    pub fn locate(&self, point: Point) -> Option<usize> {
        let [x1, x2, y1, y2, z1, z2] = self.bounds;
        let [x, y, z] = point;
        if !(x >= x1 && x <= x2 && y >= y1 && y <= y2 && z >= z1 && z <= z2) {
            return None;
        }
        let (nz, ny, nx) = self.shape;
        let (dx, dy, dz) = self.dims();
        let axis = |v: f64, start: f64, step: f64, n: usize| -> usize {
            let pos = (v - start) / step;
            let c = pos.ceil() as usize;
            c.saturating_sub(1).min(n - 1)
        };
        let index = self.index(
            axis(x, x1, dx, nx),
            axis(y, y1, dy, ny),
            axis(z, z1, dz, nz),
        );
        (!self.is_masked(index)).then_some(index)
    }

    /// Unmasked neighbors of `index`, face-adjacent or full 26-cell.
    pub fn neighbors(&self, index: usize, full: bool) -> Vec<usize> {
        let raw = if full {
            full_neighbors(index, self.shape)
        } else {
            face_neighbors(index, self.shape)
        };
        raw.into_iter().filter(|&n| !self.is_masked(n)).collect()
    }
}

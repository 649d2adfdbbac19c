// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for all Harvest Kernel failures.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Misfit norm order outside {1, 2}.
    #[error("invalid norm {0}: must be 1 or 2")]
    InvalidNorm(u32),

    /// Observation arrays (or any paired arrays) differ in length.
    #[error("length mismatch: {what} ({left} != {right})")]
    LengthMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },

    /// Data key that is not a known field component.
    #[error("unknown data component: {0}")]
    UnknownComponent(String),

    /// Point outside the mesh or on a masked cell.
    #[error("couldn't find a mesh cell at location ({x}, {y}, {z})")]
    SeedLocation { x: f64, y: f64, z: f64 },

    /// Seeds of different geometric kinds passed to one inversion.
    #[error("seeds must all be of the same kind")]
    HeterogeneousSeeds,

    /// Two growing seeds with different densities share a frontier cell.
    #[error("seeds {first} and {second} are too close")]
    SeedsTooClose { first: usize, second: usize },

    /// Requested mode exists in the API but has no implementation.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Invalid input (shapes, bounds, empty sets).
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Malformed seed or data file.
    #[error("parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },

    /// Underlying I/O failure while reading input files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Numerical error (NaN/Inf, singular system).
    #[error("numerical error: {0}")]
    Numerical(String),
}

pub type HarvestResult<T> = Result<T, HarvestError>;

/// Fail with [`HarvestError::LengthMismatch`] unless `left == right`.
pub fn ensure_same_len(what: &'static str, left: usize, right: usize) -> HarvestResult<()> {
    if left != right {
        return Err(HarvestError::LengthMismatch { what, left, right });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_same_len() {
        assert!(ensure_same_len("xp/yp", 3, 3).is_ok());
        let err = ensure_same_len("xp/yp", 3, 2).unwrap_err();
        assert!(matches!(err, HarvestError::LengthMismatch { left: 3, right: 2, .. }));
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            HarvestError::InvalidNorm(3).to_string(),
            "invalid norm 3: must be 1 or 2"
        );
        let loc = HarvestError::SeedLocation { x: 1.0, y: 2.0, z: 3.0 };
        assert!(loc.to_string().contains("(1, 2, 3)"));
    }
}

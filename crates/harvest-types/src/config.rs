// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Seeded-Growth Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, HarvestResult};

/// Parameters of the seeded-growth inversion.
///
/// Shared by every seed built through `sow` and by `wrap_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Compactness regularizing parameter. Trade-off between fit and
    /// compactness, scaled per seed by the mean mesh extent.
    /// Default: 0.0.
    pub mu: f64,

    /// Minimum relative misfit decrease required to accept an accretion.
    /// Default: 1e-4.
    pub delta: f64,

    /// Measure distances in cell steps instead of physical units.
    /// Default: false.
    pub reldist: bool,

    /// Order of the residual norm used by the data modules (1 or 2).
    /// Default: 1.
    pub norm: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            mu: 0.0,
            delta: 1e-4,
            reldist: false,
            norm: 1,
        }
    }
}

impl HarvestConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> HarvestResult<()> {
        if !self.mu.is_finite() || self.mu < 0.0 {
            return Err(HarvestError::Config(format!(
                "mu must be finite and >= 0, got {}",
                self.mu
            )));
        }
        if !self.delta.is_finite() || self.delta < 0.0 {
            return Err(HarvestError::Config(format!(
                "delta must be finite and >= 0, got {}",
                self.delta
            )));
        }
        if self.norm != 1 && self.norm != 2 {
            return Err(HarvestError::InvalidNorm(self.norm));
        }
        Ok(())
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> HarvestResult<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| HarvestError::Config(format!("JSON parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Human-readable distance mode, used in log summaries.
    pub fn distance_kind(&self) -> &'static str {
        if self.reldist {
            "relative"
        } else {
            "absolute"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(HarvestConfig::default().validate().is_ok());
    }

    #[test]
    fn test_negative_mu_rejected() {
        let cfg = HarvestConfig {
            mu: -0.1,
            ..HarvestConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_bad_norm_rejected() {
        let cfg = HarvestConfig {
            norm: 3,
            ..HarvestConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(HarvestError::InvalidNorm(3))));
    }

    #[test]
    fn test_from_json() {
        let cfg =
            HarvestConfig::from_json(r#"{"mu": 0.1, "delta": 0.001, "reldist": true, "norm": 2}"#)
                .unwrap();
        assert!((cfg.mu - 0.1).abs() < 1e-12);
        assert_eq!(cfg.norm, 2);
        assert_eq!(cfg.distance_kind(), "relative");
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(HarvestConfig::from_json("{not json").is_err());
        assert!(
            HarvestConfig::from_json(r#"{"mu": 0.0, "delta": 0.0, "reldist": false, "norm": 0}"#)
                .is_err()
        );
    }
}

// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Matrix Inversion Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use harvest_types::{HarvestError, HarvestResult};

use crate::marquardt::MarquardtParams;

/// Weights of the regularizing functionals added to the data misfit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegularizationWeights {
    /// Order 0 Tikhonov (minimum norm).
    pub damping: f64,
    /// Order 1 Tikhonov (first differences between neighbor cells).
    pub smoothness: f64,
    /// Order 2 Tikhonov.
    pub curvature: f64,
    /// Total variation.
    pub sharpness: f64,
    /// Smoothing constant of the total variation, > 0.
    pub beta: f64,
    /// Compactness, `Σ p²/(p² + epsilon)`.
    pub compactness: f64,
    /// Smoothing constant of the compactness, > 0.
    pub epsilon: f64,
}

impl Default for RegularizationWeights {
    fn default() -> Self {
        Self {
            damping: 0.0,
            smoothness: 0.0,
            curvature: 0.0,
            sharpness: 0.0,
            beta: 1e-5,
            compactness: 0.0,
            epsilon: 1e-5,
        }
    }
}

impl RegularizationWeights {
    /// Whether any term needs the first-derivative operator.
    pub fn needs_derivatives(&self) -> bool {
        self.smoothness > 0.0 || self.curvature > 0.0 || self.sharpness > 0.0
    }

    pub fn validate(&self) -> HarvestResult<()> {
        let named = [
            ("damping", self.damping),
            ("smoothness", self.smoothness),
            ("curvature", self.curvature),
            ("sharpness", self.sharpness),
            ("compactness", self.compactness),
        ];
        for (name, w) in named {
            if !w.is_finite() || w < 0.0 {
                return Err(HarvestError::Config(format!(
                    "{name} must be finite and >= 0, got {w}"
                )));
            }
        }
        if self.sharpness > 0.0 && !(self.beta > 0.0) {
            return Err(HarvestError::Config(format!("beta must be > 0, got {}", self.beta)));
        }
        if self.compactness > 0.0 && !(self.epsilon > 0.0) {
            return Err(HarvestError::Config(format!(
                "epsilon must be > 0, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

/// Full configuration of an inversion session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    pub weights: RegularizationWeights,
    pub marquardt: MarquardtParams,

    /// Lower bound on every parameter. Default: none.
    pub lower: Option<f64>,
    /// Upper bound on every parameter. Default: none.
    pub upper: Option<f64>,

    /// Minimum moment of inertia regularizer of the growth variant.
    /// Default: 0.0.
    pub mmi: f64,
    /// Power of the seed distances in the MMI weights. Default: 5.0.
    pub power: f64,
    /// Target a-posteriori variance of the growth variant. Default: 1.0.
    pub apriori_variance: f64,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            weights: RegularizationWeights::default(),
            marquardt: MarquardtParams::default(),
            lower: None,
            upper: None,
            mmi: 0.0,
            power: 5.0,
            apriori_variance: 1.0,
        }
    }
}

impl MatrixConfig {
    pub fn validate(&self) -> HarvestResult<()> {
        self.weights.validate()?;
        let lm = &self.marquardt;
        if !(lm.lm_start > 0.0) || !lm.lm_start.is_finite() {
            return Err(HarvestError::Config(format!(
                "lm_start must be finite and > 0, got {}",
                lm.lm_start
            )));
        }
        if !(lm.lm_step > 1.0) || !lm.lm_step.is_finite() {
            return Err(HarvestError::Config(format!(
                "lm_step must be finite and > 1, got {}",
                lm.lm_step
            )));
        }
        if lm.max_steps == 0 || lm.max_it == 0 {
            return Err(HarvestError::Config(
                "max_steps and max_it must be >= 1".into(),
            ));
        }
        if !lm.tolerance.is_finite() || lm.tolerance < 0.0 {
            return Err(HarvestError::Config(format!(
                "tolerance must be finite and >= 0, got {}",
                lm.tolerance
            )));
        }
        check_bounds(self.lower, self.upper)?;
        if !self.mmi.is_finite() || self.mmi < 0.0 {
            return Err(HarvestError::Config(format!(
                "mmi must be finite and >= 0, got {}",
                self.mmi
            )));
        }
        if !self.power.is_finite() || self.power < 0.0 {
            return Err(HarvestError::Config(format!(
                "power must be finite and >= 0, got {}",
                self.power
            )));
        }
        if !(self.apriori_variance > 0.0) || !self.apriori_variance.is_finite() {
            return Err(HarvestError::Config(format!(
                "apriori_variance must be finite and > 0, got {}",
                self.apriori_variance
            )));
        }
        Ok(())
    }

    /// Load from JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> HarvestResult<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| HarvestError::Config(format!("JSON parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

pub(crate) fn check_bounds(lower: Option<f64>, upper: Option<f64>) -> HarvestResult<()> {
    if let (Some(lo), Some(hi)) = (lower, upper) {
        if lo > hi {
            return Err(HarvestError::Config(format!(
                "lower bound {lo} is above upper bound {hi}"
            )));
        }
    }
    if lower.is_some_and(f64::is_nan) || upper.is_some_and(f64::is_nan) {
        return Err(HarvestError::Config("bounds must not be NaN".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = MatrixConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.marquardt.max_it, 100);
        assert!((cfg.weights.beta - 1e-5).abs() < 1e-20);
        assert!(!cfg.weights.needs_derivatives());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut cfg = MatrixConfig::default();
        cfg.weights.curvature = -1.0;
        assert!(matches!(cfg.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_zero_beta_rejected_only_with_sharpness() {
        let mut cfg = MatrixConfig::default();
        cfg.weights.beta = 0.0;
        assert!(cfg.validate().is_ok());
        cfg.weights.sharpness = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bad_lm_step_rejected() {
        let mut cfg = MatrixConfig::default();
        cfg.marquardt.lm_step = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let cfg = MatrixConfig {
            lower: Some(10.0),
            upper: Some(0.0),
            ..MatrixConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_from_json_partial() {
        let cfg = MatrixConfig::from_json(
            r#"{"weights": {"damping": 1e-10}, "mmi": 0.5, "lower": 0.0}"#,
        )
        .unwrap();
        assert!((cfg.weights.damping - 1e-10).abs() < 1e-20);
        assert!((cfg.weights.epsilon - 1e-5).abs() < 1e-20);
        assert_eq!(cfg.lower, Some(0.0));
        assert_eq!(cfg.upper, None);
        assert_eq!(cfg.marquardt.max_steps, 20);
        assert!((cfg.power - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(MatrixConfig::from_json("{oops").is_err());
        assert!(MatrixConfig::from_json(r#"{"apriori_variance": 0.0}"#).is_err());
    }
}

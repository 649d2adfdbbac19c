// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Physical Constants & Field Components
// ─────────────────────────────────────────────────────────────────────
//! Gravitational constant, unit conversions and the canonical ordering
//! of the gravity and gravity-gradient components.

use std::fmt;
use std::str::FromStr;

use harvest_types::HarvestError;

/// Gravitational constant (m³ kg⁻¹ s⁻²).
pub const G: f64 = 6.673e-11;

/// m/s² → mGal.
pub const SI2MGAL: f64 = 1e5;

/// 1/s² → Eötvös.
pub const SI2EOTVOS: f64 = 1e9;

/// Number of linear field components.
pub const N_COMPONENTS: usize = 7;

/// Linear field component of the gravitational attraction.
///
/// Declaration order is the canonical stacking order used for data
/// modules and Jacobian rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    Gz,
    Gxx,
    Gxy,
    Gxz,
    Gyy,
    Gyz,
    Gzz,
}

impl Component {
    pub const ALL: [Component; N_COMPONENTS] = [
        Component::Gz,
        Component::Gxx,
        Component::Gxy,
        Component::Gxz,
        Component::Gyy,
        Component::Gyz,
        Component::Gzz,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Component::Gz => "gz",
            Component::Gxx => "gxx",
            Component::Gxy => "gxy",
            Component::Gxz => "gxz",
            Component::Gyy => "gyy",
            Component::Gyz => "gyz",
            Component::Gzz => "gzz",
        }
    }

    /// SI → output unit factor (mGal for gz, Eötvös for the tensor).
    pub fn unit_factor(self) -> f64 {
        match self {
            Component::Gz => SI2MGAL,
            _ => SI2EOTVOS,
        }
    }

    pub fn is_tensor(self) -> bool {
        self != Component::Gz
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Component {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Component::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| HarvestError::UnknownComponent(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order() {
        let names: Vec<&str> = Component::ALL.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["gz", "gxx", "gxy", "gxz", "gyy", "gyz", "gzz"]);
        assert!(Component::Gz < Component::Gzz);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("gyz".parse::<Component>().unwrap(), Component::Gyz);
        let err = "gx".parse::<Component>().unwrap_err();
        assert!(matches!(err, HarvestError::UnknownComponent(ref k) if k == "gx"));
    }

    #[test]
    fn test_unit_factor() {
        assert_eq!(Component::Gz.unit_factor(), SI2MGAL);
        assert_eq!(Component::Gxy.unit_factor(), SI2EOTVOS);
        assert!(!Component::Gz.is_tensor());
    }
}

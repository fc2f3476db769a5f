//! Collision detection settings.

use serde::{Deserialize, Serialize};

use crate::error::CollideError;

/// Settings for collision and gouge checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Minimum penetration depth reported as a collision (mm).
    pub tolerance: f64,
    /// Depth above which a cutter collision is critical (mm).
    pub critical_depth: f64,
    /// Maximum triangles per BVH leaf.
    pub leaf_size: usize,
    /// Depth cap for tree construction; deeper nodes are forced into leaves.
    pub max_depth: usize,
    /// Radial samples per ring when sweeping a tool for safe-Z.
    pub gouge_radial_samples: usize,
    /// Number of rings in the safe-Z sample grid.
    pub gouge_rings: usize,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.001,
            critical_depth: 0.1,
            leaf_size: 4,
            max_depth: 32,
            gouge_radial_samples: 16,
            gouge_rings: 4,
        }
    }
}

impl CollisionConfig {
    /// Parse from TOML text; missing keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self, CollideError> {
        let config: Self = toml::from_str(text).map_err(|e| CollideError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), CollideError> {
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(CollideError::Config(format!(
                "tolerance must be finite and >= 0, got {}",
                self.tolerance
            )));
        }
        if !(self.critical_depth >= 0.0) {
            return Err(CollideError::Config(format!(
                "critical_depth must be >= 0, got {}",
                self.critical_depth
            )));
        }
        if self.leaf_size == 0 {
            return Err(CollideError::Config("leaf_size must be at least 1".into()));
        }
        if self.max_depth == 0 {
            return Err(CollideError::Config("max_depth must be at least 1".into()));
        }
        if self.gouge_radial_samples < 3 || self.gouge_rings == 0 {
            return Err(CollideError::Config(
                "gouge sample grid needs >= 3 radial samples and >= 1 ring".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        CollisionConfig::default().validate().unwrap();
    }

    #[test]
    fn test_from_toml_partial() {
        let config = CollisionConfig::from_toml("tolerance = 0.05\nleaf_size = 8\n").unwrap();
        assert_eq!(config.tolerance, 0.05);
        assert_eq!(config.leaf_size, 8);
        assert_eq!(config.max_depth, CollisionConfig::default().max_depth);
    }

    #[test]
    fn test_from_toml_rejects_bad_values() {
        assert!(CollisionConfig::from_toml("leaf_size = 0").is_err());
        assert!(CollisionConfig::from_toml("tolerance = -1.0").is_err());
        assert!(CollisionConfig::from_toml("tolerance = \"x\"").is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = CollisionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: CollisionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}

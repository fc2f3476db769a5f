//! Tool assembly model for collision checks.
//!
//! An assembly is a stack of rigid components in the spindle frame: the
//! cutter tip sits at the local origin and the assembly extends along +Z.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CollideError;
use crate::mesh::TriMesh;

/// A rigid part of a tool assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolComponent {
    /// The cutting tool itself.
    Cutter,
    /// Tool holder body.
    Holder,
    /// Spindle nose.
    Spindle,
    /// Collet gripping the cutter shank.
    Collet,
}

impl ToolComponent {
    /// Every component, in checking order.
    pub const ALL: [ToolComponent; 4] = [
        ToolComponent::Cutter,
        ToolComponent::Holder,
        ToolComponent::Spindle,
        ToolComponent::Collet,
    ];

    /// Lowercase name, as used in contact ids and serialized results.
    pub fn as_str(self) -> &'static str {
        match self {
            ToolComponent::Cutter => "cutter",
            ToolComponent::Holder => "holder",
            ToolComponent::Spindle => "spindle",
            ToolComponent::Collet => "collet",
        }
    }
}

impl fmt::Display for ToolComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cutting geometry of the tool: diameter plus corner radius.
///
/// A corner radius of zero is a flat end mill, half the diameter is a ball
/// end mill, anything between is a bull nose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolGeometry {
    /// Cutter diameter in mm.
    pub diameter: f64,
    /// Corner radius in mm.
    #[serde(default)]
    pub corner_radius: f64,
}

impl ToolGeometry {
    /// Flat end mill.
    pub fn flat(diameter: f64) -> Self {
        Self {
            diameter,
            corner_radius: 0.0,
        }
    }

    /// Ball end mill.
    pub fn ball(diameter: f64) -> Self {
        Self {
            diameter,
            corner_radius: diameter / 2.0,
        }
    }

    /// Bull nose end mill.
    pub fn bull(diameter: f64, corner_radius: f64) -> Self {
        Self {
            diameter,
            corner_radius,
        }
    }

    /// Cutter radius.
    pub fn radius(&self) -> f64 {
        self.diameter / 2.0
    }

    /// Check the geometry is physically meaningful.
    pub fn validate(&self) -> Result<(), CollideError> {
        if !(self.diameter > 0.0 && self.diameter.is_finite()) {
            return Err(CollideError::InvalidPrimitive(format!(
                "tool diameter must be positive, got {}",
                self.diameter
            )));
        }
        if !(self.corner_radius >= 0.0 && self.corner_radius <= self.radius()) {
            return Err(CollideError::InvalidPrimitive(format!(
                "corner radius {} outside [0, {}]",
                self.corner_radius,
                self.radius()
            )));
        }
        Ok(())
    }

    /// Height of the cutting profile above the tip at radial distance `r`.
    ///
    /// Zero across the flat bottom, rising along the corner arc. `None`
    /// outside the cutter radius.
    pub fn profile_height(&self, r: f64) -> Option<f64> {
        let radius = self.radius();
        if r > radius + 1e-12 {
            return None;
        }
        let rc = self.corner_radius;
        let flat = radius - rc;
        if r <= flat || rc <= 0.0 {
            return Some(0.0);
        }
        let dr = (r - flat).min(rc);
        Some(rc - (rc * rc - dr * dr).max(0.0).sqrt())
    }
}

/// Dimensions for a stacked-cylinder tool assembly.
///
/// Lengths are measured along the spindle axis; each component starts where
/// the previous one ends (cutter, collet, holder, spindle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolDimensions {
    /// Cutter diameter in mm.
    pub cutter_diameter: f64,
    /// Cutter corner radius in mm.
    pub corner_radius: f64,
    /// Cutter stick-out from the collet in mm.
    pub cutter_length: f64,
    /// Collet nut diameter in mm (0 to omit the collet).
    pub collet_diameter: f64,
    /// Collet length in mm.
    pub collet_length: f64,
    /// Holder diameter in mm (0 to omit the holder).
    pub holder_diameter: f64,
    /// Holder length in mm.
    pub holder_length: f64,
    /// Spindle nose diameter in mm (0 to omit the spindle).
    pub spindle_diameter: f64,
    /// Spindle nose length in mm.
    pub spindle_length: f64,
    /// Facets around each cylinder.
    pub segments: u32,
}

impl Default for ToolDimensions {
    fn default() -> Self {
        Self {
            cutter_diameter: 6.0,
            corner_radius: 0.0,
            cutter_length: 25.0,
            collet_diameter: 20.0,
            collet_length: 10.0,
            holder_diameter: 40.0,
            holder_length: 40.0,
            spindle_diameter: 80.0,
            spindle_length: 60.0,
            segments: 24,
        }
    }
}

/// A tool assembly: cutting geometry plus one optional mesh per component.
///
/// Meshes are in the spindle frame with the cutter tip at the origin.
/// Components without a mesh are skipped by collision checks.
#[derive(Debug, Clone)]
pub struct ToolAssembly {
    /// Cutting geometry.
    pub geometry: ToolGeometry,
    cutter: Option<TriMesh>,
    holder: Option<TriMesh>,
    spindle: Option<TriMesh>,
    collet: Option<TriMesh>,
}

impl ToolAssembly {
    /// An assembly with no component meshes yet.
    pub fn new(geometry: ToolGeometry) -> Self {
        Self {
            geometry,
            cutter: None,
            holder: None,
            spindle: None,
            collet: None,
        }
    }

    /// Set the mesh for one component.
    pub fn with_component(mut self, component: ToolComponent, mesh: TriMesh) -> Self {
        *self.slot_mut(component) = Some(mesh);
        self
    }

    /// Build stacked cylinders from tool dimensions.
    pub fn from_dimensions(dims: &ToolDimensions) -> Result<Self, CollideError> {
        let geometry = ToolGeometry::bull(dims.cutter_diameter, dims.corner_radius);
        geometry.validate()?;

        let mut assembly = Self::new(geometry);
        let mut z = 0.0;
        let stack = [
            (ToolComponent::Cutter, dims.cutter_diameter, dims.cutter_length),
            (ToolComponent::Collet, dims.collet_diameter, dims.collet_length),
            (ToolComponent::Holder, dims.holder_diameter, dims.holder_length),
            (ToolComponent::Spindle, dims.spindle_diameter, dims.spindle_length),
        ];
        for (component, diameter, length) in stack {
            if diameter <= 0.0 || length <= 0.0 {
                continue;
            }
            let mesh = TriMesh::cylinder(diameter / 2.0, z, z + length, dims.segments)?;
            *assembly.slot_mut(component) = Some(mesh);
            z += length;
        }
        Ok(assembly)
    }

    /// Mesh for `component`, if present.
    pub fn component(&self, component: ToolComponent) -> Option<&TriMesh> {
        match component {
            ToolComponent::Cutter => self.cutter.as_ref(),
            ToolComponent::Holder => self.holder.as_ref(),
            ToolComponent::Spindle => self.spindle.as_ref(),
            ToolComponent::Collet => self.collet.as_ref(),
        }
    }

    /// Present components with their meshes, in [`ToolComponent::ALL`] order.
    pub fn components(&self) -> impl Iterator<Item = (ToolComponent, &TriMesh)> + '_ {
        ToolComponent::ALL
            .into_iter()
            .filter_map(|c| self.component(c).map(|m| (c, m)))
    }

    fn slot_mut(&mut self, component: ToolComponent) -> &mut Option<TriMesh> {
        match component {
            ToolComponent::Cutter => &mut self.cutter,
            ToolComponent::Holder => &mut self.holder,
            ToolComponent::Spindle => &mut self.spindle,
            ToolComponent::Collet => &mut self.collet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_profile_flat() {
        let tool = ToolGeometry::flat(10.0);
        assert_eq!(tool.profile_height(0.0), Some(0.0));
        assert_eq!(tool.profile_height(5.0), Some(0.0));
        assert_eq!(tool.profile_height(5.1), None);
    }

    #[test]
    fn test_profile_ball() {
        let tool = ToolGeometry::ball(6.0);
        assert_relative_eq!(tool.profile_height(0.0).unwrap(), 0.0);
        assert_relative_eq!(tool.profile_height(3.0).unwrap(), 3.0);
        // R - sqrt(R² - r²) with R = 3, r = 1.8
        assert_relative_eq!(tool.profile_height(1.8).unwrap(), 3.0 - 2.4, epsilon = 1e-12);
    }

    #[test]
    fn test_profile_bull() {
        let tool = ToolGeometry::bull(10.0, 1.0);
        assert_eq!(tool.profile_height(4.0), Some(0.0));
        assert_relative_eq!(tool.profile_height(5.0).unwrap(), 1.0);
    }

    #[test]
    fn test_validate() {
        assert!(ToolGeometry::flat(0.0).validate().is_err());
        assert!(ToolGeometry::bull(6.0, 3.5).validate().is_err());
        assert!(ToolGeometry::ball(6.0).validate().is_ok());
    }

    #[test]
    fn test_from_dimensions_stacks_components() {
        let assembly = ToolAssembly::from_dimensions(&ToolDimensions::default()).unwrap();
        let cutter = assembly.component(ToolComponent::Cutter).unwrap().bounds();
        let collet = assembly.component(ToolComponent::Collet).unwrap().bounds();
        let holder = assembly.component(ToolComponent::Holder).unwrap().bounds();
        let spindle = assembly.component(ToolComponent::Spindle).unwrap().bounds();
        assert_relative_eq!(cutter.min.z, 0.0);
        assert_relative_eq!(cutter.max.z, collet.min.z);
        assert_relative_eq!(collet.max.z, holder.min.z);
        assert_relative_eq!(holder.max.z, spindle.min.z);
        assert_eq!(assembly.components().count(), 4);
    }

    #[test]
    fn test_missing_components_are_absent() {
        let dims = ToolDimensions {
            collet_diameter: 0.0,
            spindle_diameter: 0.0,
            ..ToolDimensions::default()
        };
        let assembly = ToolAssembly::from_dimensions(&dims).unwrap();
        let present: Vec<_> = assembly.components().map(|(c, _)| c).collect();
        assert_eq!(present, vec![ToolComponent::Cutter, ToolComponent::Holder]);
    }

    #[test]
    fn test_component_serde_names() {
        let json = serde_json::to_string(&ToolComponent::Collet).unwrap();
        assert_eq!(json, "\"collet\"");
        assert_eq!(ToolComponent::Spindle.to_string(), "spindle");
    }
}

//! The subset of the VIA (VGG Image Annotator) project export we read.

use serde::Deserialize;
use std::collections::BTreeMap;

/// Keyed by VIA's internal image id (`<filename><size>`).
pub type ViaProject = BTreeMap<String, ImageRecord>;

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRecord {
    pub filename: String,
    #[serde(default)]
    pub regions: Vec<Region>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Region {
    pub shape_attributes: ShapeAttributes,
    #[serde(default)]
    pub region_attributes: RegionAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShapeAttributes {
    /// `polygon`, `rect`, `circle`, ... Only polygons carry point lists.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub all_points_x: Vec<f64>,
    #[serde(default)]
    pub all_points_y: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegionAttributes {
    pub names: Option<String>,
}

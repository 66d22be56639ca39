//! Numeric tolerance policy shared by the geotransform, statistics, extent and
//! geometry comparisons.

use crate::geo_transform::GeoTransform;

/// Tolerances used by the harnesses.
///
/// Values expressed in "places" follow almost-equal-to-N-decimal-places semantics,
/// see [`almost_equal`].
#[derive(Clone, Debug, PartialEq)]
pub struct ToleranceConfig {
    /// Divisor applied to the expected resolution to derive a geotransform tolerance.
    pub geo_transform_divisor: f64,
    /// Overrides the derived geotransform tolerance for every check.
    pub geo_transform: Option<f64>,
    /// Decimal places for band statistics.
    pub statistics_places: i32,
    /// Decimal places for layer bounding boxes.
    pub bbox_places: i32,
    /// Decimal places for extent rings in structured info reports.
    pub extent_places: i32,
    /// Absolute per-axis error allowed between geometry coordinates.
    pub geometry_max_error: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            geo_transform_divisor: 100.0,
            geo_transform: None,
            statistics_places: 7,
            bbox_places: 7,
            extent_places: 2,
            geometry_max_error: 0.0001,
        }
    }
}

impl ToleranceConfig {
    /// `(|pixel width| + |row rotation|) / divisor`, unless an explicit tolerance is configured.
    pub fn geo_transform_tolerance(&self, expected: &GeoTransform) -> f64 {
        self.geo_transform
            .unwrap_or_else(|| (expected[1].abs() + expected[2].abs()) / self.geo_transform_divisor)
    }
}

/// Absolute tolerance equivalent to rounding the difference to `places` decimals.
pub fn places_tolerance(places: i32) -> f64 {
    0.5 * 10f64.powi(-places)
}

/// `true` when `a` and `b` agree to `places` decimal places.
#[allow(clippy::float_cmp)]
pub fn almost_equal(a: f64, b: f64, places: i32) -> bool {
    if a == b {
        return true;
    }
    (a - b).abs() < places_tolerance(places)
}

use crate::errors::{ConformanceError, Result};
use crate::tolerance::ToleranceConfig;

/// An affine transform.
///
/// A six-element array storing the coefficients of an affine transform used in
/// mapping coordinates between pixel/line `(P, L)` raster space and
/// georeferenced `(Xp, Yp)` space:
///
///   * `GeoTransform[0]`: x-coordinate of the upper-left corner of the upper-left pixel.
///   * `GeoTransform[1]`: W-E pixel resolution (pixel width).
///   * `GeoTransform[2]`: row rotation (typically zero).
///   * `GeoTransform[3]`: y-coordinate of the upper-left corner of the upper-left pixel.
///   * `GeoTransform[4]`: column rotation (typically zero).
///   * `GeoTransform[5]`: N-S pixel resolution (pixel height), negative value for a North-up image.
pub type GeoTransform = [f64; 6];

/// The transform GDAL reports for a dataset without georeferencing.
pub const DEFAULT_GEO_TRANSFORM: GeoTransform = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Extension methods on [`GeoTransform`]
pub trait GeoTransformEx {
    /// Apply the transform to a pixel/line coordinate.
    fn apply(&self, pixel: f64, line: f64) -> (f64, f64);

    /// `true` for the identity transform GDAL hands out when a dataset has none.
    fn is_default(&self) -> bool;
}

impl GeoTransformEx for GeoTransform {
    fn apply(&self, pixel: f64, line: f64) -> (f64, f64) {
        (
            self[0] + pixel * self[1] + line * self[2],
            self[3] + pixel * self[4] + line * self[5],
        )
    }

    #[allow(clippy::float_cmp)]
    fn is_default(&self) -> bool {
        *self == DEFAULT_GEO_TRANSFORM
    }
}

/// Treats an absent transform and the default identity transform alike.
fn normalize(gt: Option<GeoTransform>) -> Option<GeoTransform> {
    gt.filter(|gt| !gt.is_default())
}

/// Compare an actual geotransform to an expected one.
///
/// Succeeds trivially when both are absent or default, an empty `expected` counting
/// as absent. Otherwise every component is
/// compared against a tolerance: `tolerance` when given, else the one derived from
/// the expected resolution by [`ToleranceConfig::geo_transform_tolerance`].
pub fn compare_geo_transform(
    expected: Option<&[f64]>,
    actual: Option<GeoTransform>,
    tolerance: Option<f64>,
    config: &ToleranceConfig,
) -> Result<()> {
    let expected_absent = expected.map_or(true, |values| {
        values.is_empty() || values == DEFAULT_GEO_TRANSFORM.as_slice()
    });
    if expected_absent && normalize(actual).is_none() {
        return Ok(());
    }

    let expected = match expected {
        Some(values) => {
            let gt: GeoTransform = values
                .try_into()
                .map_err(|_| ConformanceError::GeoTransformLength { len: values.len() })?;
            Some(gt)
        }
        None => None,
    };

    match (normalize(expected), normalize(actual)) {
        (None, None) => Ok(()),
        (Some(expected), Some(actual)) => {
            let tolerance = tolerance.unwrap_or_else(|| config.geo_transform_tolerance(&expected));
            for (index, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
                if (e - a).abs() > tolerance {
                    return Err(ConformanceError::GeoTransformMismatch {
                        index,
                        expected: *e,
                        actual: *a,
                        tolerance,
                    });
                }
            }
            Ok(())
        }
        (expected, actual) => Err(ConformanceError::GeoTransformPresence { expected, actual }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UTM: [f64; 6] = [440720.0, 60.0, 0.0, 3751320.0, 0.0, -60.0];

    #[test]
    fn test_apply() {
        let (x, y) = UTM.apply(10.0, 20.0);
        assert_eq!(x, 441320.0);
        assert_eq!(y, 3750120.0);
    }

    #[test]
    fn test_within_derived_tolerance() {
        let config = ToleranceConfig::default();
        let actual = [440720.5, 60.5, 0.5, 3751319.5, -0.5, -60.59];
        compare_geo_transform(Some(&UTM), Some(actual), None, &config).unwrap();
    }

    #[test]
    fn test_outside_derived_tolerance() {
        let config = ToleranceConfig::default();
        let actual = [440720.0, 60.0, 0.0, 3751320.7, 0.0, -60.0];
        let err = compare_geo_transform(Some(&UTM), Some(actual), None, &config).unwrap_err();
        match err {
            ConformanceError::GeoTransformMismatch {
                index, tolerance, ..
            } => {
                assert_eq!(index, 3);
                assert!((tolerance - 0.6).abs() < 1e-12);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_explicit_tolerance() {
        let config = ToleranceConfig::default();
        let actual = [440720.0, 60.0, 0.0, 3751320.7, 0.0, -60.0];
        compare_geo_transform(Some(&UTM), Some(actual), Some(1.0), &config).unwrap();
        assert!(compare_geo_transform(Some(&UTM), Some(actual), Some(0.1), &config).is_err());
    }

    #[test]
    fn test_both_absent() {
        let config = ToleranceConfig::default();
        compare_geo_transform(None, None, None, &config).unwrap();
        compare_geo_transform(
            Some(&DEFAULT_GEO_TRANSFORM),
            Some(DEFAULT_GEO_TRANSFORM),
            None,
            &config,
        )
        .unwrap();
        compare_geo_transform(None, Some(DEFAULT_GEO_TRANSFORM), None, &config).unwrap();
    }

    #[test]
    fn test_empty_expectation_counts_as_absent() {
        let config = ToleranceConfig::default();
        compare_geo_transform(Some(&[]), None, None, &config).unwrap();
        compare_geo_transform(Some(&[]), Some(DEFAULT_GEO_TRANSFORM), None, &config).unwrap();
        assert_eq!(
            compare_geo_transform(Some(&[]), Some(UTM), None, &config).unwrap_err(),
            ConformanceError::GeoTransformLength { len: 0 }
        );
        assert_eq!(
            compare_geo_transform(Some(&[1.0, 2.0]), None, None, &config).unwrap_err(),
            ConformanceError::GeoTransformLength { len: 2 }
        );
    }

    #[test]
    fn test_presence_mismatch() {
        let config = ToleranceConfig::default();
        let err = compare_geo_transform(Some(&UTM), None, None, &config).unwrap_err();
        assert!(matches!(err, ConformanceError::GeoTransformPresence { .. }));
        let err = compare_geo_transform(None, Some(UTM), None, &config).unwrap_err();
        assert!(matches!(err, ConformanceError::GeoTransformPresence { .. }));
    }

    #[test]
    fn test_wrong_length() {
        let config = ToleranceConfig::default();
        let err = compare_geo_transform(Some(&[1.0, 2.0]), Some(UTM), None, &config).unwrap_err();
        assert_eq!(err, ConformanceError::GeoTransformLength { len: 2 });
    }
}

use std::path::Path;

use chrono::NaiveDate;

use crate::backend::memory::{FieldType, MemoryBackend};
use crate::backend::{Backend, Extent, FieldValue, VectorLayer, VectorSource};
use crate::driver::DriverDescriptor;
use crate::errors::ConformanceError;
use crate::geometry::geometry_from_wkt;
use crate::test_utils::create_poly_layer;
use crate::vector::{Expected, GeometryExpectation, LayerExpectation, VectorHarness};

const FIRST_POLYGON: &str = "POLYGON ((479819.84375 4765180.5,479690.1875 4765259.5,479647.0 4765369.5,479819.84375 4765180.5))";

fn harness(path: &str) -> VectorHarness<MemoryBackend> {
    let backend = MemoryBackend::new();
    create_poly_layer(&backend, path).unwrap();
    let mut harness = VectorHarness::new(backend, DriverDescriptor::new("MEM", "mem"));
    harness.check_open(path, true, false).unwrap();
    harness
}

fn poly_expectation() -> LayerExpectation {
    LayerExpectation {
        name: "poly".to_string(),
        feature_count: 4,
        geometry_type: "Polygon".to_string(),
        field_count: 4,
        bbox: Extent {
            min_x: 479640.09375,
            max_x: 480039.03125,
            min_y: 4764670.0,
            max_y: 4765558.5,
        },
    }
}

#[test]
fn test_check_open_and_driver() {
    let harness = harness("/vsimem/open_poly.mem");
    harness.check_driver().unwrap();
    assert_eq!(harness.dataset().unwrap().layer_count(), 1);
}

#[test]
fn test_check_open_wrong_driver() {
    let backend = MemoryBackend::new();
    create_poly_layer(&backend, "/vsimem/wrong_driver.mem").unwrap();
    let mut harness = VectorHarness::new(backend, DriverDescriptor::new("ESRI Shapefile", "shp"));
    assert!(matches!(
        harness.check_open("/vsimem/wrong_driver.mem", true, false),
        Err(ConformanceError::DriverMismatch { .. })
    ));
    harness
        .check_open("/vsimem/wrong_driver.mem", "MEM", false)
        .unwrap();
}

#[test]
fn test_update_mode() {
    let mut harness = harness("/vsimem/update_poly.mem");
    harness
        .check_open("/vsimem/update_poly.mem", true, true)
        .unwrap();
    harness.release();

    // Writes through an update handle show up once it is released.
    let mut ds = harness
        .backend()
        .open_vector(Path::new("/vsimem/update_poly.mem"), true)
        .unwrap();
    ds.create_layer("extra", "Point", &[("id", FieldType::Integer)])
        .unwrap();
    drop(ds);
    let ds = harness
        .check_open("/vsimem/update_poly.mem", true, false)
        .unwrap();
    assert_eq!(ds.layer_count(), 2);
}

#[test]
fn test_check_layer() {
    let harness = harness("/vsimem/layer_poly.mem");
    let layer = harness.dataset().unwrap().layer_by_name("poly").unwrap();
    harness.check_layer(&layer, &poly_expectation()).unwrap();

    let err = harness
        .check_layer(
            &layer,
            &LayerExpectation {
                feature_count: 10,
                ..poly_expectation()
            },
        )
        .unwrap_err();
    assert_eq!(
        err,
        ConformanceError::LayerMismatch {
            layer: "poly".to_string(),
            attribute: "feature count",
            expected: "10".to_string(),
            actual: "4".to_string(),
        }
    );

    let mut bbox = poly_expectation();
    bbox.bbox.max_y += 1e-6;
    assert!(matches!(
        harness.check_layer(&layer, &bbox),
        Err(ConformanceError::LayerMismatch {
            attribute: "extent",
            ..
        })
    ));
    bbox.bbox.max_y = 4765558.5 + 1e-8;
    harness.check_layer(&layer, &bbox).unwrap();

    let geometry_type = LayerExpectation {
        geometry_type: "Multi Polygon".to_string(),
        ..poly_expectation()
    };
    assert!(harness.check_layer(&layer, &geometry_type).is_err());
}

#[test]
fn test_features_against_exact_list() {
    let harness = harness("/vsimem/list_poly.mem");
    let mut layer = harness.dataset().unwrap().layer(0).unwrap();
    harness
        .check_features_against_list(
            &mut layer,
            "eas_id",
            &[
                Expected::Integer(168),
                Expected::Integer(179),
                Expected::Integer(171),
                Expected::Integer(173),
            ],
        )
        .unwrap();
    // Every feature has been consumed.
    assert!(layer.next_feature().unwrap().is_none());

    harness
        .check_features_against_list(
            &mut layer,
            "name",
            &["first".into(), "second".into(), "third".into(), "fourth".into()],
        )
        .unwrap();
}

#[test]
fn test_features_against_shorter_list() {
    let harness = harness("/vsimem/short_poly.mem");
    let mut layer = harness.dataset().unwrap().layer(0).unwrap();
    let err = harness
        .check_features_against_list(
            &mut layer,
            "name",
            &["first".into(), "second".into(), "third".into()],
        )
        .unwrap_err();
    assert_eq!(err, ConformanceError::MoreFeatures { expected: 3 });
    assert!(err.to_string().contains("more features than"));
}

#[test]
fn test_features_against_longer_list() {
    let harness = harness("/vsimem/long_poly.mem");
    let mut layer = harness.dataset().unwrap().layer(0).unwrap();
    let expected: Vec<Expected> = ["first", "second", "third", "fourth", "fifth"]
        .into_iter()
        .map(Expected::from)
        .collect();
    assert_eq!(
        harness
            .check_features_against_list(&mut layer, "name", &expected)
            .unwrap_err(),
        ConformanceError::FewerFeatures {
            expected: 5,
            actual: 4
        }
    );
}

#[test]
fn test_features_reals_as_text() {
    let harness = harness("/vsimem/text_poly.mem");
    let mut layer = harness.dataset().unwrap().layer(0).unwrap();
    let areas = ["215229.266", "247328.172", "261752.781", "547597.188"].map(Expected::from);
    harness
        .check_features_against_list(&mut layer, "area", &areas)
        .unwrap();
}

#[test]
fn test_features_value_mismatch() {
    let harness = harness("/vsimem/mismatch_poly.mem");
    let mut layer = harness.dataset().unwrap().layer(0).unwrap();
    let err = harness
        .check_features_against_list(
            &mut layer,
            "area",
            &[
                Expected::Real(215229.266),
                Expected::Real(247328.172),
                Expected::Real(0.0),
                Expected::Real(547597.188),
            ],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ConformanceError::FieldValueMismatch { index: 2, .. }
    ));

    assert!(matches!(
        harness.check_features_against_list(&mut layer, "missing", &[Expected::Null]),
        Err(ConformanceError::MissingField { index: 0, .. })
    ));
}

#[test]
fn test_features_timestamps() {
    let harness = harness("/vsimem/time_poly.mem");
    let mut layer = harness.dataset().unwrap().layer(0).unwrap();
    let expected: Vec<Expected> = (1..=4)
        .map(|day| {
            NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(12, 30, 0)
                .unwrap()
                .into()
        })
        .collect();
    harness
        .check_features_against_list(&mut layer, "updated", &expected)
        .unwrap();

    // The same timestamps rendered as text.
    let as_text: Vec<Expected> = (1..=4)
        .map(|day| Expected::Text(format!("2024/03/0{day} 12:30:00+00")))
        .collect();
    harness
        .check_features_against_list(&mut layer, "updated", &as_text)
        .unwrap();
}

#[test]
fn test_feature_geometry() {
    let harness = harness("/vsimem/geom_poly.mem");
    let mut layer = harness.dataset().unwrap().layer(0).unwrap();
    let feature = layer.next_feature().unwrap().unwrap();

    harness
        .check_feature_geometry(&feature, FIRST_POLYGON, None)
        .unwrap();

    let parsed = geometry_from_wkt(FIRST_POLYGON).unwrap();
    harness
        .check_feature_geometry(&feature, GeometryExpectation::Geometry(&parsed), None)
        .unwrap();

    let nudged = "POLYGON ((479819.84475 4765180.5,479690.1875 4765259.5,479647.0 4765369.5,479819.84475 4765180.5))";
    assert!(matches!(
        harness.check_feature_geometry(&feature, nudged, None),
        Err(ConformanceError::CoordinateMismatch { point: 0, axis: 'x', .. })
    ));
    harness
        .check_feature_geometry(&feature, nudged, Some(0.01))
        .unwrap();

    assert!(matches!(
        harness.check_feature_geometry(&feature, GeometryExpectation::None, None),
        Err(ConformanceError::UnexpectedGeometry { .. })
    ));
    assert!(matches!(
        harness.check_feature_geometry(&feature, "POINT (1 2)", None),
        Err(ConformanceError::GeometryTypeMismatch { .. })
    ));
    assert!(matches!(
        harness.check_feature_geometry(&feature, "POLYGON ((0 0", None),
        Err(ConformanceError::InvalidWkt { .. })
    ));
}

#[test]
fn test_feature_without_geometry() {
    let backend = MemoryBackend::new();
    let mut ds = backend
        .create_vector("MEM", "/vsimem/attributes.mem")
        .unwrap();
    let layer = ds
        .create_layer("table", "None", &[("code", FieldType::String)])
        .unwrap();
    ds.add_feature(layer, &[("code", FieldValue::String("A".into()))], None)
        .unwrap();
    drop(ds);

    let mut harness = VectorHarness::new(backend, DriverDescriptor::new("MEM", "mem"));
    harness
        .check_open("/vsimem/attributes.mem", true, false)
        .unwrap();
    let mut layer = harness.dataset().unwrap().layer(0).unwrap();
    let feature = layer.next_feature().unwrap().unwrap();
    harness
        .check_feature_geometry(&feature, GeometryExpectation::None, None)
        .unwrap();
    assert!(matches!(
        harness.check_feature_geometry(&feature, "POINT (1 2)", None),
        Err(ConformanceError::MissingGeometry { .. })
    ));
}

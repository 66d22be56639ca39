#![cfg(feature = "gdal")]

use gdal_conformance::backend::{Backend, Extent, RasterSource, VectorLayer, VectorSource};
use gdal_conformance::config::{with_config_options, HarnessConfig};
use gdal_conformance::raster::{BandExpectation, CopyChecks, CreateCopyCheck};
use gdal_conformance::test_utils::{fixture, TempFixture, BYTE_CHECKSUM, BYTE_GEO_TRANSFORM};
use gdal_conformance::vector::{Expected, LayerExpectation};
use gdal_conformance::{
    skip_if_driver_missing, ConformanceError, DriverDescriptor, GdalBackend, RasterHarness,
    VectorHarness,
};
use serde_json::json;

#[test]
fn test_aaigrid_byte() {
    let backend = GdalBackend::new();
    skip_if_driver_missing!(&backend, "AAIGrid");

    // Statistics are persisted next to the dataset, so work on a copy.
    let grid = TempFixture::fixture("byte.asc").unwrap();
    let mut harness = RasterHarness::new(backend, DriverDescriptor::new("AAIGrid", "asc"));
    harness.check_open(&grid, true).unwrap();
    harness.check_raster_count(1).unwrap();
    harness.check_size((20, 20)).unwrap();
    harness.check_geo_transform(&BYTE_GEO_TRANSFORM, None).unwrap();
    harness
        .check_band(1, &BandExpectation::new(BYTE_CHECKSUM).min(91.0).max(224.0))
        .unwrap();

    let copy = harness
        .check_create_copy(&CreateCopyCheck {
            in_memory: true,
            checks: CopyChecks::STATISTICS | CopyChecks::GEO_TRANSFORM,
            ..CreateCopyCheck::default()
        })
        .unwrap();
    assert_eq!(copy.driver_short_name(), "AAIGrid");
}

#[test]
fn test_vrt_info_and_projection() {
    let backend = GdalBackend::new();
    skip_if_driver_missing!(&backend, "VRT", "AAIGrid");

    let dir = tempfile::tempdir().unwrap();
    for name in ["byte.vrt", "byte.asc"] {
        std::fs::copy(fixture(name), dir.path().join(name)).unwrap();
    }
    let vrt = dir.path().join("byte.vrt");

    let mut harness = RasterHarness::new(backend, DriverDescriptor::new("VRT", "vrt"))
        .with_config(HarnessConfig::default());
    harness.check_open(&vrt, true).unwrap();
    harness.check_projection("EPSG:26711").unwrap();
    assert!(matches!(
        harness.check_projection("EPSG:4326"),
        Err(ConformanceError::ProjectionMismatch { .. })
    ));

    // A golden file as written by hand: paths from elsewhere, the CRS by code and
    // integral numbers.
    let mut golden = harness.dataset().unwrap().info_report().unwrap();
    golden["description"] = json!("/data/fixtures/byte.vrt");
    let files: Vec<String> = golden["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|file| {
            let name = std::path::Path::new(file.as_str().unwrap()).file_name().unwrap();
            format!("/data/fixtures/{}", name.to_string_lossy())
        })
        .collect();
    golden["files"] = json!(files);
    golden["coordinateSystem"]["wkt"] = json!("EPSG:26711");
    golden["geoTransform"] = json!([440720, 60, 0, 3751320, 0, -60]);
    golden["bands"][0]["checksum"] = json!(BYTE_CHECKSUM);
    std::fs::write(
        dir.path().join("byte.vrt.json"),
        serde_json::to_string_pretty(&golden).unwrap(),
    )
    .unwrap();
    harness.check_info().unwrap();

    golden["bands"][0]["checksum"] = json!(BYTE_CHECKSUM + 1);
    let err = harness.check_info_value(&golden).unwrap_err();
    assert!(
        matches!(&err, ConformanceError::InfoFieldMismatch { field, .. } if field == "bands"),
        "{err}"
    );
}

#[test]
fn test_geojson_poly() {
    let backend = GdalBackend::new();
    skip_if_driver_missing!(&backend, "GeoJSON");

    let mut harness = VectorHarness::new(backend, DriverDescriptor::new("GeoJSON", "geojson"));
    harness
        .check_open(fixture("poly.geojson"), true, false)
        .unwrap();
    let mut layer = harness.dataset().unwrap().layer(0).unwrap();
    harness
        .check_layer(
            &layer,
            &LayerExpectation {
                name: "poly".to_string(),
                feature_count: 4,
                geometry_type: "Polygon".to_string(),
                field_count: 3,
                bbox: Extent {
                    min_x: 479640.09375,
                    max_x: 480039.03125,
                    min_y: 4764670.0,
                    max_y: 4765558.5,
                },
            },
        )
        .unwrap();
    harness
        .check_features_against_list(
            &mut layer,
            "eas_id",
            &[168_i64.into(), 179_i64.into(), 171_i64.into(), 173_i64.into()],
        )
        .unwrap();
    harness
        .check_features_against_list(&mut layer, "area", &[
            Expected::Real(215229.266),
            Expected::Real(247328.172),
            Expected::Real(261752.781),
            Expected::Real(547597.188),
        ])
        .unwrap();

    layer.reset_reading();
    let first = layer.next_feature().unwrap().unwrap();
    harness
        .check_feature_geometry(
            &first,
            "POLYGON ((479819.84375 4765180.5,479690.1875 4765259.5,479647.0 4765369.5,479819.84375 4765180.5))",
            None,
        )
        .unwrap();
}

#[test]
fn test_config_options_reach_gdal() {
    let backend = GdalBackend::new();
    let value = with_config_options(&backend, &[("GDAL_CONFORMANCE_SCOPED", "ON")], || {
        backend.config_option("GDAL_CONFORMANCE_SCOPED")
    })
    .unwrap();
    assert_eq!(value.as_deref(), Some("ON"));
    assert_eq!(backend.config_option("GDAL_CONFORMANCE_SCOPED"), None);
}

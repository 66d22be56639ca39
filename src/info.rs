//! Comparison of a live `gdalinfo -json` style report against a golden file.
//!
//! Some parts of a report legitimately differ between machines and library
//! versions. They are normalized before the remainder is compared exactly:
//!
//! * `driverLongName` is ignored;
//! * `description` and `files` are compared by basename;
//! * the extent ring (under `extent` or `wgs84Extent`) is compared to
//!   [`ToleranceConfig::extent_places`] decimal places;
//! * `coordinateSystem.wkt` is compared semantically;
//! * numbers compare by value, so `60` in a golden file matches a live `60.0`.
//!
//! When a comparison fails and an output directory is configured, the live report
//! is saved there for triage.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::backend::Backend;
use crate::config::HarnessConfig;
use crate::errors::{ConformanceError, Result};
use crate::spatial_ref::check_equivalent;
use crate::tolerance::{almost_equal, ToleranceConfig};

const EXTENT: &str = "extent";
const WGS84_EXTENT: &str = "wgs84Extent";
const BOTH_EXTENTS: &str = "extent and wgs84Extent";

/// `<fixture>.json`, the golden file of a fixture.
pub fn golden_path<P: AsRef<Path>>(fixture: P) -> PathBuf {
    let mut path = OsString::from(fixture.as_ref().as_os_str());
    path.push(".json");
    PathBuf::from(path)
}

pub fn load_golden<P: AsRef<Path>>(path: P) -> Result<Value> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|err| ConformanceError::GoldenRead {
        path: path.to_path_buf(),
        msg: err.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|err| ConformanceError::GoldenParse {
        path: path.to_path_buf(),
        msg: err.to_string(),
    })
}

/// Diffs structured info reports, using a backend to compare spatial references.
pub struct InfoComparator<'a, B: Backend + ?Sized> {
    backend: &'a B,
    tolerance: &'a ToleranceConfig,
    config: &'a HarnessConfig,
}

impl<'a, B: Backend + ?Sized> InfoComparator<'a, B> {
    pub fn new(backend: &'a B, tolerance: &'a ToleranceConfig, config: &'a HarnessConfig) -> Self {
        Self {
            backend,
            tolerance,
            config,
        }
    }

    /// Compare `live` to `golden`.
    ///
    /// `artifact_name` names the file the live report is saved to on failure.
    pub fn compare(&self, live: &Value, golden: &Value, artifact_name: &str) -> Result<()> {
        let result = self.compare_reports(live, golden);
        if result.is_err() {
            self.dump(live, artifact_name);
        }
        result
    }

    fn dump(&self, live: &Value, artifact_name: &str) {
        match serde_json::to_string_pretty(live) {
            Ok(text) => {
                self.config
                    .write_artifact(&format!("{artifact_name}.json"), &text);
            }
            Err(err) => log::warn!("unable to serialize live report: {err}"),
        }
    }

    fn compare_reports(&self, live: &Value, golden: &Value) -> Result<()> {
        let mut live = as_object(live, "live report")?;
        let mut golden = as_object(golden, "golden report")?;

        live.remove("driverLongName");
        golden.remove("driverLongName");

        let expected = basename(golden.remove("description").as_ref());
        let actual = basename(live.remove("description").as_ref());
        if expected != actual {
            return Err(ConformanceError::InfoFieldMismatch {
                field: "description".to_string(),
                expected: expected.unwrap_or_default(),
                actual: actual.unwrap_or_default(),
            });
        }

        self.compare_files(live.remove("files"), golden.remove("files"))?;
        self.compare_extent(&mut live, &mut golden)?;

        let expected = golden.remove("bands");
        let actual = live.remove("bands");
        if expected != actual {
            return Err(field_mismatch("bands", expected.as_ref(), actual.as_ref()));
        }

        let expected_wkt = take_wkt(&mut golden);
        let actual_wkt = take_wkt(&mut live);
        if !expected_wkt.is_empty() {
            check_equivalent(self.backend, &expected_wkt, &actual_wkt)?;
        }

        if live != golden {
            let field = live
                .keys()
                .chain(golden.keys())
                .find(|key| live.get(*key) != golden.get(*key))
                .cloned()
                .unwrap_or_default();
            return Err(field_mismatch(&field, golden.get(&field), live.get(&field)));
        }
        Ok(())
    }

    fn compare_files(&self, actual: Option<Value>, expected: Option<Value>) -> Result<()> {
        let actual = as_array(actual);
        let expected = as_array(expected);
        if actual.len() != expected.len() {
            return Err(ConformanceError::FileCountMismatch {
                expected: expected.len(),
                actual: actual.len(),
            });
        }
        for (i, (a, e)) in actual.iter().zip(&expected).enumerate() {
            let (a, e) = (basename(Some(a)), basename(Some(e)));
            if a != e {
                return Err(ConformanceError::InfoFieldMismatch {
                    field: format!("files[{i}]"),
                    expected: e.unwrap_or_default(),
                    actual: a.unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    fn compare_extent(
        &self,
        live: &mut Map<String, Value>,
        golden: &mut Map<String, Value>,
    ) -> Result<()> {
        let expected_field = extent_field(golden);
        let actual_field = extent_field(live);
        let field = match expected_field {
            Some(field) if field != BOTH_EXTENTS && expected_field == actual_field => field,
            _ => {
                return Err(ConformanceError::ExtentField {
                    expected: expected_field,
                    actual: actual_field,
                })
            }
        };

        let expected = first_ring(golden.remove(field));
        let actual = first_ring(live.remove(field));
        if expected.len() != actual.len() {
            return Err(ConformanceError::InfoFieldMismatch {
                field: format!("{field}.coordinates[0]"),
                expected: format!("{} point(s)", expected.len()),
                actual: format!("{} point(s)", actual.len()),
            });
        }
        let places = self.tolerance.extent_places;
        for (index, (e, a)) in expected.iter().zip(&actual).enumerate() {
            let matches = e.len() == a.len()
                && e.iter().zip(a).all(|(e, a)| almost_equal(*a, *e, places));
            if !matches {
                return Err(ConformanceError::ExtentMismatch {
                    field,
                    index,
                    expected: e.clone(),
                    actual: a.clone(),
                });
            }
        }
        Ok(())
    }
}

fn as_object(value: &Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map
            .iter()
            .map(|(key, value)| (key.clone(), normalize_numbers(value)))
            .collect()),
        other => Err(ConformanceError::InfoFieldMismatch {
            field: what.to_string(),
            expected: "a JSON object".to_string(),
            actual: other.to_string(),
        }),
    }
}

/// Rewrite every number as a float so integer and real spellings compare equal.
fn normalize_numbers(value: &Value) -> Value {
    match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| value.clone(), Value::Number),
        Value::Array(items) => Value::Array(items.iter().map(normalize_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), normalize_numbers(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn as_array(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
        None => Vec::new(),
    }
}

fn basename(value: Option<&Value>) -> Option<String> {
    let path = value?.as_str()?;
    let name = Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    Some(name)
}

fn field_mismatch(field: &str, expected: Option<&Value>, actual: Option<&Value>) -> ConformanceError {
    let render = |value: Option<&Value>| value.map_or_else(|| "<absent>".to_string(), Value::to_string);
    ConformanceError::InfoFieldMismatch {
        field: field.to_string(),
        expected: render(expected),
        actual: render(actual),
    }
}

fn extent_field(report: &Map<String, Value>) -> Option<&'static str> {
    match (report.contains_key(EXTENT), report.contains_key(WGS84_EXTENT)) {
        (true, true) => Some(BOTH_EXTENTS),
        (true, false) => Some(EXTENT),
        (false, true) => Some(WGS84_EXTENT),
        (false, false) => None,
    }
}

fn first_ring(extent: Option<Value>) -> Vec<Vec<f64>> {
    extent
        .as_ref()
        .and_then(|e| e.get("coordinates"))
        .and_then(|c| c.get(0))
        .and_then(Value::as_array)
        .map(|ring| {
            ring.iter()
                .map(|point| {
                    point
                        .as_array()
                        .map(|xy| xy.iter().filter_map(Value::as_f64).collect())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Remove `coordinateSystem.wkt`, returning it or an empty string.
fn take_wkt(report: &mut Map<String, Value>) -> String {
    report
        .get_mut("coordinateSystem")
        .and_then(Value::as_object_mut)
        .and_then(|cs| cs.remove("wkt"))
        .and_then(|wkt| wkt.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::memory::MemoryBackend;

    fn golden() -> Value {
        json!({
            "description": "byte.tif",
            "driverShortName": "GTiff",
            "driverLongName": "GeoTIFF",
            "files": ["byte.tif"],
            "size": [20, 20],
            "coordinateSystem": {
                "wkt": "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563]],PRIMEM[\"Greenwich\",0],UNIT[\"degree\",0.0174532925199433],AUTHORITY[\"EPSG\",\"4326\"]]",
                "dataAxisToSRSAxisMapping": [2, 1]
            },
            "wgs84Extent": {
                "type": "Polygon",
                "coordinates": [[[10.0, 20.0], [10.0, 0.0], [30.0, 0.0], [30.0, 20.0], [10.0, 20.0]]]
            },
            "bands": [{"band": 1, "type": "Byte", "checksum": 4672}]
        })
    }

    fn live() -> Value {
        let mut live = golden();
        live["description"] = json!("/home/ci/build/fixtures/byte.tif");
        live["driverLongName"] = json!("GeoTIFF (newer)");
        live["files"] = json!(["/home/ci/build/fixtures/byte.tif"]);
        live["coordinateSystem"]["wkt"] = json!("EPSG:4326");
        live["wgs84Extent"]["coordinates"][0][1] = json!([10.001, 0.004]);
        live
    }

    fn compare(live: &Value, golden: &Value) -> Result<()> {
        let backend = MemoryBackend::new();
        let tolerance = ToleranceConfig::default();
        let config = HarnessConfig::default();
        InfoComparator::new(&backend, &tolerance, &config).compare(live, golden, "byte.tif")
    }

    #[test]
    fn test_normalized_report_matches() {
        compare(&live(), &golden()).unwrap();
    }

    #[test]
    fn test_either_extent_field() {
        let mut golden = golden();
        let mut live = live();
        let extent = golden.as_object_mut().unwrap().remove("wgs84Extent").unwrap();
        golden["extent"] = extent.clone();
        live.as_object_mut().unwrap().remove("wgs84Extent");
        live["extent"] = extent;
        compare(&live, &golden).unwrap();
    }

    #[test]
    fn test_extent_field_disagreement() {
        let mut live = live();
        let extent = live.as_object_mut().unwrap().remove("wgs84Extent").unwrap();
        live["extent"] = extent;
        assert_eq!(
            compare(&live, &golden()).unwrap_err(),
            ConformanceError::ExtentField {
                expected: Some("wgs84Extent"),
                actual: Some("extent"),
            }
        );
    }

    #[test]
    fn test_extent_absent_from_golden() {
        let mut golden = golden();
        golden.as_object_mut().unwrap().remove("wgs84Extent");
        let err = compare(&live(), &golden).unwrap_err();
        assert!(matches!(err, ConformanceError::ExtentField { expected: None, .. }));
    }

    #[test]
    fn test_both_extent_fields_are_flagged() {
        let mut golden = golden();
        golden["extent"] = golden["wgs84Extent"].clone();
        let mut live = live();
        live["extent"] = live["wgs84Extent"].clone();
        let err = compare(&live, &golden).unwrap_err();
        assert!(matches!(err, ConformanceError::ExtentField { .. }));
    }

    #[test]
    fn test_extent_outside_tolerance() {
        let mut live = live();
        live["wgs84Extent"]["coordinates"][0][2] = json!([30.01, 0.0]);
        let err = compare(&live, &golden()).unwrap_err();
        assert!(matches!(
            err,
            ConformanceError::ExtentMismatch { field: "wgs84Extent", index: 2, .. }
        ));
    }

    #[test]
    fn test_band_checksum_change() {
        let mut live = live();
        live["bands"][0]["checksum"] = json!(4673);
        match compare(&live, &golden()).unwrap_err() {
            ConformanceError::InfoFieldMismatch { field, .. } => assert_eq!(field, "bands"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_file_list_length() {
        let mut live = live();
        live["files"] = json!(["byte.tif", "byte.tif.aux.xml"]);
        assert_eq!(
            compare(&live, &golden()).unwrap_err(),
            ConformanceError::FileCountMismatch {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn test_description_basename() {
        let mut live = live();
        live["description"] = json!("/somewhere/else/other.tif");
        let err = compare(&live, &golden()).unwrap_err();
        assert!(matches!(err, ConformanceError::InfoFieldMismatch { field, .. } if field == "description"));
    }

    #[test]
    fn test_projection_is_semantic() {
        let mut live = live();
        live["coordinateSystem"]["wkt"] = json!("EPSG:32611");
        let err = compare(&live, &golden()).unwrap_err();
        assert!(matches!(err, ConformanceError::ProjectionMismatch { .. }));
    }

    #[test]
    fn test_remaining_fields_exact() {
        let mut live = live();
        live["size"] = json!([20, 21]);
        let err = compare(&live, &golden()).unwrap_err();
        assert!(matches!(err, ConformanceError::InfoFieldMismatch { field, .. } if field == "size"));
    }

    #[test]
    fn test_integer_and_real_spellings_match() {
        let mut golden = golden();
        golden["geoTransform"] = json!([440720, 60, 0, 3751320, 0, -60]);
        golden["bands"][0]["noDataValue"] = json!(0);
        let mut live = live();
        live["geoTransform"] = json!([440720.0, 60.0, 0.0, 3751320.0, 0.0, -60.0]);
        live["bands"][0]["noDataValue"] = json!(0.0);
        compare(&live, &golden).unwrap();

        live["geoTransform"][1] = json!(60.5);
        let err = compare(&live, &golden).unwrap_err();
        assert!(matches!(err, ConformanceError::InfoFieldMismatch { field, .. } if field == "geoTransform"));
    }

    #[test]
    fn test_mismatch_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let tolerance = ToleranceConfig::default();
        let config = HarnessConfig::with_output_dir(dir.path());
        let mut live = live();
        live["bands"] = json!([]);

        let comparator = InfoComparator::new(&backend, &tolerance, &config);
        assert!(comparator.compare(&live, &golden(), "byte.tif").is_err());
        let saved: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("byte.tif.json")).unwrap())
                .unwrap();
        assert_eq!(saved, live);
    }

    #[test]
    fn test_golden_path() {
        assert_eq!(
            golden_path("fixtures/byte.tif"),
            PathBuf::from("fixtures/byte.tif.json")
        );
    }

    #[test]
    fn test_load_golden_errors() {
        let err = load_golden("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConformanceError::GoldenRead { .. }));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_golden(&path).unwrap_err(),
            ConformanceError::GoldenParse { .. }
        ));
    }
}

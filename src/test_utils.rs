//! Fixtures and sample datasets shared by this crate's tests and by downstream
//! driver suites built on the in-memory backend.

use std::path::{Path, PathBuf};

use crate::backend::memory::{DataType, FieldType, MemoryBackend};
use crate::backend::{FieldValue, TZ_FLAG_GMT};
use crate::errors::Result;
use crate::geometry::geometry_from_wkt;

/// A struct that contains a temporary directory and a path to a file in that directory.
pub struct TempFixture {
    _temp_dir: tempfile::TempDir,
    temp_path: PathBuf,
}

impl TempFixture {
    /// Copy `name` from the fixtures directory into a fresh temporary directory.
    pub fn fixture(name: &str) -> Result<Self> {
        let staging = Self::empty(name)?;
        std::fs::copy(fixture(name), &staging.temp_path)?;
        Ok(staging)
    }

    /// A temporary directory and the path of a not yet existing file `name` in it.
    pub fn empty(name: &str) -> Result<Self> {
        let _temp_dir = tempfile::tempdir()?;
        let temp_path = _temp_dir.path().join(name);
        Ok(Self {
            _temp_dir,
            temp_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.temp_path
    }
}

impl AsRef<Path> for TempFixture {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

/// Returns the fully qualified path to `filename` in `${CARGO_MANIFEST_DIR}/fixtures`.
pub fn fixture(filename: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(filename)
}

/// Checksum of the band written by [`create_byte_raster`].
pub const BYTE_CHECKSUM: i32 = 4672;

/// Geotransform of [`create_byte_raster`], a 60 m UTM grid.
pub const BYTE_GEO_TRANSFORM: [f64; 6] = [440720.0, 60.0, 0.0, 3751320.0, 0.0, -60.0];

/// Pixels of a 20x20 ramp running from 91 to 224.
pub fn byte_pixels() -> Vec<f64> {
    (0..20)
        .flat_map(|y| (0..20).map(move |x| f64::from(x + 6 * y + 91)))
        .collect()
}

/// Publish a single band 20x20 `Byte` raster in UTM zone 11 (NAD27) at `path`.
pub fn create_byte_raster(backend: &MemoryBackend, path: &str) -> Result<()> {
    let mut ds = backend.create("MEM", path, (20, 20), 1, DataType::Byte)?;
    ds.write_band(1, &byte_pixels())?;
    ds.set_geo_transform(BYTE_GEO_TRANSFORM)?;
    ds.set_projection("EPSG:26711")?;
    ds.set_metadata_item("AREA_OR_POINT", "Area", "")?;
    Ok(())
}

/// Publish a vector dataset with a `poly` layer of 4 polygons at `path`.
///
/// Fields: `name` (string), `area` (real), `eas_id` (integer), `updated` (date-time).
pub fn create_poly_layer(backend: &MemoryBackend, path: &str) -> Result<()> {
    let mut ds = backend.create_vector("MEM", path)?;
    let layer = ds.create_layer(
        "poly",
        "Polygon",
        &[
            ("name", FieldType::String),
            ("area", FieldType::Real),
            ("eas_id", FieldType::Integer),
            ("updated", FieldType::DateTime),
        ],
    )?;
    let rows = [
        ("first", 215229.266, 168, "POLYGON ((479819.84375 4765180.5,479690.1875 4765259.5,479647.0 4765369.5,479819.84375 4765180.5))"),
        ("second", 247328.172, 179, "POLYGON ((480035.34375 4765558.5,480039.03125 4765539.5,479730.375 4765400.5,480035.34375 4765558.5))"),
        ("third", 261752.781, 171, "POLYGON ((479705.0 4764950.0,479745.0 4764980.0,479700.0 4765010.0,479705.0 4764950.0))"),
        ("fourth", 547597.188, 173, "POLYGON ((479750.6875 4764702.0,479658.59375 4764670.0,479640.09375 4764721.0,479750.6875 4764702.0))"),
    ];
    for (i, (name, area, eas_id, wkt)) in rows.into_iter().enumerate() {
        let updated = chrono::NaiveDate::from_ymd_opt(2024, 3, 1 + i as u32)
            .and_then(|d| d.and_hms_opt(12, 30, 0))
            .map(|dt| FieldValue::DateTime(dt, TZ_FLAG_GMT))
            .unwrap_or(FieldValue::Null);
        ds.add_feature(
            layer,
            &[
                ("name", FieldValue::String(name.to_string())),
                ("area", FieldValue::Real(area)),
                ("eas_id", FieldValue::Integer(eas_id)),
                ("updated", updated),
            ],
            Some(geometry_from_wkt(wkt)?),
        )?;
    }
    Ok(())
}

/// Assert numerical difference between two expressions is less than
/// 64-bit machine epsilon or a specified epsilon.
///
/// # Examples:
/// ```rust
/// use gdal_conformance::assert_near;
/// use std::f64::consts::{PI, E};
/// assert_near!(PI / E, 1.1557273497909217);
/// // with specified epsilon
/// assert_near!(PI / E, 1.15572734, epsilon = 1e-8);
/// ```
#[macro_export]
macro_rules! assert_near {
    ($left:expr, $right:expr) => {
        $crate::assert_near!($left, $right, epsilon = f64::EPSILON)
    };
    ($left:expr, $right:expr, epsilon = $ep:expr) => {
        assert!(
            ($left - $right).abs() < $ep,
            "|{} - {}| = {} is greater than epsilon {:.4e}",
            $left,
            $right,
            ($left - $right).abs(),
            $ep
        )
    };
}

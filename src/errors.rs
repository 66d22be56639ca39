use std::path::PathBuf;

use thiserror::Error;

use crate::geo_transform::GeoTransform;

pub type Result<T> = std::result::Result<T, ConformanceError>;

/// A failed conformance check, or a failure of the machinery needed to run one.
///
/// Assertion variants carry both the expected and the actual value so that the
/// message alone is enough to triage a failing driver.
#[derive(Clone, PartialEq, Debug, Error)]
pub enum ConformanceError {
    #[error("driver mismatch: expected '{expected}', dataset was opened by '{actual}'")]
    DriverMismatch { expected: String, actual: String },
    #[error("driver '{name}' is not registered")]
    DriverNotFound { name: String },
    #[error("driver '{driver}' does not support {operation}")]
    UnsupportedOperation {
        driver: String,
        operation: &'static str,
    },
    #[error("test fixture '{}' does not exist", path.display())]
    MissingFixture { path: PathBuf },
    #[error("unable to open '{}': {msg}", path.display())]
    OpenFailed { path: PathBuf, msg: String },
    #[error("no dataset is open; call check_open first")]
    NoOpenDataset,

    #[error("expected geotransform must have 6 components, got {len}")]
    GeoTransformLength { len: usize },
    #[error("geotransform presence mismatch: expected {expected:?}, got {actual:?}")]
    GeoTransformPresence {
        expected: Option<GeoTransform>,
        actual: Option<GeoTransform>,
    },
    #[error("geotransform[{index}]: expected {expected}, got {actual} (tolerance {tolerance})")]
    GeoTransformMismatch {
        index: usize,
        expected: f64,
        actual: f64,
        tolerance: f64,
    },

    #[error("spatial reference mismatch:\nexpected: {expected}\nactual: {actual}")]
    ProjectionMismatch { expected: String, actual: String },
    #[error("unable to parse spatial reference '{definition}': {msg}")]
    InvalidSpatialRef { definition: String, msg: String },

    #[error("raster count of '{}': expected {expected}, got {actual}", path.display())]
    RasterCountMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
    #[error("raster size of '{}': expected {expected:?}, got {actual:?}", path.display())]
    RasterSizeMismatch {
        path: PathBuf,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("band {band} out of range, dataset has {count} band(s)")]
    BandOutOfRange { band: usize, count: usize },
    #[error("checksum of band {band} in '{}': expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        band: usize,
        expected: i32,
        actual: i32,
    },
    #[error("data type of band {band}: expected {expected}, got {actual}")]
    BandTypeMismatch {
        band: usize,
        expected: String,
        actual: String,
    },
    #[error("no-data value of band {band}: expected {expected:?}, got {actual:?}")]
    NoDataMismatch {
        band: usize,
        expected: Option<f64>,
        actual: Option<f64>,
    },
    #[error("{statistic} of band {band}: expected {expected}, got {actual} (tolerance {tolerance:e})")]
    StatisticMismatch {
        band: usize,
        statistic: &'static str,
        expected: f64,
        actual: f64,
        tolerance: f64,
    },
    #[error("statistics are not available for band {band}")]
    StatisticsUnavailable { band: usize },
    #[error("metadata item '{key}': expected {expected:?}, got {actual:?}")]
    MetadataMismatch {
        key: String,
        expected: Option<String>,
        actual: Option<String>,
    },
    #[error("create-copy of '{}' through '{driver}' failed: {msg}", path.display())]
    CreateCopyFailed {
        driver: String,
        path: PathBuf,
        msg: String,
    },

    #[error("unable to read golden file '{}': {msg}", path.display())]
    GoldenRead { path: PathBuf, msg: String },
    #[error("golden file '{}' is not valid JSON: {msg}", path.display())]
    GoldenParse { path: PathBuf, msg: String },
    #[error("info field '{field}' mismatch:\nexpected: {expected}\nactual: {actual}")]
    InfoFieldMismatch {
        field: String,
        expected: String,
        actual: String,
    },
    #[error("extent field disagreement: golden has {expected:?}, report has {actual:?}")]
    ExtentField {
        expected: Option<&'static str>,
        actual: Option<&'static str>,
    },
    #[error("{field} coordinate {index}: expected {expected:?}, got {actual:?}")]
    ExtentMismatch {
        field: &'static str,
        index: usize,
        expected: Vec<f64>,
        actual: Vec<f64>,
    },
    #[error("file list length: expected {expected}, got {actual}")]
    FileCountMismatch { expected: usize, actual: usize },

    #[error("layer '{layer}' {attribute}: expected {expected}, got {actual}")]
    LayerMismatch {
        layer: String,
        attribute: &'static str,
        expected: String,
        actual: String,
    },
    #[error("field '{field}' of feature {index}: expected {expected}, got {actual}")]
    FieldValueMismatch {
        index: usize,
        field: String,
        expected: String,
        actual: String,
    },
    #[error("feature {index} has no field '{field}'")]
    MissingField { index: usize, field: String },
    #[error("layer yielded {actual} feature(s), fewer than the {expected} expected")]
    FewerFeatures { expected: usize, actual: usize },
    #[error("layer has more features than the {expected} expected")]
    MoreFeatures { expected: usize },

    #[error("expected geometry {expected} but got none")]
    MissingGeometry { expected: String },
    #[error("expected no geometry but got {actual}")]
    UnexpectedGeometry { actual: String },
    #[error("geometry type at {path}: expected {expected}, got {actual}")]
    GeometryTypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("geometry count at {path}: expected {expected}, got {actual}")]
    GeometryCountMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },
    #[error("point count at {path}: expected {expected}, got {actual}")]
    PointCountMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },
    #[error("{axis} of point {point} at {path}: expected {expected}, got {actual} (max error {max_error})")]
    CoordinateMismatch {
        path: String,
        point: usize,
        axis: char,
        expected: f64,
        actual: f64,
        max_error: f64,
    },
    #[error("invalid WKT '{wkt}': {msg}")]
    InvalidWkt { wkt: String, msg: String },

    #[error("{msg}")]
    Backend { msg: String },
    #[error("I/O error: {0}")]
    Io(String),
    #[cfg(feature = "gdal")]
    #[error(transparent)]
    Gdal(#[from] gdal::errors::GdalError),
}

impl From<std::io::Error> for ConformanceError {
    fn from(err: std::io::Error) -> Self {
        ConformanceError::Io(err.to_string())
    }
}

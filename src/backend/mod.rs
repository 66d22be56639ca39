//! The narrow slice of a format-driver library the harnesses consume.
//!
//! A harness is generic over one [`Backend`], so how a geometry or a band is reached
//! is decided when the harness type is chosen, not discovered per call.

use std::fmt::Debug;
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::errors::Result;
use crate::geo_transform::GeoTransform;
use crate::geometry::IntoGeometryNode;

#[cfg(feature = "gdal")]
pub mod gdal;
pub mod memory;

/// Driver registry, dataset factory and parsers of one format-driver library.
pub trait Backend {
    type Raster: RasterSource;
    type Vector: VectorSource<Geometry = Self::Geometry>;
    type SpatialRef: PartialEq + Debug;
    type Geometry: IntoGeometryNode + Clone + Debug;

    /// `true` if a driver with this short name is registered.
    fn driver_available(&self, name: &str) -> bool;

    /// Open a raster dataset read-only, letting the registry pick the driver.
    fn open_raster(&self, path: &Path) -> Result<Self::Raster>;

    /// Open a vector dataset, letting the registry pick the driver.
    fn open_vector(&self, path: &Path, update: bool) -> Result<Self::Vector>;

    /// Write a copy of `source` to `path` through the driver named `driver`.
    ///
    /// The returned handle may buffer writes until it is dropped.
    fn create_copy(
        &self,
        driver: &str,
        path: &Path,
        source: &Self::Raster,
        strict: bool,
        options: &[(String, String)],
    ) -> Result<Self::Raster>;

    /// Remove a dataset and its side-car files.
    fn delete_dataset(&self, driver: &str, path: &Path) -> Result<()>;

    fn parse_spatial_ref(&self, definition: &str) -> Result<Self::SpatialRef>;

    fn parse_geometry(&self, wkt: &str) -> Result<Self::Geometry>;

    /// Current value of a configuration option, `None` if unset.
    fn config_option(&self, key: &str) -> Option<String>;

    /// Set (`Some`) or clear (`None`) a configuration option.
    fn set_config_option(&self, key: &str, value: Option<&str>) -> Result<()>;
}

/// Population statistics of one band, no-data excluded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// An opened raster dataset. Bands are numbered from 1.
pub trait RasterSource {
    /// The path the dataset was opened from.
    fn description(&self) -> String;
    fn driver_short_name(&self) -> String;
    fn raster_size(&self) -> (usize, usize);
    fn raster_count(&self) -> usize;
    fn geo_transform(&self) -> Option<GeoTransform>;
    /// CRS description, empty when the dataset has none.
    fn projection(&self) -> String;
    fn metadata_item(&self, key: &str, domain: &str) -> Option<String>;

    fn band_checksum(&self, band: usize) -> Result<i32>;
    fn band_type_name(&self, band: usize) -> Result<String>;
    fn band_no_data_value(&self, band: usize) -> Result<Option<f64>>;
    fn band_statistics(
        &self,
        band: usize,
        approx_ok: bool,
        force: bool,
    ) -> Result<Option<BandStatistics>>;

    /// Structured introspection report, shaped like `gdalinfo -json -checksum`.
    fn info_report(&self) -> Result<serde_json::Value>;
}

/// Layer bounding box in OGR order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn as_array(&self) -> [f64; 4] {
        [self.min_x, self.max_x, self.min_y, self.max_y]
    }
}

/// OGR time zone flag for GMT.
pub const TZ_FLAG_GMT: i32 = 100;

/// Value of one attribute field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    IntegerList(Vec<i64>),
    Real(f64),
    RealList(Vec<f64>),
    String(String),
    StringList(Vec<String>),
    Date(NaiveDate),
    /// A timestamp with its OGR time zone flag (0 unknown, 1 local, 100 GMT).
    DateTime(NaiveDateTime, i32),
    Null,
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Real(v) => Some(*v),
            FieldValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text rendering, the way OGR's `GetFieldAsString` presents the value of a
    /// field declared without width or precision.
    pub fn to_text(&self) -> String {
        fn join<T, F: Fn(&T) -> String>(items: &[T], render: F) -> String {
            let parts: Vec<String> = items.iter().map(render).collect();
            format!("({}:{})", items.len(), parts.join(","))
        }
        match self {
            FieldValue::Integer(v) => v.to_string(),
            FieldValue::IntegerList(v) => join(v, i64::to_string),
            FieldValue::Real(v) => format_g(*v, 15),
            FieldValue::RealList(v) => join(v, |v| format_g(*v, 16)),
            FieldValue::String(s) => s.clone(),
            FieldValue::StringList(v) => join(v, String::clone),
            FieldValue::Date(d) => format!("{:04}/{:02}/{:02}", d.year(), d.month(), d.day()),
            FieldValue::DateTime(dt, tz_flag) => {
                let mut text = format!(
                    "{:04}/{:02}/{:02} {:02}:{:02}:",
                    dt.year(),
                    dt.month(),
                    dt.day(),
                    dt.hour(),
                    dt.minute()
                );
                let millis = dt.nanosecond() / 1_000_000;
                if millis == 0 {
                    text.push_str(&format!("{:02}", dt.second()));
                } else {
                    let seconds = f64::from(dt.second()) + f64::from(millis) / 1000.0;
                    text.push_str(&format!("{seconds:06.3}"));
                }
                text.push_str(&tz_suffix(*tz_flag));
                text
            }
            FieldValue::Null => String::new(),
        }
    }
}

/// `+HH`, `-HH` or `+HHMM` for an OGR time zone flag; empty for unknown and local
/// time.
fn tz_suffix(tz_flag: i32) -> String {
    if tz_flag <= 1 {
        return String::new();
    }
    let offset = (tz_flag - TZ_FLAG_GMT) * 15;
    let hours = offset / 60;
    let minutes = (offset - hours * 60).abs();
    let sign = if offset < 0 { '-' } else { '+' };
    if minutes == 0 {
        format!("{sign}{:02}", hours.abs())
    } else {
        format!("{sign}{:02}{minutes:02}", hours.abs())
    }
}

/// C's `%.<precision>g`.
pub fn format_g(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        let text = if value > 0.0 { "inf" } else { "-inf" };
        return text.to_string();
    }
    if value == 0.0 {
        let text = if value.is_sign_negative() { "-0" } else { "0" };
        return text.to_string();
    }

    let precision = precision.max(1);
    let scientific = format!("{:.*e}", precision - 1, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific.clone();
    };
    let exponent: i32 = exponent.parse().unwrap_or_default();
    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", strip_fraction_zeros(mantissa), exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent) as usize;
        strip_fraction_zeros(&format!("{value:.decimals$}")).to_string()
    }
}

fn strip_fraction_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// One feature read from a layer, detached from the layer cursor.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureRecord<G> {
    pub fid: Option<u64>,
    pub fields: Vec<(String, FieldValue)>,
    pub geometry: Option<G>,
    /// Fields the backend rendered as text itself, by name.
    pub texts: Vec<(String, String)>,
}

impl<G> FeatureRecord<G> {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// `name` as text: the backend's own rendering if it made one, otherwise
    /// [`FieldValue::to_text`].
    pub fn field_text(&self, name: &str) -> Option<String> {
        self.texts
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, text)| text.clone())
            .or_else(|| self.field(name).map(FieldValue::to_text))
    }
}

/// An opened vector dataset.
pub trait VectorSource {
    type Geometry;
    type Layer<'a>: VectorLayer<Geometry = Self::Geometry>
    where
        Self: 'a;

    fn description(&self) -> String;
    fn driver_short_name(&self) -> String;
    fn layer_count(&self) -> usize;
    fn layer(&self, index: usize) -> Result<Self::Layer<'_>>;
    fn layer_by_name(&self, name: &str) -> Result<Self::Layer<'_>>;
}

/// A layer with a sequential read cursor.
pub trait VectorLayer {
    type Geometry;

    fn name(&self) -> String;
    fn feature_count(&self) -> u64;
    /// Declared geometry type, as OGR names it (`"Point"`, `"Multi Polygon"`, ...).
    fn geometry_type_name(&self) -> String;
    fn field_count(&self) -> usize;
    fn extent(&self) -> Result<Extent>;
    fn reset_reading(&mut self);
    fn next_feature(&mut self) -> Result<Option<FeatureRecord<Self::Geometry>>>;
}

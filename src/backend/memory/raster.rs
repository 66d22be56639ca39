use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use super::{MemoryBackend, StoredDataset};
use crate::backend::{BandStatistics, RasterSource};
use crate::errors::{ConformanceError, Result};
use crate::geo_transform::{GeoTransform, GeoTransformEx};
use crate::spatial_ref::SpatialRefIdentity;

/// Pixel data types, named as GDAL names them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Byte => "Byte",
            DataType::Int16 => "Int16",
            DataType::UInt16 => "UInt16",
            DataType::Int32 => "Int32",
            DataType::UInt32 => "UInt32",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, DataType::Float32 | DataType::Float64)
    }

    fn range(&self) -> (f64, f64) {
        match self {
            DataType::Byte => (u8::MIN as f64, u8::MAX as f64),
            DataType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            DataType::UInt16 => (u16::MIN as f64, u16::MAX as f64),
            DataType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            DataType::UInt32 => (u32::MIN as f64, u32::MAX as f64),
            DataType::Float32 => (f32::MIN as f64, f32::MAX as f64),
            DataType::Float64 => (f64::MIN, f64::MAX),
        }
    }

    /// Convert a value the way a write into a band of this type would.
    ///
    /// Integer types round to nearest and saturate; NaN becomes 0.
    pub fn quantize(&self, value: f64) -> f64 {
        match self {
            DataType::Float64 => value,
            DataType::Float32 => value as f32 as f64,
            _ if value.is_nan() => 0.0,
            _ => {
                let (min, max) = self.range();
                value.round().clamp(min, max)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BandData {
    pub data_type: DataType,
    pub no_data: Option<f64>,
    pub pixels: Vec<f64>,
}

impl BandData {
    pub fn new(data_type: DataType, len: usize) -> Self {
        Self {
            data_type,
            no_data: None,
            pixels: vec![0.0; len],
        }
    }

    fn is_valid(&self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        match self.no_data {
            Some(no_data) if no_data.is_nan() => true,
            #[allow(clippy::float_cmp)]
            Some(no_data) => value != no_data,
            None => true,
        }
    }

    fn statistics(&self) -> Option<BandStatistics> {
        let valid: Vec<f64> = self
            .pixels
            .iter()
            .copied()
            .filter(|v| self.is_valid(*v))
            .collect();
        if valid.is_empty() {
            return None;
        }
        let n = valid.len() as f64;
        let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
        let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = valid.iter().sum::<f64>() / n;
        let variance = valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(BandStatistics {
            min,
            max,
            mean,
            std_dev: variance.sqrt(),
        })
    }
}

/// GDAL's image checksum: each pixel, as an integer, modulo a cycling list of
/// primes, accumulated into 16 bits.
///
/// Floating point pixels are rounded half up; NaN and infinities count as
/// `i32::MIN`.
pub fn checksum(pixels: &[f64], data_type: DataType) -> i32 {
    const PRIMES: [i32; 11] = [7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43];

    let mut sum: u32 = 0;
    for (value, prime) in pixels.iter().zip(PRIMES.iter().cycle()) {
        let value = if data_type.is_integer() {
            *value as i32
        } else if value.is_finite() {
            (value + 0.5).floor() as i32
        } else {
            i32::MIN
        };
        sum = sum.wrapping_add((value % prime) as u32) & 0xffff;
    }
    sum as i32
}

/// Raster content of one dataset, as kept in the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RasterData {
    pub driver: String,
    pub size: (usize, usize),
    pub geo_transform: Option<GeoTransform>,
    pub projection: String,
    /// Metadata items by domain; the default domain is `""`.
    pub metadata: BTreeMap<String, BTreeMap<String, String>>,
    pub bands: Vec<BandData>,
}

/// Handle to an in-memory raster dataset.
///
/// Changes made through a writable handle are published when it is dropped.
#[derive(Debug)]
pub struct MemRaster {
    backend: MemoryBackend,
    path: PathBuf,
    data: RasterData,
    writable: bool,
    dirty: bool,
}

impl MemRaster {
    pub(super) fn new(
        backend: MemoryBackend,
        path: &Path,
        data: RasterData,
        writable: bool,
        dirty: bool,
    ) -> Self {
        Self {
            backend,
            path: path.to_path_buf(),
            data,
            writable,
            dirty,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(super) fn data(&self) -> &RasterData {
        &self.data
    }

    fn band_data(&self, band: usize) -> Result<&BandData> {
        let count = self.data.bands.len();
        band.checked_sub(1)
            .and_then(|i| self.data.bands.get(i))
            .ok_or(ConformanceError::BandOutOfRange { band, count })
    }

    fn modify(&mut self, operation: &'static str) -> Result<&mut RasterData> {
        if !self.writable {
            return Err(ConformanceError::UnsupportedOperation {
                driver: self.data.driver.clone(),
                operation,
            });
        }
        self.dirty = true;
        Ok(&mut self.data)
    }

    fn modify_band(&mut self, band: usize, operation: &'static str) -> Result<&mut BandData> {
        let count = self.data.bands.len();
        self.modify(operation)?
            .bands
            .get_mut(band.wrapping_sub(1))
            .ok_or(ConformanceError::BandOutOfRange { band, count })
    }

    pub fn set_geo_transform(&mut self, geo_transform: GeoTransform) -> Result<()> {
        self.backend
            .driver(&self.data.driver)?
            .require(super::DriverCapabilities::GEOREFERENCING, "georeferencing")?;
        self.modify("set_geo_transform")?.geo_transform = Some(geo_transform);
        Ok(())
    }

    pub fn set_projection(&mut self, projection: &str) -> Result<()> {
        self.backend
            .driver(&self.data.driver)?
            .require(super::DriverCapabilities::GEOREFERENCING, "georeferencing")?;
        self.modify("set_projection")?.projection = projection.to_string();
        Ok(())
    }

    pub fn set_metadata_item(&mut self, key: &str, value: &str, domain: &str) -> Result<()> {
        self.modify("set_metadata_item")?
            .metadata
            .entry(domain.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Replace every pixel of `band`, row by row.
    pub fn write_band(&mut self, band: usize, pixels: &[f64]) -> Result<()> {
        let expected = self.data.size.0 * self.data.size.1;
        if pixels.len() != expected {
            return Err(ConformanceError::Backend {
                msg: format!(
                    "band {band} holds {expected} pixels, {} were given",
                    pixels.len()
                ),
            });
        }
        let band = self.modify_band(band, "write")?;
        let data_type = band.data_type;
        band.pixels = pixels.iter().map(|v| data_type.quantize(*v)).collect();
        Ok(())
    }

    pub fn set_no_data_value(&mut self, band: usize, no_data: Option<f64>) -> Result<()> {
        self.modify_band(band, "set_no_data_value")?.no_data = no_data;
        Ok(())
    }

    /// Change the type of `band`, converting its pixels.
    pub fn set_band_type(&mut self, band: usize, data_type: DataType) -> Result<()> {
        let band = self.modify_band(band, "set_band_type")?;
        band.data_type = data_type;
        for v in band.pixels.iter_mut() {
            *v = data_type.quantize(*v);
        }
        Ok(())
    }

    /// Publish pending changes now rather than on drop.
    pub fn flush(&mut self) {
        if self.dirty {
            self.backend
                .publish(&self.path, StoredDataset::Raster(self.data.clone()));
            self.dirty = false;
        }
    }

    fn extent_ring(&self, gt: &GeoTransform) -> Value {
        let (w, h) = (self.data.size.0 as f64, self.data.size.1 as f64);
        let corners = [(0.0, 0.0), (0.0, h), (w, h), (w, 0.0), (0.0, 0.0)];
        let ring: Vec<Value> = corners
            .iter()
            .map(|(p, l)| {
                let (x, y) = gt.apply(*p, *l);
                json!([x, y])
            })
            .collect();
        json!({ "type": "Polygon", "coordinates": [ring] })
    }
}

impl Drop for MemRaster {
    fn drop(&mut self) {
        self.flush();
    }
}

impl RasterSource for MemRaster {
    fn description(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn driver_short_name(&self) -> String {
        self.data.driver.clone()
    }

    fn raster_size(&self) -> (usize, usize) {
        self.data.size
    }

    fn raster_count(&self) -> usize {
        self.data.bands.len()
    }

    fn geo_transform(&self) -> Option<GeoTransform> {
        self.data.geo_transform
    }

    fn projection(&self) -> String {
        self.data.projection.clone()
    }

    fn metadata_item(&self, key: &str, domain: &str) -> Option<String> {
        self.data.metadata.get(domain)?.get(key).cloned()
    }

    fn band_checksum(&self, band: usize) -> Result<i32> {
        let band = self.band_data(band)?;
        Ok(checksum(&band.pixels, band.data_type))
    }

    fn band_type_name(&self, band: usize) -> Result<String> {
        Ok(self.band_data(band)?.data_type.name().to_string())
    }

    fn band_no_data_value(&self, band: usize) -> Result<Option<f64>> {
        Ok(self.band_data(band)?.no_data)
    }

    fn band_statistics(
        &self,
        band: usize,
        _approx_ok: bool,
        _force: bool,
    ) -> Result<Option<BandStatistics>> {
        Ok(self.band_data(band)?.statistics())
    }

    fn info_report(&self) -> Result<Value> {
        let description = self.description();
        let mut report = Map::new();
        report.insert("description".into(), json!(description));
        report.insert("driverShortName".into(), json!(self.data.driver));
        report.insert(
            "driverLongName".into(),
            json!(self.backend.long_name(&self.data.driver)),
        );
        report.insert("files".into(), json!([description]));
        report.insert("size".into(), json!([self.data.size.0, self.data.size.1]));

        if !self.data.projection.is_empty() {
            report.insert(
                "coordinateSystem".into(),
                json!({ "wkt": self.data.projection }),
            );
        }
        if let Some(gt) = &self.data.geo_transform {
            report.insert("geoTransform".into(), json!(gt));
            let is_wgs84 = SpatialRefIdentity::from_definition(&self.data.projection)
                .map(|srs| srs.epsg() == Some(4326))
                .unwrap_or(false);
            let field = if is_wgs84 { "wgs84Extent" } else { "extent" };
            report.insert(field.into(), self.extent_ring(gt));
        }

        let metadata: Map<String, Value> = self
            .data
            .metadata
            .iter()
            .map(|(domain, items)| (domain.clone(), json!(items)))
            .collect();
        if !metadata.is_empty() {
            report.insert("metadata".into(), Value::Object(metadata));
        }

        let bands: Vec<Value> = self
            .data
            .bands
            .iter()
            .enumerate()
            .map(|(i, band)| {
                let mut entry = Map::new();
                entry.insert("band".into(), json!(i + 1));
                entry.insert("block".into(), json!([self.data.size.0, 1]));
                entry.insert("type".into(), json!(band.data_type.name()));
                entry.insert(
                    "colorInterpretation".into(),
                    json!(if self.data.bands.len() == 1 { "Gray" } else { "Undefined" }),
                );
                entry.insert(
                    "checksum".into(),
                    json!(checksum(&band.pixels, band.data_type)),
                );
                if let Some(no_data) = band.no_data {
                    entry.insert("noDataValue".into(), json!(no_data));
                }
                Value::Object(entry)
            })
            .collect();
        report.insert("bands".into(), Value::Array(bands));

        Ok(Value::Object(report))
    }
}

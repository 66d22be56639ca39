//! Backend over the GDAL/OGR library, through the georust `gdal` bindings.
//!
//! Checksums, info reports and feature reads go straight to `gdal-sys` where the
//! high-level bindings do not expose the call.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::path::{Path, PathBuf};
use std::ptr;

use ::gdal::cpl::CslStringList;
use ::gdal::spatial_ref::SpatialRef;
use ::gdal::vector::{Geometry, Layer, LayerAccess};
use ::gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags, Metadata};
use chrono::NaiveDate;
use gdal_sys::{CPLErr, OGRFeatureH, OGRFieldType};

use crate::backend::{
    Backend, BandStatistics, Extent, FeatureRecord, FieldValue, RasterSource, VectorLayer,
    VectorSource,
};
use crate::errors::{ConformanceError, Result};
use crate::geo_transform::GeoTransform;
use crate::geometry::{GeometryNode, IntoGeometryNode};

fn _string(raw_ptr: *const c_char) -> String {
    if raw_ptr.is_null() {
        return String::new();
    }
    let c_str = unsafe { CStr::from_ptr(raw_ptr) };
    c_str.to_string_lossy().into_owned()
}

fn _last_error_msg() -> String {
    let msg = _string(unsafe { gdal_sys::CPLGetLastErrorMsg() });
    unsafe { gdal_sys::CPLErrorReset() };
    msg
}

fn _path_to_c_string(path: &Path) -> Result<CString> {
    CString::new(path.to_string_lossy().as_ref()).map_err(|err| ConformanceError::Backend {
        msg: err.to_string(),
    })
}

/// The GDAL driver registry.
#[derive(Clone, Copy, Debug)]
pub struct GdalBackend {
    _private: (),
}

impl GdalBackend {
    pub fn new() -> Self {
        DriverManager::register_all();
        Self { _private: () }
    }
}

impl Default for GdalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for GdalBackend {
    type Raster = GdalRaster;
    type Vector = GdalVector;
    type SpatialRef = SpatialRef;
    type Geometry = Geometry;

    fn driver_available(&self, name: &str) -> bool {
        DriverManager::get_driver_by_name(name).is_ok()
    }

    fn open_raster(&self, path: &Path) -> Result<GdalRaster> {
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_RASTER | GdalOpenFlags::GDAL_OF_READONLY,
            ..DatasetOptions::default()
        };
        let dataset =
            Dataset::open_ex(path, options).map_err(|err| ConformanceError::OpenFailed {
                path: path.to_path_buf(),
                msg: err.to_string(),
            })?;
        Ok(GdalRaster {
            dataset,
            path: path.to_path_buf(),
        })
    }

    fn open_vector(&self, path: &Path, update: bool) -> Result<GdalVector> {
        let mode = if update {
            GdalOpenFlags::GDAL_OF_UPDATE
        } else {
            GdalOpenFlags::GDAL_OF_READONLY
        };
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_VECTOR | mode,
            ..DatasetOptions::default()
        };
        let dataset =
            Dataset::open_ex(path, options).map_err(|err| ConformanceError::OpenFailed {
                path: path.to_path_buf(),
                msg: err.to_string(),
            })?;
        Ok(GdalVector {
            dataset,
            path: path.to_path_buf(),
        })
    }

    fn create_copy(
        &self,
        driver: &str,
        path: &Path,
        source: &GdalRaster,
        strict: bool,
        options: &[(String, String)],
    ) -> Result<GdalRaster> {
        let gdal_driver = DriverManager::get_driver_by_name(driver).map_err(|_| {
            ConformanceError::DriverNotFound {
                name: driver.to_string(),
            }
        })?;
        let mut c_options = CslStringList::new();
        for (key, value) in options {
            c_options.set_name_value(key, value)?;
        }
        let c_path = _path_to_c_string(path)?;

        let c_dataset = unsafe {
            gdal_sys::GDALCreateCopy(
                gdal_driver.c_driver(),
                c_path.as_ptr(),
                source.dataset.c_dataset(),
                strict as c_int,
                c_options.as_ptr(),
                None,
                ptr::null_mut(),
            )
        };
        if c_dataset.is_null() {
            return Err(ConformanceError::CreateCopyFailed {
                driver: driver.to_string(),
                path: path.to_path_buf(),
                msg: _last_error_msg(),
            });
        }
        Ok(GdalRaster {
            dataset: unsafe { Dataset::from_c_dataset(c_dataset) },
            path: path.to_path_buf(),
        })
    }

    fn delete_dataset(&self, driver: &str, path: &Path) -> Result<()> {
        let gdal_driver = DriverManager::get_driver_by_name(driver).map_err(|_| {
            ConformanceError::DriverNotFound {
                name: driver.to_string(),
            }
        })?;
        let c_path = _path_to_c_string(path)?;
        let rv = unsafe { gdal_sys::GDALDeleteDataset(gdal_driver.c_driver(), c_path.as_ptr()) };
        if rv != CPLErr::CE_None {
            return Err(ConformanceError::Backend {
                msg: format!("unable to delete '{}': {}", path.display(), _last_error_msg()),
            });
        }
        Ok(())
    }

    fn parse_spatial_ref(&self, definition: &str) -> Result<SpatialRef> {
        SpatialRef::from_definition(definition).map_err(|err| ConformanceError::InvalidSpatialRef {
            definition: definition.to_string(),
            msg: err.to_string(),
        })
    }

    fn parse_geometry(&self, wkt: &str) -> Result<Geometry> {
        Geometry::from_wkt(wkt).map_err(|err| ConformanceError::InvalidWkt {
            wkt: wkt.to_string(),
            msg: err.to_string(),
        })
    }

    fn config_option(&self, key: &str) -> Option<String> {
        ::gdal::config::get_thread_local_config_option(key, "")
            .ok()
            .filter(|value| !value.is_empty())
    }

    fn set_config_option(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => ::gdal::config::set_thread_local_config_option(key, value)?,
            None => ::gdal::config::clear_thread_local_config_option(key)?,
        }
        Ok(())
    }
}

/// A raster dataset opened through GDAL.
#[derive(Debug)]
pub struct GdalRaster {
    dataset: Dataset,
    path: PathBuf,
}

impl GdalRaster {
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    fn rasterband(&self, band: usize) -> Result<::gdal::raster::RasterBand<'_>> {
        let count = self.dataset.raster_count();
        if band == 0 || band > count {
            return Err(ConformanceError::BandOutOfRange { band, count });
        }
        Ok(self.dataset.rasterband(band)?)
    }
}

impl RasterSource for GdalRaster {
    fn description(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn driver_short_name(&self) -> String {
        self.dataset.driver().short_name()
    }

    fn raster_size(&self) -> (usize, usize) {
        self.dataset.raster_size()
    }

    fn raster_count(&self) -> usize {
        self.dataset.raster_count()
    }

    fn geo_transform(&self) -> Option<GeoTransform> {
        self.dataset.geo_transform().ok()
    }

    fn projection(&self) -> String {
        self.dataset.projection()
    }

    fn metadata_item(&self, key: &str, domain: &str) -> Option<String> {
        self.dataset.metadata_item(key, domain)
    }

    fn band_checksum(&self, band: usize) -> Result<i32> {
        let rb = self.rasterband(band)?;
        let (x_size, y_size) = rb.size();
        let checksum = unsafe {
            gdal_sys::GDALChecksumImage(rb.c_rasterband(), 0, 0, x_size as c_int, y_size as c_int)
        };
        Ok(checksum)
    }

    fn band_type_name(&self, band: usize) -> Result<String> {
        Ok(self.rasterband(band)?.band_type().name())
    }

    fn band_no_data_value(&self, band: usize) -> Result<Option<f64>> {
        Ok(self.rasterband(band)?.no_data_value())
    }

    fn band_statistics(
        &self,
        band: usize,
        approx_ok: bool,
        force: bool,
    ) -> Result<Option<BandStatistics>> {
        let stats = self.rasterband(band)?.get_statistics(force, approx_ok)?;
        Ok(stats.map(|s| BandStatistics {
            min: s.min,
            max: s.max,
            mean: s.mean,
            std_dev: s.std_dev,
        }))
    }

    fn info_report(&self) -> Result<serde_json::Value> {
        let mut args = CslStringList::new();
        args.add_string("-json")?;
        args.add_string("-checksum")?;

        let c_json = unsafe {
            let options = gdal_sys::GDALInfoOptionsNew(args.as_ptr(), ptr::null_mut());
            if options.is_null() {
                return Err(ConformanceError::Backend {
                    msg: format!("GDALInfoOptionsNew failed: {}", _last_error_msg()),
                });
            }
            let c_json = gdal_sys::GDALInfo(self.dataset.c_dataset(), options);
            gdal_sys::GDALInfoOptionsFree(options);
            c_json
        };
        if c_json.is_null() {
            return Err(ConformanceError::Backend {
                msg: format!("GDALInfo failed: {}", _last_error_msg()),
            });
        }
        let json = _string(c_json);
        unsafe { gdal_sys::VSIFree(c_json as *mut c_void) };

        serde_json::from_str(&json).map_err(|err| ConformanceError::Backend {
            msg: format!("GDALInfo returned invalid JSON: {err}"),
        })
    }
}

/// A vector dataset opened through OGR.
#[derive(Debug)]
pub struct GdalVector {
    dataset: Dataset,
    path: PathBuf,
}

impl VectorSource for GdalVector {
    type Geometry = Geometry;
    type Layer<'a> = GdalLayer<'a>;

    fn description(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn driver_short_name(&self) -> String {
        self.dataset.driver().short_name()
    }

    fn layer_count(&self) -> usize {
        self.dataset.layer_count()
    }

    fn layer(&self, index: usize) -> Result<GdalLayer<'_>> {
        Ok(GdalLayer {
            layer: self.dataset.layer(index)?,
        })
    }

    fn layer_by_name(&self, name: &str) -> Result<GdalLayer<'_>> {
        Ok(GdalLayer {
            layer: self.dataset.layer_by_name(name)?,
        })
    }
}

/// An OGR layer, read through its own cursor.
pub struct GdalLayer<'a> {
    layer: Layer<'a>,
}

impl VectorLayer for GdalLayer<'_> {
    type Geometry = Geometry;

    fn name(&self) -> String {
        self.layer.name()
    }

    fn feature_count(&self) -> u64 {
        self.layer.feature_count()
    }

    fn geometry_type_name(&self) -> String {
        unsafe {
            let geom_type = gdal_sys::OGR_L_GetGeomType(self.layer.c_layer());
            _string(gdal_sys::OGRGeometryTypeToName(geom_type))
        }
    }

    fn field_count(&self) -> usize {
        self.layer.defn().fields().count()
    }

    fn extent(&self) -> Result<Extent> {
        let envelope = self.layer.get_extent()?;
        Ok(Extent {
            min_x: envelope.MinX,
            max_x: envelope.MaxX,
            min_y: envelope.MinY,
            max_y: envelope.MaxY,
        })
    }

    fn reset_reading(&mut self) {
        self.layer.reset_feature_reading();
    }

    fn next_feature(&mut self) -> Result<Option<FeatureRecord<Geometry>>> {
        let c_feature = unsafe { gdal_sys::OGR_L_GetNextFeature(self.layer.c_layer()) };
        if c_feature.is_null() {
            return Ok(None);
        }
        let record = unsafe { read_feature(c_feature) };
        unsafe { gdal_sys::OGR_F_Destroy(c_feature) };
        Ok(Some(record))
    }
}

/// Copy the fields and geometry of an OGR feature.
///
/// # Safety
/// `c_feature` must be a valid feature handle.
unsafe fn read_feature(c_feature: OGRFeatureH) -> FeatureRecord<Geometry> {
    let fid = gdal_sys::OGR_F_GetFID(c_feature);
    let field_count = gdal_sys::OGR_F_GetFieldCount(c_feature);

    let mut fields = Vec::with_capacity(field_count.max(0) as usize);
    let mut texts = Vec::with_capacity(field_count.max(0) as usize);
    for i in 0..field_count {
        let c_field_defn = gdal_sys::OGR_F_GetFieldDefnRef(c_feature, i);
        let name = _string(gdal_sys::OGR_Fld_GetNameRef(c_field_defn));
        let value = if gdal_sys::OGR_F_IsFieldSetAndNotNull(c_feature, i) == 0 {
            FieldValue::Null
        } else {
            // OGR honours the declared width and precision here.
            texts.push((name.clone(), _string(gdal_sys::OGR_F_GetFieldAsString(c_feature, i))));
            read_field(c_feature, i, gdal_sys::OGR_Fld_GetType(c_field_defn))
        };
        fields.push((name, value));
    }

    let c_geometry = gdal_sys::OGR_F_GetGeometryRef(c_feature);
    let geometry = if c_geometry.is_null() {
        None
    } else {
        Some(Geometry::with_c_geometry(gdal_sys::OGR_G_Clone(c_geometry), true))
    };

    FeatureRecord {
        fid: u64::try_from(fid).ok(),
        fields,
        geometry,
        texts,
    }
}

unsafe fn read_field(c_feature: OGRFeatureH, i: c_int, field_type: OGRFieldType::Type) -> FieldValue {
    match field_type {
        OGRFieldType::OFTInteger | OGRFieldType::OFTInteger64 => {
            FieldValue::Integer(gdal_sys::OGR_F_GetFieldAsInteger64(c_feature, i))
        }
        OGRFieldType::OFTReal => FieldValue::Real(gdal_sys::OGR_F_GetFieldAsDouble(c_feature, i)),
        OGRFieldType::OFTIntegerList | OGRFieldType::OFTInteger64List => {
            let mut len: c_int = 0;
            let ptr = gdal_sys::OGR_F_GetFieldAsInteger64List(c_feature, i, &mut len);
            let values = if ptr.is_null() {
                Vec::new()
            } else {
                std::slice::from_raw_parts(ptr, len as usize).to_vec()
            };
            FieldValue::IntegerList(values)
        }
        OGRFieldType::OFTRealList => {
            let mut len: c_int = 0;
            let ptr = gdal_sys::OGR_F_GetFieldAsDoubleList(c_feature, i, &mut len);
            let values = if ptr.is_null() {
                Vec::new()
            } else {
                std::slice::from_raw_parts(ptr, len as usize).to_vec()
            };
            FieldValue::RealList(values)
        }
        OGRFieldType::OFTStringList => {
            let list = gdal_sys::OGR_F_GetFieldAsStringList(c_feature, i);
            let mut values = Vec::new();
            if !list.is_null() {
                let mut j = 0;
                while !(*list.add(j)).is_null() {
                    values.push(_string(*list.add(j)));
                    j += 1;
                }
            }
            FieldValue::StringList(values)
        }
        OGRFieldType::OFTDate | OGRFieldType::OFTDateTime => {
            let (mut year, mut month, mut day) = (0, 0, 0);
            let (mut hour, mut minute, mut tz_flag) = (0, 0, 0);
            let mut second: f32 = 0.0;
            let ok = gdal_sys::OGR_F_GetFieldAsDateTimeEx(
                c_feature,
                i,
                &mut year,
                &mut month,
                &mut day,
                &mut hour,
                &mut minute,
                &mut second,
                &mut tz_flag,
            );
            let date = NaiveDate::from_ymd_opt(year, month as u32, day as u32);
            match (ok, date) {
                (0, _) | (_, None) => FieldValue::String(_string(
                    gdal_sys::OGR_F_GetFieldAsString(c_feature, i),
                )),
                (_, Some(date)) if field_type == OGRFieldType::OFTDate => FieldValue::Date(date),
                (_, Some(date)) => {
                    let millis = ((second.fract()) * 1000.0).round() as u32;
                    match date.and_hms_milli_opt(
                        hour as u32,
                        minute as u32,
                        second.trunc() as u32,
                        millis,
                    ) {
                        Some(datetime) => FieldValue::DateTime(datetime, tz_flag),
                        None => FieldValue::String(_string(gdal_sys::OGR_F_GetFieldAsString(
                            c_feature, i,
                        ))),
                    }
                }
            }
        }
        _ => FieldValue::String(_string(gdal_sys::OGR_F_GetFieldAsString(c_feature, i))),
    }
}

impl IntoGeometryNode for Geometry {
    fn to_geometry_node(&self) -> GeometryNode {
        let name = self.geometry_name();
        let count = self.geometry_count();
        if count > 0 {
            let children = (0..count)
                .map(|i| self.get_geometry(i).to_geometry_node())
                .collect();
            return GeometryNode::branch(&name, children);
        }
        let points = (0..self.point_count())
            .map(|i| self.get_point(i as i32))
            .collect();
        GeometryNode::leaf(&name, points)
    }
}

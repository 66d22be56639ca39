//! Conformance checks for vector drivers.
//!
//! Layers borrow the dataset held by the harness, so they are fetched from
//! [`VectorHarness::dataset`] and handed back to the layer checks:
//!
//! ```
//! use gdal_conformance::backend::memory::MemoryBackend;
//! use gdal_conformance::backend::VectorSource;
//! use gdal_conformance::driver::DriverDescriptor;
//! use gdal_conformance::test_utils::create_poly_layer;
//! use gdal_conformance::vector::VectorHarness;
//!
//! let backend = MemoryBackend::new();
//! create_poly_layer(&backend, "/vsimem/doc_poly.mem").unwrap();
//!
//! let mut harness = VectorHarness::new(backend, DriverDescriptor::new("MEM", "mem"));
//! harness.check_open("/vsimem/doc_poly.mem", true, false).unwrap();
//! let mut layer = harness.dataset().unwrap().layer(0).unwrap();
//! harness
//!     .check_features_against_list(&mut layer, "eas_id", &[168_i64.into(), 179_i64.into(), 171_i64.into(), 173_i64.into()])
//!     .unwrap();
//! ```

use std::path::{Path, PathBuf};

use crate::backend::{Backend, FeatureRecord, FieldValue, VectorLayer, VectorSource};
use crate::driver::{DriverCheck, DriverDescriptor};
use crate::errors::{ConformanceError, Result};
use crate::geometry::compare_geometry;
use crate::scratch::is_virtual_path;
use crate::tolerance::{almost_equal, ToleranceConfig};

mod expectation;

pub use expectation::{Expected, GeometryExpectation, LayerExpectation, OgrDateTime};

/// Checks a driver's vector datasets against literal expectations.
pub struct VectorHarness<B: Backend> {
    backend: B,
    driver: DriverDescriptor,
    tolerance: ToleranceConfig,
    dataset: Option<(PathBuf, B::Vector)>,
}

impl<B: Backend> VectorHarness<B> {
    pub fn new(backend: B, driver: DriverDescriptor) -> Self {
        Self {
            backend,
            driver,
            tolerance: ToleranceConfig::default(),
            dataset: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: ToleranceConfig) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn driver(&self) -> &DriverDescriptor {
        &self.driver
    }

    /// The dataset opened by the last [`check_open`](Self::check_open).
    pub fn dataset(&self) -> Result<&B::Vector> {
        self.dataset
            .as_ref()
            .map(|(_, ds)| ds)
            .ok_or(ConformanceError::NoOpenDataset)
    }

    /// Drop the held dataset, flushing whatever it buffered.
    pub fn release(&mut self) {
        if let Some((path, _)) = self.dataset.take() {
            log::debug!("released {}", path.display());
        }
    }

    pub fn check_driver(&self) -> Result<()> {
        let expected = &self.driver.name;
        let actual = self.dataset()?.driver_short_name();
        if *expected != actual {
            return Err(ConformanceError::DriverMismatch {
                expected: expected.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Open `path`, read-only unless `update`, and hold it.
    ///
    /// `check` selects the driver that must have opened it, as for
    /// [`RasterHarness::check_open`](crate::raster::RasterHarness::check_open).
    pub fn check_open<P, C>(&mut self, path: P, check: C, update: bool) -> Result<&B::Vector>
    where
        P: AsRef<Path>,
        C: Into<DriverCheck>,
    {
        let path = path.as_ref();
        if path.is_absolute() && !is_virtual_path(path) && !path.exists() {
            return Err(ConformanceError::MissingFixture {
                path: path.to_path_buf(),
            });
        }

        log::debug!("opening vector {} (update: {update})", path.display());
        let dataset = self.backend.open_vector(path, update)?;
        let check = check.into();
        let (_, dataset) = self.dataset.insert((path.to_path_buf(), dataset));
        if let Some(expected) = check.expected(&self.driver.name) {
            let actual = dataset.driver_short_name();
            if expected != actual {
                return Err(ConformanceError::DriverMismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        Ok(&*dataset)
    }

    /// Name, feature count, geometry type, field count and bounding box of `layer`.
    ///
    /// Bounding box corners are compared to [`ToleranceConfig::bbox_places`] decimal
    /// places.
    pub fn check_layer<L: VectorLayer>(&self, layer: &L, expected: &LayerExpectation) -> Result<()> {
        let name = layer.name();
        let mismatch = |attribute: &'static str, expected: String, actual: String| {
            ConformanceError::LayerMismatch {
                layer: name.clone(),
                attribute,
                expected,
                actual,
            }
        };

        if name != expected.name {
            return Err(mismatch("name", expected.name.clone(), name.clone()));
        }
        let feature_count = layer.feature_count();
        if feature_count != expected.feature_count {
            return Err(mismatch(
                "feature count",
                expected.feature_count.to_string(),
                feature_count.to_string(),
            ));
        }
        let geometry_type = layer.geometry_type_name();
        if geometry_type != expected.geometry_type {
            return Err(mismatch(
                "geometry type",
                expected.geometry_type.clone(),
                geometry_type,
            ));
        }
        let field_count = layer.field_count();
        if field_count != expected.field_count {
            return Err(mismatch(
                "field count",
                expected.field_count.to_string(),
                field_count.to_string(),
            ));
        }

        let extent = layer.extent()?;
        let places = self.tolerance.bbox_places;
        let matches = extent
            .as_array()
            .iter()
            .zip(expected.bbox.as_array())
            .all(|(a, e)| almost_equal(*a, e, places));
        if !matches {
            return Err(mismatch(
                "extent",
                format!("{:?}", expected.bbox.as_array()),
                format!("{:?}", extent.as_array()),
            ));
        }
        Ok(())
    }

    /// Read `layer` from the start and compare `field` of each feature, in order,
    /// with `expected`.
    ///
    /// The layer must hold exactly `expected.len()` features.
    pub fn check_features_against_list<L: VectorLayer>(
        &self,
        layer: &mut L,
        field: &str,
        expected: &[Expected],
    ) -> Result<()> {
        layer.reset_reading();
        for (index, expected_value) in expected.iter().enumerate() {
            let feature = layer
                .next_feature()?
                .ok_or(ConformanceError::FewerFeatures {
                    expected: expected.len(),
                    actual: index,
                })?;
            let value = feature
                .field(field)
                .ok_or_else(|| ConformanceError::MissingField {
                    index,
                    field: field.to_string(),
                })?;
            let matched = match expected_value {
                Expected::Text(text) => {
                    !matches!(value, FieldValue::Null)
                        && feature.field_text(field).as_deref() == Some(text.as_str())
                }
                _ => expected_value.matches(value),
            };
            if !matched {
                return Err(ConformanceError::FieldValueMismatch {
                    index,
                    field: field.to_string(),
                    expected: expected_value.to_string(),
                    actual: format!("{value:?}"),
                });
            }
        }
        if layer.next_feature()?.is_some() {
            return Err(ConformanceError::MoreFeatures {
                expected: expected.len(),
            });
        }
        Ok(())
    }

    /// Compare the geometry of `feature` structurally with `expected`.
    ///
    /// `max_error` defaults to [`ToleranceConfig::geometry_max_error`].
    pub fn check_feature_geometry<'g, E>(
        &self,
        feature: &FeatureRecord<B::Geometry>,
        expected: E,
        max_error: Option<f64>,
    ) -> Result<()>
    where
        E: Into<GeometryExpectation<'g, B::Geometry>>,
        B::Geometry: 'g,
    {
        let expected = match expected.into() {
            GeometryExpectation::Wkt(wkt) => Some(self.backend.parse_geometry(wkt)?),
            GeometryExpectation::Geometry(geometry) => Some(geometry.clone()),
            GeometryExpectation::None => None,
        };
        let max_error = max_error.unwrap_or(self.tolerance.geometry_max_error);
        compare_geometry(feature.geometry.as_ref(), expected.as_ref(), max_error)
    }
}

#[cfg(test)]
mod tests;

//! Conformance checks for raster drivers.
//!
//! A [`RasterHarness`] holds at most one open dataset. [`RasterHarness::check_open`]
//! replaces it, and every other check runs against it.
//!
//! ```
//! use gdal_conformance::backend::memory::{DataType, MemoryBackend};
//! use gdal_conformance::driver::DriverDescriptor;
//! use gdal_conformance::raster::{BandExpectation, RasterHarness};
//!
//! let backend = MemoryBackend::new();
//! let mut ds = backend.create("MEM", "/vsimem/doc.mem", (2, 1), 1, DataType::Byte).unwrap();
//! ds.write_band(1, &[1.0, 2.0]).unwrap();
//! drop(ds);
//!
//! let mut harness = RasterHarness::new(backend, DriverDescriptor::new("MEM", "mem"));
//! harness.check_open("/vsimem/doc.mem", true).unwrap();
//! harness.check_band(1, &BandExpectation::new(3).min(1.0).max(2.0)).unwrap();
//! ```

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::backend::{Backend, RasterSource};
use crate::config::HarnessConfig;
use crate::driver::{DriverCheck, DriverDescriptor};
use crate::errors::{ConformanceError, Result};
use crate::geo_transform::compare_geo_transform;
use crate::info::{golden_path, load_golden, InfoComparator};
use crate::scratch::{is_virtual_path, ScratchSpace};
use crate::spatial_ref::check_equivalent;
use crate::tolerance::{almost_equal, places_tolerance, ToleranceConfig};

mod expectation;

pub use expectation::{BandExpectation, CopyChecks, CreateCopyCheck};

/// Checks a driver's raster datasets against literal expectations.
pub struct RasterHarness<B: Backend> {
    backend: B,
    driver: DriverDescriptor,
    tolerance: ToleranceConfig,
    config: HarnessConfig,
    scratch: ScratchSpace,
    dataset: Option<(PathBuf, B::Raster)>,
    /// Datasets written by create-copy checks, with the driver that wrote them.
    copies: Vec<(String, PathBuf)>,
}

impl<B: Backend> RasterHarness<B> {
    /// A harness for `driver`, writing diagnostics where the environment says.
    pub fn new(backend: B, driver: DriverDescriptor) -> Self {
        Self {
            backend,
            driver,
            tolerance: ToleranceConfig::default(),
            config: HarnessConfig::from_env(),
            scratch: ScratchSpace::new(),
            dataset: None,
            copies: Vec::new(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: ToleranceConfig) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn driver(&self) -> &DriverDescriptor {
        &self.driver
    }

    /// The dataset opened by the last [`check_open`](Self::check_open).
    pub fn dataset(&self) -> Result<&B::Raster> {
        self.dataset
            .as_ref()
            .map(|(_, ds)| ds)
            .ok_or(ConformanceError::NoOpenDataset)
    }

    fn opened(&self) -> Result<(&Path, &B::Raster)> {
        self.dataset
            .as_ref()
            .map(|(path, ds)| (path.as_path(), ds))
            .ok_or(ConformanceError::NoOpenDataset)
    }

    /// Drop the held dataset, flushing whatever it buffered.
    pub fn release(&mut self) {
        if let Some((path, _)) = self.dataset.take() {
            log::debug!("released {}", path.display());
        }
    }

    /// The open dataset was produced by the harness's driver.
    pub fn check_driver(&self) -> Result<()> {
        check_driver_name(&self.driver.name, &self.dataset()?.driver_short_name())
    }

    /// Open `path` read-only, letting the backend identify the driver, and hold it.
    ///
    /// `check` is `true` to require the harness's driver, `false` to accept any, or
    /// the short name of the driver that must have opened it.
    pub fn check_open<P, C>(&mut self, path: P, check: C) -> Result<&B::Raster>
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

        log::debug!("opening raster {}", path.display());
        let dataset = self.backend.open_raster(path)?;
        let check = check.into();
        let (_, dataset) = self.dataset.insert((path.to_path_buf(), dataset));
        if let Some(expected) = check.expected(&self.driver.name) {
            check_driver_name(expected, &dataset.driver_short_name())?;
        }
        Ok(&*dataset)
    }

    pub fn check_raster_count(&self, expected: usize) -> Result<()> {
        let (path, ds) = self.opened()?;
        let actual = ds.raster_count();
        if actual != expected {
            return Err(ConformanceError::RasterCountMismatch {
                path: path.to_path_buf(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    pub fn check_size(&self, expected: (usize, usize)) -> Result<()> {
        let (path, ds) = self.opened()?;
        let actual = ds.raster_size();
        if actual != expected {
            return Err(ConformanceError::RasterSizeMismatch {
                path: path.to_path_buf(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Compare the geotransform component-wise.
    ///
    /// Without an explicit `tolerance`, the one configured or derived from the
    /// expected resolution is used. Passing [`DEFAULT_GEO_TRANSFORM`] expects the
    /// dataset to have no geotransform.
    ///
    /// [`DEFAULT_GEO_TRANSFORM`]: crate::geo_transform::DEFAULT_GEO_TRANSFORM
    pub fn check_geo_transform(&self, expected: &[f64], tolerance: Option<f64>) -> Result<()> {
        let ds = self.dataset()?;
        compare_geo_transform(Some(expected), ds.geo_transform(), tolerance, &self.tolerance)
    }

    /// The dataset's CRS is semantically the one described by `expected`.
    pub fn check_projection(&self, expected: &str) -> Result<()> {
        let ds = self.dataset()?;
        check_equivalent(&self.backend, expected, &ds.projection())
    }

    pub fn check_band(&self, band: usize, expected: &BandExpectation) -> Result<()> {
        let (path, ds) = self.opened()?;
        verify_band(ds, path, band, expected, &self.tolerance)
    }

    pub fn check_metadata_item(&self, key: &str, domain: &str, expected: Option<&str>) -> Result<()> {
        let actual = self.dataset()?.metadata_item(key, domain);
        if actual.as_deref() != expected {
            return Err(ConformanceError::MetadataMismatch {
                key: key.to_string(),
                expected: expected.map(str::to_string),
                actual,
            });
        }
        Ok(())
    }

    /// Copy the open dataset through the driver, reopen the copy and compare it to
    /// the source.
    ///
    /// The write handle is dropped before the copy is reopened, so drivers that only
    /// persist on close are verified on what they persisted. The reopened copy is
    /// returned. The copy is deleted through its driver when the harness is dropped.
    pub fn check_create_copy(&mut self, check: &CreateCopyCheck) -> Result<B::Raster> {
        let target = check.driver.as_ref().unwrap_or(&self.driver);
        let driver = target.name.as_str();
        let (src_path, src) = self
            .dataset
            .as_ref()
            .map(|(path, ds)| (path.as_path(), ds))
            .ok_or(ConformanceError::NoOpenDataset)?;

        let stem = src_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "copy".to_string());
        let path = self
            .scratch
            .path(&stem, &target.extension, check.in_memory)?;

        let mut expected = Vec::with_capacity(src.raster_count());
        for band in 1..=src.raster_count() {
            let checksum = match check.checksums.get(band - 1) {
                Some(checksum) => *checksum,
                None => src.band_checksum(band)?,
            };
            let mut expectation = BandExpectation::new(checksum);
            if check.checks.contains(CopyChecks::STATISTICS) {
                let min_max = match check.min_max.get(band - 1) {
                    Some(min_max) => Some(*min_max),
                    None => src
                        .band_statistics(band, false, true)?
                        .map(|stats| (stats.min, stats.max)),
                };
                if let Some((min, max)) = min_max {
                    expectation = expectation.min(min).max(max);
                }
            }
            expected.push(expectation);
        }

        log::debug!(
            "create-copy {} -> {} through {driver}",
            src_path.display(),
            path.display()
        );
        let written =
            self.backend
                .create_copy(driver, &path, src, check.strict, &check.creation_options)?;
        drop(written);
        self.copies.push((driver.to_string(), path.clone()));
        let copy = self.backend.open_raster(&path)?;

        if copy.raster_count() != expected.len() {
            return Err(ConformanceError::RasterCountMismatch {
                path,
                expected: expected.len(),
                actual: copy.raster_count(),
            });
        }
        for (i, expectation) in expected.iter().enumerate() {
            verify_band(&copy, &path, i + 1, expectation, &self.tolerance)?;
        }

        if check.checks.contains(CopyChecks::GEO_TRANSFORM) {
            let src_gt = src.geo_transform();
            compare_geo_transform(
                src_gt.as_ref().map(|gt| &gt[..]),
                copy.geo_transform(),
                None,
                &self.tolerance,
            )?;
        }
        if check.checks.contains(CopyChecks::PROJECTION) {
            check_equivalent(&self.backend, &src.projection(), &copy.projection())?;
        }
        if check.checks.contains(CopyChecks::METADATA) {
            for key in &check.metadata_keys {
                let expected = src.metadata_item(key, "");
                let actual = copy.metadata_item(key, "");
                if expected != actual {
                    return Err(ConformanceError::MetadataMismatch {
                        key: key.clone(),
                        expected,
                        actual,
                    });
                }
            }
        }
        Ok(copy)
    }

    /// Compare the structured info report with the golden file next to the opened
    /// fixture (`<fixture>.json`).
    pub fn check_info(&self) -> Result<()> {
        let (path, _) = self.opened()?;
        self.check_info_against(golden_path(path))
    }

    pub fn check_info_against<P: AsRef<Path>>(&self, golden: P) -> Result<()> {
        let golden = load_golden(golden)?;
        self.check_info_value(&golden)
    }

    /// Compare the structured info report with an in-memory golden value.
    pub fn check_info_value(&self, golden: &Value) -> Result<()> {
        let (path, ds) = self.opened()?;
        let live = ds.info_report()?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        InfoComparator::new(&self.backend, &self.tolerance, &self.config).compare(&live, golden, &name)
    }
}

impl<B: Backend> Drop for RasterHarness<B> {
    fn drop(&mut self) {
        self.release();
        for (driver, path) in self.copies.drain(..).rev() {
            match self.backend.delete_dataset(&driver, &path) {
                Ok(()) => log::debug!("deleted copy {}", path.display()),
                Err(err) => log::warn!("unable to delete copy {}: {err}", path.display()),
            }
        }
    }
}

fn check_driver_name(expected: &str, actual: &str) -> Result<()> {
    if expected != actual {
        return Err(ConformanceError::DriverMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

#[allow(clippy::float_cmp)]
fn same_value(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn verify_band<R: RasterSource>(
    ds: &R,
    path: &Path,
    band: usize,
    expected: &BandExpectation,
    tolerance: &ToleranceConfig,
) -> Result<()> {
    let count = ds.raster_count();
    if band == 0 || band > count {
        return Err(ConformanceError::BandOutOfRange { band, count });
    }

    let checksum = ds.band_checksum(band)?;
    if checksum != expected.checksum {
        return Err(ConformanceError::ChecksumMismatch {
            path: path.to_path_buf(),
            band,
            expected: expected.checksum,
            actual: checksum,
        });
    }

    if let Some(data_type) = &expected.data_type {
        let actual = ds.band_type_name(band)?;
        if !actual.eq_ignore_ascii_case(data_type) {
            return Err(ConformanceError::BandTypeMismatch {
                band,
                expected: data_type.clone(),
                actual,
            });
        }
    }

    if let Some(nodata) = expected.nodata {
        let actual = ds.band_no_data_value(band)?;
        if !actual.is_some_and(|actual| same_value(actual, nodata)) {
            return Err(ConformanceError::NoDataMismatch {
                band,
                expected: Some(nodata),
                actual,
            });
        }
    }

    if expected.wants_statistics() {
        let stats = ds
            .band_statistics(band, false, true)?
            .ok_or(ConformanceError::StatisticsUnavailable { band })?;
        let places = tolerance.statistics_places;
        for (statistic, expected, actual) in [("min", expected.min, stats.min), ("max", expected.max, stats.max)] {
            if let Some(expected) = expected {
                if !almost_equal(actual, expected, places) {
                    return Err(ConformanceError::StatisticMismatch {
                        band,
                        statistic,
                        expected,
                        actual,
                        tolerance: places_tolerance(places),
                    });
                }
            }
        }
    }
    Ok(())
}

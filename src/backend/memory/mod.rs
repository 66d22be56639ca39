//! In-process driver registry, modelled on GDAL's `MEM` driver and `/vsimem/`.
//!
//! Datasets live in a path-keyed store shared by every clone of a [`MemoryBackend`].
//! A handle opened for writing buffers its changes and only publishes them to the
//! store when it is dropped (or [`MemRaster::flush`]ed), so a path must be reopened
//! after the write handle is released to observe what was written.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use bitflags::bitflags;
use geo_types::Geometry;

use crate::backend::Backend;
use crate::errors::{ConformanceError, Result};
use crate::geometry::geometry_from_wkt;
use crate::spatial_ref::SpatialRefIdentity;

mod raster;
mod vector;

pub use raster::{checksum, BandData, DataType, MemRaster, RasterData};
pub use vector::{FieldDefn, FieldType, LayerData, MemLayer, MemVector, VectorData};

bitflags! {
    /// What a registered driver can do.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DriverCapabilities: u32 {
        const RASTER = 0x01;
        const VECTOR = 0x02;
        const CREATE = 0x04;
        const CREATE_COPY = 0x08;
        const GEOREFERENCING = 0x10;
        const METADATA = 0x20;
    }
}

/// A driver registered with a [`MemoryBackend`].
#[derive(Clone, Debug, PartialEq)]
pub struct MemDriver {
    pub short_name: String,
    pub long_name: String,
    pub capabilities: DriverCapabilities,
}

impl MemDriver {
    pub fn new(short_name: &str, long_name: &str, capabilities: DriverCapabilities) -> Self {
        Self {
            short_name: short_name.to_string(),
            long_name: long_name.to_string(),
            capabilities,
        }
    }

    fn require(&self, capabilities: DriverCapabilities, operation: &'static str) -> Result<()> {
        if self.capabilities.contains(capabilities) {
            Ok(())
        } else {
            Err(ConformanceError::UnsupportedOperation {
                driver: self.short_name.clone(),
                operation,
            })
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum StoredDataset {
    Raster(RasterData),
    Vector(VectorData),
}

#[derive(Debug, Default)]
struct Registry {
    drivers: BTreeMap<String, MemDriver>,
    files: BTreeMap<PathBuf, StoredDataset>,
    config: BTreeMap<String, String>,
}

/// Handle to a shared in-memory driver registry and dataset store.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    registry: Rc<RefCell<Registry>>,
}

impl Debug for MemoryBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        f.debug_struct("MemoryBackend")
            .field("drivers", &registry.drivers.keys().collect::<Vec<_>>())
            .field("files", &registry.files.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MemoryBackend {
    /// A registry with the `MEM` driver, which can do everything.
    pub fn new() -> Self {
        let backend = Self::empty();
        backend.register_driver(MemDriver::new(
            "MEM",
            "In Memory raster, vector and multidimensional raster",
            DriverCapabilities::all(),
        ));
        backend
    }

    /// A registry without any driver.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn register_driver(&self, driver: MemDriver) {
        log::debug!("registering in-memory driver {}", driver.short_name);
        self.registry
            .borrow_mut()
            .drivers
            .insert(driver.short_name.clone(), driver);
    }

    pub fn deregister_driver(&self, name: &str) -> Option<MemDriver> {
        self.registry.borrow_mut().drivers.remove(name)
    }

    pub fn driver(&self, name: &str) -> Result<MemDriver> {
        self.registry
            .borrow()
            .drivers
            .get(name)
            .cloned()
            .ok_or_else(|| ConformanceError::DriverNotFound {
                name: name.to_string(),
            })
    }

    /// `true` if something has been published at `path`.
    pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        self.registry.borrow().files.contains_key(path.as_ref())
    }

    /// Create an empty raster dataset. Pixels start at zero.
    pub fn create<P: AsRef<Path>>(
        &self,
        driver: &str,
        path: P,
        size: (usize, usize),
        band_count: usize,
        data_type: DataType,
    ) -> Result<MemRaster> {
        let driver = self.driver(driver)?;
        driver.require(
            DriverCapabilities::RASTER | DriverCapabilities::CREATE,
            "raster creation",
        )?;
        let data = RasterData {
            driver: driver.short_name,
            size,
            bands: (0..band_count)
                .map(|_| BandData::new(data_type, size.0 * size.1))
                .collect(),
            ..RasterData::default()
        };
        Ok(MemRaster::new(self.clone(), path.as_ref(), data, true, true))
    }

    /// Open a raster dataset for update.
    pub fn open_update<P: AsRef<Path>>(&self, path: P) -> Result<MemRaster> {
        let path = path.as_ref();
        let data = self.load_raster(path)?;
        Ok(MemRaster::new(self.clone(), path, data, true, false))
    }

    /// Create an empty vector dataset.
    pub fn create_vector<P: AsRef<Path>>(&self, driver: &str, path: P) -> Result<MemVector> {
        let driver = self.driver(driver)?;
        driver.require(
            DriverCapabilities::VECTOR | DriverCapabilities::CREATE,
            "vector creation",
        )?;
        let data = VectorData {
            driver: driver.short_name,
            layers: Vec::new(),
        };
        Ok(MemVector::new(self.clone(), path.as_ref(), data, true, true))
    }

    fn long_name(&self, driver: &str) -> String {
        self.driver(driver)
            .map(|d| d.long_name)
            .unwrap_or_default()
    }

    fn publish(&self, path: &Path, dataset: StoredDataset) {
        log::debug!("publishing {}", path.display());
        self.registry
            .borrow_mut()
            .files
            .insert(path.to_path_buf(), dataset);
    }

    fn load(&self, path: &Path) -> Result<StoredDataset> {
        let registry = self.registry.borrow();
        let dataset = registry
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| ConformanceError::OpenFailed {
                path: path.to_path_buf(),
                msg: "no such file in the in-memory store".to_string(),
            })?;
        let driver = match &dataset {
            StoredDataset::Raster(data) => &data.driver,
            StoredDataset::Vector(data) => &data.driver,
        };
        if !registry.drivers.contains_key(driver) {
            return Err(ConformanceError::OpenFailed {
                path: path.to_path_buf(),
                msg: "not recognized as being in a supported file format".to_string(),
            });
        }
        Ok(dataset)
    }

    fn load_raster(&self, path: &Path) -> Result<RasterData> {
        match self.load(path)? {
            StoredDataset::Raster(data) => Ok(data),
            StoredDataset::Vector(_) => Err(ConformanceError::OpenFailed {
                path: path.to_path_buf(),
                msg: "not recognized as a supported raster dataset".to_string(),
            }),
        }
    }
}

impl Backend for MemoryBackend {
    type Raster = MemRaster;
    type Vector = MemVector;
    type SpatialRef = SpatialRefIdentity;
    type Geometry = Geometry<f64>;

    fn driver_available(&self, name: &str) -> bool {
        self.registry.borrow().drivers.contains_key(name)
    }

    fn open_raster(&self, path: &Path) -> Result<MemRaster> {
        let data = self.load_raster(path)?;
        Ok(MemRaster::new(self.clone(), path, data, false, false))
    }

    fn open_vector(&self, path: &Path, update: bool) -> Result<MemVector> {
        match self.load(path)? {
            StoredDataset::Vector(data) => Ok(MemVector::new(self.clone(), path, data, update, false)),
            StoredDataset::Raster(_) => Err(ConformanceError::OpenFailed {
                path: path.to_path_buf(),
                msg: "not recognized as a supported vector dataset".to_string(),
            }),
        }
    }

    fn create_copy(
        &self,
        driver: &str,
        path: &Path,
        source: &MemRaster,
        strict: bool,
        options: &[(String, String)],
    ) -> Result<MemRaster> {
        let driver = self.driver(driver)?;
        driver.require(
            DriverCapabilities::RASTER | DriverCapabilities::CREATE_COPY,
            "create-copy",
        )?;

        let mut data = source.data().clone();
        data.driver = driver.short_name.clone();

        let georeferenced = data.geo_transform.is_some() || !data.projection.is_empty();
        if georeferenced && !driver.capabilities.contains(DriverCapabilities::GEOREFERENCING) {
            if strict {
                return Err(ConformanceError::CreateCopyFailed {
                    driver: driver.short_name,
                    path: path.to_path_buf(),
                    msg: "driver does not support georeferencing".to_string(),
                });
            }
            log::debug!(
                "{} drops georeferencing of {}",
                driver.short_name,
                source.path().display()
            );
            data.geo_transform = None;
            data.projection.clear();
        }
        if !driver.capabilities.contains(DriverCapabilities::METADATA) {
            data.metadata.clear();
        }
        for (key, value) in options {
            data.metadata
                .entry("IMAGE_STRUCTURE".to_string())
                .or_default()
                .insert(key.to_ascii_uppercase(), value.clone());
        }

        Ok(MemRaster::new(self.clone(), path, data, true, true))
    }

    fn delete_dataset(&self, driver: &str, path: &Path) -> Result<()> {
        self.driver(driver)?;
        match self.registry.borrow_mut().files.remove(path) {
            Some(_) => Ok(()),
            None => Err(ConformanceError::Backend {
                msg: format!("unable to delete '{}': no such file", path.display()),
            }),
        }
    }

    fn parse_spatial_ref(&self, definition: &str) -> Result<SpatialRefIdentity> {
        SpatialRefIdentity::from_definition(definition)
    }

    fn parse_geometry(&self, wkt: &str) -> Result<Geometry<f64>> {
        geometry_from_wkt(wkt)
    }

    fn config_option(&self, key: &str) -> Option<String> {
        self.registry.borrow().config.get(key).cloned()
    }

    fn set_config_option(&self, key: &str, value: Option<&str>) -> Result<()> {
        let mut registry = self.registry.borrow_mut();
        match value {
            Some(value) => {
                registry.config.insert(key.to_string(), value.to_string());
            }
            None => {
                registry.config.remove(key);
            }
        }
        Ok(())
    }
}

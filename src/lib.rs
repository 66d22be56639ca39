//! Conformance harness for [GDAL](http://gdal.org/) raster and vector drivers.
//!
//! A driver's test suite opens its fixtures through a [`RasterHarness`] or a
//! [`VectorHarness`] and asserts, check by check, that the driver reads what the
//! fixture is known to contain. Every failed check is a [`ConformanceError`]
//! carrying the expected and the actual value.
//!
//! The harnesses are generic over a [`Backend`](backend::Backend). The in-memory
//! backend is always available; the `gdal` feature adds one backed by the GDAL
//! library itself.
//!
//! ## Use
//!
//! ```
//! use gdal_conformance::backend::memory::MemoryBackend;
//! use gdal_conformance::raster::BandExpectation;
//! use gdal_conformance::test_utils::{create_byte_raster, BYTE_CHECKSUM, BYTE_GEO_TRANSFORM};
//! use gdal_conformance::{DriverDescriptor, RasterHarness};
//!
//! let backend = MemoryBackend::new();
//! create_byte_raster(&backend, "/vsimem/byte.mem").unwrap();
//!
//! let mut harness = RasterHarness::new(backend, DriverDescriptor::new("MEM", "mem"));
//! harness.check_open("/vsimem/byte.mem", true).unwrap();
//! harness.check_size((20, 20)).unwrap();
//! harness.check_geo_transform(&BYTE_GEO_TRANSFORM, None).unwrap();
//! harness
//!     .check_band(1, &BandExpectation::new(BYTE_CHECKSUM).data_type("Byte").min(91.0).max(224.0))
//!     .unwrap();
//! ```

#![crate_type = "lib"]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backend;
pub mod config;
pub mod driver;
pub mod errors;
pub mod geo_transform;
pub mod geometry;
pub mod info;
pub mod raster;
pub mod scratch;
pub mod spatial_ref;
pub mod test_utils;
pub mod tolerance;
pub mod vector;

pub use driver::DriverDescriptor;
pub use errors::{ConformanceError, Result};
pub use raster::RasterHarness;
pub use tolerance::ToleranceConfig;
pub use vector::VectorHarness;

#[cfg(feature = "gdal")]
#[cfg_attr(docsrs, doc(cfg(feature = "gdal")))]
pub use backend::gdal::GdalBackend;

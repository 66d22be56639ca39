use bitflags::bitflags;

use crate::driver::DriverDescriptor;

/// What a single band is expected to look like.
///
/// ```
/// use gdal_conformance::raster::BandExpectation;
///
/// let expectation = BandExpectation::new(4672).data_type("Byte").min(74.0).max(255.0);
/// assert_eq!(expectation.checksum, 4672);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct BandExpectation {
    pub checksum: i32,
    pub data_type: Option<String>,
    pub nodata: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl BandExpectation {
    pub fn new(checksum: i32) -> Self {
        Self {
            checksum,
            data_type: None,
            nodata: None,
            min: None,
            max: None,
        }
    }

    pub fn data_type(mut self, data_type: &str) -> Self {
        self.data_type = Some(data_type.to_string());
        self
    }

    pub fn nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub(crate) fn wants_statistics(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

bitflags! {
    /// Optional comparisons made between a source dataset and its copy.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct CopyChecks: u32 {
        /// Band minimum and maximum.
        const STATISTICS = 0x01;
        const GEO_TRANSFORM = 0x02;
        const PROJECTION = 0x04;
        /// The items named in [`CreateCopyCheck::metadata_keys`].
        const METADATA = 0x08;
    }
}

/// Parameters of a create-copy round trip.
///
/// Per-band overrides are indexed from band 1; bands without an override are
/// compared against the source dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct CreateCopyCheck {
    /// Write the copy under `/vsimem/` instead of a temporary directory.
    pub in_memory: bool,
    pub strict: bool,
    pub creation_options: Vec<(String, String)>,
    pub checksums: Vec<i32>,
    /// `(min, max)` per band.
    pub min_max: Vec<(f64, f64)>,
    pub checks: CopyChecks,
    /// Items of the default metadata domain compared when [`CopyChecks::METADATA`] is set.
    pub metadata_keys: Vec<String>,
    /// Copy through this driver, named with its extension, rather than the
    /// harness's own.
    pub driver: Option<DriverDescriptor>,
}

impl Default for CreateCopyCheck {
    fn default() -> Self {
        Self {
            in_memory: false,
            strict: true,
            creation_options: Vec::new(),
            checksums: Vec::new(),
            min_max: Vec::new(),
            checks: CopyChecks::STATISTICS,
            metadata_keys: Vec::new(),
            driver: None,
        }
    }
}

impl CreateCopyCheck {
    pub fn creation_option(mut self, key: &str, value: &str) -> Self {
        self.creation_options
            .push((key.to_string(), value.to_string()));
        self
    }
}

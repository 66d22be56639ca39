//! Driver descriptors, driver identity checks and skipping tests whose drivers
//! are not built in.

use crate::backend::Backend;

/// The driver a harness targets, and the extension of files it writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverDescriptor {
    pub name: String,
    pub extension: String,
}

impl DriverDescriptor {
    pub fn new(name: &str, extension: &str) -> Self {
        Self {
            name: name.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// `stem` with this driver's extension appended.
    pub fn file_name(&self, stem: &str) -> String {
        if self.extension.is_empty() {
            stem.to_string()
        } else {
            format!("{stem}.{}", self.extension)
        }
    }
}

/// Which driver an opened dataset must report.
///
/// Converts from `bool` (`true` for the harness's own driver, `false` to skip) and
/// from a driver short name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DriverCheck {
    #[default]
    Configured,
    Named(String),
    Skip,
}

impl DriverCheck {
    /// The driver name to enforce, given the harness's own.
    pub fn expected<'a>(&'a self, configured: &'a str) -> Option<&'a str> {
        match self {
            DriverCheck::Configured => Some(configured),
            DriverCheck::Named(name) => Some(name),
            DriverCheck::Skip => None,
        }
    }
}

impl From<bool> for DriverCheck {
    fn from(check: bool) -> Self {
        if check {
            DriverCheck::Configured
        } else {
            DriverCheck::Skip
        }
    }
}

impl From<&str> for DriverCheck {
    fn from(name: &str) -> Self {
        DriverCheck::Named(name.to_string())
    }
}

impl From<String> for DriverCheck {
    fn from(name: String) -> Self {
        DriverCheck::Named(name)
    }
}

pub fn driver_available<B: Backend + ?Sized>(backend: &B, name: &str) -> bool {
    backend.driver_available(name)
}

/// The subset of `names` the backend has no driver for.
pub fn missing_drivers<'n, B: Backend + ?Sized>(backend: &B, names: &[&'n str]) -> Vec<&'n str> {
    names
        .iter()
        .copied()
        .filter(|name| !backend.driver_available(name))
        .collect()
}

/// Log that a test is skipped because `missing` drivers are not available.
pub fn report_skip(test: &str, missing: &[&str]) {
    log::warn!("skipping {test}: driver(s) {} not available", missing.join(", "));
}

/// Path of the function that holds the marker item `__here`, given the marker's
/// type name. Closure frames are dropped.
#[doc(hidden)]
pub fn enclosing_function(marker: &'static str) -> &'static str {
    let mut name = marker.strip_suffix("::__here").unwrap_or(marker);
    while let Some(outer) = name.strip_suffix("::{{closure}}") {
        name = outer;
    }
    name
}

/// The path of the function this expands in, e.g. `my_crate::tests::test_tiff`.
#[doc(hidden)]
#[macro_export]
macro_rules! __enclosing_function {
    () => {{
        fn __here() {}
        $crate::driver::enclosing_function(::std::any::type_name_of_val(&__here))
    }};
}

/// The value a test returns when it is skipped.
pub trait Skipped {
    fn skipped() -> Self;
}

impl Skipped for () {
    fn skipped() -> Self {}
}

impl<E> Skipped for Result<(), E> {
    fn skipped() -> Self {
        Ok(())
    }
}

/// Return early from the enclosing test if any of the named drivers is missing.
///
/// The skip is logged under the name of the enclosing function.
///
/// ```
/// use gdal_conformance::backend::memory::MemoryBackend;
/// use gdal_conformance::skip_if_driver_missing;
///
/// fn needs_netcdf(backend: &MemoryBackend) -> gdal_conformance::errors::Result<()> {
///     skip_if_driver_missing!(backend, "netCDF");
///     unreachable!()
/// }
///
/// needs_netcdf(&MemoryBackend::new()).unwrap();
/// ```
#[macro_export]
macro_rules! skip_if_driver_missing {
    ($backend:expr, $($name:expr),+ $(,)?) => {{
        let missing = $crate::driver::missing_drivers($backend, &[$($name),+]);
        if !missing.is_empty() {
            $crate::driver::report_skip($crate::__enclosing_function!(), &missing);
            return $crate::driver::Skipped::skipped();
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::errors::Result;

    #[test]
    fn test_descriptor_file_name() {
        assert_eq!(DriverDescriptor::new("GTiff", ".tif").file_name("byte"), "byte.tif");
        assert_eq!(DriverDescriptor::new("MEM", "").file_name("byte"), "byte");
    }

    #[test]
    fn test_driver_check_conversions() {
        assert_eq!(DriverCheck::from(true).expected("GTiff"), Some("GTiff"));
        assert_eq!(DriverCheck::from(false).expected("GTiff"), None);
        assert_eq!(DriverCheck::from("COG").expected("GTiff"), Some("COG"));
    }

    #[test]
    fn test_missing_drivers() {
        let backend = MemoryBackend::new();
        assert!(driver_available(&backend, "MEM"));
        assert_eq!(
            missing_drivers(&backend, &["MEM", "GRIB", "Zarr"]),
            vec!["GRIB", "Zarr"]
        );
    }

    fn guarded(backend: &MemoryBackend, ran: &mut bool) -> Result<()> {
        skip_if_driver_missing!(backend, "MEM", "GRIB");
        *ran = true;
        Ok(())
    }

    fn guarded_unit(backend: &MemoryBackend, ran: &mut bool) {
        skip_if_driver_missing!(backend, "MEM");
        *ran = true;
    }

    #[test]
    fn test_enclosing_function_name() {
        let name = crate::__enclosing_function!();
        assert!(name.ends_with("driver::tests::test_enclosing_function_name"), "{name}");

        let in_closure = (|| crate::__enclosing_function!())();
        assert_eq!(in_closure, name);

        assert_eq!(enclosing_function("a::b::{{closure}}::__here"), "a::b");
    }

    #[test]
    fn test_skip_macro() {
        let backend = MemoryBackend::new();
        let mut ran = false;
        guarded(&backend, &mut ran).unwrap();
        assert!(!ran);

        guarded_unit(&backend, &mut ran);
        assert!(ran);
    }
}

//! Harness configuration and scoped backend configuration options.
//!
//! Backend configuration options (the equivalent of GDAL's `CPLSetConfigOption`)
//! are never mutated bare: they are set through a [`ConfigOptionGuard`], which
//! restores the previous values when it goes out of scope.
//!
//! ```
//! use gdal_conformance::backend::memory::MemoryBackend;
//! use gdal_conformance::backend::Backend;
//! use gdal_conformance::config::ConfigOptionGuard;
//!
//! let backend = MemoryBackend::new();
//! {
//!     let _guard = ConfigOptionGuard::set(&backend, &[("GDAL_PAM_ENABLED", "NO")]).unwrap();
//!     assert_eq!(backend.config_option("GDAL_PAM_ENABLED").as_deref(), Some("NO"));
//! }
//! assert_eq!(backend.config_option("GDAL_PAM_ENABLED"), None);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::Backend;
use crate::errors::Result;

/// Environment variable naming the directory diagnostic artifacts are written to.
pub const OUTPUT_DIR_ENV: &str = "TEST_UNDECLARED_OUTPUTS_DIR";

/// Settings of the harness itself, as opposed to backend configuration options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Where mismatching live reports are saved. `None` disables artifacts.
    pub output_dir: Option<PathBuf>,
}

impl HarnessConfig {
    /// Read the output directory from [`OUTPUT_DIR_ENV`].
    pub fn from_env() -> Self {
        let output_dir = std::env::var_os(OUTPUT_DIR_ENV)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);
        Self { output_dir }
    }

    pub fn with_output_dir<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: Some(output_dir.into()),
        }
    }

    /// Save `contents` as `name` in the output directory.
    ///
    /// Returns the written path. Failing to write is logged and otherwise ignored, so
    /// the caller's own failure is the one that surfaces.
    pub fn write_artifact(&self, name: &str, contents: &str) -> Option<PathBuf> {
        let output_dir = self.output_dir.as_deref()?;
        let path = output_dir.join(name);
        match write_file(output_dir, &path, contents) {
            Ok(()) => {
                log::info!("wrote diagnostic artifact {}", path.display());
                Some(path)
            }
            Err(err) => {
                log::warn!(
                    "unable to write diagnostic artifact {}: {err}",
                    path.display()
                );
                None
            }
        }
    }
}

fn write_file(dir: &Path, path: &Path, contents: &str) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(path, contents)
}

/// Backend configuration overrides that are undone on drop.
#[must_use = "the options are restored as soon as the guard is dropped"]
pub struct ConfigOptionGuard<'a, B: Backend + ?Sized> {
    backend: &'a B,
    previous: Vec<(String, Option<String>)>,
}

impl<'a, B: Backend + ?Sized> ConfigOptionGuard<'a, B> {
    /// Apply `options` in order, remembering what each key held before.
    ///
    /// If one of them cannot be set, the ones already applied are restored before
    /// the error is returned.
    pub fn set(backend: &'a B, options: &[(&str, &str)]) -> Result<Self> {
        let mut guard = Self {
            backend,
            previous: Vec::with_capacity(options.len()),
        };
        for (key, value) in options {
            let previous = backend.config_option(key);
            log::debug!("config option {key}={value} (was {previous:?})");
            backend.set_config_option(key, Some(value))?;
            guard.previous.push((key.to_string(), previous));
        }
        Ok(guard)
    }
}

impl<B: Backend + ?Sized> Drop for ConfigOptionGuard<'_, B> {
    fn drop(&mut self) {
        // Reverse order, so a key set twice ends up with its original value.
        for (key, previous) in self.previous.drain(..).rev() {
            if let Err(err) = self.backend.set_config_option(&key, previous.as_deref()) {
                log::warn!("unable to restore config option {key}: {err}");
            }
        }
    }
}

/// Run `f` with `options` applied, restoring them afterwards.
pub fn with_config_options<B, T, F>(backend: &B, options: &[(&str, &str)], f: F) -> Result<T>
where
    B: Backend + ?Sized,
    F: FnOnce() -> T,
{
    let _guard = ConfigOptionGuard::set(backend, options)?;
    Ok(f())
}

//! Unique names for files written by create-copy checks.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use crate::errors::Result;

/// Prefix of paths that live in the backend's in-memory file system.
pub const VSIMEM_PREFIX: &str = "/vsimem";

// Shared by every harness in the process so names never collide.
static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Next value of the process-wide scratch counter.
pub fn next_scratch_id() -> usize {
    SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// `true` for paths resolved by the backend's virtual file systems (`/vsimem/`,
/// `/vsizip/`, ...), which never exist on disk.
pub fn is_virtual_path(path: &Path) -> bool {
    path.to_str().is_some_and(|p| p.starts_with("/vsi"))
}

/// Temporary directory owned by one harness, created on first use and removed
/// with the harness.
#[derive(Debug, Default)]
pub struct ScratchSpace {
    dir: Option<TempDir>,
}

impl ScratchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh path named `<stem>_<n>.<extension>`, on disk or under `/vsimem/`.
    pub fn path(&mut self, stem: &str, extension: &str, in_memory: bool) -> Result<PathBuf> {
        let id = next_scratch_id();
        let name = if extension.is_empty() {
            format!("{stem}_{id}")
        } else {
            format!("{stem}_{id}.{extension}")
        };
        let path = if in_memory {
            Path::new(VSIMEM_PREFIX).join(name)
        } else {
            self.dir()?.join(name)
        };
        log::debug!("scratch path {}", path.display());
        Ok(path)
    }

    fn dir(&mut self) -> Result<&Path> {
        let dir = match self.dir.take() {
            Some(dir) => dir,
            None => tempfile::Builder::new().prefix("conformance").tempdir()?,
        };
        Ok(self.dir.insert(dir).path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let mut scratch = ScratchSpace::new();
        let a = scratch.path("byte", "tif", true).unwrap();
        let b = scratch.path("byte", "tif", true).unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("/vsimem"));
        assert_eq!(a.extension().unwrap(), "tif");
    }

    #[test]
    fn test_on_disk_paths_share_a_directory() {
        let mut scratch = ScratchSpace::new();
        let a = scratch.path("copy", "", false).unwrap();
        let b = scratch.path("copy", "", false).unwrap();
        assert_eq!(a.parent(), b.parent());
        assert!(a.parent().unwrap().is_dir());
        assert_eq!(a.extension(), None);
    }

    #[test]
    fn test_virtual_paths() {
        assert!(is_virtual_path(Path::new("/vsimem/a.tif")));
        assert!(is_virtual_path(Path::new("/vsizip/a.zip/b.shp")));
        assert!(!is_virtual_path(Path::new("/tmp/a.tif")));
    }
}

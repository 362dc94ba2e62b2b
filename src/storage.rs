//! In-process exclusivity of storage directories.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use log::trace;
use once_cell::sync::Lazy;

use crate::{sync::Mutex, Error, Result};

static IN_USE: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(Default::default);

/// Marks a storage directory as used by one live engine; released on drop.
#[derive(Debug)]
pub(crate) struct StorageLock {
    path: PathBuf,
}

impl StorageLock {
    pub(crate) fn acquire(path: &Path) -> Result<StorageLock> {
        let path = path.canonicalize().map_err(|e| {
            Error::builder(format!("storage path {}: {e}", path.display()))
        })?;

        if !IN_USE.lock().insert(path.clone()) {
            return Err(Error::builder(format!(
                "storage path {} is in use by another engine",
                path.display()
            )));
        }

        trace!("acquired storage path {}", path.display());
        Ok(StorageLock { path })
    }
}

impl Drop for StorageLock {
    fn drop(&mut self) {
        IN_USE.lock().remove(&self.path);
        trace!("released storage path {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let first = StorageLock::acquire(dir.path()).unwrap();

        let err = StorageLock::acquire(dir.path()).unwrap_err();
        assert!(err.is_builder());

        // the same directory through a different spelling
        let dotted = dir.path().join(".");
        assert!(StorageLock::acquire(&dotted).is_err());

        drop(first);
        assert!(StorageLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn missing_directory() {
        let err = StorageLock::acquire(Path::new("/no/such/storage/dir")).unwrap_err();
        assert!(err.is_builder());
    }
}

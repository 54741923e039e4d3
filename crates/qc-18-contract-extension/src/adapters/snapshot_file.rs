//! # Registry Snapshot File
//!
//! JSON file mapping management-contract address to its extension record.
//! Written atomically through a temp file and rename.

use crate::domain::{ExtensionError, ExtensionRecord};
use shared_types::Address;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Records keyed by management contract.
pub type RegistrySnapshot = BTreeMap<Address, ExtensionRecord>;

/// Durable registry snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Snapshot stored at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// File location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot. A missing file yields an empty map.
    ///
    /// # Errors
    ///
    /// `Persistence` if the file cannot be read, `CorruptSnapshot` if it
    /// cannot be parsed.
    pub fn load(&self) -> Result<RegistrySnapshot, ExtensionError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RegistrySnapshot::new())
            }
            Err(e) => return Err(ExtensionError::Persistence(e.to_string())),
        };

        serde_json::from_slice(&bytes).map_err(|e| ExtensionError::CorruptSnapshot {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Replaces the snapshot with `records`.
    pub fn save(&self, records: &RegistrySnapshot) -> Result<(), ExtensionError> {
        let io_err = |e: std::io::Error| ExtensionError::Persistence(e.to_string());

        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|e| ExtensionError::Persistence(e.to_string()))?;

        // Write atomically via temp file
        let temp_path = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        std::fs::rename(&temp_path, &self.path).map_err(io_err)?;

        Ok(())
    }
}

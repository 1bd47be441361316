//! Catalog snapshot persistence.
//!
//! The stored snapshot is a log of registrations: reset once per process,
//! appended to on every registration and compacted to the deduplicated list
//! when the catalog is sealed. Later records supersede earlier ones with the
//! same `(action, subject)`. Reads never fail and fall back to an empty list
//! when the stored data is missing or corrupt.

use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::Permission;
use crate::error::CatalogError;

/// Storage contract for catalog snapshots.
pub trait SnapshotStore: Send + Sync {
    /// Truncate any previously stored snapshot.
    fn reset(&self) -> Result<(), CatalogError>;

    /// Record one registration after the stored records.
    fn append(&self, permission: &Permission) -> Result<(), CatalogError>;

    /// Replace the stored snapshot with `permissions`.
    fn write_all(&self, permissions: &[Permission]) -> Result<(), CatalogError>;

    /// Load the stored records in write order. Corrupt or missing data yields
    /// an empty list.
    fn read_all(&self) -> Vec<Permission>;
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<T> {
    fn reset(&self) -> Result<(), CatalogError> {
        (**self).reset()
    }

    fn append(&self, permission: &Permission) -> Result<(), CatalogError> {
        (**self).append(permission)
    }

    fn write_all(&self, permissions: &[Permission]) -> Result<(), CatalogError> {
        (**self).write_all(permissions)
    }

    fn read_all(&self) -> Vec<Permission> {
        (**self).read_all()
    }
}

/// Snapshot stored on disk as JSON lines, one permission per line.
///
/// Full rewrites go to a sibling temporary file and are renamed into place so
/// a crash mid-write never leaves a truncated snapshot behind.
#[derive(Debug)]
pub struct JsonFileSnapshot {
    path: PathBuf,
}

impl JsonFileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode_line(permission: &Permission) -> Result<Vec<u8>, CatalogError> {
        let mut line = serde_json::to_vec(permission)?;
        line.push(b'\n');
        Ok(line)
    }

    fn replace_file(&self, permissions: &[Permission]) -> Result<(), CatalogError> {
        let mut bytes = Vec::new();
        for permission in permissions {
            bytes.extend(Self::encode_line(permission)?);
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SnapshotStore for JsonFileSnapshot {
    fn reset(&self) -> Result<(), CatalogError> {
        self.replace_file(&[])
    }

    fn append(&self, permission: &Permission) -> Result<(), CatalogError> {
        let line = Self::encode_line(permission)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }

    fn write_all(&self, permissions: &[Permission]) -> Result<(), CatalogError> {
        self.replace_file(permissions)
    }

    fn read_all(&self) -> Vec<Permission> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read catalog snapshot");
                return Vec::new();
            }
        };

        let parsed: Result<Vec<Permission>, _> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<Permission>)
            .collect();

        match parsed {
            Ok(permissions) => permissions,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Catalog snapshot is corrupt; using empty catalog");
                Vec::new()
            }
        }
    }
}

/// Snapshot kept in process memory.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    permissions: Mutex<Vec<Permission>>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the snapshot, as if left behind by a previous process.
    pub fn with_permissions(permissions: Vec<Permission>) -> Self {
        Self {
            permissions: Mutex::new(permissions),
        }
    }
}

impl SnapshotStore for MemorySnapshot {
    fn reset(&self) -> Result<(), CatalogError> {
        self.permissions.lock().clear();
        Ok(())
    }

    fn append(&self, permission: &Permission) -> Result<(), CatalogError> {
        self.permissions.lock().push(permission.clone());
        Ok(())
    }

    fn write_all(&self, permissions: &[Permission]) -> Result<(), CatalogError> {
        *self.permissions.lock() = permissions.to_vec();
        Ok(())
    }

    fn read_all(&self) -> Vec<Permission> {
        self.permissions.lock().clone()
    }
}

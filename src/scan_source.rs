//! Where scans come from.
//!
//! The pipeline only needs the raw bytes of a scan given its identifier.
//! `DirectoryScanSource` serves `.dcm` files from a local directory;
//! `InMemoryScanSource` backs tests and embedders that already hold the data.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

const SCAN_EXTENSION: &str = "dcm";

#[derive(Debug, Error)]
pub enum ScanSourceError {
    #[error("Scan not found: {0}")]
    NotFound(String),

    #[error("Invalid scan id: {0:?}")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub trait ScanSource: Send + Sync {
    /// Raw bytes of the scan named `scan_id`.
    fn resolve(&self, scan_id: &str) -> Result<Vec<u8>, ScanSourceError>;

    /// Identifiers of every available scan, sorted.
    fn list(&self) -> Result<Vec<String>, ScanSourceError>;
}

/// Scans stored as `<root>/<scan_id>` where the id is a plain `.dcm` file name.
#[derive(Debug, Clone)]
pub struct DirectoryScanSource {
    root: PathBuf,
}

impl DirectoryScanSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a scan, refusing ids that would leave the root directory.
    pub fn scan_path(&self, scan_id: &str) -> Result<PathBuf, ScanSourceError> {
        let mut components = Path::new(scan_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == scan_id => {
                Ok(self.root.join(name))
            }
            _ => Err(ScanSourceError::InvalidId(scan_id.to_string())),
        }
    }
}

impl ScanSource for DirectoryScanSource {
    fn resolve(&self, scan_id: &str) -> Result<Vec<u8>, ScanSourceError> {
        let path = self.scan_path(scan_id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ScanSourceError::NotFound(scan_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>, ScanSourceError> {
        let mut ids: Vec<String> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                Path::new(name)
                    .extension()
                    .is_some_and(|ext| ext == SCAN_EXTENSION)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryScanSource {
    scans: RwLock<BTreeMap<String, Arc<Vec<u8>>>>,
}

impl InMemoryScanSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, scan_id: impl Into<String>, bytes: Vec<u8>) {
        self.scans.write().insert(scan_id.into(), Arc::new(bytes));
    }

    pub fn remove(&self, scan_id: &str) -> bool {
        self.scans.write().remove(scan_id).is_some()
    }
}

impl ScanSource for InMemoryScanSource {
    fn resolve(&self, scan_id: &str) -> Result<Vec<u8>, ScanSourceError> {
        self.scans
            .read()
            .get(scan_id)
            .map(|bytes| bytes.as_ref().clone())
            .ok_or_else(|| ScanSourceError::NotFound(scan_id.to_string()))
    }

    fn list(&self) -> Result<Vec<String>, ScanSourceError> {
        Ok(self.scans.read().keys().cloned().collect())
    }
}

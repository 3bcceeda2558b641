//! Per-request working areas and the finished mesh artifacts they hold.
//!
//! Every run gets its own directory `<root>/<uuid>/`. The mesh is written to
//! a hidden staging file and renamed into place on commit; a work area that
//! is dropped without being committed removes its directory, so an area is
//! either fully populated or absent. Expired directories are removed by
//! [`ArtifactStore::sweep_expired`], which [`ArtifactStore::spawn_sweeper`]
//! runs on a fixed period.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::enums::MeshFormat;

const ARTIFACT_STEM: &str = "output_model";

/// A committed mesh file and what went into it.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshArtifact {
    pub id: Uuid,
    pub path: PathBuf,
    pub format: MeshFormat,
    pub byte_len: u64,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub isovalue: f64,
}

impl MeshArtifact {
    pub const CONTENT_TYPE: &'static str = "application/octet-stream";

    /// Download name presented to clients, `output_model.stl` by default.
    pub fn file_name(&self) -> String {
        artifact_file_name(self.format)
    }

    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

fn artifact_file_name(format: MeshFormat) -> String {
    format!("{ARTIFACT_STEM}.{}", format.extension())
}

/// Scratch directory owned by one pipeline run.
#[derive(Debug)]
pub struct WorkArea {
    id: Uuid,
    dir: PathBuf,
    committed: bool,
}

impl WorkArea {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Hidden file the serializer writes into before commit.
    pub fn staging_path(&self, format: MeshFormat) -> PathBuf {
        self.dir.join(format!(".{}.partial", artifact_file_name(format)))
    }

    /// Move the staged file to its final name and keep the directory.
    pub fn commit(mut self, format: MeshFormat) -> io::Result<PathBuf> {
        let target = self.dir.join(artifact_file_name(format));
        fs::rename(self.staging_path(format), &target)?;
        self.committed = true;
        Ok(target)
    }
}

impl Drop for WorkArea {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(id = %self.id, "Removed abandoned work area"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(id = %self.id, error = %e, "Failed to remove work area"),
        }
    }
}

pub struct ArtifactStore {
    root: PathBuf,
    ttl: Duration,
    artifacts: RwLock<HashMap<Uuid, MeshArtifact>>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a fresh, uniquely named work area.
    pub fn begin(&self) -> io::Result<WorkArea> {
        let id = Uuid::new_v4();
        let dir = self.root.join(id.to_string());
        fs::create_dir_all(&dir)?;
        Ok(WorkArea {
            id,
            dir,
            committed: false,
        })
    }

    pub fn register(&self, artifact: MeshArtifact) {
        self.artifacts.write().insert(artifact.id, artifact);
    }

    pub fn get(&self, id: Uuid) -> Option<MeshArtifact> {
        self.artifacts.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }

    /// Path of an artifact directory, whether or not it still exists.
    pub fn path(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Remove an artifact directory once the caller is done with it.
    /// Returns `false` if it was already gone.
    pub fn dispose(&self, id: Uuid) -> io::Result<bool> {
        self.artifacts.write().remove(&id);
        match fs::remove_dir_all(self.path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove artifact directories older than the TTL.
    ///
    /// Only directories named by a UUID are considered. Returns the number of
    /// directories removed.
    pub fn sweep_expired(&self) -> usize {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Cannot read working directory");
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| Uuid::parse_str(name).ok())
            else {
                continue;
            };
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_dir() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < self.ttl {
                continue;
            }

            match fs::remove_dir_all(entry.path()) {
                Ok(()) => {
                    self.artifacts.write().remove(&id);
                    removed += 1;
                }
                Err(e) => warn!(%id, error = %e, "Failed to remove expired artifact"),
            }
        }
        removed
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `period` on the
    /// current tokio runtime.
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = self.sweep_expired();
                if removed > 0 {
                    info!(removed, remaining = self.len(), "Swept expired artifacts");
                }
            }
        })
    }
}

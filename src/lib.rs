//! # DICOM-isosurface library
//!
//! This crate turns a volumetric DICOM scan into the two things a remote
//! viewer needs to display it in 3D: a surface mesh of the bright structures
//! (vessels, bone, contrast) and the raw voxel data for client-side volume
//! rendering.
//!
//! A scan is either one multi-frame DICOM object or a directory of
//! single-frame objects. Frames are decoded in parallel using rayon and
//! stacked into a [`VoxelGrid`]. For the mesh, the isovalue is taken from the
//! sample distribution itself (the 99.5th percentile by default) and a
//! marching-cubes sweep extracts the boundary of everything at or above it.
//! The result is written as binary STL (or PLY) into a per-request working
//! directory. The voxel stream is the grid re-encoded as little-endian
//! unsigned integers, base64 encoded, with its shape.
//!
//! Scans are looked up through a [`ScanSource`], and viewing annotations are
//! kept in an [`AnnotationStore`]. Transport, authentication and routing are
//! left to the embedding service.
//!
//! # Examples
//!
//! ## Extracting a mesh from a directory of scans
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use dicom_isosurface::{DirectoryScanSource, MeshRequest, Pipeline, PipelineConfig};
//! let config = PipelineConfig::default();
//! let scans = Arc::new(DirectoryScanSource::new("dicom"));
//! let pipeline = Pipeline::new(config, scans);
//!
//! let artifact = pipeline
//!     .extract_mesh(&MeshRequest::new("head.dcm"))
//!     .expect("should have extracted a mesh");
//! println!("{} triangles in {}", artifact.triangle_count, artifact.path.display());
//! ```
//!
//! ## Working with a volume directly
//!
//! ```no_run
//! # use std::path::PathBuf;
//! # use dicom_isosurface::{isosurface, threshold, ExtractOptions, SortBy, VolumeLoader};
//! let volume = VolumeLoader::load_from_directory(&PathBuf::from("series"), SortBy::InstanceNumber)
//!     .expect("should have loaded files from directory");
//! let iso = threshold::percentile(volume.samples(), 99.0).expect("non-empty volume");
//! let mesh = isosurface::extract(&volume, iso, &ExtractOptions::default())
//!     .expect("should have extracted a surface");
//! assert!(mesh.validate_indices());
//! ```

pub mod annotations;
pub mod artifacts;
pub mod config;
pub mod enums;
pub mod error;
pub mod isosurface;
pub mod mesh;
pub mod mesh_writer;
pub mod pipeline;
pub mod request;
pub mod scan_source;
pub mod threshold;
pub mod volume;
pub mod volume_loader;
pub mod voxel_stream;

#[cfg(test)]
#[path = "../tests/common/dicom_fixture.rs"]
mod test_support;

pub use annotations::{
    Annotation, AnnotationError, AnnotationId, AnnotationStore, JsonFileAnnotationStore,
    ViewOrientation,
};
pub use artifacts::{ArtifactStore, MeshArtifact};
pub use config::{ConfigError, PipelineConfig};
pub use enums::{MeshFormat, OutputSampleWidth, OverflowPolicy, SortBy};
pub use error::{ErrorKind, ErrorResponse, PipelineError, Stage};
pub use isosurface::{CancellationToken, ExtractError, ExtractOptions};
pub use mesh::Mesh;
pub use mesh_writer::{MeshWriteError, MeshWriter};
pub use pipeline::Pipeline;
pub use request::{AnnotationRequest, MeshRequest, RequestError, VoxelStreamRequest};
pub use scan_source::{DirectoryScanSource, InMemoryScanSource, ScanSource, ScanSourceError};
pub use volume::{SampleFormat, VoxelGrid};
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
pub use voxel_stream::{EncodedVoxelStream, VoxelStreamEncoder};

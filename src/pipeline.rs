//! Request orchestration.
//!
//! A mesh run moves through `Loading -> Thresholding -> Extracting ->
//! Serializing -> Done`; a voxel stream run skips the middle two. Any failure
//! stops the run and is reported with the stage it happened in. Runs share
//! nothing but the immutable configuration, the scan source and the artifact
//! registry, so any number may execute at once.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::artifacts::{ArtifactStore, MeshArtifact};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::isosurface::{self, ExtractOptions};
use crate::mesh_writer::MeshWriter;
use crate::request::{MeshRequest, VoxelStreamRequest};
use crate::scan_source::ScanSource;
use crate::threshold;
use crate::volume::VoxelGrid;
use crate::volume_loader::VolumeLoader;
use crate::voxel_stream::{EncodedVoxelStream, VoxelStreamEncoder};

pub struct Pipeline {
    config: PipelineConfig,
    scans: Arc<dyn ScanSource>,
    artifacts: Arc<ArtifactStore>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, scans: Arc<dyn ScanSource>) -> Self {
        let artifacts = Arc::new(ArtifactStore::new(
            config.working_dir.clone(),
            config.artifact_ttl(),
        ));
        Self {
            config,
            scans,
            artifacts,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn scans(&self) -> &Arc<dyn ScanSource> {
        &self.scans
    }

    /// Registry of committed artifacts, shared with the sweeper.
    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    /// Resolve and decode a scan.
    pub fn load(&self, scan_id: &str) -> PipelineResult<VoxelGrid> {
        let bytes = self.scans.resolve(scan_id)?;
        let grid = VolumeLoader::load_from_bytes(&bytes)?;
        debug!(
            scan_id,
            dim = ?grid.dim(),
            spacing = ?grid.spacing(),
            "Loaded scan"
        );
        Ok(grid)
    }

    pub fn extract_mesh(&self, request: &MeshRequest) -> PipelineResult<MeshArtifact> {
        self.extract_mesh_with(request, &ExtractOptions::default())
    }

    /// Like [`extract_mesh`](Self::extract_mesh), with control over the
    /// extractor (for example a cancellation token).
    #[instrument(skip(self, request, options), fields(scan_id = %request.scan_id))]
    pub fn extract_mesh_with(
        &self,
        request: &MeshRequest,
        options: &ExtractOptions,
    ) -> PipelineResult<MeshArtifact> {
        let started = Instant::now();
        request.validate()?;
        let percentile = request.percentile.unwrap_or(self.config.percentile);

        enter(Stage::Loading);
        let grid = self.load(&request.scan_id)?;

        enter(Stage::Thresholding);
        let isovalue = threshold::percentile(grid.samples(), percentile)?;
        debug!(percentile, isovalue, "Selected isovalue");

        enter(Stage::Extracting);
        let mesh = isosurface::extract(&grid, isovalue, options)?;
        drop(grid);

        enter(Stage::Serializing);
        let format = self.config.mesh_format;
        let area = self
            .artifacts
            .begin()
            .map_err(|e| PipelineError::internal(Stage::Serializing, &e))?;
        let byte_len = MeshWriter::write(
            &mesh,
            format,
            area.staging_path(format),
            self.config.require_non_empty_mesh,
        )?;
        let id = area.id();
        let path = area
            .commit(format)
            .map_err(|e| PipelineError::internal(Stage::Serializing, &e))?;

        let artifact = MeshArtifact {
            id,
            path,
            format,
            byte_len,
            vertex_count: mesh.vertex_count(),
            triangle_count: mesh.triangle_count(),
            isovalue,
        };
        self.artifacts.register(artifact.clone());

        enter(Stage::Done);
        info!(
            artifact_id = %id,
            isovalue,
            triangles = artifact.triangle_count,
            byte_len,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Mesh artifact ready"
        );
        Ok(artifact)
    }

    #[instrument(skip(self, request), fields(scan_id = %request.scan_id))]
    pub fn extract_voxel_stream(
        &self,
        request: &VoxelStreamRequest,
    ) -> PipelineResult<EncodedVoxelStream> {
        let started = Instant::now();
        request.validate()?;

        enter(Stage::Loading);
        let grid = self.load(&request.scan_id)?;

        enter(Stage::Serializing);
        let encoder =
            VoxelStreamEncoder::new(self.config.output_sample_width, self.config.overflow_policy);
        let stream = encoder.encode(&grid);

        enter(Stage::Done);
        info!(
            shape = ?stream.shape,
            sample_width = stream.sample_width,
            encoded_len = stream.pixel_array.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Voxel stream ready"
        );
        Ok(stream)
    }

    /// Run [`extract_mesh`](Self::extract_mesh) on tokio's blocking pool.
    pub async fn extract_mesh_async(
        self: &Arc<Self>,
        request: MeshRequest,
    ) -> PipelineResult<MeshArtifact> {
        let pipeline = Arc::clone(self);
        tokio::task::spawn_blocking(move || pipeline.extract_mesh(&request))
            .await
            .map_err(|e| PipelineError::internal(Stage::Extracting, &e))?
    }

    /// Run [`extract_voxel_stream`](Self::extract_voxel_stream) on tokio's
    /// blocking pool.
    pub async fn extract_voxel_stream_async(
        self: &Arc<Self>,
        request: VoxelStreamRequest,
    ) -> PipelineResult<EncodedVoxelStream> {
        let pipeline = Arc::clone(self);
        tokio::task::spawn_blocking(move || pipeline.extract_voxel_stream(&request))
            .await
            .map_err(|e| PipelineError::internal(Stage::Serializing, &e))?
    }
}

fn enter(stage: Stage) {
    debug!(%stage, "Entering stage");
}

//! Error taxonomy shared by every pipeline entry point.
//!
//! Component errors stay specific to their module. The orchestrator folds them
//! into a [`PipelineError`] that carries the [`ErrorKind`], the [`Stage`] the
//! run had reached and a detail string safe to hand to clients. The source
//! error itself is logged and then dropped.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::isosurface::ExtractError;
use crate::mesh_writer::MeshWriteError;
use crate::request::RequestError;
use crate::scan_source::ScanSourceError;
use crate::threshold::ThresholdError;
use crate::voxel_stream::VoxelStreamError;
use crate::volume_loader::VolumeLoaderError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Decode,
    NoPixelData,
    EmptyArtifact,
    Internal,
    InvalidRequest,
}

impl ErrorKind {
    /// Status code a transport layer should answer with.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Decode | ErrorKind::NoPixelData => 422,
            ErrorKind::EmptyArtifact | ErrorKind::Internal => 500,
            ErrorKind::InvalidRequest => 400,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Decode => "decode",
            ErrorKind::NoPixelData => "no_pixel_data",
            ErrorKind::EmptyArtifact => "empty_artifact",
            ErrorKind::Internal => "internal",
            ErrorKind::InvalidRequest => "invalid_request",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    Loading,
    Thresholding,
    Extracting,
    Serializing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Loading => "loading",
            Stage::Thresholding => "thresholding",
            Stage::Extracting => "extracting",
            Stage::Serializing => "serializing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} while {stage}: {detail}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub detail: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            detail: detail.into(),
        }
    }

    /// Wrap an unexpected failure. The source is logged, not returned.
    pub fn internal(stage: Stage, source: &dyn std::error::Error) -> Self {
        warn!(%stage, error = %source, "Internal pipeline failure");
        Self::new(ErrorKind::Internal, stage, "internal error")
    }

    /// Only internal failures may succeed when repeated with the same input.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Internal
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            kind: self.kind,
            detail: self.detail.clone(),
        }
    }
}

/// Client-facing error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<&PipelineError> for ErrorResponse {
    fn from(err: &PipelineError) -> Self {
        err.to_response()
    }
}

impl From<RequestError> for PipelineError {
    fn from(err: RequestError) -> Self {
        PipelineError::new(ErrorKind::InvalidRequest, Stage::Validating, err.to_string())
    }
}

impl From<ScanSourceError> for PipelineError {
    fn from(err: ScanSourceError) -> Self {
        match err {
            ScanSourceError::NotFound(_) => {
                PipelineError::new(ErrorKind::NotFound, Stage::Loading, err.to_string())
            }
            ScanSourceError::InvalidId(_) => {
                PipelineError::new(ErrorKind::InvalidRequest, Stage::Loading, err.to_string())
            }
            ScanSourceError::Io(ref source) => PipelineError::internal(Stage::Loading, source),
        }
    }
}

impl From<VolumeLoaderError> for PipelineError {
    fn from(err: VolumeLoaderError) -> Self {
        let stage = Stage::Loading;
        match err {
            VolumeLoaderError::NotFound(_) | VolumeLoaderError::NoValidImages => {
                PipelineError::new(ErrorKind::NotFound, stage, "scan not found")
            }
            VolumeLoaderError::NoPixelData => {
                PipelineError::new(ErrorKind::NoPixelData, stage, err.to_string())
            }
            VolumeLoaderError::NotDicom
            | VolumeLoaderError::Truncated { .. }
            | VolumeLoaderError::UnsupportedSamplesPerPixel(_)
            | VolumeLoaderError::UnsupportedBitsAllocated(_)
            | VolumeLoaderError::InconsistentDimensions
            | VolumeLoaderError::Volume(_) => {
                PipelineError::new(ErrorKind::Decode, stage, err.to_string())
            }
            VolumeLoaderError::Io(_)
            | VolumeLoaderError::Dicom(_)
            | VolumeLoaderError::PixelData(_) => {
                warn!(error = %err, "Scan could not be decoded");
                PipelineError::new(ErrorKind::Decode, stage, "scan could not be decoded")
            }
        }
    }
}

impl From<ThresholdError> for PipelineError {
    fn from(err: ThresholdError) -> Self {
        match err {
            ThresholdError::InvalidPercentile(_) => {
                PipelineError::new(ErrorKind::InvalidRequest, Stage::Thresholding, err.to_string())
            }
            ThresholdError::Empty => PipelineError::internal(Stage::Thresholding, &err),
        }
    }
}

impl From<ExtractError> for PipelineError {
    fn from(err: ExtractError) -> Self {
        PipelineError::internal(Stage::Extracting, &err)
    }
}

impl From<MeshWriteError> for PipelineError {
    fn from(err: MeshWriteError) -> Self {
        match err {
            MeshWriteError::EmptyArtifact { .. } | MeshWriteError::EmptyMesh => {
                warn!(error = %err, "Mesh artifact is empty");
                PipelineError::new(
                    ErrorKind::EmptyArtifact,
                    Stage::Serializing,
                    "mesh artifact is empty",
                )
            }
            MeshWriteError::InvalidIndices | MeshWriteError::Io(_) => {
                PipelineError::internal(Stage::Serializing, &err)
            }
        }
    }
}

impl From<VoxelStreamError> for PipelineError {
    fn from(err: VoxelStreamError) -> Self {
        PipelineError::internal(Stage::Serializing, &err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::Decode.http_status(), 422);
        assert_eq!(ErrorKind::NoPixelData.http_status(), 422);
        assert_eq!(ErrorKind::EmptyArtifact.http_status(), 500);
        assert_eq!(ErrorKind::Internal.http_status(), 500);
        assert_eq!(ErrorKind::InvalidRequest.http_status(), 400);
    }

    #[test]
    fn only_internal_is_retryable() {
        let internal = PipelineError::new(ErrorKind::Internal, Stage::Extracting, "x");
        let decode = PipelineError::new(ErrorKind::Decode, Stage::Loading, "x");
        assert!(internal.is_retryable());
        assert!(!decode.is_retryable());
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Loading < Stage::Thresholding);
        assert!(Stage::Thresholding < Stage::Extracting);
        assert!(Stage::Extracting < Stage::Serializing);
        assert!(Stage::Serializing < Stage::Done);
    }

    #[test]
    fn loader_errors_map_to_kinds() {
        let not_found: PipelineError =
            VolumeLoaderError::NotFound("/data/scans/scan.dcm".into()).into();
        assert_eq!(not_found.kind, ErrorKind::NotFound);
        assert_eq!(not_found.stage, Stage::Loading);
        assert!(!not_found.detail.contains("/data/scans"));

        let no_pixels: PipelineError = VolumeLoaderError::NoPixelData.into();
        assert_eq!(no_pixels.kind, ErrorKind::NoPixelData);

        let truncated: PipelineError = VolumeLoaderError::Truncated {
            expected: 16,
            actual: 10,
        }
        .into();
        assert_eq!(truncated.kind, ErrorKind::Decode);

        let wide: PipelineError = VolumeLoaderError::UnsupportedBitsAllocated(32).into();
        assert_eq!(wide.kind, ErrorKind::Decode);
        assert!(wide.detail.contains("32"));
    }

    #[test]
    fn io_source_text_is_not_exposed() {
        let source = std::io::Error::other("disk controller exploded at 0xdeadbeef");
        let err: PipelineError = VolumeLoaderError::Io(source).into();
        assert_eq!(err.kind, ErrorKind::Decode);
        assert!(!err.detail.contains("0xdeadbeef"));

        let source = std::io::Error::other("permission denied on /secret/path");
        let err: PipelineError = MeshWriteError::Io(source).into();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.stage, Stage::Serializing);
        assert!(!err.detail.contains("/secret/path"));
    }

    #[test]
    fn empty_mesh_maps_to_empty_artifact() {
        let err: PipelineError = MeshWriteError::EmptyMesh.into();
        assert_eq!(err.kind, ErrorKind::EmptyArtifact);
        assert_eq!(err.stage, Stage::Serializing);
    }

    #[test]
    fn response_serializes_kind_in_snake_case() {
        let err = PipelineError::new(ErrorKind::NoPixelData, Stage::Loading, "no pixels");
        let json = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(json["kind"], "no_pixel_data");
        assert_eq!(json["detail"], "no pixels");
    }
}

//! Typed request bodies accepted at the pipeline boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotations::ViewOrientation;
use crate::threshold;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("scan_id must not be empty")]
    EmptyScanId,

    #[error("percentile must lie strictly between 0 and 100, got {0}")]
    InvalidPercentile(f64),

    #[error("invalid orientation: {0}")]
    InvalidOrientation(String),
}

fn validate_scan_id(scan_id: &str) -> Result<(), RequestError> {
    if scan_id.trim().is_empty() {
        return Err(RequestError::EmptyScanId);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshRequest {
    pub scan_id: String,
    /// Overrides the configured percentile for this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
}

impl MeshRequest {
    pub fn new(scan_id: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
            percentile: None,
        }
    }

    pub fn with_percentile(mut self, percentile: f64) -> Self {
        self.percentile = Some(percentile);
        self
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        validate_scan_id(&self.scan_id)?;
        if let Some(p) = self.percentile {
            threshold::validate_percentile(p).map_err(|_| RequestError::InvalidPercentile(p))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoxelStreamRequest {
    pub scan_id: String,
}

impl VoxelStreamRequest {
    pub fn new(scan_id: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        validate_scan_id(&self.scan_id)
    }
}

/// Body of an annotation create or update. The viewer sends the orientation
/// under the key `angle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnotationRequest {
    #[serde(alias = "angle")]
    pub orientation: ViewOrientation,
    #[serde(default)]
    pub note: Option<String>,
}

impl AnnotationRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        self.orientation
            .validate()
            .map_err(|e| RequestError::InvalidOrientation(e.to_string()))
    }
}

//! Pipeline configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty file is a
//! valid configuration. A couple of settings can be overridden from the
//! environment for deployments that do not ship a file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::{MeshFormat, OutputSampleWidth, OverflowPolicy};
use crate::threshold::{self, DEFAULT_PERCENTILE};

pub const ENV_WORKING_DIR: &str = "DICOM_ISOSURFACE_WORKING_DIR";
pub const ENV_PERCENTILE: &str = "DICOM_ISOSURFACE_PERCENTILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Percentile of the sample distribution used as isovalue.
    pub percentile: f64,
    pub output_sample_width: OutputSampleWidth,
    pub overflow_policy: OverflowPolicy,
    /// Root of the per-request artifact directories.
    pub working_dir: PathBuf,
    pub mesh_format: MeshFormat,
    /// Age after which the sweeper removes an artifact directory.
    pub artifact_ttl_secs: u64,
    /// Treat a mesh without triangles as a failed run.
    pub require_non_empty_mesh: bool,
    /// Directory the command line resolves scan ids against.
    pub scan_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            percentile: DEFAULT_PERCENTILE,
            output_sample_width: OutputSampleWidth::default(),
            overflow_policy: OverflowPolicy::default(),
            working_dir: PathBuf::from("tmp"),
            mesh_format: MeshFormat::default(),
            artifact_ttl_secs: 30 * 60,
            require_non_empty_mesh: false,
            scan_dir: PathBuf::from("scans"),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        threshold::validate_percentile(self.percentile)
            .map_err(|e| ConfigError::Invalid(format!("percentile: {e}")))?;

        if self.working_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("working_dir must not be empty".into()));
        }
        if self.artifact_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "artifact_ttl_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Apply `DICOM_ISOSURFACE_WORKING_DIR` and `DICOM_ISOSURFACE_PERCENTILE`.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(dir) = lookup(ENV_WORKING_DIR) {
            self.working_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_PERCENTILE) {
            self.percentile = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{ENV_PERCENTILE} is not a number: {raw:?}"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifact_ttl_secs)
    }
}

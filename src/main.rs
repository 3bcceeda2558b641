//! dicom-isosurface command line
//!
//! # Commands
//!
//! - `mesh <scan-id>`: extract the isosurface of a scan into a mesh artifact
//! - `voxels <scan-id>`: print or save the encoded voxel stream as JSON
//! - `list`: list the scans in the scan directory
//! - `sweep`: remove expired artifact directories

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dicom_isosurface::{
    ArtifactStore, DirectoryScanSource, MeshRequest, Pipeline, PipelineConfig, ScanSource,
    VoxelStreamRequest,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "dicom-isosurface")]
#[command(version)]
#[command(about = "Percentile-threshold isosurfaces and voxel streams from DICOM scans")]
struct Cli {
    /// Pipeline configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the .dcm scans, overrides the configuration
    #[arg(long, global = true)]
    scan_dir: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a surface mesh from a scan
    Mesh {
        scan_id: String,
        /// Percentile of the intensity distribution used as isovalue
        #[arg(long)]
        percentile: Option<f64>,
        /// Copy the finished artifact to this path
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Encode a scan as a base64 voxel stream
    Voxels {
        scan_id: String,
        /// Write the JSON to this path instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List available scans
    List,
    /// Remove artifact directories older than the configured TTL
    Sweep,
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(dir) = &cli.scan_dir {
        config.scan_dir = dir.clone();
    }
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let scans = Arc::new(DirectoryScanSource::new(config.scan_dir.clone()));

    match cli.command {
        Commands::Mesh {
            scan_id,
            percentile,
            out,
        } => {
            let pipeline = Arc::new(Pipeline::new(config, scans));
            let request = MeshRequest {
                scan_id,
                percentile,
            };
            let artifact = pipeline.extract_mesh_async(request).await?;

            let path = match out {
                Some(out) => {
                    std::fs::copy(&artifact.path, &out)
                        .with_context(|| format!("copying artifact to {}", out.display()))?;
                    out
                }
                None => artifact.path.clone(),
            };
            println!(
                "{} ({} triangles, isovalue {:.3}, {} bytes)",
                path.display(),
                artifact.triangle_count,
                artifact.isovalue,
                artifact.byte_len
            );
        }
        Commands::Voxels { scan_id, out } => {
            let pipeline = Arc::new(Pipeline::new(config, scans));
            let stream = pipeline
                .extract_voxel_stream_async(VoxelStreamRequest::new(scan_id))
                .await?;
            let json = serde_json::to_string(&stream)?;
            match out {
                Some(out) => std::fs::write(&out, json)
                    .with_context(|| format!("writing {}", out.display()))?,
                None => println!("{json}"),
            }
        }
        Commands::List => {
            for id in scans.list()? {
                println!("{id}");
            }
        }
        Commands::Sweep => {
            let store = ArtifactStore::new(config.working_dir.clone(), config.artifact_ttl());
            let removed = store.sweep_expired();
            info!(removed, root = %store.root().display(), "Sweep finished");
        }
    }

    Ok(())
}

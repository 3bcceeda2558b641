//! Binary mesh containers: STL and little-endian PLY.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::enums::MeshFormat;
use crate::mesh::Mesh;

const STL_HEADER_SIZE: usize = 80;
const STL_HEADER_TEXT: &[u8] = b"Binary STL generated by dicom-isosurface";
/// Bytes per STL facet: normal, three vertices, attribute count.
const STL_FACET_SIZE: usize = 12 + 36 + 2;

#[derive(Debug, Error)]
pub enum MeshWriteError {
    #[error("Mesh artifact at {path} is empty")]
    EmptyArtifact { path: String },

    #[error("Mesh has no triangles but a non-empty artifact was expected")]
    EmptyMesh,

    #[error("Mesh references vertex indices that do not exist")]
    InvalidIndices,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct MeshWriter;

impl MeshWriter {
    /// Write `mesh` to `path` and return the number of bytes on disk.
    ///
    /// An empty mesh is a valid result of extraction and is written as a
    /// container with zero facets, unless `expect_non_empty` is set.
    ///
    /// # Errors
    ///
    /// `EmptyMesh` when `expect_non_empty` is set and the mesh has no
    /// triangles, `EmptyArtifact` when the file ends up with zero bytes.
    pub fn write(
        mesh: &Mesh,
        format: MeshFormat,
        path: impl AsRef<Path>,
        expect_non_empty: bool,
    ) -> Result<u64, MeshWriteError> {
        let path = path.as_ref();
        if expect_non_empty && mesh.is_empty() {
            return Err(MeshWriteError::EmptyMesh);
        }
        if !mesh.validate_indices() {
            return Err(MeshWriteError::InvalidIndices);
        }

        let mut writer = BufWriter::new(File::create(path)?);
        match format {
            MeshFormat::Stl => write_stl(mesh, &mut writer)?,
            MeshFormat::Ply => write_ply(mesh, &mut writer)?,
        }
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        let byte_len = fs::metadata(path)?.len();
        if byte_len == 0 {
            return Err(MeshWriteError::EmptyArtifact {
                path: path.display().to_string(),
            });
        }

        debug!(
            path = %path.display(),
            format = format.extension(),
            byte_len,
            triangles = mesh.triangle_count(),
            "Wrote mesh artifact"
        );
        Ok(byte_len)
    }

    /// Encode `mesh` in memory.
    pub fn to_bytes(mesh: &Mesh, format: MeshFormat) -> Result<Vec<u8>, MeshWriteError> {
        if !mesh.validate_indices() {
            return Err(MeshWriteError::InvalidIndices);
        }
        let mut out = Vec::with_capacity(encoded_len_hint(mesh, format));
        match format {
            MeshFormat::Stl => write_stl(mesh, &mut out)?,
            MeshFormat::Ply => write_ply(mesh, &mut out)?,
        }
        Ok(out)
    }
}

fn encoded_len_hint(mesh: &Mesh, format: MeshFormat) -> usize {
    match format {
        MeshFormat::Stl => STL_HEADER_SIZE + 4 + mesh.triangle_count() * STL_FACET_SIZE,
        MeshFormat::Ply => 256 + mesh.vertex_count() * 12 + mesh.triangle_count() * 13,
    }
}

fn write_stl<W: Write>(mesh: &Mesh, writer: &mut W) -> std::io::Result<()> {
    // Fixed header text keeps artifacts byte-identical between runs.
    let mut header = [b' '; STL_HEADER_SIZE];
    header[..STL_HEADER_TEXT.len()].copy_from_slice(STL_HEADER_TEXT);
    writer.write_all(&header)?;

    let facet_count = mesh.triangle_count() as u32;
    writer.write_all(&facet_count.to_le_bytes())?;

    for &triangle in &mesh.triangles {
        for component in mesh.triangle_normal(triangle) {
            writer.write_all(&component.to_le_bytes())?;
        }
        for index in triangle {
            for coordinate in mesh.vertices[index as usize] {
                writer.write_all(&coordinate.to_le_bytes())?;
            }
        }
        writer.write_all(&0u16.to_le_bytes())?;
    }
    Ok(())
}

fn write_ply<W: Write>(mesh: &Mesh, writer: &mut W) -> std::io::Result<()> {
    write!(
        writer,
        "ply\nformat binary_little_endian 1.0\n\
         comment generated by dicom-isosurface\n\
         element vertex {}\n\
         property float x\nproperty float y\nproperty float z\n\
         element face {}\n\
         property list uchar uint vertex_indices\n\
         end_header\n",
        mesh.vertex_count(),
        mesh.triangle_count()
    )?;

    for vertex in &mesh.vertices {
        for coordinate in vertex {
            writer.write_all(&coordinate.to_le_bytes())?;
        }
    }
    for triangle in &mesh.triangles {
        writer.write_all(&[3u8])?;
        for index in triangle {
            writer.write_all(&index.to_le_bytes())?;
        }
    }
    Ok(())
}

//! Marching-cubes isosurface extraction.
//!
//! The grid is swept one slab (a single layer of cells along the slice axis)
//! at a time. Slabs are classified in parallel; each yields its triangles as
//! lattice-edge keys. The slabs are then merged in order on one thread, which
//! assigns vertex indices by first use, so the output is identical from run
//! to run regardless of scheduling.

mod tables;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ndarray::ArrayView3;
use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

use crate::mesh::Mesh;
use crate::volume::VoxelGrid;

use tables::{CORNERS, TRIANGULATION, edge_origin};

#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("Isovalue must be finite, got {0}")]
    NonFiniteIsovalue(f64),

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("Surface needs {0} vertices, more than 32-bit indices can address")]
    TooManyVertices(usize),
}

/// Shared flag checked between slabs.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub cancel: Option<CancellationToken>,
}

/// Lattice edge identifier: `corner_index * 3 + axis`, where the corner is the
/// edge's lower end in traversal order.
type EdgeKey = usize;

/// Triangulate the boundary of the region where samples are `>= isovalue`.
///
/// Vertices lie on lattice edges, linearly interpolated between the two
/// samples and scaled by the grid spacing; where the inside sample equals the
/// isovalue the vertex is placed at the edge midpoint, so no facet collapses
/// to zero area. Triangles are wound so normals point out of the region. A
/// grid whose samples are all equal has no boundary and yields an empty mesh.
pub fn extract(
    grid: &VoxelGrid,
    isovalue: f64,
    options: &ExtractOptions,
) -> Result<Mesh, ExtractError> {
    if !isovalue.is_finite() {
        return Err(ExtractError::NonFiniteIsovalue(isovalue));
    }

    let (depth, height, width) = grid.dim();
    if depth < 2 || height < 2 || width < 2 || grid.is_uniform() {
        return Ok(Mesh::new());
    }

    let view = grid.view();
    let slabs = (0..depth - 1)
        .into_par_iter()
        .map(|z| {
            if options.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                return Err(ExtractError::Cancelled);
            }
            Ok(sweep_slab(&view, z, isovalue))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mesh = merge_slabs(grid, isovalue, slabs)?;
    debug!(
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        isovalue,
        "Extracted isosurface"
    );
    Ok(mesh)
}

/// Classify every cell whose lower corner lies on slice `z`.
fn sweep_slab(view: &ArrayView3<'_, i32>, z: usize, isovalue: f64) -> Vec<[EdgeKey; 3]> {
    let (_, height, width) = view.dim();
    let mut triangles = Vec::new();

    for y in 0..height - 1 {
        for x in 0..width - 1 {
            let mut case = 0usize;
            for (bit, [dx, dy, dz]) in CORNERS.iter().enumerate() {
                if f64::from(view[[z + dz, y + dy, x + dx]]) >= isovalue {
                    case |= 1 << bit;
                }
            }

            for triangle in &TRIANGULATION[case] {
                triangles.push(triangle.map(|edge| edge_key(edge as usize, [x, y, z], height, width)));
            }
        }
    }
    triangles
}

fn edge_key(edge: usize, cell: [usize; 3], height: usize, width: usize) -> EdgeKey {
    let (offset, axis) = edge_origin(edge);
    let [x, y, z] = [cell[0] + offset[0], cell[1] + offset[1], cell[2] + offset[2]];
    ((z * height + y) * width + x) * 3 + axis
}

fn merge_slabs(
    grid: &VoxelGrid,
    isovalue: f64,
    slabs: Vec<Vec<[EdgeKey; 3]>>,
) -> Result<Mesh, ExtractError> {
    let mut mesh = Mesh::new();
    let mut vertex_index: HashMap<EdgeKey, u32> = HashMap::new();

    for triangle in slabs.into_iter().flatten() {
        let mut indices = [0u32; 3];
        for (slot, key) in indices.iter_mut().zip(triangle) {
            *slot = match vertex_index.get(&key) {
                Some(&index) => index,
                None => {
                    let index = u32::try_from(mesh.vertices.len())
                        .map_err(|_| ExtractError::TooManyVertices(mesh.vertices.len() + 1))?;
                    mesh.vertices.push(edge_vertex(grid, isovalue, key));
                    vertex_index.insert(key, index);
                    index
                }
            };
        }
        mesh.triangles.push(indices);
    }
    Ok(mesh)
}

/// Physical position of the isovalue crossing on a lattice edge.
fn edge_vertex(grid: &VoxelGrid, isovalue: f64, key: EdgeKey) -> [f32; 3] {
    let (_, height, width) = grid.dim();
    let axis = key % 3;
    let corner = key / 3;
    let lower = [corner % width, (corner / width) % height, corner / (width * height)];
    let mut upper = lower;
    upper[axis] += 1;

    let view = grid.view();
    let sample = |[x, y, z]: [usize; 3]| f64::from(view[[z, y, x]]);
    let (a, b) = (sample(lower), sample(upper));
    // a and b lie on opposite sides of the isovalue, so they differ. An inside
    // sample exactly at the isovalue would put the vertex on the lattice point;
    // those crossings sit mid-edge instead.
    let t = if a == isovalue || b == isovalue {
        0.5
    } else {
        (isovalue - a) / (b - a)
    };

    let (sx, sy, sz) = grid.spacing();
    let spacing = [f64::from(sx), f64::from(sy), f64::from(sz)];
    let mut position = [0f32; 3];
    for i in 0..3 {
        let along = if i == axis { t } else { 0.0 };
        position[i] = ((lower[i] as f64 + along) * spacing[i]) as f32;
    }
    position
}

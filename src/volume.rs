use ndarray::{Array3, ArrayView3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VolumeError {
    #[error("Volume has a zero-length axis: {0:?}")]
    EmptyAxis((usize, usize, usize)),

    #[error("Expected {expected} samples for shape {shape:?}, got {actual}")]
    LengthMismatch {
        shape: (usize, usize, usize),
        expected: usize,
        actual: usize,
    },
}

/// Storage description of the samples a grid was decoded from.
///
/// Grids hold samples as `i32`, which covers every 8 and 16 bit source, signed
/// or not. Sources with more bits allocated are rejected by the loader, since
/// unsigned 32 bit values above `i32::MAX` have no faithful `i32` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    /// Bits allocated per stored sample (8 or 16).
    pub bits_allocated: u16,
    pub signed: bool,
}

impl Default for SampleFormat {
    fn default() -> Self {
        Self {
            bits_allocated: 16,
            signed: false,
        }
    }
}

/// A dense, immutable intensity volume.
///
/// Samples are stored as `(depth, height, width)` in standard layout, so the
/// column index varies fastest, then the row, then the slice. Spacing is
/// `(x, y, z)` in millimetres and defaults to unit spacing.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    data: Array3<i32>,
    spacing: (f32, f32, f32),
    format: SampleFormat,
}

impl VoxelGrid {
    pub fn new(
        data: Array3<i32>,
        spacing: (f32, f32, f32),
        format: SampleFormat,
    ) -> Result<Self, VolumeError> {
        let dim = data.dim();
        if dim.0 == 0 || dim.1 == 0 || dim.2 == 0 {
            return Err(VolumeError::EmptyAxis(dim));
        }
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Ok(Self {
            data,
            spacing,
            format,
        })
    }

    /// Build a grid from samples already in traversal order.
    pub fn from_shape_vec(
        shape: (usize, usize, usize),
        samples: Vec<i32>,
        spacing: (f32, f32, f32),
        format: SampleFormat,
    ) -> Result<Self, VolumeError> {
        let expected = shape.0 * shape.1 * shape.2;
        if samples.len() != expected {
            return Err(VolumeError::LengthMismatch {
                shape,
                expected,
                actual: samples.len(),
            });
        }
        let data = Array3::from_shape_vec(shape, samples).map_err(|_| {
            VolumeError::LengthMismatch {
                shape,
                expected,
                actual: expected,
            }
        })?;
        Self::new(data, spacing, format)
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Dimensions as `(nx, ny, nz)`: columns, rows, slices.
    pub fn dimensions(&self) -> (usize, usize, usize) {
        let (depth, height, width) = self.data.dim();
        (width, height, depth)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn spacing(&self) -> (f32, f32, f32) {
        self.spacing
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn view(&self) -> ArrayView3<'_, i32> {
        self.data.view()
    }

    /// Samples in traversal order.
    pub fn samples(&self) -> &[i32] {
        // Standard layout is established in the constructor.
        self.data.as_slice().unwrap_or(&[])
    }

    /// Returns `(min, max)` over all samples.
    pub fn value_range(&self) -> (i32, i32) {
        self.samples()
            .iter()
            .fold((i32::MAX, i32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    pub fn is_uniform(&self) -> bool {
        let (lo, hi) = self.value_range();
        lo == hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_2x2x2() -> VoxelGrid {
        VoxelGrid::from_shape_vec(
            (2, 2, 2),
            (0..8).collect(),
            (0.5, 0.5, 2.0),
            SampleFormat::default(),
        )
        .unwrap()
    }

    #[test]
    fn dimensions_are_reported_both_ways() {
        let grid = VoxelGrid::from_shape_vec(
            (4, 3, 2),
            vec![0; 24],
            (1.0, 1.0, 1.0),
            SampleFormat::default(),
        )
        .unwrap();
        assert_eq!(grid.dim(), (4, 3, 2));
        assert_eq!(grid.dimensions(), (2, 3, 4));
        assert_eq!(grid.len(), 24);
    }

    #[test]
    fn samples_follow_traversal_order() {
        let grid = grid_2x2x2();
        assert_eq!(grid.samples(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(grid.view()[[1, 0, 1]], 5);
        assert_eq!(grid.view()[[1, 1, 0]], 6);
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = VoxelGrid::from_shape_vec(
            (2, 2, 2),
            vec![0; 7],
            (1.0, 1.0, 1.0),
            SampleFormat::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            VolumeError::LengthMismatch {
                shape: (2, 2, 2),
                expected: 8,
                actual: 7
            }
        );
    }

    #[test]
    fn rejects_empty_axis() {
        let err = VoxelGrid::new(
            Array3::zeros((0, 4, 4)),
            (1.0, 1.0, 1.0),
            SampleFormat::default(),
        )
        .unwrap_err();
        assert_eq!(err, VolumeError::EmptyAxis((0, 4, 4)));
    }

    #[test]
    fn non_standard_layout_is_normalized() {
        let transposed = Array3::from_shape_vec((2, 2, 2), (0..8).collect())
            .unwrap()
            .reversed_axes();
        let grid = VoxelGrid::new(transposed, (1.0, 1.0, 1.0), SampleFormat::default()).unwrap();
        assert_eq!(grid.samples().len(), 8);
        assert_eq!(grid.view()[[1, 0, 0]], 1);
    }

    #[test]
    fn value_range_and_uniformity() {
        let grid = grid_2x2x2();
        assert_eq!(grid.value_range(), (0, 7));
        assert!(!grid.is_uniform());

        let flat = VoxelGrid::from_shape_vec(
            (2, 2, 2),
            vec![3; 8],
            (1.0, 1.0, 1.0),
            SampleFormat::default(),
        )
        .unwrap();
        assert!(flat.is_uniform());
    }
}

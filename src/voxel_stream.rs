//! Self-describing raw voxel stream for client-side volume reconstruction.
//!
//! The payload holds every sample of the grid in traversal order (columns
//! fastest, then rows, then slices), written as little-endian unsigned
//! integers of the configured width and base64 encoded. `shape` lists the
//! axes slowest first, so a row-major reshape by `shape` restores the grid.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::{OutputSampleWidth, OverflowPolicy};
use crate::volume::VoxelGrid;

#[derive(Debug, Error)]
pub enum VoxelStreamError {
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Unsupported sample width {0}")]
    UnsupportedWidth(u16),

    #[error("Payload holds {actual} bytes, shape {shape:?} at {bits} bits needs {expected}")]
    LengthMismatch {
        shape: [usize; 3],
        bits: u16,
        expected: usize,
        actual: usize,
    },
}

/// JSON body served to the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedVoxelStream {
    pub pixel_array: String,
    /// `[slices, rows, columns]`
    pub shape: [usize; 3],
    pub sample_width: u16,
}

impl EncodedVoxelStream {
    /// Reverse the transport encoding, returning one value per sample in
    /// traversal order.
    pub fn decode_payload(&self) -> Result<Vec<u32>, VoxelStreamError> {
        let width = OutputSampleWidth::try_from(self.sample_width)
            .map_err(|_| VoxelStreamError::UnsupportedWidth(self.sample_width))?;
        let bytes = STANDARD.decode(&self.pixel_array)?;

        let expected = self.shape.iter().product::<usize>() * width.bytes();
        if bytes.len() != expected {
            return Err(VoxelStreamError::LengthMismatch {
                shape: self.shape,
                bits: self.sample_width,
                expected,
                actual: bytes.len(),
            });
        }

        Ok(bytes
            .chunks_exact(width.bytes())
            .map(|chunk| match width {
                OutputSampleWidth::U8 => u32::from(chunk[0]),
                OutputSampleWidth::U16 => u32::from(u16::from_le_bytes([chunk[0], chunk[1]])),
                OutputSampleWidth::U32 => {
                    u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
                }
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VoxelStreamEncoder {
    width: OutputSampleWidth,
    policy: OverflowPolicy,
}

impl VoxelStreamEncoder {
    pub fn new(width: OutputSampleWidth, policy: OverflowPolicy) -> Self {
        Self { width, policy }
    }

    pub fn encode(&self, grid: &VoxelGrid) -> EncodedVoxelStream {
        let (depth, height, width) = grid.dim();
        let bytes = self.encode_samples(grid.samples());

        EncodedVoxelStream {
            pixel_array: STANDARD.encode(bytes),
            shape: [depth, height, width],
            sample_width: self.width.bits(),
        }
    }

    fn encode_samples(&self, samples: &[i32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(samples.len() * self.width.bytes());
        for &sample in samples {
            let value = self.convert(sample);
            match self.width {
                OutputSampleWidth::U8 => out.push(value as u8),
                OutputSampleWidth::U16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
                OutputSampleWidth::U32 => out.extend_from_slice(&value.to_le_bytes()),
            }
        }
        out
    }

    /// Map a sample onto the output range according to the overflow policy.
    pub fn convert(&self, sample: i32) -> u32 {
        match self.policy {
            // Truncation to the output width happens when the value is
            // written; here only the bit pattern is reinterpreted.
            OverflowPolicy::Wrap => (sample as u32) & self.width.max_value(),
            OverflowPolicy::Saturate => {
                (sample.max(0) as u32).min(self.width.max_value())
            }
        }
    }
}

#![allow(dead_code)]

mod dicom_fixture;

use std::path::Path;
use std::sync::Arc;

use dicom_isosurface::{InMemoryScanSource, Pipeline, PipelineConfig};

pub use dicom_fixture::*;

/// Cube of `size` samples, zero except for an `inner`-sized block of `value`
/// whose lower corner sits at `offset` on every axis.
pub fn block_scan(size: usize, offset: usize, inner: usize, value: i32) -> Vec<u8> {
    let mut samples = vec![0; size * size * size];
    for z in offset..offset + inner {
        for y in offset..offset + inner {
            for x in offset..offset + inner {
                samples[(z * size + y) * size + x] = value;
            }
        }
    }
    dicom_bytes(&MultiFrame::new((size, size, size), samples))
}

pub fn uniform_scan(size: usize, value: i32) -> Vec<u8> {
    dicom_bytes(&MultiFrame::new(
        (size, size, size),
        vec![value; size * size * size],
    ))
}

/// Pipeline writing its artifacts below `root` and serving the given scans.
pub fn pipeline(root: &Path, scans: Vec<(&str, Vec<u8>)>) -> Arc<Pipeline> {
    let config = PipelineConfig {
        working_dir: root.join("work"),
        ..PipelineConfig::default()
    };
    let source = InMemoryScanSource::new();
    for (id, bytes) in scans {
        source.insert(id, bytes);
    }
    Arc::new(Pipeline::new(config, Arc::new(source)))
}

/// Facet count stored in a binary STL header.
pub fn stl_facet_count(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]])
}

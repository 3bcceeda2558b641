use crate::{
    enums::SortBy,
    volume::{SampleFormat, VolumeError, VoxelGrid},
};

use dicom::{
    core::value::Value,
    object::{FileDicomObject, InMemDicomObject, from_reader, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder},
};
use dicom_dictionary_std::tags;
use ndarray::{Array3, Axis, s};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("Scan not found: {0}")]
    NotFound(PathBuf),

    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Not a DICOM stream (missing DICM magic)")]
    NotDicom,

    #[error("DICOM object carries no pixel data")]
    NoPixelData,

    #[error("Pixel data truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Unsupported samples per pixel: {0}")]
    UnsupportedSamplesPerPixel(usize),

    #[error("Unsupported bits allocated: {0} (8 or 16 expected)")]
    UnsupportedBitsAllocated(u16),

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Pixel data error: {0}")]
    PixelData(#[from] dicom::pixeldata::Error),

    #[error(transparent)]
    Volume(#[from] VolumeError),
}

type DicomFile = FileDicomObject<InMemDicomObject>;

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from an in-memory DICOM stream
    ///
    /// The stream may start with the 128 byte preamble or directly with the
    /// `DICM` magic code. All frames of the object become slices of the
    /// volume.
    ///
    /// # Errors
    ///
    /// Returns error if the stream is not DICOM, carries no pixel data or
    /// the pixel data cannot be decoded
    pub fn load_from_bytes(bytes: &[u8]) -> Result<VoxelGrid, VolumeLoaderError> {
        let body = Self::strip_preamble(bytes).ok_or(VolumeLoaderError::NotDicom)?;
        let object = from_reader(body)?;
        Self::load_from_dicom_objects(&[object], SortBy::None)
    }

    /// Load a volume from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found or dimensions are inconsistent
    pub fn load_from_dicom_objects(
        dicom_objects: &[DicomFile],
        sort_by: SortBy,
    ) -> Result<VoxelGrid, VolumeLoaderError> {
        if dicom_objects.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        let mut frames_with_order = dicom_objects
            .par_iter()
            .map(|dicom_object| {
                let order = Self::get_sort_order(dicom_object, &sort_by);
                Self::decode_frames(dicom_object).map(|frames| (order, frames))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::sort_images(&mut frames_with_order, sort_by);

        let stacks: Vec<_> = frames_with_order
            .into_iter()
            .map(|(_, frames)| frames)
            .collect();

        let volume_array = Self::build_volume_array(&stacks)?;
        let spacing = Self::get_spacing(dicom_objects);
        let format = Self::get_sample_format(&dicom_objects[0]);

        debug!(
            dim = ?volume_array.dim(),
            ?spacing,
            bits = format.bits_allocated,
            signed = format.signed,
            "Decoded DICOM volume"
        );

        Ok(VoxelGrid::new(volume_array, spacing, format)?)
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<VoxelGrid, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                if !path.exists() {
                    return Err(VolumeLoaderError::NotFound(path.to_path_buf()));
                }
                Ok(open_file(path)?)
            })
            .collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<VoxelGrid, VolumeLoaderError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(VolumeLoaderError::NotFound(path.to_path_buf()));
        }

        let mut paths: Vec<_> = fs::read_dir(path)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        // read_dir order is platform dependent
        paths.sort();

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn strip_preamble(bytes: &[u8]) -> Option<&[u8]> {
        if bytes.len() >= PREAMBLE_LEN + MAGIC.len()
            && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC
        {
            Some(&bytes[PREAMBLE_LEN..])
        } else if bytes.starts_with(MAGIC) {
            Some(bytes)
        } else {
            None
        }
    }

    fn get_sort_order(dicom_object: &DicomFile, sort_by: &SortBy) -> Option<f32> {
        match sort_by {
            SortBy::ImagePositionPatient => dicom_object
                .element(tags::IMAGE_POSITION_PATIENT)
                .ok()?
                .to_multi_float32()
                .ok()?
                .get(2)
                .copied(),
            SortBy::TablePosition => dicom_object
                .element(tags::TABLE_POSITION)
                .ok()?
                .to_float32()
                .ok(),
            SortBy::InstanceNumber => dicom_object
                .element(tags::INSTANCE_NUMBER)
                .ok()?
                .to_int::<i32>()
                .ok()
                .map(|n| n as f32),
            SortBy::None => Some(0.0),
        }
    }

    /// Decode every frame of one object into a `(frames, rows, columns)` array
    /// of raw stored values.
    fn decode_frames(dicom_object: &DicomFile) -> Result<Array3<i32>, VolumeLoaderError> {
        Self::check_pixel_payload(dicom_object)?;
        let format = Self::get_sample_format(dicom_object);
        if format.bits_allocated > 16 {
            return Err(VolumeLoaderError::UnsupportedBitsAllocated(
                format.bits_allocated,
            ));
        }

        let pixel_data = dicom_object.decode_pixel_data()?;
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
        let frames = pixel_data.to_ndarray_with_options::<i32>(&options)?;

        let samples_per_pixel = frames.dim().3;
        if samples_per_pixel != 1 {
            return Err(VolumeLoaderError::UnsupportedSamplesPerPixel(
                samples_per_pixel,
            ));
        }
        Ok(frames.slice_move(s![.., .., .., 0]))
    }

    /// Distinguish a missing or empty payload from a truncated one before
    /// handing the object to the decoder.
    fn check_pixel_payload(dicom_object: &DicomFile) -> Result<(), VolumeLoaderError> {
        let element = dicom_object
            .get(tags::PIXEL_DATA)
            .ok_or(VolumeLoaderError::NoPixelData)?;

        match element.value() {
            Value::Primitive(value) => {
                let actual = value.calculate_byte_len();
                if actual == 0 {
                    return Err(VolumeLoaderError::NoPixelData);
                }
                let expected = Self::expected_native_len(dicom_object);
                if expected > 0 && actual < expected {
                    return Err(VolumeLoaderError::Truncated { expected, actual });
                }
                Ok(())
            }
            Value::PixelSequence(sequence) => {
                if sequence.fragments().is_empty() {
                    Err(VolumeLoaderError::NoPixelData)
                } else {
                    Ok(())
                }
            }
            Value::Sequence(_) => Err(VolumeLoaderError::NoPixelData),
        }
    }

    /// Byte length native pixel data must have, or 0 if the image attributes
    /// are incomplete (the decoder then reports the problem).
    fn expected_native_len(dicom_object: &DicomFile) -> usize {
        let read_usize = |tag| {
            dicom_object
                .element(tag)
                .ok()
                .and_then(|element| element.to_int::<u32>().ok())
                .map(|value| value as usize)
        };

        let (Some(rows), Some(columns), Some(bits)) = (
            read_usize(tags::ROWS),
            read_usize(tags::COLUMNS),
            read_usize(tags::BITS_ALLOCATED),
        ) else {
            return 0;
        };
        let frames = read_usize(tags::NUMBER_OF_FRAMES).unwrap_or(1).max(1);
        let samples = read_usize(tags::SAMPLES_PER_PIXEL).unwrap_or(1).max(1);

        (rows * columns * frames * samples * bits).div_ceil(8)
    }

    fn sort_images(images_with_order: &mut [(Option<f32>, Array3<i32>)], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            images_with_order
                .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        }

        if matches!(sort_by, SortBy::ImagePositionPatient) {
            images_with_order.reverse();
        }
    }

    fn build_volume_array(stacks: &[Array3<i32>]) -> Result<Array3<i32>, VolumeLoaderError> {
        let (_, height, width) = stacks[0].dim();
        if stacks
            .iter()
            .any(|stack| stack.dim().1 != height || stack.dim().2 != width)
        {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }

        if let [single] = stacks {
            return Ok(single.clone());
        }

        let views: Vec<_> = stacks.iter().map(|stack| stack.view()).collect();
        ndarray::concatenate(Axis(0), &views)
            .map_err(|_| VolumeLoaderError::InconsistentDimensions)
    }

    /// Spacing as `(x, y, z)`. Looks at the top-level attributes first, then
    /// at the shared functional groups of enhanced multi-frame objects.
    /// Missing values fall back to 1.0.
    fn get_spacing(dicom_objects: &[DicomFile]) -> (f32, f32, f32) {
        let top_level = dicom_objects
            .iter()
            .find_map(|dicom_object| Self::spacing_from(dicom_object));

        let spacing = top_level.or_else(|| {
            dicom_objects.iter().find_map(|dicom_object| {
                let shared = dicom_object
                    .element(tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE)
                    .ok()?
                    .items()?
                    .first()?;
                let measures = shared
                    .element(tags::PIXEL_MEASURES_SEQUENCE)
                    .ok()?
                    .items()?
                    .first()?;
                Self::spacing_from(measures)
            })
        });

        spacing.unwrap_or((1.0, 1.0, 1.0))
    }

    fn spacing_from(dicom_object: &InMemDicomObject) -> Option<(f32, f32, f32)> {
        let pixel_spacing = dicom_object
            .element(tags::PIXEL_SPACING)
            .ok()?
            .to_multi_float32()
            .ok()?;
        let (row_spacing, column_spacing) = match pixel_spacing.as_slice() {
            [row, column, ..] => (*row, *column),
            [both] => (*both, *both),
            [] => return None,
        };

        let slice_spacing = [tags::SPACING_BETWEEN_SLICES, tags::SLICE_THICKNESS]
            .into_iter()
            .find_map(|tag| dicom_object.element(tag).ok()?.to_float32().ok())
            .filter(|spacing| *spacing > 0.0)
            .unwrap_or(1.0);

        Some((column_spacing, row_spacing, slice_spacing))
    }

    fn get_sample_format(dicom_object: &DicomFile) -> SampleFormat {
        let defaults = SampleFormat::default();
        let bits_allocated = dicom_object
            .element(tags::BITS_ALLOCATED)
            .ok()
            .and_then(|element| element.to_int::<u16>().ok())
            .unwrap_or(defaults.bits_allocated);
        let signed = dicom_object
            .element(tags::PIXEL_REPRESENTATION)
            .ok()
            .and_then(|element| element.to_int::<u16>().ok())
            .map_or(defaults.signed, |representation| representation == 1);

        SampleFormat {
            bits_allocated,
            signed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MultiFrame, dicom_bytes};

    #[test]
    fn loads_multi_frame_stream() {
        let bytes = dicom_bytes(&MultiFrame::new((2, 2, 3), (0..12).collect()));
        let grid = VolumeLoader::load_from_bytes(&bytes).unwrap();

        assert_eq!(grid.dim(), (2, 2, 3));
        assert_eq!(grid.samples(), (0..12).collect::<Vec<_>>().as_slice());
        assert_eq!(grid.format().bits_allocated, 16);
        assert!(!grid.format().signed);
    }

    #[test]
    fn accepts_stream_with_preamble() {
        let bytes = dicom_bytes(&MultiFrame::new((1, 2, 2), vec![1, 2, 3, 4]));
        assert_eq!(&bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()], MAGIC);

        let grid = VolumeLoader::load_from_bytes(&bytes).unwrap();
        assert_eq!(grid.samples(), &[1, 2, 3, 4]);
    }

    #[test]
    fn accepts_stream_starting_at_magic() {
        let bytes = dicom_bytes(&MultiFrame::new((1, 2, 2), vec![1, 2, 3, 4]));
        let body = &bytes[PREAMBLE_LEN..];
        assert!(body.starts_with(MAGIC));

        let grid = VolumeLoader::load_from_bytes(body).unwrap();
        assert_eq!(grid.samples(), &[1, 2, 3, 4]);
    }

    #[test]
    fn doubled_preamble_is_not_dicom() {
        let mut bytes = vec![0u8; PREAMBLE_LEN];
        bytes.extend_from_slice(&dicom_bytes(&MultiFrame::new((1, 1, 1), vec![1])));
        let result = VolumeLoader::load_from_bytes(&bytes);
        assert!(matches!(result, Err(VolumeLoaderError::NotDicom)));
    }

    #[test]
    fn reads_signed_samples_and_spacing() {
        let fixture = MultiFrame::new((1, 1, 3), vec![-5, 0, 7])
            .signed()
            .with_spacing([0.5, 0.25], 2.0);
        let grid = VolumeLoader::load_from_bytes(&dicom_bytes(&fixture)).unwrap();

        assert_eq!(grid.samples(), &[-5, 0, 7]);
        assert!(grid.format().signed);
        assert_eq!(grid.spacing(), (0.25, 0.5, 2.0));
    }

    #[test]
    fn missing_spacing_defaults_to_unit() {
        let grid = VolumeLoader::load_from_bytes(&dicom_bytes(&MultiFrame::new(
            (1, 2, 2),
            vec![0; 4],
        )))
        .unwrap();
        assert_eq!(grid.spacing(), (1.0, 1.0, 1.0));
    }

    #[test]
    fn rejects_non_dicom_bytes() {
        let result = VolumeLoader::load_from_bytes(b"definitely not a scan");
        assert!(matches!(result, Err(VolumeLoaderError::NotDicom)));
    }

    #[test]
    fn rejects_object_without_pixel_data() {
        let bytes = dicom_bytes(&MultiFrame::new((2, 2, 2), Vec::new()).without_pixel_data());
        let result = VolumeLoader::load_from_bytes(&bytes);
        assert!(matches!(result, Err(VolumeLoaderError::NoPixelData)));
    }

    #[test]
    fn rejects_truncated_pixel_data() {
        // Header announces 2x2x2 but only 5 samples are present.
        let bytes = dicom_bytes(&MultiFrame::new((2, 2, 2), vec![1, 2, 3, 4, 5]));
        let result = VolumeLoader::load_from_bytes(&bytes);
        assert!(matches!(
            result,
            Err(VolumeLoaderError::Truncated {
                expected: 16,
                actual: 10
            })
        ));
    }

    #[test]
    fn rejects_32_bit_samples() {
        let fixture = MultiFrame::new((1, 1, 2), vec![1, i32::MAX]).with_bits_allocated(32);
        let result = VolumeLoader::load_from_bytes(&dicom_bytes(&fixture));
        assert!(matches!(
            result,
            Err(VolumeLoaderError::UnsupportedBitsAllocated(32))
        ));
    }

    #[test]
    fn missing_directory_is_not_found() {
        let result = VolumeLoader::load_from_directory("does/not/exist", SortBy::None);
        assert!(matches!(result, Err(VolumeLoaderError::NotFound(_))));
    }

    #[test]
    fn loads_sorted_series_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        for (name, instance, value) in [("b.dcm", 2, 20), ("a.dcm", 3, 30), ("c.dcm", 1, 10)] {
            let fixture =
                MultiFrame::new((1, 1, 2), vec![value, value + 1]).with_instance_number(instance);
            fs::write(dir.path().join(name), dicom_bytes(&fixture)).unwrap();
        }

        let grid = VolumeLoader::load_from_directory(dir.path(), SortBy::InstanceNumber).unwrap();
        assert_eq!(grid.dim(), (3, 1, 2));
        assert_eq!(grid.samples(), &[10, 11, 20, 21, 30, 31]);
    }

    #[test]
    fn series_with_mismatched_frames_is_rejected() {
        let objects = [
            MultiFrame::new((1, 2, 2), vec![0; 4]),
            MultiFrame::new((1, 3, 2), vec![0; 6]),
        ]
        .iter()
        .map(|fixture| from_reader(dicom_bytes(fixture).as_slice()).unwrap())
        .collect::<Vec<_>>();

        let result = VolumeLoader::load_from_dicom_objects(&objects, SortBy::None);
        assert!(matches!(
            result,
            Err(VolumeLoaderError::InconsistentDimensions)
        ));
    }
}

//! Builds small DICOM Part 10 streams in memory for loader and pipeline tests.

#![allow(dead_code)]

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::tags;

const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";

/// A single multi-frame monochrome object, 16 bits per sample unless set.
#[derive(Debug, Clone)]
pub struct MultiFrame {
    /// `(frames, rows, columns)`
    pub shape: (usize, usize, usize),
    pub samples: Vec<i32>,
    pub signed: bool,
    pub bits_allocated: u16,
    pub pixel_spacing: Option<[f32; 2]>,
    pub slice_thickness: Option<f32>,
    pub instance_number: Option<i32>,
    pub pixel_data: bool,
}

impl MultiFrame {
    pub fn new(shape: (usize, usize, usize), samples: Vec<i32>) -> Self {
        Self {
            shape,
            samples,
            signed: false,
            bits_allocated: 16,
            pixel_spacing: None,
            slice_thickness: None,
            instance_number: None,
            pixel_data: true,
        }
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    /// Bits allocated per sample, 16 or 32.
    pub fn with_bits_allocated(mut self, bits_allocated: u16) -> Self {
        self.bits_allocated = bits_allocated;
        self
    }

    /// `pixel_spacing` is `[row spacing, column spacing]` as stored in DICOM.
    pub fn with_spacing(mut self, pixel_spacing: [f32; 2], slice_thickness: f32) -> Self {
        self.pixel_spacing = Some(pixel_spacing);
        self.slice_thickness = Some(slice_thickness);
        self
    }

    pub fn with_instance_number(mut self, instance_number: i32) -> Self {
        self.instance_number = Some(instance_number);
        self
    }

    pub fn without_pixel_data(mut self) -> Self {
        self.pixel_data = false;
        self
    }
}

/// Encode the fixture as a Part 10 file: the 128-byte preamble, the `DICM`
/// magic code, then the meta group and data set.
pub fn dicom_bytes(fixture: &MultiFrame) -> Vec<u8> {
    let (frames, rows, columns) = fixture.shape;
    let mut object = InMemDicomObject::new_empty();

    let us = |value: u16| PrimitiveValue::from(value);
    object.put(DataElement::new(
        tags::SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(CT_IMAGE_STORAGE),
    ));
    object.put(DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, us(1)));
    object.put(DataElement::new(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        PrimitiveValue::from("MONOCHROME2"),
    ));
    object.put(DataElement::new(
        tags::NUMBER_OF_FRAMES,
        VR::IS,
        PrimitiveValue::from(frames.to_string()),
    ));
    object.put(DataElement::new(tags::ROWS, VR::US, us(rows as u16)));
    object.put(DataElement::new(tags::COLUMNS, VR::US, us(columns as u16)));
    let bits = fixture.bits_allocated;
    object.put(DataElement::new(tags::BITS_ALLOCATED, VR::US, us(bits)));
    object.put(DataElement::new(tags::BITS_STORED, VR::US, us(bits)));
    object.put(DataElement::new(tags::HIGH_BIT, VR::US, us(bits - 1)));
    object.put(DataElement::new(
        tags::PIXEL_REPRESENTATION,
        VR::US,
        us(u16::from(fixture.signed)),
    ));

    if let Some([row, column]) = fixture.pixel_spacing {
        object.put(DataElement::new(
            tags::PIXEL_SPACING,
            VR::DS,
            PrimitiveValue::from(format!("{row}\\{column}")),
        ));
    }
    if let Some(thickness) = fixture.slice_thickness {
        object.put(DataElement::new(
            tags::SLICE_THICKNESS,
            VR::DS,
            PrimitiveValue::from(thickness.to_string()),
        ));
    }
    if let Some(instance) = fixture.instance_number {
        object.put(DataElement::new(
            tags::INSTANCE_NUMBER,
            VR::IS,
            PrimitiveValue::from(instance.to_string()),
        ));
    }
    if fixture.pixel_data {
        let words: Vec<u16> = if bits == 32 {
            fixture
                .samples
                .iter()
                .flat_map(|&sample| {
                    let value = sample as u32;
                    [value as u16, (value >> 16) as u16]
                })
                .collect()
        } else {
            fixture
                .samples
                .iter()
                .map(|&sample| sample as i16 as u16)
                .collect()
        };
        object.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::U16(words.into()),
        ));
    }

    let file = object
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(EXPLICIT_VR_LE)
                .media_storage_sop_class_uid(CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid("2.25.1"),
        )
        .expect("fixture meta should be complete");

    let mut bytes = Vec::new();
    file.write_all(&mut bytes)
        .expect("fixture should serialize");
    bytes
}

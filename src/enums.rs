use serde::{Deserialize, Serialize};

/// Key used to order the objects of a slice series before stacking them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

/// Container written by the mesh serializer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshFormat {
    #[default]
    Stl,
    Ply,
}

impl MeshFormat {
    pub fn extension(self) -> &'static str {
        match self {
            MeshFormat::Stl => "stl",
            MeshFormat::Ply => "ply",
        }
    }
}

/// Unsigned sample width of an encoded voxel stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum OutputSampleWidth {
    U8,
    #[default]
    U16,
    U32,
}

impl OutputSampleWidth {
    pub fn bits(self) -> u16 {
        match self {
            OutputSampleWidth::U8 => 8,
            OutputSampleWidth::U16 => 16,
            OutputSampleWidth::U32 => 32,
        }
    }

    pub fn bytes(self) -> usize {
        usize::from(self.bits() / 8)
    }

    /// Largest representable value.
    pub fn max_value(self) -> u32 {
        match self {
            OutputSampleWidth::U8 => u32::from(u8::MAX),
            OutputSampleWidth::U16 => u32::from(u16::MAX),
            OutputSampleWidth::U32 => u32::MAX,
        }
    }
}

impl TryFrom<u16> for OutputSampleWidth {
    type Error = String;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(OutputSampleWidth::U8),
            16 => Ok(OutputSampleWidth::U16),
            32 => Ok(OutputSampleWidth::U32),
            other => Err(format!(
                "unsupported output sample width {other} (expected 8, 16 or 32)"
            )),
        }
    }
}

impl From<OutputSampleWidth> for u16 {
    fn from(width: OutputSampleWidth) -> Self {
        width.bits()
    }
}

/// How samples that do not fit the output width are written.
///
/// `Wrap` keeps the low bits of the two's-complement value, which is what an
/// unsigned integer cast does (`-1` becomes `65535` at 16 bits, `70000`
/// becomes `4464`). `Saturate` clamps to `[0, max]`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    #[default]
    Wrap,
    Saturate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_width_from_bits() {
        assert_eq!(OutputSampleWidth::try_from(8), Ok(OutputSampleWidth::U8));
        assert_eq!(OutputSampleWidth::try_from(16), Ok(OutputSampleWidth::U16));
        assert_eq!(OutputSampleWidth::try_from(32), Ok(OutputSampleWidth::U32));
        assert!(OutputSampleWidth::try_from(12).is_err());
    }

    #[test]
    fn output_width_sizes() {
        assert_eq!(OutputSampleWidth::U16.bytes(), 2);
        assert_eq!(OutputSampleWidth::U8.max_value(), 255);
        assert_eq!(u16::from(OutputSampleWidth::U32), 32);
    }

    #[test]
    fn mesh_format_extension() {
        assert_eq!(MeshFormat::Stl.extension(), "stl");
        assert_eq!(MeshFormat::Ply.extension(), "ply");
    }
}

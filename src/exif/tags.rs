//! Tag numbers, field types and the orientation enum.

use num_enum::{IntoPrimitive, TryFromPrimitive};

// IFD0 / IFD1
pub const IMAGE_WIDTH: u16 = 0x0100;
pub const IMAGE_LENGTH: u16 = 0x0101;
pub const COMPRESSION: u16 = 0x0103;
pub const ORIENTATION: u16 = 0x0112;
pub const JPEG_INTERCHANGE_FORMAT: u16 = 0x0201;
pub const JPEG_INTERCHANGE_FORMAT_LENGTH: u16 = 0x0202;
pub const EXIF_IFD_POINTER: u16 = 0x8769;

// Exif IFD
pub const PIXEL_X_DIMENSION: u16 = 0xA002;
pub const PIXEL_Y_DIMENSION: u16 = 0xA003;
pub const INTEROPERABILITY_IFD_POINTER: u16 = 0xA005;

// Interoperability IFD
pub const RELATED_IMAGE_WIDTH: u16 = 0x1001;
pub const RELATED_IMAGE_LENGTH: u16 = 0x1002;

/// Compression value of a JPEG thumbnail in IFD1.
pub const COMPRESSION_JPEG: u32 = 6;

pub const FORMAT_BYTE: u16 = 1;
pub const FORMAT_ASCII: u16 = 2;
pub const FORMAT_SHORT: u16 = 3;
pub const FORMAT_LONG: u16 = 4;
pub const FORMAT_RATIONAL: u16 = 5;
pub const FORMAT_SBYTE: u16 = 6;
pub const FORMAT_UNDEFINED: u16 = 7;
pub const FORMAT_SSHORT: u16 = 8;
pub const FORMAT_SLONG: u16 = 9;
pub const FORMAT_SRATIONAL: u16 = 10;
pub const FORMAT_FLOAT: u16 = 11;
pub const FORMAT_DOUBLE: u16 = 12;

/// Size in bytes of one value of the given field type.
pub fn format_size(format: u16) -> Option<usize> {
    match format {
        FORMAT_BYTE | FORMAT_ASCII | FORMAT_SBYTE | FORMAT_UNDEFINED => Some(1),
        FORMAT_SHORT | FORMAT_SSHORT => Some(2),
        FORMAT_LONG | FORMAT_SLONG | FORMAT_FLOAT => Some(4),
        FORMAT_RATIONAL | FORMAT_SRATIONAL | FORMAT_DOUBLE => Some(8),
        _ => None,
    }
}

/// Field type for a tag created from scratch.
pub fn format_for_new_tag(tag: u16, value: u32) -> u16 {
    match tag {
        EXIF_IFD_POINTER
        | INTEROPERABILITY_IFD_POINTER
        | JPEG_INTERCHANGE_FORMAT
        | JPEG_INTERCHANGE_FORMAT_LENGTH => FORMAT_LONG,
        _ if value <= u16::MAX as u32 => FORMAT_SHORT,
        _ => FORMAT_LONG,
    }
}

/// EXIF orientation (tag 0x0112): how the stored pixels must be turned to
/// display upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum Orientation {
    #[default]
    Normal = 1,
    MirrorHorizontal = 2,
    Rotate180 = 3,
    MirrorVertical = 4,
    Transpose = 5,
    Rotate90 = 6,
    Transverse = 7,
    Rotate270 = 8,
}

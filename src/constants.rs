/// Samples per block edge.
pub const BLOCK_SIZE: usize = 8;

/// Coefficients per DCT block.
pub const BLOCK_DIM: usize = BLOCK_SIZE * BLOCK_SIZE;

/// JPEG allows sampling factors 1..=4 on each axis.
pub const MAXIMUM_SAMPLING_FACTOR: u8 = 4;

// ISO/IEC 10918-1, B.2.3: at most four components take part in one scan and
// an interleaved MCU holds at most ten blocks.
pub const MAXIMUM_COMPONENT_COUNT_IN_SCAN: usize = 4;
pub const MAXIMUM_BLOCKS_IN_MCU: usize = 10;

pub const MAXIMUM_QUANTIZATION_TABLES: usize = 4;
pub const MAXIMUM_HUFFMAN_TABLES: usize = 4;

// The size in bytes of the segment length field.
pub const SEGMENT_LENGTH_SIZE: usize = 2;

// The maximum size of the data bytes that fit in a segment.
pub const SEGMENT_MAX_DATA_SIZE: usize = u16::MAX as usize - SEGMENT_LENGTH_SIZE;

/// Identifier that opens the payload of an Exif APP1 segment.
pub const EXIF_IDENTIFIER: &[u8; 6] = b"Exif\0\0";

/// Identifier that opens the payload of a JFIF APP0 segment.
pub const JFIF_IDENTIFIER: &[u8; 5] = b"JFIF\0";

/// Suffix appended to the original file name when a backup is requested.
pub const BACKUP_SUFFIX: &str = "~";

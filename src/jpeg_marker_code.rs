use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum JpegMarkerCode {
    /// SOF0: Baseline DCT, Huffman coding.
    StartOfFrameBaseline = 0xC0,
    /// SOF1: Extended sequential DCT, Huffman coding.
    StartOfFrameExtended = 0xC1,
    /// SOF2: Progressive DCT, Huffman coding.
    StartOfFrameProgressive = 0xC2,
    /// SOF3: Lossless (sequential), Huffman coding.
    StartOfFrameLossless = 0xC3,
    /// DHT: Define Huffman table(s).
    DefineHuffmanTable = 0xC4,
    /// SOF5..SOF7: Differential (hierarchical) Huffman frames.
    StartOfFrameDifferentialSequential = 0xC5,
    StartOfFrameDifferentialProgressive = 0xC6,
    StartOfFrameDifferentialLossless = 0xC7,
    /// JPG: Reserved for JPEG extensions.
    JpegExtension = 0xC8,
    /// SOF9..SOF15: Arithmetic coded frames.
    StartOfFrameArithmeticExtended = 0xC9,
    StartOfFrameArithmeticProgressive = 0xCA,
    StartOfFrameArithmeticLossless = 0xCB,
    /// DAC: Define arithmetic coding conditioning(s).
    DefineArithmeticConditioning = 0xCC,
    StartOfFrameArithmeticDifferentialSequential = 0xCD,
    StartOfFrameArithmeticDifferentialProgressive = 0xCE,
    StartOfFrameArithmeticDifferentialLossless = 0xCF,

    /// RST0..RST7: Restart markers inside entropy coded data.
    Restart0 = 0xD0,
    Restart1 = 0xD1,
    Restart2 = 0xD2,
    Restart3 = 0xD3,
    Restart4 = 0xD4,
    Restart5 = 0xD5,
    Restart6 = 0xD6,
    Restart7 = 0xD7,

    /// SOI: Marks the start of an image.
    StartOfImage = 0xD8,
    /// EOI: Marks the end of an image.
    EndOfImage = 0xD9,
    /// SOS: Marks the start of scan.
    StartOfScan = 0xDA,
    /// DQT: Define quantization table(s).
    DefineQuantizationTable = 0xDB,
    /// DNL: Defines the number of lines in a scan.
    DefineNumberOfLines = 0xDC,
    /// DRI: Defines the restart interval used in succeeding scans.
    DefineRestartInterval = 0xDD,
    /// DHP: Define hierarchical progression.
    DefineHierarchicalProgression = 0xDE,
    /// EXP: Expand reference component(s).
    ExpandReferenceComponents = 0xDF,

    /// APP0: Application data 0: used for JFIF header.
    ApplicationData0 = 0xE0,
    /// APP1: Application data 1: used for EXIF or XMP header.
    ApplicationData1 = 0xE1,
    /// APP2: Application data 2: used for ICC profile.
    ApplicationData2 = 0xE2,
    ApplicationData3 = 0xE3,
    ApplicationData4 = 0xE4,
    ApplicationData5 = 0xE5,
    ApplicationData6 = 0xE6,
    ApplicationData7 = 0xE7,
    ApplicationData8 = 0xE8,
    ApplicationData9 = 0xE9,
    ApplicationData10 = 0xEA,
    ApplicationData11 = 0xEB,
    ApplicationData12 = 0xEC,
    /// APP13: Application data 13: used by PhotoShop IRB
    ApplicationData13 = 0xED,
    /// APP14: Application data 14: used by Adobe
    ApplicationData14 = 0xEE,
    ApplicationData15 = 0xEF,

    /// COM: Comment block.
    Comment = 0xFE,
}

impl JpegMarkerCode {
    /// APPn and COM segments: the segments copied verbatim from source to
    /// destination.
    pub fn is_preserved_segment(self) -> bool {
        let code = u8::from(self);
        (0xE0..=0xEF).contains(&code) || self == JpegMarkerCode::Comment
    }

    pub fn is_restart(self) -> bool {
        (JPEG_RESTART_MARKER_BASE..JPEG_RESTART_MARKER_BASE + JPEG_RESTART_MARKER_RANGE)
            .contains(&u8::from(self))
    }

    /// Restart marker `RSTn` for `index % 8`.
    pub fn restart(index: usize) -> Self {
        let code = JPEG_RESTART_MARKER_BASE + (index % JPEG_RESTART_MARKER_RANGE as usize) as u8;
        // All eight codes are enum members.
        JpegMarkerCode::try_from(code).unwrap_or(JpegMarkerCode::Restart0)
    }
}

pub const JPEG_MARKER_START_BYTE: u8 = 0xFF;
pub const JPEG_RESTART_MARKER_BASE: u8 = 0xD0;
pub const JPEG_RESTART_MARKER_RANGE: u8 = 8;

/// Markers that stand alone, without a length field.
pub fn is_standalone_marker(code: u8) -> bool {
    code == 0x01 || (0xD0..=0xD9).contains(&code)
}

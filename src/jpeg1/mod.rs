//! JPEG 1 (ISO/IEC 10918-1 / ITU-T T.81) in the DCT coefficient domain.
//!
//! Features:
//! - Baseline, extended and progressive Huffman decoding to quantized coefficients.
//! - Sequential re-encoding with the standard Annex K Huffman tables.
//! - Restart interval (DRI/RSTm) support on both sides.
//! - Planar and interleaved scan support.

pub mod coefficients;
pub mod decoder;
pub mod encoder;
pub mod huffman;
pub mod quantization;

pub use coefficients::{Block, CoefficientImage, ComponentCoefficients, ComponentInfo, QuantizationTable};
pub use decoder::Jpeg1Decoder;
pub use encoder::Jpeg1Encoder;

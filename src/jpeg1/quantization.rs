//! Quantization tables for JPEG 1.
//! Quantized coefficients are never dequantized here: tables only travel
//! with the coefficients and follow them through geometric transforms.

use crate::constants::{BLOCK_DIM, BLOCK_SIZE, MAXIMUM_QUANTIZATION_TABLES};
use crate::jpeg1::coefficients::QuantizationTable;

/// Standard JPEG luminance quantization table (Quality 50).
pub const STD_LUMINANCE_QUANT_TABLE: QuantizationTable = [
    16, 11, 10, 16, 24, 40, 51, 61,
    12, 12, 14, 19, 26, 58, 60, 55,
    14, 13, 16, 24, 40, 57, 69, 56,
    14, 17, 22, 29, 51, 87, 80, 62,
    18, 22, 37, 56, 68, 109, 103, 77,
    24, 35, 55, 64, 81, 104, 113, 92,
    49, 64, 78, 87, 103, 121, 120, 101,
    72, 92, 95, 98, 112, 100, 103, 99,
];

/// Standard JPEG chrominance quantization table (Quality 50).
pub const STD_CHROMINANCE_QUANT_TABLE: QuantizationTable = [
    17, 18, 24, 47, 99, 99, 99, 99,
    18, 21, 26, 66, 99, 99, 99, 99,
    24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
];

/// Table slots 0 (luminance) and 1 (chrominance) filled with the Annex K tables.
pub fn standard_tables() -> [Option<QuantizationTable>; MAXIMUM_QUANTIZATION_TABLES] {
    [
        Some(STD_LUMINANCE_QUANT_TABLE),
        Some(STD_CHROMINANCE_QUANT_TABLE),
        None,
        None,
    ]
}

/// Mirrors a table over its main diagonal, for transforms that swap axes.
pub fn transpose_table(table: &QuantizationTable) -> QuantizationTable {
    let mut transposed = [0u16; BLOCK_DIM];
    for row in 0..BLOCK_SIZE {
        for col in 0..BLOCK_SIZE {
            transposed[col * BLOCK_SIZE + row] = table[row * BLOCK_SIZE + col];
        }
    }
    transposed
}

/// True when every entry fits the 8-bit DQT precision.
pub fn fits_eight_bits(table: &QuantizationTable) -> bool {
    table.iter().all(|&q| q <= u8::MAX as u16)
}

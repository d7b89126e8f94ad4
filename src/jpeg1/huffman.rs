//! Huffman coding implementation for JPEG 1.
//! Handles standard Huffman tables and bit-stream packing.

use crate::error::{Result, TransformError};
use crate::jpeg_marker_code::JPEG_MARKER_START_BYTE;

/// Represents a Huffman code with its bit value and length.
#[derive(Debug, Clone, Copy, Default)]
pub struct HuffmanCode {
    pub value: u16,
    pub length: u8,
}

/// Standard JPEG DC luminance Huffman table lengths (Table K.3).
pub const STD_LUMINANCE_DC_LENGTHS: [u8; 16] = [
    0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0
];

/// Standard JPEG DC luminance Huffman table values (Table K.3).
pub const STD_LUMINANCE_DC_VALUES: [u8; 12] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11
];

/// Standard JPEG DC chrominance Huffman table lengths (Table K.4).
pub const STD_CHROMINANCE_DC_LENGTHS: [u8; 16] = [
    0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0
];

/// Standard JPEG DC chrominance Huffman table values (Table K.4).
pub const STD_CHROMINANCE_DC_VALUES: [u8; 12] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11
];

/// Standard JPEG AC luminance Huffman table lengths (Table K.5).
pub const STD_LUMINANCE_AC_LENGTHS: [u8; 16] = [
    0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 125
];

/// Standard JPEG AC luminance Huffman table values (Table K.5).
pub const STD_LUMINANCE_AC_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12,
    0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08,
    0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16,
    0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39,
    0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59,
    0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79,
    0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98,
    0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6,
    0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4,
    0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea,
    0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Standard JPEG AC chrominance Huffman table lengths (Table K.6).
pub const STD_CHROMINANCE_AC_LENGTHS: [u8; 16] = [
    0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 119
];

/// Standard JPEG AC chrominance Huffman table values (Table K.6).
pub const STD_CHROMINANCE_AC_VALUES: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21,
    0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91,
    0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34,
    0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38,
    0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58,
    0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78,
    0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96,
    0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4,
    0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2,
    0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9,
    0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Encapsulates MSB-aligned Huffman table for encoding and decoding.
#[derive(Clone)]
pub struct HuffmanTable {
    pub codes: [HuffmanCode; 256],
    pub lengths: [u8; 16],
    pub values: Vec<u8>,

    // Decoding fields
    pub min_code: [i32; 16],
    pub max_code: [i32; 16],
    pub val_ptr: [i32; 16],
}

impl HuffmanTable {
    fn empty() -> Self {
        Self {
            codes: [HuffmanCode::default(); 256],
            lengths: [0; 16],
            values: Vec::new(),
            min_code: [0; 16],
            max_code: [-1; 16],
            val_ptr: [0; 16],
        }
    }

    /// Builds a table from JPEG DHT lengths and values.
    pub fn build_from_dht(lengths: &[u8; 16], values: &[u8]) -> Result<Self> {
        let total: usize = lengths.iter().map(|&n| n as usize).sum();
        if total > 256 || total != values.len() {
            return Err(TransformError::NotAJpeg("bad Huffman table"));
        }

        let mut table = Self::empty();
        table.lengths.copy_from_slice(lengths);
        table.values = values.to_vec();

        let mut code = 0u32;
        let mut val_idx = 0;

        for i in 0..16 {
            let n_codes = lengths[i] as usize;
            if n_codes == 0 {
                table.max_code[i] = -1;
            } else {
                table.val_ptr[i] = val_idx as i32;
                table.min_code[i] = code as i32;
                for _ in 0..n_codes {
                    let val = values[val_idx] as usize;
                    table.codes[val] = HuffmanCode {
                        value: code as u16,
                        length: (i + 1) as u8,
                    };
                    code += 1;
                    val_idx += 1;
                }
                table.max_code[i] = (code - 1) as i32;
            }
            // Codes of length i + 1 must fit in i + 1 bits.
            if code > (1u32 << (i + 1)) {
                return Err(TransformError::NotAJpeg("bad Huffman table"));
            }
            code <<= 1;
        }
        Ok(table)
    }

    pub fn standard_luminance_dc() -> Self {
        Self::standard(&STD_LUMINANCE_DC_LENGTHS, &STD_LUMINANCE_DC_VALUES)
    }

    pub fn standard_luminance_ac() -> Self {
        Self::standard(&STD_LUMINANCE_AC_LENGTHS, &STD_LUMINANCE_AC_VALUES)
    }

    pub fn standard_chrominance_dc() -> Self {
        Self::standard(&STD_CHROMINANCE_DC_LENGTHS, &STD_CHROMINANCE_DC_VALUES)
    }

    pub fn standard_chrominance_ac() -> Self {
        Self::standard(&STD_CHROMINANCE_AC_LENGTHS, &STD_CHROMINANCE_AC_VALUES)
    }

    fn standard(lengths: &[u8; 16], values: &[u8]) -> Self {
        // The Annex K tables are well formed; the fallback is never taken.
        Self::build_from_dht(lengths, values).unwrap_or_else(|_| Self::empty())
    }

    /// Decodes the next symbol from the given JpegBitReader.
    pub fn decode(&self, reader: &mut JpegBitReader) -> Result<u8> {
        let mut code = 0i32;
        for i in 0..16 {
            let bit = reader.read_bits(1)? as i32;
            code = (code << 1) | bit;
            if code <= self.max_code[i] {
                let idx = self.val_ptr[i] + (code - self.min_code[i]);
                return self
                    .values
                    .get(idx as usize)
                    .copied()
                    .ok_or(TransformError::CorruptData("bad Huffman code"));
            }
        }
        Err(TransformError::CorruptData("bad Huffman code"))
    }

    /// Code for `symbol`, or None when the table has no entry for it.
    pub fn code(&self, symbol: u8) -> Option<HuffmanCode> {
        let code = self.codes[symbol as usize];
        (code.length > 0).then_some(code)
    }
}

/// Helper for reading bits from entropy coded data with JPEG anti-stuffing
/// (skipping FF00).
///
/// Reaching a marker (or the end of the data) stops the reader at the marker;
/// further reads are satisfied with zero bits, which is how libjpeg treats a
/// truncated scan.
pub struct JpegBitReader<'a> {
    source: &'a [u8],
    position: usize,
    bit_buffer: u64,
    bits_in_buffer: u32,
    marker_reached: bool,
}

impl<'a> JpegBitReader<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            position: 0,
            bit_buffer: 0,
            bits_in_buffer: 0,
            marker_reached: false,
        }
    }

    pub fn read_bits(&mut self, count: u8) -> Result<u16> {
        if count == 0 {
            return Ok(0);
        }
        if count > 16 {
            return Err(TransformError::CorruptData("bit count out of range"));
        }
        let count = count as u32;
        if self.bits_in_buffer < count {
            self.fill();
        }
        let value = (self.bit_buffer >> (64 - count)) as u16;
        self.bit_buffer <<= count;
        self.bits_in_buffer -= count;
        Ok(value)
    }

    fn fill(&mut self) {
        while self.bits_in_buffer <= 56 {
            let byte = self.next_entropy_byte();
            self.bit_buffer |= (byte as u64) << (56 - self.bits_in_buffer);
            self.bits_in_buffer += 8;
        }
    }

    fn next_entropy_byte(&mut self) -> u8 {
        loop {
            if self.marker_reached || self.position >= self.source.len() {
                return 0;
            }
            let byte = self.source[self.position];
            if byte != JPEG_MARKER_START_BYTE {
                self.position += 1;
                return byte;
            }
            match self.source.get(self.position + 1) {
                Some(0x00) => {
                    self.position += 2;
                    return JPEG_MARKER_START_BYTE;
                }
                // Fill byte ahead of a marker.
                Some(0xFF) => self.position += 1,
                _ => {
                    self.marker_reached = true;
                    return 0;
                }
            }
        }
    }

    /// Discards buffered bits and consumes the restart marker `expected`.
    ///
    /// A scan cut short (end of data, or a non-RST marker where the restart
    /// should be) keeps yielding zero bits instead of failing.
    pub fn read_restart_marker(&mut self, expected: u8) -> Result<()> {
        self.bit_buffer = 0;
        self.bits_in_buffer = 0;

        let Some(marker_position) = find_marker(self.source, self.position) else {
            self.position = self.source.len();
            self.marker_reached = true;
            return Ok(());
        };
        let code = self.source[marker_position + 1];
        if !(0xD0..=0xD7).contains(&code) {
            self.position = marker_position;
            self.marker_reached = true;
            return Ok(());
        }
        if code != expected {
            return Err(TransformError::CorruptData("restart marker out of sequence"));
        }
        self.position = marker_position + 2;
        self.marker_reached = false;
        Ok(())
    }

    /// Offset of the first byte not yet pulled into the bit buffer.
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Offset of the next marker (`FF xx`, xx not 00/FF) at or after `from`.
pub fn find_marker(source: &[u8], from: usize) -> Option<usize> {
    let mut position = from;
    while position + 1 < source.len() {
        if source[position] == JPEG_MARKER_START_BYTE
            && source[position + 1] != 0x00
            && source[position + 1] != JPEG_MARKER_START_BYTE
        {
            return Some(position);
        }
        position += 1;
    }
    None
}

/// Helper for packing bits into bytes with JPEG bit-stuffing (FF00).
pub struct JpegBitWriter<'a> {
    destination: &'a mut Vec<u8>,
    bit_buffer: u32,
    bits_in_buffer: u32,
}

impl<'a> JpegBitWriter<'a> {
    pub fn new(destination: &'a mut Vec<u8>) -> Self {
        Self {
            destination,
            bit_buffer: 0,
            bits_in_buffer: 0,
        }
    }

    pub fn write_bits(&mut self, value: u16, length: u8) {
        if length == 0 {
            return;
        }
        let length = length as u32;
        let mask = (1u32 << length) - 1;
        self.bit_buffer = (self.bit_buffer << length) | (value as u32 & mask);
        self.bits_in_buffer += length;

        while self.bits_in_buffer >= 8 {
            let shift = self.bits_in_buffer - 8;
            let byte = ((self.bit_buffer >> shift) & 0xFF) as u8;
            self.emit_byte(byte);
            self.bits_in_buffer = shift;
            self.bit_buffer &= (1u32 << shift) - 1;
        }
    }

    pub fn write_code(&mut self, code: HuffmanCode) {
        self.write_bits(code.value, code.length);
    }

    fn emit_byte(&mut self, byte: u8) {
        self.destination.push(byte);
        if byte == JPEG_MARKER_START_BYTE {
            self.destination.push(0x00);
        }
    }

    /// Pads the last partial byte with one bits (standard JPEG practice).
    pub fn flush(&mut self) {
        if self.bits_in_buffer > 0 {
            let pad_bits = 8 - self.bits_in_buffer;
            let value = (1u32 << pad_bits) - 1;
            self.write_bits(value as u16, pad_bits as u8);
        }
    }
}

/// Magnitude category helpers shared by the encoder and decoder
/// (ISO/IEC 10918-1 F.1.2.1).
pub struct HuffmanEncoder;

impl HuffmanEncoder {
    /// Computes the magnitude category of an integer (ISO/IEC 10918-1 F.1.2.1).
    pub fn get_category(value: i16) -> u8 {
        if value == 0 {
            return 0;
        }
        let abs_val = value.unsigned_abs();
        (16 - abs_val.leading_zeros()) as u8
    }

    /// Encodes the bits for a given category and value (ISO/IEC 10918-1 F.1.2.1.1).
    pub fn get_diff_bits(value: i16, category: u8) -> (u16, u8) {
        if category == 0 {
            return (0, 0);
        }
        if value >= 0 {
            (value as u16, category)
        } else {
            ((value as i32 + (1 << category) - 1) as u16, category)
        }
    }

    /// Decodes the value from bits given its category (ISO/IEC 10918-1 F.2.2.1).
    pub fn decode_value_bits(bits: u16, category: u8) -> i16 {
        if category == 0 {
            return 0;
        }
        let threshold = 1u32 << (category - 1);
        if bits as u32 >= threshold {
            bits as i16
        } else {
            (bits as i32 - (1i32 << category) + 1) as i16
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_writer_reader_roundtrip() {
        let mut buffer = Vec::new();
        {
            let mut writer = JpegBitWriter::new(&mut buffer);
            writer.write_bits(0xFF, 8); // Should trigger stuffing
            writer.write_bits(0x01, 2);
            writer.write_bits(0x0A, 4);
            writer.flush();
        }
        assert_eq!(&buffer[..2], &[0xFF, 0x00]);

        let mut reader = JpegBitReader::new(&buffer);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
        assert_eq!(reader.read_bits(2).unwrap(), 0x01);
        assert_eq!(reader.read_bits(4).unwrap(), 0x0A);
    }

    #[test]
    fn reader_stops_at_marker_and_pads_with_zeros() {
        let data = [0xAB, 0xFF, 0xD9];
        let mut reader = JpegBitReader::new(&data);
        assert_eq!(reader.read_bits(8).unwrap(), 0xAB);
        assert_eq!(reader.read_bits(16).unwrap(), 0);
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn restart_marker_must_match_sequence() {
        let data = [0x80, 0xFF, 0xD0, 0x40, 0xFF, 0xD3];
        let mut reader = JpegBitReader::new(&data);
        assert_eq!(reader.read_bits(1).unwrap(), 1);
        reader.read_restart_marker(0xD0).unwrap();
        assert_eq!(reader.read_bits(2).unwrap(), 1);
        assert!(matches!(
            reader.read_restart_marker(0xD1),
            Err(TransformError::CorruptData(_))
        ));
    }

    #[test]
    fn standard_tables_cover_every_baseline_symbol() {
        let dc = HuffmanTable::standard_chrominance_dc();
        for category in 0..=11u8 {
            assert!(dc.code(category).is_some());
        }
        let ac = HuffmanTable::standard_luminance_ac();
        for run in 0..16u8 {
            for size in 1..=10u8 {
                assert!(ac.code((run << 4) | size).is_some());
            }
        }
        assert!(ac.code(0x00).is_some());
        assert!(ac.code(0xF0).is_some());
    }

    #[test]
    fn oversubscribed_table_is_rejected() {
        let mut lengths = [0u8; 16];
        lengths[0] = 3;
        assert!(HuffmanTable::build_from_dht(&lengths, &[0, 1, 2]).is_err());
    }

    #[test]
    fn value_bits_roundtrip_negative_and_positive() {
        for value in [-1023i16, -5, -1, 1, 7, 1023] {
            let category = HuffmanEncoder::get_category(value);
            let (bits, _) = HuffmanEncoder::get_diff_bits(value, category);
            assert_eq!(HuffmanEncoder::decode_value_bits(bits, category), value);
        }
    }
}

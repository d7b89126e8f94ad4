//! JPEG Codestream Writer utilities.
//!
//! This module provides the `JpegStreamWriter` which handles the generation
//! of JPEG markers and segments (SOI, EOI, SOF, DQT, DHT, SOS, APPn, COM)
//! into a growable buffer.

use crate::constants::{BLOCK_DIM, SEGMENT_LENGTH_SIZE, SEGMENT_MAX_DATA_SIZE};
use crate::error::{Result, TransformError};
use crate::jpeg1::coefficients::{CoefficientImage, QuantizationTable, ZIGZAG_ORDER};
use crate::jpeg1::huffman::JpegBitWriter;
use crate::jpeg1::quantization::fits_eight_bits;
use crate::jpeg_marker_code::{JPEG_MARKER_START_BYTE, JpegMarkerCode};

/// A writer for JPEG codestreams that manages marker emission.
#[derive(Default)]
pub struct JpegStreamWriter {
    destination: Vec<u8>,
}

impl JpegStreamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.destination.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destination.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.destination
    }

    pub fn write_byte(&mut self, value: u8) {
        self.destination.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.destination.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_marker(&mut self, marker: JpegMarkerCode) {
        self.write_byte(JPEG_MARKER_START_BYTE);
        self.write_byte(marker.into());
    }

    pub fn write_start_of_image(&mut self) {
        self.write_marker(JpegMarkerCode::StartOfImage)
    }

    pub fn write_end_of_image(&mut self) {
        self.write_marker(JpegMarkerCode::EndOfImage)
    }

    /// Writes a marker followed by its length field and `payload`.
    pub fn write_segment(&mut self, marker: JpegMarkerCode, payload: &[u8]) -> Result<()> {
        if payload.len() > SEGMENT_MAX_DATA_SIZE {
            return Err(TransformError::InvalidArgument("segment payload exceeds 65533 bytes"));
        }
        self.destination
            .try_reserve(payload.len() + SEGMENT_LENGTH_SIZE + 2)?;
        self.write_marker(marker);
        self.write_u16((payload.len() + SEGMENT_LENGTH_SIZE) as u16);
        self.destination.extend_from_slice(payload);
        Ok(())
    }

    /// Writes one DQT segment; tables with entries above 255 use 16-bit precision.
    pub fn write_dqt(&mut self, table_id: u8, table: &QuantizationTable) {
        self.write_marker(JpegMarkerCode::DefineQuantizationTable);
        if fits_eight_bits(table) {
            self.write_u16((SEGMENT_LENGTH_SIZE + 1 + BLOCK_DIM) as u16);
            self.write_byte(table_id & 0x0F); // Precision 0 (8-bit), ID
            for &natural in &ZIGZAG_ORDER {
                self.write_byte(table[natural] as u8);
            }
        } else {
            self.write_u16((SEGMENT_LENGTH_SIZE + 1 + 2 * BLOCK_DIM) as u16);
            self.write_byte(0x10 | (table_id & 0x0F)); // Precision 1 (16-bit), ID
            for &natural in &ZIGZAG_ORDER {
                self.write_u16(table[natural]);
            }
        }
    }

    pub fn write_dht(&mut self, table_class: u8, table_id: u8, lengths: &[u8; 16], values: &[u8]) {
        self.write_marker(JpegMarkerCode::DefineHuffmanTable);
        let length = SEGMENT_LENGTH_SIZE + 1 + 16 + values.len();
        self.write_u16(length as u16);
        self.write_byte(((table_class & 1) << 4) | (table_id & 0x0F));
        for &len in lengths {
            self.write_byte(len);
        }
        self.destination.extend_from_slice(values);
    }

    /// Writes the frame header for `image` under the given SOFn marker.
    pub fn write_start_of_frame(&mut self, marker: JpegMarkerCode, image: &CoefficientImage) {
        self.write_marker(marker);
        let length = SEGMENT_LENGTH_SIZE + 6 + image.components.len() * 3;
        self.write_u16(length as u16);
        self.write_byte(8); // Sample precision
        self.write_u16(image.height as u16);
        self.write_u16(image.width as u16);
        self.write_byte(image.components.len() as u8);
        for component in &image.components {
            let info = &component.info;
            self.write_byte(info.id);
            self.write_byte((info.h_samp_factor << 4) | info.v_samp_factor);
            self.write_byte(info.quant_table_dest);
        }
    }

    /// Writes a sequential SOS header; `components` holds
    /// (component id, DC table, AC table).
    pub fn write_start_of_scan(&mut self, components: &[(u8, u8, u8)]) {
        self.write_marker(JpegMarkerCode::StartOfScan);
        let length = SEGMENT_LENGTH_SIZE + 1 + components.len() * 2 + 3;
        self.write_u16(length as u16);
        self.write_byte(components.len() as u8);
        for &(id, dc_table, ac_table) in components {
            self.write_byte(id);
            self.write_byte((dc_table << 4) | ac_table);
        }
        self.write_byte(0); // Ss
        self.write_byte(63); // Se
        self.write_byte(0); // Ah/Al
    }

    pub fn write_dri(&mut self, restart_interval: u16) {
        self.write_marker(JpegMarkerCode::DefineRestartInterval);
        self.write_u16(4); // Length
        self.write_u16(restart_interval);
    }

    /// Bit-level writer appending entropy coded data to this stream.
    pub fn bit_writer(&mut self) -> JpegBitWriter<'_> {
        JpegBitWriter::new(&mut self.destination)
    }
}

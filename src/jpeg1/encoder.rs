//! JPEG 1 coefficient encoder.
//!
//! Writes a [`CoefficientImage`] as a sequential Huffman JPEG using the
//! Annex K tables. Quantized coefficients are emitted as they are, so a
//! decode/encode cycle loses nothing.

use crate::constants::{MAXIMUM_BLOCKS_IN_MCU, MAXIMUM_COMPONENT_COUNT_IN_SCAN};
use crate::error::{Result, TransformError};
use crate::jpeg1::coefficients::{Block, CoefficientImage, ZIGZAG_ORDER};
use crate::jpeg1::huffman::{HuffmanCode, HuffmanEncoder, HuffmanTable, JpegBitWriter};
use crate::jpeg1::quantization::fits_eight_bits;
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::markers::MarkerList;

const LUMINANCE: usize = 0;
const CHROMINANCE: usize = 1;

const EOB: u8 = 0x00;
const ZRL: u8 = 0xF0;

pub struct Jpeg1Encoder {
    dc_tables: [HuffmanTable; 2],
    ac_tables: [HuffmanTable; 2],
}

impl Default for Jpeg1Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Jpeg1Encoder {
    pub fn new() -> Self {
        Self {
            dc_tables: [
                HuffmanTable::standard_luminance_dc(),
                HuffmanTable::standard_chrominance_dc(),
            ],
            ac_tables: [
                HuffmanTable::standard_luminance_ac(),
                HuffmanTable::standard_chrominance_ac(),
            ],
        }
    }

    /// Encodes `image`, replaying `markers` right after SOI.
    pub fn encode(&self, image: &CoefficientImage, markers: &MarkerList) -> Result<Vec<u8>> {
        let mut stream = JpegStreamWriter::new();
        stream.write_start_of_image();
        markers.commit(&mut stream)?;

        let mut table_ids: Vec<u8> = image
            .components
            .iter()
            .map(|c| c.info.quant_table_dest)
            .collect();
        table_ids.sort_unstable();
        table_ids.dedup();

        let mut baseline = true;
        for &id in &table_ids {
            let table = image
                .quantization_table(id)
                .ok_or(TransformError::InvalidArgument("quantization table selector"))?;
            baseline &= fits_eight_bits(table);
            stream.write_dqt(id, table);
        }

        let frame_marker = if baseline {
            JpegMarkerCode::StartOfFrameBaseline
        } else {
            JpegMarkerCode::StartOfFrameExtended
        };
        stream.write_start_of_frame(frame_marker, image);

        let class_count = if image.components.len() > 1 { 2 } else { 1 };
        for class in 0..class_count {
            let dc = &self.dc_tables[class];
            let ac = &self.ac_tables[class];
            stream.write_dht(0, class as u8, &dc.lengths, &dc.values);
            stream.write_dht(1, class as u8, &ac.lengths, &ac.values);
        }

        if image.restart_interval > 0 {
            stream.write_dri(image.restart_interval);
        }

        let blocks_in_mcu: usize = image
            .components
            .iter()
            .map(|c| c.info.h_samp_factor as usize * c.info.v_samp_factor as usize)
            .sum();
        let indices: Vec<usize> = (0..image.components.len()).collect();
        if image.components.len() > 1
            && image.components.len() <= MAXIMUM_COMPONENT_COUNT_IN_SCAN
            && blocks_in_mcu <= MAXIMUM_BLOCKS_IN_MCU
        {
            self.encode_scan(&mut stream, image, &indices)?;
        } else {
            for index in indices {
                self.encode_scan(&mut stream, image, &[index])?;
            }
        }

        stream.write_end_of_image();
        Ok(stream.into_inner())
    }

    fn encode_scan(
        &self,
        stream: &mut JpegStreamWriter,
        image: &CoefficientImage,
        indices: &[usize],
    ) -> Result<()> {
        let header: Vec<(u8, u8, u8)> = indices
            .iter()
            .map(|&index| {
                let class = table_class(index) as u8;
                (image.components[index].info.id, class, class)
            })
            .collect();
        stream.write_start_of_scan(&header);

        let interleaved = indices.len() > 1;
        let (mcus_x, mcus_y) = if interleaved {
            (image.mcus_per_row(), image.mcu_rows())
        } else {
            image.natural_blocks(indices[0])
        };
        let total = mcus_x * mcus_y;
        let interval = match image.restart_interval {
            0 => total,
            ri => ri as usize,
        };

        let mut predictors = [0i16; MAXIMUM_COMPONENT_COUNT_IN_SCAN];
        let mut restart_index = 0;
        let mut mcu = 0;
        while mcu < total {
            let end = (mcu + interval).min(total);
            {
                let mut bits = stream.bit_writer();
                for m in mcu..end {
                    let (mcu_x, mcu_y) = (m % mcus_x, m / mcus_x);
                    for (slot, &index) in indices.iter().enumerate() {
                        let component = &image.components[index];
                        let (h, v) = if interleaved {
                            (
                                component.info.h_samp_factor as usize,
                                component.info.v_samp_factor as usize,
                            )
                        } else {
                            (1, 1)
                        };
                        for y in 0..v {
                            for x in 0..h {
                                self.encode_block(
                                    &mut bits,
                                    component.block(mcu_x * h + x, mcu_y * v + y),
                                    &mut predictors[slot],
                                    table_class(index),
                                )?;
                            }
                        }
                    }
                }
                bits.flush();
            }
            if end < total {
                stream.write_marker(JpegMarkerCode::restart(restart_index));
                restart_index += 1;
                predictors = [0; MAXIMUM_COMPONENT_COUNT_IN_SCAN];
            }
            mcu = end;
        }
        Ok(())
    }

    fn encode_block(
        &self,
        bits: &mut JpegBitWriter,
        block: &Block,
        predictor: &mut i16,
        class: usize,
    ) -> Result<()> {
        let diff = i16::try_from(block[0] as i32 - *predictor as i32)
            .map_err(|_| TransformError::UnsupportedFormat("DC difference out of range"))?;
        *predictor = block[0];
        write_coefficient(bits, &self.dc_tables[class], 0, diff)?;

        let ac = &self.ac_tables[class];
        let mut run = 0u8;
        for &natural in &ZIGZAG_ORDER[1..] {
            let value = block[natural];
            if value == 0 {
                run += 1;
                continue;
            }
            while run > 15 {
                bits.write_code(symbol_code(ac, ZRL)?);
                run -= 16;
            }
            write_coefficient(bits, ac, run, value)?;
            run = 0;
        }
        if run > 0 {
            bits.write_code(symbol_code(ac, EOB)?);
        }
        Ok(())
    }
}

fn table_class(component_index: usize) -> usize {
    if component_index == 0 {
        LUMINANCE
    } else {
        CHROMINANCE
    }
}

fn symbol_code(table: &HuffmanTable, symbol: u8) -> Result<HuffmanCode> {
    table.code(symbol).ok_or(TransformError::UnsupportedFormat(
        "coefficient magnitude exceeds the standard Huffman tables",
    ))
}

/// Writes the Huffman code for `(run, category)` followed by the value bits.
fn write_coefficient(bits: &mut JpegBitWriter, table: &HuffmanTable, run: u8, value: i16) -> Result<()> {
    let category = HuffmanEncoder::get_category(value);
    if category > 15 {
        return Err(TransformError::UnsupportedFormat("coefficient out of range"));
    }
    bits.write_code(symbol_code(table, (run << 4) | category)?);
    let (value_bits, length) = HuffmanEncoder::get_diff_bits(value, category);
    bits.write_bits(value_bits, length);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg1::coefficients::ComponentInfo;
    use crate::jpeg1::decoder::Jpeg1Decoder;
    use crate::jpeg1::quantization::standard_tables;

    fn component(id: u8, h: u8, v: u8, table: u8) -> ComponentInfo {
        ComponentInfo {
            id,
            h_samp_factor: h,
            v_samp_factor: v,
            quant_table_dest: table,
        }
    }

    /// Deterministic low-magnitude coefficients on every block that holds
    /// image samples; MCU padding outside them stays zero.
    fn patterned(width: u32, height: u32, layout: &[ComponentInfo]) -> CoefficientImage {
        let mut image = CoefficientImage::new(width, height, layout, standard_tables()).unwrap();
        for (id, table) in image.quantization_tables.iter_mut().enumerate() {
            if !layout.iter().any(|c| c.quant_table_dest as usize == id) {
                *table = None;
            }
        }
        for index in 0..image.components.len() {
            let (w, h) = image.natural_blocks(index);
            let component = &mut image.components[index];
            for by in 0..h {
                for bx in 0..w {
                    let block = component.block_mut(bx, by);
                    block[0] = ((index * 37 + bx * 11 + by * 5) % 400) as i16 - 200;
                    for k in 1..12 {
                        block[ZIGZAG_ORDER[k]] = ((bx * 3 + by * 7 + k * 5) % 9) as i16 - 4;
                    }
                    block[63] = (bx % 3) as i16 - 1;
                }
            }
        }
        image
    }

    fn decode(data: &[u8]) -> CoefficientImage {
        let mut decoder = Jpeg1Decoder::new(data);
        decoder.read_header().unwrap();
        decoder.decode_coefficients().unwrap()
    }

    #[test]
    fn interleaved_420_survives_encode_decode() {
        let layout = [component(1, 2, 2, 0), component(2, 1, 1, 1), component(3, 1, 1, 1)];
        let image = patterned(48, 32, &layout);
        let data = Jpeg1Encoder::new().encode(&image, &MarkerList::new()).unwrap();
        assert_eq!(&data[..2], &[0xFF, 0xD8]);
        assert_eq!(&data[data.len() - 2..], &[0xFF, 0xD9]);
        assert_eq!(decode(&data), image);
    }

    #[test]
    fn restart_interval_is_kept() {
        let layout = [component(1, 2, 1, 0), component(2, 1, 1, 1), component(3, 1, 1, 1)];
        let mut image = patterned(70, 20, &layout);
        image.restart_interval = 3;
        let data = Jpeg1Encoder::new().encode(&image, &MarkerList::new()).unwrap();
        let decoded = decode(&data);
        assert_eq!(decoded.restart_interval, 3);
        assert_eq!(decoded, image);
    }

    #[test]
    fn large_mcus_fall_back_to_one_scan_per_component() {
        let layout = [component(1, 4, 4, 0), component(2, 1, 1, 1), component(3, 1, 1, 1)];
        let image = patterned(64, 32, &layout);
        let data = Jpeg1Encoder::new().encode(&image, &MarkerList::new()).unwrap();
        let scans = data.windows(2).filter(|w| w == &[0xFF, 0xDA]).count();
        assert_eq!(scans, 3);
        assert_eq!(decode(&data), image);
    }

    #[test]
    fn grayscale_uses_natural_block_grid() {
        let image = patterned(20, 12, &[component(1, 1, 1, 0)]);
        let data = Jpeg1Encoder::new().encode(&image, &MarkerList::new()).unwrap();
        assert_eq!(decode(&data), image);
    }

    #[test]
    fn sixteen_bit_tables_switch_to_extended_frame() {
        let mut image = patterned(8, 8, &[component(1, 1, 1, 0)]);
        if let Some(table) = image.quantization_tables[0].as_mut() {
            table[5] = 400;
        }
        let data = Jpeg1Encoder::new().encode(&image, &MarkerList::new()).unwrap();
        assert!(data.windows(2).any(|w| w == [0xFF, 0xC1]));
        assert_eq!(decode(&data), image);
    }

    #[test]
    fn markers_follow_start_of_image() {
        let mut markers = MarkerList::new();
        markers.push(JpegMarkerCode::Comment, b"kept".to_vec());
        let image = patterned(8, 8, &[component(1, 1, 1, 0)]);
        let data = Jpeg1Encoder::new().encode(&image, &markers).unwrap();
        assert_eq!(&data[2..10], &[0xFF, 0xFE, 0x00, 0x06, b'k', b'e', b'e', b'p']);
    }

    #[test]
    fn oversized_coefficient_is_unsupported() {
        let mut image = patterned(8, 8, &[component(1, 1, 1, 0)]);
        image.components[0].blocks[0][1] = 2000;
        assert!(matches!(
            Jpeg1Encoder::new().encode(&image, &MarkerList::new()),
            Err(TransformError::UnsupportedFormat(_))
        ));
    }
}

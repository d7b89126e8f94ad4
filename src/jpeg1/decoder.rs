//! JPEG 1 coefficient decoder.
//!
//! Entropy decodes baseline, extended and progressive Huffman streams into
//! quantized DCT coefficients. No dequantization or IDCT is performed.

use crate::constants::{BLOCK_DIM, MAXIMUM_COMPONENT_COUNT_IN_SCAN};
use crate::error::{Result, TransformError};
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_reader::{FrameCoding, FrameInfo, JpegComponent, JpegStreamReader, ScanHeader};
use crate::jpeg1::coefficients::{Block, CoefficientImage, ComponentInfo, ZIGZAG_ORDER};
use crate::jpeg1::huffman::{HuffmanEncoder, HuffmanTable, JpegBitReader};
use crate::markers::MarkerList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanKind {
    Sequential,
    DcFirst,
    DcRefine,
    AcFirst,
    AcRefine,
}

impl ScanKind {
    fn of(coding: FrameCoding, scan: &ScanHeader) -> Self {
        match (coding, scan.spectral_start, scan.approximation_high) {
            (FrameCoding::Sequential, _, _) => ScanKind::Sequential,
            (FrameCoding::Progressive, 0, 0) => ScanKind::DcFirst,
            (FrameCoding::Progressive, 0, _) => ScanKind::DcRefine,
            (FrameCoding::Progressive, _, 0) => ScanKind::AcFirst,
            (FrameCoding::Progressive, _, _) => ScanKind::AcRefine,
        }
    }
}

/// Per-scan entropy decoding state.
struct ScanState<'t> {
    kind: ScanKind,
    spectral_start: usize,
    spectral_end: usize,
    approximation_low: u8,
    tables: Vec<(Option<&'t HuffmanTable>, Option<&'t HuffmanTable>)>,
    predictors: [i16; MAXIMUM_COMPONENT_COUNT_IN_SCAN],
    eob_run: u32,
}

pub struct Jpeg1Decoder<'a> {
    reader: JpegStreamReader<'a>,
    first_scan: Option<ScanHeader>,
}

impl<'a> Jpeg1Decoder<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            reader: JpegStreamReader::new(source),
            first_scan: None,
        }
    }

    /// Keep APPn and COM segments so they can be replayed into the output.
    pub fn retain_markers(&mut self, retain: bool) {
        self.reader.set_retain_markers(retain);
    }

    /// Parses everything up to the first scan and returns the frame geometry.
    pub fn read_header(&mut self) -> Result<FrameInfo> {
        let scan = self.reader.read_header()?;
        self.first_scan = Some(scan);
        self.reader
            .frame_info()
            .ok_or(TransformError::NotAJpeg("missing start of frame"))
    }

    pub fn frame_info(&self) -> Option<FrameInfo> {
        self.reader.frame_info()
    }

    pub fn components(&self) -> &[JpegComponent] {
        &self.reader.components
    }

    /// Segments retained so far. Segments that follow the first scan are only
    /// seen once [`decode_coefficients`](Self::decode_coefficients) has run.
    pub fn take_markers(&mut self) -> MarkerList {
        self.reader.take_markers()
    }

    /// Decodes every scan of the image into a coefficient image.
    pub fn decode_coefficients(&mut self) -> Result<CoefficientImage> {
        let frame = self
            .reader
            .frame_info()
            .ok_or(TransformError::InvalidState("header not read"))?;
        let mut scan = self
            .first_scan
            .take()
            .ok_or(TransformError::InvalidState("header not read"))?;

        let layout: Vec<ComponentInfo> = self.reader.components.iter().map(|c| c.info).collect();
        let mut image = CoefficientImage::new(
            frame.width,
            frame.height,
            &layout,
            self.reader.quantization_tables,
        )
        .map_err(|e| match e {
            TransformError::InvalidArgument(reason) => TransformError::NotAJpeg(reason),
            other => other,
        })?;
        image.restart_interval = self.reader.restart_interval;

        let mut scan_count = 0;
        loop {
            self.decode_scan(&mut image, frame.coding, &scan)?;
            scan_count += 1;
            match self.reader.read_next_scan()? {
                Some(next) => scan = next,
                None => break,
            }
        }
        log::debug!(
            "decoded {}x{} image, {} component(s), {} scan(s)",
            frame.width,
            frame.height,
            image.components.len(),
            scan_count
        );
        Ok(image)
    }

    fn decode_scan(
        &mut self,
        image: &mut CoefficientImage,
        coding: FrameCoding,
        scan: &ScanHeader,
    ) -> Result<()> {
        let consumed = {
            let reader = &self.reader;
            let mut tables = Vec::with_capacity(scan.component_indices.len());
            for &index in &scan.component_indices {
                let component = &reader.components[index];
                tables.push((
                    reader.huffman_tables_dc[component.dc_table_dest as usize].as_ref(),
                    reader.huffman_tables_ac[component.ac_table_dest as usize].as_ref(),
                ));
            }
            let mut state = ScanState {
                kind: ScanKind::of(coding, scan),
                spectral_start: scan.spectral_start as usize,
                spectral_end: (scan.spectral_end as usize).min(BLOCK_DIM - 1),
                approximation_low: scan.approximation_low,
                tables,
                predictors: [0; MAXIMUM_COMPONENT_COUNT_IN_SCAN],
                eob_run: 0,
            };
            if state.kind == ScanKind::Sequential {
                state.spectral_start = 0;
                state.spectral_end = BLOCK_DIM - 1;
                state.approximation_low = 0;
            }

            let mut bits = JpegBitReader::new(reader.remaining_data());
            let interleaved = scan.component_indices.len() > 1;
            let (mcus_x, mcus_y) = if interleaved {
                (image.mcus_per_row(), image.mcu_rows())
            } else {
                image.natural_blocks(scan.component_indices[0])
            };
            let restart_interval = reader.restart_interval as usize;
            let mut restart_index = 0;

            for mcu in 0..mcus_x * mcus_y {
                if restart_interval > 0 && mcu > 0 && mcu % restart_interval == 0 {
                    bits.read_restart_marker(JpegMarkerCode::restart(restart_index).into())?;
                    restart_index += 1;
                    state.predictors = [0; MAXIMUM_COMPONENT_COUNT_IN_SCAN];
                    state.eob_run = 0;
                }
                let (mcu_x, mcu_y) = (mcu % mcus_x, mcu / mcus_x);
                for (slot, &index) in scan.component_indices.iter().enumerate() {
                    let component = &mut image.components[index];
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
                            let block = component.block_mut(mcu_x * h + x, mcu_y * v + y);
                            state.decode_block(&mut bits, slot, block)?;
                        }
                    }
                }
            }
            bits.position()
        };
        self.reader.advance(consumed);
        Ok(())
    }
}

impl<'t> ScanState<'t> {
    fn dc_table(&self, slot: usize) -> Result<&'t HuffmanTable> {
        self.tables[slot]
            .0
            .ok_or(TransformError::CorruptData("undefined DC Huffman table"))
    }

    fn ac_table(&self, slot: usize) -> Result<&'t HuffmanTable> {
        self.tables[slot]
            .1
            .ok_or(TransformError::CorruptData("undefined AC Huffman table"))
    }

    fn decode_block(&mut self, bits: &mut JpegBitReader, slot: usize, block: &mut Block) -> Result<()> {
        match self.kind {
            ScanKind::Sequential => {
                self.decode_dc_first(bits, slot, block)?;
                self.decode_ac_first(bits, slot, block)
            }
            ScanKind::DcFirst => self.decode_dc_first(bits, slot, block),
            ScanKind::DcRefine => {
                if bits.read_bits(1)? == 1 {
                    block[0] |= 1 << self.approximation_low;
                }
                Ok(())
            }
            ScanKind::AcFirst => self.decode_ac_first(bits, slot, block),
            ScanKind::AcRefine => self.decode_ac_refine(bits, slot, block),
        }
    }

    fn decode_dc_first(&mut self, bits: &mut JpegBitReader, slot: usize, block: &mut Block) -> Result<()> {
        let category = self.dc_table(slot)?.decode(bits)?;
        if category > 15 {
            return Err(TransformError::CorruptData("DC difference out of range"));
        }
        let diff = HuffmanEncoder::decode_value_bits(bits.read_bits(category)?, category);
        let predictor = &mut self.predictors[slot];
        *predictor = predictor.wrapping_add(diff);
        block[0] = ((*predictor as i32) << self.approximation_low) as i16;
        Ok(())
    }

    /// AC coefficients of a sequential scan or of a progressive first pass.
    fn decode_ac_first(&mut self, bits: &mut JpegBitReader, slot: usize, block: &mut Block) -> Result<()> {
        if self.eob_run > 0 {
            self.eob_run -= 1;
            return Ok(());
        }
        let start = self.spectral_start.max(1);
        if start > self.spectral_end {
            return Ok(());
        }
        let table = self.ac_table(slot)?;
        let mut k = start;
        while k <= self.spectral_end {
            let symbol = table.decode(bits)?;
            let run = (symbol >> 4) as usize;
            let size = symbol & 0x0F;
            if size == 0 {
                if run == 15 {
                    k += 16;
                    continue;
                }
                if self.kind == ScanKind::AcFirst {
                    self.eob_run = (1u32 << run) - 1;
                    if run > 0 {
                        self.eob_run += bits.read_bits(run as u8)? as u32;
                    }
                }
                break;
            }
            k += run;
            if k > self.spectral_end {
                return Err(TransformError::CorruptData("AC coefficient index out of range"));
            }
            let value = HuffmanEncoder::decode_value_bits(bits.read_bits(size)?, size);
            block[ZIGZAG_ORDER[k]] = ((value as i32) << self.approximation_low) as i16;
            k += 1;
        }
        Ok(())
    }

    /// Successive approximation refinement of AC coefficients
    /// (ISO/IEC 10918-1 G.1.2.3).
    fn decode_ac_refine(&mut self, bits: &mut JpegBitReader, slot: usize, block: &mut Block) -> Result<()> {
        let positive = 1i16 << self.approximation_low;
        let negative = -positive;
        let end = self.spectral_end;
        let mut k = self.spectral_start;

        if self.eob_run == 0 {
            let table = self.ac_table(slot)?;
            while k <= end {
                let symbol = table.decode(bits)?;
                let mut run = (symbol >> 4) as i32;
                let size = symbol & 0x0F;
                let mut value = 0i16;
                if size != 0 {
                    if size != 1 {
                        return Err(TransformError::CorruptData("bad refinement coefficient size"));
                    }
                    value = if bits.read_bits(1)? == 1 { positive } else { negative };
                } else if run != 15 {
                    self.eob_run = 1u32 << run;
                    if run > 0 {
                        self.eob_run += bits.read_bits(run as u8)? as u32;
                    }
                    break;
                }

                while k <= end {
                    let coefficient = &mut block[ZIGZAG_ORDER[k]];
                    if *coefficient != 0 {
                        refine(bits, coefficient, positive, negative)?;
                    } else {
                        run -= 1;
                        if run < 0 {
                            break;
                        }
                    }
                    k += 1;
                }

                if value != 0 {
                    if k > end {
                        return Err(TransformError::CorruptData("AC coefficient index out of range"));
                    }
                    block[ZIGZAG_ORDER[k]] = value;
                }
                k += 1;
            }
        }

        if self.eob_run > 0 {
            while k <= end {
                let coefficient = &mut block[ZIGZAG_ORDER[k]];
                if *coefficient != 0 {
                    refine(bits, coefficient, positive, negative)?;
                }
                k += 1;
            }
            self.eob_run -= 1;
        }
        Ok(())
    }
}

/// Applies one correction bit to an already non-zero coefficient.
fn refine(bits: &mut JpegBitReader, coefficient: &mut i16, positive: i16, negative: i16) -> Result<()> {
    if bits.read_bits(1)? == 1 && (*coefficient & positive) == 0 {
        *coefficient = if *coefficient >= 0 {
            coefficient.wrapping_add(positive)
        } else {
            coefficient.wrapping_add(negative)
        };
    }
    Ok(())
}

use crate::constants::{
    BLOCK_DIM, MAXIMUM_COMPONENT_COUNT_IN_SCAN, MAXIMUM_HUFFMAN_TABLES,
    MAXIMUM_QUANTIZATION_TABLES, MAXIMUM_SAMPLING_FACTOR,
};
use crate::error::{Result, TransformError};
use crate::jpeg1::coefficients::{ComponentInfo, QuantizationTable, ZIGZAG_ORDER};
use crate::jpeg1::huffman::{HuffmanTable, find_marker};
use crate::jpeg_marker_code::{JPEG_MARKER_START_BYTE, JpegMarkerCode, is_standalone_marker};
use crate::markers::MarkerList;

#[derive(Debug, Clone)]
pub struct JpegComponent {
    pub info: ComponentInfo,
    pub dc_table_dest: u8,
    pub ac_table_dest: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCoding {
    /// SOF0/SOF1: sequential DCT, Huffman coding.
    Sequential,
    /// SOF2: progressive DCT, Huffman coding.
    Progressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub coding: FrameCoding,
}

/// Parameters of the scan whose entropy coded data starts at the reader's
/// current position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHeader {
    pub component_indices: Vec<usize>,
    pub spectral_start: u8,
    pub spectral_end: u8,
    pub approximation_high: u8,
    pub approximation_low: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegStreamReaderState {
    BeforeStartOfImage,
    HeaderSection,
    ScanSection,
    EndOfImage,
}

pub struct JpegStreamReader<'a> {
    source: &'a [u8],
    position: usize,
    state: JpegStreamReaderState,
    frame_info: Option<FrameInfo>,
    retain_markers: bool,
    markers: MarkerList,
    pub quantization_tables: [Option<QuantizationTable>; MAXIMUM_QUANTIZATION_TABLES],
    pub huffman_tables_dc: [Option<HuffmanTable>; MAXIMUM_HUFFMAN_TABLES],
    pub huffman_tables_ac: [Option<HuffmanTable>; MAXIMUM_HUFFMAN_TABLES],
    pub components: Vec<JpegComponent>,
    pub restart_interval: u16,
}

impl<'a> JpegStreamReader<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            position: 0,
            state: JpegStreamReaderState::BeforeStartOfImage,
            frame_info: None,
            retain_markers: false,
            markers: MarkerList::new(),
            quantization_tables: [None; MAXIMUM_QUANTIZATION_TABLES],
            huffman_tables_dc: [const { None }; MAXIMUM_HUFFMAN_TABLES],
            huffman_tables_ac: [const { None }; MAXIMUM_HUFFMAN_TABLES],
            components: Vec::new(),
            restart_interval: 0,
        }
    }

    /// Keep APPn and COM segments instead of skipping them.
    pub fn set_retain_markers(&mut self, retain: bool) {
        self.retain_markers = retain;
    }

    pub fn take_markers(&mut self) -> MarkerList {
        std::mem::take(&mut self.markers)
    }

    pub fn frame_info(&self) -> Option<FrameInfo> {
        self.frame_info
    }

    pub fn state(&self) -> JpegStreamReaderState {
        self.state
    }

    pub fn remaining_data(&self) -> &'a [u8] {
        &self.source[self.position.min(self.source.len())..]
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn advance(&mut self, count: usize) {
        self.position += count;
    }

    /// Reads SOI and every segment up to and including the first SOS.
    pub fn read_header(&mut self) -> Result<ScanHeader> {
        if self.state != JpegStreamReaderState::BeforeStartOfImage {
            return Err(TransformError::InvalidState("header already read"));
        }
        self.read_start_of_image()?;
        match self.read_segments()? {
            Some(scan) => Ok(scan),
            None => Err(TransformError::NotAJpeg("no image data before end of image")),
        }
    }

    /// Skips past the entropy coded data of the current scan and reads the
    /// segments that follow it. Returns None once EOI (or the end of the data)
    /// is reached.
    pub fn read_next_scan(&mut self) -> Result<Option<ScanHeader>> {
        if self.state != JpegStreamReaderState::ScanSection {
            return Err(TransformError::InvalidState("no scan in progress"));
        }
        match find_marker(self.source, self.position) {
            Some(marker_position) => self.position = marker_position,
            None => {
                log::debug!("JPEG data ends without an end of image marker");
                self.state = JpegStreamReaderState::EndOfImage;
                return Ok(None);
            }
        }
        self.read_segments().map_err(|e| match e {
            TransformError::NotAJpeg(reason) => TransformError::CorruptData(reason),
            other => other,
        })
    }

    fn read_segments(&mut self) -> Result<Option<ScanHeader>> {
        self.state = JpegStreamReaderState::HeaderSection;
        loop {
            let code = self.read_marker_code()?;
            if is_standalone_marker(code) {
                if code == u8::from(JpegMarkerCode::EndOfImage) {
                    self.state = JpegStreamReaderState::EndOfImage;
                    return Ok(None);
                }
                continue;
            }
            match JpegMarkerCode::try_from(code) {
                Ok(JpegMarkerCode::StartOfFrameBaseline | JpegMarkerCode::StartOfFrameExtended) => {
                    self.read_start_of_frame_segment(FrameCoding::Sequential)?;
                }
                Ok(JpegMarkerCode::StartOfFrameProgressive) => {
                    self.read_start_of_frame_segment(FrameCoding::Progressive)?;
                }
                Ok(
                    JpegMarkerCode::StartOfFrameLossless
                    | JpegMarkerCode::StartOfFrameDifferentialSequential
                    | JpegMarkerCode::StartOfFrameDifferentialProgressive
                    | JpegMarkerCode::StartOfFrameDifferentialLossless,
                ) => {
                    return Err(TransformError::UnsupportedFormat(
                        "lossless and hierarchical JPEG",
                    ));
                }
                Ok(
                    JpegMarkerCode::StartOfFrameArithmeticExtended
                    | JpegMarkerCode::StartOfFrameArithmeticProgressive
                    | JpegMarkerCode::StartOfFrameArithmeticLossless
                    | JpegMarkerCode::StartOfFrameArithmeticDifferentialSequential
                    | JpegMarkerCode::StartOfFrameArithmeticDifferentialProgressive
                    | JpegMarkerCode::StartOfFrameArithmeticDifferentialLossless
                    | JpegMarkerCode::DefineArithmeticConditioning,
                ) => {
                    return Err(TransformError::UnsupportedFormat("arithmetic coding"));
                }
                Ok(JpegMarkerCode::DefineNumberOfLines) => {
                    return Err(TransformError::UnsupportedFormat("DNL marker"));
                }
                Ok(JpegMarkerCode::DefineHuffmanTable) => self.read_dht_segment()?,
                Ok(JpegMarkerCode::DefineQuantizationTable) => self.read_dqt_segment()?,
                Ok(JpegMarkerCode::DefineRestartInterval) => self.read_dri_segment()?,
                Ok(JpegMarkerCode::StartOfScan) => {
                    let scan = self.read_start_of_scan_segment()?;
                    self.state = JpegStreamReaderState::ScanSection;
                    return Ok(Some(scan));
                }
                Ok(JpegMarkerCode::StartOfImage) => {
                    return Err(TransformError::NotAJpeg("duplicate start of image marker"));
                }
                Ok(marker) if marker.is_preserved_segment() => {
                    let payload = self.read_segment_payload()?;
                    if self.retain_markers {
                        self.markers.push(marker, payload.to_vec());
                    }
                }
                _ => {
                    self.read_segment_payload()?;
                }
            }
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let val = *self
            .source
            .get(self.position)
            .ok_or(TransformError::NotAJpeg("unexpected end of data"))?;
        self.position += 1;
        Ok(val)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b1 = self.read_u8()? as u16;
        let b2 = self.read_u8()? as u16;
        Ok((b1 << 8) | b2)
    }

    fn read_marker_code(&mut self) -> Result<u8> {
        if self.read_u8()? != JPEG_MARKER_START_BYTE {
            return Err(TransformError::NotAJpeg("marker start byte not found"));
        }
        let mut code = self.read_u8()?;
        // Any marker may be preceded by fill bytes.
        while code == JPEG_MARKER_START_BYTE {
            code = self.read_u8()?;
        }
        Ok(code)
    }

    fn read_start_of_image(&mut self) -> Result<()> {
        if self.source.len() < 2
            || self.source[0] != JPEG_MARKER_START_BYTE
            || self.source[1] != u8::from(JpegMarkerCode::StartOfImage)
        {
            return Err(TransformError::NotAJpeg("start of image marker not found"));
        }
        self.position = 2;
        self.state = JpegStreamReaderState::HeaderSection;
        Ok(())
    }

    /// Reads a segment's length field and returns its payload.
    fn read_segment_payload(&mut self) -> Result<&'a [u8]> {
        let length = self.read_u16()? as usize;
        if length < 2 {
            return Err(TransformError::NotAJpeg("invalid marker segment size"));
        }
        let end = self.position + length - 2;
        if end > self.source.len() {
            return Err(TransformError::NotAJpeg("segment runs past end of data"));
        }
        let source: &'a [u8] = self.source;
        let payload = &source[self.position..end];
        self.position = end;
        Ok(payload)
    }

    fn read_start_of_frame_segment(&mut self, coding: FrameCoding) -> Result<()> {
        if self.frame_info.is_some() {
            return Err(TransformError::NotAJpeg("duplicate start of frame marker"));
        }
        let payload = self.read_segment_payload()?;
        if payload.len() < 6 {
            return Err(TransformError::NotAJpeg("start of frame segment too short"));
        }
        let precision = payload[0];
        let height = u16::from_be_bytes([payload[1], payload[2]]) as u32;
        let width = u16::from_be_bytes([payload[3], payload[4]]) as u32;
        let component_count = payload[5] as usize;

        if precision != 8 {
            return Err(TransformError::UnsupportedFormat("sample precision other than 8 bits"));
        }
        if height == 0 {
            return Err(TransformError::UnsupportedFormat("image height defined by DNL"));
        }
        if width == 0 || component_count == 0 {
            return Err(TransformError::NotAJpeg("empty frame"));
        }
        if payload.len() != 6 + component_count * 3 {
            return Err(TransformError::NotAJpeg("invalid start of frame segment size"));
        }

        let mut components: Vec<JpegComponent> = Vec::with_capacity(component_count);
        for chunk in payload[6..].chunks_exact(3) {
            let (id, sampling, tq) = (chunk[0], chunk[1], chunk[2]);
            let h_samp_factor = sampling >> 4;
            let v_samp_factor = sampling & 0x0F;
            if !(1..=MAXIMUM_SAMPLING_FACTOR).contains(&h_samp_factor)
                || !(1..=MAXIMUM_SAMPLING_FACTOR).contains(&v_samp_factor)
            {
                return Err(TransformError::NotAJpeg("invalid sampling factor"));
            }
            if tq as usize >= MAXIMUM_QUANTIZATION_TABLES {
                return Err(TransformError::NotAJpeg("invalid quantization table selector"));
            }
            if components.iter().any(|c| c.info.id == id) {
                return Err(TransformError::NotAJpeg("duplicate component ID in SOF segment"));
            }
            components.push(JpegComponent {
                info: ComponentInfo {
                    id,
                    h_samp_factor,
                    v_samp_factor,
                    quant_table_dest: tq,
                },
                dc_table_dest: 0,
                ac_table_dest: 0,
            });
        }

        // A lone component is always coded block by block.
        if let [only] = components.as_mut_slice() {
            only.info.h_samp_factor = 1;
            only.info.v_samp_factor = 1;
        }

        self.components = components;
        self.frame_info = Some(FrameInfo {
            width,
            height,
            coding,
        });
        Ok(())
    }

    pub fn read_dqt_segment(&mut self) -> Result<()> {
        let payload = self.read_segment_payload()?;
        let mut offset = 0;
        while offset < payload.len() {
            let pq_tq = payload[offset];
            offset += 1;
            let precision = pq_tq >> 4;
            let id = (pq_tq & 0x0F) as usize;
            if id >= MAXIMUM_QUANTIZATION_TABLES || precision > 1 {
                return Err(TransformError::NotAJpeg("invalid quantization table"));
            }
            let entry_size = precision as usize + 1;
            let end = offset + BLOCK_DIM * entry_size;
            if end > payload.len() {
                return Err(TransformError::NotAJpeg("quantization table segment too short"));
            }
            let mut table = [0u16; BLOCK_DIM];
            for (k, &natural) in ZIGZAG_ORDER.iter().enumerate() {
                let at = offset + k * entry_size;
                table[natural] = if precision == 0 {
                    payload[at] as u16
                } else {
                    u16::from_be_bytes([payload[at], payload[at + 1]])
                };
            }
            self.quantization_tables[id] = Some(table);
            offset = end;
        }
        Ok(())
    }

    pub fn read_dht_segment(&mut self) -> Result<()> {
        let payload = self.read_segment_payload()?;
        let mut offset = 0;
        while offset < payload.len() {
            if offset + 17 > payload.len() {
                return Err(TransformError::NotAJpeg("Huffman table segment too short"));
            }
            let tc_th = payload[offset];
            let class = tc_th >> 4;
            let id = (tc_th & 0x0F) as usize;
            if id >= MAXIMUM_HUFFMAN_TABLES || class > 1 {
                return Err(TransformError::NotAJpeg("invalid Huffman table"));
            }

            let mut lengths = [0u8; 16];
            lengths.copy_from_slice(&payload[offset + 1..offset + 17]);
            let total_values: usize = lengths.iter().map(|&n| n as usize).sum();
            offset += 17;

            if offset + total_values > payload.len() {
                return Err(TransformError::NotAJpeg("Huffman table segment too short"));
            }
            let values = &payload[offset..offset + total_values];
            offset += total_values;

            let table = HuffmanTable::build_from_dht(&lengths, values)?;
            if class == 0 {
                self.huffman_tables_dc[id] = Some(table);
            } else {
                self.huffman_tables_ac[id] = Some(table);
            }
        }
        Ok(())
    }

    pub fn read_dri_segment(&mut self) -> Result<()> {
        let payload = self.read_segment_payload()?;
        if payload.len() != 2 {
            return Err(TransformError::NotAJpeg("invalid restart interval segment"));
        }
        self.restart_interval = u16::from_be_bytes([payload[0], payload[1]]);
        Ok(())
    }

    fn read_start_of_scan_segment(&mut self) -> Result<ScanHeader> {
        let frame = self
            .frame_info
            .ok_or(TransformError::NotAJpeg("start of scan before start of frame"))?;
        let payload = self.read_segment_payload()?;
        let components_in_scan = *payload
            .first()
            .ok_or(TransformError::NotAJpeg("start of scan segment too short"))?
            as usize;
        if components_in_scan == 0
            || components_in_scan > MAXIMUM_COMPONENT_COUNT_IN_SCAN
            || payload.len() != 1 + components_in_scan * 2 + 3
        {
            return Err(TransformError::NotAJpeg("invalid start of scan segment"));
        }

        let mut component_indices = Vec::with_capacity(components_in_scan);
        for chunk in payload[1..1 + components_in_scan * 2].chunks_exact(2) {
            let (id, selector) = (chunk[0], chunk[1]);
            let index = self
                .components
                .iter()
                .position(|c| c.info.id == id)
                .ok_or(TransformError::NotAJpeg("unknown component ID in scan"))?;
            if component_indices.contains(&index) {
                return Err(TransformError::NotAJpeg("component repeated in scan"));
            }
            let component = &mut self.components[index];
            component.dc_table_dest = selector >> 4;
            component.ac_table_dest = selector & 0x0F;
            if component.dc_table_dest as usize >= MAXIMUM_HUFFMAN_TABLES
                || component.ac_table_dest as usize >= MAXIMUM_HUFFMAN_TABLES
            {
                return Err(TransformError::NotAJpeg("invalid Huffman table selector"));
            }
            component_indices.push(index);
        }

        let tail = &payload[1 + components_in_scan * 2..];
        let scan = ScanHeader {
            component_indices,
            spectral_start: tail[0],
            spectral_end: tail[1],
            approximation_high: tail[2] >> 4,
            approximation_low: tail[2] & 0x0F,
        };

        if frame.coding == FrameCoding::Progressive {
            let valid = scan.spectral_start <= scan.spectral_end
                && scan.spectral_end <= 63
                && (scan.spectral_start > 0 || scan.spectral_end == 0)
                && (scan.spectral_start == 0 || scan.component_indices.len() == 1)
                && scan.approximation_low <= 13
                && scan.approximation_high <= 13;
            if !valid {
                return Err(TransformError::NotAJpeg("invalid progressive scan parameters"));
            }
        }
        Ok(scan)
    }
}

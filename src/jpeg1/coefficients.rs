//! In-memory representation of a JPEG image as quantized DCT coefficients.
//!
//! Blocks are kept in natural (row-major) order: index `v * 8 + u` holds the
//! coefficient for vertical frequency `v` and horizontal frequency `u`.
//! Each component's block grid is padded to a whole number of MCUs, the way
//! a decoder allocates its coefficient buffers.

use crate::constants::{BLOCK_DIM, BLOCK_SIZE, MAXIMUM_QUANTIZATION_TABLES};
use crate::error::{Result, TransformError};

/// One 8x8 block of quantized coefficients, natural order.
pub type Block = [i16; BLOCK_DIM];

/// A quantization table, natural order.
pub type QuantizationTable = [u16; BLOCK_DIM];

/// Zigzag scan pattern for 8x8 blocks: entry `k` is the natural-order index
/// of the `k`-th coefficient in the entropy coded stream.
pub const ZIGZAG_ORDER: [usize; BLOCK_DIM] = [
    0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentInfo {
    pub id: u8,
    pub h_samp_factor: u8,
    pub v_samp_factor: u8,
    pub quant_table_dest: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentCoefficients {
    pub info: ComponentInfo,
    pub width_in_blocks: usize,
    pub height_in_blocks: usize,
    pub blocks: Vec<Block>,
}

impl ComponentCoefficients {
    fn zeroed(info: ComponentInfo, width_in_blocks: usize, height_in_blocks: usize) -> Result<Self> {
        let count = width_in_blocks
            .checked_mul(height_in_blocks)
            .ok_or(TransformError::OutOfMemory)?;
        let mut blocks = Vec::new();
        blocks.try_reserve_exact(count)?;
        blocks.resize(count, [0i16; BLOCK_DIM]);
        Ok(Self {
            info,
            width_in_blocks,
            height_in_blocks,
            blocks,
        })
    }

    pub fn block(&self, block_x: usize, block_y: usize) -> &Block {
        &self.blocks[block_y * self.width_in_blocks + block_x]
    }

    pub fn block_mut(&mut self, block_x: usize, block_y: usize) -> &mut Block {
        &mut self.blocks[block_y * self.width_in_blocks + block_x]
    }
}

/// Quantized DCT coefficients for every component of one image, plus the
/// frame parameters needed to write them back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoefficientImage {
    pub width: u32,
    pub height: u32,
    pub components: Vec<ComponentCoefficients>,
    pub quantization_tables: [Option<QuantizationTable>; MAXIMUM_QUANTIZATION_TABLES],
    pub restart_interval: u16,
}

impl CoefficientImage {
    /// Allocates an all-zero image with MCU-padded block grids.
    pub fn new(
        width: u32,
        height: u32,
        layout: &[ComponentInfo],
        quantization_tables: [Option<QuantizationTable>; MAXIMUM_QUANTIZATION_TABLES],
    ) -> Result<Self> {
        if width == 0 || height == 0 || width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(TransformError::InvalidArgument("image dimensions"));
        }
        if layout.is_empty() {
            return Err(TransformError::InvalidArgument("component count"));
        }
        for info in layout {
            if !(1..=4).contains(&info.h_samp_factor) || !(1..=4).contains(&info.v_samp_factor) {
                return Err(TransformError::InvalidArgument("sampling factor"));
            }
            if quantization_tables
                .get(info.quant_table_dest as usize)
                .and_then(Option::as_ref)
                .is_none()
            {
                return Err(TransformError::InvalidArgument("quantization table selector"));
            }
        }

        let h_max = layout.iter().map(|c| c.h_samp_factor).max().unwrap_or(1) as usize;
        let v_max = layout.iter().map(|c| c.v_samp_factor).max().unwrap_or(1) as usize;
        let mcus_x = (width as usize).div_ceil(h_max * BLOCK_SIZE);
        let mcus_y = (height as usize).div_ceil(v_max * BLOCK_SIZE);

        let mut components = Vec::with_capacity(layout.len());
        for info in layout {
            components.push(ComponentCoefficients::zeroed(
                *info,
                mcus_x * info.h_samp_factor as usize,
                mcus_y * info.v_samp_factor as usize,
            )?);
        }

        Ok(Self {
            width,
            height,
            components,
            quantization_tables,
            restart_interval: 0,
        })
    }

    pub fn max_h_samp_factor(&self) -> u8 {
        self.components.iter().map(|c| c.info.h_samp_factor).max().unwrap_or(1)
    }

    pub fn max_v_samp_factor(&self) -> u8 {
        self.components.iter().map(|c| c.info.v_samp_factor).max().unwrap_or(1)
    }

    /// Width in pixels of one interleaved MCU (the iMCU width).
    pub fn mcu_width(&self) -> usize {
        self.max_h_samp_factor() as usize * BLOCK_SIZE
    }

    /// Height in pixels of one interleaved MCU (the iMCU height).
    pub fn mcu_height(&self) -> usize {
        self.max_v_samp_factor() as usize * BLOCK_SIZE
    }

    pub fn mcus_per_row(&self) -> usize {
        (self.width as usize).div_ceil(self.mcu_width())
    }

    pub fn mcu_rows(&self) -> usize {
        (self.height as usize).div_ceil(self.mcu_height())
    }

    /// Blocks actually covered by image samples for component `index`,
    /// which is the block grid of a non-interleaved scan.
    pub fn natural_blocks(&self, index: usize) -> (usize, usize) {
        let info = &self.components[index].info;
        let samples_x = (self.width as usize * info.h_samp_factor as usize)
            .div_ceil(self.max_h_samp_factor() as usize);
        let samples_y = (self.height as usize * info.v_samp_factor as usize)
            .div_ceil(self.max_v_samp_factor() as usize);
        (samples_x.div_ceil(BLOCK_SIZE), samples_y.div_ceil(BLOCK_SIZE))
    }

    pub fn quantization_table(&self, selector: u8) -> Option<&QuantizationTable> {
        self.quantization_tables
            .get(selector as usize)
            .and_then(Option::as_ref)
    }
}

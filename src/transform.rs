//! Lossless geometric transforms in the DCT coefficient domain.
//!
//! Every transform is a combination of a transposition and mirrors along the
//! destination x and y axes. Mirroring a block negates its odd-frequency
//! coefficients along that axis; transposing swaps the block's rows and
//! columns. No coefficient is ever dequantized.

use std::fmt;

use crate::constants::BLOCK_SIZE;
use crate::error::{Result, TransformError};
use crate::jpeg1::coefficients::{Block, CoefficientImage, ComponentInfo};
use crate::jpeg1::quantization::transpose_table;

/// A concrete lossless transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Transform {
    #[default]
    None,
    FlipHorizontal,
    FlipVertical,
    Rotate90,
    Rotate180,
    Rotate270,
    Transpose,
    Transverse,
}

/// What the caller asked for. `Automatic` is resolved from the EXIF
/// orientation before anything touches coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransformRequest {
    #[default]
    None,
    FlipHorizontal,
    FlipVertical,
    Rotate90,
    Rotate180,
    Rotate270,
    Transpose,
    Transverse,
    Automatic,
}

impl Transform {
    pub const ALL: [Transform; 8] = [
        Transform::None,
        Transform::FlipHorizontal,
        Transform::FlipVertical,
        Transform::Rotate90,
        Transform::Rotate180,
        Transform::Rotate270,
        Transform::Transpose,
        Transform::Transverse,
    ];

    /// Transform that displays an image with the given EXIF orientation
    /// upright. Values outside 1..=8 mean "leave it alone".
    pub fn from_orientation(orientation: u16) -> Self {
        match orientation {
            2 => Transform::FlipHorizontal,
            3 => Transform::Rotate180,
            4 => Transform::FlipVertical,
            5 => Transform::Transpose,
            6 => Transform::Rotate90,
            7 => Transform::Transverse,
            8 => Transform::Rotate270,
            _ => Transform::None,
        }
    }

    /// True for the four transforms that exchange width and height.
    pub fn swaps_dimensions(self) -> bool {
        self.decompose().0
    }

    pub fn inverse(self) -> Self {
        match self {
            Transform::Rotate90 => Transform::Rotate270,
            Transform::Rotate270 => Transform::Rotate90,
            other => other,
        }
    }

    /// (transpose, mirror destination x, mirror destination y)
    fn decompose(self) -> (bool, bool, bool) {
        match self {
            Transform::None => (false, false, false),
            Transform::FlipHorizontal => (false, true, false),
            Transform::FlipVertical => (false, false, true),
            Transform::Rotate180 => (false, true, true),
            Transform::Transpose => (true, false, false),
            Transform::Rotate90 => (true, true, false),
            Transform::Rotate270 => (true, false, true),
            Transform::Transverse => (true, true, true),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transform::None => "none",
            Transform::FlipHorizontal => "flip-horizontal",
            Transform::FlipVertical => "flip-vertical",
            Transform::Rotate90 => "rotate-90",
            Transform::Rotate180 => "rotate-180",
            Transform::Rotate270 => "rotate-270",
            Transform::Transpose => "transpose",
            Transform::Transverse => "transverse",
        };
        f.write_str(name)
    }
}

impl TransformRequest {
    /// The concrete transform, or None for `Automatic`.
    pub fn concrete(self) -> Option<Transform> {
        Some(match self {
            TransformRequest::None => Transform::None,
            TransformRequest::FlipHorizontal => Transform::FlipHorizontal,
            TransformRequest::FlipVertical => Transform::FlipVertical,
            TransformRequest::Rotate90 => Transform::Rotate90,
            TransformRequest::Rotate180 => Transform::Rotate180,
            TransformRequest::Rotate270 => Transform::Rotate270,
            TransformRequest::Transpose => Transform::Transpose,
            TransformRequest::Transverse => Transform::Transverse,
            TransformRequest::Automatic => return None,
        })
    }

    /// Resolves `Automatic` against the image's orientation tag value.
    pub fn resolve(self, orientation: u16) -> Transform {
        self.concrete()
            .unwrap_or_else(|| Transform::from_orientation(orientation))
    }
}

impl From<Transform> for TransformRequest {
    fn from(transform: Transform) -> Self {
        match transform {
            Transform::None => TransformRequest::None,
            Transform::FlipHorizontal => TransformRequest::FlipHorizontal,
            Transform::FlipVertical => TransformRequest::FlipVertical,
            Transform::Rotate90 => TransformRequest::Rotate90,
            Transform::Rotate180 => TransformRequest::Rotate180,
            Transform::Rotate270 => TransformRequest::Rotate270,
            Transform::Transpose => TransformRequest::Transpose,
            Transform::Transverse => TransformRequest::Transverse,
        }
    }
}

/// Applies `transform` to `image`.
///
/// With `trim` set, the mirrored axes are cut down to a whole number of
/// iMCUs. Without it, a partial iMCU at the edge of a mirrored axis is kept
/// in place, unmirrored, so nothing is lost and the operation stays
/// reversible.
pub fn transform(image: &CoefficientImage, transform: Transform, trim: bool) -> Result<CoefficientImage> {
    transform_checked(image, transform, trim, false)
}

/// Like [`transform`], but with `perfect` set the transform is refused when
/// it would leave unmirrored edge blocks behind.
pub fn transform_checked(
    image: &CoefficientImage,
    transform: Transform,
    trim: bool,
    perfect: bool,
) -> Result<CoefficientImage> {
    if transform == Transform::None {
        return Ok(image.clone());
    }
    check_sampling(image)?;

    let (transpose, mirror_x, mirror_y) = transform.decompose();

    let layout: Vec<ComponentInfo> = image
        .components
        .iter()
        .map(|c| {
            let mut info = c.info;
            if transpose {
                std::mem::swap(&mut info.h_samp_factor, &mut info.v_samp_factor);
            }
            info
        })
        .collect();
    let (mut width, mut height) = if transpose {
        (image.height, image.width)
    } else {
        (image.width, image.height)
    };
    let h_max = layout.iter().map(|c| c.h_samp_factor).max().unwrap_or(1) as u32;
    let v_max = layout.iter().map(|c| c.v_samp_factor).max().unwrap_or(1) as u32;
    let mcu_width = h_max * BLOCK_SIZE as u32;
    let mcu_height = v_max * BLOCK_SIZE as u32;

    if trim {
        if mirror_x && width >= mcu_width {
            width -= width % mcu_width;
        }
        if mirror_y && height >= mcu_height {
            height -= height % mcu_height;
        }
    }
    if perfect && ((mirror_x && width % mcu_width != 0) || (mirror_y && height % mcu_height != 0)) {
        return Err(TransformError::UnsupportedGeometry(
            "image size is not a multiple of the iMCU size",
        ));
    }

    let mut tables = image.quantization_tables;
    if transpose {
        for table in tables.iter_mut().flatten() {
            *table = transpose_table(table);
        }
    }

    let mut output = CoefficientImage::new(width, height, &layout, tables)?;
    output.restart_interval = image.restart_interval;

    let full_mcus_x = (width / mcu_width) as usize;
    let full_mcus_y = (height / mcu_height) as usize;

    for (source, destination) in image.components.iter().zip(output.components.iter_mut()) {
        let full_x = full_mcus_x * destination.info.h_samp_factor as usize;
        let full_y = full_mcus_y * destination.info.v_samp_factor as usize;
        for by in 0..destination.height_in_blocks {
            let flip_y = mirror_y && by < full_y;
            let ty = if flip_y { full_y - 1 - by } else { by };
            for bx in 0..destination.width_in_blocks {
                let flip_x = mirror_x && bx < full_x;
                let tx = if flip_x { full_x - 1 - bx } else { bx };
                let src = if transpose {
                    source.block(ty, tx)
                } else {
                    source.block(tx, ty)
                };
                transform_block(src, destination.block_mut(bx, by), transpose, flip_x, flip_y);
            }
        }
    }

    log::debug!(
        "{} {}x{} -> {}x{}",
        transform,
        image.width,
        image.height,
        output.width,
        output.height
    );
    Ok(output)
}

/// Chroma planes whose sampling factor does not divide the maximum cannot be
/// moved block by block without resampling.
fn check_sampling(image: &CoefficientImage) -> Result<()> {
    let h_max = image.max_h_samp_factor();
    let v_max = image.max_v_samp_factor();
    let integral = image
        .components
        .iter()
        .all(|c| h_max % c.info.h_samp_factor == 0 && v_max % c.info.v_samp_factor == 0);
    if !integral {
        return Err(TransformError::UnsupportedGeometry(
            "sampling factors are not integral ratios",
        ));
    }
    Ok(())
}

fn transform_block(src: &Block, dst: &mut Block, transpose: bool, flip_x: bool, flip_y: bool) {
    for row in 0..BLOCK_SIZE {
        for col in 0..BLOCK_SIZE {
            let value = if transpose {
                src[col * BLOCK_SIZE + row]
            } else {
                src[row * BLOCK_SIZE + col]
            };
            let negate = (flip_x && col % 2 == 1) ^ (flip_y && row % 2 == 1);
            dst[row * BLOCK_SIZE + col] = if negate { value.wrapping_neg() } else { value };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg1::quantization::standard_tables;

    fn info(id: u8, h: u8, v: u8, table: u8) -> ComponentInfo {
        ComponentInfo {
            id,
            h_samp_factor: h,
            v_samp_factor: v,
            quant_table_dest: table,
        }
    }

    fn ycc420() -> Vec<ComponentInfo> {
        vec![info(1, 2, 2, 0), info(2, 1, 1, 1), info(3, 1, 1, 1)]
    }

    /// Every coefficient of every block gets a distinct-ish value.
    fn patterned(width: u32, height: u32, layout: &[ComponentInfo]) -> CoefficientImage {
        let mut image = CoefficientImage::new(width, height, layout, standard_tables()).unwrap();
        for (c, component) in image.components.iter_mut().enumerate() {
            for (n, block) in component.blocks.iter_mut().enumerate() {
                for (k, coefficient) in block.iter_mut().enumerate() {
                    *coefficient = ((c * 1000 + n * 64 + k) % 2000) as i16 - 1000;
                }
            }
        }
        image
    }

    #[test]
    fn four_quarter_turns_are_identity() {
        let image = patterned(64, 48, &ycc420());
        let mut current = image.clone();
        for _ in 0..4 {
            current = transform(&current, Transform::Rotate90, false).unwrap();
        }
        assert_eq!(current, image);
    }

    #[test]
    fn flips_and_transpose_are_involutions() {
        let image = patterned(48, 32, &ycc420());
        for t in [Transform::FlipHorizontal, Transform::FlipVertical, Transform::Transpose, Transform::Transverse, Transform::Rotate180] {
            let once = transform(&image, t, false).unwrap();
            assert_ne!(once, image, "{t}");
            assert_eq!(transform(&once, t, false).unwrap(), image, "{t}");
        }
    }

    #[test]
    fn every_transform_is_undone_by_its_inverse() {
        let image = patterned(32, 64, &ycc420());
        for t in Transform::ALL {
            let forward = transform(&image, t, false).unwrap();
            assert_eq!(transform(&forward, t.inverse(), false).unwrap(), image, "{t}");
        }
    }

    #[test]
    fn unaligned_flips_keep_partial_edge_and_stay_reversible() {
        let image = patterned(50, 30, &ycc420());
        for t in [Transform::FlipHorizontal, Transform::FlipVertical, Transform::Transpose] {
            let once = transform(&image, t, false).unwrap();
            assert_eq!(transform(&once, t, false).unwrap(), image, "{t}");
        }
        // The partial iMCU column (luma blocks 6 and 7) is not moved.
        let flipped = transform(&image, Transform::FlipHorizontal, false).unwrap();
        assert_eq!(flipped.components[0].block(6, 0), image.components[0].block(6, 0));
        assert_eq!((flipped.width, flipped.height), (50, 30));
    }

    #[test]
    fn rotation_swaps_dimensions_and_sampling() {
        let layout = vec![info(1, 2, 1, 0), info(2, 1, 1, 1), info(3, 1, 1, 1)];
        let image = patterned(64, 16, &layout);
        let rotated = transform(&image, Transform::Rotate90, false).unwrap();
        assert_eq!((rotated.width, rotated.height), (16, 64));
        assert_eq!(rotated.components[0].info.h_samp_factor, 1);
        assert_eq!(rotated.components[0].info.v_samp_factor, 2);
        assert_eq!(
            rotated.quantization_tables[0],
            Some(transpose_table(&image.quantization_tables[0].unwrap()))
        );
    }

    #[test]
    fn trim_drops_partial_imcus_on_mirrored_axes_only() {
        let image = patterned(50, 30, &ycc420());
        let flipped = transform(&image, Transform::FlipHorizontal, true).unwrap();
        assert_eq!((flipped.width, flipped.height), (48, 30));
        let rotated = transform(&image, Transform::Rotate90, true).unwrap();
        assert_eq!((rotated.width, rotated.height), (16, 50));
        let transposed = transform(&image, Transform::Transpose, true).unwrap();
        assert_eq!((transposed.width, transposed.height), (30, 50));
    }

    #[test]
    fn trim_keeps_images_smaller_than_one_imcu() {
        let image = patterned(10, 10, &ycc420());
        let flipped = transform(&image, Transform::Rotate180, true).unwrap();
        assert_eq!((flipped.width, flipped.height), (10, 10));
    }

    #[test]
    fn perfect_rejects_partial_edges_unless_trimmed() {
        let image = patterned(50, 30, &ycc420());
        assert!(matches!(
            transform_checked(&image, Transform::FlipHorizontal, false, true),
            Err(TransformError::UnsupportedGeometry(_))
        ));
        assert!(transform_checked(&image, Transform::FlipHorizontal, true, true).is_ok());
        assert!(transform_checked(&image, Transform::Transpose, false, true).is_ok());
    }

    #[test]
    fn non_integral_sampling_is_unsupported() {
        let layout = vec![info(1, 4, 1, 0), info(2, 3, 1, 1)];
        let image = patterned(64, 8, &layout);
        assert!(matches!(
            transform(&image, Transform::FlipHorizontal, false),
            Err(TransformError::UnsupportedGeometry(_))
        ));
        assert_eq!(transform(&image, Transform::None, false).unwrap(), image);
    }

    #[test]
    fn quarter_turn_moves_frequencies_between_axes() {
        let mut image = CoefficientImage::new(16, 8, &[info(1, 1, 1, 0)], standard_tables()).unwrap();
        image.components[0].block_mut(0, 0)[1] = 10; // horizontal u=1
        image.components[0].block_mut(0, 0)[8] = 20; // vertical v=1
        image.components[0].block_mut(1, 0)[0] = 99;

        let rotated = transform(&image, Transform::Rotate90, false).unwrap();
        assert_eq!((rotated.width, rotated.height), (8, 16));
        let top = rotated.components[0].block(0, 0);
        assert_eq!(top[8], 10);
        assert_eq!(top[1], -20);
        assert_eq!(rotated.components[0].block(0, 1)[0], 99);

        let flipped = transform(&image, Transform::FlipHorizontal, false).unwrap();
        assert_eq!(flipped.components[0].block(1, 0)[1], -10);
        assert_eq!(flipped.components[0].block(1, 0)[8], 20);
        assert_eq!(flipped.components[0].block(0, 0)[0], 99);
    }

    #[test]
    fn automatic_resolves_from_orientation() {
        assert_eq!(TransformRequest::Automatic.resolve(6), Transform::Rotate90);
        assert_eq!(TransformRequest::Automatic.resolve(8), Transform::Rotate270);
        assert_eq!(TransformRequest::Automatic.resolve(0), Transform::None);
        assert_eq!(TransformRequest::Automatic.resolve(9), Transform::None);
        assert_eq!(TransformRequest::FlipVertical.resolve(6), Transform::FlipVertical);
        assert!(Transform::Transverse.swaps_dimensions());
        assert!(!Transform::Rotate180.swaps_dimensions());
    }
}

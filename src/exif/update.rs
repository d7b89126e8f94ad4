//! Keeps an EXIF block consistent with a transformed image.

use super::tags::*;
use super::{ExifBlock, Ifd, Result};
use crate::error::ExifError;
use crate::jpeg1::{Jpeg1Decoder, Jpeg1Encoder};
use crate::markers::MarkerList;
use crate::options::TransformFlags;
use crate::transform::{Transform, transform_checked};

/// Orientation stored in IFD0; `Normal` when the block is missing, broken or
/// holds a value outside 1..=8.
pub fn read_orientation(metadata: Option<&[u8]>) -> Orientation {
    let Some(payload) = metadata else {
        return Orientation::Normal;
    };
    let value = ExifBlock::parse(payload).and_then(|block| block.get_int(Ifd::Primary, ORIENTATION));
    match value {
        Ok(Some(value)) => u16::try_from(value)
            .ok()
            .and_then(|v| Orientation::try_from(v).ok())
            .unwrap_or_default(),
        Ok(None) => Orientation::Normal,
        Err(e) => {
            log::debug!("ignoring unreadable EXIF orientation: {e}");
            Orientation::Normal
        }
    }
}

pub fn resolve_automatic(orientation: Orientation) -> Transform {
    Transform::from_orientation(orientation.into())
}

/// Rewrites `metadata` (an APP1 payload) to match the transformed image.
///
/// `transform` is the resolved transform, applied to the thumbnail even when
/// the main image is left alone. `width` and `height` are the output size as
/// seen before the transform swapped axes; they are swapped here only when
/// [`TransformFlags::TRANSFORM_IMAGE`] is set and the transform transposes.
///
/// A thumbnail that cannot be rewritten is kept as it was; the orientation
/// and dimension edits still go through. Returns None when the segment
/// should be left as it is: there was no block and none is needed, or the
/// block could not be parsed or patched (the failure is logged).
pub fn apply_updates(
    metadata: Option<&[u8]>,
    transform: Transform,
    width: u32,
    height: u32,
    flags: TransformFlags,
    new_thumbnail: Option<&[u8]>,
) -> Option<Vec<u8>> {
    let new_thumbnail = new_thumbnail.filter(|_| flags.contains(TransformFlags::UPDATE_THUMBNAIL));
    let mut block = match metadata {
        Some(payload) => match ExifBlock::parse(payload) {
            Ok(block) => block,
            Err(e) => {
                log::warn!("EXIF block left untouched, cannot parse it: {e}");
                return None;
            }
        },
        None if new_thumbnail.is_some() => ExifBlock::new_empty(),
        None => return None,
    };

    if let Err(e) = update_geometry(&mut block, transform, width, height, flags) {
        log::warn!("EXIF block left untouched: {e}");
        return None;
    }

    let without_thumbnail = block.clone();
    let thumbnail_changed = match update_thumbnail(&mut block, transform, flags, new_thumbnail) {
        Ok(changed) => changed,
        Err(e) => {
            log::warn!("thumbnail left as it was: {e}");
            block = without_thumbnail.clone();
            false
        }
    };
    if metadata.is_none() && !thumbnail_changed {
        return None;
    }

    match block.to_payload() {
        Ok(payload) => Some(payload),
        Err(e @ ExifError::TooLarge(_)) if thumbnail_changed => {
            log::warn!("thumbnail left as it was: {e}");
            if metadata.is_none() {
                return None;
            }
            without_thumbnail
                .to_payload()
                .map_err(|e| log::warn!("EXIF block left untouched: {e}"))
                .ok()
        }
        Err(e) => {
            log::warn!("EXIF block left untouched: {e}");
            None
        }
    }
}

/// Orientation reset and pixel dimension tags.
fn update_geometry(
    block: &mut ExifBlock,
    transform: Transform,
    width: u32,
    height: u32,
    flags: TransformFlags,
) -> Result<()> {
    if flags.contains(TransformFlags::UPDATE_ORIENTATION) {
        let normal = u16::from(Orientation::Normal) as u32;
        block.update_int(Ifd::Primary, ORIENTATION, normal)?;
        block.update_int(Ifd::Thumbnail, ORIENTATION, normal)?;
    }

    let swap = flags.contains(TransformFlags::TRANSFORM_IMAGE) && transform.swaps_dimensions();
    let (x, y) = if swap { (height, width) } else { (width, height) };
    block.update_int(Ifd::Exif, PIXEL_X_DIMENSION, x)?;
    block.update_int(Ifd::Exif, PIXEL_Y_DIMENSION, y)?;
    block.update_int(Ifd::Interop, RELATED_IMAGE_WIDTH, x)?;
    block.update_int(Ifd::Interop, RELATED_IMAGE_LENGTH, y)?;
    Ok(())
}

/// Replaces or transforms the thumbnail. Returns whether it changed.
fn update_thumbnail(
    block: &mut ExifBlock,
    transform: Transform,
    flags: TransformFlags,
    new_thumbnail: Option<&[u8]>,
) -> Result<bool> {
    if let Some(data) = new_thumbnail {
        block.replace_thumbnail(data)?;
        if let Some((w, h)) = jpeg_size(data) {
            update_thumbnail_size(block, w, h)?;
        }
        return Ok(true);
    }
    if !flags.contains(TransformFlags::TRANSFORM_THUMBNAIL) || transform == Transform::None {
        return Ok(false);
    }
    let Some(thumbnail) = block.thumbnail()? else {
        return Ok(false);
    };
    if !thumbnail.starts_with(&[0xFF, 0xD8]) {
        log::debug!("thumbnail is not a JPEG, leaving it alone");
        return Ok(false);
    }
    let (data, w, h) = transform_thumbnail(thumbnail, transform, flags)?;
    block.replace_thumbnail(&data)?;
    update_thumbnail_size(block, w, h)?;
    Ok(true)
}

fn update_thumbnail_size(block: &mut ExifBlock, width: u32, height: u32) -> Result<()> {
    block.update_int(Ifd::Thumbnail, IMAGE_WIDTH, width)?;
    block.update_int(Ifd::Thumbnail, IMAGE_LENGTH, height)?;
    Ok(())
}

/// Decodes, transforms and re-encodes a thumbnail with default parameters.
fn transform_thumbnail(data: &[u8], transform: Transform, flags: TransformFlags) -> Result<(Vec<u8>, u32, u32)> {
    let thumbnail_error = |e: crate::error::TransformError| ExifError::Thumbnail(e.to_string());
    let mut decoder = Jpeg1Decoder::new(data);
    decoder.read_header().map_err(thumbnail_error)?;
    let image = decoder.decode_coefficients().map_err(thumbnail_error)?;
    let transformed = transform_checked(
        &image,
        transform,
        flags.contains(TransformFlags::TRANSFORM_TRIM),
        flags.contains(TransformFlags::TRANSFORM_PERFECT),
    )
    .map_err(thumbnail_error)?;
    let encoded = Jpeg1Encoder::new()
        .encode(&transformed, &MarkerList::new())
        .map_err(thumbnail_error)?;
    log::debug!(
        "thumbnail {}x{} -> {}x{}",
        image.width,
        image.height,
        transformed.width,
        transformed.height
    );
    Ok((encoded, transformed.width, transformed.height))
}

pub(crate) fn jpeg_size(data: &[u8]) -> Option<(u32, u32)> {
    let mut decoder = Jpeg1Decoder::new(data);
    decoder.read_header().ok().map(|frame| (frame.width, frame.height))
}

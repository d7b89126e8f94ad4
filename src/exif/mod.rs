//! EXIF (APP1) block editing.
//!
//! The block is kept as its original TIFF bytes. Integer tags are patched in
//! place; an IFD that needs a new entry is rewritten at the end of the block
//! and its parent pointer is redirected, so every tag this module does not
//! know about (maker notes included) survives untouched.

pub mod tags;
pub mod update;

pub use tags::Orientation;
pub use update::{apply_updates, read_orientation, resolve_automatic};

use crate::constants::{EXIF_IDENTIFIER, SEGMENT_MAX_DATA_SIZE};
use crate::error::ExifError;
use tags::*;

type Result<T> = std::result::Result<T, ExifError>;

const TIFF_HEADER_SIZE: usize = 8;
const IFD_ENTRY_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(bytes),
            ByteOrder::BigEndian => u16::from_be_bytes(bytes),
        }
    }

    fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
            ByteOrder::BigEndian => u32::from_be_bytes(bytes),
        }
    }

    fn u16_bytes(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }

    fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }
}

/// The image file directories this module knows how to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ifd {
    /// IFD0, the main image.
    Primary,
    /// IFD1, the thumbnail.
    Thumbnail,
    /// Exif sub-IFD (tag 0x8769 in IFD0).
    Exif,
    /// Interoperability IFD (tag 0xA005 in the Exif IFD).
    Interop,
}

impl Ifd {
    fn index(self) -> usize {
        match self {
            Ifd::Primary => 0,
            Ifd::Thumbnail => 1,
            Ifd::Exif => 2,
            Ifd::Interop => 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct IfdPosition {
    offset: usize,
    /// Where the 4-byte pointer to this IFD lives.
    link: usize,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    tag: u16,
    format: u16,
    count: u32,
    /// Offset of the 4-byte value/offset field.
    field: usize,
}

/// A parsed, editable EXIF block.
#[derive(Debug, Clone)]
pub struct ExifBlock {
    tiff: Vec<u8>,
    order: ByteOrder,
    ifds: [Option<IfdPosition>; 4],
}

impl ExifBlock {
    /// Parses an APP1 payload (starting with `Exif\0\0`).
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let tiff = payload
            .strip_prefix(EXIF_IDENTIFIER.as_slice())
            .ok_or(ExifError::MissingIdentifier)?;
        if tiff.len() < TIFF_HEADER_SIZE {
            return Err(ExifError::InvalidTiffHeader);
        }
        let order = match (&tiff[..2], tiff[2], tiff[3]) {
            (b"II", 0x2A, 0x00) => ByteOrder::LittleEndian,
            (b"MM", 0x00, 0x2A) => ByteOrder::BigEndian,
            _ => return Err(ExifError::InvalidTiffHeader),
        };
        let mut block = Self {
            tiff: tiff.to_vec(),
            order,
            ifds: [None; 4],
        };
        block.reindex()?;
        Ok(block)
    }

    /// A fresh big-endian block holding an empty IFD0.
    pub fn new_empty() -> Self {
        let mut tiff = Vec::with_capacity(TIFF_HEADER_SIZE + 6);
        tiff.extend_from_slice(b"MM\x00\x2A");
        tiff.extend_from_slice(&(TIFF_HEADER_SIZE as u32).to_be_bytes());
        tiff.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        Self {
            tiff,
            order: ByteOrder::BigEndian,
            ifds: [
                Some(IfdPosition {
                    offset: TIFF_HEADER_SIZE,
                    link: 4,
                }),
                None,
                None,
                None,
            ],
        }
    }

    pub fn has_ifd(&self, ifd: Ifd) -> bool {
        self.ifds[ifd.index()].is_some()
    }

    /// First value of an integer tag, or None when the IFD or tag is absent.
    pub fn get_int(&self, ifd: Ifd, tag: u16) -> Result<Option<i64>> {
        match self.find(ifd, tag)? {
            Some(entry) => self.entry_value(&entry).map(Some),
            None => Ok(None),
        }
    }

    /// Sets an integer tag, creating the IFD and the entry when needed.
    pub fn set_int(&mut self, ifd: Ifd, tag: u16, value: u32) -> Result<()> {
        self.ensure_ifd(ifd)?;
        match self.find(ifd, tag)? {
            Some(entry) => self.write_entry_value(&entry, value),
            None => self.insert_entry(ifd, tag, format_for_new_tag(tag, value), value),
        }
    }

    /// Sets an integer tag only if it already exists. Returns whether it did.
    pub fn update_int(&mut self, ifd: Ifd, tag: u16, value: u32) -> Result<bool> {
        match self.find(ifd, tag)? {
            Some(entry) => {
                self.write_entry_value(&entry, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The embedded thumbnail bytes, if IFD1 points at any.
    pub fn thumbnail(&self) -> Result<Option<&[u8]>> {
        Ok(self
            .thumbnail_range()?
            .map(|(offset, length)| &self.tiff[offset..offset + length]))
    }

    /// Stores `data` as the thumbnail, appending it to the block.
    pub fn replace_thumbnail(&mut self, data: &[u8]) -> Result<()> {
        if let Some((offset, length)) = self.thumbnail_range()? {
            if offset + length == self.tiff.len() {
                self.tiff.truncate(offset);
            }
        }
        let created = !self.has_ifd(Ifd::Thumbnail);
        self.ensure_ifd(Ifd::Thumbnail)?;
        if created {
            self.set_int(Ifd::Thumbnail, COMPRESSION, COMPRESSION_JPEG)?;
        }

        self.align();
        let offset = self.tiff.len();
        self.tiff.extend_from_slice(data);
        self.set_int(Ifd::Thumbnail, JPEG_INTERCHANGE_FORMAT, offset as u32)?;
        self.set_int(Ifd::Thumbnail, JPEG_INTERCHANGE_FORMAT_LENGTH, data.len() as u32)
    }

    /// Serializes back into an APP1 payload.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        let size = EXIF_IDENTIFIER.len() + self.tiff.len();
        if size > SEGMENT_MAX_DATA_SIZE {
            return Err(ExifError::TooLarge(size));
        }
        let mut payload = Vec::with_capacity(size);
        payload.extend_from_slice(EXIF_IDENTIFIER);
        payload.extend_from_slice(&self.tiff);
        Ok(payload)
    }

    fn thumbnail_range(&self) -> Result<Option<(usize, usize)>> {
        let offset = self.get_int(Ifd::Thumbnail, JPEG_INTERCHANGE_FORMAT)?;
        let length = self.get_int(Ifd::Thumbnail, JPEG_INTERCHANGE_FORMAT_LENGTH)?;
        let (Some(offset), Some(length)) = (offset, length) else {
            return Ok(None);
        };
        let (offset, length) = (offset.max(0) as usize, length.max(0) as usize);
        if length == 0 {
            return Ok(None);
        }
        if offset.checked_add(length).is_none_or(|end| end > self.tiff.len()) {
            return Err(ExifError::OutOfBounds(offset));
        }
        Ok(Some((offset, length)))
    }

    fn read_u16(&self, at: usize) -> Result<u16> {
        let bytes = self
            .tiff
            .get(at..at + 2)
            .ok_or(ExifError::OutOfBounds(at))?;
        Ok(self.order.u16([bytes[0], bytes[1]]))
    }

    fn read_u32(&self, at: usize) -> Result<u32> {
        let bytes = self
            .tiff
            .get(at..at + 4)
            .ok_or(ExifError::OutOfBounds(at))?;
        Ok(self.order.u32([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn write_bytes(&mut self, at: usize, bytes: &[u8]) -> Result<()> {
        self.tiff
            .get_mut(at..at + bytes.len())
            .ok_or(ExifError::OutOfBounds(at))?
            .copy_from_slice(bytes);
        Ok(())
    }

    fn align(&mut self) {
        if self.tiff.len() % 2 == 1 {
            self.tiff.push(0);
        }
    }

    fn entries(&self, offset: usize) -> Result<Vec<Entry>> {
        let count = self.read_u16(offset)? as usize;
        let end = offset + 2 + count * IFD_ENTRY_SIZE;
        if end > self.tiff.len() {
            return Err(ExifError::OutOfBounds(offset));
        }
        (0..count)
            .map(|i| {
                let base = offset + 2 + i * IFD_ENTRY_SIZE;
                Ok(Entry {
                    tag: self.read_u16(base)?,
                    format: self.read_u16(base + 2)?,
                    count: self.read_u32(base + 4)?,
                    field: base + 8,
                })
            })
            .collect()
    }

    fn find(&self, ifd: Ifd, tag: u16) -> Result<Option<Entry>> {
        let Some(position) = self.ifds[ifd.index()] else {
            return Ok(None);
        };
        Ok(self.entries(position.offset)?.into_iter().find(|e| e.tag == tag))
    }

    /// Offset of the first value of `entry`.
    fn value_location(&self, entry: &Entry) -> Result<usize> {
        let size = format_size(entry.format).ok_or(ExifError::NotAnInteger {
            tag: entry.tag,
            format: entry.format,
        })?;
        if entry.count == 0 {
            return Err(ExifError::OutOfBounds(entry.field));
        }
        if size.saturating_mul(entry.count as usize) <= 4 {
            Ok(entry.field)
        } else {
            Ok(self.read_u32(entry.field)? as usize)
        }
    }

    fn entry_value(&self, entry: &Entry) -> Result<i64> {
        let at = self.value_location(entry)?;
        let byte = |at: usize| self.tiff.get(at).copied().ok_or(ExifError::OutOfBounds(at));
        Ok(match entry.format {
            FORMAT_BYTE => byte(at)? as i64,
            FORMAT_SBYTE => byte(at)? as i8 as i64,
            FORMAT_SHORT => self.read_u16(at)? as i64,
            FORMAT_SSHORT => self.read_u16(at)? as i16 as i64,
            FORMAT_LONG => self.read_u32(at)? as i64,
            FORMAT_SLONG => self.read_u32(at)? as i32 as i64,
            format => {
                return Err(ExifError::NotAnInteger {
                    tag: entry.tag,
                    format,
                });
            }
        })
    }

    fn write_entry_value(&mut self, entry: &Entry, value: u32) -> Result<()> {
        let limit = match entry.format {
            FORMAT_BYTE => u8::MAX as u32,
            FORMAT_SBYTE => i8::MAX as u32,
            FORMAT_SHORT => u16::MAX as u32,
            FORMAT_SSHORT => i16::MAX as u32,
            FORMAT_LONG => u32::MAX,
            FORMAT_SLONG => i32::MAX as u32,
            format => {
                return Err(ExifError::NotAnInteger {
                    tag: entry.tag,
                    format,
                });
            }
        };
        if value > limit {
            return Err(ExifError::ValueOutOfRange {
                tag: entry.tag,
                value,
            });
        }
        let at = self.value_location(entry)?;
        match entry.format {
            FORMAT_BYTE | FORMAT_SBYTE => self.write_bytes(at, &[value as u8]),
            FORMAT_SHORT | FORMAT_SSHORT => {
                let bytes = self.order.u16_bytes(value as u16);
                self.write_bytes(at, &bytes)
            }
            _ => {
                let bytes = self.order.u32_bytes(value);
                self.write_bytes(at, &bytes)
            }
        }
    }

    /// Rewrites `ifd` at the end of the block with one more entry.
    fn insert_entry(&mut self, ifd: Ifd, tag: u16, format: u16, value: u32) -> Result<()> {
        let position = self.ifds[ifd.index()].ok_or(ExifError::OutOfBounds(0))?;
        let entries = self.entries(position.offset)?;
        if entries.len() >= u16::MAX as usize {
            return Err(ExifError::TooLarge(entries.len()));
        }
        let next_field = position.offset + 2 + entries.len() * IFD_ENTRY_SIZE;
        let next = self.read_u32(next_field).unwrap_or(0);

        let mut new_entry = [0u8; IFD_ENTRY_SIZE];
        new_entry[..2].copy_from_slice(&self.order.u16_bytes(tag));
        new_entry[2..4].copy_from_slice(&self.order.u16_bytes(format));
        new_entry[4..8].copy_from_slice(&self.order.u32_bytes(1));
        match format_size(format) {
            Some(1) => new_entry[8] = value as u8,
            Some(2) => new_entry[8..10].copy_from_slice(&self.order.u16_bytes(value as u16)),
            _ => new_entry[8..12].copy_from_slice(&self.order.u32_bytes(value)),
        }

        // Entries stay sorted by tag.
        let insert_at = entries.iter().position(|e| e.tag > tag).unwrap_or(entries.len());
        let mut raw = Vec::with_capacity(2 + (entries.len() + 1) * IFD_ENTRY_SIZE + 4);
        raw.extend_from_slice(&self.order.u16_bytes((entries.len() + 1) as u16));
        for (i, entry) in entries.iter().enumerate() {
            if i == insert_at {
                raw.extend_from_slice(&new_entry);
            }
            let base = entry.field - 8;
            raw.extend_from_slice(&self.tiff[base..base + IFD_ENTRY_SIZE]);
        }
        if insert_at == entries.len() {
            raw.extend_from_slice(&new_entry);
        }
        raw.extend_from_slice(&self.order.u32_bytes(next));

        self.align();
        let new_offset = self.tiff.len();
        self.tiff.extend_from_slice(&raw);
        let link_bytes = self.order.u32_bytes(new_offset as u32);
        self.write_bytes(position.link, &link_bytes)?;
        self.reindex()
    }

    /// Creates an empty `ifd` and links it into the block.
    fn ensure_ifd(&mut self, ifd: Ifd) -> Result<()> {
        if self.has_ifd(ifd) {
            return Ok(());
        }
        if ifd == Ifd::Interop {
            self.ensure_ifd(Ifd::Exif)?;
        }
        self.align();
        let offset = self.tiff.len();
        self.tiff.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        match ifd {
            Ifd::Primary => {
                let bytes = self.order.u32_bytes(offset as u32);
                self.write_bytes(4, &bytes)?;
                self.reindex()
            }
            Ifd::Thumbnail => {
                let primary = self.ifds[Ifd::Primary.index()].ok_or(ExifError::OutOfBounds(4))?;
                let count = self.read_u16(primary.offset)? as usize;
                let next_field = primary.offset + 2 + count * IFD_ENTRY_SIZE;
                let bytes = self.order.u32_bytes(offset as u32);
                self.write_bytes(next_field, &bytes)?;
                self.reindex()
            }
            Ifd::Exif => self.insert_entry(Ifd::Primary, EXIF_IFD_POINTER, FORMAT_LONG, offset as u32),
            Ifd::Interop => {
                self.insert_entry(Ifd::Exif, INTEROPERABILITY_IFD_POINTER, FORMAT_LONG, offset as u32)
            }
        }
    }

    /// Locates every known IFD from the TIFF header down.
    fn reindex(&mut self) -> Result<()> {
        let mut visited = Vec::new();
        let mut ifds = [None; 4];

        let primary = self.read_u32(4)? as usize;
        let primary_entries = self.visit(primary, &mut visited)?;
        ifds[Ifd::Primary.index()] = Some(IfdPosition {
            offset: primary,
            link: 4,
        });

        let next_field = primary + 2 + primary_entries.len() * IFD_ENTRY_SIZE;
        let next = self.read_u32(next_field).unwrap_or(0) as usize;
        if next != 0 {
            self.visit(next, &mut visited)?;
            ifds[Ifd::Thumbnail.index()] = Some(IfdPosition {
                offset: next,
                link: next_field,
            });
        }

        if let Some(pointer) = primary_entries.iter().find(|e| e.tag == EXIF_IFD_POINTER) {
            let exif = self.entry_value(pointer)? as usize;
            let exif_entries = self.visit(exif, &mut visited)?;
            ifds[Ifd::Exif.index()] = Some(IfdPosition {
                offset: exif,
                link: pointer.field,
            });
            if let Some(pointer) = exif_entries
                .iter()
                .find(|e| e.tag == INTEROPERABILITY_IFD_POINTER)
            {
                let interop = self.entry_value(pointer)? as usize;
                self.visit(interop, &mut visited)?;
                ifds[Ifd::Interop.index()] = Some(IfdPosition {
                    offset: interop,
                    link: pointer.field,
                });
            }
        }

        self.ifds = ifds;
        Ok(())
    }

    fn visit(&self, offset: usize, visited: &mut Vec<usize>) -> Result<Vec<Entry>> {
        if offset < TIFF_HEADER_SIZE {
            return Err(ExifError::OutOfBounds(offset));
        }
        if visited.contains(&offset) {
            return Err(ExifError::IfdLoop);
        }
        visited.push(offset);
        self.entries(offset)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Little-endian block: IFD0 with orientation and an Exif pointer, an
    /// Exif IFD with pixel dimensions and an Interop pointer, an Interop IFD
    /// with related dimensions, and IFD1 pointing at `thumbnail`.
    pub(crate) fn sample_block(orientation: u16, width: u32, height: u32, thumbnail: &[u8]) -> Vec<u8> {
        let mut block = ExifBlock::new_empty();
        block.set_int(Ifd::Primary, ORIENTATION, orientation as u32).unwrap();
        block.set_int(Ifd::Exif, PIXEL_X_DIMENSION, width).unwrap();
        block.set_int(Ifd::Exif, PIXEL_Y_DIMENSION, height).unwrap();
        block.set_int(Ifd::Interop, RELATED_IMAGE_WIDTH, width).unwrap();
        block.set_int(Ifd::Interop, RELATED_IMAGE_LENGTH, height).unwrap();
        if !thumbnail.is_empty() {
            block.replace_thumbnail(thumbnail).unwrap();
            block.set_int(Ifd::Thumbnail, ORIENTATION, orientation as u32).unwrap();
        }
        block.to_payload().unwrap()
    }

    fn little_endian_block() -> Vec<u8> {
        // IFD0 at 8: one SHORT orientation entry, next IFD 0.
        let mut payload = EXIF_IDENTIFIER.to_vec();
        payload.extend_from_slice(b"II\x2A\x00");
        payload.extend_from_slice(&8u32.to_le_bytes());
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.extend_from_slice(&ORIENTATION.to_le_bytes());
        payload.extend_from_slice(&FORMAT_SHORT.to_le_bytes());
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&[6, 0, 0, 0]);
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload
    }

    #[test]
    fn reads_and_patches_little_endian_tags_in_place() {
        let payload = little_endian_block();
        let mut block = ExifBlock::parse(&payload).unwrap();
        assert_eq!(block.get_int(Ifd::Primary, ORIENTATION).unwrap(), Some(6));
        assert!(block.update_int(Ifd::Primary, ORIENTATION, 1).unwrap());
        let patched = block.to_payload().unwrap();
        assert_eq!(patched.len(), payload.len());
        assert_eq!(&patched[6 + 18..6 + 20], &[1, 0]);
    }

    #[test]
    fn update_int_ignores_missing_tags() {
        let mut block = ExifBlock::parse(&little_endian_block()).unwrap();
        assert!(!block.update_int(Ifd::Exif, PIXEL_X_DIMENSION, 10).unwrap());
        assert!(!block.has_ifd(Ifd::Exif));
    }

    #[test]
    fn new_entries_relocate_the_ifd_and_keep_old_ones() {
        let mut block = ExifBlock::parse(&little_endian_block()).unwrap();
        block.set_int(Ifd::Primary, IMAGE_WIDTH, 640).unwrap();
        block.set_int(Ifd::Exif, PIXEL_X_DIMENSION, 640).unwrap();
        let reparsed = ExifBlock::parse(&block.to_payload().unwrap()).unwrap();
        assert_eq!(reparsed.get_int(Ifd::Primary, ORIENTATION).unwrap(), Some(6));
        assert_eq!(reparsed.get_int(Ifd::Primary, IMAGE_WIDTH).unwrap(), Some(640));
        assert_eq!(reparsed.get_int(Ifd::Exif, PIXEL_X_DIMENSION).unwrap(), Some(640));
        // Sorted: IMAGE_WIDTH (0x100) ahead of ORIENTATION (0x112).
        let primary = reparsed.ifds[0].unwrap().offset;
        let entries = reparsed.entries(primary).unwrap();
        let tags: Vec<u16> = entries.iter().map(|e| e.tag).collect();
        assert_eq!(tags, [IMAGE_WIDTH, ORIENTATION, EXIF_IFD_POINTER]);
    }

    #[test]
    fn values_must_fit_the_declared_format() {
        let mut block = ExifBlock::parse(&little_endian_block()).unwrap();
        assert_eq!(
            block.set_int(Ifd::Primary, ORIENTATION, 70000),
            Err(ExifError::ValueOutOfRange {
                tag: ORIENTATION,
                value: 70000
            })
        );
    }

    #[test]
    fn thumbnail_is_replaced_and_old_tail_truncated() {
        let payload = sample_block(6, 4000, 3000, &[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
        let mut block = ExifBlock::parse(&payload).unwrap();
        assert_eq!(block.thumbnail().unwrap().unwrap().len(), 7);
        assert_eq!(block.get_int(Ifd::Thumbnail, COMPRESSION).unwrap(), Some(6));

        // The pointer tags exist now, so the replacement becomes the tail.
        block.replace_thumbnail(&[0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        assert_eq!(block.thumbnail().unwrap(), Some(&[0xFF, 0xD8, 0xFF, 0xD9][..]));
        let size = block.to_payload().unwrap().len();

        block.replace_thumbnail(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]).unwrap();
        assert_eq!(block.thumbnail().unwrap().unwrap().len(), 5);
        assert_eq!(block.to_payload().unwrap().len(), size + 1);
    }

    #[test]
    fn ifd_loops_are_rejected() {
        let mut payload = little_endian_block();
        // Point IFD0's next-IFD field back at IFD0.
        let next_field = 6 + 8 + 2 + 12;
        payload[next_field..next_field + 4].copy_from_slice(&8u32.to_le_bytes());
        assert_eq!(ExifBlock::parse(&payload).unwrap_err(), ExifError::IfdLoop);
    }

    #[test]
    fn malformed_blocks_are_rejected() {
        assert_eq!(ExifBlock::parse(b"JFIF\0\0").unwrap_err(), ExifError::MissingIdentifier);
        assert_eq!(
            ExifBlock::parse(b"Exif\0\0XX\x2A\x00\x08\0\0\0").unwrap_err(),
            ExifError::InvalidTiffHeader
        );
        let mut payload = little_endian_block();
        payload[6 + 4..6 + 8].copy_from_slice(&500u32.to_le_bytes());
        assert!(matches!(ExifBlock::parse(&payload), Err(ExifError::OutOfBounds(_))));
    }

    #[test]
    fn oversized_block_cannot_be_serialized() {
        let mut block = ExifBlock::new_empty();
        block.replace_thumbnail(&vec![0u8; SEGMENT_MAX_DATA_SIZE]).unwrap();
        assert!(matches!(block.to_payload(), Err(ExifError::TooLarge(_))));
    }
}

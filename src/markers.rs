//! Marker/segment preservation.
//!
//! The decoder fills a [`MarkerList`] with every APPn and COM segment it
//! meets (when retention is on); the pipeline edits the list and the encoder
//! replays it right after SOI of the destination.

use crate::constants::{EXIF_IDENTIFIER, JFIF_IDENTIFIER, SEGMENT_MAX_DATA_SIZE};
use crate::error::{Result, TransformError};
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_writer::JpegStreamWriter;

/// One retained segment: marker code plus payload (length field excluded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub code: JpegMarkerCode,
    pub data: Vec<u8>,
}

impl Marker {
    pub fn is_exif(&self) -> bool {
        self.code == JpegMarkerCode::ApplicationData1 && self.data.starts_with(EXIF_IDENTIFIER)
    }

    pub fn is_jfif(&self) -> bool {
        self.code == JpegMarkerCode::ApplicationData0 && self.data.starts_with(JFIF_IDENTIFIER)
    }
}

/// Ordered sequence of non-image segments owned by one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerList {
    markers: Vec<Marker>,
}

impl MarkerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, code: JpegMarkerCode, data: Vec<u8>) {
        self.markers.push(Marker { code, data });
    }

    /// Moves every segment of `other` to the end of this list.
    pub fn append(&mut self, other: &mut MarkerList) {
        self.markers.append(&mut other.markers);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Payload of the Exif segment, `Exif\0\0` identifier included.
    pub fn exif_payload(&self) -> Option<&[u8]> {
        self.markers.iter().find(|m| m.is_exif()).map(|m| m.data.as_slice())
    }

    pub fn comment(&self) -> Option<&[u8]> {
        self.markers
            .iter()
            .find(|m| m.code == JpegMarkerCode::Comment)
            .map(|m| m.data.as_slice())
    }

    /// Overwrites the first comment segment, or appends one when the source
    /// had none.
    pub fn replace_comment(&mut self, comment: &[u8]) -> Result<()> {
        check_segment_size(comment)?;
        match self.markers.iter_mut().find(|m| m.code == JpegMarkerCode::Comment) {
            Some(marker) => {
                marker.data.clear();
                marker.data.try_reserve(comment.len())?;
                marker.data.extend_from_slice(comment);
            }
            None => {
                let mut data = Vec::new();
                data.try_reserve_exact(comment.len())?;
                data.extend_from_slice(comment);
                self.push(JpegMarkerCode::Comment, data);
            }
        }
        Ok(())
    }

    /// Overwrites the Exif segment payload, or inserts a new Exif segment at
    /// the canonical position: first after SOI, or right behind a leading
    /// JFIF APP0 (which must stay first).
    pub fn replace_metadata(&mut self, payload: Vec<u8>) -> Result<()> {
        check_segment_size(&payload)?;
        if let Some(marker) = self.markers.iter_mut().find(|m| m.is_exif()) {
            marker.data = payload;
            return Ok(());
        }
        let position = match self.markers.first() {
            Some(first) if first.is_jfif() => 1,
            _ => 0,
        };
        self.markers.insert(
            position,
            Marker {
                code: JpegMarkerCode::ApplicationData1,
                data: payload,
            },
        );
        Ok(())
    }

    /// Writes every retained segment, in order, into the destination header.
    pub fn commit(&self, writer: &mut JpegStreamWriter) -> Result<()> {
        for marker in &self.markers {
            writer.write_segment(marker.code, &marker.data)?;
        }
        Ok(())
    }
}

fn check_segment_size(payload: &[u8]) -> Result<()> {
    if payload.len() > SEGMENT_MAX_DATA_SIZE {
        return Err(TransformError::InvalidArgument("segment payload exceeds 65533 bytes"));
    }
    Ok(())
}

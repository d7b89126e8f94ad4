use std::ops::{BitOr, BitOrAssign};

use crate::transform::TransformRequest;

/// Policy bits steering one transform run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransformFlags(u32);

impl TransformFlags {
    /// Apply the geometric transform to the main image.
    pub const TRANSFORM_IMAGE: Self = Self(1 << 0);
    /// Apply the same transform to the EXIF thumbnail.
    pub const TRANSFORM_THUMBNAIL: Self = Self(1 << 1);
    /// Drop partial edge iMCUs on mirrored axes.
    pub const TRANSFORM_TRIM: Self = Self(1 << 2);
    /// Replace (or add) the comment segment.
    pub const UPDATE_COMMENT: Self = Self(1 << 3);
    /// Reset the orientation tag to 1 after transforming.
    pub const UPDATE_ORIENTATION: Self = Self(1 << 4);
    /// Replace the thumbnail with caller supplied JPEG data.
    pub const UPDATE_THUMBNAIL: Self = Self(1 << 5);
    /// In place only: keep the original as `<name>~`.
    pub const FILE_BACKUP: Self = Self(1 << 6);
    /// In place only: restore the original access and modification times.
    pub const FILE_KEEP_TIME: Self = Self(1 << 7);
    /// Refuse transforms that would leave unmirrored edge blocks.
    pub const TRANSFORM_PERFECT: Self = Self(1 << 8);

    /// Image, thumbnail and orientation tag kept in sync.
    pub const DEFAULT: Self = Self(
        Self::TRANSFORM_IMAGE.0 | Self::TRANSFORM_THUMBNAIL.0 | Self::UPDATE_ORIENTATION.0,
    );

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & 0x1FF)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for TransformFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TransformFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Everything a caller can ask of one transform run.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformOptions<'a> {
    pub request: TransformRequest,
    /// New comment text, used with [`TransformFlags::UPDATE_COMMENT`].
    pub comment: Option<&'a [u8]>,
    /// Replacement thumbnail (a complete JPEG), used with
    /// [`TransformFlags::UPDATE_THUMBNAIL`].
    pub thumbnail: Option<&'a [u8]>,
    pub flags: TransformFlags,
}

impl<'a> TransformOptions<'a> {
    pub fn new(request: TransformRequest, flags: TransformFlags) -> Self {
        Self {
            request,
            comment: None,
            thumbnail: None,
            flags,
        }
    }

    pub fn with_comment(mut self, comment: &'a [u8]) -> Self {
        self.comment = Some(comment);
        self.flags |= TransformFlags::UPDATE_COMMENT;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: &'a [u8]) -> Self {
        self.thumbnail = Some(thumbnail);
        self.flags |= TransformFlags::UPDATE_THUMBNAIL;
        self
    }

    pub(crate) fn updates_comment(&self) -> bool {
        self.flags.contains(TransformFlags::UPDATE_COMMENT) && self.comment.is_some()
    }

    pub(crate) fn updates_thumbnail(&self) -> bool {
        self.flags.contains(TransformFlags::UPDATE_THUMBNAIL) && self.thumbnail.is_some()
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    /// A new JPEG was written.
    Transformed,
    /// Nothing to do; the destination was not touched.
    Unchanged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_and_test() {
        let mut flags = TransformFlags::TRANSFORM_IMAGE | TransformFlags::FILE_BACKUP;
        assert!(flags.contains(TransformFlags::FILE_BACKUP));
        assert!(!flags.contains(TransformFlags::TRANSFORM_TRIM));
        flags.remove(TransformFlags::FILE_BACKUP);
        assert_eq!(flags, TransformFlags::TRANSFORM_IMAGE);
        assert!(TransformFlags::DEFAULT.contains(TransformFlags::UPDATE_ORIENTATION));
        assert_eq!(TransformFlags::from_bits_truncate(u32::MAX).bits(), 0x1FF);
    }

    #[test]
    fn builders_raise_matching_flags() {
        let options = TransformOptions::new(TransformRequest::Rotate90, TransformFlags::empty())
            .with_comment(b"hi")
            .with_thumbnail(&[0xFF, 0xD8]);
        assert!(options.updates_comment());
        assert!(options.updates_thumbnail());
        assert!(!TransformOptions::default().updates_comment());
    }
}

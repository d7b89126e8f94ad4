//! Transform orchestration.
//!
//! A [`TransformJob`] walks one JPEG through header parsing, metadata
//! resolution, the coefficient transform and recompression. The entry points
//! below drive a job end to end and hand the result to a stream or a file.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Result, TransformError};
use crate::exif::tags::Orientation;
use crate::exif::{self, ExifBlock};
use crate::jpeg_stream_reader::{FrameCoding, FrameInfo};
use crate::jpeg1::{CoefficientImage, Jpeg1Decoder, Jpeg1Encoder};
use crate::markers::MarkerList;
use crate::options::{TransformFlags, TransformOptions, TransformOutcome};
use crate::transform::{Transform, TransformRequest, transform_checked};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    HeaderRead,
    MetadataResolved,
    TransformApplied,
    Compressed,
    Done,
    Aborted,
}

impl JobState {
    fn name(self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::HeaderRead => "header read",
            JobState::MetadataResolved => "metadata resolved",
            JobState::TransformApplied => "transform applied",
            JobState::Compressed => "compressed",
            JobState::Done => "done",
            JobState::Aborted => "aborted",
        }
    }
}

/// One conversion of one JPEG held in memory.
///
/// Steps must be called in order; a step that fails moves the job to
/// [`JobState::Aborted`] and every later call returns `InvalidState`.
pub struct TransformJob<'a> {
    options: TransformOptions<'a>,
    decoder: Jpeg1Decoder<'a>,
    state: JobState,
    frame: Option<FrameInfo>,
    markers: MarkerList,
    resolved: Transform,
    image: Option<CoefficientImage>,
    output: Vec<u8>,
}

impl<'a> TransformJob<'a> {
    pub fn new(source: &'a [u8], options: TransformOptions<'a>) -> Self {
        Self {
            options,
            decoder: Jpeg1Decoder::new(source),
            state: JobState::Idle,
            frame: None,
            markers: MarkerList::new(),
            resolved: Transform::None,
            image: None,
            output: Vec::new(),
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Source geometry, once the header has been read.
    pub fn frame_info(&self) -> Option<FrameInfo> {
        self.frame
    }

    /// The concrete transform the request resolved to, known once metadata
    /// has been resolved. The thumbnail follows it even when the main image
    /// does not.
    pub fn resolved_transform(&self) -> Transform {
        self.resolved
    }

    /// The transform applied to the main image coefficients. `None` when the
    /// image transform flag is off.
    pub fn effective_transform(&self) -> Transform {
        if self.options.flags.contains(TransformFlags::TRANSFORM_IMAGE) {
            self.resolved
        } else {
            Transform::None
        }
    }

    /// Parses the source header and starts retaining marker segments.
    pub fn read_header(&mut self) -> Result<FrameInfo> {
        self.require(JobState::Idle)?;
        self.decoder.retain_markers(true);
        let result = self.decoder.read_header().map_err(|e| match e {
            TransformError::CorruptData(reason) => TransformError::NotAJpeg(reason),
            other => other,
        });
        let frame = self.advance(result, JobState::HeaderRead)?;
        log::debug!("header: {}x{} {:?}", frame.width, frame.height, frame.coding);
        self.frame = Some(frame);
        Ok(frame)
    }

    /// Reads the orientation, settles the concrete transform and stages the
    /// new comment.
    pub fn resolve_metadata(&mut self) -> Result<Transform> {
        self.require(JobState::HeaderRead)?;
        self.markers = self.decoder.take_markers();
        let result = self.resolve_metadata_inner();
        self.advance(result, JobState::MetadataResolved)
    }

    fn resolve_metadata_inner(&mut self) -> Result<Transform> {
        let request = self.options.request;
        let transform = match request.concrete() {
            Some(transform) => transform,
            None => {
                let orientation = exif::read_orientation(self.markers.exif_payload());
                let transform = exif::resolve_automatic(orientation);
                log::debug!("orientation {orientation:?} resolves to {transform}");
                transform
            }
        };
        self.resolved = transform;
        if let (true, Some(comment)) = (self.options.updates_comment(), self.options.comment) {
            self.markers.replace_comment(comment)?;
        }
        Ok(self.resolved)
    }

    /// True when there is nothing to write: the request resolved to no
    /// transform and there is no comment or thumbnail to put in.
    pub fn is_noop(&self) -> bool {
        self.resolved == Transform::None && !self.options.updates_comment() && !self.options.updates_thumbnail()
    }

    /// Decodes every coefficient and applies the transform.
    pub fn apply_transform(&mut self) -> Result<()> {
        self.require(JobState::MetadataResolved)?;
        let result = self.apply_transform_inner();
        self.advance(result, JobState::TransformApplied)
    }

    fn apply_transform_inner(&mut self) -> Result<()> {
        let image = self.decoder.decode_coefficients()?;
        let mut late = self.decoder.take_markers();
        self.markers.append(&mut late);

        let flags = self.options.flags;
        let transformed = transform_checked(
            &image,
            self.effective_transform(),
            flags.contains(TransformFlags::TRANSFORM_TRIM),
            flags.contains(TransformFlags::TRANSFORM_PERFECT),
        )?;
        self.image = Some(transformed);
        Ok(())
    }

    /// Brings the metadata in line with the new geometry and encodes the
    /// output.
    pub fn compress(&mut self) -> Result<()> {
        self.require(JobState::TransformApplied)?;
        let result = self.compress_inner();
        self.advance(result, JobState::Compressed)
    }

    fn compress_inner(&mut self) -> Result<()> {
        let image = self
            .image
            .as_ref()
            .ok_or(TransformError::InvalidState("no coefficients"))?;

        // The metadata adapter swaps for transposing transforms itself, so
        // hand it the output size as seen before the swap.
        let (width, height) = if self.effective_transform().swaps_dimensions() {
            (image.height, image.width)
        } else {
            (image.width, image.height)
        };
        let thumbnail = if self.options.updates_thumbnail() {
            self.options.thumbnail
        } else {
            None
        };
        if let Some(payload) = exif::apply_updates(
            self.markers.exif_payload(),
            self.resolved,
            width,
            height,
            self.options.flags,
            thumbnail,
        ) {
            self.markers.replace_metadata(payload)?;
        }

        self.output = Jpeg1Encoder::new().encode(image, &self.markers)?;
        Ok(())
    }

    /// Completes the job and returns the encoded JPEG.
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        self.require(JobState::Compressed)?;
        self.state = JobState::Done;
        self.image = None;
        Ok(std::mem::take(&mut self.output))
    }

    /// Abandons the job. Has no effect once it is done.
    pub fn abort(&mut self) {
        if self.state != JobState::Done {
            self.state = JobState::Aborted;
            self.image = None;
            self.output.clear();
        }
    }

    fn require(&self, state: JobState) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(TransformError::InvalidState(self.state.name()))
        }
    }

    fn advance<T>(&mut self, result: Result<T>, next: JobState) -> Result<T> {
        match result {
            Ok(value) => {
                self.state = next;
                Ok(value)
            }
            Err(e) => {
                log::debug!("aborting in state {}: {e}", self.state.name());
                self.abort();
                Err(e)
            }
        }
    }
}

/// Runs a whole job. Returns None when the shortcut applies and nothing
/// needs to be written.
pub(crate) fn run(source: &[u8], options: &TransformOptions<'_>) -> Result<Option<Vec<u8>>> {
    let mut job = TransformJob::new(source, *options);
    job.read_header()?;
    job.resolve_metadata()?;
    if job.is_noop() {
        job.abort();
        return Ok(None);
    }
    job.apply_transform()?;
    job.compress()?;
    job.finish().map(Some)
}

pub fn transform_to_stream<W: Write>(
    source: &[u8],
    destination: &mut W,
    request: TransformRequest,
    comment: Option<&[u8]>,
    thumbnail: Option<&[u8]>,
    flags: TransformFlags,
) -> Result<TransformOutcome> {
    let options = TransformOptions {
        request,
        comment,
        thumbnail,
        flags,
    };
    transform_to_stream_with_options(source, destination, &options)
}

/// Transforms `source` and writes the new JPEG to `destination`.
///
/// On error the sink may hold a partial image; discarding it is up to the
/// caller.
pub fn transform_to_stream_with_options<W: Write>(
    source: &[u8],
    destination: &mut W,
    options: &TransformOptions<'_>,
) -> Result<TransformOutcome> {
    match run(source, options)? {
        Some(output) => {
            destination.write_all(&output)?;
            destination.flush()?;
            Ok(TransformOutcome::Transformed)
        }
        None => {
            log::info!("no change needed");
            Ok(TransformOutcome::Unchanged)
        }
    }
}

pub fn transform_file_to_file(
    source: &Path,
    destination: &Path,
    request: TransformRequest,
    comment: Option<&[u8]>,
    thumbnail: Option<&[u8]>,
    flags: TransformFlags,
) -> Result<TransformOutcome> {
    let options = TransformOptions {
        request,
        comment,
        thumbnail,
        flags,
    };
    transform_file_to_file_with_options(source, destination, &options)
}

/// Transforms the file at `source` into `destination`. The destination is
/// not created when there is nothing to do.
pub fn transform_file_to_file_with_options(
    source: &Path,
    destination: &Path,
    options: &TransformOptions<'_>,
) -> Result<TransformOutcome> {
    let data = fs::read(source)?;
    match run(&data, options)? {
        Some(output) => {
            fs::write(destination, output)?;
            log::debug!("wrote {}", destination.display());
            Ok(TransformOutcome::Transformed)
        }
        None => {
            log::info!("{}: no change needed", source.display());
            Ok(TransformOutcome::Unchanged)
        }
    }
}

/// Sampling factors of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentSummary {
    pub id: u8,
    pub h_samp_factor: u8,
    pub v_samp_factor: u8,
}

/// What `jpegtrans info` prints about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegInfo {
    pub width: u32,
    pub height: u32,
    pub progressive: bool,
    pub components: Vec<ComponentSummary>,
    pub orientation: Orientation,
    /// Size in bytes of the embedded thumbnail.
    pub thumbnail_len: Option<usize>,
    /// Pixel size of the embedded thumbnail, when it is a readable JPEG.
    pub thumbnail_size: Option<(u32, u32)>,
    pub comment: Option<Vec<u8>>,
}

/// Reads the header and metadata of a JPEG without decoding its scans.
pub fn inspect(source: &[u8]) -> Result<JpegInfo> {
    let mut decoder = Jpeg1Decoder::new(source);
    decoder.retain_markers(true);
    let frame = decoder.read_header()?;
    let components = decoder
        .components()
        .iter()
        .map(|c| ComponentSummary {
            id: c.info.id,
            h_samp_factor: c.info.h_samp_factor,
            v_samp_factor: c.info.v_samp_factor,
        })
        .collect();
    let markers = decoder.take_markers();
    let metadata = markers.exif_payload();

    let thumbnail = metadata
        .and_then(|payload| ExifBlock::parse(payload).ok())
        .and_then(|block| block.thumbnail().ok().flatten().map(<[u8]>::to_vec));

    Ok(JpegInfo {
        width: frame.width,
        height: frame.height,
        progressive: frame.coding == FrameCoding::Progressive,
        components,
        orientation: exif::read_orientation(metadata),
        thumbnail_len: thumbnail.as_ref().map(Vec::len),
        thumbnail_size: thumbnail.as_deref().and_then(exif::update::jpeg_size),
        comment: markers.comment().map(<[u8]>::to_vec),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::exif::Ifd;
    use crate::exif::tags::{IMAGE_LENGTH, IMAGE_WIDTH, ORIENTATION, PIXEL_X_DIMENSION, PIXEL_Y_DIMENSION};
    use crate::jpeg_marker_code::JpegMarkerCode;
    use crate::jpeg1::coefficients::ComponentInfo;
    use crate::jpeg1::quantization::standard_tables;

    pub(crate) fn layout_420() -> [ComponentInfo; 3] {
        [
            ComponentInfo { id: 1, h_samp_factor: 2, v_samp_factor: 2, quant_table_dest: 0 },
            ComponentInfo { id: 2, h_samp_factor: 1, v_samp_factor: 1, quant_table_dest: 1 },
            ComponentInfo { id: 3, h_samp_factor: 1, v_samp_factor: 1, quant_table_dest: 1 },
        ]
    }

    pub(crate) fn patterned_image(width: u32, height: u32) -> CoefficientImage {
        let mut image = CoefficientImage::new(width, height, &layout_420(), standard_tables()).unwrap();
        for (c, component) in image.components.iter_mut().enumerate() {
            for (n, block) in component.blocks.iter_mut().enumerate() {
                block[0] = ((n * 7 + c) % 200) as i16 - 100;
                block[1] = (n % 5) as i16;
                block[8] = -((n % 3) as i16);
            }
        }
        image
    }

    /// A 4:2:0 JPEG with a JFIF header and, when `orientation` is given, an
    /// Exif block carrying it.
    pub(crate) fn sample_jpeg(width: u32, height: u32, orientation: Option<u16>) -> Vec<u8> {
        let mut markers = MarkerList::new();
        markers.push(JpegMarkerCode::ApplicationData0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0".to_vec());
        if let Some(orientation) = orientation {
            markers.push(
                JpegMarkerCode::ApplicationData1,
                crate::exif::tests::sample_block(orientation, width, height, &[]),
            );
        }
        Jpeg1Encoder::new().encode(&patterned_image(width, height), &markers).unwrap()
    }

    fn decode(data: &[u8]) -> (CoefficientImage, MarkerList) {
        let mut decoder = Jpeg1Decoder::new(data);
        decoder.retain_markers(true);
        decoder.read_header().unwrap();
        let image = decoder.decode_coefficients().unwrap();
        (image, decoder.take_markers())
    }

    fn exif_int(markers: &MarkerList, ifd: Ifd, tag: u16) -> Option<i64> {
        ExifBlock::parse(markers.exif_payload().unwrap())
            .unwrap()
            .get_int(ifd, tag)
            .unwrap()
    }

    #[test]
    fn steps_run_in_order() {
        let source = sample_jpeg(32, 16, Some(6));
        let mut job = TransformJob::new(&source, TransformOptions::new(TransformRequest::Automatic, TransformFlags::DEFAULT));
        assert!(matches!(job.apply_transform(), Err(TransformError::InvalidState(_))));
        assert_eq!(job.state(), JobState::Idle);

        job.read_header().unwrap();
        assert_eq!(job.frame_info().map(|f| (f.width, f.height)), Some((32, 16)));
        assert_eq!(job.resolve_metadata().unwrap(), Transform::Rotate90);
        assert_eq!(job.effective_transform(), Transform::Rotate90);
        assert!(!job.is_noop());
        job.apply_transform().unwrap();
        job.compress().unwrap();
        let output = job.finish().unwrap();
        assert_eq!(job.state(), JobState::Done);
        assert!(matches!(job.finish(), Err(TransformError::InvalidState("done"))));

        let (image, markers) = decode(&output);
        assert_eq!((image.width, image.height), (16, 32));
        assert_eq!(exif_int(&markers, Ifd::Primary, ORIENTATION), Some(1));
    }

    #[test]
    fn failed_step_aborts_the_job() {
        let mut job = TransformJob::new(b"not a jpeg", TransformOptions::default());
        assert!(matches!(job.read_header(), Err(TransformError::NotAJpeg(_))));
        assert_eq!(job.state(), JobState::Aborted);
        assert!(matches!(job.resolve_metadata(), Err(TransformError::InvalidState("aborted"))));
    }

    #[test]
    fn normal_orientation_is_a_noop() {
        let source = sample_jpeg(32, 16, Some(1));
        let options = TransformOptions::new(TransformRequest::Automatic, TransformFlags::DEFAULT);
        let mut sink = Vec::new();
        let outcome = transform_to_stream_with_options(&source, &mut sink, &options).unwrap();
        assert_eq!(outcome, TransformOutcome::Unchanged);
        assert!(sink.is_empty());

        let no_metadata = sample_jpeg(32, 16, None);
        let outcome = transform_to_stream_with_options(&no_metadata, &mut sink, &options).unwrap();
        assert_eq!(outcome, TransformOutcome::Unchanged);
    }

    #[test]
    fn comment_forces_a_rewrite() {
        let source = sample_jpeg(32, 16, Some(1));
        let mut sink = Vec::new();
        let outcome = transform_to_stream(
            &source,
            &mut sink,
            TransformRequest::None,
            Some(b"hello"),
            None,
            TransformFlags::DEFAULT | TransformFlags::UPDATE_COMMENT,
        )
        .unwrap();
        assert_eq!(outcome, TransformOutcome::Transformed);
        let (image, markers) = decode(&sink);
        assert_eq!(markers.comment(), Some(&b"hello"[..]));
        assert_eq!((image.width, image.height), (32, 16));
        // JFIF stays first, Exif second, comment last.
        assert!(markers.iter().next().unwrap().is_jfif());
        assert!(markers.iter().nth(1).unwrap().is_exif());
    }

    #[test]
    fn explicit_request_ignores_orientation() {
        let source = sample_jpeg(32, 16, Some(6));
        let mut sink = Vec::new();
        transform_to_stream(
            &source,
            &mut sink,
            TransformRequest::Rotate180,
            None,
            None,
            TransformFlags::TRANSFORM_IMAGE,
        )
        .unwrap();
        let (image, markers) = decode(&sink);
        assert_eq!((image.width, image.height), (32, 16));
        assert_eq!(exif_int(&markers, Ifd::Primary, ORIENTATION), Some(6));
        assert_eq!(exif_int(&markers, Ifd::Exif, PIXEL_X_DIMENSION), Some(32));
    }

    /// 32x16 source with orientation 6 and an Exif thumbnail.
    fn jpeg_with_thumbnail(thumbnail: &[u8]) -> Vec<u8> {
        let mut block = ExifBlock::parse(&crate::exif::tests::sample_block(6, 32, 16, thumbnail)).unwrap();
        block.set_int(Ifd::Thumbnail, IMAGE_WIDTH, 16).unwrap();
        block.set_int(Ifd::Thumbnail, IMAGE_LENGTH, 8).unwrap();
        let mut markers = MarkerList::new();
        markers.push(JpegMarkerCode::ApplicationData1, block.to_payload().unwrap());
        Jpeg1Encoder::new().encode(&patterned_image(32, 16), &markers).unwrap()
    }

    #[test]
    fn without_image_flag_only_metadata_follows_the_request() {
        let thumbnail = Jpeg1Encoder::new().encode(&patterned_image(16, 8), &MarkerList::new()).unwrap();
        let source = jpeg_with_thumbnail(&thumbnail);
        let flags = TransformFlags::TRANSFORM_THUMBNAIL | TransformFlags::UPDATE_ORIENTATION;

        let mut job = TransformJob::new(&source, TransformOptions::new(TransformRequest::Rotate90, flags));
        job.read_header().unwrap();
        assert_eq!(job.resolve_metadata().unwrap(), Transform::Rotate90);
        assert_eq!(job.effective_transform(), Transform::None);
        assert!(!job.is_noop());

        let mut sink = Vec::new();
        let outcome = transform_to_stream(&source, &mut sink, TransformRequest::Rotate90, None, None, flags).unwrap();
        assert_eq!(outcome, TransformOutcome::Transformed);
        let (image, markers) = decode(&sink);
        assert_eq!((image.width, image.height), (32, 16));
        assert_eq!(exif_int(&markers, Ifd::Primary, ORIENTATION), Some(1));
        assert_eq!(exif_int(&markers, Ifd::Thumbnail, ORIENTATION), Some(1));
        assert_eq!(exif_int(&markers, Ifd::Exif, PIXEL_X_DIMENSION), Some(32));
        assert_eq!(exif_int(&markers, Ifd::Exif, PIXEL_Y_DIMENSION), Some(16));
        assert_eq!(exif_int(&markers, Ifd::Thumbnail, IMAGE_WIDTH), Some(8));
        assert_eq!(exif_int(&markers, Ifd::Thumbnail, IMAGE_LENGTH), Some(16));

        let block = ExifBlock::parse(markers.exif_payload().unwrap()).unwrap();
        let (thumbnail, _) = decode(block.thumbnail().unwrap().unwrap());
        assert_eq!((thumbnail.width, thumbnail.height), (8, 16));
    }

    #[test]
    fn unreadable_thumbnail_does_not_block_orientation_reset() {
        let source = jpeg_with_thumbnail(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let mut sink = Vec::new();
        let outcome =
            transform_to_stream(&source, &mut sink, TransformRequest::Automatic, None, None, TransformFlags::DEFAULT)
                .unwrap();
        assert_eq!(outcome, TransformOutcome::Transformed);
        let (image, markers) = decode(&sink);
        assert_eq!((image.width, image.height), (16, 32));
        assert_eq!(exif_int(&markers, Ifd::Primary, ORIENTATION), Some(1));
        assert_eq!(exif_int(&markers, Ifd::Exif, PIXEL_X_DIMENSION), Some(16));
        assert_eq!(exif_int(&markers, Ifd::Exif, PIXEL_Y_DIMENSION), Some(32));
        let block = ExifBlock::parse(markers.exif_payload().unwrap()).unwrap();
        assert_eq!(block.thumbnail().unwrap(), Some(&[0xFF, 0xD8, 0xFF, 0xD9][..]));
    }

    #[test]
    fn unaligned_image_keeps_tags_and_frame_in_step() {
        for trim in [false, true] {
            let source = sample_jpeg(50, 30, Some(6));
            let mut flags = TransformFlags::DEFAULT;
            if trim {
                flags |= TransformFlags::TRANSFORM_TRIM;
            }
            let mut sink = Vec::new();
            transform_to_stream(&source, &mut sink, TransformRequest::Automatic, None, None, flags).unwrap();
            let (image, markers) = decode(&sink);
            assert_eq!(exif_int(&markers, Ifd::Exif, PIXEL_X_DIMENSION), Some(image.width as i64));
            assert_eq!(exif_int(&markers, Ifd::Exif, PIXEL_Y_DIMENSION), Some(image.height as i64));
            if trim {
                assert_eq!((image.width, image.height), (16, 50));
            } else {
                assert_eq!((image.width, image.height), (30, 50));
            }
        }
    }

    #[test]
    fn perfect_refuses_partial_edges() {
        let source = sample_jpeg(50, 30, Some(6));
        let mut sink = Vec::new();
        let result = transform_to_stream(
            &source,
            &mut sink,
            TransformRequest::Automatic,
            None,
            None,
            TransformFlags::DEFAULT | TransformFlags::TRANSFORM_PERFECT,
        );
        assert!(matches!(result, Err(TransformError::UnsupportedGeometry(_))));
        assert!(sink.is_empty());
    }

    #[test]
    fn file_to_file_skips_destination_when_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.jpg");
        let destination = dir.path().join("out.jpg");
        fs::write(&source, sample_jpeg(16, 16, Some(1))).unwrap();

        let outcome = transform_file_to_file(
            &source,
            &destination,
            TransformRequest::Automatic,
            None,
            None,
            TransformFlags::DEFAULT,
        )
        .unwrap();
        assert_eq!(outcome, TransformOutcome::Unchanged);
        assert!(!destination.exists());

        let outcome = transform_file_to_file(
            &source,
            &destination,
            TransformRequest::FlipHorizontal,
            None,
            None,
            TransformFlags::DEFAULT,
        )
        .unwrap();
        assert_eq!(outcome, TransformOutcome::Transformed);
        assert!(inspect(&fs::read(&destination).unwrap()).is_ok());
    }

    #[test]
    fn inspect_reports_header_and_metadata() {
        let info = inspect(&sample_jpeg(48, 32, Some(8))).unwrap();
        assert_eq!((info.width, info.height), (48, 32));
        assert!(!info.progressive);
        assert_eq!(info.components.len(), 3);
        assert_eq!(info.components[0].h_samp_factor, 2);
        assert_eq!(info.orientation, Orientation::Rotate270);
        assert_eq!(info.thumbnail_len, None);
        assert_eq!(info.comment, None);
    }
}

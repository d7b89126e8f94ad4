//! Lossless JPEG rotation, flipping and transposition.
//!
//! Images are transformed in the DCT coefficient domain, so nothing is
//! requantized. EXIF orientation, pixel dimensions and the embedded thumbnail
//! are kept in step with the new geometry, and every other APPn and COM
//! segment is carried over unchanged.
//!
//! ```no_run
//! use jpegtrans_rs::{TransformFlags, TransformRequest, transform_file_in_place};
//!
//! transform_file_in_place(
//!     std::path::Path::new("photo.jpg"),
//!     TransformRequest::Automatic,
//!     None,
//!     None,
//!     TransformFlags::DEFAULT,
//! )?;
//! # Ok::<(), jpegtrans_rs::TransformError>(())
//! ```

pub mod constants;
pub mod error;
pub mod exif;
pub mod file_transaction;
pub mod jpeg1;
pub mod jpeg_marker_code;
pub mod jpeg_stream_reader;
pub mod jpeg_stream_writer;
pub mod markers;
pub mod options;
pub mod pipeline;
pub mod transform;

pub use error::{ExifError, Result, TransformError};
pub use exif::{ExifBlock, Orientation};
pub use file_transaction::{FileTransaction, transform_file_in_place, transform_file_in_place_with_options};
pub use markers::{Marker, MarkerList};
pub use options::{TransformFlags, TransformOptions, TransformOutcome};
pub use pipeline::{
    JobState, JpegInfo, TransformJob, inspect, transform_file_to_file, transform_file_to_file_with_options,
    transform_to_stream, transform_to_stream_with_options,
};
pub use transform::{Transform, TransformRequest};

//! Error type shared by the blur pipeline.

use thiserror::Error;

/// Errors raised by the blur pipeline.
///
/// Configuration problems are normally absorbed at the setter boundary and
/// never reach callers of [`BlurView`](crate::BlurView); they surface only
/// through the strict constructors such as
/// [`BlurConfig::new`](crate::BlurConfig::new).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlurError {
    /// A raster was requested with a zero dimension.
    #[error("invalid raster dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// The pixel storage for a raster could not be reserved.
    #[error("failed to allocate {bytes} bytes for a {width}x{height} raster")]
    Allocation {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Number of bytes that could not be reserved.
        bytes: usize,
    },
    /// The bitmap was used after being recycled.
    #[error("bitmap has been recycled")]
    Recycled,
    /// A write was attempted on an immutable bitmap.
    #[error("bitmap is immutable")]
    Immutable,
    /// Pixel data does not match the declared raster shape.
    #[error("raster shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// Expected `(width, height)`.
        expected: (u32, u32),
        /// Actual `(width, height)`.
        found: (u32, u32),
    },
    /// A pixel vector whose length is not `width * height`.
    #[error("{found} pixels cannot fill a {width}x{height} raster")]
    PixelCount {
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
        /// Number of pixels supplied.
        found: usize,
    },
    /// A compute allocation id was not known to its context.
    #[error("unknown compute allocation {0}")]
    UnknownAllocation(usize),
    /// The compute context was used after it was destroyed.
    #[error("compute context has been destroyed")]
    ContextDestroyed,
    /// A blur radius outside `(0, MAX_BLUR_RADIUS]`.
    #[error("blur radius {0} is outside (0, 25]")]
    InvalidBlurRadius(f32),
    /// A sample size below 1.
    #[error("sample size {0} must be at least 1")]
    InvalidSampleSize(i64),
}

/// Result type used across the crate.
pub type Result<T, E = BlurError> = std::result::Result<T, E>;

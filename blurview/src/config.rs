//! Blur parameters and their validation rules.
//!
//! ## Usage
//!
//! Build a [`BlurConfig`] from styled attributes with
//! [`BlurConfig::from_attributes`], or strictly with [`BlurConfig::new`].

use tracing::warn;

use crate::error::{BlurError, Result};

/// Largest blur radius accepted, in downsampled pixels.
pub const MAX_BLUR_RADIUS: f32 = 25.0;

/// Blur radius used when none (or an invalid one) is supplied.
pub const DEFAULT_BLUR_RADIUS: f32 = 16.0;

/// Sample size used when none (or an invalid one) is supplied.
pub const DEFAULT_IN_SAMPLE_SIZE: u32 = 4;

/// Returns `true` if `blur_radius` lies in `(0, MAX_BLUR_RADIUS]`.
///
/// NaN is rejected.
pub fn is_valid_blur_radius(blur_radius: f32) -> bool {
    blur_radius > 0.0 && blur_radius <= MAX_BLUR_RADIUS
}

/// Returns `true` if `in_sample_size` is at least 1.
pub fn is_valid_in_sample_size(in_sample_size: i64) -> bool {
    in_sample_size > 0
}

/// Validated blur parameters.
///
/// `blur_radius` is expressed in downsampled pixels; `in_sample_size` is the
/// integer downsampling factor applied to the captured content before it is
/// blurred.
///
/// # Example
///
/// ```
/// use blurview::BlurConfig;
///
/// let config = BlurConfig::new(8.0, 2).unwrap();
/// assert_eq!(config.blur_radius(), 8.0);
/// assert_eq!(config.in_sample_size(), 2);
/// assert!(BlurConfig::new(30.0, 2).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawBlurConfig")
)]
pub struct BlurConfig {
    blur_radius: f32,
    in_sample_size: u32,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            blur_radius: DEFAULT_BLUR_RADIUS,
            in_sample_size: DEFAULT_IN_SAMPLE_SIZE,
        }
    }
}

impl BlurConfig {
    /// Creates a configuration, rejecting out-of-range values.
    pub fn new(blur_radius: f32, in_sample_size: i64) -> Result<Self> {
        if !is_valid_blur_radius(blur_radius) {
            return Err(BlurError::InvalidBlurRadius(blur_radius));
        }
        if !is_valid_in_sample_size(in_sample_size) {
            return Err(BlurError::InvalidSampleSize(in_sample_size));
        }
        let in_sample_size = u32::try_from(in_sample_size)
            .map_err(|_| BlurError::InvalidSampleSize(in_sample_size))?;
        Ok(Self {
            blur_radius,
            in_sample_size,
        })
    }

    /// Creates a configuration from optional styled attributes.
    ///
    /// Missing values take their defaults. Invalid values are logged and
    /// also replaced by their defaults, so construction never fails.
    pub fn from_attributes(blur_radius: Option<f32>, in_sample_size: Option<i32>) -> Self {
        let mut config = Self::default();

        if let Some(blur_radius) = blur_radius {
            if is_valid_blur_radius(blur_radius) {
                config.blur_radius = blur_radius;
            } else {
                warn!("Ignoring blurRadius attribute {blur_radius}; using {DEFAULT_BLUR_RADIUS}");
            }
        }

        if let Some(in_sample_size) = in_sample_size {
            if is_valid_in_sample_size(in_sample_size.into()) {
                config.in_sample_size = in_sample_size as u32;
            } else {
                warn!(
                    "Ignoring inSampleSize attribute {in_sample_size}; using {DEFAULT_IN_SAMPLE_SIZE}"
                );
            }
        }

        config
    }

    /// The blur radius in downsampled pixels.
    pub fn blur_radius(&self) -> f32 {
        self.blur_radius
    }

    /// The downsampling factor.
    pub fn in_sample_size(&self) -> u32 {
        self.in_sample_size
    }

    /// Applies `blur_radius` if it is valid and different.
    ///
    /// Returns `true` when the configuration changed.
    pub(crate) fn update_blur_radius(&mut self, blur_radius: f32) -> bool {
        if !is_valid_blur_radius(blur_radius) || blur_radius == self.blur_radius {
            return false;
        }
        self.blur_radius = blur_radius;
        true
    }

    /// Applies `in_sample_size` if it is valid and different.
    ///
    /// Returns `true` when the configuration changed.
    pub(crate) fn update_in_sample_size(&mut self, in_sample_size: i32) -> bool {
        if !is_valid_in_sample_size(in_sample_size.into())
            || in_sample_size as u32 == self.in_sample_size
        {
            return false;
        }
        self.in_sample_size = in_sample_size as u32;
        true
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
#[serde(rename_all = "snake_case")]
struct RawBlurConfig {
    #[serde(default = "default_blur_radius")]
    blur_radius: f32,
    #[serde(default = "default_in_sample_size")]
    in_sample_size: i64,
}

#[cfg(feature = "serde")]
fn default_blur_radius() -> f32 {
    DEFAULT_BLUR_RADIUS
}

#[cfg(feature = "serde")]
fn default_in_sample_size() -> i64 {
    DEFAULT_IN_SAMPLE_SIZE as i64
}

#[cfg(feature = "serde")]
impl TryFrom<RawBlurConfig> for BlurConfig {
    type Error = BlurError;

    fn try_from(raw: RawBlurConfig) -> Result<Self> {
        BlurConfig::new(raw.blur_radius, raw.in_sample_size)
    }
}

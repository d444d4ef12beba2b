//! Separable Gaussian convolution over premultiplied RGBA pixels.

use smallvec::SmallVec;

use crate::{bitmap::Rgba8, render_node::TileMode};

/// Kernels up to this many taps stay inline.
const INLINE_TAPS: usize = 64;

/// Normalized one-dimensional Gaussian weights.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    weights: SmallVec<[f32; INLINE_TAPS]>,
    half_width: usize,
}

impl GaussianKernel {
    /// Kernel used by the compute blur for a radius in pixels.
    ///
    /// `sigma = 0.4 * radius + 0.6`, sampled over `ceil(radius)` pixels on
    /// each side.
    pub fn from_radius(radius: f32) -> Self {
        if radius.is_nan() || radius <= 0.0 {
            return Self::identity();
        }
        let sigma = 0.4 * radius + 0.6;
        Self::from_sigma(sigma, radius.ceil() as usize)
    }

    /// Kernel used to evaluate a render-node blur effect of `radius` over
    /// content at most `extent` pixels wide or tall.
    ///
    /// `sigma = radius / sqrt(3) + 0.5`, sampled over `ceil(3 * sigma)`
    /// pixels on each side but never more than `extent`: further taps only
    /// re-sample edge pixels.
    pub fn for_render_effect(radius: f32, extent: usize) -> Self {
        if radius.is_nan() || radius <= 0.0 {
            return Self::identity();
        }
        let sigma = 0.577_35 * radius + 0.5;
        let half_width = ((3.0 * sigma).ceil() as usize).min(extent);
        Self::from_sigma(sigma, half_width)
    }

    /// Builds normalized weights for `sigma` with `half_width` taps per side.
    pub fn from_sigma(sigma: f32, half_width: usize) -> Self {
        if sigma.is_nan() || sigma <= 0.0 || half_width == 0 {
            return Self::identity();
        }
        let denominator = 2.0 * sigma * sigma;
        let mut weights: SmallVec<[f32; INLINE_TAPS]> = (0..=2 * half_width)
            .map(|i| {
                let offset = i as f32 - half_width as f32;
                (-(offset * offset) / denominator).exp()
            })
            .collect();
        let sum: f32 = weights.iter().sum();
        for weight in &mut weights {
            *weight /= sum;
        }
        Self {
            weights,
            half_width,
        }
    }

    /// The kernel that leaves pixels untouched.
    pub fn identity() -> Self {
        let mut weights = SmallVec::new();
        weights.push(1.0);
        Self {
            weights,
            half_width: 0,
        }
    }

    /// Weights from `-half_width` to `+half_width`.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Taps on each side of the center.
    pub fn half_width(&self) -> usize {
        self.half_width
    }

    /// Whether convolving with this kernel is a no-op.
    pub fn is_identity(&self) -> bool {
        self.half_width == 0
    }
}

/// Intermediate storage reused across blur passes.
#[derive(Debug, Default)]
pub struct BlurScratch {
    accum: Vec<[f32; 4]>,
}

impl BlurScratch {
    fn prepare(&mut self, len: usize) -> &mut [[f32; 4]] {
        self.accum.clear();
        self.accum.resize(len, [0.0; 4]);
        &mut self.accum
    }

    /// Releases the intermediate storage.
    pub fn release(&mut self) {
        self.accum = Vec::new();
    }
}

fn sample_index(position: isize, len: usize, tile_mode: TileMode) -> Option<usize> {
    if position >= 0 && (position as usize) < len {
        return Some(position as usize);
    }
    match tile_mode {
        TileMode::Clamp => Some(position.clamp(0, len as isize - 1) as usize),
        TileMode::Decal => None,
    }
}

/// Blurs `pixels` in place, horizontally with `horizontal` then vertically
/// with `vertical`.
///
/// `pixels` must hold exactly `width * height` row-major entries.
pub fn blur_separable(
    pixels: &mut [Rgba8],
    width: usize,
    height: usize,
    horizontal: &GaussianKernel,
    vertical: &GaussianKernel,
    tile_mode: TileMode,
    scratch: &mut BlurScratch,
) {
    if width == 0 || height == 0 || pixels.len() != width * height {
        return;
    }
    if horizontal.is_identity() && vertical.is_identity() {
        return;
    }

    let accum = scratch.prepare(pixels.len());

    let h_half = horizontal.half_width as isize;
    for y in 0..height {
        let row = &pixels[y * width..(y + 1) * width];
        for x in 0..width {
            let mut sum = [0.0f32; 4];
            for (tap, weight) in horizontal.weights.iter().enumerate() {
                let source = x as isize + tap as isize - h_half;
                if let Some(index) = sample_index(source, width, tile_mode) {
                    let channels = row[index].to_array();
                    for (acc, channel) in sum.iter_mut().zip(channels) {
                        *acc += weight * channel as f32;
                    }
                }
            }
            accum[y * width + x] = sum;
        }
    }

    let v_half = vertical.half_width as isize;
    for x in 0..width {
        for y in 0..height {
            let mut sum = [0.0f32; 4];
            for (tap, weight) in vertical.weights.iter().enumerate() {
                let source = y as isize + tap as isize - v_half;
                if let Some(index) = sample_index(source, height, tile_mode) {
                    let channels = accum[index * width + x];
                    for (acc, channel) in sum.iter_mut().zip(channels) {
                        *acc += weight * channel;
                    }
                }
            }
            let quantize = |value: f32| value.round().clamp(0.0, 255.0) as u8;
            let alpha = quantize(sum[3]);
            // Keep the premultiplied invariant after rounding.
            let color = |value: f32| quantize(value).min(alpha);
            pixels[y * width + x] = Rgba8::new(color(sum[0]), color(sum[1]), color(sum[2]), alpha);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_are_normalized_and_symmetric() {
        let kernel = GaussianKernel::from_radius(16.0);
        assert_eq!(kernel.half_width(), 16);
        assert_eq!(kernel.weights().len(), 33);
        let sum: f32 = kernel.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        let weights = kernel.weights();
        for i in 0..weights.len() / 2 {
            assert!((weights[i] - weights[weights.len() - 1 - i]).abs() < 1e-6);
        }
        assert!(weights[16] > weights[0]);
    }

    #[test]
    fn render_effect_kernel_covers_three_sigma() {
        let kernel = GaussianKernel::for_render_effect(64.0, 200);
        let sigma = 0.577_35f32 * 64.0 + 0.5;
        assert_eq!(kernel.half_width(), (3.0 * sigma).ceil() as usize);
        assert!(GaussianKernel::for_render_effect(0.0, 200).is_identity());
    }

    #[test]
    fn render_effect_kernel_is_bounded_by_the_content() {
        let kernel = GaussianKernel::for_render_effect(16.0 * i32::MAX as f32, 200);
        assert_eq!(kernel.half_width(), 200);
        assert_eq!(kernel.weights().len(), 401);
        let sum: f32 = kernel.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-3);

        assert!(GaussianKernel::for_render_effect(f32::INFINITY, 0).is_identity());
    }

    #[test]
    fn uniform_input_is_preserved_with_clamp() {
        let color = Rgba8::opaque(40, 120, 200);
        let mut pixels = vec![color; 12 * 7];
        let kernel = GaussianKernel::from_radius(5.0);
        let mut scratch = BlurScratch::default();
        blur_separable(&mut pixels, 12, 7, &kernel, &kernel, TileMode::Clamp, &mut scratch);
        assert!(pixels.iter().all(|p| *p == color));
    }

    #[test]
    fn decal_darkens_edges() {
        let mut pixels = vec![Rgba8::WHITE; 9 * 9];
        let kernel = GaussianKernel::from_radius(3.0);
        let mut scratch = BlurScratch::default();
        blur_separable(&mut pixels, 9, 9, &kernel, &kernel, TileMode::Decal, &mut scratch);
        assert!(pixels[0].a < 255);
        assert_eq!(pixels[4 * 9 + 4].a, 255);
    }

    #[test]
    fn single_bright_pixel_spreads() {
        let mut pixels = vec![Rgba8::TRANSPARENT; 5 * 5];
        pixels[12] = Rgba8::WHITE;
        let kernel = GaussianKernel::from_radius(2.0);
        let mut scratch = BlurScratch::default();
        blur_separable(&mut pixels, 5, 5, &kernel, &kernel, TileMode::Decal, &mut scratch);
        assert!(pixels[12].a < 255);
        assert!(pixels[11].a > 0);
        assert!(pixels[7].a > 0);
        assert_eq!(pixels[11], pixels[13]);
        assert!(pixels.iter().all(|p| p.r <= p.a));
    }
}

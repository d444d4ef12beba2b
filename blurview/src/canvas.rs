//! Draw-surface primitives shared by the capture, the render node recorder
//! and the host's own canvas.
//!
//! ## Usage
//!
//! Hosts implement [`Canvas`] over their native drawing surface. The crate
//! ships [`RasterCanvas`], a software implementation over a [`Bitmap`],
//! which the capture step draws through.

mod raster;

pub use raster::RasterCanvas;

use crate::{
    bitmap::{Bitmap, Rgba8},
    px::PxRect,
    render_node::RenderNode,
};

/// How a drawn color combines with the destination.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Source drawn over the destination.
    #[default]
    SrcOver,
    /// Source replaces the destination.
    Src,
    /// Destination becomes fully transparent.
    Clear,
}

/// Resampling used when a bitmap is drawn through a scaling matrix.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterQuality {
    /// Nearest-neighbour sampling.
    #[default]
    Nearest,
    /// Bilinear interpolation between the four closest pixels.
    Bilinear,
}

/// Drawing parameters for a single primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Paint {
    /// Fill color for rectangles; its alpha modulates bitmaps and layers.
    pub color: Rgba8,
    /// Compositing mode.
    pub blend_mode: BlendMode,
    /// Edge anti-aliasing hint.
    pub anti_alias: bool,
    /// Request bilinear filtering when this paint draws a bitmap.
    pub filter_bitmap: bool,
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            color: Rgba8::BLACK,
            blend_mode: BlendMode::SrcOver,
            anti_alias: false,
            filter_bitmap: false,
        }
    }
}

impl Paint {
    /// A paint filling with `color` in source-over mode.
    pub fn fill(color: Rgba8) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    /// A paint that clears whatever it covers.
    pub fn clear() -> Self {
        Self {
            blend_mode: BlendMode::Clear,
            ..Self::default()
        }
    }

    /// Restores every field to its default.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Scale-then-translate matrix mapping local coordinates to device pixels.
///
/// Only axis-aligned scales and translations are representable, which is
/// all the blur pipeline issues.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Horizontal scale.
    pub sx: f32,
    /// Vertical scale.
    pub sy: f32,
    /// Horizontal translation in device pixels.
    pub tx: f32,
    /// Vertical translation in device pixels.
    pub ty: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// The identity matrix.
    pub const IDENTITY: Self = Self {
        sx: 1.0,
        sy: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Concatenates a scale applied before this matrix.
    pub fn pre_scale(&mut self, sx: f32, sy: f32) {
        self.sx *= sx;
        self.sy *= sy;
    }

    /// Concatenates a translation applied before this matrix.
    pub fn pre_translate(&mut self, dx: f32, dy: f32) {
        self.tx += dx * self.sx;
        self.ty += dy * self.sy;
    }

    /// Maps a local point to device space.
    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.sx + self.tx, y * self.sy + self.ty)
    }

    /// Maps a device point back to local space.
    ///
    /// Returns `None` when the matrix is singular.
    pub fn invert_point(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        if self.sx == 0.0 || self.sy == 0.0 {
            return None;
        }
        Some(((x - self.tx) / self.sx, (y - self.ty) / self.sy))
    }

    /// Maps a local rectangle to a device-space `(left, top, right, bottom)`.
    pub fn map_rect(&self, left: f32, top: f32, right: f32, bottom: f32) -> (f32, f32, f32, f32) {
        let (x0, y0) = self.map_point(left, top);
        let (x1, y1) = self.map_point(right, bottom);
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// The drawing operations the blur pipeline issues.
///
/// Coordinates are local: they pass through the current matrix, which
/// [`Canvas::scale`] and [`Canvas::translate`] modify and
/// [`Canvas::save`]/[`Canvas::restore`] bracket.
pub trait Canvas {
    /// Pushes the matrix and clip.
    fn save(&mut self);

    /// Pushes the matrix and clip and redirects drawing into a transparent
    /// offscreen layer. The matching [`Canvas::restore`] composites the layer
    /// back, modulated by the paint's alpha.
    fn save_layer(&mut self, bounds: PxRect, paint: Option<&Paint>);

    /// Pops the most recent save or layer. Extra calls are ignored.
    fn restore(&mut self);

    /// Pre-concatenates a scale.
    fn scale(&mut self, sx: f32, sy: f32);

    /// Pre-concatenates a translation.
    fn translate(&mut self, dx: f32, dy: f32);

    /// Intersects the clip with `rect` in local coordinates.
    fn clip_rect(&mut self, rect: PxRect);

    /// Sets the resampling used for bitmaps until the next call.
    fn set_filter_quality(&mut self, quality: FilterQuality);

    /// Draws `bitmap` with its top-left corner at `(left, top)`.
    fn draw_bitmap(&mut self, bitmap: &Bitmap, left: f32, top: f32, paint: Option<&Paint>);

    /// Fills `rect` with `paint`.
    fn draw_rect(&mut self, rect: PxRect, paint: &Paint);

    /// Fills the whole clip with `color` using `mode`.
    fn draw_color(&mut self, color: Rgba8, mode: BlendMode);

    /// Draws a recorded render node, applying its render effect.
    fn draw_render_node(&mut self, node: &RenderNode);

    /// Whether render nodes are composited by hardware on this canvas.
    fn is_hardware_accelerated(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_applies_scale_before_translation() {
        let mut matrix = Transform::IDENTITY;
        matrix.pre_scale(0.25, 0.25);
        matrix.pre_translate(-100.0, -40.0);

        assert_eq!(matrix.map_point(100.0, 40.0), (0.0, 0.0));
        assert_eq!(matrix.map_point(300.0, 240.0), (50.0, 50.0));
        assert_eq!(matrix.invert_point(50.0, 50.0), Some((300.0, 240.0)));
    }

    #[test]
    fn paint_reset_restores_defaults() {
        let mut paint = Paint::clear();
        paint.anti_alias = true;
        paint.reset();
        assert_eq!(paint, Paint::default());
    }
}

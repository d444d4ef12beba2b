use parking_lot::RwLockWriteGuard;
use tracing::warn;

use super::{BlendMode, Canvas, FilterQuality, Paint, Transform};
use crate::{
    bitmap::{self, Bitmap, Raster, Rgba8},
    engine::kernel::{BlurScratch, GaussianKernel, blur_separable},
    px::{Px, PxRect},
    render_node::{RenderEffect, RenderNode},
};

struct SaveRecord {
    matrix: Transform,
    clip: PxRect,
    layer: Option<LayerRecord>,
}

struct LayerRecord {
    bounds: PxRect,
    alpha: u8,
}

enum Surface<'a> {
    Layer(&'a mut [Rgba8]),
    Target(RwLockWriteGuard<'a, Raster>),
}

impl Surface<'_> {
    fn pixels_mut(&mut self) -> &mut [Rgba8] {
        match self {
            Surface::Layer(pixels) => pixels,
            Surface::Target(raster) => raster.pixels_mut(),
        }
    }
}

/// Software [`Canvas`] rasterizing into a [`Bitmap`].
///
/// Pixels are covered when their center falls inside a primitive. Layers
/// opened with [`Canvas::save_layer`] are full-size transparent buffers that
/// composite back source-over on restore.
pub struct RasterCanvas {
    target: Option<Bitmap>,
    width: u32,
    height: u32,
    matrix: Transform,
    clip: PxRect,
    filter: FilterQuality,
    stack: Vec<SaveRecord>,
    layers: Vec<Vec<Rgba8>>,
    hardware: bool,
    scratch: BlurScratch,
}

impl Default for RasterCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterCanvas {
    /// A canvas without a target. Every draw is dropped until
    /// [`RasterCanvas::set_bitmap`] is called.
    pub fn new() -> Self {
        Self {
            target: None,
            width: 0,
            height: 0,
            matrix: Transform::IDENTITY,
            clip: PxRect::ZERO,
            filter: FilterQuality::default(),
            stack: Vec::new(),
            layers: Vec::new(),
            hardware: false,
            scratch: BlurScratch::default(),
        }
    }

    /// A canvas drawing into `bitmap`.
    pub fn with_bitmap(bitmap: Bitmap) -> Self {
        let mut canvas = Self::new();
        canvas.set_bitmap(Some(bitmap));
        canvas
    }

    /// Reports itself as hardware accelerated, so views draw render nodes
    /// instead of bitmaps. Nodes are still rasterized in software.
    pub fn with_hardware_acceleration(mut self, hardware: bool) -> Self {
        self.hardware = hardware;
        self
    }

    /// Retargets the canvas and resets the matrix, clip and save stack.
    pub fn set_bitmap(&mut self, bitmap: Option<Bitmap>) {
        let (width, height) = bitmap
            .as_ref()
            .map(|bitmap| (bitmap.width(), bitmap.height()))
            .unwrap_or((0, 0));
        self.target = bitmap;
        self.width = width;
        self.height = height;
        self.stack.clear();
        self.layers.clear();
        self.reset_matrix();
        self.clip = PxRect::new(Px::ZERO, Px::ZERO, Px(width as i32), Px(height as i32));
    }

    /// The current target.
    pub fn bitmap(&self) -> Option<&Bitmap> {
        self.target.as_ref()
    }

    /// Resets the matrix to identity.
    pub fn reset_matrix(&mut self) {
        self.matrix = Transform::IDENTITY;
    }

    /// The current matrix.
    pub fn matrix(&self) -> Transform {
        self.matrix
    }

    /// The current clip in device pixels.
    pub fn device_clip(&self) -> PxRect {
        self.clip
    }

    fn surface(&mut self) -> Option<Surface<'_>> {
        if let Some(layer) = self.layers.last_mut() {
            return Some(Surface::Layer(layer));
        }
        let target = self.target.as_ref()?;
        match target.write() {
            Ok(raster) => Some(Surface::Target(raster)),
            Err(err) => {
                warn!("Dropping draw into unusable bitmap: {err}");
                None
            }
        }
    }

    fn device_rect(&self, rect: PxRect) -> PxRect {
        let (left, top, right, bottom) = self.matrix.map_rect(
            rect.x.to_f32(),
            rect.y.to_f32(),
            rect.right().to_f32(),
            rect.bottom().to_f32(),
        );
        let edge = |value: f32| (value - 0.5).ceil() as i32;
        PxRect::from_ltrb(edge(left), edge(top), edge(right), edge(bottom))
    }

    fn clipped(&self, rect: PxRect) -> Option<PxRect> {
        self.clip.intersection(&rect)
    }

    fn fill(&mut self, area: PxRect, color: Rgba8, mode: BlendMode) {
        let width = self.width as usize;
        let Some(mut surface) = self.surface() else {
            return;
        };
        let pixels = surface.pixels_mut();
        for y in area.y.0..area.bottom().0 {
            let row = y as usize * width;
            for x in area.x.0..area.right().0 {
                if let Some(pixel) = pixels.get_mut(row + x as usize) {
                    blend(pixel, color, mode);
                }
            }
        }
    }
}

fn blend(dst: &mut Rgba8, src: Rgba8, mode: BlendMode) {
    *dst = match mode {
        BlendMode::SrcOver => src.over(*dst),
        BlendMode::Src => src,
        BlendMode::Clear => Rgba8::TRANSPARENT,
    };
}

fn sample_nearest(pixels: &[Rgba8], width: u32, height: u32, u: f32, v: f32) -> Rgba8 {
    let x = (u.floor() as i64).clamp(0, width as i64 - 1) as usize;
    let y = (v.floor() as i64).clamp(0, height as i64 - 1) as usize;
    pixels
        .get(y * width as usize + x)
        .copied()
        .unwrap_or(Rgba8::TRANSPARENT)
}

fn sample_bilinear(pixels: &[Rgba8], width: u32, height: u32, u: f32, v: f32) -> Rgba8 {
    let u = u - 0.5;
    let v = v - 0.5;
    let x0 = u.floor();
    let y0 = v.floor();
    let fx = u - x0;
    let fy = v - y0;
    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;
    let at = |x: i64, y: i64| {
        let x = x.clamp(0, max_x) as usize;
        let y = y.clamp(0, max_y) as usize;
        pixels
            .get(y * width as usize + x)
            .copied()
            .unwrap_or(Rgba8::TRANSPARENT)
            .to_array()
    };
    let (x0, y0) = (x0 as i64, y0 as i64);
    let p00 = at(x0, y0);
    let p10 = at(x0 + 1, y0);
    let p01 = at(x0, y0 + 1);
    let p11 = at(x0 + 1, y0 + 1);
    let mut out = [0u8; 4];
    for channel in 0..4 {
        let top = p00[channel] as f32 * (1.0 - fx) + p10[channel] as f32 * fx;
        let bottom = p01[channel] as f32 * (1.0 - fx) + p11[channel] as f32 * fx;
        out[channel] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba8::from_array(out)
}

impl Canvas for RasterCanvas {
    fn save(&mut self) {
        self.stack.push(SaveRecord {
            matrix: self.matrix,
            clip: self.clip,
            layer: None,
        });
    }

    fn save_layer(&mut self, bounds: PxRect, paint: Option<&Paint>) {
        let record = SaveRecord {
            matrix: self.matrix,
            clip: self.clip,
            layer: None,
        };
        let device = self.device_rect(bounds);
        let bounds = self.clipped(device).unwrap_or(PxRect::ZERO);
        self.clip = bounds;

        let layer = if self.target.is_some() {
            match bitmap::allocate_pixels(self.width, self.height) {
                Ok(pixels) => Some(pixels),
                Err(err) => {
                    warn!("Drawing without a layer: {err}");
                    None
                }
            }
        } else {
            None
        };

        let layer = layer.map(|pixels| {
            self.layers.push(pixels);
            LayerRecord {
                bounds,
                alpha: paint.map(|paint| paint.color.a).unwrap_or(255),
            }
        });
        self.stack.push(SaveRecord { layer, ..record });
    }

    fn restore(&mut self) {
        let Some(record) = self.stack.pop() else {
            return;
        };
        self.matrix = record.matrix;
        self.clip = record.clip;

        let Some(layer) = record.layer else {
            return;
        };
        let Some(source) = self.layers.pop() else {
            return;
        };
        let width = self.width as usize;
        let bounds = layer.bounds;
        let Some(mut surface) = self.surface() else {
            return;
        };
        let pixels = surface.pixels_mut();
        for y in bounds.y.0..bounds.bottom().0 {
            let row = y as usize * width;
            for x in bounds.x.0..bounds.right().0 {
                let index = row + x as usize;
                if let (Some(src), Some(dst)) = (source.get(index), pixels.get_mut(index)) {
                    *dst = src.scale_alpha(layer.alpha).over(*dst);
                }
            }
        }
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        self.matrix.pre_scale(sx, sy);
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.matrix.pre_translate(dx, dy);
    }

    fn clip_rect(&mut self, rect: PxRect) {
        let device = self.device_rect(rect);
        self.clip = self.clipped(device).unwrap_or(PxRect::ZERO);
    }

    fn set_filter_quality(&mut self, quality: FilterQuality) {
        self.filter = quality;
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, left: f32, top: f32, paint: Option<&Paint>) {
        if bitmap.is_recycled() {
            warn!("Skipping draw of a recycled bitmap");
            return;
        }

        // The source may be the target itself, whose lock is taken below.
        let draws_into_itself = self.layers.is_empty()
            && self
                .target
                .as_ref()
                .is_some_and(|target| Bitmap::ptr_eq(target, bitmap));
        let copied;
        let guard;
        let (source, src_width, src_height): (&[Rgba8], u32, u32) = if draws_into_itself {
            copied = bitmap.to_pixels();
            (&copied, bitmap.width(), bitmap.height())
        } else {
            guard = bitmap.read();
            (guard.pixels(), guard.width(), guard.height())
        };
        if source.is_empty() {
            return;
        }

        let (l, t, r, b) = self.matrix.map_rect(
            left,
            top,
            left + src_width as f32,
            top + src_height as f32,
        );
        let edge = |value: f32| (value - 0.5).ceil() as i32;
        let device = PxRect::from_ltrb(edge(l), edge(t), edge(r), edge(b));
        let Some(area) = self.clipped(device) else {
            return;
        };

        let matrix = self.matrix;
        let bilinear =
            self.filter == FilterQuality::Bilinear || paint.is_some_and(|paint| paint.filter_bitmap);
        let alpha = paint.map(|paint| paint.color.a).unwrap_or(255);
        let mode = paint.map(|paint| paint.blend_mode).unwrap_or_default();
        let width = self.width as usize;

        let Some(mut surface) = self.surface() else {
            return;
        };
        let pixels = surface.pixels_mut();
        for y in area.y.0..area.bottom().0 {
            let row = y as usize * width;
            for x in area.x.0..area.right().0 {
                let Some((u, v)) = matrix.invert_point(x as f32 + 0.5, y as f32 + 0.5) else {
                    continue;
                };
                let (u, v) = (u - left, v - top);
                let sample = if bilinear {
                    sample_bilinear(source, src_width, src_height, u, v)
                } else {
                    sample_nearest(source, src_width, src_height, u, v)
                };
                if let Some(pixel) = pixels.get_mut(row + x as usize) {
                    blend(pixel, sample.scale_alpha(alpha), mode);
                }
            }
        }
    }

    fn draw_rect(&mut self, rect: PxRect, paint: &Paint) {
        let device = self.device_rect(rect);
        if let Some(area) = self.clipped(device) {
            self.fill(area, paint.color, paint.blend_mode);
        }
    }

    fn draw_color(&mut self, color: Rgba8, mode: BlendMode) {
        let area = self.clip;
        if !area.is_empty() {
            self.fill(area, color, mode);
        }
    }

    fn draw_render_node(&mut self, node: &RenderNode) {
        let position = node.position();
        if position.is_empty() || !node.has_display_list() {
            return;
        }
        let content = match Bitmap::new(position.width.positive(), position.height.positive()) {
            Ok(content) => content,
            Err(err) => {
                warn!("Skipping render node '{}': {err}", node.name());
                return;
            }
        };

        let mut offscreen = RasterCanvas::with_bitmap(content.clone());
        offscreen.set_filter_quality(self.filter);
        node.replay(&mut offscreen);
        drop(offscreen);

        if let Some(RenderEffect::Blur {
            radius_x,
            radius_y,
            tile_mode,
        }) = node.render_effect()
        {
            let extent = position.width.positive().max(position.height.positive()) as usize;
            let horizontal = GaussianKernel::for_render_effect(radius_x, extent);
            let vertical = GaussianKernel::for_render_effect(radius_y, extent);
            if let Ok(mut raster) = content.write() {
                let (width, height) = (raster.width() as usize, raster.height() as usize);
                blur_separable(
                    raster.pixels_mut(),
                    width,
                    height,
                    &horizontal,
                    &vertical,
                    tile_mode,
                    &mut self.scratch,
                );
            }
        }

        self.draw_bitmap(&content, position.x.to_f32(), position.y.to_f32(), None);
    }

    fn is_hardware_accelerated(&self) -> bool {
        self.hardware
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_node::TileMode;

    fn canvas(width: u32, height: u32) -> (Bitmap, RasterCanvas) {
        let bitmap = match Bitmap::new(width, height) {
            Ok(bitmap) => bitmap,
            Err(err) => panic!("allocation failed: {err}"),
        };
        let canvas = RasterCanvas::with_bitmap(bitmap.clone());
        (bitmap, canvas)
    }

    fn rect(x: i32, y: i32, width: i32, height: i32) -> PxRect {
        PxRect::new(Px(x), Px(y), Px(width), Px(height))
    }

    #[test]
    fn downscaled_translated_fill_lands_in_buffer_coordinates() {
        let (bitmap, mut canvas) = canvas(50, 50);
        canvas.scale(0.25, 0.25);
        canvas.translate(-100.0, -100.0);
        canvas.clip_rect(rect(100, 100, 200, 200));
        canvas.draw_color(Rgba8::WHITE, BlendMode::Src);
        canvas.draw_rect(rect(140, 140, 40, 40), &Paint::clear());

        assert_eq!(bitmap.pixel(0, 0), Some(Rgba8::WHITE));
        assert_eq!(bitmap.pixel(49, 49), Some(Rgba8::WHITE));
        assert_eq!(bitmap.pixel(10, 10), Some(Rgba8::TRANSPARENT));
        assert_eq!(bitmap.pixel(19, 19), Some(Rgba8::TRANSPARENT));
        assert_eq!(bitmap.pixel(20, 20), Some(Rgba8::WHITE));
    }

    #[test]
    fn clip_limits_fills() {
        let (bitmap, mut canvas) = canvas(10, 10);
        canvas.save();
        canvas.clip_rect(rect(2, 2, 3, 3));
        canvas.draw_color(Rgba8::BLACK, BlendMode::SrcOver);
        canvas.restore();
        canvas.restore();

        assert_eq!(bitmap.pixel(2, 2), Some(Rgba8::BLACK));
        assert_eq!(bitmap.pixel(5, 5), Some(Rgba8::TRANSPARENT));
        assert_eq!(canvas.device_clip(), rect(0, 0, 10, 10));
    }

    #[test]
    fn upscaled_bitmap_covers_every_pixel() {
        let (source, _) = canvas(2, 2);
        assert!(source.erase_color(Rgba8::opaque(10, 20, 30)).is_ok());
        let (bitmap, mut canvas) = canvas(8, 8);
        canvas.scale(4.0, 4.0);
        canvas.set_filter_quality(FilterQuality::Bilinear);
        canvas.draw_bitmap(&source, 0.0, 0.0, None);

        assert!(
            bitmap
                .to_pixels()
                .iter()
                .all(|p| *p == Rgba8::opaque(10, 20, 30))
        );
    }

    #[test]
    fn layer_composites_with_paint_alpha() {
        let (bitmap, mut canvas) = canvas(4, 4);
        let mut paint = Paint::default();
        paint.color.a = 0;
        canvas.save_layer(rect(0, 0, 4, 4), Some(&paint));
        canvas.draw_color(Rgba8::WHITE, BlendMode::Src);
        canvas.restore();
        assert!(bitmap.to_pixels().iter().all(|p| p.is_transparent()));

        canvas.save_layer(rect(0, 0, 2, 4), None);
        canvas.draw_color(Rgba8::WHITE, BlendMode::Src);
        canvas.draw_rect(rect(0, 0, 1, 1), &Paint::clear());
        canvas.restore();
        assert_eq!(bitmap.pixel(0, 0), Some(Rgba8::TRANSPARENT));
        assert_eq!(bitmap.pixel(1, 0), Some(Rgba8::WHITE));
        assert_eq!(bitmap.pixel(2, 0), Some(Rgba8::TRANSPARENT));
    }

    #[test]
    fn recycled_bitmaps_are_skipped() {
        let (source, _) = canvas(2, 2);
        assert!(source.erase_color(Rgba8::WHITE).is_ok());
        source.recycle();
        let (bitmap, mut canvas) = canvas(2, 2);
        canvas.draw_bitmap(&source, 0.0, 0.0, None);
        assert!(bitmap.to_pixels().iter().all(|p| p.is_transparent()));
    }

    #[test]
    fn render_node_is_replayed_and_blurred() {
        let (source, _) = canvas(4, 4);
        assert!(source.erase_color(Rgba8::WHITE).is_ok());
        let mut node = RenderNode::new("test");
        node.set_position(rect(0, 0, 16, 16));
        node.record(|recorder| {
            recorder.scale(4.0, 4.0);
            recorder.draw_bitmap(&source, 0.0, 0.0, None);
        });
        node.set_render_effect(Some(RenderEffect::blur(8.0, 8.0, TileMode::Clamp)));

        let (bitmap, mut canvas) = canvas(16, 16);
        canvas.draw_render_node(&node);
        assert!(bitmap.to_pixels().iter().all(|p| *p == Rgba8::WHITE));
    }

    #[test]
    fn drawing_a_bitmap_into_itself_does_not_deadlock() {
        let (bitmap, mut canvas) = canvas(4, 4);
        assert!(bitmap.erase_color(Rgba8::WHITE).is_ok());
        canvas.translate(2.0, 0.0);
        canvas.draw_bitmap(&bitmap.clone(), 0.0, 0.0, None);
        assert_eq!(bitmap.pixel(3, 3), Some(Rgba8::WHITE));
    }
}

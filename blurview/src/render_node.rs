//! Retained display lists with an optional post-processing effect.
//!
//! A [`RenderNode`] records drawing commands once and is replayed by the
//! canvas that draws it. Hardware canvases composite nodes on the GPU; the
//! [`RasterCanvas`](crate::canvas::RasterCanvas) replays them in software.

use crate::{
    bitmap::{Bitmap, Rgba8},
    canvas::{BlendMode, Canvas, FilterQuality, Paint},
    px::PxRect,
};

/// Edge handling for effects that sample outside the node bounds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileMode {
    /// Repeat the nearest edge pixel.
    #[default]
    Clamp,
    /// Treat everything outside as transparent.
    Decal,
}

/// Post-processing applied to a node's content when it is composited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderEffect {
    /// Gaussian blur with separate horizontal and vertical radii, in device
    /// pixels.
    Blur {
        /// Horizontal radius.
        radius_x: f32,
        /// Vertical radius.
        radius_y: f32,
        /// Edge handling.
        tile_mode: TileMode,
    },
}

impl RenderEffect {
    /// A blur effect.
    pub fn blur(radius_x: f32, radius_y: f32, tile_mode: TileMode) -> Self {
        Self::Blur {
            radius_x,
            radius_y,
            tile_mode,
        }
    }
}

/// A single recorded drawing command.
#[derive(Debug, Clone)]
pub enum DrawOp {
    /// [`Canvas::save`].
    Save,
    /// [`Canvas::save_layer`].
    SaveLayer {
        /// Layer bounds.
        bounds: PxRect,
        /// Layer paint.
        paint: Option<Paint>,
    },
    /// [`Canvas::restore`].
    Restore,
    /// [`Canvas::scale`].
    Scale {
        /// Horizontal factor.
        sx: f32,
        /// Vertical factor.
        sy: f32,
    },
    /// [`Canvas::translate`].
    Translate {
        /// Horizontal offset.
        dx: f32,
        /// Vertical offset.
        dy: f32,
    },
    /// [`Canvas::clip_rect`].
    ClipRect(PxRect),
    /// [`Canvas::set_filter_quality`].
    FilterQuality(FilterQuality),
    /// [`Canvas::draw_bitmap`]. Holds a handle to the bitmap, not a copy.
    DrawBitmap {
        /// Drawn bitmap.
        bitmap: Bitmap,
        /// Left edge.
        left: f32,
        /// Top edge.
        top: f32,
        /// Optional paint.
        paint: Option<Paint>,
    },
    /// [`Canvas::draw_rect`].
    DrawRect {
        /// Filled rectangle.
        rect: PxRect,
        /// Fill paint.
        paint: Paint,
    },
    /// [`Canvas::draw_color`].
    DrawColor {
        /// Fill color.
        color: Rgba8,
        /// Compositing mode.
        mode: BlendMode,
    },
    /// [`Canvas::draw_render_node`].
    DrawRenderNode(Box<RenderNode>),
}

/// A canvas that records commands instead of rasterizing them.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    ops: Vec<DrawOp>,
}

impl RecordingCanvas {
    /// The commands recorded so far.
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    fn finish(self) -> Vec<DrawOp> {
        self.ops
    }
}

impl Canvas for RecordingCanvas {
    fn save(&mut self) {
        self.ops.push(DrawOp::Save);
    }

    fn save_layer(&mut self, bounds: PxRect, paint: Option<&Paint>) {
        self.ops.push(DrawOp::SaveLayer {
            bounds,
            paint: paint.cloned(),
        });
    }

    fn restore(&mut self) {
        self.ops.push(DrawOp::Restore);
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        self.ops.push(DrawOp::Scale { sx, sy });
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.ops.push(DrawOp::Translate { dx, dy });
    }

    fn clip_rect(&mut self, rect: PxRect) {
        self.ops.push(DrawOp::ClipRect(rect));
    }

    fn set_filter_quality(&mut self, quality: FilterQuality) {
        self.ops.push(DrawOp::FilterQuality(quality));
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, left: f32, top: f32, paint: Option<&Paint>) {
        self.ops.push(DrawOp::DrawBitmap {
            bitmap: bitmap.clone(),
            left,
            top,
            paint: paint.cloned(),
        });
    }

    fn draw_rect(&mut self, rect: PxRect, paint: &Paint) {
        self.ops.push(DrawOp::DrawRect {
            rect,
            paint: paint.clone(),
        });
    }

    fn draw_color(&mut self, color: Rgba8, mode: BlendMode) {
        self.ops.push(DrawOp::DrawColor { color, mode });
    }

    fn draw_render_node(&mut self, node: &RenderNode) {
        self.ops.push(DrawOp::DrawRenderNode(Box::new(node.clone())));
    }
}

/// A named, positioned display list with an optional render effect.
#[derive(Debug, Clone)]
pub struct RenderNode {
    name: String,
    position: PxRect,
    display_list: Option<Vec<DrawOp>>,
    render_effect: Option<RenderEffect>,
}

impl RenderNode {
    /// Creates an empty node.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: PxRect::ZERO,
            display_list: None,
            render_effect: None,
        }
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bounds of the node in the parent's coordinates.
    pub fn position(&self) -> PxRect {
        self.position
    }

    /// Sets the bounds of the node.
    ///
    /// Returns `true` if they changed.
    pub fn set_position(&mut self, position: PxRect) -> bool {
        let changed = self.position != position;
        self.position = position;
        changed
    }

    /// Replaces the display list with whatever `record` draws.
    ///
    /// Recording is in node-local coordinates: `(0, 0)` is the top-left
    /// corner of [`RenderNode::position`].
    pub fn record(&mut self, record: impl FnOnce(&mut RecordingCanvas)) {
        let mut canvas = RecordingCanvas::default();
        record(&mut canvas);
        self.display_list = Some(canvas.finish());
    }

    /// Whether a display list has been recorded and not discarded.
    pub fn has_display_list(&self) -> bool {
        self.display_list.is_some()
    }

    /// Drops the recorded commands and the references they hold.
    pub fn discard_display_list(&mut self) {
        self.display_list = None;
    }

    /// The recorded commands, if any.
    pub fn display_list(&self) -> Option<&[DrawOp]> {
        self.display_list.as_deref()
    }

    /// Sets or clears the effect applied when the node is composited.
    pub fn set_render_effect(&mut self, effect: Option<RenderEffect>) {
        self.render_effect = effect;
    }

    /// The current render effect.
    pub fn render_effect(&self) -> Option<RenderEffect> {
        self.render_effect
    }

    /// Issues the recorded commands against `canvas`, without the effect.
    pub fn replay(&self, canvas: &mut dyn Canvas) {
        let Some(ops) = &self.display_list else {
            return;
        };
        for op in ops {
            match op {
                DrawOp::Save => canvas.save(),
                DrawOp::SaveLayer { bounds, paint } => canvas.save_layer(*bounds, paint.as_ref()),
                DrawOp::Restore => canvas.restore(),
                DrawOp::Scale { sx, sy } => canvas.scale(*sx, *sy),
                DrawOp::Translate { dx, dy } => canvas.translate(*dx, *dy),
                DrawOp::ClipRect(rect) => canvas.clip_rect(*rect),
                DrawOp::FilterQuality(quality) => canvas.set_filter_quality(*quality),
                DrawOp::DrawBitmap {
                    bitmap,
                    left,
                    top,
                    paint,
                } => canvas.draw_bitmap(bitmap, *left, *top, paint.as_ref()),
                DrawOp::DrawRect { rect, paint } => canvas.draw_rect(*rect, paint),
                DrawOp::DrawColor { color, mode } => canvas.draw_color(*color, *mode),
                DrawOp::DrawRenderNode(node) => canvas.draw_render_node(node),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::px::Px;

    #[test]
    fn record_discard_and_rerecord() {
        let bitmap = match Bitmap::new(2, 2) {
            Ok(bitmap) => bitmap,
            Err(err) => panic!("allocation failed: {err}"),
        };
        let mut node = RenderNode::new("blur");
        assert!(!node.has_display_list());

        node.record(|canvas| {
            canvas.scale(4.0, 4.0);
            canvas.draw_bitmap(&bitmap, 0.0, 0.0, None);
        });
        assert!(node.has_display_list());
        assert_eq!(node.display_list().map(<[DrawOp]>::len), Some(2));

        match node.display_list().and_then(|ops| ops.get(1)) {
            Some(DrawOp::DrawBitmap { bitmap: recorded, .. }) => {
                assert!(Bitmap::ptr_eq(recorded, &bitmap));
            }
            other => panic!("unexpected op {other:?}"),
        }

        node.discard_display_list();
        assert!(!node.has_display_list());
        assert!(node.set_position(PxRect::new(Px(0), Px(0), Px(8), Px(8))));
        assert!(!node.set_position(PxRect::new(Px(0), Px(0), Px(8), Px(8))));
    }

    #[test]
    fn replay_forwards_every_op() {
        let mut node = RenderNode::new("ops");
        node.record(|canvas| {
            canvas.save();
            canvas.translate(1.0, 2.0);
            canvas.draw_color(Rgba8::WHITE, BlendMode::Src);
            canvas.restore();
        });

        let mut copy = RecordingCanvas::default();
        node.replay(&mut copy);
        assert_eq!(copy.ops().len(), 4);
        assert!(matches!(copy.ops()[1], DrawOp::Translate { dx, dy } if dx == 1.0 && dy == 2.0));
    }
}

//! Snapshot of the content behind a view, downsampled into a pooled buffer.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::trace;

use crate::{
    bitmap::{self, Bitmap},
    canvas::{Canvas, Paint, RasterCanvas},
    error::Result,
    geometry::{rect_relative_to, sampled_dimensions},
    host::{HostView, ReferenceSurface},
    px::{Px, PxRect},
};

/// Exclusion rectangles collected per capture; most views exclude a few.
pub(crate) type ExclusionRects = SmallVec<[PxRect; 4]>;

/// Rectangles of `exclusions` in `target`'s coordinate space, skipping
/// empty ones.
pub(crate) fn exclusion_rects(
    exclusions: &[Arc<dyn HostView>],
    target: &dyn HostView,
) -> ExclusionRects {
    exclusions
        .iter()
        .map(|view| rect_relative_to(Some(view.as_ref()), Some(target)))
        .filter(|rect| !rect.is_empty())
        .collect()
}

/// Renders the reference surface under a view into a reusable buffer.
///
/// The buffer, canvas and paint are created on first use and reset on every
/// capture after that.
#[derive(Default)]
pub struct SnapshotCapture {
    bitmap: Option<Bitmap>,
    canvas: Option<RasterCanvas>,
    paint: Paint,
    in_sample_size: u32,
}

impl SnapshotCapture {
    /// The buffer written by the last capture.
    pub fn bitmap(&self) -> Option<&Bitmap> {
        self.bitmap.as_ref()
    }

    /// Sample size the current buffer was captured with.
    pub fn in_sample_size(&self) -> u32 {
        self.in_sample_size
    }

    /// Draws `reference` into the capture buffer at `1 / in_sample_size`
    /// scale, cropped to `view`'s bounds, then clears each exclusion.
    ///
    /// Returns `Ok(None)` when `view` covers no pixels of the reference.
    pub fn capture(
        &mut self,
        view: &dyn HostView,
        reference: &dyn ReferenceSurface,
        exclusions: &[Arc<dyn HostView>],
        in_sample_size: u32,
    ) -> Result<Option<Bitmap>> {
        let in_sample_size = in_sample_size.max(1);
        let reference_view: &dyn HostView = reference;
        let rect = rect_relative_to(Some(view), Some(reference_view));
        if rect.is_empty() {
            trace!("Degenerate capture rect {rect:?}");
            return Ok(None);
        }

        let (width, height) = sampled_dimensions(rect.size(), in_sample_size);
        let buffer = bitmap::acquire(self.bitmap.take(), width, height)?;
        self.bitmap = Some(buffer.clone());
        self.in_sample_size = in_sample_size;

        let canvas = self.canvas.get_or_insert_with(RasterCanvas::new);
        canvas.set_bitmap(Some(buffer.clone()));

        let scale = 1.0 / in_sample_size as f32;
        canvas.scale(scale, scale);
        canvas.translate(-rect.x.to_f32(), -rect.y.to_f32());
        canvas.clip_rect(rect);
        reference.draw(canvas);

        let excluded = exclusion_rects(exclusions, reference_view);
        if !excluded.is_empty() {
            self.paint = Paint::clear();
            for rect in &excluded {
                canvas.draw_rect(*rect, &self.paint);
            }
            self.paint.reset();
        }

        canvas.set_bitmap(None);
        Ok(Some(buffer))
    }

    /// Recycles the buffer and drops the canvas.
    pub fn release(&mut self) {
        if let Some(bitmap) = self.bitmap.take() {
            bitmap.recycle();
        }
        self.canvas = None;
        self.paint.reset();
        self.in_sample_size = 0;
    }

    /// Whether a capture buffer is held.
    pub fn has_buffer(&self) -> bool {
        self.bitmap.is_some()
    }
}

/// Origin-anchored rectangle covering a view of `width`×`height`.
pub(crate) fn local_bounds(width: Px, height: Px) -> PxRect {
    PxRect::new(Px::ZERO, Px::ZERO, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bitmap::Rgba8,
        canvas::BlendMode,
        host::ViewId,
        px::{PxPosition, PxSize},
    };

    struct Fixed {
        id: u64,
        rect: PxRect,
    }

    impl HostView for Fixed {
        fn id(&self) -> ViewId {
            ViewId(self.id)
        }

        fn location_in_window(&self) -> PxPosition {
            self.rect.origin()
        }

        fn size(&self) -> PxSize {
            self.rect.size()
        }
    }

    struct HalfRed(Fixed);

    impl HostView for HalfRed {
        fn id(&self) -> ViewId {
            self.0.id()
        }

        fn location_in_window(&self) -> PxPosition {
            self.0.location_in_window()
        }

        fn size(&self) -> PxSize {
            self.0.size()
        }
    }

    impl ReferenceSurface for HalfRed {
        fn draw(&self, canvas: &mut dyn Canvas) {
            canvas.draw_color(Rgba8::WHITE, BlendMode::Src);
            canvas.draw_rect(
                PxRect::new(Px(0), Px(0), Px(200), Px(400)),
                &Paint::fill(Rgba8::opaque(255, 0, 0)),
            );
        }
    }

    fn rect(x: i32, y: i32, width: i32, height: i32) -> PxRect {
        PxRect::new(Px(x), Px(y), Px(width), Px(height))
    }

    fn reference() -> HalfRed {
        HalfRed(Fixed {
            id: 0,
            rect: rect(0, 0, 400, 400),
        })
    }

    #[test]
    fn captures_downsampled_region_under_view() {
        let view = Fixed {
            id: 1,
            rect: rect(100, 100, 200, 200),
        };
        let mut capture = SnapshotCapture::default();
        let buffer = match capture.capture(&view, &reference(), &[], 4) {
            Ok(Some(buffer)) => buffer,
            other => panic!("capture failed: {other:?}"),
        };

        assert_eq!((buffer.width(), buffer.height()), (50, 50));
        assert_eq!(buffer.pixel(0, 0), Some(Rgba8::opaque(255, 0, 0)));
        assert_eq!(buffer.pixel(24, 10), Some(Rgba8::opaque(255, 0, 0)));
        assert_eq!(buffer.pixel(25, 10), Some(Rgba8::WHITE));
        assert_eq!(buffer.pixel(49, 49), Some(Rgba8::WHITE));
        assert_eq!(capture.in_sample_size(), 4);
    }

    #[test]
    fn exclusions_are_cleared() {
        let view = Fixed {
            id: 1,
            rect: rect(100, 100, 200, 200),
        };
        let excluded: Arc<dyn HostView> = Arc::new(Fixed {
            id: 2,
            rect: rect(200, 200, 40, 40),
        });
        let mut capture = SnapshotCapture::default();
        let buffer = match capture.capture(&view, &reference(), &[excluded], 4) {
            Ok(Some(buffer)) => buffer,
            other => panic!("capture failed: {other:?}"),
        };

        for y in 25..35 {
            for x in 25..35 {
                assert_eq!(buffer.pixel(x, y), Some(Rgba8::TRANSPARENT), "({x}, {y})");
            }
        }
        assert_eq!(buffer.pixel(35, 35), Some(Rgba8::WHITE));
        assert_eq!(buffer.pixel(24, 24), Some(Rgba8::opaque(255, 0, 0)));
    }

    #[test]
    fn buffer_is_reused_between_captures_of_the_same_size() {
        let view = Fixed {
            id: 1,
            rect: rect(10, 10, 30, 30),
        };
        let mut capture = SnapshotCapture::default();
        let first = capture.capture(&view, &reference(), &[], 4);
        let second = capture.capture(&view, &reference(), &[], 4);
        match (first, second) {
            (Ok(Some(first)), Ok(Some(second))) => {
                assert!(Bitmap::ptr_eq(&first, &second));
                assert_eq!((second.width(), second.height()), (8, 8));
            }
            other => panic!("capture failed: {other:?}"),
        }

        capture.release();
        assert!(!capture.has_buffer());
    }

    #[test]
    fn empty_view_is_skipped() {
        let view = Fixed {
            id: 1,
            rect: rect(10, 10, 0, 30),
        };
        let mut capture = SnapshotCapture::default();
        assert_eq!(
            capture
                .capture(&view, &reference(), &[], 4)
                .map(|buffer| buffer.is_none()),
            Ok(true)
        );
        assert!(!capture.has_buffer());
    }
}

//! One capture, blur and composite cycle, plus the state the view reports
//! about it.

use std::sync::Arc;

use tracing::trace;

use crate::{
    capture::{ExclusionRects, SnapshotCapture},
    canvas::{Canvas, FilterQuality, Paint},
    config::BlurConfig,
    engine::{BlurEngine, BlurOutput, BlurRequest, BlurStrategyKind},
    error::Result,
    host::{Capabilities, HostView, ReferenceSurface},
    px::PxRect,
};

/// Whether the view is currently attached to a window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Not in a window; no listener is registered and no resources are held.
    #[default]
    Detached,
    /// In a window with the pre-draw listener registered.
    Attached,
}

/// Whether an update cycle is running.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleState {
    /// No cycle is running; draws composite the cached output.
    #[default]
    Idle,
    /// A cycle is running; the view's own draws are suppressed.
    Updating,
}

/// Why a cycle did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The view is not attached to a window.
    Detached,
    /// The view or one of its ancestors is hidden.
    NotShown,
    /// The view has a non-positive width or height.
    EmptyView,
    /// The window has no reference surface to capture.
    NoReferenceSurface,
    /// The view covers no part of the reference surface.
    DegenerateGeometry,
    /// A cycle was requested from inside a running one.
    Reentrant,
}

/// Result of one update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was captured; the previous output is kept.
    Skipped(SkipReason),
    /// A new output was produced.
    Completed {
        /// The strategy that produced it.
        strategy: BlurStrategyKind,
        /// Whether the output now lives in a different buffer.
        changed: bool,
    },
}

impl CycleOutcome {
    /// Whether the cycle produced output in a new buffer.
    pub fn changed(&self) -> bool {
        matches!(self, CycleOutcome::Completed { changed: true, .. })
    }
}

/// Which pipeline resources are held.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineResources {
    /// The downsampled snapshot of the reference surface.
    pub capture_buffer: bool,
    /// The compute path's blurred bitmap.
    pub result_buffer: bool,
    /// The accelerated path's render node.
    pub render_node: bool,
    /// The compute path's context.
    pub engine_context: bool,
}

impl PipelineResources {
    /// Whether nothing is held.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Capture buffer, blur engine and draw paint for one view.
#[derive(Default)]
pub(crate) struct Pipeline {
    capture: SnapshotCapture,
    engine: BlurEngine,
    paint: Paint,
    output_sample_size: u32,
}

impl Pipeline {
    #[tracing::instrument(level = "trace", skip(self, view, reference, exclusions))]
    pub(crate) fn run_cycle(
        &mut self,
        view: &dyn HostView,
        reference: &dyn ReferenceSurface,
        exclusions: &[Arc<dyn HostView>],
        config: BlurConfig,
        capabilities: Capabilities,
    ) -> Result<CycleOutcome> {
        if !view.is_shown() {
            trace!("View hidden, skipping cycle");
            return Ok(CycleOutcome::Skipped(SkipReason::NotShown));
        }
        let view_size = view.size();
        if view_size.is_empty() {
            trace!("View has no size, skipping cycle");
            return Ok(CycleOutcome::Skipped(SkipReason::EmptyView));
        }

        let in_sample_size = config.in_sample_size();
        let Some(capture) = self
            .capture
            .capture(view, reference, exclusions, in_sample_size)?
        else {
            return Ok(CycleOutcome::Skipped(SkipReason::DegenerateGeometry));
        };

        let strategy = BlurStrategyKind::select(capabilities);
        let request = BlurRequest {
            blur_radius: config.blur_radius(),
            in_sample_size,
            view_size,
        };
        let changed = self.engine.produce(strategy, &capture, &request)?;
        self.output_sample_size = in_sample_size;
        Ok(CycleOutcome::Completed { strategy, changed })
    }

    /// Composites the cached output over `bounds`, then clears `exclusions`.
    pub(crate) fn draw(
        &mut self,
        canvas: &mut dyn Canvas,
        bounds: PxRect,
        exclusions: &ExclusionRects,
    ) {
        self.paint.reset();
        self.paint.anti_alias = true;
        canvas.save_layer(bounds, Some(&self.paint));
        canvas.set_filter_quality(FilterQuality::Bilinear);

        match self.engine.output() {
            Some(BlurOutput::Node(node)) => {
                if canvas.is_hardware_accelerated() {
                    canvas.draw_render_node(node);
                } else {
                    trace!("Render node output needs a hardware canvas");
                }
            }
            Some(BlurOutput::Bitmap(bitmap)) => {
                let scale = self.output_sample_size.max(1) as f32;
                canvas.save();
                canvas.scale(scale, scale);
                canvas.draw_bitmap(bitmap, 0.0, 0.0, None);
                canvas.restore();
            }
            None => {}
        }

        if !exclusions.is_empty() {
            self.paint = Paint::clear();
            self.paint.anti_alias = true;
            for rect in exclusions {
                canvas.draw_rect(*rect, &self.paint);
            }
        }

        canvas.restore();
    }

    /// Releases the capture buffer and both strategies.
    pub(crate) fn release(&mut self) {
        self.capture.release();
        self.engine.release();
        self.paint.reset();
        self.output_sample_size = 0;
    }

    pub(crate) fn resources(&self) -> PipelineResources {
        let engine = self.engine.resources();
        PipelineResources {
            capture_buffer: self.capture.has_buffer(),
            result_buffer: engine.result_buffer,
            render_node: engine.render_node,
            engine_context: engine.engine_context,
        }
    }

    pub(crate) fn active_strategy(&self) -> Option<BlurStrategyKind> {
        self.engine.active()
    }

    pub(crate) fn output(&self) -> Option<BlurOutput<'_>> {
        self.engine.output()
    }
}

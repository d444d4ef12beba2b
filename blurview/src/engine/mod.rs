//! Blur strategies and the engine that switches between them.
//!
//! ## Usage
//!
//! The pipeline asks [`BlurStrategyKind::select`] which path the host can
//! run, then hands the capture to [`BlurEngine::produce`]. The engine keeps
//! at most one strategy's output alive.

pub mod compute;
pub mod kernel;
pub mod node;

use tracing::debug;

use crate::{
    bitmap::Bitmap,
    error::Result,
    host::Capabilities,
    px::PxSize,
    render_node::RenderNode,
};

pub use compute::ComputeStrategy;
pub use node::NodeStrategy;

/// Which blur implementation produces the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlurStrategyKind {
    /// Separable Gaussian over the downsampled capture, result in a bitmap.
    ComputeKernel,
    /// Render node with a blur effect, composited by the host.
    AcceleratedNode,
}

impl BlurStrategyKind {
    /// Picks the accelerated path when the host supports render effects.
    pub fn select(capabilities: Capabilities) -> Self {
        if capabilities.supports_render_effects() {
            Self::AcceleratedNode
        } else {
            Self::ComputeKernel
        }
    }
}

/// Parameters of a single blur pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurRequest {
    /// Radius in downsampled pixels.
    pub blur_radius: f32,
    /// Downsampling factor the capture was taken with.
    pub in_sample_size: u32,
    /// Full-resolution size of the view.
    pub view_size: PxSize,
}

/// What a strategy leaves behind for the draw pass.
#[derive(Debug, Clone, Copy)]
pub enum BlurOutput<'a> {
    /// A blurred bitmap at capture resolution.
    Bitmap(&'a Bitmap),
    /// A node drawing the capture at view resolution with a blur effect.
    Node(&'a RenderNode),
}

/// A way of turning a capture into something drawable.
pub trait BlurStrategy {
    /// Blurs `capture`, replacing the previous output.
    ///
    /// Returns `true` when the output now refers to a different buffer, so
    /// the view needs to redraw.
    fn produce(&mut self, capture: &Bitmap, request: &BlurRequest) -> Result<bool>;

    /// The current output, if any.
    fn output(&self) -> Option<BlurOutput<'_>>;

    /// Drops the current output, keeping reusable state.
    fn discard(&mut self);

    /// Drops everything the strategy holds.
    fn release(&mut self);
}

/// Resources currently held by the engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineResources {
    /// The compute path's blurred bitmap.
    pub result_buffer: bool,
    /// The accelerated path's render node.
    pub render_node: bool,
    /// The compute context.
    pub engine_context: bool,
}

/// Owns both strategies and routes each pass to the selected one.
#[derive(Debug, Default)]
pub struct BlurEngine {
    compute: ComputeStrategy,
    node: NodeStrategy,
    active: Option<BlurStrategyKind>,
}

impl BlurEngine {
    /// The strategy that produced the current output.
    pub fn active(&self) -> Option<BlurStrategyKind> {
        self.active
    }

    /// Runs `kind` over `capture`, discarding the other strategy's output
    /// first.
    pub fn produce(
        &mut self,
        kind: BlurStrategyKind,
        capture: &Bitmap,
        request: &BlurRequest,
    ) -> Result<bool> {
        match self.active {
            Some(previous) if previous != kind => {
                debug!("Switching blur strategy from {previous:?} to {kind:?}");
            }
            _ => {}
        }

        self.active = Some(kind);
        match kind {
            BlurStrategyKind::ComputeKernel => {
                self.node.discard();
                self.compute.produce(capture, request)
            }
            BlurStrategyKind::AcceleratedNode => {
                self.compute.discard();
                self.node.produce(capture, request)
            }
        }
    }

    /// The active strategy's output.
    pub fn output(&self) -> Option<BlurOutput<'_>> {
        match self.active? {
            BlurStrategyKind::ComputeKernel => self.compute.output(),
            BlurStrategyKind::AcceleratedNode => self.node.output(),
        }
    }

    /// Releases both strategies.
    pub fn release(&mut self) {
        self.compute.release();
        self.node.release();
        self.active = None;
    }

    /// Which resources are held.
    pub fn resources(&self) -> EngineResources {
        EngineResources {
            result_buffer: self.compute.result().is_some(),
            render_node: self.node.node().is_some(),
            engine_context: self.compute.has_context(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::px::Px;

    fn request() -> BlurRequest {
        BlurRequest {
            blur_radius: 4.0,
            in_sample_size: 2,
            view_size: PxSize::new(Px(16), Px(16)),
        }
    }

    fn capture() -> Bitmap {
        match Bitmap::new(8, 8) {
            Ok(bitmap) => bitmap,
            Err(err) => panic!("allocation failed: {err}"),
        }
    }

    #[test]
    fn select_follows_capabilities() {
        assert_eq!(
            BlurStrategyKind::select(Capabilities::SOFTWARE),
            BlurStrategyKind::ComputeKernel
        );
        assert_eq!(
            BlurStrategyKind::select(Capabilities {
                api_level: 31,
                hardware_accelerated: true,
            }),
            BlurStrategyKind::AcceleratedNode
        );
        assert_eq!(
            BlurStrategyKind::select(Capabilities {
                api_level: 30,
                hardware_accelerated: true,
            }),
            BlurStrategyKind::ComputeKernel
        );
    }

    #[test]
    fn switching_never_leaves_both_outputs_live() {
        let mut engine = BlurEngine::default();
        let capture = capture();

        assert!(
            engine
                .produce(BlurStrategyKind::ComputeKernel, &capture, &request())
                .is_ok()
        );
        assert!(matches!(engine.output(), Some(BlurOutput::Bitmap(_))));
        let resources = engine.resources();
        assert!(resources.result_buffer && !resources.render_node);

        assert!(
            engine
                .produce(BlurStrategyKind::AcceleratedNode, &capture, &request())
                .is_ok()
        );
        assert!(matches!(engine.output(), Some(BlurOutput::Node(_))));
        let resources = engine.resources();
        assert!(!resources.result_buffer && resources.render_node);
        assert!(resources.engine_context);

        assert!(
            engine
                .produce(BlurStrategyKind::ComputeKernel, &capture, &request())
                .is_ok()
        );
        let resources = engine.resources();
        assert!(resources.result_buffer && !resources.render_node);

        engine.release();
        assert_eq!(engine.resources(), EngineResources::default());
        assert!(engine.output().is_none());
    }
}

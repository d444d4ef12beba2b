//! Accelerated blur path: a persistent render node that draws the capture
//! scaled back up and carries a blur render effect.

use tracing::debug;

use super::{BlurOutput, BlurRequest, BlurStrategy};
use crate::{
    bitmap::Bitmap,
    canvas::Canvas,
    error::Result,
    px::{PxPosition, PxRect},
    render_node::{RenderEffect, RenderNode, TileMode},
};

/// Debug name of the node.
pub const NODE_NAME: &str = "BlurView";

/// Blur strategy recording the capture into a [`RenderNode`].
///
/// The radius is multiplied by the sample size, since the effect runs at
/// full resolution after the capture has been scaled back up.
#[derive(Debug, Default)]
pub struct NodeStrategy {
    node: Option<RenderNode>,
    source: Option<Bitmap>,
}

impl NodeStrategy {
    /// The node, once created.
    pub fn node(&self) -> Option<&RenderNode> {
        self.node.as_ref()
    }
}

impl BlurStrategy for NodeStrategy {
    fn produce(&mut self, capture: &Bitmap, request: &BlurRequest) -> Result<bool> {
        let node = match self.node.as_mut() {
            Some(node) => {
                if node.has_display_list() {
                    node.discard_display_list();
                }
                node
            }
            None => {
                debug!("Creating blur render node");
                self.node.insert(RenderNode::new(NODE_NAME))
            }
        };

        node.set_position(PxRect::from_position_size(
            PxPosition::ZERO,
            request.view_size,
        ));

        let scale = request.in_sample_size as f32;
        node.record(|canvas| {
            canvas.scale(scale, scale);
            canvas.draw_bitmap(capture, 0.0, 0.0, None);
        });

        let radius = request.blur_radius * scale;
        node.set_render_effect(Some(RenderEffect::blur(radius, radius, TileMode::Clamp)));

        let changed = self
            .source
            .as_ref()
            .is_none_or(|source| !Bitmap::ptr_eq(source, capture));
        self.source = Some(capture.clone());
        Ok(changed)
    }

    fn output(&self) -> Option<BlurOutput<'_>> {
        self.node
            .as_ref()
            .filter(|node| node.has_display_list())
            .map(BlurOutput::Node)
    }

    fn discard(&mut self) {
        if let Some(mut node) = self.node.take() {
            node.discard_display_list();
        }
        self.source = None;
    }

    fn release(&mut self) {
        self.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        px::{Px, PxSize},
        render_node::DrawOp,
    };

    fn request() -> BlurRequest {
        BlurRequest {
            blur_radius: 16.0,
            in_sample_size: 4,
            view_size: PxSize::new(Px(200), Px(200)),
        }
    }

    fn capture() -> Bitmap {
        match Bitmap::new(50, 50) {
            Ok(bitmap) => bitmap,
            Err(err) => panic!("allocation failed: {err}"),
        }
    }

    #[test]
    fn records_scaled_capture_with_scaled_radius() {
        let mut strategy = NodeStrategy::default();
        let capture = capture();
        assert_eq!(strategy.produce(&capture, &request()), Ok(true));

        let Some(node) = strategy.node() else {
            panic!("node was not created");
        };
        assert_eq!(node.name(), NODE_NAME);
        assert_eq!(node.position(), PxRect::new(Px(0), Px(0), Px(200), Px(200)));
        assert_eq!(
            node.render_effect(),
            Some(RenderEffect::blur(64.0, 64.0, TileMode::Clamp))
        );
        match node.display_list() {
            Some([DrawOp::Scale { sx, sy }, DrawOp::DrawBitmap { bitmap, left, top, .. }]) => {
                assert_eq!((*sx, *sy), (4.0, 4.0));
                assert_eq!((*left, *top), (0.0, 0.0));
                assert!(Bitmap::ptr_eq(bitmap, &capture));
            }
            other => panic!("unexpected display list {other:?}"),
        }
    }

    #[test]
    fn changed_tracks_capture_identity() {
        let mut strategy = NodeStrategy::default();
        let first = capture();
        assert_eq!(strategy.produce(&first, &request()), Ok(true));
        assert_eq!(strategy.produce(&first, &request()), Ok(false));
        assert_eq!(strategy.produce(&capture(), &request()), Ok(true));
        assert_eq!(
            strategy.node().and_then(RenderNode::display_list).map(<[DrawOp]>::len),
            Some(2)
        );
    }

    #[test]
    fn discard_drops_the_node() {
        let mut strategy = NodeStrategy::default();
        assert_eq!(strategy.produce(&capture(), &request()), Ok(true));
        assert!(strategy.output().is_some());
        strategy.discard();
        assert!(strategy.node().is_none());
        assert!(strategy.output().is_none());
    }
}

//! Host view-tree integration points.
//!
//! ## Usage
//!
//! Implement these traits on top of the platform's view system so a
//! [`BlurView`](crate::BlurView) can query geometry, capture the content
//! behind it and hook into the frame loop.
//!
//! The host owns the render loop. It is expected to:
//! - call [`BlurView::on_attached_to_window`](crate::BlurView::on_attached_to_window)
//!   and [`BlurView::on_detached_from_window`](crate::BlurView::on_detached_from_window)
//!   as the view enters and leaves a window,
//! - invoke every registered [`OnPreDrawListener`] once before each frame,
//! - run tasks handed to [`ViewTree::post`] on the UI thread,
//! - call [`BlurView::draw`](crate::BlurView::draw) while drawing the frame.

use std::sync::Arc;

use crate::{
    canvas::Canvas,
    px::{PxPosition, PxSize},
};

/// Stable identity of a host view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(pub u64);

/// Geometry and visibility of a view in the host tree.
pub trait HostView: Send + Sync {
    /// Identity used to deduplicate exclusion sets.
    fn id(&self) -> ViewId;

    /// Top-left corner of the view in window coordinates.
    fn location_in_window(&self) -> PxPosition;

    /// Laid-out size of the view.
    fn size(&self) -> PxSize;

    /// Whether the view and all of its ancestors are visible and attached.
    fn is_shown(&self) -> bool {
        true
    }
}

/// The root content of a window, drawn into the capture buffer.
pub trait ReferenceSurface: HostView {
    /// Draws the whole surface, children included, into `canvas`.
    fn draw(&self, canvas: &mut dyn Canvas);
}

/// Callback invoked before each frame is drawn.
pub trait OnPreDrawListener: Send + Sync {
    /// Returns `true` to let the frame proceed.
    fn on_pre_draw(&self) -> bool;
}

/// Handle returned by [`ViewTree::add_on_pre_draw_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A task posted to the UI thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Rendering capabilities of the host window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Platform API level.
    pub api_level: u32,
    /// Whether the window draws through a hardware-accelerated pipeline.
    pub hardware_accelerated: bool,
}

impl Capabilities {
    /// First API level with render effects on render nodes.
    pub const RENDER_EFFECT_API_LEVEL: u32 = 31;

    /// Capabilities of a software-only window.
    pub const SOFTWARE: Self = Self {
        api_level: 0,
        hardware_accelerated: false,
    };

    /// Whether render nodes can carry a blur effect composited by the host.
    pub fn supports_render_effects(&self) -> bool {
        self.hardware_accelerated && self.api_level >= Self::RENDER_EFFECT_API_LEVEL
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::SOFTWARE
    }
}

/// The window-level services a blur view needs while attached.
pub trait ViewTree: Send + Sync {
    /// The root content view of the window, if it has one.
    fn reference_surface(&self) -> Option<Arc<dyn ReferenceSurface>>;

    /// Registers a listener called before every frame.
    fn add_on_pre_draw_listener(&self, listener: Arc<dyn OnPreDrawListener>) -> ListenerId;

    /// Unregisters a listener. Unknown ids are ignored.
    fn remove_on_pre_draw_listener(&self, id: ListenerId);

    /// Queues `task` to run on the UI thread after the current callback.
    fn post(&self, task: Task);

    /// Requests that `view` be redrawn in the next frame.
    fn invalidate(&self, view: ViewId);

    /// Current rendering capabilities.
    fn capabilities(&self) -> Capabilities;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_effects_need_hardware_and_api_level() {
        let hardware = |api_level| Capabilities {
            api_level,
            hardware_accelerated: true,
        };
        assert!(hardware(31).supports_render_effects());
        assert!(hardware(34).supports_render_effects());
        assert!(!hardware(30).supports_render_effects());
        assert!(
            !Capabilities {
                api_level: 34,
                hardware_accelerated: false,
            }
            .supports_render_effects()
        );
        assert!(!Capabilities::default().supports_render_effects());
    }
}

//! View rectangles in window and ancestor coordinate spaces.

use crate::{
    host::HostView,
    px::{PxRect, PxSize},
};

/// Returns the rectangle `view` covers in window coordinates.
///
/// An absent view yields [`PxRect::ZERO`].
pub fn view_rect(view: Option<&dyn HostView>) -> PxRect {
    match view {
        Some(view) => PxRect::from_position_size(view.location_in_window(), view.size()),
        None => PxRect::ZERO,
    }
}

/// Returns the rectangle of `view` expressed relative to `target`'s origin.
///
/// Both views are located in window coordinates first; when `target` is
/// absent the window rectangle is returned unchanged.
///
/// # Example
///
/// ```
/// use blurview::geometry::rect_relative_to;
/// use blurview::host::{HostView, ViewId};
/// use blurview::px::{Px, PxPosition, PxRect, PxSize};
///
/// struct Fixed(PxRect);
///
/// impl HostView for Fixed {
///     fn id(&self) -> ViewId {
///         ViewId(0)
///     }
///     fn location_in_window(&self) -> PxPosition {
///         self.0.origin()
///     }
///     fn size(&self) -> PxSize {
///         self.0.size()
///     }
/// }
///
/// let child = Fixed(PxRect::new(Px(120), Px(80), Px(50), Px(40)));
/// let parent = Fixed(PxRect::new(Px(100), Px(50), Px(300), Px(300)));
/// assert_eq!(
///     rect_relative_to(Some(&child), Some(&parent)),
///     PxRect::new(Px(20), Px(30), Px(50), Px(40))
/// );
/// ```
pub fn rect_relative_to(view: Option<&dyn HostView>, target: Option<&dyn HostView>) -> PxRect {
    let rect = view_rect(view);
    match target {
        Some(target) => {
            let origin = target.location_in_window();
            rect.offset(-origin.x, -origin.y)
        }
        None => rect,
    }
}

/// Size in pixels of a buffer holding `size` downsampled by `in_sample_size`.
///
/// Each dimension is divided rounding up and floored at 1, so even a
/// degenerate source yields a 1×1 buffer.
pub fn sampled_dimensions(size: PxSize, in_sample_size: u32) -> (u32, u32) {
    let in_sample_size = in_sample_size.max(1);
    let width = size.width.positive().div_ceil(in_sample_size).max(1);
    let height = size.height.positive().div_ceil(in_sample_size).max(1);
    (width, height)
}

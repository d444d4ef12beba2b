//! Physical pixel coordinate types used by the blur pipeline.
//!
//! All geometry handled by `blurview` lives in window space, measured in
//! physical pixels:
//! - Origin (0, 0) at the top-left corner of the window
//! - X-axis increases to the right
//! - Y-axis increases downward
//! - Negative coordinates are allowed for views scrolled off-screen
//!
//! Coordinates come from the host, so arithmetic saturates at the `i32`
//! range instead of overflowing.
//!
//! # Example
//!
//! ```
//! use blurview::px::{Px, PxPosition, PxRect, PxSize};
//!
//! let origin = PxPosition::new(Px::new(100), Px::new(40));
//! let rect = PxRect::from_position_size(origin, PxSize::new(Px::new(200), Px::new(80)));
//! assert_eq!(rect.right(), Px::new(300));
//! assert_eq!(rect.offset(Px::new(-100), Px::new(-40)).x, Px::ZERO);
//! ```

use std::ops::{Add, Neg};

/// A physical pixel coordinate or extent.
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub struct Px(pub i32);

impl Px {
    /// Zero pixels.
    pub const ZERO: Self = Self(0);

    /// Wraps an `i32`.
    pub const fn new(value: i32) -> Self {
        Px(value)
    }

    /// The value as a buffer dimension; negative values become zero.
    ///
    /// ```
    /// use blurview::px::Px;
    ///
    /// assert_eq!(Px::new(10).positive(), 10);
    /// assert_eq!(Px::new(-5).positive(), 0);
    /// ```
    pub fn positive(self) -> u32 {
        u32::try_from(self.0).unwrap_or(0)
    }

    /// The value as `f32`.
    pub fn to_f32(self) -> f32 {
        self.0 as f32
    }
}

impl Add for Px {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Px(self.0.saturating_add(rhs.0))
    }
}

impl Neg for Px {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Px(self.0.saturating_neg())
    }
}

/// A position in window space.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PxPosition {
    /// Horizontal coordinate.
    pub x: Px,
    /// Vertical coordinate.
    pub y: Px,
}

impl PxPosition {
    /// The window origin.
    pub const ZERO: Self = Self { x: Px(0), y: Px(0) };

    /// Creates a position.
    pub const fn new(x: Px, y: Px) -> Self {
        Self { x, y }
    }
}

/// A width and height.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PxSize {
    /// Width.
    pub width: Px,
    /// Height.
    pub height: Px,
}

impl PxSize {
    /// Zero size.
    pub const ZERO: Self = Self {
        width: Px(0),
        height: Px(0),
    };

    /// Creates a size.
    pub const fn new(width: Px, height: Px) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero or negative.
    pub fn is_empty(&self) -> bool {
        self.width.0 <= 0 || self.height.0 <= 0
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PxRect {
    /// Left edge.
    pub x: Px,
    /// Top edge.
    pub y: Px,
    /// Width.
    pub width: Px,
    /// Height.
    pub height: Px,
}

impl PxRect {
    /// A 0×0 rectangle at the origin.
    pub const ZERO: Self = Self {
        x: Px::ZERO,
        y: Px::ZERO,
        width: Px::ZERO,
        height: Px::ZERO,
    };

    /// Creates a rectangle from its top-left corner and size.
    pub const fn new(x: Px, y: Px, width: Px, height: Px) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a rectangle from a position and size.
    pub fn from_position_size(position: PxPosition, size: PxSize) -> Self {
        Self::new(position.x, position.y, size.width, size.height)
    }

    /// Creates a rectangle from its left, top, right and bottom edges.
    pub fn from_ltrb(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            x: Px(left),
            y: Px(top),
            width: Px(right.saturating_sub(left)),
            height: Px(bottom.saturating_sub(top)),
        }
    }

    /// The top-left corner.
    pub fn origin(&self) -> PxPosition {
        PxPosition::new(self.x, self.y)
    }

    /// The width and height.
    pub fn size(&self) -> PxSize {
        PxSize::new(self.width, self.height)
    }

    /// The right edge (exclusive).
    pub fn right(&self) -> Px {
        self.x + self.width
    }

    /// The bottom edge (exclusive).
    pub fn bottom(&self) -> Px {
        self.y + self.height
    }

    /// Whether the width or height is zero or negative.
    ///
    /// ```
    /// use blurview::px::{Px, PxRect};
    ///
    /// assert!(PxRect::ZERO.is_empty());
    /// assert!(PxRect::new(Px(0), Px(0), Px(10), Px(0)).is_empty());
    /// assert!(!PxRect::new(Px(0), Px(0), Px(10), Px(1)).is_empty());
    /// ```
    pub fn is_empty(&self) -> bool {
        self.size().is_empty()
    }

    /// This rectangle translated by `(dx, dy)`.
    pub fn offset(&self, dx: Px, dy: Px) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// The overlap of both rectangles, or `None` when they do not overlap.
    ///
    /// ```
    /// use blurview::px::{Px, PxRect};
    ///
    /// let a = PxRect::new(Px(0), Px(0), Px(100), Px(100));
    /// let b = PxRect::new(Px(50), Px(50), Px(100), Px(100));
    /// assert_eq!(a.intersection(&b), Some(PxRect::new(Px(50), Px(50), Px(50), Px(50))));
    /// ```
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if left < right && top < bottom {
            Some(Self::from_ltrb(left.0, top.0, right.0, bottom.0))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_saturates_on_extreme_host_coordinates() {
        let far = PxRect::new(Px(i32::MAX - 10), Px(i32::MIN), Px(100), Px(100));
        assert_eq!(far.right(), Px(i32::MAX));
        assert_eq!(-Px(i32::MIN), Px(i32::MAX));

        let moved = far.offset(Px(i32::MAX), -Px(i32::MIN));
        assert_eq!(moved.x, Px(i32::MAX));
        assert_eq!(moved.y, Px(-1));

        let window = PxRect::new(Px(0), Px(0), Px(400), Px(400));
        assert_eq!(far.intersection(&window), None);
        let huge = PxRect::new(Px(-10), Px(-10), Px(i32::MAX), Px(i32::MAX));
        assert_eq!(huge.intersection(&window), Some(window));
        assert_eq!(
            PxRect::from_ltrb(i32::MIN, 0, i32::MAX, 1).width,
            Px(i32::MAX)
        );
    }

    #[test]
    fn intersection_of_touching_rects_is_none() {
        let a = PxRect::new(Px(0), Px(0), Px(10), Px(10));
        let b = PxRect::new(Px(10), Px(0), Px(10), Px(10));
        assert_eq!(a.intersection(&b), None);
    }
}

//! Shared raster buffers and the reuse-or-reallocate policy.
//!
//! A [`Bitmap`] is a reference-counted handle: clones share the same pixel
//! storage, and identity is compared with [`Bitmap::ptr_eq`]. This matches
//! how display lists keep a reference to the buffer they draw rather than a
//! copy of its pixels.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

use crate::{
    error::{BlurError, Result},
    px::{Px, PxSize},
};

/// A premultiplied RGBA pixel with 8 bits per channel.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Rgba8 {
    /// Red, premultiplied by alpha.
    pub r: u8,
    /// Green, premultiplied by alpha.
    pub g: u8,
    /// Blue, premultiplied by alpha.
    pub b: u8,
    /// Alpha.
    pub a: u8,
}

impl Rgba8 {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    /// Opaque black.
    pub const BLACK: Self = Self::opaque(0, 0, 0);
    /// Opaque white.
    pub const WHITE: Self = Self::opaque(255, 255, 255);

    /// Creates a pixel from already premultiplied channels.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Creates an opaque pixel.
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Whether the pixel has zero alpha.
    pub fn is_transparent(self) -> bool {
        self.a == 0
    }

    /// Channels as `[r, g, b, a]`.
    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Builds a pixel from `[r, g, b, a]`.
    pub fn from_array(channels: [u8; 4]) -> Self {
        Self::new(channels[0], channels[1], channels[2], channels[3])
    }

    /// Scales every channel by `alpha / 255`.
    pub fn scale_alpha(self, alpha: u8) -> Self {
        if alpha == 255 {
            return self;
        }
        let scale = |c: u8| ((c as u32 * alpha as u32 + 127) / 255) as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b), scale(self.a))
    }

    /// Source-over compositing of `self` onto `dst`.
    pub fn over(self, dst: Self) -> Self {
        if self.a == 255 {
            return self;
        }
        if self.a == 0 {
            return dst;
        }
        let inverse = 255 - self.a as u32;
        let blend = |s: u8, d: u8| (s as u32 + (d as u32 * inverse + 127) / 255).min(255) as u8;
        Self::new(
            blend(self.r, dst.r),
            blend(self.g, dst.g),
            blend(self.b, dst.b),
            blend(self.a, dst.a),
        )
    }
}

/// Pixel storage behind a [`Bitmap`] handle.
#[derive(Debug)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<Rgba8>,
    recycled: bool,
    mutable: bool,
}

impl Raster {
    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major pixels; empty once recycled.
    pub fn pixels(&self) -> &[Rgba8] {
        &self.pixels
    }

    /// Mutable row-major pixels; empty once recycled.
    pub fn pixels_mut(&mut self) -> &mut [Rgba8] {
        &mut self.pixels
    }

    /// Whether the storage has been released.
    pub fn is_recycled(&self) -> bool {
        self.recycled
    }
}

/// A shared, optionally mutable raster buffer.
#[derive(Debug, Clone)]
pub struct Bitmap {
    inner: Arc<RwLock<Raster>>,
}

pub(crate) fn allocate_pixels(width: u32, height: u32) -> Result<Vec<Rgba8>> {
    if width == 0 || height == 0 {
        return Err(BlurError::InvalidDimensions { width, height });
    }
    let len = (width as usize)
        .checked_mul(height as usize)
        .ok_or(BlurError::Allocation {
            width,
            height,
            bytes: usize::MAX,
        })?;
    let mut pixels = Vec::new();
    pixels
        .try_reserve_exact(len)
        .map_err(|_| BlurError::Allocation {
            width,
            height,
            bytes: len.saturating_mul(std::mem::size_of::<Rgba8>()),
        })?;
    pixels.resize(len, Rgba8::TRANSPARENT);
    Ok(pixels)
}

impl Bitmap {
    /// Allocates a mutable, fully transparent bitmap.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixels = allocate_pixels(width, height)?;
        Ok(Self::from_raster(Raster {
            width,
            height,
            pixels,
            recycled: false,
            mutable: true,
        }))
    }

    /// Wraps existing row-major pixels in a mutable bitmap.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Rgba8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BlurError::InvalidDimensions { width, height });
        }
        if pixels.len() != width as usize * height as usize {
            return Err(BlurError::PixelCount {
                width,
                height,
                found: pixels.len(),
            });
        }
        Ok(Self::from_raster(Raster {
            width,
            height,
            pixels,
            recycled: false,
            mutable: true,
        }))
    }

    fn from_raster(raster: Raster) -> Self {
        Self {
            inner: Arc::new(RwLock::new(raster)),
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.inner.read().width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.inner.read().height
    }

    /// Width and height as a [`PxSize`].
    pub fn size(&self) -> PxSize {
        let raster = self.inner.read();
        PxSize::new(Px(raster.width as i32), Px(raster.height as i32))
    }

    /// Whether [`Bitmap::recycle`] has been called.
    pub fn is_recycled(&self) -> bool {
        self.inner.read().recycled
    }

    /// Whether the pixels may be written.
    pub fn is_mutable(&self) -> bool {
        self.inner.read().mutable
    }

    /// Marks the bitmap read-only. Cannot be undone.
    pub fn set_immutable(&self) {
        self.inner.write().mutable = false;
    }

    /// Releases the pixel storage. Idempotent.
    pub fn recycle(&self) {
        let mut raster = self.inner.write();
        if raster.recycled {
            return;
        }
        raster.recycled = true;
        raster.pixels = Vec::new();
    }

    /// Whether both handles refer to the same storage.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Fills every pixel with `color`.
    pub fn erase_color(&self, color: Rgba8) -> Result<()> {
        let mut raster = self.write()?;
        raster.pixels.fill(color);
        Ok(())
    }

    /// Reads a single pixel. `None` when out of bounds or recycled.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        let raster = self.inner.read();
        if x >= raster.width || y >= raster.height {
            return None;
        }
        raster
            .pixels
            .get(y as usize * raster.width as usize + x as usize)
            .copied()
    }

    /// Copies the pixels out. Empty once recycled.
    pub fn to_pixels(&self) -> Vec<Rgba8> {
        self.inner.read().pixels.clone()
    }

    /// Copies the pixels out as tightly packed RGBA bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.inner.read().pixels).to_vec()
    }

    /// Locks the storage for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Raster> {
        self.inner.read()
    }

    /// Locks the storage for writing, rejecting recycled or immutable
    /// bitmaps.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Raster>> {
        let raster = self.inner.write();
        if raster.recycled {
            return Err(BlurError::Recycled);
        }
        if !raster.mutable {
            return Err(BlurError::Immutable);
        }
        Ok(raster)
    }
}

/// Returns a mutable `width`×`height` bitmap, reusing `bitmap` when possible.
///
/// The previous bitmap is reused in place, cleared to transparent, when it
/// is present, not recycled, mutable and already the requested size.
/// Otherwise it is recycled (if still live) and a new bitmap is allocated.
pub fn acquire(bitmap: Option<Bitmap>, width: u32, height: u32) -> Result<Bitmap> {
    if width == 0 || height == 0 {
        return Err(BlurError::InvalidDimensions { width, height });
    }

    if let Some(bitmap) = bitmap {
        {
            let mut raster = bitmap.inner.write();
            if !raster.recycled && raster.mutable && raster.width == width && raster.height == height
            {
                raster.pixels.fill(Rgba8::TRANSPARENT);
                drop(raster);
                return Ok(bitmap);
            }
        }
        trace!("Reallocating {width}x{height} bitmap");
        bitmap.recycle();
    }

    Bitmap::new(width, height)
}

//! Portable blur path: a compute context owning transient pixel allocations
//! and a reusable Gaussian blur script.
//!
//! ## Usage
//!
//! [`ComputeStrategy`] is driven by the [`BlurEngine`](super::BlurEngine).
//! The lower-level [`ComputeContext`] and [`BlurScript`] follow the usual
//! allocate, bind, dispatch, copy-out sequence:
//!
//! ```
//! use blurview::bitmap::{Bitmap, Rgba8};
//! use blurview::engine::compute::{BlurScript, ComputeContext};
//!
//! # fn main() -> blurview::Result<()> {
//! let capture = Bitmap::new(16, 16)?;
//! capture.erase_color(Rgba8::WHITE)?;
//!
//! let mut context = ComputeContext::create();
//! let mut script = BlurScript::create(&context)?;
//! let input = context.create_from_bitmap(&capture)?;
//! let output = context.create_typed_like(input)?;
//! script.set_radius(4.0)?;
//! script.set_input(input);
//! script.for_each(&mut context, output)?;
//!
//! let result = Bitmap::new(16, 16)?;
//! context.copy_to(output, &result)?;
//! context.destroy_allocation(input)?;
//! context.destroy_allocation(output)?;
//! assert_eq!(context.live_allocations(), 0);
//! assert_eq!(result.pixel(8, 8), Some(Rgba8::WHITE));
//! # Ok(())
//! # }
//! ```

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::{
    BlurOutput, BlurRequest, BlurStrategy,
    kernel::{BlurScratch, GaussianKernel, blur_separable},
};
use crate::{
    bitmap::{self, Bitmap, Rgba8},
    config::is_valid_blur_radius,
    error::{BlurError, Result},
    render_node::TileMode,
};

/// Handle to an allocation owned by a [`ComputeContext`].
pub type AllocationRef = usize;

/// A typed 2D buffer of RGBA8 elements.
#[derive(Debug, Clone)]
pub struct Allocation {
    width: u32,
    height: u32,
    pixels: Vec<Rgba8>,
}

impl Allocation {
    /// Width in elements.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in elements.
    pub fn height(&self) -> u32 {
        self.height
    }

    fn shape(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Debug, Default)]
struct AllocationManager {
    idx: usize,
    allocations: FxHashMap<AllocationRef, Allocation>,
}

impl AllocationManager {
    fn clear(&mut self) {
        self.idx = 0;
        self.allocations.clear();
    }

    fn push(&mut self, allocation: Allocation) -> AllocationRef {
        let id = self.idx;
        self.allocations.insert(id, allocation);
        self.idx += 1;
        id
    }

    fn get(&self, id: AllocationRef) -> Option<&Allocation> {
        self.allocations.get(&id)
    }

    fn take(&mut self, id: AllocationRef) -> Option<Allocation> {
        self.allocations.remove(&id)
    }

    fn put_back(&mut self, id: AllocationRef, allocation: Allocation) {
        self.allocations.insert(id, allocation);
    }

    fn len(&self) -> usize {
        self.allocations.len()
    }
}

/// Owner of compute allocations and the scratch memory blur scripts run in.
#[derive(Debug, Default)]
pub struct ComputeContext {
    allocations: AllocationManager,
    scratch: BlurScratch,
    destroyed: bool,
}

impl ComputeContext {
    /// Creates a live context.
    pub fn create() -> Self {
        debug!("Creating compute context");
        Self::default()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.destroyed {
            return Err(BlurError::ContextDestroyed);
        }
        Ok(())
    }

    /// Copies `bitmap` into a new allocation of the same shape.
    pub fn create_from_bitmap(&mut self, bitmap: &Bitmap) -> Result<AllocationRef> {
        self.ensure_live()?;
        let raster = bitmap.read();
        if raster.is_recycled() {
            return Err(BlurError::Recycled);
        }
        let allocation = Allocation {
            width: raster.width(),
            height: raster.height(),
            pixels: raster.pixels().to_vec(),
        };
        drop(raster);
        Ok(self.allocations.push(allocation))
    }

    /// Allocates a zeroed allocation with the same shape as `like`.
    pub fn create_typed_like(&mut self, like: AllocationRef) -> Result<AllocationRef> {
        self.ensure_live()?;
        let (width, height) = self
            .allocations
            .get(like)
            .map(Allocation::shape)
            .ok_or(BlurError::UnknownAllocation(like))?;
        let pixels = bitmap::allocate_pixels(width, height)?;
        Ok(self.allocations.push(Allocation {
            width,
            height,
            pixels,
        }))
    }

    /// Copies an allocation's elements into `bitmap`, which must have the
    /// same shape.
    pub fn copy_to(&self, id: AllocationRef, bitmap: &Bitmap) -> Result<()> {
        self.ensure_live()?;
        let allocation = self
            .allocations
            .get(id)
            .ok_or(BlurError::UnknownAllocation(id))?;
        let mut raster = bitmap.write()?;
        let found = (raster.width(), raster.height());
        if found != allocation.shape() {
            return Err(BlurError::ShapeMismatch {
                expected: allocation.shape(),
                found,
            });
        }
        raster.pixels_mut().copy_from_slice(&allocation.pixels);
        Ok(())
    }

    /// Frees an allocation.
    pub fn destroy_allocation(&mut self, id: AllocationRef) -> Result<()> {
        self.allocations
            .take(id)
            .map(drop)
            .ok_or(BlurError::UnknownAllocation(id))
    }

    /// Number of allocations not yet destroyed.
    pub fn live_allocations(&self) -> usize {
        self.allocations.len()
    }

    /// Frees every allocation. Further use fails with
    /// [`BlurError::ContextDestroyed`].
    pub fn destroy(&mut self) {
        self.allocations.clear();
        self.scratch.release();
        self.destroyed = true;
    }

    /// Whether [`ComputeContext::destroy`] has been called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

/// A Gaussian blur kernel bound to an input allocation.
///
/// Created once per context; the radius can be changed between runs.
#[derive(Debug)]
pub struct BlurScript {
    radius: f32,
    kernel: GaussianKernel,
    input: Option<AllocationRef>,
}

impl BlurScript {
    /// Creates a script for `context`, with a radius of 5.
    pub fn create(context: &ComputeContext) -> Result<Self> {
        context.ensure_live()?;
        let radius = 5.0;
        Ok(Self {
            radius,
            kernel: GaussianKernel::from_radius(radius),
            input: None,
        })
    }

    /// Sets the blur radius, in `(0, 25]`.
    pub fn set_radius(&mut self, radius: f32) -> Result<()> {
        if !is_valid_blur_radius(radius) {
            return Err(BlurError::InvalidBlurRadius(radius));
        }
        if radius != self.radius {
            self.radius = radius;
            self.kernel = GaussianKernel::from_radius(radius);
        }
        Ok(())
    }

    /// The current radius.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Binds the allocation read by [`BlurScript::for_each`].
    pub fn set_input(&mut self, input: AllocationRef) {
        self.input = Some(input);
    }

    /// Blurs the bound input into `output`.
    pub fn for_each(&mut self, context: &mut ComputeContext, output: AllocationRef) -> Result<()> {
        context.ensure_live()?;
        let input = self.input.ok_or(BlurError::UnknownAllocation(output))?;
        let mut target = context
            .allocations
            .take(output)
            .ok_or(BlurError::UnknownAllocation(output))?;

        let copied = match context.allocations.get(input) {
            Some(source) if source.shape() == target.shape() => {
                target.pixels.copy_from_slice(&source.pixels);
                Ok(())
            }
            Some(source) => Err(BlurError::ShapeMismatch {
                expected: source.shape(),
                found: target.shape(),
            }),
            None if input == output => Ok(()),
            None => Err(BlurError::UnknownAllocation(input)),
        };

        if copied.is_ok() {
            let (width, height) = (target.width as usize, target.height as usize);
            blur_separable(
                &mut target.pixels,
                width,
                height,
                &self.kernel,
                &self.kernel,
                TileMode::Clamp,
                &mut context.scratch,
            );
        }
        context.allocations.put_back(output, target);
        copied
    }
}

/// Blur strategy running the compute script over the capture buffer.
#[derive(Debug, Default)]
pub struct ComputeStrategy {
    context: Option<ComputeContext>,
    script: Option<BlurScript>,
    result: Option<Bitmap>,
}

impl ComputeStrategy {
    /// Whether the compute context is live.
    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    /// The current blurred bitmap.
    pub fn result(&self) -> Option<&Bitmap> {
        self.result.as_ref()
    }

    fn run(
        context: &mut ComputeContext,
        script: &mut BlurScript,
        capture: &Bitmap,
        radius: f32,
        previous: Option<Bitmap>,
    ) -> Result<Bitmap> {
        let input = context.create_from_bitmap(capture)?;
        let output = match context.create_typed_like(input) {
            Ok(output) => output,
            Err(err) => {
                context.destroy_allocation(input)?;
                return Err(err);
            }
        };

        let blurred = script
            .set_radius(radius)
            .and_then(|()| {
                script.set_input(input);
                script.for_each(context, output)
            })
            .and_then(|()| bitmap::acquire(previous, capture.width(), capture.height()))
            .and_then(|result| context.copy_to(output, &result).map(|()| result));

        context.destroy_allocation(input)?;
        context.destroy_allocation(output)?;
        blurred
    }
}

impl BlurStrategy for ComputeStrategy {
    fn produce(&mut self, capture: &Bitmap, request: &BlurRequest) -> Result<bool> {
        let context = self.context.get_or_insert_with(ComputeContext::create);
        let script = match self.script.as_mut() {
            Some(script) => script,
            None => self.script.insert(BlurScript::create(context)?),
        };

        let previous = self.result.take();
        let previous_identity = previous.clone();
        let result = match Self::run(context, script, capture, request.blur_radius, previous) {
            Ok(result) => result,
            Err(err) => {
                // Keep showing the last output unless it was already recycled.
                self.result = previous_identity.filter(|previous| !previous.is_recycled());
                return Err(err);
            }
        };
        trace!(
            "Compute blur produced {}x{} at radius {}",
            result.width(),
            result.height(),
            request.blur_radius
        );

        let changed = previous_identity.is_none_or(|previous| !Bitmap::ptr_eq(&previous, &result));
        self.result = Some(result);
        Ok(changed)
    }

    fn output(&self) -> Option<BlurOutput<'_>> {
        self.result.as_ref().map(BlurOutput::Bitmap)
    }

    fn discard(&mut self) {
        if let Some(result) = self.result.take() {
            result.recycle();
        }
    }

    fn release(&mut self) {
        self.discard();
        self.script = None;
        if let Some(mut context) = self.context.take() {
            context.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::px::PxSize;

    fn request(blur_radius: f32) -> BlurRequest {
        BlurRequest {
            blur_radius,
            in_sample_size: 1,
            view_size: PxSize::ZERO,
        }
    }

    fn capture(width: u32, height: u32) -> Bitmap {
        match Bitmap::new(width, height) {
            Ok(bitmap) => bitmap,
            Err(err) => panic!("allocation failed: {err}"),
        }
    }

    #[test]
    fn produce_pools_the_result_and_frees_allocations() {
        let mut strategy = ComputeStrategy::default();
        let input = capture(50, 50);
        assert!(input.erase_color(Rgba8::WHITE).is_ok());

        assert_eq!(strategy.produce(&input, &request(16.0)), Ok(true));
        let first = match strategy.result() {
            Some(result) => result.clone(),
            None => panic!("missing result"),
        };
        assert_eq!((first.width(), first.height()), (50, 50));
        assert_eq!(first.pixel(25, 25), Some(Rgba8::WHITE));
        assert_eq!(
            strategy.context.as_ref().map(ComputeContext::live_allocations),
            Some(0)
        );

        assert_eq!(strategy.produce(&input, &request(8.0)), Ok(false));
        assert!(strategy.result().is_some_and(|result| Bitmap::ptr_eq(result, &first)));

        assert_eq!(strategy.produce(&capture(20, 10), &request(8.0)), Ok(true));
        assert!(first.is_recycled());
    }

    #[test]
    fn failed_run_keeps_the_previous_result() {
        let mut strategy = ComputeStrategy::default();
        let input = capture(8, 8);
        assert!(input.erase_color(Rgba8::WHITE).is_ok());
        assert_eq!(strategy.produce(&input, &request(4.0)), Ok(true));
        let first = strategy.result().cloned();

        assert_eq!(
            strategy.produce(&input, &request(30.0)),
            Err(BlurError::InvalidBlurRadius(30.0))
        );
        let (Some(first), Some(kept)) = (first, strategy.result()) else {
            panic!("result was dropped");
        };
        assert!(Bitmap::ptr_eq(kept, &first));
        assert!(!kept.is_recycled());
        assert_eq!(kept.pixel(4, 4), Some(Rgba8::WHITE));
        assert!(strategy.output().is_some());
        assert_eq!(
            strategy.context.as_ref().map(ComputeContext::live_allocations),
            Some(0)
        );

        assert!(strategy.produce(&input, &request(4.0)).is_ok_and(|changed| !changed));
    }

    #[test]
    fn release_destroys_context_and_result() {
        let mut strategy = ComputeStrategy::default();
        assert_eq!(strategy.produce(&capture(4, 4), &request(2.0)), Ok(true));
        let result = strategy.result().cloned();
        strategy.release();
        assert!(!strategy.has_context());
        assert!(strategy.output().is_none());
        assert!(result.is_some_and(|result| result.is_recycled()));
        strategy.release();
    }

    #[test]
    fn destroyed_context_rejects_work() {
        let mut context = ComputeContext::create();
        let bitmap = capture(2, 2);
        context.destroy();
        assert_eq!(
            context.create_from_bitmap(&bitmap),
            Err(BlurError::ContextDestroyed)
        );
        assert!(BlurScript::create(&context).is_err());
    }

    #[test]
    fn script_rejects_out_of_range_radius() {
        let context = ComputeContext::create();
        let mut script = match BlurScript::create(&context) {
            Ok(script) => script,
            Err(err) => panic!("script creation failed: {err}"),
        };
        assert_eq!(script.set_radius(0.0), Err(BlurError::InvalidBlurRadius(0.0)));
        assert_eq!(script.set_radius(26.0), Err(BlurError::InvalidBlurRadius(26.0)));
        assert_eq!(script.radius(), 5.0);
    }

    #[test]
    fn copy_to_checks_shape() {
        let mut context = ComputeContext::create();
        let input = match context.create_from_bitmap(&capture(3, 3)) {
            Ok(input) => input,
            Err(err) => panic!("allocation failed: {err}"),
        };
        assert_eq!(
            context.copy_to(input, &capture(2, 3)),
            Err(BlurError::ShapeMismatch {
                expected: (3, 3),
                found: (2, 3),
            })
        );
        assert_eq!(
            context.destroy_allocation(input + 1),
            Err(BlurError::UnknownAllocation(input + 1))
        );
    }
}

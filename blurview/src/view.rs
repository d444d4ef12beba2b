//! The blur view façade: properties, attach/detach, the update cycle and
//! the draw call.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use blurview::host::{HostView, ViewId};
//! use blurview::px::{Px, PxPosition, PxSize};
//! use blurview::{BlurConfig, BlurView, LifecycleState};
//!
//! struct Panel;
//!
//! impl HostView for Panel {
//!     fn id(&self) -> ViewId {
//!         ViewId(7)
//!     }
//!     fn location_in_window(&self) -> PxPosition {
//!         PxPosition::new(Px(0), Px(100))
//!     }
//!     fn size(&self) -> PxSize {
//!         PxSize::new(Px(320), Px(120))
//!     }
//! }
//!
//! let view = BlurView::new(Arc::new(Panel), BlurConfig::default());
//! view.set_blur_radius(8.0);
//! view.set_blur_radius(40.0);
//! assert_eq!(view.blur_radius(), 8.0);
//! assert_eq!(view.lifecycle(), LifecycleState::Detached);
//! ```

use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, error, trace};

use crate::{
    bitmap::Bitmap,
    canvas::Canvas,
    capture::{exclusion_rects, local_bounds},
    config::BlurConfig,
    engine::{BlurOutput, BlurStrategyKind},
    error::Result,
    host::{HostView, ListenerId, OnPreDrawListener, ReferenceSurface, ViewId, ViewTree},
    pipeline::{CycleOutcome, CycleState, LifecycleState, Pipeline, PipelineResources, SkipReason},
};

struct Attachment {
    tree: Arc<dyn ViewTree>,
    reference: Option<Weak<dyn ReferenceSurface>>,
    listener: Option<ListenerId>,
}

/// Runs an update before every frame while the view is alive.
struct PreDrawHook {
    view: Weak<BlurView>,
}

impl OnPreDrawListener for PreDrawHook {
    fn on_pre_draw(&self) -> bool {
        if let Some(view) = self.view.upgrade() {
            view.update_logged(false);
        }
        true
    }
}

/// Clears the updating flag when the cycle ends, including on early return.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A view that shows a blurred copy of the window content behind it.
///
/// Shared as `Arc<BlurView>`: the pre-draw hook and posted updates hold weak
/// references back to it.
pub struct BlurView {
    this: Weak<BlurView>,
    host: Arc<dyn HostView>,
    config: RwLock<BlurConfig>,
    exclusions: DashMap<ViewId, Arc<dyn HostView>>,
    attachment: Mutex<Option<Attachment>>,
    pipeline: Mutex<Pipeline>,
    updating: AtomicBool,
    pending_update: AtomicBool,
}

impl BlurView {
    /// Creates a detached view laid out as `host`.
    pub fn new(host: Arc<dyn HostView>, config: BlurConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            host,
            config: RwLock::new(config),
            exclusions: DashMap::new(),
            attachment: Mutex::new(None),
            pipeline: Mutex::new(Pipeline::default()),
            updating: AtomicBool::new(false),
            pending_update: AtomicBool::new(false),
        })
    }

    /// Creates a view from optional styled attributes, falling back to the
    /// defaults for missing or invalid values.
    pub fn with_attributes(
        host: Arc<dyn HostView>,
        blur_radius: Option<f32>,
        in_sample_size: Option<i32>,
    ) -> Arc<Self> {
        Self::new(host, BlurConfig::from_attributes(blur_radius, in_sample_size))
    }

    /// The host view this blur view is laid out as.
    pub fn host(&self) -> &Arc<dyn HostView> {
        &self.host
    }

    /// The current configuration.
    pub fn config(&self) -> BlurConfig {
        *self.config.read()
    }

    /// Blur radius in downsampled pixels.
    pub fn blur_radius(&self) -> f32 {
        self.config.read().blur_radius()
    }

    /// Sets the blur radius.
    ///
    /// Values outside `(0, 25]` and the current value are ignored; anything
    /// else schedules an update and a redraw.
    pub fn set_blur_radius(&self, blur_radius: f32) {
        if self.config.write().update_blur_radius(blur_radius) {
            self.schedule_update();
        }
    }

    /// Downsampling factor applied before blurring.
    pub fn in_sample_size(&self) -> u32 {
        self.config.read().in_sample_size()
    }

    /// Sets the downsampling factor.
    ///
    /// Values below 1 and the current value are ignored; anything else
    /// schedules an update and a redraw.
    pub fn set_in_sample_size(&self, in_sample_size: i32) {
        if self.config.write().update_in_sample_size(in_sample_size) {
            self.schedule_update();
        }
    }

    /// Views whose area shows the unblurred content, in no particular order.
    pub fn exclusions(&self) -> Vec<Arc<dyn HostView>> {
        self.exclusions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Replaces the exclusion set. Duplicate ids collapse to one entry.
    ///
    /// Setting the same set of views again does nothing.
    pub fn set_exclusions<I>(&self, views: I)
    where
        I: IntoIterator<Item = Arc<dyn HostView>>,
    {
        let incoming: FxHashMap<ViewId, Arc<dyn HostView>> =
            views.into_iter().map(|view| (view.id(), view)).collect();
        let current: FxHashSet<ViewId> = self.exclusions.iter().map(|entry| *entry.key()).collect();
        let unchanged =
            current.len() == incoming.len() && incoming.keys().all(|id| current.contains(id));
        if unchanged {
            return;
        }

        self.exclusions.clear();
        for (id, view) in incoming {
            self.exclusions.insert(id, view);
        }
        self.schedule_update();
    }

    /// Attach state.
    pub fn lifecycle(&self) -> LifecycleState {
        if self.attachment.lock().is_some() {
            LifecycleState::Attached
        } else {
            LifecycleState::Detached
        }
    }

    /// Whether an update cycle is running.
    pub fn cycle_state(&self) -> CycleState {
        if self.updating.load(Ordering::Acquire) {
            CycleState::Updating
        } else {
            CycleState::Idle
        }
    }

    /// Which pipeline resources are currently held.
    pub fn resources(&self) -> PipelineResources {
        self.pipeline.lock().resources()
    }

    /// The strategy that produced the current output.
    pub fn active_strategy(&self) -> Option<BlurStrategyKind> {
        self.pipeline.lock().active_strategy()
    }

    /// Whether an output is ready to be drawn.
    pub fn has_output(&self) -> bool {
        self.pipeline.lock().output().is_some()
    }

    /// A handle to the blurred bitmap when the compute path produced the
    /// current output.
    pub fn output_bitmap(&self) -> Option<Bitmap> {
        match self.pipeline.lock().output() {
            Some(BlurOutput::Bitmap(bitmap)) => Some(bitmap.clone()),
            _ => None,
        }
    }

    /// Hooks the view into `tree`: resolves the reference surface and
    /// registers the pre-draw listener.
    ///
    /// Attaching an already attached view detaches it first.
    pub fn on_attached_to_window(&self, tree: Arc<dyn ViewTree>) {
        if self.lifecycle() == LifecycleState::Attached {
            self.on_detached_from_window();
        }

        let reference = tree.reference_surface();
        let listener = reference.as_ref().map(|_| {
            tree.add_on_pre_draw_listener(Arc::new(PreDrawHook {
                view: self.this.clone(),
            }))
        });
        if reference.is_none() {
            debug!("Attached without a reference surface; blur stays idle");
        }
        *self.attachment.lock() = Some(Attachment {
            tree,
            reference: reference.as_ref().map(Arc::downgrade),
            listener,
        });
        debug!("Blur view {:?} attached", self.host.id());

        if self.pending_update.swap(false, Ordering::AcqRel) {
            self.schedule_update();
        }
    }

    /// Unregisters the listener and releases every pipeline resource.
    ///
    /// Safe to call repeatedly.
    pub fn on_detached_from_window(&self) {
        if let Some(attachment) = self.attachment.lock().take() {
            if let Some(listener) = attachment.listener {
                attachment.tree.remove_on_pre_draw_listener(listener);
            }
            debug!("Blur view {:?} detached", self.host.id());
        }
        self.pipeline.lock().release();
    }

    /// Runs one capture and blur cycle.
    ///
    /// Requests a redraw when `invalidate` is set or the output moved to a
    /// new buffer. Skipped cycles keep the previous output.
    pub fn update(&self, invalidate: bool) -> Result<CycleOutcome> {
        let (tree, reference) = {
            let attachment = self.attachment.lock();
            let Some(attachment) = attachment.as_ref() else {
                return Ok(CycleOutcome::Skipped(SkipReason::Detached));
            };
            (
                attachment.tree.clone(),
                attachment.reference.as_ref().and_then(Weak::upgrade),
            )
        };
        let Some(reference) = reference else {
            trace!("No reference surface, skipping cycle");
            return Ok(CycleOutcome::Skipped(SkipReason::NoReferenceSurface));
        };

        if self
            .updating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(CycleOutcome::Skipped(SkipReason::Reentrant));
        }
        let outcome = {
            let _guard = CycleGuard(&self.updating);
            let exclusions = self.exclusions();
            self.pipeline.lock().run_cycle(
                self.host.as_ref(),
                reference.as_ref(),
                &exclusions,
                self.config(),
                tree.capabilities(),
            )?
        };

        if let CycleOutcome::Completed { changed, .. } = outcome {
            if invalidate || changed {
                tree.invalidate(self.host.id());
            }
        }
        Ok(outcome)
    }

    /// Composites the blurred output into `canvas` in view-local
    /// coordinates. Does nothing while an update is running.
    pub fn draw(&self, canvas: &mut dyn Canvas) {
        if self.updating.load(Ordering::Acquire) {
            return;
        }
        let size = self.host.size();
        let bounds = local_bounds(size.width, size.height);
        let exclusions = exclusion_rects(&self.exclusions(), self.host.as_ref());
        self.pipeline.lock().draw(canvas, bounds, &exclusions);
    }

    fn update_logged(&self, invalidate: bool) {
        if let Err(err) = self.update(invalidate) {
            error!("Blur update failed: {err}");
        }
    }

    fn schedule_update(&self) {
        let tree = self
            .attachment
            .lock()
            .as_ref()
            .map(|attachment| attachment.tree.clone());
        let Some(tree) = tree else {
            trace!("Deferring update until attach");
            self.pending_update.store(true, Ordering::Release);
            return;
        };
        let view = self.this.clone();
        tree.post(Box::new(move || {
            if let Some(view) = view.upgrade() {
                view.update_logged(true);
            }
        }));
    }
}

impl Drop for BlurView {
    fn drop(&mut self) {
        let Some(attachment) = self.attachment.get_mut().take() else {
            return;
        };
        if let Some(listener) = attachment.listener {
            attachment.tree.remove_on_pre_draw_listener(listener);
        }
    }
}

//! blurview renders a live blur of the window content behind a view.
//!
//! # Pipeline
//!
//! Before each frame the host's pre-draw callback runs one update cycle:
//!
//! 1. The reference surface (the window's root content) is drawn into a
//!    capture buffer, cropped to the view's bounds and downsampled by the
//!    sample size. Excluded views are cleared out of the capture.
//! 2. The capture is blurred, either by a separable Gaussian on the CPU or,
//!    when the host can composite render effects, by recording it into a
//!    render node carrying a blur effect.
//! 3. When the view draws, the output is scaled back up into a layer over
//!    its bounds and the excluded regions are punched out again.
//!
//! # Usage
//!
//! The host implements the traits in [`host`] and forwards lifecycle calls:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use blurview::host::{HostView, ViewTree};
//! use blurview::{BlurConfig, BlurView, RasterCanvas};
//!
//! fn show(panel: Arc<dyn HostView>, window: Arc<dyn ViewTree>, toolbar: Arc<dyn HostView>) {
//!     let view = BlurView::new(panel, BlurConfig::default());
//!     view.set_exclusions([toolbar]);
//!     view.on_attached_to_window(window);
//!
//!     // The host calls `draw` while rendering the frame.
//!     let mut canvas = RasterCanvas::new();
//!     view.draw(&mut canvas);
//!
//!     view.on_detached_from_window();
//! }
//! ```
//!
//! # Logging
//!
//! Events are emitted through `tracing`. Applications without a subscriber
//! can call [`logging::init_tracing`].

#![deny(missing_docs, clippy::unwrap_used)]

pub mod bitmap;
pub mod canvas;
mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod host;
pub mod logging;
mod pipeline;
pub mod px;
pub mod render_node;
mod view;


pub use crate::{
    bitmap::{Bitmap, Rgba8},
    canvas::{BlendMode, Canvas, FilterQuality, Paint, RasterCanvas},
    capture::SnapshotCapture,
    config::{BlurConfig, DEFAULT_BLUR_RADIUS, DEFAULT_IN_SAMPLE_SIZE, MAX_BLUR_RADIUS},
    engine::{BlurEngine, BlurOutput, BlurStrategy, BlurStrategyKind},
    error::{BlurError, Result},
    pipeline::{CycleOutcome, CycleState, LifecycleState, PipelineResources, SkipReason},
    render_node::{RenderEffect, RenderNode, TileMode},
    view::BlurView,
};

//! Browser DOM layer for weaver highlights.
//!
//! Binds the platform-free engine in `weaver-highlight` to a live page. It
//! assumes a `wasm32-unknown-unknown` target environment.
//!
//! # Architecture
//!
//! - `surface`: `LayoutSurface` over the content root and scroll container
//! - `selection`: DOM selection to child-index paths
//! - `scheduler`: timeout and animation-frame handles, cancelled on drop
//! - `watch`: image load/error and resize listeners that re-trigger measurement
//! - `driver`: alignment controller wired to timers, frames and listeners
//! - `interaction`: marker hit-testing for click cycling
//! - `logging`: tracing subscriber setup
//!
//! # Tree paths
//!
//! Selection paths are resolved against a parsed copy of the markup that is
//! *currently in the page*, i.e. the rendered output including markers and
//! anchors. Markers are inline and anchors are hidden, so that copy produces
//! the same canonical text as the unrendered markup.
//!
//! # Re-exports
//!
//! This crate re-exports `weaver-highlight` for convenience, so consumers
//! only need to depend on `weaver-highlight-browser`.

pub use weaver_highlight;
pub use weaver_highlight::*;

pub mod driver;
pub mod interaction;
pub mod logging;
pub mod scheduler;
pub mod selection;
pub mod surface;
pub mod watch;

pub use driver::AlignmentDriver;
pub use interaction::{DomFocusState, MarkerHit, handle_click, marker_from_target};
pub use logging::init_tracing;
pub use scheduler::{AnimationFrame, Timeout};
pub use selection::{DomSelectionSource, path_from_root};
pub use surface::DomLayoutSurface;
pub use watch::{ImageWatcher, ResizeWatcher};

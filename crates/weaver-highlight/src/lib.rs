//! weaver-highlight: offset-based highlights over rendered documents.
//!
//! Platform-free core of the highlight engine. This crate provides:
//! - `canonical` - the codepoint-indexed text every offset refers to
//! - `segment` - overlapping ranges flattened into disjoint segments
//! - `render` - segments applied to markup as marker elements, with a memo `cache`
//! - `selection` - host selections converted back into canonical offsets
//! - `align` - two-phase annotation row alignment, driven by `schedule`
//! - `focus` - click-cycling focus state
//!
//! Platform glue implements the traits in `platform`.

pub mod align;
pub mod cache;
pub mod canonical;
pub mod config;
pub mod error;
pub mod focus;
pub mod platform;
pub mod render;
pub mod schedule;
pub mod segment;
pub mod selection;
pub mod text;
pub mod tree;
pub mod types;

pub use align::{
    AlignedRow, AlignedRows, AlignmentController, AnchorPositions, MeasureTrigger, Measurement,
    clamp_scroll, compute_rows, measure, scroll_target,
};
pub use cache::{CacheKey, CacheStats, EvictionPolicy, Fifo, Lru, RenderCache, ranges_hash};
pub use canonical::{CanonicalText, MappingEntry};
pub use config::{HighlightConfig, RowLayout, SelectionLimits};
pub use error::{ConfigError, RangeRejection, RenderFailure, SelectionError, SelectionErrorKind};
pub use focus::FocusState;
pub use platform::{LayoutSurface, PathSelection, PlatformError, SelectionSource};
pub use render::{RenderOutput, parse_active_ids, render};
pub use schedule::{Debouncer, FrameThrottle};
pub use segment::{DroppedRange, Segmentation, segment};
pub use selection::{CanonicalDocument, SelectedRange, SelectionPoint, TreeSelection, find_duplicate};
pub use smol_str::SmolStr;
pub use tree::NodePath;
pub use types::{Highlight, HighlightColor, HighlightRange, Segment, topmost_order};

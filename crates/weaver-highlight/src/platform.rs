//! Platform abstraction traits for layout reads and selection capture.
//!
//! These traits define the interface between the engine and a rendering
//! surface (browser DOM, a native view, a test fake). Everything else in the
//! crate stays free of platform types.

use crate::selection::TreeSelection;
use crate::tree::NodePath;
use scraper::Html;

/// Error type for platform operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError(pub String);

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PlatformError {}

impl From<&str> for PlatformError {
    fn from(s: &str) -> Self {
        PlatformError(s.to_string())
    }
}

impl From<String> for PlatformError {
    fn from(s: String) -> Self {
        PlatformError(s)
    }
}

/// Read-only layout queries used by the measurement phase.
///
/// All tops are viewport-relative, in CSS pixels. Implementations must not
/// mutate layout; measurement may run many times per second.
pub trait LayoutSurface {
    /// Viewport-relative top of the content root.
    fn content_top(&self) -> f64;

    /// Current vertical scroll offset of the scroll container.
    fn scroll_top(&self) -> f64;

    /// Viewport-relative top of the anchor marker for `id`, if rendered.
    fn anchor_top(&self, id: &str) -> Option<f64>;

    /// Visible height of the scroll container.
    fn viewport_height(&self) -> f64;

    /// Total scrollable height of the scroll container.
    fn scroll_height(&self) -> f64;
}

/// A host selection described as child-index paths from the content root.
///
/// Offsets follow the host convention: UTF-16 code units for text nodes,
/// child indices for elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSelection {
    pub anchor_path: NodePath,
    pub anchor_offset: usize,
    pub focus_path: NodePath,
    pub focus_offset: usize,
}

impl PathSelection {
    /// Resolve against a parsed copy of the same markup.
    pub fn resolve(&self, html: &Html) -> Option<TreeSelection> {
        TreeSelection::from_paths(
            html,
            &self.anchor_path,
            self.anchor_offset,
            &self.focus_path,
            self.focus_offset,
        )
    }
}

/// Platform-specific selection capture.
pub trait SelectionSource {
    /// The current selection inside the content root.
    ///
    /// `Ok(None)` when nothing is selected or the selection lies elsewhere.
    fn read_selection(&self) -> Result<Option<PathSelection>, PlatformError>;
}

//! DOM layout reads for the measurement phase.

use weaver_highlight::LayoutSurface;
use weaver_highlight::render::ATTR_ANCHOR_ID;

/// Layout surface over a rendered content root inside a scroll container.
///
/// The two may be the same element.
#[derive(Debug, Clone)]
pub struct DomLayoutSurface {
    content_root: web_sys::Element,
    scroll_container: web_sys::Element,
}

impl DomLayoutSurface {
    pub fn new(content_root: web_sys::Element, scroll_container: web_sys::Element) -> Self {
        Self {
            content_root,
            scroll_container,
        }
    }

    pub fn content_root(&self) -> &web_sys::Element {
        &self.content_root
    }

    pub fn scroll_container(&self) -> &web_sys::Element {
        &self.scroll_container
    }

    /// Scroll the container to `top`.
    pub fn scroll_to(&self, top: f64) {
        self.scroll_container.set_scroll_top(top.round() as i32);
    }

    fn find_anchor(&self, id: &str) -> Option<web_sys::Element> {
        let selector = format!("[{}=\"{}\"]", ATTR_ANCHOR_ID, escape_attr_value(id));
        match self.content_root.query_selector(&selector) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    target: "weaver::highlight::align",
                    id,
                    error = ?e,
                    "anchor lookup failed"
                );
                None
            }
        }
    }
}

impl LayoutSurface for DomLayoutSurface {
    fn content_top(&self) -> f64 {
        self.content_root.get_bounding_client_rect().top()
    }

    fn scroll_top(&self) -> f64 {
        self.scroll_container.scroll_top() as f64
    }

    fn anchor_top(&self, id: &str) -> Option<f64> {
        self.find_anchor(id)
            .map(|anchor| anchor.get_bounding_client_rect().top())
    }

    fn viewport_height(&self) -> f64 {
        self.scroll_container.client_height() as f64
    }

    fn scroll_height(&self) -> f64 {
        self.scroll_container.scroll_height() as f64
    }
}

/// Escape a value for use inside a double-quoted CSS attribute selector.
fn escape_attr_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

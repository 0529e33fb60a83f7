//! Marker hit-testing for clicks.

use smol_str::SmolStr;
use wasm_bindgen::JsCast;
use weaver_highlight::FocusState;
use weaver_highlight::render::{ATTR_ACTIVE_IDS, ATTR_TOPMOST_ID, parse_active_ids};

/// Focus state keyed by the clicked marker element.
pub type DomFocusState = FocusState<web_sys::Element>;

/// The segment marker under a click.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerHit {
    pub element: web_sys::Element,
    pub active_ids: Vec<SmolStr>,
    pub topmost: SmolStr,
}

/// Find the segment marker containing an event target.
pub fn marker_from_target(target: &web_sys::EventTarget) -> Option<MarkerHit> {
    let start = match target.dyn_ref::<web_sys::Element>() {
        Some(el) => el.clone(),
        // Text nodes are not elements; start from their parent.
        None => target.dyn_ref::<web_sys::Node>()?.parent_element()?,
    };
    let element = start
        .closest(&format!("[{ATTR_ACTIVE_IDS}]"))
        .ok()
        .flatten()?;

    let active_ids = parse_active_ids(&element.get_attribute(ATTR_ACTIVE_IDS)?);
    let topmost = element
        .get_attribute(ATTR_TOPMOST_ID)
        .map(SmolStr::from)
        .or_else(|| active_ids.first().cloned())?;

    Some(MarkerHit {
        element,
        active_ids,
        topmost,
    })
}

/// Route a click into the focus state. Clicks outside any marker clear focus.
pub fn handle_click(state: &mut DomFocusState, event: &web_sys::Event) -> Option<SmolStr> {
    let hit = event.target().as_ref().and_then(marker_from_target);
    match hit {
        Some(hit) => state
            .click(hit.element, &hit.active_ids, &hit.topmost)
            .cloned(),
        None => {
            state.clear_focus();
            None
        }
    }
}

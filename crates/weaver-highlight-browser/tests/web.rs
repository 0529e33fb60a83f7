//! WASM browser tests for weaver-highlight-browser.
//!
//! Run with: `wasm-pack test --headless --firefox` or `--chrome`

use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

use weaver_highlight_browser::weaver_highlight::selection::{CanonicalDocument, convert};
use weaver_highlight_browser::{
    DomFocusState, DomLayoutSurface, DomSelectionSource, HighlightRange, SelectionLimits,
    SelectionSource, SmolStr, marker_from_target, measure, path_from_root, render,
};

fn document() -> web_sys::Document {
    web_sys::window().unwrap().document().unwrap()
}

/// Mount markup in a fresh container appended to the body.
fn mount(markup: &str) -> web_sys::Element {
    let doc = document();
    let root = doc.create_element("div").unwrap();
    root.set_inner_html(markup);
    doc.body().unwrap().append_child(&root).unwrap();
    root
}

fn range(id: &str, start: i64, end: i64, created: u32) -> HighlightRange {
    HighlightRange {
        id: id.into(),
        start,
        end,
        color: "yellow".into(),
        created_at: format!("2024-01-01T00:00:{created:02}Z").into(),
    }
}

fn rendered(markup: &str, ranges: &[HighlightRange]) -> String {
    let doc = CanonicalDocument::parse(markup);
    render(markup, &doc.canonical().text, ranges).markup
}

// === Layout surface ===

#[wasm_bindgen_test]
fn test_surface_finds_rendered_anchors() {
    let markup = rendered("<p>Hello world</p>", &[range("a", 6, 11, 1)]);
    let root = mount(&markup);
    let surface = DomLayoutSurface::new(root.clone(), root.clone());

    let ids = [SmolStr::from("a"), SmolStr::from("missing")];
    let m = measure(&surface, &ids);
    assert!(m.positions.contains_key("a"));
    assert_eq!(m.missing, vec![SmolStr::from("missing")]);

    root.remove();
}

#[wasm_bindgen_test]
fn test_surface_escapes_quoted_ids() {
    let markup = rendered("<p>Hello world</p>", &[range("say \"hi\"", 0, 5, 1)]);
    let root = mount(&markup);
    let surface = DomLayoutSurface::new(root.clone(), root.clone());

    let m = measure(&surface, &[SmolStr::from("say \"hi\"")]);
    assert!(m.missing.is_empty());

    root.remove();
}

// === Selection capture ===

#[wasm_bindgen_test]
fn test_path_from_root() {
    let root = mount("<p>a<em>b</em></p>");
    let em_text = root
        .query_selector("em")
        .unwrap()
        .unwrap()
        .first_child()
        .unwrap();

    assert_eq!(path_from_root(&root, &em_text), Some(vec![0, 1, 0]));
    assert_eq!(path_from_root(&root, &root), Some(vec![]));

    let outside = document().create_element("span").unwrap();
    assert_eq!(path_from_root(&root, &outside), None);

    root.remove();
}

#[wasm_bindgen_test]
fn test_dom_selection_to_offsets() {
    let root = mount("<p>Hello <em>brave</em> world</p>");
    let p = root.first_child().unwrap();
    let hello = p.first_child().unwrap();
    let brave = root
        .query_selector("em")
        .unwrap()
        .unwrap()
        .first_child()
        .unwrap();

    let dom_range = document().create_range().unwrap();
    dom_range.set_start(&hello, 3).unwrap();
    dom_range.set_end(&brave, 2).unwrap();
    let selection = web_sys::window().unwrap().get_selection().unwrap().unwrap();
    selection.remove_all_ranges().unwrap();
    selection.add_range(&dom_range).unwrap();

    let paths = DomSelectionSource::new(root.clone())
        .read_selection()
        .unwrap()
        .unwrap();
    assert_eq!(paths.anchor_path, vec![0, 0]);
    assert_eq!(paths.focus_path, vec![0, 1, 0]);

    let doc = CanonicalDocument::parse(&root.inner_html());
    let stored = doc.canonical().text.clone();
    let tree_selection = paths.resolve(doc.html()).unwrap();
    let got = convert(&tree_selection, &doc, &stored, false, SelectionLimits::default()).unwrap();
    assert_eq!((got.start, got.end), (3, 8));
    assert_eq!(got.text, "lo br");

    selection.remove_all_ranges().unwrap();
    root.remove();
}

// === Click hit-testing ===

#[wasm_bindgen_test]
fn test_marker_from_text_target() {
    let markup = rendered(
        "<p>0123456789</p>",
        &[range("a", 0, 6, 1), range("b", 4, 8, 2)],
    );
    let root = mount(&markup);
    let overlap = root
        .query_selector("[data-highlight-ids=\"b a\"]")
        .unwrap()
        .unwrap();
    let text = overlap.first_child().unwrap();
    let target: &web_sys::EventTarget = text.as_ref();

    let hit = marker_from_target(target).unwrap();
    assert_eq!(hit.element, overlap);
    assert_eq!(hit.active_ids, vec![SmolStr::from("b"), SmolStr::from("a")]);
    assert_eq!(hit.topmost.as_str(), "b");

    let mut focus = DomFocusState::new();
    let first = focus
        .click(hit.element.clone(), &hit.active_ids, &hit.topmost)
        .cloned();
    let second = focus
        .click(hit.element.clone(), &hit.active_ids, &hit.topmost)
        .cloned();
    assert_eq!(first.as_deref(), Some("b"));
    assert_eq!(second.as_deref(), Some("a"));

    root.remove();
}

#[wasm_bindgen_test]
fn test_click_outside_marker() {
    let root = mount("<p>plain</p>");
    let p = root.first_child().unwrap();
    let target: &web_sys::EventTarget = p.as_ref();
    assert!(marker_from_target(target).is_none());
    root.remove();
}

//! Highlight rendering into markup.
//!
//! Parses sanitized markup into a detached tree, checks it still produces
//! the stored canonical text, then wraps every segment's text in a marker
//! element and drops one zero-width anchor per highlight in front of its
//! first marker. The detached tree is serialized and returned; the live
//! tree is never touched.
//!
//! # Markup contract
//!
//! Segment markers:
//! ```html
//! <span class="hl-segment hl-yellow" data-highlight-ids="b a" data-highlight-top="b">...</span>
//! ```
//! Anchors:
//! ```html
//! <span class="hl-anchor" data-highlight-anchor="a" aria-hidden="true"></span>
//! ```
//!
//! Rendering is idempotent: existing markers and anchors are stripped
//! before new ones are applied, so feeding the output back in with the same
//! ranges reproduces it exactly.

use std::collections::HashMap;

use ego_tree::NodeId;
use scraper::Html;
use smol_str::SmolStr;

use crate::canonical::{self, CanonicalText, MappingEntry};
use crate::error::RenderFailure;
use crate::segment::{self, Segmentation};
use crate::tree;
use crate::types::{HighlightRange, Segment};


/// Space-separated active highlight ids on a segment marker.
pub const ATTR_ACTIVE_IDS: &str = "data-highlight-ids";
/// Topmost highlight id on a segment marker.
pub const ATTR_TOPMOST_ID: &str = "data-highlight-top";
/// Highlight id on an anchor marker.
pub const ATTR_ANCHOR_ID: &str = "data-highlight-anchor";
/// Class shared by every segment marker.
pub const SEGMENT_CLASS: &str = "hl-segment";
/// Class on every anchor marker.
pub const ANCHOR_CLASS: &str = "hl-anchor";

const MARKER_TAG: &str = "span";

/// Output of [`render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    /// Transformed markup, or the input unchanged when validation failed.
    pub markup: String,
    /// Highlights that produced no marker, ordered by id.
    pub failed_ids: Vec<SmolStr>,
    /// Whether the markup still produces the stored canonical text.
    pub validation_passed: bool,
    /// Segments that were applied. Empty when validation failed.
    pub segments: Vec<Segment>,
}

/// Split an active-ids attribute value back into ids.
pub fn parse_active_ids(value: &str) -> Vec<SmolStr> {
    value.split_ascii_whitespace().map(SmolStr::from).collect()
}

/// Render `ranges` into `markup`.
///
/// Never panics. On canonical mismatch the original markup comes back
/// unchanged and every input id is reported failed.
pub fn render(markup: &str, canonical_text: &str, ranges: &[HighlightRange]) -> RenderOutput {
    let mut html = tree::parse_fragment(markup);
    strip_markers(&mut html);

    let built = canonical::build(&html);
    if !canonical::validate(&built, canonical_text) {
        // The mismatch itself was already reported by `validate`.
        tracing::debug!(
            target: "weaver::highlight::render",
            failure = %RenderFailure::Mismatch,
            ranges = ranges.len(),
            "fragment left unrendered"
        );
        return RenderOutput {
            markup: markup.to_string(),
            failed_ids: sorted_ids(ranges.iter().map(|r| r.id.clone())),
            validation_passed: false,
            segments: Vec::new(),
        };
    }

    let segmentation = segment::segment(built.length, ranges);
    let first_markers = apply_segments(&mut html, &built, &segmentation.segments);
    insert_anchors(&mut html, &first_markers);

    let failed_ids = collect_failures(&segmentation, &first_markers);

    tracing::debug!(
        target: "weaver::highlight::render",
        ranges = ranges.len(),
        segments = segmentation.segments.len(),
        anchored = first_markers.len(),
        failed = failed_ids.len(),
        "rendered highlights"
    );

    RenderOutput {
        markup: tree::serialize(&html),
        failed_ids,
        validation_passed: true,
        segments: segmentation.segments,
    }
}

fn sorted_ids(ids: impl Iterator<Item = SmolStr>) -> Vec<SmolStr> {
    let mut ids: Vec<SmolStr> = ids.collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Wrap every segment, last first, so earlier offsets stay valid while
/// later text nodes are split. Returns the lowest-offset marker per id.
fn apply_segments(
    html: &mut Html,
    built: &CanonicalText,
    segments: &[Segment],
) -> HashMap<SmolStr, NodeId> {
    let mut first_markers: HashMap<SmolStr, NodeId> = HashMap::new();

    for seg in segments.iter().rev() {
        let class = format!("{} {}", SEGMENT_CLASS, seg.topmost_color.css_class());
        let joined = seg.joined_ids();

        for entry in built.entries_overlapping(seg.start, seg.end).iter().rev() {
            if entry.in_code {
                continue;
            }
            let Some(marker) = wrap_entry(html, entry, seg, &class, &joined) else {
                tracing::debug!(
                    target: "weaver::highlight::render",
                    start = seg.start,
                    end = seg.end,
                    entry_start = entry.start,
                    entry_end = entry.end,
                    "could not split text node for segment"
                );
                continue;
            };
            // Walking backwards, so the last write per id is the lowest offset.
            for id in &seg.active_ids {
                first_markers.insert(id.clone(), marker);
            }
        }
    }

    first_markers
}

fn wrap_entry(
    html: &mut Html,
    entry: &MappingEntry,
    seg: &Segment,
    class: &str,
    joined: &str,
) -> Option<NodeId> {
    let from = entry.raw_byte_at(seg.start.max(entry.start))?;
    let to = entry.raw_byte_at(seg.end.min(entry.end))?;
    let target = isolate(html, entry.node, from, to)?;

    let marker = tree::element(
        MARKER_TAG,
        &[
            ("class", class),
            (ATTR_ACTIVE_IDS, joined),
            (ATTR_TOPMOST_ID, seg.topmost_id.as_str()),
        ],
    );
    let marker_id = html.tree.get_mut(target)?.insert_before(marker).id();
    html.tree.get_mut(marker_id)?.append_id(target);
    Some(marker_id)
}

/// Split a text node so that raw bytes `from..to` sit in a node of their own.
///
/// The original node keeps the prefix, so offsets before `from` remain
/// valid for later calls.
fn isolate(html: &mut Html, node: NodeId, from: usize, to: usize) -> Option<NodeId> {
    let text = tree::text_of(html, node)?.to_string();
    if from >= to || to > text.len() || !text.is_char_boundary(from) || !text.is_char_boundary(to)
    {
        return None;
    }

    if to < text.len() {
        tree::set_text(html, node, &text[..to]);
        html.tree.get_mut(node)?.insert_after(tree::text(&text[to..]));
    }
    if from == 0 {
        return Some(node);
    }

    tree::set_text(html, node, &text[..from]);
    let middle = html
        .tree
        .get_mut(node)?
        .insert_after(tree::text(&text[from..to]))
        .id();
    Some(middle)
}

fn insert_anchors(html: &mut Html, first_markers: &HashMap<SmolStr, NodeId>) {
    let mut ids: Vec<&SmolStr> = first_markers.keys().collect();
    ids.sort();
    for id in ids {
        let marker = first_markers[id];
        let anchor = tree::element(
            MARKER_TAG,
            &[
                ("class", ANCHOR_CLASS),
                (ATTR_ANCHOR_ID, id.as_str()),
                ("aria-hidden", "true"),
            ],
        );
        if let Some(mut node) = html.tree.get_mut(marker) {
            node.insert_before(anchor);
        }
    }
}

fn collect_failures(
    segmentation: &Segmentation,
    first_markers: &HashMap<SmolStr, NodeId>,
) -> Vec<SmolStr> {
    let dropped = segmentation
        .dropped
        .iter()
        .map(|d| (d.id.clone(), RenderFailure::Dropped(d.reason)));
    let unlocated = segmentation
        .highlights
        .iter()
        .filter(|h| !first_markers.contains_key(&h.id))
        .map(|h| (h.id.clone(), RenderFailure::NotLocated));

    let mut failures: Vec<(SmolStr, RenderFailure)> = dropped.chain(unlocated).collect();
    failures.sort_by(|a, b| a.0.cmp(&b.0));
    failures.dedup_by(|a, b| a.0 == b.0);

    for (id, failure) in &failures {
        tracing::warn!(
            target: "weaver::highlight::render",
            id = %id,
            %failure,
            "highlight not rendered"
        );
    }

    failures.into_iter().map(|(id, _)| id).collect()
}

/// Remove markers left by a previous render.
///
/// Segment markers are unwrapped, anchors are removed, and text nodes left
/// adjacent by unwrapping are merged back together.
fn strip_markers(html: &mut Html) {
    let Some(root) = tree::content_root(html).and_then(|id| html.tree.get(id)) else {
        return;
    };

    let mut anchors = Vec::new();
    let mut markers = Vec::new();
    for node in root.descendants() {
        if tree::attr_of(&node, ATTR_ANCHOR_ID).is_some() {
            anchors.push(node.id());
        } else if tree::attr_of(&node, ATTR_ACTIVE_IDS).is_some() {
            markers.push(node.id());
        }
    }
    if anchors.is_empty() && markers.is_empty() {
        return;
    }

    for id in anchors {
        if let Some(mut node) = html.tree.get_mut(id) {
            node.detach();
        }
    }
    for id in markers {
        while let Some(child) = html
            .tree
            .get(id)
            .and_then(|n| n.first_child())
            .map(|c| c.id())
        {
            match html.tree.get_mut(id) {
                Some(mut marker) => {
                    marker.insert_id_before(child);
                }
                None => break,
            }
        }
        if let Some(mut node) = html.tree.get_mut(id) {
            node.detach();
        }
    }

    merge_adjacent_text(html);
}

fn merge_adjacent_text(html: &mut Html) {
    let Some(root) = tree::content_root(html).and_then(|id| html.tree.get(id)) else {
        return;
    };
    let texts: Vec<NodeId> = root
        .descendants()
        .filter(|n| n.value().is_text())
        .map(|n| n.id())
        .collect();

    for id in texts {
        while let Some(next) = html
            .tree
            .get(id)
            .and_then(|n| n.next_sibling())
            .filter(|n| n.value().is_text())
            .map(|n| n.id())
        {
            let (Some(current), Some(extra)) = (tree::text_of(html, id), tree::text_of(html, next))
            else {
                break;
            };
            let merged = format!("{current}{extra}");
            tree::set_text(html, id, &merged);
            if let Some(mut node) = html.tree.get_mut(next) {
                node.detach();
            }
        }
    }
}

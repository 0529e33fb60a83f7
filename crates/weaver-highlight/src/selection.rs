//! Selection to canonical offset conversion.
//!
//! A host selection arrives as two points in the parsed tree: text points
//! carry a UTF-16 offset into the node's text, element points carry a child
//! index. Both are resolved against the canonical mapping, normalized for
//! direction, checked against code regions, trimmed against the stored
//! canonical text and length-checked.

use std::collections::HashMap;

use ego_tree::NodeId;
use ego_tree::iter::Edge;
use scraper::Html;
use smol_str::SmolStr;

use crate::canonical::{self, CanonicalText};
use crate::config::SelectionLimits;
use crate::error::{SelectionError, SelectionErrorKind};
use crate::text;
use crate::tree;
use crate::types::HighlightRange;

/// A parsed fragment together with its canonical text and node order.
#[derive(Debug)]
pub struct CanonicalDocument {
    html: Html,
    canonical: CanonicalText,
    /// Preorder index and subtree end for every node under the content root.
    order: HashMap<NodeId, (usize, usize)>,
    /// Preorder index of each mapping entry's node, parallel to the mapping.
    entry_pre: Vec<usize>,
}

impl CanonicalDocument {
    pub fn parse(markup: &str) -> Self {
        let (html, canonical) = canonical::build_from_markup(markup);

        let mut order = HashMap::new();
        if let Some(root) = tree::content_root(&html).and_then(|id| html.tree.get(id)) {
            let mut counter = 0usize;
            for edge in root.traverse() {
                match edge {
                    Edge::Open(node) => {
                        order.insert(node.id(), (counter, counter));
                        counter += 1;
                    }
                    Edge::Close(node) => {
                        if let Some(entry) = order.get_mut(&node.id()) {
                            entry.1 = counter;
                        }
                    }
                }
            }
        }

        let entry_pre = canonical
            .mapping
            .iter()
            .map(|e| order.get(&e.node).map(|&(pre, _)| pre).unwrap_or(usize::MAX))
            .collect();

        Self {
            html,
            canonical,
            order,
            entry_pre,
        }
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    pub fn canonical(&self) -> &CanonicalText {
        &self.canonical
    }

    /// Whether the markup still produces the stored canonical text.
    pub fn matches(&self, stored: &str) -> bool {
        canonical::validate(&self.canonical, stored)
    }

    /// Resolve a point to canonical offsets and its place in the tree.
    fn resolve(&self, point: &SelectionPoint) -> Option<Resolved> {
        if self.canonical.mapping.is_empty() {
            return None;
        }
        let &(pre, end) = self.order.get(&point.node)?;
        let node = self.html.tree.get(point.node)?;

        if let Some(raw) = node.value().as_text() {
            let byte = text::utf16_to_byte(&raw.text, point.offset);
            if let Some(entry) = self.canonical.entry_for_node(point.node) {
                let at = entry.canonical_at_raw(byte);
                return Some(Resolved {
                    forward: at,
                    backward: at,
                    position: (pre, byte),
                });
            }
            return Some(self.boundary(pre, (pre, byte)));
        }

        let gap = match node.children().nth(point.offset) {
            Some(child) => self.order.get(&child.id())?.0,
            None => end,
        };
        Some(self.boundary(gap, (gap, 0)))
    }

    /// Offsets around the gap just before preorder position `pre`.
    fn boundary(&self, pre: usize, position: (usize, usize)) -> Resolved {
        let split = self.entry_pre.partition_point(|&p| p < pre);
        let forward = self
            .canonical
            .mapping
            .get(split)
            .map(|e| e.start)
            .unwrap_or(self.canonical.length);
        let backward = split
            .checked_sub(1)
            .and_then(|i| self.canonical.mapping.get(i))
            .map(|e| e.end)
            .unwrap_or(0);
        Resolved {
            forward,
            backward: backward.min(forward),
            position,
        }
    }
}

/// A selection point resolved against a [`CanonicalDocument`].
///
/// `forward` is the offset of the first canonical codepoint at or after the
/// point and `backward` the end of the last one before it. They differ only
/// between text nodes. `position` orders points in the tree: preorder index
/// of the gap or text node, then the byte offset inside a text node.
#[derive(Debug, Clone, Copy)]
struct Resolved {
    forward: usize,
    backward: usize,
    position: (usize, usize),
}

/// One end of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPoint {
    pub node: NodeId,
    /// UTF-16 code units into a text node, or a child index into an element.
    pub offset: usize,
}

/// A selection in the parsed tree. Anchor may come after focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeSelection {
    pub anchor: SelectionPoint,
    pub focus: SelectionPoint,
}

impl TreeSelection {
    /// Build from child-index paths, as reported by a host tree.
    pub fn from_paths(
        html: &Html,
        anchor: &[usize],
        anchor_offset: usize,
        focus: &[usize],
        focus_offset: usize,
    ) -> Option<Self> {
        Some(Self {
            anchor: SelectionPoint {
                node: tree::node_at_path(html, anchor)?,
                offset: anchor_offset,
            },
            focus: SelectionPoint {
                node: tree::node_at_path(html, focus)?,
                offset: focus_offset,
            },
        })
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// A selection that can become a highlight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedRange {
    pub start: usize,
    pub end: usize,
    /// Trimmed text sliced from the stored canonical text.
    pub text: String,
}

/// Convert a tree selection into trimmed canonical offsets.
///
/// Checks run in a fixed order and the first failure wins: mismatch state,
/// collapsed, outside content, code, empty after trim, too short, too long.
pub fn convert(
    selection: &TreeSelection,
    document: &CanonicalDocument,
    canonical_text: &str,
    mismatch_disabled: bool,
    limits: SelectionLimits,
) -> Result<SelectedRange, SelectionError> {
    let result = convert_inner(selection, document, canonical_text, mismatch_disabled, limits);
    if let Err(err) = &result {
        tracing::debug!(
            target: "weaver::highlight::selection",
            kind = %err.kind,
            "selection rejected"
        );
    }
    result
}

fn convert_inner(
    selection: &TreeSelection,
    document: &CanonicalDocument,
    canonical_text: &str,
    mismatch_disabled: bool,
    limits: SelectionLimits,
) -> Result<SelectedRange, SelectionError> {
    if mismatch_disabled {
        return Err(SelectionErrorKind::MismatchState.into());
    }
    if selection.is_collapsed() {
        return Err(SelectionErrorKind::Collapsed.into());
    }

    let (Some(a), Some(b)) = (
        document.resolve(&selection.anchor),
        document.resolve(&selection.focus),
    ) else {
        return Err(SelectionErrorKind::OutsideContent.into());
    };

    let start = a.forward.min(b.forward);
    let end = a.backward.max(b.backward);
    if end <= start {
        // Points that are apart in the tree but enclose no text only cover
        // text-less content such as images.
        return Err(if a.position == b.position {
            SelectionErrorKind::Collapsed
        } else {
            SelectionErrorKind::OutsideContent
        }
        .into());
    }

    if document.canonical.intersects_code(start, end) {
        return Err(SelectionErrorKind::CodeBlock.into());
    }

    let candidate = text::slice_codepoints(canonical_text, start, end);
    let (leading, trailing) = text::whitespace_margins(candidate);
    let candidate_len = text::codepoint_len(candidate);
    if leading == candidate_len {
        return Err(SelectionErrorKind::EmptyAfterTrim.into());
    }

    let start = start + leading;
    let end = start + (candidate_len - leading - trailing);
    let len = end - start;
    if len < limits.min {
        return Err(SelectionErrorKind::TooShort.into());
    }
    if len > limits.max {
        return Err(SelectionErrorKind::TooLong.into());
    }

    Ok(SelectedRange {
        start,
        end,
        text: text::slice_codepoints(canonical_text, start, end).to_string(),
    })
}

/// Id of an existing range with exactly these bounds.
pub fn find_duplicate(existing: &[HighlightRange], start: usize, end: usize) -> Option<SmolStr> {
    let (start, end) = (i64::try_from(start).ok()?, i64::try_from(end).ok()?);
    existing
        .iter()
        .find(|r| r.start == start && r.end == end)
        .map(|r| r.id.clone())
}

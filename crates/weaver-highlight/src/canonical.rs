//! Canonical text construction.
//!
//! Walks a parsed fragment in document order and produces the plain-text
//! coordinate space every highlight offset lives in, plus a mapping from
//! each contributing text node to the codepoint range it produced.
//!
//! # Rules
//!
//! - Block-level elements separate their content from neighbouring content
//!   with a single line break; `<br>` always emits exactly one.
//! - Hidden subtrees (`hidden`, `aria-hidden="true"`) and script-like
//!   elements contribute nothing.
//! - All Unicode whitespace becomes a plain space, space runs collapse, each
//!   line is trimmed, and more than two consecutive line breaks collapse to
//!   two. Leading and trailing line breaks are dropped.
//! - The result is NFC-normalized, and all lengths are codepoint counts.
//!
//! Each output codepoint remembers which raw byte of which text node it came
//! from, so the renderer can split nodes at exact positions even when
//! whitespace was collapsed away.

use std::collections::HashMap;

use ego_tree::NodeId;
use ego_tree::iter::Edge;
use scraper::{Html, Node};
use unicode_normalization::UnicodeNormalization;

use crate::tree;

/// Elements that start a new line in canonical text.
pub const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "dd",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "tr",
    "ul",
];

/// Elements whose subtree never contributes text.
pub const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements whose text cannot be highlighted.
pub const CODE_TAGS: &[&str] = &["pre", "code"];

/// Whether an element's tag is block-level.
pub fn is_block_tag(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

/// One text node's slice of the canonical text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// The text node this slice came from.
    pub node: NodeId,
    /// Canonical codepoint offset of the first codepoint.
    pub start: usize,
    /// Canonical codepoint offset one past the last codepoint.
    pub end: usize,
    /// Whether the node sits inside a `pre` or `code` element.
    pub in_code: bool,
    /// Raw byte offset in the node text of each canonical codepoint.
    raw_starts: Vec<usize>,
    /// Raw byte offset just past the last contributing character.
    raw_end: usize,
}

impl MappingEntry {
    /// Length in codepoints.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Whether the canonical range `[start, end)` touches this entry.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && end > self.start
    }

    /// Byte index in the node's raw text where canonical `offset` falls.
    ///
    /// `offset` must lie within `[start, end]`.
    pub fn raw_byte_at(&self, offset: usize) -> Option<usize> {
        if offset < self.start || offset > self.end {
            return None;
        }
        let local = offset - self.start;
        Some(self.raw_starts.get(local).copied().unwrap_or(self.raw_end))
    }

    /// Canonical offset of a caret sitting at `raw_byte` in the node's raw text.
    ///
    /// Carets inside collapsed or trimmed whitespace snap to the next
    /// surviving codepoint.
    pub fn canonical_at_raw(&self, raw_byte: usize) -> usize {
        self.start + self.raw_starts.partition_point(|&b| b < raw_byte)
    }
}

/// Output of [`build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalText {
    pub text: String,
    /// Length of `text` in codepoints.
    pub length: usize,
    /// Entries in document order, non-overlapping.
    pub mapping: Vec<MappingEntry>,
    by_node: HashMap<NodeId, usize>,
}

impl CanonicalText {
    /// Mapping entry produced by a given text node.
    pub fn entry_for_node(&self, node: NodeId) -> Option<&MappingEntry> {
        self.by_node.get(&node).map(|&i| &self.mapping[i])
    }

    /// Entries overlapping the canonical range `[start, end)`, in document order.
    pub fn entries_overlapping(&self, start: usize, end: usize) -> &[MappingEntry] {
        let first = self.mapping.partition_point(|e| e.end <= start);
        let last = self.mapping.partition_point(|e| e.start < end);
        if first >= last {
            return &[];
        }
        &self.mapping[first..last]
    }

    /// Whether `[start, end)` intersects any code region.
    pub fn intersects_code(&self, start: usize, end: usize) -> bool {
        self.entries_overlapping(start, end)
            .iter()
            .any(|e| e.in_code)
    }

    /// Check the rebuilt text against the persisted canonical text.
    pub fn validate(&self, stored: &str) -> bool {
        validate(self, stored)
    }
}

/// Where an output codepoint came from.
#[derive(Debug, Clone, Copy)]
struct Source {
    slot: usize,
    raw_start: usize,
    raw_end: usize,
}

#[derive(Debug, Clone, Copy)]
struct Atom {
    ch: char,
    src: Option<Source>,
}

impl Atom {
    fn line_break() -> Self {
        Atom { ch: '\n', src: None }
    }
}

/// Walk output before whitespace collapsing.
#[derive(Debug, Clone, Copy)]
enum Token {
    Char(Atom),
    /// Edge of a block element. Adjacent boundaries coalesce into one break.
    Boundary,
    /// A `<br>`. Each one counts.
    Break,
}

#[derive(Debug)]
struct Slot {
    node: NodeId,
    in_code: bool,
}

/// Build canonical text for a parsed fragment.
pub fn build(html: &Html) -> CanonicalText {
    let Some(root) = tree::content_root(html).and_then(|id| html.tree.get(id)) else {
        tracing::debug!(target: "weaver::highlight::canonical", "no content root, empty canonical text");
        return CanonicalText::default();
    };

    let mut slots: Vec<Slot> = Vec::new();
    let mut tokens: Vec<Token> = Vec::new();
    let mut skip_until: Option<NodeId> = None;
    let mut code_depth = 0usize;

    for edge in root.traverse() {
        match edge {
            Edge::Open(node) => {
                if skip_until.is_some() {
                    continue;
                }
                match node.value() {
                    Node::Element(el) => {
                        let tag = el.name();
                        if is_hidden(el) || SKIPPED_TAGS.contains(&tag) {
                            skip_until = Some(node.id());
                            continue;
                        }
                        if tag == "br" {
                            tokens.push(Token::Break);
                        } else if is_block_tag(tag) {
                            tokens.push(Token::Boundary);
                        }
                        if CODE_TAGS.contains(&tag) {
                            code_depth += 1;
                        }
                    }
                    Node::Text(text) => {
                        let slot = slots.len();
                        slots.push(Slot {
                            node: node.id(),
                            in_code: code_depth > 0,
                        });
                        for (raw_start, raw_ch) in text.text.char_indices() {
                            let ch = if raw_ch.is_whitespace() { ' ' } else { raw_ch };
                            tokens.push(Token::Char(Atom {
                                ch,
                                src: Some(Source {
                                    slot,
                                    raw_start,
                                    raw_end: raw_start + raw_ch.len_utf8(),
                                }),
                            }));
                        }
                    }
                    _ => {}
                }
            }
            Edge::Close(node) => {
                if let Some(skipped) = skip_until {
                    if skipped == node.id() {
                        skip_until = None;
                    }
                    continue;
                }
                if let Node::Element(el) = node.value() {
                    let tag = el.name();
                    if is_block_tag(tag) {
                        tokens.push(Token::Boundary);
                    }
                    if CODE_TAGS.contains(&tag) {
                        code_depth = code_depth.saturating_sub(1);
                    }
                }
            }
        }
    }

    let atoms = normalize_nfc(collapse_whitespace(tokens));
    assemble(atoms, &slots)
}

/// Parse markup and build its canonical text in one step.
pub fn build_from_markup(markup: &str) -> (Html, CanonicalText) {
    let html = tree::parse_fragment(markup);
    let canonical = build(&html);
    (html, canonical)
}

/// Exact comparison of rebuilt canonical text against the stored copy.
///
/// Logs one diagnostic event on mismatch.
pub fn validate(built: &CanonicalText, stored: &str) -> bool {
    if built.text == stored {
        return true;
    }
    let first_diff = built
        .text
        .chars()
        .zip(stored.chars())
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| built.length.min(stored.chars().count()));
    tracing::warn!(
        target: "weaver::highlight::canonical",
        built_len = built.length,
        stored_len = stored.chars().count(),
        first_diff,
        "canonical text mismatch"
    );
    false
}

fn is_hidden(el: &scraper::node::Element) -> bool {
    el.attr("hidden").is_some()
        || el
            .attr("aria-hidden")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Collapse spaces, trim lines, cap blank lines, drop outer breaks.
///
/// Any run of block boundaries with only whitespace between them counts as
/// one break. A boundary directly before a `<br>` counts as its own break.
fn collapse_whitespace(tokens: Vec<Token>) -> Vec<Atom> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut pending_space: Option<Atom> = None;
    let mut pending_breaks = 0usize;
    let mut pending_boundary = false;
    let mut line_has_content = false;

    for token in tokens {
        let atom = match token {
            Token::Boundary => {
                pending_space = None;
                line_has_content = false;
                pending_boundary = true;
                continue;
            }
            Token::Break => {
                pending_space = None;
                line_has_content = false;
                pending_breaks += 1 + usize::from(std::mem::take(&mut pending_boundary));
                continue;
            }
            Token::Char(atom) => atom,
        };

        if atom.ch == ' ' {
            if line_has_content && pending_space.is_none() {
                pending_space = Some(atom);
            }
            continue;
        }

        let breaks = pending_breaks + usize::from(std::mem::take(&mut pending_boundary));
        if breaks > 0 && !out.is_empty() {
            out.extend(std::iter::repeat_n(Atom::line_break(), breaks.min(2)));
        }
        pending_breaks = 0;
        if let Some(space) = pending_space.take() {
            out.push(space);
        }
        out.push(atom);
        line_has_content = true;
    }
    out
}

/// Compose to NFC while keeping per-codepoint provenance.
///
/// Text is split into clusters that start at a non-combining character and
/// each cluster is composed on its own. When a cluster changes length, its
/// output codepoints borrow provenance from the input position they line up
/// with, clamped to the cluster's last input.
fn normalize_nfc(atoms: Vec<Atom>) -> Vec<Atom> {
    let plain: String = atoms.iter().map(|a| a.ch).collect();
    if unicode_normalization::is_nfc(&plain) {
        return atoms;
    }

    let mut out = Vec::with_capacity(atoms.len());
    let mut cluster: Vec<Atom> = Vec::new();
    for atom in atoms {
        if !cluster.is_empty() && starts_cluster(atom.ch) {
            compose_cluster(&cluster, &mut out);
            cluster.clear();
        }
        cluster.push(atom);
    }
    if !cluster.is_empty() {
        compose_cluster(&cluster, &mut out);
    }
    out
}

fn starts_cluster(c: char) -> bool {
    // Hangul medial vowels and final consonants compose with what precedes them.
    let hangul_continuation = matches!(c, '\u{1161}'..='\u{1175}' | '\u{11A8}'..='\u{11C2}');
    !unicode_normalization::char::is_combining_mark(c) && !hangul_continuation
}

fn compose_cluster(cluster: &[Atom], out: &mut Vec<Atom>) {
    let composed: Vec<char> = cluster.iter().map(|a| a.ch).nfc().collect();
    if composed.len() == cluster.len() {
        out.extend(composed.into_iter().zip(cluster).map(|(ch, a)| Atom { ch, src: a.src }));
        return;
    }

    let last_in = cluster.len() - 1;
    let last_out = composed.len().saturating_sub(1);
    for (i, ch) in composed.into_iter().enumerate() {
        let mut src = cluster[i.min(last_in)]
            .src
            .or_else(|| cluster.iter().find_map(|a| a.src));
        // The final output codepoint owns the rest of the cluster's raw text.
        if i == last_out {
            if let Some(src) = src.as_mut() {
                let slot = src.slot;
                let raw_end = cluster
                    .iter()
                    .filter_map(|a| a.src)
                    .filter(|s| s.slot == slot)
                    .map(|s| s.raw_end)
                    .fold(src.raw_end, usize::max);
                src.raw_end = raw_end;
            }
        }
        out.push(Atom { ch, src });
    }
}

fn assemble(atoms: Vec<Atom>, slots: &[Slot]) -> CanonicalText {
    let mut text = String::with_capacity(atoms.len());
    let mut mapping: Vec<MappingEntry> = Vec::new();
    let mut current: Option<MappingEntry> = None;

    for (offset, atom) in atoms.iter().enumerate() {
        text.push(atom.ch);
        let Some(src) = atom.src else {
            if let Some(entry) = current.take() {
                mapping.push(entry);
            }
            continue;
        };
        let slot = &slots[src.slot];
        match current.as_mut() {
            Some(entry) if entry.node == slot.node => {
                entry.end = offset + 1;
                entry.raw_starts.push(src.raw_start);
                entry.raw_end = entry.raw_end.max(src.raw_end);
            }
            _ => {
                if let Some(entry) = current.take() {
                    mapping.push(entry);
                }
                current = Some(MappingEntry {
                    node: slot.node,
                    start: offset,
                    end: offset + 1,
                    in_code: slot.in_code,
                    raw_starts: vec![src.raw_start],
                    raw_end: src.raw_end,
                });
            }
        }
    }
    if let Some(entry) = current.take() {
        mapping.push(entry);
    }

    let by_node = mapping
        .iter()
        .enumerate()
        .map(|(i, e)| (e.node, i))
        .collect();

    CanonicalText {
        length: atoms.len(),
        text,
        mapping,
        by_node,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{codepoint_len, slice_codepoints};

    fn canon(markup: &str) -> String {
        build_from_markup(markup).1.text
    }

    #[test]
    fn test_plain_paragraphs() {
        assert_eq!(canon("<p>Hello world</p><p>Second</p>"), "Hello world\nSecond");
    }

    #[test]
    fn test_inline_elements_do_not_break() {
        assert_eq!(canon("<p>Hello <em>brave</em> <b>new</b> world</p>"), "Hello brave new world");
    }

    #[test]
    fn test_whitespace_collapses_and_trims() {
        assert_eq!(canon("<p>  lots\n\t of   space  </p>"), "lots of space");
        assert_eq!(canon("<p>non\u{a0}breaking</p>"), "non breaking");
    }

    #[test]
    fn test_br_emits_one_break_and_runs_cap_at_two() {
        assert_eq!(canon("<p>a<br>b</p>"), "a\nb");
        assert_eq!(canon("<p>a<br><br>b</p>"), "a\n\nb");
        assert_eq!(canon("<p>a<br><br><br><br>b</p>"), "a\n\nb");
    }

    #[test]
    fn test_nested_blocks_single_break() {
        assert_eq!(
            canon("<div><ul><li>one</li><li>two</li></ul></div><p>after</p>"),
            "one\ntwo\nafter"
        );
    }

    #[test]
    fn test_pretty_printed_blocks_single_break() {
        assert_eq!(canon("<p>a</p>\n<p>b</p>"), "a\nb");
        assert_eq!(canon("<ul>\n  <li>one</li>\n  <li>two</li>\n</ul>"), "one\ntwo");
        assert_eq!(
            canon("<div>\n<p>x</p>\n</div>\n<div>\n<p>y</p>\n</div>"),
            "x\ny"
        );
        assert_eq!(
            canon("<p>a</p>\n<p>b</p>"),
            canon("<p>a</p><p>b</p>")
        );
    }

    #[test]
    fn test_br_between_blocks_still_counts() {
        assert_eq!(canon("<p>a</p>\n<br>\n<p>b</p>"), "a\n\nb");
        assert_eq!(canon("<p>a<br>\n  b</p>"), "a\nb");
    }

    #[test]
    fn test_pretty_printed_mapping_offsets() {
        let (html, built) = build_from_markup("<ul>\n  <li>one</li>\n  <li>two</li>\n</ul>");
        assert_eq!(built.length, 7);
        let spans: Vec<_> = built
            .mapping
            .iter()
            .map(|e| (tree::text_of(&html, e.node).unwrap().to_string(), e.start, e.end))
            .collect();
        assert_eq!(
            spans,
            vec![("one".to_string(), 0, 3), ("two".to_string(), 4, 7)]
        );
    }

    #[test]
    fn test_hidden_and_script_skipped() {
        assert_eq!(
            canon(r#"<p>shown<span hidden>secret</span> <span aria-hidden="true">x</span>text</p><script>var a;</script><style>p{}</style>"#),
            "shown text"
        );
        assert_eq!(canon(r#"<p aria-hidden="false">kept</p>"#), "kept");
    }

    #[test]
    fn test_nfc_composition() {
        let built = build_from_markup("<p>cafe\u{301}</p>").1;
        assert_eq!(built.text, "caf\u{e9}");
        assert_eq!(built.length, 4);
    }

    #[test]
    fn test_astral_length_in_codepoints() {
        let built = build_from_markup("<p>hi 😀 there</p>").1;
        assert_eq!(built.length, 10);
        assert_eq!(built.mapping.len(), 1);
        assert_eq!(built.mapping[0].end, 10);
    }

    #[test]
    fn test_mapping_entries_in_order() {
        let (html, built) = build_from_markup("<p>ab <em>cd</em></p><p>ef</p>");
        assert_eq!(built.text, "ab cd\nef");
        let spans: Vec<_> = built
            .mapping
            .iter()
            .map(|e| (tree::text_of(&html, e.node).unwrap().to_string(), e.start, e.end))
            .collect();
        assert_eq!(
            spans,
            vec![
                ("ab ".to_string(), 0, 3),
                ("cd".to_string(), 3, 5),
                ("ef".to_string(), 6, 8),
            ]
        );
        for pair in built.mapping.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn test_raw_offsets_survive_collapse() {
        let (html, built) = build_from_markup("<p>  a   b</p>");
        assert_eq!(built.text, "a b");
        let entry = &built.mapping[0];
        let raw = tree::text_of(&html, entry.node).unwrap();
        assert_eq!(raw, "  a   b");
        assert_eq!(entry.raw_byte_at(0), Some(2));
        assert_eq!(entry.raw_byte_at(1), Some(3));
        assert_eq!(entry.raw_byte_at(2), Some(6));
        assert_eq!(entry.raw_byte_at(3), Some(7));
        assert_eq!(entry.raw_byte_at(4), None);

        assert_eq!(entry.canonical_at_raw(0), 0);
        assert_eq!(entry.canonical_at_raw(4), 2);
        assert_eq!(entry.canonical_at_raw(7), 3);
    }

    #[test]
    fn test_code_regions() {
        let built = build_from_markup("<p>see <code>x = 1</code> and</p><pre>fn main() {}</pre>").1;
        assert_eq!(built.text, "see x = 1 and\nfn main() {}");
        let code: Vec<(usize, usize)> = built
            .mapping
            .iter()
            .filter(|e| e.in_code)
            .map(|e| (e.start, e.end))
            .collect();
        assert_eq!(code, vec![(4, 9), (14, 26)]);
        assert!(built.intersects_code(0, 5));
        assert!(!built.intersects_code(0, 4));
        assert!(!built.intersects_code(9, 13));
    }

    #[test]
    fn test_entries_overlapping() {
        let built = build_from_markup("<p>aa<b>bb</b>cc</p>").1;
        assert_eq!(built.entries_overlapping(0, 2).len(), 1);
        assert_eq!(built.entries_overlapping(1, 3).len(), 2);
        assert_eq!(built.entries_overlapping(2, 4).len(), 1);
        assert_eq!(built.entries_overlapping(0, 6).len(), 3);
        assert!(built.entries_overlapping(6, 6).is_empty());
    }

    #[test]
    fn test_entry_lengths_match_slices() {
        let built = build_from_markup("<p>x 🎉 y</p><p>é<i>ü</i></p>").1;
        for entry in &built.mapping {
            let slice = slice_codepoints(&built.text, entry.start, entry.end);
            assert_eq!(codepoint_len(slice), entry.len());
        }
    }

    #[test]
    fn test_empty_fragment() {
        let built = build_from_markup("").1;
        assert_eq!(built.text, "");
        assert_eq!(built.length, 0);
        assert!(built.mapping.is_empty());
    }

    #[test]
    fn test_validate() {
        let built = build_from_markup("<p>abc</p>").1;
        assert!(built.validate("abc"));
        assert!(!built.validate("abd"));
        assert!(!validate(&built, "ab"));
    }
}

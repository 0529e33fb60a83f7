//! Overlap segmentation.
//!
//! Turns any number of possibly-overlapping highlight ranges into a sorted
//! sequence of disjoint segments, each annotated with the highlights active
//! over it. This is a plain event sweep: two events per range, sorted, then
//! walked left to right with an active set keyed by highlight id.
//!
//! Output depends only on the *set* of input ranges, never on their order:
//! events and each segment's active set are both ordered by
//! [`topmost_order`].

use std::cmp::Ordering;
use std::collections::HashMap;

use smol_str::SmolStr;

use crate::error::RangeRejection;
use crate::types::{Highlight, HighlightRange, Segment, topmost_order};

/// A range that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRange {
    pub id: SmolStr,
    pub reason: RangeRejection,
}

/// Output of [`segment`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    /// Disjoint, ordered segments.
    pub segments: Vec<Segment>,
    /// Ranges that failed validation, ordered by id.
    pub dropped: Vec<DroppedRange>,
    /// Ranges that passed validation, in [`topmost_order`].
    pub highlights: Vec<Highlight>,
}

impl Segmentation {
    /// Ids of dropped ranges, ordered by id.
    pub fn dropped_ids(&self) -> Vec<SmolStr> {
        self.dropped.iter().map(|d| d.id.clone()).collect()
    }

    /// The segment containing `offset`, if any.
    pub fn segment_at(&self, offset: usize) -> Option<&Segment> {
        let idx = self.segments.partition_point(|s| s.end <= offset);
        self.segments.get(idx).filter(|s| s.contains(offset))
    }

    /// Ids of highlights covering `offset`, topmost first.
    pub fn highlights_at(&self, offset: usize) -> &[SmolStr] {
        self.segment_at(offset)
            .map(|s| s.active_ids.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    End,
    Start,
}

#[derive(Debug, Clone, Copy)]
struct Event {
    pos: usize,
    kind: EventKind,
    idx: usize,
}

// Ends sort before starts at a shared position, so touching ranges never overlap.
fn kind_rank(kind: EventKind) -> u8 {
    match kind {
        EventKind::End => 0,
        EventKind::Start => 1,
    }
}

/// Validate ranges against a text of `text_len` codepoints and segment the survivors.
pub fn segment(text_len: usize, ranges: &[HighlightRange]) -> Segmentation {
    let mut highlights = Vec::with_capacity(ranges.len());
    let mut dropped = Vec::new();

    for range in ranges {
        match range.validate(text_len) {
            Ok(hl) => highlights.push(hl),
            Err(reason) => {
                tracing::debug!(
                    target: "weaver::highlight::segment",
                    id = %range.id,
                    start = range.start,
                    end = range.end,
                    %reason,
                    "dropping invalid highlight range"
                );
                dropped.push(DroppedRange {
                    id: range.id.clone(),
                    reason,
                });
            }
        }
    }

    dropped.sort_by(|a, b| {
        a.id.cmp(&b.id)
            .then_with(|| a.reason.to_string().cmp(&b.reason.to_string()))
    });
    highlights.sort_by(total_order);

    let segments = sweep(&highlights);

    Segmentation {
        segments,
        dropped,
        highlights,
    }
}

/// [`topmost_order`] extended with bounds and color so that even duplicate
/// ids sort identically regardless of input order.
fn total_order(a: &Highlight, b: &Highlight) -> Ordering {
    topmost_order(a, b)
        .then_with(|| a.start.cmp(&b.start))
        .then_with(|| a.end.cmp(&b.end))
        .then_with(|| a.color.cmp(&b.color))
}

fn sweep(highlights: &[Highlight]) -> Vec<Segment> {
    let mut events: Vec<Event> = highlights
        .iter()
        .enumerate()
        .flat_map(|(idx, hl)| {
            [
                Event {
                    pos: hl.start,
                    kind: EventKind::Start,
                    idx,
                },
                Event {
                    pos: hl.end,
                    kind: EventKind::End,
                    idx,
                },
            ]
        })
        .collect();

    events.sort_by(|a, b| {
        a.pos
            .cmp(&b.pos)
            .then_with(|| kind_rank(a.kind).cmp(&kind_rank(b.kind)))
            .then_with(|| total_order(&highlights[a.idx], &highlights[b.idx]))
    });

    // Keyed by id: a duplicate id replaces the earlier entry.
    let mut active: HashMap<&str, usize> = HashMap::new();
    let mut segments: Vec<Segment> = Vec::new();
    let mut prev_pos = 0usize;

    for event in events {
        if event.pos > prev_pos && !active.is_empty() {
            emit(&mut segments, highlights, &active, prev_pos, event.pos);
        }

        let hl = &highlights[event.idx];
        match event.kind {
            EventKind::Start => {
                active.insert(hl.id.as_str(), event.idx);
            }
            EventKind::End => {
                // Only the entry this range owns; a duplicate id that replaced
                // it stays active.
                if active.get(hl.id.as_str()) == Some(&event.idx) {
                    active.remove(hl.id.as_str());
                }
            }
        }
        prev_pos = event.pos;
    }

    segments
}

fn emit(
    segments: &mut Vec<Segment>,
    highlights: &[Highlight],
    active: &HashMap<&str, usize>,
    start: usize,
    end: usize,
) {
    let mut members: Vec<&Highlight> = active.values().map(|&i| &highlights[i]).collect();
    members.sort_by(|a, b| topmost_order(a, b));
    let active_ids: Vec<SmolStr> = members.iter().map(|h| h.id.clone()).collect();

    if let Some(last) = segments.last_mut() {
        if last.end == start && last.active_ids == active_ids {
            last.end = end;
            return;
        }
    }

    if tracing::enabled!(target: "weaver::highlight::segment", tracing::Level::TRACE) {
        tracing::trace!(
            target: "weaver::highlight::segment",
            start,
            end,
            active = ?active_ids,
            "emit segment"
        );
    }

    let top = members[0];
    segments.push(Segment {
        start,
        end,
        topmost_id: top.id.clone(),
        topmost_color: top.color,
        active_ids,
    });
}

//! Annotation row alignment.
//!
//! Two phases, kept apart by their signatures:
//!
//! - [`measure`] reads layout through a [`LayoutSurface`] and records each
//!   anchor's document-space Y. It is expensive and runs debounced.
//! - [`compute_rows`] turns cached positions and a scroll offset into
//!   non-overlapping rows. It never sees a surface, so it cannot read
//!   layout, and it runs at most once per animation frame.
//!
//! [`AlignmentController`] owns the cached positions and the scheduling
//! state that ties the two together.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use smol_str::SmolStr;
use web_time::Instant;

use crate::config::{HighlightConfig, RowLayout};
use crate::platform::LayoutSurface;
use crate::schedule::{Debouncer, FrameThrottle};
use crate::types::Highlight;

/// Document-space anchor Y per highlight id.
pub type AnchorPositions = HashMap<SmolStr, f64>;

/// Result of one measurement pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    pub positions: AnchorPositions,
    /// Ids whose anchor could not be found, in request order.
    pub missing: Vec<SmolStr>,
}

/// Measure anchor positions in document space.
///
/// `documentY = anchor top - content top + scroll offset`, so positions stay
/// valid while the user scrolls.
pub fn measure<S: LayoutSurface + ?Sized>(surface: &S, ids: &[SmolStr]) -> Measurement {
    let content_top = surface.content_top();
    let scroll_top = surface.scroll_top();

    let mut out = Measurement::default();
    for id in ids {
        match surface.anchor_top(id) {
            Some(top) if top.is_finite() => {
                out.positions
                    .insert(id.clone(), top - content_top + scroll_top);
            }
            _ => out.missing.push(id.clone()),
        }
    }

    tracing::debug!(
        target: "weaver::highlight::align",
        measured = out.positions.len(),
        missing = out.missing.len(),
        "measured anchors"
    );
    out
}

/// One placed annotation row.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRow {
    pub id: SmolStr,
    /// Where the row would sit if nothing collided with it.
    pub desired_y: f64,
    /// Where it actually sits, never above `desired_y`.
    pub top: f64,
}

impl AlignedRow {
    pub fn bottom(&self, layout: RowLayout) -> f64 {
        self.top + layout.row_height
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedRows {
    /// Rows in placement order.
    pub rows: Vec<AlignedRow>,
    /// Highlights with no cached position, ordered by id.
    pub missing_anchor_ids: Vec<SmolStr>,
}

/// Place one row per highlight, pushing collisions downward only.
///
/// Ordering is total: desired Y, then start, then end (shorter first), then
/// creation time, then id.
pub fn compute_rows(
    highlights: &[Highlight],
    positions: &AnchorPositions,
    scroll_top: f64,
    layout: RowLayout,
) -> AlignedRows {
    let mut placed: Vec<(&Highlight, f64)> = Vec::with_capacity(highlights.len());
    let mut missing_anchor_ids = Vec::new();

    for hl in highlights {
        match positions.get(&hl.id) {
            Some(&y) => placed.push((hl, y - scroll_top)),
            None => missing_anchor_ids.push(hl.id.clone()),
        }
    }
    missing_anchor_ids.sort();
    missing_anchor_ids.dedup();

    placed.sort_by(|(a, ay), (b, by)| row_order(a, *ay, b, *by));

    let mut rows = Vec::with_capacity(placed.len());
    let mut previous_bottom = f64::NEG_INFINITY;
    for (hl, desired_y) in placed {
        let top = desired_y.max(previous_bottom + layout.gap);
        previous_bottom = top + layout.row_height;
        rows.push(AlignedRow {
            id: hl.id.clone(),
            desired_y,
            top,
        });
    }

    if tracing::enabled!(target: "weaver::highlight::align", tracing::Level::TRACE) {
        tracing::trace!(
            target: "weaver::highlight::align",
            rows = rows.len(),
            missing = missing_anchor_ids.len(),
            scroll_top,
            "computed rows"
        );
    }

    AlignedRows {
        rows,
        missing_anchor_ids,
    }
}

fn row_order(a: &Highlight, ay: f64, b: &Highlight, by: f64) -> Ordering {
    ay.total_cmp(&by)
        .then_with(|| a.start.cmp(&b.start))
        .then_with(|| a.end.cmp(&b.end))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Scroll offset that puts `anchor_y` at `fraction` of the viewport height
/// from the top. Not clamped; see [`clamp_scroll`].
pub fn scroll_target(anchor_y: f64, viewport_height: f64, fraction: f64) -> f64 {
    anchor_y - viewport_height * fraction
}

/// Clamp a scroll offset into `[0, content_height - viewport_height]`.
pub fn clamp_scroll(target: f64, content_height: f64, viewport_height: f64) -> f64 {
    let max = (content_height - viewport_height).max(0.0);
    if target.is_nan() {
        return 0.0;
    }
    target.clamp(0.0, max)
}

/// Why a measurement pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasureTrigger {
    /// First layout after mount.
    Initial,
    /// The content root changed size.
    ContentResized,
    /// The scroll container changed size.
    ContainerResized,
    /// An embedded image finished loading or failed to.
    ImageSettled,
    /// The set of rendered highlights changed.
    HighlightsChanged,
}

/// Cached measurements plus the scheduling that drives both phases.
#[derive(Debug)]
pub struct AlignmentController {
    layout: RowLayout,
    scroll_fraction: f64,
    debouncer: Debouncer,
    throttle: FrameThrottle,
    measurement: Measurement,
    last_trigger: Option<MeasureTrigger>,
}

impl AlignmentController {
    pub fn new(config: &HighlightConfig) -> Self {
        Self {
            layout: config.row_layout(),
            scroll_fraction: config.scroll_anchor_fraction,
            debouncer: Debouncer::new(Duration::from_millis(config.measure_debounce_ms)),
            throttle: FrameThrottle::new(),
            measurement: Measurement::default(),
            last_trigger: None,
        }
    }

    /// Something may have moved. Re-arms the measurement debouncer and
    /// returns the deadline the host should wake up at.
    pub fn notify(&mut self, trigger: MeasureTrigger, now: Instant) -> Instant {
        self.last_trigger = Some(trigger);
        tracing::trace!(target: "weaver::highlight::align", ?trigger, "measurement requested");
        self.debouncer.trigger(now)
    }

    pub fn measure_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    pub fn last_trigger(&self) -> Option<MeasureTrigger> {
        self.last_trigger
    }

    /// Run the pending measurement if its quiet period has elapsed.
    ///
    /// The cached positions are swapped in whole, so a frame never sees a
    /// partially written map. Returns true when a pass ran.
    pub fn poll_measure<S: LayoutSurface + ?Sized>(
        &mut self,
        now: Instant,
        surface: &S,
        ids: &[SmolStr],
    ) -> bool {
        if !self.debouncer.poll(now) {
            return false;
        }
        self.measurement = measure(surface, ids);
        true
    }

    pub fn positions(&self) -> &AnchorPositions {
        &self.measurement.positions
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    /// Scroll happened. Returns true when the host must schedule a frame.
    pub fn request_frame(&mut self) -> bool {
        self.throttle.request()
    }

    /// The scheduled frame fired. Returns `None` if no frame was pending.
    pub fn on_frame(&mut self, scroll_top: f64, highlights: &[Highlight]) -> Option<AlignedRows> {
        if !self.throttle.begin_frame() {
            return None;
        }
        Some(compute_rows(
            highlights,
            &self.measurement.positions,
            scroll_top,
            self.layout,
        ))
    }

    /// Clamped scroll offset that brings highlight `id` into view.
    pub fn scroll_to<S: LayoutSurface + ?Sized>(&self, id: &str, surface: &S) -> Option<f64> {
        let anchor_y = *self.measurement.positions.get(id)?;
        let viewport = surface.viewport_height();
        Some(clamp_scroll(
            scroll_target(anchor_y, viewport, self.scroll_fraction),
            surface.scroll_height(),
            viewport,
        ))
    }

    /// Cancel pending measurement and frame work.
    pub fn teardown(&mut self) {
        self.debouncer.cancel();
        self.throttle.cancel();
        self.last_trigger = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    use super::*;
    use crate::types::HighlightColor;

    struct FakeSurface {
        content_top: f64,
        scroll_top: f64,
        anchors: HashMap<&'static str, f64>,
    }

    impl LayoutSurface for FakeSurface {
        fn content_top(&self) -> f64 {
            self.content_top
        }

        fn scroll_top(&self) -> f64 {
            self.scroll_top
        }

        fn anchor_top(&self, id: &str) -> Option<f64> {
            self.anchors.get(id).copied()
        }

        fn viewport_height(&self) -> f64 {
            500.0
        }

        fn scroll_height(&self) -> f64 {
            2000.0
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn hl(id: &str, start: usize, end: usize, created: i64) -> Highlight {
        Highlight {
            id: id.into(),
            start,
            end,
            color: HighlightColor::Yellow,
            created_at: at(created),
        }
    }

    fn layout() -> RowLayout {
        RowLayout {
            row_height: 20.0,
            gap: 5.0,
        }
    }

    fn positions(items: &[(&str, f64)]) -> AnchorPositions {
        items.iter().map(|(id, y)| (SmolStr::from(*id), *y)).collect()
    }

    #[test]
    fn test_measure_document_space() {
        let surface = FakeSurface {
            content_top: -300.0,
            scroll_top: 300.0,
            anchors: HashMap::from([("a", -250.0), ("b", 40.0)]),
        };
        let ids = [SmolStr::from("a"), SmolStr::from("gone"), SmolStr::from("b")];
        let m = measure(&surface, &ids);

        assert_eq!(m.positions.get("a"), Some(&350.0));
        assert_eq!(m.positions.get("b"), Some(&640.0));
        assert_eq!(m.missing, vec![SmolStr::from("gone")]);
    }

    #[test]
    fn test_rows_push_down_on_collision() {
        let hls = [hl("a", 0, 5, 1), hl("b", 10, 15, 1), hl("c", 40, 45, 1)];
        let pos = positions(&[("a", 100.0), ("b", 110.0), ("c", 400.0)]);
        let out = compute_rows(&hls, &pos, 50.0, layout());

        let tops: Vec<(&str, f64)> = out.rows.iter().map(|r| (r.id.as_str(), r.top)).collect();
        assert_eq!(tops, vec![("a", 50.0), ("b", 75.0), ("c", 350.0)]);
        assert_eq!(out.rows[1].desired_y, 60.0);
        assert!(out.missing_anchor_ids.is_empty());
    }

    #[test]
    fn test_rows_tie_break() {
        // Same Y: earlier start, then shorter, then older, then id.
        let hls = [
            hl("d", 5, 9, 1),
            hl("c", 0, 9, 2),
            hl("b", 0, 9, 1),
            hl("a", 0, 4, 3),
            hl("e", 5, 9, 1),
        ];
        let pos = positions(&[("a", 0.0), ("b", 0.0), ("c", 0.0), ("d", 0.0), ("e", 0.0)]);
        let out = compute_rows(&hls, &pos, 0.0, layout());
        let order: Vec<&str> = out.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_rows_report_missing() {
        let hls = [hl("z", 0, 1, 1), hl("a", 0, 1, 1), hl("m", 0, 1, 1)];
        let pos = positions(&[("m", 10.0)]);
        let out = compute_rows(&hls, &pos, 0.0, layout());
        assert_eq!(out.rows.len(), 1);
        assert_eq!(
            out.missing_anchor_ids,
            vec![SmolStr::from("a"), SmolStr::from("z")]
        );
    }

    #[test]
    fn test_scroll_target_and_clamp() {
        assert_eq!(scroll_target(1000.0, 500.0, 0.2), 900.0);
        assert_eq!(clamp_scroll(-40.0, 2000.0, 500.0), 0.0);
        assert_eq!(clamp_scroll(1800.0, 2000.0, 500.0), 1500.0);
        assert_eq!(clamp_scroll(100.0, 300.0, 500.0), 0.0);
    }

    #[test]
    fn test_controller_debounces_and_throttles() {
        let config = HighlightConfig::default();
        let mut ctl = AlignmentController::new(&config);
        let surface = FakeSurface {
            content_top: 0.0,
            scroll_top: 0.0,
            anchors: HashMap::from([("a", 120.0)]),
        };
        let ids = [SmolStr::from("a")];
        let t0 = Instant::now();

        ctl.notify(MeasureTrigger::Initial, t0);
        ctl.notify(MeasureTrigger::ImageSettled, t0 + Duration::from_millis(100));
        assert_eq!(ctl.last_trigger(), Some(MeasureTrigger::ImageSettled));
        assert!(!ctl.poll_measure(t0 + Duration::from_millis(200), &surface, &ids));
        assert!(ctl.positions().is_empty());
        assert!(ctl.poll_measure(t0 + Duration::from_millis(250), &surface, &ids));
        assert_eq!(ctl.positions().get("a"), Some(&120.0));

        assert!(ctl.request_frame());
        assert!(!ctl.request_frame());
        let rows = ctl.on_frame(20.0, &[hl("a", 0, 3, 1)]).unwrap();
        assert_eq!(rows.rows[0].top, 100.0);
        assert!(ctl.on_frame(20.0, &[hl("a", 0, 3, 1)]).is_none());

        assert_eq!(ctl.scroll_to("a", &surface), Some(20.0));
        assert_eq!(ctl.scroll_to("missing", &surface), None);
    }

    #[test]
    fn test_controller_teardown_cancels() {
        let mut ctl = AlignmentController::new(&HighlightConfig::default());
        let t0 = Instant::now();
        ctl.notify(MeasureTrigger::ContentResized, t0);
        ctl.request_frame();
        ctl.teardown();

        assert_eq!(ctl.measure_deadline(), None);
        assert!(ctl.on_frame(0.0, &[]).is_none());
    }

    proptest! {
        #[test]
        fn prop_rows_never_overlap(
            ys in proptest::collection::vec(-500.0f64..5000.0, 1..40),
            scroll in 0.0f64..2000.0,
        ) {
            let hls: Vec<Highlight> = ys
                .iter()
                .enumerate()
                .map(|(i, _)| hl(&format!("h{i}"), i, i + 1, i as i64))
                .collect();
            let pos: AnchorPositions = ys
                .iter()
                .enumerate()
                .map(|(i, y)| (SmolStr::from(format!("h{i}")), *y))
                .collect();
            let layout = layout();
            let out = compute_rows(&hls, &pos, scroll, layout);

            prop_assert_eq!(out.rows.len(), hls.len());
            for row in &out.rows {
                prop_assert!(row.top >= row.desired_y);
            }
            for pair in out.rows.windows(2) {
                prop_assert!(pair[1].top >= pair[0].bottom(layout) + layout.gap - 1e-9);
                prop_assert!(pair[1].desired_y >= pair[0].desired_y);
            }
        }
    }
}

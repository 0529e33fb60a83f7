//! Alignment wired to the browser event loop.
//!
//! Owns an [`AlignmentController`] and turns its scheduling answers into
//! real timeouts and animation frames. Resize observers, image listeners and
//! the scroll listener feed it triggers. Rows are handed to a callback once
//! per frame.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use gloo_events::EventListener;
use smol_str::SmolStr;
use web_time::Instant;
use weaver_highlight::{
    AlignedRows, AlignmentController, Highlight, HighlightConfig, LayoutSurface, MeasureTrigger,
    PlatformError,
};

use crate::scheduler::{AnimationFrame, Timeout};
use crate::surface::DomLayoutSurface;
use crate::watch::{ImageWatcher, ResizeWatcher};

type RowsCallback = Box<dyn FnMut(&AlignedRows)>;

struct State {
    controller: AlignmentController,
    surface: DomLayoutSurface,
    highlights: Vec<Highlight>,
    ids: Vec<SmolStr>,
    timeout: Option<Timeout>,
    frame: Option<AnimationFrame>,
    images: Option<ImageWatcher>,
    resize: Vec<ResizeWatcher>,
    scroll: Option<EventListener>,
}

struct Shared {
    state: RefCell<State>,
    on_rows: RefCell<RowsCallback>,
}

/// Debounced measurement plus frame-throttled row layout for one document.
pub struct AlignmentDriver {
    shared: Rc<Shared>,
}

impl AlignmentDriver {
    pub fn new(
        config: &HighlightConfig,
        surface: DomLayoutSurface,
        on_rows: impl FnMut(&AlignedRows) + 'static,
    ) -> Result<Self, PlatformError> {
        let shared = Rc::new(Shared {
            state: RefCell::new(State {
                controller: AlignmentController::new(config),
                surface: surface.clone(),
                highlights: Vec::new(),
                ids: Vec::new(),
                timeout: None,
                frame: None,
                images: None,
                resize: Vec::new(),
                scroll: None,
            }),
            on_rows: RefCell::new(Box::new(on_rows)),
        });

        let content = ResizeWatcher::new(&[surface.content_root()], {
            let weak = Rc::downgrade(&shared);
            move || with_shared(&weak, |s| notify(s, MeasureTrigger::ContentResized))
        })?;
        let container = ResizeWatcher::new(&[surface.scroll_container()], {
            let weak = Rc::downgrade(&shared);
            move || with_shared(&weak, |s| notify(s, MeasureTrigger::ContainerResized))
        })?;
        let scroll = EventListener::new(surface.scroll_container(), "scroll", {
            let weak = Rc::downgrade(&shared);
            move |_| with_shared(&weak, request_frame)
        });

        {
            let mut state = shared.state.borrow_mut();
            state.resize = vec![content, container];
            state.scroll = Some(scroll);
        }
        notify(&shared, MeasureTrigger::Initial);

        Ok(Self { shared })
    }

    /// Replace the rendered highlight set. Call after the new markup is in
    /// the page.
    pub fn set_highlights(&self, highlights: Vec<Highlight>) {
        {
            let mut state = self.shared.state.borrow_mut();
            state.ids = highlights.iter().map(|h| h.id.clone()).collect();
            state.highlights = highlights;
            let weak = Rc::downgrade(&self.shared);
            state.images = Some(ImageWatcher::new(state.surface.content_root(), move || {
                with_shared(&weak, |s| notify(s, MeasureTrigger::ImageSettled))
            }));
        }
        notify(&self.shared, MeasureTrigger::HighlightsChanged);
    }

    pub fn notify(&self, trigger: MeasureTrigger) {
        notify(&self.shared, trigger);
    }

    /// Scroll so highlight `id` sits near the top of the viewport. Returns
    /// false if its anchor has not been measured.
    pub fn scroll_to(&self, id: &str) -> bool {
        let state = self.shared.state.borrow();
        match state.controller.scroll_to(id, &state.surface) {
            Some(top) => {
                state.surface.scroll_to(top);
                true
            }
            None => false,
        }
    }

    /// Cancel pending work and remove every listener.
    pub fn teardown(&self) {
        let mut state = self.shared.state.borrow_mut();
        state.controller.teardown();
        state.timeout = None;
        state.frame = None;
        state.images = None;
        state.resize.clear();
        state.scroll = None;
    }
}

impl Drop for AlignmentDriver {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn with_shared(weak: &Weak<Shared>, f: impl FnOnce(&Rc<Shared>)) {
    if let Some(shared) = weak.upgrade() {
        f(&shared);
    }
}

fn notify(shared: &Rc<Shared>, trigger: MeasureTrigger) {
    let now = Instant::now();
    let deadline = shared.state.borrow_mut().controller.notify(trigger, now);
    arm_timeout(shared, deadline.saturating_duration_since(now).as_millis());
}

fn arm_timeout(shared: &Rc<Shared>, millis: u128) {
    let weak = Rc::downgrade(shared);
    let millis = u32::try_from(millis).unwrap_or(u32::MAX);
    match Timeout::new(millis, move || with_shared(&weak, on_timeout)) {
        // Replacing the handle cancels the previous timeout.
        Ok(timeout) => shared.state.borrow_mut().timeout = Some(timeout),
        Err(e) => tracing::warn!(target: "weaver::highlight::align", error = %e, "could not arm measurement"),
    }
}

fn on_timeout(shared: &Rc<Shared>) {
    let now = Instant::now();
    let (measured, remaining) = {
        let mut guard = shared.state.borrow_mut();
        let state = &mut *guard;
        let measured = state
            .controller
            .poll_measure(now, &state.surface, &state.ids);
        let remaining = state
            .controller
            .measure_deadline()
            .map(|d| d.saturating_duration_since(now).as_millis());
        (measured, remaining)
    };

    match (measured, remaining) {
        (true, _) => request_frame(shared),
        // Timer fired a little early against our clock.
        (false, Some(millis)) => arm_timeout(shared, millis.max(1)),
        (false, None) => {}
    }
}

fn request_frame(shared: &Rc<Shared>) {
    if !shared.state.borrow_mut().controller.request_frame() {
        return;
    }
    let weak = Rc::downgrade(shared);
    match AnimationFrame::new(move || with_shared(&weak, on_frame)) {
        Ok(frame) => shared.state.borrow_mut().frame = Some(frame),
        Err(e) => tracing::warn!(target: "weaver::highlight::align", error = %e, "could not request frame"),
    }
}

fn on_frame(shared: &Rc<Shared>) {
    let rows = {
        let mut guard = shared.state.borrow_mut();
        let state = &mut *guard;
        let scroll_top = state.surface.scroll_top();
        state.controller.on_frame(scroll_top, &state.highlights)
    };
    if let Some(rows) = rows {
        (shared.on_rows.borrow_mut())(&rows);
    }
}

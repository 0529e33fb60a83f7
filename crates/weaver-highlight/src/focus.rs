//! Highlight focus and click-cycling state.
//!
//! Overlapping highlights share markers, so a click on a marker can mean any
//! of its active ids. Repeated clicks on the same marker walk through them;
//! a click anywhere else starts over from the topmost.

use smol_str::SmolStr;

/// Memory of the last click, for cycling.
#[derive(Debug, Clone)]
struct Cycle<K> {
    element: K,
    active_ids: Vec<SmolStr>,
    index: usize,
}

/// Focus state machine.
///
/// `K` is the host's handle for a clicked marker element. It only needs to
/// compare equal for the same element.
///
/// Two transitions are stricter than plain "focus, click, edit":
///
/// - Focusing a different highlight leaves bounds editing, not only
///   focusing nothing. Edit mode always belongs to the focused id.
/// - Click cycling continues only when the same element reports the same
///   active ids as the previous click. A re-render can reuse an element
///   for a different overlap set, and the old cycle index means nothing
///   there.
#[derive(Debug, Clone)]
pub struct FocusState<K> {
    focused_id: Option<SmolStr>,
    editing_bounds: bool,
    cycle: Option<Cycle<K>>,
}

impl<K> Default for FocusState<K> {
    fn default() -> Self {
        Self {
            focused_id: None,
            editing_bounds: false,
            cycle: None,
        }
    }
}

impl<K: PartialEq> FocusState<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focused_id(&self) -> Option<&SmolStr> {
        self.focused_id.as_ref()
    }

    pub fn is_editing_bounds(&self) -> bool {
        self.editing_bounds
    }

    /// Focus a highlight, or nothing.
    ///
    /// Edit mode only survives re-focusing the same id.
    pub fn focus(&mut self, id: Option<SmolStr>) {
        if id.is_none() || id != self.focused_id {
            self.editing_bounds = false;
        }
        tracing::debug!(target: "weaver::highlight::focus", id = ?id, "focus");
        self.focused_id = id;
    }

    /// A marker was clicked. Returns the newly focused id.
    ///
    /// Clicking the same element again with the same active ids advances
    /// through them cyclically; anything else focuses `topmost`.
    pub fn click(&mut self, element: K, active_ids: &[SmolStr], topmost: &str) -> Option<&SmolStr> {
        if active_ids.is_empty() {
            self.clear_focus();
            return None;
        }

        let next = match &mut self.cycle {
            Some(cycle)
                if cycle.element == element
                    && cycle.active_ids == active_ids
                    && active_ids.len() > 1 =>
            {
                cycle.index = (cycle.index + 1) % active_ids.len();
                active_ids[cycle.index].clone()
            }
            _ => {
                let index = active_ids.iter().position(|id| id == topmost).unwrap_or(0);
                self.cycle = Some(Cycle {
                    element,
                    active_ids: active_ids.to_vec(),
                    index,
                });
                active_ids[index].clone()
            }
        };

        self.focus(Some(next));
        self.focused_id.as_ref()
    }

    /// Enter bounds-editing mode. Only possible while something is focused.
    pub fn start_edit_bounds(&mut self) -> bool {
        if self.focused_id.is_none() {
            return false;
        }
        self.editing_bounds = true;
        true
    }

    pub fn cancel_edit_bounds(&mut self) {
        self.editing_bounds = false;
    }

    /// Drop focus, edit mode and cycling memory.
    pub fn clear_focus(&mut self) {
        self.focused_id = None;
        self.editing_bounds = false;
        self.cycle = None;
    }

    /// Highlights were refetched. Clears focus if the focused id is gone.
    pub fn reconcile_after_refetch(&mut self, ids: &[SmolStr]) {
        let Some(focused) = &self.focused_id else {
            return;
        };
        if !ids.contains(focused) {
            tracing::debug!(
                target: "weaver::highlight::focus",
                id = %focused,
                "focused highlight no longer exists"
            );
            self.clear_focus();
        }
    }
}

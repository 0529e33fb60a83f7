//! Layout-shift listeners.
//!
//! Images finishing load (or failing) and elements changing size both move
//! anchors after the last measurement. Each watcher calls back so the owner
//! can re-arm measurement; dropping a watcher removes its listeners.

use gloo_events::EventListener;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use weaver_highlight::PlatformError;

/// Load and error listeners on every image inside a content root.
pub struct ImageWatcher {
    listeners: Vec<EventListener>,
}

impl ImageWatcher {
    /// Watch images that are still loading. Already-complete images are
    /// skipped; they cannot shift layout any more.
    pub fn new(root: &web_sys::Element, on_settled: impl Fn() + Clone + 'static) -> Self {
        let mut listeners = Vec::new();
        let images = match root.query_selector_all("img") {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(target: "weaver::highlight::align", error = ?e, "image query failed");
                return Self { listeners };
            }
        };

        for i in 0..images.length() {
            let Some(img) = images
                .item(i)
                .and_then(|n| n.dyn_into::<web_sys::HtmlImageElement>().ok())
            else {
                continue;
            };
            if img.complete() {
                continue;
            }
            for event in ["load", "error"] {
                let cb = on_settled.clone();
                listeners.push(EventListener::new(&img, event, move |_| cb()));
            }
        }

        tracing::debug!(
            target: "weaver::highlight::align",
            listeners = listeners.len(),
            "watching images"
        );
        Self { listeners }
    }

    /// True when no image is being watched.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// A `ResizeObserver` on one or more elements.
pub struct ResizeWatcher {
    observer: web_sys::ResizeObserver,
    _callback: Closure<dyn FnMut(js_sys::Array, web_sys::ResizeObserver)>,
}

impl ResizeWatcher {
    pub fn new(
        targets: &[&web_sys::Element],
        mut on_resize: impl FnMut() + 'static,
    ) -> Result<Self, PlatformError> {
        let callback = Closure::wrap(Box::new(
            move |_entries: js_sys::Array, _observer: web_sys::ResizeObserver| on_resize(),
        )
            as Box<dyn FnMut(js_sys::Array, web_sys::ResizeObserver)>);
        let observer = web_sys::ResizeObserver::new(callback.as_ref().unchecked_ref())
            .map_err(|e| PlatformError::from(format!("ResizeObserver failed: {e:?}")))?;
        for target in targets {
            observer.observe(target);
        }
        Ok(Self {
            observer,
            _callback: callback,
        })
    }
}

impl Drop for ResizeWatcher {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

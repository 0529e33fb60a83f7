//! Timer and animation-frame handles.
//!
//! Each handle owns its callback and cancels the pending browser callback
//! when dropped, so replacing or dropping a handle is the cancel operation.

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use weaver_highlight::PlatformError;

/// A pending `setTimeout` callback.
pub struct Timeout {
    handle: i32,
    _callback: Closure<dyn FnMut()>,
}

impl Timeout {
    pub fn new(millis: u32, callback: impl FnOnce() + 'static) -> Result<Self, PlatformError> {
        let window = web_sys::window().ok_or("no window")?;
        let callback = Closure::once(callback);
        let handle = window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                callback.as_ref().unchecked_ref(),
                i32::try_from(millis).unwrap_or(i32::MAX),
            )
            .map_err(|e| PlatformError::from(format!("setTimeout failed: {e:?}")))?;
        Ok(Self {
            handle,
            _callback: callback,
        })
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        if let Some(window) = web_sys::window() {
            window.clear_timeout_with_handle(self.handle);
        }
    }
}

/// A pending `requestAnimationFrame` callback.
pub struct AnimationFrame {
    handle: i32,
    _callback: Closure<dyn FnMut()>,
}

impl AnimationFrame {
    pub fn new(callback: impl FnOnce() + 'static) -> Result<Self, PlatformError> {
        let window = web_sys::window().ok_or("no window")?;
        let callback = Closure::once(callback);
        let handle = window
            .request_animation_frame(callback.as_ref().unchecked_ref())
            .map_err(|e| PlatformError::from(format!("requestAnimationFrame failed: {e:?}")))?;
        Ok(Self {
            handle,
            _callback: callback,
        })
    }
}

impl Drop for AnimationFrame {
    fn drop(&mut self) {
        if let Some(window) = web_sys::window() {
            let _ = window.cancel_animation_frame(self.handle);
        }
    }
}

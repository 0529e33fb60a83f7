//! Debounce and frame-throttle state.
//!
//! Both are plain state machines driven by the host: the host arms timers or
//! animation frames when asked and calls back in. Nothing here sleeps or
//! spawns.

use std::time::Duration;

use web_time::Instant;

/// Coalesces bursts of triggers into one call after a quiet period.
///
/// Every trigger replaces the pending deadline.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm, or re-arm, the debouncer. Returns the new deadline.
    pub fn trigger(&mut self, now: Instant) -> Instant {
        let deadline = now + self.delay;
        self.deadline = Some(deadline);
        deadline
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consume the pending call if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

/// At most one pending invocation per animation frame.
///
/// Requests made while a frame is pending are coalesced into it.
#[derive(Debug, Clone, Default)]
pub struct FrameThrottle {
    pending: bool,
}

impl FrameThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a frame. Returns true when the host must schedule one.
    pub fn request(&mut self) -> bool {
        if self.pending {
            return false;
        }
        self.pending = true;
        true
    }

    /// The scheduled frame fired. Returns whether work is due.
    pub fn begin_frame(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn cancel(&mut self) {
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debouncer_replaces_deadline() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(150));

        debouncer.trigger(start);
        let later = debouncer.trigger(start + Duration::from_millis(100));
        assert_eq!(later, start + Duration::from_millis(250));

        // The first deadline has passed but was replaced.
        assert!(!debouncer.poll(start + Duration::from_millis(160)));
        assert!(debouncer.poll(start + Duration::from_millis(250)));
        assert!(!debouncer.is_pending());
        assert!(!debouncer.poll(start + Duration::from_millis(400)));
    }

    #[test]
    fn test_debouncer_cancel() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        debouncer.trigger(start);
        debouncer.cancel();
        assert!(!debouncer.poll(start + Duration::from_secs(1)));
    }

    #[test]
    fn test_frame_throttle_coalesces() {
        let mut throttle = FrameThrottle::new();
        assert!(throttle.request());
        assert!(!throttle.request());
        assert!(!throttle.request());

        assert!(throttle.begin_frame());
        assert!(!throttle.begin_frame());
        assert!(throttle.request());
    }

    #[test]
    fn test_frame_throttle_cancel() {
        let mut throttle = FrameThrottle::new();
        throttle.request();
        throttle.cancel();
        assert!(!throttle.is_pending());
        assert!(!throttle.begin_frame());
    }
}

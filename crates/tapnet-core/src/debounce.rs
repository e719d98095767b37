//! Time-gated debounce for button notifications
//!
//! Safe to call from the input callback: acceptance is a single
//! compare-and-swap per input, no locks and no allocation.

use crate::types::{InputId, TimeSource};
use std::sync::atomic::{AtomicU64, Ordering};

/// Slot value for an input that has never been accepted
const NEVER: u64 = 0;

/// Drops repeat notifications for the same input inside a fixed window
pub struct Debouncer<T: TimeSource> {
    window_ms: u64,
    /// Last accepted time per input, stored as `millis + 1` so zero means never
    last_accepted: Box<[AtomicU64]>,
    time_source: T,
}

impl<T: TimeSource> Debouncer<T> {
    pub fn new(window_ms: u64, inputs: usize, time_source: T) -> Self {
        let last_accepted = (0..inputs).map(|_| AtomicU64::new(NEVER)).collect();
        Self {
            window_ms,
            last_accepted,
            time_source,
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Returns true when this notification should be acted on
    ///
    /// Inputs outside the tracked range are never gated.
    pub fn accept(&self, input: InputId) -> bool {
        let Some(slot) = self.last_accepted.get(input.index()) else {
            return true;
        };

        let now = self.time_source.now().as_millis();
        let mut previous = slot.load(Ordering::Acquire);
        loop {
            if previous != NEVER && now.saturating_sub(previous - 1) < self.window_ms {
                return false;
            }
            match slot.compare_exchange_weak(
                previous,
                now.saturating_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(current) => previous = current,
            }
        }
    }

    /// Forget the last acceptance for every input
    pub fn reset(&self) {
        for slot in self.last_accepted.iter() {
            slot.store(NEVER, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        fn advance(&self, millis: u64) {
            self.0.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl TimeSource for ManualClock {
        fn now(&self) -> Timestamp {
            Timestamp::new(self.0.load(Ordering::SeqCst))
        }
    }

    #[test]
    fn test_repeat_inside_window_rejected() {
        let clock = ManualClock::default();
        let debouncer = Debouncer::new(200, 5, clock.clone());
        let input = InputId::new(2);

        assert!(debouncer.accept(input));
        clock.advance(50);
        assert!(!debouncer.accept(input));
        clock.advance(149);
        assert!(!debouncer.accept(input));
    }

    #[test]
    fn test_repeat_after_window_accepted() {
        let clock = ManualClock::default();
        let debouncer = Debouncer::new(200, 5, clock.clone());
        let input = InputId::new(1);

        assert!(debouncer.accept(input));
        clock.advance(201);
        assert!(debouncer.accept(input));
    }

    #[test]
    fn test_inputs_are_gated_independently() {
        let clock = ManualClock::default();
        let debouncer = Debouncer::new(200, 5, clock.clone());

        assert!(debouncer.accept(InputId::new(0)));
        assert!(debouncer.accept(InputId::new(1)));
        assert!(!debouncer.accept(InputId::new(0)));
    }

    #[test]
    fn test_rejected_press_does_not_extend_window() {
        let clock = ManualClock::default();
        let debouncer = Debouncer::new(100, 1, clock.clone());
        let input = InputId::new(0);

        assert!(debouncer.accept(input));
        clock.advance(60);
        assert!(!debouncer.accept(input));
        clock.advance(40);
        assert!(debouncer.accept(input));
    }

    #[test]
    fn test_untracked_input_is_not_gated() {
        let debouncer = Debouncer::new(100, 2, ManualClock::default());
        assert!(debouncer.accept(InputId::new(7)));
        assert!(debouncer.accept(InputId::new(7)));
    }
}

//! Coalescing action signal
//!
//! Producers OR bits in from the input callback; exactly one consumer task
//! waits and drains them. Bits are never lost once asserted: they stay set
//! until a drain returns them.

use crate::action::ActionEvent;
use core::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Notify;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, trace};

pub struct ActionSignal {
    bits: AtomicU32,
    notify: Notify,
}

impl Default for ActionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSignal")
            .field("pending", &self.pending())
            .finish()
    }
}

impl ActionSignal {
    pub fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
            notify: Notify::new(),
        }
    }

    /// OR `bits` into the signal and wake the consumer
    ///
    /// Never blocks; callable from the input callback.
    pub fn assert(&self, bits: ActionEvent) {
        if bits.is_empty() {
            return;
        }
        let previous = self.bits.fetch_or(bits.bits(), Ordering::AcqRel);
        trace!(
            "Asserted {:?} (pending before: {:?})",
            bits,
            ActionEvent::from_bits_truncate(previous)
        );
        self.notify.notify_one();
    }

    /// Bits currently set, without clearing them
    pub fn pending(&self) -> ActionEvent {
        ActionEvent::from_bits_truncate(self.bits.load(Ordering::Acquire))
    }

    /// Atomically clear and return the bits of `mask` that are set
    pub fn try_drain(&self, mask: ActionEvent) -> ActionEvent {
        let previous = self.bits.fetch_and(!mask.bits(), Ordering::AcqRel);
        ActionEvent::from_bits_truncate(previous & mask.bits())
    }

    /// Wait until a bit in `mask` is set, then drain the masked bits
    ///
    /// Returns `None` when `timeout` elapses first. With `timeout = None` the
    /// wait is unbounded. The returned set is never empty.
    pub async fn wait_and_drain(
        &self,
        mask: ActionEvent,
        timeout: Option<Duration>,
    ) -> Option<ActionEvent> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut woken = false;

        loop {
            // Register before checking so an assert between the check and the
            // await still wakes us.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let drained = self.try_drain(mask);
            if !drained.is_empty() {
                return Some(drained);
            }
            if woken {
                debug!("Action signal woke with no pending bits in {:?}, waiting again", mask);
            }

            match deadline {
                Some(deadline) => {
                    if timeout_at(deadline, notified).await.is_err() {
                        return None;
                    }
                }
                None => notified.await,
            }
            woken = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_drain_returns_union_of_asserts() {
        let signal = ActionSignal::new();
        signal.assert(ActionEvent::GENERIC_HTTP);
        signal.assert(ActionEvent::PROTO_REQUEST);
        signal.assert(ActionEvent::GENERIC_HTTP);

        let drained = signal
            .wait_and_drain(ActionEvent::all(), Some(Duration::from_millis(10)))
            .await;
        assert_eq!(
            drained,
            Some(ActionEvent::GENERIC_HTTP | ActionEvent::PROTO_REQUEST)
        );
        assert!(signal.pending().is_empty());
    }

    #[tokio::test]
    async fn test_second_drain_times_out() {
        let signal = ActionSignal::new();
        signal.assert(ActionEvent::OTA_DOWNLOAD);

        let first = signal
            .wait_and_drain(ActionEvent::all(), Some(Duration::from_millis(10)))
            .await;
        assert_eq!(first, Some(ActionEvent::OTA_DOWNLOAD));

        // The stale wakeup permit from the assert must not produce an empty result
        let second = signal
            .wait_and_drain(ActionEvent::all(), Some(Duration::from_millis(20)))
            .await;
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn test_mask_leaves_other_bits_pending() {
        let signal = ActionSignal::new();
        signal.assert(ActionEvent::GENERIC_HTTP | ActionEvent::GET_OTA_PATH);

        let drained = signal
            .wait_and_drain(ActionEvent::GET_OTA_PATH, Some(Duration::from_millis(10)))
            .await;
        assert_eq!(drained, Some(ActionEvent::GET_OTA_PATH));
        assert_eq!(signal.pending(), ActionEvent::GENERIC_HTTP);
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_later_assert() {
        let signal = Arc::new(ActionSignal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait_and_drain(ActionEvent::all(), None).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.assert(ActionEvent::PROTO_REQUEST);

        let drained = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");
        assert_eq!(drained, Some(ActionEvent::PROTO_REQUEST));
    }

    #[tokio::test]
    async fn test_empty_assert_is_ignored() {
        let signal = ActionSignal::new();
        signal.assert(ActionEvent::NONE);
        let drained = signal
            .wait_and_drain(ActionEvent::all(), Some(Duration::from_millis(10)))
            .await;
        assert_eq!(drained, None);
    }
}

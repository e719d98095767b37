//! Shared device state
//!
//! Scalars written by the input callback and read by long-lived tasks.
//! Last write wins; no multi-field consistency is promised.

use crate::errors::{TapnetError, TapnetResult};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

// ----------------------------------------------------------------------------
// Indicator State
// ----------------------------------------------------------------------------

/// Current blink interval of the indicator
#[derive(Debug)]
pub struct IndicatorState {
    interval_ms: AtomicU32,
}

impl IndicatorState {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms: AtomicU32::new(interval_ms),
        }
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms.load(Ordering::Relaxed)
    }

    pub fn set_interval_ms(&self, interval_ms: u32) {
        self.interval_ms.store(interval_ms, Ordering::Relaxed);
    }
}

// ----------------------------------------------------------------------------
// Busy Flag
// ----------------------------------------------------------------------------

/// Single in-flight request indicator
///
/// Backed by a one-permit semaphore. Held as a [`BusyGuard`]; the flag clears
/// when the guard drops, so every exit path of a request releases it.
#[derive(Debug, Clone)]
pub struct BusyFlag {
    slot: Arc<Semaphore>,
}

impl Default for BusyFlag {
    fn default() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Mark a request in flight; `None` if one already is
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.slot
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| BusyGuard { _permit: permit })
    }

    /// Wait for the in-flight request, if any, to finish, then take the slot
    pub async fn acquire(&self) -> TapnetResult<BusyGuard> {
        let permit = self
            .slot
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TapnetError::channel_error("busy flag closed"))?;
        Ok(BusyGuard { _permit: permit })
    }
}

/// Proof that the current task owns the in-flight slot
#[derive(Debug)]
pub struct BusyGuard {
    _permit: OwnedSemaphorePermit,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        trace!("Busy flag cleared");
    }
}

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

/// State handed to tasks at startup
#[derive(Debug)]
pub struct SharedState {
    pub indicator: IndicatorState,
    pub busy: BusyFlag,
    boot_count: AtomicU32,
}

impl SharedState {
    pub fn new(default_interval_ms: u32) -> Self {
        Self {
            indicator: IndicatorState::new(default_interval_ms),
            busy: BusyFlag::new(),
            boot_count: AtomicU32::new(0),
        }
    }

    pub fn boot_count(&self) -> u32 {
        self.boot_count.load(Ordering::Relaxed)
    }

    pub fn set_boot_count(&self, count: u32) {
        self.boot_count.store(count, Ordering::Relaxed);
    }
}

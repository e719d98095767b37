//! Indicator blink loop
//!
//! Toggles the indicator at the interval currently stored in the shared
//! state. Runs independently of the network path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tapnet_core::{SharedState, TapnetResult, MIN_BLINK_INTERVAL_MS};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

/// Output driving the status light
pub trait Indicator: Send {
    /// Flip the output, returning the new level
    fn toggle(&mut self) -> TapnetResult<bool>;
}

/// In-memory LED for hosts without one
#[derive(Debug, Clone, Default)]
pub struct SimulatedLed {
    on: Arc<AtomicBool>,
    toggles: Arc<AtomicU64>,
}

impl SimulatedLed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Relaxed)
    }

    pub fn toggle_count(&self) -> u64 {
        self.toggles.load(Ordering::Relaxed)
    }
}

impl Indicator for SimulatedLed {
    fn toggle(&mut self) -> TapnetResult<bool> {
        let on = !self.on.fetch_xor(true, Ordering::Relaxed);
        self.toggles.fetch_add(1, Ordering::Relaxed);
        Ok(on)
    }
}

pub struct IndicatorTask {
    indicator: Box<dyn Indicator>,
    state: Arc<SharedState>,
    shutdown: watch::Receiver<bool>,
}

impl IndicatorTask {
    pub fn new(
        indicator: Box<dyn Indicator>,
        state: Arc<SharedState>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            indicator,
            state,
            shutdown,
        }
    }

    /// Blink until shutdown; a failed toggle stops only this loop
    pub async fn run(&mut self) -> TapnetResult<()> {
        info!("Indicator task starting");

        loop {
            match self.indicator.toggle() {
                Ok(on) => debug!("LED state: {}", u8::from(on)),
                Err(e) => {
                    error!("Indicator toggle failed, stopping blink loop: {}", e);
                    return Err(e);
                }
            }

            let interval_ms = self.state.indicator.interval_ms().max(MIN_BLINK_INTERVAL_MS);
            let interval = Duration::from_millis(interval_ms as u64);
            tokio::select! {
                _ = sleep(interval) => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Indicator task stopped");
        Ok(())
    }
}

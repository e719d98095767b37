//! Debounced Input Source
//!
//! [`InputSource::on_edge`] is the hardware callback: it runs in a context
//! that must not block, so it only touches atomics and the action signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tapnet_core::{
    ActionEvent, ActionSignal, BindingTable, Debouncer, InputError, InputId, PinMap, SharedState,
    SystemTimeSource, TimeSource,
};
use tracing::{debug, info, warn};

// ----------------------------------------------------------------------------
// Input Pins
// ----------------------------------------------------------------------------

/// A physical input line
pub trait InputPin {
    fn pin(&self) -> u32;

    /// Whether the hardware behind the pin came up
    fn is_ready(&self) -> bool;
}

/// Button backed by nothing; the host drives it through `on_edge`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedButton {
    pin: u32,
    ready: bool,
}

impl SimulatedButton {
    pub fn new(pin: u32) -> Self {
        Self { pin, ready: true }
    }

    pub fn not_ready(pin: u32) -> Self {
        Self { pin, ready: false }
    }
}

impl InputPin for SimulatedButton {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

// ----------------------------------------------------------------------------
// Input Source
// ----------------------------------------------------------------------------

/// Result of one edge notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// Binding applied; `actions` were asserted on the signal
    Accepted { input: InputId, actions: ActionEvent },
    /// Repeat inside the debounce window
    Debounced(InputId),
    /// Blink interval applied, network actions dropped while a request is in flight
    Suppressed { input: InputId, actions: ActionEvent },
    /// Input was never registered or its hardware is not ready
    NotReady(InputId),
    /// Pin or input without a mapping
    Unrecognized { pin: u32 },
}

pub struct InputSource<T: TimeSource = SystemTimeSource> {
    pins: PinMap,
    bindings: BindingTable,
    debouncer: Debouncer<T>,
    ready: Box<[AtomicBool]>,
    signal: Arc<ActionSignal>,
    state: Arc<SharedState>,
}

impl<T: TimeSource> InputSource<T> {
    pub fn new(
        pins: PinMap,
        bindings: BindingTable,
        debounce_window_ms: u64,
        time_source: T,
        signal: Arc<ActionSignal>,
        state: Arc<SharedState>,
    ) -> Self {
        let inputs = bindings
            .max_input()
            .map_or(0, |input| input.index() + 1);
        Self {
            pins,
            bindings,
            debouncer: Debouncer::new(debounce_window_ms, inputs, time_source),
            ready: (0..inputs).map(|_| AtomicBool::new(false)).collect(),
            signal,
            state,
        }
    }

    /// Bring up one input; a failure leaves the other inputs untouched
    pub fn register<P: InputPin + ?Sized>(&self, pin: &P) -> Result<InputId, InputError> {
        let input = self
            .pins
            .input_for(pin.pin())
            .ok_or(InputError::PinUnavailable { pin: pin.pin() })?;
        let slot = self
            .ready
            .get(input.index())
            .ok_or(InputError::PinUnavailable { pin: pin.pin() })?;

        if !pin.is_ready() {
            return Err(InputError::NotReady {
                input: input.as_u8(),
            });
        }
        slot.store(true, Ordering::Release);
        debug!("Registered pin {} as {}", pin.pin(), input);
        Ok(input)
    }

    /// Register every pin, logging the ones that fail
    pub fn register_all<P: InputPin>(&self, pins: &[P]) -> Vec<InputId> {
        pins.iter()
            .filter_map(|pin| match self.register(pin) {
                Ok(input) => Some(input),
                Err(e) => {
                    warn!("Skipping pin {}: {}", pin.pin(), e);
                    None
                }
            })
            .collect()
    }

    pub fn is_ready(&self, input: InputId) -> bool {
        self.ready
            .get(input.index())
            .is_some_and(|slot| slot.load(Ordering::Acquire))
    }

    /// Hardware edge callback for `pin`
    pub fn on_edge(&self, pin: u32) -> InputOutcome {
        let Some(input) = self.pins.input_for(pin) else {
            warn!("Unrecognized input pin {}", pin);
            return InputOutcome::Unrecognized { pin };
        };
        if !self.is_ready(input) {
            debug!("Ignoring {}: not ready", input);
            return InputOutcome::NotReady(input);
        }
        if !self.debouncer.accept(input) {
            return InputOutcome::Debounced(input);
        }
        let Some(binding) = self.bindings.lookup(input) else {
            warn!("No binding for {}", input);
            return InputOutcome::Unrecognized { pin };
        };

        self.state
            .indicator
            .set_interval_ms(binding.blink_interval_ms);
        info!(
            "Button {} pressed: blink interval {}ms",
            input.as_u8(),
            binding.blink_interval_ms
        );

        let actions = binding.actions;
        if actions.is_empty() {
            return InputOutcome::Accepted { input, actions };
        }
        if self.state.busy.is_busy() {
            info!("Request in flight, ignoring {:?} from {}", actions, input);
            return InputOutcome::Suppressed { input, actions };
        }

        self.signal.assert(actions);
        InputOutcome::Accepted { input, actions }
    }
}

//! Button bindings
//!
//! Static mapping from a physical input to the blink interval it selects and
//! the network actions it requests. Read-only at runtime.

use crate::action::ActionEvent;
use crate::types::InputId;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Shortest blink interval a binding may select
pub const MIN_BLINK_INTERVAL_MS: u32 = 10;

// ----------------------------------------------------------------------------
// Button Binding
// ----------------------------------------------------------------------------

/// What one button press does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonBinding {
    pub input: InputId,
    pub blink_interval_ms: u32,
    pub actions: ActionEvent,
}

impl ButtonBinding {
    pub const fn new(input: u8, blink_interval_ms: u32, actions: ActionEvent) -> Self {
        Self {
            input: InputId::new(input),
            blink_interval_ms,
            actions,
        }
    }

    /// Whether pressing this button requests any network traffic
    pub fn requests_network(&self) -> bool {
        !self.actions.is_empty()
    }
}

/// Default board wiring: five buttons, four of them bound to network actions
pub const DEFAULT_BINDINGS: [ButtonBinding; 5] = [
    ButtonBinding::new(0, 100, ActionEvent::NONE),
    ButtonBinding::new(1, 200, ActionEvent::OTA_DOWNLOAD),
    ButtonBinding::new(2, 500, ActionEvent::GENERIC_HTTP),
    ButtonBinding::new(3, 1000, ActionEvent::PROTO_REQUEST),
    ButtonBinding::new(4, 2000, ActionEvent::GET_OTA_PATH),
];

// ----------------------------------------------------------------------------
// Binding Table
// ----------------------------------------------------------------------------

/// Lookup table from input identifier to binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ButtonBinding>", into = "Vec<ButtonBinding>")]
pub struct BindingTable {
    bindings: Vec<ButtonBinding>,
}

impl From<Vec<ButtonBinding>> for BindingTable {
    fn from(bindings: Vec<ButtonBinding>) -> Self {
        Self::new(bindings)
    }
}

impl From<BindingTable> for Vec<ButtonBinding> {
    fn from(table: BindingTable) -> Self {
        table.bindings
    }
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::new(DEFAULT_BINDINGS.to_vec())
    }
}

impl BindingTable {
    /// Build a table; intervals below [`MIN_BLINK_INTERVAL_MS`] are raised to it
    pub fn new(mut bindings: Vec<ButtonBinding>) -> Self {
        for binding in &mut bindings {
            if binding.blink_interval_ms < MIN_BLINK_INTERVAL_MS {
                warn!(
                    "{} blink interval {}ms raised to {}ms",
                    binding.input, binding.blink_interval_ms, MIN_BLINK_INTERVAL_MS
                );
                binding.blink_interval_ms = MIN_BLINK_INTERVAL_MS;
            }
        }
        Self { bindings }
    }

    pub fn lookup(&self, input: InputId) -> Option<&ButtonBinding> {
        self.bindings.iter().find(|binding| binding.input == input)
    }

    pub fn bindings(&self) -> &[ButtonBinding] {
        &self.bindings
    }

    /// Highest input index in the table, used to size per-input state
    pub fn max_input(&self) -> Option<InputId> {
        self.bindings.iter().map(|binding| binding.input).max()
    }
}

// ----------------------------------------------------------------------------
// Pin Map
// ----------------------------------------------------------------------------

/// Hardware pin to logical input mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinMap {
    entries: Vec<(u32, InputId)>,
}

impl Default for PinMap {
    /// Pin N drives input N for the five default buttons
    fn default() -> Self {
        Self::new((0..DEFAULT_BINDINGS.len() as u8).map(|i| (i as u32, InputId::new(i))))
    }
}

impl PinMap {
    pub fn new<I: IntoIterator<Item = (u32, InputId)>>(entries: I) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn input_for(&self, pin: u32) -> Option<InputId> {
        self.entries
            .iter()
            .find(|(p, _)| *p == pin)
            .map(|(_, input)| *input)
    }

    pub fn pins(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(pin, _)| *pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_matches_board_wiring() {
        let table = BindingTable::default();

        let idle = table.lookup(InputId::new(0)).unwrap();
        assert_eq!(idle.blink_interval_ms, 100);
        assert!(!idle.requests_network());

        let http = table.lookup(InputId::new(2)).unwrap();
        assert_eq!(http.blink_interval_ms, 500);
        assert_eq!(http.actions, ActionEvent::GENERIC_HTTP);

        let proto = table.lookup(InputId::new(3)).unwrap();
        assert_eq!(proto.actions, ActionEvent::PROTO_REQUEST);

        assert_eq!(table.max_input(), Some(InputId::new(4)));
    }

    #[test]
    fn test_zero_interval_is_raised() {
        let table = BindingTable::new(vec![
            ButtonBinding::new(0, 0, ActionEvent::NONE),
            ButtonBinding::new(1, 300, ActionEvent::GENERIC_HTTP),
        ]);
        assert_eq!(
            table.lookup(InputId::new(0)).unwrap().blink_interval_ms,
            MIN_BLINK_INTERVAL_MS
        );
        assert_eq!(table.lookup(InputId::new(1)).unwrap().blink_interval_ms, 300);
    }

    #[test]
    fn test_unknown_input_has_no_binding() {
        let table = BindingTable::default();
        assert!(table.lookup(InputId::new(9)).is_none());
    }

    #[test]
    fn test_pin_map_lookup() {
        let map = PinMap::new([(13, InputId::new(0)), (14, InputId::new(1))]);
        assert_eq!(map.input_for(14), Some(InputId::new(1)));
        assert_eq!(map.input_for(15), None);
        assert_eq!(PinMap::default().input_for(4), Some(InputId::new(4)));
    }
}

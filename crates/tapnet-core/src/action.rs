//! Network actions a button press can request
//!
//! `ActionEvent` is the bitmask carried by the event signal; `Action` names a
//! single bit and fixes the order in which the dispatcher services them.

use bitflags::bitflags;
use core::fmt;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Set of pending network actions
    ///
    /// Setting is idempotent; the empty set is the `None` action.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ActionEvent: u32 {
        const GENERIC_HTTP = 1 << 0;
        const OTA_DOWNLOAD = 1 << 1;
        const PROTO_REQUEST = 1 << 2;
        const GET_OTA_PATH = 1 << 3;
    }
}

impl ActionEvent {
    /// No network action
    pub const NONE: ActionEvent = ActionEvent::empty();

    /// Iterate the actions in this set in dispatch priority order
    pub fn actions(self) -> impl Iterator<Item = Action> {
        Action::PRIORITY
            .into_iter()
            .filter(move |action| self.contains(action.bit()))
    }
}

impl From<Action> for ActionEvent {
    fn from(action: Action) -> Self {
        action.bit()
    }
}

/// A single network action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    GenericHttp,
    OtaDownload,
    ProtoRequest,
    GetOtaPath,
}

impl Action {
    /// Dispatch order for simultaneously asserted actions
    pub const PRIORITY: [Action; 4] = [
        Action::GenericHttp,
        Action::OtaDownload,
        Action::ProtoRequest,
        Action::GetOtaPath,
    ];

    pub const fn bit(self) -> ActionEvent {
        match self {
            Action::GenericHttp => ActionEvent::GENERIC_HTTP,
            Action::OtaDownload => ActionEvent::OTA_DOWNLOAD,
            Action::ProtoRequest => ActionEvent::PROTO_REQUEST,
            Action::GetOtaPath => ActionEvent::GET_OTA_PATH,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::GenericHttp => write!(f, "GenericHttp"),
            Action::OtaDownload => write!(f, "OtaDownload"),
            Action::ProtoRequest => write!(f, "ProtoRequest"),
            Action::GetOtaPath => write!(f, "GetOtaPath"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_follow_priority_order() {
        let event = ActionEvent::GET_OTA_PATH | ActionEvent::GENERIC_HTTP | ActionEvent::PROTO_REQUEST;
        let actions: Vec<Action> = event.actions().collect();
        assert_eq!(
            actions,
            vec![Action::GenericHttp, Action::ProtoRequest, Action::GetOtaPath]
        );
    }

    #[test]
    fn test_none_has_no_actions() {
        assert_eq!(ActionEvent::NONE.actions().count(), 0);
        assert!(ActionEvent::NONE.is_empty());
    }

    #[test]
    fn test_bits_are_distinct() {
        let all = Action::PRIORITY
            .iter()
            .fold(ActionEvent::NONE, |acc, action| acc | action.bit());
        assert_eq!(all, ActionEvent::all());
        assert_eq!(all.bits().count_ones(), 4);
    }
}

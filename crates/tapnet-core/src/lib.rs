//! Tapnet Core
//!
//! This crate provides the types shared by the tapnet dispatch pipeline: the
//! action bit set and button bindings, the coalescing action signal and the
//! session ownership queue, the debounce gate, shared device state, the
//! streaming binary codec with its status messages, and persistent settings.
//!
//! Everything here is runtime-agnostic apart from the async waits on the
//! signal and queue; the socket and task layer lives in `tapnet-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod action;
pub mod bindings;
pub mod channel;
pub mod config;
pub mod debounce;
pub mod errors;
pub mod protocol;
pub mod state;
pub mod storage;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use action::{Action, ActionEvent};
pub use bindings::{BindingTable, ButtonBinding, PinMap, DEFAULT_BINDINGS, MIN_BLINK_INTERVAL_MS};
pub use channel::{
    create_session_queue, session_queue, ActionSignal, HandoffError, SessionHandoff,
    SessionTaker, TakeError,
};
pub use config::{
    DebounceConfig, HttpConfig, IndicatorConfig, ProtoConfig, ProtoTransport, SessionConfig,
    StorageConfig, TapnetConfig,
};
pub use debounce::Debouncer;
pub use errors::{CodecError, InputError, Result, SessionError, TapnetError, TapnetResult};
pub use protocol::{
    decode, encode, encode_frame, FixedBuffer, FrameDecoder, RequestBuffer, ResponseBuffer,
    StatusRequest, StatusResponse, WireMessage, FRAME_HEADER_LEN, REQUEST_CAPACITY,
    RESPONSE_CAPACITY,
};
pub use state::{BusyFlag, BusyGuard, IndicatorState, SharedState};
pub use storage::{BootCounter, MemorySettingsStore, SettingsStore};
pub use types::{AddressFamily, InputId, SystemTimeSource, TimeSource, Timestamp};

/// Application version reported by the CLI
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

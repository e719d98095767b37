//! Error types for tapnet
//!
//! This module contains every error raised by the dispatch pipeline: input
//! setup, socket sessions, the binary codec, and the `TapnetError` type that
//! unifies them. None of these errors is fatal to the process; callers log
//! them at the point where they are absorbed.

use crate::action::Action;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Errors raised while bringing up physical inputs
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Input {input} is not ready")]
    NotReady { input: u8 },
    #[error("Pin {pin} is not available for input")]
    PinUnavailable { pin: u32 },
}

/// Socket session errors, classified the way the dispatcher reports them
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Address resolution failed for {host}: {reason}")]
    AddressResolutionFailed { host: String, reason: String },
    #[error("Socket creation failed: {reason}")]
    SocketCreateFailed { reason: String },
    #[error("Connect to {addr} failed: {reason}")]
    ConnectFailed {
        addr: String,
        reason: String,
        errno: Option<i32>,
    },
    #[error("Connect to {addr} timed out after {timeout_ms}ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },
    #[error("Send incomplete: wrote {written} of {expected} bytes")]
    SendIncomplete { written: usize, expected: usize },
    #[error("No data received within {timeout_ms}ms")]
    ReceiveTimeout { timeout_ms: u64 },
    #[error("Peer closed the connection")]
    PeerClosed,
    #[error("Session already closed")]
    Closed,
    #[error("Socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether this error belongs to the connect phase
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            SessionError::AddressResolutionFailed { .. }
                | SessionError::SocketCreateFailed { .. }
                | SessionError::ConnectFailed { .. }
                | SessionError::ConnectTimeout { .. }
        )
    }
}

/// Binary codec errors
///
/// Truncated input is reported separately from malformed input so callers can
/// tell a short read from a corrupt peer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Encoded message needs {required} bytes, buffer holds {capacity}")]
    EncodeOverflow { capacity: usize, required: usize },
    #[error("Empty payload")]
    DecodeEmpty,
    #[error("Payload truncated at offset {offset}: {needed} more bytes needed")]
    DecodeTruncated { offset: usize, needed: usize },
    #[error("Malformed payload: {reason}")]
    DecodeMalformed { reason: String },
}

impl CodecError {
    pub fn malformed<T: Into<String>>(reason: T) -> Self {
        CodecError::DecodeMalformed {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Core error type for tapnet
#[derive(Debug, thiserror::Error)]
pub enum TapnetError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Acknowledgement for actions without a handler, not a failure
    #[error("Action {action} is not implemented")]
    ActionNotImplemented { action: Action },

    #[error("HTTP error: {reason}")]
    Http { reason: String },

    /// Channel communication error between tasks
    #[error("Channel error: {message}")]
    Channel { message: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Storage error: {reason}")]
    Storage { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl TapnetError {
    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        TapnetError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        TapnetError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a storage error with a reason
    pub fn storage_error<T: Into<String>>(reason: T) -> Self {
        TapnetError::Storage {
            reason: reason.into(),
        }
    }

    /// Create an HTTP protocol error with a reason
    pub fn http_error<T: Into<String>>(reason: T) -> Self {
        TapnetError::Http {
            reason: reason.into(),
        }
    }

    /// True for the deliberate no-op acknowledgement of an unbound action
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, TapnetError::ActionNotImplemented { .. })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, TapnetError>;
pub type TapnetResult<T> = Result<T>;

//! Cross-task communication
//!
//! The action signal and the session queue are the only state shared
//! between tasks; both carry their own synchronization.

pub mod handoff;
pub mod signal;

pub use handoff::{
    create_session_queue, session_queue, HandoffError, SessionHandoff, SessionTaker, TakeError,
};
pub use signal::ActionSignal;

//! Tapnet Runtime Engine
//!
//! This crate runs the tapnet dispatch pipeline on tokio:
//! - `InputSource`: the non-blocking button callback with debounce
//! - `RequestDispatcher`: the worker that drains the action signal
//! - `ReceiverTask`: takes handed-off sessions and reads their responses
//! - `SessionManager`: connects stream sockets with classified failures
//! - `IndicatorTask`: the blink loop
//!
//! `tapnet-core` provides the shared types; this crate owns sockets and tasks.

pub mod builder;
pub mod dispatcher;
pub mod handlers;
pub mod http;
pub mod indicator;
pub mod input;
pub mod receiver;
pub mod report;
pub mod session;
pub mod settings;
pub mod sink;

pub use builder::{RuntimeBuilder, RuntimeHandle};
pub use dispatcher::{DispatcherState, RequestDispatcher};
pub use handlers::{
    ActionHandler, HandlerOutcome, HttpActionHandler, NotImplementedHandler, ProtoActionHandler,
};
pub use http::{HttpExchange, HttpMethod, HttpRequest, ResponseHead, ResponseSummary};
pub use indicator::{Indicator, IndicatorTask, SimulatedLed};
pub use input::{InputOutcome, InputPin, InputSource, SimulatedButton};
pub use receiver::{PendingResponse, ReceiverTask};
pub use report::{
    create_report_channel, DispatchOutcome, DispatchReport, ReportReceiver, ReportSender,
};
pub use session::{Resolver, Session, SessionManager, SystemResolver};
pub use settings::FileSettingsStore;
pub use sink::{ResponseSink, StatusResponseSink, TextResponseSink};

// Re-export core types for convenience
pub use tapnet_core::{
    Action, ActionEvent, ActionSignal, BusyFlag, TapnetConfig, TapnetError, TapnetResult,
};

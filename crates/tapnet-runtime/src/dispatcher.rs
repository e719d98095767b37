//! Request Dispatcher
//!
//! Long-lived task that waits on the action signal and services each drained
//! action in priority order, one at a time.

use crate::handlers::{ActionHandler, HandlerOutcome};
use crate::report::{DispatchOutcome, DispatchReport, ReportSender};
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;
use tapnet_core::{Action, ActionEvent, ActionSignal, BusyFlag, TapnetResult};
use tokio::sync::watch;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Waiting,
    Dispatching(Action),
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherState::Idle => write!(f, "Idle"),
            DispatcherState::Waiting => write!(f, "Waiting"),
            DispatcherState::Dispatching(action) => write!(f, "Dispatching({})", action),
        }
    }
}

pub struct RequestDispatcher {
    signal: Arc<ActionSignal>,
    busy: BusyFlag,
    handlers: HashMap<Action, Box<dyn ActionHandler>>,
    reports: ReportSender,
    state: DispatcherState,
}

impl RequestDispatcher {
    pub fn new(signal: Arc<ActionSignal>, busy: BusyFlag, reports: ReportSender) -> Self {
        Self {
            signal,
            busy,
            handlers: HashMap::new(),
            reports,
            state: DispatcherState::Idle,
        }
    }

    /// Bind a handler to the action it reports; replaces any previous one
    pub fn register_handler(&mut self, handler: Box<dyn ActionHandler>) {
        let action = handler.action();
        if self.handlers.insert(action, handler).is_some() {
            debug!("Replaced handler for {}", action);
        }
    }

    pub fn with_handler(mut self, handler: Box<dyn ActionHandler>) -> Self {
        self.register_handler(handler);
        self
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    fn transition(&mut self, next: DispatcherState) {
        debug!("Dispatcher {} -> {}", self.state, next);
        self.state = next;
    }

    /// Wait for actions until shutdown is signalled
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> TapnetResult<()> {
        info!("Request dispatcher starting");

        loop {
            self.transition(DispatcherState::Waiting);
            let signal = self.signal.clone();
            tokio::select! {
                drained = signal.wait_and_drain(ActionEvent::all(), None) => {
                    if let Some(actions) = drained {
                        self.dispatch(actions).await;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
            self.transition(DispatcherState::Idle);
        }

        self.transition(DispatcherState::Idle);
        info!("Request dispatcher stopped");
        Ok(())
    }

    /// Run the handler for each action in `actions`, highest priority first
    pub async fn dispatch(&mut self, actions: ActionEvent) {
        for action in actions.actions() {
            self.transition(DispatcherState::Dispatching(action));
            if let Some(report) = self.dispatch_one(action).await {
                self.reports.send(report);
            }
        }
    }

    async fn dispatch_one(&self, action: Action) -> Option<DispatchReport> {
        let Some(handler) = self.handlers.get(&action) else {
            info!("{} is not implemented, acknowledging", action);
            return Some(DispatchReport::new(action, DispatchOutcome::Acknowledged));
        };

        if self.busy.is_busy() {
            debug!("{} waiting for the in-flight request", action);
        }
        let guard = match self.busy.acquire().await {
            Ok(guard) => guard,
            Err(e) => {
                error!("{} failed: {}", action, e);
                return Some(DispatchReport::failed(action, e.to_string()));
            }
        };

        match handler.handle(guard).await {
            Ok(HandlerOutcome::Completed(outcome)) => {
                info!("{} completed", action);
                Some(DispatchReport::new(action, outcome))
            }
            Ok(HandlerOutcome::HandedOff) => {
                debug!("{} handed to receiver", action);
                None
            }
            Err(e) if e.is_not_implemented() => {
                info!("{} is not implemented, acknowledging", action);
                Some(DispatchReport::new(action, DispatchOutcome::Acknowledged))
            }
            Err(e) => {
                error!("{} failed: {}", action, e);
                Some(DispatchReport::failed(action, e.to_string()))
            }
        }
    }
}

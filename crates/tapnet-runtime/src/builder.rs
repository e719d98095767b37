//! Runtime Builder API
//!
//! Wires the input source, action signal, dispatcher, receiver and indicator
//! together and hands back a handle for driving and stopping them.

use crate::dispatcher::RequestDispatcher;
use crate::handlers::{HttpActionHandler, NotImplementedHandler, ProtoActionHandler};
use crate::http::HttpExchange;
use crate::indicator::{Indicator, IndicatorTask, SimulatedLed};
use crate::input::{InputOutcome, InputSource, SimulatedButton};
use crate::receiver::{PendingResponse, ReceiverTask};
use crate::report::{create_report_channel, ReportReceiver};
use crate::session::SessionManager;
use crate::settings::FileSettingsStore;
use std::sync::Arc;
use tapnet_core::{
    create_session_queue, Action, ActionSignal, BindingTable, BootCounter, MemorySettingsStore,
    PinMap, SettingsStore, SharedState, SystemTimeSource, TapnetConfig, TapnetResult,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_REPORT_CAPACITY: usize = 16;

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

pub struct RuntimeBuilder {
    config: TapnetConfig,
    pins: PinMap,
    bindings: BindingTable,
    buttons: Option<Vec<SimulatedButton>>,
    settings: Option<Arc<dyn SettingsStore>>,
    indicator: Option<Box<dyn Indicator>>,
    report_capacity: usize,
}

impl RuntimeBuilder {
    pub fn new(config: TapnetConfig) -> Self {
        Self {
            config,
            pins: PinMap::default(),
            bindings: BindingTable::default(),
            buttons: None,
            settings: None,
            indicator: None,
            report_capacity: DEFAULT_REPORT_CAPACITY,
        }
    }

    pub fn with_pin_map(mut self, pins: PinMap) -> Self {
        self.pins = pins;
        self
    }

    pub fn with_bindings(mut self, bindings: BindingTable) -> Self {
        self.bindings = bindings;
        self
    }

    /// Buttons to register; defaults to one ready button per mapped pin
    pub fn with_buttons(mut self, buttons: Vec<SimulatedButton>) -> Self {
        self.buttons = Some(buttons);
        self
    }

    /// Settings backend; defaults to the configured file or memory
    pub fn with_settings_store(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_indicator(mut self, indicator: Box<dyn Indicator>) -> Self {
        self.indicator = Some(indicator);
        self
    }

    pub fn report_capacity(mut self, capacity: usize) -> Self {
        self.report_capacity = capacity;
        self
    }

    fn settings_store(&self) -> Arc<dyn SettingsStore> {
        match (&self.settings, &self.config.storage.path) {
            (Some(settings), _) => settings.clone(),
            (None, Some(path)) => Arc::new(FileSettingsStore::new(path)),
            (None, None) => Arc::new(MemorySettingsStore::new()),
        }
    }

    /// Build and start the runtime
    pub async fn build_and_start(self) -> TapnetResult<RuntimeHandle> {
        self.config.validate()?;
        info!("Building tapnet runtime");

        let state = Arc::new(SharedState::new(self.config.indicator.default_interval_ms));
        let boot_counter = BootCounter::new(
            self.settings_store(),
            self.config.storage.boot_count_key.clone(),
        );
        // settings stores do blocking file I/O
        let boot_count = tokio::task::spawn_blocking(move || boot_counter.increment_on_boot())
            .await
            .unwrap_or_else(|e| {
                warn!("Boot counter task failed, using 1: {}", e);
                1
            });
        state.set_boot_count(boot_count);

        let signal = Arc::new(ActionSignal::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (reports, report_receiver) = create_report_channel(self.report_capacity);
        let (handoff, taker) = create_session_queue::<PendingResponse>(&self.config.session);

        let sessions = Arc::new(SessionManager::new(self.config.session.clone()));
        let exchange = HttpExchange::new(
            self.config.session.receive_timeout(),
            self.config.session.chunk_size,
        );

        let mut dispatcher =
            RequestDispatcher::new(signal.clone(), state.busy.clone(), reports.clone())
                .with_handler(Box::new(HttpActionHandler::new(
                    sessions.clone(),
                    exchange.clone(),
                    self.config.http.clone(),
                    handoff,
                )))
                .with_handler(Box::new(ProtoActionHandler::new(
                    sessions.clone(),
                    exchange.clone(),
                    self.config.proto.clone(),
                    state.clone(),
                )))
                .with_handler(Box::new(NotImplementedHandler::new(Action::OtaDownload)))
                .with_handler(Box::new(NotImplementedHandler::new(Action::GetOtaPath)));

        let mut receiver = ReceiverTask::new(taker, exchange, reports, shutdown_rx.clone());

        let indicator = self
            .indicator
            .unwrap_or_else(|| Box::new(SimulatedLed::new()) as Box<dyn Indicator>);
        let mut indicator_task = IndicatorTask::new(indicator, state.clone(), shutdown_rx.clone());

        let input = Arc::new(InputSource::new(
            self.pins.clone(),
            self.bindings,
            self.config.debounce.window_ms,
            SystemTimeSource::new(),
            signal.clone(),
            state.clone(),
        ));
        let buttons = self
            .buttons
            .unwrap_or_else(|| self.pins.pins().map(SimulatedButton::new).collect());
        let registered = input.register_all(&buttons);
        info!("{} of {} inputs ready", registered.len(), buttons.len());

        let handles = vec![
            tokio::spawn(async move { dispatcher.run(shutdown_rx).await }),
            tokio::spawn(async move { receiver.run().await }),
            tokio::spawn(async move { indicator_task.run().await }),
        ];

        info!("tapnet runtime started (boot {})", state.boot_count());

        Ok(RuntimeHandle {
            input,
            state,
            signal,
            report_receiver: Some(report_receiver),
            shutdown_tx,
            handles,
            running: true,
        })
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Handle to a running tapnet runtime
pub struct RuntimeHandle {
    input: Arc<InputSource>,
    state: Arc<SharedState>,
    signal: Arc<ActionSignal>,
    report_receiver: Option<ReportReceiver>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<TapnetResult<()>>>,
    running: bool,
}

impl RuntimeHandle {
    /// Deliver a hardware edge for `pin`
    pub fn on_edge(&self, pin: u32) -> InputOutcome {
        self.input.on_edge(pin)
    }

    /// The input callback, for code that delivers edges on its own
    pub fn input_source(&self) -> Arc<InputSource> {
        self.input.clone()
    }

    pub fn signal(&self) -> Arc<ActionSignal> {
        self.signal.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.busy.is_busy()
    }

    pub fn blink_interval_ms(&self) -> u32 {
        self.state.indicator.interval_ms()
    }

    pub fn boot_count(&self) -> u32 {
        self.state.boot_count()
    }

    /// Take the dispatch report receiver (can only be called once)
    pub fn take_report_receiver(&mut self) -> Option<ReportReceiver> {
        self.report_receiver.take()
    }

    pub fn is_running(&self) -> bool {
        self.running && self.handles.iter().any(|handle| !handle.is_finished())
    }

    /// Stop all tasks, waiting briefly for them to finish on their own
    pub async fn shutdown(&mut self) -> TapnetResult<()> {
        if !self.running {
            return Ok(());
        }
        info!("Shutting down tapnet runtime");

        if self.shutdown_tx.send(true).is_err() {
            debug!("All tasks already stopped");
        }

        for handle in self.handles.drain(..) {
            let abort = handle.abort_handle();
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(Err(e))) => warn!("Task ended with error: {}", e),
                Ok(Err(e)) if !e.is_cancelled() => warn!("Task panicked: {}", e),
                Ok(_) => {}
                Err(_) => abort.abort(),
            }
        }

        self.running = false;
        info!("tapnet runtime shut down");
        Ok(())
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

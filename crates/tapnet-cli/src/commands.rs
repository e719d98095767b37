//! Command handlers for the tapnet CLI

use std::sync::Arc;
use std::time::Duration;
use tapnet_core::{BootCounter, MemorySettingsStore, SettingsStore, APP_VERSION};
use tapnet_runtime::{
    DispatchOutcome, DispatchReport, FileSettingsStore, InputOutcome, ReportReceiver,
    RuntimeBuilder, RuntimeHandle, TapnetConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::config::render_config;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: TapnetConfig) -> Result<()> {
        match cli.command {
            Commands::Run => Self::handle_run_command(config).await,
            Commands::Press { pin } => Self::handle_press_command(config, pin).await,
            Commands::Status => Self::handle_status_command(&config),
            Commands::Version => {
                println!("tapnet {}", APP_VERSION);
                Ok(())
            }
        }
    }

    /// Read pin numbers from stdin until EOF, `quit` or Ctrl+C
    async fn handle_run_command(config: TapnetConfig) -> Result<()> {
        let mut runtime = RuntimeBuilder::new(config).build_and_start().await?;
        let reports = runtime
            .take_report_receiver()
            .ok_or(CliError::RuntimeStopped)?;
        let printer = tokio::spawn(print_reports(reports));

        println!("Enter a button pin number per line, 'quit' to exit");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if !handle_line(&runtime, line.trim()) {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        runtime.shutdown().await?;
        printer.abort();
        Ok(())
    }

    /// Press one button, then wait for a report per requested action
    async fn handle_press_command(config: TapnetConfig, pin: u32) -> Result<()> {
        let deadline = report_deadline(&config);
        let mut runtime = RuntimeBuilder::new(config).build_and_start().await?;
        let mut reports = runtime
            .take_report_receiver()
            .ok_or(CliError::RuntimeStopped)?;

        let outcome = runtime.on_edge(pin);
        println!("{}", describe_input(&outcome));

        let result = match outcome {
            InputOutcome::Accepted { actions, .. } => {
                await_reports(&mut reports, actions.actions(), deadline).await
            }
            _ => Ok(()),
        };

        runtime.shutdown().await?;
        result
    }

    fn handle_status_command(config: &TapnetConfig) -> Result<()> {
        let store: Arc<dyn SettingsStore> = match &config.storage.path {
            Some(path) => Arc::new(FileSettingsStore::new(path)),
            None => Arc::new(MemorySettingsStore::new()),
        };
        let boot_count =
            BootCounter::new(store, config.storage.boot_count_key.clone()).increment_on_boot();

        println!("tapnet {}", APP_VERSION);
        println!("Boot count: {}", boot_count);
        println!();
        print!("{}", render_config(config)?);
        Ok(())
    }
}

/// Handle one stdin line; returns false when the user asked to quit
fn handle_line(runtime: &RuntimeHandle, line: &str) -> bool {
    match line {
        "" => true,
        "q" | "quit" | "exit" => false,
        _ => {
            match line.parse::<u32>() {
                Ok(pin) => println!("{}", describe_input(&runtime.on_edge(pin))),
                Err(_) => warn!("Not a pin number: {}", line),
            }
            true
        }
    }
}

async fn print_reports(mut reports: ReportReceiver) {
    while let Some(report) = reports.recv().await {
        println!("{}", describe_report(&report));
    }
}

async fn await_reports(
    reports: &mut ReportReceiver,
    actions: impl Iterator<Item = tapnet_core::Action>,
    deadline: Duration,
) -> Result<()> {
    for action in actions {
        let report = tokio::time::timeout(deadline, reports.recv())
            .await
            .map_err(|_| CliError::ReportTimeout {
                action: action.to_string(),
                timeout_ms: deadline.as_millis() as u64,
            })?
            .ok_or(CliError::RuntimeStopped)?;
        println!("{}", describe_report(&report));
    }
    Ok(())
}

/// Upper bound on one dispatch: connect, then a receive wait per read
fn report_deadline(config: &TapnetConfig) -> Duration {
    config.session.connect_timeout() + config.session.receive_timeout() * 4
}

pub fn describe_input(outcome: &InputOutcome) -> String {
    match outcome {
        InputOutcome::Accepted { input, actions } if actions.is_empty() => {
            format!("{}: blink interval changed", input)
        }
        InputOutcome::Accepted { input, actions } => {
            let names: Vec<String> = actions.actions().map(|a| a.to_string()).collect();
            format!("{}: requested {}", input, names.join(", "))
        }
        InputOutcome::Debounced(input) => format!("{}: debounced", input),
        InputOutcome::Suppressed { input, .. } => {
            format!("{}: request in flight, network action dropped", input)
        }
        InputOutcome::NotReady(input) => format!("{}: not ready", input),
        InputOutcome::Unrecognized { pin } => format!("pin {}: no button", pin),
    }
}

pub fn describe_report(report: &DispatchReport) -> String {
    match &report.outcome {
        DispatchOutcome::Response {
            status_code,
            body,
            chunks,
        } => format!(
            "{}: HTTP {} ({} bytes in {} chunks)\n{}",
            report.action,
            status_code,
            body.len(),
            chunks,
            body
        ),
        DispatchOutcome::Status { boot_count, status } => {
            format!("{}: boot {} -> \"{}\"", report.action, boot_count, status)
        }
        DispatchOutcome::Acknowledged => format!("{}: acknowledged", report.action),
        DispatchOutcome::Failed { reason } => format!("{}: failed: {}", report.action, reason),
    }
}

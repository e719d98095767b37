//! Dispatch reports
//!
//! Every dispatched action ends in exactly one report, sent by whichever task
//! finished it: the dispatcher for inline actions, the receiver for sessions
//! it was handed.

use tapnet_core::Action;
use tokio::sync::mpsc;
use tracing::debug;

/// How a dispatched action ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Text response fully received
    Response {
        status_code: u16,
        body: String,
        chunks: usize,
    },
    /// Status message decoded
    Status { boot_count: u32, status: String },
    /// Handler not implemented; acknowledged without network traffic
    Acknowledged,
    Failed { reason: String },
}

impl DispatchOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, DispatchOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub action: Action,
    pub outcome: DispatchOutcome,
}

impl DispatchReport {
    pub fn new(action: Action, outcome: DispatchOutcome) -> Self {
        Self { action, outcome }
    }

    pub fn failed<T: Into<String>>(action: Action, reason: T) -> Self {
        Self::new(
            action,
            DispatchOutcome::Failed {
                reason: reason.into(),
            },
        )
    }
}

// ----------------------------------------------------------------------------
// Report Channel
// ----------------------------------------------------------------------------

/// Sending side; never blocks, drops reports nobody has room for
#[derive(Debug, Clone)]
pub struct ReportSender {
    sender: mpsc::Sender<DispatchReport>,
}

pub type ReportReceiver = mpsc::Receiver<DispatchReport>;

impl ReportSender {
    pub fn send(&self, report: DispatchReport) {
        if let Err(e) = self.sender.try_send(report) {
            debug!("Dispatch report dropped: {}", e);
        }
    }
}

/// Create a bounded report channel
pub fn create_report_channel(capacity: usize) -> (ReportSender, ReportReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ReportSender { sender }, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (sender, mut receiver) = create_report_channel(1);
        sender.send(DispatchReport::new(Action::OtaDownload, DispatchOutcome::Acknowledged));
        sender.send(DispatchReport::failed(Action::GenericHttp, "refused"));

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.action, Action::OtaDownload);
        assert!(receiver.try_recv().is_err());
    }
}

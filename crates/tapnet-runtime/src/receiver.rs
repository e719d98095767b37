//! Receiver task
//!
//! Takes connected sessions from the session queue, drains each response
//! into a text sink and closes the session. The busy guard travels with the
//! session, so the flag clears when the receiver is done with it.

use crate::http::HttpExchange;
use crate::report::{DispatchOutcome, DispatchReport, ReportSender};
use crate::session::Session;
use crate::sink::TextResponseSink;
use tapnet_core::{Action, BusyGuard, SessionTaker, TakeError, TapnetResult};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Ownership of one connected session with its request still outstanding
#[derive(Debug)]
pub struct PendingResponse {
    pub action: Action,
    pub session: Session,
    guard: BusyGuard,
}

impl PendingResponse {
    pub fn new(action: Action, session: Session, guard: BusyGuard) -> Self {
        Self {
            action,
            session,
            guard,
        }
    }

    /// Close the session, then release the busy flag
    pub fn finish(mut self) {
        self.session.close();
        drop(self.guard);
    }
}

pub type PendingResponseTaker = SessionTaker<PendingResponse>;

pub struct ReceiverTask {
    taker: PendingResponseTaker,
    exchange: HttpExchange,
    reports: ReportSender,
    shutdown: watch::Receiver<bool>,
}

impl ReceiverTask {
    pub fn new(
        taker: PendingResponseTaker,
        exchange: HttpExchange,
        reports: ReportSender,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            taker,
            exchange,
            reports,
            shutdown,
        }
    }

    pub async fn run(&mut self) -> TapnetResult<()> {
        info!("Receiver task starting");

        loop {
            tokio::select! {
                taken = self.taker.take(None) => match taken {
                    Ok(pending) => self.handle(pending).await,
                    Err(TakeError::Closed) => {
                        debug!("Session queue closed, stopping receiver");
                        break;
                    }
                    Err(TakeError::Timeout) => continue,
                },
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Receiver task stopped");
        Ok(())
    }

    /// Drain one response; the session is closed on every path
    pub async fn handle(&mut self, mut pending: PendingResponse) {
        let action = pending.action;
        let mut sink = TextResponseSink::new();

        let outcome = match self.exchange.receive(&mut pending.session, &mut sink).await {
            Ok(summary) => {
                info!(
                    "{} response complete: HTTP {}, {} bytes",
                    action, summary.status_code, summary.body_len
                );
                DispatchOutcome::Response {
                    status_code: summary.status_code,
                    body: sink.text(),
                    chunks: summary.chunks,
                }
            }
            Err(e) => {
                warn!("{} response failed: {}", action, e);
                DispatchOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        pending.finish();
        self.reports.send(DispatchReport::new(action, outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::create_report_channel;
    use crate::session::SessionManager;
    use std::time::Duration;
    use tapnet_core::{create_session_queue, AddressFamily, BusyFlag, SessionConfig};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_test::{assert_pending, assert_ready, task};

    fn receiver_parts(
        config: &SessionConfig,
    ) -> (
        tapnet_core::SessionHandoff<PendingResponse>,
        ReceiverTask,
        crate::report::ReportReceiver,
        watch::Sender<bool>,
    ) {
        let (handoff, taker) = create_session_queue(config);
        let (reports, report_rx) = create_report_channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let exchange = HttpExchange::new(config.receive_timeout(), config.chunk_size);
        let receiver = ReceiverTask::new(taker, exchange, reports, shutdown_rx);
        (handoff, receiver, report_rx, shutdown_tx)
    }

    #[tokio::test]
    async fn test_idle_receiver_waits_until_shutdown() {
        let config = SessionConfig::default();
        let (_handoff, mut receiver, _reports, shutdown_tx) = receiver_parts(&config);

        let mut run = task::spawn(receiver.run());
        assert_pending!(run.poll());

        shutdown_tx.send(true).unwrap();
        assert!(run.is_woken());
        assert!(assert_ready!(run.poll()).is_ok());
    }

    #[tokio::test]
    async fn test_handed_off_session_is_drained_and_released() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = stream.read(&mut buf).await.unwrap();
            stream
                .write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
        });

        let config = SessionConfig::default().with_receive_timeout_ms(1_000);
        let (handoff, mut receiver, mut reports, shutdown_tx) = receiver_parts(&config);
        let busy = BusyFlag::new();

        let mut session = SessionManager::new(config.clone())
            .connect(AddressFamily::Ipv4, "127.0.0.1", port)
            .await
            .unwrap();
        session.send_complete(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let guard = busy.try_acquire().unwrap();
        handoff
            .handoff(PendingResponse::new(Action::GenericHttp, session, guard))
            .unwrap();

        let run = tokio::spawn(async move { receiver.run().await });
        let report = tokio::time::timeout(Duration::from_secs(2), reports.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            report.outcome,
            DispatchOutcome::Response {
                status_code: 204,
                body: String::new(),
                chunks: 0,
            }
        );
        assert!(!busy.is_busy());

        shutdown_tx.send(true).unwrap();
        run.await.unwrap().unwrap();
    }
}

//! Action handlers
//!
//! One handler per network action. A handler receives the busy guard for the
//! request and either finishes the request inline or hands the connected
//! session, guard included, to the receiver task.

use crate::http::{HttpExchange, HttpRequest};
use crate::receiver::PendingResponse;
use crate::report::DispatchOutcome;
use crate::session::{Session, SessionManager};
use crate::sink::{ResponseSink, StatusResponseSink};
use async_trait::async_trait;
use std::sync::Arc;
use tapnet_core::{
    encode_frame, Action, BusyGuard, CodecError, FrameDecoder, HttpConfig, ProtoConfig,
    ProtoTransport, RequestBuffer, SessionError, SessionHandoff, SharedState, StatusRequest,
    TapnetError, TapnetResult, FRAME_HEADER_LEN, REQUEST_CAPACITY, RESPONSE_CAPACITY,
};
use tokio::time::Duration;
use tracing::{debug, info};

/// What a handler did with its request
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Finished inline; the guard has been released
    Completed(DispatchOutcome),
    /// The session and guard now belong to the receiver task
    HandedOff,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn action(&self) -> Action;

    async fn handle(&self, guard: BusyGuard) -> TapnetResult<HandlerOutcome>;
}

// ----------------------------------------------------------------------------
// Generic HTTP
// ----------------------------------------------------------------------------

/// GET the configured path; the response is read by the receiver task
pub struct HttpActionHandler {
    sessions: Arc<SessionManager>,
    exchange: HttpExchange,
    config: HttpConfig,
    handoff: SessionHandoff<PendingResponse>,
}

impl HttpActionHandler {
    pub fn new(
        sessions: Arc<SessionManager>,
        exchange: HttpExchange,
        config: HttpConfig,
        handoff: SessionHandoff<PendingResponse>,
    ) -> Self {
        Self {
            sessions,
            exchange,
            config,
            handoff,
        }
    }
}

#[async_trait]
impl ActionHandler for HttpActionHandler {
    fn action(&self) -> Action {
        Action::GenericHttp
    }

    async fn handle(&self, guard: BusyGuard) -> TapnetResult<HandlerOutcome> {
        let mut session = self
            .sessions
            .connect(self.config.family, &self.config.host, self.config.port)
            .await?;

        let request = HttpRequest::get(self.config.host.as_str(), self.config.path.as_str());
        self.exchange.send(&mut session, &request).await?;
        debug!("GET {} sent on session {}", self.config.path, session.id());

        let pending = PendingResponse::new(Action::GenericHttp, session, guard);
        match self.handoff.handoff(pending) {
            Ok(()) => Ok(HandlerOutcome::HandedOff),
            Err(e) => {
                let reason = e.to_string();
                e.into_token().finish();
                Err(TapnetError::channel_error(format!(
                    "session handoff failed: {}",
                    reason
                )))
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Proto Request
// ----------------------------------------------------------------------------

/// Report the boot count and decode the server's status, inline
pub struct ProtoActionHandler {
    sessions: Arc<SessionManager>,
    exchange: HttpExchange,
    config: ProtoConfig,
    state: Arc<SharedState>,
    receive_timeout: Duration,
}

impl ProtoActionHandler {
    pub fn new(
        sessions: Arc<SessionManager>,
        exchange: HttpExchange,
        config: ProtoConfig,
        state: Arc<SharedState>,
    ) -> Self {
        let receive_timeout = sessions.config().receive_timeout();
        Self {
            sessions,
            exchange,
            config,
            state,
            receive_timeout,
        }
    }

    async fn exchange_http(
        &self,
        session: &mut Session,
        body: &[u8],
        sink: &mut StatusResponseSink,
    ) -> TapnetResult<()> {
        let request = HttpRequest::post(self.config.host.as_str(), self.config.path.as_str(), body);
        let summary = self.exchange.execute(session, &request, sink).await?;
        if !(200..300).contains(&summary.status_code) {
            return Err(TapnetError::http_error(format!(
                "status request rejected with HTTP {}",
                summary.status_code
            )));
        }
        Ok(())
    }

    async fn exchange_framed(
        &self,
        session: &mut Session,
        body: &[u8],
        sink: &mut StatusResponseSink,
    ) -> TapnetResult<()> {
        let mut frame = [0u8; FRAME_HEADER_LEN + REQUEST_CAPACITY];
        let len = encode_frame(body, &mut frame)?;
        session.send_complete(&frame[..len]).await?;

        let mut decoder = FrameDecoder::<RESPONSE_CAPACITY>::new();
        let mut buf = [0u8; 64];
        loop {
            if !session.await_readable(self.receive_timeout).await {
                if session.is_peer_closed() {
                    return Err(closed_early(&decoder));
                }
                return Err(SessionError::ReceiveTimeout {
                    timeout_ms: self.receive_timeout.as_millis() as u64,
                }
                .into());
            }

            let read = session.recv(&mut buf).await?;
            if read == 0 {
                return Err(closed_early(&decoder));
            }
            let (_, complete) = decoder.push(&buf[..read])?;
            if complete {
                break;
            }
        }

        let payload = decoder.finish()?;
        sink.on_chunk(payload, true)
    }
}

/// Error for a stream that ended before a whole frame arrived
fn closed_early<const N: usize>(decoder: &FrameDecoder<N>) -> TapnetError {
    match decoder.finish() {
        Err(e) => e.into(),
        Ok(_) => SessionError::PeerClosed.into(),
    }
}

#[async_trait]
impl ActionHandler for ProtoActionHandler {
    fn action(&self) -> Action {
        Action::ProtoRequest
    }

    async fn handle(&self, _guard: BusyGuard) -> TapnetResult<HandlerOutcome> {
        let boot_count = self.state.boot_count();
        let mut request = RequestBuffer::new();
        request.encode_message(&StatusRequest::new(boot_count))?;

        let mut session = self
            .sessions
            .connect(self.config.family, &self.config.host, self.config.port)
            .await?;

        let mut sink = StatusResponseSink::new();
        let result = match self.config.transport {
            ProtoTransport::HttpPost => {
                self.exchange_http(&mut session, request.as_slice(), &mut sink)
                    .await
            }
            ProtoTransport::RawFramed => {
                self.exchange_framed(&mut session, request.as_slice(), &mut sink)
                    .await
            }
        };
        session.close();
        result?;

        let status = sink
            .into_response()
            .ok_or_else(|| TapnetError::from(CodecError::DecodeEmpty))?;
        info!("Boot count {} acknowledged: {}", boot_count, status.status());
        Ok(HandlerOutcome::Completed(DispatchOutcome::Status {
            boot_count,
            status: status.status().to_string(),
        }))
    }
}

// ----------------------------------------------------------------------------
// Not Implemented
// ----------------------------------------------------------------------------

/// Placeholder for actions the device accepts but does not perform
pub struct NotImplementedHandler {
    action: Action,
}

impl NotImplementedHandler {
    pub fn new(action: Action) -> Self {
        Self { action }
    }
}

#[async_trait]
impl ActionHandler for NotImplementedHandler {
    fn action(&self) -> Action {
        self.action
    }

    async fn handle(&self, _guard: BusyGuard) -> TapnetResult<HandlerOutcome> {
        Err(TapnetError::ActionNotImplemented {
            action: self.action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapnet_core::{create_session_queue, BusyFlag, SessionConfig};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_rejected_handoff_releases_guard() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let config = SessionConfig::default();
        let (handoff, taker) = create_session_queue::<PendingResponse>(&config);
        drop(taker);

        let handler = HttpActionHandler::new(
            Arc::new(SessionManager::new(config.clone())),
            HttpExchange::new(config.receive_timeout(), config.chunk_size),
            HttpConfig::default().with_endpoint("127.0.0.1", port),
            handoff,
        );
        let busy = BusyFlag::new();

        let result = handler.handle(busy.try_acquire().unwrap()).await;
        assert!(matches!(result, Err(TapnetError::Channel { .. })));
        assert!(!busy.is_busy());
    }

    #[tokio::test]
    async fn test_placeholder_reports_not_implemented() {
        let busy = BusyFlag::new();
        let handler = NotImplementedHandler::new(Action::GetOtaPath);

        let err = handler
            .handle(busy.try_acquire().unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_implemented());
        assert!(!busy.is_busy());
    }
}

//! Socket Session Manager
//!
//! Opens and connects stream sockets with classified failures, caches address
//! resolution per endpoint, and wraps the connected stream in a [`Session`]
//! that is closed exactly once no matter which path releases it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tapnet_core::{AddressFamily, SessionConfig, SessionError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::{timeout, timeout_at, Duration, Instant};
use tracing::{debug, info, trace, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// One connected stream socket
///
/// Owned by exactly one task at a time; moving it through the session queue
/// moves ownership. Dropping a session closes it.
#[derive(Debug)]
pub struct Session {
    id: u64,
    peer: SocketAddr,
    stream: Option<TcpStream>,
    peer_closed: bool,
}

impl Session {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            stream: Some(stream),
            peer_closed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Whether the last wait or read saw the peer close its side
    pub fn is_peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Wait up to `wait` for data to read
    ///
    /// False on timeout and on peer close alike; [`Session::is_peer_closed`]
    /// tells them apart for logging.
    pub async fn await_readable(&mut self, wait: Duration) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };

        let mut peeked = [0u8; 1];
        match timeout(wait, stream.peek(&mut peeked)).await {
            Ok(Ok(0)) => {
                debug!("Session {} peer {} closed the connection", self.id, self.peer);
                self.peer_closed = true;
                false
            }
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!("Session {} poll failed: {}", self.id, e);
                false
            }
            Err(_) => {
                trace!("Session {} not readable within {:?}", self.id, wait);
                false
            }
        }
    }

    /// Single write; a short count is returned as-is for the caller to judge
    pub async fn send(&mut self, payload: &[u8]) -> Result<usize, SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::Closed)?;
        let written = stream.write(payload).await?;
        trace!("Session {} sent {} of {} bytes", self.id, written, payload.len());
        Ok(written)
    }

    /// Send and require the whole payload to be accepted in one write
    pub async fn send_complete(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        let written = self.send(payload).await?;
        if written != payload.len() {
            return Err(SessionError::SendIncomplete {
                written,
                expected: payload.len(),
            });
        }
        Ok(())
    }

    /// Read available bytes; zero means the peer closed
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::Closed)?;
        let read = stream.read(buf).await?;
        if read == 0 {
            self.peer_closed = true;
        }
        Ok(read)
    }

    /// Release the socket; later calls are no-ops
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            debug!("Session {} to {} closed", self.id, self.peer);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

// ----------------------------------------------------------------------------
// Session Manager
// ----------------------------------------------------------------------------

type EndpointKey = (String, u16, AddressFamily);

/// Host name lookup used before connecting
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// The system resolver through tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }
}

/// Connects sessions and remembers where endpoints resolved to
pub struct SessionManager {
    config: SessionConfig,
    resolver: Arc<dyn Resolver>,
    resolved: Mutex<HashMap<EndpointKey, SocketAddr>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    pub fn with_resolver(config: SessionConfig, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            config,
            resolver,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connect with the configured timeout
    pub async fn connect(
        &self,
        family: AddressFamily,
        host: &str,
        port: u16,
    ) -> Result<Session, SessionError> {
        self.connect_with_timeout(family, host, port, self.config.connect_timeout())
            .await
    }

    /// Resolve and connect; both steps share one `connect_timeout` deadline
    pub async fn connect_with_timeout(
        &self,
        family: AddressFamily,
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<Session, SessionError> {
        let deadline = Instant::now() + connect_timeout;
        let addr = self.resolve_before(family, host, port, deadline).await?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| SessionError::SocketCreateFailed {
            reason: e.to_string(),
        })?;

        debug!("Connecting to {} ({}:{})", addr, host, port);
        let stream = match timeout_at(deadline, socket.connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.forget(family, host, port);
                return Err(SessionError::ConnectFailed {
                    addr: addr.to_string(),
                    reason: e.to_string(),
                    errno: e.raw_os_error(),
                });
            }
            Err(_) => {
                self.forget(family, host, port);
                return Err(SessionError::ConnectTimeout {
                    addr: addr.to_string(),
                    timeout_ms: connect_timeout.as_millis() as u64,
                });
            }
        };

        let session = Session::new(stream, addr);
        info!("Session {} connected to {}", session.id(), addr);
        Ok(session)
    }

    /// Resolve an endpoint, reusing a cached address when present
    ///
    /// A lookup is bounded by the configured connect timeout.
    pub async fn resolve(
        &self,
        family: AddressFamily,
        host: &str,
        port: u16,
    ) -> Result<SocketAddr, SessionError> {
        let deadline = Instant::now() + self.config.connect_timeout();
        self.resolve_before(family, host, port, deadline).await
    }

    async fn resolve_before(
        &self,
        family: AddressFamily,
        host: &str,
        port: u16,
        deadline: Instant,
    ) -> Result<SocketAddr, SessionError> {
        let key = (host.to_string(), port, family);
        if let Some(addr) = self.cached(&key) {
            trace!("Using cached address {} for {}:{}", addr, host, port);
            return Ok(addr);
        }

        let candidates = match timeout_at(deadline, self.resolver.lookup(host, port)).await {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                return Err(SessionError::AddressResolutionFailed {
                    host: host.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(SessionError::AddressResolutionFailed {
                    host: host.to_string(),
                    reason: "timed out".to_string(),
                })
            }
        };

        let addr = candidates
            .into_iter()
            .find(|addr| match family {
                AddressFamily::Ipv4 => addr.is_ipv4(),
                AddressFamily::Ipv6 => addr.is_ipv6(),
                AddressFamily::Unspecified => true,
            })
            .ok_or_else(|| SessionError::AddressResolutionFailed {
                host: host.to_string(),
                reason: format!("no {} address", family),
            })?;

        debug!("Resolved {}:{} to {}", host, port, addr);
        if let Ok(mut resolved) = self.resolved.lock() {
            resolved.insert(key, addr);
        }
        Ok(addr)
    }

    /// Whether an endpoint has a cached resolution
    pub fn is_cached(&self, family: AddressFamily, host: &str, port: u16) -> bool {
        self.cached(&(host.to_string(), port, family)).is_some()
    }

    fn cached(&self, key: &EndpointKey) -> Option<SocketAddr> {
        self.resolved
            .lock()
            .ok()
            .and_then(|resolved| resolved.get(key).copied())
    }

    fn forget(&self, family: AddressFamily, host: &str, port: u16) {
        if let Ok(mut resolved) = self.resolved.lock() {
            resolved.remove(&(host.to_string(), port, family));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn manager() -> SessionManager {
        SessionManager::new(
            SessionConfig::default()
                .with_connect_timeout_ms(500)
                .with_receive_timeout_ms(100),
        )
    }

    #[tokio::test]
    async fn test_connect_caches_resolution() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let manager = manager();

        assert!(!manager.is_cached(AddressFamily::Ipv4, "localhost", port));
        let session = manager
            .connect(AddressFamily::Ipv4, "localhost", port)
            .await
            .expect("listener accepts");
        assert!(session.is_open());
        assert!(manager.is_cached(AddressFamily::Ipv4, "localhost", port));
    }

    #[tokio::test]
    async fn test_refused_connect_is_classified() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = manager()
            .connect(AddressFamily::Ipv4, "127.0.0.1", port)
            .await
            .unwrap_err();
        assert!(err.is_connect_failure());
        assert!(matches!(
            err,
            SessionError::ConnectFailed { errno: Some(_), .. }
        ));
    }

    /// Listener that never accepts, with its accept queue already full
    async fn saturated_listener() -> (TcpListener, u16, Vec<TcpStream>) {
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(1).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut held = Vec::new();
        for _ in 0..16 {
            match timeout(Duration::from_millis(100), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => held.push(stream),
                _ => break,
            }
        }
        (listener, addr.port(), held)
    }

    #[tokio::test]
    async fn test_unanswered_connect_times_out_within_bound() {
        let (_listener, port, _held) = saturated_listener().await;
        let bound = Duration::from_millis(150);

        let started = std::time::Instant::now();
        let err = manager()
            .connect_with_timeout(AddressFamily::Ipv4, "127.0.0.1", port, bound)
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::ConnectTimeout { timeout_ms: 150, .. }));
        assert!(err.is_connect_failure());
        assert!(started.elapsed() < bound + Duration::from_millis(500));
    }

    struct HangingResolver;

    #[async_trait]
    impl Resolver for HangingResolver {
        async fn lookup(&self, _host: &str, _port: u16) -> io::Result<Vec<SocketAddr>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_hanging_lookup_shares_connect_deadline() {
        let manager = SessionManager::with_resolver(
            SessionConfig::default().with_connect_timeout_ms(100),
            Arc::new(HangingResolver),
        );

        let started = std::time::Instant::now();
        let err = manager
            .connect(AddressFamily::Ipv4, "device.local", 80)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::AddressResolutionFailed { ref reason, .. } if reason == "timed out"
        ));
        assert!(started.elapsed() < Duration::from_millis(600));
        assert!(!manager.is_cached(AddressFamily::Ipv4, "device.local", 80));
    }

    #[tokio::test]
    async fn test_family_mismatch_fails_resolution() {
        let err = manager()
            .resolve(AddressFamily::Ipv6, "127.0.0.1", 80)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AddressResolutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_await_readable_distinguishes_close_for_logging() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let manager = manager();

        let mut session = manager
            .connect(AddressFamily::Ipv4, "127.0.0.1", port)
            .await
            .unwrap();
        let (peer, _) = listener.accept().await.unwrap();

        // nothing sent yet: timeout
        assert!(!session.await_readable(Duration::from_millis(30)).await);
        assert!(!session.is_peer_closed());

        drop(peer);
        assert!(!session.await_readable(Duration::from_millis(500)).await);
        assert!(session.is_peer_closed());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut session = manager()
            .connect(AddressFamily::Ipv4, "127.0.0.1", port)
            .await
            .unwrap();

        session.close();
        session.close();
        assert!(!session.is_open());
        assert!(matches!(
            session.send(b"x").await,
            Err(SessionError::Closed)
        ));
        assert!(!session.await_readable(Duration::from_millis(10)).await);
    }
}

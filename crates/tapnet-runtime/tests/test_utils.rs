//! Stub endpoints and helpers for tapnet-runtime integration tests

#![allow(dead_code)]

use std::time::Duration;
use tapnet_runtime::{DispatchReport, ReportReceiver, TapnetConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

pub const REPORT_TIMEOUT: Duration = Duration::from_secs(3);

// ----------------------------------------------------------------------------
// Stub Server
// ----------------------------------------------------------------------------

/// Bind a listener on an ephemeral loopback port
pub async fn bind_stub() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();
    (listener, port)
}

/// A loopback port with nothing listening on it
pub async fn closed_port() -> u16 {
    let (listener, port) = bind_stub().await;
    drop(listener);
    port
}

/// A listener that never accepts, with its accept queue already full, so
/// further connects go unanswered
pub async fn saturated_listener() -> (TcpListener, u16, Vec<TcpStream>) {
    let socket = TcpSocket::new_v4().expect("socket");
    socket
        .bind("127.0.0.1:0".parse().expect("loopback addr"))
        .expect("bind loopback");
    let listener = socket.listen(1).expect("listen");
    let addr = listener.local_addr().expect("local addr");

    let mut held = Vec::new();
    for _ in 0..16 {
        match tokio::time::timeout(Duration::from_millis(100), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => held.push(stream),
            _ => break,
        }
    }
    (listener, addr.port(), held)
}

/// Read one HTTP request: head text and a body sized by Content-Length
pub async fn read_http_request(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut data = Vec::new();
    let mut buf = [0u8; 256];
    let head_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let read = stream.read(&mut buf).await.expect("read request");
        assert!(read > 0, "client closed before finishing the request");
        data.extend_from_slice(&buf[..read]);
    };

    let head = String::from_utf8(data[..head_end].to_vec()).expect("utf-8 head");
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    let mut body = data[head_end + 4..].to_vec();
    while body.len() < content_length {
        let read = stream.read(&mut buf).await.expect("read body");
        assert!(read > 0, "client closed inside the body");
        body.extend_from_slice(&buf[..read]);
    }
    (head, body)
}

/// Read one length-prefixed frame
pub async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await.expect("frame header");
    let mut payload = vec![0u8; u16::from_be_bytes(header) as usize];
    stream.read_exact(&mut payload).await.expect("frame payload");
    payload
}

/// Write `parts` with a pause between each, then close
pub async fn write_in_chunks(mut stream: TcpStream, parts: &[&[u8]]) {
    for part in parts {
        stream.write_all(part).await.expect("write chunk");
        stream.flush().await.expect("flush chunk");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let _ = stream.shutdown().await;
}

// ----------------------------------------------------------------------------
// Runtime Helpers
// ----------------------------------------------------------------------------

/// Testing preset pointed at a loopback port for both endpoints
pub fn config_for(port: u16) -> TapnetConfig {
    let mut config = TapnetConfig::testing();
    config.http.port = port;
    config.proto.port = port;
    config
}

pub async fn next_report(reports: &mut ReportReceiver) -> DispatchReport {
    tokio::time::timeout(REPORT_TIMEOUT, reports.recv())
        .await
        .expect("report within timeout")
        .expect("report channel open")
}

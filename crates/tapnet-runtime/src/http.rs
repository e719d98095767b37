//! Minimal HTTP/1.1 client exchange over a [`Session`]
//!
//! Requests always carry `Connection: close`; the response body ends at the
//! last chunk of a chunked body, when `Content-Length` is satisfied, or when
//! the peer closes.

use crate::session::Session;
use crate::sink::ResponseSink;
use core::fmt;
use tapnet_core::{SessionError, TapnetError, TapnetResult};
use tokio::time::Duration;
use tracing::{debug, trace, warn};

/// Largest response head accepted before the body starts
pub const MAX_HEAD_LEN: usize = 2048;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Longest chunk-size or trailer line accepted in a chunked body
const MAX_CHUNK_LINE_LEN: usize = 256;

// ----------------------------------------------------------------------------
// Request
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub host: String,
    pub path: String,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get<H: Into<String>, P: Into<String>>(host: H, path: P) -> Self {
        Self {
            method: HttpMethod::Get,
            host: host.into(),
            path: path.into(),
            body: None,
        }
    }

    /// POST with a binary protobuf body
    pub fn post<H: Into<String>, P: Into<String>>(host: H, path: P, body: &[u8]) -> Self {
        Self {
            method: HttpMethod::Post,
            host: host.into(),
            path: path.into(),
            body: Some(body.to_vec()),
        }
    }

    /// Serialize the request line, headers and body
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n",
            self.method, self.path, self.host
        );
        if let Some(body) = &self.body {
            head.push_str("Content-Type: application/x-protobuf\r\n");
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        if let Some(body) = &self.body {
            bytes.extend_from_slice(body);
        }
        bytes
    }
}

// ----------------------------------------------------------------------------
// Response Parsing
// ----------------------------------------------------------------------------

/// Parsed status line and the headers this client acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status_code: u16,
    pub reason: String,
    pub content_length: Option<usize>,
    /// `Transfer-Encoding: chunked`; overrides any `Content-Length`
    pub chunked: bool,
}

impl ResponseHead {
    pub fn parse(head: &[u8]) -> TapnetResult<Self> {
        let text = core::str::from_utf8(head)
            .map_err(|_| TapnetError::http_error("response head is not valid UTF-8"))?;
        let mut lines = text.split("\r\n");

        let status_line = lines
            .next()
            .ok_or_else(|| TapnetError::http_error("missing status line"))?;
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/1.") {
            return Err(TapnetError::http_error(format!(
                "unexpected status line: {}",
                status_line
            )));
        }
        let status_code = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| {
                TapnetError::http_error(format!("invalid status code in: {}", status_line))
            })?;
        let reason = parts.next().unwrap_or_default().to_string();

        let mut content_length = None;
        let mut chunked = false;
        for line in lines.filter(|line| !line.is_empty()) {
            let Some((name, value)) = line.split_once(':') else {
                return Err(TapnetError::http_error(format!("malformed header: {}", line)));
            };
            if name.trim().eq_ignore_ascii_case("content-length") {
                let length = value.trim().parse::<usize>().map_err(|_| {
                    TapnetError::http_error(format!("invalid Content-Length: {}", value.trim()))
                })?;
                content_length = Some(length);
            } else if name.trim().eq_ignore_ascii_case("transfer-encoding") {
                chunked = value
                    .split(',')
                    .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
            }
        }

        Ok(Self {
            status_code,
            reason,
            content_length,
            chunked,
        })
    }

    /// Body length fixed by the head, if any
    pub fn body_length(&self) -> Option<usize> {
        if self.chunked {
            None
        } else {
            self.content_length
        }
    }
}

// ----------------------------------------------------------------------------
// Chunked Body
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(usize),
    DataEnd,
    Trailer,
    Done,
}

/// Incremental decoder for `Transfer-Encoding: chunked`
#[derive(Debug)]
struct ChunkedDecoder {
    state: ChunkState,
    line: Vec<u8>,
}

impl ChunkedDecoder {
    fn new() -> Self {
        Self {
            state: ChunkState::Size,
            line: Vec::new(),
        }
    }

    fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Collect one CRLF-terminated line; `None` until it is complete
    fn take_line(&mut self, input: &[u8], pos: &mut usize) -> TapnetResult<Option<Vec<u8>>> {
        while *pos < input.len() {
            let byte = input[*pos];
            *pos += 1;
            if byte == b'\n' {
                let mut line = core::mem::take(&mut self.line);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(line));
            }
            if self.line.len() >= MAX_CHUNK_LINE_LEN {
                return Err(TapnetError::http_error(format!(
                    "chunk line exceeds {} bytes",
                    MAX_CHUNK_LINE_LEN
                )));
            }
            self.line.push(byte);
        }
        Ok(None)
    }

    /// Decode `input`, appending chunk data to `out`
    fn decode(&mut self, input: &[u8], out: &mut Vec<u8>) -> TapnetResult<()> {
        let mut pos = 0;
        while pos < input.len() {
            match self.state {
                ChunkState::Size => {
                    let Some(line) = self.take_line(input, &mut pos)? else {
                        break;
                    };
                    let size = parse_chunk_size(&line)?;
                    self.state = if size == 0 {
                        ChunkState::Trailer
                    } else {
                        ChunkState::Data(size)
                    };
                }
                ChunkState::Data(remaining) => {
                    let take = remaining.min(input.len() - pos);
                    out.extend_from_slice(&input[pos..pos + take]);
                    pos += take;
                    self.state = match remaining - take {
                        0 => ChunkState::DataEnd,
                        left => ChunkState::Data(left),
                    };
                }
                ChunkState::DataEnd => {
                    let Some(line) = self.take_line(input, &mut pos)? else {
                        break;
                    };
                    if !line.is_empty() {
                        return Err(TapnetError::http_error("missing CRLF after chunk data"));
                    }
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailer => {
                    let Some(line) = self.take_line(input, &mut pos)? else {
                        break;
                    };
                    if line.is_empty() {
                        self.state = ChunkState::Done;
                    }
                }
                ChunkState::Done => {
                    warn!("Discarding {} bytes after the last chunk", input.len() - pos);
                    break;
                }
            }
        }
        Ok(())
    }
}

fn parse_chunk_size(line: &[u8]) -> TapnetResult<usize> {
    let text = core::str::from_utf8(line).unwrap_or_default();
    let digits = text.split(';').next().unwrap_or_default().trim();
    usize::from_str_radix(digits, 16)
        .map_err(|_| TapnetError::http_error(format!("invalid chunk size line: {:?}", text)))
}

/// Outcome of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSummary {
    pub status_code: u16,
    pub body_len: usize,
    pub chunks: usize,
}

/// Incremental response reader feeding a sink
struct ResponseReader<'s, S: ResponseSink> {
    sink: &'s mut S,
    head_buf: Vec<u8>,
    head: Option<ResponseHead>,
    chunked: Option<ChunkedDecoder>,
    body_len: usize,
    chunks: usize,
    finished: bool,
}

impl<'s, S: ResponseSink> ResponseReader<'s, S> {
    fn new(sink: &'s mut S) -> Self {
        Self {
            sink,
            head_buf: Vec::new(),
            head: None,
            chunked: None,
            body_len: 0,
            chunks: 0,
            finished: false,
        }
    }

    fn feed(&mut self, bytes: &[u8]) -> TapnetResult<()> {
        if self.head.is_some() {
            return self.deliver(bytes);
        }

        self.head_buf.extend_from_slice(bytes);
        let Some(end) = find_subslice(&self.head_buf, HEAD_TERMINATOR) else {
            if self.head_buf.len() > MAX_HEAD_LEN {
                return Err(TapnetError::http_error(format!(
                    "response head exceeds {} bytes",
                    MAX_HEAD_LEN
                )));
            }
            return Ok(());
        };

        let head = ResponseHead::parse(&self.head_buf[..end])?;
        debug!(
            "HTTP {} {} (content length {:?}, chunked {})",
            head.status_code, head.reason, head.content_length, head.chunked
        );
        self.sink.on_status(head.status_code);
        if head.chunked {
            self.chunked = Some(ChunkedDecoder::new());
        }
        self.head = Some(head);

        let rest = self.head_buf.split_off(end + HEAD_TERMINATOR.len());
        self.head_buf.clear();
        if !rest.is_empty() || self.expected_len() == Some(0) {
            self.deliver(&rest)?;
        }
        Ok(())
    }

    fn expected_len(&self) -> Option<usize> {
        self.head.as_ref().and_then(ResponseHead::body_length)
    }

    fn deliver(&mut self, bytes: &[u8]) -> TapnetResult<()> {
        if let Some(decoder) = self.chunked.as_mut() {
            let mut data = Vec::new();
            decoder.decode(bytes, &mut data)?;
            let is_final = decoder.is_done();
            if data.is_empty() && !is_final {
                return Ok(());
            }

            self.body_len += data.len();
            if !data.is_empty() {
                self.chunks += 1;
            }
            self.sink.on_chunk(&data, is_final)?;
            self.finished = is_final;
            return Ok(());
        }

        let bytes = match self.expected_len() {
            Some(expected) => {
                let remaining = expected.saturating_sub(self.body_len);
                if bytes.len() > remaining {
                    warn!(
                        "Discarding {} bytes past Content-Length",
                        bytes.len() - remaining
                    );
                }
                &bytes[..bytes.len().min(remaining)]
            }
            None => bytes,
        };

        self.body_len += bytes.len();
        if !bytes.is_empty() {
            self.chunks += 1;
        }
        let is_final = self.expected_len() == Some(self.body_len);
        self.sink.on_chunk(bytes, is_final)?;
        self.finished = is_final;
        Ok(())
    }

    /// The peer closed; finish the body if the framing allows it
    fn peer_closed(&mut self) -> TapnetResult<()> {
        if self.chunked.is_some() {
            return Err(TapnetError::http_error(format!(
                "peer closed inside chunked body after {} bytes",
                self.body_len
            )));
        }
        match (&self.head, self.expected_len()) {
            (None, _) => Err(SessionError::PeerClosed.into()),
            (Some(_), Some(expected)) => Err(TapnetError::http_error(format!(
                "peer closed after {} of {} body bytes",
                self.body_len, expected
            ))),
            (Some(_), None) => {
                self.sink.on_chunk(&[], true)?;
                self.finished = true;
                Ok(())
            }
        }
    }

    fn summary(&self) -> ResponseSummary {
        ResponseSummary {
            status_code: self.head.as_ref().map_or(0, |head| head.status_code),
            body_len: self.body_len,
            chunks: self.chunks,
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ----------------------------------------------------------------------------
// Exchange
// ----------------------------------------------------------------------------

/// Reads one response from a session into a sink
#[derive(Debug, Clone)]
pub struct HttpExchange {
    receive_timeout: Duration,
    chunk_size: usize,
}

impl HttpExchange {
    pub fn new(receive_timeout: Duration, chunk_size: usize) -> Self {
        Self {
            receive_timeout,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Send `request` as a single write
    pub async fn send(&self, session: &mut Session, request: &HttpRequest) -> TapnetResult<()> {
        let bytes = request.to_bytes();
        trace!("Sending {} byte {} request", bytes.len(), request.method);
        session.send_complete(&bytes).await?;
        Ok(())
    }

    /// Drain the response, delivering body chunks to `sink`
    ///
    /// Each wait for data is bounded by the receive timeout; the session is
    /// left open for the caller to close.
    pub async fn receive<S: ResponseSink>(
        &self,
        session: &mut Session,
        sink: &mut S,
    ) -> TapnetResult<ResponseSummary> {
        let mut reader = ResponseReader::new(sink);
        let mut buf = vec![0u8; self.chunk_size];

        while !reader.finished {
            if !session.await_readable(self.receive_timeout).await {
                if session.is_peer_closed() {
                    reader.peer_closed()?;
                    break;
                }
                return Err(SessionError::ReceiveTimeout {
                    timeout_ms: self.receive_timeout.as_millis() as u64,
                }
                .into());
            }

            let read = session.recv(&mut buf).await?;
            if read == 0 {
                reader.peer_closed()?;
                break;
            }
            reader.feed(&buf[..read])?;
        }

        Ok(reader.summary())
    }

    /// Send then receive on the same session
    pub async fn execute<S: ResponseSink>(
        &self,
        session: &mut Session,
        request: &HttpRequest,
        sink: &mut S,
    ) -> TapnetResult<ResponseSummary> {
        self.send(session, request).await?;
        self.receive(session, sink).await
    }
}

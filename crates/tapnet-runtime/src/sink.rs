//! Response sinks
//!
//! A sink receives a response body in pieces as `(chunk, is_final)`. The
//! text sink accumulates a plain response; the status sink decodes a binary
//! `StatusResponse` once the final chunk arrives.

use tapnet_core::{CodecError, ResponseBuffer, StatusResponse, TapnetResult};
use tracing::{debug, info};

/// Consumer of an incrementally delivered response
pub trait ResponseSink: Send {
    /// Status code from the response head, when the transport has one
    fn on_status(&mut self, _status_code: u16) {}

    /// One body chunk; `is_final` is set exactly once, on the last call
    fn on_chunk(&mut self, chunk: &[u8], is_final: bool) -> TapnetResult<()>;
}

// ----------------------------------------------------------------------------
// Text Sink
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct TextResponseSink {
    status_code: Option<u16>,
    body: Vec<u8>,
    chunks: usize,
    finished: bool,
}

impl TextResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl ResponseSink for TextResponseSink {
    fn on_status(&mut self, status_code: u16) {
        debug!("Response status: {}", status_code);
        self.status_code = Some(status_code);
    }

    fn on_chunk(&mut self, chunk: &[u8], is_final: bool) -> TapnetResult<()> {
        if !chunk.is_empty() {
            self.chunks += 1;
            self.body.extend_from_slice(chunk);
        }

        if is_final {
            self.finished = true;
            info!(
                "Received final chunk: {} bytes in {} chunks",
                self.body.len(),
                self.chunks
            );
        } else {
            debug!("Received {} bytes (more data pending)", chunk.len());
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Status Sink
// ----------------------------------------------------------------------------

/// Collects a binary body into a fixed buffer and decodes it when complete
#[derive(Debug, Default)]
pub struct StatusResponseSink {
    status_code: Option<u16>,
    buffer: ResponseBuffer,
    response: Option<StatusResponse>,
}

impl StatusResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// The decoded response, present only after a successful final chunk
    pub fn response(&self) -> Option<&StatusResponse> {
        self.response.as_ref()
    }

    pub fn into_response(self) -> Option<StatusResponse> {
        self.response
    }
}

impl ResponseSink for StatusResponseSink {
    fn on_status(&mut self, status_code: u16) {
        self.status_code = Some(status_code);
    }

    fn on_chunk(&mut self, chunk: &[u8], is_final: bool) -> TapnetResult<()> {
        self.buffer.extend_from_slice(chunk).map_err(|_| {
            CodecError::malformed(format!(
                "response body exceeds {} bytes",
                self.buffer.capacity()
            ))
        })?;

        if !is_final {
            return Ok(());
        }

        let response: StatusResponse = self.buffer.decode_message()?;
        info!("Status response: {}", response.status());
        self.response = Some(response);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapnet_core::{encode, TapnetError, RESPONSE_CAPACITY};

    #[test]
    fn test_text_sink_counts_chunks() {
        let mut sink = TextResponseSink::new();
        sink.on_status(200);
        sink.on_chunk(b"hel", false).unwrap();
        sink.on_chunk(b"lo", false).unwrap();
        sink.on_chunk(b"", true).unwrap();

        assert!(sink.is_finished());
        assert_eq!(sink.chunks(), 2);
        assert_eq!(sink.text(), "hello");
        assert_eq!(sink.status_code(), Some(200));
    }

    #[test]
    fn test_status_sink_decodes_on_final() {
        let mut body = [0u8; 32];
        let len = encode(&StatusResponse::new("ok").unwrap(), &mut body).unwrap();

        let mut sink = StatusResponseSink::new();
        sink.on_chunk(&body[..1], false).unwrap();
        assert!(sink.response().is_none());
        sink.on_chunk(&body[1..len], true).unwrap();
        assert_eq!(sink.response().map(|r| r.status()), Some("ok"));
    }

    #[test]
    fn test_status_sink_empty_body() {
        let mut sink = StatusResponseSink::new();
        let err = sink.on_chunk(&[], true).unwrap_err();
        assert!(matches!(err, TapnetError::Codec(CodecError::DecodeEmpty)));
        assert!(sink.response().is_none());
    }

    #[test]
    fn test_status_sink_rejects_oversized_body() {
        let mut sink = StatusResponseSink::new();
        let big = vec![0x0a; RESPONSE_CAPACITY + 1];
        assert!(matches!(
            sink.on_chunk(&big, false),
            Err(TapnetError::Codec(CodecError::DecodeMalformed { .. }))
        ));
    }
}

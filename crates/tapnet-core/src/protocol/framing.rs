//! Length-prefixed framing for raw stream transport
//!
//! A frame is a 2-byte big-endian payload length followed by the payload.

use crate::errors::CodecError;
use heapless::Vec as HeaplessVec;

/// Length prefix size
pub const FRAME_HEADER_LEN: usize = 2;

/// Write `payload` as one frame into `out`, returning the frame length
pub fn encode_frame(payload: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
    let required = FRAME_HEADER_LEN + payload.len();
    if payload.len() > u16::MAX as usize || required > out.len() {
        return Err(CodecError::EncodeOverflow {
            capacity: out.len(),
            required,
        });
    }
    out[..FRAME_HEADER_LEN].copy_from_slice(&(payload.len() as u16).to_be_bytes());
    out[FRAME_HEADER_LEN..required].copy_from_slice(payload);
    Ok(required)
}

/// Incremental frame assembler with a payload limit of `N` bytes
#[derive(Debug, Clone)]
pub struct FrameDecoder<const N: usize> {
    header: [u8; FRAME_HEADER_LEN],
    header_pos: usize,
    payload_len: Option<usize>,
    payload: HeaplessVec<u8, N>,
}

impl<const N: usize> Default for FrameDecoder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FrameDecoder<N> {
    pub fn new() -> Self {
        Self {
            header: [0u8; FRAME_HEADER_LEN],
            header_pos: 0,
            payload_len: None,
            payload: HeaplessVec::new(),
        }
    }

    /// Feed received bytes
    ///
    /// Returns the bytes consumed and whether a complete frame is ready.
    /// Bytes after a complete frame are left unconsumed.
    pub fn push(&mut self, mut bytes: &[u8]) -> Result<(usize, bool), CodecError> {
        let total = bytes.len();

        while self.payload_len.is_none() && !bytes.is_empty() {
            self.header[self.header_pos] = bytes[0];
            self.header_pos += 1;
            bytes = &bytes[1..];
            if self.header_pos == FRAME_HEADER_LEN {
                let len = u16::from_be_bytes(self.header) as usize;
                if len > N {
                    return Err(CodecError::malformed(format!(
                        "frame length {} exceeds limit {}",
                        len, N
                    )));
                }
                self.payload_len = Some(len);
            }
        }

        let Some(expected) = self.payload_len else {
            return Ok((total - bytes.len(), false));
        };

        let wanted = expected - self.payload.len();
        let take = wanted.min(bytes.len());
        self.payload
            .extend_from_slice(&bytes[..take])
            .map_err(|_| CodecError::malformed("frame payload exceeds decoder capacity"))?;
        bytes = &bytes[take..];

        Ok((total - bytes.len(), self.payload.len() == expected))
    }

    pub fn is_complete(&self) -> bool {
        self.payload_len == Some(self.payload.len())
    }

    /// Payload of the completed frame
    pub fn payload(&self) -> Option<&[u8]> {
        self.is_complete().then(|| self.payload.as_slice())
    }

    /// Report what is missing when the stream ended early
    pub fn finish(&self) -> Result<&[u8], CodecError> {
        match self.payload_len {
            Some(expected) if expected == self.payload.len() => Ok(self.payload.as_slice()),
            Some(expected) => Err(CodecError::DecodeTruncated {
                offset: FRAME_HEADER_LEN + self.payload.len(),
                needed: expected - self.payload.len(),
            }),
            None if self.header_pos == 0 => Err(CodecError::DecodeEmpty),
            None => Err(CodecError::DecodeTruncated {
                offset: self.header_pos,
                needed: FRAME_HEADER_LEN - self.header_pos,
            }),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

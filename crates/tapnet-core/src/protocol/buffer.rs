//! Fixed-capacity byte buffers for request encoding and response capture

use super::codec::{self, WireMessage};
use crate::errors::CodecError;

/// Capacity of the outgoing request buffer
pub const REQUEST_CAPACITY: usize = 32;

/// Capacity of the buffer holding a raw response body
pub const RESPONSE_CAPACITY: usize = 256;

/// Byte buffer that never grows past `N`
#[derive(Clone)]
pub struct FixedBuffer<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

pub type RequestBuffer = FixedBuffer<REQUEST_CAPACITY>;
pub type ResponseBuffer = FixedBuffer<RESPONSE_CAPACITY>;

impl<const N: usize> Default for FixedBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for FixedBuffer<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FixedBuffer")
            .field("capacity", &N)
            .field("len", &self.len)
            .finish()
    }
}

impl<const N: usize> FixedBuffer<N> {
    pub const fn new() -> Self {
        Self {
            bytes: [0u8; N],
            len: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn clear(&mut self) {
        self.bytes[..self.len].fill(0);
        self.len = 0;
    }

    /// Append bytes; fails without appending anything if they do not fit
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let required = self.len + bytes.len();
        if required > N {
            return Err(CodecError::EncodeOverflow {
                capacity: N,
                required,
            });
        }
        self.bytes[self.len..required].copy_from_slice(bytes);
        self.len = required;
        Ok(())
    }

    /// Replace the contents with the encoded form of `message`
    pub fn encode_message<M: WireMessage>(&mut self, message: &M) -> Result<usize, CodecError> {
        self.clear();
        let written = codec::encode(message, &mut self.bytes)?;
        self.len = written;
        Ok(written)
    }

    /// Decode the current contents as `M`
    pub fn decode_message<M: WireMessage>(&self) -> Result<M, CodecError> {
        codec::decode(self.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::status::StatusRequest;

    #[test]
    fn test_extend_is_all_or_nothing() {
        let mut buffer = FixedBuffer::<4>::new();
        buffer.extend_from_slice(&[1, 2, 3]).unwrap();
        assert!(buffer.extend_from_slice(&[4, 5]).is_err());
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_failed_encode_leaves_nothing_to_decode() {
        let mut buffer = FixedBuffer::<2>::new();
        assert!(buffer.encode_message(&StatusRequest::new(1_000_000)).is_err());
        assert!(buffer.is_empty());
        assert!(buffer.decode_message::<StatusRequest>().is_err());
    }

    #[test]
    fn test_request_buffer_encodes_request() {
        let mut buffer = RequestBuffer::new();
        let written = buffer.encode_message(&StatusRequest::new(42)).unwrap();
        assert_eq!(written, buffer.len());
        assert_eq!(
            buffer.decode_message::<StatusRequest>().unwrap(),
            StatusRequest::new(42)
        );
    }
}

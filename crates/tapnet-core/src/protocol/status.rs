//! Status exchange messages
//!
//! The device reports its boot count; the server answers with a short status
//! string.

use super::codec::{varint_len, FieldKey, StreamReader, StreamWriter, WireMessage, WireType};
use crate::errors::CodecError;

/// Longest status string accepted on the wire
pub const STATUS_MAX_LEN: usize = 64;

const BOOT_COUNT_FIELD: u32 = 1;
const STATUS_FIELD: u32 = 1;

fn unexpected_field(key: FieldKey, offset: usize) -> CodecError {
    CodecError::malformed(format!(
        "unexpected wire tag 0x{:x} (field {}) at offset {}",
        key.as_u64(),
        key.field,
        offset
    ))
}

// ----------------------------------------------------------------------------
// Status Request
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRequest {
    pub boot_count: u32,
}

impl StatusRequest {
    pub fn new(boot_count: u32) -> Self {
        Self { boot_count }
    }
}

impl WireMessage for StatusRequest {
    fn encoded_len(&self) -> usize {
        let key = FieldKey::new(BOOT_COUNT_FIELD, WireType::Varint);
        varint_len(key.as_u64()) + varint_len(self.boot_count as u64)
    }

    // The field is always written, zero included, so an encoded request is
    // never empty.
    fn encode_to(&self, writer: &mut StreamWriter<'_>) -> Result<(), CodecError> {
        writer.write_uint_field(BOOT_COUNT_FIELD, self.boot_count as u64)
    }

    fn decode_from(reader: &mut StreamReader<'_>) -> Result<Self, CodecError> {
        let mut boot_count = None;
        while !reader.is_at_end() {
            let offset = reader.position();
            let key = reader.read_key()?;
            match (key.field, key.wire_type) {
                (BOOT_COUNT_FIELD, WireType::Varint) => {
                    let value = reader.read_varint()?;
                    let value = u32::try_from(value).map_err(|_| {
                        CodecError::malformed(format!("boot_count {} exceeds u32", value))
                    })?;
                    boot_count = Some(value);
                }
                _ => return Err(unexpected_field(key, offset)),
            }
        }

        boot_count
            .map(StatusRequest::new)
            .ok_or_else(|| CodecError::malformed("missing boot_count field"))
    }
}

// ----------------------------------------------------------------------------
// Status Response
// ----------------------------------------------------------------------------

/// Server status; the text is bounded, valid UTF-8 and NUL-free
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    status: heapless::String<STATUS_MAX_LEN>,
}

impl StatusResponse {
    pub fn new(status: &str) -> Result<Self, CodecError> {
        Self::from_bytes(status.as_bytes())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() > STATUS_MAX_LEN {
            return Err(CodecError::malformed(format!(
                "status is {} bytes, limit is {}",
                bytes.len(),
                STATUS_MAX_LEN
            )));
        }
        if bytes.contains(&0) {
            return Err(CodecError::malformed("status contains NUL"));
        }
        let text = core::str::from_utf8(bytes)
            .map_err(|_| CodecError::malformed("status is not valid UTF-8"))?;

        let mut status = heapless::String::new();
        status
            .push_str(text)
            .map_err(|_| CodecError::malformed("status does not fit"))?;
        Ok(Self { status })
    }

    pub fn status(&self) -> &str {
        self.status.as_str()
    }
}

impl WireMessage for StatusResponse {
    fn encoded_len(&self) -> usize {
        let key = FieldKey::new(STATUS_FIELD, WireType::LengthDelimited);
        let len = self.status.len();
        varint_len(key.as_u64()) + varint_len(len as u64) + len
    }

    fn encode_to(&self, writer: &mut StreamWriter<'_>) -> Result<(), CodecError> {
        writer.write_bytes_field(STATUS_FIELD, self.status.as_bytes())
    }

    fn decode_from(reader: &mut StreamReader<'_>) -> Result<Self, CodecError> {
        let mut response = None;
        while !reader.is_at_end() {
            let offset = reader.position();
            let key = reader.read_key()?;
            match (key.field, key.wire_type) {
                (STATUS_FIELD, WireType::LengthDelimited) => {
                    let bytes = reader.read_length_delimited()?;
                    response = Some(StatusResponse::from_bytes(bytes)?);
                }
                _ => return Err(unexpected_field(key, offset)),
            }
        }

        response.ok_or_else(|| CodecError::malformed("missing status field"))
    }
}

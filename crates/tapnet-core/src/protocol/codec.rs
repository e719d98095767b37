//! Streaming binary codec
//!
//! Messages use protobuf field keys (`field << 3 | wire type`), varint
//! integers and length-delimited bytes. The writer never grows its buffer and
//! the reader never reads past the end of its input.

use crate::errors::CodecError;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Longest varint accepted for a 64-bit value
pub const MAX_VARINT_LEN: usize = 10;

// ----------------------------------------------------------------------------
// Wire Types
// ----------------------------------------------------------------------------

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint = 0,
    LengthDelimited = 2,
}

impl WireType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(WireType::Varint),
            2 => Some(WireType::LengthDelimited),
            _ => None,
        }
    }
}

/// Field key: number and wire type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldKey {
    pub field: u32,
    pub wire_type: WireType,
}

impl FieldKey {
    pub const fn new(field: u32, wire_type: WireType) -> Self {
        Self { field, wire_type }
    }

    pub fn as_u64(&self) -> u64 {
        ((self.field as u64) << 3) | self.wire_type as u64
    }
}

/// Bytes needed to encode `value` as a varint
pub fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

// ----------------------------------------------------------------------------
// Stream Writer
// ----------------------------------------------------------------------------

/// Bounds-checked writer over a caller-provided buffer
pub struct StreamWriter<'a> {
    buf: &'a mut [u8],
    written: usize,
}

impl<'a> StreamWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, written: 0 }
    }

    pub fn bytes_written(&self) -> usize {
        self.written
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let required = self.written + bytes.len();
        if required > self.buf.len() {
            return Err(CodecError::EncodeOverflow {
                capacity: self.buf.len(),
                required,
            });
        }
        self.buf[self.written..required].copy_from_slice(bytes);
        self.written = required;
        Ok(())
    }

    pub fn write_varint(&mut self, mut value: u64) -> Result<(), CodecError> {
        let mut scratch = [0u8; MAX_VARINT_LEN];
        let mut len = 0;
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                scratch[len] = byte;
                len += 1;
                break;
            }
            scratch[len] = byte | 0x80;
            len += 1;
        }
        self.write_bytes(&scratch[..len])
    }

    pub fn write_key(&mut self, key: FieldKey) -> Result<(), CodecError> {
        self.write_varint(key.as_u64())
    }

    pub fn write_uint_field(&mut self, field: u32, value: u64) -> Result<(), CodecError> {
        self.write_key(FieldKey::new(field, WireType::Varint))?;
        self.write_varint(value)
    }

    pub fn write_bytes_field(&mut self, field: u32, bytes: &[u8]) -> Result<(), CodecError> {
        self.write_key(FieldKey::new(field, WireType::LengthDelimited))?;
        self.write_varint(bytes.len() as u64)?;
        self.write_bytes(bytes)
    }
}

// ----------------------------------------------------------------------------
// Stream Reader
// ----------------------------------------------------------------------------

/// Cursor over received bytes
pub struct StreamReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> StreamReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn read_varint(&mut self) -> Result<u64, CodecError> {
        let start = self.pos;
        let mut value: u64 = 0;
        for index in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(CodecError::DecodeTruncated {
                    offset: start,
                    needed: 1,
                });
            };
            self.pos += 1;
            let bits = (byte & 0x7f) as u64;
            if index == MAX_VARINT_LEN - 1 && bits > 1 {
                return Err(CodecError::malformed(format!(
                    "varint at offset {} overflows 64 bits",
                    start
                )));
            }
            value |= bits << (7 * index);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::malformed(format!(
            "varint at offset {} longer than {} bytes",
            start, MAX_VARINT_LEN
        )))
    }

    /// Read a field key; unknown wire types are malformed
    pub fn read_key(&mut self) -> Result<FieldKey, CodecError> {
        let offset = self.pos;
        let raw = self.read_varint()?;
        let wire_type = WireType::from_u8((raw & 0x07) as u8).ok_or_else(|| {
            CodecError::malformed(format!(
                "unexpected wire tag 0x{:x} at offset {}",
                raw, offset
            ))
        })?;
        let field = raw >> 3;
        if field == 0 || field > u32::MAX as u64 {
            return Err(CodecError::malformed(format!(
                "invalid field number {} at offset {}",
                field, offset
            )));
        }
        Ok(FieldKey::new(field as u32, wire_type))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.buf.len() - self.pos;
        if len > remaining {
            return Err(CodecError::DecodeTruncated {
                offset: self.pos,
                needed: len - remaining,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len)
            .map_err(|_| CodecError::malformed(format!("length {} does not fit in memory", len)))?;
        self.read_bytes(len)
    }
}

// ----------------------------------------------------------------------------
// Message Trait
// ----------------------------------------------------------------------------

/// A fixed-schema message carried by the codec
pub trait WireMessage: Sized {
    /// Exact size of the encoded form
    fn encoded_len(&self) -> usize;

    fn encode_to(&self, writer: &mut StreamWriter<'_>) -> Result<(), CodecError>;

    fn decode_from(reader: &mut StreamReader<'_>) -> Result<Self, CodecError>;
}

/// Encode `message` into `buf`, returning the byte count
///
/// On failure nothing is left in `buf` that a later decode could consume.
pub fn encode<M: WireMessage>(message: &M, buf: &mut [u8]) -> Result<usize, CodecError> {
    let required = message.encoded_len();
    if required > buf.len() {
        return Err(CodecError::EncodeOverflow {
            capacity: buf.len(),
            required,
        });
    }

    let mut writer = StreamWriter::new(buf);
    match message.encode_to(&mut writer) {
        Ok(()) => Ok(writer.bytes_written()),
        Err(e) => {
            let written = writer.bytes_written();
            buf[..written].fill(0);
            Err(e)
        }
    }
}

/// Decode a message from exactly `bytes`
pub fn decode<M: WireMessage>(bytes: &[u8]) -> Result<M, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::DecodeEmpty);
    }
    let mut reader = StreamReader::new(bytes);
    M::decode_from(&mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_encoding_matches_protobuf() {
        let mut buf = [0u8; 4];
        let mut writer = StreamWriter::new(&mut buf);
        writer.write_varint(300).unwrap();
        assert_eq!(writer.bytes_written(), 2);
        assert_eq!(&buf[..2], &[0xac, 0x02]);
        assert_eq!(varint_len(300), 2);
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(u64::MAX), MAX_VARINT_LEN);
    }

    #[test]
    fn test_varint_extremes_read_back() {
        for value in [0u64, 1, 127, 128, u32::MAX as u64, u64::MAX] {
            let mut buf = [0u8; MAX_VARINT_LEN];
            let mut writer = StreamWriter::new(&mut buf);
            writer.write_varint(value).unwrap();
            let len = writer.bytes_written();

            let mut reader = StreamReader::new(&buf[..len]);
            assert_eq!(reader.read_varint().unwrap(), value);
            assert!(reader.is_at_end());
        }
    }

    #[test]
    fn test_writer_refuses_to_overflow() {
        let mut buf = [0u8; 2];
        let mut writer = StreamWriter::new(&mut buf);
        let err = writer.write_bytes(&[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            CodecError::EncodeOverflow {
                capacity: 2,
                required: 3
            }
        );
        assert_eq!(writer.bytes_written(), 0);
    }

    #[test]
    fn test_truncated_varint() {
        let mut reader = StreamReader::new(&[0x80, 0x80]);
        assert_eq!(
            reader.read_varint().unwrap_err(),
            CodecError::DecodeTruncated {
                offset: 0,
                needed: 1
            }
        );
    }

    #[test]
    fn test_overlong_varint_is_malformed() {
        let bytes = [0xffu8; 11];
        let mut reader = StreamReader::new(&bytes);
        assert!(matches!(
            reader.read_varint(),
            Err(CodecError::DecodeMalformed { .. })
        ));
    }

    #[test]
    fn test_unknown_wire_type_is_malformed() {
        // field 1, wire type 5 (fixed32) is not part of this protocol
        let mut reader = StreamReader::new(&[0x0d, 0, 0, 0, 0]);
        let err = reader.read_key().unwrap_err();
        match err {
            CodecError::DecodeMalformed { reason } => assert!(reason.contains("wire tag")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_length_past_end_is_truncated() {
        let mut reader = StreamReader::new(&[0x05, b'a', b'b']);
        assert_eq!(
            reader.read_length_delimited().unwrap_err(),
            CodecError::DecodeTruncated {
                offset: 1,
                needed: 3
            }
        );
    }
}

//! Wire protocol: codec, status messages, buffers and framing

pub mod buffer;
pub mod codec;
pub mod framing;
pub mod status;

pub use buffer::{FixedBuffer, RequestBuffer, ResponseBuffer, REQUEST_CAPACITY, RESPONSE_CAPACITY};
pub use codec::{decode, encode, StreamReader, StreamWriter, WireMessage};
pub use framing::{encode_frame, FrameDecoder, FRAME_HEADER_LEN};
pub use status::{StatusRequest, StatusResponse, STATUS_MAX_LEN};

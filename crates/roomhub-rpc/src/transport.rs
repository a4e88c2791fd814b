//! Length-prefixed transport codec for room link messages.
//!
//! Frame format:
//! ```text
//! +----------------+------------------+
//! |  4 bytes       |  N bytes         |
//! |  (length BE)   |  (JSON payload)  |
//! +----------------+------------------+
//! ```
//!
//! A frame whose payload does not parse is yielded as `Err(ProtocolError)`
//! inside the item, so one bad message never tears down the stream. Only I/O
//! failures and oversized frames end it.

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::protocol::Message;

/// Maximum message size (1 MB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Length prefix size in bytes
const LENGTH_PREFIX_SIZE: usize = 4;

/// Codec for length-prefixed JSON messages
#[derive(Debug, Default)]
pub struct MessageCodec {
    current_length: Option<usize>,
}

impl MessageCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for MessageCodec {
    type Item = Result<Message, ProtocolError>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.current_length.is_none() {
            if src.len() < LENGTH_PREFIX_SIZE {
                return Ok(None);
            }

            let len = src.get_u32() as usize;

            if len > MAX_MESSAGE_SIZE {
                return Err(CodecError::MessageTooLarge(len));
            }

            self.current_length = Some(len);
        }

        let Some(length) = self.current_length else {
            return Ok(None);
        };

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let payload = src.split_to(length);
        self.current_length = None;

        let message = std::str::from_utf8(&payload)
            .map_err(ProtocolError::from)
            .and_then(|json| Message::parse(json).map_err(ProtocolError::from));

        Ok(Some(message))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    // Message size is checked against MAX_MESSAGE_SIZE (fits in u32)
    #[allow(clippy::cast_possible_truncation)]
    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = item.to_json()?;
        let json_bytes = json.as_bytes();

        if json_bytes.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(json_bytes.len()));
        }

        dst.reserve(LENGTH_PREFIX_SIZE + json_bytes.len());
        dst.put_u32(json_bytes.len() as u32);
        dst.put_slice(json_bytes);

        Ok(())
    }
}

/// Errors that end a room link stream
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),
}

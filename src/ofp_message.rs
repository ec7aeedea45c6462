use std::io;

use thiserror::Error;

use crate::ofp_header::{OfpHeader, Xid};

/// Errors raised while framing, parsing, or serializing OpenFlow messages.
///
/// `MalformedFrame` and `UnsupportedMessage` terminate the originating
/// session; neither propagates to other sessions.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },
    #[error("unsupported message type 0x{msg_type:02x}")]
    UnsupportedMessage { msg_type: u8 },
    #[error("unexpected value {value} in field '{field}' of {context}")]
    UnexpectedValue {
        value: String,
        field: &'static str,
        context: &'static str,
    },
}

impl From<io::Error> for CodecError {
    // Reads past the end of a frame body surface as io errors from the
    // cursor; they all mean the peer sent a short frame.
    fn from(e: io::Error) -> Self {
        CodecError::MalformedFrame {
            reason: e.to_string(),
        }
    }
}

/// Byte-buffer level handling of a complete OpenFlow message.
pub trait OfpMessage: Sized {
    /// Byte size of the message, header included.
    fn size_of(&self) -> usize;
    /// Serialize the message, prepending a header carrying `xid`.
    fn marshal(xid: Xid, msg: Self) -> Result<Vec<u8>, CodecError>;
    /// Parse a message body according to an already-parsed header.
    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(Xid, Self), CodecError>;
}

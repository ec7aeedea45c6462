use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::ofp_message::CodecError;
use crate::openflow::MsgCode;

pub const OFP_HEADER_LENGTH: usize = 8;

/// The one protocol version this controller speaks.
pub const OFP_VERSION: u8 = 0x01;

/// Frames longer than this are malformed; the length field is 16 bits wide.
pub const OFP_MAX_FRAME_LENGTH: usize = 0xFFFF;

pub type Xid = u32;

/// The first eight bytes of every OpenFlow message.
///
/// Parsed first to learn the type and length of the remaining message so the
/// session read loop knows how many bytes complete the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfpHeader {
    version: u8,
    typ: u8,
    length: u16,
    xid: u32,
}

impl OfpHeader {
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> OfpHeader {
        OfpHeader {
            version,
            typ,
            length,
            xid,
        }
    }

    pub fn size() -> usize {
        OFP_HEADER_LENGTH
    }

    /// Append the wire form of `header` to `bytes`.
    pub fn marshal(bytes: &mut Vec<u8>, header: &OfpHeader) {
        bytes.push(header.version);
        bytes.push(header.typ);
        bytes.write_u16::<BigEndian>(header.length).unwrap();
        bytes.write_u32::<BigEndian>(header.xid).unwrap();
    }

    /// Parse a header out of `buf` and validate the length field. A frame
    /// claiming fewer bytes than the header itself is malformed.
    pub fn parse(buf: &[u8]) -> Result<OfpHeader, CodecError> {
        let mut bytes = Cursor::new(buf);
        let version = bytes.read_u8()?;
        let typ = bytes.read_u8()?;
        let length = bytes.read_u16::<BigEndian>()?;
        let xid = bytes.read_u32::<BigEndian>()?;
        if (length as usize) < OFP_HEADER_LENGTH {
            return Err(CodecError::MalformedFrame {
                reason: format!("length field {} shorter than the header", length),
            });
        }
        Ok(OfpHeader {
            version,
            typ,
            length,
            xid,
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Message type code, or `UnsupportedMessage` for a byte outside the
    /// OpenFlow 1.0 table.
    pub fn type_code(&self) -> Result<MsgCode, CodecError> {
        MsgCode::from_u8(self.typ).ok_or(CodecError::UnsupportedMessage { msg_type: self.typ })
    }

    /// Total frame length, header included.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Transaction id pairing replies with requests.
    pub fn xid(&self) -> Xid {
        self.xid
    }
}

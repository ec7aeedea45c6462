use std::fmt;

use thiserror::Error;

/// Minimum Ethernet header: destination, source, ethertype.
const ETHERNET_HEADER_LENGTH: usize = 14;

const ETHERTYPE_VLAN: u16 = 0x8100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("ethernet frame truncated at {len} bytes")]
    Truncated { len: usize },
}

/// A 48-bit IEEE 802 MAC address.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    pub fn new(octets: [u8; 6]) -> MacAddr {
        MacAddr(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == MacAddr::BROADCAST
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The Ethernet header of a packet delivered by PACKET_IN.
///
/// The forwarding policy only matches on layer 2, so parsing stops after the
/// ethertype; the payload stays opaque and is re-emitted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub vlan: Option<u16>,
    pub ethertype: u16,
}

impl EthernetFrame {
    pub fn parse(buf: &[u8]) -> Result<EthernetFrame, FrameError> {
        if buf.len() < ETHERNET_HEADER_LENGTH {
            return Err(FrameError::Truncated { len: buf.len() });
        }
        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&buf[0..6]);
        src.copy_from_slice(&buf[6..12]);
        let typ = u16::from_be_bytes([buf[12], buf[13]]);
        let (vlan, ethertype) = if typ == ETHERTYPE_VLAN {
            if buf.len() < ETHERNET_HEADER_LENGTH + 4 {
                return Err(FrameError::Truncated { len: buf.len() });
            }
            let tci = u16::from_be_bytes([buf[14], buf[15]]);
            let inner = u16::from_be_bytes([buf[16], buf[17]]);
            (Some(tci & 0x0fff), inner)
        } else {
            (None, typ)
        };
        Ok(EthernetFrame {
            dst: MacAddr::new(dst),
            src: MacAddr::new(src),
            vlan,
            ethertype,
        })
    }

    pub fn is_broadcast(&self) -> bool {
        self.dst.is_broadcast()
    }
}

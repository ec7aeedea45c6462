//! Bit-exact serialization of OpenFlow 1.0 (wire version 0x01) messages.
//!
//! Every multi-byte field is big-endian. Truncated or inconsistent frames
//! surface as [`CodecError::MalformedFrame`]; syntactically valid but
//! unhandled message types surface as [`CodecError::UnsupportedMessage`]
//! carrying the type byte, leaving the disposition to the session layer.

use std::io::{BufRead, Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Buf;

use crate::message::*;
use crate::ofp_header::{OfpHeader, Xid, OFP_VERSION};
use crate::ofp_message::{CodecError, OfpMessage};
use crate::openflow::MsgCode;
use crate::packet::MacAddr;

const MATCH_LENGTH: usize = 40;
const PHY_PORT_LENGTH: usize = 48;
const PORT_NAME_LENGTH: usize = 16;
const FEATURES_FIXED_LENGTH: usize = 24;
const FLOW_MOD_FIXED_LENGTH: usize = 24;
const PACKET_IN_FIXED_LENGTH: usize = 10;
const PACKET_OUT_FIXED_LENGTH: usize = 8;
const FLOW_REMOVED_FIXED_LENGTH: usize = 40;
const PORT_STATUS_LENGTH: usize = 56;
const PORT_MOD_LENGTH: usize = 24;
const ERROR_FIXED_LENGTH: usize = 4;
const SWITCH_CONFIG_LENGTH: usize = 4;
const STATS_FIXED_LENGTH: usize = 4;
const FLOW_STATS_REQ_LENGTH: usize = 44;
const FLOW_STATS_ENTRY_FIXED_LENGTH: usize = 88;
const AGGREGATE_STATS_LENGTH: usize = 24;
const DESC_STR_LENGTH: usize = 256;
const SERIAL_NUM_LENGTH: usize = 32;

/// Auxiliary connection id of a main connection. OpenFlow 1.0 has no
/// auxiliary channels, so every 1.0 session registers under this id.
pub const MAIN_CONNECTION: u8 = 0;

/// Reserved port numbers (`ofp_port`).
#[repr(u16)]
pub enum OfpPort {
    Max = 0xff00,
    InPort = 0xfff8,
    Table = 0xfff9,
    Normal = 0xfffa,
    Flood = 0xfffb,
    All = 0xfffc,
    Controller = 0xfffd,
    Local = 0xfffe,
    None = 0xffff,
}

/// Action type codes (`ofp_action_type`).
#[repr(u16)]
enum OfpActionType {
    Output = 0,
    SetVlanVid = 1,
    SetVlanPcp = 2,
    StripVlan = 3,
    SetDlSrc = 4,
    SetDlDst = 5,
    SetNwSrc = 6,
    SetNwDst = 7,
    SetNwTos = 8,
    SetTpSrc = 9,
    SetTpDst = 10,
    Enqueue = 11,
}

type Body<'a> = Cursor<&'a [u8]>;

fn write_padding(bytes: &mut Vec<u8>, count: usize) {
    bytes.resize(bytes.len() + count, 0);
}

fn read_mac(bytes: &mut Body) -> Result<MacAddr, CodecError> {
    let mut octets = [0u8; 6];
    bytes.read_exact(&mut octets)?;
    Ok(MacAddr::new(octets))
}

fn write_mac(bytes: &mut Vec<u8>, mac: MacAddr) {
    bytes.extend_from_slice(&mac.octets());
}

fn read_fixed_string(bytes: &mut Body, capacity: usize) -> Result<String, CodecError> {
    let mut raw = vec![0u8; capacity];
    bytes.read_exact(&mut raw)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(capacity);
    raw.truncate(end);
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn write_fixed_string(bytes: &mut Vec<u8>, s: &str, capacity: usize) {
    let raw = s.as_bytes();
    let n = raw.len().min(capacity);
    bytes.extend_from_slice(&raw[..n]);
    write_padding(bytes, capacity - n);
}

impl Wildcards {
    // The nw_src/nw_dst wildcards are 6-bit prefix-length counters, not
    // single flags.
    fn set_nw_mask(f: u32, offset: usize, v: u32) -> u32 {
        f | ((0x3f & v) << offset)
    }

    fn get_nw_mask(f: u32, offset: usize) -> u32 {
        (f >> offset) & 0x3f
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        let mut bits = (self.in_port as u32)
            | (self.dl_vlan as u32) << 1
            | (self.dl_src as u32) << 2
            | (self.dl_dst as u32) << 3
            | (self.dl_type as u32) << 4
            | (self.nw_proto as u32) << 5
            | (self.tp_src as u32) << 6
            | (self.tp_dst as u32) << 7
            | (self.dl_vlan_pcp as u32) << 20
            | (self.nw_tos as u32) << 21;
        bits = Wildcards::set_nw_mask(bits, 8, self.nw_src);
        bits = Wildcards::set_nw_mask(bits, 14, self.nw_dst);
        bytes.write_u32::<BigEndian>(bits).unwrap()
    }

    fn parse(bits: u32) -> Wildcards {
        Wildcards {
            in_port: bits & 0x01 != 0,
            dl_vlan: bits & 0x02 != 0,
            dl_src: bits & 0x04 != 0,
            dl_dst: bits & 0x08 != 0,
            dl_type: bits & 0x10 != 0,
            nw_proto: bits & 0x20 != 0,
            tp_src: bits & 0x40 != 0,
            tp_dst: bits & 0x80 != 0,
            nw_src: Wildcards::get_nw_mask(bits, 8),
            nw_dst: Wildcards::get_nw_mask(bits, 14),
            dl_vlan_pcp: bits & (1 << 20) != 0,
            nw_tos: bits & (1 << 21) != 0,
        }
    }
}

impl Pattern {
    fn parse(bytes: &mut Body) -> Result<Pattern, CodecError> {
        let w = Wildcards::parse(bytes.read_u32::<BigEndian>()?);
        let in_port = if w.in_port {
            bytes.consume(2);
            None
        } else {
            Some(bytes.read_u16::<BigEndian>()?)
        };
        let dl_src = if w.dl_src {
            bytes.consume(6);
            None
        } else {
            Some(read_mac(bytes)?)
        };
        let dl_dst = if w.dl_dst {
            bytes.consume(6);
            None
        } else {
            Some(read_mac(bytes)?)
        };
        let dl_vlan = if w.dl_vlan {
            bytes.consume(2);
            None
        } else {
            let vlan = bytes.read_u16::<BigEndian>()?;
            if vlan == 0xffff {
                Some(None)
            } else {
                Some(Some(vlan))
            }
        };
        let dl_vlan_pcp = if w.dl_vlan_pcp {
            bytes.consume(1);
            None
        } else {
            Some(bytes.read_u8()?)
        };
        bytes.consume(1);
        let dl_typ = if w.dl_type {
            bytes.consume(2);
            None
        } else {
            Some(bytes.read_u16::<BigEndian>()?)
        };
        let nw_tos = if w.nw_tos {
            bytes.consume(1);
            None
        } else {
            Some(bytes.read_u8()?)
        };
        let nw_proto = if w.nw_proto {
            bytes.consume(1);
            None
        } else {
            Some(bytes.read_u8()?)
        };
        bytes.consume(2);
        let nw_src = Pattern::parse_nw(bytes, w.nw_src)?;
        let nw_dst = Pattern::parse_nw(bytes, w.nw_dst)?;
        let tp_src = if w.tp_src {
            bytes.consume(2);
            None
        } else {
            Some(bytes.read_u16::<BigEndian>()?)
        };
        let tp_dst = if w.tp_dst {
            bytes.consume(2);
            None
        } else {
            Some(bytes.read_u16::<BigEndian>()?)
        };
        Ok(Pattern {
            dl_src,
            dl_dst,
            dl_typ,
            dl_vlan,
            dl_vlan_pcp,
            nw_src,
            nw_dst,
            nw_proto,
            nw_tos,
            tp_src,
            tp_dst,
            in_port,
        })
    }

    fn parse_nw(bytes: &mut Body, wild_bits: u32) -> Result<Option<Mask<u32>>, CodecError> {
        if wild_bits >= 32 {
            bytes.consume(4);
            Ok(None)
        } else if wild_bits == 0 {
            Ok(Some(Mask {
                value: bytes.read_u32::<BigEndian>()?,
                mask: None,
            }))
        } else {
            Ok(Some(Mask {
                value: bytes.read_u32::<BigEndian>()?,
                mask: Some(wild_bits),
            }))
        }
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        let w = Pattern::wildcards_of_pattern(self);
        w.marshal(bytes);
        bytes.write_u16::<BigEndian>(self.in_port.unwrap_or(0)).unwrap();
        write_mac(bytes, self.dl_src.unwrap_or(MacAddr::new([0; 6])));
        write_mac(bytes, self.dl_dst.unwrap_or(MacAddr::new([0; 6])));
        let vlan = match self.dl_vlan {
            Some(Some(v)) => v,
            Some(None) | None => 0xffff,
        };
        bytes.write_u16::<BigEndian>(vlan).unwrap();
        bytes.push(self.dl_vlan_pcp.unwrap_or(0));
        write_padding(bytes, 1);
        bytes.write_u16::<BigEndian>(self.dl_typ.unwrap_or(0)).unwrap();
        bytes.push(self.nw_tos.unwrap_or(0));
        bytes.push(self.nw_proto.unwrap_or(0));
        write_padding(bytes, 2);
        bytes
            .write_u32::<BigEndian>(self.nw_src.map(|m| m.value).unwrap_or(0))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(self.nw_dst.map(|m| m.value).unwrap_or(0))
            .unwrap();
        bytes.write_u16::<BigEndian>(self.tp_src.unwrap_or(0)).unwrap();
        bytes.write_u16::<BigEndian>(self.tp_dst.unwrap_or(0)).unwrap();
    }
}

impl PseudoPort {
    fn of_int(p: u16) -> Result<Option<PseudoPort>, CodecError> {
        if p == OfpPort::None as u16 {
            Ok(None)
        } else {
            Ok(Some(PseudoPort::make(p, 0)?))
        }
    }

    fn make(p: u16, max_len: u16) -> Result<PseudoPort, CodecError> {
        let pp = match p {
            p if p == OfpPort::InPort as u16 => PseudoPort::InPort,
            p if p == OfpPort::Table as u16 => PseudoPort::Table,
            p if p == OfpPort::Normal as u16 => PseudoPort::Normal,
            p if p == OfpPort::Flood as u16 => PseudoPort::Flood,
            p if p == OfpPort::All as u16 => PseudoPort::AllPorts,
            p if p == OfpPort::Controller as u16 => PseudoPort::Controller(max_len),
            p if p == OfpPort::Local as u16 => PseudoPort::Local,
            p if p <= OfpPort::Max as u16 => PseudoPort::PhysicalPort(p),
            _ => {
                return Err(CodecError::UnexpectedValue {
                    value: format!("0x{:x}", p),
                    field: "port number",
                    context: "pseudo port",
                })
            }
        };
        Ok(pp)
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        let v = match *self {
            PseudoPort::PhysicalPort(p) => p,
            PseudoPort::InPort => OfpPort::InPort as u16,
            PseudoPort::Table => OfpPort::Table as u16,
            PseudoPort::Normal => OfpPort::Normal as u16,
            PseudoPort::Flood => OfpPort::Flood as u16,
            PseudoPort::AllPorts => OfpPort::All as u16,
            PseudoPort::Controller(_) => OfpPort::Controller as u16,
            PseudoPort::Local => OfpPort::Local as u16,
        };
        bytes.write_u16::<BigEndian>(v).unwrap()
    }
}

impl Action {
    fn type_code(&self) -> u16 {
        let code = match *self {
            Action::Output(_) => OfpActionType::Output,
            Action::SetDlVlan(None) => OfpActionType::StripVlan,
            Action::SetDlVlan(Some(_)) => OfpActionType::SetVlanVid,
            Action::SetDlVlanPcp(_) => OfpActionType::SetVlanPcp,
            Action::SetDlSrc(_) => OfpActionType::SetDlSrc,
            Action::SetDlDst(_) => OfpActionType::SetDlDst,
            Action::SetNwSrc(_) => OfpActionType::SetNwSrc,
            Action::SetNwDst(_) => OfpActionType::SetNwDst,
            Action::SetNwTos(_) => OfpActionType::SetNwTos,
            Action::SetTpSrc(_) => OfpActionType::SetTpSrc,
            Action::SetTpDst(_) => OfpActionType::SetTpDst,
            Action::Enqueue(_, _) => OfpActionType::Enqueue,
        };
        code as u16
    }

    fn size_of(&self) -> usize {
        match *self {
            Action::SetDlSrc(_) | Action::SetDlDst(_) | Action::Enqueue(_, _) => 16,
            _ => 8,
        }
    }

    fn size_of_sequence(actions: &[Action]) -> usize {
        actions.iter().map(Action::size_of).sum()
    }

    fn parse_one(bytes: &mut Body) -> Result<Action, CodecError> {
        let action_code = bytes.read_u16::<BigEndian>()?;
        let _len = bytes.read_u16::<BigEndian>()?;
        let action = match action_code {
            t if t == OfpActionType::Output as u16 => {
                let port_code = bytes.read_u16::<BigEndian>()?;
                let max_len = bytes.read_u16::<BigEndian>()?;
                Action::Output(PseudoPort::make(port_code, max_len)?)
            }
            t if t == OfpActionType::SetVlanVid as u16 => {
                let vid = bytes.read_u16::<BigEndian>()?;
                bytes.consume(2);
                if vid == 0xffff {
                    Action::SetDlVlan(None)
                } else {
                    Action::SetDlVlan(Some(vid))
                }
            }
            t if t == OfpActionType::SetVlanPcp as u16 => {
                let pcp = bytes.read_u8()?;
                bytes.consume(3);
                Action::SetDlVlanPcp(pcp)
            }
            t if t == OfpActionType::StripVlan as u16 => {
                bytes.consume(4);
                Action::SetDlVlan(None)
            }
            t if t == OfpActionType::SetDlSrc as u16 => {
                let mac = read_mac(bytes)?;
                bytes.consume(6);
                Action::SetDlSrc(mac)
            }
            t if t == OfpActionType::SetDlDst as u16 => {
                let mac = read_mac(bytes)?;
                bytes.consume(6);
                Action::SetDlDst(mac)
            }
            t if t == OfpActionType::SetNwSrc as u16 => {
                Action::SetNwSrc(bytes.read_u32::<BigEndian>()?)
            }
            t if t == OfpActionType::SetNwDst as u16 => {
                Action::SetNwDst(bytes.read_u32::<BigEndian>()?)
            }
            t if t == OfpActionType::SetNwTos as u16 => {
                let tos = bytes.read_u8()?;
                bytes.consume(3);
                Action::SetNwTos(tos)
            }
            t if t == OfpActionType::SetTpSrc as u16 => {
                let pt = bytes.read_u16::<BigEndian>()?;
                bytes.consume(2);
                Action::SetTpSrc(pt)
            }
            t if t == OfpActionType::SetTpDst as u16 => {
                let pt = bytes.read_u16::<BigEndian>()?;
                bytes.consume(2);
                Action::SetTpDst(pt)
            }
            t if t == OfpActionType::Enqueue as u16 => {
                let pt = bytes.read_u16::<BigEndian>()?;
                bytes.consume(6);
                let qid = bytes.read_u32::<BigEndian>()?;
                Action::Enqueue(PseudoPort::make(pt, 0)?, qid)
            }
            t => {
                return Err(CodecError::UnexpectedValue {
                    value: format!("0x{:x}", t),
                    field: "type",
                    context: "action",
                })
            }
        };
        Ok(action)
    }

    fn parse_sequence(bytes: &mut Body) -> Result<Vec<Action>, CodecError> {
        let mut actions = vec![];
        while bytes.remaining() > 0 {
            actions.push(Action::parse_one(bytes)?);
        }
        Ok(actions)
    }

    /// A switch applies actions in order; an output to the controller must
    /// come last so rewrites are visible in the forwarded copy.
    fn move_controller_last(acts: Vec<Action>) -> Vec<Action> {
        let (mut to_ctrl, mut rest): (Vec<Action>, Vec<Action>) =
            acts.into_iter().partition(|act| {
                matches!(act, Action::Output(PseudoPort::Controller(_)))
            });
        rest.append(&mut to_ctrl);
        rest
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(self.type_code()).unwrap();
        bytes.write_u16::<BigEndian>(self.size_of() as u16).unwrap();
        match *self {
            Action::Output(pp) => {
                pp.marshal(bytes);
                bytes
                    .write_u16::<BigEndian>(match pp {
                        PseudoPort::Controller(max_len) => max_len,
                        _ => 0,
                    })
                    .unwrap()
            }
            Action::SetDlVlan(None) => write_padding(bytes, 4),
            Action::SetDlVlan(Some(vid)) => {
                bytes.write_u16::<BigEndian>(vid).unwrap();
                write_padding(bytes, 2);
            }
            Action::SetDlVlanPcp(pcp) => {
                bytes.push(pcp);
                write_padding(bytes, 3);
            }
            Action::SetDlSrc(mac) | Action::SetDlDst(mac) => {
                write_mac(bytes, mac);
                write_padding(bytes, 6);
            }
            Action::SetNwSrc(addr) | Action::SetNwDst(addr) => {
                bytes.write_u32::<BigEndian>(addr).unwrap()
            }
            Action::SetNwTos(tos) => {
                bytes.push(tos);
                write_padding(bytes, 3);
            }
            Action::SetTpSrc(pt) | Action::SetTpDst(pt) => {
                bytes.write_u16::<BigEndian>(pt).unwrap();
                write_padding(bytes, 2);
            }
            Action::Enqueue(pp, qid) => {
                pp.marshal(bytes);
                write_padding(bytes, 6);
                bytes.write_u32::<BigEndian>(qid).unwrap();
            }
        }
    }
}

impl PortDesc {
    fn parse(bytes: &mut Body) -> Result<PortDesc, CodecError> {
        let port_no = bytes.read_u16::<BigEndian>()?;
        let hw_addr = read_mac(bytes)?;
        let name = read_fixed_string(bytes, PORT_NAME_LENGTH)?;
        let config = PortConfig::from_bits(bytes.read_u32::<BigEndian>()?);
        let state = PortState::from_bits(bytes.read_u32::<BigEndian>()?);
        let curr = PortFeatures::from_bits(bytes.read_u32::<BigEndian>()?);
        let advertised = PortFeatures::from_bits(bytes.read_u32::<BigEndian>()?);
        let supported = PortFeatures::from_bits(bytes.read_u32::<BigEndian>()?);
        let peer = PortFeatures::from_bits(bytes.read_u32::<BigEndian>()?);
        Ok(PortDesc {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr,
            advertised,
            supported,
            peer,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(self.port_no).unwrap();
        write_mac(bytes, self.hw_addr);
        write_fixed_string(bytes, &self.name, PORT_NAME_LENGTH);
        bytes.write_u32::<BigEndian>(self.config.bits()).unwrap();
        bytes.write_u32::<BigEndian>(self.state.bits()).unwrap();
        bytes.write_u32::<BigEndian>(self.curr.bits()).unwrap();
        bytes.write_u32::<BigEndian>(self.advertised.bits()).unwrap();
        bytes.write_u32::<BigEndian>(self.supported.bits()).unwrap();
        bytes.write_u32::<BigEndian>(self.peer.bits()).unwrap();
    }
}

impl SwitchFeatures {
    fn size_of(&self) -> usize {
        FEATURES_FIXED_LENGTH + self.ports.len() * PHY_PORT_LENGTH
    }

    fn parse(buf: &[u8]) -> Result<SwitchFeatures, CodecError> {
        let mut bytes = Cursor::new(buf);
        let datapath_id = bytes.read_u64::<BigEndian>()?;
        let num_buffers = bytes.read_u32::<BigEndian>()?;
        let num_tables = bytes.read_u8()?;
        bytes.consume(3);
        let capabilities = Capabilities::from_bits(bytes.read_u32::<BigEndian>()?);
        let actions = SupportedActions::from_bits(bytes.read_u32::<BigEndian>()?);
        let mut ports = vec![];
        while bytes.remaining() >= PHY_PORT_LENGTH {
            ports.push(PortDesc::parse(&mut bytes)?);
        }
        Ok(SwitchFeatures {
            datapath_id,
            num_buffers,
            num_tables,
            auxiliary_id: MAIN_CONNECTION,
            capabilities,
            actions,
            ports,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.write_u64::<BigEndian>(self.datapath_id).unwrap();
        bytes.write_u32::<BigEndian>(self.num_buffers).unwrap();
        bytes.push(self.num_tables);
        write_padding(bytes, 3);
        bytes.write_u32::<BigEndian>(self.capabilities.bits()).unwrap();
        bytes.write_u32::<BigEndian>(self.actions.bits()).unwrap();
        for port in &self.ports {
            port.marshal(bytes);
        }
    }
}

impl SwitchConfig {
    fn parse(buf: &[u8]) -> Result<SwitchConfig, CodecError> {
        let mut bytes = Cursor::new(buf);
        let flags = bytes.read_u16::<BigEndian>()?;
        let miss_send_len = bytes.read_u16::<BigEndian>()?;
        Ok(SwitchConfig {
            flags,
            miss_send_len,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(self.flags).unwrap();
        bytes.write_u16::<BigEndian>(self.miss_send_len).unwrap();
    }
}

impl FlowMod {
    fn flags_to_int(check_overlap: bool, notify_when_removed: bool) -> u16 {
        (if check_overlap { 1 << 1 } else { 0 }) | (if notify_when_removed { 1 } else { 0 })
    }

    fn size_of(&self) -> usize {
        MATCH_LENGTH + FLOW_MOD_FIXED_LENGTH + Action::size_of_sequence(&self.actions)
    }

    fn parse(buf: &[u8]) -> Result<FlowMod, CodecError> {
        let mut bytes = Cursor::new(buf);
        let pattern = Pattern::parse(&mut bytes)?;
        let cookie = bytes.read_u64::<BigEndian>()?;
        let command_code = bytes.read_u16::<BigEndian>()?;
        let command = FlowModCmd::of_int(command_code).ok_or(CodecError::UnexpectedValue {
            value: format!("{}", command_code),
            field: "command",
            context: "flow mod",
        })?;
        let idle = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let hard = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let priority = bytes.read_u16::<BigEndian>()?;
        let buffer_id = bytes.read_i32::<BigEndian>()?;
        let out_port = PseudoPort::of_int(bytes.read_u16::<BigEndian>()?)?;
        let flags = bytes.read_u16::<BigEndian>()?;
        let actions = Action::parse_sequence(&mut bytes)?;
        Ok(FlowMod {
            table: TableId(0),
            command,
            pattern,
            priority,
            actions,
            cookie,
            cookie_mask: 0,
            idle_timeout: idle,
            hard_timeout: hard,
            notify_when_removed: flags & 1 != 0,
            apply_to_packet: match buffer_id {
                -1 => None,
                n => Some(n as u32),
            },
            out_port,
            check_overlap: flags & 2 != 0,
        })
    }

    fn marshal(self, bytes: &mut Vec<u8>) {
        self.pattern.marshal(bytes);
        bytes.write_u64::<BigEndian>(self.cookie).unwrap();
        bytes.write_u16::<BigEndian>(self.command.to_int()).unwrap();
        bytes
            .write_u16::<BigEndian>(Timeout::to_int(self.idle_timeout))
            .unwrap();
        bytes
            .write_u16::<BigEndian>(Timeout::to_int(self.hard_timeout))
            .unwrap();
        bytes.write_u16::<BigEndian>(self.priority).unwrap();
        bytes
            .write_i32::<BigEndian>(match self.apply_to_packet {
                None => -1,
                Some(buf_id) => buf_id as i32,
            })
            .unwrap();
        match self.out_port {
            None => bytes.write_u16::<BigEndian>(OfpPort::None as u16).unwrap(),
            Some(pp) => pp.marshal(bytes),
        }
        bytes
            .write_u16::<BigEndian>(FlowMod::flags_to_int(
                self.check_overlap,
                self.notify_when_removed,
            ))
            .unwrap();
        for act in Action::move_controller_last(self.actions) {
            act.marshal(bytes);
        }
    }
}

impl PacketIn {
    fn size_of(&self) -> usize {
        PACKET_IN_FIXED_LENGTH + Payload::size_of(&self.input_payload)
    }

    fn parse(buf: &[u8]) -> Result<PacketIn, CodecError> {
        let mut bytes = Cursor::new(buf);
        let buf_id = match bytes.read_i32::<BigEndian>()? {
            -1 => None,
            n => Some(n),
        };
        let total_len = bytes.read_u16::<BigEndian>()?;
        let port = bytes.read_u16::<BigEndian>()?;
        let reason = match bytes.read_u8()? {
            0 => PacketInReason::NoMatch,
            1 => PacketInReason::ExplicitSend,
            r => {
                return Err(CodecError::UnexpectedValue {
                    value: format!("{}", r),
                    field: "reason",
                    context: "packet in",
                })
            }
        };
        bytes.consume(1);
        let pk = bytes.fill_buf()?.to_vec();
        let payload = match buf_id {
            None => Payload::NotBuffered(pk),
            Some(n) => Payload::Buffered(n as u32, pk),
        };
        Ok(PacketIn {
            input_payload: payload,
            total_len,
            port,
            reason,
        })
    }

    fn marshal(self, bytes: &mut Vec<u8>) {
        let buf_id = match self.input_payload {
            Payload::NotBuffered(_) => -1,
            Payload::Buffered(n, _) => n as i32,
        };
        bytes.write_i32::<BigEndian>(buf_id).unwrap();
        bytes.write_u16::<BigEndian>(self.total_len).unwrap();
        bytes.write_u16::<BigEndian>(self.port).unwrap();
        bytes.push(match self.reason {
            PacketInReason::NoMatch => 0,
            PacketInReason::ExplicitSend => 1,
        });
        write_padding(bytes, 1);
        bytes.write_all(self.input_payload.bytes()).unwrap();
    }
}

impl PacketOut {
    fn size_of(&self) -> usize {
        PACKET_OUT_FIXED_LENGTH
            + Action::size_of_sequence(&self.apply_actions)
            + Payload::size_of(&self.output_payload)
    }

    fn parse(buf: &[u8]) -> Result<PacketOut, CodecError> {
        let mut bytes = Cursor::new(buf);
        let buf_id = match bytes.read_i32::<BigEndian>()? {
            -1 => None,
            n => Some(n),
        };
        let in_port = bytes.read_u16::<BigEndian>()?;
        let actions_len = bytes.read_u16::<BigEndian>()? as usize;
        let mut actions_buf = vec![0; actions_len];
        bytes.read_exact(&mut actions_buf)?;
        let mut actions_bytes = Cursor::new(actions_buf.as_slice());
        let actions = Action::parse_sequence(&mut actions_bytes)?;
        let rest = bytes.fill_buf()?.to_vec();
        Ok(PacketOut {
            output_payload: match buf_id {
                None => Payload::NotBuffered(rest),
                Some(n) => Payload::Buffered(n as u32, rest),
            },
            port_id: if in_port == OfpPort::None as u16 {
                None
            } else {
                Some(in_port)
            },
            apply_actions: actions,
        })
    }

    fn marshal(self, bytes: &mut Vec<u8>) {
        bytes
            .write_i32::<BigEndian>(match self.output_payload {
                Payload::Buffered(n, _) => n as i32,
                Payload::NotBuffered(_) => -1,
            })
            .unwrap();
        match self.port_id {
            Some(id) => PseudoPort::PhysicalPort(id).marshal(bytes),
            None => bytes.write_u16::<BigEndian>(OfpPort::None as u16).unwrap(),
        }
        bytes
            .write_u16::<BigEndian>(Action::size_of_sequence(&self.apply_actions) as u16)
            .unwrap();
        for act in Action::move_controller_last(self.apply_actions) {
            act.marshal(bytes);
        }
        bytes.write_all(self.output_payload.bytes()).unwrap();
    }
}

impl FlowRemoved {
    fn size_of(&self) -> usize {
        MATCH_LENGTH + FLOW_REMOVED_FIXED_LENGTH
    }

    fn parse(buf: &[u8]) -> Result<FlowRemoved, CodecError> {
        let mut bytes = Cursor::new(buf);
        let pattern = Pattern::parse(&mut bytes)?;
        let cookie = bytes.read_u64::<BigEndian>()?;
        let priority = bytes.read_u16::<BigEndian>()?;
        let reason = match bytes.read_u8()? {
            0 => FlowRemovedReason::IdleTimeout,
            1 => FlowRemovedReason::HardTimeout,
            2 => FlowRemovedReason::Delete,
            r => {
                return Err(CodecError::UnexpectedValue {
                    value: format!("{}", r),
                    field: "reason",
                    context: "flow removed",
                })
            }
        };
        bytes.consume(1);
        let duration_sec = bytes.read_u32::<BigEndian>()?;
        let duration_nsec = bytes.read_u32::<BigEndian>()?;
        let idle_timeout = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        bytes.consume(2);
        let packet_count = bytes.read_u64::<BigEndian>()?;
        let byte_count = bytes.read_u64::<BigEndian>()?;
        Ok(FlowRemoved {
            pattern,
            cookie,
            priority,
            reason,
            duration_sec,
            duration_nsec,
            idle_timeout,
            packet_count,
            byte_count,
        })
    }

    fn marshal(self, bytes: &mut Vec<u8>) {
        self.pattern.marshal(bytes);
        bytes.write_u64::<BigEndian>(self.cookie).unwrap();
        bytes.write_u16::<BigEndian>(self.priority).unwrap();
        bytes.push(match self.reason {
            FlowRemovedReason::IdleTimeout => 0,
            FlowRemovedReason::HardTimeout => 1,
            FlowRemovedReason::Delete => 2,
        });
        write_padding(bytes, 1);
        bytes.write_u32::<BigEndian>(self.duration_sec).unwrap();
        bytes.write_u32::<BigEndian>(self.duration_nsec).unwrap();
        bytes
            .write_u16::<BigEndian>(Timeout::to_int(self.idle_timeout))
            .unwrap();
        write_padding(bytes, 2);
        bytes.write_u64::<BigEndian>(self.packet_count).unwrap();
        bytes.write_u64::<BigEndian>(self.byte_count).unwrap();
    }
}

impl PortStatus {
    fn parse(buf: &[u8]) -> Result<PortStatus, CodecError> {
        let mut bytes = Cursor::new(buf);
        let reason = match bytes.read_u8()? {
            0 => PortReason::PortAdd,
            1 => PortReason::PortDelete,
            2 => PortReason::PortModify,
            r => {
                return Err(CodecError::UnexpectedValue {
                    value: format!("{}", r),
                    field: "reason",
                    context: "port status",
                })
            }
        };
        bytes.consume(7);
        let desc = PortDesc::parse(&mut bytes)?;
        Ok(PortStatus { reason, desc })
    }

    fn marshal(self, bytes: &mut Vec<u8>) {
        bytes.push(match self.reason {
            PortReason::PortAdd => 0,
            PortReason::PortDelete => 1,
            PortReason::PortModify => 2,
        });
        write_padding(bytes, 7);
        self.desc.marshal(bytes);
    }
}

impl PortMod {
    fn parse(buf: &[u8]) -> Result<PortMod, CodecError> {
        let mut bytes = Cursor::new(buf);
        let port_no = bytes.read_u16::<BigEndian>()?;
        let hw_addr = read_mac(&mut bytes)?;
        let config = PortConfig::from_bits(bytes.read_u32::<BigEndian>()?);
        let mask = PortConfig::from_bits(bytes.read_u32::<BigEndian>()?);
        let advertise = PortFeatures::from_bits(bytes.read_u32::<BigEndian>()?);
        Ok(PortMod {
            port_no,
            hw_addr,
            config,
            mask,
            advertise,
        })
    }

    fn marshal(self, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(self.port_no).unwrap();
        write_mac(bytes, self.hw_addr);
        bytes.write_u32::<BigEndian>(self.config.bits()).unwrap();
        bytes.write_u32::<BigEndian>(self.mask.bits()).unwrap();
        bytes.write_u32::<BigEndian>(self.advertise.bits()).unwrap();
        write_padding(bytes, 4);
    }
}

impl ErrorType {
    fn of_ints(typ: u16, code: u16) -> Result<ErrorType, CodecError> {
        let bad = |field: &'static str| CodecError::UnexpectedValue {
            value: format!("{}/{}", typ, code),
            field,
            context: "error message",
        };
        let e = match typ {
            0 => ErrorType::HelloFailed(match code {
                0 => HelloFailed::Incompatible,
                1 => HelloFailed::EPerm,
                _ => return Err(bad("code")),
            }),
            1 => ErrorType::BadRequest(match code {
                0 => BadRequest::BadVersion,
                1 => BadRequest::BadType,
                2 => BadRequest::BadStat,
                3 => BadRequest::BadVendor,
                4 => BadRequest::BadSubType,
                5 => BadRequest::EPerm,
                6 => BadRequest::BadLen,
                7 => BadRequest::BufferEmpty,
                8 => BadRequest::BufferUnknown,
                _ => return Err(bad("code")),
            }),
            2 => ErrorType::BadAction(match code {
                0 => BadAction::BadType,
                1 => BadAction::BadLen,
                2 => BadAction::BadVendor,
                3 => BadAction::BadVendorType,
                4 => BadAction::BadOutPort,
                5 => BadAction::BadArgument,
                6 => BadAction::EPerm,
                7 => BadAction::TooMany,
                8 => BadAction::BadQueue,
                _ => return Err(bad("code")),
            }),
            3 => ErrorType::FlowModFailed(match code {
                0 => FlowModFailed::AllTablesFull,
                1 => FlowModFailed::Overlap,
                2 => FlowModFailed::EPerm,
                3 => FlowModFailed::BadEmergTimeout,
                4 => FlowModFailed::BadCommand,
                5 => FlowModFailed::Unsupported,
                _ => return Err(bad("code")),
            }),
            4 => ErrorType::PortModFailed(match code {
                0 => PortModFailed::BadPort,
                1 => PortModFailed::BadHwAddr,
                _ => return Err(bad("code")),
            }),
            5 => ErrorType::QueueOpFailed(match code {
                0 => QueueOpFailed::BadPort,
                1 => QueueOpFailed::BadQueue,
                2 => QueueOpFailed::EPerm,
                _ => return Err(bad("code")),
            }),
            _ => return Err(bad("type")),
        };
        Ok(e)
    }

    fn to_ints(self) -> (u16, u16) {
        match self {
            ErrorType::HelloFailed(c) => (0, c as u16),
            ErrorType::BadRequest(c) => (1, c as u16),
            ErrorType::BadAction(c) => (2, c as u16),
            ErrorType::FlowModFailed(c) => (3, c as u16),
            ErrorType::PortModFailed(c) => (4, c as u16),
            ErrorType::QueueOpFailed(c) => (5, c as u16),
        }
    }
}

impl ErrorMsg {
    fn size_of(&self) -> usize {
        ERROR_FIXED_LENGTH + self.data.len()
    }

    fn parse(buf: &[u8]) -> Result<ErrorMsg, CodecError> {
        let mut bytes = Cursor::new(buf);
        let error_type = bytes.read_u16::<BigEndian>()?;
        let error_code = bytes.read_u16::<BigEndian>()?;
        let typ = ErrorType::of_ints(error_type, error_code)?;
        Ok(ErrorMsg {
            typ,
            data: bytes.fill_buf()?.to_vec(),
        })
    }

    fn marshal(self, bytes: &mut Vec<u8>) {
        let (typ, code) = self.typ.to_ints();
        bytes.write_u16::<BigEndian>(typ).unwrap();
        bytes.write_u16::<BigEndian>(code).unwrap();
        bytes.write_all(&self.data).unwrap();
    }
}

impl FlowStats {
    fn size_of(&self) -> usize {
        FLOW_STATS_ENTRY_FIXED_LENGTH + Action::size_of_sequence(&self.actions)
    }

    fn parse(bytes: &mut Body) -> Result<FlowStats, CodecError> {
        let entry_length = bytes.read_u16::<BigEndian>()? as usize;
        if entry_length < FLOW_STATS_ENTRY_FIXED_LENGTH || bytes.remaining() + 2 < entry_length {
            return Err(CodecError::MalformedFrame {
                reason: format!("flow stats entry length {}", entry_length),
            });
        }
        let mut entry = vec![0; entry_length - 2];
        bytes.read_exact(&mut entry)?;
        let mut flow = Cursor::new(entry.as_slice());
        let table_id = flow.read_u8()?;
        flow.consume(1);
        let pattern = Pattern::parse(&mut flow)?;
        let duration_sec = flow.read_u32::<BigEndian>()?;
        let duration_nsec = flow.read_u32::<BigEndian>()?;
        let priority = flow.read_u16::<BigEndian>()?;
        let idle_timeout = flow.read_u16::<BigEndian>()?;
        let hard_timeout = flow.read_u16::<BigEndian>()?;
        flow.consume(6);
        let cookie = flow.read_u64::<BigEndian>()?;
        let packet_count = flow.read_u64::<BigEndian>()?;
        let byte_count = flow.read_u64::<BigEndian>()?;
        let actions = Action::parse_sequence(&mut flow)?;
        Ok(FlowStats {
            table_id,
            pattern,
            duration_sec,
            duration_nsec,
            priority,
            idle_timeout,
            hard_timeout,
            cookie,
            packet_count,
            byte_count,
            actions,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(self.size_of() as u16).unwrap();
        bytes.push(self.table_id);
        write_padding(bytes, 1);
        self.pattern.marshal(bytes);
        bytes.write_u32::<BigEndian>(self.duration_sec).unwrap();
        bytes.write_u32::<BigEndian>(self.duration_nsec).unwrap();
        bytes.write_u16::<BigEndian>(self.priority).unwrap();
        bytes.write_u16::<BigEndian>(self.idle_timeout).unwrap();
        bytes.write_u16::<BigEndian>(self.hard_timeout).unwrap();
        write_padding(bytes, 6);
        bytes.write_u64::<BigEndian>(self.cookie).unwrap();
        bytes.write_u64::<BigEndian>(self.packet_count).unwrap();
        bytes.write_u64::<BigEndian>(self.byte_count).unwrap();
        for act in &self.actions {
            act.marshal(bytes);
        }
    }
}

impl StatsReq {
    fn size_of(&self) -> usize {
        STATS_FIXED_LENGTH
            + match self.body {
                StatsReqBody::DescBody => 0,
                StatsReqBody::FlowStatsBody { .. } => FLOW_STATS_REQ_LENGTH,
            }
    }

    fn parse(buf: &[u8]) -> Result<StatsReq, CodecError> {
        let mut bytes = Cursor::new(buf);
        let type_code = bytes.read_u16::<BigEndian>()?;
        let req_type = StatsReqType::of_int(type_code).ok_or(CodecError::UnexpectedValue {
            value: format!("0x{:x}", type_code),
            field: "type",
            context: "stats request",
        })?;
        let flags = bytes.read_u16::<BigEndian>()?;
        let body = match req_type {
            StatsReqType::Desc => StatsReqBody::DescBody,
            StatsReqType::Flow | StatsReqType::Aggregate => {
                let pattern = Pattern::parse(&mut bytes)?;
                let table_id = bytes.read_u8()?;
                bytes.consume(1);
                let out_port = bytes.read_u16::<BigEndian>()?;
                StatsReqBody::FlowStatsBody {
                    pattern,
                    table_id,
                    out_port,
                }
            }
            other => {
                return Err(CodecError::UnexpectedValue {
                    value: format!("{:?}", other),
                    field: "type",
                    context: "stats request",
                })
            }
        };
        Ok(StatsReq {
            req_type,
            flags,
            body,
        })
    }

    fn marshal(self, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(self.req_type.to_int()).unwrap();
        bytes.write_u16::<BigEndian>(self.flags).unwrap();
        match self.body {
            StatsReqBody::DescBody => {}
            StatsReqBody::FlowStatsBody {
                pattern,
                table_id,
                out_port,
            } => {
                pattern.marshal(bytes);
                bytes.push(table_id);
                write_padding(bytes, 1);
                bytes.write_u16::<BigEndian>(out_port).unwrap();
            }
        }
    }
}

impl StatsResp {
    fn size_of(&self) -> usize {
        STATS_FIXED_LENGTH
            + match self.body {
                StatsRespBody::DescBody { .. } => DESC_STR_LENGTH * 4 + SERIAL_NUM_LENGTH,
                StatsRespBody::FlowStatsBody { ref flow_stats } => {
                    flow_stats.iter().map(FlowStats::size_of).sum()
                }
                StatsRespBody::AggregateStatsBody { .. } => AGGREGATE_STATS_LENGTH,
            }
    }

    fn parse(buf: &[u8]) -> Result<StatsResp, CodecError> {
        let mut bytes = Cursor::new(buf);
        let type_code = bytes.read_u16::<BigEndian>()?;
        let req_type = StatsReqType::of_int(type_code).ok_or(CodecError::UnexpectedValue {
            value: format!("0x{:x}", type_code),
            field: "type",
            context: "stats reply",
        })?;
        let flags = bytes.read_u16::<BigEndian>()?;
        let body = match req_type {
            StatsReqType::Desc => StatsRespBody::DescBody {
                manufacturer_desc: read_fixed_string(&mut bytes, DESC_STR_LENGTH)?,
                hardware_desc: read_fixed_string(&mut bytes, DESC_STR_LENGTH)?,
                software_desc: read_fixed_string(&mut bytes, DESC_STR_LENGTH)?,
                serial_number: read_fixed_string(&mut bytes, SERIAL_NUM_LENGTH)?,
                datapath_desc: read_fixed_string(&mut bytes, DESC_STR_LENGTH)?,
            },
            StatsReqType::Flow => {
                let mut flow_stats = vec![];
                while bytes.remaining() > 0 {
                    flow_stats.push(FlowStats::parse(&mut bytes)?);
                }
                StatsRespBody::FlowStatsBody { flow_stats }
            }
            StatsReqType::Aggregate => {
                let packet_count = bytes.read_u64::<BigEndian>()?;
                let byte_count = bytes.read_u64::<BigEndian>()?;
                let flow_count = bytes.read_u32::<BigEndian>()?;
                bytes.consume(4);
                StatsRespBody::AggregateStatsBody {
                    packet_count,
                    byte_count,
                    flow_count,
                }
            }
            other => {
                return Err(CodecError::UnexpectedValue {
                    value: format!("{:?}", other),
                    field: "type",
                    context: "stats reply",
                })
            }
        };
        Ok(StatsResp {
            req_type,
            flags,
            body,
        })
    }

    fn marshal(self, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(self.req_type.to_int()).unwrap();
        bytes.write_u16::<BigEndian>(self.flags).unwrap();
        match self.body {
            StatsRespBody::DescBody {
                manufacturer_desc,
                hardware_desc,
                software_desc,
                serial_number,
                datapath_desc,
            } => {
                write_fixed_string(bytes, &manufacturer_desc, DESC_STR_LENGTH);
                write_fixed_string(bytes, &hardware_desc, DESC_STR_LENGTH);
                write_fixed_string(bytes, &software_desc, DESC_STR_LENGTH);
                write_fixed_string(bytes, &serial_number, SERIAL_NUM_LENGTH);
                write_fixed_string(bytes, &datapath_desc, DESC_STR_LENGTH);
            }
            StatsRespBody::FlowStatsBody { flow_stats } => {
                for entry in &flow_stats {
                    entry.marshal(bytes);
                }
            }
            StatsRespBody::AggregateStatsBody {
                packet_count,
                byte_count,
                flow_count,
            } => {
                bytes.write_u64::<BigEndian>(packet_count).unwrap();
                bytes.write_u64::<BigEndian>(byte_count).unwrap();
                bytes.write_u32::<BigEndian>(flow_count).unwrap();
                write_padding(bytes, 4);
            }
        }
    }
}

impl Message {
    /// The wire type code of a message.
    pub fn msg_code(&self) -> MsgCode {
        match *self {
            Message::Hello => MsgCode::Hello,
            Message::Error(_) => MsgCode::Error,
            Message::EchoRequest(_) => MsgCode::EchoReq,
            Message::EchoReply(_) => MsgCode::EchoResp,
            Message::FeaturesRequest => MsgCode::FeaturesReq,
            Message::FeaturesReply(_) => MsgCode::FeaturesResp,
            Message::GetConfigRequest => MsgCode::GetConfigReq,
            Message::GetConfigReply(_) => MsgCode::GetConfigResp,
            Message::SetConfig(_) => MsgCode::SetConfig,
            Message::PacketIn(_) => MsgCode::PacketIn,
            Message::FlowRemoved(_) => MsgCode::FlowRemoved,
            Message::PortStatus(_) => MsgCode::PortStatus,
            Message::PacketOut(_) => MsgCode::PacketOut,
            Message::FlowMod(_) => MsgCode::FlowMod,
            Message::PortMod(_) => MsgCode::PortMod,
            Message::StatsRequest(_) => MsgCode::StatsReq,
            Message::StatsReply(_) => MsgCode::StatsResp,
            Message::BarrierRequest => MsgCode::BarrierReq,
            Message::BarrierReply => MsgCode::BarrierResp,
        }
    }

    fn marshal_body(msg: Message, bytes: &mut Vec<u8>) {
        match msg {
            Message::Hello
            | Message::FeaturesRequest
            | Message::GetConfigRequest
            | Message::BarrierRequest
            | Message::BarrierReply => (),
            Message::Error(err) => err.marshal(bytes),
            Message::EchoRequest(buf) | Message::EchoReply(buf) => {
                bytes.write_all(&buf).unwrap()
            }
            Message::FeaturesReply(feats) => feats.marshal(bytes),
            Message::GetConfigReply(conf) | Message::SetConfig(conf) => conf.marshal(bytes),
            Message::PacketIn(pi) => pi.marshal(bytes),
            Message::FlowRemoved(fr) => fr.marshal(bytes),
            Message::PortStatus(ps) => ps.marshal(bytes),
            Message::PacketOut(po) => po.marshal(bytes),
            Message::FlowMod(fm) => fm.marshal(bytes),
            Message::PortMod(pm) => pm.marshal(bytes),
            Message::StatsRequest(sr) => sr.marshal(bytes),
            Message::StatsReply(sr) => sr.marshal(bytes),
        }
    }
}

impl OfpMessage for Message {
    fn size_of(&self) -> usize {
        OfpHeader::size()
            + match *self {
                Message::Hello
                | Message::FeaturesRequest
                | Message::GetConfigRequest
                | Message::BarrierRequest
                | Message::BarrierReply => 0,
                Message::Error(ref err) => err.size_of(),
                Message::EchoRequest(ref buf) | Message::EchoReply(ref buf) => buf.len(),
                Message::FeaturesReply(ref feats) => feats.size_of(),
                Message::GetConfigReply(_) | Message::SetConfig(_) => SWITCH_CONFIG_LENGTH,
                Message::PacketIn(ref pi) => pi.size_of(),
                Message::FlowRemoved(ref fr) => fr.size_of(),
                Message::PortStatus(_) => PORT_STATUS_LENGTH,
                Message::PacketOut(ref po) => po.size_of(),
                Message::FlowMod(ref fm) => fm.size_of(),
                Message::PortMod(_) => PORT_MOD_LENGTH,
                Message::StatsRequest(ref sr) => sr.size_of(),
                Message::StatsReply(ref sr) => sr.size_of(),
            }
    }

    fn marshal(xid: Xid, msg: Message) -> Result<Vec<u8>, CodecError> {
        let header = OfpHeader::new(
            OFP_VERSION,
            msg.msg_code() as u8,
            msg.size_of() as u16,
            xid,
        );
        let mut bytes = vec![];
        OfpHeader::marshal(&mut bytes, &header);
        Message::marshal_body(msg, &mut bytes);
        Ok(bytes)
    }

    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(Xid, Message), CodecError> {
        let typ = header.type_code()?;
        let msg = match typ {
            MsgCode::Hello => Message::Hello,
            MsgCode::Error => Message::Error(ErrorMsg::parse(buf)?),
            MsgCode::EchoReq => Message::EchoRequest(buf.to_vec()),
            MsgCode::EchoResp => Message::EchoReply(buf.to_vec()),
            MsgCode::FeaturesReq => Message::FeaturesRequest,
            MsgCode::FeaturesResp => Message::FeaturesReply(SwitchFeatures::parse(buf)?),
            MsgCode::GetConfigReq => Message::GetConfigRequest,
            MsgCode::GetConfigResp => Message::GetConfigReply(SwitchConfig::parse(buf)?),
            MsgCode::SetConfig => Message::SetConfig(SwitchConfig::parse(buf)?),
            MsgCode::PacketIn => Message::PacketIn(PacketIn::parse(buf)?),
            MsgCode::FlowRemoved => Message::FlowRemoved(FlowRemoved::parse(buf)?),
            MsgCode::PortStatus => Message::PortStatus(PortStatus::parse(buf)?),
            MsgCode::PacketOut => Message::PacketOut(PacketOut::parse(buf)?),
            MsgCode::FlowMod => Message::FlowMod(FlowMod::parse(buf)?),
            MsgCode::PortMod => Message::PortMod(PortMod::parse(buf)?),
            MsgCode::StatsReq => Message::StatsRequest(StatsReq::parse(buf)?),
            MsgCode::StatsResp => Message::StatsReply(StatsResp::parse(buf)?),
            MsgCode::BarrierReq => Message::BarrierRequest,
            MsgCode::BarrierResp => Message::BarrierReply,
            MsgCode::Vendor | MsgCode::QueueGetConfigReq | MsgCode::QueueGetConfigResp => {
                return Err(CodecError::UnsupportedMessage {
                    msg_type: typ as u8,
                })
            }
        };
        Ok((header.xid(), msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_XID: Xid = 0x12345678;

    fn round_trip(msg: Message) -> Message {
        let data = Message::marshal(TEST_XID, msg.clone()).unwrap();
        let header = OfpHeader::parse(&data[..OfpHeader::size()]).unwrap();
        assert_eq!(header.version(), OFP_VERSION);
        assert_eq!(header.xid(), TEST_XID);
        assert_eq!(header.length(), data.len());
        let (xid, parsed) = Message::parse(&header, &data[OfpHeader::size()..]).unwrap();
        assert_eq!(xid, TEST_XID);
        parsed
    }

    fn assert_round_trip(msg: Message) {
        let parsed = round_trip(msg.clone());
        assert_eq!(parsed, msg);
    }

    fn port_desc() -> PortDesc {
        PortDesc {
            port_no: 1,
            hw_addr: MacAddr::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]),
            name: "p1".to_string(),
            config: PortConfig::default(),
            state: PortState::default(),
            curr: PortFeatures::from_bits(0x0c0 | 0x280),
            advertised: PortFeatures::from_bits(0x2c0),
            supported: PortFeatures::from_bits(0x2c0),
            peer: PortFeatures::default(),
        }
    }

    fn switch_features() -> SwitchFeatures {
        SwitchFeatures {
            datapath_id: 0x0102030405060708,
            num_buffers: 256,
            num_tables: 1,
            auxiliary_id: MAIN_CONNECTION,
            capabilities: Capabilities {
                flow_stats: true,
                port_stats: true,
                ..Capabilities::default()
            },
            actions: SupportedActions {
                output: true,
                ..SupportedActions::default()
            },
            ports: vec![port_desc()],
        }
    }

    fn forward_pattern() -> Pattern {
        Pattern {
            in_port: Some(3),
            dl_typ: Some(0x0800),
            dl_src: Some(MacAddr::new([0, 1, 2, 3, 4, 5])),
            dl_dst: Some(MacAddr::new([6, 7, 8, 9, 10, 11])),
            ..Pattern::match_all()
        }
    }

    #[test]
    fn hello_is_bare_header() {
        let data = Message::marshal(TEST_XID, Message::Hello).unwrap();
        assert_eq!(data, [0x01, 0x00, 0x00, 0x08, 0x12, 0x34, 0x56, 0x78]);
        assert_round_trip(Message::Hello);
    }

    #[test]
    fn echo_round_trips_with_payload() {
        assert_round_trip(Message::EchoRequest(vec![0xAB; 5]));
        assert_round_trip(Message::EchoReply(vec![0xAB; 5]));
    }

    #[test]
    fn features_request_has_type_five() {
        let data = Message::marshal(TEST_XID, Message::FeaturesRequest).unwrap();
        assert_eq!(data[1], 5);
        assert_eq!(data.len(), 8);
    }

    #[test]
    fn features_reply_round_trips() {
        let msg = Message::FeaturesReply(switch_features());
        let data = Message::marshal(TEST_XID, msg.clone()).unwrap();
        // 8 header + 24 fixed + 48 port
        assert_eq!(data.len(), 80);
        assert_eq!(data[1], 6);
        assert_round_trip(msg);
    }

    #[test]
    fn features_reply_capability_bits_are_wire_exact() {
        let data =
            Message::marshal(TEST_XID, Message::FeaturesReply(switch_features())).unwrap();
        // capabilities live at body offset 16; FLOW_STATS|PORT_STATS = 0x05
        let caps = u32::from_be_bytes([data[24], data[25], data[26], data[27]]);
        assert_eq!(caps, 0x05);
        let actions = u32::from_be_bytes([data[28], data[29], data[30], data[31]]);
        assert_eq!(actions, 0x01);
    }

    #[test]
    fn flow_mod_round_trips() {
        let msg = Message::FlowMod(FlowMod {
            table: TableId(0),
            command: FlowModCmd::AddFlow,
            pattern: forward_pattern(),
            priority: 10,
            actions: vec![Action::Output(PseudoPort::PhysicalPort(5))],
            cookie: 0,
            cookie_mask: 0,
            idle_timeout: Timeout::ExpiresAfter(30),
            hard_timeout: Timeout::Permanent,
            notify_when_removed: true,
            apply_to_packet: None,
            out_port: None,
            check_overlap: false,
        });
        let data = Message::marshal(TEST_XID, msg.clone()).unwrap();
        // 8 header + 40 match + 24 fixed + 8 output action
        assert_eq!(data.len(), 80);
        assert_round_trip(msg);
    }

    #[test]
    fn flow_mod_command_codes_are_wire_exact() {
        for (cmd, code) in [
            (FlowModCmd::AddFlow, 0u16),
            (FlowModCmd::ModFlow, 1),
            (FlowModCmd::ModStrictFlow, 2),
            (FlowModCmd::DeleteFlow, 3),
            (FlowModCmd::DeleteStrictFlow, 4),
        ] {
            assert_eq!(cmd.to_int(), code);
            assert_eq!(FlowModCmd::of_int(code), Some(cmd));
        }
        assert_eq!(FlowModCmd::of_int(5), None);
    }

    #[test]
    fn packet_in_round_trips() {
        assert_round_trip(Message::PacketIn(PacketIn {
            input_payload: Payload::NotBuffered(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]),
            total_len: 10,
            port: 3,
            reason: PacketInReason::NoMatch,
        }));
        assert_round_trip(Message::PacketIn(PacketIn {
            input_payload: Payload::Buffered(77, vec![0xFF; 20]),
            total_len: 20,
            port: 1,
            reason: PacketInReason::ExplicitSend,
        }));
    }

    #[test]
    fn packet_out_round_trips() {
        assert_round_trip(Message::PacketOut(PacketOut {
            output_payload: Payload::NotBuffered(vec![1, 2, 3, 4]),
            port_id: Some(3),
            apply_actions: vec![Action::Output(PseudoPort::Flood)],
        }));
        assert_round_trip(Message::PacketOut(PacketOut {
            output_payload: Payload::NotBuffered(vec![9; 60]),
            port_id: None,
            apply_actions: vec![Action::Output(PseudoPort::PhysicalPort(5))],
        }));
    }

    #[test]
    fn flood_action_uses_the_reserved_port_number() {
        let mut bytes = vec![];
        Action::Output(PseudoPort::Flood).marshal(&mut bytes);
        assert_eq!(bytes, [0x00, 0x00, 0x00, 0x08, 0xff, 0xfb, 0x00, 0x00]);
    }

    #[test]
    fn action_codes_and_sizes_are_wire_exact() {
        let mac = MacAddr::new([1, 2, 3, 4, 5, 6]);
        let cases: Vec<(Action, u16, usize)> = vec![
            (Action::Output(PseudoPort::PhysicalPort(1)), 0, 8),
            (Action::SetDlVlan(Some(7)), 1, 8),
            (Action::SetDlVlanPcp(2), 2, 8),
            (Action::SetDlVlan(None), 3, 8),
            (Action::SetDlSrc(mac), 4, 16),
            (Action::SetDlDst(mac), 5, 16),
            (Action::SetNwSrc(0x0a000001), 6, 8),
            (Action::SetNwDst(0x0a000002), 7, 8),
            (Action::SetNwTos(32), 8, 8),
            (Action::SetTpSrc(80), 9, 8),
            (Action::SetTpDst(443), 10, 8),
            (Action::Enqueue(PseudoPort::PhysicalPort(2), 1), 11, 16),
        ];
        for (act, code, size) in cases {
            assert_eq!(act.type_code(), code);
            assert_eq!(act.size_of(), size);
            let mut bytes = vec![];
            act.marshal(&mut bytes);
            assert_eq!(bytes.len(), size);
        }
    }

    #[test]
    fn flow_removed_round_trips() {
        assert_round_trip(Message::FlowRemoved(FlowRemoved {
            pattern: forward_pattern(),
            cookie: 0x1234,
            priority: 10,
            reason: FlowRemovedReason::IdleTimeout,
            duration_sec: 123,
            duration_nsec: 456,
            idle_timeout: Timeout::ExpiresAfter(30),
            packet_count: 100,
            byte_count: 6400,
        }));
    }

    #[test]
    fn port_status_round_trips() {
        assert_round_trip(Message::PortStatus(PortStatus {
            reason: PortReason::PortModify,
            desc: PortDesc {
                state: PortState { link_down: true },
                ..port_desc()
            },
        }));
    }

    #[test]
    fn port_mod_round_trips_and_sets_no_stp() {
        let msg = Message::PortMod(PortMod {
            port_no: 1,
            hw_addr: MacAddr::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]),
            config: PortConfig {
                no_stp: true,
                ..PortConfig::default()
            },
            mask: PortConfig {
                no_stp: true,
                ..PortConfig::default()
            },
            advertise: PortFeatures::from_bits(0x2c0),
        });
        let data = Message::marshal(TEST_XID, msg.clone()).unwrap();
        assert_eq!(data.len(), 32);
        // config and mask fields both carry only OFPPC_NO_STP (0x02)
        let config = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
        let mask = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
        assert_eq!(config, 0x02);
        assert_eq!(mask, 0x02);
        assert_round_trip(msg);
    }

    #[test]
    fn switch_config_round_trips() {
        assert_round_trip(Message::GetConfigReply(SwitchConfig {
            flags: 0,
            miss_send_len: 128,
        }));
        assert_round_trip(Message::SetConfig(SwitchConfig {
            flags: 1,
            miss_send_len: 0xffff,
        }));
        assert_round_trip(Message::GetConfigRequest);
    }

    #[test]
    fn error_round_trips_every_category() {
        let cases = vec![
            ErrorType::HelloFailed(HelloFailed::Incompatible),
            ErrorType::HelloFailed(HelloFailed::EPerm),
            ErrorType::BadRequest(BadRequest::BadLen),
            ErrorType::BadRequest(BadRequest::BufferUnknown),
            ErrorType::BadAction(BadAction::BadOutPort),
            ErrorType::BadAction(BadAction::BadQueue),
            ErrorType::FlowModFailed(FlowModFailed::AllTablesFull),
            ErrorType::FlowModFailed(FlowModFailed::Unsupported),
            ErrorType::PortModFailed(PortModFailed::BadHwAddr),
            ErrorType::QueueOpFailed(QueueOpFailed::EPerm),
        ];
        for typ in cases {
            assert_round_trip(Message::Error(ErrorMsg {
                typ,
                data: vec![0xAB; 10],
            }));
        }
    }

    #[test]
    fn error_category_codes_are_wire_exact() {
        assert_eq!(ErrorType::HelloFailed(HelloFailed::Incompatible).to_ints(), (0, 0));
        assert_eq!(ErrorType::BadRequest(BadRequest::BufferUnknown).to_ints(), (1, 8));
        assert_eq!(ErrorType::BadAction(BadAction::BadQueue).to_ints(), (2, 8));
        assert_eq!(ErrorType::FlowModFailed(FlowModFailed::Unsupported).to_ints(), (3, 5));
        assert_eq!(ErrorType::PortModFailed(PortModFailed::BadHwAddr).to_ints(), (4, 1));
        assert_eq!(ErrorType::QueueOpFailed(QueueOpFailed::EPerm).to_ints(), (5, 2));
    }

    #[test]
    fn barrier_round_trips() {
        assert_round_trip(Message::BarrierRequest);
        assert_round_trip(Message::BarrierReply);
    }

    #[test]
    fn stats_request_round_trips() {
        assert_round_trip(Message::StatsRequest(StatsReq {
            req_type: StatsReqType::Desc,
            flags: 0,
            body: StatsReqBody::DescBody,
        }));
        assert_round_trip(Message::StatsRequest(StatsReq {
            req_type: StatsReqType::Flow,
            flags: 0,
            body: StatsReqBody::FlowStatsBody {
                pattern: Pattern::match_all(),
                table_id: ALL_TABLES.0,
                out_port: OfpPort::None as u16,
            },
        }));
    }

    #[test]
    fn stats_reply_round_trips() {
        assert_round_trip(Message::StatsReply(StatsResp {
            req_type: StatsReqType::Desc,
            flags: 0,
            body: StatsRespBody::DescBody {
                manufacturer_desc: "manufacturer".to_string(),
                hardware_desc: "hardware".to_string(),
                software_desc: "software".to_string(),
                serial_number: "12345".to_string(),
                datapath_desc: "dp001".to_string(),
            },
        }));
        assert_round_trip(Message::StatsReply(StatsResp {
            req_type: StatsReqType::Flow,
            flags: 0,
            body: StatsRespBody::FlowStatsBody {
                flow_stats: vec![FlowStats {
                    table_id: 0,
                    pattern: forward_pattern(),
                    duration_sec: 120,
                    duration_nsec: 5,
                    priority: 10,
                    idle_timeout: 30,
                    hard_timeout: 0,
                    cookie: 0x1234,
                    packet_count: 7,
                    byte_count: 1024,
                    actions: vec![Action::Output(PseudoPort::PhysicalPort(9))],
                }],
            },
        }));
        assert_round_trip(Message::StatsReply(StatsResp {
            req_type: StatsReqType::Aggregate,
            flags: 0,
            body: StatsRespBody::AggregateStatsBody {
                packet_count: 10,
                byte_count: 1000,
                flow_count: 2,
            },
        }));
    }

    #[test]
    fn vendor_and_queue_config_are_unsupported() {
        for typ in [4u8, 20, 21] {
            let header = OfpHeader::new(OFP_VERSION, typ, 8, TEST_XID);
            assert!(matches!(
                Message::parse(&header, &[]),
                Err(CodecError::UnsupportedMessage { msg_type }) if msg_type == typ
            ));
        }
    }

    #[test]
    fn truncated_body_is_malformed() {
        let header = OfpHeader::new(OFP_VERSION, MsgCode::FeaturesResp as u8, 16, TEST_XID);
        assert!(matches!(
            Message::parse(&header, &[0u8; 8]),
            Err(CodecError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn pattern_wildcard_bits_match_the_field_layout() {
        let mut bytes = vec![];
        Pattern::match_all().marshal(&mut bytes);
        assert_eq!(bytes.len(), MATCH_LENGTH);
        let wildcards = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        // all single-bit fields wildcarded, both prefix masks at /32
        assert_eq!(wildcards, 0x3000ff | (32 << 8) | (32 << 14));
    }
}

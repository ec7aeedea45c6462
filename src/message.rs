//! Typed models of the OpenFlow 1.0 messages this controller speaks.
//!
//! The structs here are wire-shaped but carry no serialization logic; the
//! byte-level encoding lives in [`crate::openflow0x01`].

use crate::packet::MacAddr;

/// Which match fields a flow pattern leaves unconstrained.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Wildcards {
    pub in_port: bool,
    pub dl_vlan: bool,
    pub dl_src: bool,
    pub dl_dst: bool,
    pub dl_type: bool,
    pub nw_proto: bool,
    pub tp_src: bool,
    pub tp_dst: bool,
    pub nw_src: u32,
    pub nw_dst: u32,
    pub dl_vlan_pcp: bool,
    pub nw_tos: bool,
}

impl Wildcards {
    fn mask_bits(x: &Option<Mask<u32>>) -> u32 {
        match *x {
            None => 32,
            Some(ref x) => x.mask.unwrap_or(0),
        }
    }
}

/// How long before a flow entry expires.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Timeout {
    Permanent,
    ExpiresAfter(u16),
}

impl Timeout {
    pub fn of_int(tm: u16) -> Timeout {
        match tm {
            0 => Timeout::Permanent,
            d => Timeout::ExpiresAfter(d),
        }
    }

    pub fn to_int(tm: Timeout) -> u16 {
        match tm {
            Timeout::Permanent => 0,
            Timeout::ExpiresAfter(d) => d,
        }
    }
}

/// A value with an optional wildcard-bit count, used for IP prefixes.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Mask<T> {
    pub value: T,
    pub mask: Option<T>,
}

/// Capabilities advertised by the datapath in FEATURES_REPLY.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct Capabilities {
    pub flow_stats: bool,
    pub table_stats: bool,
    pub port_stats: bool,
    pub stp: bool,
    pub ip_reasm: bool,
    pub queue_stats: bool,
    pub arp_match_ip: bool,
}

impl Capabilities {
    pub fn from_bits(bits: u32) -> Capabilities {
        Capabilities {
            flow_stats: bits & 0x01 != 0,
            table_stats: bits & 0x02 != 0,
            port_stats: bits & 0x04 != 0,
            stp: bits & 0x08 != 0,
            ip_reasm: bits & 0x20 != 0,
            queue_stats: bits & 0x40 != 0,
            arp_match_ip: bits & 0x80 != 0,
        }
    }

    pub fn bits(&self) -> u32 {
        (self.flow_stats as u32)
            | (self.table_stats as u32) << 1
            | (self.port_stats as u32) << 2
            | (self.stp as u32) << 3
            | (self.ip_reasm as u32) << 5
            | (self.queue_stats as u32) << 6
            | (self.arp_match_ip as u32) << 7
    }
}

/// Actions the datapath is able to apply.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct SupportedActions {
    pub output: bool,
    pub set_vlan_id: bool,
    pub set_vlan_pcp: bool,
    pub strip_vlan: bool,
    pub set_dl_src: bool,
    pub set_dl_dst: bool,
    pub set_nw_src: bool,
    pub set_nw_dst: bool,
    pub set_nw_tos: bool,
    pub set_tp_src: bool,
    pub set_tp_dst: bool,
    pub enqueue: bool,
    pub vendor: bool,
}

impl SupportedActions {
    pub fn from_bits(bits: u32) -> SupportedActions {
        SupportedActions {
            output: bits & 1 != 0,
            set_vlan_id: bits & (1 << 1) != 0,
            set_vlan_pcp: bits & (1 << 2) != 0,
            strip_vlan: bits & (1 << 3) != 0,
            set_dl_src: bits & (1 << 4) != 0,
            set_dl_dst: bits & (1 << 5) != 0,
            set_nw_src: bits & (1 << 6) != 0,
            set_nw_dst: bits & (1 << 7) != 0,
            set_nw_tos: bits & (1 << 8) != 0,
            set_tp_src: bits & (1 << 9) != 0,
            set_tp_dst: bits & (1 << 10) != 0,
            enqueue: bits & (1 << 11) != 0,
            vendor: bits & (1 << 12) != 0,
        }
    }

    pub fn bits(&self) -> u32 {
        (self.output as u32)
            | (self.set_vlan_id as u32) << 1
            | (self.set_vlan_pcp as u32) << 2
            | (self.strip_vlan as u32) << 3
            | (self.set_dl_src as u32) << 4
            | (self.set_dl_dst as u32) << 5
            | (self.set_nw_src as u32) << 6
            | (self.set_nw_dst as u32) << 7
            | (self.set_nw_tos as u32) << 8
            | (self.set_tp_src as u32) << 9
            | (self.set_tp_dst as u32) << 10
            | (self.enqueue as u32) << 11
            | (self.vendor as u32) << 12
    }
}

/// Body of FEATURES_REPLY. The auxiliary connection id is not on the 1.0
/// wire; the main connection is always id 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub num_buffers: u32,
    pub num_tables: u8,
    pub auxiliary_id: u8,
    pub capabilities: Capabilities,
    pub actions: SupportedActions,
    pub ports: Vec<PortDesc>,
}

/// Fields to match against flows. `None` wildcards the field.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Pattern {
    pub dl_src: Option<MacAddr>,
    pub dl_dst: Option<MacAddr>,
    pub dl_typ: Option<u16>,
    pub dl_vlan: Option<Option<u16>>,
    pub dl_vlan_pcp: Option<u8>,
    pub nw_src: Option<Mask<u32>>,
    pub nw_dst: Option<Mask<u32>>,
    pub nw_proto: Option<u8>,
    pub nw_tos: Option<u8>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
    pub in_port: Option<u16>,
}

impl Pattern {
    /// A fully wildcarded pattern.
    pub fn match_all() -> Pattern {
        Pattern::default()
    }

    pub fn wildcards_of_pattern(m: &Pattern) -> Wildcards {
        Wildcards {
            in_port: m.in_port.is_none(),
            dl_vlan: m.dl_vlan.is_none(),
            dl_src: m.dl_src.is_none(),
            dl_dst: m.dl_dst.is_none(),
            dl_type: m.dl_typ.is_none(),
            nw_proto: m.nw_proto.is_none(),
            tp_src: m.tp_src.is_none(),
            tp_dst: m.tp_dst.is_none(),
            nw_src: Wildcards::mask_bits(&m.nw_src),
            nw_dst: Wildcards::mask_bits(&m.nw_dst),
            dl_vlan_pcp: m.dl_vlan_pcp.is_none(),
            nw_tos: m.nw_tos.is_none(),
        }
    }
}

/// Port slots an action or message may name, including the reserved ones.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PseudoPort {
    PhysicalPort(u16),
    InPort,
    Table,
    Normal,
    Flood,
    AllPorts,
    Controller(u16),
    Local,
}

/// Type of modification to perform on a flow table.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum FlowModCmd {
    AddFlow,
    ModFlow,
    ModStrictFlow,
    DeleteFlow,
    DeleteStrictFlow,
}

impl FlowModCmd {
    pub fn to_int(self) -> u16 {
        match self {
            FlowModCmd::AddFlow => 0,
            FlowModCmd::ModFlow => 1,
            FlowModCmd::ModStrictFlow => 2,
            FlowModCmd::DeleteFlow => 3,
            FlowModCmd::DeleteStrictFlow => 4,
        }
    }

    pub fn of_int(v: u16) -> Option<FlowModCmd> {
        Some(match v {
            0 => FlowModCmd::AddFlow,
            1 => FlowModCmd::ModFlow,
            2 => FlowModCmd::ModStrictFlow,
            3 => FlowModCmd::DeleteFlow,
            4 => FlowModCmd::DeleteStrictFlow,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd)]
pub struct TableId(pub u8);

/// Every flow table on the switch, used by wildcard deletes.
pub const ALL_TABLES: TableId = TableId(0xff);

/// A flow-table modification.
///
/// `table` and `cookie_mask` are controller-side bookkeeping: the 1.0
/// `ofp_flow_mod` layout carries neither, so the marshaller omits them. The
/// cleanup path still relies on them to keep wildcard deletes away from
/// table-miss rules (cookie MSB set).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FlowMod {
    pub table: TableId,
    pub command: FlowModCmd,
    pub pattern: Pattern,
    pub priority: u16,
    pub actions: Vec<Action>,
    pub cookie: u64,
    pub cookie_mask: u64,
    pub idle_timeout: Timeout,
    pub hard_timeout: Timeout,
    pub notify_when_removed: bool,
    pub apply_to_packet: Option<u32>,
    pub out_port: Option<PseudoPort>,
    pub check_overlap: bool,
}

/// Actions associated with flows and packets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Output(PseudoPort),
    SetDlVlan(Option<u16>),
    SetDlVlanPcp(u8),
    SetDlSrc(MacAddr),
    SetDlDst(MacAddr),
    SetNwSrc(u32),
    SetNwDst(u32),
    SetNwTos(u8),
    SetTpSrc(u16),
    SetTpDst(u16),
    Enqueue(PseudoPort, u32),
}

/// Packet bytes travelling with PACKET_IN / PACKET_OUT, either held in a
/// switch buffer or carried inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Buffered(u32, Vec<u8>),
    NotBuffered(Vec<u8>),
}

impl Payload {
    pub fn size_of(payload: &Payload) -> usize {
        match *payload {
            Payload::Buffered(_, ref buf) | Payload::NotBuffered(ref buf) => buf.len(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match *self {
            Payload::Buffered(_, ref buf) | Payload::NotBuffered(ref buf) => buf,
        }
    }
}

/// Why a packet arrived at the controller.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum PacketInReason {
    NoMatch,
    ExplicitSend,
}

/// A packet received by the datapath and handed to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub input_payload: Payload,
    pub total_len: u16,
    pub port: u16,
    pub reason: PacketInReason,
}

/// A packet sent from the controller out a datapath.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PacketOut {
    pub output_payload: Payload,
    pub port_id: Option<u16>,
    pub apply_actions: Vec<Action>,
}

/// Why a flow was removed from a switch.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum FlowRemovedReason {
    IdleTimeout,
    HardTimeout,
    Delete,
}

/// Flow removed notification (datapath to controller).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FlowRemoved {
    pub pattern: Pattern,
    pub cookie: u64,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_timeout: Timeout,
    pub packet_count: u64,
    pub byte_count: u64,
}

/// Link state of a physical port. Not configurable by the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct PortState {
    pub link_down: bool,
}

impl PortState {
    pub fn from_bits(bits: u32) -> PortState {
        PortState {
            link_down: bits & 0x01 != 0,
        }
    }

    pub fn bits(&self) -> u32 {
        self.link_down as u32
    }
}

/// Rate, medium, and negotiation features of a physical port.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct PortFeatures {
    pub f_10mb_hd: bool,
    pub f_10mb_fd: bool,
    pub f_100mb_hd: bool,
    pub f_100mb_fd: bool,
    pub f_1gb_hd: bool,
    pub f_1gb_fd: bool,
    pub f_10gb_fd: bool,
    pub copper: bool,
    pub fiber: bool,
    pub autoneg: bool,
    pub pause: bool,
    pub pause_asym: bool,
}

impl PortFeatures {
    pub fn from_bits(bits: u32) -> PortFeatures {
        PortFeatures {
            f_10mb_hd: bits & 0x001 != 0,
            f_10mb_fd: bits & 0x002 != 0,
            f_100mb_hd: bits & 0x004 != 0,
            f_100mb_fd: bits & 0x008 != 0,
            f_1gb_hd: bits & 0x010 != 0,
            f_1gb_fd: bits & 0x020 != 0,
            f_10gb_fd: bits & 0x040 != 0,
            copper: bits & 0x080 != 0,
            fiber: bits & 0x100 != 0,
            autoneg: bits & 0x200 != 0,
            pause: bits & 0x400 != 0,
            pause_asym: bits & 0x800 != 0,
        }
    }

    pub fn bits(&self) -> u32 {
        (self.f_10mb_hd as u32)
            | (self.f_10mb_fd as u32) << 1
            | (self.f_100mb_hd as u32) << 2
            | (self.f_100mb_fd as u32) << 3
            | (self.f_1gb_hd as u32) << 4
            | (self.f_1gb_fd as u32) << 5
            | (self.f_10gb_fd as u32) << 6
            | (self.copper as u32) << 7
            | (self.fiber as u32) << 8
            | (self.autoneg as u32) << 9
            | (self.pause as u32) << 10
            | (self.pause_asym as u32) << 11
    }
}

/// Administrative behavior flags of a physical port.
///
/// Used both to describe the current configuration and, together with a
/// mask, to change it through PORT_MOD.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct PortConfig {
    pub port_down: bool,
    pub no_stp: bool,
    pub no_recv: bool,
    pub no_recv_stp: bool,
    pub no_flood: bool,
    pub no_fwd: bool,
    pub no_packet_in: bool,
}

impl PortConfig {
    pub fn from_bits(bits: u32) -> PortConfig {
        PortConfig {
            port_down: bits & 0x01 != 0,
            no_stp: bits & 0x02 != 0,
            no_recv: bits & 0x04 != 0,
            no_recv_stp: bits & 0x08 != 0,
            no_flood: bits & 0x10 != 0,
            no_fwd: bits & 0x20 != 0,
            no_packet_in: bits & 0x40 != 0,
        }
    }

    pub fn bits(&self) -> u32 {
        (self.port_down as u32)
            | (self.no_stp as u32) << 1
            | (self.no_recv as u32) << 2
            | (self.no_recv_stp as u32) << 3
            | (self.no_flood as u32) << 4
            | (self.no_fwd as u32) << 5
            | (self.no_packet_in as u32) << 6
    }
}

/// Description of a physical port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortDesc {
    pub port_no: u16,
    pub hw_addr: MacAddr,
    pub name: String,
    pub config: PortConfig,
    pub state: PortState,
    pub curr: PortFeatures,
    pub advertised: PortFeatures,
    pub supported: PortFeatures,
    pub peer: PortFeatures,
}

/// What changed about a physical port.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum PortReason {
    PortAdd,
    PortDelete,
    PortModify,
}

/// A physical port has changed in the datapath.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PortStatus {
    pub reason: PortReason,
    pub desc: PortDesc,
}

impl PortStatus {
    /// Whether the port can no longer carry traffic, administratively or
    /// physically.
    pub fn is_down(&self) -> bool {
        self.desc.config.port_down || self.desc.state.link_down
    }
}

/// Port configuration change (controller to datapath). Only bits set in
/// `mask` are changed; `advertise` replaces the advertised features.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PortMod {
    pub port_no: u16,
    pub hw_addr: MacAddr,
    pub config: PortConfig,
    pub mask: PortConfig,
    pub advertise: PortFeatures,
}

/// Body of GET_CONFIG_REPLY and SET_CONFIG.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

/// Kind of statistics carried by STATS_REQUEST / STATS_REPLY.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum StatsReqType {
    Desc,
    Flow,
    Aggregate,
    Table,
    Port,
    Queue,
    Vendor,
}

impl StatsReqType {
    pub fn to_int(self) -> u16 {
        match self {
            StatsReqType::Desc => 0,
            StatsReqType::Flow => 1,
            StatsReqType::Aggregate => 2,
            StatsReqType::Table => 3,
            StatsReqType::Port => 4,
            StatsReqType::Queue => 5,
            StatsReqType::Vendor => 0xFFFF,
        }
    }

    pub fn of_int(v: u16) -> Option<StatsReqType> {
        Some(match v {
            0 => StatsReqType::Desc,
            1 => StatsReqType::Flow,
            2 => StatsReqType::Aggregate,
            3 => StatsReqType::Table,
            4 => StatsReqType::Port,
            5 => StatsReqType::Queue,
            0xFFFF => StatsReqType::Vendor,
            _ => return None,
        })
    }
}

/// Request bodies this controller emits: switch description and per-flow or
/// aggregate flow statistics.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StatsReqBody {
    DescBody,
    FlowStatsBody {
        pattern: Pattern,
        table_id: u8,
        out_port: u16,
    },
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StatsReq {
    pub req_type: StatsReqType,
    pub flags: u16,
    pub body: StatsReqBody,
}

/// One entry of a per-flow statistics reply.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FlowStats {
    pub table_id: u8,
    pub pattern: Pattern,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub actions: Vec<Action>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StatsRespBody {
    DescBody {
        manufacturer_desc: String,
        hardware_desc: String,
        software_desc: String,
        serial_number: String,
        datapath_desc: String,
    },
    FlowStatsBody {
        flow_stats: Vec<FlowStats>,
    },
    AggregateStatsBody {
        packet_count: u64,
        byte_count: u64,
        flow_count: u32,
    },
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StatsResp {
    pub req_type: StatsReqType,
    pub flags: u16,
    pub body: StatsRespBody,
}

/// Reason HELLO negotiation failed.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum HelloFailed {
    Incompatible,
    EPerm,
}

/// Reason the switch considered a request bad.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum BadRequest {
    BadVersion,
    BadType,
    BadStat,
    BadVendor,
    BadSubType,
    EPerm,
    BadLen,
    BufferEmpty,
    BufferUnknown,
}

/// Reason an action in a request was rejected.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum BadAction {
    BadType,
    BadLen,
    BadVendor,
    BadVendorType,
    BadOutPort,
    BadArgument,
    EPerm,
    TooMany,
    BadQueue,
}

/// Reason a FLOW_MOD failed on the switch.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum FlowModFailed {
    AllTablesFull,
    Overlap,
    EPerm,
    BadEmergTimeout,
    BadCommand,
    Unsupported,
}

/// Reason a PORT_MOD failed on the switch.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum PortModFailed {
    BadPort,
    BadHwAddr,
}

/// Reason a queue operation failed on the switch.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum QueueOpFailed {
    BadPort,
    BadQueue,
    EPerm,
}

/// Category and code of an ERROR message.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ErrorType {
    HelloFailed(HelloFailed),
    BadRequest(BadRequest),
    BadAction(BadAction),
    FlowModFailed(FlowModFailed),
    PortModFailed(PortModFailed),
    QueueOpFailed(QueueOpFailed),
}

/// ERROR message, carrying the offending request's first bytes as data.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ErrorMsg {
    pub typ: ErrorType,
    pub data: Vec<u8>,
}

/// The OpenFlow 1.0 messages this controller sends or receives, mapped
/// one-to-one onto [`crate::openflow::MsgCode`] values.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Message {
    Hello,
    Error(ErrorMsg),
    EchoRequest(Vec<u8>),
    EchoReply(Vec<u8>),
    FeaturesRequest,
    FeaturesReply(SwitchFeatures),
    GetConfigRequest,
    GetConfigReply(SwitchConfig),
    SetConfig(SwitchConfig),
    PacketIn(PacketIn),
    FlowRemoved(FlowRemoved),
    PortStatus(PortStatus),
    PacketOut(PacketOut),
    FlowMod(FlowMod),
    PortMod(PortMod),
    StatsRequest(StatsReq),
    StatsReply(StatsResp),
    BarrierRequest,
    BarrierReply,
}

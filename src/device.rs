//! The device model and the glue between sessions, the registry, and the
//! forwarding policy.
//!
//! A [`Device`] is one connected switch: its feature set, its port table,
//! and the session used to reach it. The [`Controller`] owns the shared
//! registry, topology, and policy, accepts switch connections, and runs one
//! [`DeviceHandler`] per connection to route transceiver callbacks into the
//! shared state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};

use crate::conf::Config;
use crate::flow::{self, FlowRule};
use crate::l2switch::L2Switch;
use crate::message::{
    Action, Capabilities, ErrorMsg, FlowRemoved, Message, PacketIn, PacketOut, Pattern, Payload,
    PortDesc, PortReason, PortStatus, StatsReq, StatsReqBody, StatsReqType, StatsResp,
    StatsRespBody, SupportedActions, SwitchFeatures, TableId,
};
use crate::ofp_header::Xid;
use crate::openflow0x01::MAIN_CONNECTION;
use crate::registry::Pool;
use crate::session::{
    MessageHandler, SessionConfig, SessionError, SessionHandle, Transceiver,
};
use crate::topology::{PortRef, Topology};

/// One connected OpenFlow switch.
pub struct Device {
    dpid: u64,
    num_buffers: u32,
    num_tables: u8,
    capabilities: Capabilities,
    actions: SupportedActions,
    ports: Mutex<HashMap<u16, PortDesc>>,
    session: SessionHandle,
}

impl Device {
    pub fn from_features(feats: &SwitchFeatures, session: SessionHandle) -> Device {
        let ports = feats
            .ports
            .iter()
            .map(|p| (p.port_no, p.clone()))
            .collect();
        Device {
            dpid: feats.datapath_id,
            num_buffers: feats.num_buffers,
            num_tables: feats.num_tables,
            capabilities: feats.capabilities,
            actions: feats.actions,
            ports: Mutex::new(ports),
            session,
        }
    }

    pub fn id(&self) -> u64 {
        self.dpid
    }

    pub fn num_buffers(&self) -> u32 {
        self.num_buffers
    }

    pub fn num_tables(&self) -> u8 {
        self.num_tables
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn supported_actions(&self) -> SupportedActions {
        self.actions
    }

    /// The table forwarding rules land in. OpenFlow 1.0 exposes a single
    /// implicit table.
    pub fn flow_table(&self) -> TableId {
        TableId(0)
    }

    pub fn port(&self, port_no: u16) -> Option<PortDesc> {
        self.ports.lock().unwrap().get(&port_no).cloned()
    }

    pub fn ports(&self) -> Vec<PortDesc> {
        self.ports.lock().unwrap().values().cloned().collect()
    }

    pub fn update_port(&self, desc: PortDesc) {
        self.ports.lock().unwrap().insert(desc.port_no, desc);
    }

    pub fn remove_port(&self, port_no: u16) {
        self.ports.lock().unwrap().remove(&port_no);
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Install one rule. Fails with `Disconnected` once the session ended.
    pub fn install_flow(&self, rule: FlowRule) -> Result<Xid, SessionError> {
        self.session.send(Message::FlowMod(rule.into_add()))
    }

    /// Remove every non-table-miss rule matching `pattern`.
    pub fn remove_flows(&self, pattern: Pattern) -> Result<Xid, SessionError> {
        self.session.send(Message::FlowMod(flow::delete_flows(pattern)))
    }

    /// Emit a packet out of this switch. `in_port` marks where the packet
    /// nominally entered, which FLOOD excludes from the output set.
    pub fn send_packet_out(
        &self,
        in_port: Option<u16>,
        actions: Vec<Action>,
        payload: Payload,
    ) -> Result<Xid, SessionError> {
        self.session.send(Message::PacketOut(PacketOut {
            output_payload: payload,
            port_id: in_port,
            apply_actions: actions,
        }))
    }

    fn request_description(&self) -> Result<Xid, SessionError> {
        self.session.send(Message::StatsRequest(StatsReq {
            req_type: StatsReqType::Desc,
            flags: 0,
            body: StatsReqBody::DescBody,
        }))
    }
}

/// Shared state of the controller process.
pub struct Controller {
    pool: Pool,
    topology: Topology,
    policy: L2Switch,
    session_conf: SessionConfig,
}

impl Controller {
    pub fn new(conf: &Config) -> Arc<Controller> {
        Arc::new(Controller {
            pool: Pool::new(),
            topology: Topology::new(),
            policy: L2Switch::new(),
            session_conf: conf.session,
        })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Accept switch connections forever, one session task each.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let controller = self.clone();
            tokio::spawn(async move {
                controller.handle_connection(stream, peer).await;
            });
        }
    }

    /// Run one switch connection to completion, then clean up whatever it
    /// registered.
    pub async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        info!("switch connected from {}", peer);
        let registration: Registration = Arc::new(Mutex::new(None));
        let handler = DeviceHandler {
            controller: self.clone(),
            registration: registration.clone(),
        };
        let transceiver = Transceiver::new(self.session_conf, handler);
        match transceiver.run(stream).await {
            Ok(()) => info!("session with {} closed", peer),
            Err(e) => warn!("session with {} failed: {}", peer, e),
        }
        let registered = *registration.lock().unwrap();
        if let Some((dpid, aux_id)) = registered {
            self.pool.deregister(dpid, aux_id);
            if aux_id == MAIN_CONNECTION {
                self.topology.purge_device(dpid);
            }
        }
    }
}

type Registration = Arc<Mutex<Option<(u64, u8)>>>;

/// Per-connection handler: registers the device on feature exchange and
/// forwards forwarding-relevant events to the policy. Runs on the session's
/// task and never blocks on other sessions.
struct DeviceHandler {
    controller: Arc<Controller>,
    registration: Registration,
}

impl DeviceHandler {
    fn dpid(&self) -> Option<u64> {
        self.registration.lock().unwrap().map(|(dpid, _)| dpid)
    }
}

impl MessageHandler for DeviceHandler {
    fn on_features_reply(
        &mut self,
        session: &SessionHandle,
        feats: &SwitchFeatures,
    ) -> Result<(), SessionError> {
        info!(
            "switch {:016x}: {} buffers, {} tables, {} ports",
            feats.datapath_id,
            feats.num_buffers,
            feats.num_tables,
            feats.ports.len()
        );
        let device = Arc::new(Device::from_features(feats, session.clone()));
        self.controller
            .pool
            .register(device, feats.auxiliary_id, session.clone());
        *self.registration.lock().unwrap() = Some((feats.datapath_id, feats.auxiliary_id));
        Ok(())
    }

    fn on_ready(&mut self, _session: &SessionHandle) -> Result<(), SessionError> {
        let Some(dpid) = self.dpid() else {
            return Ok(());
        };
        info!("switch {:016x} is usable", dpid);
        if let Some(device) = self.controller.pool.device(dpid) {
            device.request_description()?;
        }
        Ok(())
    }

    fn on_packet_in(
        &mut self,
        _session: &SessionHandle,
        pkt: PacketIn,
    ) -> Result<(), SessionError> {
        let Some(dpid) = self.dpid() else {
            return Ok(());
        };
        let ingress = PortRef {
            dpid,
            port: pkt.port,
        };
        match self.controller.policy.process_packet(
            &self.controller.pool,
            &self.controller.topology,
            ingress,
            &pkt,
        ) {
            Ok(true) => {}
            Ok(false) => debug!("packet on {} not forwarded", ingress),
            Err(e) => warn!("switching failed for a packet on {}: {}", ingress, e),
        }
        Ok(())
    }

    fn on_port_status(
        &mut self,
        _session: &SessionHandle,
        status: PortStatus,
    ) -> Result<(), SessionError> {
        let Some(dpid) = self.dpid() else {
            return Ok(());
        };
        let port = PortRef {
            dpid,
            port: status.desc.port_no,
        };
        info!("port {} changed: {:?}, down={}", port, status.reason, status.is_down());
        if let Some(device) = self.controller.pool.device(dpid) {
            match status.reason {
                PortReason::PortDelete => device.remove_port(status.desc.port_no),
                _ => device.update_port(status.desc.clone()),
            }
        }
        if status.is_down() || status.reason == PortReason::PortDelete {
            // Cleanup consults the topology, so stale rules go first and the
            // link/host bookkeeping second.
            self.controller.policy.process_port_event(
                &self.controller.pool,
                &self.controller.topology,
                port,
            );
            self.controller.topology.purge_port(port);
        }
        Ok(())
    }

    fn on_flow_removed(
        &mut self,
        _session: &SessionHandle,
        removed: FlowRemoved,
    ) -> Result<(), SessionError> {
        debug!(
            "flow removed on {:016x?}: {:?} after {}s, {} packets",
            self.dpid(),
            removed.reason,
            removed.duration_sec,
            removed.packet_count
        );
        Ok(())
    }

    fn on_error(&mut self, _session: &SessionHandle, err: ErrorMsg) -> Result<(), SessionError> {
        warn!(
            "switch {:016x?} rejected a request: {:?} ({} bytes of context)",
            self.dpid(),
            err.typ,
            err.data.len()
        );
        Ok(())
    }

    fn on_stats_reply(
        &mut self,
        _session: &SessionHandle,
        stats: StatsResp,
    ) -> Result<(), SessionError> {
        match stats.body {
            StatsRespBody::DescBody {
                manufacturer_desc,
                hardware_desc,
                software_desc,
                serial_number,
                ..
            } => info!(
                "switch {:016x?}: {} {} ({}, serial {})",
                self.dpid(),
                manufacturer_desc,
                hardware_desc,
                software_desc,
                serial_number
            ),
            StatsRespBody::FlowStatsBody { flow_stats } => debug!(
                "switch {:016x?} reports {} flows",
                self.dpid(),
                flow_stats.len()
            ),
            StatsRespBody::AggregateStatsBody {
                packet_count,
                byte_count,
                flow_count,
            } => debug!(
                "switch {:016x?} aggregate: {} packets, {} bytes, {} flows",
                self.dpid(),
                packet_count,
                byte_count,
                flow_count
            ),
        }
        Ok(())
    }
}

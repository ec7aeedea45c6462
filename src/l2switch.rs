//! The L2 forwarding policy.
//!
//! Consumes unmatched packets: floods broadcasts and unknown destinations,
//! installs a unidirectional flow path toward learned destinations, and
//! reacts to port/link failures by tearing down affected rules. The reverse
//! direction of any conversation installs itself when its own packets miss.

use log::{debug, warn};
use thiserror::Error;

use crate::device::Device;
use crate::flow::FlowRule;
use crate::message::{Action, PacketIn, Pattern, Payload, PseudoPort};
use crate::packet::{EthernetFrame, FrameError, MacAddr};
use crate::registry::Pool;
use crate::session::SessionError;
use crate::topology::{PortRef, Topology};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// A hop or endpoint of the chosen path has no registered switch.
    #[error("switch {0:016x} is not connected")]
    DeviceGone(u64),
    #[error(transparent)]
    Session(#[from] SessionError),
}

pub struct L2Switch;

impl Default for L2Switch {
    fn default() -> L2Switch {
        L2Switch::new()
    }
}

impl L2Switch {
    pub fn new() -> L2Switch {
        L2Switch
    }

    /// Handle one unmatched packet arriving on `ingress`.
    ///
    /// Returns `drop`: true when the packet was handled (flooded or
    /// forwarded), false when no path to the destination exists and the
    /// caller decides what to do with the packet.
    pub fn process_packet(
        &self,
        pool: &Pool,
        topo: &Topology,
        ingress: PortRef,
        pkt: &PacketIn,
    ) -> Result<bool, PolicyError> {
        let eth = EthernetFrame::parse(pkt.input_payload.bytes())?;
        topo.learn(eth.src, ingress);

        let destination = if eth.is_broadcast() {
            None
        } else {
            topo.node(eth.dst)
        };
        let Some(node) = destination else {
            debug!("flooding {} -> {} from {}", eth.src, eth.dst, ingress);
            self.flood(pool, ingress, pkt)?;
            return Ok(true);
        };

        let egress = node.location;
        if ingress.dpid == egress.dpid {
            self.local_switching(pool, &eth, ingress, egress, pkt)?;
            Ok(true)
        } else {
            self.switching(pool, topo, &eth, ingress, egress, pkt)
        }
    }

    /// A port stopped carrying traffic: tear down rules the failure may
    /// have invalidated. Best-effort; a switch that cannot be reached is
    /// logged and skipped.
    pub fn process_port_event(&self, pool: &Pool, topo: &Topology, port: PortRef) {
        debug!("cleaning up after {}", port);
        if topo.is_trunk(port) {
            // Stale paths crossing the dead link may be installed anywhere.
            self.remove_all_flows(pool);
        } else {
            for node in topo.nodes_on(port) {
                debug!("removing flows touching host {}", node.mac);
                self.remove_flows_by_mac(pool, node.mac);
            }
        }
    }

    fn flood(&self, pool: &Pool, ingress: PortRef, pkt: &PacketIn) -> Result<(), PolicyError> {
        let device = pool
            .device(ingress.dpid)
            .ok_or(PolicyError::DeviceGone(ingress.dpid))?;
        device.send_packet_out(
            Some(ingress.port),
            vec![Action::Output(PseudoPort::Flood)],
            pkt.input_payload.clone(),
        )?;
        Ok(())
    }

    /// Source and destination share a switch: one rule, one packet-out.
    fn local_switching(
        &self,
        pool: &Pool,
        eth: &EthernetFrame,
        ingress: PortRef,
        egress: PortRef,
        pkt: &PacketIn,
    ) -> Result<(), PolicyError> {
        let device = pool
            .device(ingress.dpid)
            .ok_or(PolicyError::DeviceGone(ingress.dpid))?;
        self.install(&device, eth, ingress.port, egress.port)?;
        self.deliver(&device, egress.port, pkt.input_payload.clone())?;
        Ok(())
    }

    /// Install the forward path hop by hop, then hand the packet to the
    /// destination switch directly.
    fn switching(
        &self,
        pool: &Pool,
        topo: &Topology,
        eth: &EthernetFrame,
        ingress: PortRef,
        egress: PortRef,
        pkt: &PacketIn,
    ) -> Result<bool, PolicyError> {
        let path = match topo.path(ingress.dpid, egress.dpid) {
            Some(path) if !path.is_empty() => path,
            _ => {
                debug!("no path from {} toward {}", ingress, eth.dst);
                return Ok(false);
            }
        };

        let mut in_port = ingress.port;
        for link in &path {
            let device = pool
                .device(link.src.dpid)
                .ok_or(PolicyError::DeviceGone(link.src.dpid))?;
            self.install(&device, eth, in_port, link.src.port)?;
            in_port = link.dst.port;
        }

        let device = pool
            .device(egress.dpid)
            .ok_or(PolicyError::DeviceGone(egress.dpid))?;
        self.install(&device, eth, in_port, egress.port)?;
        self.deliver(
            &device,
            egress.port,
            Payload::NotBuffered(pkt.input_payload.bytes().to_vec()),
        )?;
        Ok(true)
    }

    fn install(
        &self,
        device: &Device,
        eth: &EthernetFrame,
        in_port: u16,
        out_port: u16,
    ) -> Result<(), SessionError> {
        debug!(
            "installing {} -> {} on {:016x}: in {} out {}",
            eth.src,
            eth.dst,
            device.id(),
            in_port,
            out_port
        );
        device.install_flow(FlowRule::forward(
            device.flow_table(),
            in_port,
            eth.ethertype,
            eth.src,
            eth.dst,
            out_port,
        ))?;
        Ok(())
    }

    fn deliver(
        &self,
        device: &Device,
        out_port: u16,
        payload: Payload,
    ) -> Result<(), SessionError> {
        device.send_packet_out(
            None,
            vec![Action::Output(PseudoPort::PhysicalPort(out_port))],
            payload,
        )?;
        Ok(())
    }

    fn remove_all_flows(&self, pool: &Pool) {
        for device in pool.devices() {
            if let Err(e) = device.remove_flows(Pattern::match_all()) {
                warn!("failed to remove flows on {:016x}: {}", device.id(), e);
            }
        }
    }

    fn remove_flows_by_mac(&self, pool: &Pool, mac: MacAddr) {
        for device in pool.devices() {
            let by_src = Pattern {
                dl_src: Some(mac),
                ..Pattern::match_all()
            };
            let by_dst = Pattern {
                dl_dst: Some(mac),
                ..Pattern::match_all()
            };
            let result = device
                .remove_flows(by_src)
                .and_then(|_| device.remove_flows(by_dst));
            if let Err(e) = result {
                warn!(
                    "failed to remove flows for {} on {:016x}: {}",
                    mac,
                    device.id(),
                    e
                );
            }
        }
    }
}

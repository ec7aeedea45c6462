//! An OpenFlow 1.0 controller core that drives software-defined Ethernet
//! switches to perform L2 forwarding over an arbitrary multi-switch topology.
//!
//! The crate is organized bottom-up: the wire codec ([`openflow0x01`],
//! [`ofp_header`], [`message`]) frames and serializes OpenFlow 1.0 messages,
//! the [`session`] transceiver runs one framed I/O loop per switch
//! connection, the [`registry`] pool and [`topology`] model track connected
//! switches, learned hosts, and inter-switch links, and the [`l2switch`]
//! policy decides between flooding and installing forwarding paths. The
//! [`device`] module glues sessions to the registry and the policy.

pub mod conf;
pub mod device;
pub mod flow;
pub mod l2switch;
pub mod message;
pub mod ofp_header;
pub mod ofp_message;
pub mod openflow;
pub mod openflow0x01;
pub mod packet;
pub mod registry;
pub mod session;
pub mod topology;

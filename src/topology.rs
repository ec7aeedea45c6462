//! Learned hosts, inter-switch links, and path queries.
//!
//! The topology records where end-host MACs were last observed and which
//! port pairs form links between switches. Link discovery itself lives
//! outside this crate; whatever mechanism finds a link reports it through
//! [`Topology::add_link`] / [`Topology::remove_link`]. Queries return
//! snapshots; graph updates are serialized against path computation.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Mutex;

use log::{debug, warn};
use petgraph::graphmap::UnGraphMap;

use crate::packet::MacAddr;

/// A (switch, port) pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortRef {
    pub dpid: u64,
    pub port: u16,
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:016x}:{}", self.dpid, self.port)
    }
}

/// Where a MAC address was last seen as a packet source. Hosts only live
/// behind edge ports, never behind trunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node {
    pub mac: MacAddr,
    pub location: PortRef,
}

/// One traversal of an inter-switch link: `src` is the egress port on the
/// nearer switch, `dst` the ingress port on the farther one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathLink {
    pub src: PortRef,
    pub dst: PortRef,
}

struct TopoInner {
    // Edge weight holds the link's ports keyed as (port on the lower dpid,
    // port on the higher dpid).
    graph: UnGraphMap<u64, (u16, u16)>,
    links: HashMap<PortRef, PortRef>,
    hosts: HashMap<MacAddr, PortRef>,
}

pub struct Topology {
    inner: Mutex<TopoInner>,
}

impl Default for Topology {
    fn default() -> Topology {
        Topology::new()
    }
}

impl Topology {
    pub fn new() -> Topology {
        Topology {
            inner: Mutex::new(TopoInner {
                graph: UnGraphMap::new(),
                links: HashMap::new(),
                hosts: HashMap::new(),
            }),
        }
    }

    /// Record or refresh where `mac` was seen. Trunk ports never host
    /// end-stations, so observations there are dropped.
    pub fn learn(&self, mac: MacAddr, location: PortRef) {
        let mut inner = self.inner.lock().unwrap();
        if inner.links.contains_key(&location) {
            return;
        }
        inner.hosts.insert(mac, location);
    }

    /// Where `mac` was last seen, if anywhere.
    pub fn node(&self, mac: MacAddr) -> Option<Node> {
        let inner = self.inner.lock().unwrap();
        inner
            .hosts
            .get(&mac)
            .map(|&location| Node { mac, location })
    }

    /// Every learned host behind `port`.
    pub fn nodes_on(&self, port: PortRef) -> Vec<Node> {
        let inner = self.inner.lock().unwrap();
        inner
            .hosts
            .iter()
            .filter(|(_, &location)| location == port)
            .map(|(&mac, &location)| Node { mac, location })
            .collect()
    }

    /// Drop every learned host.
    pub fn flush_hosts(&self) {
        self.inner.lock().unwrap().hosts.clear();
    }

    /// True if `port` terminates an inter-switch link. Conservative: false
    /// when nothing is known about the port.
    pub fn is_trunk(&self, port: PortRef) -> bool {
        self.inner.lock().unwrap().links.contains_key(&port)
    }

    /// Record a discovered link. Each port carries at most one link, so any
    /// previous link on either endpoint is dropped first; hosts learned on
    /// what is now known to be a trunk are forgotten.
    pub fn add_link(&self, a: PortRef, b: PortRef) {
        if a.dpid == b.dpid {
            warn!("ignoring a link between two ports of {:016x}", a.dpid);
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.drop_link(a);
        inner.drop_link(b);
        debug!("link up between {} and {}", a, b);
        inner.links.insert(a, b);
        inner.links.insert(b, a);
        let (pl, ph) = if a.dpid < b.dpid {
            (a.port, b.port)
        } else {
            (b.port, a.port)
        };
        inner.graph.add_edge(a.dpid, b.dpid, (pl, ph));
        inner.hosts.retain(|_, loc| *loc != a && *loc != b);
    }

    /// Forget the link terminating at `port`, if any.
    pub fn remove_link(&self, port: PortRef) {
        self.inner.lock().unwrap().drop_link(port);
    }

    /// A port went away: forget its link and the hosts behind it.
    pub fn purge_port(&self, port: PortRef) {
        let mut inner = self.inner.lock().unwrap();
        inner.drop_link(port);
        inner.hosts.retain(|_, loc| *loc != port);
    }

    /// A switch went away: forget its links and the hosts behind it.
    pub fn purge_device(&self, dpid: u64) {
        let mut inner = self.inner.lock().unwrap();
        let ports: Vec<PortRef> = inner
            .links
            .keys()
            .filter(|p| p.dpid == dpid)
            .copied()
            .collect();
        for port in ports {
            inner.drop_link(port);
        }
        inner.graph.remove_node(dpid);
        inner.hosts.retain(|_, loc| loc.dpid != dpid);
    }

    /// Shortest path between two switches by hop count, or `None` if they
    /// are not connected. Ties break toward the lower DPID at each decision
    /// point, so the result is stable for an unchanged graph. An empty path
    /// means the endpoints coincide.
    pub fn path(&self, src: u64, dst: u64) -> Option<Vec<PathLink>> {
        if src == dst {
            return Some(Vec::new());
        }
        let inner = self.inner.lock().unwrap();
        if !inner.graph.contains_node(src) || !inner.graph.contains_node(dst) {
            return None;
        }

        let mut parent: HashMap<u64, u64> = HashMap::new();
        let mut visited: HashSet<u64> = HashSet::new();
        visited.insert(src);
        let mut frontier = vec![src];
        'search: while !frontier.is_empty() {
            let mut next = Vec::new();
            for &hop in &frontier {
                let mut neighbors: Vec<u64> = inner
                    .graph
                    .neighbors(hop)
                    .filter(|n| !visited.contains(n))
                    .collect();
                neighbors.sort_unstable();
                for neighbor in neighbors {
                    if visited.insert(neighbor) {
                        parent.insert(neighbor, hop);
                        if neighbor == dst {
                            break 'search;
                        }
                        next.push(neighbor);
                    }
                }
            }
            next.sort_unstable();
            frontier = next;
        }
        parent.get(&dst)?;

        let mut chain = vec![dst];
        let mut cur = dst;
        while cur != src {
            cur = parent[&cur];
            chain.push(cur);
        }
        chain.reverse();

        let mut path = Vec::with_capacity(chain.len() - 1);
        for pair in chain.windows(2) {
            let (u, v) = (pair[0], pair[1]);
            let &(pl, ph) = inner.graph.edge_weight(u, v)?;
            let (pu, pv) = if u < v { (pl, ph) } else { (ph, pl) };
            path.push(PathLink {
                src: PortRef { dpid: u, port: pu },
                dst: PortRef { dpid: v, port: pv },
            });
        }
        Some(path)
    }
}

impl TopoInner {
    fn drop_link(&mut self, port: PortRef) {
        if let Some(peer) = self.links.remove(&port) {
            self.links.remove(&peer);
            debug!("link down between {} and {}", port, peer);
            let survivors = self.links.iter().any(|(p, q)| {
                (p.dpid == port.dpid && q.dpid == peer.dpid)
                    || (p.dpid == peer.dpid && q.dpid == port.dpid)
            });
            if !survivors {
                self.graph.remove_edge(port.dpid, peer.dpid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(dpid: u64, port: u16) -> PortRef {
        PortRef { dpid, port }
    }

    fn mac(last: u8) -> MacAddr {
        MacAddr::new([0, 0, 0, 0, 0, last])
    }

    #[test]
    fn learns_and_refreshes_hosts() {
        let topo = Topology::new();
        assert_eq!(topo.node(mac(1)), None);
        topo.learn(mac(1), port(1, 3));
        assert_eq!(
            topo.node(mac(1)),
            Some(Node {
                mac: mac(1),
                location: port(1, 3)
            })
        );
        // The host moved.
        topo.learn(mac(1), port(2, 7));
        assert_eq!(topo.node(mac(1)).unwrap().location, port(2, 7));
    }

    #[test]
    fn never_learns_behind_a_trunk() {
        let topo = Topology::new();
        topo.add_link(port(1, 9), port(2, 9));
        topo.learn(mac(1), port(1, 9));
        assert_eq!(topo.node(mac(1)), None);
        // Learning a host and then discovering its port is a trunk drops it.
        topo.learn(mac(2), port(1, 4));
        topo.add_link(port(1, 4), port(3, 1));
        assert_eq!(topo.node(mac(2)), None);
    }

    #[test]
    fn trunk_queries_are_conservative() {
        let topo = Topology::new();
        assert!(!topo.is_trunk(port(1, 9)));
        topo.add_link(port(1, 9), port(2, 9));
        assert!(topo.is_trunk(port(1, 9)));
        assert!(topo.is_trunk(port(2, 9)));
        assert!(!topo.is_trunk(port(1, 1)));
        topo.remove_link(port(1, 9));
        assert!(!topo.is_trunk(port(1, 9)));
        assert!(!topo.is_trunk(port(2, 9)));
    }

    #[test]
    fn a_port_carries_at_most_one_link() {
        let topo = Topology::new();
        topo.add_link(port(1, 9), port(2, 9));
        topo.add_link(port(1, 9), port(3, 2));
        assert!(!topo.is_trunk(port(2, 9)));
        assert!(topo.is_trunk(port(3, 2)));
        assert_eq!(topo.path(1, 2), None);
        assert_eq!(topo.path(1, 3).unwrap().len(), 1);
    }

    #[test]
    fn path_between_the_same_switch_is_empty() {
        let topo = Topology::new();
        assert_eq!(topo.path(7, 7), Some(Vec::new()));
    }

    #[test]
    fn path_requires_connectivity() {
        let topo = Topology::new();
        assert_eq!(topo.path(1, 2), None);
        topo.add_link(port(1, 9), port(2, 9));
        assert_eq!(topo.path(1, 3), None);
    }

    #[test]
    fn path_reports_ports_along_a_chain() {
        let topo = Topology::new();
        topo.add_link(port(1, 9), port(2, 8));
        topo.add_link(port(2, 9), port(3, 8));
        let path = topo.path(1, 3).unwrap();
        assert_eq!(
            path,
            vec![
                PathLink {
                    src: port(1, 9),
                    dst: port(2, 8)
                },
                PathLink {
                    src: port(2, 9),
                    dst: port(3, 8)
                },
            ]
        );
        // And in reverse.
        let back = topo.path(3, 1).unwrap();
        assert_eq!(
            back,
            vec![
                PathLink {
                    src: port(3, 8),
                    dst: port(2, 9)
                },
                PathLink {
                    src: port(2, 8),
                    dst: port(1, 9)
                },
            ]
        );
    }

    #[test]
    fn equal_cost_ties_break_toward_the_lower_dpid() {
        let topo = Topology::new();
        // Diamond: 1 reaches 4 through 2 or 3.
        topo.add_link(port(1, 1), port(2, 1));
        topo.add_link(port(1, 2), port(3, 1));
        topo.add_link(port(2, 2), port(4, 1));
        topo.add_link(port(3, 2), port(4, 2));
        let path = topo.path(1, 4).unwrap();
        assert_eq!(path[0].dst.dpid, 2);
        for _ in 0..10 {
            assert_eq!(topo.path(1, 4).unwrap(), path);
        }
    }

    #[test]
    fn shortest_path_wins_over_insertion_order() {
        let topo = Topology::new();
        // 1-5-6-4 inserted first, then the direct 1-4 link.
        topo.add_link(port(1, 1), port(5, 1));
        topo.add_link(port(5, 2), port(6, 1));
        topo.add_link(port(6, 2), port(4, 3));
        topo.add_link(port(1, 2), port(4, 1));
        let path = topo.path(1, 4).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].src, port(1, 2));
        assert_eq!(path[0].dst, port(4, 1));
    }

    #[test]
    fn purging_a_port_forgets_its_hosts_and_link() {
        let topo = Topology::new();
        topo.learn(mac(1), port(2, 5));
        topo.learn(mac(2), port(2, 5));
        topo.learn(mac(3), port(2, 6));
        assert_eq!(topo.nodes_on(port(2, 5)).len(), 2);
        topo.purge_port(port(2, 5));
        assert!(topo.nodes_on(port(2, 5)).is_empty());
        assert_eq!(topo.node(mac(3)).unwrap().location, port(2, 6));

        topo.add_link(port(1, 9), port(2, 9));
        topo.purge_port(port(1, 9));
        assert!(!topo.is_trunk(port(2, 9)));
        assert_eq!(topo.path(1, 2), None);
    }

    #[test]
    fn purging_a_device_disconnects_it() {
        let topo = Topology::new();
        topo.add_link(port(1, 9), port(2, 9));
        topo.add_link(port(2, 8), port(3, 9));
        topo.learn(mac(1), port(2, 5));
        topo.purge_device(2);
        assert_eq!(topo.path(1, 3), None);
        assert_eq!(topo.node(mac(1)), None);
        assert!(!topo.is_trunk(port(1, 9)));
    }

    #[test]
    fn flushing_hosts_keeps_links() {
        let topo = Topology::new();
        topo.add_link(port(1, 9), port(2, 9));
        topo.learn(mac(1), port(1, 3));
        topo.flush_hosts();
        assert_eq!(topo.node(mac(1)), None);
        assert!(topo.is_trunk(port(1, 9)));
    }
}

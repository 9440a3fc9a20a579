//! The simulated packet network
//!
//! Nodes forward datagrams along static routes; every hop applies the
//! link's loss ratio, transmit-queue bound, bandwidth pacing and
//! propagation delay. Delivery anomalies (loss, queue drops, missing
//! listeners) are measured outcomes, surfaced through the flow recorder
//! rather than as errors.

pub mod link;
pub mod node;
pub mod route;
pub mod socket;
pub mod spec;

use crate::flows::FlowRecorder;
use crate::{Datagram, TransportProtocol};
use anyhow::bail;
use fastrand::Rng;
use link::DirectedLink;
use node::SimNode;
use parking_lot::Mutex;
use socket::SimSocket;
use spec::{NetworkSpec, NodeKind};
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use tracing::debug;

pub struct SimNetwork {
    nodes: HashMap<Arc<str>, Arc<SimNode>>,
    node_ids_by_addr: HashMap<IpAddr, Arc<str>>,
    links_by_hop: HashMap<(Arc<str>, IpAddr), Arc<DirectedLink>>,
    recorder: FlowRecorder,
    rng: Mutex<Rng>,
    next_transmit_number: AtomicU64,
}

impl SimNetwork {
    /// Builds the network from its spec, failing on any inconsistency
    /// (duplicate ids or addresses, links referring to unknown interfaces,
    /// self-links, zero-bandwidth links).
    pub fn initialize(
        spec: NetworkSpec,
        recorder: FlowRecorder,
        rng: Rng,
    ) -> anyhow::Result<Arc<Self>> {
        let mut nodes = HashMap::new();
        let mut node_ids_by_addr = HashMap::new();
        for node_spec in spec.nodes {
            let node = Arc::new(SimNode::from_spec(node_spec)?);
            for address in node.addresses() {
                if let Some(existing) = node_ids_by_addr.insert(address, node.id().clone()) {
                    bail!(
                        "address {address} is assigned to both {existing} and {}",
                        node.id()
                    );
                }
            }
            if nodes.insert(node.id().clone(), node.clone()).is_some() {
                bail!("duplicate node id: {}", node.id());
            }
        }

        let mut links_by_hop = HashMap::new();
        let mut link_ids = HashSet::new();
        for link_spec in spec.links {
            if link_spec.bandwidth_bps == 0 {
                bail!("link {} has zero bandwidth", link_spec.id);
            }

            let Some(source_node) = node_ids_by_addr.get(&link_spec.source) else {
                bail!(
                    "link {} starts at {}, which belongs to no node",
                    link_spec.id,
                    link_spec.source
                );
            };
            let Some(target_node) = node_ids_by_addr.get(&link_spec.target) else {
                bail!(
                    "link {} ends at {}, which belongs to no node",
                    link_spec.id,
                    link_spec.target
                );
            };
            if source_node == target_node {
                bail!("link {} connects {source_node} to itself", link_spec.id);
            }

            let link = Arc::new(DirectedLink::new(link_spec));
            if !link_ids.insert(link.id.clone()) {
                bail!("duplicate link id: {}", link.id);
            }
            let hop = (source_node.clone(), link.target);
            if links_by_hop.insert(hop, link.clone()).is_some() {
                bail!(
                    "duplicate link between {source_node} and {target_node} (towards {})",
                    link.target
                );
            }
        }

        Ok(Arc::new(Self {
            nodes,
            node_ids_by_addr,
            links_by_hop,
            recorder,
            rng: Mutex::new(rng),
            next_transmit_number: AtomicU64::default(),
        }))
    }

    pub fn node(&self, id: &str) -> anyhow::Result<&Arc<SimNode>> {
        match self.nodes.get(id) {
            Some(node) => Ok(node),
            None => bail!("unknown node: {id}"),
        }
    }

    /// Registers a listener for (protocol, port) on the given node
    pub fn bind(
        &self,
        node_id: &str,
        protocol: TransportProtocol,
        port: u16,
    ) -> anyhow::Result<SimSocket> {
        let node = self.node(node_id)?;
        if node.kind() != NodeKind::Host {
            bail!("cannot bind {protocol} port {port} on router {node_id}");
        }

        let mut sockets = node.sockets.lock();
        if sockets.contains_key(&(protocol, port)) {
            bail!("{protocol} port {port} is already bound on {node_id}");
        }

        let socket = SimSocket::new(protocol, port);
        sockets.insert((protocol, port), socket.clone());
        Ok(socket)
    }

    /// Emits a datagram from `source_node`, recording it against its flow
    pub fn send(
        self: &Arc<Self>,
        source_node: &str,
        protocol: TransportProtocol,
        source: SocketAddr,
        destination: SocketAddr,
        size_bytes: usize,
    ) -> anyhow::Result<()> {
        let node = self.node(source_node)?.clone();
        if node.kind() != NodeKind::Host {
            bail!("router {source_node} cannot originate traffic");
        }

        let datagram = Datagram {
            id: uuid::Uuid::new_v4(),
            number: self.next_transmit_number.fetch_add(1, Ordering::Relaxed),
            protocol,
            source,
            destination,
            size_bytes,
        };

        debug!(
            id = %datagram.id,
            packet = datagram.number,
            flow = %datagram.flow_key(),
            "datagram emitted"
        );
        self.recorder
            .track_sent(datagram.flow_key(), size_bytes, Instant::now());
        self.forward(node, datagram);
        Ok(())
    }

    fn forward(self: &Arc<Self>, node: Arc<SimNode>, datagram: Datagram) {
        let destination_ip = datagram.destination.ip();
        if node.owns(destination_ip) {
            self.deliver_local(&node, datagram);
            return;
        }

        let Some(next_hop) = node.next_hop(destination_ip) else {
            debug!(
                node = %node.id(),
                destination = %destination_ip,
                packet = datagram.number,
                "no route to destination, dropping datagram"
            );
            return;
        };
        let Some(link) = self.links_by_hop.get(&(node.id().clone(), next_hop)) else {
            debug!(
                node = %node.id(),
                next_hop = %next_hop,
                "route points at a neighbor with no link, dropping datagram"
            );
            return;
        };
        let Some(next_node) = self
            .node_ids_by_addr
            .get(&link.target)
            .and_then(|id| self.nodes.get(id))
            .cloned()
        else {
            return;
        };

        if self.rng.lock().f64() < link.packet_loss_ratio {
            debug!(link = %link.id, packet = datagram.number, "datagram lost in transit");
            return;
        }

        let now = Instant::now();
        let Some(arrival) = link.schedule(now, datagram.size_bytes) else {
            debug!(link = %link.id, packet = datagram.number, "transmit queue full, datagram dropped");
            return;
        };

        let network = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(arrival).await;
            network.forward(next_node, datagram);
        });
    }

    fn deliver_local(&self, node: &SimNode, datagram: Datagram) {
        let binding = (datagram.protocol, datagram.destination.port());
        let socket = node.sockets.lock().get(&binding).cloned();
        match socket {
            Some(socket) => {
                self.recorder.track_received(
                    datagram.flow_key(),
                    datagram.size_bytes,
                    Instant::now(),
                );
                socket.deliver(datagram);
            }
            None => debug!(
                node = %node.id(),
                protocol = %datagram.protocol,
                port = datagram.destination.port(),
                "no listener bound, dropping datagram"
            ),
        }
    }
}

//! From addressed dumbbell to engine spec
//!
//! Derives per-node interfaces, static route tables and two directed engine
//! links per segment. Hosts carry one aggregate route towards their router;
//! routers carry direct routes for their attached access subnets and an
//! aggregate route across the bottleneck.

use crate::addressing::{Ipv4Cidr, SubnetAssignment};
use crate::topology::Dumbbell;
use anyhow::bail;
use simnet::network::route::{IpRange, Route};
use simnet::network::spec::{NetworkLinkSpec, NetworkNodeSpec, NetworkSpec, NodeKind};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

/// The dumbbell with its address plan applied
pub struct AddressedTopology {
    dumbbell: Dumbbell,
    assignments: Vec<SubnetAssignment>,
    addresses: HashMap<Arc<str>, Vec<IpAddr>>,
    everything: IpRange,
}

impl AddressedTopology {
    pub fn new(
        dumbbell: Dumbbell,
        assignments: Vec<SubnetAssignment>,
        base: Ipv4Cidr,
    ) -> anyhow::Result<Self> {
        if assignments.len() != dumbbell.segments().len() {
            bail!(
                "expected one subnet assignment per segment, got {} for {} segments",
                assignments.len(),
                dumbbell.segments().len()
            );
        }

        let mut addresses: HashMap<Arc<str>, Vec<IpAddr>> = HashMap::new();
        for (segment, assignment) in dumbbell.segments().iter().zip(&assignments) {
            if segment.id != assignment.segment {
                bail!(
                    "subnet assignment for {} does not match segment {}",
                    assignment.segment,
                    segment.id
                );
            }
            addresses
                .entry(segment.a.clone())
                .or_default()
                .push(IpAddr::V4(assignment.addr_a));
            addresses
                .entry(segment.b.clone())
                .or_default()
                .push(IpAddr::V4(assignment.addr_b));
        }

        Ok(Self {
            dumbbell,
            assignments,
            addresses,
            everything: IpRange::from_cidr(base.network(), base.network_prefix),
        })
    }

    pub fn dumbbell(&self) -> &Dumbbell {
        &self.dumbbell
    }

    pub fn assignments(&self) -> &[SubnetAssignment] {
        &self.assignments
    }

    /// A host's single access address; `None` for routers and unknown nodes
    pub fn host_address(&self, node: &str) -> Option<IpAddr> {
        if self.dumbbell.is_router(node) {
            return None;
        }
        self.addresses.get(node)?.first().copied()
    }

    /// The engine blueprint: every node with its interfaces and routes,
    /// plus one directed link per segment direction
    pub fn network_spec(&self) -> NetworkSpec {
        let segments = self.dumbbell.segments().iter().zip(&self.assignments);

        let mut nodes = Vec::new();
        for host in self.dumbbell.left_hosts() {
            nodes.push(self.host_spec(host));
        }
        nodes.push(self.router_spec(self.dumbbell.left_router()));
        nodes.push(self.router_spec(self.dumbbell.right_router()));
        for host in self.dumbbell.right_hosts() {
            nodes.push(self.host_spec(host));
        }

        let mut links = Vec::new();
        for (segment, assignment) in segments {
            let forward = (assignment.addr_a, assignment.addr_b);
            let reverse = (assignment.addr_b, assignment.addr_a);
            for ((source, target), suffix) in [(forward, "ab"), (reverse, "ba")] {
                links.push(NetworkLinkSpec {
                    id: format!("{}-{suffix}", segment.id),
                    source: IpAddr::V4(source),
                    target: IpAddr::V4(target),
                    bandwidth_bps: segment.params.bandwidth_bps,
                    delay: segment.params.delay,
                    queue_bytes: segment.params.queue_bytes,
                    packet_loss_ratio: segment.params.packet_loss_ratio,
                });
            }
        }

        NetworkSpec { nodes, links }
    }

    fn host_spec(&self, host: &Arc<str>) -> NetworkNodeSpec {
        // The host's access segment pairs it (endpoint a) with its router
        // (endpoint b); everything is reachable through the router
        let routes = self
            .segment_of(host)
            .map(|(_, assignment)| Route {
                destination: self.everything.clone(),
                next: IpAddr::V4(assignment.addr_b),
            })
            .into_iter()
            .collect();

        NetworkNodeSpec {
            id: host.to_string(),
            kind: NodeKind::Host,
            addresses: self.addresses.get(host).cloned().unwrap_or_default(),
            routes,
        }
    }

    fn router_spec(&self, router: &Arc<str>) -> NetworkNodeSpec {
        let bottleneck = self.dumbbell.bottleneck();
        let bottleneck_index = self.dumbbell.left_hosts().len();
        let bottleneck_assignment = &self.assignments[bottleneck_index];

        // Specific routes first: one per attached access subnet, delivering
        // straight to the host. The aggregate route sends the rest across
        // the bottleneck.
        let mut routes = Vec::new();
        for (segment, assignment) in self.dumbbell.segments().iter().zip(&self.assignments) {
            if segment.b == *router && segment.id != bottleneck.id {
                routes.push(Route {
                    destination: IpRange::from_cidr(assignment.network, assignment.network_prefix),
                    next: IpAddr::V4(assignment.addr_a),
                });
            }
        }
        let across = if *router == bottleneck.a {
            bottleneck_assignment.addr_b
        } else {
            bottleneck_assignment.addr_a
        };
        routes.push(Route {
            destination: self.everything.clone(),
            next: IpAddr::V4(across),
        });

        NetworkNodeSpec {
            id: router.to_string(),
            kind: NodeKind::Router,
            addresses: self.addresses.get(router).cloned().unwrap_or_default(),
            routes,
        }
    }

    fn segment_of(&self, host: &Arc<str>) -> Option<(&crate::topology::LinkSegment, &SubnetAssignment)> {
        self.dumbbell
            .segments()
            .iter()
            .zip(&self.assignments)
            .find(|(segment, _)| segment.a == *host)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::addressing::AddressPlanner;
    use crate::topology::{LinkParams, TopologyBuilder};
    use std::time::Duration;

    fn addressed(left: usize, right: usize) -> AddressedTopology {
        let params = LinkParams {
            bandwidth_bps: 5_000_000,
            delay: Duration::from_millis(1),
            queue_bytes: 64_000,
            packet_loss_ratio: 0.0,
        };
        let base: Ipv4Cidr = "10.1.0.0/16".parse().unwrap();
        let dumbbell = TopologyBuilder::new(left, right, params, params, params)
            .build()
            .unwrap();
        let assignments = AddressPlanner::new(base.clone())
            .unwrap()
            .assign(dumbbell.segments())
            .unwrap();
        AddressedTopology::new(dumbbell, assignments, base).unwrap()
    }

    #[test]
    fn hosts_have_one_address_and_one_route() {
        let addressed = addressed(2, 2);
        let spec = addressed.network_spec();

        for node in spec.nodes.iter().filter(|n| n.kind == NodeKind::Host) {
            assert_eq!(node.addresses.len(), 1, "{}", node.id);
            assert_eq!(node.routes.len(), 1, "{}", node.id);
        }
        assert_eq!(
            addressed.host_address("left-0"),
            Some("10.1.0.1".parse().unwrap())
        );
        assert_eq!(addressed.host_address("left-router"), None);
    }

    #[test]
    fn routers_route_access_subnets_directly() {
        let addressed = addressed(2, 1);
        let spec = addressed.network_spec();

        let left_router = spec.nodes.iter().find(|n| n.id == "left-router").unwrap();
        // Two direct access routes plus the aggregate across the bottleneck
        assert_eq!(left_router.routes.len(), 3);
        assert_eq!(left_router.addresses.len(), 3);

        let aggregate = left_router.routes.last().unwrap();
        // Bottleneck is the third segment (10.1.2.0/24); the far router
        // holds .2
        assert_eq!(aggregate.next, "10.1.2.2".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn each_segment_becomes_two_directed_links() {
        let addressed = addressed(3, 3);
        let spec = addressed.network_spec();
        assert_eq!(spec.nodes.len(), 3 + 2 + 3);
        assert_eq!(spec.links.len(), 2 * 7);
    }
}

use crate::TransportProtocol;
use crate::network::route::Route;
use crate::network::socket::SimSocket;
use crate::network::spec::{NetworkNodeSpec, NodeKind};
use anyhow::bail;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

/// A simulation endpoint: a traffic-capable host or a forwarding router
///
/// Immutable after construction, apart from the socket table that listeners
/// register themselves in.
pub struct SimNode {
    pub(crate) id: Arc<str>,
    pub(crate) kind: NodeKind,
    pub(crate) addresses: Vec<IpAddr>,
    pub(crate) routes: Vec<Route>,
    pub(crate) sockets: Mutex<HashMap<(TransportProtocol, u16), SimSocket>>,
}

impl SimNode {
    pub(crate) fn from_spec(spec: NetworkNodeSpec) -> anyhow::Result<Self> {
        if spec.addresses.is_empty() {
            bail!("node {} has no addresses", spec.id);
        }

        Ok(Self {
            id: spec.id.into(),
            kind: spec.kind,
            addresses: spec.addresses,
            routes: spec.routes,
            sockets: Mutex::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> + use<> {
        self.addresses.clone().into_iter()
    }

    pub(crate) fn owns(&self, ip: IpAddr) -> bool {
        self.addresses.contains(&ip)
    }

    /// First matching route wins; route tables are expected to list the most
    /// specific destinations first.
    pub(crate) fn next_hop(&self, destination: IpAddr) -> Option<IpAddr> {
        self.routes
            .iter()
            .find_map(|route| route.next_hop_towards(destination))
    }
}

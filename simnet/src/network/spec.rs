use crate::network::route::Route;
use std::net::IpAddr;
use std::time::Duration;

/// Blueprint for a [`SimNetwork`](crate::network::SimNetwork)
///
/// Links are unidirectional; a full-duplex segment contributes two entries,
/// one per direction, each with its own transmit queue.
#[derive(Clone)]
pub struct NetworkSpec {
    pub nodes: Vec<NetworkNodeSpec>,
    pub links: Vec<NetworkLinkSpec>,
}

#[derive(Clone)]
pub struct NetworkNodeSpec {
    pub id: String,
    pub kind: NodeKind,
    pub addresses: Vec<IpAddr>,
    pub routes: Vec<Route>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NodeKind {
    Host,
    Router,
}

#[derive(Clone)]
pub struct NetworkLinkSpec {
    pub id: String,
    /// Address of the interface this link transmits from
    pub source: IpAddr,
    /// Address of the interface this link delivers to
    pub target: IpAddr,
    pub bandwidth_bps: u64,
    pub delay: Duration,
    /// Transmit queue bound; datagrams arriving while the serialization
    /// backlog exceeds this are tail-dropped
    pub queue_bytes: usize,
    /// Ratio of datagrams lost in transit (between 0 and 1)
    pub packet_loss_ratio: f64,
}

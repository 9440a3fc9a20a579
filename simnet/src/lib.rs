//! In-memory packet network for repeatable simulation scenarios
//!
//! Provides hosts and routers connected by point-to-point links with
//! bandwidth pacing, propagation delay, bounded transmit queues and
//! probabilistic loss, plus flow-level accounting. Time is tokio's paused
//! clock, so a run advances in simulated time and completes immediately in
//! wall-clock terms.

pub mod flows;
pub mod network;

use anyhow::bail;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::str::FromStr;

/// Transport protocols a traffic pairing can select.
///
/// The set is closed on purpose: each supported variant has runtime
/// applications and a well-known sink port. DCCP is recognized by the
/// configuration surface but has no runtime applications.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportProtocol {
    Tcp,
    Udp,
    Dccp,
}

impl TransportProtocol {
    /// The well-known port sinks of this protocol family listen on, shared
    /// by every pairing using the protocol. `None` when the protocol has no
    /// runtime applications.
    pub fn sink_port(&self) -> Option<u16> {
        match self {
            TransportProtocol::Tcp => Some(50_000),
            // The discard port
            TransportProtocol::Udp => Some(9),
            TransportProtocol::Dccp => None,
        }
    }
}

impl Display for TransportProtocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Udp => "udp",
            TransportProtocol::Dccp => "dccp",
        };
        write!(f, "{name}")
    }
}

impl FromStr for TransportProtocol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(TransportProtocol::Tcp),
            "udp" => Ok(TransportProtocol::Udp),
            "dccp" => Ok(TransportProtocol::Dccp),
            other => bail!("unknown transport protocol: {other}"),
        }
    }
}

/// A datagram travelling through the simulated network
///
/// The simulation carries sizes, not payload bytes.
#[derive(Clone, Debug)]
pub struct Datagram {
    pub(crate) id: uuid::Uuid,
    pub(crate) number: u64,
    pub protocol: TransportProtocol,
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub size_bytes: usize,
}

impl Datagram {
    pub fn flow_key(&self) -> flows::FlowKey {
        flows::FlowKey {
            protocol: self.protocol,
            source: self.source,
            destination: self.destination,
        }
    }
}

//! Traffic configuration and the on/off applications
//!
//! Each pairing installs an on/off sender on the sender host and a sink on
//! the receiver host. Sinks of the same protocol share the protocol's
//! well-known port; flows are told apart by their full 5-tuple.

use crate::wiring::AddressedTopology;
use simnet::TransportProtocol;
use simnet::network::SimNetwork;
use simnet::network::socket::SimSocket;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// First source port handed out to senders; pairing `i` sends from
/// `SENDER_PORT_BASE + i`, keeping flow keys stable across runs
pub const SENDER_PORT_BASE: u16 = 49_152;

/// On/off duty cycle of a traffic generator
#[derive(Clone, Copy, Debug)]
pub struct OnOffPattern {
    pub on: Duration,
    pub off: Duration,
}

/// One sender/receiver pairing, bounded by its time window
#[derive(Clone, Debug)]
pub struct TrafficPairing {
    pub sender: Arc<str>,
    pub receiver: Arc<str>,
    pub protocol: TransportProtocol,
    pub rate_bps: u64,
    pub packet_bytes: usize,
    pub pattern: OnOffPattern,
    pub start: Duration,
    pub stop: Duration,
}

#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("protocol {0} has no runtime applications")]
    UnsupportedProtocol(TransportProtocol),
    #[error("invalid time window: start {start:?} must come before stop {stop:?}")]
    InvalidTimeWindow { start: Duration, stop: Duration },
    #[error("pairing sender {0} is not a host in this topology")]
    UnknownSender(Arc<str>),
    #[error("pairing receiver {0} is not a host in this topology")]
    UnknownReceiver(Arc<str>),
    #[error("target rate must be greater than zero")]
    ZeroRate,
    #[error("packet size must be greater than zero")]
    ZeroPacketSize,
    #[error("duty cycle must have a non-empty on period")]
    EmptyOnPeriod,
}

/// Turns validated pairings into installable applications
pub struct TrafficScenario<'a> {
    topology: &'a AddressedTopology,
}

impl<'a> TrafficScenario<'a> {
    pub fn new(topology: &'a AddressedTopology) -> Self {
        Self { topology }
    }

    /// Validates every pairing and produces the application set. All
    /// failures happen here, before any simulated time advances.
    pub fn configure(&self, pairings: &[TrafficPairing]) -> Result<ApplicationSet, TrafficError> {
        let mut senders = Vec::with_capacity(pairings.len());
        let mut sinks = Vec::new();
        let mut bound: HashSet<(Arc<str>, TransportProtocol, u16)> = HashSet::new();

        for (index, pairing) in pairings.iter().enumerate() {
            if pairing.start >= pairing.stop {
                return Err(TrafficError::InvalidTimeWindow {
                    start: pairing.start,
                    stop: pairing.stop,
                });
            }
            if pairing.rate_bps == 0 {
                return Err(TrafficError::ZeroRate);
            }
            if pairing.packet_bytes == 0 {
                return Err(TrafficError::ZeroPacketSize);
            }
            if pairing.pattern.on.is_zero() {
                return Err(TrafficError::EmptyOnPeriod);
            }
            let Some(port) = pairing.protocol.sink_port() else {
                return Err(TrafficError::UnsupportedProtocol(pairing.protocol));
            };

            let source_ip = self
                .topology
                .host_address(&pairing.sender)
                .ok_or_else(|| TrafficError::UnknownSender(pairing.sender.clone()))?;
            let destination_ip = self
                .topology
                .host_address(&pairing.receiver)
                .ok_or_else(|| TrafficError::UnknownReceiver(pairing.receiver.clone()))?;

            senders.push(SenderApp {
                node: pairing.sender.clone(),
                source: SocketAddr::new(source_ip, SENDER_PORT_BASE + index as u16),
                destination: SocketAddr::new(destination_ip, port),
                protocol: pairing.protocol,
                rate_bps: pairing.rate_bps,
                packet_bytes: pairing.packet_bytes,
                pattern: pairing.pattern,
                start: pairing.start,
                stop: pairing.stop,
            });

            // Pairings of the same protocol targeting the same receiver
            // share one listening socket
            if bound.insert((pairing.receiver.clone(), pairing.protocol, port)) {
                sinks.push(SinkApp {
                    node: pairing.receiver.clone(),
                    protocol: pairing.protocol,
                    port,
                });
            }
        }

        Ok(ApplicationSet { senders, sinks })
    }
}

/// Traffic generator: alternates on/off periods, emitting fixed-size
/// datagrams paced at the target rate while on
#[derive(Clone, Debug)]
pub struct SenderApp {
    pub node: Arc<str>,
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub protocol: TransportProtocol,
    pub rate_bps: u64,
    pub packet_bytes: usize,
    pub pattern: OnOffPattern,
    pub start: Duration,
    pub stop: Duration,
}

/// Listener bound to the protocol's well-known port on the receiver host
#[derive(Clone, Debug)]
pub struct SinkApp {
    pub node: Arc<str>,
    pub protocol: TransportProtocol,
    pub port: u16,
}

/// Everything `TrafficScenario::configure` installed for one run
#[derive(Debug)]
pub struct ApplicationSet {
    pub senders: Vec<SenderApp>,
    pub sinks: Vec<SinkApp>,
}

impl ApplicationSet {
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty() && self.sinks.is_empty()
    }

    /// Binds every sink, then spawns all application tasks. Deadlines are
    /// computed from `start`, the run's time zero.
    pub fn start(
        &self,
        network: &Arc<SimNetwork>,
        start: Instant,
        token: &CancellationToken,
    ) -> anyhow::Result<Vec<JoinHandle<()>>> {
        let mut tasks = Vec::with_capacity(self.senders.len() + self.sinks.len());

        for sink in &self.sinks {
            let socket = network.bind(&sink.node, sink.protocol, sink.port)?;
            let node = sink.node.clone();
            let token = token.clone();
            tasks.push(tokio::spawn(run_sink(socket, node, token)));
        }

        for sender in &self.senders {
            let network = network.clone();
            let sender = sender.clone();
            let token = token.clone();
            tasks.push(tokio::spawn(run_sender(network, sender, start, token)));
        }

        Ok(tasks)
    }
}

async fn run_sink(socket: SimSocket, node: Arc<str>, token: CancellationToken) {
    let mut datagrams = 0u64;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = socket.recv() => datagrams += 1,
        }
    }
    debug!(
        node = %node,
        protocol = %socket.protocol(),
        port = socket.port(),
        datagrams,
        "sink stopped"
    );
}

async fn run_sender(
    network: Arc<SimNetwork>,
    app: SenderApp,
    start: Instant,
    token: CancellationToken,
) {
    let stop_at = start + app.stop;
    let gap = Duration::from_secs_f64(app.packet_bytes as f64 * 8.0 / app.rate_bps as f64);

    let mut datagrams = 0u64;
    let mut cycle_start = start + app.start;
    'running: loop {
        let on_end = (cycle_start + app.pattern.on).min(stop_at);
        let mut next_send = cycle_start;
        while next_send < on_end {
            tokio::select! {
                _ = token.cancelled() => break 'running,
                _ = tokio::time::sleep_until(next_send) => {}
            }
            if let Err(error) =
                network.send(&app.node, app.protocol, app.source, app.destination, app.packet_bytes)
            {
                warn!(node = %app.node, %error, "sender failed to emit, stopping");
                break 'running;
            }
            datagrams += 1;
            next_send += gap;
        }

        cycle_start += app.pattern.on + app.pattern.off;
        if cycle_start >= stop_at {
            break;
        }
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep_until(cycle_start) => {}
        }
    }
    debug!(
        node = %app.node,
        source = %app.source,
        destination = %app.destination,
        datagrams,
        "sender stopped"
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::addressing::{AddressPlanner, Ipv4Cidr};
    use crate::topology::{LinkParams, TopologyBuilder};

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

    fn pairing(sender: &str, receiver: &str, protocol: TransportProtocol) -> TrafficPairing {
        TrafficPairing {
            sender: Arc::from(sender),
            receiver: Arc::from(receiver),
            protocol,
            rate_bps: 1_000_000,
            packet_bytes: 512,
            pattern: OnOffPattern {
                on: Duration::from_secs(1),
                off: Duration::from_secs(1),
            },
            start: Duration::from_secs(1),
            stop: Duration::from_secs(10),
        }
    }

    #[test]
    fn pairings_resolve_to_senders_and_sinks() {
        let addressed = addressed(2, 2);
        let applications = TrafficScenario::new(&addressed)
            .configure(&[
                pairing("left-0", "right-0", TransportProtocol::Tcp),
                pairing("left-1", "right-1", TransportProtocol::Udp),
            ])
            .unwrap();

        assert_eq!(applications.senders.len(), 2);
        assert_eq!(applications.sinks.len(), 2);

        let tcp = &applications.senders[0];
        assert_eq!(tcp.source, "10.1.0.1:49152".parse().unwrap());
        assert_eq!(tcp.destination, "10.1.3.1:50000".parse().unwrap());

        let udp = &applications.senders[1];
        assert_eq!(udp.source, "10.1.1.1:49153".parse().unwrap());
        assert_eq!(udp.destination, "10.1.4.1:9".parse().unwrap());
    }

    #[test]
    fn same_protocol_receivers_share_one_sink() {
        let addressed = addressed(2, 1);
        let applications = TrafficScenario::new(&addressed)
            .configure(&[
                pairing("left-0", "right-0", TransportProtocol::Tcp),
                pairing("left-1", "right-0", TransportProtocol::Tcp),
            ])
            .unwrap();

        assert_eq!(applications.senders.len(), 2);
        assert_eq!(applications.sinks.len(), 1);
        // Flows remain distinct through their source ports
        assert_ne!(
            applications.senders[0].source,
            applications.senders[1].source
        );
    }

    #[test]
    fn equal_start_and_stop_are_rejected() {
        let addressed = addressed(1, 1);
        let mut invalid = pairing("left-0", "right-0", TransportProtocol::Udp);
        invalid.stop = invalid.start;

        let error = TrafficScenario::new(&addressed)
            .configure(&[invalid])
            .unwrap_err();
        assert!(matches!(error, TrafficError::InvalidTimeWindow { .. }));
    }

    #[test]
    fn protocols_without_applications_are_rejected() {
        let addressed = addressed(1, 1);
        let error = TrafficScenario::new(&addressed)
            .configure(&[pairing("left-0", "right-0", TransportProtocol::Dccp)])
            .unwrap_err();
        assert!(matches!(
            error,
            TrafficError::UnsupportedProtocol(TransportProtocol::Dccp)
        ));
    }

    #[test]
    fn routers_cannot_be_paired() {
        let addressed = addressed(1, 1);
        let error = TrafficScenario::new(&addressed)
            .configure(&[pairing("left-router", "right-0", TransportProtocol::Udp)])
            .unwrap_err();
        assert!(matches!(error, TrafficError::UnknownSender(_)));
    }

    #[test]
    fn no_pairings_configure_no_applications() {
        let addressed = addressed(0, 3);
        let applications = TrafficScenario::new(&addressed).configure(&[]).unwrap();
        assert!(applications.is_empty());
    }
}

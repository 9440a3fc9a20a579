use crate::addressing::Ipv4Cidr;
use crate::config::{PairingConfig, ScenarioConfig};
use crate::topology::LinkParams;
use crate::traffic::OnOffPattern;
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use simnet::TransportProtocol;
use std::time::Duration;

#[serde_as]
#[derive(Deserialize, Clone)]
pub struct ScenarioJson {
    left_hosts: usize,
    right_hosts: usize,
    left_link: LinkJson,
    right_link: LinkJson,
    bottleneck: LinkJson,
    #[serde_as(as = "DisplayFromStr")]
    base_prefix: Ipv4Cidr,
    duration_ms: u64,
    #[serde(default)]
    pairings: Vec<PairingJson>,
}

#[derive(Deserialize, Clone)]
struct LinkJson {
    /// The link's bandwidth, in bits per second
    bandwidth_bps: u64,
    /// The delay of the link, in milliseconds
    delay_ms: u64,
    /// Transmit queue bound per direction, in bytes
    #[serde(default = "default_queue_bytes")]
    queue_bytes: usize,
    /// The ratio of packets that will be lost (the value must be between 0
    /// and 1)
    #[serde(default)]
    packet_loss_ratio: f64,
}

fn default_queue_bytes() -> usize {
    64_000
}

#[serde_as]
#[derive(Deserialize, Clone)]
struct PairingJson {
    /// Index of the sending host in the left group
    sender: usize,
    /// Index of the receiving host in the right group
    receiver: usize,
    #[serde_as(as = "DisplayFromStr")]
    protocol: TransportProtocol,
    /// Target data rate while the generator is on, in bits per second
    rate_bps: u64,
    #[serde(default = "default_packet_bytes")]
    packet_bytes: usize,
    on_ms: u64,
    off_ms: u64,
    start_ms: u64,
    stop_ms: u64,
}

fn default_packet_bytes() -> usize {
    512
}

impl From<ScenarioJson> for ScenarioConfig {
    fn from(json: ScenarioJson) -> Self {
        ScenarioConfig {
            left_hosts: json.left_hosts,
            right_hosts: json.right_hosts,
            left_link: json.left_link.into(),
            right_link: json.right_link.into(),
            bottleneck: json.bottleneck.into(),
            base_prefix: json.base_prefix,
            duration: Duration::from_millis(json.duration_ms),
            pairings: json.pairings.into_iter().map(|p| p.into()).collect(),
            seed: 0,
        }
    }
}

impl From<LinkJson> for LinkParams {
    fn from(json: LinkJson) -> Self {
        LinkParams {
            bandwidth_bps: json.bandwidth_bps,
            delay: Duration::from_millis(json.delay_ms),
            queue_bytes: json.queue_bytes,
            packet_loss_ratio: json.packet_loss_ratio,
        }
    }
}

impl From<PairingJson> for PairingConfig {
    fn from(json: PairingJson) -> Self {
        PairingConfig {
            sender: json.sender,
            receiver: json.receiver,
            protocol: json.protocol,
            rate_bps: json.rate_bps,
            packet_bytes: json.packet_bytes,
            pattern: OnOffPattern {
                on: Duration::from_millis(json.on_ms),
                off: Duration::from_millis(json.off_ms),
            },
            start: Duration::from_millis(json.start_ms),
            stop: Duration::from_millis(json.stop_ms),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scenario_json_round_trips_into_config() {
        let json = r#"{
            "left_hosts": 2,
            "right_hosts": 2,
            "left_link": { "bandwidth_bps": 100000000, "delay_ms": 2 },
            "right_link": { "bandwidth_bps": 100000000, "delay_ms": 2 },
            "bottleneck": { "bandwidth_bps": 5000000, "delay_ms": 1, "packet_loss_ratio": 0.01 },
            "base_prefix": "10.1.0.0/16",
            "duration_ms": 10000,
            "pairings": [
                {
                    "sender": 0,
                    "receiver": 1,
                    "protocol": "udp",
                    "rate_bps": 1000000,
                    "on_ms": 500,
                    "off_ms": 500,
                    "start_ms": 1000,
                    "stop_ms": 9000
                }
            ]
        }"#;

        let scenario: ScenarioJson = serde_json::from_str(json).unwrap();
        let config: ScenarioConfig = scenario.into();

        assert_eq!(config.left_hosts, 2);
        assert_eq!(config.bottleneck.bandwidth_bps, 5_000_000);
        assert_eq!(config.bottleneck.packet_loss_ratio, 0.01);
        assert_eq!(config.left_link.queue_bytes, 64_000);
        assert_eq!(config.duration, Duration::from_secs(10));

        let pairing = &config.pairings[0];
        assert_eq!(pairing.protocol, TransportProtocol::Udp);
        assert_eq!(pairing.packet_bytes, 512);
        assert_eq!(pairing.pattern.on, Duration::from_millis(500));
        assert_eq!(pairing.stop, Duration::from_secs(9));
    }
}

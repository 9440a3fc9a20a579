use crate::addressing::Ipv4Cidr;
use crate::config::cli::CliOpt;
use crate::config::scenario::ScenarioJson;
use crate::topology::LinkParams;
use crate::traffic::OnOffPattern;
use anyhow::Context;
use simnet::TransportProtocol;
use std::time::Duration;

pub mod cli;
pub mod scenario;

/// Immutable configuration for one scenario run
///
/// Constructed once, before the topology is built, and handed to the
/// composition root; nothing reads ambient or global defaults.
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    pub left_hosts: usize,
    pub right_hosts: usize,
    pub left_link: LinkParams,
    pub right_link: LinkParams,
    pub bottleneck: LinkParams,
    pub base_prefix: Ipv4Cidr,
    pub duration: Duration,
    pub pairings: Vec<PairingConfig>,
    pub seed: u64,
}

/// A pairing by group index: sender `i` in the left group, receiver `j` in
/// the right group
#[derive(Clone, Debug)]
pub struct PairingConfig {
    pub sender: usize,
    pub receiver: usize,
    pub protocol: TransportProtocol,
    pub rate_bps: u64,
    pub packet_bytes: usize,
    pub pattern: OnOffPattern,
    pub start: Duration,
    pub stop: Duration,
}

impl ScenarioConfig {
    /// Loads the scenario named on the command line, or the built-in
    /// default scenario when none is given
    pub fn load(options: &CliOpt) -> anyhow::Result<Self> {
        let seed = if options.non_deterministic {
            fastrand::Rng::new().u64(..)
        } else {
            options.network_rng_seed
        };

        let mut config = match &options.scenario {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read scenario {}", path.display()))?;
                let scenario: ScenarioJson = serde_json::from_str(&json)
                    .with_context(|| format!("failed to parse scenario {}", path.display()))?;
                scenario.into()
            }
            None => Self::default_scenario(),
        };
        config.seed = seed;
        Ok(config)
    }

    /// The reference scenario: a 3x3 dumbbell with a 5 Mbps bottleneck,
    /// two TCP pairings and one UDP pairing active between 1 s and 10 s
    pub fn default_scenario() -> Self {
        let access = LinkParams {
            bandwidth_bps: 100_000_000,
            delay: Duration::from_millis(2),
            queue_bytes: 64_000,
            packet_loss_ratio: 0.0,
        };
        let bottleneck = LinkParams {
            bandwidth_bps: 5_000_000,
            delay: Duration::from_millis(1),
            queue_bytes: 64_000,
            packet_loss_ratio: 0.0,
        };

        let pairing = |index: usize, protocol: TransportProtocol| PairingConfig {
            sender: index,
            receiver: index,
            protocol,
            rate_bps: 1_000_000,
            packet_bytes: 512,
            pattern: OnOffPattern {
                on: Duration::from_secs(1),
                off: Duration::from_secs(1),
            },
            start: Duration::from_secs(1),
            stop: Duration::from_secs(10),
        };

        Self {
            left_hosts: 3,
            right_hosts: 3,
            left_link: access,
            right_link: access,
            bottleneck,
            base_prefix: Ipv4Cidr {
                address: std::net::Ipv4Addr::new(10, 1, 0, 0),
                network_prefix: 16,
            },
            duration: Duration::from_secs(10),
            pairings: vec![
                pairing(0, TransportProtocol::Tcp),
                pairing(1, TransportProtocol::Tcp),
                pairing(2, TransportProtocol::Udp),
            ],
            seed: 42,
        }
    }
}

//! The composition root and simulation driver
//!
//! Wires TopologyBuilder output through the address planner into the
//! packet engine, configures the traffic applications and drives one run:
//! start, sleep to the stop instant, cancel, report. Configuration and
//! topology errors abort before any simulated time advances.

use crate::addressing::AddressPlanner;
use crate::config::ScenarioConfig;
use crate::topology::TopologyBuilder;
use crate::traffic::{TrafficPairing, TrafficScenario};
use crate::wiring::AddressedTopology;
use anyhow::Context;
use fastrand::Rng;
use simnet::flows::{FlowRecorder, FlowReport};
use simnet::network::SimNetwork;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct Simulation {
    config: ScenarioConfig,
}

impl Simulation {
    pub fn new(config: ScenarioConfig) -> Self {
        Self { config }
    }

    /// Runs the scenario to completion on a dedicated single-threaded
    /// runtime with a paused clock: the run advances in simulated time and
    /// returns immediately in wall-clock terms. The runtime (and with it
    /// every in-flight delivery task) is torn down when the run ends.
    pub fn run(&self) -> anyhow::Result<FlowReport> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .context("failed to initialize the simulation runtime")?;

        runtime.block_on(async {
            tokio::time::pause();
            self.run_simulated().await
        })
    }

    /// The run itself; requires a paused-clock runtime
    pub async fn run_simulated(&self) -> anyhow::Result<FlowReport> {
        let config = &self.config;

        let dumbbell = TopologyBuilder::new(
            config.left_hosts,
            config.right_hosts,
            config.left_link,
            config.right_link,
            config.bottleneck,
        )
        .build()
        .context("failed to build the dumbbell topology")?;

        let assignments = AddressPlanner::new(config.base_prefix.clone())?
            .assign(dumbbell.segments())
            .context("failed to assign subnets")?;
        let addressed = AddressedTopology::new(dumbbell, assignments, config.base_prefix.clone())?;

        let pairings = resolve_pairings(config, &addressed)?;
        let applications = TrafficScenario::new(&addressed)
            .configure(&pairings)
            .context("failed to configure traffic")?;

        let start = Instant::now();
        let recorder = FlowRecorder::new(start);
        let network = SimNetwork::initialize(
            addressed.network_spec(),
            recorder.clone(),
            Rng::with_seed(config.seed),
        )
        .context("failed to initialize the simulated network")?;

        let token = CancellationToken::new();
        let tasks = applications.start(&network, start, &token)?;

        tokio::time::sleep(config.duration).await;
        token.cancel();
        for task in tasks {
            task.await.context("application task crashed")?;
        }

        Ok(recorder.report(config.duration))
    }
}

/// Maps group indices from the configuration onto the built topology's
/// node names, rejecting indices outside their group
fn resolve_pairings(
    config: &ScenarioConfig,
    addressed: &AddressedTopology,
) -> anyhow::Result<Vec<TrafficPairing>> {
    let dumbbell = addressed.dumbbell();
    config
        .pairings
        .iter()
        .map(|pairing| {
            let sender = dumbbell.left_hosts().get(pairing.sender).with_context(|| {
                format!(
                    "pairing sender index {} is outside the left group (size {})",
                    pairing.sender,
                    dumbbell.left_hosts().len()
                )
            })?;
            let receiver = dumbbell
                .right_hosts()
                .get(pairing.receiver)
                .with_context(|| {
                    format!(
                        "pairing receiver index {} is outside the right group (size {})",
                        pairing.receiver,
                        dumbbell.right_hosts().len()
                    )
                })?;

            Ok(TrafficPairing {
                sender: sender.clone(),
                receiver: receiver.clone(),
                protocol: pairing.protocol,
                rate_bps: pairing.rate_bps,
                packet_bytes: pairing.packet_bytes,
                pattern: pairing.pattern,
                start: pairing.start,
                stop: pairing.stop,
            })
        })
        .collect()
}

use clap::Parser;
use std::path::PathBuf;

/// Dumbbell scenario workbench: builds the topology, runs the traffic and
/// reports per-flow statistics
#[derive(Parser, Debug, Clone)]
pub struct CliOpt {
    /// Path to the JSON file describing the scenario (topology, link
    /// parameters and traffic pairings); the built-in default scenario is
    /// used when absent
    #[arg(long)]
    pub scenario: Option<PathBuf>,

    /// Path the flow statistics report will be written to (overwritten on
    /// each run)
    #[arg(long, default_value = "flow-stats.json")]
    pub report: PathBuf,

    /// Whether the run should be non-deterministic, i.e. using a
    /// non-constant seed for the random number generator
    #[arg(long)]
    pub non_deterministic: bool,

    /// The random seed used for the simulated network (governing packet
    /// loss)
    #[arg(long, default_value_t = 42)]
    pub network_rng_seed: u64,
}

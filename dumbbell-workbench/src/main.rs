use anyhow::Context;
use clap::Parser;
use dumbbell_workbench::config::ScenarioConfig;
use dumbbell_workbench::config::cli::CliOpt;
use dumbbell_workbench::simulation::Simulation;
use dumbbell_workbench::util::print_flow_report;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let options = CliOpt::parse();
    let config = ScenarioConfig::load(&options)?;

    println!("--- Params ---");
    println!("* Network seed: {}", config.seed);
    println!(
        "* Hosts: {} left, {} right",
        config.left_hosts, config.right_hosts
    );
    println!(
        "* Bottleneck: {} bps, {} ms delay",
        config.bottleneck.bandwidth_bps,
        config.bottleneck.delay.as_millis()
    );
    println!(
        "* Run duration: {:.2}s, {} traffic pairings",
        config.duration.as_secs_f64(),
        config.pairings.len()
    );

    let report = Simulation::new(config).run()?;

    print_flow_report(&report);
    report
        .write(&options.report)
        .context("failed to persist the flow report")?;
    println!(
        "* Flow statistics available at {}",
        options.report.display()
    );

    Ok(())
}

//! distsys Simulator CLI
//!
//! Wires nodes, runs the selected scenarios, and reports the outcome.

use anyhow::{bail, Context};
use clap::Parser;
use distsys_sim::console::init_logging;
use distsys_sim::scenarios::ScenarioId;
use distsys_sim::{ScenarioResult, ScenarioRunner};
use std::time::Duration;
use tracing::{error, info};

/// distsys actor simulator
#[derive(Parser, Debug)]
#[command(name = "distsys-sim")]
#[command(about = "Run distributed-system simulations on the distsys actor runtime", long_about = None)]
struct Args {
    /// Scenario to run (snapshot, greeting, ring, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Repetitions per scenario
    #[arg(short, long, default_value = "100")]
    runs: usize,

    /// Mailbox poll interval in milliseconds
    #[arg(long, default_value = "5")]
    tick_ms: u64,

    /// Relay delay in milliseconds (must exceed marker propagation time)
    #[arg(long, default_value = "25")]
    relay_delay_ms: u64,

    /// Number of nodes in the ring scenario
    #[arg(long, default_value = "5")]
    ring_size: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.json {
        info!("distsys simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args
            .scenario
            .parse::<ScenarioId>()
            .context("available scenarios: snapshot, greeting, ring, all")?]
    };

    let runner = ScenarioRunner::new(args.runs)
        .with_tick(Duration::from_millis(args.tick_ms))
        .with_relay_delay(Duration::from_millis(args.relay_delay_ms))
        .with_ring_size(args.ring_size);

    let mut results: Vec<ScenarioResult> = Vec::new();
    for scenario in scenarios {
        let result = runner.run(scenario).await;

        if !args.json {
            if result.passed {
                info!("✓ {} PASSED ({}/{} runs, {} ms)",
                    scenario.name(), result.passed_runs, result.runs, result.metrics.elapsed_ms);
            } else {
                error!("✗ {} FAILED ({}/{} runs): {}",
                    scenario.name(),
                    result.passed_runs,
                    result.runs,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
        results.push(result);
    }

    let failed = results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": results.len(),
            "passed": results.len() - failed,
            "failed": failed,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed == 0 {
            info!("✅ All {} scenarios passed!", results.len());
        } else {
            error!("❌ {}/{} scenarios failed!", failed, results.len());
        }
    }

    if failed > 0 {
        bail!("{} scenario(s) failed", failed);
    }
    Ok(())
}

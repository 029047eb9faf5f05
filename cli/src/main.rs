//! Snapshot Simulator CLI
//!
//! Load a topology and an event script, run them, and check the resulting
//! snapshots.
//!
//! # Example
//!
//! ```bash
//! # Run a scenario and print the snapshots
//! snapshot-sim --topology 3nodes.top --events 3nodes.events
//!
//! # Replay with a fixed seed and compare against expected snapshots
//! snapshot-sim --topology 3nodes.top --events 3nodes.events --seed 7 \
//!     --expected 3nodes-0.snap --expected 3nodes-1.snap
//! ```

use clap::Parser;
use snapshot_simulator_core::scenario::{parse_events, parse_snapshot, parse_topology, run_script};
use snapshot_simulator_core::{check_token_conservation, Simulator};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Chandy–Lamport snapshot simulator
///
/// Deterministic for a given seed: the same topology, script and seed
/// always produce the same snapshots.
#[derive(Parser, Debug)]
#[command(name = "snapshot-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Topology file (.top)
    #[arg(short = 't', long)]
    topology: PathBuf,

    /// Event script (.events)
    #[arg(short = 'e', long)]
    events: PathBuf,

    /// Seed for delivery jitter
    #[arg(long)]
    seed: Option<u64>,

    /// Delivery jitter is drawn from [0, max_delay); 0 disables it
    #[arg(long)]
    max_delay: Option<u64>,

    /// Expected snapshot files (.snap), matched to snapshots in ID order
    #[arg(long = "expected")]
    expected: Vec<PathBuf>,

    /// Print snapshots as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn read(path: &Path) -> Result<String, Box<dyn Error>> {
    fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e).into())
}

/// Returns false if any check failed
fn run(args: &Args) -> Result<bool, Box<dyn Error>> {
    let mut config = parse_topology(&read(&args.topology)?)
        .map_err(|e| format!("{}: {}", args.topology.display(), e))?;
    if let Some(seed) = args.seed {
        config.rng_seed = seed;
    }
    if let Some(max_delay) = args.max_delay {
        config.max_delay = max_delay;
    }
    let script = parse_events(&read(&args.events)?)
        .map_err(|e| format!("{}: {}", args.events.display(), e))?;

    info!(
        nodes = config.nodes.len(),
        links = config.links.len(),
        commands = script.len(),
        seed = config.rng_seed,
        max_delay = config.max_delay,
        "Starting simulation"
    );

    let mut sim = Simulator::new(config)?;
    let total = sim.total_tokens();
    let snapshots = run_script(&mut sim, &script)?;

    for snapshot in &snapshots {
        if args.json {
            println!("{}", serde_json::to_string_pretty(snapshot)?);
        } else {
            print!("{}", snapshot);
        }
    }

    let mut ok = true;
    if let Err(e) = check_token_conservation(total, &snapshots) {
        error!("{}", e);
        ok = false;
    }

    if args.expected.len() > snapshots.len() {
        error!(
            expected = args.expected.len(),
            actual = snapshots.len(),
            "Fewer snapshots than expected"
        );
        ok = false;
    }
    for (path, snapshot) in args.expected.iter().zip(&snapshots) {
        let expected =
            parse_snapshot(&read(path)?).map_err(|e| format!("{}: {}", path.display(), e))?;
        match snapshot.diff(&expected) {
            Ok(()) => info!(snapshot_id = snapshot.id, file = %path.display(), "Snapshot matches"),
            Err(e) => {
                error!("{}", e);
                ok = false;
            }
        }
    }

    info!(
        ticks = sim.current_tick(),
        events = sim.event_log().len(),
        rejected_markers = sim.rejected_markers(),
        "Simulation finished"
    );
    Ok(ok)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,snapshot_sim=info,snapshot_simulator_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

//! Scenario fixtures under `tests/data`
//!
//! Each case loads a `.top` topology and an `.events` script, runs the
//! script driver without delivery jitter, and compares the snapshots with
//! the `.snap` files in ID order.

use snapshot_simulator_core::scenario::{parse_events, parse_snapshot, parse_topology, run_script};
use snapshot_simulator_core::{check_token_conservation, GlobalSnapshot, Simulator};
use std::fs;
use std::path::PathBuf;

fn read_fixture(name: &str) -> String {
    let path: PathBuf = [env!("CARGO_MANIFEST_DIR"), "tests", "data", name]
        .iter()
        .collect();
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {}", path.display(), e))
}

fn run_fixture(topology: &str, events: &str) -> (Simulator, Vec<GlobalSnapshot>) {
    let mut config = parse_topology(&read_fixture(topology)).unwrap();
    config.max_delay = 0;
    let mut sim = Simulator::new(config).unwrap();
    let script = parse_events(&read_fixture(events)).unwrap();
    let snapshots = run_script(&mut sim, &script).unwrap();
    (sim, snapshots)
}

fn check(topology: &str, events: &str, expected: &[&str]) {
    let (sim, snapshots) = run_fixture(topology, events);

    check_token_conservation(sim.total_tokens(), &snapshots).unwrap();
    assert_eq!(snapshots.len(), expected.len());
    for (snapshot, snap_file) in snapshots.iter().zip(expected) {
        let expected = parse_snapshot(&read_fixture(snap_file)).unwrap();
        if let Err(mismatch) = snapshot.diff(&expected) {
            panic!("{}: {}", snap_file, mismatch);
        }
    }
    assert_eq!(sim.pending_messages(), 0);
}

#[test]
fn test_2nodes_snapshot_at_receiver() {
    check("2nodes.top", "2nodes-receiver.events", &["2nodes-receiver.snap"]);
}

#[test]
fn test_2nodes_snapshot_at_sender() {
    check("2nodes.top", "2nodes-sender.events", &["2nodes-sender.snap"]);
}

#[test]
fn test_3nodes_ring_concurrent_snapshots() {
    check(
        "3nodes-ring.top",
        "3nodes-ring.events",
        &["3nodes-ring-0.snap", "3nodes-ring-1.snap"],
    );
}

#[test]
fn test_3nodes_fan_in() {
    check("3nodes-fan-in.top", "3nodes-fan-in.events", &["3nodes-fan-in.snap"]);
}

#[test]
fn test_fixture_round_trips_through_text_format() {
    let (_, snapshots) = run_fixture("3nodes-fan-in.top", "3nodes-fan-in.events");
    let text = snapshots[0].to_fixture_string();
    assert_eq!(parse_snapshot(&text).unwrap(), snapshots[0]);
    assert_eq!(text, read_fixture("3nodes-fan-in.snap"));
}

#[test]
fn test_fixtures_conserve_tokens_under_jitter() {
    for seed in 0..20 {
        let mut config = parse_topology(&read_fixture("3nodes-ring.top")).unwrap();
        config.rng_seed = seed;
        let mut sim = Simulator::new(config).unwrap();
        let script = parse_events(&read_fixture("3nodes-ring.events")).unwrap();

        let snapshots = run_script(&mut sim, &script).unwrap();
        assert_eq!(snapshots.len(), 2);
        check_token_conservation(100, &snapshots).unwrap();
    }
}

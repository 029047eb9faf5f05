//! Script driver
//!
//! Applies a parsed event script to a simulator. Every `snapshot` command
//! hands a [`SnapshotHandle`] to its own waiter thread; finished snapshots
//! come back over a channel while this thread keeps ticking. If the script
//! fails, the outstanding snapshots are abandoned so every waiter exits
//! before the error is returned.

use crate::models::snapshot::GlobalSnapshot;
use crate::orchestrator::collector::SnapshotHandle;
use crate::orchestrator::engine::{ControlEvent, SimulationError, Simulator};
use crate::scenario::{ScenarioError, ScriptCommand};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

type WaiterResult = Result<GlobalSnapshot, SimulationError>;

struct Waiter {
    handle: SnapshotHandle,
    thread: JoinHandle<()>,
}

/// Run `commands` against `sim` and return every snapshot taken, by ID
///
/// After the script ends the simulator keeps ticking until all snapshots
/// are complete, then ticks `max_delay + 1` more times so that every message
/// still in transit is delivered. Collected snapshots are released from
/// the simulator.
pub fn run_script(
    sim: &mut Simulator,
    commands: &[ScriptCommand],
) -> Result<Vec<GlobalSnapshot>, ScenarioError> {
    let (tx, rx) = mpsc::channel();
    let mut waiters = Vec::new();

    let outcome = drive(sim, commands, &tx, &mut waiters);
    drop(tx);
    if let Err(err) = outcome {
        warn!(error = %err, waiters = waiters.len(), "Script failed, abandoning snapshots");
        for waiter in waiters {
            waiter.handle.abandon();
            // A waiter that panicked has nothing left to clean up
            let _ = waiter.thread.join();
        }
        return Err(err);
    }

    let mut snapshots = Vec::with_capacity(waiters.len());
    for _ in 0..waiters.len() {
        let result = rx.recv().map_err(|_| ScenarioError::WaiterDisconnected)?;
        snapshots.push(result?);
    }
    for waiter in waiters {
        waiter
            .thread
            .join()
            .map_err(|_| ScenarioError::WaiterDisconnected)?;
        sim.release_snapshot(waiter.handle.snapshot_id())?;
    }

    snapshots.sort_by_key(|snapshot| snapshot.id);
    info!(
        snapshots = snapshots.len(),
        tick = sim.current_tick(),
        "Script finished"
    );
    Ok(snapshots)
}

fn drive(
    sim: &mut Simulator,
    commands: &[ScriptCommand],
    tx: &Sender<WaiterResult>,
    waiters: &mut Vec<Waiter>,
) -> Result<(), ScenarioError> {
    for command in commands {
        debug!(?command, tick = sim.current_tick(), "Applying script command");
        match command {
            ScriptCommand::Send { src, dest, tokens } => {
                sim.process_event(ControlEvent::PassToken {
                    src: src.clone(),
                    dest: dest.clone(),
                    tokens: *tokens,
                })?;
            }
            ScriptCommand::Snapshot { node_id } => {
                let event = ControlEvent::Snapshot {
                    node_id: node_id.clone(),
                };
                if let Some(snapshot_id) = sim.process_event(event)? {
                    let handle = sim.snapshot_handle(snapshot_id)?;
                    let waiting = handle.clone();
                    let tx = tx.clone();
                    let thread = thread::spawn(move || {
                        // The receiver only goes away if the driver already failed
                        let _ = tx.send(waiting.wait());
                    });
                    waiters.push(Waiter { handle, thread });
                }
            }
            ScriptCommand::Tick(n) => {
                for _ in 0..*n {
                    sim.tick()?;
                }
            }
        }
    }

    loop {
        let outstanding = sim.outstanding_snapshots();
        if outstanding.is_empty() {
            break;
        }
        if sim.pending_messages() == 0 {
            return Err(ScenarioError::Stalled { outstanding });
        }
        sim.tick()?;
    }

    for _ in 0..=sim.max_delay() {
        sim.tick()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::engine::{LinkConfig, NodeConfig, SimulatorConfig};

    fn two_way(seed: u64, max_delay: u64) -> Simulator {
        Simulator::new(SimulatorConfig {
            rng_seed: seed,
            max_delay,
            nodes: vec![
                NodeConfig {
                    id: "N1".to_string(),
                    tokens: 10,
                },
                NodeConfig {
                    id: "N2".to_string(),
                    tokens: 0,
                },
            ],
            links: vec![
                LinkConfig {
                    src: "N1".to_string(),
                    dest: "N2".to_string(),
                },
                LinkConfig {
                    src: "N2".to_string(),
                    dest: "N1".to_string(),
                },
            ],
        })
        .unwrap()
    }

    #[test]
    fn test_script_without_snapshots_drains_channels() {
        let mut sim = two_way(1, 5);
        let script = vec![ScriptCommand::Send {
            src: "N1".to_string(),
            dest: "N2".to_string(),
            tokens: 3,
        }];

        let snapshots = run_script(&mut sim, &script).unwrap();
        assert!(snapshots.is_empty());
        assert_eq!(sim.pending_messages(), 0);
        assert_eq!(sim.node("N2").unwrap().tokens(), 3);
    }

    #[test]
    fn test_script_error_propagates() {
        let mut sim = two_way(1, 0);
        let script = vec![ScriptCommand::Send {
            src: "N2".to_string(),
            dest: "N1".to_string(),
            tokens: 1,
        }];
        assert!(matches!(
            run_script(&mut sim, &script),
            Err(ScenarioError::Simulation(_))
        ));
    }

    #[test]
    fn test_snapshots_returned_in_id_order() {
        let mut sim = two_way(99, 5);
        let script = vec![
            ScriptCommand::Snapshot {
                node_id: "N2".to_string(),
            },
            ScriptCommand::Snapshot {
                node_id: "N1".to_string(),
            },
        ];
        let snapshots = run_script(&mut sim, &script).unwrap();
        let ids: Vec<_> = snapshots.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!(snapshots.iter().all(|s| s.total_tokens() == 10));
        assert_eq!(sim.retained_snapshots(), 0);
    }

    #[test]
    fn test_failure_after_snapshot_returns_without_hanging() {
        let mut sim = two_way(3, 0);
        let script = vec![
            ScriptCommand::Snapshot {
                node_id: "N1".to_string(),
            },
            // N2 holds no tokens
            ScriptCommand::Send {
                src: "N2".to_string(),
                dest: "N1".to_string(),
                tokens: 4,
            },
        ];

        assert!(matches!(
            run_script(&mut sim, &script),
            Err(ScenarioError::Simulation(SimulationError::Node { .. }))
        ));
        assert_eq!(sim.outstanding_snapshots(), vec![0]);
    }
}

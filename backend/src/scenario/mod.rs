//! Scenario files and the script driver
//!
//! Three line-oriented formats describe a run:
//!
//! - `.top` topology: node count, `id tokens` lines, then `src dst` links
//! - `.events` script: `send src dst amount`, `snapshot node`, `tick [n]`
//! - `.snap` expected snapshot: id, `node tokens` lines, `src dst token(n)` lines
//!
//! Lines starting with `#` and blank lines are ignored everywhere.
//!
//! # Example
//!
//! ```rust
//! use snapshot_simulator_core::scenario::{parse_events, parse_snapshot, parse_topology, run_script};
//! use snapshot_simulator_core::Simulator;
//!
//! let mut config = parse_topology("2\nN1 10\nN2 0\nN1 N2\nN2 N1\n").unwrap();
//! config.max_delay = 0;
//! let mut sim = Simulator::new(config).unwrap();
//!
//! let script = parse_events("send N1 N2 5\nsnapshot N2\n").unwrap();
//! let snapshots = run_script(&mut sim, &script).unwrap();
//!
//! let expected = parse_snapshot("0\nN1 5\nN2 0\nN1 N2 token(5)\n").unwrap();
//! assert!(snapshots[0].diff(&expected).is_ok());
//! ```

pub mod driver;
pub mod parse;

pub use driver::run_script;
pub use parse::{parse_events, parse_snapshot, parse_topology, ScriptCommand};

use crate::models::message::SnapshotId;
use crate::orchestrator::engine::SimulationError;
use thiserror::Error;

/// Errors from loading or running a scenario
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("snapshots {outstanding:?} cannot complete: no messages left in transit")]
    Stalled { outstanding: Vec<SnapshotId> },

    #[error("snapshot waiter exited without reporting")]
    WaiterDisconnected,
}

impl ScenarioError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        ScenarioError::Parse {
            line,
            message: message.into(),
        }
    }
}

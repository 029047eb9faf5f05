//! Snapshot Simulator Core - Rust Engine
//!
//! Deterministic discrete-event simulator of the Chandy–Lamport distributed
//! snapshot algorithm over a token-passing network.
//!
//! # Architecture
//!
//! - **core**: Logical time
//! - **rng**: Deterministic random number generation (delivery jitter)
//! - **models**: Domain types (Message, Channel, Node, snapshots, events)
//! - **orchestrator**: Main simulation loop and snapshot collection
//! - **scenario**: Topology/event/snapshot files and the script driver
//!
//! # Critical Invariants
//!
//! 1. Tokens are conserved: balances plus tokens in transit never change
//! 2. Channels are FIFO and a message is never delivered before its receive time
//! 3. All randomness is deterministic (seeded RNG)
//! 4. Every completed snapshot records exactly the tokens in the system

// Module declarations
pub mod core;
pub mod models;
pub mod orchestrator;
pub mod rng;
pub mod scenario;

// Re-exports for convenience
pub use crate::core::time::TimeManager;
pub use models::{
    check_token_conservation, Event, EventLog, GlobalSnapshot, LocalSnapshot, Message, Node,
    NodeError, RecordedMessage, SnapshotId, SnapshotMismatch,
};
pub use orchestrator::{
    ControlEvent, LinkConfig, NodeConfig, SimulationError, Simulator, SimulatorConfig,
    SnapshotHandle, TickResult,
};
pub use rng::RngManager;
pub use scenario::{ScenarioError, ScriptCommand};

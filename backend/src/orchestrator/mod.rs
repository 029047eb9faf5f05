//! Orchestrator - main simulation loop
//!
//! `engine.rs` owns nodes, channels and time; `collector.rs` tracks
//! per-snapshot completion across threads.

pub mod collector;
pub mod engine;

// Re-export main types for convenience
pub use collector::{SnapshotCollector, SnapshotHandle};
pub use engine::{
    ControlEvent, LinkConfig, NodeConfig, SimulationError, Simulator, SimulatorConfig, TickResult,
    DEFAULT_MAX_DELAY, DEFAULT_RNG_SEED,
};

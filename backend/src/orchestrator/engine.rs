//! Simulator Engine
//!
//! Owns every node and channel, advances logical time, and applies the
//! effects nodes request while running the Chandy–Lamport protocol:
//! - Topology construction (nodes, directed links)
//! - Control events (token transfers, snapshot initiation)
//! - Deterministic delivery (one message per source node per tick)
//! - Snapshot completion tracking and assembly
//! - Event logging (complete simulation history)
//!
//! # Architecture
//!
//! ```text
//! driver ──process_event──▶ Node::send_tokens / Node::start_snapshot
//!                                   │ NodeEffect::Send
//!                                   ▼
//!                          Channel queue (FIFO)
//!                                   │ tick(): head due?
//!                                   ▼
//!                          Node::handle_packet
//!                                   │ NodeEffect::SnapshotCompleted
//!                                   ▼
//!                 notify_completed_snapshot ──▶ SnapshotCollector
//!                                                  │ wait()
//!                                                  ▼
//!                                            GlobalSnapshot
//! ```
//!
//! Nodes and channels live in arenas indexed by dense handles, with a
//! name → handle map for lookups. Iterating that map gives the
//! lexicographic scan order used by `tick()`.
//!
//! # Example
//!
//! ```rust
//! use snapshot_simulator_core::orchestrator::{ControlEvent, Simulator, SimulatorConfig};
//!
//! let mut sim = Simulator::new(SimulatorConfig {
//!     max_delay: 0,
//!     ..SimulatorConfig::default()
//! })
//! .unwrap();
//! sim.add_node("N1", 10).unwrap();
//! sim.add_node("N2", 0).unwrap();
//! sim.add_link("N1", "N2").unwrap();
//!
//! sim.process_event(ControlEvent::PassToken {
//!     src: "N1".to_string(),
//!     dest: "N2".to_string(),
//!     tokens: 4,
//! })
//! .unwrap();
//! let id = sim.start_snapshot("N1").unwrap();
//!
//! while !sim.snapshot_handle(id).unwrap().is_complete() {
//!     sim.tick().unwrap();
//! }
//! let snapshot = sim.collect_snapshot(id).unwrap();
//! assert_eq!(snapshot.total_tokens(), 10);
//! ```

use crate::core::time::TimeManager;
use crate::models::channel::{Channel, ChannelId, SendMsgEvent};
use crate::models::event::{Event, EventLog};
use crate::models::message::{Message, SnapshotId};
use crate::models::node::{Node, NodeEffect, NodeError};
use crate::models::snapshot::{GlobalSnapshot, LocalSnapshot};
use crate::orchestrator::collector::{SnapshotCollector, SnapshotHandle};
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound (exclusive) of the random delivery jitter, in ticks
pub const DEFAULT_MAX_DELAY: u64 = 5;

/// Seed used when a configuration does not name one
pub const DEFAULT_RNG_SEED: u64 = 0x5EED;

// ============================================================================
// Configuration Types
// ============================================================================

/// Complete simulator configuration
///
/// # Fields
///
/// * `rng_seed` - Seed for the delivery jitter RNG
/// * `max_delay` - Jitter is drawn from `[0, max_delay)`; 0 disables it
/// * `nodes` - Initial nodes and their balances
/// * `links` - Directed links between configured nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_rng_seed")]
    pub rng_seed: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay: u64,

    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

fn default_rng_seed() -> u64 {
    DEFAULT_RNG_SEED
}

fn default_max_delay() -> u64 {
    DEFAULT_MAX_DELAY
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            rng_seed: DEFAULT_RNG_SEED,
            max_delay: DEFAULT_MAX_DELAY,
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }
}

/// Per-node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub tokens: u64,
}

/// Directed link configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub src: String,
    pub dest: String,
}

/// External control event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlEvent {
    /// `src` sends `tokens` to its neighbour `dest`
    PassToken {
        src: String,
        dest: String,
        tokens: u64,
    },

    /// Start a new snapshot at `node_id`
    Snapshot { node_id: String },
}

/// Result of a single tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickResult {
    /// Tick number after advancing
    pub tick: u64,

    /// Messages delivered this tick
    pub deliveries: usize,

    /// Snapshots whose last participant finished this tick
    pub completed_snapshots: Vec<SnapshotId>,
}

/// Simulation error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Node {0} already exists")]
    DuplicateNode(String),

    #[error("Node {0} does not exist")]
    NodeNotFound(String),

    #[error("Self link on node {0} is not allowed")]
    SelfLink(String),

    #[error("Link {src} -> {dest} already exists")]
    DuplicateLink { src: String, dest: String },

    #[error("Topology is frozen once the simulation has started")]
    TopologyFrozen,

    #[error("Unknown snapshot {0}")]
    UnknownSnapshot(SnapshotId),

    #[error("Snapshot {0} was abandoned before every node reported")]
    SnapshotAbandoned(SnapshotId),

    #[error("Node {node_id} reported unexpected completion of snapshot {snapshot_id}")]
    UnexpectedCompletion {
        node_id: String,
        snapshot_id: SnapshotId,
    },

    #[error("Node {node_id}: {source}")]
    Node {
        node_id: String,
        #[source]
        source: NodeError,
    },
}

// ============================================================================
// Simulator
// ============================================================================

/// Discrete-event simulator of the Chandy–Lamport snapshot algorithm
///
/// # Determinism
///
/// All randomness is delivery jitter from `rng_manager`, seeded from the
/// config. Nodes and channels are scanned in ID order. Same seed + same
/// sequence of calls = identical event log and identical snapshots.
pub struct Simulator {
    time_manager: TimeManager,

    rng_manager: RngManager,

    max_delay: u64,

    /// Node arena
    nodes: Vec<Node>,

    /// Node ID → arena handle, ordered for deterministic scanning
    node_index: BTreeMap<String, usize>,

    /// Channel arena
    channels: Vec<Channel>,

    next_snapshot_id: SnapshotId,

    /// Completion latch per snapshot, until collected or released
    collectors: BTreeMap<SnapshotId, Arc<SnapshotCollector>>,

    event_log: EventLog,

    rejected_markers: usize,

    /// Set by the first control event or tick; freezes the topology
    started: bool,
}

impl Simulator {
    /// Create a simulator from configuration
    ///
    /// Nodes and links from the config are added in order, with the same
    /// validation as [`Simulator::add_node`] and [`Simulator::add_link`].
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulationError> {
        let mut sim = Self::empty(config.rng_seed, config.max_delay);
        for node in config.nodes {
            sim.add_node(node.id, node.tokens)?;
        }
        for link in config.links {
            sim.add_link(&link.src, &link.dest)?;
        }
        Ok(sim)
    }

    /// Empty simulator with the given seed and default delay
    pub fn with_seed(rng_seed: u64) -> Self {
        Self::empty(rng_seed, DEFAULT_MAX_DELAY)
    }

    fn empty(rng_seed: u64, max_delay: u64) -> Self {
        Self {
            time_manager: TimeManager::new(),
            rng_manager: RngManager::new(rng_seed),
            max_delay,
            nodes: Vec::new(),
            node_index: BTreeMap::new(),
            channels: Vec::new(),
            next_snapshot_id: 0,
            collectors: BTreeMap::new(),
            event_log: EventLog::new(),
            rejected_markers: 0,
            started: false,
        }
    }

    // ========================================================================
    // Topology
    // ========================================================================

    /// Add a node with the specified number of starting tokens
    pub fn add_node(&mut self, id: impl Into<String>, tokens: u64) -> Result<(), SimulationError> {
        let id = id.into();
        if self.started {
            return Err(SimulationError::TopologyFrozen);
        }
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(SimulationError::InvalidConfig(format!(
                "node id {:?} must be non-empty and contain no whitespace",
                id
            )));
        }
        if self.node_index.contains_key(&id) {
            return Err(SimulationError::DuplicateNode(id));
        }

        self.node_index.insert(id.clone(), self.nodes.len());
        self.nodes.push(Node::new(id, tokens));
        Ok(())
    }

    /// Add a unidirectional link between two existing nodes
    pub fn add_link(&mut self, src: &str, dest: &str) -> Result<(), SimulationError> {
        if self.started {
            return Err(SimulationError::TopologyFrozen);
        }
        let src_handle = self.handle(src)?;
        let dest_handle = self.handle(dest)?;
        if src_handle == dest_handle {
            return Err(SimulationError::SelfLink(src.to_string()));
        }
        if self.nodes[src_handle].outbound_channel(dest).is_some() {
            return Err(SimulationError::DuplicateLink {
                src: src.to_string(),
                dest: dest.to_string(),
            });
        }

        let channel_id = ChannelId(self.channels.len());
        self.channels.push(Channel::new(src, dest));
        self.nodes[src_handle].add_outbound(dest, channel_id);
        self.nodes[dest_handle].add_inbound(src, channel_id);
        Ok(())
    }

    fn handle(&self, node_id: &str) -> Result<usize, SimulationError> {
        self.node_index
            .get(node_id)
            .copied()
            .ok_or_else(|| SimulationError::NodeNotFound(node_id.to_string()))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn current_tick(&self) -> u64 {
        self.time_manager.current_tick()
    }

    pub fn max_delay(&self) -> u64 {
        self.max_delay
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.node_index.get(node_id).map(|&h| &self.nodes[h])
    }

    /// Node IDs in scan order
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.node_index.keys().map(String::as_str)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Channel from `src` to `dest`
    pub fn channel(&self, src: &str, dest: &str) -> Option<&Channel> {
        let channel_id = self.node(src)?.outbound_channel(dest)?;
        Some(&self.channels[channel_id.0])
    }

    /// Messages (tokens and markers) currently in transit
    pub fn pending_messages(&self) -> usize {
        self.channels.iter().map(Channel::len).sum()
    }

    /// Tokens held by nodes plus tokens in transit
    ///
    /// Constant for the lifetime of a simulation.
    pub fn total_tokens(&self) -> u64 {
        let held: u64 = self.nodes.iter().map(Node::tokens).sum();
        let in_transit: u64 = self.channels.iter().map(Channel::tokens_in_transit).sum();
        held + in_transit
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Duplicate and stale markers rejected so far
    pub fn rejected_markers(&self) -> usize {
        self.rejected_markers
    }

    /// Snapshots whose collection state is still held
    ///
    /// Drops back as snapshots are collected or released.
    pub fn retained_snapshots(&self) -> usize {
        self.collectors.len()
    }

    /// Snapshots still waiting for at least one participant
    pub fn outstanding_snapshots(&self) -> Vec<SnapshotId> {
        self.collectors
            .iter()
            .filter(|(_, collector)| !collector.is_complete())
            .map(|(&id, _)| id)
            .collect()
    }

    // ========================================================================
    // Control events
    // ========================================================================

    /// Dispatch an external control event
    ///
    /// Returns the allocated snapshot ID for `ControlEvent::Snapshot`.
    pub fn process_event(
        &mut self,
        event: ControlEvent,
    ) -> Result<Option<SnapshotId>, SimulationError> {
        match event {
            ControlEvent::PassToken { src, dest, tokens } => {
                self.send_tokens(&src, &dest, tokens)?;
                Ok(None)
            }
            ControlEvent::Snapshot { node_id } => self.start_snapshot(&node_id).map(Some),
        }
    }

    /// `src` sends `tokens` to its neighbour `dest`
    pub fn send_tokens(&mut self, src: &str, dest: &str, tokens: u64) -> Result<(), SimulationError> {
        self.started = true;
        let handle = self.handle(src)?;
        let message = self.nodes[handle]
            .send_tokens(tokens, dest)
            .map_err(|source| SimulationError::Node {
                node_id: src.to_string(),
                source,
            })?;
        self.enqueue(handle, dest, message)
    }

    /// Start a new snapshot at `node_id`
    ///
    /// Every node takes part. Nodes the initiator cannot reach along
    /// outbound links would never see its marker, so they start recording
    /// at the same instant, in ID order, right after the initiator.
    pub fn start_snapshot(&mut self, node_id: &str) -> Result<SnapshotId, SimulationError> {
        self.started = true;
        let initiator = self.handle(node_id)?;

        let snapshot_id = self.next_snapshot_id;
        self.next_snapshot_id += 1;

        let reachable = self.reachable_from(initiator);
        let co_initiators: Vec<usize> = self
            .node_index
            .iter()
            .filter(|(id, _)| !reachable.contains(*id))
            .map(|(_, &handle)| handle)
            .collect();
        let participants: BTreeSet<String> = self.node_index.keys().cloned().collect();
        info!(
            snapshot_id,
            initiator = node_id,
            participants = participants.len(),
            co_initiators = co_initiators.len(),
            tick = self.current_tick(),
            "Starting snapshot"
        );
        self.collectors.insert(
            snapshot_id,
            Arc::new(SnapshotCollector::new(snapshot_id, participants)),
        );

        self.event_log.log(Event::SnapshotStarted {
            tick: self.current_tick(),
            node_id: node_id.to_string(),
            snapshot_id,
        });

        for handle in std::iter::once(initiator).chain(co_initiators) {
            let id = self.nodes[handle].id().to_string();
            if handle != initiator {
                debug!(snapshot_id, node = %id, "Co-initiating unreachable node");
            }
            let effects = self.nodes[handle]
                .start_snapshot(snapshot_id)
                .map_err(|source| SimulationError::Node { node_id: id, source })?;
            self.apply_effects(handle, effects)?;
        }
        Ok(snapshot_id)
    }

    fn reachable_from(&self, start: usize) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut frontier = VecDeque::from([start]);
        seen.insert(self.nodes[start].id().to_string());

        while let Some(handle) = frontier.pop_front() {
            for dest in self.nodes[handle].outbound_ids() {
                if seen.insert(dest.to_string()) {
                    if let Some(&next) = self.node_index.get(dest) {
                        frontier.push_back(next);
                    }
                }
            }
        }
        seen
    }

    // ========================================================================
    // Tick Loop
    // ========================================================================

    /// Advance time by one step and deliver at most one message per node
    ///
    /// Nodes are scanned in ID order and, within a node, outbound channels in
    /// destination order. The first channel whose head is due delivers and
    /// the scan moves on to the next node. This gives every destination a
    /// reproducible total order of deliveries across ticks.
    pub fn tick(&mut self) -> Result<TickResult, SimulationError> {
        self.started = true;
        let now = self.time_manager.advance_tick();

        let mut deliveries = 0;
        let mut completed_snapshots = Vec::new();

        let scan_order: Vec<usize> = self.node_index.values().copied().collect();
        for handle in scan_order {
            let outbound: Vec<ChannelId> = self.nodes[handle].outbound_channels().collect();
            for channel_id in outbound {
                if let Some(event) = self.channels[channel_id.0].pop_due(&self.time_manager) {
                    completed_snapshots.extend(self.deliver(event)?);
                    deliveries += 1;
                    break;
                }
            }
        }

        Ok(TickResult {
            tick: now,
            deliveries,
            completed_snapshots,
        })
    }

    /// Receive time for a message sent now
    ///
    /// Every message takes at least one tick. At most one message reaches a
    /// destination per tick from each source, so actual delivery may come
    /// later than the returned time.
    pub fn receive_time(&mut self) -> u64 {
        self.current_tick() + 1 + self.rng_manager.below(self.max_delay)
    }

    fn deliver(&mut self, event: SendMsgEvent) -> Result<Vec<SnapshotId>, SimulationError> {
        let tick = self.current_tick();
        debug!(tick, src = %event.src, dest = %event.dest, message = %event.message, "Delivering");
        self.event_log.log(Event::MessageReceived {
            tick,
            src: event.src.clone(),
            dest: event.dest.clone(),
            message: event.message,
        });

        // Markers of a collected snapshot, or for a node that already
        // reported, never reach the node
        if let Message::Marker(snapshot_id) = event.message {
            let stale = match self.collectors.get(&snapshot_id) {
                Some(collector) => collector.has_reported(&event.dest),
                None => true,
            };
            if stale {
                self.reject_marker(event.src, event.dest, snapshot_id);
                return Ok(Vec::new());
            }
        }

        let handle = self.handle(&event.dest)?;
        match self.nodes[handle].handle_packet(&event.src, event.message) {
            Ok(effects) => self.apply_effects(handle, effects),
            Err(NodeError::DuplicateMarker {
                node_id,
                src,
                snapshot_id,
            }) => {
                self.reject_marker(src, node_id, snapshot_id);
                Ok(Vec::new())
            }
            Err(source) => Err(SimulationError::Node {
                node_id: event.dest,
                source,
            }),
        }
    }

    fn reject_marker(&mut self, src: String, dest: String, snapshot_id: SnapshotId) {
        let tick = self.current_tick();
        warn!(tick, %src, %dest, snapshot_id, "Rejected marker");
        self.rejected_markers += 1;
        self.event_log.log(Event::MarkerRejected {
            tick,
            src,
            dest,
            snapshot_id,
        });
    }

    fn apply_effects(
        &mut self,
        handle: usize,
        effects: Vec<NodeEffect>,
    ) -> Result<Vec<SnapshotId>, SimulationError> {
        let mut completed = Vec::new();
        for effect in effects {
            match effect {
                NodeEffect::Send { dest, message } => self.enqueue(handle, &dest, message)?,
                NodeEffect::SnapshotCompleted(local) => {
                    let snapshot_id = local.snapshot_id;
                    if self.notify_completed_snapshot(local)? {
                        completed.push(snapshot_id);
                    }
                }
            }
        }
        Ok(completed)
    }

    fn enqueue(&mut self, handle: usize, dest: &str, message: Message) -> Result<(), SimulationError> {
        let src = self.nodes[handle].id().to_string();
        let channel_id = self.nodes[handle].outbound_channel(dest).ok_or_else(|| {
            SimulationError::Node {
                node_id: src.clone(),
                source: NodeError::UnknownDestination {
                    node_id: src.clone(),
                    dest: dest.to_string(),
                },
            }
        })?;

        let receive_time = self.receive_time();
        self.event_log.log(Event::MessageSent {
            tick: self.current_tick(),
            src: src.clone(),
            dest: dest.to_string(),
            message,
            receive_time,
        });
        self.channels[channel_id.0].push(SendMsgEvent {
            src,
            dest: dest.to_string(),
            message,
            receive_time,
        });
        Ok(())
    }

    // ========================================================================
    // Snapshot collection
    // ========================================================================

    /// Record that a node finished its part of a snapshot
    ///
    /// Returns true when this was the last participant.
    pub fn notify_completed_snapshot(&mut self, local: LocalSnapshot) -> Result<bool, SimulationError> {
        let snapshot_id = local.snapshot_id;
        let node_id = local.node_id.clone();

        let collector = self
            .collectors
            .get(&snapshot_id)
            .ok_or(SimulationError::UnknownSnapshot(snapshot_id))?;
        let complete = collector.report(local)?;

        self.event_log.log(Event::SnapshotEnded {
            tick: self.current_tick(),
            node_id,
            snapshot_id,
        });
        if complete {
            info!(snapshot_id, tick = self.current_tick(), "Snapshot complete");
        }
        Ok(complete)
    }

    /// Shareable completion handle for a snapshot
    pub fn snapshot_handle(&self, snapshot_id: SnapshotId) -> Result<SnapshotHandle, SimulationError> {
        self.collectors
            .get(&snapshot_id)
            .map(|collector| SnapshotHandle::new(Arc::clone(collector)))
            .ok_or(SimulationError::UnknownSnapshot(snapshot_id))
    }

    /// The global snapshot, if every participant has finished
    ///
    /// A returned snapshot is handed over; its ID is unknown afterwards.
    pub fn try_collect_snapshot(
        &mut self,
        snapshot_id: SnapshotId,
    ) -> Result<Option<GlobalSnapshot>, SimulationError> {
        let snapshot = self.snapshot_handle(snapshot_id)?.try_collect();
        if snapshot.is_some() {
            self.collectors.remove(&snapshot_id);
        }
        Ok(snapshot)
    }

    /// Block until every participant has finished, then assemble
    ///
    /// Calling this from the thread that ticks the simulator before the
    /// snapshot is complete blocks forever; hand a [`SnapshotHandle`] to
    /// another thread instead (see `scenario::run_script`).
    pub fn collect_snapshot(&mut self, snapshot_id: SnapshotId) -> Result<GlobalSnapshot, SimulationError> {
        let snapshot = self.snapshot_handle(snapshot_id)?.wait()?;
        self.collectors.remove(&snapshot_id);
        Ok(snapshot)
    }

    /// Drop the collection state of a completed snapshot
    ///
    /// Returns false, and keeps the state, while the snapshot is still
    /// outstanding. Handles already given out stay usable.
    pub fn release_snapshot(&mut self, snapshot_id: SnapshotId) -> Result<bool, SimulationError> {
        let collector = self
            .collectors
            .get(&snapshot_id)
            .ok_or(SimulationError::UnknownSnapshot(snapshot_id))?;
        if !collector.is_complete() {
            return Ok(false);
        }
        self.collectors.remove(&snapshot_id);
        Ok(true)
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        for collector in self.collectors.values() {
            collector.abandon();
        }
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("current_tick", &self.current_tick())
            .field("num_nodes", &self.nodes.len())
            .field("num_channels", &self.channels.len())
            .field("pending_messages", &self.pending_messages())
            .field("next_snapshot_id", &self.next_snapshot_id)
            .field("event_count", &self.event_log.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

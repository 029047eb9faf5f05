//! Node model and the local Chandy–Lamport algorithm
//!
//! A node holds a token balance, references to its inbound and outbound
//! channels, and one [`SnapshotRecording`] per snapshot it is still
//! recording. A finished recording is handed to the simulator as a
//! [`LocalSnapshot`] and dropped.
//!
//! Nodes never touch channels or the simulator directly. Every operation
//! returns [`NodeEffect`]s (messages to send, snapshots completed) that the
//! simulator applies, which keeps all mutation inside one scheduling loop.
//!
//! # State Machine (per snapshot ID)
//!
//! ```text
//! NotStarted --start / first marker--> Recording --last marker--> Done
//! ```
//!
//! Only `Recording` is stored. `Done` exists as the emitted
//! [`NodeEffect::SnapshotCompleted`]; markers that arrive after it are
//! stale and the simulator rejects them before they reach the node.
//!
//! # Critical Invariants
//!
//! 1. Balance never goes below zero (balances are u64, sends are checked)
//! 2. Token deliveries always update the live balance immediately
//! 3. A marker is processed at most once per (inbound channel, snapshot ID)

use crate::models::channel::ChannelId;
use crate::models::message::{Message, SnapshotId};
use crate::models::snapshot::{LocalSnapshot, RecordedMessage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors raised by a single node
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("node {node_id} attempted to send {requested} tokens when it only has {available}")]
    InsufficientTokens {
        node_id: String,
        requested: u64,
        available: u64,
    },

    #[error("unknown destination {dest} from node {node_id}")]
    UnknownDestination { node_id: String, dest: String },

    #[error("node {node_id} has no inbound link from {src}")]
    UnknownSource { node_id: String, src: String },

    #[error("duplicate marker for snapshot {snapshot_id} on link {src} -> {node_id}")]
    DuplicateMarker {
        node_id: String,
        src: String,
        snapshot_id: SnapshotId,
    },

    #[error("snapshot {snapshot_id} already started on node {node_id}")]
    SnapshotAlreadyStarted {
        node_id: String,
        snapshot_id: SnapshotId,
    },
}

/// Side effect requested by a node, applied by the simulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEffect {
    /// Enqueue `message` on the outbound channel to `dest`
    Send { dest: String, message: Message },

    /// The node finished its local part of a snapshot
    SnapshotCompleted(LocalSnapshot),
}

/// Per-snapshot bookkeeping of a node while it records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecording {
    snapshot_id: SnapshotId,
    /// Balance at the moment the node entered the snapshot
    recorded_balance: u64,
    /// Inbound sources whose marker has arrived
    markers_seen: BTreeSet<String>,
    /// Inbound sources still expected to send a marker
    awaiting: BTreeSet<String>,
    /// Token messages received on open channels, in delivery order
    in_flight: Vec<RecordedMessage>,
}

impl SnapshotRecording {
    pub fn snapshot_id(&self) -> SnapshotId {
        self.snapshot_id
    }

    pub fn recorded_balance(&self) -> u64 {
        self.recorded_balance
    }

    pub fn markers_seen(&self) -> &BTreeSet<String> {
        &self.markers_seen
    }

    pub fn awaiting(&self) -> &BTreeSet<String> {
        &self.awaiting
    }

    pub fn in_flight(&self) -> &[RecordedMessage] {
        &self.in_flight
    }
}

/// A participant of the snapshot protocol
///
/// # Example
/// ```
/// use snapshot_simulator_core::models::{ChannelId, Message, Node};
///
/// let mut node = Node::new("N1", 10);
/// node.add_outbound("N2", ChannelId(0));
///
/// let message = node.send_tokens(4, "N2").unwrap();
/// assert_eq!(message, Message::Token(4));
/// assert_eq!(node.tokens(), 6);
///
/// // Overdrawing is rejected without touching the balance
/// assert!(node.send_tokens(7, "N2").is_err());
/// assert_eq!(node.tokens(), 6);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    id: String,
    tokens: u64,
    /// Outbound channels keyed by destination ID
    outbound: BTreeMap<String, ChannelId>,
    /// Inbound channels keyed by source ID
    inbound: BTreeMap<String, ChannelId>,
    /// Snapshots this node is currently recording
    recordings: BTreeMap<SnapshotId, SnapshotRecording>,
}

impl Node {
    /// Create a node with an initial balance and no links
    pub fn new(id: impl Into<String>, tokens: u64) -> Self {
        Self {
            id: id.into(),
            tokens,
            outbound: BTreeMap::new(),
            inbound: BTreeMap::new(),
            recordings: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current live balance
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Register the outbound channel to `dest`
    pub fn add_outbound(&mut self, dest: impl Into<String>, channel: ChannelId) {
        self.outbound.insert(dest.into(), channel);
    }

    /// Register the inbound channel from `src`
    pub fn add_inbound(&mut self, src: impl Into<String>, channel: ChannelId) {
        self.inbound.insert(src.into(), channel);
    }

    /// Outbound channel to `dest`
    pub fn outbound_channel(&self, dest: &str) -> Option<ChannelId> {
        self.outbound.get(dest).copied()
    }

    /// Outbound channels in destination ID order
    pub fn outbound_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.outbound.values().copied()
    }

    /// Destination IDs in order
    pub fn outbound_ids(&self) -> impl Iterator<Item = &str> {
        self.outbound.keys().map(String::as_str)
    }

    /// Source IDs in order
    pub fn inbound_ids(&self) -> impl Iterator<Item = &str> {
        self.inbound.keys().map(String::as_str)
    }

    /// Bookkeeping for a snapshot the node is still recording
    pub fn recording(&self, snapshot_id: SnapshotId) -> Option<&SnapshotRecording> {
        self.recordings.get(&snapshot_id)
    }

    /// Number of snapshots being recorded
    pub fn active_recordings(&self) -> usize {
        self.recordings.len()
    }

    /// Debit the balance for a transfer to `dest`
    ///
    /// Returns the message to enqueue on the outbound channel. Nothing is
    /// mutated when the destination is unknown or the balance is short.
    pub fn send_tokens(&mut self, amount: u64, dest: &str) -> Result<Message, NodeError> {
        if !self.outbound.contains_key(dest) {
            return Err(NodeError::UnknownDestination {
                node_id: self.id.clone(),
                dest: dest.to_string(),
            });
        }
        if self.tokens < amount {
            return Err(NodeError::InsufficientTokens {
                node_id: self.id.clone(),
                requested: amount,
                available: self.tokens,
            });
        }
        self.tokens -= amount;
        Ok(Message::Token(amount))
    }

    /// Initiate a snapshot on this node
    pub fn start_snapshot(&mut self, snapshot_id: SnapshotId) -> Result<Vec<NodeEffect>, NodeError> {
        if self.recordings.contains_key(&snapshot_id) {
            return Err(NodeError::SnapshotAlreadyStarted {
                node_id: self.id.clone(),
                snapshot_id,
            });
        }
        Ok(self.begin_recording(snapshot_id, None))
    }

    /// Handle a message delivered on the inbound channel from `src`
    pub fn handle_packet(&mut self, src: &str, message: Message) -> Result<Vec<NodeEffect>, NodeError> {
        if !self.inbound.contains_key(src) {
            return Err(NodeError::UnknownSource {
                node_id: self.id.clone(),
                src: src.to_string(),
            });
        }

        match message {
            Message::Token(amount) => {
                self.tokens += amount;
                if amount > 0 {
                    for rec in self.recordings.values_mut() {
                        if rec.awaiting.contains(src) {
                            rec.in_flight
                                .push(RecordedMessage::new(src, self.id.clone(), amount));
                        }
                    }
                }
                Ok(Vec::new())
            }
            Message::Marker(snapshot_id) => self.handle_marker(src, snapshot_id),
        }
    }

    fn handle_marker(&mut self, src: &str, snapshot_id: SnapshotId) -> Result<Vec<NodeEffect>, NodeError> {
        let Some(rec) = self.recordings.get_mut(&snapshot_id) else {
            return Ok(self.begin_recording(snapshot_id, Some(src)));
        };

        if rec.markers_seen.contains(src) {
            return Err(NodeError::DuplicateMarker {
                node_id: self.id.clone(),
                src: src.to_string(),
                snapshot_id,
            });
        }

        rec.markers_seen.insert(src.to_string());
        rec.awaiting.remove(src);
        if !rec.awaiting.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .recordings
            .remove(&snapshot_id)
            .map(|rec| NodeEffect::SnapshotCompleted(self.to_local(rec)))
            .into_iter()
            .collect())
    }

    /// NotStarted → Recording, and straight on to Done when nothing is awaited
    fn begin_recording(&mut self, snapshot_id: SnapshotId, trigger: Option<&str>) -> Vec<NodeEffect> {
        let awaiting: BTreeSet<String> = self
            .inbound
            .keys()
            .filter(|src| Some(src.as_str()) != trigger)
            .cloned()
            .collect();
        let markers_seen: BTreeSet<String> = trigger.map(str::to_string).into_iter().collect();

        let rec = SnapshotRecording {
            snapshot_id,
            recorded_balance: self.tokens,
            markers_seen,
            awaiting,
            in_flight: Vec::new(),
        };

        let mut effects: Vec<NodeEffect> = self
            .outbound
            .keys()
            .map(|dest| NodeEffect::Send {
                dest: dest.clone(),
                message: Message::Marker(snapshot_id),
            })
            .collect();

        if rec.awaiting.is_empty() {
            effects.push(NodeEffect::SnapshotCompleted(self.to_local(rec)));
        } else {
            self.recordings.insert(snapshot_id, rec);
        }
        effects
    }

    fn to_local(&self, rec: SnapshotRecording) -> LocalSnapshot {
        LocalSnapshot {
            snapshot_id: rec.snapshot_id,
            node_id: self.id.clone(),
            balance: rec.recorded_balance,
            in_flight: rec.in_flight,
        }
    }
}

//! Local and global snapshot records
//!
//! A node produces a [`LocalSnapshot`] when it has received a marker on every
//! inbound channel it waits on. The simulator assembles the local snapshots of
//! all participants into a [`GlobalSnapshot`].
//!
//! # Critical Invariants
//!
//! 1. **Token Conservation**: recorded balances plus recorded in-flight
//!    tokens equal the tokens in the system when the snapshot was initiated
//! 2. **Positive Amounts**: every recorded in-flight message carries > 0 tokens
//! 3. **Delivery Order**: messages recorded by one destination keep the
//!    order in which they were delivered

use crate::models::message::SnapshotId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A token transfer recorded as in flight on a channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordedMessage {
    pub src: String,
    pub dest: String,
    pub amount: u64,
}

impl RecordedMessage {
    pub fn new(src: impl Into<String>, dest: impl Into<String>, amount: u64) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            amount,
        }
    }
}

impl fmt::Display for RecordedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: token({})", self.src, self.dest, self.amount)
    }
}

/// One node's contribution to a global snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSnapshot {
    pub snapshot_id: SnapshotId,
    pub node_id: String,
    /// Balance recorded when the node entered the snapshot
    pub balance: u64,
    /// Token messages received on still-open inbound channels, in delivery order
    pub in_flight: Vec<RecordedMessage>,
}

/// A consistent cut of the whole system
///
/// # Example
/// ```
/// use snapshot_simulator_core::models::{GlobalSnapshot, LocalSnapshot, RecordedMessage};
///
/// let snapshot = GlobalSnapshot::assemble(
///     0,
///     vec![
///         LocalSnapshot {
///             snapshot_id: 0,
///             node_id: "N2".to_string(),
///             balance: 0,
///             in_flight: vec![RecordedMessage::new("N1", "N2", 5)],
///         },
///         LocalSnapshot {
///             snapshot_id: 0,
///             node_id: "N1".to_string(),
///             balance: 5,
///             in_flight: vec![],
///         },
///     ],
/// );
///
/// assert_eq!(snapshot.total_tokens(), 10);
/// assert_eq!(snapshot.token_map["N1"], 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSnapshot {
    pub id: SnapshotId,
    /// Recorded balance per node
    pub token_map: BTreeMap<String, u64>,
    /// Recorded in-flight messages, grouped by destination in node ID order
    pub messages: Vec<RecordedMessage>,
}

impl GlobalSnapshot {
    /// Create an empty snapshot with the given ID
    pub fn new(id: SnapshotId) -> Self {
        Self {
            id,
            token_map: BTreeMap::new(),
            messages: Vec::new(),
        }
    }

    /// Assemble a global snapshot from the local snapshots of its participants
    ///
    /// Nodes are visited in ID order and each node's recorded messages keep
    /// their delivery order. Recorded amounts that are not strictly positive
    /// carry no tokens and are discarded.
    pub fn assemble(id: SnapshotId, locals: impl IntoIterator<Item = LocalSnapshot>) -> Self {
        let by_node: BTreeMap<String, LocalSnapshot> = locals
            .into_iter()
            .map(|local| (local.node_id.clone(), local))
            .collect();

        let mut snapshot = Self::new(id);
        for (node_id, local) in by_node {
            snapshot.token_map.insert(node_id, local.balance);
            snapshot
                .messages
                .extend(local.in_flight.into_iter().filter(|msg| msg.amount > 0));
        }
        snapshot
    }

    /// Sum of recorded node balances
    pub fn recorded_balance_total(&self) -> u64 {
        self.token_map.values().sum()
    }

    /// Sum of tokens recorded as in flight
    pub fn in_flight_total(&self) -> u64 {
        self.messages.iter().map(|msg| msg.amount).sum()
    }

    /// Total tokens captured by this snapshot
    pub fn total_tokens(&self) -> u64 {
        self.recorded_balance_total() + self.in_flight_total()
    }

    /// Recorded messages delivered to `dest`, in delivery order
    pub fn messages_to(&self, dest: &str) -> Vec<&RecordedMessage> {
        self.messages.iter().filter(|msg| msg.dest == dest).collect()
    }

    /// Net in-flight tokens per `(src, dest)` channel
    ///
    /// Collapses every recorded message on a channel into one entry: the net
    /// increase the destination saw on that channel between its own
    /// recording point and the channel's marker.
    pub fn channel_totals(&self) -> BTreeMap<(String, String), u64> {
        let mut totals = BTreeMap::new();
        for msg in &self.messages {
            *totals
                .entry((msg.src.clone(), msg.dest.clone()))
                .or_insert(0) += msg.amount;
        }
        totals
    }

    /// Compare against an expected snapshot
    ///
    /// IDs and token maps must match exactly. Messages must match per
    /// destination, in order; the interleaving of different destinations is
    /// not significant.
    pub fn diff(&self, expected: &GlobalSnapshot) -> Result<(), SnapshotMismatch> {
        if expected.id != self.id {
            return Err(SnapshotMismatch::Id {
                expected: expected.id,
                actual: self.id,
            });
        }

        if expected.token_map != self.token_map {
            return Err(SnapshotMismatch::Tokens {
                id: self.id,
                expected: tokens_string(&expected.token_map, "\t"),
                actual: tokens_string(&self.token_map, "\t"),
            });
        }

        if expected.messages.len() != self.messages.len() {
            return Err(SnapshotMismatch::MessageCount {
                id: self.id,
                expected: messages_string(&expected.messages, "\t"),
                actual: messages_string(&self.messages, "\t"),
            });
        }

        let expected_by_dest = group_by_dest(&expected.messages);
        let actual_by_dest = group_by_dest(&self.messages);
        for (dest, expected_msgs) in &expected_by_dest {
            let actual_msgs = actual_by_dest.get(dest).cloned().unwrap_or_default();
            if *expected_msgs != actual_msgs {
                return Err(SnapshotMismatch::Messages {
                    id: self.id,
                    dest: dest.clone(),
                    expected: messages_string(expected_msgs.iter().copied(), "\t"),
                    actual: messages_string(actual_msgs.iter().copied(), "\t"),
                });
            }
        }

        Ok(())
    }

    /// SHA256 of the canonical JSON form
    ///
    /// All maps are ordered, so two runs with the same seed and script
    /// produce the same digest.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Render in the line-oriented `.snap` fixture format
    ///
    /// # Example
    /// ```
    /// use snapshot_simulator_core::models::{GlobalSnapshot, RecordedMessage};
    ///
    /// let mut snapshot = GlobalSnapshot::new(1);
    /// snapshot.token_map.insert("N1".to_string(), 4);
    /// snapshot.messages.push(RecordedMessage::new("N2", "N1", 3));
    ///
    /// assert_eq!(snapshot.to_fixture_string(), "1\nN1 4\nN2 N1 token(3)\n");
    /// ```
    pub fn to_fixture_string(&self) -> String {
        let mut out = format!("{}\n", self.id);
        for (node_id, tokens) in &self.token_map {
            out.push_str(&format!("{} {}\n", node_id, tokens));
        }
        for msg in &self.messages {
            out.push_str(&format!("{} {} token({})\n", msg.src, msg.dest, msg.amount));
        }
        out
    }
}

impl fmt::Display for GlobalSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Snapshot {}:", self.id)?;
        writeln!(f, "{}", tokens_string(&self.token_map, "\t"))?;
        if !self.messages.is_empty() {
            writeln!(f, "{}", messages_string(&self.messages, "\t"))?;
        }
        Ok(())
    }
}

fn group_by_dest(messages: &[RecordedMessage]) -> BTreeMap<String, Vec<&RecordedMessage>> {
    let mut grouped: BTreeMap<String, Vec<&RecordedMessage>> = BTreeMap::new();
    for msg in messages {
        grouped.entry(msg.dest.clone()).or_default().push(msg);
    }
    grouped
}

/// Pretty-print a token map, one node per line
pub fn tokens_string(tokens: &BTreeMap<String, u64>, prefix: &str) -> String {
    tokens
        .iter()
        .map(|(node_id, count)| {
            let plural = if *count == 1 { "" } else { "s" };
            format!("{}{}: {} token{}", prefix, node_id, count, plural)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pretty-print recorded messages, one per line
pub fn messages_string<'a>(
    messages: impl IntoIterator<Item = &'a RecordedMessage>,
    prefix: &str,
) -> String {
    messages
        .into_iter()
        .map(|msg| format!("{}{}", prefix, msg))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A snapshot that differs from the expected one
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotMismatch {
    #[error("Snapshot IDs do not match: {expected} != {actual}")]
    Id { expected: SnapshotId, actual: SnapshotId },

    #[error("Snapshot {id}: tokens do not match.\nExpected:\n{expected}\nActual:\n{actual}")]
    Tokens {
        id: SnapshotId,
        expected: String,
        actual: String,
    },

    #[error("Snapshot {id}: number of messages do not match.\nExpected:\n{expected}\nActual:\n{actual}")]
    MessageCount {
        id: SnapshotId,
        expected: String,
        actual: String,
    },

    #[error("Snapshot {id}: messages received at {dest} do not match.\nExpected:\n{expected}\nActual:\n{actual}")]
    Messages {
        id: SnapshotId,
        dest: String,
        expected: String,
        actual: String,
    },
}

/// A snapshot whose recorded tokens do not add up to the system total
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Snapshot {id}: simulator has {expected} tokens, snapshot has {actual}:\n{balances}\n{messages}")]
pub struct ConservationError {
    pub id: SnapshotId,
    pub expected: u64,
    pub actual: u64,
    pub balances: String,
    pub messages: String,
}

/// Verify that every snapshot conserves `expected_total` tokens
pub fn check_token_conservation(
    expected_total: u64,
    snapshots: &[GlobalSnapshot],
) -> Result<(), ConservationError> {
    for snapshot in snapshots {
        let actual = snapshot.total_tokens();
        if actual != expected_total {
            return Err(ConservationError {
                id: snapshot.id,
                expected: expected_total,
                actual,
                balances: tokens_string(&snapshot.token_map, "\t"),
                messages: messages_string(&snapshot.messages, "\t"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: SnapshotId, tokens: &[(&str, u64)], msgs: &[(&str, &str, u64)]) -> GlobalSnapshot {
        GlobalSnapshot {
            id,
            token_map: tokens.iter().map(|(n, t)| (n.to_string(), *t)).collect(),
            messages: msgs
                .iter()
                .map(|(s, d, a)| RecordedMessage::new(*s, *d, *a))
                .collect(),
        }
    }

    #[test]
    fn test_assemble_drops_zero_amounts() {
        let local = LocalSnapshot {
            snapshot_id: 3,
            node_id: "N1".to_string(),
            balance: 7,
            in_flight: vec![
                RecordedMessage::new("N2", "N1", 0),
                RecordedMessage::new("N2", "N1", 2),
            ],
        };
        let global = GlobalSnapshot::assemble(3, vec![local]);
        assert_eq!(global.messages, vec![RecordedMessage::new("N2", "N1", 2)]);
        assert_eq!(global.total_tokens(), 9);
    }

    #[test]
    fn test_diff_ignores_order_across_destinations() {
        let expected = snapshot(0, &[("A", 1), ("B", 1)], &[("A", "B", 1), ("B", "A", 2)]);
        let actual = snapshot(0, &[("A", 1), ("B", 1)], &[("B", "A", 2), ("A", "B", 1)]);
        assert!(actual.diff(&expected).is_ok());
    }

    #[test]
    fn test_diff_detects_reordering_within_destination() {
        let expected = snapshot(0, &[("A", 1)], &[("B", "A", 1), ("C", "A", 2)]);
        let actual = snapshot(0, &[("A", 1)], &[("C", "A", 2), ("B", "A", 1)]);
        match actual.diff(&expected) {
            Err(SnapshotMismatch::Messages { dest, .. }) => assert_eq!(dest, "A"),
            other => panic!("expected message mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_diff_detects_token_mismatch() {
        let expected = snapshot(1, &[("A", 1)], &[]);
        let actual = snapshot(1, &[("A", 2)], &[]);
        assert!(matches!(
            actual.diff(&expected),
            Err(SnapshotMismatch::Tokens { id: 1, .. })
        ));
        assert!(matches!(
            snapshot(2, &[("A", 1)], &[]).diff(&expected),
            Err(SnapshotMismatch::Id { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_channel_totals_collapse_per_link() {
        let snap = snapshot(
            0,
            &[("A", 0)],
            &[("B", "A", 1), ("B", "A", 2), ("C", "A", 4), ("B", "A", 3)],
        );
        let totals = snap.channel_totals();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&("B".to_string(), "A".to_string())], 6);
        assert_eq!(totals[&("C".to_string(), "A".to_string())], 4);
    }

    #[test]
    fn test_conservation_error_reports_dump() {
        let snap = snapshot(4, &[("A", 3), ("B", 1)], &[("A", "B", 1)]);
        let err = check_token_conservation(10, &[snap]).unwrap_err();
        assert_eq!(err.actual, 5);
        assert!(err.to_string().contains("A: 3 tokens"));
        assert!(err.to_string().contains("A -> B: token(1)"));
    }

    #[test]
    fn test_digest_is_stable() {
        let a = snapshot(0, &[("A", 3), ("B", 1)], &[("A", "B", 1)]);
        let b = a.clone();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_ne!(
            a.digest().unwrap(),
            snapshot(0, &[("A", 3), ("B", 2)], &[]).digest().unwrap()
        );
    }
}

//! Messages carried on channels
//!
//! A channel carries exactly two kinds of payload: token transfers, which
//! move real value between nodes, and markers, which delimit the "before"
//! and "after" halves of a channel's message stream for one snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique snapshot identifier, allocated in increasing order from 0
pub type SnapshotId = u64;

/// Payload of a single channel delivery
///
/// # Example
/// ```
/// use snapshot_simulator_core::Message;
///
/// assert_eq!(Message::Token(5).to_string(), "token(5)");
/// assert_eq!(Message::Marker(2).to_string(), "marker(2)");
/// assert_eq!(Message::Token(5).token_amount(), Some(5));
/// assert!(Message::Marker(2).is_marker());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Message {
    /// Transfer of a number of tokens to the receiving node
    Token(u64),

    /// Snapshot marker for the given snapshot ID
    Marker(SnapshotId),
}

impl Message {
    /// True for marker messages
    pub fn is_marker(&self) -> bool {
        matches!(self, Message::Marker(_))
    }

    /// Tokens carried by this message (None for markers)
    pub fn token_amount(&self) -> Option<u64> {
        match self {
            Message::Token(amount) => Some(*amount),
            Message::Marker(_) => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Token(amount) => write!(f, "token({})", amount),
            Message::Marker(id) => write!(f, "marker({})", id),
        }
    }
}

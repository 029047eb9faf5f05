//! Directed channel between two nodes
//!
//! Each channel owns a FIFO queue of pending delivery events. Only the
//! scheduled receive time is randomized; the dequeue order never is, so a
//! message enqueued later can never overtake one already queued.

use crate::core::time::TimeManager;
use crate::models::message::Message;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Dense handle of a channel in the simulator's channel arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub usize);

/// A message in transit, with the tick at which it becomes deliverable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMsgEvent {
    pub src: String,
    pub dest: String,
    pub message: Message,
    pub receive_time: u64,
}

/// A unidirectional link from `src` to `dest`
///
/// # Example
/// ```
/// use snapshot_simulator_core::models::{Channel, Message, SendMsgEvent};
/// use snapshot_simulator_core::TimeManager;
///
/// let mut time = TimeManager::new();
/// let mut channel = Channel::new("N1", "N2");
/// channel.push(SendMsgEvent {
///     src: "N1".to_string(),
///     dest: "N2".to_string(),
///     message: Message::Token(3),
///     receive_time: 2,
/// });
///
/// time.advance_tick();
/// assert!(channel.pop_due(&time).is_none());
/// time.advance_tick();
/// assert_eq!(channel.pop_due(&time).unwrap().message, Message::Token(3));
/// assert!(channel.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    src: String,
    dest: String,
    queue: VecDeque<SendMsgEvent>,
}

impl Channel {
    /// Create an empty channel
    pub fn new(src: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            queue: VecDeque::new(),
        }
    }

    /// Source node ID
    pub fn src(&self) -> &str {
        &self.src
    }

    /// Destination node ID
    pub fn dest(&self) -> &str {
        &self.dest
    }

    /// Append an event at the back of the queue
    pub fn push(&mut self, event: SendMsgEvent) {
        debug_assert_eq!(event.src, self.src, "event source does not match channel");
        debug_assert_eq!(event.dest, self.dest, "event destination does not match channel");
        self.queue.push_back(event);
    }

    /// Head of the queue, if any
    pub fn peek(&self) -> Option<&SendMsgEvent> {
        self.queue.front()
    }

    /// Pop the head of the queue if its receive time has arrived
    ///
    /// A head that is not yet due blocks everything behind it, even events
    /// whose own receive time has already passed.
    pub fn pop_due(&mut self, time: &TimeManager) -> Option<SendMsgEvent> {
        match self.peek() {
            Some(head) if time.is_due(head.receive_time) => self.queue.pop_front(),
            _ => None,
        }
    }

    /// Number of events in transit
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is in transit
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Tokens currently in transit on this channel
    pub fn tokens_in_transit(&self) -> u64 {
        self.queue
            .iter()
            .filter_map(|event| event.message.token_amount())
            .sum()
    }
}

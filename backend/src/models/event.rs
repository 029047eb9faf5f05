//! Event logging for diagnostics and test verification.
//!
//! Every send, receive, snapshot start and snapshot end is appended to the
//! [`EventLog`] together with the tick (epoch) in which it happened. The log
//! is write-only from the protocol's point of view: nothing in the snapshot
//! algorithm ever reads it back.
//!
//! # Example
//!
//! ```rust
//! use snapshot_simulator_core::models::{Event, EventLog, Message};
//!
//! let mut log = EventLog::new();
//! log.log(Event::MessageSent {
//!     tick: 0,
//!     src: "N1".to_string(),
//!     dest: "N2".to_string(),
//!     message: Message::Token(5),
//!     receive_time: 1,
//! });
//!
//! assert_eq!(log.len(), 1);
//! assert_eq!(log.events()[0].event_type(), "MessageSent");
//! ```

use crate::models::message::{Message, SnapshotId};
use serde::{Deserialize, Serialize};

/// Simulation event, stamped with the tick it occurred in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Message enqueued on the channel `src -> dest`
    MessageSent {
        tick: u64,
        src: String,
        dest: String,
        message: Message,
        receive_time: u64,
    },

    /// Message delivered to `dest`
    MessageReceived {
        tick: u64,
        src: String,
        dest: String,
        message: Message,
    },

    /// Snapshot initiated at `node_id`
    SnapshotStarted {
        tick: u64,
        node_id: String,
        snapshot_id: SnapshotId,
    },

    /// `node_id` finished its local part of a snapshot
    SnapshotEnded {
        tick: u64,
        node_id: String,
        snapshot_id: SnapshotId,
    },

    /// Duplicate marker rejected by `dest`
    MarkerRejected {
        tick: u64,
        src: String,
        dest: String,
        snapshot_id: SnapshotId,
    },
}

impl Event {
    /// Tick in which this event occurred
    pub fn tick(&self) -> u64 {
        match self {
            Event::MessageSent { tick, .. }
            | Event::MessageReceived { tick, .. }
            | Event::SnapshotStarted { tick, .. }
            | Event::SnapshotEnded { tick, .. }
            | Event::MarkerRejected { tick, .. } => *tick,
        }
    }

    /// Short name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::MessageSent { .. } => "MessageSent",
            Event::MessageReceived { .. } => "MessageReceived",
            Event::SnapshotStarted { .. } => "SnapshotStarted",
            Event::SnapshotEnded { .. } => "SnapshotEnded",
            Event::MarkerRejected { .. } => "MarkerRejected",
        }
    }

    /// Node on whose behalf the event was recorded
    ///
    /// Sends belong to the sender, receives and rejections to the receiver.
    pub fn node_id(&self) -> &str {
        match self {
            Event::MessageSent { src, .. } => src,
            Event::MessageReceived { dest, .. } => dest,
            Event::SnapshotStarted { node_id, .. } => node_id,
            Event::SnapshotEnded { node_id, .. } => node_id,
            Event::MarkerRejected { dest, .. } => dest,
        }
    }

    /// Snapshot ID if the event concerns a snapshot
    pub fn snapshot_id(&self) -> Option<SnapshotId> {
        match self {
            Event::SnapshotStarted { snapshot_id, .. }
            | Event::SnapshotEnded { snapshot_id, .. }
            | Event::MarkerRejected { snapshot_id, .. } => Some(*snapshot_id),
            Event::MessageSent { message, .. } | Event::MessageReceived { message, .. } => {
                match message {
                    Message::Marker(id) => Some(*id),
                    Message::Token(_) => None,
                }
            }
        }
    }
}

/// Append-only log of simulation events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Append an event
    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in append order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events of one epoch
    pub fn events_at_tick(&self, tick: u64) -> Vec<&Event> {
        self.events.iter().filter(|e| e.tick() == tick).collect()
    }

    /// Events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Events recorded on behalf of a node
    pub fn events_for_node(&self, node_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.node_id() == node_id)
            .collect()
    }

    /// Messages delivered to `dest`, in delivery order, as `(src, message)`
    pub fn received_by(&self, dest: &str) -> Vec<(&str, Message)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::MessageReceived {
                    src,
                    dest: to,
                    message,
                    ..
                } if to == dest => Some((src.as_str(), *message)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn received(tick: u64, src: &str, dest: &str, message: Message) -> Event {
        Event::MessageReceived {
            tick,
            src: src.to_string(),
            dest: dest.to_string(),
            message,
        }
    }

    #[test]
    fn test_event_node_attribution() {
        let sent = Event::MessageSent {
            tick: 3,
            src: "A".to_string(),
            dest: "B".to_string(),
            message: Message::Token(1),
            receive_time: 4,
        };
        assert_eq!(sent.node_id(), "A");
        assert_eq!(received(4, "A", "B", Message::Token(1)).node_id(), "B");
    }

    #[test]
    fn test_snapshot_id_from_marker_messages() {
        assert_eq!(received(1, "A", "B", Message::Marker(7)).snapshot_id(), Some(7));
        assert_eq!(received(1, "A", "B", Message::Token(7)).snapshot_id(), None);
    }

    #[test]
    fn test_event_log_queries() {
        let mut log = EventLog::new();
        log.log(received(1, "A", "C", Message::Token(1)));
        log.log(received(1, "B", "D", Message::Token(9)));
        log.log(received(2, "B", "C", Message::Marker(0)));
        log.log(Event::SnapshotEnded {
            tick: 2,
            node_id: "C".to_string(),
            snapshot_id: 0,
        });

        assert_eq!(log.events_at_tick(1).len(), 2);
        assert_eq!(log.events_of_type("MessageReceived").len(), 3);
        assert_eq!(log.events_for_node("C").len(), 3);
        assert_eq!(
            log.received_by("C"),
            vec![("A", Message::Token(1)), ("B", Message::Marker(0))]
        );
    }
}

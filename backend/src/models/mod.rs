//! Domain models for the snapshot simulator

pub mod channel;
pub mod event;
pub mod message;
pub mod node;
pub mod snapshot;

// Re-exports
pub use channel::{Channel, ChannelId, SendMsgEvent};
pub use event::{Event, EventLog};
pub use message::{Message, SnapshotId};
pub use node::{Node, NodeEffect, NodeError, SnapshotRecording};
pub use snapshot::{
    check_token_conservation, ConservationError, GlobalSnapshot, LocalSnapshot, RecordedMessage,
    SnapshotMismatch,
};

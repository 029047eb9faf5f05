//! Node-level protocol behaviour
//!
//! Drives a single node by hand, without a simulator, and checks the
//! effects it asks for.

use snapshot_simulator_core::models::{ChannelId, Message, Node, NodeEffect, NodeError, RecordedMessage};

/// Node B with inbound links from A and C and an outbound link to A
fn node_b() -> Node {
    let mut node = Node::new("B", 10);
    node.add_inbound("A", ChannelId(0));
    node.add_inbound("C", ChannelId(1));
    node.add_outbound("A", ChannelId(2));
    node
}

fn sends(effects: &[NodeEffect]) -> Vec<(&str, Message)> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            NodeEffect::Send { dest, message } => Some((dest.as_str(), *message)),
            NodeEffect::SnapshotCompleted(_) => None,
        })
        .collect()
}

#[test]
fn test_send_tokens_checks_balance() {
    let mut node = node_b();

    assert_eq!(node.send_tokens(4, "A").unwrap(), Message::Token(4));
    assert_eq!(node.tokens(), 6);

    let err = node.send_tokens(7, "A").unwrap_err();
    assert_eq!(
        err,
        NodeError::InsufficientTokens {
            node_id: "B".to_string(),
            requested: 7,
            available: 6,
        }
    );
    assert_eq!(node.tokens(), 6);
}

#[test]
fn test_send_to_non_neighbour_rejected() {
    let mut node = node_b();
    // C -> B exists, B -> C does not
    assert!(matches!(
        node.send_tokens(1, "C"),
        Err(NodeError::UnknownDestination { .. })
    ));
    assert_eq!(node.tokens(), 10);
}

#[test]
fn test_first_marker_starts_recording_and_floods_markers() {
    let mut node = node_b();
    let effects = node.handle_packet("A", Message::Marker(0)).unwrap();

    assert_eq!(sends(&effects), vec![("A", Message::Marker(0))]);
    assert_eq!(node.active_recordings(), 1);

    let rec = node.recording(0).unwrap();
    assert_eq!(rec.recorded_balance(), 10);
    assert!(rec.markers_seen().contains("A"));
    assert_eq!(rec.awaiting().iter().collect::<Vec<_>>(), vec!["C"]);
}

#[test]
fn test_tokens_recorded_only_on_open_channels() {
    let mut node = node_b();
    node.handle_packet("A", Message::Marker(0)).unwrap();

    // A's channel is closed, C's is open
    node.handle_packet("A", Message::Token(3)).unwrap();
    node.handle_packet("C", Message::Token(2)).unwrap();
    node.handle_packet("C", Message::Token(5)).unwrap();

    assert_eq!(node.tokens(), 20);
    assert_eq!(
        node.recording(0).unwrap().in_flight(),
        &[
            RecordedMessage::new("C", "B", 2),
            RecordedMessage::new("C", "B", 5)
        ]
    );

    let effects = node.handle_packet("C", Message::Marker(0)).unwrap();
    let local = match &effects[..] {
        [NodeEffect::SnapshotCompleted(local)] => local.clone(),
        other => panic!("expected completion, got {:?}", other),
    };
    assert_eq!(local.balance, 10);
    assert_eq!(local.in_flight.len(), 2);
    assert!(node.recording(0).is_none());
    assert_eq!(node.active_recordings(), 0);
}

#[test]
fn test_zero_token_message_not_recorded() {
    let mut node = node_b();
    node.handle_packet("A", Message::Marker(0)).unwrap();
    node.handle_packet("C", Message::Token(0)).unwrap();
    assert!(node.recording(0).unwrap().in_flight().is_empty());
}

#[test]
fn test_duplicate_marker_rejected_without_state_change() {
    let mut node = node_b();
    node.handle_packet("A", Message::Marker(0)).unwrap();
    let before = node.recording(0).cloned();

    let err = node.handle_packet("A", Message::Marker(0)).unwrap_err();
    assert_eq!(
        err,
        NodeError::DuplicateMarker {
            node_id: "B".to_string(),
            src: "A".to_string(),
            snapshot_id: 0,
        }
    );
    assert_eq!(node.recording(0).cloned(), before);
}

#[test]
fn test_concurrent_snapshots_are_independent() {
    let mut node = node_b();

    node.handle_packet("A", Message::Marker(0)).unwrap();
    node.handle_packet("C", Message::Token(4)).unwrap();
    node.handle_packet("C", Message::Marker(1)).unwrap();
    node.handle_packet("A", Message::Token(1)).unwrap();

    let rec0 = node.recording(0).unwrap();
    let rec1 = node.recording(1).unwrap();
    assert_eq!(rec0.recorded_balance(), 10);
    assert_eq!(rec1.recorded_balance(), 14);
    assert_eq!(rec0.in_flight(), &[RecordedMessage::new("C", "B", 4)]);
    assert_eq!(rec1.in_flight(), &[RecordedMessage::new("A", "B", 1)]);
}

#[test]
fn test_initiator_records_all_inbound() {
    let mut node = node_b();
    let effects = node.start_snapshot(3).unwrap();

    assert_eq!(sends(&effects), vec![("A", Message::Marker(3))]);
    assert_eq!(node.recording(3).unwrap().awaiting().len(), 2);
    assert!(node.recording(3).unwrap().markers_seen().is_empty());
}

#[test]
fn test_tokens_after_completion_are_not_recorded() {
    let mut node = node_b();
    node.handle_packet("A", Message::Marker(0)).unwrap();
    node.handle_packet("C", Message::Marker(0)).unwrap();

    node.handle_packet("C", Message::Token(6)).unwrap();
    assert_eq!(node.tokens(), 16);
    assert!(node.recording(0).is_none());
}

#[test]
fn test_many_snapshots_leave_no_recordings() {
    let mut node = node_b();
    for id in 0..200 {
        node.handle_packet("A", Message::Marker(id)).unwrap();
        node.handle_packet("C", Message::Token(1)).unwrap();
        let effects = node.handle_packet("C", Message::Marker(id)).unwrap();
        assert!(matches!(
            &effects[..],
            [NodeEffect::SnapshotCompleted(local)] if local.in_flight.len() == 1
        ));
    }
    assert_eq!(node.active_recordings(), 0);
}

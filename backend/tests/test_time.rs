//! Tests for TimeManager

use snapshot_simulator_core::TimeManager;

#[test]
fn test_time_manager_new() {
    let time = TimeManager::new();
    assert_eq!(time.current_tick(), 0);
}

#[test]
fn test_advance_tick() {
    let mut time = TimeManager::new();

    assert_eq!(time.advance_tick(), 1);
    assert_eq!(time.current_tick(), 1);

    assert_eq!(time.advance_tick(), 2);
    assert_eq!(time.current_tick(), 2);
}

#[test]
fn test_due_messages() {
    let mut time = TimeManager::new();

    // Sent at tick 0 with no jitter
    let receive_time = time.current_tick() + 1;
    assert!(!time.is_due(receive_time));

    time.advance_tick();
    assert!(time.is_due(receive_time));

    // Late delivery is still due
    for _ in 0..10 {
        time.advance_tick();
    }
    assert!(time.is_due(receive_time));
}

#[test]
fn test_many_ticks() {
    let mut time = TimeManager::new();
    for _ in 0..10_000 {
        time.advance_tick();
    }
    assert_eq!(time.current_tick(), 10_000);
}

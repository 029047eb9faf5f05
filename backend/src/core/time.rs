//! Logical time for the simulation
//!
//! The simulator has no wall clock. Time is a tick counter that only the
//! driver advances, one step per `Simulator::tick()`. Every message receive
//! time and every event-log epoch is expressed in these ticks.

use serde::{Deserialize, Serialize};

/// Manages logical simulation time in discrete ticks
///
/// # Example
/// ```
/// use snapshot_simulator_core::TimeManager;
///
/// let mut time = TimeManager::new();
/// assert_eq!(time.current_tick(), 0);
///
/// time.advance_tick();
/// assert_eq!(time.current_tick(), 1);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeManager {
    /// Total ticks elapsed since simulation start
    current_tick: u64,
}

impl TimeManager {
    /// Create a clock positioned at tick 0
    pub fn new() -> Self {
        Self { current_tick: 0 }
    }

    /// Advance time by one tick and return the new tick
    ///
    /// # Example
    /// ```
    /// use snapshot_simulator_core::TimeManager;
    ///
    /// let mut time = TimeManager::new();
    /// assert_eq!(time.advance_tick(), 1);
    /// assert_eq!(time.advance_tick(), 2);
    /// ```
    pub fn advance_tick(&mut self) -> u64 {
        self.current_tick += 1;
        self.current_tick
    }

    /// Get the current tick (total ticks since start)
    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Whether a message scheduled for `receive_time` may be delivered now
    ///
    /// # Example
    /// ```
    /// use snapshot_simulator_core::TimeManager;
    ///
    /// let mut time = TimeManager::new();
    /// time.advance_tick();
    /// assert!(time.is_due(1));
    /// assert!(!time.is_due(2));
    /// ```
    pub fn is_due(&self, receive_time: u64) -> bool {
        receive_time <= self.current_tick
    }
}

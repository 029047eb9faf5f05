//! Per-snapshot completion tracking
//!
//! Each snapshot ID gets its own [`SnapshotCollector`]: a countdown latch
//! over the participating nodes that also keeps the local snapshots they
//! report. The driver thread reports completions while ticking; any number
//! of other threads may block in [`SnapshotHandle::wait`] until the last
//! participant reports.
//!
//! A collector can be abandoned (the driver gave up, or the simulator was
//! dropped). Blocked waiters then wake up with
//! [`SimulationError::SnapshotAbandoned`] instead of waiting forever.

use crate::models::message::SnapshotId;
use crate::models::snapshot::{GlobalSnapshot, LocalSnapshot};
use crate::orchestrator::engine::SimulationError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct CollectorState {
    /// Participants that have not reported yet
    remaining: BTreeSet<String>,
    reported: BTreeMap<String, LocalSnapshot>,
    abandoned: bool,
}

/// Countdown latch for one snapshot
#[derive(Debug)]
pub struct SnapshotCollector {
    snapshot_id: SnapshotId,
    participants: BTreeSet<String>,
    state: Mutex<CollectorState>,
    done: Condvar,
}

impl SnapshotCollector {
    /// Create a latch waiting for every node in `participants`
    pub fn new(snapshot_id: SnapshotId, participants: BTreeSet<String>) -> Self {
        Self {
            snapshot_id,
            state: Mutex::new(CollectorState {
                remaining: participants.clone(),
                reported: BTreeMap::new(),
                abandoned: false,
            }),
            participants,
            done: Condvar::new(),
        }
    }

    pub fn snapshot_id(&self) -> SnapshotId {
        self.snapshot_id
    }

    pub fn participants(&self) -> &BTreeSet<String> {
        &self.participants
    }

    // A panicking waiter cannot leave the state half-written, so a poisoned
    // lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a participant's local snapshot
    ///
    /// Returns true when this report was the last one outstanding.
    pub fn report(&self, local: LocalSnapshot) -> Result<bool, SimulationError> {
        if local.snapshot_id != self.snapshot_id {
            return Err(SimulationError::UnexpectedCompletion {
                node_id: local.node_id,
                snapshot_id: local.snapshot_id,
            });
        }

        let mut state = self.lock();
        if !state.remaining.remove(&local.node_id) {
            return Err(SimulationError::UnexpectedCompletion {
                node_id: local.node_id,
                snapshot_id: self.snapshot_id,
            });
        }
        state.reported.insert(local.node_id.clone(), local);

        let complete = state.remaining.is_empty();
        if complete {
            self.done.notify_all();
        }
        Ok(complete)
    }

    /// True once `node_id` has handed in its local snapshot
    pub fn has_reported(&self, node_id: &str) -> bool {
        self.lock().reported.contains_key(node_id)
    }

    /// Number of participants still recording
    pub fn outstanding(&self) -> usize {
        self.lock().remaining.len()
    }

    pub fn is_complete(&self) -> bool {
        self.outstanding() == 0
    }

    /// Assemble the global snapshot if every participant has reported
    pub fn try_assemble(&self) -> Option<GlobalSnapshot> {
        let state = self.lock();
        state
            .remaining
            .is_empty()
            .then(|| GlobalSnapshot::assemble(self.snapshot_id, state.reported.values().cloned()))
    }

    /// Wake every waiter of an incomplete snapshot with an error
    ///
    /// Reports are still accepted afterwards; a snapshot that completes
    /// anyway can be collected as usual.
    pub fn abandon(&self) {
        let mut state = self.lock();
        if !state.remaining.is_empty() {
            state.abandoned = true;
            self.done.notify_all();
        }
    }

    /// Block until every participant has reported, then assemble
    pub fn wait(&self) -> Result<GlobalSnapshot, SimulationError> {
        let mut state = self.lock();
        while !state.remaining.is_empty() && !state.abandoned {
            state = self
                .done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if !state.remaining.is_empty() {
            return Err(SimulationError::SnapshotAbandoned(self.snapshot_id));
        }
        Ok(GlobalSnapshot::assemble(
            self.snapshot_id,
            state.reported.values().cloned(),
        ))
    }
}

/// Shareable handle on a snapshot's completion
///
/// Cheap to clone and `Send`, so it can be moved to a waiter thread while
/// the driver keeps ticking the simulator.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    collector: Arc<SnapshotCollector>,
}

impl SnapshotHandle {
    pub(crate) fn new(collector: Arc<SnapshotCollector>) -> Self {
        Self { collector }
    }

    pub fn snapshot_id(&self) -> SnapshotId {
        self.collector.snapshot_id()
    }

    pub fn is_complete(&self) -> bool {
        self.collector.is_complete()
    }

    /// Non-blocking collection
    pub fn try_collect(&self) -> Option<GlobalSnapshot> {
        self.collector.try_assemble()
    }

    /// Participating node IDs
    pub fn participants(&self) -> &BTreeSet<String> {
        self.collector.participants()
    }

    /// Block the calling thread until the snapshot is complete
    ///
    /// Never call this on the thread that drives `Simulator::tick()` before
    /// the snapshot is complete; nothing else would advance it.
    pub fn wait(&self) -> Result<GlobalSnapshot, SimulationError> {
        self.collector.wait()
    }

    pub(crate) fn abandon(&self) {
        self.collector.abandon()
    }
}

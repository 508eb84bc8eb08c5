use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use crate::types::TargetId;

/// Delivery state of one downstream target.
///
/// `Waiting` and `InFlight` targets still need data. `Done` and `Failed` are terminal and never
/// receive another push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TargetState {
    /// Eligible for the next cycle, no push outstanding.
    Waiting = 0,
    /// A push of the current cycle is outstanding.
    InFlight = 1,
    /// Withdrew from the operation or acknowledged the last cycle.
    Done = 2,
    /// Its own push failed.
    Failed = 3,
}

impl TargetState {
    fn from_u8(value: u8) -> TargetState {
        match value {
            0 => TargetState::Waiting,
            1 => TargetState::InFlight,
            2 => TargetState::Done,
            _ => TargetState::Failed,
        }
    }

    /// Returns `true` for states that still count towards fan-in counters.
    pub fn needs_more_data(&self) -> bool {
        matches!(self, TargetState::Waiting | TargetState::InFlight)
    }

    pub fn is_terminal(&self) -> bool {
        !self.needs_more_data()
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetState::Waiting => f.write_str("waiting"),
            TargetState::InFlight => f.write_str("in_flight"),
            TargetState::Done => f.write_str("done"),
            TargetState::Failed => f.write_str("failed"),
        }
    }
}

/// Per-target state owned by a distribution operation.
///
/// All transitions are compare-and-set so that a target can only leave `InFlight` once per push,
/// whichever worker thread observes its acknowledgement.
#[derive(Debug)]
pub struct DownstreamTarget {
    id: TargetId,
    state: AtomicU8,
    pushes: AtomicU64,
}

impl DownstreamTarget {
    pub fn new(id: TargetId) -> Self {
        Self {
            id,
            state: AtomicU8::new(TargetState::Waiting as u8),
            pushes: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn state(&self) -> TargetState {
        TargetState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn needs_more_data(&self) -> bool {
        self.state().needs_more_data()
    }

    /// Number of pushes sent to this target so far, data and failure notices alike.
    pub fn pushes(&self) -> u64 {
        self.pushes.load(Ordering::Acquire)
    }

    /// Moves a waiting target in flight.
    ///
    /// Returns `false`, leaving the state untouched, when the target is not waiting.
    pub fn begin_push(&self) -> bool {
        let started = self.transition(TargetState::Waiting, TargetState::InFlight);
        if started {
            self.pushes.fetch_add(1, Ordering::AcqRel);
        }

        started
    }

    /// Settles the outstanding push of this target into `next`.
    ///
    /// Returns `false` when the target was not in flight.
    pub fn complete_push(&self, next: TargetState) -> bool {
        debug_assert_ne!(next, TargetState::InFlight);
        self.transition(TargetState::InFlight, next)
    }

    fn transition(&self, from: TargetState, to: TargetState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
